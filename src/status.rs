//! Observers of the tracking session.
//!
//! The controller hands a [`SessionState`] snapshot to its [`StatusSink`] after every state
//! change. Several sinks can be combined by passing a tuple.

use std::fmt;

use chrono::{DateTime, Local, Utc};
use impl_trait_for_tuples::impl_for_tuples;
use tracing::{info, warn};

use crate::sample::EpochMillis;
use crate::state_machine::session::{Connectivity, SessionState};

/// Receives a snapshot of the session after every state change.
pub trait StatusSink: Send + 'static {
    fn on_update(&self, state: &SessionState);
}

#[impl_for_tuples(1, 4)]
impl StatusSink for Tuple {
    fn on_update(&self, state: &SessionState) {
        for_tuples!( #( Tuple.on_update(state); )* );
    }
}

/// Logs every snapshot through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl StatusSink for LogSink {
    fn on_update(&self, state: &SessionState) {
        match &state.last_error {
            Some(error) => warn!(
                phase = %state.phase,
                vehicle_id = ?state.unit_id.as_ref().map(|id| id.as_str()),
                error = %error,
                "Tracking status"
            ),
            None => info!(
                phase = %state.phase,
                vehicle_id = ?state.unit_id.as_ref().map(|id| id.as_str()),
                session_id = ?state.session_id.map(|id| id.to_string()),
                started_at = state.started_at.map(|t| t.as_millis()),
                permission = %state.permission_status,
                lat = state.last_sample.map(|s| s.latitude()),
                lon = state.last_sample.map(|s| s.longitude()),
                last_sent = state.last_send_timestamp.map(|t| t.as_millis()),
                "Tracking status"
            ),
        }
    }
}

/// Prints the driver dashboard to stdout on every update.
#[derive(Debug, Default, Clone, Copy)]
pub struct DashboardSink;

impl StatusSink for DashboardSink {
    fn on_update(&self, state: &SessionState) {
        println!("{}", Dashboard(state));
    }
}

/// Render the driver dashboard as plain text.
pub fn render_dashboard(state: &SessionState) -> String {
    Dashboard(state).to_string()
}

/// The driver dashboard for one snapshot.
#[derive(Debug, Clone, Copy)]
pub struct Dashboard<'a>(pub &'a SessionState);

impl fmt::Display for Dashboard<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.0;

        let vehicle = state.unit_id.as_ref().map_or("-", |id| id.as_str());
        writeln!(f, "Vehicle {vehicle}")?;
        if state.tracking_enabled {
            writeln!(f, "Tracking Active")?;
        } else {
            writeln!(f, "Tracking Inactive")?;
        }

        match &state.last_sample {
            Some(sample) => {
                writeln!(f, "Lat: {:.6}", sample.latitude())?;
                writeln!(f, "Lon: {:.6}", sample.longitude())?;
            }
            None => writeln!(f, "No location data")?,
        }
        let speed = state.last_sample.map_or(0, |sample| sample.speed_kmh());
        writeln!(f, "Speed: {speed} km/h")?;

        let last_update = state
            .last_send_timestamp
            .map_or_else(|| "Never".to_string(), format_local_time);
        writeln!(f, "Last Update: {last_update}")?;

        let connection = match state.connectivity() {
            Connectivity::NeverSent => "Waiting",
            Connectivity::Healthy => "Connected",
            Connectivity::Error => "Error",
        };
        write!(f, "Connection: {connection}")?;

        if let Some(error) = &state.last_error {
            write!(f, "\n{error}")?;
        }

        Ok(())
    }
}

fn format_local_time(at: EpochMillis) -> String {
    DateTime::<Utc>::from_timestamp_millis(at.as_millis())
        .map(|utc| utc.with_timezone(&Local).format("%H:%M:%S").to_string())
        .unwrap_or_else(|| at.to_string())
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::sample::Sample;
    use crate::state_machine::session::Phase;
    use crate::unit::UnitId;

    #[derive(Clone, Default)]
    struct Recorder(Arc<Mutex<Vec<Phase>>>);

    impl StatusSink for Recorder {
        fn on_update(&self, state: &SessionState) {
            self.0.lock().unwrap().push(state.phase);
        }
    }

    #[test]
    fn test_tuple_sink_fans_out() {
        let first = Recorder::default();
        let second = Recorder::default();
        let sink = (first.clone(), LogSink, second.clone());

        sink.on_update(&SessionState::default());

        assert_eq!(*first.0.lock().unwrap(), vec![Phase::Idle]);
        assert_eq!(*second.0.lock().unwrap(), vec![Phase::Idle]);
    }

    #[test]
    fn test_render_idle() {
        let rendered = render_dashboard(&SessionState::default());

        assert!(rendered.contains("Tracking Inactive"));
        assert!(rendered.contains("No location data"));
        assert!(rendered.contains("Speed: 0 km/h"));
        assert!(rendered.contains("Last Update: Never"));
        assert!(rendered.contains("Connection: Waiting"));
    }

    #[test]
    fn test_dashboard_display_matches_render() {
        let state = SessionState {
            tracking_enabled: true,
            unit_id: Some(UnitId::parse("BUS-1").unwrap()),
            ..Default::default()
        };

        let rendered = format!("{}", Dashboard(&state));
        assert_eq!(rendered, render_dashboard(&state));
        assert_eq!(
            rendered,
            "Vehicle BUS-1\nTracking Active\nNo location data\nSpeed: 0 km/h\nLast Update: Never\nConnection: Waiting"
        );
    }

    #[test]
    fn test_render_active_with_error() {
        let state = SessionState {
            phase: Phase::Active,
            tracking_enabled: true,
            unit_id: Some(UnitId::parse("BUS-1").unwrap()),
            last_sample: Some(Sample::new(
                1.0,
                2.123_456_789,
                Some(10.0),
                EpochMillis::from_millis(0),
            )),
            last_error: Some("HTTP error! status: 500".to_string()),
            ..Default::default()
        };

        let rendered = render_dashboard(&state);
        assert!(rendered.starts_with("Vehicle BUS-1\nTracking Active"));
        assert!(rendered.contains("Lat: 1.000000"));
        assert!(rendered.contains("Lon: 2.123457"));
        assert!(rendered.contains("Speed: 36 km/h"));
        assert!(rendered.contains("Connection: Error"));
        assert!(rendered.ends_with("HTTP error! status: 500"));
    }
}
