//! The tracking session state machine.
//!
//! `Idle -> AwaitingPermission -> Active -> Idle`, with `AwaitingPermission -> Idle` when the
//! permission gate refuses. All I/O is requested through [`SessionOutput`] effects and the
//! results come back as [`SessionInput`]; see [`crate::controller`] for the runner.

use std::collections::VecDeque;
use std::fmt;

use uuid::Uuid;

use super::StateMachine;
use crate::permission::{PermissionError, PermissionStatus};
use crate::position::PositionError;
use crate::sample::{EpochMillis, Sample};
use crate::transmission::TransmissionError;
use crate::unit::UnitId;

/// Identifies one start of tracking, for correlating log lines.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Tags every effect so results arriving after a stop (or a stop and restart) can be told apart
/// from results belonging to the current session.
#[derive(Debug, Clone, Copy, Default, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct Generation(u64);

impl Generation {
    fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Phase {
    #[default]
    Idle,
    AwaitingPermission,
    Active,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Idle => "idle",
            Phase::AwaitingPermission => "awaiting permission",
            Phase::Active => "active",
        };
        f.write_str(name)
    }
}

/// Health of the link to the collection endpoint, as shown to the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connectivity {
    /// Nothing delivered yet and nothing failed.
    NeverSent,
    /// The most recent tick completed without error.
    Healthy,
    /// The most recent tick failed.
    Error,
}

/// Observable state of the session, handed to status sinks as a snapshot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionState {
    pub phase: Phase,
    /// True exactly while a repeating timer is armed.
    pub tracking_enabled: bool,
    pub unit_id: Option<UnitId>,
    pub session_id: Option<SessionId>,
    pub started_at: Option<EpochMillis>,
    pub last_sample: Option<Sample>,
    /// Wall-clock time of the last acknowledged delivery. Never moves backwards.
    pub last_send_timestamp: Option<EpochMillis>,
    pub permission_status: PermissionStatus,
    pub last_error: Option<String>,
}

impl SessionState {
    pub fn connectivity(&self) -> Connectivity {
        match (&self.last_error, self.last_send_timestamp) {
            (Some(_), _) => Connectivity::Error,
            (None, Some(_)) => Connectivity::Healthy,
            (None, None) => Connectivity::NeverSent,
        }
    }
}

/// How a start attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// Permission was granted and the immediate first tick has completed.
    Active,
    /// The permission gate refused; the session is back to idle.
    Refused(PermissionError),
    /// Stopped before the first tick completed.
    Cancelled,
}

#[derive(Debug)]
pub enum SessionInput {
    Start {
        unit_id: UnitId,
        session_id: SessionId,
        started_at: EpochMillis,
    },
    PermissionResolved {
        generation: Generation,
        result: Result<PermissionStatus, PermissionError>,
    },
    TimerFired {
        generation: Generation,
    },
    FixResolved {
        generation: Generation,
        result: Result<Sample, PositionError>,
    },
    SendResolved {
        generation: Generation,
        result: Result<(), TransmissionError>,
        completed_at: EpochMillis,
    },
    Stop,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionOutput {
    /// The state changed; publish the snapshot.
    Status(SessionState),
    AcquirePermission {
        generation: Generation,
    },
    /// Arm the repeating timer. Its first firing is one period away.
    ArmTimer {
        generation: Generation,
    },
    DisarmTimer {
        generation: Generation,
    },
    FetchPosition {
        generation: Generation,
    },
    Transmit {
        generation: Generation,
        unit_id: UnitId,
        sample: Sample,
    },
    /// A start was requested while the session was not idle. Nothing changed.
    StartRejected {
        phase: Phase,
    },
    StartSettled {
        outcome: StartOutcome,
    },
}

/// The session controller logic.
///
/// At most one timer is armed at any time, and it is armed exactly while tracking is enabled.
/// Ticks never overlap: a timer firing while the previous tick is still in flight is skipped.
#[derive(Debug, Default)]
pub struct SessionMachine {
    state: SessionState,
    generation: Generation,
    armed: Option<Generation>,
    tick_in_flight: bool,
    start_pending: bool,
    outputs: VecDeque<SessionOutput>,
}

impl SessionMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn phase(&self) -> Phase {
        self.state.phase
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// The generation of the armed timer, if any.
    pub fn armed_timer(&self) -> Option<Generation> {
        self.armed
    }

    pub fn tick_in_flight(&self) -> bool {
        self.tick_in_flight
    }

    fn is_current(&self, generation: Generation, phase: Phase) -> bool {
        generation == self.generation && self.state.phase == phase
    }

    fn publish(&mut self) {
        self.outputs
            .push_back(SessionOutput::Status(self.state.clone()));
    }

    fn settle(&mut self, outcome: StartOutcome) {
        if std::mem::take(&mut self.start_pending) {
            self.outputs
                .push_back(SessionOutput::StartSettled { outcome });
        }
    }

    fn start(&mut self, unit_id: UnitId, session_id: SessionId, started_at: EpochMillis) {
        if self.state.phase != Phase::Idle {
            self.outputs.push_back(SessionOutput::StartRejected {
                phase: self.state.phase,
            });
            return;
        }

        self.generation = self.generation.next();
        self.start_pending = true;
        self.state = SessionState {
            phase: Phase::AwaitingPermission,
            unit_id: Some(unit_id),
            session_id: Some(session_id),
            started_at: Some(started_at),
            permission_status: self.state.permission_status,
            ..SessionState::default()
        };

        self.publish();
        self.outputs.push_back(SessionOutput::AcquirePermission {
            generation: self.generation,
        });
    }

    fn permission_resolved(
        &mut self,
        generation: Generation,
        result: Result<PermissionStatus, PermissionError>,
    ) {
        if !self.is_current(generation, Phase::AwaitingPermission) {
            return;
        }

        match result {
            Ok(status) => {
                self.state.permission_status = status;
                self.state.phase = Phase::Active;
                self.state.tracking_enabled = true;
                self.state.last_error = None;
                self.armed = Some(generation);
                self.tick_in_flight = true;

                self.outputs
                    .push_back(SessionOutput::ArmTimer { generation });
                self.publish();
                self.outputs
                    .push_back(SessionOutput::FetchPosition { generation });
            }
            Err(err) => {
                if err == PermissionError::Denied {
                    self.state.permission_status = PermissionStatus::Denied;
                }
                self.state.phase = Phase::Idle;
                self.state.tracking_enabled = false;
                self.state.last_error = Some(err.to_string());

                self.publish();
                self.settle(StartOutcome::Refused(err));
            }
        }
    }

    fn timer_fired(&mut self, generation: Generation) {
        if !self.is_current(generation, Phase::Active) || self.tick_in_flight {
            return;
        }

        self.tick_in_flight = true;
        self.outputs
            .push_back(SessionOutput::FetchPosition { generation });
    }

    fn fix_resolved(&mut self, generation: Generation, result: Result<Sample, PositionError>) {
        if !self.is_current(generation, Phase::Active) || !self.tick_in_flight {
            return;
        }

        match result {
            Ok(sample) => {
                self.state.last_sample = Some(sample);
                self.publish();

                let Some(unit_id) = self.state.unit_id.clone() else {
                    return self.finish_tick();
                };
                self.outputs.push_back(SessionOutput::Transmit {
                    generation,
                    unit_id,
                    sample,
                });
            }
            Err(err) => {
                self.state.last_error = Some(err.to_string());
                self.publish();
                self.finish_tick();
            }
        }
    }

    fn send_resolved(
        &mut self,
        generation: Generation,
        result: Result<(), TransmissionError>,
        completed_at: EpochMillis,
    ) {
        if !self.is_current(generation, Phase::Active) || !self.tick_in_flight {
            return;
        }

        match result {
            Ok(()) => {
                self.state.last_error = None;
                self.state.last_send_timestamp = Some(
                    self.state
                        .last_send_timestamp
                        .map_or(completed_at, |previous| previous.max(completed_at)),
                );
            }
            Err(err) => {
                self.state.last_error = Some(err.to_string());
            }
        }

        self.publish();
        self.finish_tick();
    }

    fn finish_tick(&mut self) {
        self.tick_in_flight = false;
        self.settle(StartOutcome::Active);
    }

    fn stop(&mut self) {
        if self.state.phase == Phase::Idle {
            return;
        }

        if let Some(generation) = self.armed.take() {
            self.outputs
                .push_back(SessionOutput::DisarmTimer { generation });
        }

        // Anything still in flight now carries a stale generation.
        self.generation = self.generation.next();
        self.tick_in_flight = false;
        self.state = SessionState::default();

        self.publish();
        self.settle(StartOutcome::Cancelled);
    }
}

impl StateMachine for SessionMachine {
    type Input = SessionInput;
    type Output = SessionOutput;

    fn process_input(&mut self, input: Self::Input) {
        match input {
            SessionInput::Start {
                unit_id,
                session_id,
                started_at,
            } => self.start(unit_id, session_id, started_at),
            SessionInput::PermissionResolved { generation, result } => {
                self.permission_resolved(generation, result)
            }
            SessionInput::TimerFired { generation } => self.timer_fired(generation),
            SessionInput::FixResolved { generation, result } => {
                self.fix_resolved(generation, result)
            }
            SessionInput::SendResolved {
                generation,
                result,
                completed_at,
            } => self.send_resolved(generation, result, completed_at),
            SessionInput::Stop => self.stop(),
        }
    }

    fn poll_output(&mut self) -> Option<Self::Output> {
        self.outputs.pop_front()
    }
}
