//! Delivery of samples to the remote collection endpoint.

pub mod error;
pub mod http;

use std::future::Future;

use serde::{Deserialize, Serialize};

pub use self::error::TransmissionError;
pub use self::http::{HttpChannel, HttpChannelConfig};
use crate::sample::Sample;
use crate::unit::UnitId;

/// The JSON body posted for every sample.
///
/// `ts` is the capture time of the sample, not the time it was sent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub vehicle_id: String,
    pub lat: f64,
    pub lon: f64,
    pub speed: f64,
    pub ts: i64,
}

impl Envelope {
    pub fn new(unit_id: &UnitId, sample: &Sample) -> Self {
        Self {
            vehicle_id: unit_id.as_str().to_string(),
            lat: sample.latitude(),
            lon: sample.longitude(),
            speed: sample.speed_mps(),
            ts: sample.captured_at().as_millis(),
        }
    }
}

/// Delivers one sample per call. No retries, no queueing.
pub trait TransmissionChannel: Send + Sync + 'static {
    fn send(
        &self,
        unit_id: &UnitId,
        sample: &Sample,
    ) -> impl Future<Output = Result<(), TransmissionError>> + Send;
}
