use std::time::Duration;

use bon::Builder;
use tracing::{debug, warn};
use url::Url;

use super::{Envelope, TransmissionChannel, TransmissionError};
use crate::sample::Sample;
use crate::unit::UnitId;

/// Upper bound on one POST, connect included.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Configuration for the [`HttpChannel`].
#[derive(Debug, Clone, Builder)]
pub struct HttpChannelConfig {
    /// URL every envelope is POSTed to.
    pub endpoint: Url,

    #[builder(default = DEFAULT_REQUEST_TIMEOUT)]
    pub timeout: Duration,

    #[builder(default = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")).to_string())]
    pub user_agent: String,
}

/// A [`TransmissionChannel`] posting JSON envelopes with reqwest.
///
/// Any 2xx status counts as delivered. The response body is ignored.
#[derive(Debug, Clone)]
pub struct HttpChannel {
    client: reqwest::Client,
    endpoint: Url,
}

impl HttpChannel {
    pub fn new(config: HttpChannelConfig) -> Result<Self, TransmissionError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent)
            .build()?;

        Ok(Self {
            client,
            endpoint: config.endpoint,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

impl TransmissionChannel for HttpChannel {
    async fn send(&self, unit_id: &UnitId, sample: &Sample) -> Result<(), TransmissionError> {
        let envelope = Envelope::new(unit_id, sample);

        let response = match self
            .client
            .post(self.endpoint.clone())
            .json(&envelope)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!(
                    url = %self.endpoint,
                    error = %e,
                    is_connect = e.is_connect(),
                    is_timeout = e.is_timeout(),
                    "Location POST failed"
                );
                return Err(e.into());
            }
        };

        let status = response.status();
        if !status.is_success() {
            warn!(
                url = %self.endpoint,
                status = status.as_u16(),
                vehicle_id = %unit_id,
                "Endpoint rejected location"
            );
            return Err(TransmissionError::Status {
                status: status.as_u16(),
            });
        }

        debug!(
            url = %self.endpoint,
            status = status.as_u16(),
            vehicle_id = %unit_id,
            ts = envelope.ts,
            "Location delivered"
        );
        Ok(())
    }
}
