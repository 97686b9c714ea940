//! Error types for sample delivery.

/// A failed delivery. The sample is dropped; the next tick sends a fresh one.
#[derive(Debug, thiserror::Error)]
pub enum TransmissionError {
    /// The endpoint answered with a non-2xx status.
    #[error("HTTP error! status: {status}")]
    Status { status: u16 },

    /// DNS, connect, TLS or timeout failure before a status was received.
    #[error("Failed to send location: {0}")]
    Network(#[from] reqwest::Error),
}

impl TransmissionError {
    /// The HTTP status returned by the endpoint, if one was received.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            TransmissionError::Status { status } => Some(*status),
            TransmissionError::Network(e) => e.status().map(|status| status.as_u16()),
        }
    }
}
