//! Position fixes from a local gpsd daemon.
//!
//! Speaks the gpsd JSON protocol: after connecting, the client enables watcher mode and gpsd
//! streams newline-delimited reports tagged by `class`. The first `TPV` report carrying a 2D or
//! 3D fix becomes a [`Sample`].

use std::sync::Mutex;
use std::time::Duration;

use async_stream::stream;
use futures::{Stream, StreamExt};
use serde::Deserialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::{debug, trace};

use super::{CapabilityCheck, PositionError, PositionSource};
use crate::sample::{EpochMillis, Sample};
use crate::state_machine::wrappers::input::system::SystemResource;

/// Default address of the gpsd control socket.
pub const DEFAULT_GPSD_ADDR: &str = "127.0.0.1:2947";

/// Enables JSON watcher mode on a gpsd connection.
pub const WATCH_COMMAND: &[u8] = b"?WATCH={\"enable\":true,\"json\":true};\n";

const AVAILABILITY_TIMEOUT: Duration = Duration::from_secs(2);

/// gpsd `mode` value for a two dimensional fix; `3` is a 3D fix, lower values carry no position.
const MODE_2D: u8 = 2;

/// The subset of gpsd reports the source understands.
#[derive(Debug, Deserialize)]
#[serde(tag = "class")]
pub enum Report {
    #[serde(rename = "VERSION")]
    Version(VersionReport),
    #[serde(rename = "TPV")]
    Tpv(TpvReport),
    #[serde(rename = "ERROR")]
    Error(ErrorReport),
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
pub struct VersionReport {
    pub release: String,
    #[serde(default)]
    pub proto_major: u32,
}

/// Sent by gpsd when it cannot serve a request, e.g. the receiver device failed to open.
#[derive(Debug, Deserialize)]
pub struct ErrorReport {
    pub message: String,
}

/// Time-position-velocity report.
#[derive(Debug, Default, Deserialize)]
pub struct TpvReport {
    pub device: Option<String>,
    #[serde(default)]
    pub mode: u8,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    /// Speed over ground in m/s, absent when the receiver does not know it.
    pub speed: Option<f64>,
}

impl TpvReport {
    /// Convert into a sample captured at `at`, if the report carries a usable fix.
    pub fn to_sample(&self, at: EpochMillis) -> Option<Sample> {
        if self.mode < MODE_2D {
            return None;
        }

        let (lat, lon) = (self.lat?, self.lon?);
        (lat.is_finite() && lon.is_finite()).then(|| Sample::new(lat, lon, self.speed, at))
    }
}

/// Decode newline-delimited gpsd reports from `reader`.
///
/// Lines that are not valid reports are skipped. The stream ends at EOF or after yielding a
/// read error.
pub fn reports<R>(reader: R) -> impl Stream<Item = Result<Report, PositionError>>
where
    R: AsyncBufRead + Unpin,
{
    stream! {
        let mut lines = reader.lines();
        loop {
            match lines.next_line().await {
                Ok(Some(raw)) => {
                    let line = raw.trim();
                    if line.is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<Report>(line) {
                        Ok(report) => {
                            yield Ok(report);
                        }
                        Err(e) => {
                            debug!(error = %e, "Skipping malformed gpsd report");
                        }
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    yield Err(PositionError::unavailable(format!("gpsd read failed: {e}")));
                    break;
                }
            }
        }
    }
}

/// A [`PositionSource`] backed by gpsd.
///
/// Each fetch opens a short-lived watcher connection. The last fix is kept so that a request
/// allowing a non-zero `max_age` can be answered without touching the daemon.
#[derive(Debug)]
pub struct GpsdSource {
    addr: String,
    last_fix: Mutex<Option<Sample>>,
}

impl GpsdSource {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            last_fix: Mutex::new(None),
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    fn cached_fix(&self, max_age: Duration, now: EpochMillis) -> Option<Sample> {
        if max_age.is_zero() {
            return None;
        }

        let cached = (*self.last_fix.lock().expect("gpsd fix cache lock poisoned"))?;
        cached
            .captured_at()
            .elapsed_until(now)
            .filter(|age| *age <= max_age)
            .map(|_| cached)
    }

    async fn connect(&self) -> Result<TcpStream, PositionError> {
        TcpStream::connect(&self.addr).await.map_err(|e| {
            PositionError::unavailable(format!("gpsd at {} unreachable: {e}", self.addr))
        })
    }

    async fn read_fix(&self) -> Result<Sample, PositionError> {
        let (reader, mut writer) = self.connect().await?.into_split();
        writer
            .write_all(WATCH_COMMAND)
            .await
            .map_err(|e| PositionError::unavailable(format!("gpsd write failed: {e}")))?;

        let reports = reports(BufReader::new(reader));
        tokio::pin!(reports);

        while let Some(report) = reports.next().await {
            match report? {
                Report::Tpv(tpv) => match tpv.to_sample(EpochMillis::generate()) {
                    Some(sample) => return Ok(sample),
                    None => trace!(mode = tpv.mode, device = ?tpv.device, "Waiting for fix"),
                },
                Report::Version(version) => {
                    trace!(release = %version.release, "gpsd watcher connected");
                }
                Report::Error(error) => {
                    return Err(PositionError::Acquisition {
                        message: error.message,
                    });
                }
                Report::Other => {}
            }
        }

        Err(PositionError::unavailable("gpsd closed the connection"))
    }
}

impl PositionSource for GpsdSource {
    async fn fetch_current(
        &self,
        timeout: Duration,
        max_age: Duration,
    ) -> Result<Sample, PositionError> {
        if let Some(sample) = self.cached_fix(max_age, EpochMillis::generate()) {
            trace!("Reusing cached gpsd fix");
            return Ok(sample);
        }

        let sample = tokio::time::timeout(timeout, self.read_fix())
            .await
            .map_err(|_| PositionError::Timeout { after: timeout })??;

        *self.last_fix.lock().expect("gpsd fix cache lock poisoned") = Some(sample);

        debug!(
            lat = sample.latitude(),
            lon = sample.longitude(),
            speed = sample.speed_mps(),
            "gpsd fix"
        );
        Ok(sample)
    }
}

impl CapabilityCheck for GpsdSource {
    async fn is_available(&self) -> bool {
        let check = async {
            let reports = reports(BufReader::new(self.connect().await?));
            tokio::pin!(reports);

            match reports.next().await {
                Some(Ok(Report::Version(version))) => {
                    debug!(
                        addr = %self.addr,
                        release = %version.release,
                        proto_major = version.proto_major,
                        "gpsd available"
                    );
                    Ok(true)
                }
                _ => Ok::<_, PositionError>(false),
            }
        };

        match tokio::time::timeout(AVAILABILITY_TIMEOUT, check).await {
            Ok(Ok(available)) => available,
            Ok(Err(e)) => {
                debug!(error = %e, "gpsd availability check failed");
                false
            }
            Err(_) => {
                debug!(addr = %self.addr, "gpsd availability check timed out");
                false
            }
        }
    }
}
