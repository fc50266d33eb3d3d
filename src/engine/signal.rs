// Stress signal polling.
// A worker thread performs the (blocking) fetches; the render loop only
// ever touches channels with try_* calls, so a slow or dead endpoint costs
// the frame nothing. At most one request is in flight at a time.

use std::sync::mpsc::{self, Receiver, SyncSender, TryRecvError, TrySendError};
use std::thread;
use std::time::Duration;

use serde::Deserialize;

use super::behavior::SignalReading;
use super::error::SignalError;

/// Anything that can produce one stress value on demand.
pub trait SignalSource: Send + 'static {
    fn fetch(&mut self) -> Result<f32, SignalError>;
}

// ============================================================================
// HTTP SOURCE
// ============================================================================

#[derive(Debug, Deserialize)]
struct StressPayload {
    overall_average_stress: Option<f32>,
}

/// Parse the endpoint's JSON body into a stress value.
pub fn parse_payload(body: &str) -> Result<f32, SignalError> {
    let payload: StressPayload =
        serde_json::from_str(body).map_err(|e| SignalError::Payload(e.to_string()))?;
    let value = payload
        .overall_average_stress
        .ok_or_else(|| SignalError::Payload("missing overall_average_stress".into()))?;
    if value.is_finite() { Ok(value) } else { Err(SignalError::NotFinite(value)) }
}

/// GET `url`, expecting `{"overall_average_stress": <number>}`.
pub struct HttpStressSource {
    client: reqwest::blocking::Client,
    url:    String,
}

impl HttpStressSource {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, SignalError> {
        let client = reqwest::blocking::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, url: url.into() })
    }
}

impl SignalSource for HttpStressSource {
    fn fetch(&mut self) -> Result<f32, SignalError> {
        let response = self.client.get(&self.url).send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(SignalError::Status(status));
        }
        parse_payload(&response.text()?)
    }
}

// ============================================================================
// POLLER
// ============================================================================

/// Log the first failure of a streak, then every Nth.
const FAILURE_LOG_EVERY: u32 = 100;

pub struct SignalPoller {
    requests:  SyncSender<()>,
    readings:  Receiver<SignalReading>,
    in_flight: bool,
}

impl SignalPoller {
    pub fn spawn(mut source: impl SignalSource) -> Self {
        let (requests, request_rx) = mpsc::sync_channel::<()>(1);
        let (reading_tx, readings) = mpsc::channel();

        thread::Builder::new()
            .name("stress-signal".into())
            .spawn(move || {
                let mut failures = 0u32;
                // Ends when the poller (and its request sender) is dropped.
                for () in request_rx {
                    let reading = match source.fetch() {
                        Ok(value) => {
                            if failures > 0 {
                                log::info!("stress signal recovered after {failures} failed fetches");
                            }
                            failures = 0;
                            log::debug!("overall average stress: {value}");
                            SignalReading::Value(value)
                        }
                        Err(err) => {
                            if failures % FAILURE_LOG_EVERY == 0 {
                                log::warn!("stress signal unavailable ({err}); keeping last parameters");
                            }
                            failures = failures.wrapping_add(1);
                            SignalReading::Unavailable
                        }
                    };
                    if reading_tx.send(reading).is_err() {
                        break;
                    }
                }
            })
            .map(|_detached| ())
            .unwrap_or_else(|e| log::error!("failed to start stress signal worker: {e}"));

        Self { requests, readings, in_flight: false }
    }

    /// Never blocks. Returns the newest reading completed since the last
    /// call, then asks for another one if nothing is outstanding.
    pub fn poll(&mut self) -> Option<SignalReading> {
        let mut latest = None;
        loop {
            match self.readings.try_recv() {
                Ok(reading) => {
                    self.in_flight = false;
                    latest = Some(reading);
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.in_flight = true;
                    return latest;
                }
            }
        }

        if !self.in_flight {
            match self.requests.try_send(()) {
                Ok(()) => self.in_flight = true,
                Err(TrySendError::Full(())) | Err(TrySendError::Disconnected(())) => {}
            }
        }
        latest
    }
}
