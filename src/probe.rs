//! Readiness probing
//!
//! Each service with a declared health URL is polled on a fixed interval
//! up to a bounded attempt count. A 2xx response means ready; exhausting
//! the bound yields [`ProbeOutcome::TimedOut`], which is a warning rather
//! than an error: a service may simply not expose the expected health
//! surface, and the run prefers attempting the real work over blocking on
//! an optional signal. The probe cannot tell a crashed service from one
//! that never exposed health; both time out.

use serde::Serialize;
use std::fmt;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Polling parameters. Injectable so tests run in milliseconds.
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    pub interval: Duration,
    pub max_attempts: u32,
    pub request_timeout: Duration,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            max_attempts: 30,
            request_timeout: Duration::from_secs(3),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ProbeOutcome {
    Ready { attempts: u32 },
    TimedOut { attempts: u32 },
}

impl ProbeOutcome {
    pub fn is_ready(&self) -> bool {
        matches!(self, ProbeOutcome::Ready { .. })
    }
}

impl fmt::Display for ProbeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeOutcome::Ready { attempts } => write!(f, "ready after {} attempt(s)", attempts),
            ProbeOutcome::TimedOut { attempts } => {
                write!(f, "timed out after {} attempts", attempts)
            }
        }
    }
}

pub struct ReadinessProber {
    client: reqwest::Client,
    config: ProbeConfig,
}

impl ReadinessProber {
    pub fn new(config: ProbeConfig) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self { client, config })
    }

    /// Polls `url` until it answers 2xx or the attempt bound is exhausted.
    /// An outer deadline of `interval * max_attempts` caps the total wait
    /// even if individual requests stall.
    pub async fn wait_ready(&self, service: &str, url: &str) -> ProbeOutcome {
        let deadline = self.config.interval * self.config.max_attempts;
        debug!(service, url, ?deadline, "starting readiness probe");

        let outcome = match tokio::time::timeout(deadline, self.poll(service, url)).await {
            Ok(outcome) => outcome,
            Err(_) => ProbeOutcome::TimedOut {
                attempts: self.config.max_attempts,
            },
        };

        match outcome {
            ProbeOutcome::Ready { attempts } => {
                info!(service, attempts, "service is ready");
            }
            ProbeOutcome::TimedOut { attempts } => {
                warn!(
                    service,
                    url, attempts, "service not ready within bound; continuing anyway"
                );
            }
        }
        outcome
    }

    async fn poll(&self, service: &str, url: &str) -> ProbeOutcome {
        for attempt in 1..=self.config.max_attempts {
            match self.client.get(url).send().await {
                Ok(response) if response.status().is_success() => {
                    return ProbeOutcome::Ready { attempts: attempt };
                }
                Ok(response) => {
                    debug!(service, attempt, status = %response.status(), "health answered non-2xx");
                }
                Err(e) => {
                    debug!(service, attempt, error = %e, "health not reachable");
                }
            }
            if attempt < self.config.max_attempts {
                sleep(self.config.interval).await;
            }
        }
        ProbeOutcome::TimedOut {
            attempts: self.config.max_attempts,
        }
    }
}
