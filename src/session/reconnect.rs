//! # Auto-Reconnect
//!
//! A cancellable background task that reattaches to the stored printer
//! whenever the session is idle.
//!
//! Each tick checks the session first: a tick only calls
//! [`PrinterSession::connect_to_stored`] while the state is `Disconnected`
//! and a printer is stored, so it never races a manual `connect()`.
//! Failures are logged and retried on a later tick.
//!
//! The default policy retries every 15 s forever. Exponential backoff and
//! an attempt cap are opt-in:
//!
//! ```
//! use std::time::Duration;
//! use blethermal::session::{Backoff, ReconnectPolicy};
//!
//! let policy = ReconnectPolicy {
//!     interval: Duration::from_secs(5),
//!     backoff: Backoff::Exponential { factor: 2.0, max: Duration::from_secs(60) },
//!     max_attempts: Some(10),
//! };
//! assert_eq!(policy.delay(0), Duration::from_secs(5));
//! assert_eq!(policy.delay(2), Duration::from_secs(20));
//! assert_eq!(policy.delay(8), Duration::from_secs(60));
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::{ConnectionState, PrinterSession};
use crate::config::duration_ms;
use crate::error::{PrinterError, Result};

/// Default tick interval.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(15);

/// How the wait grows after consecutive failed attempts.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Backoff {
    /// Always wait `interval`.
    #[default]
    Fixed,
    /// `interval × factor^failures`, capped at `max`.
    Exponential {
        factor: f64,
        #[serde(rename = "maxMs", with = "duration_ms")]
        max: Duration,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct ReconnectPolicy {
    #[serde(rename = "intervalMs", with = "duration_ms")]
    pub interval: Duration,
    pub backoff: Backoff,
    /// Stop after this many consecutive failures. `None` retries forever.
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::every(DEFAULT_INTERVAL)
    }
}

impl ReconnectPolicy {
    /// Fixed interval, no cap.
    pub fn every(interval: Duration) -> Self {
        Self {
            interval,
            backoff: Backoff::Fixed,
            max_attempts: None,
        }
    }

    /// Wait before the next tick after `failures` consecutive failures.
    pub fn delay(&self, failures: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed => self.interval,
            Backoff::Exponential { factor, max } => {
                let exp = failures.min(i32::MAX as u32) as i32;
                let secs = self.interval.as_secs_f64() * factor.powi(exp);
                if !secs.is_finite() || secs > max.as_secs_f64() {
                    max
                } else {
                    Duration::from_secs_f64(secs.max(0.0))
                }
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.interval.is_zero() {
            return Err(PrinterError::InvalidOptions(
                "reconnect interval must be positive".into(),
            ));
        }
        if let Backoff::Exponential { factor, max } = self.backoff {
            if !factor.is_finite() || factor < 1.0 {
                return Err(PrinterError::InvalidOptions(format!(
                    "backoff factor must be >= 1, got {}",
                    factor
                )));
            }
            if max < self.interval {
                return Err(PrinterError::InvalidOptions(
                    "backoff cap must not be below the interval".into(),
                ));
            }
        }
        if self.max_attempts == Some(0) {
            return Err(PrinterError::InvalidOptions(
                "max attempts must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Running reconnect task. Stops on [`stop`](Self::stop) or when dropped.
#[must_use = "dropping the handle stops auto-reconnect"]
#[derive(Debug)]
pub struct ReconnectHandle {
    token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl ReconnectHandle {
    /// Stop ticking. An attempt already in flight runs to completion.
    pub fn stop(&self) {
        self.token.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled() || self.task.as_ref().is_none_or(|t| t.is_finished())
    }

    /// Stop and wait for the task to exit.
    pub async fn shutdown(mut self) {
        self.token.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for ReconnectHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

impl PrinterSession {
    /// Spawn the reconnect loop. Requires a Tokio runtime.
    pub fn start_auto_reconnect(&self, policy: ReconnectPolicy) -> ReconnectHandle {
        let token = CancellationToken::new();
        let session = self.clone();
        let cancelled = token.clone();

        let task = tokio::spawn(async move {
            let mut failures: u32 = 0;
            tracing::debug!(interval = ?policy.interval, "Auto-reconnect started");

            loop {
                let wait = policy.delay(failures);
                tokio::select! {
                    _ = cancelled.cancelled() => break,
                    _ = tokio::time::sleep(wait) => {}
                }

                if session.state() != ConnectionState::Disconnected {
                    failures = 0;
                    continue;
                }
                if session.stored_device().is_none() {
                    continue;
                }

                match session.connect_to_stored().await {
                    Ok(Some(device)) => {
                        tracing::info!(device = %device, "Auto-reconnected");
                        failures = 0;
                    }
                    Ok(None) | Err(PrinterError::AlreadyConnecting) => {}
                    Err(e) => {
                        failures = failures.saturating_add(1);
                        if e.is_transient() {
                            tracing::warn!(attempt = failures, error = %e, "Reconnect failed");
                        } else {
                            tracing::error!(attempt = failures, error = %e, "Reconnect failed");
                        }
                        if policy.max_attempts.is_some_and(|max| failures >= max) {
                            tracing::warn!(attempts = failures, "Auto-reconnect giving up");
                            break;
                        }
                    }
                }
            }

            tracing::debug!("Auto-reconnect stopped");
        });

        ReconnectHandle {
            token,
            task: Some(task),
        }
    }
}
