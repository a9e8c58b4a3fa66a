use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use chrono::Utc;
use futures_util::FutureExt;
use tokio::time::{sleep, Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::gatt::Central;
use crate::reading::Reading;
use crate::rpc_client::RpcClient;
use crate::sink::ReadingSink;

/// Exponential backoff applied after failed poll cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub max: Duration,
    /// After this many failures in a row, wait `max` once and start counting again.
    pub max_consecutive_failures: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(5),
            max: Duration::from_secs(300),
            max_consecutive_failures: 10,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Backoff {
    policy: BackoffPolicy,
    failures: u32,
}

impl Backoff {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self { policy, failures: 0 }
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }

    pub fn reset(&mut self) {
        self.failures = 0;
    }

    /// Record a failure and return how long to wait before the next attempt:
    /// `base * 2^(failures - 1)` capped at `max`.
    pub fn on_failure(&mut self) -> Duration {
        self.failures += 1;
        if self.failures >= self.policy.max_consecutive_failures {
            self.failures = 0;
            return self.policy.max;
        }

        2u32.checked_pow(self.failures - 1)
            .and_then(|factor| self.policy.base.checked_mul(factor))
            .map_or(self.policy.max, |delay| delay.min(self.policy.max))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PollSettings {
    /// Target time from the start of one successful cycle to the start of the next.
    pub interval: Duration,
    pub call_timeout: Duration,
    /// Pause before the very first cycle.
    pub startup_delay: Duration,
    pub backoff: BackoffPolicy,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            call_timeout: Duration::from_secs(5),
            startup_delay: Duration::from_secs(5),
            backoff: BackoffPolicy::default(),
        }
    }
}

/// Polls one device forever, handing each reading to a sink.
///
/// A cycle never ends the loop: device errors, storage errors and even panics
/// are logged and turned into a backoff delay.
pub struct Poller<C: Central, S: ReadingSink> {
    client: Arc<RpcClient<C>>,
    sink: S,
    settings: PollSettings,
    backoff: Backoff,
}

impl<C: Central, S: ReadingSink> Poller<C, S> {
    pub fn new(client: Arc<RpcClient<C>>, sink: S, settings: PollSettings) -> Self {
        Self { client, sink, backoff: Backoff::new(settings.backoff), settings }
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.backoff.failures()
    }

    pub async fn run(&mut self) {
        sleep(self.settings.startup_delay).await;
        loop {
            let delay = self.cycle().await;
            if !delay.is_zero() {
                sleep(delay).await;
            }
        }
    }

    /// Run one collect-and-persist cycle and return how long to sleep afterwards.
    pub async fn cycle(&mut self) -> Duration {
        let started = Instant::now();

        let outcome = AssertUnwindSafe(self.collect_and_persist()).catch_unwind().await;
        match outcome {
            Ok(Ok(reading)) => {
                self.backoff.reset();
                info!(address = %reading.device_mac, "data collected: {}", reading.summary());

                let elapsed = started.elapsed();
                match self.settings.interval.checked_sub(elapsed) {
                    Some(remaining) if !remaining.is_zero() => {
                        debug!(?elapsed, ?remaining, "cycle complete");
                        remaining
                    }
                    _ => {
                        warn!(?elapsed, interval = ?self.settings.interval, "cycle took longer than the poll interval");
                        Duration::ZERO
                    }
                }
            }
            Ok(Err(err)) => {
                warn!(kind = err.kind(), error = %err, "failed to collect data");
                self.failed()
            }
            Err(panic) => {
                error!(panic = panic_message(panic.as_ref()), "poll cycle panicked");
                // The exchange may have been cut off halfway.
                self.client.disconnect().await;
                self.failed()
            }
        }
    }

    async fn collect_and_persist(&self) -> Result<Reading> {
        let status = self.client.get_status(self.settings.call_timeout).await?;
        let reading = Reading::from_status(self.client.address(), Utc::now(), &status);

        // Losing one reading is acceptable, stopping the service is not.
        if let Err(err) = self.sink.append(&reading) {
            error!(kind = err.kind(), error = %err, "failed to save reading");
        }

        Ok(reading)
    }

    fn failed(&mut self) -> Duration {
        let delay = self.backoff.on_failure();
        if self.backoff.failures() == 0 {
            error!(
                failures = self.settings.backoff.max_consecutive_failures,
                ?delay,
                "too many consecutive failures, will continue retrying"
            );
        } else {
            info!(
                attempt = self.backoff.failures(),
                of = self.settings.backoff.max_consecutive_failures,
                ?delay,
                "waiting before retry"
            );
        }
        delay
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}
