use std::sync::Arc;
use std::time::Duration;

use toolsmith_core::RetrySettings;
use tracing::warn;

use crate::context::InstallContext;
use crate::error::InstallError;
use crate::process::{run_command, CommandOutcome, CommandRunner};

pub type Sleeper = Arc<dyn Fn(Duration) + Send + Sync>;

/// Retries a single command while its output looks like upstream throttling.
#[derive(Clone)]
pub struct RateLimitRetry {
    fingerprints: Vec<String>,
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    sleep: Sleeper,
}

impl std::fmt::Debug for RateLimitRetry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimitRetry")
            .field("fingerprints", &self.fingerprints)
            .field("max_attempts", &self.max_attempts)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .finish_non_exhaustive()
    }
}

impl RateLimitRetry {
    pub fn new(settings: &RetrySettings) -> Self {
        Self::with_sleeper(settings, Arc::new(std::thread::sleep))
    }

    pub fn with_sleeper(settings: &RetrySettings, sleep: Sleeper) -> Self {
        Self {
            fingerprints: settings
                .fingerprints
                .iter()
                .map(|value| value.to_ascii_lowercase())
                .filter(|value| !value.trim().is_empty())
                .collect(),
            max_attempts: settings.max_attempts.max(1),
            base_delay: Duration::from_secs(settings.base_delay_secs),
            max_delay: Duration::from_secs(settings.max_delay_secs),
            sleep,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn is_rate_limited(&self, outcome: &CommandOutcome) -> bool {
        if outcome.is_success() {
            return false;
        }
        let haystack = outcome.combined_output().to_ascii_lowercase();
        self.fingerprints
            .iter()
            .any(|fingerprint| haystack.contains(fingerprint.as_str()))
    }

    /// Fibonacci multiples of the base delay, capped.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let (mut previous, mut current) = (0_u32, 1_u32);
        for _ in 1..attempt {
            let next = previous.saturating_add(current);
            previous = current;
            current = next;
        }
        self.base_delay
            .checked_mul(current)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Returns the first non-throttled outcome, or the last one once attempts run out.
    pub fn run(
        &self,
        ctx: &InstallContext,
        runner: &dyn CommandRunner,
        command: &str,
    ) -> Result<CommandOutcome, InstallError> {
        let mut attempt = 1;
        loop {
            let outcome = run_command(ctx, runner, command, true)?;
            if !self.is_rate_limited(&outcome) || attempt >= self.max_attempts {
                if attempt > 1 && self.is_rate_limited(&outcome) {
                    warn!(
                        "giving up on '{command}' after {attempt} rate-limited attempt(s)"
                    );
                }
                return Ok(outcome);
            }

            let delay = self.delay_for_attempt(attempt);
            warn!(
                "upstream rate limit hit for '{command}' (attempt {attempt}/{}); retrying in {}s",
                self.max_attempts,
                delay.as_secs()
            );
            (self.sleep)(delay);
            attempt += 1;
        }
    }
}
