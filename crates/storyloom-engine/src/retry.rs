use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::endpoint::FailureKind;
use crate::env_u64;

const DEFAULT_RATE_LIMIT_RETRIES: u32 = 3;
const DEFAULT_BACKOFF_BASE_MS: u64 = 2000;
const DEFAULT_POLITENESS_MS: u64 = 2000;
const DEFAULT_CHATTY_RETRIES: u32 = 1;
const DEFAULT_CHATTY_PAUSE_MS: u64 = 1000;

/// What to do when the image model answers with text only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChattyTextPolicy {
    /// Treat the reply as a hard refusal.
    Abandon,
    /// Treat the reply as a transient slip and try again after `pause`.
    Retry { retries: u32, pause: Duration },
}

impl Default for ChattyTextPolicy {
    fn default() -> Self {
        ChattyTextPolicy::Retry {
            retries: DEFAULT_CHATTY_RETRIES,
            pause: Duration::from_millis(DEFAULT_CHATTY_PAUSE_MS),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retry(Duration),
    Abandon,
}

/// Retries already spent on one slot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryBudget {
    pub rate_limit_retries: u32,
    pub chatty_retries: u32,
}

impl RetryBudget {
    pub fn consume(&mut self, kind: FailureKind) {
        match kind {
            FailureKind::RateLimited => self.rate_limit_retries += 1,
            FailureKind::ChattyText => self.chatty_retries += 1,
            _ => {}
        }
    }
}

/// Per-slot retry rules for the batch image generator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Rate-limit retries per slot; the call after the last retry is final.
    pub rate_limit_retries: u32,
    /// First backoff; retry `r` waits `backoff_base * 2^r`.
    pub backoff_base: Duration,
    /// Pause after a successful slot when more slots remain.
    pub politeness_delay: Duration,
    pub chatty_text: ChattyTextPolicy,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            rate_limit_retries: DEFAULT_RATE_LIMIT_RETRIES,
            backoff_base: Duration::from_millis(DEFAULT_BACKOFF_BASE_MS),
            politeness_delay: Duration::from_millis(DEFAULT_POLITENESS_MS),
            chatty_text: ChattyTextPolicy::default(),
        }
    }
}

impl RetryPolicy {
    pub fn from_env() -> Self {
        let chatty_retries = env_u64(
            "STORYLOOM_CHATTY_RETRIES",
            u64::from(DEFAULT_CHATTY_RETRIES),
            0,
            3,
        ) as u32;
        let chatty_text = if chatty_retries == 0 {
            ChattyTextPolicy::Abandon
        } else {
            ChattyTextPolicy::Retry {
                retries: chatty_retries,
                pause: Duration::from_millis(env_u64(
                    "STORYLOOM_CHATTY_PAUSE_MS",
                    DEFAULT_CHATTY_PAUSE_MS,
                    0,
                    30_000,
                )),
            }
        };
        Self {
            rate_limit_retries: env_u64(
                "STORYLOOM_RATE_LIMIT_RETRIES",
                u64::from(DEFAULT_RATE_LIMIT_RETRIES),
                0,
                6,
            ) as u32,
            backoff_base: Duration::from_millis(env_u64(
                "STORYLOOM_BACKOFF_BASE_MS",
                DEFAULT_BACKOFF_BASE_MS,
                100,
                30_000,
            )),
            politeness_delay: Duration::from_millis(env_u64(
                "STORYLOOM_POLITENESS_MS",
                DEFAULT_POLITENESS_MS,
                0,
                30_000,
            )),
            chatty_text,
        }
    }

    /// A policy with the default retry counts and no waiting at all.
    pub fn immediate() -> Self {
        Self {
            backoff_base: Duration::ZERO,
            politeness_delay: Duration::ZERO,
            chatty_text: ChattyTextPolicy::Retry {
                retries: DEFAULT_CHATTY_RETRIES,
                pause: Duration::ZERO,
            },
            ..Self::default()
        }
    }

    pub fn with_chatty_text(mut self, policy: ChattyTextPolicy) -> Self {
        self.chatty_text = policy;
        self
    }

    pub fn backoff_delay(&self, retry_index: u32) -> Duration {
        let factor = 2u32.checked_pow(retry_index).unwrap_or(u32::MAX);
        self.backoff_base.saturating_mul(factor)
    }

    pub fn decide(&self, kind: FailureKind, budget: &RetryBudget) -> RetryDecision {
        match kind {
            FailureKind::RateLimited if budget.rate_limit_retries < self.rate_limit_retries => {
                RetryDecision::Retry(self.backoff_delay(budget.rate_limit_retries))
            }
            FailureKind::ChattyText => match self.chatty_text {
                ChattyTextPolicy::Retry { retries, pause } if budget.chatty_retries < retries => {
                    RetryDecision::Retry(pause)
                }
                _ => RetryDecision::Abandon,
            },
            _ => RetryDecision::Abandon,
        }
    }
}

/// Shared cancellation flag. Clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Suspends the batch driver between requests.
pub trait Pacer: Send + Sync {
    /// Waits for `duration`. Returns `false` when `cancel` fired before the
    /// wait finished.
    fn pause(&self, duration: Duration, cancel: &CancelToken) -> bool;
}

/// Sleeps on the calling thread, polling the cancel flag every `tick`.
#[derive(Debug, Clone)]
pub struct ThreadPacer {
    tick: Duration,
}

impl Default for ThreadPacer {
    fn default() -> Self {
        Self {
            tick: Duration::from_millis(50),
        }
    }
}

impl ThreadPacer {
    pub fn with_tick(tick: Duration) -> Self {
        Self {
            tick: tick.max(Duration::from_millis(1)),
        }
    }
}

impl Pacer for ThreadPacer {
    fn pause(&self, duration: Duration, cancel: &CancelToken) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if cancel.is_cancelled() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            thread::sleep(self.tick.min(deadline - now));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_from_base() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff_delay(0), Duration::from_secs(2));
        assert_eq!(policy.backoff_delay(1), Duration::from_secs(4));
        assert_eq!(policy.backoff_delay(2), Duration::from_secs(8));
        assert!(policy.backoff_delay(40) >= Duration::from_secs(8));
    }

    #[test]
    fn rate_limits_retry_until_budget_is_spent() {
        let policy = RetryPolicy::default();
        let mut budget = RetryBudget::default();
        let mut waits = Vec::new();
        while let RetryDecision::Retry(delay) = policy.decide(FailureKind::RateLimited, &budget) {
            waits.push(delay);
            budget.consume(FailureKind::RateLimited);
        }
        assert_eq!(
            waits,
            vec![
                Duration::from_secs(2),
                Duration::from_secs(4),
                Duration::from_secs(8)
            ]
        );
    }

    #[test]
    fn chatty_text_gets_one_flat_retry_by_default() {
        let policy = RetryPolicy::default();
        let mut budget = RetryBudget::default();
        assert_eq!(
            policy.decide(FailureKind::ChattyText, &budget),
            RetryDecision::Retry(Duration::from_secs(1))
        );
        budget.consume(FailureKind::ChattyText);
        assert_eq!(
            policy.decide(FailureKind::ChattyText, &budget),
            RetryDecision::Abandon
        );
    }

    #[test]
    fn chatty_text_can_be_treated_as_refusal() {
        let policy = RetryPolicy::default().with_chatty_text(ChattyTextPolicy::Abandon);
        assert_eq!(
            policy.decide(FailureKind::ChattyText, &RetryBudget::default()),
            RetryDecision::Abandon
        );
    }

    #[test]
    fn terminal_kinds_never_retry() {
        let policy = RetryPolicy::default();
        for kind in [
            FailureKind::SafetyRefused,
            FailureKind::NoImageData,
            FailureKind::PermissionDenied,
            FailureKind::Transport,
            FailureKind::Other,
        ] {
            assert_eq!(
                policy.decide(kind, &RetryBudget::default()),
                RetryDecision::Abandon
            );
        }
    }

    #[test]
    fn budgets_are_tracked_per_kind() {
        let mut budget = RetryBudget::default();
        budget.consume(FailureKind::RateLimited);
        budget.consume(FailureKind::ChattyText);
        budget.consume(FailureKind::SafetyRefused);
        assert_eq!(
            budget,
            RetryBudget {
                rate_limit_retries: 1,
                chatty_retries: 1
            }
        );
    }

    #[test]
    fn thread_pacer_returns_early_when_cancelled() {
        let pacer = ThreadPacer::with_tick(Duration::from_millis(5));
        let cancel = CancelToken::new();
        assert!(pacer.pause(Duration::from_millis(10), &cancel));

        cancel.cancel();
        let started = Instant::now();
        assert!(!pacer.pause(Duration::from_secs(30), &cancel));
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn cancel_token_clones_share_state() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!token.is_cancelled());
        clone.cancel();
        assert!(token.is_cancelled());
    }
}
