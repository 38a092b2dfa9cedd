use std::fmt;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::Result;
use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::providers::truncate_text;

const RATE_LIMIT_MARKERS: &[&str] = &["429", "quota", "RESOURCE_EXHAUSTED"];
const OVERLOAD_MARKERS: &[&str] = &["503", "500", "overloaded"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    RateLimited,
    ServerOverloaded,
    Fatal,
}

impl ErrorClass {
    pub fn is_retryable(self) -> bool {
        !matches!(self, Self::Fatal)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::RateLimited => "rate_limited",
            Self::ServerOverloaded => "server_overloaded",
            Self::Fatal => "fatal",
        }
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub trait ErrorClassifier: Send + Sync {
    fn classify(&self, err: &anyhow::Error) -> ErrorClass;
}

/// Classifies by substring markers anywhere in the flattened cause chain.
/// Rate-limit markers win over overload markers.
#[derive(Debug, Clone, Copy, Default)]
pub struct MessageClassifier;

impl ErrorClassifier for MessageClassifier {
    fn classify(&self, err: &anyhow::Error) -> ErrorClass {
        classify_message(&error_chain_text(err, 4_096))
    }
}

pub fn classify_message(message: &str) -> ErrorClass {
    if RATE_LIMIT_MARKERS
        .iter()
        .any(|marker| message.contains(marker))
    {
        return ErrorClass::RateLimited;
    }
    if OVERLOAD_MARKERS.iter().any(|marker| message.contains(marker)) {
        return ErrorClass::ServerOverloaded;
    }
    ErrorClass::Fatal
}

pub fn error_chain_text(err: &anyhow::Error, max_chars: usize) -> String {
    let mut parts: Vec<String> = Vec::new();
    for cause in err.chain() {
        let text = cause.to_string();
        let trimmed = text.trim();
        if trimmed.is_empty() {
            continue;
        }
        if parts.last().is_some_and(|existing| existing == trimmed) {
            continue;
        }
        parts.push(trimmed.to_string());
    }
    if parts.is_empty() {
        return truncate_text(&err.to_string(), max_chars);
    }
    truncate_text(&parts.join(" | caused by: "), max_chars)
}

pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            thread::sleep(duration);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_delay: Duration::from_millis(5_000),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: config.retry_base_delay,
        }
    }

    /// Wait before attempt `attempt + 1`: `base * 2^attempt`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
    }
}

/// Emitted once per retry, before the controller sleeps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryNotice {
    /// Zero-based index of the attempt that just failed.
    pub attempt: u32,
    pub class: ErrorClass,
    pub wait: Duration,
    pub error: String,
}

impl RetryNotice {
    pub fn status_message(&self) -> String {
        format!("High traffic. Retrying in {}s...", format_seconds(self.wait))
    }
}

pub(crate) fn format_seconds(duration: Duration) -> String {
    let millis = duration.as_millis();
    if millis % 1_000 == 0 {
        return (millis / 1_000).to_string();
    }
    format!("{:.1}", duration.as_secs_f64())
}

/// Sequential retry loop around one fallible generation attempt.
///
/// Fatal errors are returned at once. Retryable errors are retried up to
/// `max_retries` times with doubling waits; the last error is returned
/// unchanged when the budget runs out.
pub struct RetryController {
    policy: RetryPolicy,
    classifier: Box<dyn ErrorClassifier>,
    sleeper: Arc<dyn Sleeper>,
}

impl RetryController {
    pub fn new(policy: RetryPolicy, sleeper: Arc<dyn Sleeper>) -> Self {
        Self {
            policy,
            classifier: Box::new(MessageClassifier),
            sleeper,
        }
    }

    pub fn with_classifier<C: ErrorClassifier + 'static>(mut self, classifier: C) -> Self {
        self.classifier = Box::new(classifier);
        self
    }

    pub fn sleeper(&self) -> &Arc<dyn Sleeper> {
        &self.sleeper
    }

    pub fn classify(&self, err: &anyhow::Error) -> ErrorClass {
        self.classifier.classify(err)
    }

    pub fn run<T>(
        &self,
        mut attempt_once: impl FnMut(u32) -> Result<T>,
        mut on_retry: impl FnMut(&RetryNotice),
    ) -> Result<T> {
        let mut attempt = 0u32;
        loop {
            let err = match attempt_once(attempt) {
                Ok(value) => {
                    debug!(attempt, "generation attempt succeeded");
                    return Ok(value);
                }
                Err(err) => err,
            };
            let class = self.classify(&err);
            if !class.is_retryable() || attempt >= self.policy.max_retries {
                warn!(
                    attempt,
                    class = class.as_str(),
                    error = %error_chain_text(&err, 400),
                    "generation failed"
                );
                return Err(err);
            }

            let notice = RetryNotice {
                attempt,
                class,
                wait: self.policy.delay_for(attempt),
                error: error_chain_text(&err, 400),
            };
            warn!(
                attempt,
                class = class.as_str(),
                wait_ms = notice.wait.as_millis() as u64,
                "retryable generation failure"
            );
            on_retry(&notice);
            self.sleeper.sleep(notice.wait);
            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use anyhow::{anyhow, bail, Context};

    use super::{
        classify_message, error_chain_text, ErrorClass, ErrorClassifier, RetryController,
        RetryNotice, RetryPolicy, Sleeper,
    };
    use crate::testing::RecordingSleeper;

    fn controller(sleeper: &Arc<RecordingSleeper>) -> RetryController {
        RetryController::new(RetryPolicy::default(), sleeper.clone())
    }

    fn millis(values: &[u64]) -> Vec<Duration> {
        values.iter().copied().map(Duration::from_millis).collect()
    }

    #[test]
    fn classifies_by_markers() {
        assert_eq!(classify_message("Gemini request failed (429): slow down"), ErrorClass::RateLimited);
        assert_eq!(classify_message("daily quota used up"), ErrorClass::RateLimited);
        assert_eq!(classify_message("{\"status\":\"RESOURCE_EXHAUSTED\"}"), ErrorClass::RateLimited);
        assert_eq!(classify_message("upstream 503"), ErrorClass::ServerOverloaded);
        assert_eq!(classify_message("internal error 500"), ErrorClass::ServerOverloaded);
        assert_eq!(classify_message("model is overloaded"), ErrorClass::ServerOverloaded);
        assert_eq!(classify_message("invalid request"), ErrorClass::Fatal);
        assert_eq!(classify_message("Reference image rejected"), ErrorClass::Fatal);
        assert_eq!(classify_message("429 and 503 together"), ErrorClass::RateLimited);
    }

    #[test]
    fn classifier_sees_through_context_layers() {
        let err = anyhow!("RESOURCE_EXHAUSTED").context("image generation failed");
        let rendered = error_chain_text(&err, 400);
        assert!(rendered.contains("image generation failed"));
        assert_eq!(
            super::MessageClassifier.classify(&err),
            ErrorClass::RateLimited
        );
    }

    #[test]
    fn succeeds_after_k_rate_limits_with_doubling_waits() {
        for k in 0..=5u32 {
            let sleeper = Arc::new(RecordingSleeper::default());
            let calls = Cell::new(0u32);
            let mut notices: Vec<RetryNotice> = Vec::new();
            let result = controller(&sleeper).run(
                |_| {
                    calls.set(calls.get() + 1);
                    if calls.get() <= k {
                        bail!("Gemini request failed (429): Too Many Requests");
                    }
                    Ok("image")
                },
                |notice| notices.push(notice.clone()),
            );

            assert_eq!(result.unwrap(), "image");
            assert_eq!(calls.get(), k + 1);
            let expected: Vec<u64> = (0..k).map(|n| 5_000 * 2u64.pow(n)).collect();
            assert_eq!(sleeper.recorded(), millis(&expected));
            assert_eq!(notices.len(), k as usize);
        }
    }

    #[test]
    fn always_rate_limited_gives_up_after_six_attempts() {
        let sleeper = Arc::new(RecordingSleeper::default());
        let calls = Cell::new(0u32);
        let err = controller(&sleeper)
            .run(
                |attempt| -> anyhow::Result<()> {
                    calls.set(calls.get() + 1);
                    bail!("429 on attempt {attempt}")
                },
                |_| {},
            )
            .unwrap_err();

        assert_eq!(calls.get(), 6);
        assert_eq!(err.to_string(), "429 on attempt 5");
        assert_eq!(
            sleeper.recorded(),
            millis(&[5_000, 10_000, 20_000, 40_000, 80_000])
        );
    }

    #[test]
    fn fatal_error_is_not_retried() {
        let sleeper = Arc::new(RecordingSleeper::default());
        let calls = Cell::new(0u32);
        let err = controller(&sleeper)
            .run(
                |_| -> anyhow::Result<()> {
                    calls.set(calls.get() + 1);
                    Err(anyhow!("invalid request")).context("Gemini call failed")
                },
                |_| panic!("no retry expected"),
            )
            .unwrap_err();

        assert_eq!(calls.get(), 1);
        assert!(sleeper.recorded().is_empty());
        assert_eq!(format!("{err:#}"), "Gemini call failed: invalid request");
    }

    #[test]
    fn overload_is_retried_and_announced() {
        let sleeper = Arc::new(RecordingSleeper::default());
        let calls = Cell::new(0u32);
        let mut statuses = Vec::new();
        let result = controller(&sleeper).run(
            |_| {
                calls.set(calls.get() + 1);
                if calls.get() == 1 {
                    bail!("The model is overloaded. Please try again later.");
                }
                Ok(7)
            },
            |notice| {
                assert_eq!(notice.class, ErrorClass::ServerOverloaded);
                statuses.push(notice.status_message());
            },
        );

        assert_eq!(result.unwrap(), 7);
        assert_eq!(statuses, vec!["High traffic. Retrying in 5s..."]);
    }

    #[test]
    fn each_notice_is_announced_before_its_sleep() {
        #[derive(Default)]
        struct Timeline(Mutex<Vec<String>>);

        impl Timeline {
            fn push(&self, entry: String) {
                self.0.lock().unwrap().push(entry);
            }
        }

        impl Sleeper for Timeline {
            fn sleep(&self, duration: Duration) {
                self.push(format!("sleep({})", duration.as_millis()));
            }
        }

        let timeline = Arc::new(Timeline::default());
        let calls = Cell::new(0u32);
        let result = RetryController::new(RetryPolicy::default(), timeline.clone()).run(
            |_| {
                calls.set(calls.get() + 1);
                if calls.get() <= 3 {
                    bail!("503 Service Unavailable");
                }
                Ok(())
            },
            |notice| timeline.push(format!("notice({})", notice.wait.as_millis())),
        );

        assert!(result.is_ok());
        assert_eq!(
            *timeline.0.lock().unwrap(),
            vec![
                "notice(5000)",
                "sleep(5000)",
                "notice(10000)",
                "sleep(10000)",
                "notice(20000)",
                "sleep(20000)",
            ]
        );
    }

    #[test]
    fn zero_retries_means_single_attempt() {
        let sleeper = Arc::new(RecordingSleeper::default());
        let policy = RetryPolicy {
            max_retries: 0,
            base_delay: Duration::from_millis(250),
        };
        let result: anyhow::Result<()> =
            RetryController::new(policy, sleeper.clone()).run(|_| bail!("quota"), |_| {});
        assert!(result.is_err());
        assert!(sleeper.recorded().is_empty());
    }

    #[test]
    fn custom_classifier_can_make_everything_fatal() {
        struct NeverRetry;
        impl ErrorClassifier for NeverRetry {
            fn classify(&self, _err: &anyhow::Error) -> ErrorClass {
                ErrorClass::Fatal
            }
        }

        let sleeper = Arc::new(RecordingSleeper::default());
        let calls = Cell::new(0u32);
        let result: anyhow::Result<()> = controller(&sleeper)
            .with_classifier(NeverRetry)
            .run(
                |_| {
                    calls.set(calls.get() + 1);
                    bail!("429")
                },
                |_| {},
            );
        assert!(result.is_err());
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn fractional_waits_render_with_one_decimal() {
        let notice = RetryNotice {
            attempt: 0,
            class: ErrorClass::RateLimited,
            wait: Duration::from_millis(1_500),
            error: String::new(),
        };
        assert_eq!(notice.status_message(), "High traffic. Retrying in 1.5s...");
    }
}
