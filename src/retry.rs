//! 再試行デコレータ
//!
//! 一時的なエラーに限り、固定または指数バックオフで処理を再実行する。

use log::warn;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

/// 再試行間の待ち時間
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    Fixed(Duration),
    Exponential { base: Duration, max: Duration },
}

impl Backoff {
    /// `failed_attempts` 回失敗した後の待ち時間
    pub fn delay_for(&self, failed_attempts: u32) -> Duration {
        match *self {
            Backoff::Fixed(delay) => delay,
            Backoff::Exponential { base, max } => {
                let exp = failed_attempts.saturating_sub(1).min(16);
                base.saturating_mul(1u32 << exp).min(max)
            }
        }
    }
}

/// 設定ファイルで選ぶバックオフの種類
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffKind {
    #[default]
    Fixed,
    Exponential,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// 初回を含む最大試行回数
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl RetryPolicy {
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            backoff: Backoff::Fixed(delay),
        }
    }

    pub fn exponential(max_attempts: u32, base: Duration, max: Duration) -> Self {
        Self {
            max_attempts,
            backoff: Backoff::Exponential { base, max },
        }
    }

    /// 初回の後に `max_retries` 回まで再試行する
    pub fn with_retries(kind: BackoffKind, max_retries: u32, delay: Duration, max_delay: Duration) -> Self {
        let max_attempts = max_retries.saturating_add(1);
        match kind {
            BackoffKind::Fixed => Self::fixed(max_attempts, delay),
            BackoffKind::Exponential => Self::exponential(max_attempts, delay, max_delay.max(delay)),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::with_retries(BackoffKind::Fixed, 3, Duration::from_secs(1), Duration::from_secs(1))
    }
}

/// 再試行を使い切った（または再試行不可の）エラー
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryError<E> {
    pub error: E,
    pub attempts: u32,
}

/// 処理を再試行付きで実行する
///
/// `op` には1始まりの試行番号が渡される。
pub async fn retry<T, E, F, Fut, P>(policy: &RetryPolicy, is_transient: P, mut op: F) -> Result<T, RetryError<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
    E: std::fmt::Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(error) if attempt < max_attempts && is_transient(&error) => {
                let delay = policy.backoff.delay_for(attempt);
                warn!(
                    "試行 {}/{} 失敗: {}（{}ms後に再試行）",
                    attempt,
                    max_attempts,
                    error,
                    delay.as_millis()
                );
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                attempt += 1;
            }
            Err(error) => return Err(RetryError { error, attempts: attempt }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StorageError;
    use std::cell::Cell;

    #[test]
    fn test_backoff_delays() {
        let fixed = Backoff::Fixed(Duration::from_millis(500));
        assert_eq!(fixed.delay_for(1), Duration::from_millis(500));
        assert_eq!(fixed.delay_for(3), Duration::from_millis(500));

        let exp = Backoff::Exponential {
            base: Duration::from_millis(100),
            max: Duration::from_millis(350),
        };
        assert_eq!(exp.delay_for(1), Duration::from_millis(100));
        assert_eq!(exp.delay_for(2), Duration::from_millis(200));
        assert_eq!(exp.delay_for(3), Duration::from_millis(350));
    }

    #[test]
    fn test_with_retries_counts_the_first_attempt() {
        // 再試行3回 = 初回を含めて4回
        let policy = RetryPolicy::with_retries(
            BackoffKind::Fixed,
            3,
            Duration::from_millis(500),
            Duration::from_secs(5),
        );
        assert_eq!(policy.max_attempts, 4);
        assert_eq!(policy.backoff, Backoff::Fixed(Duration::from_millis(500)));
        assert_eq!(RetryPolicy::default().max_attempts, 4);

        let exp = RetryPolicy::with_retries(
            BackoffKind::Exponential,
            0,
            Duration::from_millis(200),
            Duration::from_millis(50),
        );
        assert_eq!(exp.max_attempts, 1);
        // 上限が基準より短い場合は基準に揃える
        assert_eq!(exp.backoff.delay_for(3), Duration::from_millis(200));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exponential_backoff_waits_between_attempts() {
        let calls = Cell::new(0);
        let policy = RetryPolicy::exponential(3, Duration::from_millis(100), Duration::from_secs(1));
        let started = tokio::time::Instant::now();

        let result: Result<(), _> = retry(&policy, StorageError::is_transient, |_| {
            calls.set(calls.get() + 1);
            async { Err(StorageError::Transient("timeout".into())) }
        })
        .await;

        assert_eq!(result.unwrap_err().attempts, 3);
        assert_eq!(calls.get(), 3);
        // 100ms + 200ms
        let waited = started.elapsed();
        assert!(waited >= Duration::from_millis(300) && waited < Duration::from_millis(400));
    }

    #[tokio::test]
    async fn test_retry_succeeds_after_transient_failures() {
        let calls = Cell::new(0);
        let policy = RetryPolicy::fixed(3, Duration::ZERO);

        let result = retry(&policy, StorageError::is_transient, |_| {
            calls.set(calls.get() + 1);
            let n = calls.get();
            async move {
                if n < 3 {
                    Err(StorageError::Transient("timeout".into()))
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(result, Ok(3));
        assert_eq!(calls.get(), 3);
    }

    #[tokio::test]
    async fn test_retry_gives_up_after_max_attempts() {
        let calls = Cell::new(0);
        let policy = RetryPolicy::fixed(3, Duration::ZERO);

        let result: Result<(), _> = retry(&policy, StorageError::is_transient, |_| {
            calls.set(calls.get() + 1);
            async { Err(StorageError::Transient("connection reset".into())) }
        })
        .await;

        let err = result.unwrap_err();
        assert_eq!(err.attempts, 3);
        assert_eq!(calls.get(), 3);
    }

    #[tokio::test]
    async fn test_permanent_error_is_not_retried() {
        let calls = Cell::new(0);
        let policy = RetryPolicy::fixed(3, Duration::ZERO);

        let result: Result<(), _> = retry(&policy, StorageError::is_transient, |_| {
            calls.set(calls.get() + 1);
            async { Err(StorageError::Permanent("constraint violation".into())) }
        })
        .await;

        assert_eq!(result.unwrap_err().attempts, 1);
        assert_eq!(calls.get(), 1);
    }

    #[tokio::test]
    async fn test_attempt_numbers_are_passed() {
        let seen = std::cell::RefCell::new(Vec::new());
        let policy = RetryPolicy::fixed(2, Duration::ZERO);

        let _: Result<(), _> = retry(&policy, |_: &StorageError| true, |attempt| {
            seen.borrow_mut().push(attempt);
            async { Err(StorageError::Transient("x".into())) }
        })
        .await;

        assert_eq!(*seen.borrow(), vec![1, 2]);
    }
}
