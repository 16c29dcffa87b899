//! Async testing utilities
//!
//! Helpers here measure time with `tokio::time::Instant`, so they advance
//! correctly under `#[tokio::test(start_paused = true)]`.

#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

use std::future::Future;
use std::time::Duration;

/// Assert that an async condition eventually becomes true within a timeout
///
/// ```no_run
/// # #[cfg(feature = "runtime")]
/// # {
/// use std::sync::atomic::{AtomicBool, Ordering};
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// #[tokio::test(flavor = "multi_thread")]
/// async fn test_eventually() {
///     let flag = Arc::new(AtomicBool::new(false));
///     let flag_clone = flag.clone();
///
///     tokio::spawn(async move {
///         tokio::time::sleep(Duration::from_millis(100)).await;
///         flag_clone.store(true, Ordering::SeqCst);
///     });
///
///     channelog_common::assert_eventually_async!(Duration::from_secs(1), async {
///         flag.load(Ordering::SeqCst)
///     });
/// }
/// # }
/// ```
#[macro_export]
macro_rules! assert_eventually_async {
    ($timeout:expr, $fut:expr) => {{
        let timeout_duration = $timeout;
        let result = tokio::time::timeout(timeout_duration, async {
            loop {
                if $fut.await {
                    break;
                }
                tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            }
        })
        .await;

        assert!(result.is_ok(), "Condition did not become true within {:?}", timeout_duration);
    }};
}

/// Wait for a future to complete with a timeout, returning a Result
pub async fn timeout_ok<F, T>(duration: Duration, fut: F) -> Result<T, tokio::time::error::Elapsed>
where
    F: Future<Output = T>,
{
    tokio::time::timeout(duration, fut).await
}

/// Poll an async condition until it returns true or times out
///
/// ```no_run
/// # #[cfg(feature = "runtime")]
/// # {
/// use std::time::Duration;
///
/// use channelog_common::testing::async_utils::poll_until;
///
/// #[tokio::test]
/// async fn test_poll() {
///     let ready = poll_until(Duration::from_secs(1), Duration::from_millis(10), || async {
///         true
///     })
///     .await;
///
///     assert!(ready);
/// }
/// # }
/// ```
pub async fn poll_until<F, Fut>(timeout: Duration, interval: Duration, mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let start = tokio::time::Instant::now();

    while start.elapsed() < timeout {
        if condition().await {
            return true;
        }
        tokio::time::sleep(interval).await;
    }

    condition().await
}
