//! Bounded bulk transfers
//!
//! nusb completions are futures. Every wait on the bus goes through
//! [`block_on_timeout`] so a wedged device surfaces as an error instead of
//! hanging the process.

use std::future::Future;
use std::time::Duration;

use tokio::runtime::Runtime;

use crate::error::{Result, UsbError};

/// Current-thread runtime driving transfer timeouts
pub fn runtime() -> Result<Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .map_err(|e| UsbError::OpenFailed(format!("failed to create runtime: {}", e)))
}

/// Run `fut` to completion, or give up after `timeout`
///
/// Returns `None` on expiry. The future is dropped in that case.
pub fn block_on_timeout<F: Future>(rt: &Runtime, timeout: Duration, fut: F) -> Option<F::Output> {
    rt.block_on(async move { tokio::time::timeout(timeout, fut).await.ok() })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ready_future_completes() {
        let rt = runtime().unwrap();
        let out = block_on_timeout(&rt, Duration::from_millis(100), async { 42u32 });
        assert_eq!(out, Some(42));
    }

    #[test]
    fn test_pending_future_times_out() {
        let rt = runtime().unwrap();
        let out = block_on_timeout(
            &rt,
            Duration::from_millis(10),
            futures_lite::future::pending::<()>(),
        );
        assert_eq!(out, None);
    }
}
