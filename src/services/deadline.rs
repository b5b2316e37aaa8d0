use std::future::Future;
use std::time::Duration;

use crate::error::{AppError, AppResult};

/// Deadline for calls to stores and providers when none is configured
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_millis(2500);

/// Runs `call` under `limit`; an elapsed deadline becomes the error built by `on_timeout`
pub async fn bounded<T>(
    limit: Duration,
    what: &str,
    call: impl Future<Output = AppResult<T>>,
    on_timeout: fn(String) -> AppError,
) -> AppResult<T> {
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(on_timeout(format!("{} timed out after {:?}", what, limit))),
    }
}
