//! Fan-out/join over fallible futures.
//!
//! Every future is issued before any result is awaited, the join waits for
//! all of them to settle, and results come back in request order regardless
//! of completion order.

use std::future::Future;

use futures::future::join_all;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

/// Runs every future concurrently and returns their settled results in
/// request order. One failure does not affect the others.
pub async fn settle_all<I, F, T>(futures: I) -> Vec<Result<T>>
where
    I: IntoIterator<Item = F>,
    F: Future<Output = Result<T>>,
{
    join_all(futures).await
}

/// Like [`settle_all`], but abandons every in-flight future once `token`
/// is cancelled.
///
/// # Errors
///
/// Returns [`Error::Cancelled`] if the token fires before the join completes.
pub async fn settle_all_cancellable<I, F, T>(
    futures: I,
    token: &CancellationToken,
) -> Result<Vec<Result<T>>>
where
    I: IntoIterator<Item = F>,
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        results = join_all(futures) => Ok(results),
        () = token.cancelled() => Err(Error::Cancelled),
    }
}
