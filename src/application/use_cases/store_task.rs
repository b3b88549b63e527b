use crate::shared::Result;
use anyhow::Context;
use std::sync::Arc;

/// Runs a synchronous store call on the blocking thread pool so that the
/// calling task keeps yielding while the store's connection lock is held
pub(crate) async fn run<S, T, F>(store: &Arc<S>, call: F) -> Result<T>
where
    S: Send + Sync + 'static,
    T: Send + 'static,
    F: FnOnce(&S) -> Result<T> + Send + 'static,
{
    let store = Arc::clone(store);
    tokio::task::spawn_blocking(move || call(&store))
        .await
        .context("Store task did not finish")?
}
