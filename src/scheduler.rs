// src/scheduler.rs
use anyhow::Result;
use std::future::Future;
use std::time::Duration;

/// Run `cycle` on every tick until `shutdown` resolves or a cycle fails.
///
/// `shutdown` is raced against the running cycle too, so an interrupt does
/// not wait for a slow provider. The first tick fires immediately.
pub async fn poll_until<F, Fut, S>(every: Duration, shutdown: S, mut cycle: F) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<()>>,
    S: Future<Output = ()>,
{
    tokio::pin!(shutdown);
    let mut ticker = tokio::time::interval(every);
    loop {
        tokio::select! {
            res = async {
                ticker.tick().await;
                cycle().await
            } => res?,
            _ = &mut shutdown => {
                tracing::info!(target: "observers", "polling stopped");
                return Ok(());
            }
        }
    }
}
