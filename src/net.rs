use anyhow::{Context, Result};
use std::time::Duration;
use tokio::net::TcpStream;
use tracing::info;

/// Probe a well-known endpoint with a plain TCP connect to decide whether the
/// network is up at all. The session treats a failed probe as fatal and never
/// starts any capture task.
pub async fn check_reachability(target: &str, timeout: Duration) -> Result<()> {
    info!("Checking network reachability via {}", target);

    let connect = TcpStream::connect(target);
    let stream = tokio::time::timeout(timeout, connect)
        .await
        .with_context(|| format!("Reachability probe to {} timed out", target))?
        .with_context(|| format!("Reachability probe to {} failed", target))?;

    drop(stream);
    info!("Network is reachable");
    Ok(())
}
