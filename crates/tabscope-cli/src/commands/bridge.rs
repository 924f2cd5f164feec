//! Native messaging host entry point
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tabscope_core::{run_bridge, TabscopeConfig};
use tabscope_storage::Database;

pub async fn run(db: Arc<Database>, config: &TabscopeConfig) -> Result<()> {
    log::info!("Native messaging host starting (pid {})", std::process::id());
    let timeout = Duration::from_secs(config.host_call_timeout_secs.max(1));
    run_bridge(db, timeout, tokio::io::stdin(), tokio::io::stdout()).await
}
