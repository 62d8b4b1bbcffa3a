//! Cache commands.

use crate::config::ClientConfig;
use crate::error::ClientResult;
use crate::session::build_service;

/// Drops cached event lists for the configured user.
pub async fn clear(config: &ClientConfig) -> ClientResult<()> {
    let service = build_service(config)?;
    let removed = service.clear_cache().await?;
    println!("Cleared {} cached entries.", removed);
    Ok(())
}
