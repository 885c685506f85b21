//! Human-readable token listing, posted to a channel per container.
//!
//! Not part of the sync path; run explicitly with the `list` subcommand.

use tracing::info;

use crate::config::{Config, ConfigError};
use crate::registry::{RegistryError, TokenRegistry};
use crate::types::TokenInfo;

/// A chunk is flushed once its joined length reaches this many characters.
pub const CHUNK_FLUSH_LEN: usize = 1900;

/// Listing errors
#[derive(Debug, thiserror::Error)]
pub enum ListingError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),
}

/// One listing line for a token.
pub fn listing_line(token: &TokenInfo) -> String {
    format!("<:{name}:{id}> = `:{name}:`", name = token.name, id = token.id)
}

/// Split the listing into message-sized chunks.
pub fn render_listing(tokens: &[TokenInfo]) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut lines: Vec<String> = Vec::new();

    for token in tokens {
        lines.push(listing_line(token));

        let joined = lines.join("\n");
        if joined.chars().count() >= CHUNK_FLUSH_LEN {
            chunks.push(joined);
            lines.clear();
        }
    }

    if !lines.is_empty() {
        chunks.push(lines.join("\n"));
    }
    chunks
}

/// Post the listing of every configured container to its channel.
///
/// Returns the number of messages posted.
pub async fn broadcast(registry: &dyn TokenRegistry, config: &Config) -> Result<usize, ListingError> {
    let mut posted = 0;

    for container in &config.registry.container_ids {
        let channel = config.listing_channel(container)?;
        let info = registry.describe(container).await?;

        for chunk in render_listing(&info.tokens) {
            registry.post_message(channel, &chunk).await?;
            posted += 1;
        }
        info!(container = %container, channel = %channel, tokens = info.used(), "Posted token listing");
    }

    Ok(posted)
}
