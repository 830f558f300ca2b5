//! Outbound calls to remote instances.
//!
//! The crawl orchestrator only sees [`InstanceSource`]; [`MastodonClient`]
//! is the production implementation speaking the minimal Mastodon
//! discovery API.

pub mod allowlist;
pub mod mastodon;

pub use allowlist::{AllowList, StaticAllowList};
pub use mastodon::{ClientSettings, MastodonClient};

use crate::types::FetchResult;

/// Fetches metadata, peers, and recent posts for one instance.
///
/// Implementations classify every failure into a [`crate::types::FetchFailure`]
/// and never panic or return transport errors directly.
#[async_trait::async_trait]
pub trait InstanceSource: Send + Sync {
    async fn fetch(&self, instance: &str) -> FetchResult;
}
