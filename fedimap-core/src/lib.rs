//! fedimap core library: crawler, interaction aggregation, and store.
//!
//! The main entry point is [`crawl::Crawler`], which drains a frontier of
//! instances through an [`client::InstanceSource`] into a
//! [`store::CrawlStore`]. [`graph::rebuild_edges`] derives the symmetric
//! interaction graph from what the crawler stored.

pub mod aggregate;
pub mod client;
pub mod config;
pub mod crawl;
pub mod error;
pub mod graph;
pub mod progress;
pub mod store;
pub mod types;
