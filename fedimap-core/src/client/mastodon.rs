// Mastodon-compatible discovery client: instance info, peers, local timeline.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::Client;
use reqwest::header::ACCEPT;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::config::CrawlSection;
use crate::error::ClientError;
use crate::types::{
    FailureKind, FetchFailure, FetchResult, FetchedInstance, InstanceMetadata, Post,
};

use super::{AllowList, InstanceSource};

const INSTANCE_PATH: &str = "/api/v1/instance";
const PEERS_PATH: &str = "/api/v1/instance/peers";
const TIMELINE_PATH: &str = "/api/v1/timelines/public";

/// Knobs for [`MastodonClient`], normally derived from [`CrawlSection`].
#[derive(Debug, Clone)]
pub struct ClientSettings {
    /// `https` in production; tests point at plain-HTTP responders.
    pub scheme: String,
    pub timeout: Duration,
    pub user_agent: String,
    pub personal_instance_threshold: i64,
    pub statuses_per_page: u32,
    pub status_scrape_limit: u64,
    pub mention_window: chrono::Duration,
    pub page_delay: Duration,
}

impl ClientSettings {
    pub fn from_config(crawl: &CrawlSection) -> Self {
        Self {
            scheme: "https".to_string(),
            timeout: crawl.request_timeout(),
            user_agent: crawl.user_agent.clone(),
            personal_instance_threshold: crawl.personal_instance_threshold,
            statuses_per_page: crawl.statuses_per_page,
            status_scrape_limit: crawl.status_scrape_limit,
            mention_window: crawl.mention_window(),
            page_delay: crawl.page_delay(),
        }
    }

    #[must_use]
    pub fn with_scheme(mut self, scheme: &str) -> Self {
        self.scheme = scheme.to_string();
        self
    }
}

/// HTTP client for the Mastodon discovery endpoints.
#[derive(Debug)]
pub struct MastodonClient {
    client: Client,
    settings: ClientSettings,
    allowlist: Arc<dyn AllowList>,
}

impl MastodonClient {
    pub fn new(settings: ClientSettings, allowlist: Arc<dyn AllowList>) -> Result<Self, ClientError> {
        // reqwest is built without a bundled crypto provider; the first
        // client installs aws-lc-rs process-wide and later calls are no-ops.
        let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

        let client = Client::builder()
            .timeout(settings.timeout)
            .connect_timeout(settings.timeout)
            .user_agent(settings.user_agent.clone())
            .build()
            .map_err(|e| ClientError::Build(e.to_string()))?;

        Ok(Self {
            client,
            settings,
            allowlist,
        })
    }

    fn url(&self, instance: &str, path: &str) -> String {
        format!("{}://{instance}{path}", self.settings.scheme)
    }

    /// GET a JSON document, classifying every way it can go wrong.
    async fn get_json(&self, url: &str, query: &[(&str, String)]) -> Result<Value, FetchFailure> {
        debug!(url = %url, ?query, "GET");

        let resp = self
            .client
            .get(url)
            .query(query)
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| classify_transport(url, &e))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchFailure::invalid(format!("GET {url}: HTTP {status}")));
        }

        let body = resp
            .bytes()
            .await
            .map_err(|e| classify_transport(url, &e))?;

        let value: Value = serde_json::from_slice(&body)
            .map_err(|e| FetchFailure::malformed(format!("GET {url}: {e}")))?;

        if value.get("error").is_some() {
            return Err(FetchFailure::invalid(format!(
                "GET {url}: server reported error {}",
                value["error"]
            )));
        }
        Ok(value)
    }

    fn is_personal(&self, instance: &str, info: &InstanceInfo) -> Option<i64> {
        let users = info.user_count()?;
        if users < self.settings.personal_instance_threshold && !self.allowlist.is_allowed(instance)
        {
            Some(users)
        } else {
            None
        }
    }

    /// Page through the local public timeline, newest first.
    async fn fetch_posts(
        &self,
        instance: &str,
        window_start: DateTime<Utc>,
    ) -> Result<Vec<Post>, FetchFailure> {
        let url = self.url(instance, TIMELINE_PATH);
        let mut posts: Vec<Post> = Vec::new();
        let mut max_id: Option<String> = None;

        loop {
            let mut query = vec![
                ("local", "true".to_string()),
                ("limit", self.settings.statuses_per_page.to_string()),
            ];
            if let Some(id) = &max_id {
                query.push(("max_id", id.clone()));
            }

            let value = self.get_json(&url, &query).await?;
            let page: Vec<Post> = serde_json::from_value(value)
                .map_err(|e| FetchFailure::invalid(format!("GET {url}: unexpected timeline: {e}")))?;

            let seen = posts.len() as u64 + page.len() as u64;
            let cursor = next_page_cursor(
                &page,
                seen,
                window_start,
                self.settings.status_scrape_limit,
            );
            posts.extend(page);

            match cursor {
                Some(id) => {
                    max_id = Some(id);
                    tokio::time::sleep(self.settings.page_delay).await;
                }
                None => break,
            }
        }

        Ok(posts)
    }
}

#[async_trait::async_trait]
impl InstanceSource for MastodonClient {
    #[instrument(skip_all, fields(instance = %instance))]
    async fn fetch(&self, instance: &str) -> FetchResult {
        let window_start = Utc::now() - self.settings.mention_window;

        let info_value = self.get_json(&self.url(instance, INSTANCE_PATH), &[]).await?;
        let (info, info_empty) = parse_info(&info_value)?;

        // Checked before the peers and timeline calls so single-user
        // instances are never paged through.
        if let Some(users) = self.is_personal(instance, &info) {
            return Err(FetchFailure::new(
                FailureKind::PersonalInstance,
                format!("{users} users reported"),
            ));
        }

        let peers_value = self.get_json(&self.url(instance, PEERS_PATH), &[]).await?;
        let peers = parse_peers(&peers_value, instance)?;

        if info_empty && peers.is_empty() {
            return Err(FetchFailure::invalid("neither instance info nor peers returned"));
        }

        let posts = self.fetch_posts(instance, window_start).await?;
        debug!(
            peers = peers.len(),
            posts = posts.len(),
            "Fetched instance"
        );

        Ok(FetchedInstance {
            name: instance.to_string(),
            metadata: info.into_metadata(),
            peers,
            posts,
            window_start,
        })
    }
}

// ── Response parsing ───────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
struct InstanceInfo {
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    stats: Option<InstanceStats>,
}

/// Counters stay untyped until validated: some servers report negatives or strings.
#[derive(Debug, Default, Deserialize)]
struct InstanceStats {
    #[serde(default)]
    domain_count: Option<Value>,
    #[serde(default)]
    status_count: Option<Value>,
    #[serde(default)]
    user_count: Option<Value>,
}

impl InstanceInfo {
    fn user_count(&self) -> Option<i64> {
        self.stats
            .as_ref()
            .and_then(|s| s.user_count.as_ref())
            .and_then(Value::as_i64)
    }

    fn into_metadata(self) -> InstanceMetadata {
        let stats = self.stats.unwrap_or_default();
        InstanceMetadata {
            description: self.description,
            version: self.version,
            domain_count: stats.domain_count.as_ref().and_then(validate_count),
            status_count: stats.status_count.as_ref().and_then(validate_count),
            user_count: stats.user_count.as_ref().and_then(validate_count),
        }
    }
}

/// Parse `/api/v1/instance`; the flag reports an empty object.
fn parse_info(value: &Value) -> Result<(InstanceInfo, bool), FetchFailure> {
    let Some(object) = value.as_object() else {
        return Err(FetchFailure::invalid("instance info is not an object"));
    };
    let info: InstanceInfo = serde_json::from_value(value.clone())
        .map_err(|e| FetchFailure::invalid(format!("unexpected instance info: {e}")))?;
    Ok((info, object.is_empty()))
}

/// Normalize a peer list: lowercase, drop nulls and self, de-duplicate.
///
/// Order of first appearance is kept so repeated crawls see a stable list.
pub fn parse_peers(value: &Value, instance: &str) -> Result<Vec<String>, FetchFailure> {
    let Some(entries) = value.as_array() else {
        return Err(FetchFailure::invalid("peer list is not an array"));
    };

    let own = instance.to_lowercase();
    let mut seen = HashSet::new();
    let mut peers = Vec::new();
    for entry in entries {
        let Some(raw) = entry.as_str() else {
            continue;
        };
        let peer = raw.trim().to_lowercase();
        if peer.is_empty() || peer == own {
            continue;
        }
        if seen.insert(peer.clone()) {
            peers.push(peer);
        }
    }
    Ok(peers)
}

/// Accept a self-reported counter only if it is an integer in `0..i32::MAX`.
pub fn validate_count(value: &Value) -> Option<i32> {
    value
        .as_i64()
        .filter(|n| (0..i64::from(i32::MAX)).contains(n))
        .and_then(|n| i32::try_from(n).ok())
}

/// Cursor for the next timeline page, or `None` when paging should stop.
///
/// Stops on an empty page, once the page reaches back past `window_start`,
/// or once `seen` posts have been inspected in total.
pub fn next_page_cursor(
    page: &[Post],
    seen: u64,
    window_start: DateTime<Utc>,
    limit: u64,
) -> Option<String> {
    let last = page.last()?;
    let oldest = page.iter().map(|p| p.created_at).min()?;
    if oldest < window_start || seen >= limit {
        return None;
    }
    Some(last.id.clone())
}

fn classify_transport(url: &str, err: &reqwest::Error) -> FetchFailure {
    if err.is_builder() {
        // Unusable host names end up here (spaces, bad ports, ...).
        FetchFailure::invalid(format!("GET {url}: {err}"))
    } else if err.is_decode() {
        FetchFailure::malformed(format!("GET {url}: {err}"))
    } else {
        FetchFailure::network(format!("GET {url}: {err}"))
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use serde_json::json;

    use super::*;
    use crate::client::StaticAllowList;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn post(id: &str, created_at: DateTime<Utc>) -> Post {
        Post {
            id: id.to_string(),
            created_at,
            mentions: Vec::new(),
        }
    }

    fn test_settings() -> ClientSettings {
        ClientSettings {
            timeout: Duration::from_secs(2),
            page_delay: Duration::ZERO,
            ..ClientSettings::from_config(&CrawlSection::default())
        }
        .with_scheme("http")
    }

    #[test]
    fn peers_are_lowercased_deduped_and_exclude_self() {
        let value = json!(["B.social", null, "a.social", "b.social", "c.social", "", "A.SOCIAL"]);
        let peers = parse_peers(&value, "a.social").unwrap();
        assert_eq!(peers, vec!["b.social".to_string(), "c.social".to_string()]);
    }

    #[test]
    fn peers_must_be_an_array() {
        let err = parse_peers(&json!({"peers": []}), "a.social").unwrap_err();
        assert_eq!(err.kind, FailureKind::InvalidResponse);
    }

    #[test]
    fn counters_outside_i32_range_are_absent() {
        assert_eq!(validate_count(&json!(42)), Some(42));
        assert_eq!(validate_count(&json!(0)), Some(0));
        assert_eq!(validate_count(&json!(-5)), None);
        assert_eq!(validate_count(&json!("abc")), None);
        assert_eq!(validate_count(&json!(3.5)), None);
        assert_eq!(validate_count(&json!(2_147_483_647_i64)), None);
        assert_eq!(validate_count(&json!(2_147_483_646_i64)), Some(2_147_483_646));
        assert_eq!(validate_count(&json!(null)), None);
    }

    #[test]
    fn info_with_bad_counters_still_parses() {
        let value = json!({
            "description": "hi",
            "version": "4.2.0",
            "stats": {"domain_count": 10, "status_count": "many", "user_count": -5}
        });
        let (info, empty) = parse_info(&value).unwrap();
        assert!(!empty);
        let meta = info.into_metadata();
        assert_eq!(meta.description.as_deref(), Some("hi"));
        assert_eq!(meta.domain_count, Some(10));
        assert_eq!(meta.status_count, None);
        assert_eq!(meta.user_count, None);
    }

    #[test]
    fn empty_info_object_is_flagged() {
        let (_, empty) = parse_info(&json!({})).unwrap();
        assert!(empty);
        assert!(parse_info(&json!([1, 2])).is_err());
    }

    #[test]
    fn pagination_stops_on_empty_page() {
        assert_eq!(next_page_cursor(&[], 0, at(0), 5000), None);
    }

    #[test]
    fn pagination_continues_from_last_id_inside_window() {
        let page = vec![post("30", at(30)), post("20", at(20))];
        assert_eq!(
            next_page_cursor(&page, 2, at(0), 5000).as_deref(),
            Some("20")
        );
    }

    #[test]
    fn pagination_stops_once_window_is_passed() {
        let page = vec![post("30", at(30)), post("20", at(-1))];
        assert_eq!(next_page_cursor(&page, 2, at(0), 5000), None);
    }

    #[test]
    fn pagination_stops_at_status_cap() {
        let page = vec![post("30", at(30)), post("20", at(20))];
        assert_eq!(next_page_cursor(&page, 5000, at(0), 5000), None);
        assert!(next_page_cursor(&page, 4999, at(0), 5000).is_some());
    }

    #[test]
    fn settings_follow_config() {
        let settings = ClientSettings::from_config(&CrawlSection::default());
        assert_eq!(settings.scheme, "https");
        assert_eq!(settings.timeout, Duration::from_secs(20));
        assert_eq!(settings.mention_window, chrono::Duration::days(31));
        assert_eq!(settings.page_delay, Duration::from_secs(2));
    }

    #[test]
    fn personal_instance_respects_allowlist() {
        let allow = Arc::new(StaticAllowList::from_names(["tiny.example"]));
        let client = MastodonClient::new(test_settings(), allow).unwrap();
        let info: InstanceInfo =
            serde_json::from_value(json!({"stats": {"user_count": 3}})).unwrap();
        assert_eq!(client.is_personal("solo.example", &info), Some(3));
        assert_eq!(client.is_personal("tiny.example", &info), None);

        let big: InstanceInfo =
            serde_json::from_value(json!({"stats": {"user_count": 10}})).unwrap();
        assert_eq!(client.is_personal("solo.example", &big), None);

        let unknown: InstanceInfo = serde_json::from_value(json!({"stats": {}})).unwrap();
        assert_eq!(client.is_personal("solo.example", &unknown), None);
    }

    #[test]
    fn urls_use_configured_scheme() {
        let client =
            MastodonClient::new(test_settings(), Arc::new(StaticAllowList::empty())).unwrap();
        assert_eq!(
            client.url("b.social", PEERS_PATH),
            "http://b.social/api/v1/instance/peers"
        );
    }

    #[tokio::test]
    async fn refused_connection_is_network_failure() {
        let client =
            MastodonClient::new(test_settings(), Arc::new(StaticAllowList::empty())).unwrap();
        let failure = client.fetch("127.0.0.1:1").await.unwrap_err();
        assert_eq!(failure.kind, FailureKind::NetworkFailure);
    }
}
