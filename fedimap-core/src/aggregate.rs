//! Reduce a batch of timeline posts into per-instance mention counts.
//!
//! Pure and deterministic: the same posts and window start always produce
//! the same [`MentionSummary`], whatever order the posts arrive in.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::types::{MentionSummary, Post};

/// Count cross-instance mentions in `posts` published at or after `window_start`.
///
/// `posts_inspected` counts every post handed in, including those outside
/// the window, so it can serve as the mention-ratio denominator.
pub fn reduce(posts: &[Post], instance: &str, window_start: DateTime<Utc>) -> MentionSummary {
    let mut mentions: HashMap<String, u64> = HashMap::new();

    for mention in posts
        .iter()
        .filter(|post| post.created_at >= window_start)
        .flat_map(|post| &post.mentions)
    {
        if let Some(target) = mention_target(&mention.acct, instance) {
            *mentions.entry(target).or_insert(0) += 1;
        }
    }

    MentionSummary {
        mentions,
        posts_inspected: posts.len() as u64,
    }
}

/// Instance named by an account identifier, if it is remote to `source`.
///
/// `user@domain` yields `domain` (lowercased). Local-only accounts (`user`),
/// empty suffixes and self-mentions yield `None`.
pub fn mention_target(acct: &str, source: &str) -> Option<String> {
    let (_, domain) = acct.rsplit_once('@')?;
    let domain = domain.trim().to_lowercase();
    if domain.is_empty() || domain.eq_ignore_ascii_case(source) {
        return None;
    }
    Some(domain)
}
