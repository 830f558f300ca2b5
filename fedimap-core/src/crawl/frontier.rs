//! Shared work queue and membership sets for a crawl pass.
//!
//! [`Frontier`] has join-queue semantics: every pushed name counts as
//! unfinished until the [`Ticket`] handed out by [`Frontier::pop`] is
//! dropped. `pop` only returns `None` once the queue is empty *and* nothing
//! is in flight, because an in-flight item may still discover new work.

use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;

use tokio::sync::Notify;

#[derive(Debug, Default)]
struct FrontierState {
    queue: VecDeque<String>,
    unfinished: usize,
}

/// Concurrency-safe queue of instance names still to crawl this pass.
#[derive(Debug, Default)]
pub struct Frontier {
    state: Mutex<FrontierState>,
    changed: Notify,
}

impl Frontier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, name: impl Into<String>) {
        {
            let mut state = self.state.lock().expect("frontier mutex poisoned");
            state.queue.push_back(name.into());
            state.unfinished += 1;
        }
        self.changed.notify_waiters();
    }

    pub fn extend<I, S>(&self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for name in names {
            self.push(name);
        }
    }

    /// Wait for the next name, or `None` once the frontier is drained.
    pub async fn pop(&self) -> Option<Ticket<'_>> {
        loop {
            // Register interest before inspecting state so a push or
            // acknowledgement between the check and the await is not missed.
            let notified = self.changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.state.lock().expect("frontier mutex poisoned");
                if let Some(name) = state.queue.pop_front() {
                    return Some(Ticket {
                        frontier: self,
                        name,
                    });
                }
                if state.unfinished == 0 {
                    return None;
                }
            }

            notified.await;
        }
    }

    /// Names queued but not yet handed out.
    pub fn queued(&self) -> usize {
        self.state.lock().expect("frontier mutex poisoned").queue.len()
    }

    /// Names pushed and not yet acknowledged (queued plus in flight).
    pub fn unfinished(&self) -> usize {
        self.state
            .lock()
            .expect("frontier mutex poisoned")
            .unfinished
    }

    pub fn is_drained(&self) -> bool {
        self.unfinished() == 0
    }

    fn acknowledge(&self) {
        let drained = {
            let mut state = self.state.lock().expect("frontier mutex poisoned");
            state.unfinished = state.unfinished.saturating_sub(1);
            state.unfinished == 0
        };
        if drained {
            self.changed.notify_waiters();
        }
    }
}

/// A dequeued instance name; acknowledged when dropped, on every exit path.
#[derive(Debug)]
pub struct Ticket<'a> {
    frontier: &'a Frontier,
    name: String,
}

impl Ticket<'_> {
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for Ticket<'_> {
    fn drop(&mut self) {
        self.frontier.acknowledge();
    }
}

/// Concurrency-safe set of instance names with atomic insert-if-absent.
#[derive(Debug, Default)]
pub struct InstanceSet {
    names: Mutex<HashSet<String>>,
}

impl InstanceSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_names<I>(names: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        Self {
            names: Mutex::new(names.into_iter().collect()),
        }
    }

    /// Insert `name`; returns `true` only for the caller that added it.
    pub fn insert_if_absent(&self, name: &str) -> bool {
        let mut names = self.names.lock().expect("instance set mutex poisoned");
        if names.contains(name) {
            false
        } else {
            names.insert(name.to_string())
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names
            .lock()
            .expect("instance set mutex poisoned")
            .contains(name)
    }

    pub fn len(&self) -> usize {
        self.names.lock().expect("instance set mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn empty_frontier_is_drained_immediately() {
        let frontier = Frontier::new();
        assert!(frontier.is_drained());
        assert!(frontier.pop().await.is_none());
    }

    #[tokio::test]
    async fn pop_is_fifo_and_ack_on_drop() {
        let frontier = Frontier::new();
        frontier.extend(["a", "b"]);
        assert_eq!(frontier.unfinished(), 2);

        let first = frontier.pop().await.unwrap();
        assert_eq!(first.name(), "a");
        assert_eq!(frontier.queued(), 1);
        drop(first);
        assert_eq!(frontier.unfinished(), 1);

        let second = frontier.pop().await.unwrap();
        assert_eq!(second.name(), "b");
        drop(second);
        assert!(frontier.pop().await.is_none());
    }

    #[tokio::test]
    async fn pop_waits_while_items_are_in_flight() {
        let frontier = Arc::new(Frontier::new());
        frontier.push("seed");
        let ticket = frontier.pop().await.unwrap();

        let waiter = {
            let frontier = Arc::clone(&frontier);
            tokio::spawn(async move { frontier.pop().await.map(|t| t.name().to_string()) })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished(), "must not report drained while seed is in flight");

        // The in-flight item discovers more work before it is acknowledged.
        frontier.push("discovered");
        drop(ticket);

        let next = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(next.as_deref(), Some("discovered"));
    }

    #[tokio::test]
    async fn all_waiters_released_when_drained() {
        let frontier = Arc::new(Frontier::new());
        frontier.push("only");
        let ticket = frontier.pop().await.unwrap();

        let waiters: Vec<_> = (0..4)
            .map(|_| {
                let frontier = Arc::clone(&frontier);
                tokio::spawn(async move { frontier.pop().await.is_none() })
            })
            .collect();

        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(ticket);

        for waiter in waiters {
            let drained = tokio::time::timeout(Duration::from_secs(1), waiter)
                .await
                .unwrap()
                .unwrap();
            assert!(drained);
        }
    }

    #[test]
    fn insert_if_absent_admits_once() {
        let set = InstanceSet::from_names(vec!["a.social".to_string()]);
        assert!(!set.insert_if_absent("a.social"));
        assert!(set.insert_if_absent("b.social"));
        assert!(!set.insert_if_absent("b.social"));
        assert_eq!(set.len(), 2);
        assert!(set.contains("b.social"));
    }

    #[test]
    fn concurrent_inserts_have_one_winner() {
        let set = Arc::new(InstanceSet::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let set = Arc::clone(&set);
                std::thread::spawn(move || set.insert_if_absent("same.social"))
            })
            .collect();
        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
    }
}
