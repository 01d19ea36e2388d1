//! # Process-wide Group Contexts
//!
//! One [`GroupContext`] per group this process currently takes part in. The
//! first frame that touches a group creates the context and, as owner, removes
//! it on teardown; frames that find it already present are "in group" and
//! leave it alone.
//!
//! The context also carries the group's lifetime clock, which gates notify,
//! and a completion signal that teardown broadcasts to every waiter.

use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug)]
pub struct GroupContext {
    group_id: String,
    started: Instant,
    completion: Notify,
    completed: AtomicBool,
}

impl GroupContext {
    fn new(group_id: &str) -> Self {
        Self {
            group_id: group_id.to_string(),
            started: Instant::now(),
            completion: Notify::new(),
            completed: AtomicBool::new(false),
        }
    }

    pub fn group_id(&self) -> &str {
        &self.group_id
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn is_completed(&self) -> bool {
        self.completed.load(Ordering::SeqCst)
    }

    /// Marks the group complete and wakes every waiter.
    pub fn complete(&self) {
        self.completed.store(true, Ordering::SeqCst);
        self.completion.notify_waiters();
    }

    /// Resolves once [`complete`](Self::complete) has been called.
    pub async fn wait_for_completion(&self) {
        let notified = self.completion.notified();
        tokio::pin!(notified);
        // Register before checking the flag so a concurrent complete() is not missed.
        notified.as_mut().enable();
        if self.is_completed() {
            return;
        }
        notified.await;
    }
}

#[derive(Debug)]
pub struct GlobalContext {
    groups: DashMap<String, Arc<GroupContext>>,
    dtx_time: Duration,
}

impl GlobalContext {
    pub fn new(dtx_time: Duration) -> Self {
        Self {
            groups: DashMap::new(),
            dtx_time,
        }
    }

    /// Returns the context for `group_id` and whether this call created it.
    pub fn start_tx(&self, group_id: &str) -> (Arc<GroupContext>, bool) {
        let mut created = false;
        let context = self
            .groups
            .entry(group_id.to_string())
            .or_insert_with(|| {
                created = true;
                Arc::new(GroupContext::new(group_id))
            })
            .clone();
        if created {
            debug!(%group_id, "Group context started");
        }
        (context, created)
    }

    pub fn context(&self, group_id: &str) -> Option<Arc<GroupContext>> {
        self.groups.get(group_id).map(|entry| entry.value().clone())
    }

    pub fn destroy_tx(&self, group_id: &str) -> Option<Arc<GroupContext>> {
        let removed = self.groups.remove(group_id).map(|(_, context)| context);
        if removed.is_some() {
            debug!(%group_id, "Group context destroyed");
        }
        removed
    }

    /// Whether the group has outlived its allowed lifetime. Unknown groups have not.
    pub fn is_dtx_timeout(&self, group_id: &str) -> bool {
        self.groups
            .get(group_id)
            .is_some_and(|context| context.elapsed() > self.dtx_time)
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}
