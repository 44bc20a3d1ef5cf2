//! User-facing notifications.
//!
//! Every capture and sync outcome produces a short notification. The
//! [`NotificationCenter`] keeps a bounded feed of the most recent ones for
//! the UI to poll and mirrors each one into the log.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

/// Maximum number of notifications retained in the feed.
pub const DEFAULT_FEED_CAPACITY: usize = 100;

/// Presentation hint for a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationVariant {
    /// Informational or success message.
    Default,
    /// Something went wrong and the user may need to act.
    Destructive,
}

/// A single user-facing message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub title: String,
    pub description: String,
    pub variant: NotificationVariant,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn info(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self::with_variant(title, description, NotificationVariant::Default)
    }

    pub fn destructive(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self::with_variant(title, description, NotificationVariant::Destructive)
    }

    fn with_variant(
        title: impl Into<String>,
        description: impl Into<String>,
        variant: NotificationVariant,
    ) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            variant,
            created_at: Utc::now(),
        }
    }
}

/// Bounded, shared feed of recent notifications.
#[derive(Clone)]
pub struct NotificationCenter {
    feed: Arc<Mutex<VecDeque<Notification>>>,
    capacity: usize,
}

impl Default for NotificationCenter {
    fn default() -> Self {
        Self::new(DEFAULT_FEED_CAPACITY)
    }
}

impl NotificationCenter {
    pub fn new(capacity: usize) -> Self {
        Self {
            feed: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity: capacity.max(1),
        }
    }

    /// Publish a notification, evicting the oldest one when full.
    pub fn publish(&self, notification: Notification) {
        match notification.variant {
            NotificationVariant::Default => info!(
                title = %notification.title,
                description = %notification.description,
                "Notification"
            ),
            NotificationVariant::Destructive => warn!(
                title = %notification.title,
                description = %notification.description,
                "Notification"
            ),
        }

        let mut feed = self.feed.lock().unwrap_or_else(|e| e.into_inner());
        if feed.len() == self.capacity {
            feed.pop_front();
        }
        feed.push_back(notification);
    }

    /// The most recent notifications, newest first.
    pub fn recent(&self, limit: usize) -> Vec<Notification> {
        let feed = self.feed.lock().unwrap_or_else(|e| e.into_inner());
        feed.iter().rev().take(limit).cloned().collect()
    }

    /// The newest notification, if any.
    pub fn latest(&self) -> Option<Notification> {
        self.recent(1).into_iter().next()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recent_is_newest_first() {
        let center = NotificationCenter::default();
        center.publish(Notification::info("first", ""));
        center.publish(Notification::info("second", ""));

        let titles: Vec<_> = center.recent(10).into_iter().map(|n| n.title).collect();
        assert_eq!(titles, vec!["second", "first"]);
    }

    #[test]
    fn test_feed_is_bounded() {
        let center = NotificationCenter::new(2);
        for title in ["a", "b", "c"] {
            center.publish(Notification::info(title, ""));
        }

        let titles: Vec<_> = center.recent(10).into_iter().map(|n| n.title).collect();
        assert_eq!(titles, vec!["c", "b"]);
    }

    #[test]
    fn test_latest_on_empty_feed() {
        assert!(NotificationCenter::default().latest().is_none());
    }

    #[test]
    fn test_variant_serialization() {
        let notification = Notification::destructive("Location error", "no fix");
        let value = serde_json::to_value(&notification).unwrap();
        assert_eq!(value["variant"], "destructive");
    }
}
