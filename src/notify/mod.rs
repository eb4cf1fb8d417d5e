//! # Notification Log
//!
//! In-app notification feed: newest-first entries with read tracking,
//! capped at a fixed size and persisted as JSON through the injected
//! key-value store. Loading tolerates a missing or corrupt stored
//! value, so a broken store never blocks startup.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tracing::warn;
use uuid::Uuid;

use crate::storage::KeyValueStore;

/// Maximum number of retained notifications
pub const MAX_ENTRIES: usize = 50;

const STORE_KEY: &str = "notifications";

/// Notification severity, mirrored in the UI styling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Success,
    Error,
    Warning,
    Info,
}

/// One entry in the notification feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub message: String,
    pub severity: Severity,
    pub timestamp: DateTime<Utc>,
    pub read: bool,
}

/// Notification feed over an injected key-value store.
pub struct NotificationLog {
    store: Arc<dyn KeyValueStore>,
    entries: Mutex<Vec<Notification>>,
}

impl NotificationLog {
    /// Create the log, loading previously stored notifications.
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        let entries = match store.get(STORE_KEY) {
            Ok(Some(stored)) => match serde_json::from_str(&stored) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!("stored notifications are not valid JSON, starting empty: {}", e);
                    Vec::new()
                }
            },
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!("could not load notifications from store: {}", e);
                Vec::new()
            }
        };

        Self {
            store,
            entries: Mutex::new(entries),
        }
    }

    /// Add a notification at the head of the feed and persist.
    pub fn push(&self, message: impl Into<String>, severity: Severity) -> Notification {
        let notification = Notification {
            id: Uuid::new_v4().to_string(),
            message: message.into(),
            severity,
            timestamp: Utc::now(),
            read: false,
        };

        let mut entries = self.entries.lock().unwrap();
        entries.insert(0, notification.clone());
        entries.truncate(MAX_ENTRIES);
        self.persist(&entries);

        notification
    }

    /// Snapshot of the feed, newest first.
    pub fn entries(&self) -> Vec<Notification> {
        self.entries.lock().unwrap().clone()
    }

    /// How many entries have not been marked read.
    pub fn unread_count(&self) -> usize {
        self.entries.lock().unwrap().iter().filter(|n| !n.read).count()
    }

    /// Mark one entry read. Returns whether anything changed.
    pub fn mark_read(&self, id: &str) -> bool {
        let mut entries = self.entries.lock().unwrap();
        match entries.iter_mut().find(|n| n.id == id && !n.read) {
            Some(notification) => {
                notification.read = true;
                self.persist(&entries);
                true
            }
            None => false,
        }
    }

    /// Mark every entry read.
    pub fn mark_all_read(&self) {
        let mut entries = self.entries.lock().unwrap();
        let mut changed = false;
        for notification in entries.iter_mut() {
            if !notification.read {
                notification.read = true;
                changed = true;
            }
        }
        if changed {
            self.persist(&entries);
        }
    }

    /// Remove one entry by id.
    pub fn remove(&self, id: &str) {
        let mut entries = self.entries.lock().unwrap();
        let before = entries.len();
        entries.retain(|n| n.id != id);
        if entries.len() != before {
            self.persist(&entries);
        }
    }

    /// Drop all entries.
    pub fn clear(&self) {
        let mut entries = self.entries.lock().unwrap();
        entries.clear();
        self.persist(&entries);
    }

    fn persist(&self, entries: &[Notification]) {
        let encoded = match serde_json::to_string(entries) {
            Ok(encoded) => encoded,
            Err(e) => {
                warn!("could not encode notifications: {}", e);
                return;
            }
        };
        if let Err(e) = self.store.set(STORE_KEY, &encoded) {
            warn!("could not persist notifications: {}", e);
        }
    }
}
