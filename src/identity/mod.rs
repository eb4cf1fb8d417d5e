//! # User Identity
//!
//! Persistent anonymous identity for the local user: a UUID generated
//! on first use and kept in the injected key-value store, plus an
//! optional display name and the user number assigned by the server
//! after registration.
//!
//! Store failures never break identity: reads and writes degrade to an
//! in-memory value with a warning, so tracking continues even when the
//! backing file is unusable.

use serde::Serialize;
use std::sync::{Arc, Mutex};
use tracing::warn;
use uuid::Uuid;

use crate::storage::KeyValueStore;

const USER_ID_KEY: &str = "user_id";
const USER_NAME_KEY: &str = "user_name";
const USER_NUM_KEY: &str = "user_num";

/// Snapshot of everything known about the local user.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct UserInfo {
    pub id: String,
    pub name: Option<String>,
    pub user_num: Option<u32>,
    /// Operating system the client runs on
    pub platform: &'static str,
}

/// Identity service over an injected key-value store.
pub struct UserIdentity {
    store: Arc<dyn KeyValueStore>,
    cached_id: Mutex<Option<String>>,
    cached_num: Mutex<Option<u32>>,
}

impl UserIdentity {
    /// Create the service and warm the identity cache.
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        let identity = Self {
            store,
            cached_id: Mutex::new(None),
            cached_num: Mutex::new(None),
        };
        identity.user_id();
        identity
    }

    /// The persistent user id, generating and storing a fresh UUID on
    /// first use.
    pub fn user_id(&self) -> String {
        let mut cached = self.cached_id.lock().unwrap();
        if let Some(id) = cached.as_ref() {
            return id.clone();
        }

        match self.store.get(USER_ID_KEY) {
            Ok(Some(stored)) => {
                *cached = Some(stored.clone());
                return stored;
            }
            Ok(None) => {}
            Err(e) => warn!("could not read user id from store: {}", e),
        }

        let fresh = Uuid::new_v4().to_string();
        *cached = Some(fresh.clone());
        if let Err(e) = self.store.set(USER_ID_KEY, &fresh) {
            warn!("could not persist user id, continuing in-memory: {}", e);
        }
        fresh
    }

    /// The stored display name, if any.
    pub fn user_name(&self) -> Option<String> {
        match self.store.get(USER_NAME_KEY) {
            Ok(name) => name,
            Err(e) => {
                warn!("could not read user name from store: {}", e);
                None
            }
        }
    }

    pub fn set_user_name(&self, name: &str) {
        if let Err(e) = self.store.set(USER_NAME_KEY, name) {
            warn!("could not persist user name: {}", e);
        }
    }

    /// The user number assigned by the server, if registration happened.
    pub fn user_num(&self) -> Option<u32> {
        let mut cached = self.cached_num.lock().unwrap();
        if cached.is_some() {
            return *cached;
        }

        match self.store.get(USER_NUM_KEY) {
            Ok(Some(stored)) => match stored.parse() {
                Ok(num) => {
                    *cached = Some(num);
                    Some(num)
                }
                Err(_) => {
                    warn!("stored user number {:?} is not a number, ignoring", stored);
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!("could not read user number from store: {}", e);
                None
            }
        }
    }

    /// Record the user number the server assigned on registration.
    pub fn set_user_num(&self, num: u32) {
        *self.cached_num.lock().unwrap() = Some(num);
        if let Err(e) = self.store.set(USER_NUM_KEY, &num.to_string()) {
            warn!("could not persist user number: {}", e);
        }
    }

    /// Everything known about the local user, for the channel hello.
    pub fn info(&self) -> UserInfo {
        UserInfo {
            id: self.user_id(),
            name: self.user_name(),
            user_num: self.user_num(),
            platform: std::env::consts::OS,
        }
    }

    /// Forget the stored id so the next call generates a new one.
    /// Changes the user's identity permanently; intended for tests.
    pub fn reset(&self) {
        if let Err(e) = self.store.remove(USER_ID_KEY) {
            warn!("could not remove stored user id: {}", e);
        }
        *self.cached_id.lock().unwrap() = None;
    }
}
