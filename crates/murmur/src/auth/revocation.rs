//! Process-wide list of revoked token ids.
//!
//! Entries live until the revoked token would have expired on its own. Expired
//! entries are evicted lazily on every lookup and insert, so the list never
//! holds more than the tokens revoked within one token lifetime.

use chrono::{DateTime, Utc};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct Entries {
    /// Token id -> expiry (unix seconds).
    expiry_by_id: HashMap<String, i64>,
    /// Min-heap of (expiry, token id) for eviction.
    by_expiry: BinaryHeap<Reverse<(i64, String)>>,
}

impl Entries {
    fn evict_expired(&mut self, now: i64) {
        while let Some(Reverse((expiry, _))) = self.by_expiry.peek() {
            if *expiry > now {
                break;
            }
            let Some(Reverse((expiry, token_id))) = self.by_expiry.pop() else {
                break;
            };
            // A later re-revocation may have extended the entry.
            if self.expiry_by_id.get(&token_id) == Some(&expiry) {
                self.expiry_by_id.remove(&token_id);
            }
        }
    }
}

/// Revoked token ids with their expiry times.
#[derive(Debug, Default)]
pub struct RevocationList {
    entries: Mutex<Entries>,
}

impl RevocationList {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Entries> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Revoke `token_id` until `expires_at`.
    pub fn revoke(&self, token_id: &str, expires_at: DateTime<Utc>) {
        self.revoke_at(token_id, expires_at, Utc::now());
    }

    /// Revoke `token_id` until `expires_at`, evaluated at `now`.
    pub fn revoke_at(&self, token_id: &str, expires_at: DateTime<Utc>, now: DateTime<Utc>) {
        let expiry = expires_at.timestamp();
        let now = now.timestamp();

        let mut entries = self.lock();
        entries.evict_expired(now);
        if expiry <= now {
            return;
        }

        let current = entries
            .expiry_by_id
            .entry(token_id.to_string())
            .or_insert(expiry);
        if *current < expiry {
            *current = expiry;
        }
        let stored = *current;
        entries.by_expiry.push(Reverse((stored, token_id.to_string())));
    }

    /// Whether `token_id` is revoked at `now`.
    pub fn is_revoked_at(&self, token_id: &str, now: DateTime<Utc>) -> bool {
        let mut entries = self.lock();
        entries.evict_expired(now.timestamp());
        entries.expiry_by_id.contains_key(token_id)
    }

    pub fn is_revoked(&self, token_id: &str) -> bool {
        self.is_revoked_at(token_id, Utc::now())
    }

    /// Number of live entries, including ones not yet evicted.
    pub fn len(&self) -> usize {
        self.lock().expiry_by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
