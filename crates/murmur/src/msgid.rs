//! Time-sortable message identifiers.

use std::sync::{Mutex, PoisonError};
use uuid::Uuid;

/// Generates globally unique, time-ordered message ids.
///
/// Ids are UUIDv7 values rendered as lowercase hyphenated hex, so lexical
/// order equals numeric order equals issuance order. Ids issued by one
/// generator strictly increase, even within a single millisecond or when the
/// wall clock steps backwards.
#[derive(Debug, Default)]
pub struct MessageIdGenerator {
    last: Mutex<u128>,
}

impl MessageIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue the next id.
    pub fn next_id(&self) -> String {
        let candidate = Uuid::now_v7().as_u128();
        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        let value = if candidate > *last {
            candidate
        } else {
            last.wrapping_add(1)
        };
        *last = value;
        Uuid::from_u128(value).to_string()
    }
}
