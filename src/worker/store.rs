// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Resident value storage for one worker session
//!
//! Eviction rules:
//! - at most `capacity` entries; inserting beyond that evicts the least
//!   recently used entry
//! - with a TTL, entries idle longer than the TTL are purged
//! - `release` evicts explicitly
//!
//! Evicted ids are never reissued.

use crate::protocol::{RemoteHandle, SessionId, SessionStats};
use lru::LruCache;
use serde_json::Value;
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

#[derive(Debug)]
struct Entry {
    value: Value,
    last_used: Instant,
}

/// Values kept resident for a single session
#[derive(Debug)]
pub struct HandleStore {
    session: SessionId,
    entries: LruCache<u64, Entry>,
    ttl: Option<Duration>,
    next_id: u64,
    evicted: u64,
}

impl HandleStore {
    pub fn new(session: SessionId, capacity: usize, ttl: Option<Duration>) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            session,
            entries: LruCache::new(capacity),
            ttl,
            next_id: 1,
            evicted: 0,
        }
    }

    pub fn session(&self) -> SessionId {
        self.session
    }

    /// Store a value and issue a handle for it
    pub fn insert(&mut self, value: Value) -> RemoteHandle {
        let id = self.next_id;
        self.next_id += 1;

        let entry = Entry {
            value,
            last_used: Instant::now(),
        };
        // Ids are fresh, so anything pushed out is the least recently used entry
        if let Some((evicted, _)) = self.entries.push(id, entry) {
            self.evicted += 1;
            log::debug!(
                "session {}: evicted handle {} (capacity {})",
                self.session,
                evicted,
                self.entries.cap()
            );
        }
        RemoteHandle::new(self.session, id)
    }

    /// Borrow a resident value, marking it as recently used
    pub fn get(&mut self, handle: &RemoteHandle) -> Option<&Value> {
        if !handle.belongs_to(self.session) {
            return None;
        }
        let entry = self.entries.get_mut(&handle.id)?;
        entry.last_used = Instant::now();
        Some(&entry.value)
    }

    pub fn contains(&self, handle: &RemoteHandle) -> bool {
        handle.belongs_to(self.session) && self.entries.contains(&handle.id)
    }

    /// Drop a value; returns whether it was resident
    pub fn release(&mut self, handle: &RemoteHandle) -> bool {
        if !handle.belongs_to(self.session) {
            return false;
        }
        let existed = self.entries.pop(&handle.id).is_some();
        if existed {
            self.evicted += 1;
        }
        existed
    }

    /// Purge entries idle past the TTL as of `now`; returns how many
    pub fn purge_expired(&mut self, now: Instant) -> usize {
        let Some(ttl) = self.ttl else {
            return 0;
        };
        let expired: Vec<u64> = self
            .entries
            .iter()
            .filter(|(_, entry)| now.saturating_duration_since(entry.last_used) > ttl)
            .map(|(id, _)| *id)
            .collect();
        for id in &expired {
            self.entries.pop(id);
        }
        self.evicted += expired.len() as u64;
        expired.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> SessionStats {
        SessionStats {
            resident: self.entries.len(),
            capacity: self.entries.cap().get(),
            evicted: self.evicted,
            ttl_ms: self.ttl.map(|ttl| ttl.as_millis() as u64),
        }
    }
}
