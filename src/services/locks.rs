use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::NaiveDate;

/// Advisory admission locks, one per (room, date).
///
/// Creation for the same room and day must serialize its overlap check and
/// insert; creations for other rooms or days share nothing. The lock is an
/// explicit token rather than a property of the storage engine, so it holds
/// regardless of how connections are pooled underneath.
#[derive(Default)]
pub struct SlotLocks {
    inner: Mutex<HashMap<(i64, NaiveDate), Arc<Mutex<()>>>>,
}

impl SlotLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the lock for a room and date, creating it on first use.
    /// Callers hold the returned guard for the duration of admission only.
    pub fn acquire(&self, room_id: i64, date: NaiveDate) -> Arc<Mutex<()>> {
        let mut map = self.inner.lock().unwrap();
        Arc::clone(map.entry((room_id, date)).or_default())
    }
}
