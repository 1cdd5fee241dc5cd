/*
 * Copyright (c) 2024. Govcraft
 *
 * Licensed under either of
 *   * Apache License, Version 2.0 (the "License");
 *     you may not use this file except in compliance with the License.
 *     You may obtain a copy of the License at http://www.apache.org/licenses/LICENSE-2.0
 *   * MIT license: http://opensource.org/licenses/MIT
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the applicable License for the specific language governing permissions and
 * limitations under that License.
 */

//! Correlation table mapping transport call identities to waiting callers.
//!
//! Every outstanding request has exactly one [`PendingCall`], keyed by the
//! [`CallIdentity`] the transport assigned to it. Replies look their entry
//! up with [`CorrelationTable::resolve_and_remove`], which hands the waiter
//! back at most once.

use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{error, trace};

use crate::message::{CallIdentity, CorrelationError};

/// Statistics for a correlation table.
#[derive(Debug, Default)]
pub struct CorrelationStats {
    /// Total entries registered.
    pub registered: AtomicUsize,
    /// Total entries resolved by a reply.
    pub resolved: AtomicUsize,
    /// Lookups that found no entry.
    pub misses: AtomicUsize,
    /// Registrations rejected because the identity was already pending.
    pub duplicates: AtomicUsize,
    /// Entries removed without a reply (caller teardown or drain).
    pub purged: AtomicUsize,
}

impl CorrelationStats {
    /// Number of entries registered.
    #[must_use]
    pub fn registered(&self) -> usize {
        self.registered.load(Ordering::Relaxed)
    }

    /// Number of entries resolved.
    #[must_use]
    pub fn resolved(&self) -> usize {
        self.resolved.load(Ordering::Relaxed)
    }

    /// Number of lookups that found nothing.
    #[must_use]
    pub fn misses(&self) -> usize {
        self.misses.load(Ordering::Relaxed)
    }

    /// Number of rejected duplicate registrations.
    #[must_use]
    pub fn duplicates(&self) -> usize {
        self.duplicates.load(Ordering::Relaxed)
    }

    /// Number of entries purged without a reply.
    #[must_use]
    pub fn purged(&self) -> usize {
        self.purged.load(Ordering::Relaxed)
    }
}

/// One in-flight request awaiting its reply.
#[derive(Debug, Clone)]
pub struct PendingCall<W> {
    /// Correlation key.
    pub identity: CallIdentity,
    /// Who receives the outcome.
    pub waiter: W,
    /// When the entry was created.
    pub registered_at: Instant,
}

/// Identity-to-waiter map guarded by a single coarse lock.
///
/// All operations are O(1) map accesses except [`remove_all_for`] and
/// [`drain`], which are only used on teardown paths.
///
/// [`remove_all_for`]: CorrelationTable::remove_all_for
/// [`drain`]: CorrelationTable::drain
pub struct CorrelationTable<W> {
    pending: Mutex<HashMap<CallIdentity, PendingCall<W>>>,
    stats: CorrelationStats,
}

impl<W> Default for CorrelationTable<W> {
    fn default() -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
            stats: CorrelationStats::default(),
        }
    }
}

impl<W> Debug for CorrelationTable<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CorrelationTable")
            .field("pending", &self.pending.lock().len())
            .field("stats", &self.stats)
            .finish()
    }
}

impl<W> CorrelationTable<W>
where
    W: Clone + PartialEq + Debug + Send,
{
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a reference to the statistics.
    #[must_use]
    pub const fn stats(&self) -> &CorrelationStats {
        &self.stats
    }

    /// Records a pending call for `identity`.
    ///
    /// # Errors
    ///
    /// [`CorrelationError::DuplicateIdentity`] if `identity` is already
    /// pending. The existing entry is left untouched.
    pub fn register(&self, identity: CallIdentity, waiter: W) -> Result<(), CorrelationError> {
        let mut pending = self.pending.lock();
        self.insert_locked(&mut pending, identity, waiter)
    }

    /// Runs `publish` with the table locked and records its identity.
    ///
    /// A delivery callback looking up the identity blocks until the entry
    /// exists, so a reply can never overtake its own registration. Nothing
    /// is recorded if `publish` fails.
    ///
    /// # Errors
    ///
    /// Returns the publication error, or the duplicate-registration error
    /// converted into `E`.
    pub fn register_with<E, F>(&self, waiter: W, publish: F) -> Result<CallIdentity, E>
    where
        F: FnOnce() -> Result<CallIdentity, E>,
        E: From<CorrelationError>,
    {
        let mut pending = self.pending.lock();
        let identity = publish()?;
        self.insert_locked(&mut pending, identity, waiter)?;
        Ok(identity)
    }

    fn insert_locked(
        &self,
        pending: &mut HashMap<CallIdentity, PendingCall<W>>,
        identity: CallIdentity,
        waiter: W,
    ) -> Result<(), CorrelationError> {
        if pending.contains_key(&identity) {
            self.stats.duplicates.fetch_add(1, Ordering::Relaxed);
            error!(%identity, ?waiter, "Pending call already registered for identity");
            return Err(CorrelationError::DuplicateIdentity(identity));
        }
        trace!(%identity, ?waiter, "Registering pending call");
        pending.insert(
            identity,
            PendingCall {
                identity,
                waiter,
                registered_at: Instant::now(),
            },
        );
        self.stats.registered.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Looks up and removes the entry for `identity`.
    ///
    /// `None` means no request is outstanding for it: a duplicate delivery,
    /// a delivery after teardown, or a reply to somebody else's call.
    pub fn resolve_and_remove(&self, identity: &CallIdentity) -> Option<W> {
        let removed = self.pending.lock().remove(identity);
        match removed {
            Some(call) => {
                self.stats.resolved.fetch_add(1, Ordering::Relaxed);
                trace!(%identity, waiter = ?call.waiter, "Resolved pending call");
                Some(call.waiter)
            }
            None => {
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                trace!(%identity, "No pending call for identity");
                None
            }
        }
    }

    /// Removes every entry whose waiter equals `waiter`.
    ///
    /// Returns the number of entries removed.
    pub fn remove_all_for(&self, waiter: &W) -> usize {
        let mut pending = self.pending.lock();
        let before = pending.len();
        pending.retain(|_, call| call.waiter != *waiter);
        let removed = before - pending.len();
        drop(pending);

        if removed > 0 {
            self.stats.purged.fetch_add(removed, Ordering::Relaxed);
            trace!(?waiter, removed, "Purged pending calls for waiter");
        }
        removed
    }

    /// Removes and returns all entries.
    pub fn drain(&self) -> Vec<PendingCall<W>> {
        let drained: Vec<_> = self.pending.lock().drain().map(|(_, call)| call).collect();
        self.stats.purged.fetch_add(drained.len(), Ordering::Relaxed);
        drained
    }

    /// Whether `identity` is pending.
    #[must_use]
    pub fn contains(&self, identity: &CallIdentity) -> bool {
        self.pending.lock().contains_key(identity)
    }

    /// Number of pending calls.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    /// Returns `true` if nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }

    /// Age of the oldest pending call, if any.
    ///
    /// Hosts use this to enforce their own timeout policy; the table never
    /// expires entries on its own.
    #[must_use]
    pub fn oldest_pending_age(&self) -> Option<Duration> {
        self.pending
            .lock()
            .values()
            .map(|call| call.registered_at.elapsed())
            .max()
    }
}
