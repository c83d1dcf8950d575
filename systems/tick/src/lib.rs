#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Per-frame dispatch of registered participants.
//!
//! The scheduler owns only handles; callers resolve them against their own
//! storage inside the dispatch callback. Mutations requested while a pass is
//! in progress are buffered and committed once the pass ends, removals first.

use std::{collections::HashSet, hash::Hash, mem};

/// Ordered set of tick participants with deferred mutation.
#[derive(Debug)]
pub struct TickScheduler<H> {
    handles: Vec<H>,
    registered: HashSet<H>,
    pending_add: Vec<H>,
    pending_remove: Vec<H>,
    iterating: bool,
}

impl<H> TickScheduler<H>
where
    H: Copy + Eq + Hash,
{
    /// Creates a scheduler without participants.
    #[must_use]
    pub fn new() -> Self {
        Self {
            handles: Vec::new(),
            registered: HashSet::new(),
            pending_add: Vec::new(),
            pending_remove: Vec::new(),
            iterating: false,
        }
    }

    /// Registers a participant.
    ///
    /// Registering an already registered handle is a no-op, except that it
    /// cancels a removal requested earlier in the same pass.
    pub fn register(&mut self, handle: H) {
        if self.iterating {
            if self.registered.contains(&handle) {
                self.pending_remove.retain(|pending| *pending != handle);
            } else if !self.pending_add.contains(&handle) {
                self.pending_add.push(handle);
            }
            return;
        }

        if self.registered.insert(handle) {
            self.handles.push(handle);
        }
    }

    /// Unregisters a participant.
    ///
    /// Unregistering an unknown handle is a no-op, except that it cancels an
    /// addition requested earlier in the same pass.
    pub fn unregister(&mut self, handle: H) {
        if self.iterating {
            if self.registered.contains(&handle) {
                if !self.pending_remove.contains(&handle) {
                    self.pending_remove.push(handle);
                }
            } else {
                self.pending_add.retain(|pending| *pending != handle);
            }
            return;
        }

        self.remove_now(handle);
    }

    /// Invokes `tick` once for every participant registered when the pass
    /// begins, then commits buffered mutations.
    ///
    /// The callback receives the scheduler itself so it may register and
    /// unregister participants; those requests take effect after the pass.
    pub fn advance<F>(&mut self, dt: f32, mut tick: F)
    where
        F: FnMut(H, f32, &mut Self),
    {
        if self.iterating {
            tracing::warn!("nested tick pass ignored");
            return;
        }

        self.iterating = true;
        let snapshot = mem::take(&mut self.handles);
        for handle in &snapshot {
            tick(*handle, dt, self);
        }
        self.handles = snapshot;
        self.iterating = false;

        for handle in mem::take(&mut self.pending_remove) {
            self.remove_now(handle);
        }
        for handle in mem::take(&mut self.pending_add) {
            if self.registered.insert(handle) {
                self.handles.push(handle);
            }
        }
    }

    /// Reports whether the handle is registered, ignoring buffered requests.
    #[must_use]
    pub fn contains(&self, handle: H) -> bool {
        self.registered.contains(&handle)
    }

    /// Number of registered participants.
    #[must_use]
    pub fn len(&self) -> usize {
        self.registered.len()
    }

    /// Reports whether no participant is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.registered.is_empty()
    }

    /// Reports whether a tick pass is in progress.
    #[must_use]
    pub fn is_iterating(&self) -> bool {
        self.iterating
    }

    /// Registered participants in their current dispatch order.
    pub fn handles(&self) -> impl Iterator<Item = H> + '_ {
        self.handles.iter().copied()
    }

    fn remove_now(&mut self, handle: H) {
        if !self.registered.remove(&handle) {
            return;
        }
        if let Some(position) = self.handles.iter().position(|candidate| *candidate == handle) {
            let _ = self.handles.swap_remove(position);
        }
    }
}

impl<H> Default for TickScheduler<H>
where
    H: Copy + Eq + Hash,
{
    fn default() -> Self {
        Self::new()
    }
}
