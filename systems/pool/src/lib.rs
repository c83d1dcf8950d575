#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Generational reuse pool for high-churn simulation objects.
//!
//! Every slot is either parked on the pool's free-list or held active by the
//! caller that acquired it, never both. Releasing a slot bumps its generation,
//! which invalidates every [`PoolKey`] issued for the previous occupancy.

use tower_defense_core::PoolKey;

/// Visual/state flag requested when acquiring an instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Activation {
    /// The instance is handed out visible and participating.
    Active,
    /// The instance is handed out hidden; the holder enables it later.
    Inactive,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SlotState {
    InPool,
    Active,
}

#[derive(Debug)]
struct Slot<T> {
    value: T,
    generation: u32,
    state: SlotState,
    visible: bool,
}

/// Unbounded pool that recycles instances of `T`.
#[derive(Debug)]
pub struct Pool<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
}

impl<T: Default> Pool<T> {
    /// Creates an empty pool.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Creates a pool pre-warmed with `prewarm` parked instances.
    ///
    /// Pre-warming stops early once the key space is exhausted.
    #[must_use]
    pub fn with_capacity(prewarm: usize) -> Self {
        let mut pool = Self {
            slots: Vec::with_capacity(prewarm),
            free: Vec::with_capacity(prewarm),
        };
        for _ in 0..prewarm {
            let Some(index) = pool.push_slot(SlotState::InPool) else {
                break;
            };
            pool.free.push(index);
        }
        pool
    }

    /// Hands out a recycled instance, constructing a new one when the
    /// free-list is empty.
    ///
    /// Recycled instances keep whatever state they held when released; the
    /// caller is responsible for re-initialising them. Returns `None` only
    /// when the free-list is empty and no further slot can be addressed by a
    /// [`PoolKey`].
    pub fn acquire(&mut self, activation: Activation) -> Option<PoolKey> {
        let index = match self.free.pop() {
            Some(index) => index,
            None => {
                tracing::trace!(capacity = self.slots.len(), "pool exhausted, growing");
                self.push_slot(SlotState::InPool)?
            }
        };

        let slot = self.slots.get_mut(index as usize)?;
        slot.state = SlotState::Active;
        slot.visible = activation == Activation::Active;
        Some(PoolKey::new(index, slot.generation))
    }

    fn push_slot(&mut self, state: SlotState) -> Option<u32> {
        let Some(index) = slot_index(self.slots.len()) else {
            tracing::warn!(capacity = self.slots.len(), "pool key space exhausted");
            return None;
        };
        self.slots.push(Slot {
            value: T::default(),
            generation: 0,
            state,
            visible: false,
        });
        Some(index)
    }
}

/// Index the next slot would occupy, if a key can address it.
fn slot_index(len: usize) -> Option<u32> {
    u32::try_from(len).ok()
}

impl<T: Default> Default for Pool<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Pool<T> {
    /// Returns an instance to the free-list.
    ///
    /// Releasing a stale key or an already parked instance is a no-op and
    /// reports `false`.
    pub fn release(&mut self, key: PoolKey) -> bool {
        let Some(slot) = self.live_slot_mut(key) else {
            return false;
        };

        slot.state = SlotState::InPool;
        slot.visible = false;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(key.index());
        true
    }

    /// Reports whether the key refers to a currently active instance.
    #[must_use]
    pub fn contains(&self, key: PoolKey) -> bool {
        self.live_slot(key).is_some()
    }

    /// Borrows the active instance referenced by the key.
    #[must_use]
    pub fn get(&self, key: PoolKey) -> Option<&T> {
        self.live_slot(key).map(|slot| &slot.value)
    }

    /// Mutably borrows the active instance referenced by the key.
    pub fn get_mut(&mut self, key: PoolKey) -> Option<&mut T> {
        self.live_slot_mut(key).map(|slot| &mut slot.value)
    }

    /// Visual flag of an active instance.
    #[must_use]
    pub fn is_visible(&self, key: PoolKey) -> Option<bool> {
        self.live_slot(key).map(|slot| slot.visible)
    }

    /// Updates the visual flag of an active instance.
    pub fn set_visible(&mut self, key: PoolKey, visible: bool) -> bool {
        match self.live_slot_mut(key) {
            Some(slot) => {
                slot.visible = visible;
                true
            }
            None => false,
        }
    }

    /// Iterates over active instances in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (PoolKey, &T)> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.state == SlotState::Active)
            .map(|(index, slot)| (PoolKey::new(index as u32, slot.generation), &slot.value))
    }

    /// Number of instances currently held by callers.
    #[must_use]
    pub fn active_len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    /// Number of instances parked on the free-list.
    #[must_use]
    pub fn free_len(&self) -> usize {
        self.free.len()
    }

    /// Total number of instances ever created by the pool.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    fn live_slot(&self, key: PoolKey) -> Option<&Slot<T>> {
        self.slots
            .get(key.index() as usize)
            .filter(|slot| slot.state == SlotState::Active && slot.generation == key.generation())
    }

    fn live_slot_mut(&mut self, key: PoolKey) -> Option<&mut Slot<T>> {
        self.slots
            .get_mut(key.index() as usize)
            .filter(|slot| slot.state == SlotState::Active && slot.generation == key.generation())
    }
}
