use rustc_hash::FxHashMap;
use slotmap::SlotMap;
use tracing::trace;

slotmap::new_key_type! {
    /// Identity of a [`ScopePool`]. Two nodes share a pool exactly when their ids are equal.
    pub struct PoolId;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolKind {
    /// Everything outside a function body.
    Global,
    Function,
}

/// Flat local-variable table of one call frame (or of the top level).
///
/// Slots are handed out monotonically and never recycled, no matter how deeply nested the block
/// declaring a name was.
#[derive(Debug)]
pub struct ScopePool {
    id: PoolId,
    kind: PoolKind,
    slots: FxHashMap<String, u16>,
    next_slot: u16,
}

impl ScopePool {
    pub fn current(&self) -> PoolId {
        self.id
    }

    pub fn kind(&self) -> PoolKind {
        self.kind
    }

    /// Returns the slot of `name`, allocating the next free one on first use.
    ///
    /// `None` once the frame would need more than `u16::MAX` slots.
    pub fn reserve(&mut self, name: &str) -> Option<u16> {
        if let Some(slot) = self.slots.get(name) {
            return Some(*slot);
        }
        let slot = self.next_slot;
        self.next_slot = slot.checked_add(1)?;
        self.slots.insert(name.to_owned(), slot);
        trace!(pool = ?self.id, name, slot, "reserved local slot");
        Some(slot)
    }

    pub fn lookup(&self, name: &str) -> Option<u16> {
        self.slots.get(name).copied()
    }

    /// Size of the local-variable table needed by the frame.
    pub fn max_locals(&self) -> u16 {
        self.next_slot
    }
}

/// Owner of every pool created by the resolution pass. Nodes only hold [`PoolId`]s, so a pool
/// stays valid after it stops being the active one.
#[derive(Debug, Default)]
pub struct ScopePools {
    pools: SlotMap<PoolId, ScopePool>,
}

impl ScopePools {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&mut self, kind: PoolKind) -> PoolId {
        self.pools.insert_with_key(|id| ScopePool {
            id,
            kind,
            slots: FxHashMap::default(),
            next_slot: 0,
        })
    }

    pub fn get(&self, id: PoolId) -> Option<&ScopePool> {
        self.pools.get(id)
    }

    pub fn get_mut(&mut self, id: PoolId) -> Option<&mut ScopePool> {
        self.pools.get_mut(id)
    }

    pub fn len(&self) -> usize {
        self.pools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slots_are_monotonic_and_stable_per_name() {
        let mut pools = ScopePools::new();
        let id = pools.create(PoolKind::Function);
        let pool = pools.get_mut(id).unwrap();

        assert_eq!(pool.current(), id);
        assert_eq!(pool.reserve("this"), Some(0));
        assert_eq!(pool.reserve("a"), Some(1));
        assert_eq!(pool.reserve("b"), Some(2));
        assert_eq!(pool.reserve("a"), Some(1));
        assert_eq!(pool.lookup("b"), Some(2));
        assert_eq!(pool.lookup("c"), None);
        assert_eq!(pool.max_locals(), 3);
    }

    #[test]
    fn pools_are_distinct() {
        let mut pools = ScopePools::new();
        let global = pools.create(PoolKind::Global);
        let func = pools.create(PoolKind::Function);

        assert_ne!(global, func);
        assert_eq!(pools.get(global).unwrap().kind(), PoolKind::Global);
        assert_eq!(pools.get_mut(func).unwrap().reserve("x"), Some(0));
        assert_eq!(pools.get(global).unwrap().max_locals(), 0);
        assert_eq!(pools.len(), 2);
    }

    #[test]
    fn full_frame_refuses_new_names() {
        let mut pools = ScopePools::new();
        let id = pools.create(PoolKind::Function);
        let pool = pools.get_mut(id).unwrap();

        for i in 0..u16::MAX {
            assert_eq!(pool.reserve(&format!("v{i}")), Some(i));
        }
        assert_eq!(pool.max_locals(), u16::MAX);
        assert_eq!(pool.reserve("one_too_many"), None);
        assert_eq!(pool.lookup("one_too_many"), None);
        // Known names still resolve.
        assert_eq!(pool.reserve("v7"), Some(7));
        assert_eq!(pool.max_locals(), u16::MAX);
    }
}
