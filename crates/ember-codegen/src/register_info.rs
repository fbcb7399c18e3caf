//! Register equivalence tracking
//!
//! Each tracked register owns a [`RegisterInfo`] node. Nodes whose registers
//! currently hold the same value form an equivalence class, kept as a
//! circular doubly-linked ring inside a [`RegisterInfoPool`]. Links are slot
//! indices, so merging and splitting classes are O(1) splices.
//!
//! The register optimizer decides when to merge or split; this module only
//! keeps the rings consistent and answers "which register can I reuse"
//! queries.

use ember_bytecode::Register;
use rustc_hash::FxHashMap;

use crate::error::{CodegenError, CodegenResult};

/// Handle to a node in a [`RegisterInfoPool`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InfoId(u32);

impl InfoId {
    #[inline]
    fn slot(self) -> usize {
        self.0 as usize
    }

    fn min_slot(self, other: InfoId) -> InfoId {
        if other.0 < self.0 { other } else { self }
    }
}

/// Identifies an equivalence class.
///
/// Only meaningful while the class is non-empty; ids may be reused afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EquivalenceId(pub u32);

/// One register's membership in an equivalence class
#[derive(Debug, Clone)]
pub struct RegisterInfo {
    register: Register,
    equivalence_id: EquivalenceId,
    materialized: bool,
    allocated: bool,
    needs_flush: bool,
    next: InfoId,
    prev: InfoId,
}

impl RegisterInfo {
    /// Register this node stands for
    pub fn register(&self) -> Register {
        self.register
    }

    /// Class the register currently belongs to
    pub fn equivalence_id(&self) -> EquivalenceId {
        self.equivalence_id
    }

    /// Whether the register holds the computed value rather than a copy
    pub fn materialized(&self) -> bool {
        self.materialized
    }

    /// Whether the register allocator currently has the register live
    pub fn allocated(&self) -> bool {
        self.allocated
    }

    /// Whether a pending materialization still has to be emitted
    pub fn needs_flush(&self) -> bool {
        self.needs_flush
    }

    /// Next node in the ring
    pub fn next(&self) -> InfoId {
        self.next
    }

    /// Previous node in the ring
    pub fn prev(&self) -> InfoId {
        self.prev
    }
}

/// Arena owning every [`RegisterInfo`] of one function
#[derive(Debug, Default)]
pub struct RegisterInfoPool {
    slots: Vec<Option<RegisterInfo>>,
    free: Vec<InfoId>,
    by_register: FxHashMap<Register, InfoId>,
    next_equivalence_id: u32,
}

impl RegisterInfoPool {
    /// Create an empty pool
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live nodes
    pub fn len(&self) -> usize {
        self.by_register.len()
    }

    /// Whether no node is live
    pub fn is_empty(&self) -> bool {
        self.by_register.is_empty()
    }

    /// Fresh class id
    pub fn next_equivalence_id(&mut self) -> EquivalenceId {
        let id = EquivalenceId(self.next_equivalence_id);
        self.next_equivalence_id = self.next_equivalence_id.wrapping_add(1);
        id
    }

    /// Track `register` as a singleton class.
    ///
    /// A register can be tracked by at most one live node.
    pub fn insert(
        &mut self,
        register: Register,
        equivalence_id: EquivalenceId,
        materialized: bool,
        allocated: bool,
    ) -> CodegenResult<InfoId> {
        if self.by_register.contains_key(&register) {
            return Err(CodegenError::internal(format!(
                "register r{} is already tracked",
                register.index()
            )));
        }
        let id = match self.free.pop() {
            Some(id) => id,
            None => {
                self.slots.push(None);
                InfoId((self.slots.len() - 1) as u32)
            }
        };
        self.slots[id.slot()] = Some(RegisterInfo {
            register,
            equivalence_id,
            materialized,
            allocated,
            needs_flush: false,
            next: id,
            prev: id,
        });
        self.by_register.insert(register, id);
        Ok(id)
    }

    /// Stop tracking the node, unlinking it from its class
    pub fn free(&mut self, id: InfoId) {
        self.unlink(id);
        let register = self.info(id).register;
        self.by_register.remove(&register);
        self.slots[id.slot()] = None;
        self.free.push(id);
    }

    /// Live node tracking `register`
    pub fn info_for(&self, register: Register) -> Option<InfoId> {
        self.by_register.get(&register).copied()
    }

    /// Node for a handle, or `None` if it was freed or never issued
    pub fn get(&self, id: InfoId) -> Option<&RegisterInfo> {
        self.slots.get(id.slot()).and_then(Option::as_ref)
    }

    /// Node for a handle
    ///
    /// # Panics
    ///
    /// Panics if `id` was freed or never issued by this pool.
    pub fn info(&self, id: InfoId) -> &RegisterInfo {
        match self.get(id) {
            Some(info) => info,
            None => panic!("stale register info handle {id:?}"),
        }
    }

    fn info_mut(&mut self, id: InfoId) -> &mut RegisterInfo {
        match self.slots.get_mut(id.slot()).and_then(Option::as_mut) {
            Some(info) => info,
            None => panic!("stale register info handle {id:?}"),
        }
    }

    /// Mark the register as holding (or not) the computed value
    pub fn set_materialized(&mut self, id: InfoId, materialized: bool) {
        self.info_mut(id).materialized = materialized;
    }

    /// Record the allocator's view of the register
    pub fn set_allocated(&mut self, id: InfoId, allocated: bool) {
        self.info_mut(id).allocated = allocated;
    }

    /// Flag a pending materialization
    pub fn set_needs_flush(&mut self, id: InfoId, needs_flush: bool) {
        self.info_mut(id).needs_flush = needs_flush;
    }

    /// Whether both nodes belong to the same class
    pub fn is_in_same_equivalence_set(&self, a: InfoId, b: InfoId) -> bool {
        self.info(a).equivalence_id == self.info(b).equivalence_id
    }

    /// Another member of the class; `id` itself for a singleton
    pub fn get_equivalent(&self, id: InfoId) -> InfoId {
        self.info(id).next
    }

    /// First materialized member in ring order, starting with `id`
    pub fn get_materialized_equivalent(&self, id: InfoId) -> Option<InfoId> {
        self.members(id).find(|&m| self.info(m).materialized)
    }

    /// First materialized member whose register is not `register`
    pub fn get_materialized_equivalent_other_than(&self, id: InfoId, register: Register) -> Option<InfoId> {
        self.members(id).find(|&m| {
            let info = self.info(m);
            info.materialized && info.register != register
        })
    }

    /// Member that should be materialized next, if the class needs one.
    ///
    /// Returns `None` as soon as any other member is already materialized.
    /// Otherwise picks the allocated member with the lowest register index.
    pub fn get_equivalent_to_materialize(&self, id: InfoId) -> Option<InfoId> {
        let mut best: Option<InfoId> = None;
        for member in self.members(id).skip(1) {
            let info = self.info(member);
            if info.materialized {
                return None;
            }
            let better = match best {
                Some(b) => info.register < self.info(b).register,
                None => true,
            };
            if info.allocated && better {
                best = Some(member);
            }
        }
        best
    }

    /// Leave the current class and join `target`'s, right after `target`.
    ///
    /// The joining register becomes a copy, so it is no longer materialized.
    pub fn add_to_equivalence_set_of(&mut self, id: InfoId, target: InfoId) {
        if id == target {
            self.info_mut(id).materialized = false;
            return;
        }
        self.unlink(id);
        let after = self.info(target).next;
        {
            let info = self.info_mut(id);
            info.prev = target;
            info.next = after;
        }
        self.info_mut(target).next = id;
        self.info_mut(after).prev = id;
        let equivalence_id = self.info(target).equivalence_id;
        let info = self.info_mut(id);
        info.equivalence_id = equivalence_id;
        info.materialized = false;
    }

    /// Leave the current class and start a new singleton class
    pub fn move_to_new_equivalence_set(&mut self, id: InfoId, equivalence_id: EquivalenceId, materialized: bool) {
        self.unlink(id);
        self.make_singleton(id);
        let info = self.info_mut(id);
        info.equivalence_id = equivalence_id;
        info.materialized = materialized;
    }

    /// Ring members starting at `id`, each exactly once
    pub fn members(&self, id: InfoId) -> Members<'_> {
        Members {
            pool: self,
            start: id,
            current: Some(id),
        }
    }

    /// Verify that every ring is well linked and that rings partition the
    /// live nodes by equivalence id
    pub fn check_invariants(&self) -> CodegenResult<()> {
        let live = self.len();
        let mut ring_of_class: FxHashMap<EquivalenceId, InfoId> = FxHashMap::default();

        for (slot, info) in self.slots.iter().enumerate() {
            let Some(info) = info else { continue };
            let id = InfoId(slot as u32);
            let (next, prev) = match (self.get(info.next), self.get(info.prev)) {
                (Some(next), Some(prev)) => (next, prev),
                _ => return Err(CodegenError::corrupt_ring(format!("{id:?} links to a freed slot"))),
            };
            if next.prev != id || prev.next != id {
                return Err(CodegenError::corrupt_ring(format!("{id:?} is not linked back")));
            }
            if next.equivalence_id != info.equivalence_id {
                return Err(CodegenError::corrupt_ring(format!(
                    "{id:?} and {:?} share a ring but not a class",
                    info.next
                )));
            }

            // The smallest slot on the ring stands for the whole ring.
            let mut representative = id;
            let mut cursor = info.next;
            let mut steps = 1;
            while cursor != id {
                if steps > live {
                    return Err(CodegenError::corrupt_ring(format!("ring through {id:?} never closes")));
                }
                representative = representative.min_slot(cursor);
                cursor = match self.get(cursor) {
                    Some(member) => member.next,
                    None => return Err(CodegenError::corrupt_ring(format!("ring through {id:?} is broken"))),
                };
                steps += 1;
            }
            match ring_of_class.get(&info.equivalence_id) {
                Some(&seen) if seen != representative => {
                    return Err(CodegenError::corrupt_ring(format!(
                        "class {:?} spans more than one ring",
                        info.equivalence_id
                    )));
                }
                _ => {
                    ring_of_class.insert(info.equivalence_id, representative);
                }
            }
        }
        Ok(())
    }

    fn unlink(&mut self, id: InfoId) {
        let (next, prev) = {
            let info = self.info(id);
            (info.next, info.prev)
        };
        self.info_mut(next).prev = prev;
        self.info_mut(prev).next = next;
    }

    fn make_singleton(&mut self, id: InfoId) {
        let info = self.info_mut(id);
        info.next = id;
        info.prev = id;
    }
}

/// Iterator over the members of one ring
pub struct Members<'a> {
    pool: &'a RegisterInfoPool,
    start: InfoId,
    current: Option<InfoId>,
}

impl Iterator for Members<'_> {
    type Item = InfoId;

    fn next(&mut self) -> Option<InfoId> {
        let current = self.current?;
        let next = self.pool.info(current).next;
        self.current = if next == self.start { None } else { Some(next) };
        Some(current)
    }
}
