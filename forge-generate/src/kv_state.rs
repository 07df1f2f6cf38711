//! KV state: the authoritative record of accumulated sequence length plus
//! the just-produced KV tensors that become the next step's past
//! (`spec.md` §3, §4.4, §9).
//!
//! Modeled as a linear (move-only) value per the "KV ownership" design note
//! in `spec.md` §9: `KvState` is intentionally not `Clone`. Any step that
//! observes a `KvState` consumes it (`step::run_step` takes it by value) and
//! produces a fresh one, so a present tensor can never be aliased as both
//! past and present at once. This generalizes the teacher's per-layer
//! `cache.take()` / `cache_entry.cache = Some(...)` dance
//! (`rten-generate/src/generator.rs`) into one whole-state move.

use forge_runtime::DynTensor;

use crate::kv_map::KvSlot;

/// One layer's worth of just-produced KV tensor, tagged with the slot
/// descriptor it will be bound back into on the next step.
pub struct KvEntry {
    pub slot: KvSlot,
    pub tensor: DynTensor,
}

/// Authoritative KV-cache state for one conversation session.
///
/// Empty (`KvState::empty()`) at the start of a session: `S == 0` and no
/// entries, meaning the step driver must allocate zero-length seed tensors
/// for every past slot on the first step (`spec.md` §4.4, §8 boundary
/// behavior).
pub struct KvState {
    /// Accumulated sequence length. `S >= 0` always; after a step
    /// processing `k` new tokens, `S' == S + k` (`spec.md` §3 invariant).
    seq_len: u32,
    entries: Vec<KvEntry>,
}

impl KvState {
    pub fn empty() -> Self {
        KvState { seq_len: 0, entries: Vec::new() }
    }

    pub fn seq_len(&self) -> u32 {
        self.seq_len
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[KvEntry] {
        &self.entries
    }

    pub fn find(&self, present_name: &str) -> Option<&KvEntry> {
        self.entries.iter().find(|e| e.slot.present_name == present_name)
    }

    /// Construct the next KV state after a step that advanced the sequence
    /// by `new_seq_len - seq_len` tokens. Consumes `self` by value so the
    /// old tensors cannot be observed again once the new state exists.
    pub(crate) fn advance(new_seq_len: u32, entries: Vec<KvEntry>) -> Self {
        KvState { seq_len: new_seq_len, entries }
    }
}
