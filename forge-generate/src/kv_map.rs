//! KV tensor mapping: discovers the pairing between "past" input tensors and
//! "present" output tensors of a causal LM (`spec.md` §4.3).
//!
//! Grounded on the KV-cache discovery loop of `Generator::from_model_config`
//! in the teacher (`rten-generate/src/generator.rs`): inputs are scanned for
//! a `{prefix}{layer}{suffix}` pattern, the matching output is located by
//! substituting the output-side prefix/suffix, and the pair is recorded
//! along with per-tensor shape/dtype metadata. The teacher hardcodes this
//! scan inline in `Generator` construction; here it is pulled out into a
//! standalone, reusable map so the step driver and the session can both
//! consult it without re-deriving it.

use forge_runtime::{Dimension, ElementType, NodeInfo};

use crate::error::ForgeError;

/// Prefix/suffix pattern for one family of KV-cache tensors (key or value).
#[derive(Debug, Clone, Copy)]
pub struct KvNamePattern<'a> {
    pub prefix: &'a str,
    pub suffix: &'a str,
}

/// Names and roles of the causal LM's inputs/outputs (`spec.md` §3's
/// "Model input/output slot map").
pub struct ModelSlotNames<'a> {
    pub input_ids: &'a str,
    pub attention_mask: &'a str,
    pub position_ids: &'a str,
    pub logits: &'a str,
    pub past_key: KvNamePattern<'a>,
    pub past_value: KvNamePattern<'a>,
    pub present_key: KvNamePattern<'a>,
    pub present_value: KvNamePattern<'a>,
}

impl<'a> Default for ModelSlotNames<'a> {
    fn default() -> Self {
        ModelSlotNames {
            input_ids: "input_ids",
            attention_mask: "attention_mask",
            position_ids: "position_ids",
            logits: "logits",
            past_key: KvNamePattern { prefix: "past_key_values.", suffix: ".key" },
            past_value: KvNamePattern { prefix: "past_key_values.", suffix: ".value" },
            present_key: KvNamePattern { prefix: "present.", suffix: ".key" },
            present_value: KvNamePattern { prefix: "present.", suffix: ".value" },
        }
    }
}

/// Descriptor for one KV-past input slot and its paired KV-present output.
///
/// `slot_offset` is the tensor's position within the model's input vector,
/// counted after the fixed `input_ids`/`attention_mask` slots (`spec.md`
/// §3).
#[derive(Debug, Clone)]
pub struct KvSlot {
    pub layer: u32,
    pub is_key: bool,
    pub past_name: String,
    pub present_name: String,
    pub dtype: ElementType,
    pub num_kv_heads: Option<usize>,
    pub head_dim: usize,
    pub slot_offset: usize,
}

/// The bidirectional past/present mapping for one loaded causal LM. Computed
/// once at session construction (`spec.md` §4.3); immutable afterwards.
#[derive(Debug, Clone)]
pub struct KvTensorMap {
    pub slots: Vec<KvSlot>,
}

impl KvTensorMap {
    /// Discover the KV mapping by scanning `inputs`/`outputs` for the
    /// configured name patterns. Every matched output must have exactly one
    /// input partner; an unpaired tensor is a fatal configuration error
    /// (`spec.md` §4.3 invariant), surfaced as `InvariantViolation`.
    pub fn discover(
        inputs: &[NodeInfo],
        outputs: &[NodeInfo],
        names: &ModelSlotNames,
    ) -> Result<Self, ForgeError> {
        let fixed_slots = 2; // input_ids, attention_mask
        let mut slots = Vec::new();
        let mut kv_ordinal = 0usize;

        for input in inputs.iter() {
            let (is_key, pattern) = if matches(&input.name, &names.past_key) {
                (true, names.past_key)
            } else if matches(&input.name, &names.past_value) {
                (false, names.past_value)
            } else {
                continue;
            };

            let layer = match layer_index(&input.name, pattern) {
                Some(l) => l,
                None => continue,
            };

            let present_pattern = if is_key { names.present_key } else { names.present_value };
            let present_name = format!("{}{}{}", present_pattern.prefix, layer, present_pattern.suffix);
            let present = outputs
                .iter()
                .find(|o| o.name == present_name)
                .ok_or_else(|| {
                    ForgeError::InvariantViolation(format!(
                        "KV input '{}' has no matching present output '{}'",
                        input.name, present_name
                    ))
                })?;

            let (num_kv_heads, head_dim) = match input.shape.as_slice() {
                [_, Dimension::Fixed(heads), _, Dimension::Fixed(size)] => (Some(*heads), *size),
                [_, _, Dimension::Fixed(size)] => (None, *size),
                _ => {
                    return Err(ForgeError::InvariantViolation(format!(
                        "KV input '{}' has unsupported shape {:?}",
                        input.name, input.shape
                    )))
                }
            };

            slots.push(KvSlot {
                layer,
                is_key,
                past_name: input.name.clone(),
                present_name: present.name.clone(),
                dtype: input.dtype,
                num_kv_heads,
                head_dim,
                slot_offset: fixed_slots + kv_ordinal,
            });
            kv_ordinal += 1;
        }

        // Totality: every present_* output must be claimed by some slot.
        for output in outputs {
            let is_kv_output = matches_output(&output.name, &names.present_key)
                || matches_output(&output.name, &names.present_value);
            if is_kv_output && !slots.iter().any(|s| s.present_name == output.name) {
                return Err(ForgeError::InvariantViolation(format!(
                    "present output '{}' has no matching past input",
                    output.name
                )));
            }
        }

        Ok(KvTensorMap { slots })
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

fn matches(name: &str, pattern: KvNamePattern) -> bool {
    name.starts_with(pattern.prefix) && name.ends_with(pattern.suffix)
}

fn matches_output(name: &str, pattern: KvNamePattern) -> bool {
    matches(name, pattern)
}

fn layer_index(name: &str, pattern: KvNamePattern) -> Option<u32> {
    let start = pattern.prefix.len();
    let end = name.len().saturating_sub(pattern.suffix.len());
    name.get(start..end)?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use forge_runtime::Dimension;

    fn node(name: &str, shape: Vec<Dimension>) -> NodeInfo {
        NodeInfo { name: name.to_string(), dtype: ElementType::Fp32, shape }
    }

    #[test]
    fn discovers_paired_kv_slots_per_layer() {
        let names = ModelSlotNames::default();
        let shape = vec![
            Dimension::Symbolic,
            Dimension::Fixed(8),
            Dimension::Symbolic,
            Dimension::Fixed(64),
        ];
        let inputs = vec![
            node("input_ids", vec![]),
            node("attention_mask", vec![]),
            node("past_key_values.0.key", shape.clone()),
            node("past_key_values.0.value", shape.clone()),
        ];
        let outputs = vec![
            node("logits", vec![]),
            node("present.0.key", shape.clone()),
            node("present.0.value", shape),
        ];

        let map = KvTensorMap::discover(&inputs, &outputs, &names).unwrap();
        assert_eq!(map.slots.len(), 2);
        assert!(map.slots.iter().any(|s| s.layer == 0 && s.is_key));
        assert!(map.slots.iter().any(|s| s.layer == 0 && !s.is_key));
    }

    #[test]
    fn slot_offset_counts_only_kv_slots_after_the_fixed_ones() {
        let names = ModelSlotNames::default();
        let shape = vec![
            Dimension::Symbolic,
            Dimension::Fixed(8),
            Dimension::Symbolic,
            Dimension::Fixed(64),
        ];
        // A non-KV input (`position_ids`) sits between the fixed slots and
        // the KV slots in the declared order; it must not shift the
        // ordinal assigned to the KV slots that follow it.
        let inputs = vec![
            node("input_ids", vec![]),
            node("attention_mask", vec![]),
            node("position_ids", vec![]),
            node("past_key_values.0.key", shape.clone()),
            node("past_key_values.0.value", shape.clone()),
            node("past_key_values.1.key", shape.clone()),
            node("past_key_values.1.value", shape.clone()),
        ];
        let outputs = vec![
            node("logits", vec![]),
            node("present.0.key", shape.clone()),
            node("present.0.value", shape.clone()),
            node("present.1.key", shape.clone()),
            node("present.1.value", shape),
        ];

        let map = KvTensorMap::discover(&inputs, &outputs, &names).unwrap();
        let mut offsets: Vec<usize> = map.slots.iter().map(|s| s.slot_offset).collect();
        offsets.sort_unstable();
        assert_eq!(offsets, vec![2, 3, 4, 5]);
    }

    #[test]
    fn unpaired_present_output_is_fatal() {
        let names = ModelSlotNames::default();
        let shape = vec![Dimension::Symbolic, Dimension::Fixed(8), Dimension::Symbolic, Dimension::Fixed(64)];
        let inputs = vec![node("input_ids", vec![]), node("attention_mask", vec![])];
        let outputs = vec![node("logits", vec![]), node("present.0.key", shape)];

        let err = KvTensorMap::discover(&inputs, &outputs, &names).unwrap_err();
        assert!(matches!(err, ForgeError::InvariantViolation(_)));
    }
}
