//! The LM step driver: one synchronous forward pass of the causal LM
//! (`spec.md` §4.4).
//!
//! Owns input/output slot layout, assembles the input vector (token ids,
//! attention mask, optional position ids, KV-past tensors), allocates
//! output tensors, invokes the model, and returns logits plus a new KV
//! state. Strictly sequential per model session -- the only suspension
//! point is the call into the runtime (`spec.md` §5).

use std::collections::HashMap;

use forge_runtime::{DynTensor, ElementType};
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use crate::error::ForgeError;
use crate::kv_map::KvTensorMap;
use crate::kv_state::{KvEntry, KvState};
use crate::model::Model;

pub type TokenId = u32;

/// Logits for one step: `[1, L, V]` in the model's declared logits dtype
/// (`spec.md` §4.4). The sampling pipeline only ever consumes the
/// last-position slice, widened to `f32`.
pub struct StepLogits {
    pub seq_len: usize,
    pub vocab_size: usize,
    tensor: DynTensor,
}

impl StepLogits {
    /// The last-position logits, widened to `f32` (`spec.md` §4.6 step b).
    pub fn last_position_f32(&self) -> Vec<f32> {
        let widened = self.tensor.data.to_f32();
        let start = (self.seq_len - 1) * self.vocab_size;
        widened[start..start + self.vocab_size].to_vec()
    }
}

pub struct StepDriver<'a> {
    model: &'a dyn Model,
    kv_map: &'a KvTensorMap,
    input_ids_name: &'a str,
    attention_mask_name: &'a str,
    position_ids_name: Option<&'a str>,
    logits_name: &'a str,
}

impl<'a> StepDriver<'a> {
    pub fn new(
        model: &'a dyn Model,
        kv_map: &'a KvTensorMap,
        input_ids_name: &'a str,
        attention_mask_name: &'a str,
        position_ids_name: Option<&'a str>,
        logits_name: &'a str,
    ) -> Self {
        StepDriver {
            model,
            kv_map,
            input_ids_name,
            attention_mask_name,
            position_ids_name,
            logits_name,
        }
    }

    /// Run one forward pass. `cancel` is checked before tensor assembly and
    /// again immediately before dispatch (`spec.md` §5); once dispatched,
    /// the step runs to completion.
    #[instrument(skip(self, cancel))]
    pub fn run_step(
        &self,
        input_ids: &[TokenId],
        past: KvState,
        cancel: &CancellationToken,
    ) -> Result<(StepLogits, KvState), ForgeError> {
        if cancel.is_cancelled() {
            return Err(ForgeError::Cancelled);
        }

        let l = input_ids.len();
        let s_before = past.seq_len();
        let s_total = s_before + l as u32;

        let mut inputs: Vec<(String, DynTensor)> = Vec::new();

        let ids_i64: Vec<i64> = input_ids.iter().map(|&id| id as i64).collect();
        inputs.push((
            self.input_ids_name.to_string(),
            DynTensor::from_i64(vec![1, l], ids_i64),
        ));

        inputs.push((
            self.attention_mask_name.to_string(),
            DynTensor::from_i64(vec![1, s_total as usize], vec![1i64; s_total as usize]),
        ));

        if let Some(position_ids_name) = self.position_ids_name {
            if self.model.find_input(position_ids_name).is_some() {
                let positions: Vec<i64> = (s_before as i64..s_total as i64).collect();
                inputs.push((position_ids_name.to_string(), DynTensor::from_i64(vec![1, l], positions)));
            }
        }

        for slot in &self.kv_map.slots {
            let tensor = match past.find(&slot.present_name) {
                Some(entry) => entry.tensor.clone(),
                None => {
                    let shape = match slot.num_kv_heads {
                        Some(heads) => vec![1, heads, 0, slot.head_dim],
                        None => vec![1, 0, slot.head_dim],
                    };
                    DynTensor::zeros(shape, slot.dtype)
                }
            };
            inputs.push((slot.past_name.clone(), tensor));
        }

        if cancel.is_cancelled() {
            return Err(ForgeError::Cancelled);
        }

        let mut want_outputs: Vec<&str> = vec![self.logits_name];
        want_outputs.extend(self.kv_map.slots.iter().map(|s| s.present_name.as_str()));

        let mut outputs = self.model.run(inputs, &want_outputs)?;

        let logits_tensor = outputs
            .remove(self.logits_name)
            .ok_or_else(|| ForgeError::InvariantViolation("model did not produce logits".into()))?;
        let vocab_size = *logits_tensor.shape.last().ok_or_else(|| {
            ForgeError::InvariantViolation("logits tensor has no vocab axis".into())
        })?;
        // Some exports omit the sequence axis when L == 1; treat that as a
        // single-token slice directly (`spec.md` §4.4 tie-break).
        let seq_len = if logits_tensor.shape.len() >= 3 {
            logits_tensor.shape[logits_tensor.shape.len() - 2]
        } else {
            1
        };

        let mut new_entries = Vec::with_capacity(self.kv_map.slots.len());
        for slot in &self.kv_map.slots {
            let tensor = outputs.remove(&slot.present_name).ok_or_else(|| {
                ForgeError::InvariantViolation(format!("model did not produce {}", slot.present_name))
            })?;
            let produced_seq = *tensor.shape.get(tensor.shape.len().saturating_sub(2)).unwrap_or(&0);
            if produced_seq != s_total as usize {
                return Err(ForgeError::InvariantViolation(format!(
                    "present tensor '{}' has seq_len {} but expected {}",
                    slot.present_name, produced_seq, s_total
                )));
            }
            new_entries.push(KvEntry { slot: slot.clone(), tensor });
        }

        let new_state = KvState::advance(s_total, new_entries);
        let logits = StepLogits { seq_len, vocab_size, tensor: logits_tensor };

        Ok((logits, new_state))
    }
}

#[allow(dead_code)]
fn assert_dtype_matches(a: ElementType, b: ElementType) -> Result<(), ForgeError> {
    if a != b {
        return Err(ForgeError::InvariantViolation(format!(
            "dtype mismatch: {a:?} vs {b:?}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv_map::{KvSlot, KvTensorMap, ModelSlotNames};
    use forge_runtime::{Dimension, ElementBuffer, NodeInfo};
    use std::cell::RefCell;

    struct FakeModel {
        inputs: Vec<NodeInfo>,
        outputs: Vec<NodeInfo>,
        steps: RefCell<Vec<HashMap<String, DynTensor>>>,
        call_count: RefCell<usize>,
    }

    impl Model for FakeModel {
        fn inputs(&self) -> &[NodeInfo] {
            &self.inputs
        }
        fn outputs(&self) -> &[NodeInfo] {
            &self.outputs
        }
        fn run(
            &self,
            _inputs: Vec<(String, DynTensor)>,
            want_outputs: &[&str],
        ) -> Result<HashMap<String, DynTensor>, forge_runtime::RuntimeError> {
            let mut steps = self.steps.borrow_mut();
            let step_outputs = steps.remove(0);
            *self.call_count.borrow_mut() += 1;
            let mut result = HashMap::new();
            for &name in want_outputs {
                result.insert(name.to_string(), step_outputs.get(name).unwrap().clone());
            }
            Ok(result)
        }
    }

    fn logits_tensor(seq: usize, vocab: usize) -> DynTensor {
        DynTensor::new(vec![1, seq, vocab], ElementBuffer::Fp32(vec![0.0; seq * vocab]))
    }

    fn kv_tensor(heads: usize, seq: usize, head_dim: usize) -> DynTensor {
        DynTensor::new(
            vec![1, heads, seq, head_dim],
            ElementBuffer::Fp32(vec![0.0; heads * seq * head_dim]),
        )
    }

    #[test]
    fn kv_seq_len_grows_by_number_of_new_tokens() {
        let names = ModelSlotNames::default();
        let kv_map = KvTensorMap {
            slots: vec![KvSlot {
                layer: 0,
                is_key: true,
                past_name: "past_key_values.0.key".into(),
                present_name: "present.0.key".into(),
                dtype: ElementType::Fp32,
                num_kv_heads: Some(2),
                head_dim: 4,
                slot_offset: 2,
            }],
        };

        let mut step0 = HashMap::new();
        step0.insert("logits".to_string(), logits_tensor(5, 10));
        step0.insert("present.0.key".to_string(), kv_tensor(2, 5, 4));

        let mut step1 = HashMap::new();
        step1.insert("logits".to_string(), logits_tensor(1, 10));
        step1.insert("present.0.key".to_string(), kv_tensor(2, 8, 4));

        let model = FakeModel {
            inputs: vec![],
            outputs: vec![],
            steps: RefCell::new(vec![step0, step1]),
            call_count: RefCell::new(0),
        };

        let driver = StepDriver::new(&model, &kv_map, "input_ids", "attention_mask", None, "logits");
        let cancel = CancellationToken::new();

        let prompt = [1u32, 2, 3, 4, 5];
        let (_, kv1) = driver.run_step(&prompt, KvState::empty(), &cancel).unwrap();
        assert_eq!(kv1.seq_len(), 5);

        let (_, kv2) = driver.run_step(&[6, 7, 8], kv1, &cancel).unwrap();
        assert_eq!(kv2.seq_len(), 8);
        let _ = names;
    }

    proptest::proptest! {
        /// For any sequence of step sizes, the accumulated KV sequence length
        /// after each step equals the sum of tokens processed so far, and
        /// every present tensor's `seq` axis matches it (`spec.md` §8).
        #[test]
        fn kv_seq_len_matches_cumulative_tokens_processed(step_sizes in proptest::collection::vec(1usize..6, 1..6)) {
            let kv_map = KvTensorMap {
                slots: vec![KvSlot {
                    layer: 0,
                    is_key: true,
                    past_name: "past_key_values.0.key".into(),
                    present_name: "present.0.key".into(),
                    dtype: ElementType::Fp32,
                    num_kv_heads: Some(2),
                    head_dim: 4,
                    slot_offset: 2,
                }],
            };

            let mut steps = Vec::new();
            let mut cumulative = 0usize;
            for &size in &step_sizes {
                cumulative += size;
                let mut outputs = HashMap::new();
                outputs.insert("logits".to_string(), logits_tensor(size, 10));
                outputs.insert("present.0.key".to_string(), kv_tensor(2, cumulative, 4));
                steps.push(outputs);
            }

            let model = FakeModel {
                inputs: vec![],
                outputs: vec![],
                steps: RefCell::new(steps),
                call_count: RefCell::new(0),
            };

            let driver = StepDriver::new(&model, &kv_map, "input_ids", "attention_mask", None, "logits");
            let cancel = CancellationToken::new();

            let mut kv = KvState::empty();
            let mut expected = 0u32;
            for &size in &step_sizes {
                let tokens: Vec<TokenId> = (0..size as u32).collect();
                let (_, next_kv) = driver.run_step(&tokens, kv, &cancel).unwrap();
                expected += size as u32;
                prop_assert_eq!(next_kv.seq_len(), expected);
                for entry in next_kv.entries() {
                    let seq_axis = entry.tensor.shape[entry.tensor.shape.len() - 2];
                    prop_assert_eq!(seq_axis as u32, expected);
                }
                kv = next_kv;
            }
        }
    }
}
