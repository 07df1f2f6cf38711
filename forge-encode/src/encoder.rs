use forge_runtime::{DynTensor, ElementType, ProviderPreferences};
use forge_text::Tokenizer;
use tracing::instrument;

use crate::error::EncodeError;
use crate::model::EncoderModel;

/// Upper bound on input text length (bytes) before `execute` refuses the
/// call with `InvalidArgument`.
pub const DEFAULT_MAX_INPUT_BYTES: usize = 32 * 1024;

/// Shared "encode one text into one vector" path behind the embedder and
/// reranker. Owns the loaded tokenizer and session; every call to
/// [`EncoderHost::execute`] is tokenize -> build input tensors -> run ->
/// widen -> optionally L2-normalize.
pub struct EncoderHost<M> {
    model: M,
    tokenizer: Tokenizer,
    max_input_bytes: usize,
}

impl EncoderHost<forge_runtime::RuntimeSession> {
    #[instrument(skip(providers))]
    pub fn initialize(
        model_path: impl AsRef<std::path::Path>,
        tokenizer_path: impl AsRef<std::path::Path>,
        providers: &ProviderPreferences,
    ) -> Result<Self, EncodeError> {
        let tokenizer = Tokenizer::from_file(tokenizer_path)?;
        let model = forge_runtime::RuntimeSession::create(model_path, providers)?;
        Ok(EncoderHost {
            model,
            tokenizer,
            max_input_bytes: DEFAULT_MAX_INPUT_BYTES,
        })
    }
}

impl<M: EncoderModel> EncoderHost<M> {
    pub fn with_max_input_bytes(mut self, max_input_bytes: usize) -> Self {
        self.max_input_bytes = max_input_bytes;
        self
    }

    /// Tokenize `text`, run it through the model's declared output node, and
    /// return the widened `f32` vector alongside the tokenizer's normalized
    /// view of the input.
    #[instrument(skip(self, text))]
    pub fn execute(
        &self,
        text: &str,
        output_name: &str,
        normalize: bool,
    ) -> Result<(Vec<f32>, String), EncodeError> {
        if text.is_empty() {
            return Err(EncodeError::InvalidArgument("empty input text".into()));
        }
        if text.len() > self.max_input_bytes {
            return Err(EncodeError::InvalidArgument(format!(
                "input text of {} bytes exceeds configured maximum of {}",
                text.len(),
                self.max_input_bytes
            )));
        }

        let (ids, normalized_text) = self.tokenizer.encode(text)?;
        let vector = self.run_encoder(&ids, output_name)?;
        let vector = if normalize { l2_normalize(vector) } else { vector };
        Ok((vector, normalized_text))
    }

    fn run_encoder(&self, ids: &[u32], output_name: &str) -> Result<Vec<f32>, EncodeError> {
        let l = ids.len();
        let input_ids = DynTensor::from_i64(vec![1, l], ids.iter().map(|&id| id as i64).collect());
        let attention_mask = DynTensor::from_i64(vec![1, l], vec![1i64; l]);

        let input_ids_name = self
            .model
            .find_input("input_ids")
            .map(|n| n.name.clone())
            .unwrap_or_else(|| "input_ids".to_string());
        let attention_mask_name = self
            .model
            .find_input("attention_mask")
            .map(|n| n.name.clone())
            .unwrap_or_else(|| "attention_mask".to_string());

        let outputs = self.model.run(
            vec![
                (input_ids_name, input_ids),
                (attention_mask_name, attention_mask),
            ],
            &[output_name],
        )?;

        let tensor = outputs.get(output_name).ok_or_else(|| {
            EncodeError::RuntimeError(format!("missing output node {output_name}"))
        })?;
        match tensor.element_type() {
            ElementType::Int64 => Err(EncodeError::RuntimeError(
                "encoder output declared as int64, not a numeric embedding".into(),
            )),
            _ => Ok(tensor.data.to_f32()),
        }
    }
}

/// Wraps [`EncoderHost`] with the spec's embedder surface: the output node
/// is fixed at construction time so callers never repeat the output name.
pub struct Embedder<M> {
    host: EncoderHost<M>,
    output_name: String,
}

impl Embedder<forge_runtime::RuntimeSession> {
    pub fn initialize(
        model_path: impl AsRef<std::path::Path>,
        tokenizer_path: impl AsRef<std::path::Path>,
        output_name: impl Into<String>,
        providers: &ProviderPreferences,
    ) -> Result<Self, EncodeError> {
        Ok(Embedder {
            host: EncoderHost::initialize(model_path, tokenizer_path, providers)?,
            output_name: output_name.into(),
        })
    }
}

impl<M: EncoderModel> Embedder<M> {
    pub fn embed(&self, text: &str) -> Result<(Vec<f32>, String), EncodeError> {
        self.host.execute(text, &self.output_name, true)
    }
}

/// Reranker specialization: scores a `(query, document)` pair by
/// concatenating `query[SEP]document`, running the same encode pipeline
/// against a logits output, and squashing the first scalar through the
/// logistic function.
pub struct Reranker<M> {
    host: EncoderHost<M>,
    output_name: String,
    separator: String,
}

impl Reranker<forge_runtime::RuntimeSession> {
    pub fn initialize(
        model_path: impl AsRef<std::path::Path>,
        tokenizer_path: impl AsRef<std::path::Path>,
        output_name: impl Into<String>,
        providers: &ProviderPreferences,
    ) -> Result<Self, EncodeError> {
        Ok(Reranker {
            host: EncoderHost::initialize(model_path, tokenizer_path, providers)?,
            output_name: output_name.into(),
            separator: "[SEP]".to_string(),
        })
    }
}

impl<M: EncoderModel> Reranker<M> {
    pub fn score(&self, query: &str, document: &str) -> Result<f32, EncodeError> {
        let combined = format!("{query}{}{document}", self.separator);
        let (logits, _) = self.host.execute(&combined, &self.output_name, false)?;
        let first = logits
            .first()
            .copied()
            .ok_or_else(|| EncodeError::RuntimeError("reranker produced no logits".into()))?;
        Ok(logistic(first))
    }
}

fn logistic(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

fn l2_normalize(mut vector: Vec<f32>) -> Vec<f32> {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in vector.iter_mut() {
            *x /= norm;
        }
    }
    vector
}

#[cfg(test)]
mod tests {
    use super::*;
    use forge_runtime::{ElementBuffer, NodeInfo, RuntimeError};
    use std::collections::HashMap;

    struct FakeModel {
        output: Vec<f32>,
        dim: usize,
    }

    impl EncoderModel for FakeModel {
        fn find_input(&self, name: &str) -> Option<&NodeInfo> {
            let _ = name;
            None
        }
        fn find_output(&self, name: &str) -> Option<&NodeInfo> {
            let _ = name;
            None
        }
        fn run(
            &self,
            inputs: Vec<(String, DynTensor)>,
            want_outputs: &[&str],
        ) -> Result<HashMap<String, DynTensor>, RuntimeError> {
            let _ = inputs;
            let mut out = HashMap::new();
            for &name in want_outputs {
                out.insert(
                    name.to_string(),
                    DynTensor::new(vec![1, self.dim], ElementBuffer::Fp32(self.output.clone())),
                );
            }
            Ok(out)
        }
    }

    fn fake_host(output: Vec<f32>) -> EncoderHost<FakeModel> {
        let dim = output.len();
        EncoderHost {
            model: FakeModel { output, dim },
            tokenizer: Tokenizer::from_json(
                r#"{"version":"1.0","model":{"type":"WordLevel","vocab":{"a":0,"b":1,"[UNK]":2},"unk_token":"[UNK]"}}"#,
            )
            .expect("tiny tokenizer"),
            max_input_bytes: DEFAULT_MAX_INPUT_BYTES,
        }
    }

    #[test]
    fn empty_input_is_invalid_argument() {
        let host = fake_host(vec![1.0, 0.0]);
        let err = host.execute("", "embedding", false).unwrap_err();
        assert!(matches!(err, EncodeError::InvalidArgument(_)));
    }

    #[test]
    fn oversized_input_is_invalid_argument() {
        let host = fake_host(vec![1.0, 0.0]).with_max_input_bytes(2);
        let err = host.execute("abc", "embedding", false).unwrap_err();
        assert!(matches!(err, EncodeError::InvalidArgument(_)));
    }

    #[test]
    fn normalize_scales_to_unit_length() {
        let host = fake_host(vec![3.0, 4.0]);
        let (vector, _) = host.execute("a", "embedding", true).unwrap();
        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-6);
    }

    #[test]
    fn logistic_maps_into_unit_interval() {
        assert!((logistic(0.0) - 0.5).abs() < 1e-6);
        assert!(logistic(100.0) > 0.999);
        assert!(logistic(-100.0) < 0.001);
    }
}
