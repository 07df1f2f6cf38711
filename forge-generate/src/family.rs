//! Per-model-family default overlays (`spec.md` §6, §9's "dynamic dispatch
//! on model family" design note).
//!
//! A tagged variant over the known families; adding a family is one new
//! variant plus one default-overlay entry, as the design note prescribes.

use crate::sampling::SamplingConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelFamily {
    Llama3,
    Qwen2,
    Unrecognized,
}

impl ModelFamily {
    /// Recognize a family from a model's declared name/metadata string. Any
    /// unmatched name falls back to `Unrecognized`, which leaves the base
    /// `SamplingConfig::default()` untouched.
    pub fn detect(model_name: &str) -> Self {
        let lower = model_name.to_ascii_lowercase();
        if lower.contains("llama-3") || lower.contains("llama3") {
            ModelFamily::Llama3
        } else if lower.contains("qwen2") || lower.contains("qwen-2") {
            ModelFamily::Qwen2
        } else {
            ModelFamily::Unrecognized
        }
    }

    /// Overlay family-specific stop-token/stop-sequence defaults onto a base
    /// config, flooring temperature at 0.1 and ceiling top-p at 0.95
    /// (`spec.md` §6, "Per-model defaults").
    pub fn overlay_defaults(self, mut cfg: SamplingConfig) -> SamplingConfig {
        match self {
            ModelFamily::Llama3 => {
                cfg.stop_token_ids = vec![128001, 128009]; // <|end_of_text|>, <|eot_id|>
                cfg.stop_sequences = vec!["<|eot_id|>".to_string()];
            }
            ModelFamily::Qwen2 => {
                cfg.stop_token_ids = vec![151643, 151645]; // <|endoftext|>, <|im_end|>
                cfg.stop_sequences = vec!["<|im_end|>".to_string()];
            }
            ModelFamily::Unrecognized => return cfg,
        }
        cfg.temperature = cfg.temperature.max(0.1);
        cfg.top_p = cfg.top_p.min(0.95);
        cfg
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unrecognized_family_leaves_defaults_untouched() {
        let cfg = ModelFamily::Unrecognized.overlay_defaults(SamplingConfig::default());
        assert_eq!(cfg.stop_token_ids, SamplingConfig::default().stop_token_ids);
    }

    #[test]
    fn llama3_overlay_sets_family_stop_tokens() {
        let cfg = ModelFamily::Llama3.overlay_defaults(SamplingConfig::default());
        assert!(cfg.stop_token_ids.contains(&128009));
        assert!(cfg.temperature >= 0.1);
        assert!(cfg.top_p <= 0.95);
    }
}
