//! Conversation session: per-conversation KV state, transcript buffer, and
//! streaming token emission (`spec.md` §3, §4.6).
//!
//! Grounded on the teacher's `Generator` (`rten-generate/src/generator.rs`),
//! which is a pull-based `Iterator` over token ids -- advancing only on
//! demand, which is exactly the back-pressure property `spec.md` §9
//! requires of the generation loop's coroutine control flow. This type
//! generalizes that shape to also: decode to text fragments rather than
//! raw ids, check rolling-window stop sequences in addition to stop
//! tokens, and make KV disposal and session poisoning explicit rather than
//! relying on Rust's drop order, so the `InvariantViolation`-is-fatal
//! behavior of `spec.md` §7 is representable.

use std::collections::VecDeque;
use std::time::Instant;

use forge_text::Tokenizer;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use crate::error::ForgeError;
use crate::kv_state::KvState;
use crate::metrics::Metrics;
use crate::model::Model;
use crate::sampling::{self, SamplingConfig, TokenId};
use crate::step::StepDriver;

/// Rolling window width, in characters, against which `stop_sequences` are
/// checked (`spec.md` §4.6 step e, §9 Open Question: rolling window chosen
/// explicitly over whole-transcript matching).
const STOP_WINDOW_CHARS: usize = 100;

/// A conversation session owns one KV state and an append-only transcript.
/// Not `Clone`, not `Sync`: exactly one task may drive a session at a time
/// (`spec.md` §5).
pub struct ConversationSession<'a> {
    driver: StepDriver<'a>,
    tokenizer: &'a Tokenizer,
    transcript: String,
    kv_state: Option<KvState>,
    poisoned: bool,
    metrics: Metrics,
}

impl<'a> ConversationSession<'a> {
    pub fn new(model: &'a dyn Model, driver: StepDriver<'a>, tokenizer: &'a Tokenizer) -> Self {
        let _ = model;
        ConversationSession {
            driver,
            tokenizer,
            transcript: String::new(),
            kv_state: Some(KvState::empty()),
            poisoned: false,
            metrics: Metrics::new(),
        }
    }

    pub fn transcript(&self) -> &str {
        &self.transcript
    }

    /// Cumulative step-timing metrics for every step run on this session
    /// across every `generate` call so far (`spec.md` §9's `Profiler`-style
    /// instrumentation note).
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Begin generating from `prompt_text`, returning a pull-based iterator
    /// of decoded fragments (`spec.md` §4.6).
    ///
    /// Each call to `Iterator::next` on the returned value advances the
    /// generation loop by exactly one token; nothing runs ahead of what the
    /// consumer asks for.
    pub fn generate<'s>(
        &'s mut self,
        prompt_text: &str,
        config: SamplingConfig,
    ) -> Result<Generation<'s, 'a>, ForgeError> {
        if self.poisoned {
            return Err(ForgeError::InvariantViolation(
                "session is poisoned after a prior invariant violation".into(),
            ));
        }

        self.transcript.push_str(prompt_text);
        let (input_ids, _normalized) = self.tokenizer.encode(prompt_text)?;

        Ok(Generation {
            session: self,
            input_ids,
            config,
            generated: Vec::new(),
            rolling_tail: VecDeque::new(),
            emitted: 0,
            stopped: false,
            cancel: CancellationToken::new(),
        })
    }

    fn mark_poisoned(&mut self) {
        self.poisoned = true;
        self.kv_state = None;
    }

    /// Release every KV tensor and sever the session's references. After
    /// this call the session must not be used again (`spec.md` §3, §4.6).
    pub fn dispose(mut self) {
        self.kv_state = None;
    }
}

/// Lazy sequence of decoded string fragments produced by one `generate`
/// call. Implements [`Iterator`] so standard adapters (`take`,
/// `take_while`, ...) apply, matching `GeneratorUtils` in the teacher.
pub struct Generation<'s, 'a> {
    session: &'s mut ConversationSession<'a>,
    input_ids: Vec<TokenId>,
    config: SamplingConfig,
    generated: Vec<TokenId>,
    rolling_tail: VecDeque<char>,
    emitted: usize,
    stopped: bool,
    cancel: CancellationToken,
}

impl<'s, 'a> Generation<'s, 'a> {
    /// A cancellation handle that can be triggered from another task to
    /// halt this generation between steps (`spec.md` §5).
    pub fn cancellation_handle(&self) -> CancellationToken {
        self.cancel.clone()
    }

    #[instrument(skip(self))]
    fn step_once(&mut self) -> Result<Option<String>, ForgeError> {
        if self.stopped || self.emitted >= self.config.max_tokens {
            return Ok(None);
        }

        let kv_state = self
            .session
            .kv_state
            .take()
            .ok_or_else(|| ForgeError::InvariantViolation("session has no KV state".into()))?;

        let started = Instant::now();
        let result = self.session.driver.run_step(&self.input_ids, kv_state, &self.cancel);
        let (logits, new_kv) = match result {
            Ok(pair) => {
                self.session.metrics.add_step_duration(started.elapsed());
                pair
            }
            Err(err) => {
                if matches!(err, ForgeError::InvariantViolation(_)) {
                    self.session.mark_poisoned();
                }
                return Err(err);
            }
        };
        self.session.kv_state = Some(new_kv);

        let mut last = logits.last_position_f32();
        let next_id = sampling::sample(&mut last, &self.config, &self.generated);

        self.generated.push(next_id);
        self.emitted += 1;

        let fragment = self.session.tokenizer.decode(&[next_id])?;
        self.session.transcript.push_str(&fragment);

        for ch in fragment.chars() {
            self.rolling_tail.push_back(ch);
            while self.rolling_tail.len() > STOP_WINDOW_CHARS {
                self.rolling_tail.pop_front();
            }
        }
        let tail: String = self.rolling_tail.iter().collect();

        let hit_stop_token = self.config.stop_token_ids.contains(&next_id);
        let hit_stop_sequence = self
            .config
            .stop_sequences
            .iter()
            .any(|seq| tail.contains(seq.as_str()));

        if hit_stop_token || hit_stop_sequence {
            self.stopped = true;
        } else {
            self.input_ids = vec![next_id];
        }

        Ok(Some(fragment))
    }
}

impl<'s, 'a> Iterator for Generation<'s, 'a> {
    type Item = Result<String, ForgeError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.step_once() {
            Ok(Some(fragment)) => Some(Ok(fragment)),
            Ok(None) => None,
            Err(err) => {
                self.stopped = true;
                Some(Err(err))
            }
        }
    }
}
