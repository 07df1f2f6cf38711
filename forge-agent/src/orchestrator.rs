//! Per-turn agent orchestration: retrieve, template, delegate to
//! generation, splice tool results back in (`spec.md` §4.8).
//!
//! Grounded on `sven-core`'s `Agent::submit` shape (push user input, run a
//! turn, drain/execute any tool calls, feed results back, repeat) but
//! reduced to the spec's three-step per-turn algorithm plus splice-back tool
//! injection instead of that reference's full tool-registry dispatch.

use forge_encode::{EncoderModel, Embedder, Reranker};
use forge_generate::{ForgeError, ConversationSession, SamplingConfig};
use forge_retrieve::VectorStore;
use forge_text::template::{self, Source, ToolDescription, ToolUseSpec};
use tracing::instrument;

use crate::tool_call::{ToolCallParser, ToolCallStatus};

const DEFAULT_INSTRUCTION: &str = "You are a helpful assistant.";
const DEFAULT_TOP_K: usize = 10;
const FINAL_CONTEXT_SIZE: usize = 5;

/// Guards against a tool-call/tool-result ping-pong that never terminates.
/// Not part of `spec.md`'s contract; a defensive bound on an otherwise
/// unbounded loop.
const MAX_TOOL_ROUNDS: usize = 8;

/// Executes a tool call's `args` string and returns its textual result, or
/// an error message on failure (`spec.md` §3, Tool-call record).
pub trait ToolExecutor {
    fn execute(&self, name: &str, args: &str) -> Result<String, String>;
}

/// The turn-driving surface `chat_turn` needs from a conversation session:
/// check whether a turn has already happened, and stream decoded fragments
/// for a new prompt. Implemented for `forge_generate::ConversationSession`;
/// test code substitutes a fake so `chat_turn`'s branching can be exercised
/// without a loaded model.
pub trait TurnSession {
    fn transcript(&self) -> &str;

    fn generate(
        &mut self,
        prompt_text: &str,
        config: SamplingConfig,
    ) -> Result<Box<dyn Iterator<Item = Result<String, ForgeError>> + '_>, ForgeError>;
}

impl<'a> TurnSession for ConversationSession<'a> {
    fn transcript(&self) -> &str {
        ConversationSession::transcript(self)
    }

    fn generate(
        &mut self,
        prompt_text: &str,
        config: SamplingConfig,
    ) -> Result<Box<dyn Iterator<Item = Result<String, ForgeError>> + '_>, ForgeError> {
        let generation = ConversationSession::generate(self, prompt_text, config)?;
        Ok(Box::new(generation))
    }
}

/// Optional retrieval collaborators for one `chat_turn` call.
pub struct Retrieval<'a, M: EncoderModel> {
    pub embedder: &'a Embedder<M>,
    pub store: &'a dyn VectorStore,
    pub reranker: Option<&'a Reranker<M>>,
}

/// Run one conversational turn: optionally retrieve context, render the
/// appropriate prompt, delegate to `session.generate`, and splice tool
/// results back in when a tool executor is supplied.
///
/// Fragments are collected eagerly rather than streamed lazily: tool
/// injection requires resuming generation mid-stream with a new prompt,
/// which needs a fresh borrow of `session` on each round; a purely lazy
/// external iterator would have to smuggle that resumption through
/// `Iterator::next`, which a borrow-scoped generation type does not
/// support.
#[instrument(skip(session, retrieval, tool_executor))]
pub async fn chat_turn<M: EncoderModel, S: TurnSession>(
    session: &mut S,
    user_text: &str,
    sampling_config: &SamplingConfig,
    retrieval: Option<&Retrieval<'_, M>>,
    tool_executor: Option<&dyn ToolExecutor>,
) -> Result<Vec<String>, ForgeError> {
    let sources_text = retrieve_context(user_text, retrieval).await?;
    let sources: Vec<Source<'_>> = sources_text.iter().map(|s| Source { text: s }).collect();

    let tool_use = tool_executor.map(|_| ToolUseSpec {
        tools: &[ToolDescription {
            name: "tool",
            description: "Invoke a configured tool by name with a single argument string.",
        }],
    });

    let is_first_turn = session.transcript().is_empty();
    let mut prompt = if is_first_turn {
        let system = template::render_system(DEFAULT_INSTRUCTION, &sources, tool_use.as_ref());
        format!(
            "{system}{}{}",
            template::render_user(user_text),
            template::render_assistant_header()
        )
    } else {
        format!(
            "{}{}",
            template::render_user_with_context(user_text, &sources),
            template::render_assistant_header()
        )
    };

    let mut fragments = Vec::new();
    let mut parser = ToolCallParser::default();

    for _round in 0..=MAX_TOOL_ROUNDS {
        let mut pending_tool_result = None;

        {
            let generation = session.generate(&prompt, sampling_config.clone())?;
            for fragment in generation {
                let fragment = fragment?;
                fragments.push(fragment.clone());

                if tool_executor.is_none() {
                    continue;
                }
                if let Some(mut record) = parser.feed(&fragment) {
                    if record.status != ToolCallStatus::Pending {
                        continue;
                    }
                    record.mark_executing();
                    let executor = tool_executor.expect("checked above");
                    let rendered = match executor.execute(&record.name, &record.args) {
                        Ok(result) => {
                            record.mark_completed(result.clone());
                            template::render_tool_result(&result)
                        }
                        Err(message) => {
                            record.mark_failed(message.clone());
                            template::render_tool_error(&message)
                        }
                    };
                    pending_tool_result = Some(rendered);
                    break;
                }
            }
        }

        match pending_tool_result {
            Some(tool_result_text) => {
                prompt = tool_result_text;
            }
            None => break,
        }
    }

    Ok(fragments)
}

async fn retrieve_context<M: EncoderModel>(
    user_text: &str,
    retrieval: Option<&Retrieval<'_, M>>,
) -> Result<Vec<String>, ForgeError> {
    let Some(retrieval) = retrieval else {
        return Ok(Vec::new());
    };

    let (query_vector, _) = retrieval
        .embedder
        .embed(user_text)
        .map_err(|e| ForgeError::RuntimeFailure(e.to_string()))?;

    let mut hits = retrieval
        .store
        .top_k(&query_vector, DEFAULT_TOP_K)
        .await
        .map_err(|e| ForgeError::RuntimeFailure(e.to_string()))?;

    if let Some(reranker) = retrieval.reranker {
        let mut scored = Vec::with_capacity(hits.len());
        for hit in hits {
            let score = reranker
                .score(user_text, &hit.item.text)
                .map_err(|e| ForgeError::RuntimeFailure(e.to_string()))?;
            scored.push((hit, score));
        }
        scored.sort_by(|(_, a), (_, b)| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));
        hits = scored.into_iter().map(|(hit, _)| hit).collect();
    }

    Ok(hits
        .into_iter()
        .take(FINAL_CONTEXT_SIZE)
        .map(|hit| hit.item.text)
        .collect())
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use forge_runtime::RuntimeSession;

    use super::*;

    /// A `TurnSession` driven entirely by a pre-scripted queue of
    /// fragment-rounds, so `chat_turn`'s branching can be exercised without
    /// a loaded model. Records every prompt it was asked to generate from.
    struct FakeSession {
        transcript: String,
        rounds: VecDeque<Vec<String>>,
        prompts: Vec<String>,
    }

    impl FakeSession {
        fn new(rounds: Vec<Vec<String>>) -> Self {
            FakeSession {
                transcript: String::new(),
                rounds: rounds.into(),
                prompts: Vec::new(),
            }
        }
    }

    impl TurnSession for FakeSession {
        fn transcript(&self) -> &str {
            &self.transcript
        }

        fn generate(
            &mut self,
            prompt_text: &str,
            _config: SamplingConfig,
        ) -> Result<Box<dyn Iterator<Item = Result<String, ForgeError>> + '_>, ForgeError> {
            self.transcript.push_str(prompt_text);
            self.prompts.push(prompt_text.to_string());
            let fragments = self.rounds.pop_front().unwrap_or_default();
            Ok(Box::new(fragments.into_iter().map(Ok)))
        }
    }

    struct AlwaysSucceed;
    impl ToolExecutor for AlwaysSucceed {
        fn execute(&self, _name: &str, _args: &str) -> Result<String, String> {
            Ok("42".to_string())
        }
    }

    struct AlwaysFail;
    impl ToolExecutor for AlwaysFail {
        fn execute(&self, _name: &str, _args: &str) -> Result<String, String> {
            Err("boom".to_string())
        }
    }

    #[tokio::test]
    async fn first_turn_renders_system_prompt_later_turns_do_not() {
        let mut session = FakeSession::new(vec![vec!["hi".to_string()], vec!["there".to_string()]]);
        let cfg = SamplingConfig::default();

        chat_turn::<RuntimeSession, _>(&mut session, "hello", &cfg, None, None)
            .await
            .unwrap();
        chat_turn::<RuntimeSession, _>(&mut session, "again", &cfg, None, None)
            .await
            .unwrap();

        assert_eq!(session.prompts.len(), 2);
        assert!(session.prompts[0].contains("<|begin_of_text|>"));
        assert!(session.prompts[0].contains("You are a helpful assistant."));
        assert!(session.prompts[0].contains("hello"));
        assert!(!session.prompts[1].contains("<|begin_of_text|>"));
        assert!(session.prompts[1].contains("again"));
    }

    #[tokio::test]
    async fn completed_tool_call_splices_result_back_as_next_prompt() {
        let tool_call_fragment = "<tool_call>\nname: lookup\nargs: x\n</tool_call>".to_string();
        let mut session = FakeSession::new(vec![
            vec![tool_call_fragment.clone()],
            vec!["done".to_string()],
        ]);
        let cfg = SamplingConfig::default();

        let fragments = chat_turn::<RuntimeSession, _>(
            &mut session,
            "what is x",
            &cfg,
            None,
            Some(&AlwaysSucceed),
        )
        .await
        .unwrap();

        assert_eq!(fragments, vec![tool_call_fragment, "done".to_string()]);
        assert_eq!(session.prompts.len(), 2);
        assert_eq!(session.prompts[1], "TOOL_RESULT\n42\nEND_TOOL_RESULT");
    }

    #[tokio::test]
    async fn failed_tool_call_splices_error_back_as_next_prompt() {
        let tool_call_fragment = "<tool_call>\nname: lookup\nargs: x\n</tool_call>".to_string();
        let mut session = FakeSession::new(vec![
            vec![tool_call_fragment],
            vec!["done".to_string()],
        ]);
        let cfg = SamplingConfig::default();

        chat_turn::<RuntimeSession, _>(&mut session, "what is x", &cfg, None, Some(&AlwaysFail))
            .await
            .unwrap();

        assert_eq!(session.prompts[1], "TOOL_RESULT\nError: boom\nEND_TOOL_RESULT");
    }

    #[tokio::test]
    async fn tool_round_loop_terminates_at_max_tool_rounds() {
        let block = "<tool_call>\nname: loop\nargs: \n</tool_call>".to_string();
        // A tool that always re-triggers itself: every round produces
        // another pending call, so only the `MAX_TOOL_ROUNDS` bound can end
        // the turn.
        let rounds: Vec<Vec<String>> = (0..MAX_TOOL_ROUNDS + 3).map(|_| vec![block.clone()]).collect();
        let mut session = FakeSession::new(rounds);
        let cfg = SamplingConfig::default();

        chat_turn::<RuntimeSession, _>(&mut session, "go", &cfg, None, Some(&AlwaysSucceed))
            .await
            .unwrap();

        assert_eq!(session.prompts.len(), MAX_TOOL_ROUNDS + 1);
    }
}
