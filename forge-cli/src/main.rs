//! Interactive REPL binary wiring the LM, embedder, optional reranker and
//! in-memory retrieval store together (`spec.md` §6, Command-line surface).
//!
//! Out of scope for correctness per `spec.md` §1 -- this binary exists to
//! exercise every other crate end to end, matching the role
//! `rten-examples`/`qwen2_chat.rs` plays for the teacher.

mod args;

use std::io::{self, Write};
use std::process::ExitCode;

use forge_agent::{chat_turn, Retrieval};
use forge_encode::Embedder;
use forge_generate::{ConversationSession, KvTensorMap, Model, ModelFamily, ModelSlotNames, SamplingConfig, StepDriver};
use forge_retrieve::SharedInMemoryStore;
use forge_runtime::{ProviderPreferences, RuntimeSession};
use forge_text::Tokenizer;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("forge: {err}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = args::parse_args()?;

    let providers = ProviderPreferences::default();
    let llm_session = RuntimeSession::create(&args.llm_model_file, &providers)?;
    let llm_tokenizer = Tokenizer::from_file(&args.llm_tokenizer_file)?;

    let names = ModelSlotNames::default();
    let kv_map = KvTensorMap::discover(llm_session.inputs(), llm_session.outputs(), &names)?;
    let driver = StepDriver::new(
        &llm_session,
        &kv_map,
        names.input_ids,
        names.attention_mask,
        Some(names.position_ids),
        names.logits,
    );
    let mut session = ConversationSession::new(&llm_session, driver, &llm_tokenizer);

    let family = ModelFamily::detect(&args.llm_model_file);
    let sampling_config = family.overlay_defaults(SamplingConfig::default());

    let embedder = Embedder::initialize(
        &args.embedding_model_file,
        &args.embedding_tokenizer_file,
        "embedding",
        &providers,
    )?;
    let reranker = match (&args.reranker_model_file, &args.reranker_tokenizer_file) {
        (Some(model), Some(tokenizer)) => Some(forge_encode::Reranker::initialize(
            model, tokenizer, "logits", &providers,
        )?),
        _ => None,
    };
    let store = SharedInMemoryStore::new();

    let stdin = io::stdin();
    loop {
        print!("> ");
        io::stdout().flush().ok();

        let mut line = String::new();
        let n_read = stdin.read_line(&mut line)?;
        if n_read == 0 || line.trim().is_empty() {
            break;
        }

        let retrieval = Retrieval {
            embedder: &embedder,
            store: &store,
            reranker: reranker.as_ref(),
        };

        let fragments = chat_turn(
            &mut session,
            line.trim_end(),
            &sampling_config,
            Some(&retrieval),
            None,
        )
        .await?;

        for fragment in fragments {
            print!("{fragment}");
        }
        println!();
        if let Some(tokens_per_second) = session.metrics().tokens_per_second() {
            eprintln!("[{tokens_per_second:.1} tok/s]");
        }
        io::stdout().flush().ok();
    }

    Ok(())
}
