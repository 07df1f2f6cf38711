//! Positional argument parsing for the REPL binary (`spec.md` §6,
//! Command-line surface). Grounded on
//! `rten-examples/src/qwen2_chat.rs::parse_args`'s `lexopt`-based shape,
//! generalized from two positional arguments to the spec's six (with the
//! last two optional).

use std::collections::VecDeque;

pub struct Args {
    pub llm_model_file: String,
    pub llm_tokenizer_file: String,
    pub embedding_model_file: String,
    pub embedding_tokenizer_file: String,
    pub reranker_model_file: Option<String>,
    pub reranker_tokenizer_file: Option<String>,
}

pub fn parse_args() -> Result<Args, lexopt::Error> {
    use lexopt::prelude::*;

    let mut values = VecDeque::new();
    let mut parser = lexopt::Parser::from_env();

    while let Some(arg) = parser.next()? {
        match arg {
            Value(val) => values.push_back(val.string()?),
            Long("help") => {
                println!(
                    "Local streaming inference REPL with retrieval and tool calling.

Usage: {bin_name} <llm-model> <llm-tokenizer> <embedding-model> <embedding-tokenizer> [reranker-model] [reranker-tokenizer]
",
                    bin_name = parser.bin_name().unwrap_or("forge")
                );
                std::process::exit(0);
            }
            _ => return Err(arg.unexpected()),
        }
    }

    let llm_model_file = values.pop_front().ok_or("missing <llm-model-file> arg")?;
    let llm_tokenizer_file = values
        .pop_front()
        .ok_or("missing <llm-tokenizer-file> arg")?;
    let embedding_model_file = values
        .pop_front()
        .ok_or("missing <embedding-model-file> arg")?;
    let embedding_tokenizer_file = values
        .pop_front()
        .ok_or("missing <embedding-tokenizer-file> arg")?;
    let reranker_model_file = values.pop_front();
    let reranker_tokenizer_file = values.pop_front();

    Ok(Args {
        llm_model_file,
        llm_tokenizer_file,
        embedding_model_file,
        embedding_tokenizer_file,
        reranker_model_file,
        reranker_tokenizer_file,
    })
}
