//! Chat-template rendering.
//!
//! `spec.md` §6 marks this bit-exact: any reimplementation must produce the
//! same bytes. Every literal below (role markers, source-block formatting,
//! tool-call/tool-result wrapper strings) is copied verbatim from the
//! specification rather than reformatted for readability.

const BEGIN_OF_TEXT: &str = "<|begin_of_text|>";
const EOT_ID: &str = "<|eot_id|>";

fn header(role: &str) -> String {
    format!("<|start_header_id|>{role}<|end_header_id|>")
}

/// A single retrieved context source, numbered from 1 in rendering order.
pub struct Source<'a> {
    pub text: &'a str,
}

/// Describes the tool-use block appended to the system message when a tool
/// executor is configured (`spec.md` §4.8, §6).
pub struct ToolUseSpec<'a> {
    pub tools: &'a [ToolDescription<'a>],
}

pub struct ToolDescription<'a> {
    pub name: &'a str,
    pub description: &'a str,
}

/// Render the opening system message of a conversation: instruction line,
/// numbered retrieved context, and an optional tool-use block.
pub fn render_system(
    instruction: &str,
    context: &[Source<'_>],
    tool_use: Option<&ToolUseSpec<'_>>,
) -> String {
    let mut body = String::new();
    body.push_str(instruction);
    body.push('\n');

    if !context.is_empty() {
        body.push('\n');
        for (idx, source) in context.iter().enumerate() {
            body.push_str(&format!("**Source {}:**\n> {}\n", idx + 1, source.text));
        }
    }

    if let Some(spec) = tool_use {
        body.push('\n');
        body.push_str("You may call a tool by writing:\n\n");
        body.push_str("TOOL_CALL\n");
        body.push_str("name: <tool name>\n");
        body.push_str("args: <tool arguments>\n");
        body.push_str("END_TOOL_CALL\n\n");
        body.push_str("Available tools:\n");
        for tool in spec.tools {
            body.push_str(&format!("- {}: {}\n", tool.name, tool.description));
        }
    }

    format!(
        "{BEGIN_OF_TEXT}{}{body}{EOT_ID}",
        header("system")
    )
}

/// Render the first user turn, following the system message.
pub fn render_user(user_text: &str) -> String {
    format!("{}{user_text}{EOT_ID}", header("user"))
}

/// Render a subsequent user turn that also carries retrieved context.
pub fn render_user_with_context(user_text: &str, context: &[Source<'_>]) -> String {
    let mut body = String::new();
    if !context.is_empty() {
        for (idx, source) in context.iter().enumerate() {
            body.push_str(&format!("**Source {}:**\n> {}\n", idx + 1, source.text));
        }
        body.push('\n');
    }
    body.push_str(user_text);
    format!("{}{body}{EOT_ID}", header("user"))
}

/// Render the assistant header that precedes generation.
pub fn render_assistant_header() -> String {
    header("assistant")
}

/// Wrap a tool result for splicing back into generation (`spec.md` §4.8).
pub fn render_tool_result(result: &str) -> String {
    format!("TOOL_RESULT\n{result}\nEND_TOOL_RESULT")
}

/// Wrap a failed tool result, prefixed per `spec.md` §7's
/// `ToolFailure`-recovery behavior.
pub fn render_tool_error(message: &str) -> String {
    render_tool_result(&format!("Error: {message}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_message_without_context_or_tools() {
        let rendered = render_system("You are a helpful assistant.", &[], None);
        assert!(rendered.starts_with(BEGIN_OF_TEXT));
        assert!(rendered.contains("<|start_header_id|>system<|end_header_id|>"));
        assert!(rendered.ends_with(EOT_ID));
        assert!(!rendered.contains("Source"));
    }

    #[test]
    fn system_message_numbers_sources_from_one() {
        let sources = [Source { text: "alpha" }, Source { text: "beta" }];
        let rendered = render_system("Answer using the context.", &sources, None);
        assert!(rendered.contains("**Source 1:**\n> alpha\n"));
        assert!(rendered.contains("**Source 2:**\n> beta\n"));
    }

    #[test]
    fn tool_result_wrapper_is_exact() {
        assert_eq!(
            render_tool_result("42"),
            "TOOL_RESULT\n42\nEND_TOOL_RESULT"
        );
        assert_eq!(
            render_tool_error("boom"),
            "TOOL_RESULT\nError: boom\nEND_TOOL_RESULT"
        );
    }
}
