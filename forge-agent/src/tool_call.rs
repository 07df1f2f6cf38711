//! Incremental tool-call scanner over decoded generation fragments.
//!
//! A tiny two-state machine (`spec.md` §4.7): `Outside` while accumulating
//! ordinary text, `Inside` once an opening delimiter has been seen. Grounded
//! on the event/status vocabulary of `sven-core`'s `Agent` loop
//! (`ToolCall`/`ToolOutput`, `Pending`/`Executing`/`Completed`/`Failed`)
//! reimplemented as detection-only scanning rather than that reference's
//! full tool-registry dispatch.

use std::sync::atomic::{AtomicU64, Ordering};

const DEFAULT_OPEN_DELIMITER: &str = "<tool_call>";
const DEFAULT_CLOSE_DELIMITER: &str = "</tool_call>";

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

fn mint_id() -> String {
    format!("tc_{}", NEXT_ID.fetch_add(1, Ordering::Relaxed))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolCallStatus {
    Pending,
    Parsing,
    Executing,
    Completed,
    Failed,
}

/// A detected tool invocation (`spec.md` §3, Tool-call record).
#[derive(Debug, Clone)]
pub struct ToolCallRecord {
    pub id: String,
    pub name: String,
    pub args: String,
    pub status: ToolCallStatus,
    pub result: Option<String>,
    pub error: Option<String>,
}

impl ToolCallRecord {
    fn pending(name: String, args: String) -> Self {
        ToolCallRecord {
            id: mint_id(),
            name,
            args,
            status: ToolCallStatus::Pending,
            result: None,
            error: None,
        }
    }

    pub fn mark_executing(&mut self) {
        self.status = ToolCallStatus::Executing;
    }

    pub fn mark_completed(&mut self, result: String) {
        self.status = ToolCallStatus::Completed;
        self.result = Some(result);
    }

    pub fn mark_failed(&mut self, error: String) {
        self.status = ToolCallStatus::Failed;
        self.error = Some(error);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Outside,
    Inside { delimiter_start: usize },
}

/// Feed decoded fragments in; get back a completed [`ToolCallRecord`]
/// whenever a well-formed delimited block closes.
pub struct ToolCallParser {
    open_delimiter: String,
    close_delimiter: String,
    state: State,
    buffer: String,
}

impl Default for ToolCallParser {
    fn default() -> Self {
        ToolCallParser::new(DEFAULT_OPEN_DELIMITER, DEFAULT_CLOSE_DELIMITER)
    }
}

impl ToolCallParser {
    pub fn new(open_delimiter: impl Into<String>, close_delimiter: impl Into<String>) -> Self {
        ToolCallParser {
            open_delimiter: open_delimiter.into(),
            close_delimiter: close_delimiter.into(),
            state: State::Outside,
            buffer: String::new(),
        }
    }

    /// Feed one decoded fragment. Returns `Some(record)` the instant a
    /// complete delimited block closes; otherwise `None`.
    pub fn feed(&mut self, fragment: &str) -> Option<ToolCallRecord> {
        self.buffer.push_str(fragment);

        match self.state {
            State::Outside => {
                if let Some(start) = self.buffer.find(&self.open_delimiter) {
                    self.state = State::Inside {
                        delimiter_start: start,
                    };
                    self.feed("")
                } else {
                    None
                }
            }
            State::Inside { delimiter_start } => {
                let search_from = delimiter_start + self.open_delimiter.len();
                let close_pos = self.buffer[search_from..]
                    .find(&self.close_delimiter)
                    .map(|offset| search_from + offset);

                let Some(close_pos) = close_pos else {
                    return None;
                };

                let body = self.buffer[search_from..close_pos].to_string();
                let remainder_start = close_pos + self.close_delimiter.len();
                let remainder = self.buffer[remainder_start..].to_string();
                self.buffer.clear();
                self.state = State::Outside;

                let record = parse_body(&body);
                if remainder.is_empty() {
                    record
                } else {
                    // The fragment that closed this block may also contain the
                    // opening delimiter of the next one; keep scanning.
                    record.or_else(|| self.feed_remainder(remainder))
                }
            }
        }
    }

    fn feed_remainder(&mut self, remainder: String) -> Option<ToolCallRecord> {
        self.buffer = remainder;
        self.feed("")
    }
}

/// Parse `key: value` lines, whitespace-trimmed, case-insensitive keys.
/// Requires `name`; `args` defaults to empty. Any other shape (missing
/// `name`) resets the parser without producing a record.
fn parse_body(body: &str) -> Option<ToolCallRecord> {
    let mut name = None;
    let mut args = String::new();

    for line in body.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        match key.trim().to_ascii_lowercase().as_str() {
            "name" => name = Some(value.trim().to_string()),
            "args" => args = value.trim().to_string(),
            _ => {}
        }
    }

    let name = name?;
    if name.is_empty() {
        return None;
    }
    Some(ToolCallRecord::pending(name, args))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_a_complete_block_delivered_in_one_fragment() {
        let mut parser = ToolCallParser::default();
        let record = parser
            .feed("<tool_call>\nname: search\nargs: rust iterators\n</tool_call>")
            .expect("should detect a complete block");
        assert_eq!(record.name, "search");
        assert_eq!(record.args, "rust iterators");
        assert_eq!(record.status, ToolCallStatus::Pending);
    }

    #[test]
    fn detects_a_block_split_across_many_fragments() {
        let mut parser = ToolCallParser::default();
        assert!(parser.feed("some text <tool_").is_none());
        assert!(parser.feed("call>\nname: weather\n").is_none());
        assert!(parser.feed("args: Paris\n</tool_ca").is_none());
        let record = parser.feed("ll>").expect("should close on final fragment");
        assert_eq!(record.name, "weather");
        assert_eq!(record.args, "Paris");
    }

    #[test]
    fn keys_are_case_insensitive_and_trimmed() {
        let mut parser = ToolCallParser::default();
        let record = parser
            .feed("<tool_call>\n  NAME :  search  \n  ARGS:  q  \n</tool_call>")
            .unwrap();
        assert_eq!(record.name, "search");
        assert_eq!(record.args, "q");
    }

    #[test]
    fn missing_name_produces_no_record_and_resets() {
        let mut parser = ToolCallParser::default();
        assert!(parser
            .feed("<tool_call>\nargs: orphaned\n</tool_call>")
            .is_none());
        // Parser must have reset to Outside; a fresh valid block still works.
        let record = parser
            .feed("<tool_call>\nname: ok\n</tool_call>")
            .unwrap();
        assert_eq!(record.name, "ok");
    }

    #[test]
    fn args_key_is_optional() {
        let mut parser = ToolCallParser::default();
        let record = parser.feed("<tool_call>\nname: ping\n</tool_call>").unwrap();
        assert_eq!(record.args, "");
    }
}
