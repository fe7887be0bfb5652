// Result sanitization (spec §4.2). Applied to tool output before it
// re-enters the LLM context, as a pipeline of independent passes so a new
// pass composes without touching call sites — the same pattern-table shape
// the policy kernel's injection scanner uses.

use crate::atoms::types::AuthorityTier;
use crate::policy::redaction::{redact_credentials, redact_pii};
use regex::Regex;
use std::sync::OnceLock;

const MAX_BLOB_BYTES: usize = 8192;

fn script_tag_regex() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    CELL.get_or_init(|| Regex::new(r"(?is)<script\b[^>]*>.*?</script>").expect("static regex"))
}

fn password_field_regex() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    CELL.get_or_init(|| {
        Regex::new(r#"(?i)"password"\s*:\s*"[^"]*""#).expect("static regex")
    })
}

/// Strip `<script>...</script>` blocks from HTML-bearing tool output.
pub fn strip_scripts(text: &str) -> String {
    script_tag_regex().replace_all(text, "[script removed]").into_owned()
}

/// Redact password-typed JSON fields (`"password": "..."`).
pub fn redact_password_fields(text: &str) -> String {
    password_field_regex().replace_all(text, r#""password":"[REDACTED]""#).into_owned()
}

/// Truncate large embedded data blobs (base64 image/audio payloads, huge
/// single-line dumps) to keep conversation context bounded.
pub fn truncate_blobs(text: &str, max_bytes: usize) -> String {
    if text.len() <= max_bytes {
        return text.to_string();
    }
    let truncated = crate::atoms::types::truncate_utf8(text, max_bytes);
    format!("{truncated}\n...[truncated {} bytes]", text.len() - truncated.len())
}

/// PII scan applied only for non-owner sessions; owner sees raw content
/// with a single warning marker prepended.
pub fn pii_pass(text: &str, tier: AuthorityTier) -> String {
    match tier {
        AuthorityTier::Owner => format!("[unredacted: owner tier] {text}"),
        _ => redact_pii(text),
    }
}

/// The full sanitization pipeline applied to a single tool result string
/// before it is appended back to the conversation.
pub fn sanitize_tool_output(text: &str, tier: AuthorityTier) -> String {
    let mut out = strip_scripts(text);
    out = redact_password_fields(&out);
    out = truncate_blobs(&out, MAX_BLOB_BYTES);
    out = redact_credentials(&out);
    out = pii_pass(&out, tier);
    out
}

/// Browser tool family names, dropped from conversations before they reach
/// the dataset builder (spec §4.2 training-data boundary).
const BROWSER_TOOL_FAMILY: &[&str] = &["browser_navigate", "browser_click", "browser_type", "browser_screenshot", "browser_extract"];

pub fn is_browser_tool(name: &str) -> bool {
    BROWSER_TOOL_FAMILY.contains(&name)
}

/// Drop tool-call/result turn pairs belonging to the browser tool family
/// from a conversation slated for the dataset builder. Turns are dropped in
/// adjacent (tool-call-turn, tool-result-turn) pairs so no orphaned
/// tool_call_id is ever left behind.
pub fn drop_browser_pairs(turns: &[crate::atoms::types::Turn]) -> Vec<crate::atoms::types::Turn> {
    use crate::atoms::types::Role;
    let mut out = Vec::with_capacity(turns.len());
    let mut skip_result_for: Vec<String> = Vec::new();

    for turn in turns {
        if turn.role == Role::Assistant && turn.tool_calls.iter().any(|c| is_browser_tool(&c.name)) {
            for call in &turn.tool_calls {
                if is_browser_tool(&call.name) {
                    skip_result_for.push(call.id.clone());
                }
            }
            if turn.tool_calls.iter().all(|c| is_browser_tool(&c.name)) {
                continue;
            }
        }
        if turn.role == Role::Tool {
            if let Some(id) = &turn.tool_call_id {
                if let Some(pos) = skip_result_for.iter().position(|x| x == id) {
                    skip_result_for.remove(pos);
                    continue;
                }
            }
        }
        out.push(turn.clone());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atoms::types::{Role, ToolCallRequest, Turn};

    fn turn(role: Role, content: &str) -> Turn {
        Turn {
            role,
            content: content.to_string(),
            tool_calls: vec![],
            tool_call_id: None,
            attachments: vec![],
            created_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn strips_script_tags() {
        let html = "<div>hi</div><script>alert(1)</script><p>bye</p>";
        let out = strip_scripts(html);
        assert!(!out.contains("alert(1)"));
        assert!(out.contains("[script removed]"));
    }

    #[test]
    fn redacts_password_json_field() {
        let json = r#"{"username":"bob","password":"hunter2"}"#;
        let out = redact_password_fields(json);
        assert!(!out.contains("hunter2"));
    }

    #[test]
    fn truncates_oversized_blobs() {
        let big = "x".repeat(20_000);
        let out = truncate_blobs(&big, MAX_BLOB_BYTES);
        assert!(out.len() < big.len());
        assert!(out.contains("truncated"));
    }

    #[test]
    fn owner_sees_raw_content_with_marker() {
        let out = pii_pass("ssn 123-45-6789", AuthorityTier::Owner);
        assert!(out.contains("123-45-6789"));
        assert!(out.starts_with("[unredacted: owner tier]"));
    }

    #[test]
    fn public_tier_gets_pii_redacted() {
        let out = pii_pass("email me at a@b.com", AuthorityTier::Public);
        assert!(!out.contains("a@b.com"));
    }

    #[test]
    fn drop_browser_pairs_removes_call_and_result() {
        let mut call_turn = turn(Role::Assistant, "");
        call_turn.tool_calls = vec![ToolCallRequest {
            id: "call-1".into(),
            name: "browser_navigate".into(),
            arguments: serde_json::json!({}),
        }];
        let mut result_turn = turn(Role::Tool, "page loaded");
        result_turn.tool_call_id = Some("call-1".into());
        let keep_turn = turn(Role::User, "what did you find?");

        let turns = vec![call_turn, result_turn, keep_turn.clone()];
        let cleaned = drop_browser_pairs(&turns);
        assert_eq!(cleaned.len(), 1);
        assert_eq!(cleaned[0].content, keep_turn.content);
    }

    #[test]
    fn drop_browser_pairs_keeps_non_browser_turns() {
        let mut call_turn = turn(Role::Assistant, "");
        call_turn.tool_calls = vec![ToolCallRequest {
            id: "call-2".into(),
            name: "read_file".into(),
            arguments: serde_json::json!({}),
        }];
        let mut result_turn = turn(Role::Tool, "contents");
        result_turn.tool_call_id = Some("call-2".into());
        let turns = vec![call_turn, result_turn];
        let cleaned = drop_browser_pairs(&turns);
        assert_eq!(cleaned.len(), 2);
    }
}
