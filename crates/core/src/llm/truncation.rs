// Truncation / silent-censorship detection (spec §4.4). `finish_reason` is
// recorded verbatim; `suspected_truncated` additionally flags responses that
// look cut off even when the provider claims a clean stop.

use crate::atoms::constants::SILENT_TRUNCATION_TOKEN_THRESHOLD;

const TERMINAL_PUNCTUATION: &[char] = &['.', '!', '?', '"', '\'', ')', '`'];

/// finish_reason values that explicitly mean "we stopped you early".
fn is_explicit_truncation(finish_reason: &str) -> bool {
    matches!(finish_reason, "length" | "content_filter" | "MAX_TOKENS" | "SAFETY")
}

/// A response with a "clean" finish_reason can still look truncated: long,
/// no terminal punctuation, and not ending inside a closed code block.
fn looks_silently_truncated(content: &str, out_tokens: i64) -> bool {
    if out_tokens < SILENT_TRUNCATION_TOKEN_THRESHOLD as i64 {
        return false;
    }
    let trimmed = content.trim_end();
    if trimmed.is_empty() {
        return false;
    }
    let ends_clean = trimmed.ends_with(TERMINAL_PUNCTUATION) || trimmed.ends_with("```");
    !ends_clean
}

/// `suspected_truncated` flag for an LLM usage row, per spec §4.4.
pub fn suspected_truncated(content: &str, finish_reason: &str, out_tokens: i64) -> bool {
    is_explicit_truncation(finish_reason) || looks_silently_truncated(content, out_tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_length_cutoff_is_flagged() {
        assert!(suspected_truncated("the next step is to", "length", 50));
    }

    #[test]
    fn content_filter_is_flagged_regardless_of_length() {
        assert!(suspected_truncated("blocked", "content_filter", 10));
    }

    #[test]
    fn clean_short_stop_is_not_flagged() {
        assert!(!suspected_truncated("Here is the answer.", "stop", 40));
    }

    #[test]
    fn long_stop_without_terminal_punctuation_is_flagged() {
        let body = "word ".repeat(600);
        assert!(suspected_truncated(body.trim(), "stop", 600));
    }

    #[test]
    fn long_stop_ending_in_closed_code_block_is_not_flagged() {
        let body = format!("{}```", "word ".repeat(600));
        assert!(!suspected_truncated(&body, "stop", 600));
    }

    #[test]
    fn long_stop_ending_with_punctuation_is_not_flagged() {
        let body = format!("{}.", "word ".repeat(600));
        assert!(!suspected_truncated(&body, "stop", 600));
    }
}
