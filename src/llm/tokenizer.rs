//! Approximate token estimation and length-preserving truncation.
//!
//! Providers differ in their real tokenizers; rather than vendoring one per
//! family we use a cheap char-based estimate (~4 chars/token for
//! mixed English/code text) the same way the context pipeline and window
//! manager budget things. Truncation always cuts on a UTF-8 char boundary.

const CHARS_PER_TOKEN: usize = 4;

/// Approximate token count of a single string.
pub fn estimate_tokens(text: &str) -> u32 {
    let chars = text.chars().count();
    ((chars + CHARS_PER_TOKEN - 1) / CHARS_PER_TOKEN) as u32
}

/// Approximate token count of a sequence of message texts, plus a small
/// per-message overhead for role/framing tokens.
pub fn estimate_message_tokens<'a>(texts: impl IntoIterator<Item = &'a str>) -> u32 {
    const PER_MESSAGE_OVERHEAD: u32 = 4;
    texts
        .into_iter()
        .map(|t| estimate_tokens(t) + PER_MESSAGE_OVERHEAD)
        .sum()
}

/// Shrink `text` to approximately `max_tokens` tokens, cutting on a char
/// boundary and appending a trailing marker so callers can tell the content
/// was truncated.
pub fn truncate_to_tokens(text: &str, max_tokens: u32) -> String {
    let marker = "\n…[truncated]";
    let budget_chars = (max_tokens as usize).saturating_mul(CHARS_PER_TOKEN);
    if text.chars().count() <= budget_chars {
        return text.to_string();
    }
    let keep_chars = budget_chars.saturating_sub(marker.chars().count());
    let mut out: String = text.chars().take(keep_chars).collect();
    out.push_str(marker);
    out
}

/// Shrink `text` to approximately `fraction` of `budget_tokens`, used by the
/// context pipeline's proportional trimming rule.
pub fn shrink_to_fraction(text: &str, budget_tokens: u32, fraction: f64) -> String {
    let target = ((budget_tokens as f64) * fraction).floor().max(1.0) as u32;
    truncate_to_tokens(text, target)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estimate_rounds_up() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
    }

    #[test]
    fn truncate_is_noop_under_budget() {
        let text = "short text";
        assert_eq!(truncate_to_tokens(text, 100), text);
    }

    #[test]
    fn truncate_cuts_on_char_boundary_with_multibyte() {
        let text = "你好".repeat(50);
        let out = truncate_to_tokens(&text, 10);
        assert!(out.ends_with("[truncated]"));
        // Must not panic building this string; implies char-boundary safety.
        assert!(out.chars().count() > 0);
    }
}
