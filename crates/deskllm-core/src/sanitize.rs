//! Post-generation cleanup of model continuations for display.

use std::sync::LazyLock;

use regex::Regex;
use tracing::warn;

/// Returned whenever cleanup leaves nothing readable.
pub const FALLBACK_RESPONSE: &str =
    "I'm sorry, I couldn't produce a readable response. Please try rephrasing your question.";

/// Replacement for every URL in the output.
pub const LINK_PLACEHOLDER: &str = "[link]";

/// Removal passes repeat until the text stops changing, bounded by this.
const MAX_PASSES: usize = 4;

struct Rules {
    whitespace: Regex,
    code_fence: Regex,
    tag: Regex,
    url: Regex,
}

impl Rules {
    fn build() -> Result<Self, regex::Error> {
        Ok(Self {
            whitespace: Regex::new(r"\s+")?,
            code_fence: Regex::new(r"```[\s\S]*?```")?,
            tag: Regex::new(r"<[^>]*>")?,
            url: Regex::new(r"https?://\S+")?,
        })
    }
}

static RULES: LazyLock<Result<Rules, regex::Error>> = LazyLock::new(Rules::build);

/// Clean a raw continuation.
///
/// Steps, in order: drop control characters (whitespace survives), replace
/// characters outside the display set with a space, collapse whitespace,
/// remove fenced code blocks, strip markup tags, replace URLs with
/// [`LINK_PLACEHOLDER`], trim. The result is never empty and this function
/// never panics: any failure yields [`FALLBACK_RESPONSE`].
pub fn sanitize(text: &str) -> String {
    let cleaned = std::panic::catch_unwind(|| run_pipeline(text)).unwrap_or_else(|_| {
        warn!("Sanitizer panicked, using fallback response");
        None
    });
    match cleaned {
        Some(s) if !s.is_empty() => s,
        _ => FALLBACK_RESPONSE.to_string(),
    }
}

fn run_pipeline(text: &str) -> Option<String> {
    let rules = match RULES.as_ref() {
        Ok(rules) => rules,
        Err(e) => {
            warn!(error = %e, "Sanitizer rules failed to compile");
            return None;
        }
    };

    let printable: String = text
        .chars()
        .filter(|c| !c.is_control() || c.is_whitespace())
        .map(|c| if is_display_char(c) { c } else { ' ' })
        .collect();
    let mut current = rules.whitespace.replace_all(&printable, " ").into_owned();

    // A removal can join fragments into a new fence, tag or URL.
    for _ in 0..MAX_PASSES {
        let next = rules.code_fence.replace_all(&current, "");
        let next = rules.tag.replace_all(&next, "");
        let next = rules.url.replace_all(&next, LINK_PLACEHOLDER);
        let next = rules.whitespace.replace_all(next.trim(), " ").into_owned();
        if next == current {
            break;
        }
        current = next;
    }
    Some(current)
}

/// Whitespace plus the Unicode blocks the chat surface renders.
fn is_display_char(c: char) -> bool {
    c.is_whitespace()
        || matches!(
            c as u32,
            0x0020..=0x007E     // Basic Latin
            | 0x00A0..=0x024F   // Latin-1 Supplement, Latin Extended-A/B
            | 0x0370..=0x03FF   // Greek
            | 0x0400..=0x04FF   // Cyrillic
            | 0x2000..=0x206F   // General Punctuation
            | 0x20A0..=0x20CF   // Currency Symbols
            | 0x2100..=0x22FF   // Letterlike, Number Forms, Arrows, Math Operators
            | 0x3000..=0x30FF   // CJK Symbols, Hiragana, Katakana
            | 0x4E00..=0x9FFF   // CJK Unified Ideographs
            | 0xAC00..=0xD7AF   // Hangul Syllables
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_is_unchanged() {
        assert_eq!(sanitize("Hello, world! 2 + 2 = 4."), "Hello, world! 2 + 2 = 4.");
    }

    #[test]
    fn test_whitespace_collapsed_and_trimmed() {
        assert_eq!(sanitize("  one\n\n two\t\tthree  "), "one two three");
    }

    #[test]
    fn test_control_characters_removed() {
        assert_eq!(sanitize("a\u{0007}b\u{001B}c"), "abc");
    }

    #[test]
    fn test_unsupported_characters_become_spaces() {
        assert_eq!(sanitize("good\u{1F600}job"), "good job");
    }

    #[test]
    fn test_scripts_in_display_set_survive() {
        let text = "Привет Γειά こんにちは 你好 안녕 café €5 → ∑";
        assert_eq!(sanitize(text), text);
    }

    #[test]
    fn test_code_fence_removed() {
        assert_eq!(sanitize("Try this:\n```rust\nfn main() {}\n```\nDone."), "Try this: Done.");
    }

    #[test]
    fn test_tags_stripped() {
        assert_eq!(sanitize("<b>bold</b> and <i>italic</i>"), "bold and italic");
    }

    #[test]
    fn test_urls_replaced() {
        assert_eq!(
            sanitize("See https://example.com/a?b=c and http://x.y for more"),
            "See [link] and [link] for more"
        );
    }

    #[test]
    fn test_total_loss_returns_fallback() {
        assert_eq!(sanitize("\u{1F600}\u{1F601}\u{1F680}"), FALLBACK_RESPONSE);
        assert_eq!(sanitize(""), FALLBACK_RESPONSE);
        assert_eq!(sanitize("```only code```"), FALLBACK_RESPONSE);
        assert_eq!(sanitize("<div></div>"), FALLBACK_RESPONSE);
    }

    #[test]
    fn test_idempotent() {
        let samples = [
            "Hello <b>there</b> https://a.b/c\n\n```x```  friend\u{1F600}!",
            "``<a>` inner ``<b>` tail",
            "http<x>s://joined.example end",
            "   \t\n ",
            "Plain sentence.",
            "<<b>x>",
        ];
        for sample in samples {
            let once = sanitize(sample);
            assert_eq!(sanitize(&once), once, "not idempotent for {sample:?}");
        }
    }

    #[test]
    fn test_fallback_is_stable() {
        assert_eq!(sanitize(FALLBACK_RESPONSE), FALLBACK_RESPONSE);
    }
}
