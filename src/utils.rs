//! Text helpers for turning model output into Telegram-safe HTML.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref RE_CODE_BLOCK: Regex = Regex::new(r"```[\s\S]*?```").expect("static regex");
    static ref RE_CODE_BLOCK_FENCE: Regex =
        Regex::new(r"```(\w+)?\n([\s\S]*?)```").expect("static regex");
    static ref RE_BULLET: Regex = Regex::new(r"(?m)^\* ").expect("static regex");
    static ref RE_BOLD: Regex = Regex::new(r"\*\*(.*?)\*\*").expect("static regex");
    static ref RE_ITALIC: Regex = Regex::new(r"\*(.*?)\*").expect("static regex");
    static ref RE_INLINE_CODE: Regex = Regex::new(r"`([^`]*?)`").expect("static regex");
    static ref RE_MULTI_NEWLINE: Regex = Regex::new(r"\n{3,}").expect("static regex");
}

/// Close an unterminated ``` fence so downstream formatting and message
/// splitting never see an odd number of fences.
pub fn balance_fences(text: &str) -> String {
    if text.matches("```").count() % 2 != 0 {
        let mut owned = text.to_string();
        owned.push_str("\n```");
        owned
    } else {
        text.to_string()
    }
}

/// Escape stray `<` and `>` without touching the tags this module emits.
/// One pass over the chars, tracking whether we are inside a tag.
fn escape_angle_brackets(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len() + 8);
    let mut in_tag = false;

    for (i, &c) in chars.iter().enumerate() {
        if c == '<' {
            // A tag starts with an ASCII letter, optionally after a slash.
            let tag_like = match chars.get(i + 1) {
                Some('/') => chars.get(i + 2).is_some_and(|ch| ch.is_ascii_alphabetic()),
                Some(ch) => ch.is_ascii_alphabetic(),
                None => false,
            };
            if tag_like {
                out.push('<');
                in_tag = true;
            } else {
                out.push_str("&lt;");
            }
        } else if c == '>' {
            if in_tag {
                out.push('>');
                in_tag = false;
            } else {
                out.push_str("&gt;");
            }
        } else {
            out.push(c);
        }
    }
    out
}

fn escape_outside_code_blocks(text: &str) -> String {
    let mut code_blocks = Vec::new();
    let mut with_placeholders = String::new();
    let mut last_end = 0;

    for mat in RE_CODE_BLOCK.find_iter(text) {
        with_placeholders.push_str(&text[last_end..mat.start()]);
        with_placeholders.push_str(&format!("__CODE_BLOCK_{}__", code_blocks.len()));
        code_blocks.push(mat.as_str().to_string());
        last_end = mat.end();
    }
    with_placeholders.push_str(&text[last_end..]);

    let mut escaped = escape_angle_brackets(&with_placeholders);
    for (i, block) in code_blocks.iter().enumerate() {
        escaped = escaped.replace(&format!("__CODE_BLOCK_{i}__"), block);
    }
    escaped
}

/// Convert model markdown to the HTML subset Telegram accepts.
pub fn format_text(text: &str) -> String {
    let mut owned = escape_outside_code_blocks(&balance_fences(text));

    // ```lang\ncode``` -> <pre><code class="lang">code</code></pre>,
    // parked behind placeholders until the inline passes are done so
    // `*` and backticks inside rendered code stay literal.
    let mut pre_blocks = Vec::new();
    owned = RE_CODE_BLOCK_FENCE
        .replace_all(&owned, |caps: &regex::Captures| {
            let lang = caps.get(1).map_or("", |m| m.as_str());
            let code = caps.get(2).map_or("", |m| m.as_str()).trim();
            pre_blocks.push(format!(
                "<pre><code class=\"{}\">{}</code></pre>",
                lang,
                html_escape::encode_text(code)
            ));
            format!("__PRE_BLOCK_{}__", pre_blocks.len() - 1)
        })
        .to_string();

    owned = RE_BULLET.replace_all(&owned, "• ").to_string();
    owned = RE_BOLD.replace_all(&owned, "<b>$1</b>").to_string();
    owned = RE_ITALIC.replace_all(&owned, "<i>$1</i>").to_string();
    owned = RE_INLINE_CODE
        .replace_all(&owned, |caps: &regex::Captures| {
            let code = caps.get(1).map_or("", |m| m.as_str());
            format!("<code>{}</code>", html_escape::encode_text(code))
        })
        .to_string();
    owned = RE_MULTI_NEWLINE.replace_all(&owned, "\n\n").to_string();

    for (i, block) in pre_blocks.iter().enumerate() {
        owned = owned.replace(&format!("__PRE_BLOCK_{i}__"), block);
    }

    owned.trim().to_string()
}

/// Break an overlong line into chunks of at most `budget` bytes, cutting
/// only on char boundaries.
fn chunk_line(line: &str, budget: usize) -> Vec<&str> {
    if line.len() <= budget {
        return vec![line];
    }

    let mut chunks = Vec::new();
    let mut start = 0;
    for (idx, c) in line.char_indices() {
        if idx + c.len_utf8() - start > budget && idx > start {
            chunks.push(&line[start..idx]);
            start = idx;
        }
    }
    chunks.push(&line[start..]);
    chunks
}

/// Split a message into parts below Telegram's length limit, re-opening
/// code fences across the boundary so each part renders on its own.
/// Single lines longer than the limit are hard-split on char boundaries;
/// they would otherwise pass through whole and get the send rejected.
pub fn split_long_message(message: &str, max_length: usize) -> Vec<String> {
    if message.is_empty() {
        return Vec::new();
    }
    if message.len() <= max_length {
        return vec![message.to_string()];
    }

    const FENCE: &str = "```";
    // Leaves room within max_length for a closing fence, a re-opened
    // fence and the trailing newline.
    let budget = max_length.saturating_sub(2 * FENCE.len() + 3).max(1);
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut in_code_block = false;

    for line in message.lines() {
        if line.starts_with(FENCE) {
            in_code_block = !in_code_block;
        }

        for piece in chunk_line(line, budget) {
            if current.len() + piece.len() + 1 > max_length && !current.is_empty() {
                if in_code_block {
                    current.push_str(FENCE);
                    current.push('\n');
                }
                parts.push(current.trim_end().to_string());
                current.clear();
                if in_code_block && !piece.starts_with(FENCE) {
                    current.push_str(FENCE);
                    current.push('\n');
                }
            }

            current.push_str(piece);
            current.push('\n');
        }
    }

    if !current.is_empty() {
        if in_code_block {
            current.push_str(FENCE);
            current.push('\n');
        }
        parts.push(current.trim_end().to_string());
    }

    parts
}

/// Cut a string down to at most `max_chars` characters. Counts chars,
/// not bytes, so multi-byte text is never sliced mid-codepoint.
pub fn truncate_str(s: impl AsRef<str>, max_chars: usize) -> String {
    let s = s.as_ref();
    match s.char_indices().nth(max_chars) {
        Some((pos, _)) => s[..pos].to_string(),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn balances_unclosed_fence() {
        let balanced = balance_fences("```python\nprint('hi')");
        assert_eq!(balanced.matches("```").count(), 2);
        assert_eq!(balance_fences("no code here"), "no code here");
    }

    #[test]
    fn formats_bold_italic_and_bullets() {
        let html = format_text("* point one\n**bold** and *italic*");
        assert!(html.contains("• point one"));
        assert!(html.contains("<b>bold</b>"));
        assert!(html.contains("<i>italic</i>"));
    }

    #[test]
    fn formats_code_blocks_with_language() {
        let html = format_text("```rust\nlet x = 1;\n```");
        assert!(html.contains("<pre><code class=\"rust\">"));
        assert!(html.contains("let x = 1;"));
    }

    #[test]
    fn inline_markdown_stays_literal_inside_code_blocks() {
        let html = format_text("```\nlet x = a * b * c;\n```");
        assert!(html.contains("let x = a * b * c;"), "{html}");
        assert!(!html.contains("<i>"), "{html}");

        let html = format_text("```\nlook_up(`key`)\n```");
        assert!(html.contains("look_up(`key`)"), "{html}");
    }

    #[test]
    fn escapes_naked_angle_brackets_but_not_tags() {
        let html = format_text("2 < 3 and <b>kept</b>");
        assert!(html.contains("2 &lt; 3"));
        assert!(html.contains("<b>kept</b>"));
    }

    #[test]
    fn short_messages_are_not_split() {
        assert_eq!(split_long_message("hello", 4000), vec!["hello"]);
        assert!(split_long_message("", 4000).is_empty());
    }

    #[test]
    fn long_messages_split_below_limit() {
        let message = "line\n".repeat(100);
        let parts = split_long_message(&message, 50);
        assert!(parts.len() > 1);
        for part in &parts {
            assert!(part.len() <= 50);
        }
    }

    #[test]
    fn oversized_single_line_is_hard_split() {
        // A long unbroken paragraph, the common shape of LLM prose.
        let message = "word ".repeat(1200);
        let parts = split_long_message(message.trim_end(), 4000);
        assert!(parts.len() > 1);
        for part in &parts {
            assert!(part.len() <= 4000, "part of {} bytes", part.len());
        }
        // Nothing beyond boundary whitespace may be dropped.
        let rejoined: String = parts.concat();
        assert!(rejoined.len() + parts.len() >= message.trim_end().len());
    }

    #[test]
    fn hard_split_cuts_on_char_boundaries() {
        let message = "п".repeat(300);
        let parts = split_long_message(&message, 100);
        assert!(parts.len() > 1);
        for part in &parts {
            assert!(part.len() <= 100);
            assert!(part.chars().all(|c| c == 'п' || c == '\n'), "{part}");
        }
    }

    #[test]
    fn split_reopens_code_fences() {
        let mut message = String::from("```\n");
        for i in 0..30 {
            message.push_str(&format!("code line {i}\n"));
        }
        message.push_str("```\n");

        let parts = split_long_message(&message, 120);
        assert!(parts.len() > 1);
        for part in &parts {
            assert_eq!(
                part.matches("```").count() % 2,
                0,
                "unbalanced fences in part: {part}"
            );
        }
    }

    #[test]
    fn truncate_is_unicode_safe() {
        let s = "Привет, мир!";
        assert_eq!(truncate_str(s, 6), "Привет");
        assert_eq!(truncate_str(s, 50), "Привет, мир!");
    }
}
