//! Block masking: hides brace- and fence-delimited bodies behind opaque
//! tokens before the line filter runs, so that unbalanced braces or stray
//! sigils *inside* a body never confuse the "is this a DSL line" check.
//!
//! Masking is applied in three layers, heaviest wrapping first: code
//! fences, then `{{ double braces }}`, then `{ single braces }`. Only the
//! outermost block of each layer is masked — nested delimiters of the same
//! kind are swallowed whole into the token's replacement text.

use std::collections::HashMap;

const SENTINEL: char = '\u{1}';

/// Lines are kept when their first non-whitespace character is one of
/// these; everything else is prose noise and is discarded.
const SIGILS: &[char] = &['#', ':', '/', '@', '!'];

/// Replaces outermost balanced blocks with sentinel-wrapped tokens and
/// remembers the original text so it can be restored later. A fresh
/// `BlockMasker` must be used per document: tokens are only guaranteed
/// unique within one masker's lifetime.
pub struct BlockMasker {
    replacements: HashMap<String, String>,
    next_id: usize,
}

impl BlockMasker {
    pub fn new() -> Self {
        BlockMasker {
            replacements: HashMap::new(),
            next_id: 0,
        }
    }

    fn next_token(&mut self) -> String {
        let token = format!("{SENTINEL}BLOCK{}{SENTINEL}", self.next_id);
        self.next_id += 1;
        token
    }

    /// Masks every outermost `open ... close` block in `text`. When
    /// `open == close` the marker toggles a block on and off (code fences);
    /// otherwise nesting is tracked with a depth counter (braces).
    fn mask_layer(&mut self, text: &str, open: &str, close: &str) -> String {
        if text.is_empty() {
            return text.to_string();
        }

        let is_toggle = open == close;
        let mut out = String::with_capacity(text.len());
        let mut depth = 0usize;
        let mut block_start = 0usize;
        let mut cursor = 0usize;
        let mut last_copied = 0usize;

        while cursor < text.len() {
            if depth > 0 && text[cursor..].starts_with(close) {
                if is_toggle {
                    depth = 0;
                } else {
                    depth -= 1;
                }
                cursor += close.len();
                if depth == 0 {
                    let token = self.next_token();
                    self.replacements
                        .insert(token.clone(), text[block_start..cursor].to_string());
                    out.push_str(&text[last_copied..block_start]);
                    out.push_str(&token);
                    last_copied = cursor;
                }
                continue;
            }

            if text[cursor..].starts_with(open) {
                if depth == 0 {
                    block_start = cursor;
                }
                if is_toggle {
                    if depth == 0 {
                        depth = 1;
                    }
                } else {
                    depth += 1;
                }
                cursor += open.len();
                continue;
            }

            let advance = text[cursor..].chars().next().map_or(1, |c| c.len_utf8());
            cursor += advance;
        }

        out.push_str(&text[last_copied..]);
        out
    }

    /// Applies the three masking layers in the order the design requires:
    /// code fences first (strongest), then `{{ }}`, then `{ }` (weakest).
    pub fn mask_all(&mut self, text: &str) -> String {
        let text = self.mask_layer(text, "```", "```");
        let text = self.mask_layer(&text, "{{", "}}");
        self.mask_layer(&text, "{", "}")
    }

    /// Restores every token produced by this masker, recursively, so that
    /// line-joining during filtering can't strand a token half-replaced.
    pub fn unmask(&self, text: &str) -> String {
        let mut result = text.to_string();
        loop {
            let mut replaced_any = false;
            for (token, original) in &self.replacements {
                if result.contains(token.as_str()) {
                    result = result.replace(token.as_str(), original);
                    replaced_any = true;
                }
            }
            if !replaced_any {
                break;
            }
        }
        result
    }
}

impl Default for BlockMasker {
    fn default() -> Self {
        Self::new()
    }
}

/// Keeps only lines whose first non-whitespace character is a DSL sigil.
/// Bodies are single tokens at this point, so a line's definition stays
/// intact even though its body spans what was originally many lines.
pub fn filter_dsl_lines(text: &str) -> String {
    text.lines()
        .filter(|line| {
            line.trim_start()
                .chars()
                .next()
                .map_or(false, |c| SIGILS.contains(&c))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// The full pipeline: mask, filter, unmask. What comes out is DSL-only
/// text with bodies restored, ready for [`crate::dsl::parser::parse`].
pub fn mask_and_filter(text: &str) -> String {
    let mut masker = BlockMasker::new();
    let masked = masker.mask_all(text);
    let filtered = filter_dsl_lines(&masked);
    masker.unmask(&filtered)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masks_and_restores_single_brace_body() {
        let mut masker = BlockMasker::new();
        let masked = masker.mask_all("/x { hello world }");
        assert!(!masked.contains('{'));
        let restored = masker.unmask(&masked);
        assert_eq!(restored, "/x { hello world }");
    }

    #[test]
    fn double_brace_body_may_contain_unbalanced_single_braces() {
        let mut masker = BlockMasker::new();
        let text = "/x {{ a { unbalanced }}";
        let masked = masker.mask_all(text);
        let restored = masker.unmask(&masked);
        assert_eq!(restored, text);
    }

    #[test]
    fn code_fence_masked_before_braces() {
        let mut masker = BlockMasker::new();
        let text = "/x ```fn f() { 1 }``` { body }";
        let masked = masker.mask_all(text);
        assert!(!masked.contains('{'));
        assert_eq!(masker.unmask(&masked), text);
    }

    #[test]
    fn prose_lines_without_sigils_are_dropped() {
        let text = "Hi there,\n#ideas\n/write-docs { doc }\nThanks,\nAlice";
        let filtered = mask_and_filter(text);
        assert_eq!(filtered, "#ideas\n/write-docs { doc }");
    }

    #[test]
    fn noise_after_unbalanced_double_brace_block_is_stripped() {
        let text = "#ideas\n/x {{ a } b }}\nSincerely, someone";
        let filtered = mask_and_filter(text);
        assert_eq!(filtered, "#ideas\n/x {{ a } b }}");
    }
}
