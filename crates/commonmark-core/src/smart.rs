//! Typographic substitution: straight quotes to curly, hyphen runs to
//! dashes, three dots to an ellipsis. Runs as a post-pass over the
//! finished tree; code spans and raw HTML are left untouched.

use crate::ast::{Block, BlockKind, Document, Inline, InlineKind};

pub(crate) fn apply(document: &mut Document) {
    for block in &mut document.blocks {
        apply_block(block);
    }
}

fn apply_block(block: &mut Block) {
    match &mut block.kind {
        BlockKind::Paragraph { content } | BlockKind::Heading { content, .. } => {
            let mut prev = None;
            apply_seq(content, &mut prev);
        }
        BlockKind::BlockQuote { blocks } => {
            for child in blocks {
                apply_block(child);
            }
        }
        BlockKind::List(list) => {
            for item in &mut list.items {
                for child in &mut item.blocks {
                    apply_block(child);
                }
            }
        }
        BlockKind::CodeBlock(_) | BlockKind::HtmlBlock { .. } | BlockKind::ThematicBreak => {}
    }
}

fn apply_seq(inlines: &mut [Inline], prev: &mut Option<char>) {
    for inline in inlines {
        match &mut inline.kind {
            InlineKind::Text(text) => {
                *text = substitute(text, prev);
            }
            InlineKind::Emph(children) | InlineKind::Strong(children) => {
                apply_seq(children, prev);
            }
            InlineKind::Link { children, .. } => apply_seq(children, prev),
            InlineKind::Image { alt, .. } => apply_seq(alt, prev),
            InlineKind::SoftBreak | InlineKind::HardBreak => *prev = Some('\n'),
            InlineKind::CodeSpan(_) | InlineKind::Html(_) => {
                // A quote right after a span reads as closing.
                *prev = Some('a');
            }
        }
    }
}

fn substitute(text: &str, prev: &mut Option<char>) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;
    while i < chars.len() {
        let ch = chars[i];
        match ch {
            '\'' => {
                let replaced = if open_context(*prev) { '\u{2018}' } else { '\u{2019}' };
                out.push(replaced);
                *prev = Some(replaced);
                i += 1;
            }
            '"' => {
                let replaced = if open_context(*prev) { '\u{201C}' } else { '\u{201D}' };
                out.push(replaced);
                *prev = Some(replaced);
                i += 1;
            }
            '-' => {
                let mut run = 1;
                while i + run < chars.len() && chars[i + run] == '-' {
                    run += 1;
                }
                if run == 1 {
                    out.push('-');
                    *prev = Some('-');
                } else {
                    let (ens, ems) = dash_counts(run);
                    for _ in 0..ems {
                        out.push('\u{2014}');
                    }
                    for _ in 0..ens {
                        out.push('\u{2013}');
                    }
                    *prev = Some('\u{2013}');
                }
                i += run;
            }
            '.' => {
                if i + 2 < chars.len() && chars[i + 1] == '.' && chars[i + 2] == '.' {
                    out.push('\u{2026}');
                    *prev = Some('\u{2026}');
                    i += 3;
                } else {
                    out.push('.');
                    *prev = Some('.');
                    i += 1;
                }
            }
            _ => {
                out.push(ch);
                *prev = Some(ch);
                i += 1;
            }
        }
    }
    out
}

fn open_context(prev: Option<char>) -> bool {
    match prev {
        None => true,
        Some(ch) => {
            ch.is_whitespace()
                || matches!(
                    ch,
                    '(' | '[' | '{' | '-' | '\u{2018}' | '\u{201C}' | '\u{2013}' | '\u{2014}'
                )
        }
    }
}

/// Hyphen runs map to em and en dashes the way a typographer would
/// space them: thirds first, then halves, then a mix.
fn dash_counts(run: usize) -> (usize, usize) {
    if run % 3 == 0 {
        (0, run / 3)
    } else if run % 2 == 0 {
        (run / 2, 0)
    } else if run % 3 == 2 {
        (1, (run - 2) / 3)
    } else {
        (2, (run - 4) / 3)
    }
}

#[cfg(test)]
mod tests {
    use crate::ast::{BlockKind, InlineKind};
    use crate::parser::{ParseOptions, parse_with_options};

    fn smart_text(source: &str) -> String {
        let options = ParseOptions {
            smart: true,
            ..Default::default()
        };
        let result = parse_with_options(source, &options).expect("parse");
        let BlockKind::Paragraph { content } = &result.document.blocks[0].kind else {
            panic!("expected paragraph");
        };
        content
            .iter()
            .map(|inline| match &inline.kind {
                InlineKind::Text(text) => text.clone(),
                other => panic!("unexpected inline {:?}", other),
            })
            .collect()
    }

    #[test]
    fn quotes_curl_by_context() {
        assert_eq!(smart_text("\"Hello,\" she said."), "\u{201C}Hello,\u{201D} she said.");
        assert_eq!(smart_text("it's"), "it\u{2019}s");
    }

    #[test]
    fn dashes_and_ellipses() {
        assert_eq!(smart_text("a--b"), "a\u{2013}b");
        assert_eq!(smart_text("a---b"), "a\u{2014}b");
        assert_eq!(smart_text("wait..."), "wait\u{2026}");
    }

    #[test]
    fn code_spans_are_untouched() {
        let options = ParseOptions {
            smart: true,
            ..Default::default()
        };
        let result = parse_with_options("`a -- b`", &options).expect("parse");
        let BlockKind::Paragraph { content } = &result.document.blocks[0].kind else {
            panic!("expected paragraph");
        };
        assert_eq!(content[0].kind, InlineKind::CodeSpan("a -- b".to_string()));
    }
}
