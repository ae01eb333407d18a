//! CommonMark text rendering: serializes a tree back to markdown that
//! reparses to an equivalent tree. Round-tripping is semantic, not
//! byte-exact; the renderer picks canonical markers and escapes only
//! what could be re-read as structure.

use crate::ast::{Block, BlockKind, CodeBlock, CodeBlockKind, Document, Inline, InlineKind, List, ListStyle};

pub fn emit_commonmark(document: &Document) -> String {
    let rendered = render_blocks_seq(&document.blocks, false);
    if rendered.is_empty() {
        String::new()
    } else {
        rendered + "\n"
    }
}

/// Blocks joined by a blank line, or a single newline inside tight list
/// items. Adjacent sibling lists alternate markers so they do not merge
/// on reparse.
fn render_blocks_seq(blocks: &[Block], tight: bool) -> String {
    let mut parts: Vec<String> = Vec::new();
    let mut prev_was_list = false;
    let mut alternate = false;
    for block in blocks {
        let is_list = matches!(block.kind, BlockKind::List(_));
        if is_list && prev_was_list {
            alternate = !alternate;
        } else if !is_list {
            alternate = false;
        }
        parts.push(render_block(block, alternate));
        prev_was_list = is_list;
    }
    let separator = if tight { "\n" } else { "\n\n" };
    parts.join(separator)
}

fn render_block(block: &Block, alternate: bool) -> String {
    match &block.kind {
        BlockKind::Paragraph { content } => {
            let mut out = String::new();
            render_inline_seq(&mut out, content, 0);
            out
        }
        BlockKind::Heading { level, content } => {
            let mut text = String::new();
            render_inline_seq(&mut text, content, 0);
            let text = text.replace('\n', " ");
            let hashes = "#".repeat(usize::from(*level));
            if text.is_empty() {
                hashes
            } else {
                format!("{} {}", hashes, text)
            }
        }
        BlockKind::BlockQuote { blocks } => {
            let inner = render_blocks_seq(blocks, false);
            prefix_lines(&inner, "> ", "> ", ">")
        }
        BlockKind::List(list) => render_list(list, alternate),
        BlockKind::CodeBlock(code) => render_code_block(code),
        BlockKind::HtmlBlock { raw } => raw.clone(),
        BlockKind::ThematicBreak => "---".to_string(),
    }
}

fn render_list(list: &List, alternate: bool) -> String {
    let List {
        style,
        tight,
        items,
    } = list;
    let mut rendered = Vec::new();
    for (idx, item) in items.iter().enumerate() {
        let marker = match style {
            ListStyle::Bullet => {
                if alternate {
                    "* ".to_string()
                } else {
                    "- ".to_string()
                }
            }
            ListStyle::Ordered { start } => {
                let delim = if alternate { ')' } else { '.' };
                format!("{}{} ", start.saturating_add(idx as u64), delim)
            }
        };
        let indent = " ".repeat(marker.len());
        let content = render_blocks_seq(&item.blocks, *tight);
        if content.is_empty() {
            rendered.push(marker.trim_end().to_string());
        } else {
            rendered.push(prefix_lines(&content, &marker, &indent, ""));
        }
    }
    rendered.join(if *tight { "\n" } else { "\n\n" })
}

fn render_code_block(code: &CodeBlock) -> String {
    if code.kind == CodeBlockKind::Indented && code.info.is_none() && !code.text.is_empty() {
        return prefix_lines(&code.text, "    ", "    ", "");
    }
    let longest_run = longest_backtick_run(&code.text);
    let info = code.info.as_deref().unwrap_or("");
    let fence = if info.contains('`') {
        "~".repeat((longest_tilde_run(&code.text) + 1).max(3))
    } else {
        "`".repeat((longest_run + 1).max(3))
    };
    let mut out = String::new();
    out.push_str(&fence);
    out.push_str(info);
    out.push('\n');
    if !code.text.is_empty() {
        out.push_str(&code.text);
        out.push('\n');
    }
    out.push_str(&fence);
    out
}

fn longest_backtick_run(text: &str) -> usize {
    longest_run(text, '`')
}

fn longest_tilde_run(text: &str) -> usize {
    longest_run(text, '~')
}

fn longest_run(text: &str, needle: char) -> usize {
    let mut longest = 0;
    let mut current = 0;
    for ch in text.chars() {
        if ch == needle {
            current += 1;
            longest = longest.max(current);
        } else {
            current = 0;
        }
    }
    longest
}

/// Prefixes the first line with `first`, subsequent non-empty lines with
/// `rest`, and empty lines with `empty`.
fn prefix_lines(text: &str, first: &str, rest: &str, empty: &str) -> String {
    let mut out = String::new();
    for (idx, line) in text.split('\n').enumerate() {
        if idx > 0 {
            out.push('\n');
        }
        if idx == 0 {
            out.push_str(first);
            out.push_str(line);
        } else if line.is_empty() {
            out.push_str(empty);
        } else {
            out.push_str(rest);
            out.push_str(line);
        }
    }
    out
}

fn render_inline_seq(out: &mut String, inlines: &[Inline], depth: usize) {
    for inline in inlines {
        match &inline.kind {
            InlineKind::Text(text) => escape_markdown_into(out, text),
            InlineKind::SoftBreak => out.push('\n'),
            InlineKind::HardBreak => out.push_str("\\\n"),
            InlineKind::CodeSpan(text) => render_code_span(out, text),
            InlineKind::Html(raw) => out.push_str(raw),
            InlineKind::Emph(children) => {
                let marker = if depth % 2 == 0 { '*' } else { '_' };
                out.push(marker);
                render_inline_seq(out, children, depth + 1);
                out.push(marker);
            }
            InlineKind::Strong(children) => {
                let marker = if depth % 2 == 0 { "**" } else { "__" };
                out.push_str(marker);
                render_inline_seq(out, children, depth + 1);
                out.push_str(marker);
            }
            InlineKind::Link {
                url,
                title,
                children,
            } => {
                if let Some(autolink) = as_autolink(url, title.as_deref(), children) {
                    out.push('<');
                    out.push_str(&autolink);
                    out.push('>');
                    continue;
                }
                out.push('[');
                render_inline_seq(out, children, depth);
                out.push(']');
                render_destination(out, url, title.as_deref());
            }
            InlineKind::Image { url, title, alt } => {
                out.push_str("![");
                render_inline_seq(out, alt, depth);
                out.push(']');
                render_destination(out, url, title.as_deref());
            }
        }
    }
}

/// A link whose visible text is exactly its destination (or its mailto
/// address) renders back as an autolink.
fn as_autolink(url: &str, title: Option<&str>, children: &[Inline]) -> Option<String> {
    if title.is_some() || children.len() != 1 {
        return None;
    }
    let InlineKind::Text(text) = &children[0].kind else {
        return None;
    };
    if text.contains(char::is_whitespace) || text.contains('<') || text.contains('>') {
        return None;
    }
    if url == text && starts_with_scheme(text) {
        return Some(text.clone());
    }
    if let Some(stripped) = url.strip_prefix("mailto:")
        && stripped == text
    {
        return Some(text.clone());
    }
    None
}

fn starts_with_scheme(text: &str) -> bool {
    let bytes = text.as_bytes();
    if bytes.is_empty() || !bytes[0].is_ascii_alphabetic() {
        return false;
    }
    for (idx, &b) in bytes.iter().enumerate() {
        if b == b':' {
            return idx >= 2 && idx + 1 < bytes.len();
        }
        if !(b.is_ascii_alphanumeric() || matches!(b, b'+' | b'-' | b'.')) {
            return false;
        }
    }
    false
}

fn render_destination(out: &mut String, url: &str, title: Option<&str>) {
    out.push('(');
    let needs_angles = url.is_empty()
        || url.contains(char::is_whitespace)
        || url.contains('(')
        || url.contains(')');
    if needs_angles {
        out.push('<');
        for ch in url.chars() {
            if ch == '<' || ch == '>' {
                out.push('\\');
            }
            out.push(ch);
        }
        out.push('>');
    } else {
        out.push_str(url);
    }
    if let Some(title) = title {
        out.push_str(" \"");
        for ch in title.chars() {
            if ch == '"' || ch == '\\' {
                out.push('\\');
            }
            out.push(ch);
        }
        out.push('"');
    }
    out.push(')');
}

fn render_code_span(out: &mut String, text: &str) {
    let run = longest_backtick_run(text);
    let delim = "`".repeat(run + 1);
    let needs_pad = text.starts_with('`')
        || text.ends_with('`')
        || (text.starts_with(' ') && text.ends_with(' ') && !text.trim().is_empty())
        || text.is_empty();
    out.push_str(&delim);
    if needs_pad {
        out.push(' ');
    }
    out.push_str(text);
    if needs_pad {
        out.push(' ');
    }
    out.push_str(&delim);
}

/// Backslash-escapes characters that would otherwise be read back as
/// markup: span-level specials everywhere, block-opener characters at
/// the start of a line, and the delimiter of an ordered-list-looking
/// digit run.
fn escape_markdown_into(out: &mut String, text: &str) {
    for ch in text.chars() {
        let at_line_start = out.is_empty() || out.ends_with('\n');
        let always = matches!(ch, '\\' | '`' | '*' | '_' | '[' | ']' | '<' | '>' | '&');
        let line_start = at_line_start && matches!(ch, '#' | '-' | '+' | '=');
        let ordered_delim = matches!(ch, '.' | ')') && line_start_digit_run(out);
        if always || line_start || ordered_delim {
            out.push('\\');
        }
        out.push(ch);
    }
}

fn line_start_digit_run(out: &str) -> bool {
    let mut saw_digit = false;
    for ch in out.chars().rev() {
        if ch == '\n' {
            break;
        }
        if ch.is_ascii_digit() {
            saw_digit = true;
            continue;
        }
        return false;
    }
    saw_digit
}

#[cfg(test)]
mod tests {
    use super::emit_commonmark;
    use crate::parser::parse;

    fn roundtrip(source: &str) -> String {
        emit_commonmark(&parse(source).expect("parse").document)
    }

    #[test]
    fn canonical_blocks() {
        assert_eq!(roundtrip("# Title"), "# Title\n");
        assert_eq!(roundtrip("Setext\n======"), "# Setext\n");
        assert_eq!(roundtrip("***"), "---\n");
        assert_eq!(roundtrip(""), "");
    }

    #[test]
    fn quotes_and_lists_prefix() {
        assert_eq!(roundtrip("> a\n>\n> b"), "> a\n>\n> b\n");
        assert_eq!(roundtrip("- one\n- two"), "- one\n- two\n");
        assert_eq!(roundtrip("2. a\n3. b"), "2. a\n3. b\n");
    }

    #[test]
    fn structural_characters_are_escaped() {
        assert_eq!(roundtrip("\\*not emphasis\\*"), "\\*not emphasis\\*\n");
        assert_eq!(roundtrip("1\\. not a list"), "1\\. not a list\n");
    }

    #[test]
    fn fences_grow_past_embedded_runs() {
        assert_eq!(
            roundtrip("````\ncode with ``` inside\n````"),
            "````\ncode with ``` inside\n````\n"
        );
    }

    #[test]
    fn autolinks_render_compactly() {
        assert_eq!(
            roundtrip("<https://example.com>"),
            "<https://example.com>\n"
        );
        assert_eq!(roundtrip("<person@example.com>"), "<person@example.com>\n");
    }
}
