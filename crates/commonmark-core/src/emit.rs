//! HTML rendering. Output follows the conventional CommonMark HTML
//! shape: block tags each start on a fresh line, inline content flows.
//!
//! Rendering is safe by default: raw HTML is replaced with a comment
//! placeholder and dangerous link schemes are emptied out unless the
//! caller opts in with [`HtmlOptions::unsafe_html`].

use crate::ast::{Block, BlockKind, CodeBlock, Document, Inline, InlineKind, List, ListStyle};
use crate::source_map::SourceMap;
use crate::span::Span;
use ammonia::Builder;
use std::collections::{HashMap, HashSet};

const RAW_HTML_PLACEHOLDER: &str = "<!-- raw HTML omitted -->";

#[derive(Clone, Debug, Default)]
pub struct HtmlOptions {
    /// Emit 1-based `data-sourcepos` attributes on block tags. Requires
    /// the source map from the parse that produced the tree.
    pub source_position: bool,
    /// Render soft breaks as `<br />`.
    pub hard_breaks: bool,
    /// Render soft breaks as a single space.
    pub no_breaks: bool,
    /// Pass raw HTML and unsafe link schemes through untouched.
    pub unsafe_html: bool,
}

pub fn emit_html(document: &Document) -> String {
    emit_html_with_options(document, &HtmlOptions::default(), None)
}

pub fn emit_html_with_options(
    document: &Document,
    options: &HtmlOptions,
    source_map: Option<&SourceMap>,
) -> String {
    let mut writer = HtmlWriter::new();
    let map = if options.source_position {
        source_map
    } else {
        None
    };
    emit_blocks(&mut writer, &document.blocks, false, options, map);
    writer.finish()
}

/// Renders safely and then runs the fragment through an allow-list
/// sanitizer covering exactly the tags and attributes this renderer
/// produces.
pub fn emit_html_sanitized(document: &Document) -> String {
    let raw_html = emit_html(document);

    let tags: HashSet<&'static str> = [
        "a", "blockquote", "br", "code", "em", "h1", "h2", "h3", "h4", "h5", "h6", "hr", "img",
        "li", "ol", "p", "pre", "strong", "ul",
    ]
    .iter()
    .copied()
    .collect();

    let mut tag_attributes = HashMap::new();
    tag_attributes.insert("a", ["href", "title"].iter().copied().collect());
    tag_attributes.insert("img", ["alt", "src", "title"].iter().copied().collect());
    tag_attributes.insert("ol", ["start"].iter().copied().collect());

    let mut generic_attribute_prefixes = HashSet::new();
    generic_attribute_prefixes.insert("data-");

    Builder::new()
        .tags(tags)
        .tag_attributes(tag_attributes)
        .generic_attribute_prefixes(generic_attribute_prefixes)
        .link_rel(None)
        .clean(&raw_html)
        .to_string()
}

struct HtmlWriter {
    out: String,
}

impl HtmlWriter {
    fn new() -> Self {
        Self { out: String::new() }
    }

    /// Block tags start on a fresh line.
    fn cr(&mut self) {
        if !self.out.is_empty() && !self.out.ends_with('\n') {
            self.out.push('\n');
        }
    }

    fn push(&mut self, text: &str) {
        self.out.push_str(text);
    }

    fn finish(self) -> String {
        self.out
    }
}

fn emit_blocks(
    writer: &mut HtmlWriter,
    blocks: &[Block],
    tight: bool,
    options: &HtmlOptions,
    map: Option<&SourceMap>,
) {
    for block in blocks {
        emit_block(writer, block, tight, options, map);
    }
}

fn emit_block(
    writer: &mut HtmlWriter,
    block: &Block,
    tight: bool,
    options: &HtmlOptions,
    map: Option<&SourceMap>,
) {
    let pos = sourcepos_attr(block.span, map);
    match &block.kind {
        BlockKind::Paragraph { content } => {
            if tight {
                writer.push(&render_inlines(content, options));
            } else {
                writer.cr();
                writer.push(&format!("<p{}>", pos));
                writer.push(&render_inlines(content, options));
                writer.push("</p>\n");
            }
        }
        BlockKind::Heading { level, content } => {
            writer.cr();
            writer.push(&format!("<h{}{}>", level, pos));
            writer.push(&render_inlines(content, options));
            writer.push(&format!("</h{}>\n", level));
        }
        BlockKind::BlockQuote { blocks } => {
            writer.cr();
            writer.push(&format!("<blockquote{}>\n", pos));
            emit_blocks(writer, blocks, false, options, map);
            writer.cr();
            writer.push("</blockquote>\n");
        }
        BlockKind::List(List {
            style,
            tight: list_tight,
            items,
        }) => {
            writer.cr();
            let tag = match style {
                ListStyle::Bullet => "ul",
                ListStyle::Ordered { .. } => "ol",
            };
            let start_attr = match style {
                ListStyle::Ordered { start } if *start != 1 => format!(" start=\"{}\"", start),
                _ => String::new(),
            };
            writer.push(&format!("<{}{}{}>\n", tag, pos, start_attr));
            for item in items {
                let item_pos = sourcepos_attr(item.span, map);
                writer.cr();
                writer.push(&format!("<li{}>", item_pos));
                emit_blocks(writer, &item.blocks, *list_tight, options, map);
                writer.push("</li>\n");
            }
            writer.cr();
            writer.push(&format!("</{}>\n", tag));
        }
        BlockKind::CodeBlock(CodeBlock { info, text, .. }) => {
            writer.cr();
            let class = info
                .as_deref()
                .and_then(|info| info.split_ascii_whitespace().next())
                .map(|lang| format!(" class=\"language-{}\"", escape_attr(lang)))
                .unwrap_or_default();
            writer.push(&format!("<pre{}><code{}>", pos, class));
            if !text.is_empty() {
                writer.push(&escape_html(text));
                writer.push("\n");
            }
            writer.push("</code></pre>\n");
        }
        BlockKind::HtmlBlock { raw } => {
            writer.cr();
            if options.unsafe_html {
                writer.push(raw);
            } else {
                writer.push(RAW_HTML_PLACEHOLDER);
            }
            writer.push("\n");
        }
        BlockKind::ThematicBreak => {
            writer.cr();
            writer.push(&format!("<hr{} />\n", pos));
        }
    }
}

fn render_inlines(inlines: &[Inline], options: &HtmlOptions) -> String {
    let mut out = String::new();
    for inline in inlines {
        match &inline.kind {
            InlineKind::Text(text) => out.push_str(&escape_html(text)),
            InlineKind::SoftBreak => {
                if options.hard_breaks {
                    out.push_str("<br />\n");
                } else if options.no_breaks {
                    out.push(' ');
                } else {
                    out.push('\n');
                }
            }
            InlineKind::HardBreak => out.push_str("<br />\n"),
            InlineKind::CodeSpan(text) => {
                out.push_str("<code>");
                out.push_str(&escape_html(text));
                out.push_str("</code>");
            }
            InlineKind::Html(raw) => {
                if options.unsafe_html {
                    out.push_str(raw);
                } else {
                    out.push_str(RAW_HTML_PLACEHOLDER);
                }
            }
            InlineKind::Emph(children) => {
                out.push_str("<em>");
                out.push_str(&render_inlines(children, options));
                out.push_str("</em>");
            }
            InlineKind::Strong(children) => {
                out.push_str("<strong>");
                out.push_str(&render_inlines(children, options));
                out.push_str("</strong>");
            }
            InlineKind::Link {
                url,
                title,
                children,
            } => {
                let href = filtered_url(url, options);
                out.push_str("<a href=\"");
                out.push_str(&escape_url_attr(href));
                out.push('"');
                if let Some(title) = title {
                    out.push_str(" title=\"");
                    out.push_str(&escape_attr(title));
                    out.push('"');
                }
                out.push('>');
                out.push_str(&render_inlines(children, options));
                out.push_str("</a>");
            }
            InlineKind::Image { url, title, alt } => {
                let src = filtered_url(url, options);
                out.push_str("<img src=\"");
                out.push_str(&escape_url_attr(src));
                out.push_str("\" alt=\"");
                out.push_str(&escape_attr(&plain_text(alt)));
                out.push('"');
                if let Some(title) = title {
                    out.push_str(" title=\"");
                    out.push_str(&escape_attr(title));
                    out.push('"');
                }
                out.push_str(" />");
            }
        }
    }
    out
}

/// Image alt text renders as plain text: formatting is dropped, only
/// character content survives.
fn plain_text(inlines: &[Inline]) -> String {
    let mut out = String::new();
    for inline in inlines {
        match &inline.kind {
            InlineKind::Text(text) | InlineKind::CodeSpan(text) => out.push_str(text),
            InlineKind::SoftBreak | InlineKind::HardBreak => out.push(' '),
            InlineKind::Emph(children) | InlineKind::Strong(children) => {
                out.push_str(&plain_text(children));
            }
            InlineKind::Link { children, .. } => out.push_str(&plain_text(children)),
            InlineKind::Image { alt, .. } => out.push_str(&plain_text(alt)),
            InlineKind::Html(_) => {}
        }
    }
    out
}

fn filtered_url<'t>(url: &'t str, options: &HtmlOptions) -> &'t str {
    if options.unsafe_html || !is_unsafe_url(url) {
        url
    } else {
        ""
    }
}

/// Scheme filter applied in safe mode: script-running and local-file
/// schemes are suppressed; data URLs pass only for common image types.
fn is_unsafe_url(url: &str) -> bool {
    let lower = url.trim_start().to_ascii_lowercase();
    if lower.starts_with("javascript:")
        || lower.starts_with("vbscript:")
        || lower.starts_with("file:")
    {
        return true;
    }
    if lower.starts_with("data:") {
        let allowed = ["data:image/png", "data:image/gif", "data:image/jpeg", "data:image/webp"];
        return !allowed.iter().any(|prefix| lower.starts_with(prefix));
    }
    false
}

fn sourcepos_attr(span: Span, map: Option<&SourceMap>) -> String {
    let map = match map {
        Some(map) => map,
        None => return String::new(),
    };
    if span.is_empty() {
        return String::new();
    }
    let range = map.range(span);
    format!(
        " data-sourcepos=\"{}:{}-{}:{}\"",
        range.start.line + 1,
        range.start.character + 1,
        range.end.line + 1,
        range.end.character,
    )
}

fn escape_html(text: &str) -> String {
    let mut out = String::new();
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
    out
}

fn escape_attr(text: &str) -> String {
    let mut out = String::new();
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
    out
}

fn escape_url_attr(text: &str) -> String {
    let mut encoded = String::new();
    for &byte in text.as_bytes() {
        match byte {
            b' ' => encoded.push_str("%20"),
            b'\\' => encoded.push_str("%5C"),
            0x00..=0x1F | 0x7F..=0xFF => {
                encoded.push_str(&format!("%{:02X}", byte));
            }
            _ => encoded.push(byte as char),
        }
    }
    escape_attr(&encoded)
}

#[cfg(test)]
mod tests {
    use super::{emit_html, is_unsafe_url};
    use crate::parser::parse;

    fn html(source: &str) -> String {
        emit_html(&parse(source).expect("parse").document)
    }

    #[test]
    fn paragraph_and_heading() {
        assert_eq!(html("# Title\n\nBody text."), "<h1>Title</h1>\n<p>Body text.</p>\n");
    }

    #[test]
    fn text_is_always_escaped() {
        assert_eq!(html("a < b & c > d"), "<p>a &lt; b &amp; c &gt; d</p>\n");
    }

    #[test]
    fn tight_and_loose_lists() {
        assert_eq!(
            html("- one\n- two"),
            "<ul>\n<li>one</li>\n<li>two</li>\n</ul>\n"
        );
        assert_eq!(
            html("- one\n\n- two"),
            "<ul>\n<li>\n<p>one</p>\n</li>\n<li>\n<p>two</p>\n</li>\n</ul>\n"
        );
    }

    #[test]
    fn ordered_list_start_attribute() {
        assert_eq!(
            html("3. three\n4. four"),
            "<ol start=\"3\">\n<li>three</li>\n<li>four</li>\n</ol>\n"
        );
    }

    #[test]
    fn raw_html_is_suppressed_by_default() {
        assert_eq!(html("<div>\nhi\n</div>"), "<!-- raw HTML omitted -->\n");
        assert_eq!(
            html("before <b>bold</b> after"),
            "<p>before <!-- raw HTML omitted -->bold<!-- raw HTML omitted --> after</p>\n"
        );
    }

    #[test]
    fn unsafe_schemes_are_emptied() {
        assert!(is_unsafe_url("javascript:alert(1)"));
        assert!(is_unsafe_url("JAVASCRIPT:alert(1)"));
        assert!(is_unsafe_url("data:text/html,x"));
        assert!(!is_unsafe_url("data:image/png;base64,AAAA"));
        assert!(!is_unsafe_url("https://example.com"));
        assert_eq!(
            html("[x](javascript:alert(1))"),
            "<p><a href=\"\">x</a></p>\n"
        );
    }

    #[test]
    fn code_block_language_class() {
        assert_eq!(
            html("```rust ignore\nlet x = 1;\n```"),
            "<pre><code class=\"language-rust\">let x = 1;\n</code></pre>\n"
        );
    }
}
