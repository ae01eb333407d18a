//! Block-structure parsing: a line-driven state machine that recognizes
//! container and leaf blocks, collects link reference definitions, and
//! hands leaf text to the inline parser.
//!
//! Parsing is two-phase: a prepass over the block structure populates the
//! link-reference table (definitions may appear after their first use),
//! then the full parse resolves references against the completed table.

use crate::ast::{
    Block, BlockKind, CodeBlock, CodeBlockKind, Document, InlineSeq, LinkDefinition, List,
    ListItem, ListStyle,
};
use crate::entities::unescape_and_decode;
use crate::error::ParseError;
use crate::inline::InlineParser;
use crate::label::{is_label_escape, normalize_link_label};
use crate::scanner::{
    self, HtmlBlockKind, Line, blockquote_prefix_info, blockquote_prefix_len, indent_prefix_len,
    is_fence_close, is_space_or_tab, is_thematic_break_line, match_html_block_start,
    parse_atx_heading, parse_fence_open, parse_list_marker, remove_indent_columns,
    remove_list_indent, setext_underline_level, strip_leading_spaces,
};
use crate::smart;
use crate::source_map::SourceMap;
use crate::span::Span;
use std::collections::HashMap;

/// How undecodable input bytes are treated by [`parse_bytes`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Utf8Policy {
    /// Substitute U+FFFD for invalid sequences and keep parsing.
    Replace,
    /// Surface [`ParseError::InvalidUtf8`].
    Strict,
}

#[derive(Clone, Debug)]
pub struct ParseOptions {
    /// Typographic replacement of straight quotes, dashes and ellipses.
    pub smart: bool,
    /// Upper bound on container nesting (block quotes, lists).
    pub max_nesting: usize,
    pub utf8_policy: Utf8Policy,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            smart: false,
            max_nesting: 128,
            utf8_policy: Utf8Policy::Replace,
        }
    }
}

pub struct ParseResult {
    pub document: Document,
    pub source_map: SourceMap,
    pub link_defs: HashMap<String, LinkDefinition>,
}

pub fn parse(source: &str) -> Result<ParseResult, ParseError> {
    parse_with_options(source, &ParseOptions::default())
}

pub fn parse_with_options(
    source: &str,
    options: &ParseOptions,
) -> Result<ParseResult, ParseError> {
    let mut prepass = Parser::new(source, options);
    let _ = prepass.parse_document(false);
    let mut parser = Parser::new(source, options);
    parser.link_defs = prepass.link_defs;
    let mut document = parser.parse_document(true);
    if parser.depth_exceeded || prepass.depth_exceeded {
        return Err(ParseError::NestingTooDeep {
            limit: options.max_nesting,
        });
    }
    if options.smart {
        smart::apply(&mut document);
    }
    Ok(ParseResult {
        document,
        source_map: parser.source_map,
        link_defs: parser.link_defs,
    })
}

pub fn parse_bytes(bytes: &[u8], options: &ParseOptions) -> Result<ParseResult, ParseError> {
    match options.utf8_policy {
        Utf8Policy::Strict => {
            let text = std::str::from_utf8(bytes)?;
            parse_with_options(text, options)
        }
        Utf8Policy::Replace => {
            let text = String::from_utf8_lossy(bytes);
            parse_with_options(&text, options)
        }
    }
}

struct Parser {
    source: String,
    lines: Vec<Line>,
    source_map: SourceMap,
    link_defs: HashMap<String, LinkDefinition>,
    max_nesting: usize,
    depth: usize,
    depth_exceeded: bool,
}

impl Parser {
    fn new(source: &str, options: &ParseOptions) -> Self {
        let source_map = SourceMap::new(source);
        let lines = scanner::split_lines(source);
        Self {
            source: source.to_string(),
            lines,
            source_map,
            link_defs: HashMap::new(),
            max_nesting: options.max_nesting,
            depth: 0,
            depth_exceeded: false,
        }
    }

    fn parse_document(&mut self, parse_inlines: bool) -> Document {
        let span = Span::new(0, self.source.len());
        let lines = self.lines.clone();
        let blocks = self.parse_blocks(&lines, parse_inlines);
        Document { span, blocks }
    }

    fn parse_blocks(&mut self, lines: &[Line], parse_inlines: bool) -> Vec<Block> {
        let mut blocks = Vec::new();
        let mut i = 0;

        while i < lines.len() {
            let line = &lines[i];
            if line.text.trim().is_empty() {
                i += 1;
                continue;
            }

            if let Some((block, next)) = self.parse_code_block(lines, i) {
                blocks.push(block);
                i = next;
                continue;
            }

            if let Some((block, next)) = self.parse_indented_code_block(lines, i) {
                blocks.push(block);
                i = next;
                continue;
            }

            if let Some((block, next)) = self.parse_html_block(lines, i) {
                blocks.push(block);
                i = next;
                continue;
            }

            if let Some((block, next)) = self.parse_thematic_break(lines, i) {
                blocks.push(block);
                i = next;
                continue;
            }

            if let Some((block, next)) = self.parse_block_quote(lines, i, parse_inlines) {
                blocks.push(block);
                i = next;
                continue;
            }

            if let Some((block, next)) = self.parse_list(lines, i, parse_inlines) {
                blocks.push(block);
                i = next;
                continue;
            }

            if let Some((block, next)) = self.parse_heading(lines, i, parse_inlines) {
                blocks.push(block);
                i = next;
                continue;
            }

            let (block, next) = self.parse_paragraph(lines, i, parse_inlines);
            if let Some(block) = block {
                blocks.push(block);
            }
            i = next;
        }

        blocks
    }

    /// Re-enters block parsing for a container's interior, guarding
    /// against stack exhaustion on adversarial nesting.
    fn parse_nested_blocks(&mut self, lines: &[Line], parse_inlines: bool) -> Vec<Block> {
        if self.depth >= self.max_nesting {
            self.depth_exceeded = true;
            return Vec::new();
        }
        self.depth += 1;
        let blocks = self.parse_blocks(lines, parse_inlines);
        self.depth -= 1;
        blocks
    }

    fn parse_heading(
        &mut self,
        lines: &[Line],
        i: usize,
        parse_inlines: bool,
    ) -> Option<(Block, usize)> {
        let line = &lines[i];
        let (level, content_start, content_end) = parse_atx_heading(&line.text)?;
        let rest = &line.text[content_start..content_end];
        let content = if parse_inlines {
            self.parse_inline(rest, line.start + content_start)
        } else {
            Vec::new()
        };
        let span = Span::new(line.start, line.end);
        Some((
            Block {
                span,
                kind: BlockKind::Heading { level, content },
            },
            i + 1,
        ))
    }

    fn parse_thematic_break(&self, lines: &[Line], start: usize) -> Option<(Block, usize)> {
        let line = &lines[start];
        if !is_thematic_break_line(&line.text) {
            return None;
        }
        Some((
            Block {
                span: Span::new(line.start, line.end),
                kind: BlockKind::ThematicBreak,
            },
            start + 1,
        ))
    }

    fn parse_paragraph(
        &mut self,
        lines: &[Line],
        start: usize,
        parse_inlines: bool,
    ) -> (Option<Block>, usize) {
        let mut i = start;
        let mut content_lines: Vec<Line> = Vec::new();
        let mut setext_level = None;
        let mut setext_end = start;

        while i < lines.len() {
            let line = &lines[i];
            if line.text.trim().is_empty() {
                break;
            }
            if let Some(kind) = match_html_block_start(&line.text) {
                if !matches!(kind, HtmlBlockKind::Type7) {
                    break;
                }
            } else if let Some(marker) = parse_list_marker(&line.text) {
                if !content_lines.is_empty()
                    && !marker.empty
                    && (!marker.ordered || marker.start == Some(1))
                {
                    break;
                }
            } else if self.is_block_start(line) {
                break;
            }
            if content_lines.is_empty()
                && let Some((label, definition, next)) =
                    parse_link_reference_definition_lines(lines, i)
            {
                self.link_defs.entry(label).or_insert(definition);
                i = next;
                continue;
            }
            content_lines.push(line.clone());
            if let Some(next) = lines.get(i + 1)
                && !line.lazy_continuation
                && let Some(level) = setext_underline_level(&next.text)
            {
                setext_level = Some(level);
                setext_end = i + 1;
                break;
            }
            i += 1;
        }

        if content_lines.is_empty() {
            return (None, i);
        }

        let (span_start, span_end) = match (content_lines.first(), content_lines.last()) {
            (Some(first), Some(last)) => (first.start, last.end),
            _ => (lines[start].start, lines[start].end),
        };
        if let Some(level) = setext_level {
            let (buffer, offsets) = self.build_heading_buffer(&content_lines);
            let content = if parse_inlines {
                self.parse_inline_buffer(&buffer, &offsets)
            } else {
                Vec::new()
            };
            let span = Span::new(span_start, lines[setext_end].end);
            return (
                Some(Block {
                    span,
                    kind: BlockKind::Heading { level, content },
                }),
                setext_end + 1,
            );
        }

        let (buffer, offsets) = self.build_inline_buffer(&content_lines);
        let content = if parse_inlines {
            self.parse_inline_buffer(&buffer, &offsets)
        } else {
            Vec::new()
        };

        let block = Block {
            span: Span::new(span_start, span_end),
            kind: BlockKind::Paragraph { content },
        };
        (Some(block), i)
    }

    fn parse_code_block(&mut self, lines: &[Line], start: usize) -> Option<(Block, usize)> {
        let line = &lines[start];
        let (indent_len, fence_len, fence_char, info) = parse_fence_open(&line.text)?;
        let info = unescape_and_decode(&info);
        let info = if info.is_empty() { None } else { Some(info) };

        let mut code_lines: Vec<String> = Vec::new();
        let mut i = start + 1;
        while i < lines.len() {
            let candidate = &lines[i];
            if is_fence_close(&candidate.text, fence_len, fence_char) {
                i += 1;
                break;
            }
            let text = strip_leading_spaces(&candidate.text, indent_len);
            code_lines.push(text.to_string());
            i += 1;
        }
        let text = code_lines.join("\n");
        let span = Span::new(line.start, lines[i.saturating_sub(1).max(start)].end);
        Some((
            Block {
                span,
                kind: BlockKind::CodeBlock(CodeBlock {
                    kind: CodeBlockKind::Fenced,
                    info,
                    text,
                }),
            },
            i,
        ))
    }

    fn parse_indented_code_block(&self, lines: &[Line], start: usize) -> Option<(Block, usize)> {
        let line = &lines[start];
        indent_prefix_len(&line.text, 4)?;
        let mut code_lines: Vec<String> = Vec::new();
        let mut pending_blank: Vec<usize> = Vec::new();
        let mut i = start;
        let mut last_line_idx = start;

        while i < lines.len() {
            let current = &lines[i];
            if current.text.trim().is_empty() {
                pending_blank.push(i);
                i += 1;
                continue;
            }
            if indent_prefix_len(&current.text, 4).is_none() {
                break;
            }
            if !pending_blank.is_empty() {
                for _ in pending_blank.drain(..) {
                    code_lines.push(String::new());
                }
            }
            code_lines.push(remove_indent_columns(&current.text, 4));
            last_line_idx = i;
            i += 1;
        }

        // Trailing blanks belong to whatever follows the code block.
        let next = last_line_idx + 1;
        let text = code_lines.join("\n");
        let span = Span::new(line.start, lines[last_line_idx].end);
        Some((
            Block {
                span,
                kind: BlockKind::CodeBlock(CodeBlock {
                    kind: CodeBlockKind::Indented,
                    info: None,
                    text,
                }),
            },
            next,
        ))
    }

    fn parse_html_block(&mut self, lines: &[Line], start: usize) -> Option<(Block, usize)> {
        let line = &lines[start];
        let kind = match_html_block_start(&line.text)?;
        let mut raw_lines = vec![line.text.clone()];
        let mut i = start + 1;

        if !matches!(kind, HtmlBlockKind::Type6 | HtmlBlockKind::Type7)
            && scanner::html_block_end(kind, &line.text)
        {
            let span = Span::new(line.start, line.end);
            return Some((
                Block {
                    span,
                    kind: BlockKind::HtmlBlock {
                        raw: raw_lines.join("\n"),
                    },
                },
                i,
            ));
        }

        match kind {
            HtmlBlockKind::Type6 | HtmlBlockKind::Type7 => {
                while i < lines.len() {
                    let next = &lines[i];
                    if next.text.trim().is_empty() {
                        break;
                    }
                    raw_lines.push(next.text.clone());
                    i += 1;
                }
            }
            _ => {
                while i < lines.len() {
                    let next = &lines[i];
                    raw_lines.push(next.text.clone());
                    if scanner::html_block_end(kind, &next.text) {
                        i += 1;
                        break;
                    }
                    i += 1;
                }
            }
        }

        let end_line_idx = if i == 0 { start } else { i.saturating_sub(1) };
        let span = Span::new(line.start, lines[end_line_idx].end);
        Some((
            Block {
                span,
                kind: BlockKind::HtmlBlock {
                    raw: raw_lines.join("\n"),
                },
            },
            i,
        ))
    }

    fn parse_block_quote(
        &mut self,
        lines: &[Line],
        start: usize,
        parse_inlines: bool,
    ) -> Option<(Block, usize)> {
        let line = &lines[start];
        blockquote_prefix_info(&line.text)?;
        let mut i = start;
        let mut quote_lines = Vec::new();
        let mut can_lazy = false;
        while i < lines.len() {
            let candidate = &lines[i];
            if let Some((prefix_bytes, partially_consumed_tab, remaining_tab_cols, current_col)) =
                blockquote_prefix_info(&candidate.text)
            {
                let mut text = String::new();
                let mut col = current_col;

                // A tab straddling the marker contributes its leftover
                // columns as spaces; the tab byte itself is skipped.
                let content_start = if partially_consumed_tab {
                    for _ in 0..remaining_tab_cols {
                        text.push(' ');
                        col += 1;
                    }
                    prefix_bytes + 1
                } else {
                    prefix_bytes
                };

                let rest = &candidate.text[content_start..];
                for byte in rest.bytes() {
                    match byte {
                        b'\t' => {
                            let next_tab_stop = col + (4 - (col % 4));
                            while col < next_tab_stop {
                                text.push(' ');
                                col += 1;
                            }
                        }
                        b => {
                            text.push(b as char);
                            col += 1;
                        }
                    }
                }

                let stripped = Line {
                    text,
                    start: candidate.start + prefix_bytes,
                    end: candidate.end,
                    has_newline: candidate.has_newline,
                    lazy_continuation: false,
                };
                let list_allows_lazy = parse_list_marker(&stripped.text).is_some_and(|marker| {
                    remove_list_indent(&stripped.text, marker.content_indent)
                        .trim_start()
                        .starts_with('>')
                });
                can_lazy = self.line_can_continue_paragraph(&stripped)
                    || stripped.text.trim_start().starts_with('>')
                    || list_allows_lazy;
                quote_lines.push(stripped);
                i += 1;
                continue;
            }
            if candidate.text.trim().is_empty() {
                break;
            }
            if can_lazy {
                if !self.line_can_continue_paragraph(candidate)
                    && setext_underline_level(&candidate.text).is_none()
                {
                    break;
                }
                if is_thematic_break_line(&candidate.text) {
                    break;
                }
                if let Some(last) = quote_lines.last()
                    && indent_prefix_len(&last.text, 4).is_some()
                {
                    break;
                }
                quote_lines.push(Line {
                    text: candidate.text.clone(),
                    start: candidate.start,
                    end: candidate.end,
                    has_newline: candidate.has_newline,
                    lazy_continuation: true,
                });
                i += 1;
                continue;
            }
            break;
        }
        let blocks = self.parse_nested_blocks(&quote_lines, parse_inlines);
        let span = Span::new(line.start, lines[i.saturating_sub(1).max(start)].end);
        Some((
            Block {
                span,
                kind: BlockKind::BlockQuote { blocks },
            },
            i,
        ))
    }

    fn parse_list(
        &mut self,
        lines: &[Line],
        start: usize,
        parse_inlines: bool,
    ) -> Option<(Block, usize)> {
        let line = &lines[start];
        let marker = parse_list_marker(&line.text)?;
        let mut i = start;
        let mut items = Vec::new();
        let mut item_blanks = Vec::new();
        let mut list_has_blank = false;
        let list_start = marker.start;
        let mut list_end = lines[start].end;

        while i < lines.len() {
            let current = &lines[i];
            let current_marker = match parse_list_marker(&current.text) {
                Some(marker) => marker,
                None => break,
            };
            if current_marker.ordered != marker.ordered || current_marker.marker != marker.marker {
                break;
            }
            let marker_len = current_marker.marker_len;
            let content_indent = current_marker.content_indent;
            let mut item_lines = Vec::new();
            let mut last_line_idx = i;
            let first_text = remove_list_indent(&current.text, content_indent);
            let mut seen_content = !first_text.trim().is_empty();
            let mut initial_blank_lines = if seen_content { 0 } else { 1 };
            item_lines.push(Line {
                text: first_text,
                start: current.start + marker_len,
                end: current.end,
                has_newline: current.has_newline,
                lazy_continuation: false,
            });
            let mut can_lazy = {
                let line = item_lines.last().unwrap_or(current);
                self.line_can_continue_paragraph(line) || line.text.trim_start().starts_with('>')
            };
            let mut j = i + 1;
            let mut pending_blank: Vec<Line> = Vec::new();
            while j < lines.len() {
                let next = &lines[j];
                if next.text.trim().is_empty() {
                    if !seen_content {
                        if initial_blank_lines >= 1 {
                            // A marker-only item followed by blank lines
                            // still continues the list when another item
                            // of the same flavor follows.
                            let mut k = j + 1;
                            while k < lines.len() && lines[k].text.trim().is_empty() {
                                list_has_blank = true;
                                k += 1;
                            }
                            if k < lines.len()
                                && let Some(next_marker) = parse_list_marker(&lines[k].text)
                                && next_marker.ordered == marker.ordered
                                && next_marker.marker == marker.marker
                            {
                                list_has_blank = true;
                                j = k;
                                break;
                            }
                            break;
                        }
                        initial_blank_lines += 1;
                    }
                    pending_blank.push(next.clone());
                    can_lazy = false;
                    j += 1;
                    continue;
                }
                if indent_prefix_len(&next.text, content_indent).is_some() {
                    if !pending_blank.is_empty() {
                        for blank in pending_blank.drain(..) {
                            item_lines.push(Line {
                                text: String::new(),
                                start: blank.start,
                                end: blank.end,
                                has_newline: blank.has_newline,
                                lazy_continuation: false,
                            });
                        }
                    }
                    let content_text = remove_indent_columns(&next.text, content_indent);
                    item_lines.push(Line {
                        text: content_text,
                        start: next.start,
                        end: next.end,
                        has_newline: next.has_newline,
                        lazy_continuation: false,
                    });
                    seen_content = true;
                    can_lazy = {
                        let line = item_lines.last().unwrap_or(next);
                        self.line_can_continue_paragraph(line)
                            || line.text.trim_start().starts_with('>')
                    };
                    last_line_idx = j;
                    j += 1;
                    continue;
                }
                if let Some(next_marker) = parse_list_marker(&next.text) {
                    if next_marker.ordered == marker.ordered
                        && next_marker.marker == marker.marker
                        && !pending_blank.is_empty()
                    {
                        list_has_blank = true;
                    }
                    break;
                }
                if pending_blank.is_empty()
                    && can_lazy
                    && setext_underline_level(&next.text).is_none()
                    && self.line_can_continue_paragraph(next)
                {
                    item_lines.push(next.clone());
                    seen_content = true;
                    can_lazy = true;
                    last_line_idx = j;
                    j += 1;
                    continue;
                }
                break;
            }
            let blocks = self.parse_nested_blocks(&item_lines, parse_inlines);
            let item_has_blank = item_has_blank_between_blocks(&item_lines, &blocks);
            let span = Span::new(current.start, lines[last_line_idx].end);
            items.push(ListItem { span, blocks });
            item_blanks.push(item_has_blank);
            list_end = span.end;
            i = j;
        }

        let mut tight = !list_has_blank;
        if tight {
            for item_blank in &item_blanks {
                if *item_blank {
                    tight = false;
                    break;
                }
            }
        }

        let style = if marker.ordered {
            ListStyle::Ordered {
                start: list_start.unwrap_or(1),
            }
        } else {
            ListStyle::Bullet
        };
        let span = Span::new(lines[start].start, list_end);
        Some((
            Block {
                span,
                kind: BlockKind::List(List::new(style, tight, items)),
            },
            i,
        ))
    }

    fn is_block_start(&self, line: &Line) -> bool {
        parse_fence_open(&line.text).is_some()
            || match_html_block_start(&line.text).is_some()
            || blockquote_prefix_len(&line.text).is_some()
            || is_thematic_break_line(&line.text)
            || parse_list_marker(&line.text).is_some()
            || parse_atx_heading(&line.text).is_some()
    }

    fn line_can_continue_paragraph(&self, line: &Line) -> bool {
        if line.text.trim().is_empty() {
            return false;
        }
        if setext_underline_level(&line.text).is_some() {
            return false;
        }
        if let Some(kind) = match_html_block_start(&line.text) {
            if !matches!(kind, HtmlBlockKind::Type7) {
                return false;
            }
        } else if let Some(marker) = parse_list_marker(&line.text) {
            if !marker.empty && (!marker.ordered || marker.start == Some(1)) {
                return false;
            }
        } else if self.is_block_start(line) {
            return false;
        }
        true
    }

    fn parse_inline(&self, text: &str, start_offset: usize) -> InlineSeq {
        if text.is_empty() {
            return Vec::new();
        }
        let mut offsets = Vec::with_capacity(text.len());
        for idx in 0..text.len() {
            offsets.push(start_offset + idx);
        }
        self.parse_inline_buffer(text, &offsets)
    }

    fn parse_inline_buffer(&self, buffer: &str, offsets: &[usize]) -> InlineSeq {
        let inline = InlineParser::new(self.source.len(), &self.link_defs);
        inline.parse(buffer, offsets)
    }

    /// Flattens paragraph lines into one buffer with explicit newlines,
    /// stripping each line's leading whitespace and mapping every buffer
    /// byte back to a source offset.
    fn build_inline_buffer(&self, lines: &[Line]) -> (String, Vec<usize>) {
        let mut buffer = String::new();
        let mut offsets = Vec::new();
        for (idx, line) in lines.iter().enumerate() {
            let mut text = line.text.as_str();
            let mut start_offset = line.start;
            let removed = text.len() - text.trim_start_matches([' ', '\t']).len();
            if removed > 0 {
                text = &text[removed..];
                start_offset = start_offset.saturating_add(removed);
            }
            if start_offset > line.end {
                start_offset = line.end;
            }
            if idx + 1 == lines.len() {
                text = text.trim_end_matches([' ', '\t']);
            }
            buffer.push_str(text);
            for byte_idx in 0..text.len() {
                let max_len = line.end.saturating_sub(start_offset);
                let offset = if byte_idx < max_len {
                    start_offset + byte_idx
                } else if line.end > 0 {
                    line.end - 1
                } else {
                    0
                };
                offsets.push(offset);
            }
            if line.has_newline && idx + 1 < lines.len() {
                buffer.push('\n');
                offsets.push(line.end);
            }
        }
        (buffer, offsets)
    }

    fn build_heading_buffer(&self, lines: &[Line]) -> (String, Vec<usize>) {
        let (buffer, offsets) = self.build_inline_buffer(lines);
        let bytes = buffer.as_bytes();
        let mut start = 0;
        while start < bytes.len() && is_space_or_tab(bytes[start]) {
            start += 1;
        }
        let mut end = bytes.len();
        while end > start && is_space_or_tab(bytes[end - 1]) {
            end -= 1;
        }
        if start >= end {
            return (String::new(), Vec::new());
        }
        (buffer[start..end].to_string(), offsets[start..end].to_vec())
    }
}

/// A list item is loose when a blank line falls between two of its
/// block-level children; only decidable once the item is fully parsed.
fn item_has_blank_between_blocks(lines: &[Line], blocks: &[Block]) -> bool {
    if blocks.len() < 2 {
        return false;
    }
    for pair in blocks.windows(2) {
        let gap_start = pair[0].span.end;
        let gap_end = pair[1].span.start;
        for line in lines {
            if line.start >= gap_start && line.end <= gap_end && line.text.trim().is_empty() {
                return true;
            }
        }
    }
    false
}

fn parse_link_reference_definition_lines(
    lines: &[Line],
    start: usize,
) -> Option<(String, LinkDefinition, usize)> {
    let line = lines.get(start)?;
    let bytes = line.text.as_bytes();
    let mut i = 0;
    let mut spaces = 0;
    while i < bytes.len() && bytes[i] == b' ' && spaces < 4 {
        i += 1;
        spaces += 1;
    }
    if spaces > 3 {
        return None;
    }
    if i >= bytes.len() || bytes[i] != b'[' {
        return None;
    }

    let (label_bytes, label_end_line, label_end_pos) =
        if let Some((label_end, had_newline)) = find_label_end(bytes, i + 1, bytes.len()) {
            if had_newline {
                return None;
            }
            (bytes[i + 1..label_end].to_vec(), start, label_end)
        } else {
            parse_link_label_multiline(lines, start, i + 1)?
        };
    let label = normalize_link_label(&label_bytes);
    if label.is_empty() {
        return None;
    }
    if has_unescaped_brackets(&label_bytes) {
        return None;
    }
    let end_line = lines.get(label_end_line)?;
    let end_bytes = end_line.text.as_bytes();
    let mut pos = label_end_pos + 1;
    if pos >= end_bytes.len() || end_bytes[pos] != b':' {
        return None;
    }
    pos += 1;

    let mut line_idx = label_end_line;
    while pos < end_bytes.len() && is_space_or_tab(end_bytes[pos]) {
        pos += 1;
    }
    let mut dest_on_new_line = false;
    if pos >= end_bytes.len() {
        line_idx += 1;
        if line_idx >= lines.len() {
            return None;
        }
        pos = skip_spaces_tabs(&lines[line_idx].text, 0);
        dest_on_new_line = true;
    }
    if pos >= lines[line_idx].text.len() {
        return None;
    }

    let dest_bytes = lines[line_idx].text.as_bytes();
    let (url, next_pos) = parse_reference_destination(dest_bytes, pos, dest_bytes.len())?;
    pos = next_pos;

    let mut had_space_after_dest = false;
    while pos < dest_bytes.len() && is_space_or_tab(dest_bytes[pos]) {
        had_space_after_dest = true;
        pos += 1;
    }
    let mut title = None;
    let mut end_line_idx = line_idx;

    if pos < lines[line_idx].text.len() {
        let first = dest_bytes[pos];
        if is_title_delim(first) {
            if !had_space_after_dest {
                return None;
            }
            let (parsed, title_end_line, title_end_pos) =
                parse_link_title_multiline(lines, line_idx, pos)?;
            if trailing_spaces_tabs_only(&lines[title_end_line].text, title_end_pos) {
                title = Some(unescape_and_decode(&parsed));
                end_line_idx = title_end_line;
            } else {
                return None;
            }
        }
    } else {
        let peek_idx = line_idx + 1;
        if peek_idx < lines.len() {
            let peek_pos = skip_spaces_tabs(&lines[peek_idx].text, 0);
            if peek_pos < lines[peek_idx].text.len() {
                let first = lines[peek_idx].text.as_bytes()[peek_pos];
                if is_title_delim(first) {
                    if !dest_on_new_line && peek_pos == 0 {
                        // Destination-only definition; the unindented
                        // next line starts something else.
                        return Some((
                            label,
                            LinkDefinition { url, title: None },
                            end_line_idx + 1,
                        ));
                    }
                    let (parsed, title_end_line, title_end_pos) =
                        parse_link_title_multiline(lines, peek_idx, peek_pos)?;
                    if trailing_spaces_tabs_only(&lines[title_end_line].text, title_end_pos) {
                        title = Some(unescape_and_decode(&parsed));
                        end_line_idx = title_end_line;
                    } else {
                        return None;
                    }
                }
            }
        }
    }

    Some((label, LinkDefinition { url, title }, end_line_idx + 1))
}

fn find_label_end(bytes: &[u8], start: usize, end: usize) -> Option<(usize, bool)> {
    let mut i = start;
    let mut depth = 0usize;
    let mut escaped = false;
    let mut had_newline = false;
    while i < end {
        let b = bytes[i];
        if b == b'\n' {
            had_newline = true;
        }
        if escaped {
            escaped = false;
            i += 1;
            continue;
        }
        if b == b'\\' {
            escaped = true;
            i += 1;
            continue;
        }
        if b == b'[' {
            depth += 1;
        } else if b == b']' {
            if depth == 0 {
                return Some((i, had_newline));
            }
            depth -= 1;
        }
        i += 1;
    }
    None
}

fn parse_link_label_multiline(
    lines: &[Line],
    mut line_idx: usize,
    mut pos: usize,
) -> Option<(Vec<u8>, usize, usize)> {
    let mut out = Vec::new();
    let mut depth = 0usize;
    let mut escaped = false;

    loop {
        let line = lines.get(line_idx)?;
        let bytes = line.text.as_bytes();
        while pos < bytes.len() {
            let b = bytes[pos];
            if escaped {
                out.push(b);
                escaped = false;
                pos += 1;
                continue;
            }
            if b == b'\\' {
                if pos + 1 < bytes.len() && bytes[pos + 1].is_ascii_punctuation() {
                    escaped = true;
                    out.push(b'\\');
                    pos += 1;
                    continue;
                }
                out.push(b'\\');
                pos += 1;
                continue;
            }
            if b == b'[' {
                depth += 1;
                out.push(b);
                pos += 1;
                continue;
            }
            if b == b']' {
                if depth == 0 {
                    return Some((out, line_idx, pos));
                }
                depth = depth.saturating_sub(1);
                out.push(b);
                pos += 1;
                continue;
            }
            out.push(b);
            pos += 1;
        }

        line_idx += 1;
        if line_idx >= lines.len() {
            return None;
        }
        if lines[line_idx].text.trim().is_empty() {
            return None;
        }
        out.push(b'\n');
        pos = 0;
    }
}

fn parse_reference_destination(bytes: &[u8], start: usize, end: usize) -> Option<(String, usize)> {
    let mut i = start;
    let mut url_bytes = Vec::new();
    let mut angle = false;
    if i < end && bytes[i] == b'<' {
        angle = true;
        i += 1;
        let mut closed = false;
        while i < end {
            let b = bytes[i];
            if b == b'\n' {
                return None;
            }
            if b == b'\\' {
                if i + 1 < end && bytes[i + 1].is_ascii_punctuation() {
                    url_bytes.push(b'\\');
                    url_bytes.push(bytes[i + 1]);
                    i += 2;
                    continue;
                }
                url_bytes.push(b'\\');
                i += 1;
                continue;
            }
            if b == b'>' {
                closed = true;
                i += 1;
                break;
            }
            url_bytes.push(b);
            i += 1;
        }
        if !closed {
            return None;
        }
    } else {
        while i < end {
            let b = bytes[i];
            if b.is_ascii_whitespace() {
                break;
            }
            if b == b'\\' {
                if i + 1 < end && bytes[i + 1].is_ascii_punctuation() {
                    url_bytes.push(b'\\');
                    url_bytes.push(bytes[i + 1]);
                    i += 2;
                    continue;
                }
                url_bytes.push(b'\\');
                i += 1;
                continue;
            }
            url_bytes.push(b);
            i += 1;
        }
    }
    if url_bytes.is_empty() && !angle {
        return None;
    }
    let url = match String::from_utf8(url_bytes) {
        Ok(value) => value,
        Err(err) => String::from_utf8_lossy(&err.into_bytes()).to_string(),
    };
    let url = unescape_and_decode(&url);
    let url = crate::entities::percent_encode_url(&url);
    Some((url, i))
}

fn parse_link_title_multiline(
    lines: &[Line],
    mut line_idx: usize,
    mut pos: usize,
) -> Option<(String, usize, usize)> {
    let line = lines.get(line_idx)?;
    let bytes = line.text.as_bytes();
    if pos >= bytes.len() {
        return None;
    }
    let open = bytes[pos];
    let close = match open {
        b'"' => b'"',
        b'\'' => b'\'',
        b'(' => b')',
        _ => return None,
    };
    pos += 1;
    let mut out = Vec::new();
    let mut escaped = false;

    loop {
        let line_text = &lines[line_idx].text;
        let bytes = line_text.as_bytes();
        while pos < bytes.len() {
            let b = bytes[pos];
            if escaped {
                out.push(b);
                escaped = false;
                pos += 1;
                continue;
            }
            if b == b'\\' {
                if pos + 1 < bytes.len() && bytes[pos + 1].is_ascii_punctuation() {
                    escaped = true;
                    out.push(b'\\');
                    pos += 1;
                    continue;
                }
                out.push(b'\\');
                pos += 1;
                continue;
            }
            if b == close {
                let title = match String::from_utf8(out) {
                    Ok(value) => value,
                    Err(err) => String::from_utf8_lossy(&err.into_bytes()).to_string(),
                };
                return Some((title, line_idx, pos + 1));
            }
            out.push(b);
            pos += 1;
        }
        line_idx += 1;
        if line_idx >= lines.len() {
            return None;
        }
        if lines[line_idx].text.trim().is_empty() {
            return None;
        }
        out.push(b'\n');
        pos = 0;
    }
}

fn skip_spaces_tabs(text: &str, mut pos: usize) -> usize {
    let bytes = text.as_bytes();
    while pos < bytes.len() && is_space_or_tab(bytes[pos]) {
        pos += 1;
    }
    pos
}

fn trailing_spaces_tabs_only(text: &str, pos: usize) -> bool {
    text.as_bytes()[pos..].iter().all(|b| is_space_or_tab(*b))
}

fn is_title_delim(byte: u8) -> bool {
    byte == b'"' || byte == b'\'' || byte == b'('
}

fn has_unescaped_brackets(bytes: &[u8]) -> bool {
    let mut escaped = false;
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        if escaped {
            escaped = false;
            i += 1;
            continue;
        }
        if b == b'\\' && i + 1 < bytes.len() && is_label_escape(bytes[i + 1]) {
            escaped = true;
            i += 1;
            continue;
        }
        if b == b'[' || b == b']' {
            return true;
        }
        i += 1;
    }
    false
}
