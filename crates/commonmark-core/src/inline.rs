//! Inline parsing: a single left-to-right scan over a leaf block's text
//! with local delimiter and bracket stacks. Emphasis resolution runs
//! after the scan; both stacks are discarded once the sequence is built.

use crate::ast::{Inline, InlineKind, InlineSeq, LinkDefinition};
use crate::entities::{
    decode_entity, percent_encode_autolink_url, percent_encode_url, unescape_and_decode,
};
use crate::label::normalize_link_label;
use crate::scanner::{is_html_attr_name_continue, is_html_attr_name_start};
use crate::span::Span;
use std::collections::HashMap;

pub(crate) struct InlineParser<'a> {
    source_len: usize,
    link_defs: &'a HashMap<String, LinkDefinition>,
}

#[derive(Clone, Debug)]
struct Delimiter {
    ch: u8,
    len: usize,
    node_index: usize,
    can_open: bool,
    can_close: bool,
    orig_can_open: bool,
    orig_can_close: bool,
}

#[derive(Clone, Debug)]
struct BracketEntry {
    node_index: usize,
    start: usize,
    image: bool,
    active: bool,
}

impl<'a> InlineParser<'a> {
    pub fn new(source_len: usize, link_defs: &'a HashMap<String, LinkDefinition>) -> Self {
        Self {
            source_len,
            link_defs,
        }
    }

    pub fn parse(&self, buffer: &str, offsets: &[usize]) -> InlineSeq {
        self.parse_range(buffer, offsets, 0, buffer.len())
    }

    fn parse_range(&self, buffer: &str, offsets: &[usize], start: usize, end: usize) -> InlineSeq {
        let bytes = buffer.as_bytes();
        let mut out: InlineSeq = Vec::new();
        let mut delims: Vec<Delimiter> = Vec::new();
        let mut brackets: Vec<BracketEntry> = Vec::new();
        let mut text_buf: Vec<u8> = Vec::new();
        let mut text_start = start;
        let mut i = start;

        while i < end {
            let b = bytes[i];
            match b {
                b'\\' => {
                    if i + 1 < end {
                        let next = bytes[i + 1];
                        if next == b'\n' {
                            self.flush_text_buf(
                                &mut out,
                                offsets,
                                &mut text_buf,
                                &mut text_start,
                                i,
                            );
                            let span = self.span_from_offsets(offsets, i, i + 2);
                            out.push(Inline {
                                span,
                                kind: InlineKind::HardBreak,
                            });
                            i += 2;
                            text_start = i;
                            continue;
                        }
                        if next.is_ascii_punctuation() {
                            if text_buf.is_empty() {
                                text_start = i;
                            }
                            text_buf.push(next);
                            i += 2;
                            continue;
                        }
                    }
                    if text_buf.is_empty() {
                        text_start = i;
                    }
                    text_buf.push(b'\\');
                    i += 1;
                    continue;
                }
                b'`' => {
                    if let Some((inline, next)) = self.parse_code_span(buffer, offsets, i, end) {
                        self.flush_text_buf(&mut out, offsets, &mut text_buf, &mut text_start, i);
                        out.push(inline);
                        i = next;
                        text_start = i;
                        continue;
                    }
                    let run_len = count_run(bytes, i, end, b'`');
                    if text_buf.is_empty() {
                        text_start = i;
                    }
                    text_buf.extend(std::iter::repeat_n(b'`', run_len));
                    i += run_len;
                    continue;
                }
                b'<' => {
                    if let Some((inline, next)) = self.parse_autolink(buffer, offsets, i, end) {
                        self.flush_text_buf(&mut out, offsets, &mut text_buf, &mut text_start, i);
                        out.push(inline);
                        i = next;
                        text_start = i;
                        continue;
                    }
                    if let Some((inline, next)) = self.parse_html_span(buffer, offsets, i, end) {
                        self.flush_text_buf(&mut out, offsets, &mut text_buf, &mut text_start, i);
                        out.push(inline);
                        i = next;
                        text_start = i;
                        continue;
                    }
                }
                b'&' => {
                    if let Some((decoded, next)) = decode_entity(bytes, i, end) {
                        if text_buf.is_empty() {
                            text_start = i;
                        }
                        text_buf.extend_from_slice(&decoded);
                        i = next;
                        continue;
                    }
                }
                b'!' => {
                    if i + 1 < end && bytes[i + 1] == b'[' {
                        self.flush_text_buf(&mut out, offsets, &mut text_buf, &mut text_start, i);
                        self.push_text_node(&mut out, offsets, i, i + 2, "![");
                        let node_index = out.len().saturating_sub(1);
                        brackets.push(BracketEntry {
                            node_index,
                            start: i,
                            image: true,
                            active: true,
                        });
                        i += 2;
                        text_start = i;
                        continue;
                    }
                }
                b'[' => {
                    self.flush_text_buf(&mut out, offsets, &mut text_buf, &mut text_start, i);
                    self.push_text_node(&mut out, offsets, i, i + 1, "[");
                    let node_index = out.len().saturating_sub(1);
                    brackets.push(BracketEntry {
                        node_index,
                        start: i,
                        image: false,
                        active: true,
                    });
                    i += 1;
                    text_start = i;
                    continue;
                }
                b']' => {
                    self.flush_text_buf(&mut out, offsets, &mut text_buf, &mut text_start, i);
                    if let Some(next) = self.try_close_link(
                        buffer,
                        offsets,
                        end,
                        i,
                        &mut out,
                        &mut delims,
                        &mut brackets,
                    ) {
                        i = next;
                        text_start = i;
                        continue;
                    }
                    if text_buf.is_empty() {
                        text_start = i;
                    }
                    text_buf.push(b']');
                    i += 1;
                    continue;
                }
                b'*' | b'_' => {
                    let run_len = count_run(bytes, i, end, b);
                    let (can_open, can_close) =
                        delimiter_properties(buffer, start, end, i, run_len, b);
                    self.flush_text_buf(&mut out, offsets, &mut text_buf, &mut text_start, i);
                    let text = std::iter::repeat_n(b as char, run_len).collect::<String>();
                    let span = self.span_from_offsets(offsets, i, i + run_len);
                    out.push(Inline {
                        span,
                        kind: InlineKind::Text(text),
                    });
                    if can_open || can_close {
                        delims.push(Delimiter {
                            ch: b,
                            len: run_len,
                            node_index: out.len().saturating_sub(1),
                            can_open,
                            can_close,
                            orig_can_open: can_open,
                            orig_can_close: can_close,
                        });
                    }
                    i += run_len;
                    text_start = i;
                    continue;
                }
                b'\n' => {
                    let trailing = text_buf
                        .iter()
                        .rev()
                        .take_while(|byte| **byte == b' ')
                        .count();
                    let hard_break = trailing >= 2;
                    if trailing > 0 {
                        for _ in 0..trailing {
                            text_buf.pop();
                        }
                    }
                    self.flush_text_buf(&mut out, offsets, &mut text_buf, &mut text_start, i);
                    let span = self.span_from_offsets(offsets, i, i + 1);
                    out.push(Inline {
                        span,
                        kind: if hard_break {
                            InlineKind::HardBreak
                        } else {
                            InlineKind::SoftBreak
                        },
                    });
                    i += 1;
                    text_start = i;
                    continue;
                }
                _ => {}
            }
            if text_buf.is_empty() {
                text_start = i;
            }
            text_buf.push(b);
            i += 1;
        }

        self.flush_text_buf(&mut out, offsets, &mut text_buf, &mut text_start, end);
        self.process_emphasis(&mut out, &mut delims);
        out
    }

    fn flush_text_buf(
        &self,
        out: &mut InlineSeq,
        offsets: &[usize],
        text_buf: &mut Vec<u8>,
        text_start: &mut usize,
        current: usize,
    ) {
        if text_buf.is_empty() {
            *text_start = current;
            return;
        }
        let span = self.span_from_offsets(offsets, *text_start, current);
        let bytes = std::mem::take(text_buf);
        let text = match String::from_utf8(bytes) {
            Ok(value) => value,
            Err(err) => String::from_utf8_lossy(&err.into_bytes()).to_string(),
        };
        out.push(Inline {
            span,
            kind: InlineKind::Text(text),
        });
        *text_start = current;
    }

    fn push_text_node(
        &self,
        out: &mut InlineSeq,
        offsets: &[usize],
        start: usize,
        end: usize,
        text: &str,
    ) {
        let span = self.span_from_offsets(offsets, start, end);
        out.push(Inline {
            span,
            kind: InlineKind::Text(text.to_string()),
        });
    }

    fn parse_code_span(
        &self,
        buffer: &str,
        offsets: &[usize],
        start: usize,
        end: usize,
    ) -> Option<(Inline, usize)> {
        let bytes = buffer.as_bytes();
        let run_len = count_run(bytes, start, end, b'`');
        let mut i = start + run_len;
        while i < end {
            if bytes[i] == b'`' {
                let close_len = count_run(bytes, i, end, b'`');
                if close_len == run_len {
                    let mut content = buffer[start + run_len..i].replace('\n', " ");
                    if content.starts_with(' ') && content.ends_with(' ') && content.len() >= 2 {
                        let has_non_space = content.bytes().any(|b| b != b' ');
                        if has_non_space {
                            content = content[1..content.len() - 1].to_string();
                        }
                    }
                    let span = self.span_from_offsets(offsets, start, i + run_len);
                    return Some((
                        Inline {
                            span,
                            kind: InlineKind::CodeSpan(content),
                        },
                        i + run_len,
                    ));
                }
                i += close_len;
                continue;
            }
            i += 1;
        }
        None
    }

    fn parse_autolink(
        &self,
        buffer: &str,
        offsets: &[usize],
        start: usize,
        end: usize,
    ) -> Option<(Inline, usize)> {
        let bytes = buffer.as_bytes();
        if start + 2 >= end {
            return None;
        }
        let mut i = start + 1;
        while i < end {
            let b = bytes[i];
            if b == b'>' {
                break;
            }
            if b.is_ascii_whitespace() || b == b'<' {
                return None;
            }
            i += 1;
        }
        if i >= end || bytes[i] != b'>' {
            return None;
        }
        let inner = &buffer[start + 1..i];
        let (url, display) = if is_autolink_scheme(inner) {
            (percent_encode_autolink_url(inner), inner.to_string())
        } else if is_autolink_email(inner) {
            (format!("mailto:{}", inner), inner.to_string())
        } else {
            return None;
        };

        let span = self.span_from_offsets(offsets, start, i + 1);
        let child_span = self.span_from_offsets(offsets, start + 1, i);
        let child = Inline {
            span: child_span,
            kind: InlineKind::Text(display),
        };
        Some((
            Inline {
                span,
                kind: InlineKind::Link {
                    url,
                    title: None,
                    children: vec![child],
                },
            },
            i + 1,
        ))
    }

    fn parse_html_span(
        &self,
        buffer: &str,
        offsets: &[usize],
        start: usize,
        end: usize,
    ) -> Option<(Inline, usize)> {
        let bytes = buffer.as_bytes();
        if start + 1 >= end {
            return None;
        }
        if bytes[start + 1] == b'!' {
            if start + 3 < end && bytes[start + 2] == b'-' && bytes[start + 3] == b'-' {
                if start + 4 < end && bytes[start + 4] == b'>' {
                    return Some(self.html_span_node(buffer, offsets, start, start + 5));
                }
                if start + 5 < end && bytes[start + 4] == b'-' && bytes[start + 5] == b'>' {
                    return Some(self.html_span_node(buffer, offsets, start, start + 6));
                }
                let mut i = start + 4;
                while i + 2 < end {
                    if bytes[i] == b'-' && bytes[i + 1] == b'-' && bytes[i + 2] == b'>' {
                        return Some(self.html_span_node(buffer, offsets, start, i + 3));
                    }
                    i += 1;
                }
                return None;
            }
            if start + 8 < end
                && bytes[start + 2] == b'['
                && bytes[start + 3..start + 9] == *b"CDATA["
            {
                let mut i = start + 9;
                while i + 2 < end {
                    if bytes[i] == b']' && bytes[i + 1] == b']' && bytes[i + 2] == b'>' {
                        return Some(self.html_span_node(buffer, offsets, start, i + 3));
                    }
                    i += 1;
                }
                return None;
            }
            if start + 2 < end && bytes[start + 2].is_ascii_alphabetic() {
                let mut i = start + 2;
                while i < end {
                    if bytes[i] == b'>' {
                        return Some(self.html_span_node(buffer, offsets, start, i + 1));
                    }
                    i += 1;
                }
                return None;
            }
            return None;
        }
        if bytes[start + 1] == b'?' {
            let mut i = start + 2;
            while i + 1 < end {
                if bytes[i] == b'?' && bytes[i + 1] == b'>' {
                    return Some(self.html_span_node(buffer, offsets, start, i + 2));
                }
                i += 1;
            }
            return None;
        }

        let mut i = start + 1;
        let mut closing = false;
        if bytes[i] == b'/' {
            closing = true;
            i += 1;
        }
        if i >= end || !bytes[i].is_ascii_alphabetic() {
            return None;
        }
        let name_start = i;
        i += 1;
        while i < end {
            let b = bytes[i];
            if b.is_ascii_alphanumeric() || b == b'-' {
                i += 1;
                continue;
            }
            break;
        }
        if i == name_start || i >= end {
            return None;
        }
        if !bytes[i].is_ascii_whitespace()
            && bytes[i] != b'>'
            && !(bytes[i] == b'/' && i + 1 < end && bytes[i + 1] == b'>')
        {
            return None;
        }
        if closing {
            while i < end && bytes[i].is_ascii_whitespace() {
                i += 1;
            }
            if i < end && bytes[i] == b'>' {
                return Some(self.html_span_node(buffer, offsets, start, i + 1));
            }
            return None;
        }
        loop {
            while i < end && bytes[i].is_ascii_whitespace() {
                i += 1;
            }
            if i >= end {
                return None;
            }
            if bytes[i] == b'>' {
                return Some(self.html_span_node(buffer, offsets, start, i + 1));
            }
            if bytes[i] == b'/' && i + 1 < end && bytes[i + 1] == b'>' {
                return Some(self.html_span_node(buffer, offsets, start, i + 2));
            }
            if !is_html_attr_name_start(bytes[i]) {
                return None;
            }
            i += 1;
            while i < end && is_html_attr_name_continue(bytes[i]) {
                i += 1;
            }
            let after_name = i;
            let mut ws = i;
            while ws < end && bytes[ws].is_ascii_whitespace() {
                ws += 1;
            }
            if ws < end && bytes[ws] == b'=' {
                i = ws + 1;
                while i < end && bytes[i].is_ascii_whitespace() {
                    i += 1;
                }
                if i >= end {
                    return None;
                }
                let quote = bytes[i];
                if quote == b'"' || quote == b'\'' {
                    i += 1;
                    while i < end && bytes[i] != quote {
                        i += 1;
                    }
                    if i >= end {
                        return None;
                    }
                    i += 1;
                } else {
                    let mut consumed = false;
                    while i < end {
                        let b = bytes[i];
                        if b.is_ascii_whitespace() || b == b'>' {
                            break;
                        }
                        if b == b'/' && i + 1 < end && bytes[i + 1] == b'>' {
                            break;
                        }
                        if matches!(b, b'"' | b'\'' | b'=' | b'<' | b'>' | b'`') {
                            return None;
                        }
                        consumed = true;
                        i += 1;
                    }
                    if !consumed {
                        return None;
                    }
                }
            } else {
                i = after_name;
            }
            if i < end {
                let b = bytes[i];
                if !(b.is_ascii_whitespace()
                    || b == b'>'
                    || (b == b'/' && i + 1 < end && bytes[i + 1] == b'>'))
                {
                    return None;
                }
            }
        }
    }

    fn html_span_node(
        &self,
        buffer: &str,
        offsets: &[usize],
        start: usize,
        end: usize,
    ) -> (Inline, usize) {
        let raw = buffer[start..end].to_string();
        let span = self.span_from_offsets(offsets, start, end);
        (
            Inline {
                span,
                kind: InlineKind::Html(raw),
            },
            end,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn try_close_link(
        &self,
        buffer: &str,
        offsets: &[usize],
        end: usize,
        current: usize,
        out: &mut InlineSeq,
        delims: &mut Vec<Delimiter>,
        brackets: &mut Vec<BracketEntry>,
    ) -> Option<usize> {
        let opener_pos = brackets.iter().rposition(|entry| entry.active)?;
        let opener = brackets.get(opener_pos)?.clone();
        if opener.image
            && let Some(inactive_pos) = brackets
                .iter()
                .rposition(|entry| !entry.active && !entry.image)
            && inactive_pos > opener_pos
        {
            brackets.remove(inactive_pos);
            return None;
        }
        enum ParsedLink {
            Inline {
                url: String,
                title: Option<String>,
                close: usize,
            },
            Reference {
                definition: LinkDefinition,
                close: usize,
            },
        }
        let parsed = if let Some((inline_url, inline_title, inline_close)) =
            parse_inline_link_destination(buffer, current + 1, end)
        {
            ParsedLink::Inline {
                url: inline_url,
                title: inline_title,
                close: inline_close,
            }
        } else {
            let bytes = buffer.as_bytes();
            let mut next = current + 1;
            let mut label = None;

            if next < end && bytes[next] == b'[' {
                let label_start = next + 1;
                if let Some((label_end, had_newline)) =
                    find_bracket_end(bytes, label_start, end)
                {
                    if had_newline {
                        return None;
                    }
                    let raw = &bytes[label_start..label_end];
                    let raw_label = String::from_utf8_lossy(raw).to_string();
                    if !raw_label.is_empty() {
                        label = Some(raw_label);
                    }
                    next = label_end + 1;
                } else {
                    return None;
                }
            }

            let content_start = if opener.image {
                opener.start + 2
            } else {
                opener.start + 1
            };
            let text_label = if current >= content_start {
                String::from_utf8_lossy(&bytes[content_start..current]).to_string()
            } else {
                String::new()
            };
            let lookup = match label {
                Some(value) if !value.is_empty() => value,
                _ => text_label,
            };
            if lookup.is_empty() {
                return None;
            }
            let normalized_lookup = normalize_link_label(lookup.as_bytes());
            let definition = match self.link_defs.get(&normalized_lookup) {
                Some(definition) => definition.clone(),
                None => {
                    brackets.remove(opener_pos);
                    return None;
                }
            };
            let close = next.saturating_sub(1);
            ParsedLink::Reference { definition, close }
        };
        if opener.node_index >= out.len() {
            return None;
        }
        let close = match &parsed {
            ParsedLink::Inline { close, .. } => *close,
            ParsedLink::Reference { close, .. } => *close,
        };
        let span = self.span_from_offsets(offsets, opener.start, close + 1);

        let children = {
            let mut children = out.split_off(opener.node_index + 1);
            out.pop()?;

            let mut child_delims = Vec::new();
            let mut remaining = Vec::new();
            for delim in delims.drain(..) {
                if delim.node_index > opener.node_index {
                    let mut shifted = delim;
                    shifted.node_index = shifted.node_index.saturating_sub(opener.node_index + 1);
                    child_delims.push(shifted);
                } else {
                    remaining.push(delim);
                }
            }
            *delims = remaining;
            if !child_delims.is_empty() {
                self.process_emphasis(&mut children, &mut child_delims);
            }
            children
        };

        let kind = match parsed {
            ParsedLink::Inline { url, title, .. } => {
                if opener.image {
                    InlineKind::Image {
                        url,
                        title,
                        alt: children,
                    }
                } else {
                    InlineKind::Link {
                        url,
                        title,
                        children,
                    }
                }
            }
            ParsedLink::Reference { definition, .. } => {
                if opener.image {
                    InlineKind::Image {
                        url: definition.url,
                        title: definition.title,
                        alt: children,
                    }
                } else {
                    InlineKind::Link {
                        url: definition.url,
                        title: definition.title,
                        children,
                    }
                }
            }
        };
        out.push(Inline { span, kind });

        if !opener.image {
            // Links never nest; earlier openers are dead once one closes.
            for entry in brackets.iter_mut() {
                if !entry.image {
                    entry.active = false;
                }
            }
        }
        brackets.retain(|entry| entry.node_index < opener.node_index);
        Some(close + 1)
    }

    fn process_emphasis(&self, out: &mut InlineSeq, delims: &mut Vec<Delimiter>) {
        loop {
            let mut closer_index = None;
            for (idx, delim) in delims.iter().enumerate() {
                if delim.can_close {
                    closer_index = Some(idx);
                    break;
                }
            }
            let closer_index = match closer_index {
                Some(idx) => idx,
                None => break,
            };
            let closer = match delims.get(closer_index) {
                Some(entry) => entry.clone(),
                None => break,
            };
            let mut opener_index = None;
            let mut use_len = 1;
            for idx in (0..closer_index).rev() {
                let opener = match delims.get(idx) {
                    Some(entry) => entry,
                    None => continue,
                };
                if opener.ch != closer.ch || !opener.can_open {
                    continue;
                }
                let candidate = if opener.len >= 2 && closer.len >= 2 {
                    2
                } else {
                    1
                };
                if candidate == 1 && delimiter_blocked(opener, &closer) {
                    continue;
                }
                opener_index = Some(idx);
                use_len = candidate;
                break;
            }
            let opener_index = match opener_index {
                Some(idx) => idx,
                None => {
                    if let Some(entry) = delims.get_mut(closer_index) {
                        entry.can_close = false;
                    }
                    continue;
                }
            };
            self.apply_emphasis(out, delims, opener_index, closer_index, use_len);
        }
    }

    fn apply_emphasis(
        &self,
        out: &mut InlineSeq,
        delims: &mut Vec<Delimiter>,
        opener_index: usize,
        closer_index: usize,
        use_len: usize,
    ) {
        let opener = match delims.get(opener_index) {
            Some(entry) => entry.clone(),
            None => return,
        };
        let closer = match delims.get(closer_index) {
            Some(entry) => entry.clone(),
            None => return,
        };
        if opener.node_index >= closer.node_index {
            return;
        }
        let removed_len = closer.node_index + 1 - opener.node_index;
        let removed: Vec<Inline> = out
            .drain(opener.node_index..closer.node_index + 1)
            .collect();
        let mut iter = removed.into_iter();
        let opener_node = match iter.next() {
            Some(node) => node,
            None => return,
        };
        let closer_node = match iter.next_back() {
            Some(node) => node,
            None => return,
        };
        let children: Vec<Inline> = iter.collect();

        let opener_remain = opener.len.saturating_sub(use_len);
        let closer_remain = closer.len.saturating_sub(use_len);
        // Clamp the split points so the replacement spans stay ordered
        // and keep containing the children, even when offset clamping
        // (tab expansion) has collapsed the delimiter spans.
        let open_start = opener_node.span.start;
        let close_end = closer_node.span.end;
        let mut open_split = (open_start + opener_remain).min(close_end);
        if let Some(first) = children.first() {
            open_split = open_split.min(first.span.start);
        }
        let mut close_split = close_end.saturating_sub(closer_remain);
        if let Some(last) = children.last() {
            close_split = close_split.max(last.span.end);
        }
        let close_split = close_split.clamp(open_split, close_end);
        let mut replacement = Vec::new();
        if opener_remain > 0 {
            let text = std::iter::repeat_n(opener.ch as char, opener_remain).collect::<String>();
            replacement.push(Inline {
                span: Span::new(open_start, open_split),
                kind: InlineKind::Text(text),
            });
        }

        let emph_kind = if use_len == 2 {
            InlineKind::Strong(children)
        } else {
            InlineKind::Emph(children)
        };
        replacement.push(Inline {
            span: Span::new(open_split, close_split),
            kind: emph_kind,
        });

        if closer_remain > 0 {
            let text = std::iter::repeat_n(closer.ch as char, closer_remain).collect::<String>();
            replacement.push(Inline {
                span: Span::new(close_split, close_end),
                kind: InlineKind::Text(text),
            });
        }

        let replacement_len = replacement.len();
        out.splice(opener.node_index..opener.node_index, replacement);

        let delta = replacement_len as isize - removed_len as isize;
        let mut updated = Vec::new();
        for (idx, delim) in delims.iter().enumerate() {
            if idx == opener_index || idx == closer_index {
                continue;
            }
            if delim.node_index < opener.node_index {
                updated.push(delim.clone());
            } else if delim.node_index > closer.node_index {
                let mut shifted = delim.clone();
                if delta.is_negative() {
                    shifted.node_index = shifted.node_index.saturating_sub(delta.unsigned_abs());
                } else {
                    shifted.node_index = shifted.node_index.saturating_add(delta.unsigned_abs());
                }
                updated.push(shifted);
            }
        }

        let mut next_index = opener.node_index;
        if opener_remain > 0 {
            updated.push(Delimiter {
                ch: opener.ch,
                len: opener_remain,
                node_index: next_index,
                can_open: opener.can_open,
                can_close: opener.can_close,
                orig_can_open: opener.orig_can_open,
                orig_can_close: opener.orig_can_close,
            });
            next_index += 1;
        }
        next_index += 1;
        if closer_remain > 0 {
            updated.push(Delimiter {
                ch: closer.ch,
                len: closer_remain,
                node_index: next_index,
                can_open: closer.can_open,
                can_close: closer.can_close,
                orig_can_open: closer.orig_can_open,
                orig_can_close: closer.orig_can_close,
            });
        }
        updated.sort_by_key(|delim| delim.node_index);
        *delims = updated;
    }

    fn span_from_offsets(&self, offsets: &[usize], start: usize, end: usize) -> Span {
        let source_end = self.source_len;
        let start_off = offsets.get(start).copied().unwrap_or(source_end);
        let mut end_off = if end < offsets.len() {
            offsets[end]
        } else if let Some(last) = offsets.last() {
            last.saturating_add(1)
        } else {
            source_end
        };

        if end_off > source_end {
            end_off = source_end;
        }

        Span::new(start_off, end_off)
    }
}

fn count_run(bytes: &[u8], start: usize, end: usize, needle: u8) -> usize {
    let mut i = start;
    while i < end {
        if bytes[i] != needle {
            break;
        }
        i += 1;
    }
    i.saturating_sub(start)
}

/// Left/right-flanking computation for an emphasis delimiter run, with
/// the underscore intraword restriction.
fn delimiter_properties(
    buffer: &str,
    start: usize,
    end: usize,
    pos: usize,
    run_len: usize,
    delim: u8,
) -> (bool, bool) {
    let before = if pos > start {
        buffer[..pos].chars().next_back()
    } else {
        None
    };
    let after_pos = pos + run_len;
    let after = if after_pos < end {
        buffer[after_pos..end].chars().next()
    } else {
        None
    };

    let before_is_whitespace = match before {
        Some(ch) => ch.is_whitespace(),
        None => true,
    };
    let after_is_whitespace = match after {
        Some(ch) => ch.is_whitespace(),
        None => true,
    };
    let before_is_punctuation = before.is_some_and(is_unicode_punctuation);
    let after_is_punctuation = after.is_some_and(is_unicode_punctuation);

    let left_flanking = !after_is_whitespace
        && (!after_is_punctuation || before_is_whitespace || before_is_punctuation);
    let right_flanking = !before_is_whitespace
        && (!before_is_punctuation || after_is_whitespace || after_is_punctuation);

    if delim == b'_' {
        let can_open = left_flanking && (!right_flanking || before_is_punctuation);
        let can_close = right_flanking && (!left_flanking || after_is_punctuation);
        (can_open, can_close)
    } else {
        (left_flanking, right_flanking)
    }
}

fn is_unicode_punctuation(ch: char) -> bool {
    !ch.is_whitespace() && !ch.is_alphanumeric()
}

/// The "multiple of 3" rule: a closer that can also open (or an opener
/// that can also close) must not pair when the combined run length is a
/// multiple of 3, unless both lengths are.
fn delimiter_blocked(opener: &Delimiter, closer: &Delimiter) -> bool {
    if opener.ch != closer.ch {
        return false;
    }
    let opener_both = opener.orig_can_open && opener.orig_can_close;
    let closer_both = closer.orig_can_open && closer.orig_can_close;
    if !opener_both && !closer_both {
        return false;
    }
    if (opener.len + closer.len) % 3 != 0 {
        return false;
    }
    opener.len % 3 != 0 || closer.len % 3 != 0
}

fn find_bracket_end(bytes: &[u8], start: usize, end: usize) -> Option<(usize, bool)> {
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

fn parse_link_title(bytes: &[u8], start: usize, end: usize) -> Option<(String, usize)> {
    if start >= end {
        return None;
    }
    let open = bytes[start];
    let close = match open {
        b'"' => b'"',
        b'\'' => b'\'',
        b'(' => b')',
        _ => return None,
    };
    let mut i = start + 1;
    let mut out = Vec::new();
    let mut escaped = false;
    while i < end {
        let b = bytes[i];
        if b == b'\n' {
            return None;
        }
        if escaped {
            out.push(b);
            escaped = false;
            i += 1;
            continue;
        }
        if b == b'\\' {
            if i + 1 < end && bytes[i + 1].is_ascii_punctuation() {
                escaped = true;
                out.push(b'\\');
                i += 1;
                continue;
            }
            out.push(b'\\');
            i += 1;
            continue;
        }
        if b == close {
            let title = match String::from_utf8(out) {
                Ok(value) => value,
                Err(err) => String::from_utf8_lossy(&err.into_bytes()).to_string(),
            };
            return Some((unescape_and_decode(&title), i + 1));
        }
        out.push(b);
        i += 1;
    }
    None
}

fn parse_inline_link_destination(
    buffer: &str,
    start: usize,
    end: usize,
) -> Option<(String, Option<String>, usize)> {
    let bytes = buffer.as_bytes();
    let mut i = start;
    if i >= end || bytes[i] != b'(' {
        return None;
    }
    i += 1;
    while i < end && bytes[i].is_ascii_whitespace() {
        if bytes[i] == b'\n' {
            return None;
        }
        i += 1;
    }
    if i >= end {
        return None;
    }

    let mut url_bytes = Vec::new();
    if bytes[i] == b'<' {
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
        let mut depth = 0usize;
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
            if b == b'(' {
                depth += 1;
                url_bytes.push(b);
                i += 1;
                continue;
            }
            if b == b')' {
                if depth == 0 {
                    break;
                }
                depth -= 1;
                url_bytes.push(b);
                i += 1;
                continue;
            }
            url_bytes.push(b);
            i += 1;
        }
        if depth > 0 {
            return None;
        }
        // An empty destination is fine: `[link]()` carries an empty href.
    }

    let url = match String::from_utf8(url_bytes) {
        Ok(value) => value,
        Err(err) => String::from_utf8_lossy(&err.into_bytes()).to_string(),
    };
    let url = unescape_and_decode(&url);
    let url = percent_encode_url(&url);

    let mut had_space = false;
    while i < end && bytes[i].is_ascii_whitespace() {
        had_space = true;
        i += 1;
    }
    if i >= end {
        return None;
    }
    if bytes[i] == b')' {
        return Some((url, None, i));
    }
    if !had_space {
        return None;
    }

    let (title, next) = parse_link_title(bytes, i, end)?;
    i = next;
    while i < end && bytes[i].is_ascii_whitespace() {
        i += 1;
    }
    if i < end && bytes[i] == b')' {
        return Some((url, Some(title), i));
    }
    None
}

fn is_autolink_scheme(value: &str) -> bool {
    let bytes = value.as_bytes();
    let mut i = 0;
    if bytes.is_empty() || !bytes[0].is_ascii_alphabetic() {
        return false;
    }
    while i < bytes.len() {
        let b = bytes[i];
        if b == b':' {
            return i >= 2 && i + 1 < bytes.len();
        }
        let ok = b.is_ascii_alphanumeric() || matches!(b, b'+' | b'-' | b'.');
        if !ok {
            return false;
        }
        i += 1;
    }
    false
}

fn is_autolink_email(value: &str) -> bool {
    let mut parts = value.split('@');
    let local = match parts.next() {
        Some(part) if !part.is_empty() => part,
        _ => return false,
    };
    let domain = match parts.next() {
        Some(part) if !part.is_empty() => part,
        _ => return false,
    };
    if parts.next().is_some() {
        return false;
    }
    for b in local.bytes() {
        let ok = b.is_ascii_alphanumeric()
            || matches!(
                b,
                b'!' | b'#'
                    | b'$'
                    | b'%'
                    | b'&'
                    | b'\''
                    | b'*'
                    | b'+'
                    | b'-'
                    | b'/'
                    | b'='
                    | b'?'
                    | b'^'
                    | b'_'
                    | b'`'
                    | b'{'
                    | b'|'
                    | b'}'
                    | b'~'
                    | b'.'
            );
        if !ok {
            return false;
        }
    }
    let mut dot = false;
    for (idx, b) in domain.bytes().enumerate() {
        let ok = b.is_ascii_alphanumeric() || b == b'.' || b == b'-';
        if !ok {
            return false;
        }
        if b == b'.' {
            if idx == 0 {
                return false;
            }
            dot = true;
        }
    }
    dot && !domain.ends_with('.')
}

#[cfg(test)]
mod tests {
    use super::InlineParser;
    use crate::ast::{InlineKind, InlineSeq};
    use std::collections::HashMap;

    fn parse_inlines(text: &str) -> InlineSeq {
        let defs = HashMap::new();
        let parser = InlineParser::new(text.len(), &defs);
        let offsets: Vec<usize> = (0..text.len()).collect();
        parser.parse(text, &offsets)
    }

    fn kinds(text: &str) -> Vec<InlineKind> {
        parse_inlines(text)
            .into_iter()
            .map(|inline| inline.kind)
            .collect()
    }

    #[test]
    fn emphasis_and_strong_nest() {
        let parsed = kinds("***strong*** plain");
        assert_eq!(parsed.len(), 2);
        let InlineKind::Emph(children) = &parsed[0] else {
            panic!("expected emphasis, got {:?}", parsed[0]);
        };
        let InlineKind::Strong(inner) = &children[0].kind else {
            panic!("expected strong inside emphasis");
        };
        assert_eq!(inner[0].kind, InlineKind::Text("strong".to_string()));
        assert_eq!(parsed[1], InlineKind::Text(" plain".to_string()));
    }

    #[test]
    fn underscore_does_not_open_intraword() {
        let parsed = kinds("foo_bar_baz");
        assert_eq!(parsed, vec![
            InlineKind::Text("foo".to_string()),
            InlineKind::Text("_".to_string()),
            InlineKind::Text("bar".to_string()),
            InlineKind::Text("_".to_string()),
            InlineKind::Text("baz".to_string()),
        ]);
    }

    #[test]
    fn code_span_closing_run_must_match() {
        let parsed = kinds("``foo ` bar``");
        assert_eq!(parsed, vec![InlineKind::CodeSpan("foo ` bar".to_string())]);
        let parsed = kinds("`unclosed");
        assert_eq!(parsed, vec![InlineKind::Text("`unclosed".to_string())]);
    }

    #[test]
    fn scheme_autolink() {
        let parsed = kinds("<https://example.com/a?b=c>");
        assert_eq!(parsed.len(), 1);
        let InlineKind::Link { url, children, .. } = &parsed[0] else {
            panic!("expected link");
        };
        assert_eq!(url, "https://example.com/a?b=c");
        assert_eq!(
            children[0].kind,
            InlineKind::Text("https://example.com/a?b=c".to_string())
        );
    }

    #[test]
    fn email_autolink_gets_mailto() {
        let parsed = kinds("<person@example.com>");
        let InlineKind::Link { url, .. } = &parsed[0] else {
            panic!("expected link");
        };
        assert_eq!(url, "mailto:person@example.com");
    }

    #[test]
    fn unmatched_brackets_degrade_to_text() {
        let parsed = kinds("[not a link]");
        assert_eq!(parsed, vec![
            InlineKind::Text("[".to_string()),
            InlineKind::Text("not a link".to_string()),
            InlineKind::Text("]".to_string()),
        ]);
    }

    #[test]
    fn inline_link_with_title() {
        let parsed = kinds("[text](/url \"the title\")");
        assert_eq!(parsed.len(), 1);
        let InlineKind::Link {
            url,
            title,
            children,
        } = &parsed[0]
        else {
            panic!("expected link");
        };
        assert_eq!(url, "/url");
        assert_eq!(title.as_deref(), Some("the title"));
        assert_eq!(children[0].kind, InlineKind::Text("text".to_string()));
    }

    #[test]
    fn entity_references_become_text() {
        let parsed = kinds("a &amp; b");
        assert_eq!(parsed, vec![InlineKind::Text("a & b".to_string())]);
    }
}
