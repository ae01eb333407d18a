//! Logical-line scanner: splits the source into lines and recognizes the
//! structural cues that open blocks (headings, fences, thematic breaks,
//! list markers, block-quote prefixes, HTML block starts).
//!
//! Tabs are never expanded globally; every cue matcher counts columns with
//! a tab stop of 4 so that partial tab consumption inside container
//! prefixes stays byte-accurate.

#[derive(Clone, Debug)]
pub(crate) struct Line {
    pub text: String,
    pub start: usize,
    pub end: usize,
    pub has_newline: bool,
    pub lazy_continuation: bool,
}

pub(crate) fn split_lines(source: &str) -> Vec<Line> {
    let mut lines = Vec::new();
    let mut start = 0;
    for (idx, byte) in source.bytes().enumerate() {
        if byte == b'\n' {
            let mut text = source[start..idx].to_string();
            if text.ends_with('\r') {
                text.pop();
            }
            lines.push(Line {
                text,
                start,
                end: idx,
                has_newline: true,
                lazy_continuation: false,
            });
            start = idx + 1;
        }
    }
    if start <= source.len() {
        let mut text = source[start..].to_string();
        if text.ends_with('\r') {
            text.pop();
        }
        lines.push(Line {
            text,
            start,
            end: source.len(),
            has_newline: false,
            lazy_continuation: false,
        });
    }
    lines
}

pub(crate) fn is_space_or_tab(byte: u8) -> bool {
    byte == b' ' || byte == b'\t'
}

pub(crate) fn advance_column(columns: usize, byte: u8) -> Option<usize> {
    match byte {
        b' ' => Some(columns + 1),
        b'\t' => Some(columns + (4 - (columns % 4))),
        _ => None,
    }
}

/// Skips at most `max_cols` columns of leading whitespace; `None` means the
/// line is indented past the limit (code-block territory).
pub(crate) fn strip_indent_up_to(text: &str, max_cols: usize) -> Option<&str> {
    let bytes = text.as_bytes();
    let mut cols = 0;
    let mut idx = 0;
    for (pos, byte) in bytes.iter().enumerate() {
        let next_cols = match advance_column(cols, *byte) {
            Some(next) => next,
            None => {
                idx = pos;
                return Some(&text[idx..]);
            }
        };
        cols = next_cols;
        idx = pos + 1;
        if cols > max_cols {
            return None;
        }
    }
    Some(&text[idx..])
}

/// Byte length of a whitespace prefix spanning at least `required` columns.
pub(crate) fn indent_prefix_len(text: &str, required: usize) -> Option<usize> {
    if required == 0 {
        return Some(0);
    }
    let bytes = text.as_bytes();
    let mut columns = 0;
    for (idx, byte) in bytes.iter().enumerate() {
        let next_cols = match advance_column(columns, *byte) {
            Some(next) => next,
            None => break,
        };
        columns = next_cols;
        if columns >= required {
            return Some(idx + 1);
        }
    }
    None
}

/// Removes up to `columns` columns of indentation, expanding any tab that
/// straddles the boundary into the spaces left over after the cut.
pub(crate) fn remove_indent_columns(text: &str, columns: usize) -> String {
    let bytes = text.as_bytes();
    let mut col = 0;
    let mut byte_pos = 0;

    while byte_pos < bytes.len() && col < columns {
        match bytes[byte_pos] {
            b' ' => {
                col += 1;
                byte_pos += 1;
            }
            b'\t' => {
                let next_col = col + (4 - (col % 4));
                if next_col > columns {
                    break;
                }
                col = next_col;
                byte_pos += 1;
            }
            _ => break,
        }
    }

    let mut result = String::new();
    if col < columns && byte_pos < bytes.len() && bytes[byte_pos] == b'\t' {
        let tab_end = col + (4 - (col % 4));
        for _ in 0..tab_end.saturating_sub(columns) {
            result.push(' ');
        }
        col = tab_end;
        byte_pos += 1;
    }

    // Remaining tabs expand relative to their column in the original input.
    for ch in text[byte_pos..].chars() {
        if ch == '\t' {
            let next_tab_stop = col + (4 - (col % 4));
            for _ in 0..next_tab_stop - col {
                result.push(' ');
            }
            col = next_tab_stop;
        } else {
            result.push(ch);
            if ch != '\r' && ch != '\n' {
                col += 1;
            }
        }
    }

    result
}

/// Strips a list item's marker plus content indent from its first line.
/// Unlike `remove_indent_columns` this also walks over the non-whitespace
/// marker bytes themselves.
pub(crate) fn remove_list_indent(text: &str, content_indent: usize) -> String {
    let bytes = text.as_bytes();
    let mut result = String::new();
    let mut col = 0;
    let mut byte_pos = 0;

    while byte_pos < bytes.len() && col < content_indent {
        match bytes[byte_pos] {
            b' ' => {
                col += 1;
                byte_pos += 1;
            }
            b'\t' => {
                let next_col = col + (4 - (col % 4));
                if next_col > content_indent {
                    break;
                }
                col = next_col;
                byte_pos += 1;
            }
            _ => {
                // Marker bytes count one column each.
                col += 1;
                byte_pos += 1;
            }
        }
    }

    if col < content_indent && byte_pos < bytes.len() && bytes[byte_pos] == b'\t' {
        let tab_end = col + (4 - (col % 4));
        for _ in 0..tab_end.saturating_sub(content_indent) {
            result.push(' ');
        }
        col = tab_end;
        byte_pos += 1;
    }

    if byte_pos < bytes.len() {
        for ch in text[byte_pos..].chars() {
            if ch == '\t' {
                let next_tab_stop = col + (4 - (col % 4));
                for _ in 0..next_tab_stop - col {
                    result.push(' ');
                }
                col = next_tab_stop;
            } else {
                result.push(ch);
                if ch != '\r' && ch != '\n' {
                    col += 1;
                }
            }
        }
    }

    result
}

pub(crate) fn strip_leading_spaces(text: &str, max: usize) -> &str {
    if max == 0 {
        return text;
    }
    let bytes = text.as_bytes();
    let mut idx = 0;
    let mut count = 0;
    while idx < bytes.len() && count < max && bytes[idx] == b' ' {
        idx += 1;
        count += 1;
    }
    &text[idx..]
}

/// Opening code fence: (indent bytes, fence length, fence byte, raw info).
pub(crate) fn parse_fence_open(text: &str) -> Option<(usize, usize, u8, String)> {
    let bytes = text.as_bytes();
    let mut idx = 0;
    while idx < bytes.len() && idx < 3 && bytes[idx] == b' ' {
        idx += 1;
    }
    if idx < bytes.len() && bytes[idx] == b' ' {
        return None;
    }
    let rest = &text[idx..];
    let fence_char = if rest.starts_with("```") {
        b'`'
    } else if rest.starts_with("~~~") {
        b'~'
    } else {
        return None;
    };
    let fence_len = rest
        .as_bytes()
        .iter()
        .take_while(|b| **b == fence_char)
        .count();
    if fence_len < 3 {
        return None;
    }
    let info = rest[fence_len..].trim_matches(|ch| ch == ' ' || ch == '\t');
    if fence_char == b'`' && info.contains('`') {
        return None;
    }
    Some((idx, fence_len, fence_char, info.to_string()))
}

pub(crate) fn is_fence_close(text: &str, fence_len: usize, fence_char: u8) -> bool {
    let bytes = text.as_bytes();
    let mut idx = 0;
    while idx < bytes.len() && idx < 3 && bytes[idx] == b' ' {
        idx += 1;
    }
    if idx < bytes.len() && bytes[idx] == b' ' {
        return false;
    }
    let rest_bytes = &bytes[idx..];
    let mut count = 0;
    while count < rest_bytes.len() && rest_bytes[count] == fence_char {
        count += 1;
    }
    if count < fence_len {
        return false;
    }
    rest_bytes[count..].iter().all(|b| is_space_or_tab(*b))
}

pub(crate) fn setext_underline_level(text: &str) -> Option<u8> {
    let trimmed = strip_indent_up_to(text, 3)?;
    let bytes = trimmed.as_bytes();
    if bytes.is_empty() {
        return None;
    }
    let ch = bytes[0];
    if ch != b'=' && ch != b'-' {
        return None;
    }
    let mut i = 0;
    while i < bytes.len() && bytes[i] == ch {
        i += 1;
    }
    if bytes[i..].iter().any(|b| !is_space_or_tab(*b)) {
        return None;
    }
    Some(if ch == b'=' { 1 } else { 2 })
}

/// ATX heading: (level, content start byte, content end byte). Trailing
/// `#` runs are stripped when whitespace-separated from the content.
pub(crate) fn parse_atx_heading(text: &str) -> Option<(u8, usize, usize)> {
    let trimmed = strip_indent_up_to(text, 3)?;
    let indent_len = text.len() - trimmed.len();
    let bytes = trimmed.as_bytes();
    if bytes.is_empty() {
        return None;
    }
    let mut level = 0;
    while level < bytes.len() && bytes[level] == b'#' {
        level += 1;
    }
    if level == 0 || level > 6 {
        return None;
    }
    if level < bytes.len() && !is_space_or_tab(bytes[level]) {
        return None;
    }
    let mut content_start = level;
    while content_start < bytes.len() && is_space_or_tab(bytes[content_start]) {
        content_start += 1;
    }
    let mut content_end = bytes.len();
    while content_end > content_start && is_space_or_tab(bytes[content_end - 1]) {
        content_end -= 1;
    }
    if content_end > content_start {
        let mut hash_start = content_end;
        while hash_start > content_start && bytes[hash_start - 1] == b'#' {
            hash_start -= 1;
        }
        if hash_start < content_end
            && (hash_start == content_start || is_space_or_tab(bytes[hash_start - 1]))
        {
            let mut pre = hash_start;
            if hash_start > content_start {
                pre = hash_start - 1;
                while pre > content_start && is_space_or_tab(bytes[pre - 1]) {
                    pre -= 1;
                }
            }
            content_end = pre;
        }
    }
    while content_end > content_start && is_space_or_tab(bytes[content_end - 1]) {
        content_end -= 1;
    }
    Some((
        level as u8,
        indent_len + content_start,
        indent_len + content_end,
    ))
}

pub(crate) fn is_thematic_break_line(text: &str) -> bool {
    let trimmed = match strip_indent_up_to(text, 3) {
        Some(value) => value,
        None => return false,
    };
    let bytes = trimmed.as_bytes();
    if bytes.is_empty() {
        return false;
    }
    let mut marker: Option<u8> = None;
    let mut count = 0;
    for b in bytes {
        if is_space_or_tab(*b) {
            continue;
        }
        if marker.is_none() {
            if !matches!(*b, b'-' | b'*' | b'_') {
                return false;
            }
            marker = Some(*b);
            count += 1;
            continue;
        }
        if marker == Some(*b) {
            count += 1;
            continue;
        }
        return false;
    }
    count >= 3
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct ListMarker {
    pub ordered: bool,
    pub start: Option<u64>,
    pub marker_len: usize,
    pub content_indent: usize,
    pub empty: bool,
    pub marker: u8,
}

pub(crate) fn parse_list_marker(text: &str) -> Option<ListMarker> {
    if is_thematic_break_line(text) {
        return None;
    }
    let bytes = text.as_bytes();
    if bytes.is_empty() {
        return None;
    }
    let mut idx = 0;
    let mut indent_cols = 0;
    while idx < bytes.len() && idx < 3 && bytes[idx] == b' ' {
        idx += 1;
        indent_cols += 1;
    }
    if idx < bytes.len() && bytes[idx] == b' ' {
        return None;
    }

    if idx < bytes.len() {
        let ch = bytes[idx];
        if matches!(ch, b'-' | b'+' | b'*') {
            let marker_pos = idx;
            let marker_width = 1;
            idx += 1;
            let start_col = indent_cols + marker_width;
            let (post_cols, post_bytes, content_ws_bytes, content_cols, has_nonspace) =
                scan_post_marker(bytes, idx, start_col);
            if post_cols == 0 && has_nonspace {
                return None;
            }
            let empty_item = !has_nonspace;
            let (content_indent, marker_len) = if empty_item {
                (
                    indent_cols + marker_width + 1,
                    marker_pos + marker_width + post_bytes,
                )
            } else if content_cols == 0 {
                // Too much whitespace after the marker (>4 columns): the
                // content indent falls back to marker plus one.
                (indent_cols + marker_width + 1, marker_pos + marker_width)
            } else {
                (
                    indent_cols + marker_width + content_cols,
                    marker_pos + marker_width + content_ws_bytes,
                )
            };
            return Some(ListMarker {
                ordered: false,
                start: None,
                marker_len,
                content_indent,
                empty: empty_item,
                marker: ch,
            });
        }
    }

    let digit_start = idx;
    while idx < bytes.len() && bytes[idx].is_ascii_digit() {
        idx += 1;
    }
    let digits_len = idx.saturating_sub(digit_start);
    if digits_len == 0 || digits_len > 9 || idx >= bytes.len() {
        return None;
    }
    let delimiter = bytes[idx];
    if delimiter != b'.' && delimiter != b')' {
        return None;
    }
    let marker_end = idx + 1;
    let marker_width = marker_end - digit_start;
    idx = marker_end;
    let start_col = indent_cols + marker_width;
    let (post_cols, post_bytes, content_ws_bytes, content_cols, has_nonspace) =
        scan_post_marker(bytes, idx, start_col);
    if post_cols == 0 && has_nonspace {
        return None;
    }
    let empty_item = !has_nonspace;
    let (content_indent, marker_len) = if empty_item {
        (indent_cols + marker_width + 1, marker_end + post_bytes)
    } else if content_cols == 0 {
        (indent_cols + marker_width + 1, marker_end)
    } else {
        (
            indent_cols + marker_width + content_cols,
            marker_end + content_ws_bytes,
        )
    };
    let start_num = text[digit_start..digit_start + digits_len]
        .parse::<u64>()
        .ok();
    Some(ListMarker {
        ordered: true,
        start: start_num,
        marker_len,
        content_indent,
        empty: empty_item,
        marker: delimiter,
    })
}

/// Scans the whitespace after a list marker, column by column, tracking
/// partially consumed tabs. Returns (total columns, total bytes, content
/// whitespace bytes, content columns, non-space content follows).
fn scan_post_marker(bytes: &[u8], start: usize, start_col: usize) -> (usize, usize, usize, usize, bool) {
    let mut idx = start;
    let mut col = start_col;
    let mut tab_remainder = 0;

    while col - start_col < 5 && idx < bytes.len() {
        if tab_remainder > 0 {
            tab_remainder -= 1;
            col += 1;
            if tab_remainder == 0 {
                idx += 1;
            }
        } else {
            match bytes[idx] {
                b' ' => {
                    col += 1;
                    idx += 1;
                }
                b'\t' => {
                    let chars_to_tab = 4 - (col % 4);
                    col += 1;
                    if chars_to_tab > 1 {
                        tab_remainder = chars_to_tab - 1;
                    } else {
                        idx += 1;
                    }
                }
                _ => break,
            }
        }
    }

    let total_cols = col - start_col;
    let total_bytes = idx - start;

    let mut has_nonspace = false;
    let mut scan_idx = idx;
    let mut scan_tab_remainder = tab_remainder;
    while scan_idx < bytes.len() {
        if scan_tab_remainder > 0 {
            scan_tab_remainder -= 1;
            if scan_tab_remainder == 0 {
                scan_idx += 1;
            }
        } else {
            match bytes[scan_idx] {
                b' ' | b'\t' => scan_idx += 1,
                _ => {
                    has_nonspace = true;
                    break;
                }
            }
        }
    }

    if total_cols == 0 || total_cols > 4 {
        return (total_cols, total_bytes, 0, 0, has_nonspace);
    }

    // Byte length of exactly `total_cols` columns of post-marker space.
    let content_cols = total_cols;
    let mut temp_col = start_col;
    let mut temp_idx = start;
    while temp_col < start_col + content_cols && temp_idx < bytes.len() {
        match bytes[temp_idx] {
            b' ' => {
                temp_col += 1;
                temp_idx += 1;
            }
            b'\t' => {
                let next_col = temp_col + (4 - (temp_col % 4));
                if next_col <= start_col + content_cols {
                    temp_col = next_col;
                    temp_idx += 1;
                } else {
                    break;
                }
            }
            _ => break,
        }
    }
    let content_bytes = temp_idx - start;

    (total_cols, total_bytes, content_bytes, content_cols, has_nonspace)
}

/// Block-quote prefix: (prefix bytes, partially consumed tab, remaining
/// tab columns, column after the marker).
pub(crate) fn blockquote_prefix_info(text: &str) -> Option<(usize, bool, usize, usize)> {
    let bytes = text.as_bytes();
    let mut idx = 0;
    let mut col = 0;

    let mut spaces = 0;
    while idx < bytes.len() && spaces < 3 && bytes[idx] == b' ' {
        idx += 1;
        col += 1;
        spaces += 1;
    }
    if idx < bytes.len() && bytes[idx] == b' ' {
        return None;
    }
    if idx >= bytes.len() || bytes[idx] != b'>' {
        return None;
    }
    idx += 1;
    col += 1;

    let mut partially_consumed_tab = false;
    let mut remaining_tab_cols = 0;
    if idx < bytes.len() {
        match bytes[idx] {
            b' ' => {
                idx += 1;
                col += 1;
            }
            b'\t' => {
                let chars_to_tab = 4 - (col % 4);
                if chars_to_tab > 1 {
                    partially_consumed_tab = true;
                    remaining_tab_cols = chars_to_tab - 1;
                    col += 1;
                } else {
                    idx += 1;
                    col += 1;
                }
            }
            _ => {}
        }
    }

    Some((idx, partially_consumed_tab, remaining_tab_cols, col))
}

pub(crate) fn blockquote_prefix_len(text: &str) -> Option<usize> {
    blockquote_prefix_info(text).map(|(prefix_bytes, _, _, _)| prefix_bytes)
}

#[derive(Clone, Copy, Debug)]
pub(crate) enum HtmlBlockKind {
    Type1(&'static str),
    Type2,
    Type3,
    Type4,
    Type5,
    Type6,
    Type7,
}

struct HtmlTag<'a> {
    name: &'a str,
    after: usize,
    closing: bool,
}

const HTML_BLOCK_TAGS: &[&str] = &[
    "address", "article", "aside", "base", "basefont", "blockquote", "body", "caption", "center",
    "col", "colgroup", "dd", "details", "dialog", "dir", "div", "dl", "dt", "fieldset",
    "figcaption", "figure", "footer", "form", "frame", "frameset", "h1", "h2", "h3", "h4", "h5",
    "h6", "head", "header", "hr", "html", "iframe", "legend", "li", "link", "main", "menu",
    "menuitem", "nav", "noframes", "ol", "optgroup", "option", "p", "param", "search", "section",
    "source", "summary", "table", "tbody", "td", "tfoot", "th", "thead", "title", "tr", "track",
    "ul",
];

pub(crate) fn match_html_block_start(text: &str) -> Option<HtmlBlockKind> {
    let trimmed = strip_indent_up_to(text, 3)?;
    if trimmed.is_empty() {
        return None;
    }

    if let Some(tag) = match_html_type1(trimmed) {
        return Some(HtmlBlockKind::Type1(tag));
    }
    if trimmed.starts_with("<!--") {
        return Some(HtmlBlockKind::Type2);
    }
    if trimmed.starts_with("<?") {
        return Some(HtmlBlockKind::Type3);
    }
    if trimmed.starts_with("<![CDATA[") {
        return Some(HtmlBlockKind::Type5);
    }
    if trimmed.starts_with("<!") {
        let third = trimmed.as_bytes().get(2).copied();
        if matches!(third, Some(b) if b.is_ascii_alphabetic()) {
            return Some(HtmlBlockKind::Type4);
        }
    }
    if match_html_block_tag(trimmed) {
        return Some(HtmlBlockKind::Type6);
    }
    if match_html_any_tag(trimmed) {
        return Some(HtmlBlockKind::Type7);
    }
    None
}

fn parse_html_tag_name(text: &str) -> Option<HtmlTag<'_>> {
    let bytes = text.as_bytes();
    if bytes.first()? != &b'<' {
        return None;
    }
    let mut idx = 1;
    let mut closing = false;
    if idx < bytes.len() && bytes[idx] == b'/' {
        closing = true;
        idx += 1;
    }
    if idx >= bytes.len() || !bytes[idx].is_ascii_alphabetic() {
        return None;
    }
    let start = idx;
    idx += 1;
    while idx < bytes.len() {
        let b = bytes[idx];
        if b.is_ascii_alphanumeric() || b == b'-' {
            idx += 1;
            continue;
        }
        break;
    }
    Some(HtmlTag {
        name: &text[start..idx],
        after: idx,
        closing,
    })
}

fn is_html_tag_boundary(bytes: &[u8], idx: usize) -> bool {
    match bytes.get(idx) {
        None => true,
        Some(b) => b.is_ascii_whitespace() || *b == b'>' || *b == b'/',
    }
}

fn match_html_type1(text: &str) -> Option<&'static str> {
    let tag = parse_html_tag_name(text)?;
    if tag.closing {
        return None;
    }
    if !is_html_tag_boundary(text.as_bytes(), tag.after) {
        return None;
    }
    type1_tag_name(tag.name)
}

fn type1_tag_name(name: &str) -> Option<&'static str> {
    if name.eq_ignore_ascii_case("pre") {
        Some("pre")
    } else if name.eq_ignore_ascii_case("script") {
        Some("script")
    } else if name.eq_ignore_ascii_case("style") {
        Some("style")
    } else if name.eq_ignore_ascii_case("textarea") {
        Some("textarea")
    } else {
        None
    }
}

fn is_type1_tag_name(name: &str) -> bool {
    type1_tag_name(name).is_some()
}

fn match_html_block_tag(text: &str) -> bool {
    let tag = match parse_html_tag_name(text) {
        Some(tag) => tag,
        None => return false,
    };
    if !is_html_tag_boundary(text.as_bytes(), tag.after) {
        return false;
    }
    HTML_BLOCK_TAGS
        .iter()
        .any(|name| tag.name.eq_ignore_ascii_case(name))
}

fn match_html_any_tag(text: &str) -> bool {
    let bytes = text.as_bytes();
    let end = match parse_html_tag_end(bytes) {
        Some(end) => end,
        None => return false,
    };
    if let Some(tag) = parse_html_tag_name(text)
        && is_type1_tag_name(tag.name)
    {
        return false;
    }
    bytes[end + 1..].iter().all(|b| is_space_or_tab(*b))
}

pub(crate) fn is_html_attr_name_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_' || b == b':'
}

pub(crate) fn is_html_attr_name_continue(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'_' | b':' | b'.' | b'-')
}

fn parse_html_tag_end(bytes: &[u8]) -> Option<usize> {
    if bytes.len() < 2 || bytes[0] != b'<' {
        return None;
    }
    let mut i = 1;
    let mut closing = false;
    if bytes.get(i) == Some(&b'/') {
        closing = true;
        i += 1;
    }
    if i >= bytes.len() || !bytes[i].is_ascii_alphabetic() {
        return None;
    }
    i += 1;
    while i < bytes.len() {
        let b = bytes[i];
        if b.is_ascii_alphanumeric() || b == b'-' {
            i += 1;
            continue;
        }
        break;
    }
    if i >= bytes.len() {
        return None;
    }
    if !bytes[i].is_ascii_whitespace()
        && bytes[i] != b'>'
        && !(bytes[i] == b'/' && i + 1 < bytes.len() && bytes[i + 1] == b'>')
    {
        return None;
    }
    if closing {
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        return if i < bytes.len() && bytes[i] == b'>' {
            Some(i)
        } else {
            None
        };
    }
    loop {
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        if i >= bytes.len() {
            return None;
        }
        if bytes[i] == b'>' {
            return Some(i);
        }
        if bytes[i] == b'/' && i + 1 < bytes.len() && bytes[i + 1] == b'>' {
            return Some(i + 1);
        }
        if !is_html_attr_name_start(bytes[i]) {
            return None;
        }
        i += 1;
        while i < bytes.len() && is_html_attr_name_continue(bytes[i]) {
            i += 1;
        }
        let after_name = i;
        let mut ws = i;
        while ws < bytes.len() && bytes[ws].is_ascii_whitespace() {
            ws += 1;
        }
        if ws < bytes.len() && bytes[ws] == b'=' {
            i = ws + 1;
            while i < bytes.len() && bytes[i].is_ascii_whitespace() {
                i += 1;
            }
            if i >= bytes.len() {
                return None;
            }
            let quote = bytes[i];
            if quote == b'"' || quote == b'\'' {
                i += 1;
                while i < bytes.len() && bytes[i] != quote {
                    i += 1;
                }
                if i >= bytes.len() {
                    return None;
                }
                i += 1;
            } else {
                let mut consumed = false;
                while i < bytes.len() {
                    let b = bytes[i];
                    if b.is_ascii_whitespace() || b == b'>' {
                        break;
                    }
                    if b == b'/' && i + 1 < bytes.len() && bytes[i + 1] == b'>' {
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
        if i < bytes.len() {
            let b = bytes[i];
            if !(b.is_ascii_whitespace()
                || b == b'>'
                || (b == b'/' && i + 1 < bytes.len() && bytes[i + 1] == b'>'))
            {
                return None;
            }
        }
    }
}

pub(crate) fn html_block_end(kind: HtmlBlockKind, line: &str) -> bool {
    match kind {
        HtmlBlockKind::Type1(tag) => contains_html_closing_tag(line, tag),
        HtmlBlockKind::Type2 => line.contains("-->"),
        HtmlBlockKind::Type3 => line.contains("?>"),
        HtmlBlockKind::Type4 => line.contains('>'),
        HtmlBlockKind::Type5 => line.contains("]]>"),
        HtmlBlockKind::Type6 | HtmlBlockKind::Type7 => false,
    }
}

fn contains_html_closing_tag(line: &str, tag: &str) -> bool {
    let lower = line.to_ascii_lowercase();
    let needle = format!("</{}", tag);
    let mut search = 0usize;
    while let Some(pos) = lower[search..].find(&needle) {
        let idx = search + pos;
        let rest = &lower[idx + needle.len()..];
        if rest.is_empty() {
            return true;
        }
        let b = rest.as_bytes()[0];
        if b == b'>' || b.is_ascii_whitespace() {
            return true;
        }
        search = idx + needle.len();
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_lines_with_offsets() {
        let lines = split_lines("ab\ncd");
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].text, "ab");
        assert_eq!(lines[0].start, 0);
        assert_eq!(lines[0].end, 2);
        assert!(lines[0].has_newline);
        assert_eq!(lines[1].text, "cd");
        assert!(!lines[1].has_newline);
    }

    #[test]
    fn atx_heading_strips_closing_run() {
        assert_eq!(parse_atx_heading("## foo ##"), Some((2, 3, 6)));
        assert_eq!(parse_atx_heading("# foo#"), Some((1, 2, 6)));
        assert_eq!(parse_atx_heading("####### foo"), None);
        assert_eq!(parse_atx_heading("#hash"), None);
    }

    #[test]
    fn thematic_break_allows_interior_spaces() {
        assert!(is_thematic_break_line(" - - -"));
        assert!(is_thematic_break_line("***"));
        assert!(is_thematic_break_line("___  "));
        assert!(!is_thematic_break_line("--"));
        assert!(!is_thematic_break_line("-*-"));
    }

    #[test]
    fn setext_underline_levels() {
        assert_eq!(setext_underline_level("==="), Some(1));
        assert_eq!(setext_underline_level("  -- "), Some(2));
        assert_eq!(setext_underline_level("= ="), None);
    }

    #[test]
    fn ordered_marker_keeps_start_number() {
        let marker = parse_list_marker("7) rest").unwrap();
        assert!(marker.ordered);
        assert_eq!(marker.start, Some(7));
        assert_eq!(marker.marker, b')');
        assert_eq!(marker.content_indent, 3);
    }

    #[test]
    fn bullet_marker_wide_gap_falls_back() {
        // Five columns of whitespace after the marker: one space belongs
        // to the marker, the rest begins an indented chunk.
        let marker = parse_list_marker("-      code").unwrap();
        assert!(!marker.ordered);
        assert_eq!(marker.content_indent, 2);
    }

    #[test]
    fn blockquote_prefix_handles_partial_tab() {
        let (bytes, partial, remaining, col) = blockquote_prefix_info(">\tfoo").unwrap();
        assert_eq!(bytes, 1);
        assert!(partial);
        assert_eq!(remaining, 2);
        assert_eq!(col, 2);
    }

    #[test]
    fn html_block_kinds() {
        assert!(matches!(
            match_html_block_start("<pre>"),
            Some(HtmlBlockKind::Type1("pre"))
        ));
        assert!(matches!(
            match_html_block_start("<!-- note"),
            Some(HtmlBlockKind::Type2)
        ));
        assert!(matches!(
            match_html_block_start("<div class=\"x\">"),
            Some(HtmlBlockKind::Type6)
        ));
        assert!(matches!(
            match_html_block_start("<custom-tag attr=1>"),
            Some(HtmlBlockKind::Type7)
        ));
        assert!(match_html_block_start("<custom-tag> trailing").is_none());
    }

    #[test]
    fn indent_removal_expands_partial_tabs() {
        assert_eq!(remove_indent_columns("\tfoo", 4), "foo");
        assert_eq!(remove_indent_columns("  \tfoo", 4), "foo");
        assert_eq!(remove_indent_columns("\t\tfoo", 4), "    foo");
    }
}
