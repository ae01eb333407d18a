//! Link-label normalization: case folding plus whitespace collapsing, so
//! that `[Foo  Bar]` and `[foo bar]` address the same definition.

pub(crate) fn normalize_link_label(bytes: &[u8]) -> String {
    let mut out = Vec::new();
    let mut escaped = false;
    let mut last_space = false;
    for (idx, &b) in bytes.iter().enumerate() {
        if escaped {
            let lowered = if b.is_ascii_uppercase() {
                b.to_ascii_lowercase()
            } else {
                b
            };
            out.push(lowered);
            escaped = false;
            last_space = false;
            continue;
        }
        if b == b'\\' {
            if idx + 1 < bytes.len() && is_label_escape(bytes[idx + 1]) {
                escaped = true;
                continue;
            }
            out.push(b'\\');
            last_space = false;
            continue;
        }
        if b.is_ascii_whitespace() {
            if !out.is_empty() && !last_space {
                out.push(b' ');
                last_space = true;
            }
            continue;
        }
        last_space = false;
        let lowered = if b.is_ascii_uppercase() {
            b.to_ascii_lowercase()
        } else {
            b
        };
        out.push(lowered);
    }
    if escaped {
        out.push(b'\\');
    }
    if out.last() == Some(&b' ') {
        out.pop();
    }
    let normalized = match String::from_utf8(out) {
        Ok(value) => value,
        Err(err) => String::from_utf8_lossy(&err.into_bytes()).to_string(),
    };
    let lowered = normalized.to_lowercase();
    lowered.replace('ß', "ss").replace('ẞ', "ss")
}

pub(crate) fn is_label_escape(byte: u8) -> bool {
    byte == b'[' || byte == b']' || byte == b'\\'
}

#[cfg(test)]
mod tests {
    use super::normalize_link_label;

    #[test]
    fn folds_case_and_collapses_whitespace() {
        assert_eq!(normalize_link_label(b"Foo\t  Bar "), "foo bar");
        assert_eq!(normalize_link_label("ΑΓΩ".as_bytes()), "αγω");
    }

    #[test]
    fn eszett_folds_to_ss() {
        assert_eq!(normalize_link_label("ẞ".as_bytes()), "ss");
    }

    #[test]
    fn escaped_brackets_stay_distinct() {
        assert_eq!(normalize_link_label(b"a\\]b"), "a]b");
    }
}
