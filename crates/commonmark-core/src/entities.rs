//! Character-reference decoding: named HTML entities plus numeric
//! (decimal and hexadecimal) references, per the CommonMark rules for
//! invalid code points.

use once_cell::sync::Lazy;
use std::collections::HashMap;

static NAMED_ENTITIES: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    let mut map = HashMap::new();
    for (name, value) in ENTITY_TABLE {
        map.insert(*name, *value);
    }
    map
});

pub(crate) fn lookup_named_entity(name: &str) -> Option<&'static str> {
    NAMED_ENTITIES.get(name).copied()
}

/// Decodes the character reference starting at `start` (which must point
/// at `&`). Returns the decoded UTF-8 bytes and the index past the `;`.
pub(crate) fn decode_entity(bytes: &[u8], start: usize, end: usize) -> Option<(Vec<u8>, usize)> {
    if start + 2 >= end {
        return None;
    }
    if bytes[start] != b'&' {
        return None;
    }
    let mut i = start + 1;
    if bytes[i] == b'#' {
        i += 1;
        let mut radix = 10;
        if i < end && (bytes[i] == b'x' || bytes[i] == b'X') {
            radix = 16;
            i += 1;
        }
        let num_start = i;
        while i < end && bytes[i].is_ascii_hexdigit() {
            i += 1;
        }
        if i == num_start || i >= end || bytes[i] != b';' {
            return None;
        }
        let number_str = match std::str::from_utf8(&bytes[num_start..i]) {
            Ok(value) => value,
            Err(_) => return None,
        };
        let max_digits = if radix == 16 { 6 } else { 7 };
        if number_str.len() > max_digits {
            return None;
        }
        let value = u32::from_str_radix(number_str, radix).ok()?;
        // NUL, surrogates and out-of-range values map to U+FFFD.
        let ch = if value == 0 || (0xD800..=0xDFFF).contains(&value) || value > 0x10FFFF {
            '\u{FFFD}'
        } else {
            std::char::from_u32(value).unwrap_or('\u{FFFD}')
        };
        let mut out = [0u8; 4];
        let encoded = ch.encode_utf8(&mut out);
        return Some((encoded.as_bytes().to_vec(), i + 1));
    }
    let name_start = i;
    while i < end && bytes[i].is_ascii_alphanumeric() {
        i += 1;
    }
    if i == name_start || i >= end || bytes[i] != b';' {
        return None;
    }
    let name_str = std::str::from_utf8(&bytes[name_start..i]).ok()?;
    let decoded = lookup_named_entity(name_str)?;
    Some((decoded.as_bytes().to_vec(), i + 1))
}

/// Combined backslash-unescape and entity decode for destinations,
/// titles and info strings. A backslash before ASCII punctuation emits
/// the punctuation literally; a backslash before `&` therefore blocks
/// entity interpretation.
pub(crate) fn unescape_and_decode(text: &str) -> String {
    let bytes = text.as_bytes();
    let mut result = String::new();
    let mut i = 0usize;
    while i < bytes.len() {
        if bytes[i] == b'\\' {
            if i + 1 < bytes.len() {
                let next = bytes[i + 1];
                if next.is_ascii_punctuation() {
                    result.push(next as char);
                    i += 2;
                    continue;
                }
                result.push('\\');
                i += 1;
                continue;
            }
            result.push('\\');
            i += 1;
            continue;
        }
        if bytes[i] == b'&' {
            if let Some((decoded, next)) = decode_entity(bytes, i, bytes.len()) {
                match std::str::from_utf8(&decoded) {
                    Ok(value) => result.push_str(value),
                    Err(_) => result.push_str(&String::from_utf8_lossy(&decoded)),
                }
                i = next;
                continue;
            }
            result.push('&');
            i += 1;
            continue;
        }
        if let Some(ch) = std::str::from_utf8(&bytes[i..])
            .ok()
            .and_then(|s| s.chars().next())
        {
            result.push(ch);
            i += ch.len_utf8();
        } else {
            i += 1;
        }
    }
    result
}

/// Percent-encodes spaces and non-ASCII bytes in a destination.
pub(crate) fn percent_encode_url(url: &str) -> String {
    let mut result = String::new();
    for ch in url.chars() {
        if ch == ' ' {
            result.push_str("%20");
        } else if ch.is_ascii() {
            result.push(ch);
        } else {
            let mut buf = [0u8; 4];
            let encoded = ch.encode_utf8(&mut buf);
            for &byte in encoded.as_bytes() {
                result.push_str(&format!("%{:02X}", byte));
            }
        }
    }
    result
}

pub(crate) fn percent_encode_autolink_url(url: &str) -> String {
    let encoded = percent_encode_url(url);
    let encoded = encoded.replace('\\', "%5C");
    let encoded = encoded.replace('[', "%5B");
    encoded.replace(']', "%5D")
}

const ENTITY_TABLE: &[(&str, &str)] = &[
    ("AElig", "Æ"),
    ("AMP", "&"),
    ("Aacute", "Á"),
    ("Acirc", "Â"),
    ("Agrave", "À"),
    ("Aring", "Å"),
    ("Atilde", "Ã"),
    ("Auml", "Ä"),
    ("Ccedil", "Ç"),
    ("ClockwiseContourIntegral", "∲"),
    ("Dagger", "‡"),
    ("Dcaron", "Ď"),
    ("Delta", "Δ"),
    ("DifferentialD", "ⅆ"),
    ("ETH", "Ð"),
    ("Eacute", "É"),
    ("Ecirc", "Ê"),
    ("Egrave", "È"),
    ("Euml", "Ë"),
    ("GT", ">"),
    ("Gamma", "Γ"),
    ("HilbertSpace", "ℋ"),
    ("Iacute", "Í"),
    ("Icirc", "Î"),
    ("Igrave", "Ì"),
    ("Iuml", "Ï"),
    ("LT", "<"),
    ("Lambda", "Λ"),
    ("Ntilde", "Ñ"),
    ("Oacute", "Ó"),
    ("Ocirc", "Ô"),
    ("Ograve", "Ò"),
    ("Omega", "Ω"),
    ("Oslash", "Ø"),
    ("Otilde", "Õ"),
    ("Ouml", "Ö"),
    ("Phi", "Φ"),
    ("Pi", "Π"),
    ("Prime", "″"),
    ("Psi", "Ψ"),
    ("QUOT", "\""),
    ("Sigma", "Σ"),
    ("THORN", "Þ"),
    ("Theta", "Θ"),
    ("Uacute", "Ú"),
    ("Ucirc", "Û"),
    ("Ugrave", "Ù"),
    ("Uuml", "Ü"),
    ("Xi", "Ξ"),
    ("Yacute", "Ý"),
    ("aacute", "á"),
    ("acirc", "â"),
    ("acute", "´"),
    ("aelig", "æ"),
    ("agrave", "à"),
    ("alefsym", "ℵ"),
    ("alpha", "α"),
    ("amp", "&"),
    ("and", "∧"),
    ("ang", "∠"),
    ("apos", "'"),
    ("aring", "å"),
    ("asymp", "≈"),
    ("atilde", "ã"),
    ("auml", "ä"),
    ("bdquo", "„"),
    ("beta", "β"),
    ("brvbar", "¦"),
    ("bull", "•"),
    ("cap", "∩"),
    ("ccedil", "ç"),
    ("cedil", "¸"),
    ("cent", "¢"),
    ("chi", "χ"),
    ("cong", "≅"),
    ("copy", "©"),
    ("crarr", "↵"),
    ("cup", "∪"),
    ("curren", "¤"),
    ("dagger", "†"),
    ("darr", "↓"),
    ("deg", "°"),
    ("delta", "δ"),
    ("divide", "÷"),
    ("eacute", "é"),
    ("ecirc", "ê"),
    ("egrave", "è"),
    ("empty", "∅"),
    ("emsp", "\u{2003}"),
    ("ensp", "\u{2002}"),
    ("epsilon", "ε"),
    ("equiv", "≡"),
    ("eta", "η"),
    ("eth", "ð"),
    ("euml", "ë"),
    ("euro", "€"),
    ("exist", "∃"),
    ("forall", "∀"),
    ("frac12", "½"),
    ("frac14", "¼"),
    ("frac34", "¾"),
    ("frasl", "⁄"),
    ("gamma", "γ"),
    ("ge", "≥"),
    ("gt", ">"),
    ("harr", "↔"),
    ("hellip", "…"),
    ("iacute", "í"),
    ("icirc", "î"),
    ("iexcl", "¡"),
    ("igrave", "ì"),
    ("infin", "∞"),
    ("int", "∫"),
    ("iota", "ι"),
    ("iquest", "¿"),
    ("isin", "∈"),
    ("iuml", "ï"),
    ("kappa", "κ"),
    ("lambda", "λ"),
    ("laquo", "«"),
    ("larr", "←"),
    ("ldquo", "“"),
    ("le", "≤"),
    ("lowast", "∗"),
    ("lrm", "\u{200E}"),
    ("lsaquo", "‹"),
    ("lsquo", "‘"),
    ("lt", "<"),
    ("macr", "¯"),
    ("mdash", "—"),
    ("micro", "µ"),
    ("middot", "·"),
    ("minus", "−"),
    ("mu", "μ"),
    ("nabla", "∇"),
    ("nbsp", "\u{00A0}"),
    ("ndash", "–"),
    ("ne", "≠"),
    ("ngE", "≧̸"),
    ("ni", "∋"),
    ("not", "¬"),
    ("notin", "∉"),
    ("nsub", "⊄"),
    ("ntilde", "ñ"),
    ("nu", "ν"),
    ("oacute", "ó"),
    ("ocirc", "ô"),
    ("oelig", "œ"),
    ("ograve", "ò"),
    ("oline", "‾"),
    ("omega", "ω"),
    ("oplus", "⊕"),
    ("or", "∨"),
    ("ordf", "ª"),
    ("ordm", "º"),
    ("oslash", "ø"),
    ("otilde", "õ"),
    ("otimes", "⊗"),
    ("ouml", "ö"),
    ("para", "¶"),
    ("part", "∂"),
    ("permil", "‰"),
    ("perp", "⊥"),
    ("phi", "φ"),
    ("pi", "π"),
    ("plusmn", "±"),
    ("pound", "£"),
    ("prime", "′"),
    ("prod", "∏"),
    ("prop", "∝"),
    ("psi", "ψ"),
    ("quot", "\""),
    ("radic", "√"),
    ("raquo", "»"),
    ("rarr", "→"),
    ("rdquo", "”"),
    ("reg", "®"),
    ("rho", "ρ"),
    ("rlm", "\u{200F}"),
    ("rsaquo", "›"),
    ("rsquo", "’"),
    ("sbquo", "‚"),
    ("sdot", "⋅"),
    ("sect", "§"),
    ("shy", "\u{00AD}"),
    ("sigma", "σ"),
    ("sim", "∼"),
    ("sub", "⊂"),
    ("sube", "⊆"),
    ("sum", "∑"),
    ("sup", "⊃"),
    ("sup1", "¹"),
    ("sup2", "²"),
    ("sup3", "³"),
    ("supe", "⊇"),
    ("szlig", "ß"),
    ("tau", "τ"),
    ("there4", "∴"),
    ("theta", "θ"),
    ("thinsp", "\u{2009}"),
    ("thorn", "þ"),
    ("tilde", "˜"),
    ("times", "×"),
    ("trade", "™"),
    ("uacute", "ú"),
    ("uarr", "↑"),
    ("ucirc", "û"),
    ("ugrave", "ù"),
    ("uml", "¨"),
    ("upsilon", "υ"),
    ("uuml", "ü"),
    ("weierp", "℘"),
    ("xi", "ξ"),
    ("yacute", "ý"),
    ("yen", "¥"),
    ("yuml", "ÿ"),
    ("zeta", "ζ"),
    ("zwj", "\u{200D}"),
    ("zwnj", "\u{200C}"),
];

#[cfg(test)]
mod tests {
    use super::{decode_entity, percent_encode_url, unescape_and_decode};

    #[test]
    fn named_entities_decode() {
        let input = b"&amp;rest";
        let (decoded, next) = decode_entity(input, 0, input.len()).unwrap();
        assert_eq!(decoded, b"&");
        assert_eq!(next, 5);
        assert!(decode_entity(b"&bogus;", 0, 7).is_none());
        assert!(decode_entity(b"&amp", 0, 4).is_none());
    }

    #[test]
    fn numeric_references_decode() {
        let input = b"&#35;";
        let (decoded, _) = decode_entity(input, 0, input.len()).unwrap();
        assert_eq!(decoded, b"#");
        let input = b"&#x22;";
        let (decoded, _) = decode_entity(input, 0, input.len()).unwrap();
        assert_eq!(decoded, b"\"");
    }

    #[test]
    fn invalid_codepoints_become_replacement() {
        let input = b"&#0;";
        let (decoded, _) = decode_entity(input, 0, input.len()).unwrap();
        assert_eq!(String::from_utf8(decoded).unwrap(), "\u{FFFD}");
        assert!(decode_entity(b"&#99999999;", 0, 11).is_none());
    }

    #[test]
    fn backslash_blocks_entity() {
        assert_eq!(unescape_and_decode("\\&amp;"), "&amp;");
        assert_eq!(unescape_and_decode("&amp;"), "&");
        assert_eq!(unescape_and_decode("\\*literal\\q"), "*literal\\q");
    }

    #[test]
    fn url_encoding_covers_non_ascii() {
        assert_eq!(percent_encode_url("foo bar"), "foo%20bar");
        assert_eq!(percent_encode_url("föö"), "f%C3%B6%C3%B6");
    }
}
