use thiserror::Error;

/// The grammar itself is total: any well-formed text parses to a tree.
/// The only failures the entry points surface are input decoding and
/// resource exhaustion; neither produces a partial document.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("input is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),
    #[error("container nesting exceeds the limit of {limit}")]
    NestingTooDeep { limit: usize },
}
