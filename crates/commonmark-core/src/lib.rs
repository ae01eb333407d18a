mod ast;
mod commonmark;
mod emit;
mod entities;
mod error;
mod inline;
mod label;
mod parser;
mod scanner;
mod smart;
mod source_map;
mod span;

pub use ast::{
    Block, BlockKind, CodeBlock, CodeBlockKind, Document, Inline, InlineKind, InlineSeq,
    LinkDefinition, List, ListItem, ListStyle,
};
pub use commonmark::emit_commonmark;
pub use emit::{HtmlOptions, emit_html, emit_html_sanitized, emit_html_with_options};
pub use error::ParseError;
pub use parser::{ParseOptions, ParseResult, Utf8Policy, parse, parse_bytes, parse_with_options};
pub use source_map::{Position, Range, SourceMap};
pub use span::Span;
