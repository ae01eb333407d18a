use serde::{Deserialize, Serialize};
use wasm_bindgen::prelude::*;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RenderOptions {
    smart: Option<bool>,
    source_position: Option<bool>,
    hard_breaks: Option<bool>,
    no_breaks: Option<bool>,
    unsafe_html: Option<bool>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RenderResult {
    html: String,
    source_map: Vec<JsRange>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct JsRange {
    start_line: usize,
    start_col: usize,
    end_line: usize,
    end_col: usize,
}

#[wasm_bindgen]
pub fn render_html(source: &str) -> Result<JsValue, JsValue> {
    render_html_with_options(source, JsValue::UNDEFINED)
}

#[wasm_bindgen]
pub fn render_html_with_options(source: &str, options: JsValue) -> Result<JsValue, JsValue> {
    let (parse_options, html_options) = options_from_js(options)?;
    let result = commonmark_core::parse_with_options(source, &parse_options)
        .map_err(|err| JsValue::from_str(&err.to_string()))?;

    let html = commonmark_core::emit_html_with_options(
        &result.document,
        &html_options,
        Some(&result.source_map),
    );

    let mut source_map = Vec::new();
    collect_block_ranges(&result.document.blocks, &result.source_map, &mut source_map);

    let rendered = RenderResult { html, source_map };
    serde_wasm_bindgen::to_value(&rendered).map_err(|err| JsValue::from_str(&err.to_string()))
}

#[wasm_bindgen]
pub fn render_commonmark(source: &str) -> Result<String, JsValue> {
    let result = commonmark_core::parse(source).map_err(|err| JsValue::from_str(&err.to_string()))?;
    Ok(commonmark_core::emit_commonmark(&result.document))
}

fn options_from_js(
    value: JsValue,
) -> Result<(commonmark_core::ParseOptions, commonmark_core::HtmlOptions), JsValue> {
    let mut parse_options = commonmark_core::ParseOptions::default();
    let mut html_options = commonmark_core::HtmlOptions::default();
    if value.is_null() || value.is_undefined() {
        return Ok((parse_options, html_options));
    }
    let parsed: RenderOptions =
        serde_wasm_bindgen::from_value(value).map_err(|err| JsValue::from_str(&err.to_string()))?;
    if let Some(smart) = parsed.smart {
        parse_options.smart = smart;
    }
    if let Some(source_position) = parsed.source_position {
        html_options.source_position = source_position;
    }
    if let Some(hard_breaks) = parsed.hard_breaks {
        html_options.hard_breaks = hard_breaks;
    }
    if let Some(no_breaks) = parsed.no_breaks {
        html_options.no_breaks = no_breaks;
    }
    if let Some(unsafe_html) = parsed.unsafe_html {
        html_options.unsafe_html = unsafe_html;
    }
    Ok((parse_options, html_options))
}

fn collect_block_ranges(
    blocks: &[commonmark_core::Block],
    source_map: &commonmark_core::SourceMap,
    out: &mut Vec<JsRange>,
) {
    for block in blocks {
        let range = source_map.range(block.span);
        out.push(JsRange {
            start_line: range.start.line,
            start_col: range.start.character,
            end_line: range.end.line,
            end_col: range.end.character,
        });
        match &block.kind {
            commonmark_core::BlockKind::BlockQuote { blocks } => {
                collect_block_ranges(blocks, source_map, out);
            }
            commonmark_core::BlockKind::List(list) => {
                for item in &list.items {
                    collect_block_ranges(&item.blocks, source_map, out);
                }
            }
            _ => {}
        }
    }
}
