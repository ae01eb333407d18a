use commonmark_core::{
    HtmlOptions, emit_html, emit_html_sanitized, emit_html_with_options, parse,
};
use pretty_assertions::assert_eq;

fn render(source: &str, options: &HtmlOptions) -> String {
    let result = parse(source).expect("parse");
    emit_html_with_options(&result.document, options, Some(&result.source_map))
}

#[test]
fn soft_breaks_follow_break_options() {
    let source = "line one\nline two";
    assert_eq!(
        render(source, &HtmlOptions::default()),
        "<p>line one\nline two</p>\n"
    );
    assert_eq!(
        render(
            source,
            &HtmlOptions {
                hard_breaks: true,
                ..Default::default()
            }
        ),
        "<p>line one<br />\nline two</p>\n"
    );
    assert_eq!(
        render(
            source,
            &HtmlOptions {
                no_breaks: true,
                ..Default::default()
            }
        ),
        "<p>line one line two</p>\n"
    );
}

#[test]
fn source_positions_are_one_based() {
    let options = HtmlOptions {
        source_position: true,
        ..Default::default()
    };
    assert_eq!(
        render("hello", &options),
        "<p data-sourcepos=\"1:1-1:5\">hello</p>\n"
    );
    assert_eq!(
        render("# one\n\ntwo", &options),
        "<h1 data-sourcepos=\"1:1-1:5\">one</h1>\n<p data-sourcepos=\"3:1-3:3\">two</p>\n"
    );
}

#[test]
fn unsafe_mode_passes_raw_html_through() {
    let source = "<div>\nraw\n</div>\n\nafter";
    assert_eq!(
        render(source, &HtmlOptions::default()),
        "<!-- raw HTML omitted -->\n<p>after</p>\n"
    );
    assert_eq!(
        render(
            source,
            &HtmlOptions {
                unsafe_html: true,
                ..Default::default()
            }
        ),
        "<div>\nraw\n</div>\n<p>after</p>\n"
    );
}

#[test]
fn unsafe_mode_keeps_dangerous_schemes() {
    let source = "[x](javascript:alert(1))";
    assert_eq!(
        render(source, &HtmlOptions::default()),
        "<p><a href=\"\">x</a></p>\n"
    );
    assert_eq!(
        render(
            source,
            &HtmlOptions {
                unsafe_html: true,
                ..Default::default()
            }
        ),
        "<p><a href=\"javascript:alert(1)\">x</a></p>\n"
    );
}

#[test]
fn data_image_urls_survive_safe_mode() {
    assert_eq!(
        render("![p](data:image/png;base64,AAAA)", &HtmlOptions::default()),
        "<p><img src=\"data:image/png;base64,AAAA\" alt=\"p\" /></p>\n"
    );
    assert_eq!(
        render("![p](data:text/html,x)", &HtmlOptions::default()),
        "<p><img src=\"\" alt=\"p\" /></p>\n"
    );
}

#[test]
fn sanitized_output_keeps_rendered_structure() {
    let result = parse("# Title\n\nSome *em* and [a link](https://example.com).").expect("parse");
    let sanitized = emit_html_sanitized(&result.document);
    assert!(sanitized.contains("<h1>Title</h1>"));
    assert!(sanitized.contains("<em>em</em>"));
    assert!(sanitized.contains("<a href=\"https://example.com\">a link</a>"));
    assert_eq!(sanitized, emit_html(&result.document));
}
