use commonmark_core::{BlockKind, InlineKind, ListStyle, emit_html, parse};
use pretty_assertions::assert_eq;

#[test]
fn ordered_list_with_nested_bullets() {
    let result = parse("1. one\n1. two\n   - nested 1\n   - nested 2").expect("parse");
    let blocks = &result.document.blocks;
    assert_eq!(blocks.len(), 1);
    let BlockKind::List(list) = &blocks[0].kind else {
        panic!("expected ordered list");
    };
    assert_eq!(list.style, ListStyle::Ordered { start: 1 });
    assert!(list.tight);
    assert_eq!(list.items.len(), 2);

    let second = &list.items[1];
    assert_eq!(second.blocks.len(), 2);
    let BlockKind::Paragraph { content } = &second.blocks[0].kind else {
        panic!("expected paragraph in second item");
    };
    assert_eq!(content[0].kind, InlineKind::Text("two".to_string()));
    let BlockKind::List(nested) = &second.blocks[1].kind else {
        panic!("expected nested list");
    };
    assert_eq!(nested.style, ListStyle::Bullet);
    assert!(nested.tight);
    assert_eq!(nested.items.len(), 2);
}

#[test]
fn blank_line_between_items_loosens_the_list() {
    let result = parse("- a\n\n- b").expect("parse");
    let BlockKind::List(list) = &result.document.blocks[0].kind else {
        panic!("expected list");
    };
    assert!(!list.tight);
}

#[test]
fn blank_line_inside_item_loosens_the_list() {
    let result = parse("- a\n\n  continued\n- b").expect("parse");
    let BlockKind::List(list) = &result.document.blocks[0].kind else {
        panic!("expected list");
    };
    assert!(!list.tight);
    assert_eq!(list.items.len(), 2);
    assert_eq!(list.items[0].blocks.len(), 2);
}

#[test]
fn list_item_with_two_tabs_holds_indented_code() {
    // "-\t\tfoo" puts the content at column 8: one column of marker
    // padding, then an indented code block reading "  foo".
    let html = emit_html(&parse("-\t\tfoo\n").expect("parse").document);
    assert_eq!(
        html,
        "<ul>\n<li>\n<pre><code>  foo\n</code></pre>\n</li>\n</ul>\n"
    );
}

#[test]
fn marker_change_starts_a_new_list() {
    let result = parse("- a\n- b\n* c").expect("parse");
    assert_eq!(result.document.blocks.len(), 2);
    for block in &result.document.blocks {
        let BlockKind::List(list) = &block.kind else {
            panic!("expected list");
        };
        assert!(list.tight);
    }
}

#[test]
fn empty_marker_item_is_allowed() {
    let result = parse("- foo\n-\n- bar").expect("parse");
    let BlockKind::List(list) = &result.document.blocks[0].kind else {
        panic!("expected list");
    };
    assert_eq!(list.items.len(), 3);
    assert!(list.items[1].blocks.is_empty());
}
