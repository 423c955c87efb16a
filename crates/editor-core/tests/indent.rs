use edital_editor_core::{
    Document, ElementNode, Editor, Node, NodeKind, PluginRegistry, Point, Selection, serialize_html,
};
use serde_json::Value;

fn editor_with(children: Vec<Node>) -> Editor {
    Editor::new(
        Document::new(children),
        Selection::collapsed(Point::new(vec![0, 0], 0)),
        PluginRegistry::richtext(),
    )
}

fn indent_at(editor: &Editor, ix: usize) -> u64 {
    match editor.doc().children.get(ix) {
        Some(Node::Element(el)) => el.attr_u64("indent").unwrap_or(0),
        other => panic!("Expected block at {ix}, got {other:?}"),
    }
}

#[test]
fn indent_steps_by_thirty_and_stops_at_max() {
    let mut editor = editor_with(vec![Node::paragraph("a")]);

    for step in 1..=10u64 {
        editor.run_command("block.indent", None).unwrap();
        assert_eq!(indent_at(&editor, 0), step * 30);
    }
    assert!(!editor.can_run_command("block.indent", None));

    let version = editor.version();
    editor.run_command("block.indent", None).unwrap();
    assert_eq!(indent_at(&editor, 0), 300);
    assert_eq!(editor.version(), version);
    assert_eq!(
        serialize_html(editor.doc(), editor.registry()),
        r#"<p style="margin-left: 300px">a</p>"#
    );
}

#[test]
fn outdent_at_zero_is_a_no_op() {
    let mut editor = editor_with(vec![Node::paragraph("a")]);
    assert!(!editor.can_run_command("block.outdent", None));
    editor.run_command("block.outdent", None).unwrap();
    assert_eq!(editor.version(), 0);
    assert!(!editor.can_undo());
}

#[test]
fn outdent_back_to_zero_drops_the_attribute() {
    let p = ElementNode::new(NodeKind::Paragraph, vec![Node::text("a")]).with_attr("indent", Value::from(30u64));
    let mut editor = editor_with(vec![Node::Element(p)]);

    editor.run_command("block.outdent", None).unwrap();
    let Some(Node::Element(p)) = editor.doc().children.first() else {
        panic!("Expected paragraph");
    };
    assert!(p.attrs.get("indent").is_none());
    assert_eq!(serialize_html(editor.doc(), editor.registry()), "<p>a</p>");
}

#[test]
fn indent_applies_to_every_selected_block() {
    let at_max = ElementNode::new(NodeKind::Paragraph, vec![Node::text("b")]).with_attr("indent", Value::from(300u64));
    let mut editor = editor_with(vec![
        Node::paragraph("a"),
        Node::Element(at_max),
        Node::element(NodeKind::Heading, vec![Node::text("c")]),
    ]);
    editor.set_selection(Selection::new(Point::new(vec![0, 0], 0), Point::new(vec![2, 0], 1)));

    editor.run_command("block.indent", None).unwrap();
    assert_eq!(indent_at(&editor, 0), 30);
    assert_eq!(indent_at(&editor, 1), 300);
    assert_eq!(indent_at(&editor, 2), 30);
    assert_eq!(editor.run_query::<u64>("block.indent_level", None).unwrap(), 30);
}

#[test]
fn indent_reaches_paragraphs_inside_list_items() {
    let list = Node::element(
        NodeKind::BulletList,
        vec![Node::element(NodeKind::ListItem, vec![Node::paragraph("x")])],
    );
    let mut editor = editor_with(vec![list]);
    editor.set_selection(Selection::collapsed(Point::new(vec![0, 0, 0, 0], 0)));

    editor.run_command("block.indent", None).unwrap();
    let html = serialize_html(editor.doc(), editor.registry());
    assert!(html.contains("margin-left: 30px"), "{html}");
}
