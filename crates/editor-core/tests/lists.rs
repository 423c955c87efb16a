use edital_editor_core::{
    Document, EditError, Editor, Node, NodeKind, PluginRegistry, Point, Selection, serialize_html,
};
use serde_json::json;

fn editor_with(children: Vec<Node>) -> Editor {
    Editor::new(
        Document::new(children),
        Selection::collapsed(Point::new(vec![0, 0], 0)),
        PluginRegistry::richtext(),
    )
}

fn html(editor: &Editor) -> String {
    serialize_html(editor.doc(), editor.registry())
}

fn bullet_list(items: &[&str]) -> Node {
    Node::element(
        NodeKind::BulletList,
        items
            .iter()
            .map(|text| Node::element(NodeKind::ListItem, vec![Node::paragraph(*text)]))
            .collect(),
    )
}

#[test]
fn toggle_wraps_then_unwraps() {
    let mut editor = editor_with(vec![Node::paragraph("a"), Node::paragraph("b")]);
    editor.set_selection(Selection::new(Point::new(vec![0, 0], 0), Point::new(vec![1, 0], 1)));

    editor.run_command("list.toggle_bullet", None).unwrap();
    assert_eq!(
        html(&editor),
        r#"<ul data-list-type="disc" style="list-style-type: disc"><li>a</li><li>b</li></ul>"#
    );
    assert_eq!(editor.selection().focus, Point::new(vec![0, 1, 0, 0], 1));

    editor.run_command("list.toggle_bullet", None).unwrap();
    assert_eq!(html(&editor), "<p>a</p><p>b</p>");
    assert_eq!(editor.selection().focus, Point::new(vec![1, 0], 1));
}

#[test]
fn toggling_the_other_kind_switches_the_list() {
    let mut editor = editor_with(vec![bullet_list(&["a", "b"])]);
    editor.set_selection(Selection::collapsed(Point::new(vec![0, 1, 0, 0], 0)));

    editor.run_command("list.toggle_ordered", None).unwrap();
    assert_eq!(
        html(&editor),
        r#"<ol data-list-type="decimal" style="list-style-type: decimal"><li>a</li><li>b</li></ol>"#
    );
    let active = editor.run_query_json("list.active", None).unwrap();
    assert_eq!(active["style"], json!("decimal"));
}

#[test]
fn lift_splits_the_list_around_the_item() {
    let mut editor = editor_with(vec![bullet_list(&["a", "b", "c"])]);
    editor.set_selection(Selection::collapsed(Point::new(vec![0, 1, 0, 0], 1)));

    editor.run_command("list.lift", None).unwrap();
    let disc = r#"data-list-type="disc" style="list-style-type: disc""#;
    assert_eq!(html(&editor), format!("<ul {disc}><li>a</li></ul><p>b</p><ul {disc}><li>c</li></ul>"));
    assert_eq!(editor.selection().focus, Point::new(vec![1, 0], 1));
    assert!(!editor.can_run_command("list.lift", None));
}

#[test]
fn set_style_updates_the_surrounding_list() {
    let mut editor = editor_with(vec![bullet_list(&["a"])]);
    editor.set_selection(Selection::collapsed(Point::new(vec![0, 0, 0, 0], 0)));

    editor
        .run_command("list.set_bullet_style", Some(json!({ "style": "circle" })))
        .unwrap();
    assert_eq!(
        html(&editor),
        r#"<ul data-list-type="circle" style="list-style-type: circle"><li>a</li></ul>"#
    );

    // Back to the default drops the stored value.
    editor
        .run_command("list.set_bullet_style", Some(json!({ "style": "disc" })))
        .unwrap();
    let Some(Node::Element(list)) = editor.doc().children.first() else {
        panic!("Expected list");
    };
    assert!(list.attrs.get("list_style").is_none());
}

#[test]
fn set_style_rejects_bad_values_and_missing_lists() {
    let mut editor = editor_with(vec![bullet_list(&["a"]), Node::paragraph("b")]);
    editor.set_selection(Selection::collapsed(Point::new(vec![0, 0, 0, 0], 0)));

    let err = editor
        .run_command("list.set_bullet_style", Some(json!({ "style": "lower-roman" })))
        .unwrap_err();
    assert!(matches!(err, EditError::Validation(_)));

    editor.set_selection(Selection::collapsed(Point::new(vec![1, 0], 0)));
    let err = editor
        .run_command("list.set_ordered_style", Some(json!({ "style": "upper-alpha" })))
        .unwrap_err();
    assert!(matches!(err, EditError::Structural(_)));

    let err = editor
        .run_command("list.toggle_ordered", Some(json!({ "style": "square" })))
        .unwrap_err();
    assert!(matches!(err, EditError::Validation(_)));
    assert_eq!(editor.version(), 0);
}

#[test]
fn ordered_toggle_with_style_inside_same_kind_only_restyles() {
    let list = Node::element(
        NodeKind::OrderedList,
        vec![Node::element(NodeKind::ListItem, vec![Node::paragraph("a")])],
    );
    let mut editor = editor_with(vec![list]);
    editor.set_selection(Selection::collapsed(Point::new(vec![0, 0, 0, 0], 0)));

    editor
        .run_command("list.toggle_ordered", Some(json!({ "style": "upper-roman" })))
        .unwrap();
    assert_eq!(
        html(&editor),
        r#"<ol data-list-type="upper-roman" style="list-style-type: upper-roman"><li>a</li></ol>"#
    );
}

#[test]
fn stray_list_items_are_wrapped_on_load() {
    let editor = editor_with(vec![Node::element(NodeKind::ListItem, vec![Node::paragraph("x")])]);
    let Some(Node::Element(list)) = editor.doc().children.first() else {
        panic!("Expected list");
    };
    assert_eq!(list.kind, NodeKind::BulletList);
}

#[test]
fn toggle_wraps_only_the_selected_middle_blocks() {
    let mut editor = editor_with(vec![
        Node::paragraph("a"),
        Node::paragraph("b"),
        Node::paragraph("c"),
        Node::paragraph("d"),
    ]);
    editor.set_selection(Selection::new(Point::new(vec![1, 0], 0), Point::new(vec![2, 0], 1)));

    editor.run_command("list.toggle_ordered", None).unwrap();
    assert_eq!(
        html(&editor),
        r#"<p>a</p><ol data-list-type="decimal" style="list-style-type: decimal"><li>b</li><li>c</li></ol><p>d</p>"#
    );
    assert_eq!(editor.selection().anchor, Point::new(vec![1, 0, 0, 0], 0));
    assert_eq!(editor.selection().focus, Point::new(vec![1, 1, 0, 0], 1));
}
