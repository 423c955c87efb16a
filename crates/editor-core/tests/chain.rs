use std::sync::{Arc, Mutex};

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

fn record_sources(editor: &mut Editor) -> Arc<Mutex<Vec<Option<String>>>> {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    editor.subscribe(move |event| sink.lock().unwrap().push(event.source.clone()));
    events
}

#[test]
fn failing_step_aborts_the_whole_chain() {
    let mut editor = editor_with(vec![Node::paragraph("hello")]);
    editor.set_selection(Selection::new(Point::new(vec![0, 0], 0), Point::new(vec![0, 0], 5)));
    let events = record_sources(&mut editor);
    let html_before = serialize_html(editor.doc(), editor.registry());
    let doc_before = editor.doc().clone();

    let chain = editor
        .chain()
        .command("marks.toggle_bold", None)
        .command("table.delete_row", None);
    assert!(!chain.can_run(&editor));

    let err = editor.run_chain(&chain).unwrap_err();
    assert!(matches!(err, EditError::Structural(_)));
    assert_eq!(editor.doc(), &doc_before);
    assert_eq!(serialize_html(editor.doc(), editor.registry()), html_before);
    assert_eq!(editor.version(), 0);
    assert!(events.lock().unwrap().is_empty());
}

#[test]
fn chain_commits_as_one_undoable_step() {
    let mut editor = editor_with(vec![Node::paragraph("title")]);
    let events = record_sources(&mut editor);

    let chain = editor
        .chain()
        .command("block.set_heading", Some(json!({ "level": 2 })))
        .command("block.set_align", Some(json!({ "align": "center" })));
    editor.run_chain(&chain).unwrap();

    assert_eq!(
        events.lock().unwrap().as_slice(),
        [Some("chain:block.set_heading+block.set_align".to_string())]
    );
    assert_eq!(
        serialize_html(editor.doc(), editor.registry()),
        r#"<h2 style="text-align: center">title</h2>"#
    );

    assert!(editor.undo());
    assert_eq!(serialize_html(editor.doc(), editor.registry()), "<p>title</p>");
}

#[test]
fn later_steps_see_earlier_results() {
    let mut editor = editor_with(vec![Node::paragraph("a")]);
    let chain = editor
        .chain()
        .command("table.insert", Some(json!({ "rows": 1, "cols": 1 })))
        .command("table.insert_row_below", None);
    editor.run_chain(&chain).unwrap();

    let Some(Node::Element(table)) = editor.doc().children.get(1) else {
        panic!("Expected table after first paragraph");
    };
    assert_eq!(table.kind, NodeKind::Table);
    assert_eq!(table.children.len(), 2);
}

#[test]
fn styled_list_toggle_is_one_transaction() {
    let mut editor = editor_with(vec![Node::paragraph("a"), Node::paragraph("b")]);
    editor.set_selection(Selection::new(Point::new(vec![0, 0], 0), Point::new(vec![1, 0], 1)));
    let events = record_sources(&mut editor);

    editor
        .run_command("list.toggle_bullet", Some(json!({ "style": "square" })))
        .unwrap();

    assert_eq!(
        events.lock().unwrap().as_slice(),
        [Some("chain:list.toggle_bullet+list.set_bullet_style".to_string())]
    );
    assert_eq!(editor.doc().children.len(), 1);
    let Some(Node::Element(list)) = editor.doc().children.first() else {
        panic!("Expected list");
    };
    assert_eq!(list.kind, NodeKind::BulletList);
    assert_eq!(list.children.len(), 2);
    assert_eq!(list.attr_str("list_style"), Some("square"));
    assert_eq!(
        serialize_html(editor.doc(), editor.registry()),
        r#"<ul data-list-type="square" style="list-style-type: square"><li>a</li><li>b</li></ul>"#
    );

    assert!(editor.undo());
    assert_eq!(editor.doc().children.len(), 2);
}

#[test]
fn read_only_chain_is_rejected() {
    let mut editor = editor_with(vec![Node::paragraph("a")]);
    editor.set_read_only(true);
    let chain = editor.chain().command("block.indent", None);
    assert_eq!(editor.run_chain(&chain).unwrap_err(), EditError::ReadOnly);
}
