use std::sync::{Arc, Mutex};

use edital_editor_core::{Document, Editor, EditorConfig, Node, PluginRegistry, Point, Selection, serialize_html};
use serde_json::json;

fn editor_with(text: &str) -> Editor {
    Editor::new(
        Document::new(vec![Node::paragraph(text)]),
        Selection::collapsed(Point::new(vec![0, 0], text.len())),
        PluginRegistry::richtext(),
    )
}

fn html(editor: &Editor) -> String {
    serialize_html(editor.doc(), editor.registry())
}

fn type_text(editor: &mut Editor, text: &str) {
    editor
        .run_command("core.insert_text", Some(json!({ "text": text })))
        .unwrap();
}

#[test]
fn undo_and_redo_restore_document_and_selection() {
    let mut editor = editor_with("ab");
    let sources = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&sources);
    editor.subscribe(move |event| sink.lock().unwrap().push(event.source.clone()));

    type_text(&mut editor, "c");
    assert_eq!(html(&editor), "<p>abc</p>");
    assert_eq!(editor.selection().focus, Point::new(vec![0, 0], 3));

    assert!(editor.undo());
    assert_eq!(html(&editor), "<p>ab</p>");
    assert_eq!(editor.selection().focus, Point::new(vec![0, 0], 2));
    assert!(editor.can_redo());

    assert!(editor.redo());
    assert_eq!(html(&editor), "<p>abc</p>");
    assert_eq!(editor.selection().focus, Point::new(vec![0, 0], 3));

    let sources = sources.lock().unwrap();
    assert_eq!(sources.len(), 3);
    assert_eq!(sources[1].as_deref(), Some("history:undo"));
    assert_eq!(sources[2].as_deref(), Some("history:redo"));
}

#[test]
fn empty_stacks_do_nothing() {
    let mut editor = Editor::with_core_plugins();
    assert!(!editor.undo());
    assert!(!editor.redo());
    assert_eq!(editor.version(), 0);
}

#[test]
fn new_edit_clears_redo() {
    let mut editor = editor_with("ab");
    type_text(&mut editor, "c");
    assert!(editor.undo());
    type_text(&mut editor, "d");

    assert!(!editor.can_redo());
    assert!(!editor.redo());
    assert_eq!(html(&editor), "<p>abd</p>");
}

#[test]
fn history_depth_is_bounded() {
    let mut editor = Editor::with_richtext_plugins().with_config(EditorConfig {
        max_undo: 2,
        ..EditorConfig::default()
    });
    for c in ["a", "b", "c"] {
        type_text(&mut editor, c);
    }

    assert!(editor.undo());
    assert!(editor.undo());
    assert!(!editor.undo());
    assert_eq!(html(&editor), "<p>a</p>");
}

#[test]
fn structural_edits_undo_in_one_step() {
    let mut editor = editor_with("a");
    editor
        .run_command("table.insert", Some(json!({ "rows": 2, "cols": 2 })))
        .unwrap();
    assert!(html(&editor).contains("<table"));

    assert!(editor.undo());
    assert_eq!(html(&editor), "<p>a</p>");
}

#[test]
fn read_only_editor_keeps_history() {
    let mut editor = editor_with("ab");
    type_text(&mut editor, "c");
    editor.set_read_only(true);

    assert!(!editor.undo());
    assert_eq!(html(&editor), "<p>abc</p>");

    editor.set_read_only(false);
    assert!(editor.undo());
    assert_eq!(html(&editor), "<p>ab</p>");
}

#[test]
fn reset_clears_history() {
    let mut editor = editor_with("ab");
    type_text(&mut editor, "c");
    let before = editor.version();

    let event = editor.reset(Document::new(vec![Node::paragraph("novo")]));
    assert_eq!(event.source.as_deref(), Some("editor:reset"));
    assert_eq!(editor.version(), before + 1);
    assert!(!editor.can_undo());
    assert_eq!(html(&editor), "<p>novo</p>");
}
