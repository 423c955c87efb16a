use edital_editor_core::{
    Document, EditError, Editor, Marks, Node, NodeKind, PluginRegistry, Point, Selection, TextNode,
    parse_html, serialize_html,
};
use serde_json::{Value, json};

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

#[test]
fn heading_levels_are_validated() {
    let mut editor = editor_with(vec![Node::paragraph("a")]);
    for args in [json!({ "level": 0 }), json!({ "level": 7 }), json!({ "level": "2" }), json!({})] {
        let err = editor.run_command("block.set_heading", Some(args.clone())).unwrap_err();
        assert!(matches!(err, EditError::Validation(_)), "{args}");
    }
    assert_eq!(editor.version(), 0);
}

#[test]
fn heading_then_paragraph() {
    let mut editor = editor_with(vec![Node::paragraph("a")]);

    editor.run_command("block.set_heading", Some(json!({ "level": 3 }))).unwrap();
    assert_eq!(html(&editor), "<h3>a</h3>");
    assert_eq!(editor.run_query_json("block.heading_level", None).unwrap(), json!(3));

    editor.run_command("block.set_heading", Some(json!({ "level": 1 }))).unwrap();
    assert_eq!(html(&editor), "<h1>a</h1>");

    editor.run_command("block.set_paragraph", None).unwrap();
    assert_eq!(html(&editor), "<p>a</p>");
    assert_eq!(editor.run_query_json("block.heading_level", None).unwrap(), Value::Null);
}

#[test]
fn align_sets_and_clears_text_align() {
    let mut editor = editor_with(vec![Node::paragraph("a")]);

    editor.run_command("block.set_align", Some(json!({ "align": "center" }))).unwrap();
    assert_eq!(html(&editor), r#"<p style="text-align: center">a</p>"#);
    assert_eq!(editor.run_query::<String>("block.align", None).unwrap(), "center");

    editor.run_command("block.set_align", Some(json!({ "align": "left" }))).unwrap();
    assert_eq!(html(&editor), "<p>a</p>");

    let err = editor
        .run_command("block.set_align", Some(json!({ "align": "middle" })))
        .unwrap_err();
    assert!(matches!(err, EditError::Validation(_)));
}

#[test]
fn align_survives_heading_conversion() {
    let mut editor = editor_with(vec![Node::paragraph("a")]);
    editor.run_command("block.set_align", Some(json!({ "align": "right" }))).unwrap();
    editor.run_command("block.set_heading", Some(json!({ "level": 2 }))).unwrap();
    assert_eq!(html(&editor), r#"<h2 style="text-align: right">a</h2>"#);
}

#[test]
fn blockquote_wraps_and_unwraps_selected_blocks() {
    let mut editor = editor_with(vec![Node::paragraph("a"), Node::paragraph("b"), Node::paragraph("c")]);
    editor.set_selection(Selection::new(Point::new(vec![0, 0], 0), Point::new(vec![1, 0], 1)));

    editor.run_command("blockquote.wrap_selection", None).unwrap();
    assert_eq!(html(&editor), "<blockquote><p>a</p><p>b</p></blockquote><p>c</p>");
    assert_eq!(editor.selection().focus, Point::new(vec![0, 1, 0], 1));
    assert!(editor.run_query::<bool>("blockquote.is_active", None).unwrap());

    editor.run_command("blockquote.unwrap", None).unwrap();
    assert_eq!(html(&editor), "<p>a</p><p>b</p><p>c</p>");
    assert_eq!(editor.selection().focus, Point::new(vec![1, 0], 1));
    assert!(!editor.run_query::<bool>("blockquote.is_active", None).unwrap());
}

#[test]
fn code_block_flattens_marks_and_toggles_back() {
    let bold = Node::Text(TextNode {
        text: "a".to_string(),
        marks: Marks {
            bold: true,
            ..Marks::default()
        },
    });
    let mut editor = editor_with(vec![Node::element(NodeKind::Paragraph, vec![bold, Node::text("<b>")])]);
    editor.set_selection(Selection::collapsed(Point::new(vec![0, 1], 2)));

    editor.run_command("code_block.toggle", None).unwrap();
    assert_eq!(html(&editor), "<pre><code>a&lt;b&gt;</code></pre>");
    assert_eq!(editor.selection().focus, Point::new(vec![0, 0], 3));
    assert!(editor.run_query::<bool>("code_block.is_active", None).unwrap());

    editor.run_command("code_block.toggle", None).unwrap();
    assert_eq!(html(&editor), "<p>a&lt;b&gt;</p>");
}

#[test]
fn divider_and_page_break_insert_after_the_current_block() {
    let mut editor = editor_with(vec![Node::paragraph("a"), Node::paragraph("b")]);

    editor.run_command("core.insert_divider", None).unwrap();
    assert_eq!(html(&editor), "<p>a</p><hr><p>b</p>");
    assert_eq!(editor.selection().focus, Point::new(vec![2, 0], 0));

    editor.run_command("page_break.insert", None).unwrap();
    assert_eq!(
        html(&editor),
        concat!(
            "<p>a</p><hr><p>b</p>",
            r#"<div data-type="page-break" class="page-break">"#,
            r#"<div class="page-break-line"></div><div class="page-break-text">--- ✂ ---</div>"#,
            "</div><p></p>"
        )
    );
    assert_eq!(editor.selection().focus, Point::new(vec![4, 0], 0));
}

#[test]
fn code_block_toggle_keeps_passthrough_markup() {
    let registry = PluginRegistry::richtext();
    let doc = parse_html(r#"<pre class="lead"><code>x</code></pre>"#, &registry).unwrap();
    let mut editor = Editor::new(doc, Selection::collapsed(Point::new(vec![0, 0], 0)), registry);

    editor.run_command("code_block.toggle", None).unwrap();
    assert_eq!(html(&editor), r#"<p class="lead">x</p>"#);

    editor.run_command("code_block.toggle", None).unwrap();
    assert_eq!(html(&editor), r#"<pre class="lead"><code>x</code></pre>"#);
}
