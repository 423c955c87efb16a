use edital_editor_core::{
    Document, EditorValue, FeatureFlags, Node, NodeKind, PluginRegistry, ValueError, parse_html,
    serialize_html,
};

const PAGE_BREAK: &str = concat!(
    r#"<div data-type="page-break" class="page-break">"#,
    r#"<div class="page-break-line"></div><div class="page-break-text">--- ✂ ---</div>"#,
    "</div>"
);

fn round_trip(html: &str) -> String {
    let registry = PluginRegistry::richtext();
    let doc = parse_html(html, &registry).unwrap();
    serialize_html(&doc, &registry)
}

#[test]
fn page_break_markup_is_stable() {
    let html = format!("<p>a</p>{PAGE_BREAK}<p>b</p>");
    assert_eq!(round_trip(&html), html);

    let doc = parse_html(PAGE_BREAK, &PluginRegistry::richtext()).unwrap();
    assert!(matches!(doc.children.as_slice(), [Node::Void(v)] if v.kind == NodeKind::PageBreak));
}

#[test]
fn extra_page_break_classes_survive() {
    let html = round_trip(r#"<div data-type="page-break" class="page-break keep"></div>"#);
    assert!(
        html.starts_with(r#"<div data-type="page-break" class="page-break keep">"#),
        "{html}"
    );
}

#[test]
fn mention_spans_round_trip() {
    let html = r#"<p>Olá <span data-type="mention" data-id="nomeEdital" data-label="nomeEdital">@nomeEdital</span></p>"#;
    assert_eq!(round_trip(html), html);
}

#[test]
fn mention_label_falls_back_to_text() {
    assert_eq!(
        round_trip(r#"<p><span data-type="mention" data-id="fim">@Fim do edital</span></p>"#),
        r#"<p><span data-type="mention" data-id="fim" data-label="Fim do edital">@Fim do edital</span></p>"#
    );
}

#[test]
fn list_items_with_a_single_paragraph_stay_compact() {
    assert_eq!(
        round_trip("<ul><li>um</li><li><p>dois</p></li></ul>"),
        r#"<ul data-list-type="disc" style="list-style-type: disc"><li>um</li><li>dois</li></ul>"#
    );
}

#[test]
fn disabled_features_degrade_to_paragraphs() {
    let registry = PluginRegistry::from_features(&FeatureFlags {
        heading: false,
        lists: false,
        tables: false,
        ..FeatureFlags::default()
    });
    let doc = parse_html(
        "<h2>título</h2><ul><li>a</li><li>b</li></ul><table><tr><td>c</td></tr></table>",
        &registry,
    )
    .unwrap();
    assert_eq!(
        serialize_html(&doc, &registry),
        "<p>título</p><p>a</p><p>b</p><p>c</p>"
    );
}

#[test]
fn disabled_voids_are_dropped() {
    let registry = PluginRegistry::core();
    let doc = parse_html(&format!("<p>a</p><hr>{PAGE_BREAK}<p>b</p>"), &registry).unwrap();
    assert_eq!(serialize_html(&doc, &registry), "<p>a</p><p>b</p>");
}

#[test]
fn entities_and_whitespace() {
    assert_eq!(round_trip("<p>R&amp;D &lt;ok&gt;</p>"), "<p>R&amp;D &lt;ok&gt;</p>");
    assert_eq!(round_trip("<p>  a \n  b  </p>"), "<p>a b</p>");
    assert_eq!(round_trip("<p>a<br>b</p>"), "<p>a<br>b</p>");
}

#[test]
fn stray_inline_content_becomes_a_paragraph() {
    assert_eq!(round_trip("solto <strong>negrito</strong>"), "<p>solto <strong>negrito</strong></p>");
}

#[test]
fn structured_value_round_trips() {
    let doc = Document::new(vec![Node::paragraph("a"), Node::paragraph("b")]);
    let value = EditorValue::from_document(doc.clone());
    let json = value.to_json_pretty().unwrap();
    assert!(json.contains("\"schema\": \"edital-editor\""));

    let back = EditorValue::from_json_str(&json).unwrap();
    assert_eq!(back.version, 1);
    assert_eq!(back.into_document(&PluginRegistry::richtext()).unwrap(), doc);
}

#[test]
fn foreign_schema_is_rejected() {
    let json = serde_json::json!({
        "schema": "other",
        "version": 1,
        "document": { "children": [] }
    })
    .to_string();
    let err = EditorValue::from_json_str(&json).unwrap_err();
    assert!(matches!(err, ValueError::Schema(ref s) if s == "other"));
}

#[test]
fn newer_format_versions_are_rejected() {
    let json = serde_json::json!({ "version": 2, "document": { "children": [] } }).to_string();
    let err = EditorValue::from_json_str(&json).unwrap_err();
    assert!(matches!(err, ValueError::Version { found: 2, supported: 1 }));

    let json = serde_json::json!({ "document": { "children": [] } }).to_string();
    assert_eq!(EditorValue::from_json_str(&json).unwrap().schema, "edital-editor");
}

#[test]
fn trees_with_disabled_kinds_are_refused() {
    let registry = PluginRegistry::richtext();
    let doc = parse_html("<h2>a</h2><p>b</p>", &registry).unwrap();
    let value = EditorValue::from_document(doc);

    let err = value.clone().into_document(&PluginRegistry::core()).unwrap_err();
    assert!(matches!(err, ValueError::UnknownKind(NodeKind::Heading)));
    assert!(value.into_document(&registry).is_ok());
}

#[test]
fn unknown_attributes_on_mark_tags_survive() {
    let html = concat!(
        r#"<p><a href="https://example.org" target="_blank">site</a> e "#,
        r#"<span class="tag" style="color: red; font-weight: bold">x</span> "#,
        r#"<strong class="k">y</strong></p>"#
    );
    assert_eq!(round_trip(html), html);
}

#[test]
fn bare_spans_with_attributes_are_kept() {
    assert_eq!(
        round_trip(r#"<p><span class="tag">x</span></p>"#),
        r#"<p><span class="tag">x</span></p>"#
    );
    assert_eq!(round_trip("<p><span>x</span></p>"), "<p>x</p>");
}
