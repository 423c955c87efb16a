use edital_editor_core::{
    BulletStyle, CaptionPosition, Document, ElementNode, IndentLevel, Node, NodeKind, OrderedStyle,
    PluginRegistry, parse_html, serialize_html,
};
use serde_json::Value;

fn first_element(doc: &Document) -> &ElementNode {
    match doc.children.first() {
        Some(Node::Element(el)) => el,
        other => panic!("Expected element, got {other:?}"),
    }
}

fn round_trip(node: Node, registry: &PluginRegistry) -> Document {
    let html = serialize_html(&Document::new(vec![node]), registry);
    parse_html(&html, registry).unwrap()
}

#[test]
fn indent_levels_survive_render_then_parse() {
    let registry = PluginRegistry::richtext();
    for step in 0..=10u16 {
        let px = step * 30;
        let mut p = ElementNode::new(NodeKind::Paragraph, vec![Node::text("x")]);
        if px > 0 {
            p = p.with_attr("indent", Value::from(px));
        }
        let doc = round_trip(Node::Element(p), &registry);
        let el = first_element(&doc);
        assert_eq!(el.attr_u64("indent").unwrap_or(0), u64::from(px), "indent {px}px");
        assert!(el.passthrough.is_empty());
    }
}

#[test]
fn indent_renders_margin_only_when_non_zero() {
    let registry = PluginRegistry::richtext();
    let doc = parse_html(r#"<p style="margin-left: 60px">a</p><p>b</p>"#, &registry).unwrap();
    assert_eq!(
        serialize_html(&doc, &registry),
        r#"<p style="margin-left: 60px">a</p><p>b</p>"#
    );
}

#[test]
fn indent_parse_quantizes_and_clamps() {
    let registry = PluginRegistry::richtext();
    let cases = [("44px", 30), ("46px", 60), ("1000px", 300), ("-20px", 0), ("2em", 0)];
    for (css, expected) in cases {
        let doc = parse_html(&format!(r#"<p style="margin-left: {css}">x</p>"#), &registry).unwrap();
        assert_eq!(
            first_element(&doc).attr_u64("indent").unwrap_or(0),
            expected,
            "margin-left: {css}"
        );
    }
    assert_eq!(IndentLevel::quantize(299.0).px(), 300);
    assert_eq!(IndentLevel::MAX.increased(), IndentLevel::MAX);
    assert_eq!(IndentLevel::ZERO.decreased(), IndentLevel::ZERO);
}

#[test]
fn list_styles_survive_render_then_parse() {
    let registry = PluginRegistry::richtext();
    let item = || Node::element(NodeKind::ListItem, vec![Node::paragraph("x")]);

    for style in BulletStyle::ALL {
        let list = ElementNode::new(NodeKind::BulletList, vec![item()]).with_attr("list_style", Value::from(style.as_css()));
        let doc = round_trip(Node::Element(list), &registry);
        let el = first_element(&doc);
        assert_eq!(el.kind, NodeKind::BulletList);
        assert_eq!(
            el.attr_str("list_style").unwrap_or(BulletStyle::default().as_css()),
            style.as_css()
        );
    }

    for style in OrderedStyle::ALL {
        let list = ElementNode::new(NodeKind::OrderedList, vec![item()]).with_attr("list_style", Value::from(style.as_css()));
        let doc = round_trip(Node::Element(list), &registry);
        let el = first_element(&doc);
        assert_eq!(el.kind, NodeKind::OrderedList);
        assert_eq!(
            el.attr_str("list_style").unwrap_or(OrderedStyle::default().as_css()),
            style.as_css()
        );
    }
}

#[test]
fn list_style_renders_style_and_data_attribute() {
    let registry = PluginRegistry::richtext();
    let doc = parse_html(r#"<ul data-list-type="square"><li>x</li></ul>"#, &registry).unwrap();
    assert_eq!(first_element(&doc).attr_str("list_style"), Some("square"));
    assert_eq!(
        serialize_html(&doc, &registry),
        r#"<ul data-list-type="square" style="list-style-type: square"><li>x</li></ul>"#
    );
}

#[test]
fn unknown_list_style_falls_back_to_default() {
    let registry = PluginRegistry::richtext();
    let doc = parse_html(r#"<ol style="list-style-type: klingon"><li>x</li></ol>"#, &registry).unwrap();
    let el = first_element(&doc);
    assert_eq!(el.attr_str("list_style"), None);
    assert!(serialize_html(&doc, &registry).contains(r#"data-list-type="decimal""#));
}

#[test]
fn caption_positions_survive_render_then_parse() {
    let registry = PluginRegistry::richtext();
    for position in CaptionPosition::ALL {
        let caption = ElementNode::new(NodeKind::TableCaption, vec![Node::text("Quadro 1")])
            .with_attr("position", Value::from(position.as_css()));
        let row = Node::element(
            NodeKind::TableRow,
            vec![Node::element(NodeKind::TableCell, vec![Node::paragraph("a")])],
        );
        let table = Node::element(NodeKind::Table, vec![Node::Element(caption), row]);

        let doc = round_trip(table, &registry);
        let table = first_element(&doc);
        let Some(Node::Element(caption)) = table.children.first() else {
            panic!("Expected caption first");
        };
        assert_eq!(caption.kind, NodeKind::TableCaption);
        assert_eq!(
            caption.attr_str("position").unwrap_or(CaptionPosition::default().as_css()),
            position.as_css()
        );
    }
}

#[test]
fn caption_renders_data_position_and_caption_side() {
    let registry = PluginRegistry::richtext();
    let html = r#"<table><caption data-position="bottom">Q</caption><tr><td>a</td></tr></table>"#;
    let doc = parse_html(html, &registry).unwrap();
    assert_eq!(
        serialize_html(&doc, &registry),
        r#"<table><caption data-position="bottom" style="caption-side: bottom">Q</caption><tbody><tr><td><p>a</p></td></tr></tbody></table>"#
    );
}

#[test]
fn unconsumed_markup_attributes_pass_through() {
    let registry = PluginRegistry::richtext();
    let html = r#"<p class="lead" id="intro" style="text-align: center; color: red">x</p>"#;
    let doc = parse_html(html, &registry).unwrap();
    let el = first_element(&doc);
    assert_eq!(el.attr_str("align"), Some("center"));
    assert_eq!(el.passthrough.get("class").map(String::as_str), Some("lead"));
    assert_eq!(el.passthrough.get("id").map(String::as_str), Some("intro"));
    assert_eq!(el.passthrough.get("style").map(String::as_str), Some("color: red"));

    let out = serialize_html(&doc, &registry);
    assert!(out.contains(r#"class="lead""#));
    assert!(out.contains(r#"id="intro""#));
    assert!(out.contains("text-align: center"));
    assert!(out.contains("color: red"));
}

#[test]
fn passthrough_wins_ties_with_rendered_attributes() {
    let registry = PluginRegistry::richtext();
    let mut p = ElementNode::new(NodeKind::Paragraph, vec![Node::text("x")]).with_attr("indent", Value::from(30u64));
    p.passthrough.insert("style".to_string(), "margin-left: 5px".to_string());
    let out = serialize_html(&Document::new(vec![Node::Element(p)]), &registry);
    assert_eq!(out, r#"<p style="margin-left: 5px">x</p>"#);
}

#[test]
fn attribute_validation_rejects_out_of_domain_and_undeclared() {
    let registry = PluginRegistry::richtext();
    assert!(registry.attr_patch(NodeKind::Paragraph, "indent", &Value::from(45u64)).is_err());
    assert!(registry.attr_patch(NodeKind::Paragraph, "indent", &Value::from(330u64)).is_err());
    assert!(registry.attr_patch(NodeKind::BulletList, "list_style", &Value::from("decimal")).is_err());
    assert!(registry.attr_patch(NodeKind::Paragraph, "list_style", &Value::from("disc")).is_err());

    let patch = registry.attr_patch(NodeKind::Paragraph, "indent", &Value::from(0u64)).unwrap();
    assert_eq!(patch.remove, vec!["indent".to_string()]);
    let patch = registry.attr_patch(NodeKind::OrderedList, "list_style", &Value::from("LOWER-ROMAN")).unwrap();
    assert_eq!(patch.set.get("list_style"), Some(&Value::from("lower-roman")));
}
