//! Bullet and ordered lists: `list > list_item > blocks`.

use serde_json::Value;

use crate::attributes::{AttributeSpec, BulletStyle, OrderedStyle, list_style_of, merge_markup_attrs, style_attr};
use crate::core::{Chain, Document, Editor, ElementNode, MarkupAttrs, Node, NodeKind, Point, Selection};
use crate::error::EditError;
use crate::markup::MarkupElement;
use crate::ops::{Op, Path, Transaction};
use crate::plugin::{
    ChildConstraint, CommandSpec, NodeSpec, NormalizePass, EditorPlugin, PluginRegistry, QuerySpec,
    ancestor_element_path, arg_str, child_path, children_at_path, element_at_path, replace_node_ops,
    required_str, selected_sibling_range,
};
use crate::plugins::wrap_siblings;

pub(crate) struct ListPlugin;

impl EditorPlugin for ListPlugin {
    fn id(&self) -> &'static str {
        "list"
    }

    fn node_specs(&self) -> Vec<NodeSpec> {
        vec![
            NodeSpec::block(NodeKind::BulletList, ChildConstraint::BlockOnly),
            NodeSpec::block(NodeKind::OrderedList, ChildConstraint::BlockOnly),
            NodeSpec::block(NodeKind::ListItem, ChildConstraint::BlockOnly),
        ]
    }

    fn attribute_specs(&self) -> Vec<AttributeSpec> {
        vec![
            AttributeSpec::new(
                &[NodeKind::BulletList],
                "list_style",
                Some(Value::from(BulletStyle::default().as_css())),
                |el| parse_list_style(el, |s| BulletStyle::from_css(s).map(BulletStyle::as_css)),
                render_list_style,
            )
            .validate(|value| {
                let style = BulletStyle::from_css(value.as_str()?)?;
                Some(Value::from(style.as_css()))
            })
            .consumes(&["data-list-type", "style:list-style-type"]),
            AttributeSpec::new(
                &[NodeKind::OrderedList],
                "list_style",
                Some(Value::from(OrderedStyle::default().as_css())),
                |el| parse_list_style(el, |s| OrderedStyle::from_css(s).map(OrderedStyle::as_css)),
                render_list_style,
            )
            .validate(|value| {
                let style = OrderedStyle::from_css(value.as_str()?)?;
                Some(Value::from(style.as_css()))
            })
            .consumes(&["data-list-type", "style:list-style-type"]),
        ]
    }

    fn normalize_passes(&self) -> Vec<Box<dyn NormalizePass>> {
        vec![Box::new(NormalizeListStructure)]
    }

    fn commands(&self) -> Vec<CommandSpec> {
        vec![
            CommandSpec::new("list.toggle_bullet", "Bullet list", |editor, args| {
                toggle_list(editor, NodeKind::BulletList, args.as_ref())
            })
            .description("Toggle a bullet list on the selected blocks, optionally with a marker style.")
            .keywords(["list", "bullet", "unordered", "ul"])
            .args_example(serde_json::json!({ "style": "square" })),
            CommandSpec::new("list.toggle_ordered", "Ordered list", |editor, args| {
                toggle_list(editor, NodeKind::OrderedList, args.as_ref())
            })
            .description("Toggle an ordered list on the selected blocks, optionally with a numbering style.")
            .keywords(["list", "ordered", "numbered", "ol"])
            .args_example(serde_json::json!({ "style": "lower-roman" })),
            CommandSpec::new("list.set_bullet_style", "Set bullet style", |editor, args| {
                let style = required_str(args.as_ref(), "style")?;
                set_list_style(editor, NodeKind::BulletList, &style)
            })
            .description("Set the marker style of the surrounding bullet list.")
            .keywords(["list", "bullet", "style", "marker"])
            .args_example(serde_json::json!({ "style": "circle" })),
            CommandSpec::new("list.set_ordered_style", "Set numbering style", |editor, args| {
                let style = required_str(args.as_ref(), "style")?;
                set_list_style(editor, NodeKind::OrderedList, &style)
            })
            .description("Set the numbering style of the surrounding ordered list.")
            .keywords(["list", "ordered", "style", "numbering"])
            .args_example(serde_json::json!({ "style": "upper-alpha" })),
            CommandSpec::new("list.lift", "Lift list item", |editor, _args| {
                let list_path = nearest_list(editor.doc(), &editor.selection().focus.path, None)
                    .ok_or_else(|| EditError::structural("not in a list"))?;
                lift_items(editor, &list_path)
            })
            .description("Move the selected list items out of their list.")
            .keywords(["list", "lift", "outdent"])
            .check(|editor, _args| nearest_list(editor.doc(), &editor.selection().focus.path, None).is_some()),
        ]
    }

    fn queries(&self) -> Vec<QuerySpec> {
        vec![QuerySpec::new("list.active", |editor, _args| {
            Ok(match active_list(editor) {
                Some((kind, style)) => serde_json::json!({ "kind": kind, "style": style }),
                None => Value::Null,
            })
        })]
    }
}

fn parse_list_style(el: &MarkupElement, canonical: fn(&str) -> Option<&'static str>) -> Option<Value> {
    el.style("list-style-type")
        .and_then(|s| canonical(&s))
        .or_else(|| el.attr("data-list-type").and_then(canonical))
        .map(Value::from)
}

fn render_list_style(value: &Value) -> MarkupAttrs {
    let Some(style) = value.as_str() else {
        return MarkupAttrs::new();
    };
    let mut attrs = style_attr("list-style-type", style);
    let mut data = MarkupAttrs::new();
    data.insert("data-list-type".to_string(), style.to_string());
    merge_markup_attrs(&mut attrs, &data);
    attrs
}

fn style_command(kind: NodeKind) -> &'static str {
    match kind {
        NodeKind::OrderedList => "list.set_ordered_style",
        _ => "list.set_bullet_style",
    }
}

fn toggle_command(kind: NodeKind) -> &'static str {
    match kind {
        NodeKind::OrderedList => "list.toggle_ordered",
        _ => "list.toggle_bullet",
    }
}

/// Nearest list ancestor of `path`, optionally of one kind only.
fn nearest_list(doc: &Document, path: &[usize], kind: Option<NodeKind>) -> Option<Path> {
    ancestor_element_path(doc, path, |k| k.is_list() && kind.is_none_or(|kind| kind == k))
}

/// Kind and style of the list around the caret.
pub(crate) fn active_list(editor: &Editor) -> Option<(NodeKind, &'static str)> {
    let doc = editor.doc();
    let path = nearest_list(doc, &editor.selection().focus.path, None)?;
    let el = element_at_path(doc, &path)?;
    Some((el.kind, list_style_of(el)?))
}

fn toggle_list(editor: &Editor, kind: NodeKind, args: Option<&Value>) -> Result<Transaction, EditError> {
    let doc = editor.doc();
    let current = nearest_list(doc, &editor.selection().focus.path, None);
    let current_kind = current
        .as_deref()
        .and_then(|path| element_at_path(doc, path))
        .map(|el| el.kind);

    if let Some(style) = arg_str(args, "style") {
        let patch_value = Value::from(style);
        editor.registry().attr_patch(kind, "list_style", &patch_value)?;
        if current_kind == Some(kind) {
            return set_list_style(editor, kind, style);
        }
        return Chain::new()
            .command(toggle_command(kind), None)
            .command(style_command(kind), Some(serde_json::json!({ "style": style })))
            .build(editor);
    }

    match (current, current_kind) {
        (Some(path), Some(k)) if k == kind => lift_items(editor, &path),
        (Some(path), Some(_)) => {
            let Some(el) = element_at_path(doc, &path) else {
                return Ok(Transaction::default());
            };
            let mut next = ElementNode::new(kind, el.children.clone());
            next.passthrough = el.passthrough.clone();
            Ok(Transaction::new(replace_node_ops(&path, Node::Element(next)).to_vec())
                .selection_after(editor.selection().clone())
                .source(format!("command:{}", toggle_command(kind))))
        }
        _ => wrap_in_list(editor, kind),
    }
}

fn wrap_in_list(editor: &Editor, kind: NodeKind) -> Result<Transaction, EditError> {
    let (parent, first, last) = selected_sibling_range(editor)?;
    let siblings = children_at_path(editor.doc(), &parent)
        .ok_or_else(|| EditError::structural("selection parent is not a container"))?;
    let list = ElementNode::new(kind, Vec::new());
    let (ops, selection_after) = wrap_siblings(
        siblings,
        &parent,
        first,
        last,
        list,
        Some(NodeKind::ListItem),
        editor.selection(),
    );
    Ok(Transaction::new(ops)
        .selection_after(selection_after)
        .source(format!("command:{}", toggle_command(kind))))
}

/// Lifts the items covering the selection out of the list at `list_path`,
/// splitting the list around them.
fn lift_items(editor: &Editor, list_path: &[usize]) -> Result<Transaction, EditError> {
    let list = element_at_path(editor.doc(), list_path).ok_or_else(|| EditError::structural("not in a list"))?;
    let Some((&list_ix, parent)) = list_path.split_last() else {
        return Err(EditError::structural("not in a list"));
    };
    let depth = list_path.len();
    let sel = editor.selection();
    let item_of = |point: &Point| {
        (point.path.len() > depth && point.path.starts_with(list_path)).then(|| point.path[depth])
    };
    let focus_item = item_of(&sel.focus).ok_or_else(|| EditError::structural("not in a list item"))?;
    let anchor_item = item_of(&sel.anchor).unwrap_or(focus_item);
    let (a, b) = (anchor_item.min(focus_item), anchor_item.max(focus_item));

    let mut replacement: Vec<Node> = Vec::new();
    if a > 0 {
        let mut head = list.clone();
        head.children = list.children[..a].to_vec();
        replacement.push(Node::Element(head));
    }
    // First replacement index of each lifted item's blocks.
    let mut item_starts = Vec::with_capacity(b - a + 1);
    for item in &list.children[a..=b] {
        item_starts.push(list_ix + replacement.len());
        match item {
            Node::Element(el) if el.kind == NodeKind::ListItem => replacement.extend(el.children.iter().cloned()),
            other => replacement.push(other.clone()),
        }
    }
    if b + 1 < list.children.len() {
        let mut tail = list.clone();
        tail.children = list.children[b + 1..].to_vec();
        replacement.push(Node::Element(tail));
    }

    let mut ops = vec![Op::RemoveNode {
        path: list_path.to_vec(),
    }];
    ops.extend(replacement.iter().cloned().enumerate().map(|(i, node)| Op::InsertNode {
        path: child_path(parent, list_ix + i),
        node,
    }));

    let tail_ix = list_ix + replacement.len() - 1;
    let remap = |point: &Point| -> Point {
        let Some(item) = item_of(point) else {
            return point.clone();
        };
        let mut path = parent.to_vec();
        if item < a {
            return point.clone();
        } else if item <= b {
            let Some(&block) = point.path.get(depth + 1) else {
                return point.clone();
            };
            path.push(item_starts[item - a] + block);
            path.extend_from_slice(&point.path[depth + 2..]);
        } else {
            path.extend([tail_ix, item - b - 1]);
            path.extend_from_slice(&point.path[depth + 1..]);
        }
        Point::new(path, point.offset)
    };

    Ok(Transaction::new(ops)
        .selection_after(Selection::new(remap(&sel.anchor), remap(&sel.focus)))
        .source("command:list.lift"))
}

fn set_list_style(editor: &Editor, kind: NodeKind, style: &str) -> Result<Transaction, EditError> {
    let value = Value::from(style);
    let registry = editor.registry();
    // Validate first so a bad style reports as such even outside a list.
    registry.attr_patch(kind, "list_style", &value)?;
    let path = nearest_list(editor.doc(), &editor.selection().focus.path, Some(kind))
        .ok_or_else(|| EditError::structural(format!("not in a {kind}")))?;
    let el = element_at_path(editor.doc(), &path).ok_or_else(|| EditError::structural("not in a list"))?;
    let ops = registry
        .attr_change(kind, &el.attrs, "list_style", &value)?
        .map(|patch| Op::SetNodeAttrs { path, patch })
        .into_iter()
        .collect();
    Ok(Transaction::new(ops).source(format!("command:{}", style_command(kind))))
}

/// Lists contain only list items, list items only blocks, and no list is empty.
struct NormalizeListStructure;

impl NormalizePass for NormalizeListStructure {
    fn id(&self) -> &'static str {
        "list.normalize_structure"
    }

    fn run(&self, doc: &Document, _registry: &PluginRegistry) -> Vec<Op> {
        fn first_fix(children: &[Node], path: &mut Vec<usize>, parent_kind: Option<NodeKind>) -> Option<Vec<Op>> {
            for (ix, node) in children.iter().enumerate() {
                path.push(ix);
                let fix = match node {
                    Node::Element(el) if el.kind.is_list() && el.children.is_empty() => {
                        Some(vec![Op::RemoveNode { path: path.clone() }])
                    }
                    Node::Element(el) if el.kind == NodeKind::ListItem && !parent_kind.is_some_and(NodeKind::is_list) => {
                        let list = Node::element(NodeKind::BulletList, vec![node.clone()]);
                        Some(replace_node_ops(path, list).to_vec())
                    }
                    other if parent_kind.is_some_and(NodeKind::is_list) && other.kind() != Some(NodeKind::ListItem) => {
                        let item = match other {
                            Node::Element(_) | Node::Void(_) => Node::element(NodeKind::ListItem, vec![other.clone()]),
                            Node::Text(_) => {
                                Node::element(NodeKind::ListItem, vec![Node::element(NodeKind::Paragraph, vec![other.clone()])])
                            }
                        };
                        Some(replace_node_ops(path, item).to_vec())
                    }
                    Node::Text(_) if parent_kind == Some(NodeKind::ListItem) => {
                        Some(replace_node_ops(path, Node::element(NodeKind::Paragraph, vec![node.clone()])).to_vec())
                    }
                    Node::Element(el) => first_fix(&el.children, path, Some(el.kind)),
                    _ => None,
                };
                path.pop();
                if fix.is_some() {
                    return fix;
                }
            }
            None
        }

        first_fix(&doc.children, &mut Vec::new(), None).unwrap_or_default()
    }
}
