use serde_json::Value;

use crate::attributes::{Align, AttributeSpec, heading_level_of, style_attr};
use crate::core::{Editor, ElementNode, MarkupAttrs, Node, NodeKind, Selection, TextNode};
use crate::error::EditError;
use crate::markup::MarkupElement;
use crate::ops::{Op, Transaction};
use crate::plugin::{
    ChildConstraint, CommandSpec, NodeSpec, EditorPlugin, QuerySpec, ancestor_element_path,
    block_plain_text, children_at_path, element_at_path, is_point_in_block, point_for_global_offset,
    point_global_offset, replace_node_ops, required_str, selected_sibling_range,
    selected_text_blocks,
};
use crate::plugins::{unwrap_element, wrap_siblings};
use crate::toolbar::BlockType;

pub(crate) struct HeadingPlugin;

impl EditorPlugin for HeadingPlugin {
    fn id(&self) -> &'static str {
        "heading"
    }

    fn node_specs(&self) -> Vec<NodeSpec> {
        vec![NodeSpec::block(NodeKind::Heading, ChildConstraint::InlineOnly)]
    }

    fn attribute_specs(&self) -> Vec<AttributeSpec> {
        vec![
            AttributeSpec::new(
                &[NodeKind::Heading],
                "level",
                Some(Value::from(1u64)),
                |el| {
                    let level = el.tag.strip_prefix('h')?.parse::<u64>().ok()?;
                    Some(Value::from(level))
                },
                |_| MarkupAttrs::new(),
            )
            .validate(|value| {
                value
                    .as_u64()
                    .filter(|level| (1..=6).contains(level))
                    .map(Value::from)
            }),
        ]
    }

    fn commands(&self) -> Vec<CommandSpec> {
        vec![
            CommandSpec::new("block.set_heading", "Set heading", |editor, args| {
                let level = args
                    .as_ref()
                    .and_then(|v| v.get("level"))
                    .and_then(|v| v.as_u64())
                    .filter(|level| (1..=6).contains(level))
                    .ok_or_else(|| EditError::validation("heading level must be between 1 and 6"))?;
                set_heading(editor, level)
            })
            .description("Convert the selected text blocks into headings.")
            .keywords(["heading", "title", "h1", "h2", "h3", "h4", "h5", "h6"])
            .args_example(serde_json::json!({ "level": 2 })),
        ]
    }

    fn queries(&self) -> Vec<QuerySpec> {
        vec![QuerySpec::new("block.heading_level", |editor, _args| {
            Ok(match active_block_type(editor) {
                BlockType::Heading(level) => Value::from(level),
                _ => Value::Null,
            })
        })]
    }
}

fn set_heading(editor: &Editor, level: u64) -> Result<Transaction, EditError> {
    let mut ops = Vec::new();
    for block in selected_text_blocks(editor)? {
        let el = block.el;
        if el.kind == NodeKind::Heading && u64::from(heading_level_of(el)) == level {
            continue;
        }
        let mut next = ElementNode::new(NodeKind::Heading, el.children.clone());
        next.attrs = el.attrs.clone();
        next.passthrough = el.passthrough.clone();
        if level == 1 {
            next.attrs.remove("level");
        } else {
            next.attrs.insert("level".to_string(), Value::from(level));
        }
        ops.extend(replace_node_ops(&block.path, Node::Element(next)));
    }
    Ok(Transaction::new(ops)
        .selection_after(editor.selection().clone())
        .source("command:block.set_heading"))
}

pub(crate) struct AlignPlugin;

impl EditorPlugin for AlignPlugin {
    fn id(&self) -> &'static str {
        "align"
    }

    fn attribute_specs(&self) -> Vec<AttributeSpec> {
        vec![
            AttributeSpec::new(
                &[NodeKind::Paragraph, NodeKind::Heading],
                "align",
                Some(Value::from(Align::Left.as_css())),
                |el: &MarkupElement| {
                    let align = el.style("text-align").or_else(|| el.attr("align").map(str::to_string))?;
                    Align::from_css(&align).map(|a| Value::from(a.as_css()))
                },
                |value| match value.as_str().and_then(Align::from_css) {
                    Some(Align::Left) | None => MarkupAttrs::new(),
                    Some(align) => style_attr("text-align", align.as_css()),
                },
            )
            .validate(|value| {
                value
                    .as_str()
                    .and_then(Align::from_css)
                    .map(|a| Value::from(a.as_css()))
            })
            .consumes(&["style:text-align", "align"]),
        ]
    }

    fn commands(&self) -> Vec<CommandSpec> {
        vec![
            CommandSpec::new("block.set_align", "Set alignment", |editor, args| {
                let align = required_str(args.as_ref(), "align")?;
                set_align(editor, &align)
            })
            .description("Align the selected text blocks.")
            .keywords(["align", "left", "center", "right", "justify"])
            .args_example(serde_json::json!({ "align": "center" })),
        ]
    }

    fn queries(&self) -> Vec<QuerySpec> {
        vec![QuerySpec::new("block.align", |editor, _args| {
            Ok(Value::from(active_align(editor).as_css()))
        })]
    }
}

fn set_align(editor: &Editor, align: &str) -> Result<Transaction, EditError> {
    let value = Value::from(align);
    let registry = editor.registry();
    let mut ops = Vec::new();
    let mut any_alignable = false;
    for block in selected_text_blocks(editor)? {
        if registry.attribute_spec(block.el.kind, "align").is_none() {
            continue;
        }
        any_alignable = true;
        if let Some(patch) = registry.attr_change(block.el.kind, &block.el.attrs, "align", &value)? {
            ops.push(Op::SetNodeAttrs {
                path: block.path.clone(),
                patch,
            });
        }
    }
    if !any_alignable {
        return Err(EditError::structural("no alignable block in selection"));
    }
    Ok(Transaction::new(ops).source("command:block.set_align"))
}

/// Text block holding the selection's anchor, plus the block type reported for it.
/// A paragraph inside a quote reports the quote.
struct AnchorBlock<'a> {
    text_block: Option<&'a ElementNode>,
    block_type: BlockType,
}

fn anchor_block(editor: &Editor) -> AnchorBlock<'_> {
    let doc = editor.doc();
    let anchor = &editor.selection().anchor.path;
    let text_block = ancestor_element_path(doc, anchor, |kind| {
        matches!(kind, NodeKind::Paragraph | NodeKind::Heading | NodeKind::CodeBlock)
    })
    .and_then(|path| element_at_path(doc, &path));
    let block_type = ancestor_element_path(doc, anchor, |kind| BlockType::for_kind(kind, 1).is_some())
        .and_then(|path| element_at_path(doc, &path))
        .and_then(|el| BlockType::for_kind(el.kind, heading_level_of(el)))
        .unwrap_or(BlockType::Paragraph);
    AnchorBlock {
        text_block,
        block_type,
    }
}

pub(crate) fn active_align(editor: &Editor) -> Align {
    anchor_block(editor)
        .text_block
        .map(crate::attributes::align_of)
        .unwrap_or_default()
}

pub(crate) fn active_block_type(editor: &Editor) -> BlockType {
    anchor_block(editor).block_type
}

pub(crate) struct BlockquotePlugin;

impl EditorPlugin for BlockquotePlugin {
    fn id(&self) -> &'static str {
        "blockquote"
    }

    fn node_specs(&self) -> Vec<NodeSpec> {
        vec![NodeSpec::block(NodeKind::Blockquote, ChildConstraint::BlockOnly)]
    }

    fn commands(&self) -> Vec<CommandSpec> {
        vec![
            CommandSpec::new(
                "blockquote.wrap_selection",
                "Wrap selection in blockquote",
                |editor, _args| wrap_in_blockquote(editor),
            )
            .description("Wrap selected blocks in a blockquote container.")
            .keywords(["blockquote", "quote", "wrap"]),
            CommandSpec::new("blockquote.unwrap", "Unwrap blockquote", |editor, _args| {
                unwrap_blockquote(editor)
            })
            .description("Unwrap the nearest blockquote container.")
            .keywords(["blockquote", "quote", "unwrap"]),
        ]
    }

    fn queries(&self) -> Vec<QuerySpec> {
        vec![QuerySpec::new("blockquote.is_active", |editor, _args| {
            Ok(Value::Bool(nearest_blockquote(editor).is_some()))
        })]
    }
}

fn nearest_blockquote(editor: &Editor) -> Option<crate::ops::Path> {
    ancestor_element_path(editor.doc(), &editor.selection().focus.path, |kind| {
        kind == NodeKind::Blockquote
    })
}

fn wrap_in_blockquote(editor: &Editor) -> Result<Transaction, EditError> {
    let (parent, first, last) = selected_sibling_range(editor)?;
    let siblings = children_at_path(editor.doc(), &parent)
        .ok_or_else(|| EditError::structural("selection parent is not a container"))?;
    let wrapper = ElementNode::new(NodeKind::Blockquote, Vec::new());
    let (ops, selection_after) = wrap_siblings(siblings, &parent, first, last, wrapper, None, editor.selection());
    Ok(Transaction::new(ops)
        .selection_after(selection_after)
        .source("command:blockquote.wrap_selection"))
}

fn unwrap_blockquote(editor: &Editor) -> Result<Transaction, EditError> {
    let Some(path) = nearest_blockquote(editor) else {
        return Ok(Transaction::default());
    };
    let Some(el) = element_at_path(editor.doc(), &path) else {
        return Ok(Transaction::default());
    };
    let (ops, selection_after) = unwrap_element(&path, el, editor.selection());
    Ok(Transaction::new(ops)
        .selection_after(selection_after)
        .source("command:blockquote.unwrap"))
}

pub(crate) struct CodeBlockPlugin;

impl EditorPlugin for CodeBlockPlugin {
    fn id(&self) -> &'static str {
        "code_block"
    }

    fn node_specs(&self) -> Vec<NodeSpec> {
        vec![NodeSpec::block(NodeKind::CodeBlock, ChildConstraint::InlineOnly)]
    }

    fn commands(&self) -> Vec<CommandSpec> {
        vec![
            CommandSpec::new("code_block.toggle", "Toggle code block", |editor, _args| {
                toggle_code_block(editor)
            })
            .description("Toggle code block for the selected text blocks.")
            .keywords(["code block", "code", "pre", "monospace"]),
        ]
    }

    fn queries(&self) -> Vec<QuerySpec> {
        vec![QuerySpec::new("code_block.is_active", |editor, _args| {
            Ok(Value::Bool(active_block_type(editor) == BlockType::CodeBlock))
        })]
    }
}

/// Code blocks hold one unmarked text leaf; toggling on flattens marks and
/// inline voids into plain text.
fn toggle_code_block(editor: &Editor) -> Result<Transaction, EditError> {
    let blocks = selected_text_blocks(editor)?;
    let all_code = blocks.iter().all(|b| b.el.kind == NodeKind::CodeBlock);
    let sel = editor.selection();
    let mut anchor = sel.anchor.clone();
    let mut focus = sel.focus.clone();
    let mut ops = Vec::new();

    for block in &blocks {
        let el = block.el;
        let mut next = if all_code {
            ElementNode::new(NodeKind::Paragraph, el.children.clone())
        } else if el.kind == NodeKind::CodeBlock {
            continue;
        } else {
            ElementNode::new(
                NodeKind::CodeBlock,
                vec![Node::Text(TextNode {
                    text: block_plain_text(&el.children),
                    marks: Default::default(),
                })],
            )
        };
        // Code blocks declare no align or indent, so those do not survive a round trip.
        next.attrs = editor.registry().carry_attrs(next.kind, &el.attrs);
        next.passthrough = el.passthrough.clone();
        for point in [&mut anchor, &mut focus] {
            if is_point_in_block(point, &block.path) {
                let global = point_global_offset(&el.children, point.path.last().copied().unwrap_or(0), point.offset);
                *point = point_for_global_offset(&block.path, &next.children, global);
            }
        }
        ops.extend(replace_node_ops(&block.path, Node::Element(next)));
    }

    Ok(Transaction::new(ops)
        .selection_after(Selection::new(anchor, focus))
        .source("command:code_block.toggle"))
}
