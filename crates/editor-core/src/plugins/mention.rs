//! Inline mention voids: `<span data-type="mention" data-id=.. data-label=..>@label</span>`.

use serde_json::Value;

use crate::attributes::AttributeSpec;
use crate::core::{Editor, MarkupAttrs, Node, NodeKind, Point, Selection, TextNode, clamp_to_char_boundary};
use crate::error::EditError;
use crate::ops::{Op, Path, Transaction};
use crate::plugin::{CommandSpec, NodeSpec, EditorPlugin, child_path, node_at_path, required_str};

pub(crate) struct MentionPlugin;

impl EditorPlugin for MentionPlugin {
    fn id(&self) -> &'static str {
        "mention"
    }

    fn node_specs(&self) -> Vec<NodeSpec> {
        vec![NodeSpec::inline_void(NodeKind::Mention)]
    }

    fn attribute_specs(&self) -> Vec<AttributeSpec> {
        vec![
            AttributeSpec::new(
                &[NodeKind::Mention],
                "id",
                None,
                |el| el.attr("data-id").map(Value::from),
                |value| data_attr("data-id", value),
            )
            .validate(non_empty_string)
            .consumes(&["data-id"]),
            AttributeSpec::new(
                &[NodeKind::Mention],
                "label",
                None,
                |el| {
                    el.attr("data-label")
                        .map(str::to_string)
                        .or_else(|| {
                            let text = el.text_content();
                            let label = text.trim().trim_start_matches('@');
                            (!label.is_empty()).then(|| label.to_string())
                        })
                        .map(Value::from)
                },
                |value| data_attr("data-label", value),
            )
            .validate(non_empty_string)
            .consumes(&["data-label"]),
        ]
    }

    fn commands(&self) -> Vec<CommandSpec> {
        vec![
            CommandSpec::new("mention.insert", "Insert mention", |editor, args| {
                let id = required_str(args.as_ref(), "id")?;
                let label = required_str(args.as_ref(), "label")?;
                let target = match args.as_ref().and_then(|v| v.get("replace")) {
                    Some(replace) => replace_target(replace)?,
                    None => caret_target(editor)?,
                };
                insert_mention(editor, &id, &label, target)
            })
            .description("Insert a mention at the caret, optionally replacing a span of the caret's text leaf.")
            .keywords(["mention", "@", "variable"])
            .args_example(serde_json::json!({
                "id": "nomeEdital",
                "label": "nomeEdital",
                "replace": { "path": [0, 0], "start": 0, "end": 5 }
            })),
        ]
    }
}

fn data_attr(name: &str, value: &Value) -> MarkupAttrs {
    let mut attrs = MarkupAttrs::new();
    if let Some(s) = value.as_str() {
        attrs.insert(name.to_string(), s.to_string());
    }
    attrs
}

fn non_empty_string(value: &Value) -> Option<Value> {
    let s = value.as_str()?.trim();
    (!s.is_empty()).then(|| Value::from(s))
}

/// A byte span inside one text leaf.
struct TextSpan {
    path: Path,
    start: usize,
    end: usize,
}

fn caret_target(editor: &Editor) -> Result<TextSpan, EditError> {
    let sel = editor.selection();
    if sel.anchor.path != sel.focus.path {
        return Err(EditError::structural("mention requires a selection inside one text leaf"));
    }
    Ok(TextSpan {
        path: sel.focus.path.clone(),
        start: sel.anchor.offset.min(sel.focus.offset),
        end: sel.anchor.offset.max(sel.focus.offset),
    })
}

fn replace_target(replace: &Value) -> Result<TextSpan, EditError> {
    let path = replace
        .get("path")
        .and_then(Value::as_array)
        .and_then(|ixs| {
            ixs.iter()
                .map(|ix| ix.as_u64().map(|ix| ix as usize))
                .collect::<Option<Path>>()
        })
        .ok_or_else(|| EditError::validation("Missing args.replace.path"))?;
    let offset = |key: &str| {
        replace
            .get(key)
            .and_then(Value::as_u64)
            .map(|v| v as usize)
            .ok_or_else(|| EditError::validation(format!("Missing args.replace.{key}")))
    };
    let (start, end) = (offset("start")?, offset("end")?);
    if start > end {
        return Err(EditError::validation("args.replace.start is after args.replace.end"));
    }
    Ok(TextSpan { path, start, end })
}

fn insert_mention(editor: &Editor, id: &str, label: &str, span: TextSpan) -> Result<Transaction, EditError> {
    let Some(Node::Text(leaf)) = node_at_path(editor.doc(), &span.path) else {
        return Err(EditError::InvalidPath(format!("{:?} is not a text leaf", span.path)));
    };
    let Some((&ix, block_path)) = span.path.split_last() else {
        return Err(EditError::InvalidPath("empty path".to_string()));
    };
    if span.end > leaf.text.len()
        || clamp_to_char_boundary(&leaf.text, span.start) != span.start
        || clamp_to_char_boundary(&leaf.text, span.end) != span.end
    {
        return Err(EditError::InvalidPath(format!(
            "span {}..{} is outside the text leaf",
            span.start, span.end
        )));
    }

    let left = &leaf.text[..span.start];
    let right = &leaf.text[span.end..];
    let mut replacement = Vec::with_capacity(3);
    if !left.is_empty() {
        replacement.push(Node::Text(TextNode {
            text: left.to_string(),
            marks: leaf.marks.clone(),
        }));
    }
    replacement.push(Node::mention(id, label));
    let caret_ix = ix + replacement.len();
    replacement.push(Node::Text(TextNode {
        text: right.to_string(),
        marks: leaf.marks.clone(),
    }));

    let mut ops = vec![Op::RemoveNode {
        path: span.path.clone(),
    }];
    ops.extend(replacement.into_iter().enumerate().map(|(i, node)| Op::InsertNode {
        path: child_path(block_path, ix + i),
        node,
    }));

    Ok(Transaction::new(ops)
        .selection_after(Selection::collapsed(Point::new(child_path(block_path, caret_ix), 0)))
        .source("command:mention.insert"))
}
