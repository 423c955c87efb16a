use serde_json::Value;

use crate::attributes::{AttributeSpec, IndentLevel, indent_of, parse_css_int, style_attr};
use crate::core::{AttrPatch, Editor, MarkupAttrs, NodeKind};
use crate::error::EditError;
use crate::ops::{Op, Transaction};
use crate::plugin::{CommandSpec, EditorPlugin, QuerySpec, ancestor_element_path, element_at_path, selected_text_blocks};

const INDENTABLE: [NodeKind; 3] = [NodeKind::Paragraph, NodeKind::Heading, NodeKind::Blockquote];

pub(crate) struct IndentPlugin;

impl EditorPlugin for IndentPlugin {
    fn id(&self) -> &'static str {
        "indent"
    }

    fn attribute_specs(&self) -> Vec<AttributeSpec> {
        vec![
            AttributeSpec::new(
                &INDENTABLE,
                "indent",
                Some(Value::from(0u64)),
                |el| {
                    let px = parse_css_int(&el.style("margin-left")?)?;
                    Some(Value::from(IndentLevel::quantize(px).px()))
                },
                |value| match value.as_u64().filter(|px| *px > 0) {
                    Some(px) => style_attr("margin-left", format!("{px}px")),
                    None => MarkupAttrs::new(),
                },
            )
            .validate(|value| {
                let px = u16::try_from(value.as_u64()?).ok()?;
                IndentLevel::from_px(px).map(|level| Value::from(level.px()))
            })
            .consumes(&["style:margin-left"]),
        ]
    }

    fn commands(&self) -> Vec<CommandSpec> {
        vec![
            CommandSpec::new("block.indent", "Indent", |editor, _args| {
                shift_indent(editor, IndentLevel::increased, "command:block.indent")
            })
            .description("Indent the selected blocks by one level.")
            .keywords(["indent", "tab"])
            .check(|editor, _args| would_shift(editor, IndentLevel::increased)),
            CommandSpec::new("block.outdent", "Outdent", |editor, _args| {
                shift_indent(editor, IndentLevel::decreased, "command:block.outdent")
            })
            .description("Outdent the selected blocks by one level.")
            .keywords(["outdent", "dedent", "shift tab"])
            .check(|editor, _args| would_shift(editor, IndentLevel::decreased)),
        ]
    }

    fn queries(&self) -> Vec<QuerySpec> {
        vec![QuerySpec::new("block.indent_level", |editor, _args| {
            Ok(Value::from(active_indent(editor).px()))
        })]
    }
}

fn indent_ops(editor: &Editor, step: fn(IndentLevel) -> IndentLevel) -> Result<Vec<Op>, EditError> {
    let mut ops = Vec::new();
    for block in selected_text_blocks(editor)? {
        if !INDENTABLE.contains(&block.el.kind) {
            continue;
        }
        let current = indent_of(block.el);
        let next = step(current);
        if next == current {
            continue;
        }
        let patch = if next == IndentLevel::ZERO {
            AttrPatch::remove("indent")
        } else {
            AttrPatch::set("indent", Value::from(next.px()))
        };
        ops.push(Op::SetNodeAttrs {
            path: block.path.clone(),
            patch,
        });
    }
    Ok(ops)
}

fn shift_indent(
    editor: &Editor,
    step: fn(IndentLevel) -> IndentLevel,
    source: &'static str,
) -> Result<Transaction, EditError> {
    Ok(Transaction::new(indent_ops(editor, step)?).source(source))
}

fn would_shift(editor: &Editor, step: fn(IndentLevel) -> IndentLevel) -> bool {
    indent_ops(editor, step).is_ok_and(|ops| !ops.is_empty())
}

pub(crate) fn active_indent(editor: &Editor) -> IndentLevel {
    ancestor_element_path(editor.doc(), &editor.selection().focus.path, |kind| {
        INDENTABLE.contains(&kind)
    })
    .and_then(|path| element_at_path(editor.doc(), &path))
    .map(indent_of)
    .unwrap_or_default()
}
