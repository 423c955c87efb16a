use serde_json::Value;

use crate::core::{Editor, Marks, Node, Point, Selection, TextNode, clamp_to_char_boundary};
use crate::error::{EditError, QueryError};
use crate::ops::{Op, Transaction};
use crate::plugin::{
    CommandSpec, EditorPlugin, QuerySpec, apply_marks_in_block, child_path, is_point_in_block,
    node_at_path, ordered_selection_points, point_for_global_offset, point_global_offset,
    replace_children_ops, required_str, selected_text_blocks, total_inline_text_len,
};

pub(crate) struct MarksPlugin;

impl EditorPlugin for MarksPlugin {
    fn id(&self) -> &'static str {
        "marks"
    }

    fn commands(&self) -> Vec<CommandSpec> {
        let toggles: [(&str, &str, &[&str], fn(&Marks) -> bool, fn(&mut Marks, bool)); 5] = [
            ("bold", "Toggle bold", &["bold", "strong", "mark"], |m| m.bold, |m, v| m.bold = v),
            ("italic", "Toggle italic", &["italic", "emphasis", "mark"], |m| m.italic, |m, v| {
                m.italic = v
            }),
            ("underline", "Toggle underline", &["underline", "mark"], |m| m.underline, |m, v| {
                m.underline = v
            }),
            (
                "strikethrough",
                "Toggle strikethrough",
                &["strikethrough", "strike", "mark"],
                |m| m.strikethrough,
                |m, v| m.strikethrough = v,
            ),
            ("code", "Toggle code", &["code", "monospace", "mark"], |m| m.code, |m, v| m.code = v),
        ];

        let mut commands: Vec<CommandSpec> = toggles
            .into_iter()
            .map(|(name, label, keywords, get, set)| {
                let id = format!("marks.toggle_{name}");
                let source = format!("command:{id}");
                CommandSpec::new(id, label, move |editor, _args| {
                    toggle_bool_mark(editor, get, set, &source)
                })
                .description(format!("Toggle {name} on the current selection or caret."))
                .keywords(keywords.iter().copied())
            })
            .collect();

        commands.extend([
            CommandSpec::new("marks.set_link", "Set link", |editor, args| {
                let url = required_str(args.as_ref(), "url")?;
                set_optional_mark(editor, |m, v| m.link = v, Some(url), "command:marks.set_link")
            })
            .description("Set link mark on the current selection or caret.")
            .keywords(["link", "url", "hyperlink"])
            .args_example(serde_json::json!({ "url": "https://example.com" })),
            CommandSpec::new("marks.unset_link", "Unset link", |editor, _args| {
                set_optional_mark(editor, |m, v| m.link = v, None, "command:marks.unset_link")
            })
            .description("Remove link mark from the current selection or caret.")
            .keywords(["link", "unlink", "url", "hyperlink"]),
        ]);
        commands
    }

    fn queries(&self) -> Vec<QuerySpec> {
        vec![
            QuerySpec::new("marks.get_active", |editor, _args| {
                serde_json::to_value(active_marks(editor))
                    .map_err(|err| QueryError::new(format!("Failed to encode marks: {err}")))
            }),
            QuerySpec::new("marks.has_link_active", |editor, _args| {
                Ok(Value::Bool(active_marks(editor).link.is_some()))
            }),
        ]
    }
}

/// Color, highlight, font family and font size.
pub(crate) struct TextStylePlugin;

type OptionalMarkSetter = fn(&mut Marks, Option<String>);

impl EditorPlugin for TextStylePlugin {
    fn id(&self) -> &'static str {
        "text_style"
    }

    fn commands(&self) -> Vec<CommandSpec> {
        let styles: [(&str, &str, &str, OptionalMarkSetter, Value); 4] = [
            ("text_color", "text color", "color", |m, v| m.text_color = v, serde_json::json!({ "color": "#ff0000" })),
            (
                "highlight_color",
                "highlight color",
                "color",
                |m, v| m.highlight_color = v,
                serde_json::json!({ "color": "#fff59d" }),
            ),
            ("font_family", "font family", "family", |m, v| m.font_family = v, serde_json::json!({ "family": "Arial" })),
            ("font_size", "font size", "size", |m, v| m.font_size = v, serde_json::json!({ "size": "14px" })),
        ];

        let mut commands = Vec::new();
        for (name, label, arg, set, example) in styles {
            let set_id = format!("marks.set_{name}");
            let set_source = format!("command:{set_id}");
            commands.push(
                CommandSpec::new(set_id, format!("Set {label}"), move |editor, args| {
                    let value = required_str(args.as_ref(), arg)?;
                    if value.trim().is_empty() {
                        return Err(EditError::validation(format!("{label} must not be empty")));
                    }
                    set_optional_mark(editor, set, Some(value), &set_source)
                })
                .description(format!("Set {label} on the current selection or caret."))
                .keywords([label, "style"])
                .args_example(example),
            );
            let unset_id = format!("marks.unset_{name}");
            let unset_source = format!("command:{unset_id}");
            commands.push(
                CommandSpec::new(unset_id, format!("Unset {label}"), move |editor, _args| {
                    set_optional_mark(editor, set, None, &unset_source)
                })
                .description(format!("Remove {label} from the current selection or caret."))
                .keywords([label, "style", "reset"]),
            );
        }
        commands
    }
}

pub(crate) fn active_marks(editor: &Editor) -> Marks {
    let focus = &editor.selection().focus;
    match node_at_path(editor.doc(), &focus.path) {
        Some(Node::Text(text)) => text.marks.clone(),
        _ => Marks::default(),
    }
}

fn toggle_bool_mark(
    editor: &Editor,
    get: fn(&Marks) -> bool,
    set: fn(&mut Marks, bool),
    source: &str,
) -> Result<Transaction, EditError> {
    let sel = editor.selection().clone();
    let (ops, selection_after) = if sel.is_collapsed() {
        mark_at_caret(editor, |mut marks| {
            let target = !get(&marks);
            set(&mut marks, target);
            marks
        })?
    } else {
        let target = !all_selected_text_have_mark(editor, get)?;
        mark_range(editor, &|mut marks: Marks| {
            set(&mut marks, target);
            marks
        })?
    };
    Ok(Transaction::new(ops)
        .selection_after(selection_after)
        .source(source))
}

fn set_optional_mark(
    editor: &Editor,
    set: OptionalMarkSetter,
    value: Option<String>,
    source: &str,
) -> Result<Transaction, EditError> {
    let apply = |mut marks: Marks| {
        set(&mut marks, value.clone());
        marks
    };
    let (ops, selection_after) = if editor.selection().is_collapsed() {
        mark_at_caret(editor, apply)?
    } else {
        mark_range(editor, &apply)?
    };
    Ok(Transaction::new(ops)
        .selection_after(selection_after)
        .source(source))
}

/// Global `[start, end)` of the selection inside each selected block.
fn selected_ranges(editor: &Editor) -> Result<Vec<(crate::ops::Path, Vec<Node>, usize, usize)>, EditError> {
    let (start, end) = ordered_selection_points(editor.selection());
    let blocks = selected_text_blocks(editor)?;
    let last = blocks.len().saturating_sub(1);
    let mut out = Vec::with_capacity(blocks.len());
    for (ix, block) in blocks.iter().enumerate() {
        let children = &block.el.children;
        let total = total_inline_text_len(children);
        let from = if ix == 0 {
            point_global_offset(children, start.path.last().copied().unwrap_or(0), start.offset)
        } else {
            0
        };
        let to = if ix == last {
            point_global_offset(children, end.path.last().copied().unwrap_or(0), end.offset)
        } else {
            total
        };
        if from < to {
            out.push((block.path.clone(), children.clone(), from, to));
        }
    }
    Ok(out)
}

fn all_selected_text_have_mark(editor: &Editor, get: fn(&Marks) -> bool) -> Result<bool, EditError> {
    for (_, children, from, to) in selected_ranges(editor)? {
        let mut cursor = 0usize;
        for node in &children {
            let len = match node {
                Node::Text(t) => t.text.len(),
                Node::Void(v) => v.inline_text_len(),
                Node::Element(_) => continue,
            };
            let (node_start, node_end) = (cursor, cursor + len);
            cursor = node_end;
            if to <= node_start || from >= node_end {
                continue;
            }
            if let Node::Text(t) = node {
                if !get(&t.marks) {
                    return Ok(false);
                }
            }
        }
    }
    Ok(true)
}

fn mark_range(editor: &Editor, apply: &dyn Fn(Marks) -> Marks) -> Result<(Vec<Op>, Selection), EditError> {
    let sel = editor.selection();
    let mut ops = Vec::new();
    let mut anchor = sel.anchor.clone();
    let mut focus = sel.focus.clone();

    for (block_path, children, from, to) in selected_ranges(editor)? {
        let next = apply_marks_in_block(&children, from, to, &|m: Marks| apply(m).retain_rendered_markup());
        for point in [&mut anchor, &mut focus] {
            if is_point_in_block(point, &block_path) {
                let global = point_global_offset(&children, point.path.last().copied().unwrap_or(0), point.offset);
                *point = point_for_global_offset(&block_path, &next, global);
            }
        }
        ops.extend(replace_children_ops(&block_path, children.len(), next));
    }

    Ok((ops, Selection::new(anchor, focus)))
}

/// Stamps the marks the next typed character will carry by splitting an
/// empty leaf in at the caret.
fn mark_at_caret(editor: &Editor, apply: impl Fn(Marks) -> Marks) -> Result<(Vec<Op>, Selection), EditError> {
    let focus = editor.selection().focus.clone();
    let not_in_text = || EditError::structural("selection is not in a text node");
    let (&child_ix, block_path) = focus.path.split_last().ok_or_else(not_in_text)?;
    let Some(Node::Text(text)) = node_at_path(editor.doc(), &focus.path) else {
        return Err(not_in_text());
    };

    let marks_before = text.marks.clone();
    let marks_after = apply(marks_before.clone()).retain_rendered_markup();
    if text.text.is_empty() {
        return Ok((
            vec![Op::SetTextMarks {
                path: focus.path.clone(),
                marks: marks_after,
            }],
            Selection::collapsed(Point::new(focus.path.clone(), 0)),
        ));
    }

    let cursor = clamp_to_char_boundary(&text.text, focus.offset);
    let (left, right) = text.text.split_at(cursor);
    let mut replacement = Vec::new();
    let mut caret_ix = child_ix;
    if !left.is_empty() {
        replacement.push(Node::Text(TextNode {
            text: left.to_string(),
            marks: marks_before.clone(),
        }));
        caret_ix += 1;
    }
    replacement.push(Node::Text(TextNode {
        text: String::new(),
        marks: marks_after,
    }));
    if !right.is_empty() {
        replacement.push(Node::Text(TextNode {
            text: right.to_string(),
            marks: marks_before,
        }));
    }

    let mut ops = vec![Op::RemoveNode {
        path: focus.path.clone(),
    }];
    ops.extend(
        replacement
            .into_iter()
            .enumerate()
            .map(|(i, node)| Op::InsertNode {
                path: child_path(block_path, child_ix + i),
                node,
            }),
    );
    Ok((ops, Selection::collapsed(Point::new(child_path(block_path, caret_ix), 0))))
}
