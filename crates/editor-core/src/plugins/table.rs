//! Tables: `table > [table_caption] table_row+ > (table_cell | table_header)+ > blocks`.
//!
//! Column commands work on logical columns, so a cell with `colspan = n`
//! covers n of them. Rows are treated independently; `rowspan` is carried
//! through markup but does not shift cells in the rows below.

use serde_json::Value;

use crate::attributes::{AttributeSpec, CaptionPosition, caption_position_of, span_of, style_attr};
use crate::core::{AttrPatch, Document, Editor, ElementNode, MarkupAttrs, Node, NodeKind, Point, Selection};
use crate::error::{EditError, QueryError};
use crate::markup::MarkupElement;
use crate::ops::{Op, Path, Transaction};
use crate::plugin::{
    ChildConstraint, CommandSpec, NodeRole, NodeSpec, NormalizePass, EditorPlugin, PluginRegistry, QuerySpec,
    ancestor_element_path, arg_str, arg_u64, child_path, element_at_path, insertion_after_focus_block,
    ordered_selection_points, replace_node_ops,
};

const MAX_TABLE_DIM: u64 = 32;

pub(crate) struct TablePlugin;

impl EditorPlugin for TablePlugin {
    fn id(&self) -> &'static str {
        "table"
    }

    fn node_specs(&self) -> Vec<NodeSpec> {
        [NodeKind::Table, NodeKind::TableRow, NodeKind::TableCell, NodeKind::TableHeader]
            .into_iter()
            .map(|kind| NodeSpec::block(kind, ChildConstraint::BlockOnly))
            .collect()
    }

    fn attribute_specs(&self) -> Vec<AttributeSpec> {
        const CELLS: &[NodeKind] = &[NodeKind::TableCell, NodeKind::TableHeader];
        vec![
            AttributeSpec::new(CELLS, "colspan", Some(Value::from(1u64)), |el| parse_span(el, "colspan"), |v| {
                render_span(v, "colspan")
            })
            .validate(validate_span)
            .consumes(&["colspan"]),
            AttributeSpec::new(CELLS, "rowspan", Some(Value::from(1u64)), |el| parse_span(el, "rowspan"), |v| {
                render_span(v, "rowspan")
            })
            .validate(validate_span)
            .consumes(&["rowspan"]),
            AttributeSpec::new(
                CELLS,
                "background",
                None,
                |el| {
                    el.style("background-color")
                        .or_else(|| el.attr("data-background").map(str::to_string))
                        .map(Value::from)
                },
                |v| match v.as_str() {
                    Some(color) => style_attr("background-color", color),
                    None => MarkupAttrs::new(),
                },
            )
            .validate(|v| {
                let color = v.as_str()?.trim();
                (!color.is_empty() && !color.contains([';', '"'])).then(|| Value::from(color))
            })
            .consumes(&["style:background-color", "data-background"]),
        ]
    }

    fn normalize_passes(&self) -> Vec<Box<dyn NormalizePass>> {
        vec![Box::new(NormalizeTableStructure)]
    }

    fn commands(&self) -> Vec<CommandSpec> {
        vec![
            CommandSpec::new("table.insert", "Insert table", |editor, args| {
                let rows = arg_u64(args.as_ref(), "rows").unwrap_or(3).clamp(1, MAX_TABLE_DIM) as usize;
                let cols = arg_u64(args.as_ref(), "cols").unwrap_or(3).clamp(1, MAX_TABLE_DIM) as usize;
                let header = args
                    .as_ref()
                    .and_then(|v| v.get("with_header_row"))
                    .and_then(Value::as_bool)
                    .unwrap_or(false);
                insert_table(editor, rows, cols, header)
            })
            .description("Insert a table after the current block.")
            .keywords(["table", "grid"])
            .args_example(serde_json::json!({ "rows": 3, "cols": 3, "with_header_row": true }))
            .check(|editor, _args| table_path_at(editor).is_none()),
            table_command("table.insert_row_above", "Insert row above", |editor| insert_row(editor, false)),
            table_command("table.insert_row_below", "Insert row below", |editor| insert_row(editor, true)),
            table_command("table.insert_col_left", "Insert column left", |editor| insert_col(editor, false)),
            table_command("table.insert_col_right", "Insert column right", |editor| insert_col(editor, true)),
            table_command("table.delete_row", "Delete row", delete_row),
            table_command("table.delete_col", "Delete column", delete_col),
            table_command("table.delete_table", "Delete table", delete_table),
            table_command("table.merge_cell_right", "Merge cell right", merge_cell_right),
            table_command("table.split_cell", "Split cell", split_cell),
            CommandSpec::new("table.set_cell_attr", "Set cell attribute", |editor, args| {
                set_cell_attr(editor, args.as_ref())
            })
            .description("Set a declared attribute on the current cell; null resets it.")
            .keywords(["table", "cell", "background", "colspan"])
            .args_example(serde_json::json!({ "name": "background", "value": "#fef3c7" }))
            .check(|editor, _args| cursor(editor).is_ok()),
        ]
    }

    fn queries(&self) -> Vec<QuerySpec> {
        vec![QuerySpec::new("table.is_active", |editor, _args| {
            Ok(Value::Bool(table_path_at(editor).is_some()))
        })]
    }
}

fn table_command(
    id: &'static str,
    label: &'static str,
    run: fn(&Editor) -> Result<Transaction, EditError>,
) -> CommandSpec {
    CommandSpec::new(id, label, move |editor, _args| run(editor))
        .keywords(["table"])
        .check(move |editor, _args| run(editor).is_ok())
}

fn parse_span(el: &MarkupElement, name: &str) -> Option<Value> {
    let span = el.attr(name)?.trim().parse::<u64>().ok()?;
    Some(Value::from(span.max(1)))
}

fn render_span(value: &Value, name: &str) -> MarkupAttrs {
    let mut attrs = MarkupAttrs::new();
    if let Some(span) = value.as_u64().filter(|span| *span > 1) {
        attrs.insert(name.to_string(), span.to_string());
    }
    attrs
}

fn validate_span(value: &Value) -> Option<Value> {
    value.as_u64().filter(|span| (1..=1000).contains(span)).map(Value::from)
}

/// Nearest table around the start of the selection.
pub(crate) fn table_path_at(editor: &Editor) -> Option<Path> {
    let (start, _) = ordered_selection_points(editor.selection());
    ancestor_element_path(editor.doc(), &start.path, |kind| kind == NodeKind::Table)
}

/// Child index and node of a table's caption.
pub(crate) fn caption_of(table: &ElementNode) -> Option<(usize, &ElementNode)> {
    table.children.iter().enumerate().find_map(|(ix, node)| match node {
        Node::Element(el) if el.kind == NodeKind::TableCaption => Some((ix, el)),
        _ => None,
    })
}

fn empty_cell(kind: NodeKind) -> Node {
    Node::element(kind, vec![Node::paragraph("")])
}

fn table_node(rows: usize, cols: usize, header: bool) -> Node {
    let children = (0..rows)
        .map(|r| {
            let kind = if header && r == 0 {
                NodeKind::TableHeader
            } else {
                NodeKind::TableCell
            };
            Node::element(NodeKind::TableRow, (0..cols).map(|_| empty_cell(kind)).collect())
        })
        .collect();
    Node::element(NodeKind::Table, children)
}

fn rows_of(table: &ElementNode) -> impl Iterator<Item = (usize, &ElementNode)> {
    table.children.iter().enumerate().filter_map(|(ix, node)| match node {
        Node::Element(el) if el.kind == NodeKind::TableRow => Some((ix, el)),
        _ => None,
    })
}

/// `(first logical column, colspan)` of every cell in a row.
fn cell_columns(row: &ElementNode) -> Vec<(usize, usize)> {
    let mut col = 0;
    row.children
        .iter()
        .map(|node| {
            let span = match node {
                Node::Element(cell) => span_of(cell, "colspan"),
                _ => 1,
            };
            let at = (col, span);
            col += span;
            at
        })
        .collect()
}

fn row_width(row: &ElementNode) -> usize {
    cell_columns(row).last().map_or(0, |(col, span)| col + span)
}

fn header_row(row: &ElementNode) -> bool {
    !row.children.is_empty() && row.children.iter().all(|c| c.kind() == Some(NodeKind::TableHeader))
}

struct TableCursor<'a> {
    table_path: Path,
    table: &'a ElementNode,
    row_ix: usize,
    row: &'a ElementNode,
    cell_ix: usize,
    cell: &'a ElementNode,
    col: usize,
    span: usize,
}

impl TableCursor<'_> {
    fn caret_in(&self, row_ix: usize, cell_ix: usize) -> Selection {
        let mut path = self.table_path.clone();
        path.extend([row_ix, cell_ix, 0, 0]);
        Selection::collapsed(Point::new(path, 0))
    }

    fn cell_path(&self) -> Path {
        let mut path = self.table_path.clone();
        path.extend([self.row_ix, self.cell_ix]);
        path
    }
}

fn cursor(editor: &Editor) -> Result<TableCursor<'_>, EditError> {
    let doc = editor.doc();
    let (start, _) = ordered_selection_points(editor.selection());
    let cell_path = ancestor_element_path(doc, &start.path, NodeKind::is_table_cell).ok_or_else(EditError::not_in_table)?;
    let (&cell_ix, row_path) = cell_path.split_last().ok_or_else(EditError::not_in_table)?;
    let (&row_ix, table_path) = row_path.split_last().ok_or_else(EditError::not_in_table)?;
    let table = element_at_path(doc, table_path)
        .filter(|el| el.kind == NodeKind::Table)
        .ok_or_else(EditError::not_in_table)?;
    let row = element_at_path(doc, row_path).ok_or_else(EditError::not_in_table)?;
    let cell = element_at_path(doc, &cell_path).ok_or_else(EditError::not_in_table)?;
    let (col, span) = cell_columns(row).get(cell_ix).copied().unwrap_or((0, 1));
    Ok(TableCursor {
        table_path: table_path.to_vec(),
        table,
        row_ix,
        row,
        cell_ix,
        cell,
        col,
        span,
    })
}

fn insert_table(editor: &Editor, rows: usize, cols: usize, header: bool) -> Result<Transaction, EditError> {
    if table_path_at(editor).is_some() {
        return Err(EditError::structural("tables cannot be nested"));
    }
    let (parent, insert_at) = insertion_after_focus_block(editor);
    let table_path = child_path(&parent, insert_at);
    let mut caret = table_path.clone();
    caret.extend([0, 0, 0, 0]);

    Ok(Transaction::new(vec![
        Op::InsertNode {
            path: table_path,
            node: table_node(rows, cols, header),
        },
        Op::InsertNode {
            path: child_path(&parent, insert_at + 1),
            node: Node::paragraph(""),
        },
    ])
    .selection_after(Selection::collapsed(Point::new(caret, 0)))
    .source("command:table.insert"))
}

fn insert_row(editor: &Editor, below: bool) -> Result<Transaction, EditError> {
    let at = cursor(editor)?;
    let width = row_width(at.row).max(1);
    let row_ix = if below { at.row_ix + 1 } else { at.row_ix };
    let row = Node::element(NodeKind::TableRow, (0..width).map(|_| empty_cell(NodeKind::TableCell)).collect());

    Ok(Transaction::new(vec![Op::InsertNode {
        path: child_path(&at.table_path, row_ix),
        node: row,
    }])
    .selection_after(at.caret_in(row_ix, at.col.min(width - 1)))
    .source(if below {
        "command:table.insert_row_below"
    } else {
        "command:table.insert_row_above"
    }))
}

fn insert_col(editor: &Editor, right: bool) -> Result<Transaction, EditError> {
    let at = cursor(editor)?;
    let boundary = if right { at.col + at.span } else { at.col };
    let mut ops = Vec::new();

    for (row_ix, row) in rows_of(at.table) {
        let row_path = child_path(&at.table_path, row_ix);
        let columns = cell_columns(row);
        let kind = if header_row(row) {
            NodeKind::TableHeader
        } else {
            NodeKind::TableCell
        };
        if let Some(ix) = columns.iter().position(|(col, _)| *col == boundary) {
            ops.push(Op::InsertNode {
                path: child_path(&row_path, ix),
                node: empty_cell(kind),
            });
        } else if let Some(ix) = columns
            .iter()
            .position(|(col, span)| *col < boundary && boundary < col + span)
        {
            ops.push(Op::SetNodeAttrs {
                path: child_path(&row_path, ix),
                patch: AttrPatch::set("colspan", Value::from((columns[ix].1 + 1) as u64)),
            });
        } else {
            ops.push(Op::InsertNode {
                path: child_path(&row_path, row.children.len()),
                node: empty_cell(kind),
            });
        }
    }

    let cell_ix = if right { at.cell_ix + 1 } else { at.cell_ix };
    Ok(Transaction::new(ops)
        .selection_after(at.caret_in(at.row_ix, cell_ix))
        .source(if right {
            "command:table.insert_col_right"
        } else {
            "command:table.insert_col_left"
        }))
}

fn replace_table_with_paragraph(table_path: &[usize], source: &'static str) -> Transaction {
    let mut caret = table_path.to_vec();
    caret.push(0);
    Transaction::new(replace_node_ops(table_path, Node::paragraph("")).to_vec())
        .selection_after(Selection::collapsed(Point::new(caret, 0)))
        .source(source)
}

fn delete_table(editor: &Editor) -> Result<Transaction, EditError> {
    let table_path = table_path_at(editor).ok_or_else(EditError::not_in_table)?;
    Ok(replace_table_with_paragraph(&table_path, "command:table.delete_table"))
}

fn delete_row(editor: &Editor) -> Result<Transaction, EditError> {
    let at = cursor(editor)?;
    let rows: Vec<(usize, &ElementNode)> = rows_of(at.table).collect();
    if rows.len() <= 1 {
        return Ok(replace_table_with_paragraph(&at.table_path, "command:table.delete_row"));
    }

    let pos = rows.iter().position(|(ix, _)| *ix == at.row_ix).unwrap_or(0);
    // The next row slides into the removed slot; the last row falls back to the previous one.
    let (target_ix, target_row) = match rows.get(pos + 1) {
        Some((_, row)) => (at.row_ix, *row),
        None => rows[pos.saturating_sub(1)],
    };
    let cell_ix = at.cell_ix.min(target_row.children.len().saturating_sub(1));

    Ok(Transaction::new(vec![Op::RemoveNode {
        path: child_path(&at.table_path, at.row_ix),
    }])
    .selection_after(at.caret_in(target_ix, cell_ix))
    .source("command:table.delete_row"))
}

fn delete_col(editor: &Editor) -> Result<Transaction, EditError> {
    let at = cursor(editor)?;
    let width = rows_of(at.table).map(|(_, row)| row_width(row)).max().unwrap_or(0);
    if width <= 1 {
        return Ok(replace_table_with_paragraph(&at.table_path, "command:table.delete_col"));
    }

    let mut ops = Vec::new();
    let mut current_removed = false;
    for (row_ix, row) in rows_of(at.table) {
        let columns = cell_columns(row);
        let Some(ix) = columns
            .iter()
            .position(|(col, span)| *col <= at.col && at.col < col + span)
        else {
            continue;
        };
        let path = child_path(&child_path(&at.table_path, row_ix), ix);
        let span = columns[ix].1;
        if span > 1 {
            let patch = if span == 2 {
                AttrPatch::remove("colspan")
            } else {
                AttrPatch::set("colspan", Value::from((span - 1) as u64))
            };
            ops.push(Op::SetNodeAttrs { path, patch });
        } else {
            current_removed |= row_ix == at.row_ix;
            ops.push(Op::RemoveNode { path });
        }
    }

    let cell_ix = if current_removed && at.cell_ix + 1 >= at.row.children.len() {
        at.cell_ix.saturating_sub(1)
    } else {
        at.cell_ix
    };
    Ok(Transaction::new(ops)
        .selection_after(at.caret_in(at.row_ix, cell_ix))
        .source("command:table.delete_col"))
}

fn is_blank_cell(cell: &ElementNode) -> bool {
    match cell.children.as_slice() {
        [] => true,
        [Node::Element(p)] => {
            p.kind == NodeKind::Paragraph
                && p.children
                    .iter()
                    .all(|n| matches!(n, Node::Text(t) if t.text.is_empty()))
        }
        _ => false,
    }
}

fn merge_cell_right(editor: &Editor) -> Result<Transaction, EditError> {
    let at = cursor(editor)?;
    let Some(Node::Element(next)) = at.row.children.get(at.cell_ix + 1) else {
        return Err(EditError::structural("no cell to the right"));
    };

    let mut merged = at.cell.clone();
    merged
        .attrs
        .insert("colspan".to_string(), Value::from((at.span + span_of(next, "colspan")) as u64));
    if !is_blank_cell(next) {
        if is_blank_cell(&merged) {
            merged.children.clear();
        }
        merged.children.extend(next.children.iter().cloned());
    }

    let cell_path = at.cell_path();
    let mut ops = vec![Op::RemoveNode {
        path: child_path(&child_path(&at.table_path, at.row_ix), at.cell_ix + 1),
    }];
    ops.extend(replace_node_ops(&cell_path, Node::Element(merged)));

    let mut caret = cell_path;
    caret.extend([0, 0]);
    Ok(Transaction::new(ops)
        .selection_after(Selection::collapsed(Point::new(caret, 0)))
        .source("command:table.merge_cell_right"))
}

fn split_cell(editor: &Editor) -> Result<Transaction, EditError> {
    let at = cursor(editor)?;
    if at.span <= 1 {
        return Err(EditError::structural("cell is not merged"));
    }

    let row_path = child_path(&at.table_path, at.row_ix);
    let mut ops = vec![Op::SetNodeAttrs {
        path: at.cell_path(),
        patch: AttrPatch::remove("colspan"),
    }];
    ops.extend((1..at.span).map(|i| Op::InsertNode {
        path: child_path(&row_path, at.cell_ix + i),
        node: empty_cell(at.cell.kind),
    }));
    Ok(Transaction::new(ops).source("command:table.split_cell"))
}

fn set_cell_attr(editor: &Editor, args: Option<&Value>) -> Result<Transaction, EditError> {
    let name = arg_str(args, "name").ok_or_else(|| EditError::validation("Missing args.name"))?;
    let value = args
        .and_then(|v| v.get("value"))
        .ok_or_else(|| EditError::validation("Missing args.value"))?;
    let at = cursor(editor)?;
    let registry = editor.registry();

    let patch = if value.is_null() {
        if registry.attribute_spec(at.cell.kind, name).is_none() {
            return Err(EditError::validation(format!("{name} is not declared for {}", at.cell.kind.as_str())));
        }
        at.cell.attrs.contains_key(name).then(|| AttrPatch::remove(name))
    } else {
        registry.attr_change(at.cell.kind, &at.cell.attrs, name, value)?
    };

    let ops = patch
        .map(|patch| Op::SetNodeAttrs {
            path: at.cell_path(),
            patch,
        })
        .into_iter()
        .collect();
    Ok(Transaction::new(ops).source("command:table.set_cell_attr"))
}

/// Keeps every table well formed: at most one caption, first; only rows
/// below the table; only cells in rows; every row as wide as the widest.
struct NormalizeTableStructure;

impl NormalizePass for NormalizeTableStructure {
    fn id(&self) -> &'static str {
        "table.normalize_structure"
    }

    fn run(&self, doc: &Document, registry: &PluginRegistry) -> Vec<Op> {
        let is_inline = |node: &Node| match node {
            Node::Text(_) => true,
            Node::Void(v) => registry.node_spec(v.kind).is_some_and(|spec| spec.role == NodeRole::Inline),
            Node::Element(_) => false,
        };

        fn walk(
            children: &[Node],
            path: &mut Vec<usize>,
            parent: Option<NodeKind>,
            is_inline: &dyn Fn(&Node) -> bool,
        ) -> Option<Vec<Op>> {
            for (ix, node) in children.iter().enumerate() {
                let Node::Element(el) = node else {
                    continue;
                };
                path.push(ix);
                let fix = match el.kind {
                    NodeKind::Table => fix_table(el, path).or_else(|| walk(&el.children, path, Some(el.kind), is_inline)),
                    NodeKind::TableCaption if parent != Some(NodeKind::Table) => {
                        let mut p = ElementNode::new(NodeKind::Paragraph, el.children.clone());
                        p.passthrough = el.passthrough.clone();
                        Some(replace_node_ops(path, Node::Element(p)).to_vec())
                    }
                    NodeKind::TableRow if parent != Some(NodeKind::Table) => {
                        Some(replace_node_ops(path, Node::element(NodeKind::Table, vec![node.clone()])).to_vec())
                    }
                    kind if kind.is_table_cell() && parent != Some(NodeKind::TableRow) => {
                        let row = Node::element(NodeKind::TableRow, vec![node.clone()]);
                        Some(replace_node_ops(path, Node::element(NodeKind::Table, vec![row])).to_vec())
                    }
                    kind if kind.is_table_cell() => match el.children.iter().position(is_inline) {
                        Some(inline_ix) => {
                            let p = Node::element(NodeKind::Paragraph, vec![el.children[inline_ix].clone()]);
                            Some(replace_node_ops(&child_path(path, inline_ix), p).to_vec())
                        }
                        None => walk(&el.children, path, Some(el.kind), is_inline),
                    },
                    _ => walk(&el.children, path, Some(el.kind), is_inline),
                };
                path.pop();
                if fix.is_some() {
                    return fix;
                }
            }
            None
        }

        walk(&doc.children, &mut Vec::new(), None, &is_inline).unwrap_or_default()
    }
}

fn fix_table(table: &ElementNode, path: &[usize]) -> Option<Vec<Op>> {
    let captions: Vec<usize> = table
        .children
        .iter()
        .enumerate()
        .filter(|(_, n)| n.kind() == Some(NodeKind::TableCaption))
        .map(|(ix, _)| ix)
        .collect();
    match captions.as_slice() {
        [] | [0] => {}
        [_, extra, ..] => {
            return Some(vec![Op::RemoveNode {
                path: child_path(path, *extra),
            }]);
        }
        [misplaced] => {
            return Some(vec![
                Op::RemoveNode {
                    path: child_path(path, *misplaced),
                },
                Op::InsertNode {
                    path: child_path(path, 0),
                    node: table.children[*misplaced].clone(),
                },
            ]);
        }
    }

    for (ix, node) in table.children.iter().enumerate() {
        match node.kind() {
            Some(NodeKind::TableRow | NodeKind::TableCaption) => {}
            Some(kind) if kind.is_table_cell() => {
                let row = Node::element(NodeKind::TableRow, vec![node.clone()]);
                return Some(replace_node_ops(&child_path(path, ix), row).to_vec());
            }
            _ => {
                let block = match node {
                    Node::Text(_) => Node::element(NodeKind::Paragraph, vec![node.clone()]),
                    _ => node.clone(),
                };
                let row = Node::element(NodeKind::TableRow, vec![Node::element(NodeKind::TableCell, vec![block])]);
                return Some(replace_node_ops(&child_path(path, ix), row).to_vec());
            }
        }
    }

    let rows: Vec<(usize, &ElementNode)> = rows_of(table).collect();
    if rows.is_empty() {
        let row = Node::element(NodeKind::TableRow, vec![empty_cell(NodeKind::TableCell)]);
        return Some(vec![Op::InsertNode {
            path: child_path(path, table.children.len()),
            node: row,
        }]);
    }

    for (row_ix, row) in &rows {
        let row_path = child_path(path, *row_ix);
        if let Some(ix) = row.children.iter().position(|n| !n.kind().is_some_and(NodeKind::is_table_cell)) {
            let block = match &row.children[ix] {
                Node::Text(_) => Node::element(NodeKind::Paragraph, vec![row.children[ix].clone()]),
                other => other.clone(),
            };
            return Some(replace_node_ops(&child_path(&row_path, ix), Node::element(NodeKind::TableCell, vec![block])).to_vec());
        }
    }

    let width = rows.iter().map(|(_, row)| row_width(row)).max().unwrap_or(0).max(1);
    let ops: Vec<Op> = rows
        .iter()
        .flat_map(|(row_ix, row)| {
            let row_path = child_path(path, *row_ix);
            let len = row.children.len();
            (0..width - row_width(row).min(width)).map(move |i| Op::InsertNode {
                path: child_path(&row_path, len + i),
                node: empty_cell(NodeKind::TableCell),
            })
        })
        .collect();
    (!ops.is_empty()).then_some(ops)
}

pub(crate) struct TableCaptionPlugin;

impl EditorPlugin for TableCaptionPlugin {
    fn id(&self) -> &'static str {
        "table_caption"
    }

    fn node_specs(&self) -> Vec<NodeSpec> {
        vec![NodeSpec::block(NodeKind::TableCaption, ChildConstraint::InlineOnly)]
    }

    fn attribute_specs(&self) -> Vec<AttributeSpec> {
        vec![
            AttributeSpec::new(
                &[NodeKind::TableCaption],
                "position",
                Some(Value::from(CaptionPosition::Top.as_css())),
                |el| {
                    let raw = el.attr("data-position").map(str::to_string).or_else(|| el.style("caption-side"))?;
                    CaptionPosition::from_css(&raw).map(|p| Value::from(p.as_css()))
                },
                |value| {
                    let position = value.as_str().and_then(CaptionPosition::from_css).unwrap_or_default();
                    let mut attrs = style_attr("caption-side", position.as_css());
                    attrs.insert("data-position".to_string(), position.as_css().to_string());
                    attrs
                },
            )
            .validate(|value| {
                let position = CaptionPosition::from_css(value.as_str()?)?;
                Some(Value::from(position.as_css()))
            })
            .consumes(&["data-position", "style:caption-side"]),
        ]
    }

    fn commands(&self) -> Vec<CommandSpec> {
        vec![
            CommandSpec::new("table.set_caption", "Set table caption", |editor, args| {
                let position = arg_str(args.as_ref(), "position").unwrap_or("top");
                set_caption(editor, position)
            })
            .description("Add a caption to the current table, or move the existing one.")
            .keywords(["table", "caption", "legenda"])
            .args_example(serde_json::json!({ "position": "bottom" }))
            .check(|editor, _args| table_path_at(editor).is_some()),
            CommandSpec::new("table.toggle_caption", "Toggle table caption", |editor, _args| {
                toggle_caption(editor)
            })
            .description("Add or remove the caption of the current table.")
            .keywords(["table", "caption"])
            .check(|editor, _args| table_path_at(editor).is_some()),
            CommandSpec::new(
                "table.update_caption_position",
                "Update caption position",
                |editor, args| {
                    let position = arg_str(args.as_ref(), "position")
                        .ok_or_else(|| EditError::validation("Missing args.position"))?;
                    update_caption_position(editor, position)
                },
            )
            .description("Move the caption of the current table to the top or bottom.")
            .keywords(["table", "caption", "position"])
            .args_example(serde_json::json!({ "position": "bottom" }))
            .check(|editor, _args| {
                table_path_at(editor)
                    .and_then(|path| element_at_path(editor.doc(), &path))
                    .is_some_and(|table| caption_of(table).is_some())
            }),
        ]
    }

    fn queries(&self) -> Vec<QuerySpec> {
        vec![QuerySpec::new("table.caption", |editor, _args| {
            let caption = table_path_at(editor)
                .and_then(|path| element_at_path(editor.doc(), &path))
                .and_then(caption_of);
            match caption {
                Some((_, el)) => serde_json::to_value(caption_position_of(el))
                    .map(|position| serde_json::json!({ "position": position }))
                    .map_err(|err| QueryError::new(format!("Failed to encode caption: {err}"))),
                None => Ok(Value::Null),
            }
        })]
    }
}

fn current_table(editor: &Editor) -> Result<(Path, &ElementNode), EditError> {
    let path = table_path_at(editor).ok_or_else(EditError::not_in_table)?;
    let table = element_at_path(editor.doc(), &path).ok_or_else(EditError::not_in_table)?;
    Ok((path, table))
}

fn set_caption(editor: &Editor, position: &str) -> Result<Transaction, EditError> {
    let (table_path, table) = current_table(editor)?;
    let registry = editor.registry();
    let patch = registry.attr_patch(NodeKind::TableCaption, "position", &Value::from(position))?;

    if let Some((ix, caption)) = caption_of(table) {
        let ops = registry
            .attr_change(NodeKind::TableCaption, &caption.attrs, "position", &Value::from(position))?
            .map(|patch| Op::SetNodeAttrs {
                path: child_path(&table_path, ix),
                patch,
            })
            .into_iter()
            .collect();
        return Ok(Transaction::new(ops).source("command:table.set_caption"));
    }

    let mut caption = ElementNode::new(NodeKind::TableCaption, vec![Node::text("")]);
    caption.attrs.extend(patch.set);
    let caption_path = child_path(&table_path, 0);
    let mut caret = caption_path.clone();
    caret.push(0);
    Ok(Transaction::new(vec![Op::InsertNode {
        path: caption_path,
        node: Node::Element(caption),
    }])
    .selection_after(Selection::collapsed(Point::new(caret, 0)))
    .source("command:table.set_caption"))
}

fn toggle_caption(editor: &Editor) -> Result<Transaction, EditError> {
    let (table_path, table) = current_table(editor)?;
    let Some((ix, _)) = caption_of(table) else {
        let mut tx = set_caption(editor, CaptionPosition::default().as_css())?;
        tx.meta.source = Some("command:table.toggle_caption".to_string());
        return Ok(tx);
    };

    let caption_path = child_path(&table_path, ix);
    let tx = Transaction::new(vec![Op::RemoveNode {
        path: caption_path.clone(),
    }])
    .source("command:table.toggle_caption");
    if !editor.selection().focus.path.starts_with(&caption_path) {
        return Ok(tx);
    }

    // The caret leaves the removed caption for the first cell.
    let first_row = rows_of(table).next().map_or(0, |(row_ix, _)| row_ix);
    let mut caret = table_path;
    caret.extend([first_row.saturating_sub(1), 0, 0, 0]);
    Ok(tx.selection_after(Selection::collapsed(Point::new(caret, 0))))
}

fn update_caption_position(editor: &Editor, position: &str) -> Result<Transaction, EditError> {
    let (table_path, table) = current_table(editor)?;
    let registry = editor.registry();
    registry.attr_patch(NodeKind::TableCaption, "position", &Value::from(position))?;
    let (ix, caption) = caption_of(table).ok_or_else(|| EditError::structural("table has no caption"))?;
    let ops = registry
        .attr_change(NodeKind::TableCaption, &caption.attrs, "position", &Value::from(position))?
        .map(|patch| Op::SetNodeAttrs {
            path: child_path(&table_path, ix),
            patch,
        })
        .into_iter()
        .collect();
    Ok(Transaction::new(ops).source("command:table.update_caption_position"))
}
