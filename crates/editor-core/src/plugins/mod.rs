//! Feature plugins layered on top of the core plugin.

mod block;
mod indent;
mod list;
mod marks;
mod mention;
mod page_break;
mod table;

use crate::config::FeatureFlags;
use crate::core::{ElementNode, Node, NodeKind, Point, Selection};
use crate::ops::{Op, Path};
use crate::plugin::{CorePlugin, DividerPlugin, EditorPlugin, child_path};

pub(crate) use block::{active_align, active_block_type};
pub(crate) use indent::active_indent;
pub(crate) use list::active_list;
pub(crate) use marks::active_marks;
pub(crate) use table::{caption_of, table_path_at};

/// Plugins enabled by `features`, in registration order. The core plugin is always present.
pub(crate) fn builtin(features: &FeatureFlags) -> Vec<Box<dyn EditorPlugin>> {
    let mut plugins: Vec<Box<dyn EditorPlugin>> = vec![Box::new(CorePlugin)];
    let optional: [(bool, fn() -> Box<dyn EditorPlugin>); 13] = [
        (features.divider, || Box::new(DividerPlugin)),
        (features.marks, || Box::new(marks::MarksPlugin)),
        (features.text_style, || Box::new(marks::TextStylePlugin)),
        (features.heading, || Box::new(block::HeadingPlugin)),
        (features.align, || Box::new(block::AlignPlugin)),
        (features.blockquote, || Box::new(block::BlockquotePlugin)),
        (features.code_block, || Box::new(block::CodeBlockPlugin)),
        (features.indent, || Box::new(indent::IndentPlugin)),
        (features.lists, || Box::new(list::ListPlugin)),
        (features.tables, || Box::new(table::TablePlugin)),
        (features.tables && features.table_caption, || Box::new(table::TableCaptionPlugin)),
        (features.page_break, || Box::new(page_break::PageBreakPlugin)),
        (features.mention, || Box::new(mention::MentionPlugin)),
    ];
    plugins.extend(
        optional
            .into_iter()
            .filter(|(enabled, _)| *enabled)
            .map(|(_, make)| make()),
    );
    plugins
}

/// Moves siblings `first..=last` of `parent` into `wrapper`, placed at `first`.
/// With `item`, each moved sibling is first wrapped in its own element of that
/// kind (list items inside a list).
pub(crate) fn wrap_siblings(
    siblings: &[Node],
    parent: &[usize],
    first: usize,
    last: usize,
    mut wrapper: ElementNode,
    item: Option<NodeKind>,
    selection: &Selection,
) -> (Vec<Op>, Selection) {
    let moved = siblings[first..=last].iter().cloned();
    wrapper.children = match item {
        Some(kind) => moved.map(|node| Node::element(kind, vec![node])).collect(),
        None => moved.collect(),
    };

    let mut ops: Vec<Op> = (first..=last)
        .rev()
        .map(|ix| Op::RemoveNode {
            path: child_path(parent, ix),
        })
        .collect();
    ops.push(Op::InsertNode {
        path: child_path(parent, first),
        node: Node::Element(wrapper),
    });

    let depth = parent.len();
    let remap = |point: &Point| -> Point {
        if point.path.len() <= depth || !point.path.starts_with(parent) {
            return point.clone();
        }
        let ix = point.path[depth];
        let mut path: Path = parent.to_vec();
        if ix < first {
            return point.clone();
        } else if ix <= last {
            path.push(first);
            path.push(ix - first);
            if item.is_some() {
                path.push(0);
            }
        } else {
            path.push(ix - (last - first));
        }
        path.extend_from_slice(&point.path[depth + 1..]);
        Point::new(path, point.offset)
    };

    let selection = Selection::new(remap(&selection.anchor), remap(&selection.focus));
    (ops, selection)
}

/// Replaces the element at `path` by its children.
pub(crate) fn unwrap_element(path: &[usize], el: &ElementNode, selection: &Selection) -> (Vec<Op>, Selection) {
    let Some((&ix, parent)) = path.split_last() else {
        return (Vec::new(), selection.clone());
    };

    let mut ops = vec![Op::RemoveNode { path: path.to_vec() }];
    ops.extend(el.children.iter().cloned().enumerate().map(|(i, node)| Op::InsertNode {
        path: child_path(parent, ix + i),
        node,
    }));

    let depth = parent.len();
    let grown = el.children.len().saturating_sub(1);
    let remap = |point: &Point| -> Point {
        if point.path.len() <= depth || !point.path.starts_with(parent) {
            return point.clone();
        }
        let at = point.path[depth];
        let mut next: Path = parent.to_vec();
        if at < ix {
            return point.clone();
        } else if at == ix {
            let Some(&inner) = point.path.get(depth + 1) else {
                return point.clone();
            };
            next.push(ix + inner);
            next.extend_from_slice(&point.path[depth + 2..]);
        } else {
            next.push(at + grown);
            next.extend_from_slice(&point.path[depth + 1..]);
        }
        Point::new(next, point.offset)
    };

    let selection = Selection::new(remap(&selection.anchor), remap(&selection.focus));
    (ops, selection)
}
