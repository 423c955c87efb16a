use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::attributes::{AttributeSpec, merge_markup_attrs, strip_consumed};
use crate::config::FeatureFlags;
use crate::core::{
    AttrPatch, Attrs, Document, Editor, ElementNode, MarkupAttrs, Marks, Node, NodeKind, Point,
    Selection, TextNode, clamp_to_char_boundary,
};
use crate::error::{ConfigError, EditError, QueryError};
use crate::markup::MarkupElement;
use crate::ops::{Op, Path, Transaction};
use crate::plugins;

pub type CommandHandler =
    Arc<dyn Fn(&Editor, Option<Value>) -> Result<Transaction, EditError> + Send + Sync>;
pub type CommandCheck = Arc<dyn Fn(&Editor, Option<&Value>) -> bool + Send + Sync>;

#[derive(Clone)]
pub struct CommandSpec {
    pub id: String,
    pub label: String,
    pub description: Option<String>,
    pub keywords: Vec<String>,
    pub args_example: Option<serde_json::Value>,
    pub hidden: bool,
    pub handler: CommandHandler,
    /// Cheap eligibility predicate used by dry runs instead of building the transaction.
    pub check: Option<CommandCheck>,
}

impl CommandSpec {
    pub fn new(
        id: impl Into<String>,
        label: impl Into<String>,
        handler: impl Fn(&Editor, Option<Value>) -> Result<Transaction, EditError>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            description: None,
            keywords: Vec::new(),
            args_example: None,
            hidden: false,
            handler: Arc::new(handler),
            check: None,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keywords = keywords.into_iter().map(Into::into).collect();
        self
    }

    pub fn args_example(mut self, args_example: serde_json::Value) -> Self {
        self.args_example = Some(args_example);
        self
    }

    pub fn hidden(mut self, hidden: bool) -> Self {
        self.hidden = hidden;
        self
    }

    pub fn check(
        mut self,
        check: impl Fn(&Editor, Option<&Value>) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.check = Some(Arc::new(check));
        self
    }
}

#[derive(Clone)]
pub struct QuerySpec {
    pub id: String,
    pub handler:
        Arc<dyn Fn(&Editor, Option<serde_json::Value>) -> Result<serde_json::Value, QueryError> + Send + Sync>,
}

impl QuerySpec {
    pub fn new(
        id: impl Into<String>,
        handler: impl Fn(&Editor, Option<Value>) -> Result<Value, QueryError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            id: id.into(),
            handler: Arc::new(handler),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeRole {
    Block,
    Inline,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChildConstraint {
    None,
    BlockOnly,
    InlineOnly,
    Any,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSpec {
    pub kind: NodeKind,
    pub role: NodeRole,
    pub is_void: bool,
    pub children: ChildConstraint,
}

impl NodeSpec {
    pub fn block(kind: NodeKind, children: ChildConstraint) -> Self {
        Self {
            kind,
            role: NodeRole::Block,
            is_void: false,
            children,
        }
    }

    pub fn block_void(kind: NodeKind) -> Self {
        Self {
            kind,
            role: NodeRole::Block,
            is_void: true,
            children: ChildConstraint::None,
        }
    }

    pub fn inline_void(kind: NodeKind) -> Self {
        Self {
            kind,
            role: NodeRole::Inline,
            is_void: true,
            children: ChildConstraint::None,
        }
    }
}

pub trait NormalizePass: Send + Sync {
    fn id(&self) -> &'static str;
    fn run(&self, doc: &Document, registry: &PluginRegistry) -> Vec<Op>;
}

#[derive(Debug, Clone)]
pub struct TransactionPreview {
    pub doc: Document,
    pub selection: Selection,
}

pub trait EditorPlugin: Send + Sync {
    fn id(&self) -> &'static str;
    fn node_specs(&self) -> Vec<NodeSpec> {
        Vec::new()
    }
    fn attribute_specs(&self) -> Vec<AttributeSpec> {
        Vec::new()
    }
    fn normalize_passes(&self) -> Vec<Box<dyn NormalizePass>> {
        Vec::new()
    }
    fn commands(&self) -> Vec<CommandSpec> {
        Vec::new()
    }
    fn queries(&self) -> Vec<QuerySpec> {
        Vec::new()
    }
}

#[derive(Default)]
pub struct PluginRegistry {
    plugin_ids: Vec<&'static str>,
    node_specs: HashMap<NodeKind, NodeSpec>,
    attribute_specs: Vec<AttributeSpec>,
    normalize_passes: Vec<Box<dyn NormalizePass>>,
    commands: HashMap<String, CommandSpec>,
    queries: HashMap<String, QuerySpec>,
}

impl PluginRegistry {
    pub fn new(plugins: impl IntoIterator<Item = Box<dyn EditorPlugin>>) -> Result<Self, ConfigError> {
        let mut registry = Self::default();
        for plugin in plugins {
            registry.register_plugin(plugin)?;
        }
        Ok(registry)
    }

    /// Paragraphs, dividers, line breaks and plain text editing.
    pub fn core() -> Self {
        Self::builtin(plugins::builtin(&FeatureFlags::none()))
    }

    /// Every built-in extension.
    pub fn richtext() -> Self {
        Self::from_features(&FeatureFlags::default())
    }

    pub fn from_features(features: &FeatureFlags) -> Self {
        Self::builtin(plugins::builtin(features))
    }

    fn builtin(plugins: Vec<Box<dyn EditorPlugin>>) -> Self {
        let mut registry = Self::default();
        for plugin in plugins {
            let id = plugin.id();
            if let Err(err) = registry.register_plugin(plugin) {
                warn!(plugin = id, %err, "skipping plugin");
            }
        }
        registry
    }

    pub fn register_plugin(&mut self, plugin: Box<dyn EditorPlugin>) -> Result<(), ConfigError> {
        if self.plugin_ids.contains(&plugin.id()) {
            return Err(ConfigError::Registry(format!(
                "Duplicate plugin id: {}",
                plugin.id()
            )));
        }

        let node_specs = plugin.node_specs();
        for spec in &node_specs {
            if self.node_specs.contains_key(&spec.kind) {
                return Err(ConfigError::Registry(format!(
                    "Duplicate node spec kind: {}",
                    spec.kind
                )));
            }
        }
        let commands = plugin.commands();
        for cmd in &commands {
            if self.commands.contains_key(&cmd.id) {
                return Err(ConfigError::Registry(format!(
                    "Duplicate command id: {}",
                    cmd.id
                )));
            }
        }
        let queries = plugin.queries();
        for query in &queries {
            if self.queries.contains_key(&query.id) {
                return Err(ConfigError::Registry(format!(
                    "Duplicate query id: {}",
                    query.id
                )));
            }
        }
        let attribute_specs = plugin.attribute_specs();
        for spec in &attribute_specs {
            for kind in &spec.kinds {
                if self.attribute_spec(*kind, spec.name).is_some() {
                    return Err(ConfigError::Registry(format!(
                        "Duplicate attribute {} on {kind}",
                        spec.name
                    )));
                }
            }
        }

        self.plugin_ids.push(plugin.id());
        for spec in node_specs {
            self.node_specs.insert(spec.kind, spec);
        }
        self.attribute_specs.extend(attribute_specs);
        self.normalize_passes.extend(plugin.normalize_passes());
        for cmd in commands {
            self.commands.insert(cmd.id.clone(), cmd);
        }
        for query in queries {
            self.queries.insert(query.id.clone(), query);
        }
        Ok(())
    }

    pub fn plugin_ids(&self) -> &[&'static str] {
        &self.plugin_ids
    }

    pub fn node_specs(&self) -> &HashMap<NodeKind, NodeSpec> {
        &self.node_specs
    }

    pub fn node_spec(&self, kind: NodeKind) -> Option<&NodeSpec> {
        self.node_specs.get(&kind)
    }

    pub fn normalize_passes(&self) -> &[Box<dyn NormalizePass>] {
        &self.normalize_passes
    }

    pub fn commands(&self) -> &HashMap<String, CommandSpec> {
        &self.commands
    }

    pub fn command(&self, id: &str) -> Option<CommandSpec> {
        self.commands.get(id).cloned()
    }

    pub fn queries(&self) -> &HashMap<String, QuerySpec> {
        &self.queries
    }

    pub fn query(&self, id: &str) -> Option<QuerySpec> {
        self.queries.get(id).cloned()
    }

    pub fn attribute_specs(&self, kind: NodeKind) -> impl Iterator<Item = &AttributeSpec> {
        self.attribute_specs
            .iter()
            .filter(move |spec| spec.kinds.contains(&kind))
    }

    pub fn attribute_spec(&self, kind: NodeKind, name: &str) -> Option<&AttributeSpec> {
        self.attribute_specs(kind).find(|spec| spec.name == name)
    }

    /// The entries of `attrs` that are also declared for `kind`, for block
    /// conversions that change a node's kind.
    pub fn carry_attrs(&self, kind: NodeKind, attrs: &Attrs) -> Attrs {
        attrs
            .iter()
            .filter(|(name, _)| self.attribute_spec(kind, name).is_some())
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect()
    }

    /// Reads the declared attributes of `kind` from a markup element. Returns
    /// the non-default values and the markup attributes nobody consumed.
    pub fn read_markup_attrs(
        &self,
        kind: NodeKind,
        el: &MarkupElement,
        structural: &[&str],
    ) -> (Attrs, MarkupAttrs) {
        let mut attrs = Attrs::new();
        let mut consumed: Vec<&str> = structural.to_vec();
        for spec in self.attribute_specs(kind) {
            consumed.extend(spec.consumes.iter().copied());
            let value = (spec.parse)(el).and_then(|v| (spec.validate)(&v));
            if let Some(value) = value {
                if !spec.is_default(&value) {
                    attrs.insert(spec.name.to_string(), value);
                }
            }
        }
        (attrs, strip_consumed(&el.attrs, &consumed))
    }

    /// Markup for the declared attributes of `kind`; absent values render their default.
    pub fn render_attrs(&self, kind: NodeKind, attrs: &Attrs) -> MarkupAttrs {
        let mut out = MarkupAttrs::new();
        for spec in self.attribute_specs(kind) {
            let value = attrs.get(spec.name).cloned().or_else(|| spec.default.clone());
            if let Some(value) = value {
                merge_markup_attrs(&mut out, &(spec.render)(&value));
            }
        }
        out
    }

    /// Validated patch setting `name` on a node of `kind`. Default values
    /// become removals so stored attributes stay canonical.
    pub fn attr_patch(&self, kind: NodeKind, name: &str, value: &Value) -> Result<AttrPatch, EditError> {
        let spec = self.attribute_spec(kind, name).ok_or_else(|| {
            EditError::validation(format!("{name} is not declared for {kind}"))
        })?;
        let canonical = (spec.validate)(value).ok_or_else(|| {
            EditError::validation(format!("{value} is outside the domain of {kind}.{name}"))
        })?;
        if spec.is_default(&canonical) {
            Ok(AttrPatch::remove(name))
        } else {
            Ok(AttrPatch::set(name, canonical))
        }
    }

    /// Like `attr_patch`, but `None` when the node already holds that value.
    pub fn attr_change(
        &self,
        kind: NodeKind,
        current: &Attrs,
        name: &str,
        value: &Value,
    ) -> Result<Option<AttrPatch>, EditError> {
        let patch = self.attr_patch(kind, name, value)?;
        let unchanged = match patch.set.get(name) {
            Some(v) => current.get(name) == Some(v),
            None => !current.contains_key(name),
        };
        Ok((!unchanged).then_some(patch))
    }

    /// Fixes from the first pass that has anything to fix; the engine loops to a fixpoint.
    pub fn normalize(&self, doc: &Document) -> Vec<Op> {
        for pass in &self.normalize_passes {
            let ops = pass.run(doc, self);
            if !ops.is_empty() {
                return ops;
            }
        }
        Vec::new()
    }

    pub fn normalize_selection(&self, doc: &Document, selection: &Selection) -> Selection {
        let fallback = first_text_point(doc).unwrap_or(Point {
            path: vec![0],
            offset: 0,
        });

        let anchor =
            normalize_point_to_existing_text(doc, &selection.anchor).unwrap_or_else(|| {
                normalize_point_to_existing_text(doc, &selection.focus)
                    .unwrap_or_else(|| fallback.clone())
            });
        let focus = normalize_point_to_existing_text(doc, &selection.focus)
            .unwrap_or_else(|| anchor.clone());

        Selection { anchor, focus }
    }
}

pub(crate) fn first_text_point(doc: &Document) -> Option<Point> {
    first_text_descendant(&doc.children, &mut Vec::new())
}

fn first_text_descendant(children: &[Node], path: &mut Vec<usize>) -> Option<Point> {
    for (ix, node) in children.iter().enumerate() {
        path.push(ix);
        match node {
            Node::Text(_) => {
                let point = Point {
                    path: path.clone(),
                    offset: 0,
                };
                path.pop();
                return Some(point);
            }
            Node::Element(el) => {
                if let Some(point) = first_text_descendant(&el.children, path) {
                    path.pop();
                    return Some(point);
                }
            }
            Node::Void(_) => {}
        }
        path.pop();
    }
    None
}

fn normalize_point_to_existing_text(doc: &Document, point: &Point) -> Option<Point> {
    if point.path.is_empty() || doc.children.is_empty() {
        return None;
    }

    let mut resolved_path: Vec<usize> = Vec::new();
    let mut children: &[Node] = &doc.children;

    for &wanted in &point.path {
        if children.is_empty() {
            break;
        }
        let ix = wanted.min(children.len() - 1);
        resolved_path.push(ix);
        match &children[ix] {
            Node::Text(t) => {
                return Some(Point {
                    path: resolved_path,
                    offset: clamp_to_char_boundary(&t.text, point.offset),
                });
            }
            Node::Element(el) => {
                children = &el.children;
            }
            Node::Void(_) => {
                // Step onto the nearest text leaf next to the void.
                let (last, parent) = resolved_path.split_last()?;
                let siblings = doc.children_at(parent)?;
                let next = siblings
                    .iter()
                    .enumerate()
                    .skip(last + 1)
                    .find(|(_, n)| matches!(n, Node::Text(_)))
                    .map(|(ix, _)| (ix, 0));
                let prev = siblings
                    .iter()
                    .enumerate()
                    .take(*last)
                    .rev()
                    .find_map(|(ix, n)| match n {
                        Node::Text(t) => Some((ix, t.text.len())),
                        _ => None,
                    });
                let (ix, offset) = next.or(prev)?;
                let mut path = parent.to_vec();
                path.push(ix);
                return Some(Point { path, offset });
            }
        }
    }

    match doc.node(&resolved_path)? {
        Node::Text(t) => Some(Point {
            offset: clamp_to_char_boundary(&t.text, point.offset),
            path: resolved_path,
        }),
        Node::Element(el) => first_text_descendant(&el.children, &mut resolved_path),
        Node::Void(_) => None,
    }
}

pub(crate) fn node_at_path<'a>(doc: &'a Document, path: &[usize]) -> Option<&'a Node> {
    doc.node(path)
}

pub(crate) fn element_at_path<'a>(doc: &'a Document, path: &[usize]) -> Option<&'a ElementNode> {
    match doc.node(path)? {
        Node::Element(el) => Some(el),
        _ => None,
    }
}

pub(crate) fn children_at_path<'a>(doc: &'a Document, parent_path: &[usize]) -> Option<&'a [Node]> {
    doc.children_at(parent_path)
}

/// Nearest ancestor-or-self element matching `pred`, walking up from `path`.
pub(crate) fn ancestor_element_path(
    doc: &Document,
    path: &[usize],
    pred: impl Fn(NodeKind) -> bool,
) -> Option<Path> {
    for len in (1..=path.len()).rev() {
        let candidate = &path[..len];
        if let Some(Node::Element(el)) = node_at_path(doc, candidate) {
            if pred(el.kind) {
                return Some(candidate.to_vec());
            }
        }
    }
    None
}

pub(crate) fn parent_path(path: &[usize]) -> Option<&[usize]> {
    path.split_last().map(|(_, parent)| parent)
}

pub(crate) fn child_path(parent: &[usize], ix: usize) -> Path {
    let mut path = parent.to_vec();
    path.push(ix);
    path
}

/// Swaps the node at `path` for `node` without shifting any sibling.
pub(crate) fn replace_node_ops(path: &[usize], node: Node) -> [Op; 2] {
    [
        Op::RemoveNode {
            path: path.to_vec(),
        },
        Op::InsertNode {
            path: path.to_vec(),
            node,
        },
    ]
}

/// Gap right after the block holding the caret: `(parent, index)`.
pub(crate) fn insertion_after_focus_block(editor: &Editor) -> (Path, usize) {
    let focus = &editor.selection().focus;
    let block_path = parent_path(&focus.path).unwrap_or(&[]);
    match block_path.split_last() {
        Some((block_ix, parent)) => (parent.to_vec(), block_ix + 1),
        None => (Vec::new(), editor.doc().children.len()),
    }
}

pub(crate) fn point_global_offset(children: &[Node], child_ix: usize, offset: usize) -> usize {
    let mut global = 0usize;
    for (ix, node) in children.iter().enumerate() {
        match node {
            Node::Text(t) => {
                if ix < child_ix {
                    global += t.text.len();
                    continue;
                }
                if ix == child_ix {
                    global += clamp_to_char_boundary(&t.text, offset);
                }
                break;
            }
            Node::Void(v) => {
                if ix < child_ix {
                    global += v.inline_text_len();
                    continue;
                }
                if ix == child_ix {
                    global += offset.min(v.inline_text_len());
                }
                break;
            }
            Node::Element(_) => {}
        }
    }
    global
}

pub(crate) fn point_for_global_offset(block_path: &[usize], children: &[Node], global_offset: usize) -> Point {
    let mut remaining = global_offset;
    for (child_ix, node) in children.iter().enumerate() {
        match node {
            Node::Text(t) => {
                if remaining < t.text.len() {
                    return Point::new(
                        child_path(block_path, child_ix),
                        clamp_to_char_boundary(&t.text, remaining),
                    );
                }
                if remaining == t.text.len() {
                    if matches!(children.get(child_ix + 1), Some(Node::Text(_))) {
                        return Point::new(child_path(block_path, child_ix + 1), 0);
                    }
                    return Point::new(child_path(block_path, child_ix), t.text.len());
                }
                remaining -= t.text.len();
            }
            Node::Void(v) => {
                let len = v.inline_text_len();
                if remaining <= len {
                    if remaining == 0 || remaining <= len - remaining {
                        for (ix, prev) in children.iter().enumerate().take(child_ix).rev() {
                            if let Node::Text(t) = prev {
                                return Point::new(child_path(block_path, ix), t.text.len());
                            }
                        }
                    }
                    for (ix, next) in children.iter().enumerate().skip(child_ix + 1) {
                        if matches!(next, Node::Text(_)) {
                            return Point::new(child_path(block_path, ix), 0);
                        }
                    }
                    break;
                }
                remaining -= len;
            }
            Node::Element(_) => {}
        }
    }

    // End of the last text leaf.
    for (child_ix, node) in children.iter().enumerate().rev() {
        if let Node::Text(t) = node {
            return Point::new(child_path(block_path, child_ix), t.text.len());
        }
    }

    Point::new(child_path(block_path, 0), 0)
}

pub(crate) fn is_point_in_block(point: &Point, block_path: &[usize]) -> bool {
    point.path.len() == block_path.len() + 1 && point.path.starts_with(block_path)
}

pub(crate) struct TextBlock<'a> {
    pub path: Path,
    pub el: &'a ElementNode,
}

pub(crate) fn element_is_text_block(el: &ElementNode, registry: &PluginRegistry) -> bool {
    match registry.node_spec(el.kind).map(|s| &s.children) {
        Some(ChildConstraint::InlineOnly) => true,
        Some(_) => false,
        None => el
            .children
            .iter()
            .any(|n| matches!(n, Node::Text(_) | Node::Void(_))),
    }
}

pub(crate) fn text_blocks_in_order<'a>(doc: &'a Document, registry: &PluginRegistry) -> Vec<TextBlock<'a>> {
    fn walk<'a>(
        nodes: &'a [Node],
        path: &mut Vec<usize>,
        registry: &PluginRegistry,
        out: &mut Vec<TextBlock<'a>>,
    ) {
        for (ix, node) in nodes.iter().enumerate() {
            let Node::Element(el) = node else {
                continue;
            };

            path.push(ix);

            if element_is_text_block(el, registry) {
                out.push(TextBlock {
                    path: path.clone(),
                    el,
                });
            } else {
                walk(&el.children, path, registry, out);
            }

            path.pop();
        }
    }

    let mut out = Vec::new();
    walk(&doc.children, &mut Vec::new(), registry, &mut out);
    out
}

/// Text blocks touched by the selection, in document order.
pub(crate) fn selected_text_blocks(editor: &Editor) -> Result<Vec<TextBlock<'_>>, EditError> {
    let (start, end) = ordered_selection_points(editor.selection());
    let not_in_block = || EditError::structural("selection is not in a text block");
    let start_block_path = parent_path(&start.path).ok_or_else(not_in_block)?;
    let end_block_path = parent_path(&end.path).ok_or_else(not_in_block)?;

    let blocks = text_blocks_in_order(editor.doc(), editor.registry());
    let start_index = blocks
        .iter()
        .position(|b| b.path == start_block_path)
        .ok_or_else(not_in_block)?;
    let end_index = blocks
        .iter()
        .position(|b| b.path == end_block_path)
        .ok_or_else(not_in_block)?;

    let (a, b) = if start_index <= end_index {
        (start_index, end_index)
    } else {
        (end_index, start_index)
    };
    Ok(blocks.into_iter().skip(a).take(b - a + 1).collect())
}

/// Contiguous siblings covering the selection: `(parent, first, last)`.
pub(crate) fn selected_sibling_range(editor: &Editor) -> Result<(Path, usize, usize), EditError> {
    let (start, end) = ordered_selection_points(editor.selection());
    let not_in_block = || EditError::structural("selection is not in a text block");
    let a = parent_path(&start.path).ok_or_else(not_in_block)?;
    let b = parent_path(&end.path).ok_or_else(not_in_block)?;
    if a.is_empty() || b.is_empty() {
        return Err(not_in_block());
    }

    let common = a.iter().zip(b).take_while(|(x, y)| x == y).count();
    let depth = common.min(a.len() - 1).min(b.len() - 1);
    let parent = a[..depth].to_vec();
    let (first, last) = (a[depth], b[depth]);
    Ok(if first <= last {
        (parent, first, last)
    } else {
        (parent, last, first)
    })
}

pub(crate) fn total_inline_text_len(children: &[Node]) -> usize {
    children
        .iter()
        .map(|n| match n {
            Node::Text(t) => t.text.len(),
            Node::Void(v) => v.inline_text_len(),
            Node::Element(_) => 0,
        })
        .sum()
}

pub(crate) fn apply_marks_in_block(
    children: &[Node],
    start_global: usize,
    end_global: usize,
    apply: &dyn Fn(Marks) -> Marks,
) -> Vec<Node> {
    if start_global >= end_global {
        return children.to_vec();
    }

    let mut out: Vec<Node> = Vec::new();
    let mut cursor = 0usize;

    for node in children {
        let t = match node {
            Node::Text(t) => t,
            Node::Void(v) => {
                cursor += v.inline_text_len();
                out.push(node.clone());
                continue;
            }
            Node::Element(_) => {
                out.push(node.clone());
                continue;
            }
        };
        let node_start = cursor;
        let node_end = cursor + t.text.len();
        cursor = node_end;

        if end_global <= node_start || start_global >= node_end {
            out.push(node.clone());
            continue;
        }

        let sel_start = clamp_to_char_boundary(&t.text, start_global.saturating_sub(node_start));
        let sel_end = clamp_to_char_boundary(&t.text, end_global.saturating_sub(node_start));

        if sel_start == 0 && sel_end == t.text.len() {
            let mut next = t.clone();
            next.marks = apply(next.marks);
            out.push(Node::Text(next));
            continue;
        }

        let (prefix, rest) = t.text.split_at(sel_start);
        let (middle, suffix) = rest.split_at(sel_end - sel_start);
        for (text, marks) in [
            (prefix, t.marks.clone()),
            (middle, apply(t.marks.clone())),
            (suffix, t.marks.clone()),
        ] {
            if !text.is_empty() {
                out.push(Node::Text(TextNode {
                    text: text.to_string(),
                    marks,
                }));
            }
        }
    }

    if out.is_empty() {
        out.push(Node::text(""));
    }

    out
}

/// Inline children with the global range `[start, end)` cut out. Voids that
/// overlap the range go with it.
pub(crate) fn remove_inline_range(children: &[Node], start_global: usize, end_global: usize) -> Vec<Node> {
    let mut out: Vec<Node> = Vec::new();
    let mut cursor = 0usize;
    for node in children {
        match node {
            Node::Text(t) => {
                let node_start = cursor;
                cursor += t.text.len();
                if end_global <= node_start || start_global >= cursor {
                    out.push(node.clone());
                    continue;
                }
                let cut_start = clamp_to_char_boundary(&t.text, start_global.saturating_sub(node_start));
                let cut_end = clamp_to_char_boundary(&t.text, end_global.saturating_sub(node_start));
                let mut text = t.text[..cut_start].to_string();
                text.push_str(&t.text[cut_end..]);
                out.push(Node::Text(TextNode {
                    text,
                    marks: t.marks.clone(),
                }));
            }
            Node::Void(v) => {
                let node_start = cursor;
                cursor += v.inline_text_len();
                if end_global <= node_start || start_global >= cursor {
                    out.push(node.clone());
                }
            }
            Node::Element(_) => out.push(node.clone()),
        }
    }
    if !out.iter().any(|n| matches!(n, Node::Text(_))) {
        out.push(Node::text(""));
    }
    out
}

pub(crate) fn ordered_selection_points(sel: &Selection) -> (Point, Point) {
    let mut start = sel.anchor.clone();
    let mut end = sel.focus.clone();

    if start.path == end.path {
        if end.offset < start.offset {
            std::mem::swap(&mut start, &mut end);
        }
        return (start, end);
    }
    if end.path < start.path {
        std::mem::swap(&mut start, &mut end);
    }
    (start, end)
}

pub(crate) fn arg_str<'a>(args: Option<&'a Value>, key: &str) -> Option<&'a str> {
    args.and_then(|v| v.get(key)).and_then(|v| v.as_str())
}

pub(crate) fn arg_u64(args: Option<&Value>, key: &str) -> Option<u64> {
    args.and_then(|v| v.get(key)).and_then(|v| v.as_u64())
}

pub(crate) fn required_str(args: Option<&Value>, key: &str) -> Result<String, EditError> {
    arg_str(args, key)
        .map(str::to_string)
        .ok_or_else(|| EditError::validation(format!("Missing args.{key}")))
}

pub(crate) struct CorePlugin;

impl EditorPlugin for CorePlugin {
    fn id(&self) -> &'static str {
        "core"
    }

    fn node_specs(&self) -> Vec<NodeSpec> {
        vec![
            NodeSpec::block(NodeKind::Paragraph, ChildConstraint::InlineOnly),
            NodeSpec::inline_void(NodeKind::HardBreak),
        ]
    }

    fn normalize_passes(&self) -> Vec<Box<dyn NormalizePass>> {
        vec![
            Box::new(EnsureNonEmptyDocument),
            Box::new(EnsureParagraphHasTextLeaf),
            Box::new(MergeAdjacentTextLeaves),
            Box::new(NormalizeDeclaredAttrs),
        ]
    }

    fn commands(&self) -> Vec<CommandSpec> {
        vec![
            CommandSpec::new("core.insert_text", "Insert text", |editor, args| {
                let text = required_str(args.as_ref(), "text")?;
                insert_text(editor, &text)
            })
            .description("Insert text at the caret, replacing a selected range.")
            .keywords(["type", "text"])
            .args_example(serde_json::json!({ "text": "hello" }))
            .hidden(true),
            CommandSpec::new("core.delete_backward", "Delete backward", |editor, _args| {
                delete_backward(editor)
            })
            .description("Delete the selection or the character before the caret.")
            .keywords(["backspace", "delete"])
            .hidden(true),
            CommandSpec::new("block.set_paragraph", "Paragraph", |editor, _args| {
                set_paragraph(editor)
            })
            .description("Turn the selected blocks into plain paragraphs.")
            .keywords(["paragraph", "text", "normal"]),
        ]
    }

    fn queries(&self) -> Vec<QuerySpec> {
        vec![QuerySpec::new("core.text_content", |editor, _args| {
            let text: Vec<String> = text_blocks_in_order(editor.doc(), editor.registry())
                .iter()
                .map(|b| block_plain_text(&b.el.children))
                .collect();
            Ok(Value::String(text.join("\n")))
        })]
    }
}

pub(crate) struct DividerPlugin;

impl EditorPlugin for DividerPlugin {
    fn id(&self) -> &'static str {
        "divider"
    }

    fn node_specs(&self) -> Vec<NodeSpec> {
        vec![NodeSpec::block_void(NodeKind::Divider)]
    }

    fn commands(&self) -> Vec<CommandSpec> {
        vec![
            CommandSpec::new("core.insert_divider", "Insert divider", |editor, _args| {
                insert_block_void(editor, Node::divider(), "command:core.insert_divider")
            })
            .description("Insert a divider block after the current block.")
            .keywords(["divider", "separator", "hr", "horizontal rule"]),
        ]
    }
}

pub(crate) fn block_plain_text(children: &[Node]) -> String {
    children
        .iter()
        .map(|n| match n {
            Node::Text(t) => t.text.clone(),
            Node::Void(v) => v.inline_text(),
            Node::Element(el) => block_plain_text(&el.children),
        })
        .collect()
}

/// Inserts a block void after the current block and moves the caret past it,
/// adding an empty paragraph when nothing editable follows.
pub(crate) fn insert_block_void(
    editor: &Editor,
    node: Node,
    source: &'static str,
) -> Result<Transaction, EditError> {
    let (parent, insert_at) = insertion_after_focus_block(editor);
    let siblings = children_at_path(editor.doc(), &parent).unwrap_or(&[]);
    let next_is_text_block = matches!(
        siblings.get(insert_at),
        Some(Node::Element(el)) if element_is_text_block(el, editor.registry())
    );

    let mut ops = vec![Op::InsertNode {
        path: child_path(&parent, insert_at),
        node,
    }];
    if !next_is_text_block {
        ops.push(Op::InsertNode {
            path: child_path(&parent, insert_at + 1),
            node: Node::paragraph(""),
        });
    }
    let mut caret = child_path(&parent, insert_at + 1);
    caret.push(0);

    Ok(Transaction::new(ops)
        .selection_after(Selection::collapsed(Point::new(caret, 0)))
        .source(source))
}

fn insert_text(editor: &Editor, text: &str) -> Result<Transaction, EditError> {
    let sel = editor.selection().clone();
    if !sel.is_collapsed() {
        let (block_path, children, start_global, end_global) = single_block_range(editor)?;
        let mut next = remove_inline_range(children, start_global, end_global);
        let caret = point_for_global_offset(&block_path, &next, start_global);
        let caret_ix = caret.path.last().copied().unwrap_or(0);
        if let Some(Node::Text(t)) = next.get_mut(caret_ix) {
            let at = clamp_to_char_boundary(&t.text, caret.offset);
            t.text.insert_str(at, text);
        }
        let after = point_for_global_offset(&block_path, &next, start_global + text.len());
        let ops = replace_children_ops(&block_path, children.len(), next);
        return Ok(Transaction::new(ops)
            .selection_after(Selection::collapsed(after))
            .source("command:core.insert_text"));
    }

    let focus = sel.focus;
    let Some(Node::Text(t)) = node_at_path(editor.doc(), &focus.path) else {
        return Err(EditError::structural("caret is not in a text node"));
    };
    let offset = clamp_to_char_boundary(&t.text, focus.offset);
    Ok(Transaction::new(vec![Op::InsertText {
        path: focus.path.clone(),
        offset,
        text: text.to_string(),
    }])
    .selection_after(Selection::collapsed(Point::new(focus.path, offset + text.len())))
    .source("command:core.insert_text"))
}

fn single_block_range(editor: &Editor) -> Result<(Path, &[Node], usize, usize), EditError> {
    let (start, end) = ordered_selection_points(editor.selection());
    let start_block = parent_path(&start.path).unwrap_or(&[]);
    let end_block = parent_path(&end.path).unwrap_or(&[]);
    if start_block != end_block {
        return Err(EditError::structural("selection spans several blocks"));
    }
    let Some(el) = element_at_path(editor.doc(), start_block) else {
        return Err(EditError::structural("selection is not in a text block"));
    };
    let start_global = point_global_offset(&el.children, start.path.last().copied().unwrap_or(0), start.offset);
    let end_global = point_global_offset(&el.children, end.path.last().copied().unwrap_or(0), end.offset);
    Ok((start_block.to_vec(), &el.children, start_global, end_global))
}

pub(crate) fn replace_children_ops(block_path: &[usize], old_len: usize, next: Vec<Node>) -> Vec<Op> {
    let mut ops: Vec<Op> = (0..old_len)
        .rev()
        .map(|ix| Op::RemoveNode {
            path: child_path(block_path, ix),
        })
        .collect();
    ops.extend(next.into_iter().enumerate().map(|(ix, node)| Op::InsertNode {
        path: child_path(block_path, ix),
        node,
    }));
    ops
}

fn delete_backward(editor: &Editor) -> Result<Transaction, EditError> {
    let sel = editor.selection().clone();
    if !sel.is_collapsed() {
        let (block_path, children, start_global, end_global) = single_block_range(editor)?;
        let next = remove_inline_range(children, start_global, end_global);
        let caret = point_for_global_offset(&block_path, &next, start_global);
        let ops = replace_children_ops(&block_path, children.len(), next);
        return Ok(Transaction::new(ops)
            .selection_after(Selection::collapsed(caret))
            .source("command:core.delete_backward"));
    }

    let focus = sel.focus;
    let Some((&child_ix, block_path)) = focus.path.split_last() else {
        return Ok(Transaction::default());
    };
    let Some(Node::Text(t)) = node_at_path(editor.doc(), &focus.path) else {
        return Err(EditError::structural("caret is not in a text node"));
    };

    let offset = clamp_to_char_boundary(&t.text, focus.offset);
    if offset > 0 {
        let prev = t.text[..offset]
            .char_indices()
            .next_back()
            .map(|(ix, _)| ix)
            .unwrap_or(0);
        return Ok(Transaction::new(vec![Op::RemoveText {
            path: focus.path.clone(),
            range: prev..offset,
        }])
        .selection_after(Selection::collapsed(Point::new(focus.path, prev)))
        .source("command:core.delete_backward"));
    }

    let Some(block) = element_at_path(editor.doc(), block_path) else {
        return Ok(Transaction::default());
    };

    // Inline void right before the caret.
    if let Some(prev_ix) = child_ix.checked_sub(1) {
        if let Some(Node::Void(_)) = block.children.get(prev_ix) {
            let global = point_global_offset(&block.children, child_ix, 0);
            let mut next = block.children.clone();
            next.remove(prev_ix);
            let len_removed = total_inline_text_len(&block.children) - total_inline_text_len(&next);
            let caret = point_for_global_offset(block_path, &next, global - len_removed);
            let ops = replace_children_ops(block_path, block.children.len(), next);
            return Ok(Transaction::new(ops)
                .selection_after(Selection::collapsed(caret))
                .source("command:core.delete_backward"));
        }
        return Ok(Transaction::default());
    }

    // Caret at the start of a block: merge into the previous sibling block.
    let Some((&block_ix, container)) = block_path.split_last() else {
        return Ok(Transaction::default());
    };
    let Some(prev_ix) = block_ix.checked_sub(1) else {
        return Ok(Transaction::default());
    };
    let prev_path = child_path(container, prev_ix);
    match node_at_path(editor.doc(), &prev_path) {
        Some(Node::Void(_)) => Ok(Transaction::new(vec![Op::RemoveNode { path: prev_path.clone() }])
            .selection_after(Selection::collapsed(Point::new(
                [prev_path, vec![0]].concat(),
                0,
            )))
            .source("command:core.delete_backward")),
        Some(Node::Element(prev)) if element_is_text_block(prev, editor.registry()) => {
            let join_at = total_inline_text_len(&prev.children);
            let mut merged = prev.children.clone();
            merged.extend(block.children.iter().cloned());
            let caret = point_for_global_offset(&prev_path, &merged, join_at);
            let mut ops = vec![Op::RemoveNode {
                path: block_path.to_vec(),
            }];
            ops.extend(replace_children_ops(&prev_path, prev.children.len(), merged));
            Ok(Transaction::new(ops)
                .selection_after(Selection::collapsed(caret))
                .source("command:core.delete_backward"))
        }
        _ => Ok(Transaction::default()),
    }
}

fn set_paragraph(editor: &Editor) -> Result<Transaction, EditError> {
    let selection_after = editor.selection().clone();
    let mut ops: Vec<Op> = Vec::new();
    for block in selected_text_blocks(editor)? {
        if !matches!(block.el.kind, NodeKind::Heading | NodeKind::CodeBlock) {
            continue;
        }
        let mut next = block.el.clone();
        next.kind = NodeKind::Paragraph;
        next.attrs.remove("level");
        ops.extend(replace_node_ops(&block.path, Node::Element(next)));
    }
    Ok(Transaction::new(ops)
        .selection_after(selection_after)
        .source("command:block.set_paragraph"))
}

struct EnsureNonEmptyDocument;

impl NormalizePass for EnsureNonEmptyDocument {
    fn id(&self) -> &'static str {
        "core.ensure_non_empty_document"
    }

    fn run(&self, doc: &Document, _registry: &PluginRegistry) -> Vec<Op> {
        if doc.children.is_empty() {
            return vec![Op::InsertNode {
                path: vec![0],
                node: Node::paragraph(""),
            }];
        }
        Vec::new()
    }
}

struct EnsureParagraphHasTextLeaf;

impl NormalizePass for EnsureParagraphHasTextLeaf {
    fn id(&self) -> &'static str {
        "core.ensure_inline_only_blocks_have_text_leaf"
    }

    fn run(&self, doc: &Document, registry: &PluginRegistry) -> Vec<Op> {
        let mut ops = Vec::new();

        fn walk(children: &[Node], path: &mut Vec<usize>, registry: &PluginRegistry, ops: &mut Vec<Op>) {
            for (ix, node) in children.iter().enumerate() {
                let Node::Element(el) = node else {
                    continue;
                };

                path.push(ix);

                let spec_children = registry
                    .node_spec(el.kind)
                    .map(|s| s.children.clone())
                    .unwrap_or(ChildConstraint::Any);

                match spec_children {
                    ChildConstraint::InlineOnly => {
                        // Every inline void needs a text leaf after it for the caret.
                        let needs_tail = match el.children.last() {
                            None | Some(Node::Void(_)) => true,
                            Some(_) => false,
                        };
                        if needs_tail {
                            ops.push(Op::InsertNode {
                                path: child_path(path, el.children.len()),
                                node: Node::text(""),
                            });
                        }
                    }
                    ChildConstraint::BlockOnly
                        if el.children.is_empty()
                            && matches!(
                                el.kind,
                                NodeKind::Blockquote | NodeKind::ListItem | NodeKind::TableCell | NodeKind::TableHeader
                            ) =>
                    {
                        ops.push(Op::InsertNode {
                            path: child_path(path, 0),
                            node: Node::paragraph(""),
                        });
                    }
                    _ => walk(&el.children, path, registry, ops),
                }

                path.pop();
            }
        }

        walk(&doc.children, &mut Vec::new(), registry, &mut ops);
        ops
    }
}

struct MergeAdjacentTextLeaves;

impl NormalizePass for MergeAdjacentTextLeaves {
    fn id(&self) -> &'static str {
        "core.merge_adjacent_text_leaves"
    }

    fn run(&self, doc: &Document, registry: &PluginRegistry) -> Vec<Op> {
        let mut ops = Vec::new();

        fn walk(children: &[Node], path: &mut Vec<usize>, registry: &PluginRegistry, ops: &mut Vec<Op>) {
            for (ix, node) in children.iter().enumerate() {
                let Node::Element(el) = node else {
                    continue;
                };

                path.push(ix);

                if element_is_text_block(el, registry) {
                    merge_runs(el, path, ops);
                } else {
                    walk(&el.children, path, registry, ops);
                }

                path.pop();
            }
        }

        fn merge_runs(el: &ElementNode, path: &[usize], ops: &mut Vec<Op>) {
            let mut ix = el.children.len();
            while ix > 0 {
                ix -= 1;
                let Node::Text(right) = &el.children[ix] else {
                    continue;
                };

                let mut start = ix;
                while start > 0 {
                    let Some(Node::Text(left)) = el.children.get(start - 1) else {
                        break;
                    };
                    if left.marks != right.marks {
                        break;
                    }
                    start -= 1;
                }

                if start == ix {
                    continue;
                }

                let Some(Node::Text(first)) = el.children.get(start) else {
                    continue;
                };
                let appended: String = el
                    .children
                    .iter()
                    .take(ix + 1)
                    .skip(start + 1)
                    .filter_map(|n| match n {
                        Node::Text(t) => Some(t.text.as_str()),
                        _ => None,
                    })
                    .collect();

                if !appended.is_empty() {
                    ops.push(Op::InsertText {
                        path: child_path(path, start),
                        offset: first.text.len(),
                        text: appended,
                    });
                }

                for remove_ix in (start + 1..=ix).rev() {
                    ops.push(Op::RemoveNode {
                        path: child_path(path, remove_ix),
                    });
                }

                ix = start;
            }
        }

        walk(&doc.children, &mut Vec::new(), registry, &mut ops);
        ops
    }
}

/// Keeps stored attributes canonical: values are coerced into their declared
/// domain, defaults and out-of-domain values are dropped, and attributes no
/// plugin declares for the node's kind are stripped.
struct NormalizeDeclaredAttrs;

impl NormalizePass for NormalizeDeclaredAttrs {
    fn id(&self) -> &'static str {
        "core.normalize_declared_attrs"
    }

    fn run(&self, doc: &Document, registry: &PluginRegistry) -> Vec<Op> {
        let mut ops = Vec::new();

        fn patch_for(kind: NodeKind, attrs: &Attrs, registry: &PluginRegistry) -> Option<AttrPatch> {
            let mut patch = AttrPatch::default();
            for (name, value) in attrs {
                let canonical = registry
                    .attribute_spec(kind, name)
                    .and_then(|spec| (spec.validate)(value).filter(|v| !spec.is_default(v)));
                match canonical {
                    Some(v) if v == *value => {}
                    Some(v) => {
                        patch.set.insert(name.clone(), v);
                    }
                    None => patch.remove.push(name.clone()),
                }
            }
            (!patch.set.is_empty() || !patch.remove.is_empty()).then_some(patch)
        }

        fn walk(children: &[Node], path: &mut Vec<usize>, registry: &PluginRegistry, ops: &mut Vec<Op>) {
            for (ix, node) in children.iter().enumerate() {
                path.push(ix);
                match node {
                    Node::Element(el) => {
                        if let Some(patch) = patch_for(el.kind, &el.attrs, registry) {
                            ops.push(Op::SetNodeAttrs {
                                path: path.clone(),
                                patch,
                            });
                        }
                        walk(&el.children, path, registry, ops);
                    }
                    Node::Void(v) => {
                        if let Some(patch) = patch_for(v.kind, &v.attrs, registry) {
                            ops.push(Op::SetNodeAttrs {
                                path: path.clone(),
                                patch,
                            });
                        }
                    }
                    Node::Text(_) => {}
                }
                path.pop();
            }
        }

        walk(&doc.children, &mut Vec::new(), registry, &mut ops);
        ops
    }
}
