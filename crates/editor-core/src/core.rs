use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::error::{EditError, QueryError};
use crate::ops::{Op, Path, Transaction, TransactionBuilder};
use crate::plugin::{PluginRegistry, TransactionPreview};

pub type Attrs = BTreeMap<String, serde_json::Value>;

/// Raw markup attributes carried through parse/serialize untouched.
pub type MarkupAttrs = BTreeMap<String, String>;

/// Closed vocabulary of node kinds. Behavior per kind lives in lookup tables
/// (`NodeSpec` in the registry, the markup tag table, the toolbar block table).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Paragraph,
    Heading,
    Blockquote,
    CodeBlock,
    BulletList,
    OrderedList,
    ListItem,
    Table,
    TableCaption,
    TableRow,
    TableCell,
    TableHeader,
    PageBreak,
    Divider,
    Mention,
    HardBreak,
}

impl NodeKind {
    pub const ALL: [NodeKind; 16] = [
        NodeKind::Paragraph,
        NodeKind::Heading,
        NodeKind::Blockquote,
        NodeKind::CodeBlock,
        NodeKind::BulletList,
        NodeKind::OrderedList,
        NodeKind::ListItem,
        NodeKind::Table,
        NodeKind::TableCaption,
        NodeKind::TableRow,
        NodeKind::TableCell,
        NodeKind::TableHeader,
        NodeKind::PageBreak,
        NodeKind::Divider,
        NodeKind::Mention,
        NodeKind::HardBreak,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            NodeKind::Paragraph => "paragraph",
            NodeKind::Heading => "heading",
            NodeKind::Blockquote => "blockquote",
            NodeKind::CodeBlock => "code_block",
            NodeKind::BulletList => "bullet_list",
            NodeKind::OrderedList => "ordered_list",
            NodeKind::ListItem => "list_item",
            NodeKind::Table => "table",
            NodeKind::TableCaption => "table_caption",
            NodeKind::TableRow => "table_row",
            NodeKind::TableCell => "table_cell",
            NodeKind::TableHeader => "table_header",
            NodeKind::PageBreak => "page_break",
            NodeKind::Divider => "divider",
            NodeKind::Mention => "mention",
            NodeKind::HardBreak => "hard_break",
        }
    }

    pub fn is_list(self) -> bool {
        matches!(self, NodeKind::BulletList | NodeKind::OrderedList)
    }

    pub fn is_table_cell(self) -> bool {
        matches!(self, NodeKind::TableCell | NodeKind::TableHeader)
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Document {
    #[serde(default)]
    pub children: Vec<Node>,
}

impl Document {
    pub fn new(children: Vec<Node>) -> Self {
        Self { children }
    }

    pub fn node(&self, path: &[usize]) -> Option<&Node> {
        node_ref(self, path)
    }

    /// Children of the container at `path`; the empty path is the document root.
    pub fn children_at(&self, path: &[usize]) -> Option<&[Node]> {
        if path.is_empty() {
            return Some(&self.children);
        }
        match self.node(path)? {
            Node::Element(el) => Some(&el.children),
            Node::Void(_) | Node::Text(_) => None,
        }
    }

    /// True for the canonical empty document: one paragraph without content.
    pub fn is_empty(&self) -> bool {
        match self.children.as_slice() {
            [] => true,
            [Node::Element(el)] => {
                el.kind == NodeKind::Paragraph
                    && el.children.iter().all(|child| match child {
                        Node::Text(t) => t.text.is_empty(),
                        Node::Element(_) | Node::Void(_) => false,
                    })
            }
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "node", rename_all = "snake_case")]
pub enum Node {
    Element(ElementNode),
    Text(TextNode),
    Void(VoidNode),
}

impl Node {
    pub fn paragraph(text: impl Into<String>) -> Self {
        Node::Element(ElementNode::new(NodeKind::Paragraph, vec![Node::text(text)]))
    }

    pub fn text(text: impl Into<String>) -> Self {
        Node::Text(TextNode {
            text: text.into(),
            marks: Marks::default(),
        })
    }

    pub fn element(kind: NodeKind, children: Vec<Node>) -> Self {
        Node::Element(ElementNode::new(kind, children))
    }

    pub fn divider() -> Self {
        Node::Void(VoidNode::new(NodeKind::Divider))
    }

    pub fn page_break() -> Self {
        Node::Void(VoidNode::new(NodeKind::PageBreak))
    }

    pub fn mention(id: impl Into<String>, label: impl Into<String>) -> Self {
        let mut void = VoidNode::new(NodeKind::Mention);
        void.attrs.insert("id".to_string(), Value::String(id.into()));
        void.attrs
            .insert("label".to_string(), Value::String(label.into()));
        Node::Void(void)
    }

    pub fn kind(&self) -> Option<NodeKind> {
        match self {
            Node::Element(el) => Some(el.kind),
            Node::Void(v) => Some(v.kind),
            Node::Text(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementNode {
    pub kind: NodeKind,
    #[serde(default)]
    pub attrs: Attrs,
    #[serde(default)]
    pub children: Vec<Node>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub passthrough: MarkupAttrs,
}

impl ElementNode {
    pub fn new(kind: NodeKind, children: Vec<Node>) -> Self {
        Self {
            kind,
            attrs: Attrs::default(),
            children,
            passthrough: MarkupAttrs::default(),
        }
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: Value) -> Self {
        self.attrs.insert(key.into(), value);
        self
    }

    pub fn attr_str(&self, key: &str) -> Option<&str> {
        self.attrs.get(key).and_then(|v| v.as_str())
    }

    pub fn attr_u64(&self, key: &str) -> Option<u64> {
        self.attrs.get(key).and_then(|v| v.as_u64())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoidNode {
    pub kind: NodeKind,
    #[serde(default)]
    pub attrs: Attrs,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub passthrough: MarkupAttrs,
}

impl VoidNode {
    pub fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            attrs: Attrs::default(),
            passthrough: MarkupAttrs::default(),
        }
    }

    pub fn inline_text(&self) -> String {
        match self.kind {
            NodeKind::Mention => {
                let label = self
                    .attrs
                    .get("label")
                    .and_then(|v| v.as_str())
                    .unwrap_or("mention");
                if label.starts_with('@') {
                    label.to_string()
                } else {
                    format!("@{label}")
                }
            }
            NodeKind::HardBreak => "\n".to_string(),
            _ => "\u{fffc}".to_string(),
        }
    }

    pub fn inline_text_len(&self) -> usize {
        self.inline_text().len()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextNode {
    pub text: String,
    #[serde(default)]
    pub marks: Marks,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Marks {
    #[serde(default)]
    pub bold: bool,
    #[serde(default)]
    pub italic: bool,
    #[serde(default)]
    pub underline: bool,
    #[serde(default)]
    pub strikethrough: bool,
    #[serde(default)]
    pub code: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub highlight_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_family: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_size: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    /// Markup attributes read along with the marks that no mark consumed, keyed
    /// by the tag that renders them (`a`, `strong`, `span`, ...).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub markup: BTreeMap<String, MarkupAttrs>,
}

impl Marks {
    /// Whether the wrapper tag `tag` is emitted for these marks.
    pub fn renders(&self, tag: &str) -> bool {
        match tag {
            "a" => self.link.is_some(),
            "strong" => self.bold,
            "em" => self.italic,
            "u" => self.underline,
            "s" => self.strikethrough,
            "code" => self.code,
            "mark" => self.highlight_color.is_some(),
            "span" => true,
            _ => false,
        }
    }

    /// Drops carried markup whose mark was switched off.
    pub fn retain_rendered_markup(mut self) -> Self {
        let stale: Vec<String> = self
            .markup
            .keys()
            .filter(|tag| !self.renders(tag))
            .cloned()
            .collect();
        for tag in stale {
            self.markup.remove(&tag);
        }
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Point {
    #[serde(default)]
    pub path: Path,
    pub offset: usize,
}

impl Point {
    pub fn new(path: Path, offset: usize) -> Self {
        Self { path, offset }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    pub anchor: Point,
    pub focus: Point,
}

impl Selection {
    pub fn new(anchor: Point, focus: Point) -> Self {
        Self { anchor, focus }
    }

    pub fn collapsed(point: Point) -> Self {
        Self {
            anchor: point.clone(),
            focus: point,
        }
    }

    pub fn is_collapsed(&self) -> bool {
        self.anchor == self.focus
    }
}

#[derive(Debug, Clone)]
pub struct UndoRecord {
    pub inverse_ops: Vec<Op>,
    pub selection_before: Selection,
    pub selection_after: Selection,
}

#[derive(Debug, Clone, Default)]
pub struct EditorConfig {
    pub max_undo: usize,
    pub max_normalize_iterations: usize,
}

impl EditorConfig {
    pub fn with_defaults(mut self) -> Self {
        if self.max_undo == 0 {
            self.max_undo = 200;
        }
        if self.max_normalize_iterations == 0 {
            self.max_normalize_iterations = 100;
        }
        self
    }
}

/// Fired once per successful commit (including undo/redo).
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub version: u64,
    pub document: Document,
    pub selection: Selection,
    pub source: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type ChangeListener = Box<dyn FnMut(&ChangeEvent) + Send>;

/// Result of running a transaction against a scratch copy of the editor state.
struct Staged {
    doc: Document,
    selection: Selection,
    ops: Vec<Op>,
    inverse_ops: Vec<Op>,
}

pub struct Editor {
    doc: Document,
    selection: Selection,
    registry: Arc<PluginRegistry>,
    config: EditorConfig,
    version: u64,
    read_only: bool,
    undo_stack: Vec<UndoRecord>,
    redo_stack: Vec<UndoRecord>,
    listeners: Vec<(SubscriptionId, ChangeListener)>,
    next_subscription: u64,
}

impl Editor {
    pub fn new(doc: Document, selection: Selection, registry: PluginRegistry) -> Self {
        Self::with_registry(doc, selection, Arc::new(registry))
    }

    pub fn with_registry(
        doc: Document,
        selection: Selection,
        registry: Arc<PluginRegistry>,
    ) -> Self {
        let mut editor = Self {
            doc,
            selection,
            registry,
            config: EditorConfig::default().with_defaults(),
            version: 0,
            read_only: false,
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            listeners: Vec::new(),
            next_subscription: 0,
        };
        editor.normalize_in_place();
        editor
    }

    pub fn with_core_plugins() -> Self {
        Self::empty(PluginRegistry::core())
    }

    pub fn with_richtext_plugins() -> Self {
        Self::empty(PluginRegistry::richtext())
    }

    fn empty(registry: PluginRegistry) -> Self {
        let doc = Document {
            children: vec![Node::paragraph("")],
        };
        let selection = Selection::collapsed(Point::new(vec![0, 0], 0));
        Self::new(doc, selection, registry)
    }

    pub fn with_config(mut self, config: EditorConfig) -> Self {
        self.config = config.with_defaults();
        self
    }

    pub fn doc(&self) -> &Document {
        &self.doc
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn set_selection(&mut self, selection: Selection) {
        self.selection = selection;
        self.normalize_selection_in_place();
    }

    pub fn registry(&self) -> &PluginRegistry {
        &self.registry
    }

    /// Monotonic document version, bumped once per commit.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn set_read_only(&mut self, read_only: bool) {
        self.read_only = read_only;
    }

    pub fn subscribe(&mut self, listener: impl FnMut(&ChangeEvent) + Send + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(existing, _)| *existing != id);
        before != self.listeners.len()
    }

    /// Replaces the whole document, e.g. when the host loads new content.
    /// History is cleared; one change notification is fired.
    pub fn reset(&mut self, doc: Document) -> ChangeEvent {
        self.doc = doc;
        self.undo_stack.clear();
        self.redo_stack.clear();
        self.normalize_in_place();
        let selection = Selection::collapsed(
            crate::plugin::first_text_point(&self.doc).unwrap_or(Point::new(vec![0, 0], 0)),
        );
        self.set_selection(selection);
        let (doc, selection) = (self.doc.clone(), self.selection.clone());
        self.commit_state(doc, selection, Some("editor:reset".to_string()))
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo(&mut self) -> bool {
        if self.read_only {
            return false;
        }
        let Some(record) = self.undo_stack.pop() else {
            return false;
        };

        let UndoRecord {
            inverse_ops,
            selection_before,
            selection_after,
        } = record;

        let (doc, selection, redo_ops) = match self.replay(&inverse_ops, selection_before.clone()) {
            Ok(replayed) => replayed,
            Err(err) => {
                warn!(%err, "dropping undo record that no longer applies");
                return false;
            }
        };

        self.redo_stack.push(UndoRecord {
            selection_before,
            selection_after,
            inverse_ops: redo_ops,
        });
        self.commit_state(doc, selection, Some("history:undo".to_string()));
        true
    }

    pub fn redo(&mut self) -> bool {
        if self.read_only {
            return false;
        }
        let Some(record) = self.redo_stack.pop() else {
            return false;
        };

        let UndoRecord {
            inverse_ops,
            selection_before,
            selection_after,
        } = record;

        let (doc, selection, undo_ops) = match self.replay(&inverse_ops, selection_after.clone()) {
            Ok(replayed) => replayed,
            Err(err) => {
                warn!(%err, "dropping redo record that no longer applies");
                return false;
            }
        };

        self.undo_stack.push(UndoRecord {
            selection_before,
            selection_after,
            inverse_ops: undo_ops,
        });
        self.commit_state(doc, selection, Some("history:redo".to_string()));
        true
    }

    /// Starts a transaction whose edits are expressed in the coordinates of the
    /// current document.
    pub fn begin(&self) -> TransactionBuilder {
        TransactionBuilder::new(self.version)
    }

    pub fn commit(&mut self, builder: TransactionBuilder) -> Result<ChangeEvent, EditError> {
        let tx = builder.build()?;
        self.apply(tx)
    }

    /// Applies a transaction atomically: either every op lands and exactly one
    /// change notification fires, or nothing changes.
    #[instrument(level = "debug", skip_all)]
    pub fn apply(&mut self, tx: Transaction) -> Result<ChangeEvent, EditError> {
        if self.read_only {
            return Err(EditError::ReadOnly);
        }
        if let Some(expected) = tx.base_version {
            if expected != self.version {
                warn!(expected, actual = self.version, "transaction conflict");
                return Err(EditError::Conflict {
                    expected,
                    actual: self.version,
                });
            }
        }

        let staged = self.stage(&tx)?;
        let selection_before = self.selection.clone();

        self.undo_stack.push(UndoRecord {
            inverse_ops: staged.inverse_ops,
            selection_before,
            selection_after: staged.selection.clone(),
        });
        self.redo_stack.clear();
        if self.undo_stack.len() > self.config.max_undo {
            self.undo_stack.remove(0);
        }

        debug!(
            ops = staged.ops.len(),
            source = tx.meta.source.as_deref().unwrap_or(""),
            "applied transaction"
        );
        Ok(self.commit_state(staged.doc, staged.selection, tx.meta.source))
    }

    fn commit_state(
        &mut self,
        doc: Document,
        selection: Selection,
        source: Option<String>,
    ) -> ChangeEvent {
        self.doc = doc;
        self.selection = selection;
        self.version += 1;

        let event = ChangeEvent {
            version: self.version,
            document: self.doc.clone(),
            selection: self.selection.clone(),
            source,
        };
        for (_, listener) in &mut self.listeners {
            listener(&event);
        }
        event
    }

    fn stage(&self, tx: &Transaction) -> Result<Staged, EditError> {
        let mut doc = self.doc.clone();
        let mut selection = self.selection.clone();
        let mut ops: Vec<Op> = Vec::with_capacity(tx.ops.len());
        let mut inverse_ops: Vec<Op> = Vec::with_capacity(tx.ops.len());

        for op in tx.ops.iter().cloned() {
            ops.push(op.clone());
            inverse_ops.push(apply_op_to(&mut doc, &mut selection, op)?);
        }

        if let Some(sel) = &tx.selection_after {
            selection = sel.clone();
        }

        self.normalize_to_fixpoint(&mut doc, &mut selection, &mut ops, &mut inverse_ops)?;
        inverse_ops.reverse();

        let selection = self.registry.normalize_selection(&doc, &selection);
        Ok(Staged {
            doc,
            selection,
            ops,
            inverse_ops,
        })
    }

    fn replay(
        &self,
        ops: &[Op],
        selection_after: Selection,
    ) -> Result<(Document, Selection, Vec<Op>), EditError> {
        let mut doc = self.doc.clone();
        let mut selection = self.selection.clone();
        let mut inverse_ops: Vec<Op> = Vec::with_capacity(ops.len());
        for op in ops.iter().cloned() {
            inverse_ops.push(apply_op_to(&mut doc, &mut selection, op)?);
        }
        inverse_ops.reverse();

        let mut selection = selection_after;
        self.normalize_to_fixpoint(&mut doc, &mut selection, &mut Vec::new(), &mut Vec::new())?;
        let selection = self.registry.normalize_selection(&doc, &selection);
        Ok((doc, selection, inverse_ops))
    }

    fn normalize_to_fixpoint(
        &self,
        doc: &mut Document,
        selection: &mut Selection,
        applied: &mut Vec<Op>,
        inverse_ops: &mut Vec<Op>,
    ) -> Result<(), EditError> {
        for iteration in 0..self.config.max_normalize_iterations {
            let ops = self.registry.normalize(doc);
            if ops.is_empty() {
                if iteration > 0 {
                    debug!(iterations = iteration, "normalization settled");
                }
                return Ok(());
            }
            for op in ops {
                applied.push(op.clone());
                inverse_ops.push(apply_op_to(doc, selection, op)?);
            }
        }
        Err(EditError::NormalizeDidNotConverge)
    }

    /// Scratch copy sharing the registry; used for dry runs and chains.
    pub(crate) fn fork(&self) -> Editor {
        Editor {
            doc: self.doc.clone(),
            selection: self.selection.clone(),
            registry: Arc::clone(&self.registry),
            config: self.config.clone(),
            version: self.version,
            read_only: self.read_only,
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            listeners: Vec::new(),
            next_subscription: 0,
        }
    }

    pub fn preview_transaction(&self, tx: &Transaction) -> Result<TransactionPreview, EditError> {
        let staged = self.stage(tx)?;
        Ok(TransactionPreview {
            doc: staged.doc,
            selection: staged.selection,
        })
    }

    /// Dry run: the same structural checks as `apply`, without touching the document.
    pub fn can_apply(&self, tx: &Transaction) -> bool {
        if self.read_only {
            return false;
        }
        if tx.base_version.is_some_and(|v| v != self.version) {
            return false;
        }
        self.stage(tx).is_ok()
    }

    pub fn run_command(&mut self, id: &str, args: Option<Value>) -> Result<(), EditError> {
        if self.read_only {
            return Err(EditError::ReadOnly);
        }
        let Some(command) = self.registry.command(id) else {
            return Err(EditError::UnknownCommand(id.to_string()));
        };
        let tx = (command.handler)(self, args).inspect_err(|err| {
            warn!(command = id, %err, "command rejected");
        })?;
        if tx.is_noop(&self.selection) {
            return Ok(());
        }
        self.apply(tx).map(|_| ())
    }

    /// Whether `run_command(id, args)` would succeed, without building a document.
    pub fn can_run_command(&self, id: &str, args: Option<&Value>) -> bool {
        if self.read_only {
            return false;
        }
        let Some(command) = self.registry.command(id) else {
            return false;
        };
        if let Some(check) = &command.check {
            return check(self, args);
        }
        (command.handler)(self, args.cloned())
            .map(|tx| tx.is_noop(&self.selection) || self.stage(&tx).is_ok())
            .unwrap_or(false)
    }

    pub fn chain(&self) -> Chain {
        Chain::new()
    }

    pub fn run_chain(&mut self, chain: &Chain) -> Result<(), EditError> {
        let tx = chain.build(self)?;
        if tx.is_noop(&self.selection) {
            return Ok(());
        }
        self.apply(tx).map(|_| ())
    }

    pub fn run_query_json(&self, id: &str, args: Option<Value>) -> Result<Value, QueryError> {
        let Some(query) = self.registry.query(id) else {
            return Err(QueryError::new(format!("Unknown query: {id}")));
        };
        (query.handler)(self, args)
    }

    pub fn run_query<T>(&self, id: &str, args: Option<Value>) -> Result<T, QueryError>
    where
        T: DeserializeOwned,
    {
        let value = self.run_query_json(id, args)?;
        serde_json::from_value(value)
            .map_err(|err| QueryError::new(format!("Failed to decode query result: {err}")))
    }

    fn normalize_in_place(&mut self) {
        let mut doc = self.doc.clone();
        let mut selection = self.selection.clone();
        match self.normalize_to_fixpoint(&mut doc, &mut selection, &mut Vec::new(), &mut Vec::new())
        {
            Ok(()) => {
                self.doc = doc;
                self.selection = selection;
            }
            Err(err) => warn!(%err, "initial normalization failed"),
        }
        self.normalize_selection_in_place();
    }

    fn normalize_selection_in_place(&mut self) {
        self.selection = self
            .registry
            .normalize_selection(&self.doc, &self.selection);
    }
}

/// Left-to-right composition of commands into one transaction. Each command
/// sees the state left by the previous ones; the first failure aborts the
/// whole chain.
#[derive(Debug, Clone, Default)]
pub struct Chain {
    steps: Vec<ChainStep>,
}

#[derive(Debug, Clone)]
struct ChainStep {
    id: String,
    args: Option<Value>,
}

impl Chain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn command(mut self, id: impl Into<String>, args: Option<Value>) -> Self {
        self.steps.push(ChainStep {
            id: id.into(),
            args,
        });
        self
    }

    pub fn build(&self, editor: &Editor) -> Result<Transaction, EditError> {
        if editor.is_read_only() {
            return Err(EditError::ReadOnly);
        }

        let mut scratch = editor.fork();
        let mut ops: Vec<Op> = Vec::new();
        for step in &self.steps {
            let Some(command) = scratch.registry.command(&step.id) else {
                return Err(EditError::UnknownCommand(step.id.clone()));
            };
            if let Some(check) = &command.check {
                if !check(&scratch, step.args.as_ref()) {
                    return Err(EditError::structural(format!(
                        "{} is not applicable here",
                        step.id
                    )));
                }
            }
            let tx = (command.handler)(&scratch, step.args.clone())?;
            let staged = scratch.stage(&tx)?;
            ops.extend(staged.ops);
            scratch.doc = staged.doc;
            scratch.selection = staged.selection;
        }

        let source = self
            .steps
            .iter()
            .map(|s| s.id.as_str())
            .collect::<Vec<_>>()
            .join("+");
        Ok(Transaction::new(ops)
            .selection_after(scratch.selection)
            .source(format!("chain:{source}"))
            .base_version(editor.version()))
    }

    pub fn can_run(&self, editor: &Editor) -> bool {
        self.build(editor).is_ok()
    }

    pub fn run(&self, editor: &mut Editor) -> Result<(), EditError> {
        editor.run_chain(self)
    }
}

fn apply_op_to(doc: &mut Document, selection: &mut Selection, op: Op) -> Result<Op, EditError> {
    match op {
        Op::InsertText { path, offset, text } => {
            let text_node = node_text_mut(doc, &path)?;
            let offset = clamp_to_char_boundary(&text_node.text, offset);
            text_node.text.insert_str(offset, &text);
            transform_selection_insert_text(selection, &path, offset, text.len());
            Ok(Op::RemoveText {
                path,
                range: offset..offset + text.len(),
            })
        }
        Op::RemoveText { path, range } => {
            let text_node = node_text_mut(doc, &path)?;
            let start =
                clamp_to_char_boundary(&text_node.text, range.start.min(text_node.text.len()));
            let end = clamp_to_char_boundary(&text_node.text, range.end.min(text_node.text.len()));
            if start >= end {
                return Ok(Op::InsertText {
                    path,
                    offset: start,
                    text: String::new(),
                });
            }
            let removed = text_node.text[start..end].to_string();
            text_node.text.replace_range(start..end, "");
            transform_selection_remove_text(selection, &path, start..end);
            Ok(Op::InsertText {
                path,
                offset: start,
                text: removed,
            })
        }
        Op::InsertNode { path, node } => {
            insert_node(doc, &path, node)?;
            transform_selection_insert_node(selection, &path);
            Ok(Op::RemoveNode { path })
        }
        Op::RemoveNode { path } => {
            let removed = remove_node(doc, &path)?;
            transform_selection_remove_node(selection, &path, &removed, doc);
            Ok(Op::InsertNode {
                path,
                node: removed,
            })
        }
        Op::SetNodeAttrs { path, patch } => {
            let node = node_mut(doc, &path)?;
            let old = match node {
                Node::Element(el) => patch_apply(&mut el.attrs, &patch),
                Node::Void(v) => patch_apply(&mut v.attrs, &patch),
                Node::Text(_) => return Err(EditError::InvalidPath("Text has no attrs".into())),
            };
            Ok(Op::SetNodeAttrs { path, patch: old })
        }
        Op::SetTextMarks { path, marks } => {
            let text_node = node_text_mut(doc, &path)?;
            let old = std::mem::replace(&mut text_node.marks, marks);
            Ok(Op::SetTextMarks { path, marks: old })
        }
    }
}

#[derive(Debug)]
struct PathError(String);

impl From<PathError> for EditError {
    fn from(value: PathError) -> Self {
        EditError::InvalidPath(value.0)
    }
}

pub(crate) fn clamp_to_char_boundary(s: &str, mut ix: usize) -> usize {
    ix = ix.min(s.len());
    while ix > 0 && !s.is_char_boundary(ix) {
        ix -= 1;
    }
    ix
}

fn transform_selection_insert_text(
    selection: &mut Selection,
    path: &[usize],
    offset: usize,
    len: usize,
) {
    for point in [&mut selection.anchor, &mut selection.focus] {
        if point.path == path && point.offset >= offset {
            point.offset = point.offset.saturating_add(len);
        }
    }
}

fn transform_selection_remove_text(
    selection: &mut Selection,
    path: &[usize],
    range: std::ops::Range<usize>,
) {
    let removed_len = range.end.saturating_sub(range.start);
    for point in [&mut selection.anchor, &mut selection.focus] {
        if point.path != path || point.offset <= range.start {
            continue;
        }
        if point.offset >= range.end {
            point.offset = point.offset.saturating_sub(removed_len);
        } else {
            point.offset = range.start;
        }
    }
}

fn transform_selection_insert_node(selection: &mut Selection, path: &[usize]) {
    let Some((&index, parent_path)) = path.split_last() else {
        return;
    };

    for point in [&mut selection.anchor, &mut selection.focus] {
        let depth = parent_path.len();
        if point.path.len() <= depth || !point.path.starts_with(parent_path) {
            continue;
        }
        if point.path[depth] >= index {
            point.path[depth] += 1;
        }
    }
}

fn transform_selection_remove_node(
    selection: &mut Selection,
    path: &[usize],
    removed: &Node,
    doc_after_remove: &Document,
) {
    let Some((&index, parent_path)) = path.split_last() else {
        return;
    };

    // A removed text leaf whose content was merged into its left sibling keeps
    // the caret at the same visual spot.
    let merge_prefix_len = match (removed, index.checked_sub(1)) {
        (Node::Text(removed_text), Some(left_index)) => {
            let mut left_path = parent_path.to_vec();
            left_path.push(left_index);
            match node_ref(doc_after_remove, &left_path) {
                Some(Node::Text(left_text))
                    if left_text.marks == removed_text.marks
                        && left_text.text.ends_with(&removed_text.text) =>
                {
                    Some(left_text.text.len().saturating_sub(removed_text.text.len()))
                }
                _ => None,
            }
        }
        _ => None,
    };

    for point in [&mut selection.anchor, &mut selection.focus] {
        let depth = parent_path.len();
        if point.path.len() <= depth || !point.path.starts_with(parent_path) {
            continue;
        }
        let ix = point.path[depth];
        if ix > index {
            point.path[depth] = ix - 1;
            continue;
        }
        if ix < index {
            continue;
        }

        if let (Some(prefix), Node::Text(removed_text), Some(left_index)) =
            (merge_prefix_len, removed, index.checked_sub(1))
        {
            point.path.truncate(depth + 1);
            point.path[depth] = left_index;
            point.offset = (prefix + point.offset).min(prefix + removed_text.text.len());
        } else {
            point.path.truncate(depth + 1);
            point.path[depth] = index.saturating_sub(1);
            point.offset = 0;
        }
    }
}

fn node_ref<'a>(doc: &'a Document, path: &[usize]) -> Option<&'a Node> {
    let (first, rest) = path.split_first()?;
    let mut node = doc.children.get(*first)?;
    for &ix in rest {
        node = match node {
            Node::Element(el) => el.children.get(ix)?,
            Node::Void(_) | Node::Text(_) => return None,
        };
    }
    Some(node)
}

fn node_mut<'a>(doc: &'a mut Document, path: &[usize]) -> Result<&'a mut Node, PathError> {
    let Some((first, rest)) = path.split_first() else {
        return Err(PathError("Empty path".into()));
    };

    let len = doc.children.len();
    let mut node = doc
        .children
        .get_mut(*first)
        .ok_or_else(|| PathError(format!("Path out of bounds at depth 0: {first} >= {len}")))?;

    for (depth, &ix) in rest.iter().enumerate() {
        node = match node {
            Node::Element(el) => {
                let len = el.children.len();
                el.children.get_mut(ix).ok_or_else(|| {
                    PathError(format!(
                        "Path out of bounds at depth {}: {ix} >= {len}",
                        depth + 1
                    ))
                })?
            }
            Node::Void(_) | Node::Text(_) => {
                return Err(PathError(format!("Non-container node at depth {depth}")));
            }
        };
    }

    Ok(node)
}

fn node_text_mut<'a>(doc: &'a mut Document, path: &[usize]) -> Result<&'a mut TextNode, PathError> {
    match node_mut(doc, path)? {
        Node::Text(t) => Ok(t),
        _ => Err(PathError("Expected Text node".into())),
    }
}

fn children_mut<'a>(
    doc: &'a mut Document,
    parent_path: &[usize],
) -> Result<&'a mut Vec<Node>, PathError> {
    if parent_path.is_empty() {
        return Ok(&mut doc.children);
    }
    match node_mut(doc, parent_path)? {
        Node::Element(el) => Ok(&mut el.children),
        Node::Void(_) | Node::Text(_) => Err(PathError("Parent is not a container".into())),
    }
}

fn insert_node(doc: &mut Document, path: &[usize], node: Node) -> Result<(), PathError> {
    let Some((&index, parent_path)) = path.split_last() else {
        return Err(PathError("Empty insert path".into()));
    };

    let children = children_mut(doc, parent_path)?;
    if index > children.len() {
        return Err(PathError(format!(
            "Insert index out of bounds: {index} > {}",
            children.len()
        )));
    }
    children.insert(index, node);
    Ok(())
}

fn remove_node(doc: &mut Document, path: &[usize]) -> Result<Node, PathError> {
    let Some((&index, parent_path)) = path.split_last() else {
        return Err(PathError("Empty remove path".into()));
    };

    let children = children_mut(doc, parent_path)?;
    if index >= children.len() {
        return Err(PathError(format!(
            "Remove index out of bounds: {index} >= {}",
            children.len()
        )));
    }
    Ok(children.remove(index))
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttrPatch {
    #[serde(default)]
    pub set: Attrs,
    #[serde(default)]
    pub remove: Vec<String>,
}

impl AttrPatch {
    pub fn set(key: impl Into<String>, value: Value) -> Self {
        let mut set = Attrs::new();
        set.insert(key.into(), value);
        Self {
            set,
            remove: Vec::new(),
        }
    }

    pub fn remove(key: impl Into<String>) -> Self {
        Self {
            set: Attrs::new(),
            remove: vec![key.into()],
        }
    }
}

fn patch_apply(attrs: &mut Attrs, patch: &AttrPatch) -> AttrPatch {
    let mut old_set: Attrs = Attrs::new();
    let mut old_remove: Vec<String> = Vec::new();

    for (k, v) in &patch.set {
        if let Some(prev) = attrs.insert(k.clone(), v.clone()) {
            old_set.insert(k.clone(), prev);
        } else {
            old_remove.push(k.clone());
        }
    }

    for key in &patch.remove {
        if let Some(prev) = attrs.remove(key) {
            old_set.insert(key.clone(), prev);
        }
    }

    AttrPatch {
        set: old_set,
        remove: old_remove,
    }
}
