use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::core::{AttrPatch, Marks, Node, Point, Selection};
use crate::error::EditError;
use crate::mapping::{Mapping, StepMap};

pub type Path = Vec<usize>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Op {
    InsertText {
        #[serde(default)]
        path: Path,
        offset: usize,
        text: String,
    },
    RemoveText {
        #[serde(default)]
        path: Path,
        range: Range<usize>,
    },
    InsertNode {
        #[serde(default)]
        path: Path,
        node: Node,
    },
    RemoveNode {
        #[serde(default)]
        path: Path,
    },
    SetNodeAttrs {
        #[serde(default)]
        path: Path,
        patch: AttrPatch,
    },
    SetTextMarks {
        #[serde(default)]
        path: Path,
        marks: Marks,
    },
}

impl Op {
    pub fn path(&self) -> &[usize] {
        match self {
            Op::InsertText { path, .. }
            | Op::RemoveText { path, .. }
            | Op::InsertNode { path, .. }
            | Op::RemoveNode { path }
            | Op::SetNodeAttrs { path, .. }
            | Op::SetTextMarks { path, .. } => path,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransactionMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    #[serde(default)]
    pub ops: Vec<Op>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selection_after: Option<Selection>,
    #[serde(default)]
    pub meta: TransactionMeta,
    /// Document version the ops were computed against; `apply` rejects the
    /// transaction when the editor has moved on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_version: Option<u64>,
}

impl Transaction {
    pub fn new(ops: Vec<Op>) -> Self {
        Self {
            ops,
            selection_after: None,
            meta: TransactionMeta::default(),
            base_version: None,
        }
    }

    pub fn selection_after(mut self, selection_after: Selection) -> Self {
        self.selection_after = Some(selection_after);
        self
    }

    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.meta.source = Some(source.into());
        self
    }

    pub fn base_version(mut self, version: u64) -> Self {
        self.base_version = Some(version);
        self
    }

    /// No ops and nothing to move the caret to.
    pub fn is_noop(&self, current: &Selection) -> bool {
        self.ops.is_empty()
            && self
                .selection_after
                .as_ref()
                .is_none_or(|selection| selection == current)
    }
}

/// Accumulates edits expressed against the document as it was at `begin`.
///
/// Each recorded edit is rebased through the mapping of the edits before it,
/// so callers never have to adjust indices by hand. An edit whose target has
/// already been removed poisons the builder; `build` then reports it.
#[derive(Debug, Clone)]
pub struct TransactionBuilder {
    base_version: u64,
    ops: Vec<Op>,
    mapping: Mapping,
    selection_after: Option<Selection>,
    source: Option<String>,
    error: Option<EditError>,
}

impl TransactionBuilder {
    pub fn new(base_version: u64) -> Self {
        Self {
            base_version,
            ops: Vec::new(),
            mapping: Mapping::default(),
            selection_after: None,
            source: None,
            error: None,
        }
    }

    pub fn base_version(&self) -> u64 {
        self.base_version
    }

    pub fn insert_node(&mut self, path: Path, node: Node) -> &mut Self {
        self.push(Op::InsertNode { path, node })
    }

    pub fn remove_node(&mut self, path: Path) -> &mut Self {
        self.push(Op::RemoveNode { path })
    }

    pub fn insert_text(&mut self, path: Path, offset: usize, text: impl Into<String>) -> &mut Self {
        self.push(Op::InsertText {
            path,
            offset,
            text: text.into(),
        })
    }

    pub fn remove_text(&mut self, path: Path, range: Range<usize>) -> &mut Self {
        self.push(Op::RemoveText { path, range })
    }

    pub fn set_attrs(&mut self, path: Path, patch: AttrPatch) -> &mut Self {
        self.push(Op::SetNodeAttrs { path, patch })
    }

    pub fn set_marks(&mut self, path: Path, marks: Marks) -> &mut Self {
        self.push(Op::SetTextMarks { path, marks })
    }

    /// Replaces children `range` of the container at `parent` with `nodes`.
    pub fn replace_range(&mut self, parent: &[usize], range: Range<usize>, nodes: Vec<Node>) -> &mut Self {
        for ix in range.clone() {
            let mut path = parent.to_vec();
            path.push(ix);
            self.remove_node(path);
        }
        for node in nodes {
            let mut path = parent.to_vec();
            path.push(range.start);
            self.insert_node(path, node);
        }
        self
    }

    /// Selection once every edit has landed, in final-document coordinates.
    pub fn selection_after(&mut self, selection: Selection) -> &mut Self {
        self.selection_after = Some(selection);
        self
    }

    pub fn source(&mut self, source: impl Into<String>) -> &mut Self {
        self.source = Some(source.into());
        self
    }

    /// Where a begin-time point ends up after the edits recorded so far.
    pub fn map_point(&self, point: &Point) -> Option<Point> {
        self.mapping.map_point(point)
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn build(self) -> Result<Transaction, EditError> {
        if let Some(err) = self.error {
            return Err(err);
        }
        let mut tx = Transaction::new(self.ops).base_version(self.base_version);
        tx.selection_after = self.selection_after;
        tx.meta.source = self.source;
        Ok(tx)
    }

    fn push(&mut self, op: Op) -> &mut Self {
        if self.error.is_some() {
            return self;
        }
        match self.mapping.map_op(op) {
            Some(mapped) => {
                self.mapping.push(StepMap::for_op(&mapped));
                self.ops.push(mapped);
            }
            None => {
                self.error = Some(EditError::structural(
                    "edit targets a node removed earlier in the transaction",
                ));
            }
        }
        self
    }
}
