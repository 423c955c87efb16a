//! Position mapping across the steps of a transaction.
//!
//! Paths name either a node (`map_node_path`) or a gap between siblings where a
//! node may be inserted (`map_gap_path`). The two differ only for removals: a
//! node at the removed index is gone, while a gap at that index stays put.

use std::ops::Range;

use crate::core::Point;
use crate::ops::{Op, Path};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepMap {
    Identity,
    InsertNode { path: Path },
    RemoveNode { path: Path },
    InsertText { path: Path, offset: usize, len: usize },
    RemoveText { path: Path, range: Range<usize> },
}

impl StepMap {
    pub fn for_op(op: &Op) -> Self {
        match op {
            Op::InsertNode { path, .. } => StepMap::InsertNode { path: path.clone() },
            Op::RemoveNode { path } => StepMap::RemoveNode { path: path.clone() },
            Op::InsertText { path, offset, text } => StepMap::InsertText {
                path: path.clone(),
                offset: *offset,
                len: text.len(),
            },
            Op::RemoveText { path, range } => StepMap::RemoveText {
                path: path.clone(),
                range: range.clone(),
            },
            Op::SetNodeAttrs { .. } | Op::SetTextMarks { .. } => StepMap::Identity,
        }
    }

    /// `None` when the node at `path` (or one of its ancestors) was removed.
    pub fn map_node_path(&self, path: &[usize]) -> Option<Path> {
        match self {
            StepMap::InsertNode { path: at } => Some(shift_after_insert(path, at)),
            StepMap::RemoveNode { path: at } => {
                if path.starts_with(at) {
                    return None;
                }
                Some(shift_after_remove(path, at))
            }
            _ => Some(path.to_vec()),
        }
    }

    /// Gaps associate to the right: inserting at a gap pushes it past the new node.
    pub fn map_gap_path(&self, path: &[usize]) -> Option<Path> {
        match self {
            StepMap::InsertNode { path: at } => Some(shift_after_insert(path, at)),
            StepMap::RemoveNode { path: at } => {
                if path.len() > at.len() && path.starts_with(at) {
                    return None;
                }
                Some(shift_after_remove(path, at))
            }
            _ => Some(path.to_vec()),
        }
    }

    pub fn map_point(&self, point: &Point) -> Option<Point> {
        let path = self.map_node_path(&point.path)?;
        let offset = match self {
            StepMap::InsertText {
                path: at,
                offset,
                len,
            } if *at == point.path && point.offset >= *offset => point.offset + len,
            StepMap::RemoveText { path: at, range } if *at == point.path => {
                if point.offset >= range.end {
                    point.offset - (range.end - range.start)
                } else if point.offset > range.start {
                    range.start
                } else {
                    point.offset
                }
            }
            _ => point.offset,
        };
        Some(Point::new(path, offset))
    }
}

fn shift_after_insert(path: &[usize], at: &[usize]) -> Path {
    let mut mapped = path.to_vec();
    let Some((&index, parent)) = at.split_last() else {
        return mapped;
    };
    let depth = parent.len();
    if path.len() > depth && path.starts_with(parent) && path[depth] >= index {
        mapped[depth] += 1;
    }
    mapped
}

fn shift_after_remove(path: &[usize], at: &[usize]) -> Path {
    let mut mapped = path.to_vec();
    let Some((&index, parent)) = at.split_last() else {
        return mapped;
    };
    let depth = parent.len();
    if path.len() > depth && path.starts_with(parent) && path[depth] > index {
        mapped[depth] -= 1;
    }
    mapped
}

/// Composition of step maps, applied in order.
#[derive(Debug, Clone, Default)]
pub struct Mapping {
    steps: Vec<StepMap>,
}

impl Mapping {
    pub fn push(&mut self, step: StepMap) {
        if step != StepMap::Identity {
            self.steps.push(step);
        }
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn map_node_path(&self, path: &[usize]) -> Option<Path> {
        self.steps
            .iter()
            .try_fold(path.to_vec(), |path, step| step.map_node_path(&path))
    }

    pub fn map_gap_path(&self, path: &[usize]) -> Option<Path> {
        self.steps
            .iter()
            .try_fold(path.to_vec(), |path, step| step.map_gap_path(&path))
    }

    pub fn map_point(&self, point: &Point) -> Option<Point> {
        self.steps
            .iter()
            .try_fold(point.clone(), |point, step| step.map_point(&point))
    }

    /// Rebases an op recorded against the starting document onto the current one.
    pub fn map_op(&self, op: Op) -> Option<Op> {
        Some(match op {
            Op::InsertText { path, offset, text } => {
                let point = self.map_point(&Point::new(path, offset))?;
                Op::InsertText {
                    path: point.path,
                    offset: point.offset,
                    text,
                }
            }
            Op::RemoveText { path, range } => {
                let start = self.map_point(&Point::new(path.clone(), range.start))?;
                let end = self.map_point(&Point::new(path, range.end))?;
                Op::RemoveText {
                    range: start.offset..end.offset.max(start.offset),
                    path: start.path,
                }
            }
            Op::InsertNode { path, node } => Op::InsertNode {
                path: self.map_gap_path(&path)?,
                node,
            },
            Op::RemoveNode { path } => Op::RemoveNode {
                path: self.map_node_path(&path)?,
            },
            Op::SetNodeAttrs { path, patch } => Op::SetNodeAttrs {
                path: self.map_node_path(&path)?,
                patch,
            },
            Op::SetTextMarks { path, marks } => Op::SetTextMarks {
                path: self.map_node_path(&path)?,
                marks,
            },
        })
    }
}
