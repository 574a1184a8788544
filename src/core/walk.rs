//! Depth-first graph walks with explicit parent tracking.
//!
//! The walker keeps every expanded node in a frame arena. A frame records the
//! node, the frame it was reached from and the tag of that edge, so the full
//! path from the root to any visited edge is available as a value while the
//! walk is running.

use std::collections::HashSet;
use std::fmt;

use serde::Serialize;

use crate::core::graph::{UnitGraph, UnitId};
use crate::core::tag::DependencyTag;
use crate::core::target::Variant;
use crate::util::Name;

#[derive(Debug, Clone, Copy)]
struct Frame {
    node: UnitId,
    parent: Option<usize>,
    tag: Option<DependencyTag>,
}

/// One edge offered to a walk callback.
pub struct WalkStep<'a> {
    graph: &'a UnitGraph,
    frames: &'a [Frame],
    parent_frame: usize,
    pub tag: DependencyTag,
    pub child: UnitId,
}

impl<'a> WalkStep<'a> {
    pub fn graph(&self) -> &'a UnitGraph {
        self.graph
    }

    pub fn root(&self) -> UnitId {
        self.frames[0].node
    }

    pub fn parent(&self) -> UnitId {
        self.frames[self.parent_frame].node
    }

    /// The edge leaves the root.
    pub fn is_direct(&self) -> bool {
        self.parent_frame == 0
    }

    /// Number of edges between the root and the child.
    pub fn depth(&self) -> usize {
        let mut depth = 1;
        let mut frame = self.frames[self.parent_frame];
        while let Some(parent) = frame.parent {
            depth += 1;
            frame = self.frames[parent];
        }
        depth
    }

    /// Full tagged path from the root to the child.
    pub fn path(&self) -> DependencyPath {
        let mut entries = Vec::new();
        let child = self.graph.unit(self.child);
        entries.push(PathEntry {
            tag: Some(self.tag),
            unit: child.name,
            variant: child.variant,
        });

        let mut index = Some(self.parent_frame);
        while let Some(i) = index {
            let frame = self.frames[i];
            let unit = self.graph.unit(frame.node);
            entries.push(PathEntry {
                tag: frame.tag,
                unit: unit.name,
                variant: unit.variant,
            });
            index = frame.parent;
        }

        entries.reverse();
        DependencyPath { entries }
    }
}

/// One hop of a dependency path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PathEntry {
    /// Tag of the edge that reached this unit; `None` for the root.
    pub tag: Option<DependencyTag>,
    pub unit: Name,
    pub variant: Variant,
}

/// A tag-annotated path from a bundle to one of its transitive dependencies.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DependencyPath {
    entries: Vec<PathEntry>,
}

impl DependencyPath {
    pub fn entries(&self) -> &[PathEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Unit names along the path, root first.
    pub fn names(&self) -> Vec<Name> {
        self.entries.iter().map(|e| e.unit).collect()
    }
}

impl fmt::Display for DependencyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for entry in &self.entries {
            match entry.tag {
                None => write!(f, "\n{}", entry.unit)?,
                Some(tag) => match entry.variant {
                    Variant::Common => write!(f, "\n  -> {} {}", tag, entry.unit)?,
                    Variant::Arch(arch) => {
                        write!(f, "\n  -> {} {} ({})", tag, entry.unit, arch)?
                    }
                },
            }
        }
        Ok(())
    }
}

/// Walk the graph depth-first from `root`.
///
/// `visit` is called once for every edge leaving an expanded node, in
/// declaration order, and returns whether to descend into the child. A node is
/// expanded at most once, but it may be offered again through other edges
/// after an earlier visit declined it.
pub fn walk<F>(graph: &UnitGraph, root: UnitId, mut visit: F)
where
    F: FnMut(&WalkStep<'_>) -> bool,
{
    let mut frames = vec![Frame {
        node: root,
        parent: None,
        tag: None,
    }];
    let mut expanded = HashSet::from([root]);
    let mut stack = vec![(0usize, graph.deps(root), 0usize)];

    while let Some((frame, edges, pos)) = stack.last_mut() {
        if *pos >= edges.len() {
            stack.pop();
            continue;
        }
        let (tag, child) = edges[*pos];
        *pos += 1;
        let parent_frame = *frame;

        let descend = {
            let step = WalkStep {
                graph,
                frames: &frames,
                parent_frame,
                tag,
                child,
            };
            visit(&step)
        };

        if descend && expanded.insert(child) {
            frames.push(Frame {
                node: child,
                parent: Some(parent_frame),
                tag: Some(tag),
            });
            stack.push((frames.len() - 1, graph.deps(child), 0));
        }
    }
}
