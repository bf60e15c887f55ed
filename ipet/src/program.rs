//! A program as a set of subprograms, each with its own flow graph and loop
//! nesting tree.

use std::collections::{HashMap, HashSet};

use thiserror::Error;
use tracing::{debug, trace};

use crate::{
    database::SubprogramId,
    graph::{DirectedGraph, EdgeKind},
    trees::{LoopNestingTree, TreeError},
};

pub type Result<T> = std::result::Result<T, ProgramError>;

#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum ProgramError {
    /// Thrown when two subprograms share an identifier.
    #[error("Duplicate subprogram identifier {0}")]
    DuplicateSubprogram(SubprogramId),

    #[error("No subprogram with identifier {0}")]
    UnknownSubprogram(SubprogramId),

    /// Thrown when an inlined edge names a subprogram the program does not
    /// contain.
    #[error("Subprogram {caller} inlines unknown subprogram {callee}")]
    UnknownCallee {
        caller: SubprogramId,
        callee: SubprogramId,
    },

    /// Thrown when the inlining relation contains a cycle.
    #[error("Subprogram {0} is (mutually) recursive")]
    Recursive(SubprogramId),

    #[error("Loop nesting tree error")]
    Tree(#[from] TreeError),
}

#[derive(Debug, Clone)]
pub struct Subprogram {
    id: SubprogramId,
    name: String,
    graph: DirectedGraph,
    lnt: LoopNestingTree,
}

impl Subprogram {
    /// Wraps `graph` and builds its loop nesting tree. The graph needs a
    /// designated entry vertex that reaches every other vertex.
    pub fn new(id: SubprogramId, name: impl Into<String>, graph: DirectedGraph) -> Result<Self> {
        let lnt = LoopNestingTree::new(&graph)?;
        Ok(Self {
            id,
            name: name.into(),
            graph,
            lnt,
        })
    }

    /// Like [`new`](Self::new) but also tags the loop role of every
    /// [`Trace`](EdgeKind::Trace) edge from the loop nesting tree.
    pub fn with_loop_tags(
        id: SubprogramId,
        name: impl Into<String>,
        graph: DirectedGraph,
    ) -> Result<Self> {
        let mut subprogram = Self::new(id, name, graph)?;
        let tagged = subprogram.lnt.tag_loop_edges(&mut subprogram.graph)?;
        debug!("Tagged {} loop edges of {}", tagged, subprogram.name);
        Ok(subprogram)
    }

    pub fn id(&self) -> SubprogramId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn graph(&self) -> &DirectedGraph {
        &self.graph
    }

    pub fn lnt(&self) -> &LoopNestingTree {
        &self.lnt
    }

    /// Subprograms inlined into this one, in edge order.
    pub fn callees(&self) -> Vec<SubprogramId> {
        let mut callees = Vec::new();
        for edge in self.graph.edges() {
            if let EdgeKind::Inlined { callee } = edge.kind() {
                if !callees.contains(callee) {
                    callees.push(*callee);
                }
            }
        }
        callees
    }
}

#[derive(Debug, Clone, Default)]
pub struct Program {
    subprograms: Vec<Subprogram>,
    index: HashMap<SubprogramId, usize>,
}

impl Program {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_subprogram(&mut self, subprogram: Subprogram) -> Result<()> {
        if self.index.contains_key(&subprogram.id) {
            return Err(ProgramError::DuplicateSubprogram(subprogram.id));
        }
        trace!("Adding subprogram {} ({})", subprogram.name, subprogram.id);
        self.index.insert(subprogram.id, self.subprograms.len());
        self.subprograms.push(subprogram);
        Ok(())
    }

    pub fn subprogram(&self, id: SubprogramId) -> Result<&Subprogram> {
        self.index
            .get(&id)
            .map(|index| &self.subprograms[*index])
            .ok_or(ProgramError::UnknownSubprogram(id))
    }

    /// Subprograms in insertion order.
    pub fn subprograms(&self) -> impl Iterator<Item = &Subprogram> {
        self.subprograms.iter()
    }

    pub fn len(&self) -> usize {
        self.subprograms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subprograms.is_empty()
    }

    /// Orders the subprograms so that every callee comes before its callers.
    /// Subprograms with no ordering constraint between them keep insertion
    /// order.
    pub fn bottom_up_order(&self) -> Result<Vec<SubprogramId>> {
        let mut order = Vec::with_capacity(self.subprograms.len());
        let mut done = HashSet::new();

        for root in &self.subprograms {
            if done.contains(&root.id) {
                continue;
            }
            // (subprogram, next callee to look at)
            let mut stack = vec![(root.id, 0usize)];
            let mut on_stack = HashSet::from([root.id]);

            while let Some((id, next)) = stack.last_mut() {
                let caller = *id;
                let callees = self.subprogram(caller)?.callees();
                if *next == callees.len() {
                    stack.pop();
                    on_stack.remove(&caller);
                    done.insert(caller);
                    order.push(caller);
                    continue;
                }
                let callee = callees[*next];
                *next += 1;

                if !self.index.contains_key(&callee) {
                    return Err(ProgramError::UnknownCallee { caller, callee });
                }
                if on_stack.contains(&callee) {
                    return Err(ProgramError::Recursive(callee));
                }
                if !done.contains(&callee) {
                    on_stack.insert(callee);
                    stack.push((callee, 0));
                }
            }
        }
        Ok(order)
    }
}
