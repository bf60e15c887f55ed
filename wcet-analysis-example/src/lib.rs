//! Sample programs for the WCET examples.

use ipet::prelude::*;

/// Identifier of the subprogram called from [`sample_program`]'s entry.
pub const LEAF: u32 = 2;
pub const MAIN: u32 = 1;

/// Two nested loops: an outer loop headed by 2 around an inner loop headed
/// by 3, closed into the entry by 4 -> 1.
///
/// The edge 3 -> 5 calls [`LEAF`] when `inline_leaf` is set.
pub fn nested_loops(name: &str, inline_leaf: bool) -> ipet::Result<DirectedGraph> {
    let mut graph = DirectedGraph::new(name);
    for vertex in 1..=6 {
        graph.add_vertex(vertex)?;
    }

    let call = if inline_leaf {
        EdgeKind::Inlined { callee: LEAF }
    } else {
        EdgeKind::Trace
    };
    let mut ids = IdAllocator::default();
    for (source, destination, kind) in [
        (1, 2, EdgeKind::Trace),
        (2, 3, EdgeKind::Trace),
        (3, 5, call),
        (5, 3, EdgeKind::Trace),
        (3, 6, EdgeKind::Trace),
        (6, 2, EdgeKind::Trace),
        (2, 4, EdgeKind::Trace),
        (4, 1, EdgeKind::Trace),
    ] {
        graph.add_edge(ids.allocate(), source, destination, kind)?;
    }
    graph.set_entry(1)?;
    Ok(graph)
}

/// A single loop headed by 2: 1 -> 2 -> 3 -> 2, 3 -> 4 -> 1.
pub fn leaf(name: &str) -> ipet::Result<DirectedGraph> {
    let mut graph = DirectedGraph::new(name);
    for vertex in 1..=4 {
        graph.add_vertex(vertex)?;
    }
    graph.add_edge(1, 1, 2, EdgeKind::Trace)?;
    graph.add_edge(2, 2, 3, EdgeKind::Trace)?;
    graph.add_edge(3, 3, 2, EdgeKind::Trace)?;
    graph.add_edge(4, 3, 4, EdgeKind::Trace)?;
    graph.add_edge(5, 4, 1, EdgeKind::Trace)?;
    graph.set_entry(1)?;
    Ok(graph)
}

/// `main` inlining `leaf` inside its inner loop, with loop tags derived
/// from the loop nesting trees.
pub fn sample_program() -> ipet::Result<Program> {
    let mut program = Program::new();
    program.add_subprogram(Subprogram::with_loop_tags(
        MAIN,
        "main",
        nested_loops("main", true)?,
    )?)?;
    program.add_subprogram(Subprogram::with_loop_tags(LEAF, "leaf", leaf("leaf")?)?)?;
    Ok(program)
}

/// Hand written bounds and timings for [`sample_program`].
pub fn sample_database() -> ipet::Result<Database> {
    let mut main = SubprogramData::new()
        .with_loop_bound(3, 2, 5)
        .with_loop_bound(2, 1, 3)
        .with_loop_bound(3, 1, 15)
        .with_tests(10);
    for edge in 1..=8 {
        main.set_unit_wcet(edge, 2);
    }

    let leaf = SubprogramData::new()
        .with_unit_wcet(1, 1)
        .with_unit_wcet(2, 4)
        .with_unit_wcet(4, 1)
        .with_loop_bound(2, 1, 8)
        .with_tests(10);

    let mut database = Database::new();
    database.insert(MAIN, main)?;
    database.insert(LEAF, leaf)?;
    Ok(database)
}
