use std::collections::{BTreeMap, HashMap};

use super::{to_integer, CapacityModelBuilder, IpetError, IpetModelBuilder, LoopPartition};
use crate::{
    database::{DataItem, Database, DatabaseError, SubprogramData, TraceDatabase},
    graph::{DirectedGraph, EdgeKind},
    ilp::{lp_format, BranchAndBound, RowGroup, SolveStatus},
    program::Subprogram,
};

fn setup_graph(name: &str, vertices: &[u32], edges: &[(u32, u32, u32, EdgeKind)]) -> DirectedGraph {
    let mut graph = DirectedGraph::new(name);
    for vertex in vertices {
        graph.add_vertex(*vertex).unwrap();
    }
    for (id, source, destination, kind) in edges {
        graph
            .add_edge(*id, *source, *destination, kind.clone())
            .unwrap();
    }
    graph.set_entry(vertices[0]).unwrap();
    graph
}

/// An outer loop headed by 2 around an inner loop headed by 3, closed into
/// the entry by 4 -> 1.
fn setup_nested_loops(retag: &[(u32, EdgeKind)]) -> Subprogram {
    let mut edges = vec![
        (1, 1, 2, EdgeKind::Entry(2)),
        (2, 2, 3, EdgeKind::Entry(3)),
        (3, 3, 5, EdgeKind::Trace),
        (4, 5, 3, EdgeKind::iteration(3)),
        (5, 3, 6, EdgeKind::Exit(3)),
        (6, 6, 2, EdgeKind::iteration(2)),
        (7, 2, 4, EdgeKind::Exit(2)),
        (8, 4, 1, EdgeKind::iteration(1)),
    ];
    for (id, kind) in retag {
        edges[*id as usize - 1].3 = kind.clone();
    }
    let graph = setup_graph("nested", &[1, 2, 3, 4, 5, 6], &edges);
    Subprogram::new(1, "nested", graph).unwrap()
}

fn setup_nested_data() -> SubprogramData {
    let mut data = SubprogramData::new()
        .with_loop_bound(3, 2, 5)
        .with_loop_bound(2, 1, 3)
        .with_loop_bound(3, 1, 15);
    for edge in 1..=8 {
        data.set_unit_wcet(edge, 1);
    }
    data
}

fn setup_database(data: SubprogramData) -> Database {
    let mut database = Database::new();
    database.insert(1, data).unwrap();
    database
}

fn setup_logging() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::TRACE)
        .with_test_writer()
        .try_init();
}

fn expected_counts(counts: &[(u32, u64)]) -> BTreeMap<u32, u64> {
    counts.iter().copied().collect()
}

#[test]
fn test_single_vertex_self_loop() {
    let graph = setup_graph("single", &[1], &[(1, 1, 1, EdgeKind::iteration(1))]);
    let subprogram = Subprogram::new(1, "single", graph).unwrap();
    let database = setup_database(SubprogramData::new().with_unit_wcet(1, 7));

    let model = IpetModelBuilder::new(&subprogram, &database).build().unwrap();
    assert_eq!(model.problem().column(1).unwrap().upper(), Some(1.0));

    let solution = model.solve(&BranchAndBound::new()).unwrap();
    assert_eq!(solution.wcet(), 7);
    assert_eq!(solution.execution_count(1), Some(1));
}

#[test]
fn test_nested_self_loop() {
    setup_logging();
    // The self loop on 3 sits inside the loop headed by 2.
    let graph = setup_graph(
        "nested_self_loop",
        &[1, 2, 3, 4, 5],
        &[
            (1, 1, 2, EdgeKind::Trace),
            (2, 2, 3, EdgeKind::Trace),
            (3, 3, 3, EdgeKind::Trace),
            (4, 3, 4, EdgeKind::Trace),
            (5, 4, 2, EdgeKind::Trace),
            (6, 2, 5, EdgeKind::Trace),
            (7, 5, 1, EdgeKind::Trace),
        ],
    );
    let subprogram = Subprogram::with_loop_tags(1, "nested_self_loop", graph).unwrap();
    assert_eq!(subprogram.graph().edge(2).unwrap().kind(), &EdgeKind::Entry(3));
    assert_eq!(subprogram.graph().edge(3).unwrap().kind(), &EdgeKind::iteration(3));

    let mut data = SubprogramData::new().with_loop_bound(2, 1, 10);
    for edge in 1..=7 {
        data.set_unit_wcet(edge, 1);
    }
    let database = setup_database(data);

    let model = IpetModelBuilder::new(&subprogram, &database).build().unwrap();
    let problem = model.problem();
    assert_eq!(problem.column(model.column(3).unwrap()).unwrap().upper(), None);
    assert!(problem
        .rows()
        .iter()
        .any(|row| row.group() == RowGroup::Loop && row.comment() == Some("Self loop 3")));

    let solution = model.solve(&BranchAndBound::new()).unwrap();
    assert_eq!(solution.wcet(), 43);
    assert_eq!(
        solution.execution_counts(),
        &expected_counts(&[(1, 1), (2, 10), (3, 10), (4, 10), (5, 10), (6, 1), (7, 1)])
    );
}

#[test]
fn test_nested_loops() {
    setup_logging();
    let subprogram = setup_nested_loops(&[]);
    let database = setup_database(setup_nested_data());

    let model = IpetModelBuilder::new(&subprogram, &database).build().unwrap();
    let problem = model.problem();
    assert_eq!(problem.number_of_columns(), 8);
    assert_eq!(
        problem
            .rows()
            .iter()
            .filter(|row| row.group() == RowGroup::Flow)
            .count(),
        6
    );
    let comments: Vec<_> = problem
        .rows()
        .iter()
        .filter(|row| row.group() == RowGroup::Loop)
        .filter_map(|row| row.comment())
        .collect();
    assert_eq!(
        comments,
        [
            "Header 3 with respect to 2",
            "Header 3 with respect to 1",
            "Header 2 with respect to 1"
        ]
    );
    // The entry loop runs once.
    assert_eq!(problem.column(model.column(8).unwrap()).unwrap().upper(), Some(1.0));

    let solution = model.solve(&BranchAndBound::new()).unwrap();
    assert_eq!(solution.wcet(), 42);
    assert_eq!(
        solution.execution_counts(),
        &expected_counts(&[
            (1, 1),
            (2, 3),
            (3, 15),
            (4, 15),
            (5, 3),
            (6, 3),
            (7, 1),
            (8, 1)
        ])
    );

    let values: Vec<f64> = model
        .edges()
        .iter()
        .map(|edge| solution.execution_count(*edge).unwrap() as f64)
        .collect();
    assert!(problem.is_satisfied_by(&values));
}

#[test]
fn test_build_is_idempotent() {
    let subprogram = setup_nested_loops(&[]);
    let database = setup_database(setup_nested_data());
    let builder = IpetModelBuilder::new(&subprogram, &database);

    let first = builder.build().unwrap();
    let second = builder.build().unwrap();
    assert_eq!(first.problem(), second.problem());
    assert_eq!(first.to_lp_string(), second.to_lp_string());

    let solver = BranchAndBound::new();
    assert_eq!(first.solve(&solver).unwrap(), second.solve(&solver).unwrap());
}

#[test]
fn test_infeasible_model() {
    let subprogram = setup_nested_loops(&[]);
    let database = setup_database(setup_nested_data());

    let mut model = IpetModelBuilder::new(&subprogram, &database).build().unwrap();
    // The outer loop is entered once per run, and a run happens at most once.
    model.set_lower_bound(1, 2).unwrap();

    assert_eq!(
        model.solve(&BranchAndBound::new()),
        Err(IpetError::Solution(SolveStatus::Infeasible))
    );
}

#[test]
fn test_infeasible_branch() {
    // Vertex 2 has one predecessor and two successors.
    let graph = setup_graph(
        "branch",
        &[1, 2, 3, 4, 5],
        &[
            (1, 1, 2, EdgeKind::Trace),
            (2, 2, 3, EdgeKind::Trace),
            (3, 2, 4, EdgeKind::Trace),
            (4, 3, 5, EdgeKind::Trace),
            (5, 4, 5, EdgeKind::Trace),
            (6, 5, 1, EdgeKind::Trace),
        ],
    );
    let subprogram = Subprogram::with_loop_tags(1, "branch", graph).unwrap();
    let mut data = SubprogramData::new();
    for edge in 1..=6 {
        data.set_unit_wcet(edge, 1);
    }
    let database = setup_database(data);

    let mut model = IpetModelBuilder::new(&subprogram, &database).build().unwrap();
    model.set_lower_bound(1, 1).unwrap();
    model.set_upper_bound(2, 0).unwrap();
    model.set_upper_bound(3, 0).unwrap();

    assert_eq!(
        model.solve(&BranchAndBound::new()),
        Err(IpetError::Solution(SolveStatus::Infeasible))
    );
}

#[test]
fn test_unbounded_model() {
    // Nothing bounds the untagged loop.
    let graph = setup_graph(
        "untagged",
        &[1, 2],
        &[(1, 1, 2, EdgeKind::Trace), (2, 2, 2, EdgeKind::Trace)],
    );
    let subprogram = Subprogram::new(1, "untagged", graph).unwrap();
    let database = setup_database(SubprogramData::new().with_unit_wcet(1, 1).with_unit_wcet(2, 1));

    let model = IpetModelBuilder::new(&subprogram, &database).build().unwrap();
    assert_eq!(
        model.solve(&BranchAndBound::new()),
        Err(IpetError::Solution(SolveStatus::Unbounded))
    );
}

#[test]
fn test_wcet_overflow() {
    let graph = setup_graph(
        "overflow",
        &[1, 2, 3, 4, 5],
        &[
            (1, 1, 2, EdgeKind::Trace),
            (2, 2, 3, EdgeKind::Trace),
            (3, 3, 4, EdgeKind::Trace),
            (4, 4, 5, EdgeKind::Trace),
            (5, 5, 1, EdgeKind::Trace),
        ],
    );
    let subprogram = Subprogram::with_loop_tags(1, "overflow", graph).unwrap();
    let mut data = SubprogramData::new();
    for edge in 1..=5 {
        data.set_unit_wcet(edge, i64::MAX as u64);
    }
    let database = setup_database(data);

    let model = IpetModelBuilder::new(&subprogram, &database).build().unwrap();
    assert_eq!(
        model.solve(&BranchAndBound::new()),
        Err(IpetError::Solution(SolveStatus::NumericalFailure))
    );
}

#[test]
fn test_to_integer() {
    assert_eq!(to_integer(2.9999999), Ok(3));
    assert_eq!(to_integer(-1e-9), Ok(0));
    assert_eq!(
        to_integer(f64::NAN),
        Err(IpetError::Solution(SolveStatus::NumericalFailure))
    );
    assert_eq!(
        to_integer(f64::INFINITY),
        Err(IpetError::Solution(SolveStatus::NumericalFailure))
    );
    assert_eq!(
        to_integer(u64::MAX as f64),
        Err(IpetError::Solution(SolveStatus::NumericalFailure))
    );
}

#[test]
fn test_header_without_back_edges() {
    let subprogram = setup_nested_loops(&[(6, EdgeKind::Trace)]);
    let database = setup_database(setup_nested_data());

    let partition = LoopPartition::new(subprogram.graph(), subprogram.lnt()).unwrap();
    assert!(partition.back_edges(2).is_empty());
    assert_eq!(partition.back_edges(3), &[4]);
    assert_eq!(partition.entry_edges(2), &[1]);
    assert_eq!(partition.exit_edges(3), &[5]);
    assert_eq!(partition.ancestors(3), [3, 2, 1]);

    let model = IpetModelBuilder::new(&subprogram, &database).build().unwrap();
    let loop_rows: Vec<_> = model
        .problem()
        .rows()
        .iter()
        .filter(|row| row.group() == RowGroup::Loop)
        .filter_map(|row| row.comment())
        .collect();
    assert_eq!(
        loop_rows,
        ["Header 3 with respect to 2", "Header 3 with respect to 1"]
    );
}

#[test]
fn test_loop_constraint_level() {
    let subprogram = setup_nested_loops(&[]);
    let mut data = setup_nested_data();
    data.set_loop_bound(3, 1, 0);
    let database = setup_database(data);

    // With every level the bound of 0 relative to the entry forbids the
    // inner loop.
    let solution = IpetModelBuilder::new(&subprogram, &database)
        .build()
        .unwrap()
        .solve(&BranchAndBound::new())
        .unwrap();
    assert_eq!(solution.execution_count(4), Some(0));

    let model = IpetModelBuilder::new(&subprogram, &database)
        .with_loop_constraint_level(1)
        .build()
        .unwrap();
    assert!(!model.to_lp_string().contains("Header 3 with respect to 1"));
    let solution = model.solve(&BranchAndBound::new()).unwrap();
    assert_eq!(solution.wcet(), 42);
}

#[test]
fn test_missing_loop_bound() {
    let subprogram = setup_nested_loops(&[]);
    let database = setup_database(
        SubprogramData::new()
            .with_loop_bound(3, 2, 5)
            .with_loop_bound(2, 1, 3),
    );

    assert_eq!(
        IpetModelBuilder::new(&subprogram, &database)
            .build()
            .unwrap_err(),
        IpetError::Database(DatabaseError::MissingData {
            subprogram: 1,
            item: DataItem::LoopBound {
                header: 3,
                ancestor: 1
            }
        })
    );
}

#[test]
fn test_malformed_loop_structure() {
    let subprogram = setup_nested_loops(&[(1, EdgeKind::Trace), (7, EdgeKind::Trace)]);
    let database = setup_database(setup_nested_data());

    assert_eq!(
        IpetModelBuilder::new(&subprogram, &database)
            .build()
            .unwrap_err(),
        IpetError::MalformedLoopStructure {
            header: 3,
            ancestor: 2
        }
    );
}

#[test]
fn test_unknown_header() {
    let subprogram = setup_nested_loops(&[(4, EdgeKind::iteration(5))]);
    let database = setup_database(setup_nested_data());

    assert_eq!(
        IpetModelBuilder::new(&subprogram, &database)
            .build()
            .unwrap_err(),
        IpetError::UnknownHeader { edge: 4, header: 5 }
    );
}

/// 1 -> 2 -> 3 -> 1 where the middle edge calls subprogram 7.
fn setup_inlining(kind: EdgeKind) -> Subprogram {
    let graph = setup_graph(
        "caller",
        &[1, 2, 3],
        &[
            (1, 1, 2, EdgeKind::Ghost),
            (2, 2, 3, kind),
            (3, 3, 1, EdgeKind::iteration(1)),
        ],
    );
    Subprogram::new(1, "caller", graph).unwrap()
}

#[test]
fn test_inlined_wcet() {
    let subprogram = setup_inlining(EdgeKind::Inlined { callee: 7 });
    // Ghost edges need no data, loop edges default to 0.
    let database = setup_database(SubprogramData::new());
    let inlined = HashMap::from([(7, 40)]);

    let solution = IpetModelBuilder::new(&subprogram, &database)
        .with_inlined_wcets(&inlined)
        .build()
        .unwrap()
        .solve(&BranchAndBound::new())
        .unwrap();
    assert_eq!(solution.wcet(), 40);

    assert_eq!(
        IpetModelBuilder::new(&subprogram, &database)
            .build()
            .unwrap_err(),
        IpetError::MissingInlinedWcet { edge: 2, callee: 7 }
    );
    assert_eq!(
        IpetModelBuilder::new(&subprogram, &database)
            .with_inlined_wcets(&HashMap::new())
            .build()
            .unwrap_err(),
        IpetError::MissingInlinedWcet { edge: 2, callee: 7 }
    );
}

#[test]
fn test_missing_unit_wcet() {
    let subprogram = setup_inlining(EdgeKind::Trace);
    let database = setup_database(SubprogramData::new().with_unit_wcet(3, 2));

    assert_eq!(
        IpetModelBuilder::new(&subprogram, &database)
            .build()
            .unwrap_err(),
        IpetError::Database(DatabaseError::MissingData {
            subprogram: 1,
            item: DataItem::UnitWcet(2)
        })
    );

    let database = setup_database(SubprogramData::new().with_unit_wcet(2, 5).with_unit_wcet(3, 2));
    let solution = IpetModelBuilder::new(&subprogram, &database)
        .build()
        .unwrap()
        .solve(&BranchAndBound::new())
        .unwrap();
    assert_eq!(solution.wcet(), 7);
}

#[test]
fn test_write_lp() {
    let subprogram = setup_nested_loops(&[]);
    let database = setup_database(setup_nested_data());
    let model = IpetModelBuilder::new(&subprogram, &database).build().unwrap();

    let listing = model.to_lp_string();
    assert!(listing.starts_with("// Objective function\nmax: 1 edge_1 + "));
    assert!(listing.contains("// Vertex 2\nedge_2 + edge_7 = edge_1 + edge_6;"));
    assert!(listing.contains("// Header 3 with respect to 2\nedge_4 <= 5 edge_2;"));
    assert!(listing.contains("edge_8 <= 1;"));

    let mut bytes = Vec::new();
    model.write_lp(&mut bytes).unwrap();
    assert_eq!(String::from_utf8(bytes).unwrap(), listing);

    let reread = lp_format::parse(&listing).unwrap();
    assert_eq!(reread.rows(), model.problem().rows());
}

/// 1 -> 2 -> 3 -> 2, 3 -> 4 with every edge observed in a trace.
fn setup_capacity_graph() -> DirectedGraph {
    setup_graph(
        "observed",
        &[1, 2, 3, 4],
        &[
            (1, 1, 2, EdgeKind::Trace),
            (2, 2, 3, EdgeKind::Trace),
            (3, 3, 2, EdgeKind::Trace),
            (4, 3, 4, EdgeKind::Trace),
        ],
    )
}

fn setup_trace_database() -> TraceDatabase {
    TraceDatabase::new()
        .with_edge(1, 1, 1)
        .with_edge(2, 2, 5)
        .with_edge(3, 1, 9)
        .with_edge(4, 1, 1)
}

#[test]
fn test_capacity_back_edges() {
    setup_logging();
    let graph = setup_capacity_graph();
    let database = setup_trace_database();

    let model = CapacityModelBuilder::new(&graph, &database).build().unwrap();
    let upper: Vec<_> = model
        .problem()
        .columns()
        .iter()
        .map(|column| column.upper())
        .collect();
    assert_eq!(upper, [None, None, Some(9.0), None]);
    assert_eq!(
        model
            .problem()
            .rows()
            .iter()
            .filter(|row| row.group() == RowGroup::Capacity)
            .filter_map(|row| row.comment())
            .collect::<Vec<_>>(),
        ["Entry vertex 1"]
    );

    let solution = model.solve(&BranchAndBound::new()).unwrap();
    assert_eq!(solution.wcet(), 1 + 2 * 10 + 9 + 1);
    assert_eq!(solution.execution_count(2), Some(10));
}

#[test]
fn test_capacity_all_constraints() {
    let graph = setup_capacity_graph();
    let database = setup_trace_database();

    let model = CapacityModelBuilder::new(&graph, &database)
        .with_all_constraints(true)
        .build()
        .unwrap();
    let solution = model.solve(&BranchAndBound::new()).unwrap();
    assert_eq!(solution.wcet(), 1 + 2 * 5 + 4 + 1);
    assert_eq!(
        solution.execution_counts(),
        &expected_counts(&[(1, 1), (2, 5), (3, 4), (4, 1)])
    );

    let unobserved = TraceDatabase::new()
        .with_edge(1, 1, 1)
        .with_edge(2, 2, 5)
        .with_edge(4, 1, 1);
    assert_eq!(
        CapacityModelBuilder::new(&graph, &unobserved)
            .build()
            .unwrap_err(),
        IpetError::Database(DatabaseError::MissingData {
            subprogram: 0,
            item: DataItem::EdgeCount(3)
        })
    );
}
