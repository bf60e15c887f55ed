use super::{DirectedGraph, EdgeKind, GraphError, IdAllocator};

fn setup_test_graph() -> DirectedGraph {
    let mut graph = DirectedGraph::new("diamond");
    for vertex in [1, 2, 3, 4] {
        graph.add_vertex(vertex).unwrap();
    }
    graph.add_edge(10, 1, 2, EdgeKind::Trace).unwrap();
    graph.add_edge(11, 1, 3, EdgeKind::Trace).unwrap();
    graph.add_edge(12, 2, 4, EdgeKind::Trace).unwrap();
    graph.add_edge(13, 3, 4, EdgeKind::Ghost).unwrap();
    graph.set_entry(1).unwrap();
    graph
}

#[test]
fn test_duplicate_identifiers() {
    let mut graph = setup_test_graph();

    assert_eq!(
        graph.add_vertex(3),
        Err(GraphError::DuplicateIdentifier {
            kind: "vertex",
            id: 3
        })
    );
    assert_eq!(
        graph.add_edge(12, 4, 1, EdgeKind::Trace),
        Err(GraphError::DuplicateIdentifier { kind: "edge", id: 12 })
    );
    // A failed insertion leaves the graph untouched.
    assert_eq!(graph.number_of_vertices(), 4);
    assert_eq!(graph.number_of_edges(), 4);
}

#[test]
fn test_lookup_misses() {
    let mut graph = setup_test_graph();

    assert_eq!(
        graph.vertex(42).unwrap_err(),
        GraphError::NotFound {
            kind: "vertex",
            id: 42
        }
    );
    assert_eq!(
        graph.edge(42).unwrap_err(),
        GraphError::NotFound { kind: "edge", id: 42 }
    );
    assert_eq!(
        graph.add_edge(20, 1, 42, EdgeKind::Trace),
        Err(GraphError::NotFound {
            kind: "vertex",
            id: 42
        })
    );
    assert!(graph.edge(20).is_err());
    assert_eq!(DirectedGraph::new("empty").entry(), Err(GraphError::MissingEntry));
}

#[test]
fn test_insertion_order() {
    let mut graph = setup_test_graph();
    graph.add_edge(14, 4, 1, EdgeKind::iteration(1)).unwrap();
    graph.add_edge(15, 4, 4, EdgeKind::Trace).unwrap();

    let vertices: Vec<_> = graph.vertices().map(|v| v.id()).collect();
    assert_eq!(vertices, vec![1, 2, 3, 4]);

    let successors: Vec<_> = graph.successor_edges(4).unwrap().map(|e| e.id()).collect();
    assert_eq!(successors, vec![14, 15]);

    let predecessors: Vec<_> = graph
        .predecessor_edges(4)
        .unwrap()
        .map(|e| e.id())
        .collect();
    assert_eq!(predecessors, vec![12, 13, 15]);

    let entry = graph.vertex(1).unwrap();
    assert!(entry.has_successors());
    assert!(entry.has_predecessors());
    assert_eq!(entry.predecessors(), &[14]);
}

#[test]
fn test_retag_edge() {
    let mut graph = setup_test_graph();
    graph.set_edge_kind(13, EdgeKind::Exit(3)).unwrap();
    assert_eq!(graph.edge(13).unwrap().kind(), &EdgeKind::Exit(3));
    assert!(graph.edge(13).unwrap().kind().is_loop_role());
    assert!(graph.set_edge_kind(99, EdgeKind::Ghost).is_err());
}

#[test]
fn test_id_allocator() {
    let mut ids = IdAllocator::default();
    assert_eq!(ids.allocate(), 1);
    ids.reserve(10);
    assert_eq!(ids.allocate(), 11);
    ids.reserve(3);
    assert_eq!(ids.allocate(), 12);
}
