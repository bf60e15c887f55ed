use rand::{rngs::StdRng, Rng, SeedableRng};

use super::{DepthFirstTree, DfsEdgeType, LoopNestingTree, TreeError};
use crate::graph::{DirectedGraph, EdgeKind, IdAllocator};

/// Two nested loops closed into the entry:
///
/// 1 -> 2 -> 3 -> 5 -> 3, 3 -> 6 -> 2, 2 -> 4 -> 1
fn setup_nested_loops() -> DirectedGraph {
    let mut graph = DirectedGraph::new("nested");
    for vertex in 1..=6 {
        graph.add_vertex(vertex).unwrap();
    }
    for (id, source, destination) in [
        (1, 1, 2),
        (2, 2, 3),
        (3, 3, 5),
        (4, 5, 3),
        (5, 3, 6),
        (6, 6, 2),
        (7, 2, 4),
        (8, 4, 1),
    ] {
        graph
            .add_edge(id, source, destination, EdgeKind::Trace)
            .unwrap();
    }
    graph.set_entry(1).unwrap();
    graph
}

fn setup_random_graph(rng: &mut StdRng, vertices: u32) -> DirectedGraph {
    let mut graph = DirectedGraph::new("random");
    let mut ids = IdAllocator::default();
    for vertex in 1..=vertices {
        graph.add_vertex(vertex).unwrap();
    }
    let mut pairs = Vec::new();
    for vertex in 2..=vertices {
        pairs.push((rng.gen_range(1..vertex), vertex));
    }
    for _ in 0..vertices {
        pairs.push((rng.gen_range(1..=vertices), rng.gen_range(1..=vertices)));
    }
    pairs.sort_unstable();
    pairs.dedup();
    for (source, destination) in pairs {
        graph
            .add_edge(ids.allocate(), source, destination, EdgeKind::Trace)
            .unwrap();
    }
    graph.set_entry(1).unwrap();
    graph
}

#[test]
fn test_depth_first_numbering() {
    let graph = setup_nested_loops();
    let dfs = DepthFirstTree::new(&graph, 1).unwrap();

    assert_eq!(dfs.pre_order(), &[1, 2, 3, 5, 6, 4]);
    assert_eq!(dfs.post_order(), &[5, 6, 3, 4, 2, 1]);
    assert_eq!(dfs.pre_id(6).unwrap(), 5);
    assert_eq!(dfs.post_id(2).unwrap(), 5);
    assert_eq!(dfs.pre_vertex(4), Some(5));
    assert_eq!(dfs.post_vertex(6), Some(1));
    assert_eq!(dfs.pre_vertex(0), None);
    assert_eq!(dfs.parent(6), Some(3));
    assert_eq!(dfs.parent(1), None);
    assert_eq!(dfs.height(), 4);
    assert_eq!(dfs.pre_id(42), Err(TreeError::NotFound(42)));
}

#[test]
fn test_edge_classification() {
    let graph = setup_nested_loops();
    let dfs = DepthFirstTree::new(&graph, 1).unwrap();

    let expected = [
        (1, 2, DfsEdgeType::TreeEdge),
        (2, 3, DfsEdgeType::TreeEdge),
        (3, 5, DfsEdgeType::TreeEdge),
        (5, 3, DfsEdgeType::BackEdge),
        (3, 6, DfsEdgeType::TreeEdge),
        (6, 2, DfsEdgeType::BackEdge),
        (2, 4, DfsEdgeType::TreeEdge),
        (4, 1, DfsEdgeType::BackEdge),
    ];
    for (source, destination, edge_type) in expected {
        assert_eq!(dfs.edge_type(source, destination), edge_type);
    }
    assert_eq!(dfs.back_edge_targets(4), &[1]);
    assert_eq!(dfs.back_edge_sources(3), vec![5]);
}

#[test]
fn test_cross_and_forward_edges() {
    let mut graph = DirectedGraph::new("diamond");
    for vertex in 1..=4 {
        graph.add_vertex(vertex).unwrap();
    }
    graph.add_edge(1, 1, 2, EdgeKind::Trace).unwrap();
    graph.add_edge(2, 2, 4, EdgeKind::Trace).unwrap();
    graph.add_edge(3, 1, 3, EdgeKind::Trace).unwrap();
    graph.add_edge(4, 3, 4, EdgeKind::Trace).unwrap();
    graph.add_edge(5, 1, 4, EdgeKind::Trace).unwrap();

    let dfs = DepthFirstTree::new(&graph, 1).unwrap();
    assert_eq!(dfs.edge_type(3, 4), DfsEdgeType::CrossForwardEdge);
    assert_eq!(dfs.edge_type(1, 4), DfsEdgeType::CrossForwardEdge);
    assert_eq!(dfs.edge_type(1, 3), DfsEdgeType::TreeEdge);
    assert!(dfs.back_edge_targets(3).is_empty());
}

#[test]
fn test_root_self_loop_is_back_edge() {
    let mut graph = DirectedGraph::new("single");
    graph.add_vertex(1).unwrap();
    graph.add_edge(1, 1, 1, EdgeKind::Trace).unwrap();

    let dfs = DepthFirstTree::new(&graph, 1).unwrap();
    assert_eq!(dfs.edge_type(1, 1), DfsEdgeType::BackEdge);
}

#[test]
fn test_invalid_root_and_unreachable_vertices() {
    let mut graph = DirectedGraph::new("disconnected");
    for vertex in 1..=3 {
        graph.add_vertex(vertex).unwrap();
    }
    graph.add_edge(1, 1, 2, EdgeKind::Trace).unwrap();

    assert_eq!(
        DepthFirstTree::new(&graph, 9).unwrap_err(),
        TreeError::InvalidRoot(9)
    );
    assert_eq!(
        DepthFirstTree::new(&graph, 1).unwrap_err(),
        TreeError::UnreachableVertices {
            root: 1,
            vertices: vec![3]
        }
    );

    let dfs = DepthFirstTree::partial(&graph, 1).unwrap();
    assert_eq!(dfs.unreached(), &[3]);
    assert_eq!(dfs.pre_id(3).unwrap(), 0);
    assert_eq!(dfs.post_id(3).unwrap(), 0);

    graph.set_entry(1).unwrap();
    assert!(matches!(
        LoopNestingTree::new(&graph),
        Err(TreeError::UnreachableVertices { .. })
    ));
}

#[test]
fn test_random_edge_classification_is_stable() {
    let mut rng = StdRng::seed_from_u64(7);
    for _ in 0..20 {
        let graph = setup_random_graph(&mut rng, 12);
        let dfs = DepthFirstTree::new(&graph, 1).unwrap();

        let mut tree_edges = 0;
        for edge in graph.edges() {
            let (source, destination) = (edge.source(), edge.destination());
            let edge_type = dfs.edge_type(source, destination);
            assert_eq!(edge_type, dfs.edge_type(source, destination));
            match edge_type {
                DfsEdgeType::TreeEdge => tree_edges += 1,
                DfsEdgeType::BackEdge => assert!(dfs.is_ancestor(destination, source)),
                DfsEdgeType::CrossForwardEdge => {
                    assert!(!dfs.back_edge_targets(source).contains(&destination))
                }
            }
        }
        assert_eq!(tree_edges, graph.number_of_vertices() - 1);
    }
}

#[test]
fn test_loop_nesting_tree() {
    let graph = setup_nested_loops();
    let lnt = LoopNestingTree::new(&graph).unwrap();

    assert_eq!(lnt.root(), 1);
    assert_eq!(lnt.height(), 4);
    for header in [1, 2, 3] {
        assert!(lnt.is_loop_header(header));
        assert!(!lnt.is_self_loop(header));
    }
    for vertex in [4, 5, 6] {
        assert!(!lnt.is_loop_header(vertex));
    }

    let levels: Vec<_> = [1, 2, 3, 4, 5, 6]
        .into_iter()
        .map(|v| lnt.level(v).unwrap())
        .collect();
    assert_eq!(levels, vec![0, 1, 2, 1, 3, 2]);

    assert_eq!(lnt.proper_ancestors(3).unwrap(), &[2, 1]);
    assert_eq!(lnt.proper_ancestors(2).unwrap(), &[1]);
    assert!(lnt.proper_ancestors(1).unwrap().is_empty());
    assert_eq!(lnt.proper_ancestors(5), Err(TreeError::NotFound(5)));

    assert_eq!(lnt.header(1).unwrap().body(), &[2, 4]);
    assert_eq!(lnt.header(2).unwrap().body(), &[3, 6]);
    assert_eq!(lnt.header(3).unwrap().body(), &[5]);
    assert_eq!(lnt.header(2).unwrap().back_edge_sources(), &[6]);

    let innermost: Vec<_> = lnt
        .headers_innermost_first()
        .iter()
        .map(|h| h.id())
        .collect();
    assert_eq!(innermost, vec![3, 2, 1]);
    let outermost: Vec<_> = lnt
        .headers_outermost_first()
        .iter()
        .map(|h| h.id())
        .collect();
    assert_eq!(outermost, vec![1, 2, 3]);

    let level_two: Vec<_> = lnt.level_iter(2).map(|n| n.id()).collect();
    assert_eq!(level_two, vec![3, 6]);
    assert_eq!(lnt.level_iter(9).count(), 0);

    assert!(lnt.contains(2, 5));
    assert!(!lnt.contains(3, 6));
}

#[test]
fn test_self_loop_header() {
    let mut graph = DirectedGraph::new("self");
    for vertex in 1..=3 {
        graph.add_vertex(vertex).unwrap();
    }
    graph.add_edge(1, 1, 2, EdgeKind::Trace).unwrap();
    graph.add_edge(2, 2, 2, EdgeKind::Trace).unwrap();
    graph.add_edge(3, 2, 3, EdgeKind::Trace).unwrap();
    graph.set_entry(1).unwrap();

    let lnt = LoopNestingTree::new(&graph).unwrap();
    assert!(lnt.is_loop_header(2));
    assert!(lnt.is_self_loop(2));
    assert!(!lnt.is_self_loop(1));
    assert_eq!(lnt.proper_ancestors(2).unwrap(), &[1]);
    assert_eq!(lnt.level(3).unwrap(), 1);
    assert!(lnt.header(2).unwrap().body().is_empty());
}

#[test]
fn test_random_nesting_levels_increase() {
    let mut rng = StdRng::seed_from_u64(11);
    for _ in 0..20 {
        let graph = setup_random_graph(&mut rng, 15);
        let lnt = LoopNestingTree::new(&graph).unwrap();

        for vertex in graph.vertices() {
            let node = lnt.node(vertex.id()).unwrap();
            if let Some(parent) = node.parent() {
                assert!(lnt.level(parent).unwrap() < node.level());
                assert!(lnt.is_loop_header(parent));
            } else {
                assert_eq!(vertex.id(), lnt.root());
            }
        }
        for header in lnt.headers_outermost_first() {
            assert!(!header.proper_ancestors().contains(&header.id()));
            let mut previous = header.level();
            for ancestor in header.proper_ancestors() {
                let level = lnt.level(*ancestor).unwrap();
                assert!(level < previous);
                previous = level;
            }
        }
    }
}

#[test]
fn test_tag_loop_edges() {
    let mut graph = setup_nested_loops();
    let lnt = LoopNestingTree::new(&graph).unwrap();

    assert_eq!(lnt.tag_loop_edges(&mut graph).unwrap(), 7);

    let kinds: Vec<_> = graph.edges().map(|e| e.kind().clone()).collect();
    assert_eq!(
        kinds,
        vec![
            EdgeKind::Entry(2),
            EdgeKind::Entry(3),
            EdgeKind::Trace,
            EdgeKind::iteration(3),
            EdgeKind::Exit(3),
            EdgeKind::iteration(2),
            EdgeKind::Exit(2),
            EdgeKind::iteration(1),
        ]
    );
    // Already tagged edges are left alone.
    assert_eq!(lnt.tag_loop_edges(&mut graph).unwrap(), 0);
}
