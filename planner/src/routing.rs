use std::cmp::Reverse;
use std::collections::BinaryHeap;

use mission_types::Coordinate;

/// Millimeter-scaled edge weight, matching the VRP cost model's integer
/// distances (§4.2 Step 3).
pub type EdgeWeightMm = u64;

#[derive(Debug, Clone)]
pub struct Graph {
    pub nodes: Vec<Coordinate>,
    pub adjacency: Vec<Vec<(usize, EdgeWeightMm)>>,
}

fn distance_mm(a: Coordinate, b: Coordinate) -> EdgeWeightMm {
    (a.haversine_m(b) * 1000.0).round() as u64
}

/// Build a k-nearest-neighbour graph: each node connects to up to
/// `max_neighbor` others within `max_neighbor_distance_m`, found via
/// `select_nth_unstable_by` rather than a full sort (§4.2 Step 2).
pub fn build_knn_graph(points: &[Coordinate], max_neighbor: usize, max_neighbor_distance_m: f64) -> Graph {
    let n = points.len();
    let mut adjacency = vec![Vec::new(); n];

    for i in 0..n {
        let mut candidates: Vec<(usize, f64)> = (0..n)
            .filter(|&j| j != i)
            .map(|j| (j, points[i].haversine_m(points[j])))
            .filter(|&(_, d)| d <= max_neighbor_distance_m)
            .collect();

        let k = max_neighbor.min(candidates.len());
        if k > 0 {
            candidates.select_nth_unstable_by(k - 1, |a, b| a.1.total_cmp(&b.1));
            candidates.truncate(k);
        } else {
            candidates.clear();
        }

        for (j, dist_m) in candidates {
            let weight = (dist_m * 1000.0).round() as u64;
            adjacency[i].push((j, weight));
        }
    }

    // Nearest-neighbour is not a symmetric relation (i's closest point need
    // not have i as its own closest point), but the graph Dijkstra walks
    // must be undirected: add the reciprocal edge wherever it's missing.
    for i in 0..n {
        for (j, w) in adjacency[i].clone() {
            if !adjacency[j].iter().any(|&(back, _)| back == i) {
                adjacency[j].push((i, w));
            }
        }
    }

    Graph { nodes: points.to_vec(), adjacency }
}

/// Dijkstra shortest path from `source`, returning distances (mm) and
/// predecessor links for path reconstruction (§4.2 Step 3).
pub fn dijkstra(graph: &Graph, source: usize) -> (Vec<u64>, Vec<Option<usize>>) {
    let n = graph.nodes.len();
    let mut dist = vec![u64::MAX; n];
    let mut prev = vec![None; n];
    let mut heap = BinaryHeap::new();

    dist[source] = 0;
    heap.push(Reverse((0u64, source)));

    while let Some(Reverse((d, u))) = heap.pop() {
        if d > dist[u] {
            continue;
        }
        for &(v, w) in &graph.adjacency[u] {
            let next = d.saturating_add(w);
            if next < dist[v] {
                dist[v] = next;
                prev[v] = Some(u);
                heap.push(Reverse((next, v)));
            }
        }
    }

    (dist, prev)
}

/// Reconstruct the shortest path `source -> target` from a predecessor
/// table, or `None` if unreachable.
pub fn reconstruct_path(prev: &[Option<usize>], source: usize, target: usize) -> Option<Vec<usize>> {
    if source == target {
        return Some(vec![source]);
    }
    let mut path = vec![target];
    let mut current = target;
    while let Some(p) = prev[current] {
        path.push(p);
        current = p;
        if current == source {
            path.reverse();
            return Some(path);
        }
    }
    None
}

/// Full pairwise distance matrix over a small target set, each entry
/// computed as the shortest path through the k-NN graph rather than
/// straight-line distance, so targets connect through feasible corridors
/// (§4.2 Step 3).
pub fn target_distance_matrix(graph: &Graph, target_indices: &[usize]) -> Vec<Vec<u64>> {
    let n = target_indices.len();
    let mut matrix = vec![vec![0u64; n]; n];

    for (row, &src) in target_indices.iter().enumerate() {
        let (dist, _) = dijkstra(graph, src);
        for (col, &dst) in target_indices.iter().enumerate() {
            matrix[row][col] = dist[dst];
        }
    }
    matrix
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid_points() -> Vec<Coordinate> {
        vec![
            Coordinate::new(0.0, 0.0),
            Coordinate::new(0.0, 0.001),
            Coordinate::new(0.001, 0.0),
            Coordinate::new(10.0, 10.0),
        ]
    }

    #[test]
    fn knn_excludes_distant_node() {
        let points = grid_points();
        let graph = build_knn_graph(&points, 3, 1000.0);
        assert!(graph.adjacency[0].iter().all(|&(j, _)| j != 3));
    }

    #[test]
    fn dijkstra_finds_direct_edge() {
        let points = grid_points();
        let graph = build_knn_graph(&points, 3, 1000.0);
        let (dist, prev) = dijkstra(&graph, 0);
        assert!(dist[1] < u64::MAX);
        let path = reconstruct_path(&prev, 0, 1).unwrap();
        assert_eq!(path.first(), Some(&0));
        assert_eq!(path.last(), Some(&1));
    }

    #[test]
    fn unreachable_node_has_max_distance() {
        let points = grid_points();
        let graph = build_knn_graph(&points, 3, 1000.0);
        let (dist, prev) = dijkstra(&graph, 0);
        assert_eq!(dist[3], u64::MAX);
        assert!(reconstruct_path(&prev, 0, 3).is_none());
    }

    #[test]
    fn distance_matrix_is_symmetric_for_symmetric_graph() {
        let points = grid_points();
        let graph = build_knn_graph(&points, 3, 1000.0);
        let matrix = target_distance_matrix(&graph, &[0, 1, 2]);
        assert_eq!(matrix[0][1], matrix[1][0]);
    }

    #[test]
    fn knn_graph_is_symmetrized() {
        // p1's nearest neighbor is p2, not p0 — but p0's nearest is p1, so
        // the edge (0,1) only comes out of p0's own k=1 selection and must
        // be mirrored into adj[1]. Likewise (3,2) only comes out of p3's.
        let points = vec![
            Coordinate::new(0.0, 0.0),
            Coordinate::new(0.0, 0.00001),
            Coordinate::new(0.0, 0.000011),
            Coordinate::new(0.0, 0.001),
        ];
        let graph = build_knn_graph(&points, 1, 200.0);
        assert!(graph.adjacency[1].iter().any(|&(j, _)| j == 0));
        assert!(graph.adjacency[2].iter().any(|&(j, _)| j == 3));
    }

    #[test]
    fn distance_mm_matches_haversine_scaled() {
        let a = Coordinate::new(0.0, 0.0);
        let b = Coordinate::new(0.0, 1.0);
        let expected = (a.haversine_m(b) * 1000.0).round() as u64;
        assert_eq!(distance_mm(a, b), expected);
    }
}
