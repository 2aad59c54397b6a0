use mission_types::{Coordinate, DroneData};
use thiserror::Error;
use tracing::warn;

use crate::routing::{build_knn_graph, dijkstra, reconstruct_path, target_distance_matrix};
use crate::vrp;

#[derive(Debug, Error)]
pub enum PlanError {
    #[error("no targets above the coverage threshold")]
    NoTargets,
    #[error("no coverage points supplied")]
    NoCoveragePoints,
    #[error("vrp produced no feasible solution")]
    NoVrpSolution,
    #[error("distance matrix is inconsistent with the target set")]
    InconsistentMatrix,
}

/// Per-vehicle route computation (§4.2 Steps 1-6): filter targets by
/// coverage proximity, build the k-NN graph, solve the VRP over target
/// distances, then expand each leg back through the graph.
pub fn compute_routes(
    drone_data: &DroneData,
    coverage_points: &[Coordinate],
    max_distance_for_neighbor: f64,
    max_neighbor: usize,
    max_neighbor_distance_m: f64,
    max_solve_time: std::time::Duration,
) -> Result<Vec<Vec<Coordinate>>, PlanError> {
    if coverage_points.is_empty() {
        return Err(PlanError::NoCoveragePoints);
    }

    let num_drones = drone_data.num_drones;
    let all_targets = &drone_data.pos_targets;

    // Step 1: starts always kept; the rest only if near a coverage point.
    let mut targets: Vec<Coordinate> = Vec::new();
    for (i, &t) in all_targets.iter().enumerate() {
        if i < num_drones {
            targets.push(t);
            continue;
        }
        let nearest = coverage_points
            .iter()
            .map(|p| p.haversine_m(&t))
            .fold(f64::INFINITY, f64::min);
        if nearest <= max_distance_for_neighbor {
            targets.push(t);
        }
    }
    if targets.len() <= num_drones {
        return Err(PlanError::NoTargets);
    }

    // Step 2: merged vertex set, tracking each target's index in it.
    let mut vertices: Vec<Coordinate> = coverage_points.to_vec();
    let target_vertex_indices: Vec<usize> = targets
        .iter()
        .map(|&t| {
            vertices.push(t);
            vertices.len() - 1
        })
        .collect();

    // Step 3: k-NN graph over the merged vertex set.
    let graph = build_knn_graph(&vertices, max_neighbor, max_neighbor_distance_m);

    // Step 4: target-to-target distance matrix (millimeters).
    let matrix = target_distance_matrix(&graph, &target_vertex_indices);
    if matrix.len() != targets.len() {
        return Err(PlanError::InconsistentMatrix);
    }

    // Step 5: VRP over target indices, vehicle d starts/ends at target d.
    let solution = vrp::solve(&matrix, num_drones, max_solve_time);
    if solution.routes.iter().all(Vec::is_empty) && targets.len() > num_drones + 1 {
        return Err(PlanError::NoVrpSolution);
    }

    // Step 6: expand each vehicle's target sequence through the graph.
    let mut paths = Vec::with_capacity(num_drones);
    for (d, route) in solution.routes.iter().enumerate() {
        let start_vertex = target_vertex_indices[d % targets.len()];
        let mut path = vec![vertices[start_vertex]];
        let mut current_vertex = start_vertex;

        for &target_idx in route {
            let dst_vertex = target_vertex_indices[target_idx];
            let (_, prev) = dijkstra(&graph, current_vertex);
            match reconstruct_path(&prev, current_vertex, dst_vertex) {
                Some(node_path) => {
                    for &n in node_path.iter().skip(1) {
                        path.push(vertices[n]);
                    }
                    current_vertex = dst_vertex;
                }
                None => {
                    warn!("no path between graph vertices {current_vertex} and {dst_vertex}, skipping leg");
                }
            }
        }

        if current_vertex != start_vertex {
            let (_, prev) = dijkstra(&graph, current_vertex);
            if let Some(node_path) = reconstruct_path(&prev, current_vertex, start_vertex) {
                for &n in node_path.iter().skip(1) {
                    path.push(vertices[n]);
                }
            }
        }

        paths.push(path);
    }

    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn rejects_when_all_targets_filtered_out() {
        let drone_data = DroneData {
            num_drones: 1,
            pos_targets: vec![Coordinate::new(0.0, 0.0), Coordinate::new(10.0, 10.0)],
        };
        let points = vec![Coordinate::new(0.0, 0.0)];
        let result = compute_routes(&drone_data, &points, 100.0, 4, 5000.0, Duration::from_millis(50));
        assert!(matches!(result, Err(PlanError::NoTargets)));
    }

    #[test]
    fn rejects_empty_coverage() {
        let drone_data = DroneData {
            num_drones: 1,
            pos_targets: vec![Coordinate::new(0.0, 0.0), Coordinate::new(0.0, 0.001)],
        };
        let result = compute_routes(&drone_data, &[], 100.0, 4, 5000.0, Duration::from_millis(50));
        assert!(matches!(result, Err(PlanError::NoCoveragePoints)));
    }

    #[test]
    fn happy_path_returns_one_route_per_drone() {
        // 2 drone starts + 2 customers near the coverage points, so the
        // capacity cap (ceil(2/2) = 1 per vehicle) leaves every drone with
        // exactly one customer instead of one drone starving the other.
        let drone_data = DroneData {
            num_drones: 2,
            pos_targets: vec![
                Coordinate::new(0.0, 0.0),
                Coordinate::new(0.0, 0.001),
                Coordinate::new(0.0005, 0.0005),
                Coordinate::new(0.0006, 0.0005),
            ],
        };
        let points = vec![Coordinate::new(0.0005, 0.0005), Coordinate::new(0.0, 0.0)];
        let routes = compute_routes(&drone_data, &points, 1000.0, 4, 5000.0, Duration::from_millis(200)).unwrap();
        assert_eq!(routes.len(), 2);
        for route in &routes {
            assert!(!route.is_empty());
        }
    }

    #[test]
    fn each_drone_starts_and_ends_at_its_own_target() {
        // Fewer customers than drones: the drone with no customer assigned
        // still gets a one-point path at its own start position rather than
        // an empty path or another drone's depot.
        let drone_data = DroneData {
            num_drones: 2,
            pos_targets: vec![
                Coordinate::new(0.0, 0.0),
                Coordinate::new(0.0, 0.001),
                Coordinate::new(0.0005, 0.0005),
            ],
        };
        let points = vec![Coordinate::new(0.0005, 0.0005), Coordinate::new(0.0, 0.0)];
        let routes = compute_routes(&drone_data, &points, 1000.0, 4, 5000.0, Duration::from_millis(200)).unwrap();
        assert_eq!(routes.len(), 2);
        for route in &routes {
            assert!(!route.is_empty());
        }
    }
}
