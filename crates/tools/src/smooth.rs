use pointserve_core::{CellKey, GlobalBounds};
use rustc_hash::FxHashMap;

/// Radius-based smoothing: each point becomes the mean of itself and every
/// neighbor within `radius`, repeated `iterations` times.
///
/// Every iteration reads the previous iteration's snapshot; a point with no
/// neighbors is left unchanged. Point count and order are preserved, which
/// is what makes pass-through attribute re-attachment valid for this
/// operation.
///
/// Buckets points into a uniform grid with cell size = radius and scans the
/// 27 surrounding cells, which covers exactly the sphere of radius `radius`
/// around any point in the center cell.
pub fn smooth(points: &[f32], radius: f32, iterations: u32) -> Vec<f32> {
    let point_count = points.len() / 3;
    let mut current = points.to_vec();
    if point_count == 0 || radius <= 0.0 || iterations == 0 {
        return current;
    }

    let radius_sq = radius * radius;

    for _ in 0..iterations {
        let snapshot = current.clone();
        let Some(bounds) = GlobalBounds::from_flat_points(&snapshot) else {
            return current;
        };

        let mut buckets: FxHashMap<CellKey, Vec<u32>> =
            FxHashMap::with_capacity_and_hasher(point_count / 4 + 1, Default::default());
        for (i, p) in snapshot.chunks_exact(3).enumerate() {
            let key = CellKey::pack(bounds.cell_of(p[0], p[1], p[2], radius));
            buckets.entry(key).or_default().push(i as u32);
        }

        for i in 0..point_count {
            let i3 = i * 3;
            let (x, y, z) = (snapshot[i3], snapshot[i3 + 1], snapshot[i3 + 2]);
            let (cx, cy, cz) = bounds.cell_of(x, y, z, radius);

            let mut sum_x = 0.0;
            let mut sum_y = 0.0;
            let mut sum_z = 0.0;
            let mut neighbors = 0u32;

            for dx in -1..=1 {
                for dy in -1..=1 {
                    for dz in -1..=1 {
                        let Some(bucket) = buckets.get(&CellKey::pack((cx + dx, cy + dy, cz + dz)))
                        else {
                            continue;
                        };
                        for &j in bucket {
                            if j as usize == i {
                                continue;
                            }
                            let j3 = j as usize * 3;
                            let ddx = snapshot[j3] - x;
                            let ddy = snapshot[j3 + 1] - y;
                            let ddz = snapshot[j3 + 2] - z;
                            if ddx * ddx + ddy * ddy + ddz * ddz <= radius_sq {
                                sum_x += snapshot[j3];
                                sum_y += snapshot[j3 + 1];
                                sum_z += snapshot[j3 + 2];
                                neighbors += 1;
                            }
                        }
                    }
                }
            }

            if neighbors > 0 {
                let n = (neighbors + 1) as f32;
                current[i3] = (x + sum_x) / n;
                current[i3 + 1] = (y + sum_y) / n;
                current[i3 + 2] = (z + sum_z) / n;
            }
        }
    }

    current
}

/// Reference implementation scanning every point pair. Mathematically the
/// definition of the operation; the grid version must match it exactly on
/// neighbor sets.
pub fn brute_force_smooth(points: &[f32], radius: f32, iterations: u32) -> Vec<f32> {
    let point_count = points.len() / 3;
    let mut current = points.to_vec();
    if point_count == 0 || radius <= 0.0 || iterations == 0 {
        return current;
    }
    let radius_sq = radius * radius;

    for _ in 0..iterations {
        let snapshot = current.clone();
        for i in 0..point_count {
            let i3 = i * 3;
            let (x, y, z) = (snapshot[i3], snapshot[i3 + 1], snapshot[i3 + 2]);
            let mut sum = [0.0f32; 3];
            let mut neighbors = 0u32;
            for j in 0..point_count {
                if j == i {
                    continue;
                }
                let j3 = j * 3;
                let ddx = snapshot[j3] - x;
                let ddy = snapshot[j3 + 1] - y;
                let ddz = snapshot[j3 + 2] - z;
                if ddx * ddx + ddy * ddy + ddz * ddz <= radius_sq {
                    sum[0] += snapshot[j3];
                    sum[1] += snapshot[j3 + 1];
                    sum[2] += snapshot[j3 + 2];
                    neighbors += 1;
                }
            }
            if neighbors > 0 {
                let n = (neighbors + 1) as f32;
                current[i3] = (x + sum[0]) / n;
                current[i3 + 1] = (y + sum[1]) / n;
                current[i3 + 2] = (z + sum[2]) / n;
            }
        }
    }

    current
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: &[f32], b: &[f32]) {
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(b) {
            assert!((x - y).abs() < 1e-4, "{x} vs {y}");
        }
    }

    #[test]
    fn test_single_point_unchanged_across_iterations() {
        let points = vec![1.0, 2.0, 3.0];
        let out = smooth(&points, 5.0, 3);
        assert_eq!(out, points);
    }

    #[test]
    fn test_radius_below_nearest_neighbor_is_identity() {
        let points = vec![0.0, 0.0, 0.0, 10.0, 0.0, 0.0, 0.0, 10.0, 0.0];
        let out = smooth(&points, 0.5, 4);
        assert_eq!(out, points);
    }

    #[test]
    fn test_zero_iterations_is_identity() {
        let points = vec![0.0, 0.0, 0.0, 0.1, 0.0, 0.0];
        assert_eq!(smooth(&points, 1.0, 0), points);
    }

    #[test]
    fn test_two_points_converge_toward_midpoint() {
        let points = vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0];
        let out = smooth(&points, 2.0, 1);
        assert_close(&out, &[0.5, 0.0, 0.0, 0.5, 0.0, 0.0]);
    }

    #[test]
    fn test_iteration_reads_snapshot_not_partial_update() {
        // Three collinear points; if the second point's update leaked into
        // the third's neighborhood sum, the result would be asymmetric.
        let points = vec![-1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0];
        let out = smooth(&points, 1.5, 1);
        assert!((out[0] - -0.5).abs() < 1e-5);
        assert!((out[6] - 0.5).abs() < 1e-5);
        // Middle point sees both ends symmetrically and stays put.
        assert!(out[3].abs() < 1e-5);
    }

    #[test]
    fn test_grid_matches_brute_force_oracle() {
        let mut points = Vec::new();
        let mut state = 0x2545F491u32;
        for _ in 0..120 {
            // Small xorshift so the cloud is deterministic but unstructured.
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            points.push((state % 1000) as f32 * 0.01);
        }
        for (radius, iterations) in [(0.35, 1), (0.8, 2), (2.5, 3)] {
            let grid = smooth(&points, radius, iterations);
            let brute = brute_force_smooth(&points, radius, iterations);
            assert_close(&grid, &brute);
        }
    }

    #[test]
    fn test_preserves_point_count_and_order() {
        let points: Vec<f32> = (0..30).map(|i| i as f32 * 0.1).collect();
        let out = smooth(&points, 0.4, 2);
        assert_eq!(out.len(), points.len());
    }
}
