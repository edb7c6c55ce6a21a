use pointserve_core::{CellKey, GlobalBounds};
use rustc_hash::FxHashMap;

struct Voxel {
    count: u32,
    sum_x: f32,
    sum_y: f32,
    sum_z: f32,
}

/// Grid-based downsampling: one output point per occupied voxel cell, at the
/// arithmetic mean of the cell's members.
///
/// Cell assignment is `floor((coord - bounds.min) / voxel_size)` per axis and
/// does not depend on point arrival order; output ordering is unspecified.
/// Returns the flat output buffer and the occupied cell count.
pub fn voxel_downsample(points: &[f32], voxel_size: f32, bounds: &GlobalBounds) -> (Vec<f32>, usize) {
    let point_count = points.len() / 3;
    if point_count == 0 || voxel_size <= 0.0 {
        return (Vec::new(), 0);
    }

    let estimated = (point_count / 100).clamp(16, 100_000);
    let mut cells: FxHashMap<CellKey, Voxel> =
        FxHashMap::with_capacity_and_hasher(estimated, Default::default());

    for p in points.chunks_exact(3) {
        let key = CellKey::pack(bounds.cell_of(p[0], p[1], p[2], voxel_size));
        cells
            .entry(key)
            .and_modify(|v| {
                v.count += 1;
                v.sum_x += p[0];
                v.sum_y += p[1];
                v.sum_z += p[2];
            })
            .or_insert(Voxel {
                count: 1,
                sum_x: p[0],
                sum_y: p[1],
                sum_z: p[2],
            });
    }

    let cell_count = cells.len();
    let mut out = Vec::with_capacity(cell_count * 3);
    for voxel in cells.into_values() {
        let n = voxel.count as f32;
        out.push(voxel.sum_x / n);
        out.push(voxel.sum_y / n);
        out.push(voxel.sum_z / n);
    }
    (out, cell_count)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sorted(points: Vec<f32>) -> Vec<(u32, u32, u32)> {
        let mut keys: Vec<(u32, u32, u32)> = points
            .chunks_exact(3)
            .map(|p| (p[0].to_bits(), p[1].to_bits(), p[2].to_bits()))
            .collect();
        keys.sort_unstable();
        keys
    }

    #[test]
    fn test_all_points_in_one_cell_average() {
        let points = vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 1.0, 1.0, 0.0];
        let bounds = GlobalBounds::new([0.0; 3], [10.0; 3]);
        let (out, cells) = voxel_downsample(&points, 2.0, &bounds);
        assert_eq!(cells, 1);
        assert_eq!(out.len(), 3);
        assert!((out[0] - 0.5).abs() < 1e-6);
        assert!((out[1] - 0.5).abs() < 1e-6);
        assert!(out[2].abs() < 1e-6);
    }

    #[test]
    fn test_unit_grid_keeps_each_point() {
        // Each point lands in its own cell, so downsampling is the identity
        // up to ordering.
        let points = vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 1.0, 1.0, 0.0];
        let bounds = GlobalBounds::new([0.0; 3], [10.0; 3]);
        let (out, cells) = voxel_downsample(&points, 1.0, &bounds);
        assert_eq!(cells, 4);
        assert_eq!(sorted(out), sorted(points));
    }

    #[test]
    fn test_empty_input() {
        let bounds = GlobalBounds::new([0.0; 3], [1.0; 3]);
        let (out, cells) = voxel_downsample(&[], 1.0, &bounds);
        assert!(out.is_empty());
        assert_eq!(cells, 0);
    }

    #[test]
    fn test_idempotent_at_fixed_size_and_bounds() {
        let points: Vec<f32> = (0..60).map(|i| (i as f32 * 0.37) % 5.0).collect();
        let bounds = GlobalBounds::new([0.0; 3], [5.0; 3]);
        let (once, n1) = voxel_downsample(&points, 0.8, &bounds);
        let (twice, n2) = voxel_downsample(&once, 0.8, &bounds);
        assert_eq!(n1, n2);
        assert_eq!(sorted(twice), sorted(once));
    }

    #[test]
    fn test_order_independent_grouping() {
        let points = vec![0.1, 0.1, 0.1, 2.5, 0.0, 0.0, 0.2, 0.2, 0.2];
        let mut reversed: Vec<f32> = Vec::new();
        for p in points.chunks_exact(3).rev() {
            reversed.extend_from_slice(p);
        }
        let bounds = GlobalBounds::new([0.0; 3], [10.0; 3]);
        let (a, na) = voxel_downsample(&points, 1.0, &bounds);
        let (b, nb) = voxel_downsample(&reversed, 1.0, &bounds);
        assert_eq!(na, nb);
        // Means may differ by float summation order; compare with tolerance.
        let mut a: Vec<[f32; 3]> = a.chunks_exact(3).map(|p| [p[0], p[1], p[2]]).collect();
        let mut b: Vec<[f32; 3]> = b.chunks_exact(3).map(|p| [p[0], p[1], p[2]]).collect();
        a.sort_by(|p, q| p.partial_cmp(q).unwrap());
        b.sort_by(|p, q| p.partial_cmp(q).unwrap());
        for (p, q) in a.iter().zip(&b) {
            for axis in 0..3 {
                assert!((p[axis] - q[axis]).abs() < 1e-5);
            }
        }
    }
}
