use pointserve_core::{CellKey, GlobalBounds};
use rustc_hash::FxHashMap;

/// Geometric centers of the occupied voxel cells: a visualization aid for
/// inspecting the grid a downsample ran on.
///
/// Uses the same cell assignment as [`crate::voxel_downsample`], but emits
/// `bounds.min + (cell + 0.5) * voxel_size` per axis rather than member
/// means. Returns the flat output buffer and the occupied cell count.
pub fn voxel_debug_centers(points: &[f32], voxel_size: f32, bounds: &GlobalBounds) -> (Vec<f32>, usize) {
    let point_count = points.len() / 3;
    if point_count == 0 || voxel_size <= 0.0 {
        return (Vec::new(), 0);
    }

    let estimated = (point_count / 100).clamp(16, 100_000);
    let mut cells: FxHashMap<CellKey, (i32, i32, i32)> =
        FxHashMap::with_capacity_and_hasher(estimated, Default::default());

    for p in points.chunks_exact(3) {
        let cell = bounds.cell_of(p[0], p[1], p[2], voxel_size);
        cells.entry(CellKey::pack(cell)).or_insert(cell);
    }

    let cell_count = cells.len();
    let mut out = Vec::with_capacity(cell_count * 3);
    for cell in cells.into_values() {
        out.extend_from_slice(&bounds.cell_center(cell, voxel_size));
    }
    (out, cell_count)
}
