//! Polygon geometry over cell boundaries.
//!
//! Boundaries are closed: the last point connects back to the first.

use vertexsim_types::{Cell, CellId, Vec2, VertexModelState};

/// Measured shape of one cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellShape {
    /// The cell measured.
    pub cell: CellId,
    /// Unsigned area.
    pub area: f64,
    /// Perimeter.
    pub perimeter: f64,
    /// Area-weighted centroid.
    pub centroid: Vec2,
}

/// Signed shoelace area; positive for counter-clockwise boundaries.
pub fn signed_area(points: &[Vec2]) -> f64 {
    let twice: f64 = closed_edges(points)
        .map(|(a, b)| a.x * b.y - b.x * a.y)
        .sum();
    0.5 * twice
}

/// Unsigned polygon area.
pub fn area(points: &[Vec2]) -> f64 {
    signed_area(points).abs()
}

/// Polygon perimeter.
pub fn perimeter(points: &[Vec2]) -> f64 {
    closed_edges(points)
        .map(|(a, b)| (b.x - a.x).hypot(b.y - a.y))
        .sum()
}

/// Area-weighted polygon centroid, falling back to the vertex mean for
/// zero-area polygons. `None` for an empty slice.
pub fn centroid(points: &[Vec2]) -> Option<Vec2> {
    if points.is_empty() {
        return None;
    }
    let a = signed_area(points);
    if a.abs() < f64::EPSILON {
        let n = points.len() as f64;
        let (sx, sy) = points
            .iter()
            .fold((0.0, 0.0), |(sx, sy), p| (sx + p.x, sy + p.y));
        return Some(Vec2::new(sx / n, sy / n));
    }
    let (cx, cy) = closed_edges(points).fold((0.0, 0.0), |(cx, cy), (p, q)| {
        let cross = p.x * q.y - q.x * p.y;
        (cx + (p.x + q.x) * cross, cy + (p.y + q.y) * cross)
    });
    let scale = 1.0 / (6.0 * a);
    Some(Vec2::new(cx * scale, cy * scale))
}

/// Boundary positions of `cell` in order, or `None` if a vertex is missing.
pub fn cell_polygon(state: &VertexModelState, cell: &Cell) -> Option<Vec<Vec2>> {
    cell.vertex_ids
        .iter()
        .map(|&id| state.vertex(id).map(|v| v.position))
        .collect()
}

/// Shapes of every cell in `state`, in cell order. Cells referencing a
/// missing vertex are skipped.
pub fn cell_shapes(state: &VertexModelState) -> Vec<CellShape> {
    let positions = state.position_index();
    state
        .cells
        .iter()
        .filter_map(|cell| {
            let points: Vec<Vec2> = cell
                .vertex_ids
                .iter()
                .map(|id| positions.get(id).copied())
                .collect::<Option<_>>()?;
            Some(CellShape {
                cell: cell.id,
                area: area(&points),
                perimeter: perimeter(&points),
                centroid: centroid(&points)?,
            })
        })
        .collect()
}

/// Consecutive point pairs around the closed boundary.
fn closed_edges(points: &[Vec2]) -> impl Iterator<Item = (Vec2, Vec2)> + '_ {
    points
        .iter()
        .copied()
        .zip(points.iter().copied().cycle().skip(1))
}
