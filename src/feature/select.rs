//! Strength ordering and spatial thinning of detected corners.

use std::cmp::Ordering;

use crate::detect::CornerPoint;

fn corner_cmp_desc(a: &CornerPoint, b: &CornerPoint) -> Ordering {
    b.strength
        .total_cmp(&a.strength)
        .then_with(|| a.row.cmp(&b.row))
        .then_with(|| a.col.cmp(&b.col))
}

/// Sorts corners by descending strength with deterministic tie-breaking.
pub(crate) fn sort_corners_desc(corners: &mut [CornerPoint]) {
    corners.sort_by(corner_cmp_desc);
}

/// Keeps the strongest corners that are at least `spacing` apart in
/// Chebyshev distance, up to `limit` of them.
pub(crate) fn thin_corners(
    corners: &mut [CornerPoint],
    spacing: usize,
    limit: usize,
) -> Vec<CornerPoint> {
    sort_corners_desc(corners);
    let mut kept: Vec<CornerPoint> = Vec::new();

    'outer: for corner in corners.iter().copied() {
        if kept.len() == limit {
            break;
        }
        for other in kept.iter() {
            let dist = corner.row.abs_diff(other.row).max(corner.col.abs_diff(other.col));
            if dist < spacing {
                continue 'outer;
            }
        }
        kept.push(corner);
    }

    kept
}

#[cfg(test)]
mod tests {
    use super::thin_corners;
    use crate::detect::CornerPoint;

    fn corner(row: usize, col: usize, strength: f32) -> CornerPoint {
        CornerPoint { row, col, strength }
    }

    #[test]
    fn close_weaker_corners_are_dropped() {
        let mut corners = vec![
            corner(10, 10, 0.9),
            corner(12, 11, 1.0),
            corner(30, 30, 0.85),
        ];
        let kept = thin_corners(&mut corners, 8, 10);
        let positions: Vec<_> = kept.iter().map(|c| (c.row, c.col)).collect();
        assert_eq!(positions, vec![(12, 11), (30, 30)]);
    }

    #[test]
    fn limit_caps_the_selection() {
        let mut corners = vec![corner(0, 0, 0.9), corner(20, 0, 0.8), corner(40, 0, 1.0)];
        let kept = thin_corners(&mut corners, 0, 2);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].row, 40);
        assert_eq!(kept[1].row, 0);
    }
}
