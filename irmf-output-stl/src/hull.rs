//! Convex hull of a traced corner path (Graham scan).

use crate::labels::Key;
use crate::paths::Path;

struct HullPoint {
    key: Key,
    x: i32,
    y: i32,
    angle: f64,
    distance: i64,
}

/// Returns the convex hull of a closed path, closed with the pivot.
///
/// The pivot is the lexicographically smallest corner; the rest are sorted by
/// polar angle about it, ties broken by squared distance ascending. `reverse`
/// flips the result for inner (hole) paths so they keep running opposite to
/// the outer boundary.
pub fn convex_hull(path: &Path, reverse: bool) -> Path {
    if path.is_empty() {
        return Path::new();
    }
    let pts = sort_by_angle(path);
    if pts.is_empty() {
        return path.clone();
    }

    let mut stack: Vec<&HullPoint> = Vec::new();
    for pt in &pts {
        while stack.len() >= 2 && ccw(stack[stack.len() - 2], stack[stack.len() - 1], pt) <= 0 {
            stack.pop();
        }
        stack.push(pt);
    }

    let mut result: Path = stack.iter().map(|p| p.key).collect();
    result.push(pts[0].key);

    if reverse {
        result.reverse();
    }
    result
}

/// Twice the signed area of the triangle `p1 p2 p3`; positive for a strict
/// left turn in (col, row) coordinates.
fn ccw(p1: &HullPoint, p2: &HullPoint, p3: &HullPoint) -> i64 {
    ((p2.x - p1.x) as i64) * ((p3.y - p1.y) as i64)
        - ((p2.y - p1.y) as i64) * ((p3.x - p1.x) as i64)
}

fn sort_by_angle(path: &Path) -> Vec<HullPoint> {
    let mut sorted = path.clone();
    sorted.sort();
    let pivot = sorted[0];
    let (start_y, start_x) = (pivot.0, pivot.1);

    let mut angles: Vec<HullPoint> = sorted[1..]
        .iter()
        .map(|&key| {
            let (y, x) = key;
            HullPoint {
                key,
                x,
                y,
                angle: ((y - start_y) as f64).atan2((x - start_x) as f64),
                distance: ((y - start_y) as i64).pow(2) + ((x - start_x) as i64).pow(2),
            }
        })
        .collect();

    angles.sort_by(|a, b| {
        // Duplicates of the pivot (the path's closing entry) sort first.
        if a.key == pivot {
            return std::cmp::Ordering::Less;
        }
        if b.key == pivot {
            return std::cmp::Ordering::Greater;
        }
        a.angle
            .total_cmp(&b.angle)
            .then_with(|| a.distance.cmp(&b.distance))
    });

    angles
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_path() {
        assert!(convex_hull(&Path::new(), false).is_empty());
    }

    #[test]
    fn test_square_hull_is_its_corners() {
        // The traced outline of a 2x2 pixel square: 8 corners, closed.
        let path: Path = vec![
            (0, 0),
            (0, 1),
            (0, 2),
            (1, 2),
            (2, 2),
            (2, 1),
            (2, 0),
            (1, 0),
            (0, 0),
        ];
        let hull = convex_hull(&path, false);
        assert_eq!(hull, vec![(0, 0), (0, 2), (2, 2), (2, 0), (0, 0)]);
    }

    #[test]
    fn test_reverse_for_inner_path() {
        let path: Path = vec![
            (0, 0),
            (0, 1),
            (0, 2),
            (1, 2),
            (2, 2),
            (2, 1),
            (2, 0),
            (1, 0),
            (0, 0),
        ];
        let hull = convex_hull(&path, true);
        assert_eq!(hull, vec![(0, 0), (2, 0), (2, 2), (0, 2), (0, 0)]);
    }

    #[test]
    fn test_concave_corner_is_dropped() {
        // An L-shaped outline: the inner elbow corner is not on the hull.
        let path: Path = vec![
            (0, 0),
            (0, 1),
            (1, 1),
            (1, 2),
            (2, 2),
            (2, 1),
            (2, 0),
            (1, 0),
            (0, 0),
        ];
        let hull = convex_hull(&path, false);
        assert!(!hull.contains(&(1, 1)));
        assert_eq!(hull.first(), Some(&(0, 0)));
        assert_eq!(hull.last(), Some(&(0, 0)));
    }
}
