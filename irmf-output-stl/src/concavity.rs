//! Re-injects concave contour points into a convex hull path.

use crate::labels::Key;
use crate::paths::Path;

/// Refines `hull_path` by walking `full_path` between consecutive hull
/// vertices and appending every intermediate contour point whose
/// perpendicular distance from the current refined segment is at least
/// `threshold` (in pixels). Both paths must traverse the contour in the same
/// direction.
pub fn correct_concavity(hull_path: &Path, full_path: &Path, threshold: f64) -> Path {
    if hull_path.len() <= 3 {
        return hull_path.clone();
    }

    let mut checker = ConcavityChecker {
        full_path,
        final_path: Path::with_capacity(full_path.len()),
    };
    let mut inner = 1;
    for (outer, &label) in hull_path.iter().enumerate() {
        if outer < 1 {
            checker.final_path.push(label);
            continue;
        }
        inner = checker.check(hull_path, inner, outer, threshold);
    }

    checker.final_path
}

struct ConcavityChecker<'a> {
    full_path: &'a Path,
    final_path: Path,
}

impl ConcavityChecker<'_> {
    /// Walks the full contour from `inner` toward hull vertex `outer`,
    /// appending deviating points, and returns the next walk start.
    fn check(&mut self, hull_path: &Path, inner: usize, outer: usize, threshold: f64) -> usize {
        let target = hull_path[outer];

        for (i, &point) in self.full_path[inner..].iter().enumerate() {
            if point == target {
                self.final_path.push(point);
                return inner + i + 1;
            }

            let anchor = self.final_path[self.final_path.len() - 1];
            if distance(anchor, point, target) >= threshold {
                self.final_path.push(point);
            }
        }
        inner
    }
}

/// Perpendicular distance of `p0` from the segment `p1 -> p2`, computed as
/// the cross-product area over the segment length.
fn distance(p1: Key, p0: Key, p2: Key) -> f64 {
    let (y1, x1) = (p1.0 as f64, p1.1 as f64);
    let (y0, x0) = (p0.0 as f64, p0.1 as f64);
    let (y2, x2) = (p2.0 as f64, p2.1 as f64);

    let dx = x2 - x1;
    let dy = y2 - y1;
    let len = (dx * dx + dy * dy).sqrt();
    if len == 0.0 {
        return ((x0 - x1).powi(2) + (y0 - y1).powi(2)).sqrt();
    }
    (dx * (y0 - y1) - dy * (x0 - x1)).abs() / len
}

#[cfg(test)]
mod tests {
    use super::*;

    const THRESHOLD: f64 = 2.0;

    fn bite_hull() -> Path {
        vec![(1, 1), (1, 5), (5, 5), (5, 4), (2, 1), (1, 1)]
    }

    fn bite_full() -> Path {
        vec![
            (1, 1),
            (1, 2),
            (1, 3),
            (1, 4),
            (1, 5),
            (2, 5),
            (3, 5),
            (4, 5),
            (5, 5),
            (5, 4),
            (4, 4),
            (3, 4),
            (2, 4),
            (2, 3),
            (2, 2),
            (2, 1),
            (1, 1),
        ]
    }

    #[test]
    fn test_correct_concavity_empty() {
        assert!(correct_concavity(&Path::new(), &Path::new(), THRESHOLD).is_empty());
    }

    #[test]
    fn test_correct_concavity_square_with_bite() {
        let got = correct_concavity(&bite_hull(), &bite_full(), THRESHOLD);
        assert_eq!(
            got,
            vec![(1, 1), (1, 5), (5, 5), (5, 4), (2, 4), (2, 1), (1, 1)]
        );
    }

    #[test]
    fn test_check_steps() {
        let hull = bite_hull();
        let full = bite_full();
        let mut checker = ConcavityChecker {
            full_path: &full,
            final_path: vec![(1, 1)],
        };

        struct Step {
            inner: usize,
            outer: usize,
            want: usize,
            final_path: Vec<Key>,
        }
        let steps = [
            Step {
                inner: 1,
                outer: 1,
                want: 5,
                final_path: vec![(1, 1), (1, 5)],
            },
            Step {
                inner: 5,
                outer: 2,
                want: 9,
                final_path: vec![(1, 1), (1, 5), (5, 5)],
            },
            Step {
                inner: 9,
                outer: 3,
                want: 10,
                final_path: vec![(1, 1), (1, 5), (5, 5), (5, 4)],
            },
            Step {
                inner: 10,
                outer: 4,
                want: 16,
                final_path: vec![(1, 1), (1, 5), (5, 5), (5, 4), (2, 4), (2, 1)],
            },
            Step {
                inner: 16,
                outer: 5,
                want: 17,
                final_path: vec![(1, 1), (1, 5), (5, 5), (5, 4), (2, 4), (2, 1), (1, 1)],
            },
        ];

        for (i, step) in steps.iter().enumerate() {
            let got = checker.check(&hull, step.inner, step.outer, THRESHOLD);
            assert_eq!(got, step.want, "step #{i}");
            assert_eq!(checker.final_path, step.final_path, "step #{i}");
        }
    }

    #[test]
    fn test_short_hull_passes_through() {
        let hull: Path = vec![(0, 0), (0, 1), (0, 0)];
        assert_eq!(correct_concavity(&hull, &bite_full(), THRESHOLD), hull);
    }
}
