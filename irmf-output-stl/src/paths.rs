//! Traces the exposed edges of a label into closed corner paths.
//!
//! Each path entry names the upper-left corner of a pixel, so a path of N
//! corners has N+1 entries (the start is repeated to close). The first path
//! is the outer boundary; later paths outline holes and run the opposite
//! way around.

use crate::edges::{Edge, Outline, BOTTOM, LEFT, RIGHT, TOP};
use crate::labels::Key;
use irmf_slicer::IrmfResult;

/// One closed trace around a region of a slice, as corner keys.
pub type Path = Vec<Key>;

/// Consumes the outline's edges into closed paths.
///
/// The walk prefers to continue in its current direction: after any step but
/// Bottom it tries Top, Left, Bottom, Right; after Bottom it tries Right,
/// Bottom, Left, Top. Each step consumes the edge it walked.
pub fn edges_to_paths(edges: &Outline) -> IrmfResult<Vec<Path>> {
    let Some((&first, &first_edge)) = edges.iter().next() else {
        return Ok(Vec::new());
    };
    if !first_edge.has(TOP) {
        return Err(format!("unexpected starting edge at {first:?}: {first_edge:?}").into());
    }

    let mut t = Tracer {
        edges: edges.clone(),
        result: Vec::new(),
        current: vec![first],
        last_key: first,
        last_edge: TOP,
    };

    while !t.edges.is_empty() {
        let stepped = if t.last_edge != BOTTOM {
            t.check_top()? || t.check_left()? || t.check_bottom()? || t.check_right()?
        } else {
            t.check_right()? || t.check_bottom()? || t.check_left()? || t.check_top()?
        };
        if !stepped {
            return Err(format!("dead end tracing outline at {:?}", t.last_key).into());
        }
    }

    if !t.current.is_empty() {
        t.result.push(t.current);
    }
    Ok(t.result)
}

struct Tracer {
    edges: Outline,
    result: Vec<Path>,
    current: Path,
    last_key: Key,
    last_edge: Edge,
}

impl Tracer {
    /// Clears `bit` at `key`, dropping the entry once its mask is empty.
    fn consume(&mut self, key: Key, bit: Edge) {
        if let Some(&e) = self.edges.get(&key) {
            let e = e.remove(bit);
            if e.is_empty() {
                self.edges.remove(&key);
            } else {
                self.edges.insert(key, e);
            }
        }
    }

    /// Appends the cursor to the path; on closure, starts the next path (a
    /// hole) below the first remaining Bottom-only corner.
    fn advance(&mut self, key: Key) -> IrmfResult<()> {
        self.last_key = key;
        self.current.push(key);

        if self.current.len() > 1 && self.current[0] == *self.current.last().unwrap() {
            self.result.push(std::mem::take(&mut self.current));

            if let Some((&next, &edge)) = self.edges.iter().next() {
                if edge != BOTTOM {
                    return Err(format!("unexpected edge at {next:?}: {edge:?}").into());
                }
                let (v, u) = next;
                self.last_key = (v + 1, u);
                self.current = vec![self.last_key];
            }
        }
        Ok(())
    }

    /// Walk right along the top edge of the pixel at the cursor.
    fn check_top(&mut self) -> IrmfResult<bool> {
        let Some(&e) = self.edges.get(&self.last_key) else {
            return Ok(false);
        };
        if !e.has(TOP) {
            return Ok(false);
        }
        self.last_edge = TOP;
        let (v, u) = self.last_key;
        self.consume((v, u), TOP);
        self.advance((v, u + 1))?;
        Ok(true)
    }

    /// Walk up along the left edge of the pixel above the cursor.
    fn check_left(&mut self) -> IrmfResult<bool> {
        let (v, u) = self.last_key;
        let up = (v - 1, u);
        match self.edges.get(&up) {
            Some(e) if e.has(LEFT) => {}
            _ => return Ok(false),
        }
        self.last_edge = LEFT;
        self.consume(up, LEFT);
        self.advance(up)?;
        Ok(true)
    }

    /// Walk left along the bottom edge of the pixel up-left of the cursor.
    fn check_bottom(&mut self) -> IrmfResult<bool> {
        let (v, u) = self.last_key;
        let up_left = (v - 1, u - 1);
        match self.edges.get(&up_left) {
            Some(e) if e.has(BOTTOM) => {}
            _ => return Ok(false),
        }
        self.last_edge = BOTTOM;
        self.consume(up_left, BOTTOM);
        self.advance((v, u - 1))?;
        Ok(true)
    }

    /// Walk down along the right edge of the pixel left of the cursor.
    fn check_right(&mut self) -> IrmfResult<bool> {
        let (v, u) = self.last_key;
        let left = (v, u - 1);
        match self.edges.get(&left) {
            Some(e) if e.has(RIGHT) => {}
            _ => return Ok(false),
        }
        self.last_edge = RIGHT;
        self.consume(left, RIGHT);
        self.advance((v + 1, u))?;
        Ok(true)
    }
}
