/// Grid-based spatial index for aggro and area-of-effect queries.
///
/// Divides the zone into uniform cells and tracks which entities are in each
/// cell. Range queries only visit the cells overlapping the query sphere,
/// which keeps aggro scans O(candidates) instead of O(entities).
use std::collections::{HashMap, HashSet};

use super::geometry::Vec3;

/// Cell edge length for outdoor zones, in world units.
pub const DEFAULT_CELL_SIZE: f32 = 50.0;

/// Cell edge length for indoor (dungeon) zones.
pub const INDOOR_CELL_SIZE: f32 = 25.0;

/// A uniform-cell spatial index. Cells are created on first insert and
/// dropped when their last occupant leaves, so the grid has no fixed extent.
pub struct SpatialGrid {
    cell_size: f32,
    cells: HashMap<(i32, i32, i32), HashSet<u64>>,
    positions: HashMap<u64, Vec3>,
}

impl SpatialGrid {
    pub fn new(cell_size: f32) -> Self {
        SpatialGrid {
            cell_size,
            cells: HashMap::new(),
            positions: HashMap::new(),
        }
    }

    /// Number of indexed entities.
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Insert an entity at the given position. An entity that is already
    /// indexed is moved rather than duplicated.
    pub fn insert(&mut self, id: u64, pos: Vec3) {
        if self.positions.contains_key(&id) {
            self.remove(id);
        }
        let cell = self.cell_coords(pos);
        self.cells.entry(cell).or_default().insert(id);
        self.positions.insert(id, pos);
    }

    /// Remove an entity from the index. Returns false if it was not indexed.
    pub fn remove(&mut self, id: u64) -> bool {
        let pos = match self.positions.remove(&id) {
            Some(p) => p,
            None => return false,
        };
        let cell = self.cell_coords(pos);
        if let Some(set) = self.cells.get_mut(&cell) {
            set.remove(&id);
            if set.is_empty() {
                self.cells.remove(&cell);
            }
        }
        true
    }

    /// Move an entity to a new position. Stays O(1) when the move does not
    /// cross a cell boundary.
    pub fn update(&mut self, id: u64, new_pos: Vec3) {
        match self.positions.get(&id).copied() {
            Some(old) if self.cell_coords(old) == self.cell_coords(new_pos) => {
                self.positions.insert(id, new_pos);
            }
            Some(_) => {
                self.remove(id);
                self.insert(id, new_pos);
            }
            None => self.insert(id, new_pos),
        }
    }

    /// Last indexed position of an entity.
    pub fn position(&self, id: u64) -> Option<Vec3> {
        self.positions.get(&id).copied()
    }

    /// All entities within `radius` of `center` (full 3-D distance).
    /// Result order is unspecified.
    pub fn query_range(&self, center: Vec3, radius: f32) -> Vec<u64> {
        let mut results = Vec::new();
        if radius < 0.0 {
            return results;
        }
        let min = self.cell_coords(Vec3::new(
            center.x - radius,
            center.y - radius,
            center.z - radius,
        ));
        let max = self.cell_coords(Vec3::new(
            center.x + radius,
            center.y + radius,
            center.z + radius,
        ));
        let radius_sq = radius * radius;

        for cx in min.0..=max.0 {
            for cy in min.1..=max.1 {
                for cz in min.2..=max.2 {
                    let set = match self.cells.get(&(cx, cy, cz)) {
                        Some(s) => s,
                        None => continue,
                    };
                    for &id in set {
                        let pos = self.positions[&id];
                        if pos.distance_sq(center) <= radius_sq {
                            results.push(id);
                        }
                    }
                }
            }
        }
        results
    }

    fn cell_coords(&self, pos: Vec3) -> (i32, i32, i32) {
        (
            (pos.x / self.cell_size).floor() as i32,
            (pos.y / self.cell_size).floor() as i32,
            (pos.z / self.cell_size).floor() as i32,
        )
    }

    #[cfg(test)]
    fn cell_count(&self) -> usize {
        self.cells.len()
    }
}
