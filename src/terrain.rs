//! Static terrain layers: dense W×H fields indexed by [`Cell`].

use std::collections::VecDeque;
use std::ops::Index;

use evacuation_common::{Cell, WaveDirection};

use crate::error::SetupError;

/// Dense row-major W×H field.
#[derive(Debug, Clone, PartialEq)]
pub struct Field<T> {
    width: u32,
    height: u32,
    data: Vec<T>,
}

/// Boolean layer (buildings, preferred paths, hazard eligibility, ...).
pub type Mask = Field<bool>;

impl<T: Clone> Field<T> {
    pub fn filled(width: u32, height: u32, value: T) -> Self {
        let len = width as usize * height as usize;
        Field { width, height, data: vec![value; len] }
    }

    pub fn set(&mut self, cell: Cell, value: T) -> bool {
        match self.index_of(cell) {
            Some(idx) => {
                self.data[idx] = value;
                true
            }
            None => false,
        }
    }

    /// Overwrites every value with `other`'s. Dimensions must match.
    pub fn copy_from(&mut self, other: &Field<T>) {
        debug_assert_eq!(self.dimensions(), other.dimensions());
        self.data.clone_from_slice(&other.data);
    }
}

impl<T> Field<T> {
    /// Builds a field from rows, row index being `y`. Ragged input is rejected.
    pub fn from_rows(rows: Vec<Vec<T>>) -> Option<Self> {
        let height = u32::try_from(rows.len()).ok()?;
        let width = rows.first().map_or(0, Vec::len);
        if rows.iter().any(|row| row.len() != width) {
            return None;
        }
        let width = u32::try_from(width).ok()?;
        let data = rows.into_iter().flatten().collect();
        Some(Field { width, height, data })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn in_bounds(&self, cell: Cell) -> bool {
        cell.x < self.width && cell.y < self.height
    }

    fn index_of(&self, cell: Cell) -> Option<usize> {
        if !self.in_bounds(cell) {
            return None;
        }
        Some(cell.y as usize * self.width as usize + cell.x as usize)
    }

    pub fn get(&self, cell: Cell) -> Option<&T> {
        self.index_of(cell).map(|idx| &self.data[idx])
    }

    /// Fails with [`SetupError::MaskDimensionMismatch`] unless the field is `width`x`height`.
    pub fn check_dimensions(&self, layer: &str, width: u32, height: u32) -> Result<(), SetupError> {
        if self.dimensions() == (width, height) {
            return Ok(());
        }
        Err(SetupError::MaskDimensionMismatch {
            layer: layer.to_string(),
            found_width: self.width,
            found_height: self.height,
            width,
            height,
        })
    }
}

impl<T> Index<Cell> for Field<T> {
    type Output = T;

    fn index(&self, cell: Cell) -> &T {
        match self.index_of(cell) {
            Some(idx) => &self.data[idx],
            None => panic!("{cell} outside {}x{} field", self.width, self.height),
        }
    }
}

impl Mask {
    pub fn empty(width: u32, height: u32) -> Self {
        Field::filled(width, height, false)
    }

    pub fn from_cells(width: u32, height: u32, cells: &[Cell]) -> Self {
        let mut mask = Mask::empty(width, height);
        for &cell in cells {
            mask.set(cell, true);
        }
        mask
    }

    /// Out-of-bounds cells read as unset.
    pub fn is_set(&self, cell: Cell) -> bool {
        self.get(cell).copied().unwrap_or(false)
    }

    pub fn count(&self) -> usize {
        self.data.iter().filter(|&&v| v).count()
    }

    /// Set cells in row-major order.
    pub fn cells(&self) -> impl Iterator<Item = Cell> + '_ {
        let width = self.width as usize;
        self.data
            .iter()
            .enumerate()
            .filter(|(_, &v)| v)
            .map(move |(idx, _)| Cell::new((idx % width) as u32, (idx / width) as u32))
    }

    /// 4-connected components, discovered in row-major order of their first cell.
    pub fn components(&self) -> Vec<Vec<Cell>> {
        let mut seen = Mask::empty(self.width, self.height);
        let mut components = Vec::new();
        let mut queue = VecDeque::new();

        for start in self.cells() {
            if seen.is_set(start) {
                continue;
            }
            seen.set(start, true);
            queue.push_back(start);
            let mut component = Vec::new();

            while let Some(cell) = queue.pop_front() {
                component.push(cell);
                for (dx, dy) in [(0, -1), (1, 0), (0, 1), (-1, 0)] {
                    let Some(next) = cell.offset(dx, dy, self.width, self.height) else {
                        continue;
                    };
                    if self.is_set(next) && !seen.is_set(next) {
                        seen.set(next, true);
                        queue.push_back(next);
                    }
                }
            }
            components.push(component);
        }
        components
    }

    /// Cells whose centre lies inside (or on the edge of) the triangle `corners`.
    pub fn triangle(width: u32, height: u32, corners: [[f64; 2]; 3]) -> Self {
        let [a, b, c] = corners;
        let edge = |p: [f64; 2], q: [f64; 2], r: [f64; 2]| {
            (r[0] - p[0]) * (q[1] - p[1]) - (r[1] - p[1]) * (q[0] - p[0])
        };
        let mut mask = Mask::empty(width, height);
        for y in 0..height {
            for x in 0..width {
                let centre = [f64::from(x) + 0.5, f64::from(y) + 0.5];
                let d1 = edge(a, b, centre);
                let d2 = edge(b, c, centre);
                let d3 = edge(c, a, centre);
                let has_neg = d1 < 0.0 || d2 < 0.0 || d3 < 0.0;
                let has_pos = d1 > 0.0 || d2 > 0.0 || d3 > 0.0;
                if !(has_neg && has_pos) {
                    mask.set(Cell::new(x, y), true);
                }
            }
        }
        mask
    }
}

/// Trailing edge of a region relative to the direction a wave travels.
/// For `Up` this is the lowest row. Returned sorted by `(y, x)`.
pub fn base_cells(cells: &[Cell], direction: WaveDirection) -> Vec<Cell> {
    let key = |cell: &Cell| -> i64 {
        match direction {
            WaveDirection::Up => i64::from(cell.y),
            WaveDirection::Down => -i64::from(cell.y),
            WaveDirection::Left => -i64::from(cell.x),
            WaveDirection::Right => i64::from(cell.x),
        }
    };
    let Some(edge) = cells.iter().map(key).min() else {
        return Vec::new();
    };
    let mut base: Vec<Cell> = cells.iter().copied().filter(|c| key(c) == edge).collect();
    base.sort_by_key(|c| (c.y, c.x));
    base
}

/// Every static raster the core consumes, supplied once at setup.
#[derive(Debug, Clone)]
pub struct Terrain {
    pub elevation: Field<f64>,
    /// Building footprints.
    pub obstacles: Mask,
    /// Preferred walking paths (cheaper to route through).
    pub paths: Mask,
    /// Cells evacuees may never occupy.
    pub prohibited: Mask,
    /// One eligibility mask per configured hazard area.
    pub hazard_masks: Vec<Mask>,
}

impl Terrain {
    /// Flat, obstacle-free terrain.
    pub fn open(width: u32, height: u32) -> Self {
        Terrain {
            elevation: Field::filled(width, height, 0.0),
            obstacles: Mask::empty(width, height),
            paths: Mask::empty(width, height),
            prohibited: Mask::empty(width, height),
            hazard_masks: Vec::new(),
        }
    }

    /// Every layer must match the configured lattice.
    pub fn validate(&self, width: u32, height: u32) -> Result<(), SetupError> {
        self.elevation.check_dimensions("elevation", width, height)?;
        self.obstacles.check_dimensions("obstacle mask", width, height)?;
        self.paths.check_dimensions("path mask", width, height)?;
        self.prohibited.check_dimensions("prohibited mask", width, height)?;
        for (idx, mask) in self.hazard_masks.iter().enumerate() {
            mask.check_dimensions(&format!("hazard mask {idx}"), width, height)?;
        }
        Ok(())
    }
}
