use feed_schema::TERM_WHITE;
use serde::{Deserialize, Serialize};

/// One display cell: a colour attribute and a symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Cell {
    pub attr: u8,
    pub symbol: u8,
}

impl Cell {
    /// Nothing painted here. Transparent layers leave what is below; deltas
    /// leave what the client already has.
    pub const UNSET: Cell = Cell { attr: 0, symbol: 0 };

    pub const BLANK: Cell = Cell {
        attr: TERM_WHITE,
        symbol: b' ',
    };

    pub const fn new(symbol: u8, attr: u8) -> Self {
        Self { attr, symbol }
    }

    pub fn is_unset(self) -> bool {
        self.symbol == 0
    }
}

/// Row-major rectangle of cells.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grid {
    width: u16,
    height: u16,
    cells: Vec<Cell>,
}

impl Grid {
    pub fn new(width: u16, height: u16) -> Self {
        Self::filled(width, height, Cell::UNSET)
    }

    pub fn filled(width: u16, height: u16, cell: Cell) -> Self {
        Self {
            width,
            height,
            cells: vec![cell; width as usize * height as usize],
        }
    }

    /// Grid whose storage is reserved for `capacity_rows` rows up front, so
    /// later growth up to that height never reallocates.
    pub fn with_row_capacity(width: u16, height: u16, capacity_rows: u16) -> Self {
        let mut cells = Vec::with_capacity(width as usize * capacity_rows.max(height) as usize);
        cells.resize(width as usize * height as usize, Cell::UNSET);
        Self {
            width,
            height,
            cells,
        }
    }

    pub fn from_cells(width: u16, height: u16, cells: Vec<Cell>) -> Option<Self> {
        (cells.len() == width as usize * height as usize).then_some(Self {
            width,
            height,
            cells,
        })
    }

    pub fn width(&self) -> u16 {
        self.width
    }

    pub fn height(&self) -> u16 {
        self.height
    }

    pub fn area(&self) -> usize {
        self.cells.len()
    }

    pub fn capacity(&self) -> usize {
        self.cells.capacity()
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn cells_mut(&mut self) -> &mut [Cell] {
        &mut self.cells
    }

    pub fn get(&self, x: u16, y: u16) -> Option<Cell> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.cells.get(self.index(x, y)).copied()
    }

    /// Paint a cell. Writes outside the grid are ignored.
    pub fn set(&mut self, x: u16, y: u16, cell: Cell) -> bool {
        if x >= self.width || y >= self.height {
            return false;
        }
        let index = self.index(x, y);
        self.cells[index] = cell;
        true
    }

    pub fn row(&self, y: u16) -> Option<&[Cell]> {
        if y >= self.height {
            return None;
        }
        let start = y as usize * self.width as usize;
        Some(&self.cells[start..start + self.width as usize])
    }

    pub fn fill(&mut self, cell: Cell) {
        self.cells.fill(cell);
    }

    /// Change dimensions, clearing every cell. Keeps the allocation.
    pub fn resize(&mut self, width: u16, height: u16) {
        self.width = width;
        self.height = height;
        self.cells.clear();
        self.cells
            .resize(width as usize * height as usize, Cell::UNSET);
    }

    /// Overwrite this grid with `other`, reusing the allocation.
    pub fn copy_from(&mut self, other: &Grid) {
        self.width = other.width;
        self.height = other.height;
        self.cells.clear();
        self.cells.extend_from_slice(&other.cells);
    }

    /// Cells that differ from `baseline`; unchanged cells become
    /// [`Cell::UNSET`]. A baseline of a different size yields a full copy.
    pub fn delta_from(&self, baseline: &Grid) -> Grid {
        if baseline.width != self.width || baseline.height != self.height {
            return self.clone();
        }
        let cells = self
            .cells
            .iter()
            .zip(&baseline.cells)
            .map(|(now, before)| if now == before { Cell::UNSET } else { *now })
            .collect();
        Grid {
            width: self.width,
            height: self.height,
            cells,
        }
    }

    /// Copy every set cell of `layer` onto this grid. Sizes must match.
    pub fn apply_set_cells(&mut self, layer: &Grid) -> bool {
        if layer.width != self.width || layer.height != self.height {
            return false;
        }
        for (dest, src) in self.cells.iter_mut().zip(&layer.cells) {
            if !src.is_unset() {
                *dest = *src;
            }
        }
        true
    }

    pub fn is_all_unset(&self) -> bool {
        self.cells.iter().all(|cell| cell.is_unset())
    }

    fn index(&self, x: u16, y: u16) -> usize {
        y as usize * self.width as usize + x as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_bounds_writes_are_ignored() {
        let mut grid = Grid::new(3, 2);
        assert!(!grid.set(3, 0, Cell::new(b'x', 1)));
        assert!(!grid.set(0, 2, Cell::new(b'x', 1)));
        assert!(grid.is_all_unset());
        assert_eq!(grid.get(5, 5), None);
    }

    #[test]
    fn delta_marks_unchanged_cells_unset() {
        let base = Grid::filled(4, 1, Cell::new(b'.', 1));
        let mut next = base.clone();
        next.set(2, 0, Cell::new(b'@', 1));
        let delta = next.delta_from(&base);
        assert_eq!(delta.get(2, 0), Some(Cell::new(b'@', 1)));
        assert_eq!(delta.get(0, 0), Some(Cell::UNSET));

        let mut replay = base.clone();
        assert!(replay.apply_set_cells(&delta));
        assert_eq!(replay, next);
    }

    #[test]
    fn row_capacity_is_reserved() {
        let grid = Grid::with_row_capacity(10, 2, 8);
        assert_eq!(grid.area(), 20);
        assert!(grid.capacity() >= 80);
    }

    #[test]
    fn copy_from_reuses_reserved_rows() {
        let mut target = Grid::with_row_capacity(4, 1, 6);
        let reserved = target.capacity();
        target.copy_from(&Grid::filled(4, 5, Cell::BLANK));
        assert_eq!(target.height(), 5);
        assert_eq!(target.capacity(), reserved);
    }

    #[test]
    fn resize_clears_and_keeps_allocation() {
        let mut grid = Grid::with_row_capacity(10, 2, 8);
        grid.fill(Cell::new(b'#', 2));
        grid.resize(10, 8);
        assert!(grid.is_all_unset());
        assert!(grid.capacity() >= 80);
    }
}
