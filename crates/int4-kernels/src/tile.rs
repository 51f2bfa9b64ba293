//! Output tile grid.
//!
//! The MB x NB grid of output tiles is flattened row-major, so consecutive
//! flat indices walk across the column tiles of one tile row before moving
//! down.

use std::ops::Range;

/// (mb, nb) coordinate of one output tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileCoord {
    pub mb: usize,
    pub nb: usize,
}

/// Element range an output tile covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileExtent {
    pub row_start: usize,
    pub rows: usize,
    pub col_start: usize,
    pub cols: usize,
}

/// Tiling of an M x N output by `block_m` x `block_n` tiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileGrid {
    m: usize,
    n: usize,
    block_m: usize,
    block_n: usize,
    num_mb: usize,
    num_nb: usize,
}

impl TileGrid {
    pub fn new(m: usize, n: usize, block_m: usize, block_n: usize) -> Self {
        assert!(block_m > 0 && block_n > 0, "tile dimensions must be positive");
        Self {
            m,
            n,
            block_m,
            block_n,
            num_mb: m.div_ceil(block_m),
            num_nb: n.div_ceil(block_n),
        }
    }

    pub fn num_mb(&self) -> usize {
        self.num_mb
    }

    pub fn num_nb(&self) -> usize {
        self.num_nb
    }

    pub fn num_tiles(&self) -> usize {
        self.num_mb * self.num_nb
    }

    /// Coordinate of flat index `flat`.
    #[inline]
    pub fn coord(&self, flat: usize) -> TileCoord {
        TileCoord {
            mb: flat / self.num_nb,
            nb: flat % self.num_nb,
        }
    }

    /// Advance `c` to the next flat index: next column tile, carrying into
    /// the next tile row.
    #[inline]
    pub fn step(&self, c: &mut TileCoord) {
        c.nb += 1;
        if c.nb == self.num_nb {
            c.nb = 0;
            c.mb += 1;
        }
    }

    /// Rows and columns tile `c` covers; boundary tiles are clipped.
    #[inline]
    pub fn extent(&self, c: TileCoord) -> TileExtent {
        let row_start = c.mb * self.block_m;
        let col_start = c.nb * self.block_n;
        TileExtent {
            row_start,
            rows: self.block_m.min(self.m - row_start),
            col_start,
            cols: self.block_n.min(self.n - col_start),
        }
    }

    /// Coordinates of a flat index range, in order.
    pub fn iter_range(&self, range: Range<usize>) -> impl Iterator<Item = TileCoord> + '_ {
        let mut c = self.coord(range.start);
        range.map(move |_| {
            let cur = c;
            self.step(&mut c);
            cur
        })
    }
}
