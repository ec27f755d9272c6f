use crate::error::{Error, Result};
use crate::types::Tile;

/// Nominal tile edge in pixels
pub const DEFAULT_TILE_SIZE: usize = 256;

/// Partition of a `width × height` raster into `tile_size` squares.
/// The last column and row of tiles are clipped to the raster bounds.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TileGrid {
    width: usize,
    height: usize,
    tile_size: usize,
    columns: usize,
    rows: usize,
}

impl TileGrid {
    pub fn new(width: usize, height: usize, tile_size: usize) -> Result<Self> {
        if tile_size == 0 {
            return Err(Error::InvalidArgument {
                arg: "tile_size",
                value: tile_size.to_string(),
            });
        }
        Ok(Self {
            width,
            height,
            tile_size,
            columns: width.div_ceil(tile_size),
            rows: height.div_ceil(tile_size),
        })
    }

    pub fn columns(&self) -> usize {
        self.columns
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn total(&self) -> usize {
        self.columns * self.rows
    }

    /// Tile at grid position (`column`, `row`); `None` outside the grid
    pub fn tile(&self, column: usize, row: usize) -> Option<Tile> {
        if column >= self.columns || row >= self.rows {
            return None;
        }
        let x = column * self.tile_size;
        let y = row * self.tile_size;
        Some(Tile {
            x,
            y,
            width: self.tile_size.min(self.width - x),
            height: self.tile_size.min(self.height - y),
        })
    }

    /// Row-major: top-to-bottom rows, left-to-right within a row
    pub fn iter(&self) -> impl Iterator<Item = Tile> + '_ {
        (0..self.rows)
            .flat_map(move |row| (0..self.columns).filter_map(move |col| self.tile(col, row)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_multiple_yields_full_tiles() {
        let grid = TileGrid::new(512, 512, 256).unwrap();
        assert_eq!(grid.total(), 4);
        let tiles: Vec<Tile> = grid.iter().collect();
        assert_eq!(
            tiles.iter().map(|t| (t.x, t.y)).collect::<Vec<_>>(),
            vec![(0, 0), (256, 0), (0, 256), (256, 256)]
        );
        assert!(tiles.iter().all(|t| t.width == 256 && t.height == 256));
    }

    #[test]
    fn edge_tiles_are_clipped() {
        let grid = TileGrid::new(600, 300, 256).unwrap();
        assert_eq!((grid.columns(), grid.rows()), (3, 2));
        let last = grid.iter().last().unwrap();
        assert_eq!(
            last,
            Tile {
                x: 512,
                y: 256,
                width: 88,
                height: 44
            }
        );
        let covered: usize = grid.iter().map(|t| t.pixel_count()).sum();
        assert_eq!(covered, 600 * 300);
    }

    #[test]
    fn empty_raster_has_no_tiles() {
        let grid = TileGrid::new(0, 100, 256).unwrap();
        assert_eq!(grid.total(), 0);
        assert_eq!(grid.iter().count(), 0);
    }

    #[test]
    fn raster_smaller_than_tile() {
        let grid = TileGrid::new(10, 7, 256).unwrap();
        let tiles: Vec<Tile> = grid.iter().collect();
        assert_eq!(tiles.len(), 1);
        assert_eq!((tiles[0].width, tiles[0].height), (10, 7));
    }

    #[test]
    fn zero_tile_size_is_an_error() {
        assert!(matches!(
            TileGrid::new(100, 100, 0),
            Err(Error::InvalidArgument { arg: "tile_size", .. })
        ));
    }

    #[test]
    fn positions_outside_the_grid_have_no_tile() {
        let grid = TileGrid::new(600, 300, 256).unwrap();
        assert_eq!(grid.tile(2, 1).map(|t| (t.x, t.y)), Some((512, 256)));
        assert_eq!(grid.tile(3, 0), None);
        assert_eq!(grid.tile(0, 2), None);
        assert_eq!(grid.tile(usize::MAX, usize::MAX), None);
    }
}
