use std::collections::VecDeque;

use itertools::iproduct;

use crate::{
    error::ConfigError,
    tile::{ScreenPoint, ScreenSize, Tile},
};

/// Splits the canvas into tiles in row-major order, starting at the top left corner.
///
/// Tiles are `tile_size` large, except in the last column and row, where they are clipped
/// to the canvas if the tile size doesn't evenly divide the canvas size.
/// The returned tiles cover every pixel of the canvas exactly once.
pub fn plan_tiles(
    canvas: ScreenSize,
    tile_size: ScreenSize,
) -> Result<VecDeque<Tile>, ConfigError> {
    if canvas.x == 0 || canvas.y == 0 {
        return Err(ConfigError::EmptyCanvas {
            width: canvas.x,
            height: canvas.y,
        });
    }
    if tile_size.x == 0 || tile_size.y == 0 {
        return Err(ConfigError::EmptyTile {
            width: tile_size.x,
            height: tile_size.y,
        });
    }

    let rows = (0..canvas.y).step_by(tile_size.y as usize);
    let columns = (0..canvas.x).step_by(tile_size.x as usize);

    let tiles: VecDeque<Tile> = iproduct!(rows, columns)
        .map(|(y, x)| {
            Tile::new(
                ScreenPoint::new(x, y),
                ScreenSize::new(tile_size.x.min(canvas.x - x), tile_size.y.min(canvas.y - y)),
            )
        })
        .collect();

    debug_assert_eq!(tiles.len(), tile_count(canvas, tile_size));
    Ok(tiles)
}

/// Number of tiles `plan_tiles` produces for non-empty sizes.
pub fn tile_count(canvas: ScreenSize, tile_size: ScreenSize) -> usize {
    canvas.x.div_ceil(tile_size.x) as usize * canvas.y.div_ceil(tile_size.y) as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert2::assert;
    use test_case::test_case;
    use test_strategy::proptest;

    #[proptest]
    fn tiles_cover_canvas_exactly_once(
        #[strategy(1..120u32)] width: u32,
        #[strategy(1..120u32)] height: u32,
        #[strategy(1..50u32)] tile_width: u32,
        #[strategy(1..50u32)] tile_height: u32,
    ) {
        let canvas = ScreenSize::new(width, height);
        let tiles = plan_tiles(canvas, ScreenSize::new(tile_width, tile_height)).unwrap();

        let expected = width.div_ceil(tile_width) * height.div_ceil(tile_height);
        assert!(tiles.len() == expected as usize);

        let bounds = Tile::from_size(canvas);
        let mut covered = vec![0u8; (width * height) as usize];
        for tile in &tiles {
            assert!(bounds.contains_tile(tile));
            for p in tile.internal_points() {
                covered[(p.x + p.y * width) as usize] += 1;
            }
        }
        assert!(covered.iter().all(|&count| count == 1));
    }

    #[proptest]
    fn edge_tiles_are_clipped(
        #[strategy(1..120u32)] width: u32,
        #[strategy(1..120u32)] height: u32,
        #[strategy(1..50u32)] tile_width: u32,
        #[strategy(1..50u32)] tile_height: u32,
    ) {
        let tiles = plan_tiles(
            ScreenSize::new(width, height),
            ScreenSize::new(tile_width, tile_height),
        )
        .unwrap();

        let last_width = match width % tile_width {
            0 => tile_width,
            rest => rest,
        };
        let last_height = match height % tile_height {
            0 => tile_height,
            rest => rest,
        };

        for tile in &tiles {
            let expected_width = if tile.max().x == width { last_width } else { tile_width };
            let expected_height = if tile.max().y == height { last_height } else { tile_height };
            assert!(tile.width() == expected_width);
            assert!(tile.height() == expected_height);
        }
    }

    #[proptest]
    fn order_is_row_major(
        #[strategy(1..120u32)] width: u32,
        #[strategy(1..120u32)] height: u32,
        #[strategy(1..50u32)] tile_size: u32,
    ) {
        let tiles = plan_tiles(
            ScreenSize::new(width, height),
            ScreenSize::new(tile_size, tile_size),
        )
        .unwrap();

        assert!(tiles[0].origin == ScreenPoint::origin());
        for (a, b) in tiles.iter().zip(tiles.iter().skip(1)) {
            assert!((a.origin.y, a.origin.x) < (b.origin.y, b.origin.x));
        }
    }

    #[test]
    fn hundred_by_hundred_in_forties() {
        let tiles = plan_tiles(ScreenSize::new(100, 100), ScreenSize::new(40, 40)).unwrap();
        let sizes: Vec<(u32, u32)> = tiles.iter().map(|t| (t.width(), t.height())).collect();

        assert!(
            sizes
                == vec![
                    (40, 40),
                    (40, 40),
                    (20, 40),
                    (40, 40),
                    (40, 40),
                    (20, 40),
                    (40, 20),
                    (40, 20),
                    (20, 20),
                ]
        );
        assert!(tiles[2].origin == ScreenPoint::new(80, 0));
        assert!(tiles[8].origin == ScreenPoint::new(80, 80));
    }

    #[test]
    fn tile_larger_than_canvas() {
        let tiles = plan_tiles(ScreenSize::new(10, 7), ScreenSize::new(64, 64)).unwrap();
        assert!(tiles.len() == 1);
        assert!(tiles[0] == Tile::from_size(ScreenSize::new(10, 7)));
    }

    #[test_case(0, 10, 4, 4 ; "zero width canvas")]
    #[test_case(10, 0, 4, 4 ; "zero height canvas")]
    #[test_case(10, 10, 0, 4 ; "zero width tile")]
    #[test_case(10, 10, 4, 0 ; "zero height tile")]
    fn empty_sizes_are_rejected(width: u32, height: u32, tile_width: u32, tile_height: u32) {
        let result = plan_tiles(
            ScreenSize::new(width, height),
            ScreenSize::new(tile_width, tile_height),
        );
        assert!(let Err(_) = result);
    }
}
