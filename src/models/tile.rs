//! Tile coordinates and extracted tile records

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::config::TileSize;

/// Location of one tile crop at a given level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileCoordinate {
    /// Left edge in level pixels
    pub x: u32,
    /// Top edge in level pixels
    pub y: u32,
    /// Crop size
    pub size: TileSize,
    /// Level the coordinates refer to
    pub level: usize,
}

impl TileCoordinate {
    /// Right edge (exclusive)
    #[must_use]
    pub const fn x_end(&self) -> u32 {
        self.x + self.size.width
    }

    /// Bottom edge (exclusive)
    #[must_use]
    pub const fn y_end(&self) -> u32 {
        self.y + self.size.height
    }

    /// Whether the crop lies fully inside a `width x height` extent
    #[must_use]
    pub const fn fits_within(&self, width: u32, height: u32) -> bool {
        self.x as u64 + self.size.width as u64 <= width as u64
            && self.y as u64 + self.size.height as u64 <= height as u64
    }

    /// Tile filename for the `index`-th tile of `slide_id`
    ///
    /// The slide id always comes first and is followed by `_tile_`.
    #[must_use]
    pub fn filename(&self, slide_id: &str, index: usize) -> String {
        format!(
            "{slide_id}_tile_{index}_level{}_{}-{}-{}-{}.png",
            self.level,
            self.x,
            self.y,
            self.x_end(),
            self.y_end()
        )
    }
}

/// A tile written to disk, with its source slide carried explicitly
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedTile {
    /// Sample id of the source slide
    pub slide_id: String,
    /// File name inside the tiles directory
    pub filename: String,
    /// Full path of the tile image
    pub path: PathBuf,
    /// Crop the tile was taken from
    pub coordinate: TileCoordinate,
}
