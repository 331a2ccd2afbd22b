//! Join between extracted tiles and slide metadata
//!
//! Each tile carries the sample id of its slide explicitly, either from the
//! extraction report or from the tile manifest written next to the tiles.
//! When only a directory of tile images is available, filenames are resolved
//! against the known sample ids instead of being split on a separator, so ids
//! that themselves contain `_` still resolve to the right slide.

use std::path::Path;
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, StringArray, UInt32Array};
use arrow::compute;
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use log::{info, warn};
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TilerError};
use crate::models::ExtractedTile;
use crate::utils::arrow_utils::{non_empty_value, string_batch, string_column};
use crate::utils::io::{find_files, read_csv_as_strings, write_csv};

/// Column holding the tile file name in joined and split tables
pub const TILE_FILENAME_COLUMN: &str = "tile_filename";

/// Column holding the sample id in the tile manifest
pub const MANIFEST_SAMPLE_COLUMN: &str = "sample_id";

/// One tile and the sample it was cut from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileEntry {
    /// File name inside the tiles directory
    pub tile_filename: String,
    /// Sample id of the source slide
    pub sample_id: String,
}

/// A tile that could not be matched to exactly one metadata row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataMismatch {
    /// File name of the tile
    pub tile_filename: String,
    /// Sample id the tile was attributed to, if any could be derived
    pub sample_id: Option<String>,
}

/// Tiles known to the join, with the filenames that could not be attributed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TileIndex {
    entries: Vec<TileEntry>,
    unresolved: Vec<String>,
}

impl TileIndex {
    /// Index the tiles reported by extraction
    #[must_use]
    pub fn from_tiles(tiles: &[ExtractedTile]) -> Self {
        Self {
            entries: tiles
                .iter()
                .map(|tile| TileEntry {
                    tile_filename: tile.filename.clone(),
                    sample_id: tile.slide_id.clone(),
                })
                .collect(),
            unresolved: Vec::new(),
        }
    }

    /// Read a tile manifest written by [`TileIndex::write_manifest`]
    pub fn from_manifest(path: &Path) -> Result<Self> {
        let batch = read_csv_as_strings(path)?;
        let filenames = string_column(&batch, TILE_FILENAME_COLUMN)?;
        let samples = string_column(&batch, MANIFEST_SAMPLE_COLUMN)?;

        let mut index = Self::default();
        for i in 0..batch.num_rows() {
            let Some(filename) = non_empty_value(filenames, i) else {
                continue;
            };
            match non_empty_value(samples, i) {
                Some(sample_id) => index.entries.push(TileEntry {
                    tile_filename: filename.to_string(),
                    sample_id: sample_id.to_string(),
                }),
                None => index.unresolved.push(filename.to_string()),
            }
        }
        Ok(index)
    }

    /// Index the `.png` tiles of `tiles_dir` by resolving each filename to
    /// the longest known sample id followed by `_`
    pub fn scan(tiles_dir: &Path, known_sample_ids: &[String]) -> Result<Self> {
        let known: FxHashSet<&str> = known_sample_ids.iter().map(String::as_str).collect();
        let files = find_files(tiles_dir, |p| p.extension().is_some_and(|ext| ext == "png"))?;

        let mut index = Self::default();
        for path in files {
            let filename = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            match resolve_sample_id(&filename, &known) {
                Some(sample_id) => index.entries.push(TileEntry {
                    sample_id: sample_id.to_string(),
                    tile_filename: filename,
                }),
                None => index.unresolved.push(filename),
            }
        }
        Ok(index)
    }

    /// Write the index as a `tile_filename,sample_id` CSV
    pub fn write_manifest(&self, path: &Path) -> Result<()> {
        let batch = string_batch(&[
            (
                TILE_FILENAME_COLUMN,
                self.entries
                    .iter()
                    .map(|e| Some(e.tile_filename.as_str()))
                    .collect(),
            ),
            (
                MANIFEST_SAMPLE_COLUMN,
                self.entries.iter().map(|e| Some(e.sample_id.as_str())).collect(),
            ),
        ])?;
        write_csv(path, &batch)
    }

    /// Attributed tiles
    #[must_use]
    pub fn entries(&self) -> &[TileEntry] {
        &self.entries
    }

    /// Filenames without a derivable sample id
    #[must_use]
    pub fn unresolved(&self) -> &[String] {
        &self.unresolved
    }

    /// Number of attributed tiles
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no tile is attributed
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Longest `id` in `known` such that `filename` starts with `{id}_`
fn resolve_sample_id<'a>(filename: &str, known: &FxHashSet<&'a str>) -> Option<&'a str> {
    filename
        .match_indices('_')
        .filter_map(|(i, _)| known.get(&filename[..i]).copied())
        .last()
}

/// Outcome of the join for reporting
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinReport {
    /// Tiles that received a metadata row
    pub joined_tiles: usize,
    /// Tiles without exactly one metadata row
    pub mismatches: Vec<MetadataMismatch>,
    /// Metadata samples that produced no tile
    pub samples_without_tiles: Vec<String>,
}

/// Joined tile table with its report
#[derive(Debug, Clone)]
pub struct JoinedTiles {
    /// Metadata columns followed by `tile_filename`, one row per tile
    pub table: RecordBatch,
    /// What happened during the join
    pub report: JoinReport,
}

/// Attach the metadata row of its sample to every indexed tile
///
/// # Errors
/// Fails when the sample column is missing, when a sample id occurs in more
/// than one metadata row, or when the metadata already has a
/// `tile_filename` column. Tiles without metadata are reported, not fatal.
pub fn join_tiles_with_metadata(
    index: &TileIndex,
    metadata: &RecordBatch,
    sample_column: &str,
) -> Result<JoinedTiles> {
    if metadata.schema().index_of(TILE_FILENAME_COLUMN).is_ok() {
        return Err(TilerError::MetadataError(format!(
            "Metadata already contains a '{TILE_FILENAME_COLUMN}' column"
        )));
    }

    let samples = string_column(metadata, sample_column)?;
    let mut rows_by_sample: FxHashMap<&str, u32> = FxHashMap::default();
    for i in 0..samples.len() {
        let Some(sample_id) = non_empty_value(samples, i) else {
            continue;
        };
        if rows_by_sample.insert(sample_id, i as u32).is_some() {
            return Err(TilerError::MetadataError(format!(
                "Sample id '{sample_id}' appears in more than one metadata row"
            )));
        }
    }

    let mut report = JoinReport {
        mismatches: index
            .unresolved()
            .iter()
            .map(|filename| MetadataMismatch {
                tile_filename: filename.clone(),
                sample_id: None,
            })
            .collect(),
        ..Default::default()
    };

    let mut row_indices = Vec::with_capacity(index.len());
    let mut filenames = Vec::with_capacity(index.len());
    let mut used_samples: FxHashSet<&str> = FxHashSet::default();

    for entry in index.entries() {
        match rows_by_sample.get(entry.sample_id.as_str()) {
            Some(&row) => {
                row_indices.push(row);
                filenames.push(entry.tile_filename.as_str());
                used_samples.insert(entry.sample_id.as_str());
            }
            None => report.mismatches.push(MetadataMismatch {
                tile_filename: entry.tile_filename.clone(),
                sample_id: Some(entry.sample_id.clone()),
            }),
        }
    }

    report.joined_tiles = row_indices.len();
    report.samples_without_tiles = (0..samples.len())
        .filter_map(|i| non_empty_value(samples, i))
        .filter(|id| !used_samples.contains(id))
        .map(str::to_string)
        .collect();

    let take_indices = UInt32Array::from(row_indices);
    let mut columns: Vec<ArrayRef> = metadata
        .columns()
        .iter()
        .map(|col| compute::take(col.as_ref(), &take_indices, None))
        .collect::<arrow::error::Result<_>>()?;
    columns.push(Arc::new(StringArray::from(filenames)));

    let mut fields: Vec<Field> = metadata
        .schema()
        .fields()
        .iter()
        .map(|f| f.as_ref().clone())
        .collect();
    fields.push(Field::new(TILE_FILENAME_COLUMN, DataType::Utf8, false));

    let table = RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)?;

    if report.mismatches.is_empty() {
        info!("Joined {} tiles with metadata", report.joined_tiles);
    } else {
        warn!(
            "Joined {} tiles with metadata; {} tiles have no metadata row",
            report.joined_tiles,
            report.mismatches.len()
        );
        for mismatch in &report.mismatches {
            warn!(
                "No metadata for tile {} (sample {})",
                mismatch.tile_filename,
                mismatch.sample_id.as_deref().unwrap_or("<unknown>")
            );
        }
    }

    Ok(JoinedTiles { table, report })
}
