//! IO utilities for file operations
//!
//! This module provides utilities for listing input files, reading and writing
//! CSV tables and replacing files atomically.

pub mod csv;

pub use csv::{read_csv_as_strings, write_csv};

use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use itertools::Itertools;

use crate::error::{Result, TilerError};
use crate::utils::logging::{log_operation_complete, log_operation_start, log_warning};

/// Find all files in `dir` accepted by `accept`, sorted by file name
///
/// Sorting keeps every downstream stage independent of directory order.
pub fn find_files<F>(dir: &Path, accept: F) -> Result<Vec<PathBuf>>
where
    F: Fn(&Path) -> bool,
{
    log_operation_start("Searching for files in", dir);
    crate::error::util::validate_directory(dir, "file listing")?;

    let files = fs::read_dir(dir)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<io::Result<Vec<_>>>()?
        .into_iter()
        .filter(|path| path.is_file() && accept(path))
        .sorted_by(|a, b| a.file_name().cmp(&b.file_name()))
        .collect_vec();

    if files.is_empty() {
        log_warning("No matching files found in directory", Some(dir));
    } else {
        log_operation_complete("found", dir, files.len(), None);
    }

    Ok(files)
}

/// A file written through a `.part` sibling and moved into place on commit
///
/// Dropping a `PartFile` without committing leaves the target untouched.
#[derive(Debug)]
pub struct PartFile {
    target: PathBuf,
    tmp: PathBuf,
    writer: BufWriter<fs::File>,
}

impl PartFile {
    /// Start writing the file that will become `path`
    pub fn create(path: &Path) -> Result<Self> {
        let file_name = path
            .file_name()
            .ok_or_else(|| TilerError::config(format!("Not a file path: {}", path.display())))?;
        let mut tmp_name = file_name.to_os_string();
        tmp_name.push(".part");
        let tmp = path.with_file_name(tmp_name);

        let file = fs::File::create(&tmp)?;
        Ok(Self {
            target: path.to_path_buf(),
            tmp,
            writer: BufWriter::new(file),
        })
    }

    /// Flush, sync and rename into place
    pub fn commit(self) -> Result<()> {
        let Self {
            target,
            tmp,
            writer,
        } = self;
        let file = writer.into_inner().map_err(io::IntoInnerError::into_error)?;
        file.sync_all()?;
        drop(file);

        fs::rename(&tmp, &target).map_err(|e| {
            let _ = fs::remove_file(&tmp);
            TilerError::IoError(io::Error::new(
                e.kind(),
                format!("Failed replacing {}: {e}", target.display()),
            ))
        })
    }

    /// Remove the temporary file
    pub fn discard(self) {
        let Self { tmp, writer, .. } = self;
        drop(writer);
        if fs::remove_file(&tmp).is_err() {
            log_warning("Could not remove temporary file", Some(&tmp));
        }
    }
}

impl Write for PartFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.writer.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

/// Write `bytes` to `path` through a temporary sibling and a rename
///
/// Readers never observe a partially written file at `path`.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut file = PartFile::create(path)?;
    file.write_all(bytes)?;
    file.commit()
}
