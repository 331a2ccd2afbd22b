//! Utility functions for error handling
//!
//! This module provides helpers that turn filesystem failures into errors
//! carrying the path and the purpose of the operation.

use std::fs;
use std::io;
use std::path::Path;

use crate::error::{Result, TilerError};

/// Safely open a file with rich error information
///
/// # Arguments
/// * `path` - The path to the file to open
/// * `purpose` - Why the file is being opened (for error context)
pub fn safe_open_file(path: &Path, purpose: &str) -> Result<fs::File> {
    if !path.exists() {
        return Err(TilerError::config(format!(
            "File not found: {} (needed for: {purpose})",
            path.display()
        )));
    }

    if !path.is_file() {
        return Err(TilerError::config(format!(
            "Path is not a file: {} (expected a file for: {purpose})",
            path.display()
        )));
    }

    fs::File::open(path).map_err(|e| {
        let context = match e.kind() {
            io::ErrorKind::PermissionDenied => "Permission denied - check file permissions",
            _ => "Failed to open file",
        };
        TilerError::IoError(io::Error::new(
            e.kind(),
            format!("{context}: {} ({purpose}): {e}", path.display()),
        ))
    })
}

/// Check if a directory exists and is readable, with rich error information
pub fn validate_directory(path: &Path, purpose: &str) -> Result<()> {
    if !path.exists() {
        return Err(TilerError::config(format!(
            "Directory not found: {} (needed for: {purpose})",
            path.display()
        )));
    }

    if !path.is_dir() {
        return Err(TilerError::config(format!(
            "Path is not a directory: {} (expected a directory for: {purpose})",
            path.display()
        )));
    }

    match fs::read_dir(path) {
        Ok(_) => Ok(()),
        Err(e) => {
            let context = match e.kind() {
                io::ErrorKind::PermissionDenied => {
                    "Permission denied - check directory permissions"
                }
                _ => "Failed to access directory",
            };
            Err(TilerError::IoError(io::Error::new(
                e.kind(),
                format!("{context}: {} ({purpose}): {e}", path.display()),
            )))
        }
    }
}

/// Create a directory (and its parents) if needed and verify it is writable
pub fn ensure_directory(path: &Path, purpose: &str) -> Result<()> {
    fs::create_dir_all(path).map_err(|e| {
        TilerError::IoError(io::Error::new(
            e.kind(),
            format!(
                "Failed to create directory {} ({purpose}): {e}",
                path.display()
            ),
        ))
    })?;

    let metadata = fs::metadata(path)?;
    if metadata.permissions().readonly() {
        return Err(TilerError::IoError(io::Error::new(
            io::ErrorKind::PermissionDenied,
            format!("Directory is not writable: {} ({purpose})", path.display()),
        )));
    }

    validate_directory(path, purpose)
}
