//! Extraction across many files into one table.

use crate::dataset::{DatasetGuard, DatasetOpener};
use crate::error::{ExtractError, Result};
use crate::extract::{ExtractOptions, extract};
use crate::table::{Table, Value};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// What a merge does when one file fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileErrorPolicy {
    /// Stop at the first failing file
    #[default]
    Abort,
    /// Log the failure and continue with the next file
    Skip,
}

/// Entries of `dir` whose extension is `extension`, sorted by name.
///
/// Directory stores such as `a.zarr` match like plain files.
pub fn list_files(dir: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    let extension = extension.trim_start_matches('.');
    let entries = fs::read_dir(dir).map_err(|e| ExtractError::Open {
        path: dir.to_path_buf(),
        source: e.into(),
    })?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| ExtractError::Open {
            path: dir.to_path_buf(),
            source: e.into(),
        })?;
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == extension) {
            files.push(path);
        }
    }

    if files.is_empty() {
        return Err(ExtractError::NoFiles {
            dir: dir.to_path_buf(),
            extension: extension.to_string(),
        });
    }

    files.sort();
    Ok(files)
}

/// File name with its extension removed
pub fn source_id(path: &Path) -> String {
    path.file_stem()
        .or_else(|| path.file_name())
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Extract every file in turn and stack the results.
///
/// Each file is opened, extracted and closed before the next one, and its
/// rows are tagged with [`source_id`] in the leading
/// `options.source_id_column` column.
pub fn extract_many<O: DatasetOpener>(
    opener: &O,
    files: &[PathBuf],
    variables: &[String],
    options: &ExtractOptions,
) -> Result<Table> {
    if files.is_empty() {
        return Err(ExtractError::EmptyBatch);
    }

    let total = files.len();
    let mut tables = Vec::with_capacity(total);
    let mut last_error = None;

    for (i, path) in files.iter().enumerate() {
        info!("[{}/{}] {}", i + 1, total, path.display());

        match extract_file(opener, path, variables, options) {
            Ok(table) => tables.push(table),
            Err(e) => match options.on_file_error {
                FileErrorPolicy::Abort => {
                    return Err(ExtractError::File {
                        path: path.clone(),
                        source: Box::new(e),
                    });
                }
                FileErrorPolicy::Skip => {
                    warn!("skipping '{}': {}", path.display(), e);
                    last_error = Some((path.clone(), e));
                }
            },
        }
    }

    if tables.is_empty() {
        if let Some((path, e)) = last_error {
            return Err(ExtractError::AllFilesFailed {
                count: total,
                path,
                source: Box::new(e),
            });
        }
    }

    Ok(Table::vstack(tables))
}

fn extract_file<O: DatasetOpener>(
    opener: &O,
    path: &Path,
    variables: &[String],
    options: &ExtractOptions,
) -> Result<Table> {
    let guard = DatasetGuard::open(opener, path).map_err(|source| ExtractError::Open {
        path: path.to_path_buf(),
        source,
    })?;

    // The guard closes the dataset if extraction fails
    let mut table = extract(&*guard, variables, options)?;

    let closed_path = guard.path().to_path_buf();
    if let Err(e) = guard.finish() {
        warn!("failed to close '{}': {:#}", closed_path.display(), e);
    }

    table.prepend_column(&options.source_id_column, Value::Text(source_id(path)));
    Ok(table)
}
