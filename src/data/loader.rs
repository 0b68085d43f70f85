//! Experiment File Loader Module
//! Reads one experiment file and parses it as JSON.

use crate::data::record::InputFile;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{path} is not valid JSON: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl LoaderError {
    /// Syntax errors never abort a batch; the file is just skipped.
    pub fn is_parse(&self) -> bool {
        matches!(self, LoaderError::Parse { .. })
    }
}

/// Loads experiment files and counts what went through.
pub struct DataLoader {
    loaded: usize,
    rejected: usize,
}

impl Default for DataLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl DataLoader {
    pub fn new() -> Self {
        Self {
            loaded: 0,
            rejected: 0,
        }
    }

    /// Read and parse a single file.
    pub fn load(&mut self, path: &Path) -> Result<InputFile, LoaderError> {
        let result = Self::read_json(path);
        match &result {
            Ok(_) => self.loaded += 1,
            Err(_) => self.rejected += 1,
        }
        result
    }

    fn read_json(path: &Path) -> Result<InputFile, LoaderError> {
        let text = std::fs::read_to_string(path).map_err(|source| LoaderError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let content = serde_json::from_str(&text).map_err(|source| LoaderError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        Ok(InputFile::new(path, content))
    }

    /// Number of files parsed successfully.
    pub fn loaded_count(&self) -> usize {
        self.loaded
    }

    /// Number of files that could not be read or parsed.
    pub fn rejected_count(&self) -> usize {
        self.rejected
    }
}
