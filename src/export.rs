//! Table Exporter Module
//! Writes the aggregate table as CSV (polars) and as a JSON array of records.

use crate::data::{AggregateTable, Field};
use polars::prelude::*;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to build CSV for {path}: {source}")]
    Polars {
        path: PathBuf,
        #[source]
        source: PolarsError,
    },
    #[error("Failed to serialize JSON for {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Writes whole tables in one go. A failed write may leave a truncated file.
pub struct TableExporter;

impl TableExporter {
    /// Write `fields` of every row as CSV with a header line.
    pub fn write_csv(
        table: &AggregateTable,
        fields: &[Field],
        path: &Path,
    ) -> Result<(), ExportError> {
        let polars_err = |source| ExportError::Polars {
            path: path.to_path_buf(),
            source,
        };

        let mut df = table.to_dataframe(fields).map_err(polars_err)?;
        let mut file = Self::create(path)?;

        CsvWriter::new(&mut file)
            .include_header(true)
            .finish(&mut df)
            .map_err(polars_err)?;

        file.flush().map_err(|source| ExportError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Write `fields` of every row as a pretty-printed JSON array of objects.
    pub fn write_json(
        table: &AggregateTable,
        fields: &[Field],
        path: &Path,
    ) -> Result<(), ExportError> {
        let records = table.to_json_records(fields);
        let mut file = Self::create(path)?;

        serde_json::to_writer_pretty(&mut file, &records).map_err(|source| ExportError::Json {
            path: path.to_path_buf(),
            source,
        })?;

        file.flush().map_err(|source| ExportError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    fn create(path: &Path) -> Result<BufWriter<File>, ExportError> {
        let io_err = |source| ExportError::Io {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        File::create(path).map(BufWriter::new).map_err(io_err)
    }
}
