//! Data module - experiment file discovery, parsing, flattening and aggregation

mod loader;
mod locator;
mod processor;
pub mod record;
mod table;

pub use loader::{DataLoader, LoaderError};
pub use locator::find_input_files;
pub use processor::{FlattenError, Flattener};
pub use table::{AggregateTable, Field, FlatRow};
