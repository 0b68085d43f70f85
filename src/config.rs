//! Run Configuration Module
//! Command line parsing and the `RunConfig` parameter object passed to the pipeline.

use crate::data::Field;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// Subdirectory of the source directory that receives chart images by default.
pub const DEFAULT_CHART_DIR: &str = "graficas";

/// Which processing form the batch follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Variant {
    /// First round of each file only, per-row ids, target values attached
    Simple,
    /// Every round of every file, per-file ids
    Rich,
}

impl Default for Variant {
    fn default() -> Self {
        Variant::Rich
    }
}

impl Variant {
    pub const ALL: [Variant; 2] = [Variant::Simple, Variant::Rich];

    /// File stem shared by the CSV and JSON exports.
    pub fn table_stem(self) -> &'static str {
        match self {
            Variant::Simple => "historial_con_id_y_ronda",
            Variant::Rich => "rondas_usuarios",
        }
    }

    /// Suffix of the per-user chart file name (`<user>_<suffix>.png`).
    pub fn chart_suffix(self) -> &'static str {
        match self {
            Variant::Simple => "sliders",
            Variant::Rich => "rondas",
        }
    }

    /// Chart size in pixels.
    pub fn chart_size(self) -> (u32, u32) {
        match self {
            Variant::Simple => (800, 400),
            Variant::Rich => (1000, 500),
        }
    }

    pub fn default_policy(self) -> FieldPolicy {
        match self {
            Variant::Simple => FieldPolicy::Strict,
            Variant::Rich => FieldPolicy::Lenient,
        }
    }

    /// Columns written to the CSV export, in order.
    pub fn csv_fields(self) -> Vec<Field> {
        match self {
            Variant::Simple => vec![
                Field::User,
                Field::Round,
                Field::Iteration,
                Field::Valence,
                Field::Arousal,
                Field::Time,
                Field::Risk,
                Field::Arrival,
                Field::TargetValence,
                Field::TargetArousal,
                Field::SourceFile,
                Field::GlobalId,
            ],
            Variant::Rich => vec![
                Field::User,
                Field::Round,
                Field::Iteration,
                Field::Valence,
                Field::Arousal,
                Field::Time,
                Field::Risk,
                Field::Arrival,
                Field::GlobalId,
                Field::RowId,
            ],
        }
    }

    /// Columns written to the JSON export. The rich form drops the passthrough fields.
    pub fn json_fields(self) -> Vec<Field> {
        match self {
            Variant::Simple => self.csv_fields(),
            Variant::Rich => self
                .csv_fields()
                .into_iter()
                .filter(|f| !f.is_passthrough())
                .collect(),
        }
    }
}

/// How missing or malformed fields are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FieldPolicy {
    /// Any missing field, bad number or bad shape aborts the run
    Strict,
    /// Bad numbers become missing values, bad files are skipped with a warning
    Lenient,
}

/// Flatten emotion-rating experiment files into tables and slider charts
#[derive(Parser, Debug, Clone)]
#[command(
    name = "emotion-sliders",
    about = "Flatten emotion-rating experiment files into tables and slider charts",
    version
)]
pub struct Cli {
    /// Directory containing the experiment JSON files
    #[arg(env = "SLIDERS_SOURCE_DIR")]
    pub source_dir: PathBuf,

    /// Directory for the CSV/JSON tables (defaults to the source directory)
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// Directory for chart images (defaults to <source_dir>/graficas)
    #[arg(long)]
    pub chart_dir: Option<PathBuf>,

    /// File extension to pick up, case-insensitive (repeatable)
    #[arg(long = "extension", default_value = "json")]
    pub extensions: Vec<String>,

    /// Processing form
    #[arg(long, value_enum, default_value_t = Variant::Rich)]
    pub variant: Variant,

    /// Field policy (defaults to strict for simple, lenient for rich)
    #[arg(long, value_enum)]
    pub policy: Option<FieldPolicy>,

    /// Skip chart rendering
    #[arg(long)]
    pub no_charts: bool,

    /// Logging level
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

impl Cli {
    /// Resolve defaults into the parameter object used by the pipeline.
    pub fn into_run_config(self) -> RunConfig {
        let mut config = RunConfig::for_directory(self.source_dir, self.variant);
        if let Some(dir) = self.output_dir {
            config.output_dir = dir;
        }
        if let Some(dir) = self.chart_dir {
            config.chart_dir = dir;
        }
        if let Some(policy) = self.policy {
            config.policy = policy;
        }
        config.extensions = normalize_extensions(&self.extensions);
        config.render_charts = !self.no_charts;
        config
    }
}

/// Everything a batch run needs, independent of how it was obtained.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub source_dir: PathBuf,
    pub output_dir: PathBuf,
    pub chart_dir: PathBuf,
    pub extensions: Vec<String>,
    pub variant: Variant,
    pub policy: FieldPolicy,
    pub render_charts: bool,
}

impl RunConfig {
    /// Configuration with every output placed under `source_dir`.
    pub fn for_directory(source_dir: impl Into<PathBuf>, variant: Variant) -> Self {
        let source_dir = source_dir.into();
        Self {
            output_dir: source_dir.clone(),
            chart_dir: source_dir.join(DEFAULT_CHART_DIR),
            source_dir,
            extensions: vec!["json".to_string()],
            variant,
            policy: variant.default_policy(),
            render_charts: true,
        }
    }

    pub fn csv_path(&self) -> PathBuf {
        self.output_dir.join(format!("{}.csv", self.variant.table_stem()))
    }

    pub fn json_path(&self) -> PathBuf {
        self.output_dir.join(format!("{}.json", self.variant.table_stem()))
    }

    /// Table exports of every variant under `output_dir`.
    pub fn export_paths(&self) -> Vec<PathBuf> {
        Variant::ALL
            .iter()
            .flat_map(|variant| {
                let stem = variant.table_stem();
                [
                    self.output_dir.join(format!("{}.csv", stem)),
                    self.output_dir.join(format!("{}.json", stem)),
                ]
            })
            .collect()
    }
}

/// Lowercase, strip leading dots and drop empty entries.
fn normalize_extensions(extensions: &[String]) -> Vec<String> {
    extensions
        .iter()
        .map(|e| e.trim().trim_start_matches('.').to_lowercase())
        .filter(|e| !e.is_empty())
        .collect()
}
