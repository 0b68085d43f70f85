//! Batch Pipeline Module
//! One run: locate files, parse, flatten, aggregate, export tables, render charts.

use crate::charts::{ChartError, ChartPlotter, StaticChartRenderer};
use crate::config::{FieldPolicy, RunConfig};
use crate::data::{
    find_input_files, AggregateTable, DataLoader, FlattenError, Flattener, LoaderError,
};
use crate::export::{ExportError, TableExporter};
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Source directory not found: {0}")]
    SourceDirMissing(PathBuf),
    #[error("Failed to create {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Load(#[from] LoaderError),
    #[error(transparent)]
    Flatten(#[from] FlattenError),
    #[error(transparent)]
    Export(#[from] ExportError),
    #[error(transparent)]
    Chart(#[from] ChartError),
}

/// A file left out of the aggregate, and why.
#[derive(Debug, Clone)]
pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: String,
}

/// What a finished run produced.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub files_found: usize,
    pub files_processed: usize,
    pub skipped: Vec<SkippedFile>,
    pub rows: usize,
    pub users: usize,
    pub csv_path: PathBuf,
    pub json_path: PathBuf,
    pub chart_dir: Option<PathBuf>,
    pub charts: Vec<PathBuf>,
}

impl RunSummary {
    /// Completion lines for the console.
    pub fn log(&self) {
        info!(
            "Done: {} of {} files processed, {} rows, {} users",
            self.files_processed,
            self.files_found,
            self.rows,
            self.users
        );
        if !self.skipped.is_empty() {
            warn!("{} files skipped", self.skipped.len());
        }
        info!("CSV written to {}", self.csv_path.display());
        info!("JSON written to {}", self.json_path.display());
        if let Some(dir) = &self.chart_dir {
            info!("{} charts saved in {}", self.charts.len(), dir.display());
        }
    }
}

/// Run one batch against `config`.
///
/// Invalid JSON is always skipped with a warning. Other per-file problems are
/// skipped under the lenient policy and abort the run under the strict one.
/// Output write failures always abort.
pub fn run(config: &RunConfig) -> Result<RunSummary, PipelineError> {
    if !config.source_dir.is_dir() {
        return Err(PipelineError::SourceDirMissing(config.source_dir.clone()));
    }

    let csv_path = config.csv_path();
    let json_path = config.json_path();

    // Exports of either variant may sit next to the inputs; never read them back in.
    let files = find_input_files(
        &config.source_dir,
        &config.extensions,
        &config.export_paths(),
    );
    info!(
        "Found {} experiment files in {}",
        files.len(),
        config.source_dir.display()
    );

    let mut loader = DataLoader::new();
    let mut flattener = Flattener::new(config.variant, config.policy);
    let mut table = AggregateTable::new();
    let mut skipped = Vec::new();
    let lenient = config.policy == FieldPolicy::Lenient;

    for path in &files {
        let file = match loader.load(path) {
            Ok(file) => file,
            Err(e) if e.is_parse() || lenient => {
                warn!("Skipping {}: {}", path.display(), e);
                skipped.push(SkippedFile {
                    path: path.clone(),
                    reason: e.to_string(),
                });
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        match flattener.flatten(&file) {
            Ok(rows) => {
                info!("{}: {} rows", file.file_name(), rows.len());
                table.extend(rows);
            }
            Err(e) if lenient => {
                warn!("Skipping {}: {}", path.display(), e);
                skipped.push(SkippedFile {
                    path: path.clone(),
                    reason: e.to_string(),
                });
            }
            Err(e) => return Err(e.into()),
        }
    }

    info!(
        "Aggregated {} rows from {} of {} parsed files ({} unreadable)",
        table.len(),
        flattener.files_flattened(),
        loader.loaded_count(),
        loader.rejected_count()
    );

    if table.is_empty() {
        warn!("No rows collected; writing empty tables");
    }

    TableExporter::write_csv(&table, &config.variant.csv_fields(), &csv_path)?;
    TableExporter::write_json(&table, &config.variant.json_fields(), &json_path)?;

    let mut charts = Vec::new();
    if config.render_charts {
        std::fs::create_dir_all(&config.chart_dir).map_err(|source| PipelineError::Io {
            path: config.chart_dir.clone(),
            source,
        })?;

        for plan in ChartPlotter::plan_all(&table, config.variant) {
            let path = StaticChartRenderer::render_to_dir(&plan, &config.chart_dir)?;
            debug!("Chart for {} written to {}", plan.user, path.display());
            charts.push(path);
        }
    }

    Ok(RunSummary {
        files_found: files.len(),
        files_processed: files.len() - skipped.len(),
        skipped,
        rows: table.len(),
        users: table.users().len(),
        csv_path,
        json_path,
        chart_dir: config.render_charts.then(|| config.chart_dir.clone()),
        charts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Variant;
    use serde_json::{json, Value};
    use std::path::Path;
    use tempfile::TempDir;

    fn write(dir: &Path, name: &str, content: &str) {
        std::fs::write(dir.join(name), content).unwrap();
    }

    fn experiment(initials: &str, sizes: &[usize]) -> String {
        let rounds: Vec<Value> = sizes
            .iter()
            .map(|&n| {
                Value::Array(
                    (0..n)
                        .map(|i| {
                            json!({
                                "sliderDissatisfiedSatisfied": format!("{}", 10 * i),
                                "sliderBoredExcited": 50 + i,
                                "time": i,
                                "risk": 0.1,
                                "arrival": true
                            })
                        })
                        .collect(),
                )
            })
            .collect();
        json!({
            "initials": initials,
            "Solution_Experiment_Simulated": {"emotion_value": [60, 40]},
            "History_Experiment_Simulated": rounds
        })
        .to_string()
    }

    fn config(dir: &Path, variant: Variant) -> RunConfig {
        let mut config = RunConfig::for_directory(dir, variant);
        config.render_charts = false;
        config
    }

    fn csv_lines(path: &Path) -> Vec<String> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .filter(|l| !l.is_empty())
            .map(|l| l.to_string())
            .collect()
    }

    #[test]
    fn test_empty_directory_writes_empty_outputs() {
        let dir = TempDir::new().unwrap();
        let mut config = RunConfig::for_directory(dir.path(), Variant::Rich);
        config.render_charts = true;

        let summary = run(&config).unwrap();
        assert_eq!(summary.files_found, 0);
        assert_eq!(summary.rows, 0);
        assert!(summary.charts.is_empty());

        assert_eq!(csv_lines(&summary.csv_path).len(), 1);
        let parsed: Value =
            serde_json::from_str(&std::fs::read_to_string(&summary.json_path).unwrap()).unwrap();
        assert_eq!(parsed, json!([]));

        let chart_files = std::fs::read_dir(&config.chart_dir).unwrap().count();
        assert_eq!(chart_files, 0);
    }

    #[test]
    fn test_invalid_file_is_skipped() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "good.json", &experiment("AB", &[3, 2]));
        write(dir.path(), "broken.json", "{\"initials\": ");

        let summary = run(&config(dir.path(), Variant::Rich)).unwrap();
        assert_eq!(summary.files_found, 2);
        assert_eq!(summary.files_processed, 1);
        assert_eq!(summary.rows, 5);
        assert_eq!(summary.skipped.len(), 1);
        assert!(summary.skipped[0].path.ends_with("broken.json"));
        assert!(summary.skipped[0].reason.contains("broken.json"));

        let lines = csv_lines(&summary.csv_path);
        assert_eq!(lines.len(), 6);
        assert!(lines[1..].iter().all(|l| l.starts_with("AB,")));
    }

    #[test]
    fn test_invalid_json_is_skipped_even_when_strict() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "good.json", &experiment("AB", &[3]));
        write(dir.path(), "broken.json", "not json at all");

        let summary = run(&config(dir.path(), Variant::Simple)).unwrap();
        assert_eq!(summary.rows, 3);
        assert_eq!(summary.skipped.len(), 1);
    }

    #[test]
    fn test_strict_missing_field_aborts_run() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "a.json", &experiment("AB", &[3]));
        write(
            dir.path(),
            "b.json",
            &json!({"initials": "CD", "History_Experiment_Simulated": [[]]}).to_string(),
        );

        let err = run(&config(dir.path(), Variant::Simple)).unwrap_err();
        assert!(matches!(err, PipelineError::Flatten(FlattenError::MissingField { .. })));
    }

    #[test]
    fn test_lenient_wrong_shape_is_skipped() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "a.json", &experiment("AB", &[2]));
        write(dir.path(), "list.json", "[1, 2, 3]");
        write(dir.path(), "z.json", &experiment("ZZ", &[1]));

        let summary = run(&config(dir.path(), Variant::Rich)).unwrap();
        assert_eq!(summary.rows, 3);
        assert_eq!(summary.users, 2);
        assert_eq!(summary.skipped.len(), 1);
        assert!(summary.skipped[0].reason.contains("array"));

        // Skipped files do not consume a global id.
        let parsed: Value =
            serde_json::from_str(&std::fs::read_to_string(&summary.json_path).unwrap()).unwrap();
        let ids: Vec<u64> = parsed
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["global_id"].as_u64().unwrap())
            .collect();
        assert_eq!(ids, vec![0, 0, 1]);
    }

    #[test]
    fn test_row_count_matches_rounds() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "a.json", &experiment("AB", &[3, 5]));
        write(dir.path(), "b.JSON", &experiment("CD", &[4]));

        let rich = run(&config(dir.path(), Variant::Rich)).unwrap();
        assert_eq!(rich.rows, 12);

        let simple = run(&config(dir.path(), Variant::Simple)).unwrap();
        assert_eq!(simple.rows, 7);
        assert!(simple.csv_path.ends_with("historial_con_id_y_ronda.csv"));
    }

    #[test]
    fn test_variants_alternate_in_one_directory() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "a.json", &experiment("AB", &[3, 2]));

        let rich = run(&config(dir.path(), Variant::Rich)).unwrap();
        let simple = run(&config(dir.path(), Variant::Simple)).unwrap();
        let rich_again = run(&config(dir.path(), Variant::Rich)).unwrap();

        assert_eq!((rich.files_found, rich.rows), (1, 5));
        assert_eq!((simple.files_found, simple.rows), (1, 3));
        assert!(simple.skipped.is_empty());
        assert_eq!((rich_again.files_found, rich_again.rows), (1, 5));
        assert!(dir.path().join("rondas_usuarios.json").is_file());
        assert!(dir.path().join("historial_con_id_y_ronda.json").is_file());
    }

    #[test]
    fn test_output_dir_spelled_differently_is_still_excluded() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("graficas")).unwrap();
        write(dir.path(), "a.json", &experiment("AB", &[2]));

        run(&config(dir.path(), Variant::Rich)).unwrap();

        let mut simple = config(dir.path(), Variant::Simple);
        simple.output_dir = dir.path().join("graficas").join("..");
        let simple = run(&simple).unwrap();
        assert_eq!(simple.files_found, 1);
        assert_eq!(simple.rows, 2);
        assert!(dir.path().join("historial_con_id_y_ronda.csv").is_file());
    }

    #[test]
    fn test_rerun_ignores_previous_exports() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "a.json", &experiment("AB", &[2]));

        let first = run(&config(dir.path(), Variant::Simple)).unwrap();
        let second = run(&config(dir.path(), Variant::Simple)).unwrap();
        assert_eq!(first.files_found, 1);
        assert_eq!(second.files_found, 1);
        assert_eq!(second.rows, 2);
    }

    #[test]
    fn test_separate_output_dir() {
        let dir = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        write(dir.path(), "a.json", &experiment("AB", &[2]));

        let mut config = config(dir.path(), Variant::Rich);
        config.output_dir = out.path().to_path_buf();

        let summary = run(&config).unwrap();
        assert!(summary.csv_path.starts_with(out.path()));
        assert!(out.path().join("rondas_usuarios.csv").is_file());
        assert!(out.path().join("rondas_usuarios.json").is_file());
        assert!(!dir.path().join("rondas_usuarios.csv").exists());
    }

    #[test]
    fn test_missing_source_dir() {
        let config = config(Path::new("/tmp/emotion-sliders-no-such-dir"), Variant::Rich);
        assert!(matches!(run(&config), Err(PipelineError::SourceDirMissing(_))));
    }

    #[test]
    #[ignore = "needs a system sans-serif font"]
    fn test_charts_written_per_user() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "a.json", &experiment("AB", &[3, 5]));
        write(dir.path(), "b.json", &experiment("CD", &[2]));

        let mut config = RunConfig::for_directory(dir.path(), Variant::Rich);
        config.render_charts = true;
        let summary = run(&config).unwrap();

        assert_eq!(summary.charts.len(), 2);
        assert!(dir.path().join("graficas").join("AB_rondas.png").is_file());
        assert!(dir.path().join("graficas").join("CD_rondas.png").is_file());
    }
}
