//! Project-level migration: discover C# sources under a root, plan each
//! file's convertibility, convert the plannable ones with a
//! bounded-parallelism worker pool, and aggregate a summary report.

use super::constructs;
use super::convert::{convert_file, ConversionOutcome, FileConversion};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("I/O error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

const GENERATED_SUFFIXES: &[&str] = &[".g.cs", ".Designer.cs", ".generated.cs"];
const IGNORED_DIR_NAMES: &[&str] = &["obj", "bin"];

/// Above this fraction of unsupported-construct-bearing lines, a file is
/// deemed too dense to attempt automatic conversion at all (plan-level
/// `Skip`). This is deliberately stricter than `convert_file`'s own
/// Success/Partial/Failed threshold (0.5): a file between the two
/// thresholds is still planned `Partial` and attempted, and may come back
/// `Failed` from `convert_file` itself.
const SKIP_DENSITY_THRESHOLD: f64 = 0.8;

fn is_generated(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    GENERATED_SUFFIXES.iter().any(|suffix| name.ends_with(suffix))
}

fn is_ignored_dir(entry: &walkdir::DirEntry) -> bool {
    entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .map(|name| IGNORED_DIR_NAMES.contains(&name))
            .unwrap_or(false)
}

/// Discover every eligible `.cs` file under `root`, skipping generated
/// sources and `obj/`/`bin/` build directories.
pub fn discover_sources(root: &Path) -> Vec<PathBuf> {
    WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| !is_ignored_dir(e))
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| path.extension().and_then(|e| e.to_str()) == Some("cs"))
        .filter(|path| !is_generated(path))
        .collect()
}

// ── Migration plan (§4.6: "a migration plan enumerating per-file
// convertibility (Full, Partial, Skip) with a reason") ──────────────────

/// Per-file convertibility classification produced ahead of conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Convertibility {
    /// No hard-coded-unsupported construct detected; expect a clean
    /// conversion.
    Full,
    /// Some unsupported constructs detected, below the skip threshold;
    /// conversion will be attempted and will emit `MIGRATION-TODO`
    /// markers for the flagged lines.
    Partial,
    /// Conversion will not be attempted at all: the file is unreadable,
    /// empty, or too dense with unsupported constructs to be worth a
    /// best-effort rewrite.
    Skip,
}

/// One entry in a migration plan: a file's convertibility plus the reason
/// behind that classification.
#[derive(Debug, Clone)]
pub struct PlannedFile {
    pub path: PathBuf,
    pub convertibility: Convertibility,
    pub reason: String,
}

/// Classify one already-read file's convertibility. Shared by
/// [`plan_migration`] and `migrate_project`'s own planning step so the two
/// never disagree.
fn classify(path: &Path, text: &str) -> PlannedFile {
    if text.trim().is_empty() {
        return PlannedFile {
            path: path.to_path_buf(),
            convertibility: Convertibility::Skip,
            reason: "empty file, nothing to convert".to_string(),
        };
    }

    let hits = constructs::scan(text);
    let line_count = text.lines().count().max(1);
    let density = hits.len() as f64 / line_count as f64;

    if density > SKIP_DENSITY_THRESHOLD {
        PlannedFile {
            path: path.to_path_buf(),
            convertibility: Convertibility::Skip,
            reason: format!(
                "{} unsupported construct(s) over {} lines, too dense to convert automatically",
                hits.len(),
                line_count
            ),
        }
    } else if hits.is_empty() {
        PlannedFile {
            path: path.to_path_buf(),
            convertibility: Convertibility::Full,
            reason: "no unsupported constructs detected".to_string(),
        }
    } else {
        PlannedFile {
            path: path.to_path_buf(),
            convertibility: Convertibility::Partial,
            reason: format!(
                "{} unsupported construct(s) will emit MIGRATION-TODO markers",
                hits.len()
            ),
        }
    }
}

/// Build a migration plan for every discovered source under `root`,
/// without converting anything. Unreadable files are planned `Skip` with
/// the I/O error as the reason.
pub fn plan_migration(root: &Path) -> Vec<PlannedFile> {
    discover_sources(root)
        .into_iter()
        .map(|path| match std::fs::read_to_string(&path) {
            Ok(text) => classify(&path, &text),
            Err(err) => PlannedFile {
                path,
                convertibility: Convertibility::Skip,
                reason: format!("unreadable: {}", err),
            },
        })
        .collect()
}

// ── Cancellation (§5: "Project migration supports a cancellation signal
// propagated to workers; in-flight tasks complete their current file and
// then stop") ────────────────────────────────────────────────────────────

/// A cooperative cancellation flag shared between a caller and the
/// worker pool. Checked once per file, before that file's conversion
/// starts; a file already being converted always finishes.
#[derive(Debug, Clone, Default)]
pub struct CancellationSignal(Arc<AtomicBool>);

impl CancellationSignal {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone)]
pub struct FileMigrationResult {
    pub path: PathBuf,
    pub conversion: FileConversion,
}

#[derive(Debug, Clone, Default)]
pub struct MigrationReport {
    pub success_count: usize,
    pub partial_count: usize,
    pub failed_count: usize,
    pub skipped_count: usize,
    pub total_issues: usize,
    pub source_lines_total: usize,
    pub source_chars_total: usize,
    pub output_lines_total: usize,
    pub output_chars_total: usize,
}

impl MigrationReport {
    /// Output size over source size; `None` when nothing converted, since
    /// a zero-over-zero ratio isn't meaningful as an "advantage".
    pub fn advantage_ratio(&self) -> Option<f64> {
        if self.source_chars_total == 0 {
            None
        } else {
            Some(self.output_chars_total as f64 / self.source_chars_total as f64)
        }
    }
}

/// Run the full project migration: discover, plan, convert the plannable
/// files (bounded-parallelism via rayon's default thread pool, sized to
/// the logical processor count unless the caller has configured
/// `RAYON_NUM_THREADS`), and aggregate. Equivalent to
/// `migrate_project_cancellable(root, None)`.
pub fn migrate_project(root: &Path) -> Result<(Vec<FileMigrationResult>, MigrationReport), MigrationError> {
    migrate_project_cancellable(root, None)
}

/// Run the full project migration, honoring an optional cancellation
/// signal: once set, files not yet started are counted `skipped` instead
/// of converted. Files already mid-conversion when the signal is set
/// still finish, since the flag is only checked at the start of each
/// file's task.
pub fn migrate_project_cancellable(
    root: &Path,
    cancel: Option<&CancellationSignal>,
) -> Result<(Vec<FileMigrationResult>, MigrationReport), MigrationError> {
    let sources = discover_sources(root);

    let texts: Vec<(PathBuf, Result<String, MigrationError>)> = sources
        .into_iter()
        .map(|path| {
            let text = std::fs::read_to_string(&path).map_err(|source| MigrationError::Io {
                path: path.clone(),
                source,
            });
            (path, text)
        })
        .collect();

    let mut report = MigrationReport::default();
    let mut to_convert: Vec<(PathBuf, String)> = Vec::new();

    for (path, text) in texts {
        let text = match text {
            Ok(text) => text,
            Err(_) => {
                report.skipped_count += 1;
                continue;
            }
        };
        match classify(&path, &text).convertibility {
            Convertibility::Skip => report.skipped_count += 1,
            Convertibility::Full | Convertibility::Partial => to_convert.push((path, text)),
        }
    }

    let planned_count = to_convert.len();
    let results: Vec<FileMigrationResult> = to_convert
        .into_par_iter()
        .filter_map(|(path, text)| {
            if cancel.map(|c| c.is_cancelled()).unwrap_or(false) {
                return None;
            }
            Some(FileMigrationResult {
                conversion: convert_file(&text),
                path,
            })
        })
        .collect();

    // Files dropped by the cancellation check above never ran convert_file;
    // count them as skipped rather than silently losing them from the report.
    report.skipped_count += planned_count - results.len();

    for result in &results {
        match result.conversion.outcome {
            ConversionOutcome::Success => report.success_count += 1,
            ConversionOutcome::Partial => report.partial_count += 1,
            ConversionOutcome::Failed => report.failed_count += 1,
        }
        report.total_issues += result.conversion.issues.len();
        report.source_lines_total += result.conversion.stats.source_lines;
        report.source_chars_total += result.conversion.stats.source_chars;
        report.output_lines_total += result.conversion.stats.output_lines;
        report.output_chars_total += result.conversion.stats.output_chars;
    }

    Ok((results, report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn discover_skips_generated_and_build_dirs() {
        let dir = std::env::temp_dir().join(format!(
            "calor-migration-test-{}",
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(dir.join("obj")).unwrap();
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("Good.cs"), "class Good {}").unwrap();
        fs::write(dir.join("Model.g.cs"), "class Model {}").unwrap();
        fs::write(dir.join("obj").join("Ignored.cs"), "class Ignored {}").unwrap();

        let found = discover_sources(&dir);
        let names: Vec<String> = found
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert!(names.contains(&"Good.cs".to_string()));
        assert!(!names.contains(&"Model.g.cs".to_string()));
        assert!(!names.contains(&"Ignored.cs".to_string()));

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn migrate_project_aggregates_counts() {
        let dir = std::env::temp_dir().join(format!(
            "calor-migration-test2-{}",
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("Clean.cs"), "class Clean {\n  int Add(int a, int b) { return a + b; }\n}\n").unwrap();
        fs::write(
            dir.join("Messy.cs"),
            "bool TryAdd(int a, int b, out int result) { result = a + b; return true; }\n",
        )
        .unwrap();

        let (results, report) = migrate_project(&dir).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(report.success_count + report.partial_count + report.failed_count, 2);
        assert!(report.advantage_ratio().is_some());

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn empty_file_is_planned_and_reported_as_skipped() {
        let dir = std::env::temp_dir().join(format!(
            "calor-migration-test3-{}",
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("Empty.cs"), "   \n\n").unwrap();
        fs::write(dir.join("Clean.cs"), "class Clean {\n  int Add(int a, int b) { return a + b; }\n}\n").unwrap();

        let plan = plan_migration(&dir);
        let empty_entry = plan.iter().find(|p| p.path.ends_with("Empty.cs")).unwrap();
        assert_eq!(empty_entry.convertibility, Convertibility::Skip);
        let clean_entry = plan.iter().find(|p| p.path.ends_with("Clean.cs")).unwrap();
        assert_eq!(clean_entry.convertibility, Convertibility::Full);

        let (results, report) = migrate_project(&dir).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(report.skipped_count, 1);

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn dense_file_is_planned_skip_and_not_converted() {
        let dir = std::env::temp_dir().join(format!(
            "calor-migration-test4-{}",
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        // Every line trips the switch-expression detector: density 1.0,
        // well above SKIP_DENSITY_THRESHOLD.
        let dense_src = "var a switch { 1 => 1, _ => 0 };\n".repeat(10);
        fs::write(dir.join("Dense.cs"), dense_src).unwrap();

        let plan = plan_migration(&dir);
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].convertibility, Convertibility::Skip);

        let (results, report) = migrate_project(&dir).unwrap();
        assert!(results.is_empty());
        assert_eq!(report.skipped_count, 1);

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn cancellation_signal_stops_further_conversion() {
        let dir = std::env::temp_dir().join(format!(
            "calor-migration-test5-{}",
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("A.cs"), "class A {\n  int Add(int a, int b) { return a + b; }\n}\n").unwrap();

        let signal = CancellationSignal::new();
        signal.cancel();
        let (results, report) = migrate_project_cancellable(&dir, Some(&signal)).unwrap();
        assert!(results.is_empty());
        assert_eq!(report.skipped_count, 1);

        fs::remove_dir_all(&dir).unwrap();
    }
}
