use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use threadloom_config::{DatabaseConfig, ImportConfig};
use threadloom_db::{ArchiveStore, ImportOptions, ImportSummary};
use tracing::{info, warn};
use walkdir::WalkDir;

pub struct ImportReport {
    pub files_imported: usize,
    pub files_already_present: usize,
    pub nodes: usize,
    pub messages: usize,
    pub parts: usize,
    /// (file name, error) for every file that was rolled back.
    pub failures: Vec<(String, String)>,
    pub dry_run: bool,
}

impl ImportReport {
    fn new(dry_run: bool) -> Self {
        Self {
            files_imported: 0,
            files_already_present: 0,
            nodes: 0,
            messages: 0,
            parts: 0,
            failures: Vec::new(),
            dry_run,
        }
    }

    fn record_success(&mut self, summary: &ImportSummary) {
        self.files_imported += 1;
        if !summary.created {
            self.files_already_present += 1;
        }
        self.nodes += summary.nodes;
        self.messages += summary.messages;
        self.parts += summary.parts;
    }

    pub fn files_failed(&self) -> usize {
        self.failures.len()
    }

    pub fn print_summary(&self) {
        let mode = if self.dry_run { " (dry run)" } else { "" };
        println!("Archive Import Report{mode}");
        println!("─────────────────────");
        println!(
            "  Files:    {} imported ({} already present), {} failed",
            self.files_imported,
            self.files_already_present,
            self.files_failed()
        );
        println!(
            "  Rows:     {} nodes, {} messages, {} parts",
            self.nodes, self.messages, self.parts
        );
        if !self.failures.is_empty() {
            println!("  Errors ({}):", self.failures.len());
            for (file, e) in &self.failures {
                println!("    - {file}: {e}");
            }
        }
    }
}

/// Imports every archive under the configured input directory, one transaction per file.
pub struct BatchRunner {
    import: ImportConfig,
    database: DatabaseConfig,
}

impl BatchRunner {
    pub fn new(import: ImportConfig, database: DatabaseConfig) -> Self {
        Self { import, database }
    }

    /// Checks the input directory, opens the database (creating the schema)
    /// and imports all discovered files.
    ///
    /// Only setup failures are returned as errors; per-file failures are
    /// collected in the report.
    pub fn run(&self) -> Result<ImportReport> {
        let files = self.discover()?;

        let mut store = ArchiveStore::open(&self.database.path).with_context(|| {
            format!(
                "failed to open database at {}",
                self.database.path.display()
            )
        })?;

        Ok(self.import_files(&mut store, files))
    }

    pub fn run_with_store(&self, store: &mut ArchiveStore) -> Result<ImportReport> {
        let files = self.discover()?;
        Ok(self.import_files(store, files))
    }

    fn import_files(&self, store: &mut ArchiveStore, files: Vec<PathBuf>) -> ImportReport {
        info!(
            "found {} archive file(s) in {}",
            files.len(),
            self.import.input_dir.display()
        );

        let options = ImportOptions {
            foreign_keys: self.import.foreign_keys,
            dry_run: self.import.dry_run,
        };
        let mut report = ImportReport::new(options.dry_run);

        for path in files {
            let file_name = self.file_name(&path);
            match import_one(store, &path, &file_name, options) {
                Ok(summary) => {
                    println!(
                        "  {} {file_name} ({} nodes, {} messages, {} parts)",
                        action_word(report.dry_run),
                        summary.nodes,
                        summary.messages,
                        summary.parts
                    );
                    report.record_success(&summary);
                }
                Err(e) => {
                    warn!("import of {file_name} rolled back: {e}");
                    println!("  failed {file_name}: {e}");
                    report.failures.push((file_name, e.to_string()));
                }
            }
        }

        report
    }

    /// Archive files under the input directory, sorted by path.
    pub fn discover(&self) -> Result<Vec<PathBuf>> {
        let root = &self.import.input_dir;
        let max_depth = if self.import.recursive { usize::MAX } else { 1 };

        let mut files = Vec::new();
        for entry in WalkDir::new(root)
            .min_depth(1)
            .max_depth(max_depth)
            .sort_by_file_name()
        {
            let entry = entry
                .with_context(|| format!("failed to read input directory {}", root.display()))?;
            // Symlinked archives count; `path().is_file()` follows the link.
            if entry.path().is_file() && self.has_archive_extension(entry.path()) {
                files.push(entry.into_path());
            }
        }

        files.sort();
        Ok(files)
    }

    fn has_archive_extension(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case(&self.import.extension))
    }

    /// Name stored in `conversations.file_name`: the path relative to the input directory.
    fn file_name(&self, path: &Path) -> String {
        path.strip_prefix(&self.import.input_dir)
            .unwrap_or(path)
            .to_string_lossy()
            .to_string()
    }
}

fn import_one(
    store: &mut ArchiveStore,
    path: &Path,
    file_name: &str,
    options: ImportOptions,
) -> threadloom_common::Result<ImportSummary> {
    let contents = std::fs::read_to_string(path)?;
    store.import_file(file_name, &contents, options)
}

fn action_word(dry_run: bool) -> &'static str {
    if dry_run { "would import" } else { "imported" }
}

#[cfg(test)]
mod tests {
    use super::BatchRunner;
    use std::fs;
    use std::path::Path;
    use threadloom_common::ForeignKeyMode;
    use threadloom_config::{DatabaseConfig, ImportConfig};
    use threadloom_db::{ArchiveStore, TableCounts};

    const GOOD: &str = r#"{"title":"T","create_time":1.0,"update_time":2.0,"mapping":{"root":{"parent":null,"message":null},"n1":{"parent":"root","message":{"id":"n1","author":{"role":"user","name":null},"content":{"content_type":"text","parts":["hi"]},"metadata":{"x":1},"status":"finished","end_turn":true,"weight":1.0,"create_time":1.1,"update_time":1.1}}}}"#;

    const OTHER: &str = r#"{"title":"Other","mapping":{"o-root":{"parent":null},"o1":{"parent":"o-root","message":{"author":{"role":"assistant"},"content":{"content_type":"text","parts":["a","b"]}}}}}"#;

    fn runner(dir: &Path) -> BatchRunner {
        let import = ImportConfig {
            input_dir: dir.to_path_buf(),
            ..ImportConfig::default()
        };
        let database = DatabaseConfig {
            path: dir.join("out.db"),
        };
        BatchRunner::new(import, database)
    }

    #[test]
    fn discover_filters_by_extension_and_sorts() {
        let dir = tempfile::tempdir().expect("temp dir");
        fs::write(dir.path().join("b.json"), GOOD).expect("write b");
        fs::write(dir.path().join("a.JSON"), GOOD).expect("write a");
        fs::write(dir.path().join("notes.txt"), "ignore").expect("write txt");
        fs::create_dir(dir.path().join("nested")).expect("mkdir");
        fs::write(dir.path().join("nested").join("c.json"), GOOD).expect("write c");

        let files = runner(dir.path()).discover().expect("discover");
        let names: Vec<String> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.JSON", "b.json"]);
    }

    #[test]
    fn discover_descends_when_recursive() {
        let dir = tempfile::tempdir().expect("temp dir");
        fs::create_dir(dir.path().join("nested")).expect("mkdir");
        fs::write(dir.path().join("nested").join("c.json"), GOOD).expect("write c");

        let mut batch = runner(dir.path());
        batch.import.recursive = true;
        let files = batch.discover().expect("discover");
        assert_eq!(files.len(), 1);
        assert_eq!(batch.file_name(&files[0]), Path::new("nested").join("c.json").to_string_lossy());
    }

    #[test]
    fn discover_fails_for_missing_directory() {
        let dir = tempfile::tempdir().expect("temp dir");
        let batch = runner(&dir.path().join("does-not-exist"));
        assert!(batch.discover().is_err());
    }

    #[test]
    fn bad_file_does_not_block_the_rest() {
        let dir = tempfile::tempdir().expect("temp dir");
        fs::write(dir.path().join("1-good.json"), GOOD).expect("write good");
        fs::write(dir.path().join("2-bad.json"), "{not json").expect("write bad");
        fs::write(dir.path().join("3-nomap.json"), r#"{"title":"x"}"#).expect("write nomap");
        fs::write(dir.path().join("4-other.json"), OTHER).expect("write other");

        let mut store = ArchiveStore::in_memory().expect("store");
        let report = runner(dir.path())
            .run_with_store(&mut store)
            .expect("batch should complete");

        assert_eq!(report.files_imported, 2);
        assert_eq!(report.files_failed(), 2);
        let failed: Vec<&str> = report.failures.iter().map(|(f, _)| f.as_str()).collect();
        assert_eq!(failed, vec!["2-bad.json", "3-nomap.json"]);
        assert_eq!(
            store.counts().expect("counts"),
            TableCounts {
                conversations: 2,
                nodes: 4,
                messages: 2,
                parts: 3,
            }
        );
    }

    #[test]
    fn rerunning_the_batch_changes_nothing() {
        let dir = tempfile::tempdir().expect("temp dir");
        fs::write(dir.path().join("good.json"), GOOD).expect("write good");
        fs::write(dir.path().join("other.json"), OTHER).expect("write other");

        let batch = runner(dir.path());
        let first = batch.run().expect("first run");
        assert_eq!(first.files_already_present, 0);

        let second = batch.run().expect("second run");
        assert_eq!(second.files_imported, 2);
        assert_eq!(second.files_already_present, 2);

        let store = ArchiveStore::open(&dir.path().join("out.db")).expect("reopen");
        assert_eq!(
            store.counts().expect("counts"),
            TableCounts {
                conversations: 2,
                nodes: 4,
                messages: 2,
                parts: 3,
            }
        );
    }

    #[test]
    fn every_table_is_unchanged_after_a_second_run() {
        let dir = tempfile::tempdir().expect("temp dir");
        fs::write(dir.path().join("good.json"), GOOD).expect("write good");
        fs::write(dir.path().join("other.json"), OTHER).expect("write other");
        let batch = runner(dir.path());
        let db_path = dir.path().join("out.db");

        batch.run().expect("first run");
        let first = ArchiveStore::open(&db_path)
            .expect("reopen after first run")
            .counts()
            .expect("counts");

        batch.run().expect("second run");
        let second = ArchiveStore::open(&db_path)
            .expect("reopen after second run")
            .counts()
            .expect("counts");

        assert_eq!(first, second);
    }

    #[test]
    fn missing_input_dir_does_not_create_database() {
        let dir = tempfile::tempdir().expect("temp dir");
        let import = ImportConfig {
            input_dir: dir.path().join("typo"),
            ..ImportConfig::default()
        };
        let db_path = dir.path().join("out.db");
        let batch = BatchRunner::new(
            import,
            DatabaseConfig {
                path: db_path.clone(),
            },
        );

        assert!(batch.run().is_err());
        assert!(!db_path.exists());
    }

    #[cfg(unix)]
    #[test]
    fn discover_includes_symlinked_archives() {
        let exports = tempfile::tempdir().expect("exports dir");
        let target = exports.path().join("conv.json");
        fs::write(&target, GOOD).expect("write target");

        let dir = tempfile::tempdir().expect("input dir");
        std::os::unix::fs::symlink(&target, dir.path().join("conv.json")).expect("symlink");

        let batch = runner(dir.path());
        let files = batch.discover().expect("discover");
        assert_eq!(files.len(), 1);
        assert_eq!(batch.file_name(&files[0]), "conv.json");

        let mut store = ArchiveStore::in_memory().expect("store");
        let report = batch.run_with_store(&mut store).expect("batch");
        assert_eq!(report.files_imported, 1);
        assert_eq!(store.counts().expect("counts").messages, 1);
    }

    #[test]
    fn dry_run_reports_without_writing() {
        let dir = tempfile::tempdir().expect("temp dir");
        fs::write(dir.path().join("good.json"), GOOD).expect("write good");

        let mut batch = runner(dir.path());
        batch.import.dry_run = true;
        batch.import.foreign_keys = ForeignKeyMode::TwoPass;

        let mut store = ArchiveStore::in_memory().expect("store");
        let report = batch.run_with_store(&mut store).expect("dry run");
        assert!(report.dry_run);
        assert_eq!(report.files_imported, 1);
        assert_eq!(report.messages, 1);
        assert_eq!(store.counts().expect("counts"), TableCounts::default());
    }
}
