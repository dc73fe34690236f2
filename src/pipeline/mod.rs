//! Report ingestion pipeline
//!
//! validate -> collect -> extract -> aggregate, once per invocation. Guards
//! between stages skip a stage when it has no input; only an unwritable
//! working directory, a mail store failure or a failed report write stop
//! the run with an error.

pub mod collector;
pub mod extract;
pub mod report;
pub mod validator;

use crate::error::{ReportError, Result};
use crate::tui::prompts;
use collector::MailStore;
use extract::{DecompressBackend, ExtractSummary};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_REPORT_FILE: &str = "./mtastsreport.csv";

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub working_dir: PathBuf,
    pub report_file: PathBuf,
    /// Skip collection and extraction; aggregate the JSON already on disk
    pub report_only: bool,
    /// Keep archives and JSON files after they are consumed
    pub no_cleanup: bool,
}

#[derive(Debug, Default)]
pub struct AggregateSummary {
    pub parsed: usize,
    pub failed: usize,
    pub rows: usize,
    pub successful_sessions: u64,
    pub failed_sessions: u64,
    pub failure_types: BTreeMap<String, u64>,
}

#[derive(Debug, Default)]
pub struct RunSummary {
    pub collected: usize,
    pub extraction: Option<ExtractSummary>,
    pub archives_removed: usize,
    pub aggregation: Option<AggregateSummary>,
    pub report: Option<PathBuf>,
    pub json_removed: usize,
}

#[derive(Debug)]
pub enum RunOutcome {
    /// The operator dismissed the folder picker
    Cancelled,
    Completed(RunSummary),
}

fn remove_all<'a>(paths: impl IntoIterator<Item = &'a Path>) -> usize {
    let mut removed = 0;
    for path in paths {
        match fs::remove_file(path) {
            Ok(()) => removed += 1,
            Err(e) => prompts::warning(&format!("Could not remove {}: {}", path.display(), e)),
        }
    }
    removed
}

pub async fn run<S: MailStore>(
    options: &RunOptions,
    store: &S,
    backends: &[Box<dyn DecompressBackend>],
) -> Result<RunOutcome> {
    let dir = options.working_dir.as_path();

    if !validator::is_writable(dir) {
        return Err(ReportError::PathNotWritable(dir.to_path_buf()));
    }
    prompts::success(&format!("Working directory {} is writable", dir.display()));

    let mut summary = RunSummary::default();

    if options.report_only {
        prompts::info("Report-only mode: skipping attachment collection and extraction");
    } else {
        let Some(saved) = collector::collect_attachments(store, dir).await? else {
            prompts::warning("No mail folder selected; nothing to do");
            return Ok(RunOutcome::Cancelled);
        };
        summary.collected = saved.len();
        prompts::info(&format!("Saved {} attachment(s)", saved.len()));

        extract_stage(options, backends, &mut summary)?;
    }

    let json_files = report::find_reports(dir)?;
    if json_files.is_empty() {
        prompts::warning(&format!("No JSON report files found in {}", dir.display()));
        return Ok(RunOutcome::Completed(summary));
    }

    let aggregation = report::aggregate(&json_files);
    for (path, reason) in &aggregation.failed {
        prompts::warning(&format!("Skipped {}: {}", path.display(), reason));
    }

    report::write_report(&options.report_file, &aggregation.rows)?;
    prompts::success(&format!(
        "Wrote {} row(s) from {} report(s) to {}",
        aggregation.rows.len(),
        aggregation.parsed.len(),
        options.report_file.display()
    ));

    if !options.no_cleanup {
        summary.json_removed = remove_all(aggregation.parsed.iter().map(PathBuf::as_path));
    }

    summary.aggregation = Some(AggregateSummary {
        parsed: aggregation.parsed.len(),
        failed: aggregation.failed.len(),
        rows: aggregation.rows.len(),
        successful_sessions: aggregation.successful_sessions(),
        failed_sessions: aggregation.failed_sessions(),
        failure_types: aggregation.failure_types,
    });
    summary.report = Some(options.report_file.clone());

    Ok(RunOutcome::Completed(summary))
}

fn extract_stage(
    options: &RunOptions,
    backends: &[Box<dyn DecompressBackend>],
    summary: &mut RunSummary,
) -> Result<()> {
    let dir = options.working_dir.as_path();

    let archives = extract::find_archives(dir)?;
    if archives.is_empty() {
        prompts::warning("No compressed report files found");
        return Ok(());
    }

    let Some(backend) = extract::select_backend(backends) else {
        prompts::error("No decompression backend available (install 7-Zip or build with the gzip-lib feature); skipping extraction");
        return Ok(());
    };
    prompts::info(&format!(
        "Extracting {} archive(s) with {}",
        archives.len(),
        backend.name()
    ));

    let extraction = extract::extract_all(&archives, dir, backend);
    for (path, reason) in &extraction.failed {
        prompts::warning(&format!("Could not extract {}: {}", path.display(), reason));
    }

    if !options.no_cleanup {
        summary.archives_removed =
            remove_all(extraction.extracted.iter().map(|(archive, _)| archive.as_path()));
    }
    summary.extraction = Some(extraction);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::collector::Attachment;
    use super::collector::tests::FakeStore;
    use super::*;
    use tempfile::TempDir;

    const REPORT_R1: &str = r#"{
        "organization-name": "Acme",
        "date-range": {"start-datetime": "2024-03-01T00:00:00Z", "end-datetime": "2024-03-02T00:00:00Z"},
        "contact-info": "tls@acme.example",
        "report-id": "R1",
        "policies": [
            {"policy": {"policy-type": "sts", "policy-string": ["version: STSv1"], "policy-domain": "a.com"},
             "summary": {"total-successful-session-count": 5, "total-failure-session-count": 0}},
            {"policy": {"policy-type": "sts", "policy-domain": "b.com"},
             "summary": {"total-successful-session-count": 2, "total-failure-session-count": 1}}
        ]
    }"#;

    fn options(dir: &Path, report_only: bool, no_cleanup: bool) -> RunOptions {
        RunOptions {
            working_dir: dir.to_path_buf(),
            report_file: dir.join("out.csv"),
            report_only,
            no_cleanup,
        }
    }

    fn names(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    fn completed(outcome: RunOutcome) -> RunSummary {
        match outcome {
            RunOutcome::Completed(summary) => summary,
            RunOutcome::Cancelled => panic!("run was cancelled"),
        }
    }

    #[cfg(feature = "gzip-lib")]
    fn gzip(bytes: &[u8]) -> Vec<u8> {
        use flate2::Compression;
        use flate2::write::GzEncoder;
        use std::io::Write;

        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(bytes).unwrap();
        encoder.finish().unwrap()
    }

    #[cfg(feature = "gzip-lib")]
    fn lib_backend() -> Vec<Box<dyn DecompressBackend>> {
        vec![Box::new(extract::gzip_lib::GzipLibBackend)]
    }

    #[tokio::test]
    async fn test_unwritable_dir_aborts_before_collecting() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("gone");
        let store = FakeStore::with(vec![Attachment {
            file_name: "r.json.gz".into(),
            content: vec![0x1f, 0x8b],
        }]);

        let err = run(&options(&missing, false, false), &store, &[])
            .await
            .unwrap_err();

        assert!(matches!(err, ReportError::PathNotWritable(_)));
        assert_eq!(store.calls.get(), 0);
        assert!(!missing.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_read_only_dir_aborts_before_collecting() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let locked = dir.path().join("locked");
        fs::create_dir(&locked).unwrap();
        fs::write(locked.join("r1.json"), REPORT_R1).unwrap();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o555)).unwrap();

        // root ignores directory permissions
        if fs::write(locked.join("root-check"), b"").is_ok() {
            fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
            return;
        }

        let store = FakeStore::with(Vec::new());
        let err = run(&options(&locked, true, false), &store, &[])
            .await
            .unwrap_err();

        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
        assert!(matches!(err, ReportError::PathNotWritable(_)));
        assert_eq!(store.calls.get(), 0);
        assert_eq!(names(&locked), vec!["r1.json"]);
    }

    #[tokio::test]
    async fn test_cancelled_picker_stops_cleanly() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("old.json"), REPORT_R1).unwrap();
        let store = FakeStore::cancelled();

        let outcome = run(&options(dir.path(), false, false), &store, &[])
            .await
            .unwrap();

        assert!(matches!(outcome, RunOutcome::Cancelled));
        assert_eq!(names(dir.path()), vec!["old.json"]);
    }

    #[tokio::test]
    async fn test_report_only_skips_collection_and_extraction() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("pending.json.gz"), b"not touched").unwrap();
        fs::write(dir.path().join("r1.json"), REPORT_R1).unwrap();
        let store = FakeStore::with(Vec::new());

        let summary = completed(
            run(&options(dir.path(), true, false), &store, &[])
                .await
                .unwrap(),
        );

        assert_eq!(store.calls.get(), 0);
        assert!(summary.extraction.is_none());
        assert_eq!(summary.aggregation.unwrap().rows, 2);
        assert_eq!(names(dir.path()), vec!["out.csv", "pending.json.gz"]);
    }

    #[tokio::test]
    async fn test_end_to_end_report_only() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("r1.json"), REPORT_R1).unwrap();
        let store = FakeStore::with(Vec::new());

        let summary = completed(
            run(&options(dir.path(), true, false), &store, &[])
                .await
                .unwrap(),
        );

        let mut reader = csv::Reader::from_path(dir.path().join("out.csv")).unwrap();
        let records: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(records.len(), 2);
        for record in &records {
            assert_eq!(&record[0], "Acme");
            assert_eq!(&record[4], "R1");
        }
        assert_eq!(&records[0][7], "a.com");
        assert_eq!((&records[0][8], &records[0][9]), ("5", "0"));
        assert_eq!(&records[1][7], "b.com");
        assert_eq!((&records[1][8], &records[1][9]), ("2", "1"));

        assert!(!dir.path().join("r1.json").exists());
        assert_eq!(summary.json_removed, 1);
    }

    #[tokio::test]
    async fn test_malformed_json_is_kept_and_reported() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("good.json"), REPORT_R1).unwrap();
        fs::write(dir.path().join("broken.json"), "{").unwrap();
        let store = FakeStore::with(Vec::new());

        let summary = completed(
            run(&options(dir.path(), true, false), &store, &[])
                .await
                .unwrap(),
        );

        let aggregation = summary.aggregation.unwrap();
        assert_eq!((aggregation.parsed, aggregation.failed), (1, 1));
        assert_eq!(names(dir.path()), vec!["broken.json", "out.csv"]);
    }

    #[tokio::test]
    async fn test_no_json_files_is_not_an_error() {
        let dir = TempDir::new().unwrap();
        let store = FakeStore::with(Vec::new());

        let summary = completed(
            run(&options(dir.path(), false, false), &store, &[])
                .await
                .unwrap(),
        );

        assert_eq!(store.calls.get(), 1);
        assert!(summary.report.is_none());
        assert!(!dir.path().join("out.csv").exists());
    }

    #[tokio::test]
    async fn test_report_write_failure_keeps_json() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("r1.json"), REPORT_R1).unwrap();
        let store = FakeStore::with(Vec::new());
        let mut opts = options(dir.path(), true, false);
        opts.report_file = dir.path().join("no-such-dir").join("out.csv");

        let err = run(&opts, &store, &[]).await.unwrap_err();

        assert!(matches!(err, ReportError::ReportWrite { .. }));
        assert!(dir.path().join("r1.json").exists());
    }

    #[cfg(feature = "gzip-lib")]
    #[tokio::test]
    async fn test_full_run_cleans_up() {
        let dir = TempDir::new().unwrap();
        let store = FakeStore::with(vec![Attachment {
            file_name: "acme!contoso.com!1709251200!1709337600!R1.json.gz".into(),
            content: gzip(REPORT_R1.as_bytes()),
        }]);

        let summary = completed(
            run(&options(dir.path(), false, false), &store, &lib_backend())
                .await
                .unwrap(),
        );

        assert_eq!(summary.collected, 1);
        assert_eq!(summary.archives_removed, 1);
        assert_eq!(summary.json_removed, 1);
        assert_eq!(summary.aggregation.unwrap().rows, 2);
        assert_eq!(names(dir.path()), vec!["out.csv"]);
    }

    #[cfg(feature = "gzip-lib")]
    #[tokio::test]
    async fn test_no_cleanup_keeps_intermediates() {
        let dir = TempDir::new().unwrap();
        let store = FakeStore::with(vec![Attachment {
            file_name: "r1.json.gz".into(),
            content: gzip(REPORT_R1.as_bytes()),
        }]);

        completed(
            run(&options(dir.path(), false, true), &store, &lib_backend())
                .await
                .unwrap(),
        );

        assert_eq!(names(dir.path()), vec!["out.csv", "r1.json", "r1.json.gz"]);
    }

    #[cfg(feature = "gzip-lib")]
    #[tokio::test]
    async fn test_colliding_archive_is_kept() {
        let dir = TempDir::new().unwrap();
        let second = REPORT_R1.replace("\"R1\"", "\"R2\"");
        let store = FakeStore::with(vec![
            Attachment {
                file_name: "r.gz".into(),
                content: gzip(REPORT_R1.as_bytes()),
            },
            Attachment {
                file_name: "r.json.gz".into(),
                content: gzip(second.as_bytes()),
            },
        ]);

        let summary = completed(
            run(&options(dir.path(), false, false), &store, &lib_backend())
                .await
                .unwrap(),
        );

        let extraction = summary.extraction.unwrap();
        assert_eq!(extraction.extracted.len(), 1);
        assert_eq!(extraction.failed.len(), 1);
        assert_eq!(summary.archives_removed, 1);
        assert_eq!(names(dir.path()), vec!["out.csv", "r.json.gz"]);

        let csv = fs::read_to_string(dir.path().join("out.csv")).unwrap();
        assert!(csv.contains(",R1,"));
    }

    #[tokio::test]
    async fn test_no_backend_skips_extraction() {
        let dir = TempDir::new().unwrap();
        let store = FakeStore::with(vec![Attachment {
            file_name: "r1.json.gz".into(),
            content: vec![0x1f, 0x8b, 0x08],
        }]);

        let summary = completed(
            run(&options(dir.path(), false, false), &store, &[])
                .await
                .unwrap(),
        );

        assert!(summary.extraction.is_none());
        assert!(summary.aggregation.is_none());
        assert_eq!(names(dir.path()), vec!["r1.json.gz"]);
    }
}
