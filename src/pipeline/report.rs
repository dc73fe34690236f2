//! TLS-RPT report aggregation
//!
//! Parses RFC 8460 JSON reports and flattens every policy entry into one CSV
//! row carrying the report-level fields alongside it.

use super::extract::files_with_extension;
use crate::error::{ReportError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Joins `policy-string` lines into one CSV cell
pub const POLICY_STRING_SEPARATOR: &str = " , ";

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct TlsReportDocument {
    pub organization_name: String,
    pub date_range: DateRange,
    #[serde(default)]
    pub contact_info: Option<String>,
    pub report_id: String,
    pub policies: Vec<PolicyRecord>,
}

/// Timestamps are carried exactly as the reporter wrote them
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct DateRange {
    pub start_datetime: String,
    pub end_datetime: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct PolicyRecord {
    pub policy: PolicyDescriptor,
    pub summary: Summary,
    /// Kept loose so a malformed entry can't reject the whole report
    #[serde(default)]
    pub failure_details: Vec<serde_json::Value>,
}

impl PolicyRecord {
    /// Failure details that carry a usable `result-type`; others are skipped
    pub fn failures(&self) -> impl Iterator<Item = FailureDetail> + '_ {
        self.failure_details
            .iter()
            .filter_map(|value| FailureDetail::deserialize(value).ok())
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct PolicyDescriptor {
    pub policy_type: PolicyType,
    #[serde(default)]
    pub policy_string: Vec<String>,
    pub policy_domain: String,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum PolicyType {
    Sts,
    Tlsa,
    NoPolicyFound,
}

impl fmt::Display for PolicyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Sts => "sts",
            Self::Tlsa => "tlsa",
            Self::NoPolicyFound => "no-policy-found",
        };
        write!(f, "{label}")
    }
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct Summary {
    pub total_successful_session_count: u64,
    pub total_failure_session_count: u64,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct FailureDetail {
    pub result_type: String,
    #[serde(default)]
    pub failed_session_count: u64,
}

/// One CSV row: report-level fields joined with a single policy entry
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct ReportRow {
    pub organization_name: String,
    pub start_datetime: String,
    pub end_datetime: String,
    pub contact_info: String,
    pub report_id: String,
    pub policy_type: String,
    pub policy_string: String,
    pub policy_domain: String,
    pub total_successful_session_count: u64,
    pub total_failure_session_count: u64,
}

impl ReportRow {
    /// Column order of the CSV file; must match the field order above
    pub const HEADERS: [&'static str; 10] = [
        "organization-name",
        "start-datetime",
        "end-datetime",
        "contact-info",
        "report-id",
        "policy-type",
        "policy-string",
        "policy-domain",
        "total-successful-session-count",
        "total-failure-session-count",
    ];
}

impl TlsReportDocument {
    pub fn parse(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }

    /// One row per policy entry; a report without policies yields nothing
    pub fn rows(&self) -> Vec<ReportRow> {
        let start = &self.date_range.start_datetime;
        let end = &self.date_range.end_datetime;
        let contact = self.contact_info.clone().unwrap_or_default();

        self.policies
            .iter()
            .map(|record| ReportRow {
                organization_name: self.organization_name.clone(),
                start_datetime: start.clone(),
                end_datetime: end.clone(),
                contact_info: contact.clone(),
                report_id: self.report_id.clone(),
                policy_type: record.policy.policy_type.to_string(),
                policy_string: record.policy.policy_string.join(POLICY_STRING_SEPARATOR),
                policy_domain: record.policy.policy_domain.clone(),
                total_successful_session_count: record.summary.total_successful_session_count,
                total_failure_session_count: record.summary.total_failure_session_count,
            })
            .collect()
    }
}

pub fn find_reports(dir: &Path) -> Result<Vec<PathBuf>> {
    files_with_extension(dir, ".json")
}

#[derive(Debug, Default)]
pub struct Aggregation {
    pub rows: Vec<ReportRow>,
    /// Documents that parsed, whether or not they produced rows
    pub parsed: Vec<PathBuf>,
    pub failed: Vec<(PathBuf, String)>,
    /// Failed sessions per `result-type` across all parsed reports
    pub failure_types: BTreeMap<String, u64>,
}

impl Aggregation {
    pub fn successful_sessions(&self) -> u64 {
        self.rows
            .iter()
            .map(|r| r.total_successful_session_count)
            .fold(0, u64::saturating_add)
    }

    pub fn failed_sessions(&self) -> u64 {
        self.rows
            .iter()
            .map(|r| r.total_failure_session_count)
            .fold(0, u64::saturating_add)
    }
}

fn load(path: &Path) -> Result<TlsReportDocument> {
    let bytes = fs::read(path)?;
    TlsReportDocument::parse(&bytes).map_err(|source| ReportError::ParseError {
        file: path.to_path_buf(),
        source,
    })
}

/// Parse every file in order and concatenate their rows. A file that cannot
/// be read or parsed is recorded in `failed` and skipped.
pub fn aggregate(files: &[PathBuf]) -> Aggregation {
    let mut aggregation = Aggregation::default();

    for path in files {
        match load(path) {
            Ok(document) => {
                let rows = document.rows();
                if rows.is_empty() {
                    tracing::debug!(
                        "Report {} ({}) has no policies; no rows",
                        document.report_id,
                        path.display()
                    );
                }
                for detail in document.policies.iter().flat_map(PolicyRecord::failures) {
                    let tally = aggregation.failure_types.entry(detail.result_type).or_default();
                    *tally = tally.saturating_add(detail.failed_session_count);
                }
                aggregation.rows.extend(rows);
                aggregation.parsed.push(path.clone());
            }
            Err(e) => {
                tracing::warn!("Skipping {}: {}", path.display(), e);
                aggregation.failed.push((path.clone(), e.to_string()));
            }
        }
    }

    aggregation
}

/// Write `rows` as CSV with a header row, even when there are no rows
pub fn write_report(path: &Path, rows: &[ReportRow]) -> Result<()> {
    let wrap = |source: csv::Error| ReportError::ReportWrite {
        path: path.to_path_buf(),
        source,
    };

    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)
        .map_err(wrap)?;

    writer.write_record(ReportRow::HEADERS).map_err(wrap)?;
    for row in rows {
        writer.serialize(row).map_err(wrap)?;
    }
    writer.flush().map_err(|e| wrap(e.into()))?;

    Ok(())
}
