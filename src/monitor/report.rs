use std::{collections::BTreeMap, fs::File, path::Path};

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    api::error::StorageError,
    monitor::{
        psi::{compare_features, PsiConfig, PsiResult},
        sample::{load_feature_list, load_numeric_columns, read_header, shared_columns, NumericSample, MAX_ROWS},
    },
};

pub const REPORT_CONTENT_TYPE: &str = "text/html; charset=utf-8";

/// Everything shown in the published drift report.
pub struct DriftReport<'a> {
    pub run: &'a str,
    pub current_uri: &'a str,
    pub score: f64,
    pub threshold: f64,
    pub exceeded: bool,
    pub generated_at: DateTime<Utc>,
    pub note: Option<&'a str>,
    pub psi: &'a PsiResult,
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

impl DriftReport<'_> {
    pub fn render_html(&self) -> String {
        let rows: Vec<String> = self
            .psi
            .ranked()
            .into_iter()
            .map(|(feature, value)| format!("<tr><td>{}</td><td>{:.6}</td></tr>", escape(feature), value))
            .collect();
        let note = self
            .note
            .map(|note| format!("<p><b>Note:</b> {}</p>", escape(note)))
            .unwrap_or_default();
        format!(
            r#"<!doctype html>
<html>
  <head>
    <meta charset="utf-8"/>
    <title>Credit Scoring Drift Report</title>
  </head>
  <body>
    <h1>Credit Scoring Drift Report</h1>
    <ul>
      <li><b>run_id</b>: {run}</li>
      <li><b>current</b>: {current}</li>
      <li><b>drift_score (avg PSI)</b>: {score:.6}</li>
      <li><b>threshold</b>: {threshold:.6}</li>
      <li><b>drift_exceeded</b>: {exceeded}</li>
      <li><b>generated_at</b>: {generated_at}</li>
    </ul>
    {note}
    <h2>Per-feature PSI</h2>
    <table border="1" cellpadding="6" cellspacing="0">
      <thead><tr><th>feature</th><th>psi</th></tr></thead>
      <tbody>
        {rows}
      </tbody>
    </table>
  </body>
</html>
"#,
            run = escape(self.run),
            current = escape(self.current_uri),
            score = self.score,
            threshold = self.threshold,
            exceeded = self.exceeded,
            generated_at = self.generated_at.to_rfc3339(),
            note = note,
            rows = rows.join("\n        "),
        )
    }
}

/// Machine readable summary written by the standalone PSI command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PsiSummary {
    pub avg_psi: f64,
    pub bins: usize,
    pub n_features: usize,
    pub per_feature: BTreeMap<String, f64>,
}

impl PsiSummary {
    pub fn new(result: &PsiResult, bins: usize) -> Self {
        PsiSummary {
            avg_psi: result.aggregate,
            bins,
            n_features: result.feature_count,
            per_feature: result.per_feature.clone(),
        }
    }
}

fn open(path: &Path) -> Result<File, StorageError> {
    File::open(path).with_context(|| format!("opening {}", path.display()))
}

fn load_columns(path: &Path, features: &[String]) -> Result<BTreeMap<String, NumericSample>, StorageError> {
    load_numeric_columns(open(path)?, features, MAX_ROWS).with_context(|| format!("parsing {}", path.display()))
}

/// Compares two local CSV files.
///
/// `features` names a JSON array of columns. Without it every column present
/// in both headers is a candidate; columns without numeric values on both
/// sides drop out of the summary.
pub fn summarize_files(
    reference: &Path,
    current: &Path,
    features: Option<&Path>,
    config: PsiConfig,
) -> Result<PsiSummary, StorageError> {
    let features = match features {
        Some(list) => load_feature_list(list)?,
        None => shared_columns(&read_header(open(reference)?)?, &read_header(open(current)?)?),
    };
    info!(features = features.len(), "comparing feature columns");

    let result = compare_features(
        &load_columns(reference, &features)?,
        &load_columns(current, &features)?,
        &features,
        config,
    );
    Ok(PsiSummary::new(&result, config.bins))
}
