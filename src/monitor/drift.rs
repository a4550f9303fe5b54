use std::{
    collections::BTreeMap,
    fmt,
    fs::File,
    path::{Path, PathBuf},
};

use anyhow::Context;
use tracing::{info, warn};

use crate::{
    api::error::StorageError,
    monitor::{
        psi::{compare_features, PsiConfig, PsiResult},
        report::{DriftReport, REPORT_CONTENT_TYPE},
        sample::{load_numeric_columns, NumericSample, MAX_ROWS},
    },
    pipeline::detector::NewDataCheck,
    timestamp, DatasetPointer, ObjectStore, RunName, Settings,
};

/// Outcome of one drift measurement. `exceeded` is decided afresh every run.
#[derive(Debug, Clone, PartialEq)]
pub struct DriftDecision {
    pub score: f64,
    pub threshold: f64,
    pub exceeded: bool,
    pub report_location: DatasetPointer,
}

/// Strict comparison: a score equal to the threshold does not count as drift.
pub fn exceeds(score: f64, threshold: f64) -> bool {
    score > threshold
}

/// Where the reference distribution comes from, in order of precedence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReferenceSource {
    Local(PathBuf),
    Remote(DatasetPointer),
    Missing,
}

impl ReferenceSource {
    pub fn resolve(local: Option<&Path>, remote: Option<&DatasetPointer>) -> Self {
        match (local, remote) {
            (Some(path), _) if path.is_file() => ReferenceSource::Local(path.to_path_buf()),
            (_, Some(pointer)) => ReferenceSource::Remote(pointer.clone()),
            _ => ReferenceSource::Missing,
        }
    }
}

/// Explains a score that was not measured from both datasets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriftNote {
    Skipped { current: String },
    MissingReference,
    NoCommonFeatures,
}

impl fmt::Display for DriftNote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DriftNote::Skipped { current } => {
                write!(f, "No current dataset found at {}. Drift check skipped.", current)
            }
            DriftNote::MissingReference => f.write_str(
                "Reference dataset is missing. \
                 Provide REFERENCE_S3_URI (e.g. s3://<bucket>/retraining/reference.csv).",
            ),
            DriftNote::NoCommonFeatures => {
                f.write_str("No common numeric features found for drift calculation.")
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct DriftEvaluation {
    pub decision: DriftDecision,
    pub psi: PsiResult,
    pub note: Option<DriftNote>,
    pub reference: ReferenceSource,
}

#[derive(Debug, Clone)]
pub struct DriftEvaluator {
    pub threshold: f64,
    pub features: Vec<String>,
    pub local_reference: Option<PathBuf>,
    pub remote_reference: Option<DatasetPointer>,
    pub psi: PsiConfig,
    pub max_rows: usize,
}

impl DriftEvaluator {
    pub fn from_settings(settings: &Settings) -> Self {
        DriftEvaluator {
            threshold: settings.drift_threshold,
            features: settings.features.clone(),
            local_reference: Some(settings.local_reference.clone()),
            remote_reference: settings.reference_uri.clone(),
            psi: PsiConfig::default(),
            max_rows: MAX_ROWS,
        }
    }

    fn load_reference(
        &self,
        store: &mut dyn ObjectStore,
        source: &ReferenceSource,
    ) -> Result<BTreeMap<String, NumericSample>, StorageError> {
        match source {
            ReferenceSource::Local(path) => {
                info!(path = %path.display(), "using local reference dataset");
                let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
                load_numeric_columns(file, &self.features, self.max_rows)
                    .with_context(|| format!("parsing reference dataset {}", path.display()))
            }
            ReferenceSource::Remote(pointer) => {
                let body = store.get(pointer).with_context(|| format!("downloading {}", pointer))?;
                info!(reference = %pointer, bytes = body.len(), "downloaded reference dataset");
                load_numeric_columns(&body[..], &self.features, self.max_rows)
                    .with_context(|| format!("parsing reference dataset {}", pointer))
            }
            ReferenceSource::Missing => Ok(BTreeMap::new()),
        }
    }

    fn measure(
        &self,
        store: &mut dyn ObjectStore,
        check: &NewDataCheck,
        reference: &ReferenceSource,
    ) -> Result<(PsiResult, Option<DriftNote>), StorageError> {
        if !check.fingerprint.exists {
            let note = DriftNote::Skipped {
                current: check.pointer.uri(),
            };
            info!("{}", note);
            return Ok((PsiResult::default(), Some(note)));
        }
        if *reference == ReferenceSource::Missing {
            let note = DriftNote::MissingReference;
            warn!("{}", note);
            return Ok((PsiResult::default(), Some(note)));
        }

        let reference_samples = self.load_reference(store, reference)?;
        let body = store
            .get(&check.pointer)
            .with_context(|| format!("downloading {}", check.pointer))?;
        info!(current = %check.pointer, bytes = body.len(), "downloaded current dataset");
        let current_samples = load_numeric_columns(&body[..], &self.features, self.max_rows)
            .with_context(|| format!("parsing current dataset {}", check.pointer))?;

        let psi = compare_features(&reference_samples, &current_samples, &self.features, self.psi);
        if !psi.has_signal() {
            let note = DriftNote::NoCommonFeatures;
            warn!("{}", note);
            return Ok((psi, Some(note)));
        }
        if !psi.insufficient.is_empty() {
            warn!(features = ?psi.insufficient, "too little evidence for some features, scored as 0.0");
        }
        Ok((psi, None))
    }

    /// Measures drift for one run and publishes the report to `report_location`.
    ///
    /// A missing current dataset or reference is a degraded run with a zero
    /// score, not a failure; the report is published either way.
    pub fn evaluate(
        &self,
        store: &mut dyn ObjectStore,
        run: &RunName,
        check: &NewDataCheck,
        report_location: &DatasetPointer,
    ) -> Result<DriftEvaluation, StorageError> {
        let reference =
            ReferenceSource::resolve(self.local_reference.as_deref(), self.remote_reference.as_ref());
        let (psi, note) = self.measure(store, check, &reference)?;

        let score = psi.aggregate;
        let exceeded = psi.has_signal() && exceeds(score, self.threshold);
        if psi.has_signal() {
            info!(
                avg_psi = score,
                threshold = self.threshold,
                exceeded,
                features = psi.feature_count,
                "[DRIFT] measured"
            );
        }

        let note_text = note.as_ref().map(ToString::to_string);
        let current_uri = check.pointer.uri();
        let html = DriftReport {
            run: run.as_ref(),
            current_uri: &current_uri,
            score,
            threshold: self.threshold,
            exceeded,
            generated_at: timestamp(),
            note: note_text.as_deref(),
            psi: &psi,
        }
        .render_html();
        store
            .put(report_location, html.as_bytes(), REPORT_CONTENT_TYPE)
            .with_context(|| format!("uploading drift report to {}", report_location))?;
        info!(report = %report_location, "uploaded drift report");

        Ok(DriftEvaluation {
            decision: DriftDecision {
                score,
                threshold: self.threshold,
                exceeded,
                report_location: report_location.clone(),
            },
            psi,
            note,
            reference,
        })
    }
}
