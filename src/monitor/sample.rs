use std::{
    collections::{BTreeMap, BTreeSet},
    fs,
    io::Read,
    path::Path,
};

use anyhow::Context;

use crate::api::error::StorageError;

/// Upper bound on rows read from either side of a comparison.
pub const MAX_ROWS: usize = 50_000;

/// Numeric features compared between the reference and the incoming dataset.
pub const TRACKED_FEATURES: &[&str] = &[
    "LIMIT_BAL",
    "AGE",
    "BILL_AMT1",
    "BILL_AMT2",
    "BILL_AMT3",
    "BILL_AMT4",
    "BILL_AMT5",
    "BILL_AMT6",
    "PAY_AMT1",
    "PAY_AMT2",
    "PAY_AMT3",
    "PAY_AMT4",
    "PAY_AMT5",
    "PAY_AMT6",
    "utilization1",
    "payment_ratio1",
    "max_delay",
];

/// Observations of one feature, in file order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NumericSample {
    pub feature: String,
    pub values: Vec<f64>,
}

impl NumericSample {
    pub fn new(feature: impl Into<String>, values: Vec<f64>) -> Self {
        NumericSample {
            feature: feature.into(),
            values,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

fn parse_cell(raw: &str) -> Option<f64> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    raw.parse::<f64>().ok().filter(|value| value.is_finite())
}

/// Reads the requested columns of a CSV document with a header row.
///
/// Every requested column gets an entry; columns absent from the header stay
/// empty. Cells that are empty or not finite numbers are skipped rather than
/// read as zero. At most `max_rows` data rows are consumed.
pub fn load_numeric_columns<R, S>(
    reader: R,
    columns: &[S],
    max_rows: usize,
) -> Result<BTreeMap<String, NumericSample>, StorageError>
where
    R: Read,
    S: AsRef<str>,
{
    let mut samples: BTreeMap<String, NumericSample> = columns
        .iter()
        .map(|column| {
            let name = column.as_ref().to_string();
            (name.clone(), NumericSample::new(name, Vec::new()))
        })
        .collect();

    let mut csv = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
    let headers = csv.headers().context("reading CSV header")?.clone();
    let positions: Vec<(usize, String)> = headers
        .iter()
        .enumerate()
        .map(|(index, name)| (index, name.trim()))
        .filter(|(_, name)| samples.contains_key(*name))
        .map(|(index, name)| (index, name.to_string()))
        .collect();
    if positions.is_empty() {
        return Ok(samples);
    }

    for (row, record) in csv.records().enumerate() {
        if row >= max_rows {
            break;
        }
        let record = record.with_context(|| format!("reading CSV row {}", row + 1))?;
        for (index, name) in &positions {
            let value = record.get(*index).and_then(parse_cell);
            if let (Some(value), Some(sample)) = (value, samples.get_mut(name)) {
                sample.values.push(value);
            }
        }
    }
    Ok(samples)
}

/// Column names from the header row of a CSV document.
pub fn read_header<R: Read>(reader: R) -> Result<Vec<String>, StorageError> {
    let mut csv = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
    let headers = csv.headers().context("reading CSV header")?;
    Ok(headers.iter().map(|name| name.trim().to_string()).collect())
}

/// Columns present in both headers, sorted by name.
pub fn shared_columns(reference: &[String], current: &[String]) -> Vec<String> {
    let current: BTreeSet<&str> = current.iter().map(String::as_str).collect();
    reference
        .iter()
        .filter(|name| !name.is_empty() && current.contains(name.as_str()))
        .cloned()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Reads a feature list stored as a JSON array of column names.
pub fn load_feature_list(path: &Path) -> Result<Vec<String>, StorageError> {
    let body = fs::read(path).with_context(|| format!("reading feature list {}", path.display()))?;
    serde_json::from_slice(&body).with_context(|| format!("parsing feature list {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skips_unparsable_and_missing_columns() {
        let document = "LIMIT_BAL,AGE,SEX\n20000, 24 ,2\nn/a,,1\n90000,inf,2\n";
        let samples =
            load_numeric_columns(document.as_bytes(), &["LIMIT_BAL", "AGE", "max_delay"], MAX_ROWS).unwrap();
        assert_eq!(samples["LIMIT_BAL"].values, vec![20000.0, 90000.0]);
        assert_eq!(samples["AGE"].values, vec![24.0]);
        assert!(samples["max_delay"].is_empty());
        assert!(!samples.contains_key("SEX"));
    }

    #[test]
    fn respects_row_cap() {
        let mut document = String::from("AGE\n");
        for age in 0..100 {
            document.push_str(&format!("{}\n", age));
        }
        let samples = load_numeric_columns(document.as_bytes(), TRACKED_FEATURES, 10).unwrap();
        assert_eq!(samples["AGE"].len(), 10);
        assert_eq!(samples["AGE"].values[9], 9.0);
        assert_eq!(samples.len(), TRACKED_FEATURES.len());
    }

    #[test]
    fn tolerates_short_rows() {
        let document = "AGE,LIMIT_BAL\n30\n40,1000\n";
        let samples = load_numeric_columns(document.as_bytes(), &["AGE", "LIMIT_BAL"], MAX_ROWS).unwrap();
        assert_eq!(samples["AGE"].values, vec![30.0, 40.0]);
        assert_eq!(samples["LIMIT_BAL"].values, vec![1000.0]);
    }

    #[test]
    fn shared_columns_are_sorted_and_deduplicated() {
        let reference = read_header("score, id,age\n1,2,3\n".as_bytes()).unwrap();
        let current = read_header("age,score,extra\n".as_bytes()).unwrap();
        assert_eq!(shared_columns(&reference, &current), vec!["age", "score"]);
        assert!(shared_columns(&reference, &[]).is_empty());
    }

    #[test]
    fn feature_list_is_a_json_array() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("feature_list.json");
        std::fs::write(&path, r#"["AGE", "LIMIT_BAL"]"#).unwrap();
        assert_eq!(load_feature_list(&path).unwrap(), vec!["AGE", "LIMIT_BAL"]);

        std::fs::write(&path, r#"{"features": ["AGE"]}"#).unwrap();
        let error = load_feature_list(&path).unwrap_err();
        assert!(format!("{:#}", error).contains("parsing feature list"), "{:#}", error);
    }

    #[test]
    fn empty_document_has_no_values() {
        let samples = load_numeric_columns("".as_bytes(), &["AGE"], MAX_ROWS).unwrap();
        assert!(samples["AGE"].is_empty());
    }
}
