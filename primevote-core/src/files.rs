//! CSV and JSON import/export for the prime set.
//!
//! CSV files hold one integer per line. JSON exports are an object with
//! `primes`, `count` and `exportDate`. Loading is best effort: unparsable
//! lines and non-primes are skipped and counted.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::prime_set::{ImportReport, PrimeSet};

/// Result of loading a CSV file into a [`PrimeSet`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CsvImport {
    pub report: ImportReport,
    /// Non-blank lines that did not parse as an integer.
    pub unparsable: usize,
}

/// On-disk JSON shape of an exported prime set.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrimeExport {
    pub primes: Vec<i64>,
    pub count: usize,
    pub export_date: DateTime<Utc>,
}

impl PrimeExport {
    pub fn from_set(set: &PrimeSet) -> Self {
        let primes = set.snapshot_sorted();
        Self {
            count: primes.len(),
            primes,
            export_date: Utc::now(),
        }
    }
}

/// Input shape accepted by [`import_json`]; `count` and `exportDate` are
/// informational and may be missing.
#[derive(Debug, Deserialize)]
struct PrimeImport {
    primes: Vec<i64>,
    #[serde(default)]
    count: Option<usize>,
}

pub fn load_csv(path: impl AsRef<Path>, set: &PrimeSet) -> Result<CsvImport> {
    let path = path.as_ref();
    let reader = BufReader::new(File::open(path)?);

    let mut values = Vec::new();
    let mut unparsable = 0;
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match trimmed.parse::<i64>() {
            Ok(value) => values.push(value),
            Err(_) => {
                unparsable += 1;
                debug!(target: "primevote::files", path = %path.display(), line = index + 1, "skipping unparsable line");
            }
        }
    }

    let report = set.import(&values);
    if report.rejected > 0 || unparsable > 0 {
        warn!(
            target: "primevote::files",
            path = %path.display(),
            rejected = report.rejected,
            unparsable,
            "some csv entries were skipped"
        );
    }
    info!(target: "primevote::files", path = %path.display(), added = report.added, "loaded primes from csv");

    Ok(CsvImport { report, unparsable })
}

/// Writes `primes` one per line, replacing any existing file.
pub fn write_csv(path: impl AsRef<Path>, primes: &[i64]) -> Result<()> {
    let path = path.as_ref();
    let mut writer = BufWriter::new(File::create(path)?);
    for prime in primes {
        writeln!(writer, "{prime}")?;
    }
    writer.flush()?;
    info!(target: "primevote::files", path = %path.display(), count = primes.len(), "wrote primes to csv");
    Ok(())
}

/// Writes a sorted snapshot of `set` as JSON and returns what was written.
pub fn export_json(path: impl AsRef<Path>, set: &PrimeSet) -> Result<PrimeExport> {
    let path = path.as_ref();
    let export = PrimeExport::from_set(set);
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, &export)?;
    writer.flush()?;
    info!(target: "primevote::files", path = %path.display(), count = export.count, "exported primes to json");
    Ok(export)
}

pub fn import_json(path: impl AsRef<Path>, set: &PrimeSet) -> Result<ImportReport> {
    let path = path.as_ref();
    let reader = BufReader::new(File::open(path)?);
    let parsed: PrimeImport = serde_json::from_reader(reader)?;
    if let Some(count) = parsed.count
        && count != parsed.primes.len()
    {
        warn!(
            target: "primevote::files",
            path = %path.display(),
            declared = count,
            actual = parsed.primes.len(),
            "json count does not match primes array"
        );
    }

    let report = set.import(&parsed.primes);
    info!(
        target: "primevote::files",
        path = %path.display(),
        added = report.added,
        rejected = report.rejected,
        "imported primes from json"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PrimeError;
    use crate::oracle::PrimalityOracle;
    use std::fs;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn empty_set() -> PrimeSet {
        PrimeSet::new(Arc::new(PrimalityOracle::new()))
    }

    #[test]
    fn load_csv_skips_garbage_and_composites() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("primes.csv");
        fs::write(&path, "2\n 3 \n\nfour\n9\n3\n11\n").expect("write");

        let set = empty_set();
        let loaded = load_csv(&path, &set).expect("load");
        assert_eq!(loaded.unparsable, 1);
        assert_eq!(loaded.report.added, 3);
        assert_eq!(loaded.report.duplicates, 1);
        assert_eq!(loaded.report.rejected, 1);
        assert_eq!(set.snapshot_sorted(), vec![2, 3, 11]);
    }

    #[test]
    fn csv_written_then_loaded_matches() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("out.csv");
        write_csv(&path, &[5, 7, 13]).expect("write");
        assert_eq!(fs::read_to_string(&path).expect("read"), "5\n7\n13\n");

        let set = empty_set();
        load_csv(&path, &set).expect("load");
        assert_eq!(set.snapshot_sorted(), vec![5, 7, 13]);
    }

    #[test]
    fn missing_csv_is_an_io_error() {
        let dir = TempDir::new().expect("tempdir");
        let err = load_csv(dir.path().join("absent.csv"), &empty_set()).expect_err("missing");
        assert!(matches!(err, PrimeError::Io(_)));
    }

    #[test]
    fn json_export_uses_camel_case_fields() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("primes.json");
        let set = empty_set();
        set.import(&[17, 2, 5]);

        let export = export_json(&path, &set).expect("export");
        assert_eq!(export.primes, vec![2, 5, 17]);

        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).expect("read")).expect("json");
        assert_eq!(raw["count"], 3);
        assert_eq!(raw["primes"], serde_json::json!([2, 5, 17]));
        assert!(raw["exportDate"].is_string());

        let restored = empty_set();
        let report = import_json(&path, &restored).expect("import");
        assert_eq!(report.added, 3);
        assert_eq!(restored.snapshot_sorted(), vec![2, 5, 17]);
    }

    #[test]
    fn json_import_validates_entries() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("hand.json");
        fs::write(&path, r#"{"primes": [4, 7, 7, 11]}"#).expect("write");

        let set = empty_set();
        let report = import_json(&path, &set).expect("import");
        assert_eq!(report.added, 2);
        assert_eq!(report.rejected, 1);
        assert_eq!(report.duplicates, 1);
        assert_eq!(set.snapshot_sorted(), vec![7, 11]);
    }

    #[test]
    fn malformed_json_is_a_serialization_error() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("bad.json");
        fs::write(&path, "{\"primes\": ").expect("write");
        let err = import_json(&path, &empty_set()).expect_err("malformed");
        assert!(matches!(err, PrimeError::Serialization(_)));
    }
}
