//! Batch input and result files
//!
//! Batch input is a headed CSV with `reference` and `degraded` columns;
//! other columns are ignored. Results are written as CSV (one row per pair)
//! or as JSON including the per-band similarities.

use crate::batch::BatchEntry;
use crate::loader::AudioInput;
use crate::result::MeasurementResult;
use crate::{Result, VisqolError};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

/// Status written for a successful pair
pub const STATUS_OK: &str = "ok";

/// One row of a batch input file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchPair {
    pub reference: String,
    pub degraded: String,
}

impl BatchPair {
    pub fn inputs(&self) -> (AudioInput, AudioInput) {
        (
            AudioInput::file(&self.reference),
            AudioInput::file(&self.degraded),
        )
    }
}

/// Read reference/degraded pairs, skipping rows with a blank field
pub fn load_batch_csv<P: AsRef<Path>>(path: P) -> Result<Vec<BatchPair>> {
    let path = path.as_ref();
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| VisqolError::Report(format!("{}: {}", path.display(), e)))?;

    let mut pairs = Vec::new();
    for (line, row) in reader.deserialize::<BatchPair>().enumerate() {
        let pair = row.map_err(|e| VisqolError::Report(format!("{}: {}", path.display(), e)))?;
        if pair.reference.is_empty() || pair.degraded.is_empty() {
            debug!("Skipping row {} of {}: blank path", line + 2, path.display());
            continue;
        }
        pairs.push(pair);
    }

    info!("Loaded {} pairs from {}", pairs.len(), path.display());
    Ok(pairs)
}

#[derive(Serialize)]
struct CsvRow<'a> {
    reference: &'a str,
    degraded: &'a str,
    moslqo: Option<f64>,
    vnsim: Option<f64>,
    status: &'a str,
    error: Option<String>,
}

/// Write one row per pair: `reference, degraded, moslqo, vnsim, status,
/// error`. Failed pairs leave the scores empty and put the error kind in
/// `status`.
pub fn write_results_csv<P: AsRef<Path>>(path: P, entries: &[BatchEntry]) -> Result<()> {
    let path = path.as_ref();
    let mut writer = csv::Writer::from_path(path)?;

    for entry in entries {
        let row = match &entry.outcome {
            Ok(result) => CsvRow {
                reference: &entry.reference,
                degraded: &entry.degraded,
                moslqo: Some(result.moslqo()),
                vnsim: Some(result.vnsim()),
                status: STATUS_OK,
                error: None,
            },
            Err(e) => CsvRow {
                reference: &entry.reference,
                degraded: &entry.degraded,
                moslqo: None,
                vnsim: None,
                status: e.kind().as_str(),
                error: Some(e.to_string()),
            },
        };
        writer.serialize(row)?;
    }
    writer.flush()?;

    info!("Wrote {} results to {}", entries.len(), path.display());
    Ok(())
}

#[derive(Serialize)]
struct JsonError {
    kind: &'static str,
    message: String,
}

#[derive(Serialize)]
struct JsonEntry<'a> {
    reference: &'a str,
    degraded: &'a str,
    status: &'static str,
    result: Option<&'a MeasurementResult>,
    error: Option<JsonError>,
}

/// Write every entry, including per-band similarities, as a JSON array
pub fn write_results_json<P: AsRef<Path>>(path: P, entries: &[BatchEntry]) -> Result<()> {
    let path = path.as_ref();
    let rows: Vec<JsonEntry> = entries
        .iter()
        .map(|entry| JsonEntry {
            reference: &entry.reference,
            degraded: &entry.degraded,
            status: match &entry.outcome {
                Ok(_) => STATUS_OK,
                Err(e) => e.kind().as_str(),
            },
            result: entry.result(),
            error: entry.error().map(|e| JsonError {
                kind: e.kind().as_str(),
                message: e.to_string(),
            }),
        })
        .collect();

    let writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(writer, &rows)?;

    info!("Wrote {} results to {}", entries.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BackendKind;
    use crate::config::Mode;

    fn entries() -> Vec<BatchEntry> {
        vec![
            BatchEntry {
                reference: "a_ref.wav".into(),
                degraded: "a_deg.wav".into(),
                outcome: Ok(MeasurementResult::new(
                    4.5,
                    0.95,
                    vec![0.9, 1.0],
                    vec![100.0, 200.0],
                    Some("a_ref.wav".into()),
                    Some("a_deg.wav".into()),
                    BackendKind::HighFidelity,
                    Mode::Audio,
                    3,
                )),
            },
            BatchEntry {
                reference: "b_ref.wav".into(),
                degraded: "b_deg.wav".into(),
                outcome: Err(VisqolError::Decode("bad header".into())),
            },
        ]
    }

    #[test]
    fn test_load_batch_csv_skips_blank_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("batch.csv");
        std::fs::write(
            &path,
            "reference,degraded,note\n\
             ref1.wav,deg1.wav,x\n\
             ,deg2.wav,\n\
             ref3.wav, deg3.wav ,y\n",
        )
        .unwrap();

        let pairs = load_batch_csv(&path).unwrap();
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[1].degraded, "deg3.wav");
        assert_eq!(pairs[0].inputs().0, AudioInput::file("ref1.wav"));
    }

    #[test]
    fn test_load_batch_csv_missing_column() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("batch.csv");
        std::fs::write(&path, "reference,other\nref.wav,x\n").unwrap();
        assert!(matches!(
            load_batch_csv(&path),
            Err(VisqolError::Report(_))
        ));
    }

    #[test]
    fn test_write_results_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.csv");
        write_results_csv(&path, &entries()).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "reference,degraded,moslqo,vnsim,status,error");
        assert_eq!(lines[1], "a_ref.wav,a_deg.wav,4.5,0.95,ok,");
        assert!(lines[2].starts_with("b_ref.wav,b_deg.wav,,,decode,"));
    }

    #[test]
    fn test_write_results_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.json");
        write_results_json(&path, &entries()).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value[0]["status"], "ok");
        assert_eq!(value[0]["result"]["fvnsim"][1], 1.0);
        assert_eq!(value[1]["status"], "decode");
        assert!(value[1]["result"].is_null());
        assert_eq!(value[1]["error"]["kind"], "decode");
    }
}
