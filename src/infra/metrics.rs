// ============================================================
// Layer 6 — Metrics Logger
// ============================================================
// Appends every metrics record to `metrics.jsonl` in the output
// directory, one JSON object per line:
//
//   {"step":50,"train_loss":4.1203,"learning_rate":0.0005,"epoch":0}
//   {"step":100,"eval/bleu":3.52,"eval/generation_length":17.4}
//
// The file is opened in append mode on each call, so records
// from earlier runs into the same directory are kept. Each
// record is mirrored at debug level through tracing.

use anyhow::{Context, Result};
use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

use crate::domain::traits::MetricsSink;

pub struct MetricsLogger {
    path: PathBuf,
}

impl MetricsLogger {
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)
            .with_context(|| format!("Cannot create metrics dir '{}'", dir.display()))?;
        Ok(Self { path: dir.join("metrics.jsonl") })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl MetricsSink for MetricsLogger {
    fn log(&mut self, step: usize, metrics: &[(&str, f64)]) -> Result<()> {
        let mut record = serde_json::Map::new();
        record.insert("step".to_string(), step.into());
        for (key, value) in metrics {
            // NaN and infinities have no JSON form; they become null.
            record.insert(key.to_string(), serde_json::json!(value));
        }
        let line = serde_json::Value::Object(record).to_string();

        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Cannot open '{}'", self.path.display()))?;
        writeln!(f, "{line}")?;

        tracing::debug!("metrics {}", line);
        Ok(())
    }
}
