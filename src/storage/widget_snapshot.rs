use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tokio::runtime::{Handle, RuntimeFlavor};

use crate::config::APP_DIR_NAME;
use crate::error::{CostError, Result};
use crate::scheduler::SnapshotSink;
use crate::sources::{CostSnapshot, SourceKind};

const WIDGET_SNAPSHOT_FILENAME: &str = "widget-snapshot.json";

/// What the desktop widget reads; only the latest snapshot is kept
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WidgetSnapshot {
    pub updated_at: String,
    pub source: SourceKind,
    pub snapshot: CostSnapshot,
}

pub fn snapshot_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
        .ok_or_else(|| CostError::Config("Could not determine data directory".into()))?;
    Ok(data_dir.join(APP_DIR_NAME).join(WIDGET_SNAPSHOT_FILENAME))
}

/// Replace the file at `path` with `snapshot`
pub fn write_widget_snapshot(path: &Path, source: SourceKind, snapshot: &CostSnapshot) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let payload = serde_json::to_string_pretty(&WidgetSnapshot {
        updated_at: Utc::now().to_rfc3339(),
        source,
        snapshot: snapshot.clone(),
    })?;

    // Write beside the target then rename so readers never see a partial file
    let staging = path.with_extension("json.tmp");
    fs::write(&staging, payload)?;
    fs::rename(&staging, path)?;
    Ok(())
}

/// `None` when nothing has been written yet
pub fn load_widget_snapshot(path: &Path) -> Result<Option<WidgetSnapshot>> {
    if !path.exists() {
        return Ok(None);
    }
    let contents = fs::read_to_string(path)?;
    Ok(Some(serde_json::from_str(&contents)?))
}

/// Sink that persists every delivered snapshot for the widget
pub struct WidgetSnapshotSink {
    path: PathBuf,
    source: SourceKind,
}

impl WidgetSnapshotSink {
    pub fn new(path: PathBuf, source: SourceKind) -> Self {
        Self { path, source }
    }

    pub fn at_default_location(source: SourceKind) -> Result<Self> {
        Ok(Self::new(snapshot_path()?, source))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Runs blocking file IO, handing the worker's other tasks off first when
/// called from a multi-threaded runtime. Writes stay ordered and complete
/// before `deliver` returns.
fn blocking_io<T>(io: impl FnOnce() -> T) -> T {
    match Handle::try_current().map(|handle| handle.runtime_flavor()) {
        Ok(RuntimeFlavor::MultiThread) => tokio::task::block_in_place(io),
        _ => io(),
    }
}

impl SnapshotSink for WidgetSnapshotSink {
    fn deliver(&self, snapshot: &CostSnapshot) {
        match blocking_io(|| write_widget_snapshot(&self.path, self.source, snapshot)) {
            Ok(()) => tracing::debug!(path = %self.path.display(), "Widget snapshot written"),
            Err(e) => tracing::warn!("Failed to write widget snapshot: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::ServiceCost;

    fn snapshot(total: f64) -> CostSnapshot {
        CostSnapshot::new(
            total,
            vec![ServiceCost {
                name: "AWS WAF".into(),
                cost: total,
                activity_count: 3,
            }],
        )
    }

    #[test]
    fn missing_file_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_widget_snapshot(&dir.path().join("nope.json"))
            .unwrap()
            .is_none());
    }

    #[test]
    fn sink_keeps_only_latest_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("CostBar").join(WIDGET_SNAPSHOT_FILENAME);
        let sink = WidgetSnapshotSink::new(path.clone(), SourceKind::UsageLedger);

        sink.deliver(&snapshot(1.25));
        sink.deliver(&snapshot(2.5));

        let stored = load_widget_snapshot(sink.path()).unwrap().unwrap();
        assert_eq!(stored.source, SourceKind::UsageLedger);
        assert_eq!(stored.snapshot.month_to_date_total(), 2.5);
        assert_eq!(stored.snapshot.top_services().len(), 1);
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn sink_writes_from_a_runtime_worker() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(WIDGET_SNAPSHOT_FILENAME);
        let sink = std::sync::Arc::new(WidgetSnapshotSink::new(path, SourceKind::BillingMetrics));

        let worker = sink.clone();
        tokio::spawn(async move { worker.deliver(&snapshot(4.0)) })
            .await
            .unwrap();

        let stored = load_widget_snapshot(sink.path()).unwrap().unwrap();
        assert_eq!(stored.source, SourceKind::BillingMetrics);
        assert_eq!(stored.snapshot.month_to_date_total(), 4.0);
    }

    #[tokio::test]
    async fn sink_writes_inline_on_a_current_thread_runtime() {
        let dir = tempfile::tempdir().unwrap();
        let sink = WidgetSnapshotSink::new(
            dir.path().join(WIDGET_SNAPSHOT_FILENAME),
            SourceKind::Simulated,
        );
        sink.deliver(&snapshot(0.75));
        let stored = load_widget_snapshot(sink.path()).unwrap().unwrap();
        assert_eq!(stored.snapshot.month_to_date_total(), 0.75);
    }

    #[test]
    fn file_uses_camel_case_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(WIDGET_SNAPSHOT_FILENAME);
        write_widget_snapshot(&path, SourceKind::Simulated, &snapshot(0.5)).unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert!(raw["updatedAt"].is_string());
        assert_eq!(raw["source"], "simulated");
        assert_eq!(raw["snapshot"]["monthToDateTotal"], 0.5);
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(WIDGET_SNAPSHOT_FILENAME);
        fs::write(&path, "{").unwrap();
        assert!(matches!(load_widget_snapshot(&path), Err(CostError::Json(_))));
    }
}
