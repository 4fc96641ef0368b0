//! On-disk state shared with the desktop widget

pub mod widget_snapshot;

pub use widget_snapshot::{
    load_widget_snapshot, snapshot_path, write_widget_snapshot, WidgetSnapshot,
    WidgetSnapshotSink,
};
