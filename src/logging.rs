//! Tracing setup with an optional debug log file

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use once_cell::sync::Lazy;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::APP_DIR_NAME;

const LOG_FILENAME: &str = "costbar-debug.log";

static FILE_LOGGING_ENABLED: AtomicBool = AtomicBool::new(false);

static DEBUG_LOG_FILE: Lazy<Option<Arc<Mutex<File>>>> = Lazy::new(|| {
    open_log_file(debug_log_path())
        .or_else(|_| open_log_file(Some(std::env::temp_dir().join(LOG_FILENAME))))
        .ok()
        .map(|file| Arc::new(Mutex::new(file)))
});

/// Install the global subscriber.
///
/// `RUST_LOG` is honored; otherwise the crate logs at info, or debug when
/// `verbose` is set.
pub fn init_logging(verbose: bool, log_to_file: bool) {
    set_file_logging(log_to_file);

    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("costbar_lib={level},costbar={level}")));

    let registry = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr));

    let file_layer = log_to_file.then(|| {
        tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(file_writer())
    });

    if registry.with(file_layer).try_init().is_err() {
        tracing::debug!("Global subscriber already installed");
    }
}

pub fn set_file_logging(enabled: bool) {
    FILE_LOGGING_ENABLED.store(enabled, Ordering::Relaxed);
}

pub fn file_logging_enabled() -> bool {
    FILE_LOGGING_ENABLED.load(Ordering::Relaxed)
}

/// `<data_dir>/CostBar/costbar-debug.log`
pub fn debug_log_path() -> Option<PathBuf> {
    dirs::data_dir().map(|dir| dir.join(APP_DIR_NAME).join(LOG_FILENAME))
}

fn open_log_file(path: Option<PathBuf>) -> io::Result<File> {
    let path =
        path.ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "Missing data directory"))?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}

pub fn file_writer() -> DebugFileWriter {
    DebugFileWriter {
        file: DEBUG_LOG_FILE.clone(),
    }
}

/// Writes to the debug log only while file logging is enabled
#[derive(Clone)]
pub struct DebugFileWriter {
    file: Option<Arc<Mutex<File>>>,
}

impl<'a> MakeWriter<'a> for DebugFileWriter {
    type Writer = DebugFileWriterGuard;

    fn make_writer(&'a self) -> Self::Writer {
        DebugFileWriterGuard {
            file: self.file.clone(),
        }
    }
}

pub struct DebugFileWriterGuard {
    file: Option<Arc<Mutex<File>>>,
}

impl Write for DebugFileWriterGuard {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if !file_logging_enabled() {
            return Ok(buf.len());
        }
        match self.file.as_ref().map(|file| file.lock()) {
            Some(Ok(mut file)) => file.write(buf),
            _ => Ok(buf.len()),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        if !file_logging_enabled() {
            return Ok(());
        }
        match self.file.as_ref().map(|file| file.lock()) {
            Some(Ok(mut file)) => file.flush(),
            _ => Ok(()),
        }
    }
}
