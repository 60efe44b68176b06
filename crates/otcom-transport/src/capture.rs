use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::error::Result;

/// Append-only recording of raw device bytes.
///
/// The file is opened when capture is switched on and closed when it is
/// switched off; existing contents are never truncated.
#[derive(Debug)]
pub struct CaptureFile {
    path: PathBuf,
    file: Option<File>,
}

impl CaptureFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            file: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_active(&self) -> bool {
        self.file.is_some()
    }

    /// Start recording. Already active captures are left as they are.
    pub fn start(&mut self) -> Result<()> {
        if self.file.is_none() {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)?;
            info!(path = %self.path.display(), "capture started");
            self.file = Some(file);
        }
        Ok(())
    }

    pub fn stop(&mut self) {
        if let Some(mut file) = self.file.take() {
            let _ = file.flush();
            info!(path = %self.path.display(), "capture stopped");
        }
    }

    /// Switch capture on or off.
    pub fn set_active(&mut self, active: bool) -> Result<()> {
        if active {
            self.start()
        } else {
            self.stop();
            Ok(())
        }
    }

    /// Append bytes if capture is active. A failed write stops the capture
    /// instead of surfacing into the device path.
    pub fn record(&mut self, data: &[u8]) {
        let Some(file) = self.file.as_mut() else {
            return;
        };
        if let Err(err) = file.write_all(data) {
            warn!(path = %self.path.display(), error = %err, "capture write failed, stopping");
            self.file = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "otcom-capture-{}-{}-{}",
            tag,
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("time should be after epoch")
                .as_nanos()
        ))
    }

    #[test]
    fn records_only_while_active() {
        let path = temp_path("toggle");
        let mut capture = CaptureFile::new(&path);

        capture.record(b"dropped");
        capture.start().unwrap();
        capture.record(b"abc");
        capture.stop();
        capture.record(b"dropped");

        assert_eq!(std::fs::read(&path).unwrap(), b"abc");
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn restart_appends() {
        let path = temp_path("append");
        let mut capture = CaptureFile::new(&path);

        capture.set_active(true).unwrap();
        capture.record(b"one");
        capture.set_active(false).unwrap();
        capture.set_active(true).unwrap();
        capture.record(b"two");
        capture.stop();

        assert_eq!(std::fs::read(&path).unwrap(), b"onetwo");
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn start_in_missing_directory_fails() {
        let mut capture = CaptureFile::new("/nonexistent-otcom-dir/capture.bin");
        assert!(capture.start().is_err());
        assert!(!capture.is_active());
    }
}
