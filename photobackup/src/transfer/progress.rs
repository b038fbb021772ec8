//! Byte-level progress tracking for archive streaming.
//!
//! Renders a carriage-return status line per file and one summary line per
//! folder. Rendering is best effort: write errors on the status surface are
//! ignored so a closed terminal never fails a backup.

use crate::executor::manifest::FileEntry;
use std::io::{self, Write};
use tracing::debug;

const MIB: f64 = 1024.0 * 1024.0;
const GIB: u64 = 1024 * 1024 * 1024;

/// Progress of one folder's archive.
pub struct Progress {
    label: String,
    completed_bytes: u64,
    total_bytes: u64,
    files_done: usize,
    total_files: usize,
    finished: bool,
    output: Box<dyn Write + Send>,
}

impl Progress {
    /// Create a tracker rendering to stderr
    pub fn new(label: impl Into<String>, files: &[FileEntry]) -> Self {
        Self::with_output(label, files, Box::new(io::stderr()))
    }

    /// Create a tracker rendering to an arbitrary sink
    pub fn with_output(
        label: impl Into<String>,
        files: &[FileEntry],
        output: Box<dyn Write + Send>,
    ) -> Self {
        Self {
            label: label.into(),
            completed_bytes: 0,
            total_bytes: files.iter().map(|f| f.size).sum(),
            files_done: 0,
            total_files: files.len(),
            finished: false,
            output,
        }
    }

    /// Create a tracker that renders nothing
    pub fn silent(label: impl Into<String>, files: &[FileEntry]) -> Self {
        Self::with_output(label, files, Box::new(io::sink()))
    }

    /// Integer percentage, 100 when there is nothing to do
    pub fn percent(&self) -> u64 {
        if self.total_bytes == 0 {
            return 100;
        }
        self.completed_bytes.saturating_mul(100) / self.total_bytes
    }

    /// Render the status line for the file about to be archived
    pub fn starting(&mut self, entry: &FileEntry) {
        debug!(
            folder = %self.label,
            file = %entry.relative_path,
            completed = self.completed_bytes,
            total = self.total_bytes,
            "archiving file"
        );

        let line = format!(
            "\r{} - {} {}% ({} / {})",
            self.label,
            entry.relative_path,
            self.percent(),
            format_size(self.completed_bytes),
            format_size(self.total_bytes)
        );
        self.render(&line);
    }

    /// Account for a file whose bytes have been fully written
    pub fn finished(&mut self, entry: &FileEntry) {
        self.completed_bytes += entry.size;
        self.files_done += 1;
    }

    /// Render the summary line. Later calls are ignored.
    pub fn done(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;

        debug!(
            folder = %self.label,
            files = self.files_done,
            bytes = self.completed_bytes,
            "archive complete"
        );

        let line = format!(
            "\r{} - finished, {}\n",
            self.label,
            format_size(self.total_bytes)
        );
        self.render(&line);
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn completed_bytes(&self) -> u64 {
        self.completed_bytes
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    pub fn files_done(&self) -> usize {
        self.files_done
    }

    pub fn total_files(&self) -> usize {
        self.total_files
    }

    pub fn is_done(&self) -> bool {
        self.finished
    }

    fn render(&mut self, line: &str) {
        let _ = self.output.write_all(line.as_bytes());
        let _ = self.output.flush();
    }
}

/// Format bytes as MB below one GiB and GB from there on (binary units)
pub fn format_size(bytes: u64) -> String {
    if bytes < GIB {
        format!("{:.2} MB", bytes as f64 / MIB)
    } else {
        format!("{:.2} GB", bytes as f64 / GIB as f64)
    }
}

/// Format duration as human-readable string
pub fn format_duration(seconds: u64) -> String {
    if seconds < 60 {
        format!("{}s", seconds)
    } else if seconds < 3600 {
        format!("{}m {}s", seconds / 60, seconds % 60)
    } else {
        format!("{}h {}m", seconds / 3600, (seconds % 3600) / 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl SharedBuf {
        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    struct BrokenOutput;

    impl Write for BrokenOutput {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
        }
    }

    fn entry(relative_path: &str, size: u64) -> FileEntry {
        FileEntry {
            path: PathBuf::from(relative_path),
            relative_path: relative_path.to_string(),
            size,
        }
    }

    #[test]
    fn test_status_lines() {
        let files = vec![entry("a.jpg", 3 * 1024 * 1024), entry("b.jpg", 1024 * 1024)];
        let out = SharedBuf::default();
        let mut progress = Progress::with_output("trip", &files, Box::new(out.clone()));

        progress.starting(&files[0]);
        progress.finished(&files[0]);
        progress.starting(&files[1]);
        progress.finished(&files[1]);
        progress.done();

        assert_eq!(
            out.contents(),
            "\rtrip - a.jpg 0% (0.00 MB / 4.00 MB)\
             \rtrip - b.jpg 75% (3.00 MB / 4.00 MB)\
             \rtrip - finished, 4.00 MB\n"
        );
        assert_eq!(progress.files_done(), 2);
        assert_eq!(progress.completed_bytes(), progress.total_bytes());
    }

    #[test]
    fn test_percent_truncates() {
        let files = vec![entry("a", 1), entry("b", 2)];
        let mut progress = Progress::silent("x", &files);
        progress.finished(&files[0]);
        assert_eq!(progress.percent(), 33);
    }

    #[test]
    fn test_zero_total_is_complete() {
        let files = vec![entry("empty.txt", 0)];
        let progress = Progress::silent("x", &files);
        assert_eq!(progress.percent(), 100);

        let progress = Progress::silent("x", &[]);
        assert_eq!(progress.percent(), 100);
        assert_eq!(progress.total_files(), 0);
    }

    #[test]
    fn test_done_renders_once() {
        let out = SharedBuf::default();
        let mut progress = Progress::with_output("x", &[], Box::new(out.clone()));
        progress.done();
        progress.done();

        assert_eq!(out.contents(), "\rx - finished, 0.00 MB\n");
        assert!(progress.is_done());
    }

    #[test]
    fn test_output_errors_are_ignored() {
        let files = vec![entry("a", 10)];
        let mut progress = Progress::with_output("x", &files, Box::new(BrokenOutput));
        progress.starting(&files[0]);
        progress.finished(&files[0]);
        progress.done();
        assert_eq!(progress.percent(), 100);
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(0), "0.00 MB");
        assert_eq!(format_size(512 * 1024), "0.50 MB");
        assert_eq!(format_size(GIB - 1024 * 1024), "1023.00 MB");
        assert_eq!(format_size(GIB), "1.00 GB");
        assert_eq!(format_size(GIB * 5 / 2), "2.50 GB");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(30), "30s");
        assert_eq!(format_duration(90), "1m 30s");
        assert_eq!(format_duration(3665), "1h 1m");
    }
}
