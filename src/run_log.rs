//! # Run Log
//!
//! Append-only, timestamped text log of one migration run. Operators use it
//! to trace every row that needs manual follow-up, so each entry carries
//! enough context (contact id, street, e-mail, ...) to find the record.
//!
//! Lines look like `2018-10-02 14:03:11 Waarschuwing Email ... bestaat al`.

use chrono::Local;
use parking_lot::Mutex;
use std::fmt;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    /// Row or record could not be migrated
    Fout,
    /// Skipped or degraded, nothing lost
    Waarschuwing,
    /// Source data unusable as a whole
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Fout => "Fout",
            Severity::Waarschuwing => "Waarschuwing",
            Severity::Error => "Error",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub severity: Severity,
    pub message: String,
}

enum Sink {
    File(File),
    Memory(Vec<LogEntry>),
}

pub struct RunLog {
    sink: Mutex<Sink>,
    path: Option<PathBuf>,
}

impl fmt::Debug for RunLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunLog").field("path", &self.path).finish()
    }
}

impl RunLog {
    /// Open `velt_migration_<YYYYmmddHHMMSS>.log` in `directory`
    pub fn create_in(directory: &Path) -> io::Result<Self> {
        fs::create_dir_all(directory)?;
        let file_name = format!("velt_migration_{}.log", Local::now().format("%Y%m%d%H%M%S"));
        let path = directory.join(file_name);
        let file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)?;
        Ok(Self {
            sink: Mutex::new(Sink::File(file)),
            path: Some(path),
        })
    }

    /// A log that only keeps entries in memory
    pub fn in_memory() -> Self {
        Self {
            sink: Mutex::new(Sink::Memory(Vec::new())),
            path: None,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn log(&self, severity: Severity, message: impl Into<String>) {
        let message = message.into();

        match severity {
            Severity::Waarschuwing => tracing::warn!(severity = %severity, "{}", message),
            Severity::Fout | Severity::Error => tracing::error!(severity = %severity, "{}", message),
        }

        match &mut *self.sink.lock() {
            Sink::File(file) => {
                let line = format_line(&Local::now().format("%Y-%m-%d %H:%M:%S").to_string(), severity, &message);
                // A failing run log must not stop the migration
                if let Err(e) = file.write_all(line.as_bytes()) {
                    tracing::error!(error = %e, "Failed to write run log entry");
                }
            }
            Sink::Memory(entries) => entries.push(LogEntry { severity, message }),
        }
    }

    pub fn error(&self, message: impl Into<String>) {
        self.log(Severity::Fout, message);
    }

    pub fn warning(&self, message: impl Into<String>) {
        self.log(Severity::Waarschuwing, message);
    }

    /// Entries retained by an in-memory log; a file log keeps none
    pub fn entries(&self) -> Vec<LogEntry> {
        match &*self.sink.lock() {
            Sink::Memory(entries) => entries.clone(),
            Sink::File(_) => Vec::new(),
        }
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.entries()
            .iter()
            .filter(|entry| entry.severity == severity)
            .count()
    }

    pub fn contains(&self, severity: Severity, fragment: &str) -> bool {
        self.entries()
            .iter()
            .any(|entry| entry.severity == severity && entry.message.contains(fragment))
    }
}

fn format_line(timestamp: &str, severity: Severity, message: &str) -> String {
    format!("{timestamp} {severity} {message}\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_line_format() {
        assert_eq!(
            format_line("2018-10-02 14:03:11", Severity::Waarschuwing, "Email bestaat al"),
            "2018-10-02 14:03:11 Waarschuwing Email bestaat al\n"
        );
    }

    #[test]
    fn test_file_log_appends_lines() {
        let dir = TempDir::new().unwrap();
        let log = RunLog::create_in(dir.path()).unwrap();
        log.error("Geen contact id voor adres");
        log.warning("Postcode onjuist");

        let path = log.path().unwrap().to_path_buf();
        let file_name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(file_name.starts_with("velt_migration_"));
        assert!(file_name.ends_with(".log"));

        let content = fs::read_to_string(path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with(" Fout Geen contact id voor adres"));
        assert!(lines[1].ends_with(" Waarschuwing Postcode onjuist"));
        assert!(log.entries().is_empty());
        assert_eq!(log.count(Severity::Fout), 0);
    }

    #[test]
    fn test_in_memory_counts() {
        let log = RunLog::in_memory();
        log.error("een");
        log.error("twee");
        log.log(Severity::Error, "drie");
        assert_eq!(log.count(Severity::Fout), 2);
        assert_eq!(log.count(Severity::Error), 1);
        assert!(log.contains(Severity::Fout, "twee"));
        assert!(!log.contains(Severity::Waarschuwing, "twee"));
    }
}
