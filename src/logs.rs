//! Daily log files, kept for [`LOG_RETENTION_DAYS`] days.

use chrono::{Days, NaiveDate};
use log::debug;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// How many days of log files are kept, today included.
pub const LOG_RETENTION_DAYS: u64 = 7;

const PREFIX: &str = "tubegrab-";
const SUFFIX: &str = ".log";

/// `<dir>/tubegrab-<yyyy-mm-dd>.log`.
pub fn log_file_path(dir: &Path, day: NaiveDate) -> PathBuf {
    dir.join(format!("{}{}{}", PREFIX, day.format("%Y-%m-%d"), SUFFIX))
}

/// Opens the log file of `day` for appending, after pruning files past retention.
pub fn open_daily(dir: &Path, day: NaiveDate) -> io::Result<File> {
    fs::create_dir_all(dir)?;
    prune(dir, day)?;

    OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file_path(dir, day))
}

/// Removes the log files older than [`LOG_RETENTION_DAYS`] days before `today`.
///
/// Files not named like a daily log are left alone. Returns how many files were removed.
pub fn prune(dir: &Path, today: NaiveDate) -> io::Result<usize> {
    let Some(oldest_kept) = today.checked_sub_days(Days::new(LOG_RETENTION_DAYS - 1)) else {
        return Ok(0);
    };

    let mut removed = 0;
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let Some(day) = path
            .file_name()
            .and_then(|name| name.to_str())
            .and_then(|name| name.strip_prefix(PREFIX)?.strip_suffix(SUFFIX))
            .and_then(|date| NaiveDate::parse_from_str(date, "%Y-%m-%d").ok())
        else {
            continue;
        };

        if day < oldest_kept {
            fs::remove_file(&path)?;
            debug!("Removed old log file {:?}", path);
            removed += 1;
        }
    }

    Ok(removed)
}

/// Writes everything to two writers.
pub struct Tee<A, B> {
    first: A,
    second: B,
}

impl<A: Write, B: Write> Tee<A, B> {
    /// Duplicates writes to `first`, then `second`.
    pub fn new(first: A, second: B) -> Self {
        Self { first, second }
    }
}

impl<A: Write, B: Write> Write for Tee<A, B> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.first.write_all(buf)?;
        self.second.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.first.flush()?;
        self.second.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(text: &str) -> NaiveDate {
        NaiveDate::parse_from_str(text, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn only_the_last_week_of_logs_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        let today = day("2026-03-10");
        for date in ["2026-03-01", "2026-03-03", "2026-03-04", "2026-03-09"] {
            fs::write(log_file_path(dir.path(), day(date)), "old").unwrap();
        }
        fs::write(dir.path().join("notes.log"), "keep").unwrap();

        let file = open_daily(dir.path(), today).unwrap();
        drop(file);

        let mut names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().into_string().unwrap())
            .collect();
        names.sort();
        assert_eq!(
            names,
            vec![
                "notes.log",
                "tubegrab-2026-03-04.log",
                "tubegrab-2026-03-09.log",
                "tubegrab-2026-03-10.log",
            ]
        );
    }

    #[test]
    fn reopening_appends() {
        let dir = tempfile::tempdir().unwrap();
        let today = day("2026-03-10");

        writeln!(open_daily(dir.path(), today).unwrap(), "first").unwrap();
        writeln!(open_daily(dir.path(), today).unwrap(), "second").unwrap();

        let content = fs::read_to_string(log_file_path(dir.path(), today)).unwrap();
        assert_eq!(content, "first\nsecond\n");
    }

    #[test]
    fn tee_writes_both_sides() {
        let mut tee = Tee::new(Vec::new(), Vec::new());
        write!(tee, "INFO done").unwrap();
        tee.flush().unwrap();

        assert_eq!(tee.first, b"INFO done");
        assert_eq!(tee.second, b"INFO done");
    }
}
