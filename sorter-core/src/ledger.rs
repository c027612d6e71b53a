//! The append-only log: every accepted submission is written to its own
//! file and never touched again. [`crate::state::State`] is always
//! reconstructible by replaying these files in filename order.

use std::fs;
use std::path::{Path, PathBuf};

use log::debug;

use crate::error::LogError;

/// One submission as read back off disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub filename: String,
    pub from: String,
    pub timestamp: String,
    pub body: String,
}

/// One entry in [`Log::list`]'s directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListedFile {
    pub filename: String,
    pub slug: String,
}

/// Width of the zero-padded millisecond timestamp prefix on every filename.
/// 13 digits covers epoch milliseconds up to the year 2286, which keeps
/// lexicographic filename order equal to chronological order regardless of
/// how many digits a raw timestamp would otherwise need.
const TIMESTAMP_WIDTH: usize = 13;

pub(crate) fn format_timestamp(ms: i64) -> String {
    format!("{ms:0width$}", width = TIMESTAMP_WIDTH)
}

/// A directory of `<timestamp_ms>+<slug>.sorter` files.
pub struct Log {
    dir: PathBuf,
}

impl Log {
    /// Opens `dir` as a log, creating it (and any missing parents) if it
    /// doesn't exist yet.
    pub fn init(dir: impl AsRef<Path>) -> Result<Self, LogError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Log { dir })
    }

    /// Appends one submission, returning the filename it was written under.
    /// `subject` is the inbound message's subject line; it only affects the
    /// filename's readability, not any semantics.
    pub fn append(
        &self,
        from: &str,
        timestamp_ms: i64,
        subject: &str,
        body: &str,
    ) -> Result<String, LogError> {
        let filename = format!("{}+{}.sorter", format_timestamp(timestamp_ms), slugify(subject));
        let path = self.dir.join(&filename);
        let contents = format!(
            "From: {from}\nTimestamp: {}\n---\n{body}",
            format_timestamp(timestamp_ms)
        );
        fs::write(&path, contents)?;
        debug!("appended {filename}");
        Ok(filename)
    }

    /// Removes a previously appended file. Used to roll back a log append
    /// when the reducer rejects the document it carried — replay must never
    /// see a submission that failed to apply.
    pub fn remove(&self, filename: &str) -> Result<(), LogError> {
        let path = self.safe_path(filename)?;
        fs::remove_file(&path)?;
        debug!("removed {filename} after reducer rejection");
        Ok(())
    }

    /// Reads one entry back by filename. Rejects anything that isn't a
    /// bare `.sorter` filename (no path separators, no `..`) so a malformed
    /// or hostile filename can never escape the log directory.
    pub fn get(&self, filename: &str) -> Result<LogEntry, LogError> {
        let path = self.safe_path(filename)?;
        match fs::read_to_string(&path) {
            Ok(raw) => Ok(parse_entry(filename, &raw)),
            Err(source) if source.kind() == std::io::ErrorKind::NotFound => {
                Err(LogError::NotFound(filename.to_string()))
            }
            Err(source) => Err(source.into()),
        }
    }

    fn safe_path(&self, filename: &str) -> Result<PathBuf, LogError> {
        if filename.is_empty()
            || filename.contains('/')
            || filename.contains('\\')
            || filename.contains("..")
            || !filename.ends_with(".sorter")
        {
            return Err(LogError::MalformedFilename(filename.to_string()));
        }
        Ok(self.dir.join(filename))
    }

    /// Every `.sorter` filename in the log, newest-first.
    pub fn list(&self) -> Result<Vec<ListedFile>, LogError> {
        let mut names = self.list_chronological()?;
        names.reverse();
        Ok(names
            .into_iter()
            .map(|filename| {
                let slug = filename
                    .split_once('+')
                    .and_then(|(_, rest)| rest.strip_suffix(".sorter"))
                    .unwrap_or("")
                    .to_string();
                ListedFile { filename, slug }
            })
            .collect())
    }

    /// Filenames in chronological (oldest-first) order — the order replay
    /// must fold them in.
    pub(crate) fn list_chronological(&self) -> Result<Vec<String>, LogError> {
        let mut names = Vec::new();
        for dir_entry in fs::read_dir(&self.dir)? {
            let dir_entry = dir_entry?;
            if dir_entry.file_type()?.is_file() {
                if let Some(name) = dir_entry.file_name().to_str() {
                    if name.ends_with(".sorter") {
                        names.push(name.to_string());
                    }
                }
            }
        }
        names.sort();
        Ok(names)
    }

    /// Reads every entry in the log, oldest-first.
    pub fn replay(&self) -> Result<Vec<LogEntry>, LogError> {
        self.list_chronological()?
            .into_iter()
            .map(|name| self.get(&name))
            .collect()
    }
}

/// Parses one file's contents. Files written by [`Log::append`] have a
/// `From:`/`Timestamp:` header followed by a `---` separator; files
/// without that separator (or without those two header lines) are treated
/// as legacy body-only submissions, with the timestamp falling back to the
/// filename's leading digits.
fn parse_entry(filename: &str, raw: &str) -> LogEntry {
    let (from, timestamp, body) = match raw.split_once("\n---\n") {
        Some((header, body)) => {
            let mut from = String::new();
            let mut timestamp = String::new();
            for line in header.lines() {
                if let Some(value) = line.strip_prefix("From: ") {
                    from = value.to_string();
                } else if let Some(value) = line.strip_prefix("Timestamp: ") {
                    timestamp = value.to_string();
                }
            }
            if from.is_empty() && timestamp.is_empty() {
                (String::new(), String::new(), raw.to_string())
            } else {
                (from, timestamp, body.to_string())
            }
        }
        None => (String::new(), String::new(), raw.to_string()),
    };

    let timestamp = if timestamp.is_empty() {
        filename.split('+').next().unwrap_or_default().to_string()
    } else {
        timestamp
    };

    LogEntry {
        filename: filename.to_string(),
        from,
        timestamp,
        body,
    }
}

/// Lowercases, replaces runs of non-alphanumerics with a single `-`, and
/// trims leading/trailing dashes. Falls back to `"entry"` if nothing
/// alphanumeric remains.
fn slugify(text: &str) -> String {
    let mut out = String::new();
    for c in text.to_lowercase().chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c);
        } else if !out.ends_with('-') && !out.is_empty() {
            out.push('-');
        }
    }
    while out.ends_with('-') {
        out.pop();
    }
    if out.is_empty() {
        "entry".to_string()
    } else {
        out
    }
}
