//! Incremental log tailing.
//!
//! [`LogReader::read`] never blocks waiting for data: it returns whatever
//! complete lines were appended since the previous call, possibly none. The
//! caller decides how long to sleep between calls.

use crate::error::ParserError;
use std::fs::File;
use std::io::{ErrorKind, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Tails a growing, possibly rotated, text file.
#[derive(Debug)]
pub struct LogReader {
    path: PathBuf,
    file: File,
    cursor: u64,
    /// Bytes of a line whose newline has not been written yet
    partial: Vec<u8>,
    paused: bool,
}

impl LogReader {
    /// Opens `path` for tailing.
    ///
    /// # Arguments
    ///
    /// * `path` - Log file to follow
    /// * `from_start` - Replay existing content instead of starting at the end
    pub fn open(path: impl AsRef<Path>, from_start: bool) -> Result<Self, ParserError> {
        let path = path.as_ref().to_path_buf();
        let mut file = File::open(&path).map_err(|source| ParserError::Open {
            path: path.display().to_string(),
            source,
        })?;
        let cursor = if from_start {
            0
        } else {
            file.seek(SeekFrom::End(0))?
        };

        info!("📜 Tailing {} from byte {}", path.display(), cursor);
        Ok(Self {
            path,
            file,
            cursor,
            partial: Vec::new(),
            paused: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Byte offset of the next read.
    pub fn position(&self) -> u64 {
        self.cursor
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Returns the complete lines appended since the last call.
    ///
    /// A trailing line without its newline is kept back until the newline
    /// arrives. If the file is now shorter than the cursor it was rotated or
    /// truncated: reading resumes at the new end and the lost lines are not
    /// replayed.
    pub fn read(&mut self) -> Result<Vec<String>, ParserError> {
        if self.paused {
            return Ok(Vec::new());
        }

        let size = match std::fs::metadata(&self.path) {
            Ok(metadata) => metadata.len(),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("{} missing, waiting for it to reappear", self.path.display());
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };

        if self.cursor > size {
            warn!(
                "🔄 {} shrank from {} to {} bytes (rotated or truncated), resuming at end",
                self.path.display(),
                self.cursor,
                size
            );
            self.reopen_at_end()?;
            return Ok(Vec::new());
        }
        if self.cursor == size {
            return Ok(Vec::new());
        }

        self.file.seek(SeekFrom::Start(self.cursor))?;
        let mut chunk = Vec::new();
        let read = (&mut self.file)
            .take(size - self.cursor)
            .read_to_end(&mut chunk)?;
        self.cursor += read as u64;
        self.partial.extend_from_slice(&chunk);

        Ok(self.take_complete_lines())
    }

    /// Stops reading; the cursor stays where it is.
    pub fn pause(&mut self) {
        if !self.paused {
            self.paused = true;
            info!("⏸️ Log reading paused at byte {}", self.cursor);
        }
    }

    /// Resumes reading from the current end of the file, skipping whatever was
    /// written while paused.
    pub fn unpause(&mut self) -> Result<(), ParserError> {
        if !self.paused {
            return Ok(());
        }
        let skipped_from = self.cursor;
        self.reopen_at_end()?;
        self.paused = false;
        info!(
            "▶️ Log reading resumed at byte {} ({} bytes skipped)",
            self.cursor,
            self.cursor.saturating_sub(skipped_from)
        );
        Ok(())
    }

    fn reopen_at_end(&mut self) -> Result<(), ParserError> {
        let mut file = File::open(&self.path).map_err(|source| ParserError::Open {
            path: self.path.display().to_string(),
            source,
        })?;
        self.cursor = file.seek(SeekFrom::End(0))?;
        self.file = file;
        self.partial.clear();
        Ok(())
    }

    fn take_complete_lines(&mut self) -> Vec<String> {
        let Some(last_newline) = self.partial.iter().rposition(|&b| b == b'\n') else {
            return Vec::new();
        };
        let complete: Vec<u8> = self.partial.drain(..=last_newline).collect();

        complete[..complete.len() - 1]
            .split(|&b| b == b'\n')
            .map(|line| {
                let line = line.strip_suffix(b"\r").unwrap_or(line);
                String::from_utf8_lossy(line).into_owned()
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::OpenOptions;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn append(file: &NamedTempFile, text: &str) {
        let mut handle = OpenOptions::new().append(true).open(file.path()).unwrap();
        handle.write_all(text.as_bytes()).unwrap();
    }

    #[test]
    fn test_returns_complete_lines_and_buffers_partial() {
        let file = NamedTempFile::new().unwrap();
        let mut reader = LogReader::open(file.path(), false).unwrap();
        assert!(reader.read().unwrap().is_empty());

        append(&file, "  0:00 InitGame: \\sv_hostname\\test\n  0:01 ClientConn");
        assert_eq!(reader.read().unwrap(), vec!["  0:00 InitGame: \\sv_hostname\\test"]);

        append(&file, "ect: 2\r\n");
        assert_eq!(reader.read().unwrap(), vec!["  0:01 ClientConnect: 2"]);
        assert!(reader.read().unwrap().is_empty());
    }

    #[test]
    fn test_starts_at_end_unless_asked() {
        let file = NamedTempFile::new().unwrap();
        append(&file, "old line\n");

        let mut tail = LogReader::open(file.path(), false).unwrap();
        assert!(tail.read().unwrap().is_empty());

        let mut replay = LogReader::open(file.path(), true).unwrap();
        assert_eq!(replay.read().unwrap(), vec!["old line"]);
    }

    #[test]
    fn test_truncation_resumes_at_new_end() {
        let file = NamedTempFile::new().unwrap();
        let mut reader = LogReader::open(file.path(), false).unwrap();
        append(&file, "one\ntwo\nthree\n");
        assert_eq!(reader.read().unwrap().len(), 3);

        file.as_file().set_len(0).unwrap();
        append(&file, "x\n");
        assert!(reader.read().unwrap().is_empty());
        assert_eq!(reader.position(), 2);

        append(&file, "after\n");
        assert_eq!(reader.read().unwrap(), vec!["after"]);
    }

    #[test]
    fn test_pause_discards_backlog() {
        let file = NamedTempFile::new().unwrap();
        let mut reader = LogReader::open(file.path(), false).unwrap();

        reader.pause();
        append(&file, "stale 1\nstale 2\n");
        assert!(reader.read().unwrap().is_empty());
        assert!(reader.is_paused());

        reader.unpause().unwrap();
        assert!(reader.read().unwrap().is_empty());

        append(&file, "fresh\n");
        assert_eq!(reader.read().unwrap(), vec!["fresh"]);
    }

    #[test]
    fn test_invalid_utf8_is_decoded_lossily() {
        let file = NamedTempFile::new().unwrap();
        let mut reader = LogReader::open(file.path(), false).unwrap();
        {
            let mut handle = OpenOptions::new().append(true).open(file.path()).unwrap();
            handle.write_all(b"say: caf\xE9\n").unwrap();
        }
        assert_eq!(reader.read().unwrap(), vec!["say: caf\u{FFFD}"]);
    }

    #[test]
    fn test_open_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let result = LogReader::open(dir.path().join("games_mp.log"), false);
        assert!(matches!(result, Err(ParserError::Open { .. })));
    }
}
