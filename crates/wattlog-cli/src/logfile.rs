//! Append-only CSV log with resumable run identifiers.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use crate::sample::{header_row, Sample};

/// Chunk size for the reverse scan of the trailing row.
const SCAN_CHUNK: usize = 4096;

/// Errors raised by the persistent log.
#[derive(Error, Debug)]
pub enum LogError {
    /// Filesystem error.
    #[error("log I/O error: {0}")]
    Io(#[from] io::Error),

    /// The existing file's trailing row is not a valid sample row, so the
    /// resume identifier cannot be recovered. Restarting the numbering from
    /// 1 would break identifier continuity, so this is fatal.
    #[error("corrupt trailing row in {path}: '{line}'")]
    Corrupt { path: PathBuf, line: String },
}

/// Owns the on-disk append-only CSV file for one collection session.
///
/// The file handle is opened and closed within each call; nothing is held
/// open across rounds. A single process is assumed to own the file.
pub struct PersistentLog {
    path: PathBuf,
}

impl PersistentLog {
    /// Resolves `<output_dir>/<filename>.csv`, creating the output
    /// directory if needed.
    pub fn create(output_dir: &Path, filename: &str) -> io::Result<Self> {
        fs::create_dir_all(output_dir)?;
        Ok(Self {
            path: output_dir.join(format!("{filename}.csv")),
        })
    }

    /// Path of the log file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run identifier the next round should use: 1 for a missing, empty, or
    /// header-only file, otherwise the trailing row's identifier plus one.
    pub fn resume_id(&self) -> Result<u64, LogError> {
        if !self.path.exists() {
            return Ok(1);
        }
        let Some(line) = read_last_line(&self.path)? else {
            return Ok(1);
        };
        if line == header_row() {
            return Ok(1);
        }
        match Sample::parse_row(&line) {
            Some(sample) => Ok(sample.run_id + 1),
            None => Err(LogError::Corrupt {
                path: self.path.clone(),
                line,
            }),
        }
    }

    /// Creates the file with its header row if it does not exist yet.
    /// Never rewrites or duplicates the header.
    pub fn ensure_header(&self) -> io::Result<()> {
        if self.path.exists() {
            return Ok(());
        }
        let mut writer = BufWriter::new(File::create(&self.path)?);
        writeln!(writer, "{}", header_row())?;
        writer.flush()?;
        debug!("created log file {}", self.path.display());
        Ok(())
    }

    /// Appends one row per sample, in buffer order, then closes the file.
    pub fn append(&self, samples: &[Sample]) -> io::Result<()> {
        let file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(&self.path)?;
        let mut writer = BufWriter::new(file);
        for sample in samples {
            writeln!(writer, "{}", sample.to_csv_row())?;
        }
        writer.flush()?;
        debug!(
            "appended {} rows to {}",
            samples.len(),
            self.path.display()
        );
        Ok(())
    }
}

/// Reads the last non-empty line of a file by scanning backwards in chunks,
/// so resuming a large log does not read the whole file. Each chunk is
/// searched once and collected once, keeping the scan linear even when the
/// trailing line spans many chunks.
fn read_last_line(path: &Path) -> io::Result<Option<String>> {
    let mut file = File::open(path)?;
    let mut end = file.metadata()?.len();
    let mut chunk = [0u8; SCAN_CHUNK];
    // Fragments of the trailing line, nearest to the file end first.
    let mut parts: Vec<Vec<u8>> = Vec::new();
    while end > 0 {
        let take = SCAN_CHUNK.min(end as usize);
        end -= take as u64;
        file.seek(SeekFrom::Start(end))?;
        file.read_exact(&mut chunk[..take])?;
        let mut slice = &chunk[..take];
        if parts.is_empty() {
            // Still inside the trailing newline run at the end of the file.
            slice = &slice[..trimmed_len(slice)];
            if slice.is_empty() {
                continue;
            }
        }
        if let Some(newline) = slice.iter().rposition(|&b| b == b'\n') {
            return Ok(assemble_line(&slice[newline + 1..], &parts));
        }
        parts.push(slice.to_vec());
    }
    Ok(assemble_line(&[], &parts))
}

/// Length of `buf` with trailing newline bytes stripped.
fn trimmed_len(buf: &[u8]) -> usize {
    let mut len = buf.len();
    while len > 0 && (buf[len - 1] == b'\n' || buf[len - 1] == b'\r') {
        len -= 1;
    }
    len
}

/// Joins the earliest fragment with the collected parts in file order.
fn assemble_line(head: &[u8], parts: &[Vec<u8>]) -> Option<String> {
    let mut line = head.to_vec();
    for part in parts.iter().rev() {
        line.extend_from_slice(part);
    }
    if line.is_empty() {
        None
    } else {
        Some(String::from_utf8_lossy(&line).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::CSV_COLUMNS;
    use chrono::Local;

    fn sample(run_id: u64, label: &str) -> Sample {
        Sample::new(run_id, label, Local::now(), 120.5, 5.1, 23.6)
    }

    fn log_in(dir: &Path) -> PersistentLog {
        PersistentLog::create(dir, "test").unwrap()
    }

    #[test]
    fn test_create_provisions_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("results/bench");
        let log = PersistentLog::create(&nested, "run").unwrap();
        assert!(nested.is_dir());
        assert_eq!(log.path(), nested.join("run.csv"));
    }

    #[test]
    fn test_resume_id_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(log_in(dir.path()).resume_id().unwrap(), 1);
    }

    #[test]
    fn test_resume_id_empty_and_header_only() {
        let dir = tempfile::tempdir().unwrap();
        let log = log_in(dir.path());
        fs::write(log.path(), "").unwrap();
        assert_eq!(log.resume_id().unwrap(), 1);
        log.ensure_header().unwrap();
        assert_eq!(log.resume_id().unwrap(), 1);
    }

    #[test]
    fn test_resume_id_continues_from_last_row() {
        let dir = tempfile::tempdir().unwrap();
        let log = log_in(dir.path());
        log.ensure_header().unwrap();
        log.append(&[sample(1, "a"), sample(1, "b"), sample(2, "a"), sample(2, "b")])
            .unwrap();
        assert_eq!(log.resume_id().unwrap(), 3);
    }

    #[test]
    fn test_resume_id_corrupt_trailing_row() {
        let dir = tempfile::tempdir().unwrap();
        let log = log_in(dir.path());
        log.ensure_header().unwrap();
        log.append(&[sample(5, "a")]).unwrap();
        let mut contents = fs::read_to_string(log.path()).unwrap();
        contents.push_str("garbage line without columns\n");
        fs::write(log.path(), contents).unwrap();
        assert!(matches!(log.resume_id(), Err(LogError::Corrupt { .. })));
    }

    #[test]
    fn test_header_written_exactly_once() {
        let dir = tempfile::tempdir().unwrap();
        let log = log_in(dir.path());
        log.ensure_header().unwrap();
        log.ensure_header().unwrap();
        log.append(&[sample(1, "a")]).unwrap();
        log.ensure_header().unwrap();
        let contents = fs::read_to_string(log.path()).unwrap();
        let headers = contents
            .lines()
            .filter(|line| *line == header_row())
            .count();
        assert_eq!(headers, 1);
        assert_eq!(contents.lines().count(), 2);
    }

    #[test]
    fn test_append_round_trip_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let log = log_in(dir.path());
        let written = vec![sample(3, "a"), sample(3, "b"), sample(4, "a"), sample(4, "b")];
        log.ensure_header().unwrap();
        log.append(&written).unwrap();

        let contents = fs::read_to_string(log.path()).unwrap();
        let mut lines = contents.lines();
        assert_eq!(lines.next().unwrap(), header_row());
        let parsed: Vec<Sample> = lines.map(|l| Sample::parse_row(l).unwrap()).collect();
        assert_eq!(parsed.len(), written.len());
        for (got, want) in parsed.iter().zip(&written) {
            assert_eq!(got.run_id, want.run_id);
            assert_eq!(got.sensor_label, want.sensor_label);
            assert!((got.timestamp_epoch - want.timestamp_epoch).abs() < 1e-9);
            assert!((got.power_mw - want.power_mw).abs() < 1e-9);
            assert!((got.voltage_v - want.voltage_v).abs() < 1e-9);
            assert!((got.current_ma - want.current_ma).abs() < 1e-9);
        }
    }

    #[test]
    fn test_reverse_scan_spans_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let log = log_in(dir.path());
        let long_label = "x".repeat(2 * SCAN_CHUNK);
        log.ensure_header().unwrap();
        log.append(&[sample(41, "a"), sample(42, &long_label)]).unwrap();
        assert_eq!(log.resume_id().unwrap(), 43);
    }

    #[test]
    fn test_resume_id_with_comma_label() {
        let dir = tempfile::tempdir().unwrap();
        let log = log_in(dir.path());
        log.ensure_header().unwrap();
        log.append(&[sample(7, "rail,3v3")]).unwrap();
        assert_eq!(log.resume_id().unwrap(), 8);
    }

    #[test]
    fn test_reverse_scan_skips_trailing_newline_run() {
        let dir = tempfile::tempdir().unwrap();
        let log = log_in(dir.path());
        log.ensure_header().unwrap();
        log.append(&[sample(11, "a")]).unwrap();
        let mut contents = fs::read_to_string(log.path()).unwrap();
        contents.push_str(&"\n".repeat(SCAN_CHUNK + 16));
        fs::write(log.path(), contents).unwrap();
        assert_eq!(log.resume_id().unwrap(), 12);
    }

    #[test]
    fn test_column_count_fixed() {
        // Guard against the row format drifting away from the header.
        let row = sample(1, "a").to_csv_row();
        assert_eq!(row.split(',').count(), CSV_COLUMNS.len());
    }
}
