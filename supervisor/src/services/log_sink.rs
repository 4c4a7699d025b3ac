//! Append-mode log file shared by the tracing layer and child output

use std::fs::{File, OpenOptions};
use std::io::{self, LineWriter, Write};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing_subscriber::fmt::MakeWriter;

use crate::error::SupervisorResult;

#[derive(Clone)]
pub struct LogSink {
    file: Arc<Mutex<LineWriter<File>>>,
}

impl LogSink {
    pub fn open(path: &Path) -> SupervisorResult<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Arc::new(Mutex::new(LineWriter::new(file))),
        })
    }

    fn lock(&self) -> MutexGuard<'_, LineWriter<File>> {
        self.file.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append one timestamped line of child output
    pub fn append_line(&self, stream: &str, text: &str) -> SupervisorResult<()> {
        let stamp = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ");
        writeln!(self.lock(), "{stamp} [{stream}] {text}")?;
        Ok(())
    }

    pub fn flush(&self) -> SupervisorResult<()> {
        self.lock().flush()?;
        Ok(())
    }
}

/// Per-event writer handed out to the tracing fmt layer
pub struct LogSinkWriter {
    sink: LogSink,
}

impl Write for LogSinkWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.sink.lock().write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.sink.lock().flush()
    }
}

impl<'a> MakeWriter<'a> for LogSink {
    type Writer = LogSinkWriter;

    fn make_writer(&'a self) -> Self::Writer {
        LogSinkWriter { sink: self.clone() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_appends_without_truncating() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bot.log");
        std::fs::write(&path, "existing\n").unwrap();

        let sink = LogSink::open(&path).unwrap();
        sink.append_line("stdout", "ready").unwrap();
        sink.flush().unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines[0], "existing");
        assert!(lines[1].ends_with("[stdout] ready"));
    }

    #[test]
    fn test_make_writer_shares_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bot.log");
        let sink = LogSink::open(&path).unwrap();

        let mut writer = sink.make_writer();
        writer.write_all(b"from tracing\n").unwrap();
        sink.flush().unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "from tracing\n");
    }
}
