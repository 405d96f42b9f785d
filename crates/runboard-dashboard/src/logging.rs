use crate::config::{parse_bool_flag, Config};
use std::{
    fs::{File, OpenOptions},
    io::{self, Write},
    path::PathBuf,
    sync::{Arc, Mutex},
};
use tracing_subscriber::{fmt::writer::BoxMakeWriter, EnvFilter};

const LOG_FILE_NAME: &str = "runboard-dashboard.log";

/// Keeps the log file open for the life of the process.
pub struct LogGuard {
    file: Option<Arc<Mutex<File>>>,
}

/// The terminal belongs to the UI, so logs only reach stdout on request.
pub fn init_logging(config: &Config) -> Option<LogGuard> {
    let level = std::env::var("RUNBOARD_LOG_LEVEL")
        .ok()
        .filter(|level| !level.trim().is_empty())
        .unwrap_or_else(|| "info".to_string());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let stdout_enabled = std::env::var("RUNBOARD_LOG_STDOUT")
        .ok()
        .and_then(|value| parse_bool_flag(&value))
        .unwrap_or(false);

    let guard = match open_log_file(&config.log_dir) {
        Ok(guard) => guard,
        Err(err) => {
            eprintln!("log_file_error: {err}");
            LogGuard { file: None }
        }
    };
    let file = guard.file.clone();
    let make_writer = BoxMakeWriter::new(move || LogWriter::new(file.clone(), stdout_enabled));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_writer(make_writer)
        .finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        return None;
    }
    Some(guard)
}

fn open_log_file(log_dir: &str) -> io::Result<LogGuard> {
    if log_dir.trim().is_empty() {
        return Ok(LogGuard { file: None });
    }
    let dir = PathBuf::from(log_dir);
    std::fs::create_dir_all(&dir)?;
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(dir.join(LOG_FILE_NAME))?;
    Ok(LogGuard {
        file: Some(Arc::new(Mutex::new(file))),
    })
}

/// Fans each record out to the log file and, when enabled, stdout.
/// With neither configured it behaves like `io::sink`.
struct LogWriter {
    stdout: Option<io::Stdout>,
    file: Option<Arc<Mutex<File>>>,
}

impl LogWriter {
    fn new(file: Option<Arc<Mutex<File>>>, stdout_enabled: bool) -> Self {
        Self {
            stdout: stdout_enabled.then(io::stdout),
            file,
        }
    }
}

impl Write for LogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if let Some(stdout) = self.stdout.as_mut() {
            let _ = stdout.write_all(buf);
        }
        if let Some(file) = &self.file {
            if let Ok(mut file) = file.lock() {
                let _ = file.write_all(buf);
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if let Some(stdout) = self.stdout.as_mut() {
            let _ = stdout.flush();
        }
        if let Some(file) = &self.file {
            if let Ok(mut file) = file.lock() {
                let _ = file.flush();
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_file_lands_in_configured_dir() {
        let dir = tempfile::tempdir().expect("tempdir");
        let log_dir = dir.path().join("logs");
        let guard = open_log_file(log_dir.to_str().expect("utf8 path")).expect("open");
        assert!(guard.file.is_some());

        let mut writer = LogWriter::new(guard.file.clone(), false);
        writer.write_all(b"hello\n").expect("write");
        writer.flush().expect("flush");
        let written = std::fs::read_to_string(log_dir.join(LOG_FILE_NAME)).expect("read");
        assert!(written.ends_with("hello\n"));
    }

    #[test]
    fn blank_log_dir_means_no_file() {
        let guard = open_log_file("  ").expect("open");
        assert!(guard.file.is_none());
        let mut writer = LogWriter::new(None, false);
        assert_eq!(writer.write(b"dropped").expect("write"), 7);
    }
}
