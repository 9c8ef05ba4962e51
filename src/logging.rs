use std::fs::{self, File, OpenOptions};
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};

const LOG_FILE_VAR: &str = "LEADER_ELECT_LOG_FILE";
const MAX_SIZE_VAR: &str = "LEADER_ELECT_LOG_MAX_SIZE_MB";
const MAX_FILES_VAR: &str = "LEADER_ELECT_LOG_MAX_FILES";

/// Where election logs go when they are written to disk instead of stderr.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFileSettings {
    pub path: PathBuf,
    pub max_bytes: u64,
    /// Rotated copies kept next to `path` as `path.1` (newest) .. `path.N`.
    pub max_backups: u32,
}

impl LogFileSettings {
    pub fn from_env() -> Option<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds settings from `lookup`; `None` unless a log file is named.
    /// Unparsable sizes fall back to 10 MB and 3 backups.
    pub fn from_lookup<F>(lookup: F) -> Option<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let path = lookup(LOG_FILE_VAR).filter(|p| !p.is_empty())?;
        let max_size_mb = lookup(MAX_SIZE_VAR)
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(10);
        let max_backups = lookup(MAX_FILES_VAR)
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(3);

        Some(Self {
            path: PathBuf::from(path),
            max_bytes: max_size_mb.saturating_mul(1024 * 1024),
            max_backups,
        })
    }
}

/// Log sink that starts a fresh file once `max_bytes` would be exceeded,
/// keeping at most `max_backups` older files.
pub struct RotatingLog {
    settings: LogFileSettings,
    file: File,
    written: u64,
}

impl RotatingLog {
    pub fn open(settings: LogFileSettings) -> io::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&settings.path)?;
        let written = file.metadata()?.len();
        Ok(Self {
            settings,
            file,
            written,
        })
    }

    pub fn backup_path(&self, n: u32) -> PathBuf {
        let mut name = self.settings.path.clone().into_os_string();
        name.push(format!(".{n}"));
        PathBuf::from(name)
    }

    fn rotate(&mut self) -> io::Result<()> {
        self.file.flush()?;

        if self.settings.max_backups > 0 {
            // Oldest backup is overwritten by the one before it.
            for n in (1..self.settings.max_backups).rev() {
                rename_if_present(&self.backup_path(n), &self.backup_path(n + 1))?;
            }
            rename_if_present(&self.settings.path, &self.backup_path(1))?;
        }

        self.file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&self.settings.path)?;
        self.written = 0;
        Ok(())
    }
}

fn rename_if_present(from: &Path, to: &Path) -> io::Result<()> {
    match fs::rename(from, to) {
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

impl Write for RotatingLog {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        // A record larger than the limit still lands in a file of its own.
        if self.written > 0 && self.written + buf.len() as u64 > self.settings.max_bytes {
            self.rotate()?;
        }
        let n = self.file.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

/// Installs `env_logger` (filter from `RUST_LOG`, default `info`), writing to
/// a rotating file when `LEADER_ELECT_LOG_FILE` is set.
pub fn init() {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));

    if let Some(settings) = LogFileSettings::from_env() {
        let path = settings.path.clone();
        match RotatingLog::open(settings) {
            Ok(log) => {
                builder.target(env_logger::Target::Pipe(Box::new(log)));
            }
            Err(e) => eprintln!(
                "Cannot open log file {}: {e}; logging to stderr",
                path.display()
            ),
        }
    }

    builder.init();
}
