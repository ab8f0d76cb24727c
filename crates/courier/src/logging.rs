//! Log output to stdout and a rotated file.

use anyhow::{Context as _, Result};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Size past which the log file is rotated.
pub const MAX_LOG_BYTES: u64 = 10 * 1024 * 1024;
/// Rotated generations kept next to the live file.
pub const KEEP_GENERATIONS: usize = 5;

const DEFAULT_FILTER: &str = "courier=info,courier_core=info,courier_smtp=info";

/// Installs the global subscriber. `RUST_LOG` overrides the default filter.
///
/// # Errors
///
/// Returns an error if the log file cannot be rotated or opened.
pub fn init(log_file: &Path) -> Result<()> {
    if let Some(parent) = log_file.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating log directory {}", parent.display()))?;
    }
    let file = RotatingFile::open(log_file, MAX_LOG_BYTES, KEEP_GENERATIONS)
        .with_context(|| format!("opening {}", log_file.display()))?;

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_FILTER.into()))
        .with(fmt::layer())
        .with(fmt::layer().with_ansi(false).with_writer(file))
        .try_init()
        .context("installing tracing subscriber")?;
    Ok(())
}

/// Append-only log file that rotates itself when a write would take it
/// past `max_bytes`.
#[derive(Debug)]
pub struct RotatingFile {
    path: PathBuf,
    max_bytes: u64,
    keep: usize,
    live: Mutex<LiveFile>,
}

#[derive(Debug)]
struct LiveFile {
    file: File,
    len: u64,
}

impl RotatingFile {
    /// Opens `path` for appending, rotating it first if it is already over
    /// the limit.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be rotated or opened.
    pub fn open(path: &Path, max_bytes: u64, keep: usize) -> io::Result<Self> {
        rotate(path, max_bytes, keep)?;
        let file = append(path)?;
        let len = file.metadata()?.len();
        Ok(Self {
            path: path.to_path_buf(),
            max_bytes,
            keep,
            live: Mutex::new(LiveFile { file, len }),
        })
    }

    fn live(&self) -> MutexGuard<'_, LiveFile> {
        self.live.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_record(&self, buf: &[u8]) -> io::Result<()> {
        let mut live = self.live();
        let incoming = buf.len() as u64;
        if live.len > 0 && live.len + incoming > self.max_bytes && self.keep > 0 {
            live.file.flush()?;
            shift(&self.path, self.keep)?;
            live.file = append(&self.path)?;
            live.len = 0;
        }
        live.file.write_all(buf)?;
        live.len += incoming;
        Ok(())
    }
}

/// Writer handed out per event by [`RotatingFile`].
#[derive(Debug)]
pub struct RotatingWriter<'a>(&'a RotatingFile);

impl Write for RotatingWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.write_record(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.live().file.flush()
    }
}

impl<'a> MakeWriter<'a> for RotatingFile {
    type Writer = RotatingWriter<'a>;

    fn make_writer(&'a self) -> Self::Writer {
        RotatingWriter(self)
    }
}

fn append(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

/// Shifts `file` to `file.1` (and older generations up by one) when it is
/// larger than `max_bytes`. At most `keep` generations survive.
///
/// # Errors
///
/// Returns an error if a rename fails.
pub fn rotate(file: &Path, max_bytes: u64, keep: usize) -> io::Result<()> {
    let Ok(meta) = fs::metadata(file) else {
        return Ok(());
    };
    if meta.len() <= max_bytes || keep == 0 {
        return Ok(());
    }
    shift(file, keep)
}

fn shift(file: &Path, keep: usize) -> io::Result<()> {
    for generation in (1..keep).rev() {
        let from = generation_path(file, generation);
        if from.exists() {
            fs::rename(&from, generation_path(file, generation + 1))?;
        }
    }
    fs::rename(file, generation_path(file, 1))
}

fn generation_path(file: &Path, generation: usize) -> PathBuf {
    let mut name = file.as_os_str().to_owned();
    name.push(format!(".{generation}"));
    PathBuf::from(name)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn scratch(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("courier-log-{}-{name}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn small_file_is_left_alone() {
        let dir = scratch("small");
        let log = dir.join("bot.log");
        fs::write(&log, "tiny").unwrap();
        rotate(&log, 100, 5).unwrap();
        assert!(log.exists());
        assert!(!generation_path(&log, 1).exists());
        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn missing_file_is_fine() {
        let dir = scratch("missing");
        rotate(&dir.join("none.log"), 1, 5).unwrap();
        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn generations_shift_and_oldest_drops() {
        let dir = scratch("shift");
        let log = dir.join("bot.log");
        for generation in 1..=3 {
            fs::write(generation_path(&log, generation), format!("gen{generation}")).unwrap();
        }
        fs::write(&log, "x".repeat(20)).unwrap();

        rotate(&log, 10, 3).unwrap();

        assert!(!log.exists());
        assert_eq!(fs::read_to_string(generation_path(&log, 1)).unwrap(), "x".repeat(20));
        assert_eq!(fs::read_to_string(generation_path(&log, 2)).unwrap(), "gen1");
        assert_eq!(fs::read_to_string(generation_path(&log, 3)).unwrap(), "gen2");
        assert!(!generation_path(&log, 4).exists());
        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn running_writer_rotates_past_the_limit() {
        let dir = scratch("running");
        let log = dir.join("bot.log");
        let file = RotatingFile::open(&log, 64, 2).unwrap();

        for line in ["a", "b", "c", "d"] {
            let record = format!("{}\n", line.repeat(39));
            file.make_writer().write_all(record.as_bytes()).unwrap();
        }

        let live = fs::read_to_string(&log).unwrap();
        assert_eq!(live, format!("{}\n", "d".repeat(39)));
        assert!(fs::read_to_string(generation_path(&log, 1)).unwrap().starts_with('c'));
        assert!(fs::read_to_string(generation_path(&log, 2)).unwrap().starts_with('b'));
        assert!(!generation_path(&log, 3).exists());
        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn existing_contents_count_toward_the_limit() {
        let dir = scratch("existing");
        let log = dir.join("bot.log");
        fs::write(&log, "x".repeat(40)).unwrap();

        let file = RotatingFile::open(&log, 64, 5).unwrap();
        file.make_writer().write_all(&[b'y'; 30]).unwrap();

        assert_eq!(fs::read_to_string(&log).unwrap(), "y".repeat(30));
        assert_eq!(fs::read_to_string(generation_path(&log, 1)).unwrap(), "x".repeat(40));
        fs::remove_dir_all(dir).unwrap();
    }
}
