//! Log filter selection, the rolling file sink, and crash artifacts.
//!
//! Subscriber construction lives in the binary; this module only decides
//! which filters and sinks to use so the decisions can be tested.

use std::{
    any::Any,
    backtrace::{Backtrace, BacktraceStatus},
    fs,
    io::{self, Write},
    panic::{self, PanicHookInfo},
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Mutex, OnceLock,
    },
    thread,
};

use chrono::{DateTime, Utc};
use tracing_appender::rolling::{RollingFileAppender, Rotation};

pub const DEFAULT_LOG_FILTER: &str = "info";
pub const ENCODER_STDERR_TARGET: &str = "ffmpeg_encode_stderr";
pub const NOISE_FILTER: &str = "ort=error,ffmpeg_encode_stderr=error";
pub const LOG_RETENTION_FILES: usize = 14;
pub const LOG_DIR_NAME: &str = "logs";
pub const CRASH_DIR_NAME: &str = "crash";
const LOG_FILE_PREFIX: &str = "mangamotion";
const LOG_FILE_SUFFIX: &str = "log";

static PANIC_HOOK_LOCK: Mutex<()> = Mutex::new(());
static PANIC_HOOK_DIR: OnceLock<PathBuf> = OnceLock::new();
static CRASH_WRITE_IN_PROGRESS: AtomicBool = AtomicBool::new(false);
static CRASH_SEQUENCE: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogOptions {
    pub data_dir: Option<PathBuf>,
    pub verbose: u8,
    /// `--log-filter`; wins over everything else.
    pub cli_filter: Option<String>,
    /// Value of `RUST_LOG`, if set.
    pub rust_log: Option<String>,
    pub retention_files: usize,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self {
            data_dir: None,
            verbose: 0,
            cli_filter: None,
            rust_log: None,
            retention_files: LOG_RETENTION_FILES,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFilters {
    pub user: String,
    pub console: String,
    pub file: String,
}

#[derive(Debug)]
pub enum FileSink {
    Ready {
        log_dir: PathBuf,
        appender: RollingFileAppender,
    },
    Disabled {
        log_dir: Option<PathBuf>,
        reason: String,
    },
}

impl FileSink {
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready { .. })
    }
}

impl LogOptions {
    /// Precedence: `--log-filter` > `-v`/`-vv` > `RUST_LOG` > `info`.
    ///
    /// When the filter was not chosen explicitly, ORT and encoder chatter is
    /// silenced on the console. The file keeps encoder stderr at debug.
    pub fn filters(&self) -> LogFilters {
        let user = self.user_filter();
        if !self.is_implicit() {
            return LogFilters {
                console: user.clone(),
                file: user.clone(),
                user,
            };
        }

        LogFilters {
            console: format!("{NOISE_FILTER},{user}"),
            file: format!("{},{user}", file_noise_filter(NOISE_FILTER)),
            user,
        }
    }

    /// Daily-rotated `<data_dir>/logs/mangamotion.*.log`, or the reason there is
    /// no file sink.
    pub fn file_sink(&self) -> FileSink {
        let Some(data_dir) = self.data_dir.as_deref() else {
            return FileSink::Disabled {
                log_dir: None,
                reason: "file sink disabled: data_dir is not configured".to_string(),
            };
        };

        let log_dir = data_dir.join(LOG_DIR_NAME);
        if let Err(error) = fs::create_dir_all(&log_dir) {
            return FileSink::Disabled {
                log_dir: Some(log_dir),
                reason: format!("failed to create log directory: {error}"),
            };
        }

        let retention = if self.retention_files == 0 {
            LOG_RETENTION_FILES
        } else {
            self.retention_files
        };

        match RollingFileAppender::builder()
            .rotation(Rotation::DAILY)
            .filename_prefix(LOG_FILE_PREFIX)
            .filename_suffix(LOG_FILE_SUFFIX)
            .max_log_files(retention)
            .build(&log_dir)
        {
            Ok(appender) => FileSink::Ready { log_dir, appender },
            Err(error) => FileSink::Disabled {
                log_dir: Some(log_dir),
                reason: format!("failed to initialize rolling file sink: {error}"),
            },
        }
    }

    fn user_filter(&self) -> String {
        if let Some(filter) = &self.cli_filter {
            return filter.clone();
        }
        match self.verbose {
            0 => self
                .rust_log
                .clone()
                .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string()),
            1 => "debug".to_string(),
            _ => "trace".to_string(),
        }
    }

    fn is_implicit(&self) -> bool {
        self.cli_filter.is_none() && self.verbose == 0
    }
}

/// Same directives, with the encoder stderr target raised to `debug`.
fn file_noise_filter(noise: &str) -> String {
    let mut directives: Vec<String> = noise
        .split(',')
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .filter(|d| d.split_once('=').map(|(t, _)| t.trim()) != Some(ENCODER_STDERR_TARGET))
        .map(str::to_string)
        .collect();
    directives.push(format!("{ENCODER_STDERR_TARGET}=debug"));
    directives.join(",")
}

pub fn crash_dir(data_dir: &Path) -> PathBuf {
    data_dir.join(LOG_DIR_NAME).join(CRASH_DIR_NAME)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PanicHook {
    Installed(PathBuf),
    AlreadyInstalled(PathBuf),
}

/// Write a crash artifact under `<data_dir>/logs/crash/` for every panic, then
/// run the previously installed hook. Installing twice is a no-op.
pub fn install_panic_hook(data_dir: &Path) -> io::Result<PanicHook> {
    if let Some(existing) = PANIC_HOOK_DIR.get() {
        return Ok(PanicHook::AlreadyInstalled(existing.clone()));
    }

    let dir = crash_dir(data_dir);
    fs::create_dir_all(&dir)?;

    let _guard = PANIC_HOOK_LOCK
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    if let Some(existing) = PANIC_HOOK_DIR.get() {
        return Ok(PanicHook::AlreadyInstalled(existing.clone()));
    }

    let previous = panic::take_hook();
    let hook_dir = dir.clone();
    panic::set_hook(Box::new(move |info| {
        record_panic(&hook_dir, info);
        previous(info);
    }));

    let _ = PANIC_HOOK_DIR.set(dir.clone());
    Ok(PanicHook::Installed(dir))
}

#[derive(Debug)]
struct CrashReport {
    timestamp: DateTime<Utc>,
    thread: String,
    location: String,
    payload: String,
    backtrace_policy: &'static str,
    backtrace: String,
}

impl CrashReport {
    fn capture(info: &PanicHookInfo<'_>) -> Self {
        let (backtrace_policy, backtrace) = capture_backtrace();
        Self {
            timestamp: Utc::now(),
            thread: thread::current().name().unwrap_or("<unnamed>").to_string(),
            location: info
                .location()
                .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
                .unwrap_or_else(|| "<unknown>".to_string()),
            payload: payload_text(info.payload()),
            backtrace_policy,
            backtrace,
        }
    }

    fn write_to(&self, dir: &Path) -> io::Result<PathBuf> {
        fs::create_dir_all(dir)?;

        let sequence = CRASH_SEQUENCE.fetch_add(1, Ordering::Relaxed);
        let path = dir.join(format!(
            "panic-{}-{sequence:06}.log",
            self.timestamp.format("%Y%m%d-%H%M%S-%f")
        ));

        let mut file = fs::File::create(&path)?;
        writeln!(file, "timestamp_utc={}", self.timestamp.to_rfc3339())?;
        writeln!(file, "thread={}", self.thread)?;
        writeln!(file, "location={}", self.location)?;
        writeln!(file, "payload={}", self.payload)?;
        writeln!(file, "backtrace_policy={}", self.backtrace_policy)?;
        writeln!(file, "backtrace:\n{}", self.backtrace)?;
        file.flush()?;
        Ok(path)
    }
}

fn record_panic(dir: &Path, info: &PanicHookInfo<'_>) {
    if CRASH_WRITE_IN_PROGRESS
        .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
        .is_err()
    {
        return;
    }

    let result = panic::catch_unwind(panic::AssertUnwindSafe(|| {
        CrashReport::capture(info).write_to(dir)
    }));
    match result {
        Ok(Ok(_)) => {}
        Ok(Err(error)) => eprintln!(
            "Warning: failed to write panic crash artifact under '{}': {error}",
            dir.display()
        ),
        Err(_) => eprintln!(
            "Warning: panic hook failed while writing crash artifact under '{}'.",
            dir.display()
        ),
    }

    CRASH_WRITE_IN_PROGRESS.store(false, Ordering::Release);
}

fn capture_backtrace() -> (&'static str, String) {
    let backtrace = Backtrace::capture();
    match backtrace.status() {
        BacktraceStatus::Captured => ("captured", backtrace.to_string()),
        BacktraceStatus::Disabled => (
            "disabled (set RUST_BACKTRACE=1/full to enable)",
            "<disabled by backtrace policy>".to_string(),
        ),
        _ => ("unsupported", "<backtrace unavailable>".to_string()),
    }
}

fn payload_text(payload: &(dyn Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "<non-string panic payload>".to_string()
    }
}
