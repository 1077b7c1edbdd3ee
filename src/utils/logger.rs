use env_logger::{Builder, Target};
use log::{Level, LevelFilter, Log, Metadata, Record};
use std::fmt;
use std::io::Write;
use std::sync::Arc;

/// Installs the process-wide `env_logger` used by the CLI.
pub fn setup_logging() {
    let mut builder = Builder::from_default_env();

    builder
        .target(Target::Stdout)
        .filter_level(LevelFilter::Info)
        .parse_default_env()
        .format(|buf, record| {
            writeln!(
                buf,
                "{} [{}] [{}] {}",
                chrono::Utc::now().format("%Y-%m-%d %H:%M:%S%.3f"),
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();
}

#[derive(Clone)]
enum Sink {
    Process,
    Injected(Arc<dyn Log>),
}

/// Logging handle handed to the session and everything it builds.
///
/// Nothing below the session logs through the `log` macros directly; records
/// are written to whatever sink the caller injected, so two sessions in one
/// process can log to different places.
#[derive(Clone)]
pub struct NodeLogger {
    sink: Sink,
    target: Arc<str>,
}

impl NodeLogger {
    /// Forward records to the logger installed with `log::set_logger`.
    pub fn process(target: &str) -> Self {
        Self {
            sink: Sink::Process,
            target: Arc::from(target),
        }
    }

    pub fn injected(sink: Arc<dyn Log>, target: &str) -> Self {
        Self {
            sink: Sink::Injected(sink),
            target: Arc::from(target),
        }
    }

    /// Same sink, narrower target (`parent.child`).
    pub fn child(&self, name: &str) -> Self {
        Self {
            sink: self.sink.clone(),
            target: Arc::from(format!("{}.{}", self.target, name)),
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    fn sink(&self) -> &dyn Log {
        match &self.sink {
            Sink::Process => log::logger(),
            Sink::Injected(sink) => sink.as_ref(),
        }
    }

    pub fn enabled(&self, level: Level) -> bool {
        let metadata = Metadata::builder()
            .level(level)
            .target(&self.target)
            .build();
        self.sink().enabled(&metadata)
    }

    pub fn log(&self, level: Level, args: fmt::Arguments<'_>) {
        if !self.enabled(level) {
            return;
        }
        self.sink().log(
            &Record::builder()
                .level(level)
                .target(&self.target)
                .args(args)
                .build(),
        );
    }
}

impl fmt::Debug for NodeLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sink = match self.sink {
            Sink::Process => "process",
            Sink::Injected(_) => "injected",
        };
        f.debug_struct("NodeLogger")
            .field("sink", &sink)
            .field("target", &self.target)
            .finish()
    }
}

#[macro_export]
macro_rules! log_debug {
    ($logger:expr, $($arg:tt)+) => {
        $logger.log(::log::Level::Debug, format_args!($($arg)+))
    };
}

#[macro_export]
macro_rules! log_info {
    ($logger:expr, $($arg:tt)+) => {
        $logger.log(::log::Level::Info, format_args!($($arg)+))
    };
}

#[macro_export]
macro_rules! log_warn {
    ($logger:expr, $($arg:tt)+) => {
        $logger.log(::log::Level::Warn, format_args!($($arg)+))
    };
}

#[macro_export]
macro_rules! log_error {
    ($logger:expr, $($arg:tt)+) => {
        $logger.log(::log::Level::Error, format_args!($($arg)+))
    };
}

/// In-memory sink, handy for asserting on what a node logged.
#[derive(Default)]
pub struct MemoryLog {
    lines: std::sync::Mutex<Vec<String>>,
}

impl MemoryLog {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn lines(&self) -> Vec<String> {
        match self.lines.lock() {
            Ok(lines) => lines.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.lines().iter().any(|line| line.contains(needle))
    }
}

impl Log for MemoryLog {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        let line = format!("[{}] [{}] {}", record.level(), record.target(), record.args());
        match self.lines.lock() {
            Ok(mut lines) => lines.push(line),
            Err(poisoned) => poisoned.into_inner().push(line),
        }
    }

    fn flush(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_injected_sink_receives_records() {
        let sink = MemoryLog::new();
        let logger = NodeLogger::injected(sink.clone(), "mini_ipfs");
        crate::log_info!(logger, "hello {}", 42);
        crate::log_debug!(logger.child("dht"), "contacts: {}", 3);

        let lines = sink.lines();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("hello 42"));
        assert!(lines[1].contains("mini_ipfs.dht"));
    }
}
