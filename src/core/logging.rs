use crate::shared::errors::{AppError, StorageError};
use crate::shared::paths::ensure_dir;
use std::collections::HashMap;
use std::path::Path;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// Log targets that get their own rolling file. Everything else goes to `system.log`.
pub const LOG_TARGETS: [&str; 2] = ["recorder", "viewer"];

/// Keeps the non-blocking writers flushing. Drop it last.
pub struct LoggingGuards {
    _guards: Vec<WorkerGuard>,
}

struct TargetWriter {
    writers: HashMap<String, NonBlocking>,
    system_writer: NonBlocking,
}

impl TargetWriter {
    fn new(writers: HashMap<String, NonBlocking>, system_writer: NonBlocking) -> Self {
        Self {
            writers,
            system_writer,
        }
    }
}

impl<'a> MakeWriter<'a> for TargetWriter {
    type Writer = Box<dyn std::io::Write + 'a>;

    fn make_writer(&'a self) -> Self::Writer {
        Box::new(self.system_writer.clone())
    }

    fn make_writer_for(&'a self, meta: &tracing::Metadata<'_>) -> Self::Writer {
        match route_target(meta.target()) {
            Some(name) => match self.writers.get(name) {
                Some(writer) => Box::new(writer.clone()),
                None => Box::new(self.system_writer.clone()),
            },
            None => Box::new(self.system_writer.clone()),
        }
    }
}

/// Maps an event target to the per-target file it belongs in.
fn route_target(target: &str) -> Option<&'static str> {
    LOG_TARGETS.iter().copied().find(|name| {
        target == *name
            || target
                .strip_prefix(name)
                .is_some_and(|rest| rest.starts_with("::"))
    })
}

/// Installs the global subscriber: rolling files per target, plus stderr when `verbose`.
pub fn init_logging(log_dir: &Path, verbose: bool) -> Result<LoggingGuards, AppError> {
    ensure_dir(log_dir)
        .map_err(|e| StorageError::directory(format!("{}: {}", log_dir.display(), e)))?;

    let mut guards = Vec::new();
    let mut target_writers = HashMap::new();

    for target in LOG_TARGETS {
        let file_appender =
            RollingFileAppender::new(Rotation::DAILY, log_dir, format!("{}.log", target));
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        target_writers.insert(target.to_string(), non_blocking);
        guards.push(guard);
    }

    let system_appender = RollingFileAppender::new(Rotation::DAILY, log_dir, "system.log");
    let (system_writer, system_guard) = tracing_appender::non_blocking(system_appender);
    guards.push(system_guard);

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let stderr_layer = verbose.then(|| {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .compact()
    });

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(TargetWriter::new(target_writers, system_writer))
                .with_ansi(false)
                .with_target(true)
                .with_thread_ids(false)
                .with_thread_names(false),
        )
        .with(stderr_layer);

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| AppError::Logging(e.to_string()))?;

    tracing::info!(target: "system", "Logging initialized at {:?}", log_dir);

    Ok(LoggingGuards { _guards: guards })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_target() {
        assert_eq!(route_target("recorder"), Some("recorder"));
        assert_eq!(route_target("viewer::display"), Some("viewer"));
        assert_eq!(route_target("recorders"), None);
        assert_eq!(route_target("camrec_lib::camera"), None);
    }
}
