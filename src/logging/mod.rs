//! Audit trail for put-away commits.
//!
//! Diagnostics go through `tracing`; this logger records only what an
//! operator committed and how the backend answered.

use slog::{o, Drain, Logger};
use slog_async::Async;
use slog_term::{FullFormat, PlainDecorator, TermDecorator};

use crate::models::QueueKind;

/// Configuration for setting up the logger
#[derive(Debug, Clone)]
pub struct LoggerConfig {
    pub async_buffer_size: usize,
    pub use_color: bool,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            async_buffer_size: 1024,
            use_color: true,
        }
    }
}

impl LoggerConfig {
    pub fn with_color(use_color: bool) -> Self {
        Self {
            use_color,
            ..Self::default()
        }
    }
}

/// Sets up an asynchronous terminal logger for the audit trail.
pub fn setup_logger(config: LoggerConfig) -> Logger {
    let decorator = {
        let builder = TermDecorator::new().stderr();
        let builder = if config.use_color {
            builder.force_color()
        } else {
            builder.force_plain()
        };
        builder.build()
    };

    let drain = FullFormat::new(decorator).build().fuse();

    let drain = Async::new(drain)
        .chan_size(config.async_buffer_size)
        .build()
        .fuse();

    Logger::root(
        drain,
        o!("version" => env!("CARGO_PKG_VERSION"), "component" => "putaway-audit"),
    )
}

/// Logger writing plain lines to any writer; used where no terminal exists.
pub fn writer_logger<W: std::io::Write + Send + 'static>(writer: W) -> Logger {
    let decorator = PlainDecorator::new(writer);
    let drain = FullFormat::new(decorator).build().fuse();
    let drain = std::sync::Mutex::new(drain).fuse();
    Logger::root(drain, o!("component" => "putaway-audit"))
}

/// Logger that drops every record.
pub fn discard() -> Logger {
    Logger::root(slog::Discard, o!())
}

pub fn audit_committed(logger: &Logger, kind: QueueKind, id: &str, lines: usize, racks: &[&str]) {
    slog::info!(
        logger,
        "put-away committed";
        "kind" => %kind,
        "id" => id,
        "lines" => lines,
        "racks" => racks.join(","),
    );
}

pub fn audit_rejected(logger: &Logger, kind: QueueKind, id: &str, reason: &str) {
    slog::warn!(
        logger,
        "put-away rejected";
        "kind" => %kind,
        "id" => id,
        "reason" => reason,
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn audit_records_carry_kind_and_id() {
        let buffer = SharedBuffer::default();
        let logger = writer_logger(buffer.clone());

        audit_committed(&logger, QueueKind::PurchaseReceipt, "p-1", 2, &["A1-R01-S1-B01"]);
        audit_rejected(&logger, QueueKind::SalesReturn, "r-9", "Rack is required");

        let output = String::from_utf8(buffer.0.lock().unwrap().clone()).unwrap();
        assert!(output.contains("put-away committed"));
        assert!(output.contains("kind: Purchase Receipt Item"));
        assert!(output.contains("racks: A1-R01-S1-B01"));
        assert!(output.contains("reason: Rack is required"));
    }

    #[test]
    fn setup_logger_builds_without_color() {
        let logger = setup_logger(LoggerConfig::with_color(false));
        slog::info!(logger, "audit logger ready");
    }
}
