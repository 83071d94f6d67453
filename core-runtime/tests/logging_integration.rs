//! Integration tests for the logging system

use async_trait::async_trait;
use bridge_traits::error::Result as BridgeResult;
use bridge_traits::time::{LogEntry, LogLevel, LoggerSink};
use core_runtime::logging::{init_logging, redact_if_sensitive, strip_path, LogFormat, LoggingConfig};
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct CapturingSink {
    entries: Mutex<Vec<LogEntry>>,
}

#[async_trait]
impl LoggerSink for CapturingSink {
    async fn log(&self, entry: LogEntry) -> BridgeResult<()> {
        self.entries.lock().unwrap().push(entry);
        Ok(())
    }

    fn min_level(&self) -> LogLevel {
        LogLevel::Info
    }
}

// The global subscriber can only be installed once per process, so every
// assertion that needs it lives in this one test.
#[test]
fn test_init_logging_forwards_to_sink_once() {
    let sink = Arc::new(CapturingSink::default());
    let config = LoggingConfig::default()
        .with_format(LogFormat::Compact)
        .with_level(LogLevel::Debug)
        .with_filter("logging_integration=debug")
        .with_logger_sink(sink.clone());

    init_logging(config.clone()).expect("first init succeeds");
    assert!(init_logging(config).is_err(), "second init must fail");

    tracing::debug!(job_key = "move/a.mp3", "below sink level");
    tracing::warn!(job_key = "delete/a.mp3", note = "private", "Job retrying");

    let entries = sink.entries.lock().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].level, LogLevel::Warn);
    assert_eq!(entries[0].message, "Job retrying");
    assert_eq!(
        entries[0].fields.get("job_key").map(String::as_str),
        Some("delete/a.mp3")
    );
    assert_eq!(
        entries[0].fields.get("note").map(String::as_str),
        Some("[REDACTED]")
    );
}

#[test]
fn test_redaction_of_user_text() {
    assert_eq!(redact_if_sensitive("note", "my note"), "[REDACTED]");
    assert_eq!(redact_if_sensitive("title", "Dune"), "[REDACTED]");
    assert_eq!(redact_if_sensitive("relative_path", "Books/dune.m4b"), "Books/dune.m4b");
}

#[test]
fn test_path_stripping() {
    assert_eq!(strip_path("/var/mobile/uploads/Books/dune.m4b"), "dune.m4b");
    assert_eq!(strip_path("D:\\library\\dune.m4b"), "dune.m4b");
    assert_eq!(strip_path(""), "");
}

#[test]
fn test_config_chaining() {
    let config = LoggingConfig::default()
        .with_format(LogFormat::Compact)
        .with_level(LogLevel::Warn)
        .with_pii_redaction(false)
        .with_spans(false)
        .with_target(false)
        .with_thread_info(true);

    assert_eq!(config.format, LogFormat::Compact);
    assert_eq!(config.level, LogLevel::Warn);
    assert!(!config.redact_pii);
    assert!(!config.enable_spans);
    assert!(!config.display_target);
    assert!(config.display_thread_info);
}
