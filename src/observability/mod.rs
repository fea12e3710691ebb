use std::time::Duration;

use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::protocol::decoder::UsageSnapshot;

/// Initialize the tracing subscriber with the configured log level.
///
/// Maps config log levels to tracing levels:
/// - "DISABLED" -> no subscriber installed
/// - "WARNING" -> WARN
/// - "CRITICAL" -> ERROR
/// - Others map directly (DEBUG, INFO, ERROR)
pub fn init_tracing(log_level: &str) {
    let Some(directive) = tracing_directive(log_level) else {
        return;
    };

    let filter = EnvFilter::try_new(directive).unwrap_or_else(|_| EnvFilter::new("INFO"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}

fn tracing_directive(log_level: &str) -> Option<String> {
    let level = log_level.to_uppercase();
    match level.as_str() {
        "DISABLED" => None,
        "WARNING" => Some("WARN".to_string()),
        "CRITICAL" => Some("ERROR".to_string()),
        _ => Some(level),
    }
}

/// Whole milliseconds in `duration`, saturating at `u64::MAX`.
pub(crate) fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Log token usage for a completed relay at INFO level.
pub fn log_request_usage(
    request_id: &uuid::Uuid,
    model: &str,
    usage: &UsageSnapshot,
    content_events: u64,
    duration: Duration,
) {
    info!(
        request_id = %request_id,
        model = model,
        input_tokens = usage.prompt_tokens,
        output_tokens = usage.completion_tokens,
        total_tokens = usage.total_tokens(),
        content_events = content_events,
        elapsed_ms = duration_millis(duration),
        "request completed"
    );
}
