pub mod event_log_sink;
pub mod progress_sink;
