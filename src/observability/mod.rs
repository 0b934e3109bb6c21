//! Observability for synthquery
//!
//! Structured JSON-line logging with typed events and stage scopes.
//!
//! ```ignore
//! use synthquery::observability::{log_event_with_fields, Event, ObservationScope};
//!
//! log_event_with_fields(Event::ChunkReplaced, &[("table", "vehicles"), ("chunk", "2")]);
//!
//! let scope = ObservationScope::with_fields("SORT", &[("table", "vehicles")]);
//! // ... work ...
//! scope.complete_with_fields(&[("rows", "3")]);
//! ```

mod events;
mod logger;
mod scope;

pub use events::Event;
pub use logger::{Logger, Severity};
pub use scope::{ObservationScope, Timer};

/// Logs a typed event
pub fn log_event(event: Event) {
    log_event_with_fields(event, &[]);
}

/// Logs a typed event with fields; warning events are emitted at WARN
pub fn log_event_with_fields(event: Event, fields: &[(&str, &str)]) {
    let severity = if event.is_warning() {
        Severity::Warn
    } else {
        Severity::Info
    };
    Logger::log(severity, event.as_str(), fields);
}
