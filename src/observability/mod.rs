//! Observability schema and emission helpers.

mod wide_events;

pub use wide_events::WideEvent;
