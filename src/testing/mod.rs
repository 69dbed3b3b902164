//! Test support: mock stages and context fixtures.
//!
//! Everything here is ordinary library code so host applications can use
//! the same mocks in their own test suites.

mod fixtures;
mod mocks;

pub use fixtures::{collecting_context, context_for, snapshot_with_text};
pub use mocks::{
    CancellingStage, EchoStage, FlakyStage, KeyWriterStage, RecordingStage, ReverseStage,
    SleepStage, SummarizeStage, UppercaseStage,
};
