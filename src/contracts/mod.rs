//! Stage-contract support: the fix-hint registry and the typed-output
//! wrapper.

mod suggestions;
mod typed_output;

pub use suggestions::{register_suggestion, suggestion_for, Suggestion};
pub use typed_output::TypedOutput;
