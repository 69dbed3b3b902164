//! The immutable input view handed to a stage just before execution.

use super::ContextSnapshot;
use crate::core::StageOutput;
use crate::stages::StagePorts;
use std::sync::Arc;

/// Everything a stage may read: the run snapshot, the outputs of its
/// declared dependencies, and injected capabilities.
///
/// `prior_outputs` contains only declared dependencies, in declaration
/// order; lookups that search across outputs resolve in that order, first
/// match wins. The view is immutable.
#[derive(Clone, Default)]
pub struct StageInputs {
    snapshot: Arc<ContextSnapshot>,
    prior: Vec<(String, StageOutput)>,
    ports: StagePorts,
}

impl StageInputs {
    /// Builds the input view for one stage.
    #[must_use]
    pub fn new(
        snapshot: Arc<ContextSnapshot>,
        prior: Vec<(String, StageOutput)>,
        ports: StagePorts,
    ) -> Self {
        Self {
            snapshot,
            prior,
            ports,
        }
    }

    /// The run's immutable snapshot.
    #[must_use]
    pub fn snapshot(&self) -> &ContextSnapshot {
        &self.snapshot
    }

    /// The injected capability ports.
    #[must_use]
    pub fn ports(&self) -> &StagePorts {
        &self.ports
    }

    /// Searches every dependency output for `key`, in declared-dependency
    /// order. First match wins.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.prior
            .iter()
            .find_map(|(_, output)| output.data.get(key))
    }

    /// Like [`get`](Self::get) but with a fallback value.
    #[must_use]
    pub fn get_or(&self, key: &str, default: serde_json::Value) -> serde_json::Value {
        self.get(key).cloned().unwrap_or(default)
    }

    /// Reads `key` from one specific dependency's output. Returns `None`
    /// when the stage is absent or did not produce the key.
    #[must_use]
    pub fn get_from(&self, stage: &str, key: &str) -> Option<&serde_json::Value> {
        self.get_output(stage).and_then(|output| output.data.get(key))
    }

    /// True when the named dependency produced an output.
    #[must_use]
    pub fn has_output(&self, stage: &str) -> bool {
        self.prior.iter().any(|(name, _)| name == stage)
    }

    /// The complete output of one dependency.
    #[must_use]
    pub fn get_output(&self, stage: &str) -> Option<&StageOutput> {
        self.prior
            .iter()
            .find(|(name, _)| name == stage)
            .map(|(_, output)| output)
    }

    /// Dependency names in declaration order.
    #[must_use]
    pub fn stages(&self) -> Vec<&str> {
        self.prior.iter().map(|(name, _)| name.as_str()).collect()
    }

    /// Number of dependency outputs available.
    #[must_use]
    pub fn len(&self) -> usize {
        self.prior.len()
    }

    /// True when the stage has no dependencies.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.prior.is_empty()
    }
}

impl std::fmt::Debug for StageInputs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageInputs")
            .field("stages", &self.stages())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs_with(prior: Vec<(&str, StageOutput)>) -> StageInputs {
        StageInputs::new(
            Arc::new(ContextSnapshot::new()),
            prior
                .into_iter()
                .map(|(name, output)| (name.to_string(), output))
                .collect(),
            StagePorts::default(),
        )
    }

    #[test]
    fn get_searches_in_declared_order() {
        let inputs = inputs_with(vec![
            ("upper", StageOutput::ok_value("text", serde_json::json!("ABC"))),
            ("reverse", StageOutput::ok_value("text", serde_json::json!("CBA"))),
        ]);

        // First declared dependency wins.
        assert_eq!(inputs.get("text"), Some(&serde_json::json!("ABC")));
        assert_eq!(inputs.get("missing"), None);
        assert_eq!(
            inputs.get_or("missing", serde_json::json!("fallback")),
            serde_json::json!("fallback")
        );
    }

    #[test]
    fn get_from_targets_one_stage() {
        let inputs = inputs_with(vec![
            ("a", StageOutput::ok_value("x", serde_json::json!(1))),
            ("b", StageOutput::ok_value("x", serde_json::json!(2))),
        ]);

        assert_eq!(inputs.get_from("b", "x"), Some(&serde_json::json!(2)));
        assert_eq!(inputs.get_from("b", "y"), None);
        assert_eq!(inputs.get_from("absent", "x"), None);
    }

    #[test]
    fn output_accessors() {
        let inputs = inputs_with(vec![
            ("a", StageOutput::ok_empty()),
            ("b", StageOutput::skip("not needed")),
        ]);

        assert!(inputs.has_output("a"));
        assert!(inputs.has_output("b"));
        assert!(!inputs.has_output("c"));
        assert_eq!(inputs.stages(), vec!["a", "b"]);
        assert_eq!(inputs.len(), 2);
        assert_eq!(
            inputs.get_output("b").map(|o| o.status),
            Some(crate::core::StageStatus::Skip)
        );
    }

    #[test]
    fn empty_inputs() {
        let inputs = inputs_with(vec![]);
        assert!(inputs.is_empty());
        assert!(inputs.get("anything").is_none());
    }
}
