//! Structural validation of a declared pipeline.
//!
//! Runs during `build()`, before any compilation: non-emptiness, reference
//! integrity, then cycle detection. Pure and deterministic: the same
//! builder always produces the same error.

use super::StageSpec;
use crate::errors::PipelineValidationError;
use std::collections::{BTreeMap, HashMap};

/// Validates a declared stage list.
pub(crate) fn validate(specs: &[StageSpec]) -> Result<(), PipelineValidationError> {
    if specs.is_empty() {
        return Err(PipelineValidationError::EmptyPipeline);
    }

    let by_name: HashMap<&str, &StageSpec> =
        specs.iter().map(|s| (s.name.as_str(), s)).collect();

    // Reference integrity, in declaration order so the first offense wins
    // deterministically.
    for spec in specs {
        for dep in &spec.dependencies {
            if !by_name.contains_key(dep.as_str()) {
                return Err(PipelineValidationError::MissingDependency {
                    stage: spec.name.clone(),
                    dependency: dep.clone(),
                });
            }
        }
    }

    if let Some(path) = find_cycle(&by_name) {
        return Err(PipelineValidationError::CycleDetected { path });
    }

    Ok(())
}

#[derive(Clone, Copy, PartialEq)]
enum Color {
    White,
    Gray,
    Black,
}

/// DFS coloring over dependency edges. Nodes and neighbors are visited in
/// lexicographic order, so of several cycles the one reachable from the
/// lexicographically-first starting node is reported.
fn find_cycle(by_name: &HashMap<&str, &StageSpec>) -> Option<Vec<String>> {
    // BTreeMap gives the sorted iteration order.
    let sorted: BTreeMap<&str, &StageSpec> =
        by_name.iter().map(|(k, v)| (*k, *v)).collect();

    let mut colors: HashMap<&str, Color> =
        sorted.keys().map(|name| (*name, Color::White)).collect();
    let mut path: Vec<&str> = Vec::new();

    for name in sorted.keys() {
        if colors[*name] == Color::White {
            if let Some(cycle) = visit(*name, &sorted, &mut colors, &mut path) {
                return Some(cycle);
            }
        }
    }
    None
}

fn visit<'a>(
    node: &'a str,
    specs: &BTreeMap<&'a str, &'a StageSpec>,
    colors: &mut HashMap<&'a str, Color>,
    path: &mut Vec<&'a str>,
) -> Option<Vec<String>> {
    colors.insert(node, Color::Gray);
    path.push(node);

    let mut deps: Vec<&str> = specs[node].dependencies.iter().map(String::as_str).collect();
    deps.sort_unstable();

    for dep in deps {
        match colors[dep] {
            Color::Gray => {
                // Back edge closes the cycle at `dep`.
                let start = path.iter().position(|n| *n == dep).unwrap_or(0);
                let mut cycle: Vec<String> =
                    path[start..].iter().map(ToString::to_string).collect();
                cycle.push(dep.to_string());
                return Some(cycle);
            }
            Color::White => {
                if let Some(cycle) = visit(dep, specs, colors, path) {
                    return Some(cycle);
                }
            }
            Color::Black => {}
        }
    }

    path.pop();
    colors.insert(node, Color::Black);
    None
}
