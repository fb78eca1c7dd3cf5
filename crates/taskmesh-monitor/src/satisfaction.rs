// SPDX-License-Identifier: MIT OR Apache-2.0
//! Input satisfaction checks against delivered artifacts.

use globset::Glob;
use taskmesh_core::InputSelector;

use crate::evidence::DeliveredArtifact;

/// Whether `delivered` (every artifact delivered to a node's assigned
/// agent) satisfies a node's declared inputs.
///
/// Structured `inputs[]` selectors take priority over the bare
/// `required_inputs[]` list when present. An uncompilable `by_glob`
/// pattern, like any other selector this code can't evaluate, marks the
/// node unsatisfied rather than panicking or silently passing.
#[must_use]
pub fn inputs_satisfied(
    inputs: Option<&[InputSelector]>,
    required_inputs: Option<&[String]>,
    delivered: &[DeliveredArtifact],
) -> bool {
    if let Some(selectors) = inputs {
        return selectors.iter().all(|s| selector_satisfied(s, delivered));
    }
    if let Some(required) = required_inputs {
        return required.iter().all(|name| file_delivered(delivered, name));
    }
    true
}

fn selector_satisfied(selector: &InputSelector, delivered: &[DeliveredArtifact]) -> bool {
    match selector {
        InputSelector::ByOutputName { output_name } => delivered
            .iter()
            .any(|d| d.output_name.as_deref() == Some(output_name.as_str())),
        InputSelector::ByFileName { file_name } => file_delivered(delivered, file_name),
        InputSelector::ByGlob { glob } => {
            let Ok(pattern) = Glob::new(glob) else {
                return false;
            };
            let matcher = pattern.compile_matcher();
            delivered.iter().any(|d| d.file_names.iter().any(|f| matcher.is_match(f)))
        }
    }
}

fn file_delivered(delivered: &[DeliveredArtifact], name: &str) -> bool {
    delivered.iter().any(|d| d.file_names.iter().any(|f| f == name))
}

/// The required filenames still missing from `delivered`, used by the
/// `BLOCKED_WAITING_INPUT` derivation for a `wait_for_inputs` command.
#[must_use]
pub fn missing_required_inputs(required: &[String], delivered: &[DeliveredArtifact]) -> Vec<String> {
    required
        .iter()
        .filter(|name| !file_delivered(delivered, name))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn artifact(output_name: Option<&str>, files: &[&str]) -> DeliveredArtifact {
        DeliveredArtifact {
            output_name: output_name.map(str::to_string),
            file_names: files.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn by_output_name_matches() {
        let delivered = vec![artifact(Some("draft"), &["draft.md"])];
        let selectors = vec![InputSelector::ByOutputName { output_name: "draft".into() }];
        assert!(inputs_satisfied(Some(&selectors), None, &delivered));
    }

    #[test]
    fn by_glob_matches_suffix() {
        let delivered = vec![artifact(None, &["report.csv"])];
        let selectors = vec![InputSelector::ByGlob { glob: "*.csv".into() }];
        assert!(inputs_satisfied(Some(&selectors), None, &delivered));
    }

    #[test]
    fn missing_selector_is_unsatisfied() {
        let delivered: Vec<DeliveredArtifact> = vec![];
        let selectors = vec![InputSelector::ByFileName { file_name: "a.txt".into() }];
        assert!(!inputs_satisfied(Some(&selectors), None, &delivered));
    }

    #[test]
    fn required_inputs_used_when_no_selectors() {
        let delivered = vec![artifact(None, &["a.txt", "b.txt"])];
        assert!(inputs_satisfied(None, Some(&["a.txt".to_string()]), &delivered));
        assert!(!inputs_satisfied(None, Some(&["c.txt".to_string()]), &delivered));
    }

    #[test]
    fn missing_required_inputs_reports_gap() {
        let delivered = vec![artifact(None, &["a.txt"])];
        let required = vec!["a.txt".to_string(), "b.txt".to_string()];
        assert_eq!(missing_required_inputs(&required, &delivered), vec!["b.txt".to_string()]);
    }
}
