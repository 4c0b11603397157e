// SPDX-FileCopyrightText: 2025 The traffic-openapi Authors
//
// SPDX-License-Identifier: ISC

//! Comparison of two OpenAPI documents, with breaking-change detection.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt::Write as _;

use super::types::{Operation, PathItem, Spec};

/// Differences between an old and a new spec.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DiffResult {
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub added_paths: Vec<String>,

    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub removed_paths: Vec<String>,

    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub added_operations: Vec<String>,

    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub removed_operations: Vec<String>,

    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub modified_operations: Vec<OperationDiff>,

    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub breaking_changes: Vec<BreakingChange>,
}

impl DiffResult {
    pub fn has_changes(&self) -> bool {
        !self.added_paths.is_empty()
            || !self.removed_paths.is_empty()
            || !self.added_operations.is_empty()
            || !self.removed_operations.is_empty()
            || !self.modified_operations.is_empty()
            || !self.breaking_changes.is_empty()
    }

    /// Keep only removals and breaking changes.
    pub fn breaking_only(self) -> DiffResult {
        DiffResult {
            removed_paths: self.removed_paths,
            removed_operations: self.removed_operations,
            breaking_changes: self.breaking_changes,
            ..DiffResult::default()
        }
    }
}

/// Parameter and response changes on one operation.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OperationDiff {
    pub path: String,
    pub method: String,

    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub added_params: Vec<String>,

    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub removed_params: Vec<String>,

    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub added_responses: Vec<String>,

    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub removed_responses: Vec<String>,
}

/// A change that can break existing API consumers.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BreakingChange {
    #[serde(rename = "type")]
    pub kind: String,

    pub path: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,

    pub description: String,
}

const METHOD_NAMES: [&str; 9] = [
    "GET", "POST", "PUT", "DELETE", "PATCH", "HEAD", "OPTIONS", "TRACE", "CONNECT",
];

fn operation_for<'a>(item: &'a PathItem, method: &str) -> Option<&'a Operation> {
    match method {
        "GET" => item.get.as_ref(),
        "POST" => item.post.as_ref(),
        "PUT" => item.put.as_ref(),
        "DELETE" => item.delete.as_ref(),
        "PATCH" => item.patch.as_ref(),
        "HEAD" => item.head.as_ref(),
        "OPTIONS" => item.options.as_ref(),
        "TRACE" => item.trace.as_ref(),
        "CONNECT" => item.connect.as_ref(),
        _ => None,
    }
}

/// Compare two specs; removals surface as breaking changes.
pub fn compare_specs(old: &Spec, new: &Spec) -> DiffResult {
    let mut result = DiffResult::default();

    for path in new.paths.keys() {
        if !old.paths.contains_key(path) {
            result.added_paths.push(path.clone());
        }
    }
    for path in old.paths.keys() {
        if !new.paths.contains_key(path) {
            result.removed_paths.push(path.clone());
            result.breaking_changes.push(BreakingChange {
                kind: "path_removed".to_string(),
                path: path.clone(),
                method: None,
                description: format!("Path {path} was removed"),
            });
        }
    }

    for (path, old_item) in &old.paths {
        let Some(new_item) = new.paths.get(path) else {
            continue;
        };
        compare_path_items(&mut result, path, old_item, new_item);
    }

    result
}

fn compare_path_items(result: &mut DiffResult, path: &str, old: &PathItem, new: &PathItem) {
    for method in METHOD_NAMES {
        let op_key = format!("{method} {path}");
        match (operation_for(old, method), operation_for(new, method)) {
            (None, Some(_)) => result.added_operations.push(op_key),
            (Some(_), None) => {
                result.removed_operations.push(op_key);
                result.breaking_changes.push(BreakingChange {
                    kind: "operation_removed".to_string(),
                    path: path.to_string(),
                    method: Some(method.to_string()),
                    description: format!("Operation {method} {path} was removed"),
                });
            }
            (Some(old_op), Some(new_op)) => {
                if let Some(diff) = compare_operations(path, method, old_op, new_op) {
                    for param in &diff.removed_params {
                        result.breaking_changes.push(BreakingChange {
                            kind: "parameter_removed".to_string(),
                            path: path.to_string(),
                            method: Some(method.to_string()),
                            description: format!(
                                "Parameter '{param}' was removed from {method} {path}"
                            ),
                        });
                    }
                    result.modified_operations.push(diff);
                }
            }
            (None, None) => {}
        }
    }
}

fn compare_operations(
    path: &str,
    method: &str,
    old: &Operation,
    new: &Operation,
) -> Option<OperationDiff> {
    let old_params: BTreeSet<String> = old
        .parameters
        .iter()
        .map(|p| format!("{}:{}", p.location, p.name))
        .collect();
    let new_params: BTreeSet<String> = new
        .parameters
        .iter()
        .map(|p| format!("{}:{}", p.location, p.name))
        .collect();

    let old_responses: BTreeSet<&String> = old.responses.keys().collect();
    let new_responses: BTreeSet<&String> = new.responses.keys().collect();

    let diff = OperationDiff {
        path: path.to_string(),
        method: method.to_string(),
        added_params: new_params.difference(&old_params).cloned().collect(),
        removed_params: old_params.difference(&new_params).cloned().collect(),
        added_responses: new_responses
            .difference(&old_responses)
            .map(|s| (*s).clone())
            .collect(),
        removed_responses: old_responses
            .difference(&new_responses)
            .map(|s| (*s).clone())
            .collect(),
    };

    let unchanged = diff.added_params.is_empty()
        && diff.removed_params.is_empty()
        && diff.added_responses.is_empty()
        && diff.removed_responses.is_empty();
    if unchanged {
        None
    } else {
        Some(diff)
    }
}

/// Render a diff as machine-readable JSON.
pub fn render_json(result: &DiffResult) -> anyhow::Result<String> {
    Ok(serde_json::to_string_pretty(result)?)
}

/// Render a diff as a human-readable report.
pub fn render_text(result: &DiffResult) -> String {
    if !result.has_changes() {
        return "No differences found.\n".to_string();
    }

    let mut out = String::new();

    let mut section = |title: &str, entries: &[String], marker: &str| {
        if entries.is_empty() {
            return;
        }
        let _ = writeln!(out, "{title}:");
        for entry in entries {
            let _ = writeln!(out, "  {marker} {entry}");
        }
    };

    section("Added Paths", &result.added_paths, "+");
    section("Removed Paths", &result.removed_paths, "-");
    section("Added Operations", &result.added_operations, "+");
    section("Removed Operations", &result.removed_operations, "-");

    if !result.modified_operations.is_empty() {
        let _ = writeln!(out, "Modified Operations:");
        for op in &result.modified_operations {
            let _ = writeln!(out, "  ~ {} {}", op.method, op.path);
            for p in &op.added_params {
                let _ = writeln!(out, "    + param: {p}");
            }
            for p in &op.removed_params {
                let _ = writeln!(out, "    - param: {p}");
            }
            for r in &op.added_responses {
                let _ = writeln!(out, "    + response: {r}");
            }
            for r in &op.removed_responses {
                let _ = writeln!(out, "    - response: {r}");
            }
        }
    }

    if !result.breaking_changes.is_empty() {
        let _ = writeln!(out, "Breaking Changes:");
        for change in &result.breaking_changes {
            let _ = writeln!(
                out,
                "  ! [{}] {}",
                change.kind.to_ascii_uppercase(),
                change.description
            );
        }
    }

    let _ = writeln!(
        out,
        "Summary: {} added, {} removed, {} modified, {} breaking",
        result.added_paths.len() + result.added_operations.len(),
        result.removed_paths.len() + result.removed_operations.len(),
        result.modified_operations.len(),
        result.breaking_changes.len()
    );

    out
}

#[cfg(test)]
mod tests {
    use super::super::generator::Generator;
    use super::*;
    use crate::inference::infer_from_records;
    use crate::record::{IrRecord, Method, QueryValue};
    use std::collections::HashMap;

    fn spec_for(records: Vec<IrRecord>) -> Spec {
        Generator::default().generate(&infer_from_records(&records))
    }

    #[test]
    fn identical_specs_have_no_changes() {
        let spec = spec_for(vec![IrRecord::new(Method::Get, "/a", 200)]);
        let result = compare_specs(&spec, &spec.clone());
        assert!(!result.has_changes());
        assert_eq!(render_text(&result), "No differences found.\n");
    }

    #[test]
    fn added_and_removed_paths() {
        let old = spec_for(vec![
            IrRecord::new(Method::Get, "/kept", 200),
            IrRecord::new(Method::Get, "/gone", 200),
        ]);
        let new = spec_for(vec![
            IrRecord::new(Method::Get, "/kept", 200),
            IrRecord::new(Method::Get, "/fresh", 200),
        ]);

        let result = compare_specs(&old, &new);
        assert_eq!(result.added_paths, vec!["/fresh".to_string()]);
        assert_eq!(result.removed_paths, vec!["/gone".to_string()]);
        assert_eq!(result.breaking_changes.len(), 1);
        assert_eq!(result.breaking_changes[0].kind, "path_removed");
    }

    #[test]
    fn removed_operation_is_breaking() {
        let old = spec_for(vec![
            IrRecord::new(Method::Get, "/things", 200),
            IrRecord::new(Method::Post, "/things", 201),
        ]);
        let new = spec_for(vec![IrRecord::new(Method::Get, "/things", 200)]);

        let result = compare_specs(&old, &new);
        assert_eq!(
            result.removed_operations,
            vec!["POST /things".to_string()]
        );
        assert!(result
            .breaking_changes
            .iter()
            .any(|c| c.kind == "operation_removed"));
    }

    #[test]
    fn removed_parameter_is_breaking() {
        let mut with_param = HashMap::new();
        with_param.insert("q".to_string(), QueryValue::One("x".to_string()));

        let old = spec_for(vec![
            IrRecord::new(Method::Get, "/search", 200).with_query(with_param)
        ]);
        let new = spec_for(vec![IrRecord::new(Method::Get, "/search", 200)]);

        let result = compare_specs(&old, &new);
        let diff = &result.modified_operations[0];
        assert_eq!(diff.removed_params, vec!["query:q".to_string()]);
        assert!(result
            .breaking_changes
            .iter()
            .any(|c| c.kind == "parameter_removed"));
    }

    #[test]
    fn new_response_codes_are_additive() {
        let old = spec_for(vec![IrRecord::new(Method::Get, "/a", 200)]);
        let new = spec_for(vec![
            IrRecord::new(Method::Get, "/a", 200),
            IrRecord::new(Method::Get, "/a", 404),
        ]);

        let result = compare_specs(&old, &new);
        let diff = &result.modified_operations[0];
        assert_eq!(diff.added_responses, vec!["404".to_string()]);
        assert!(result.breaking_changes.is_empty());
    }

    #[test]
    fn breaking_only_filter_drops_additions() {
        let old = spec_for(vec![IrRecord::new(Method::Get, "/gone", 200)]);
        let new = spec_for(vec![IrRecord::new(Method::Get, "/fresh", 200)]);

        let result = compare_specs(&old, &new).breaking_only();
        assert!(result.added_paths.is_empty());
        assert_eq!(result.removed_paths, vec!["/gone".to_string()]);
    }

    #[test]
    fn text_report_lists_sections_and_summary() {
        let old = spec_for(vec![IrRecord::new(Method::Get, "/gone", 200)]);
        let new = spec_for(vec![IrRecord::new(Method::Get, "/fresh", 200)]);

        let text = render_text(&compare_specs(&old, &new));
        assert!(text.contains("Added Paths:"));
        assert!(text.contains("+ /fresh"));
        assert!(text.contains("- /gone"));
        assert!(text.contains("[PATH_REMOVED]"));
        assert!(text.contains("Summary: 1 added, 1 removed, 0 modified, 1 breaking"));
    }

    #[test]
    fn json_report_roundtrips() -> anyhow::Result<()> {
        let old = spec_for(vec![IrRecord::new(Method::Get, "/gone", 200)]);
        let new = spec_for(vec![IrRecord::new(Method::Get, "/fresh", 200)]);

        let result = compare_specs(&old, &new);
        let text = render_json(&result)?;
        let back: DiffResult = serde_json::from_str(&text)?;
        assert_eq!(result, back);
        Ok(())
    }
}
