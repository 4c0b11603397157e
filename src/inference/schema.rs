// SPDX-FileCopyrightText: 2025 The traffic-openapi Authors
//
// SPDX-License-Identifier: ISC

//! Body observation walking and flat-store to schema-tree conversion.

use serde_json::Value;
use std::collections::BTreeMap;

use super::store::{merge_types, JsonType, SchemaStore, ValueFormat, MAX_EXAMPLES};

/// Walk one JSON body into the store, counting the observation.
pub fn process_body(store: &SchemaStore, body: &Value) {
    store.add_observation();
    process_value(store, "", body);
}

fn process_value(store: &SchemaStore, path: &str, value: &Value) {
    match value {
        Value::Object(obj) => {
            for (key, val) in obj {
                let child = join_path(path, key);
                process_value(store, &child, val);
            }
        }
        Value::Array(arr) => {
            let array_path = format!("{path}[]");
            if arr.is_empty() {
                // Record the path so empty arrays still appear in the tree.
                store.add_value(&array_path, &Value::Null);
                return;
            }

            if arr[0].is_object() {
                // Union of keys across all elements.
                for item in arr {
                    if let Value::Object(obj) = item {
                        for (key, val) in obj {
                            let child = join_path(&array_path, key);
                            process_value(store, &child, val);
                        }
                    }
                }
            } else {
                for item in arr {
                    store.add_value(&array_path, item);
                }
            }
        }
        other => store.add_value(path, other),
    }
}

fn join_path(base: &str, key: &str) -> String {
    if base.is_empty() {
        key.to_string()
    } else {
        format!("{base}.{key}")
    }
}

fn is_array_segment(segment: &str) -> bool {
    segment.ends_with("[]")
}

fn strip_array_suffix(segment: &str) -> &str {
    segment.strip_suffix("[]").unwrap_or(segment)
}

/// Node in the inferred schema tree.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchemaNode {
    pub ty: Option<JsonType>,
    pub format: Option<ValueFormat>,
    pub nullable: bool,
    pub properties: BTreeMap<String, SchemaNode>,
    pub items: Option<Box<SchemaNode>>,
    pub required: Vec<String>,
    pub examples: Vec<Value>,
    pub enum_values: Vec<String>,
}

impl SchemaNode {
    fn object() -> Self {
        Self {
            ty: Some(JsonType::Object),
            ..Self::default()
        }
    }

    fn array(items: SchemaNode) -> Self {
        Self {
            ty: Some(JsonType::Array),
            items: Some(Box::new(items)),
            ..Self::default()
        }
    }
}

#[derive(Default)]
struct TrieNode {
    children: BTreeMap<String, TrieNode>,
    full_path: Option<String>,
}

/// Convert the flat path map into a hierarchical schema.
pub fn build_schema_tree(store: &SchemaStore) -> SchemaNode {
    let paths = store.paths();
    if paths.is_empty() {
        return SchemaNode::object();
    }

    let mut root = TrieNode::default();
    for path in &paths {
        if path.is_empty() {
            continue;
        }
        insert_path(&mut root, path);
    }

    convert_node(&root, store, true)
}

fn insert_path(root: &mut TrieNode, full_path: &str) {
    let parts: Vec<&str> = full_path.split('.').collect();
    let mut current = root;
    for (i, part) in parts.iter().enumerate() {
        current = current.children.entry((*part).to_string()).or_default();
        if i == parts.len() - 1 {
            current.full_path = Some(full_path.to_string());
        }
    }
}

fn convert_node(node: &TrieNode, store: &SchemaStore, is_root: bool) -> SchemaNode {
    if node.children.is_empty() {
        if let Some(path) = &node.full_path {
            return leaf_schema(path, store);
        }
        return SchemaNode::object();
    }

    // A root whose only child is an array marker is itself an array.
    if is_root && node.children.len() == 1 {
        let (key, child) = node.children.iter().next().expect("single child");
        if is_array_segment(key) {
            return SchemaNode::array(convert_node(child, store, false));
        }
    }

    let mut schema = SchemaNode::object();
    for (key, child) in &node.children {
        let (prop_name, prop_schema) = if is_array_segment(key) {
            (
                strip_array_suffix(key).to_string(),
                SchemaNode::array(convert_node(child, store, false)),
            )
        } else if child.children.is_empty() && child.full_path.is_some() {
            (
                key.clone(),
                leaf_schema(child.full_path.as_deref().expect("leaf path"), store),
            )
        } else {
            (key.clone(), convert_node(child, store, false))
        };

        // Only paths recorded in the store carry optionality data; container
        // nodes without a recorded path never become required.
        if let Some(path) = &child.full_path {
            if !store.is_optional(path) {
                schema.required.push(prop_name.clone());
            }
        }

        schema.properties.insert(prop_name, prop_schema);
    }

    schema.required.sort();
    schema
}

fn leaf_schema(path: &str, store: &SchemaStore) -> SchemaNode {
    SchemaNode {
        ty: Some(store.type_of(path).unwrap_or(JsonType::String)),
        format: store.format_of(path),
        nullable: store.is_nullable(path),
        // Examples are illustrative; no enum is ever inferred from them.
        examples: store.examples_of(path),
        ..SchemaNode::default()
    }
}

/// Merge two schema nodes into one that accepts both shapes.
pub fn merge_schemas(a: &SchemaNode, b: &SchemaNode) -> SchemaNode {
    let mut result = SchemaNode {
        ty: match (a.ty, b.ty) {
            (Some(x), Some(y)) => Some(merge_types(x, y)),
            (Some(x), None) | (None, Some(x)) => Some(x),
            (None, None) => None,
        },
        format: a.format.or(b.format),
        nullable: a.nullable || b.nullable,
        examples: merge_examples(&a.examples, &b.examples, MAX_EXAMPLES),
        ..SchemaNode::default()
    };

    if a.ty == Some(JsonType::Array) || b.ty == Some(JsonType::Array) {
        result.ty = Some(JsonType::Array);
        result.items = match (&a.items, &b.items) {
            (Some(x), Some(y)) => Some(Box::new(merge_schemas(x, y))),
            (Some(x), None) | (None, Some(x)) => Some(x.clone()),
            (None, None) => None,
        };
    }

    if a.ty == Some(JsonType::Object) || b.ty == Some(JsonType::Object) {
        result.ty = Some(JsonType::Object);

        let mut names: Vec<&String> = a.properties.keys().collect();
        for name in b.properties.keys() {
            if !a.properties.contains_key(name) {
                names.push(name);
            }
        }

        for name in names {
            let merged = match (a.properties.get(name), b.properties.get(name)) {
                (Some(x), Some(y)) => merge_schemas(x, y),
                (Some(x), None) | (None, Some(x)) => x.clone(),
                (None, None) => continue,
            };
            result.properties.insert(name.clone(), merged);
        }

        // Required survives only when required on both sides.
        result.required = a
            .required
            .iter()
            .filter(|r| b.required.contains(r))
            .cloned()
            .collect();
        result.required.sort();
    }

    if !a.enum_values.is_empty() && !b.enum_values.is_empty() {
        result.enum_values = a
            .enum_values
            .iter()
            .filter(|e| b.enum_values.contains(e))
            .cloned()
            .collect();
        result.enum_values.sort();
    }

    result
}

fn merge_examples(a: &[Value], b: &[Value], max: usize) -> Vec<Value> {
    let mut result: Vec<Value> = Vec::with_capacity(max);
    for example in a.iter().chain(b.iter()) {
        if result.len() >= max {
            break;
        }
        if !result.contains(example) {
            result.push(example.clone());
        }
    }
    result
}
