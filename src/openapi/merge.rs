// SPDX-FileCopyrightText: 2025 The traffic-openapi Authors
//
// SPDX-License-Identifier: ISC

//! Merging multiple OpenAPI documents into one.

use super::types::{Components, PathItem, Spec};

/// Merge several specs into the first one.
///
/// Later specs contribute paths, operations, servers and components that the
/// accumulated document does not already define; existing entries always win.
/// Returns `None` for an empty input.
pub fn merge_specs(specs: Vec<Spec>) -> Option<Spec> {
    let mut iter = specs.into_iter();
    let mut merged = iter.next()?;

    for spec in iter {
        for (path, item) in spec.paths {
            match merged.paths.get_mut(&path) {
                Some(existing) => merge_path_items(existing, item),
                None => {
                    merged.paths.insert(path, item);
                }
            }
        }

        for server in spec.servers {
            if !merged.servers.iter().any(|s| s.url == server.url) {
                merged.servers.push(server);
            }
        }

        if let Some(components) = spec.components {
            let target = merged.components.get_or_insert_with(Components::default);
            merge_components(target, components);
        }
    }

    Some(merged)
}

/// Fill operations missing on the target from the source path item.
pub fn merge_path_items(target: &mut PathItem, source: PathItem) {
    if target.get.is_none() {
        target.get = source.get;
    }
    if target.put.is_none() {
        target.put = source.put;
    }
    if target.post.is_none() {
        target.post = source.post;
    }
    if target.delete.is_none() {
        target.delete = source.delete;
    }
    if target.options.is_none() {
        target.options = source.options;
    }
    if target.head.is_none() {
        target.head = source.head;
    }
    if target.patch.is_none() {
        target.patch = source.patch;
    }
    if target.trace.is_none() {
        target.trace = source.trace;
    }
    if target.connect.is_none() {
        target.connect = source.connect;
    }
}

fn merge_components(target: &mut Components, source: Components) {
    for (name, schema) in source.schemas {
        target.schemas.entry(name).or_insert(schema);
    }
    for (name, scheme) in source.security_schemes {
        target.security_schemes.entry(name).or_insert(scheme);
    }
}
