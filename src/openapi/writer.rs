// SPDX-FileCopyrightText: 2025 The traffic-openapi Authors
//
// SPDX-License-Identifier: ISC

//! Spec serialization: YAML and two-space-indented JSON, plus file dispatch.

use std::path::Path;

use super::types::Spec;

/// Output encoding for a generated spec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SpecFormat {
    Json,
    #[default]
    Yaml,
}

/// Render the spec as YAML with two-space indentation.
pub fn to_yaml(spec: &Spec) -> anyhow::Result<String> {
    Ok(serde_yaml::to_string(spec)?)
}

/// Render the spec as pretty JSON with two-space indentation.
pub fn to_json(spec: &Spec) -> anyhow::Result<String> {
    let mut out = serde_json::to_string_pretty(spec)?;
    out.push('\n');
    Ok(out)
}

pub fn to_string(spec: &Spec, format: SpecFormat) -> anyhow::Result<String> {
    match format {
        SpecFormat::Json => to_json(spec),
        SpecFormat::Yaml => to_yaml(spec),
    }
}

/// Write the spec to a file; `.json` selects JSON, anything else YAML.
pub async fn write_file(path: impl AsRef<Path>, spec: &Spec) -> anyhow::Result<()> {
    let path = path.as_ref();
    let format = match path.extension().and_then(|e| e.to_str()) {
        Some("json") => SpecFormat::Json,
        _ => SpecFormat::Yaml,
    };
    tokio::fs::write(path, to_string(spec, format)?).await?;
    Ok(())
}

pub fn from_json(data: &str) -> anyhow::Result<Spec> {
    Ok(serde_json::from_str(data)?)
}

pub fn from_yaml(data: &str) -> anyhow::Result<Spec> {
    Ok(serde_yaml::from_str(data)?)
}

/// Read a spec file; `.json`/`.yaml`/`.yml` dispatch on extension, anything
/// else tries YAML first.
pub async fn read_file(path: impl AsRef<Path>) -> anyhow::Result<Spec> {
    let path = path.as_ref();
    let data = tokio::fs::read_to_string(path).await?;
    match path.extension().and_then(|e| e.to_str()) {
        Some("json") => from_json(&data),
        Some("yaml") | Some("yml") => from_yaml(&data),
        _ => from_yaml(&data).or_else(|_| from_json(&data)),
    }
}
