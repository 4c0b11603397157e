// SPDX-FileCopyrightText: 2025 The traffic-openapi Authors
//
// SPDX-License-Identifier: ISC

//! Deterministic assembly of an OpenAPI document from inference results.

use std::collections::BTreeMap;

use crate::inference::{
    build_schema_tree, EndpointData, InferenceResult, JsonType, ParamData, ResponseData,
    SchemaNode, SecuritySchemeKind,
};

use super::types::{
    Components, Header, Info, MediaType, Operation, Parameter, RequestBody, ResponseObject,
    SchemaObject, SchemaType, SecurityRequirement, SecurityScheme, Server, Spec,
};

/// Target OpenAPI version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecVersion {
    V3_0_3,
    V3_1_0,
    V3_2_0,
}

impl SpecVersion {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpecVersion::V3_0_3 => "3.0.3",
            SpecVersion::V3_1_0 => "3.1.0",
            SpecVersion::V3_2_0 => "3.2.0",
        }
    }

    pub fn parse(s: &str) -> Option<SpecVersion> {
        match s {
            "3.0.3" | "3.0" => Some(SpecVersion::V3_0_3),
            "3.1.0" | "3.1" => Some(SpecVersion::V3_1_0),
            "3.2.0" | "3.2" => Some(SpecVersion::V3_2_0),
            _ => None,
        }
    }
}

/// Generator configuration.
#[derive(Debug, Clone)]
pub struct GeneratorOptions {
    pub version: SpecVersion,
    pub title: String,
    pub description: Option<String>,
    pub api_version: String,

    /// Explicit server URLs; when empty, servers come from observed
    /// schemes and hosts.
    pub servers: Vec<String>,

    /// Attach every detected scheme to every operation. Disable when the
    /// blanket requirement misrepresents unauthenticated endpoints.
    pub attach_operation_security: bool,
}

impl Default for GeneratorOptions {
    fn default() -> Self {
        Self {
            version: SpecVersion::V3_1_0,
            title: "Generated API".to_string(),
            description: None,
            api_version: "1.0.0".to_string(),
            servers: Vec::new(),
            attach_operation_security: true,
        }
    }
}

/// Converts a frozen [`InferenceResult`] into an OpenAPI [`Spec`].
pub struct Generator {
    options: GeneratorOptions,
}

impl Default for Generator {
    fn default() -> Self {
        Self::new(GeneratorOptions::default())
    }
}

impl Generator {
    pub fn new(options: GeneratorOptions) -> Self {
        Self { options }
    }

    /// Repeated generations over the same input produce identical documents.
    pub fn generate(&self, result: &InferenceResult) -> Spec {
        let mut spec = Spec {
            openapi: self.options.version.as_str().to_string(),
            info: Info {
                title: self.options.title.clone(),
                description: self.options.description.clone(),
                version: self.options.api_version.clone(),
                contact: None,
                license: None,
            },
            servers: self.build_servers(result),
            paths: BTreeMap::new(),
            components: None,
        };

        if !result.security_schemes.is_empty() {
            let mut schemes = BTreeMap::new();
            for (key, detected) in &result.security_schemes {
                let mut scheme = SecurityScheme {
                    scheme_type: detected.kind.as_str().to_string(),
                    ..SecurityScheme::default()
                };
                match detected.kind {
                    SecuritySchemeKind::Http => {
                        scheme.scheme = detected.scheme.clone();
                        scheme.bearer_format = detected.bearer_format.clone();
                    }
                    SecuritySchemeKind::ApiKey => {
                        scheme.name = detected.name.clone();
                        scheme.location = detected.location.clone();
                    }
                }
                schemes.insert(key.clone(), scheme);
            }
            spec.components = Some(Components {
                schemas: BTreeMap::new(),
                security_schemes: schemes,
            });
        }

        let security_keys: Vec<&String> = result.security_schemes.keys().collect();

        for endpoint in result.endpoints.values() {
            self.add_endpoint(&mut spec, endpoint, &security_keys);
        }

        spec
    }

    fn build_servers(&self, result: &InferenceResult) -> Vec<Server> {
        if !self.options.servers.is_empty() {
            return self
                .options
                .servers
                .iter()
                .map(|url| Server {
                    url: url.clone(),
                    description: None,
                })
                .collect();
        }

        let mut servers = Vec::new();
        for scheme in &result.schemes {
            for host in &result.hosts {
                servers.push(Server {
                    url: format!("{scheme}://{host}"),
                    description: None,
                });
            }
        }
        servers.sort_by(|a, b| a.url.cmp(&b.url));
        servers
    }

    fn add_endpoint(&self, spec: &mut Spec, endpoint: &EndpointData, security_keys: &[&String]) {
        let operation = self.build_operation(endpoint, security_keys);
        let item = spec
            .paths
            .entry(endpoint.path_template.clone())
            .or_default();

        match endpoint.method.to_ascii_uppercase().as_str() {
            "GET" => item.get = Some(operation),
            "POST" => item.post = Some(operation),
            "PUT" => item.put = Some(operation),
            "DELETE" => item.delete = Some(operation),
            "PATCH" => item.patch = Some(operation),
            "HEAD" => item.head = Some(operation),
            "OPTIONS" => item.options = Some(operation),
            "TRACE" => item.trace = Some(operation),
            "CONNECT" => item.connect = Some(operation),
            other => tracing::warn!(method = other, "skipping unknown method"),
        }
    }

    fn build_operation(&self, endpoint: &EndpointData, security_keys: &[&String]) -> Operation {
        let mut op = Operation {
            summary: Some(format!("{} {}", endpoint.method, endpoint.path_template)),
            operation_id: Some(operation_id(&endpoint.method, &endpoint.path_template)),
            ..Operation::default()
        };

        if self.options.attach_operation_security && !security_keys.is_empty() {
            let requirements = security_keys
                .iter()
                .map(|key| {
                    let mut requirement = SecurityRequirement::new();
                    requirement.insert((*key).clone(), Vec::new());
                    requirement
                })
                .collect();
            op.security = Some(requirements);
        }

        for param in endpoint.path_params.values() {
            op.parameters.push(self.build_parameter(param, "path", true));
        }
        for param in endpoint.query_params.values() {
            op.parameters
                .push(self.build_parameter(param, "query", param.required));
        }
        for param in endpoint.header_params.values() {
            op.parameters
                .push(self.build_parameter(param, "header", param.required));
        }
        op.parameters.sort_by(|a, b| {
            location_rank(&a.location)
                .cmp(&location_rank(&b.location))
                .then_with(|| a.name.cmp(&b.name))
        });

        if let Some(body) = &endpoint.request_body {
            if body.schema.has_examples() {
                let content_type = if body.content_type.is_empty() {
                    "application/json".to_string()
                } else {
                    body.content_type.clone()
                };
                let schema = self.convert_schema(&build_schema_tree(&body.schema));
                let mut content = BTreeMap::new();
                content.insert(
                    content_type,
                    MediaType {
                        schema: Some(schema),
                        example: None,
                    },
                );
                op.request_body = Some(RequestBody {
                    description: None,
                    content,
                    required: true,
                });
            }
        }

        for (status, response) in &endpoint.responses {
            op.responses
                .insert(status.to_string(), self.build_response(response));
        }
        if op.responses.is_empty() {
            op.responses.insert(
                "200".to_string(),
                ResponseObject {
                    description: "Successful response".to_string(),
                    ..ResponseObject::default()
                },
            );
        }

        op
    }

    fn build_parameter(&self, param: &ParamData, location: &str, required: bool) -> Parameter {
        Parameter {
            name: param.name.clone(),
            location: location.to_string(),
            description: None,
            required,
            schema: Some(SchemaObject {
                schema_type: Some(SchemaType::One(param.ty.as_str().to_string())),
                format: param.format.map(|f| f.as_str().to_string()),
                ..SchemaObject::default()
            }),
            example: param.examples.first().cloned(),
        }
    }

    fn build_response(&self, response: &ResponseData) -> ResponseObject {
        let mut out = ResponseObject {
            description: format!("Status {} response", response.status),
            ..ResponseObject::default()
        };

        for (name, param) in &response.headers {
            out.headers.insert(
                name.clone(),
                Header {
                    description: None,
                    schema: Some(SchemaObject {
                        schema_type: Some(SchemaType::One(param.ty.as_str().to_string())),
                        ..SchemaObject::default()
                    }),
                },
            );
        }

        if response.body.has_examples() {
            let content_type = if response.content_type.is_empty() {
                "application/json".to_string()
            } else {
                response.content_type.clone()
            };
            let schema = self.convert_schema(&build_schema_tree(&response.body));
            out.content.insert(
                content_type,
                MediaType {
                    schema: Some(schema),
                    example: None,
                },
            );
        }

        out
    }

    /// Nullable encoding is version-dependent: 3.1 renders a type array,
    /// 3.0 and 3.2 drop the information.
    fn convert_schema(&self, node: &SchemaNode) -> SchemaObject {
        let mut schema = SchemaObject::default();

        let ty = node.ty.unwrap_or(JsonType::Object);
        schema.schema_type = if node.nullable && self.options.version == SpecVersion::V3_1_0 {
            Some(SchemaType::Many(vec![
                ty.as_str().to_string(),
                "null".to_string(),
            ]))
        } else {
            Some(SchemaType::One(ty.as_str().to_string()))
        };

        schema.format = node.format.map(|f| f.as_str().to_string());

        if !node.enum_values.is_empty() {
            schema.enum_values = node
                .enum_values
                .iter()
                .map(|v| serde_json::Value::String(v.clone()))
                .collect();
        }

        if !node.examples.is_empty() && self.options.version == SpecVersion::V3_1_0 {
            schema.examples = node.examples.clone();
        }

        if ty == JsonType::Array {
            if let Some(items) = &node.items {
                schema.items = Some(Box::new(self.convert_schema(items)));
            }
        }

        if ty == JsonType::Object && !node.properties.is_empty() {
            for (name, prop) in &node.properties {
                schema
                    .properties
                    .insert(name.clone(), self.convert_schema(prop));
            }
            schema.required = node.required.clone();
        }

        schema
    }
}

/// Operation id from method and template: `GET /users/{userId}/posts`
/// becomes `getUsersByUserIdPosts`.
fn operation_id(method: &str, path: &str) -> String {
    let mut id = method.to_ascii_lowercase();

    for segment in path.trim_start_matches('/').split('/') {
        if segment.is_empty() {
            continue;
        }
        if let Some(param) = segment
            .strip_prefix('{')
            .and_then(|s| s.strip_suffix('}'))
        {
            id.push_str("By");
            id.push_str(&capitalize(param));
        } else {
            id.push_str(&capitalize(segment));
        }
    }

    id
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

fn location_rank(location: &str) -> u8 {
    match location {
        "path" => 0,
        "query" => 1,
        "header" => 2,
        "cookie" => 3,
        _ => 4,
    }
}

/// One-shot generation with the given options.
pub fn generate_from_inference(result: &InferenceResult, options: GeneratorOptions) -> Spec {
    Generator::new(options).generate(result)
}
