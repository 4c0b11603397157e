// SPDX-FileCopyrightText: 2025 The traffic-openapi Authors
//
// SPDX-License-Identifier: ISC

//! OpenAPI document model, generator and serialization.

pub mod diff;
pub mod generator;
pub mod merge;
pub mod types;
pub mod writer;

pub use diff::{compare_specs, BreakingChange, DiffResult, OperationDiff};
pub use generator::{generate_from_inference, Generator, GeneratorOptions, SpecVersion};
pub use merge::{merge_path_items, merge_specs};
pub use types::{
    Components, Contact, Header, Info, License, MediaType, Operation, Parameter, PathItem,
    RequestBody, ResponseObject, SchemaObject, SchemaType, SecurityRequirement, SecurityScheme,
    Server, Spec,
};
pub use writer::{from_json, from_yaml, read_file, to_json, to_string, to_yaml, write_file, SpecFormat};
