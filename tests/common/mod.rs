// SPDX-FileCopyrightText: 2025 The traffic-openapi Authors
//
// SPDX-License-Identifier: ISC

use serde_json::Value;
use std::collections::HashMap;

use traffic_openapi::{IrRecord, Method, QueryValue};

pub fn get(path: &str, status: u16) -> IrRecord {
    IrRecord::new(Method::Get, path, status)
}

pub fn get_with_body(path: &str, status: u16, body: Value) -> IrRecord {
    get(path, status)
        .with_response_content_type("application/json")
        .with_response_body(body)
}

pub fn post_with_body(path: &str, status: u16, body: Value) -> IrRecord {
    IrRecord::new(Method::Post, path, status)
        .with_request_content_type("application/json")
        .with_request_body(body)
}

pub fn query_of(pairs: &[(&str, &str)]) -> HashMap<String, QueryValue> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), QueryValue::One(v.to_string())))
        .collect()
}

pub fn headers_of(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}
