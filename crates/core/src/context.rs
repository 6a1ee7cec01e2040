// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The opaque state context exchanged by the State Relay Protocol (SRP).
//!
//! The engine never interprets the contents of a `StateContext`; it only
//! ferries it from the outgoing child to the incoming one. `Value` is a
//! tagged union wide enough to carry whatever a business process wants
//! to hand off, serialized as plain JSON on the wire (see
//! `aeterna_engine::srp`).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A mapping from string keys to opaque values, exchanged as one
/// self-delimited frame. `BTreeMap` keeps key order deterministic for
/// round-trip tests and diff-friendly logging.
pub type StateContext = BTreeMap<String, Value>;

/// An opaque, serializable value of unspecified shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}
