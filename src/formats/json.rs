// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.
//! JSON document adapter.
//!
//! Converts a single parsed top-level value, usually an array of objects.
//! Object member order is preserved, so discovered record fields keep the
//! order the document introduced them in.
//!
//! Number columns: values representable as `i64` land in signed 64-bit
//! columns, larger unsigned values in unsigned 64-bit columns, everything
//! else in doubles.

use std::io::{BufReader, Read};

use serde_json::Value;
use tracing::debug;

use crate::column::PrimitiveVector;
use crate::convert::{convert, FieldKey, Format};
use crate::error::{ConvertError, Result};
use crate::node::{Node, NodeKind};

use super::READ_BUFFER_SIZE;

/// Parses one JSON document from the byte source and shreds it.
pub fn convert_json<R: Read>(reader: R) -> Result<Node> {
    let buffered = BufReader::with_capacity(READ_BUFFER_SIZE, reader);
    let document: Value = serde_json::from_reader(buffered)?;
    let mut node = Node::incomplete();
    let mut fmt = JsonFormat;
    convert(&mut fmt, &mut node, &document)?;
    debug!("json document converted: root_size={}", node.size());
    Ok(node)
}

struct JsonFormat;

pub(crate) struct JsonFieldIter<'v> {
    members: serde_json::map::Iter<'v>,
}

pub(crate) struct JsonListIter<'v> {
    elements: std::slice::Iter<'v, Value>,
}

impl<'v> Format<'v> for JsonFormat {
    type Datum = &'v Value;
    type FieldIter = JsonFieldIter<'v>;
    type ListIter = JsonListIter<'v>;

    fn classify(&mut self, datum: Self::Datum) -> Result<NodeKind> {
        Ok(match datum {
            Value::Null => NodeKind::Incomplete,
            Value::Array(_) => NodeKind::List,
            Value::Object(_) => NodeKind::Record,
            Value::Bool(_) | Value::Number(_) | Value::String(_) => NodeKind::Primitive,
        })
    }

    fn fields(&mut self, datum: Self::Datum) -> Result<Self::FieldIter> {
        match datum {
            Value::Object(members) => Ok(JsonFieldIter {
                members: members.iter(),
            }),
            other => Err(ConvertError::SchemaConflict(format!(
                "expected json object: value_kind={}",
                value_kind(other)
            ))),
        }
    }

    fn field_next(
        &mut self,
        iter: &mut Self::FieldIter,
    ) -> Result<Option<(FieldKey<'v>, Self::Datum)>> {
        Ok(iter
            .members
            .next()
            .map(|(name, value)| (FieldKey::Name(name.as_str()), value)))
    }

    fn list(&mut self, datum: Self::Datum) -> Result<Self::ListIter> {
        match datum {
            Value::Array(elements) => Ok(JsonListIter {
                elements: elements.iter(),
            }),
            other => Err(ConvertError::SchemaConflict(format!(
                "expected json array: value_kind={}",
                value_kind(other)
            ))),
        }
    }

    fn list_next(&mut self, iter: &mut Self::ListIter) -> Result<Option<Self::Datum>> {
        Ok(iter.elements.next())
    }

    fn add_primitive(&mut self, column: &mut PrimitiveVector, datum: Self::Datum) -> Result<()> {
        match datum {
            Value::String(s) => column.add_string(s.clone()),
            Value::Bool(b) => column.add_bool(*b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    column.add_i64(i)
                } else if let Some(u) = n.as_u64() {
                    column.add_u64(u)
                } else if let Some(f) = n.as_f64() {
                    column.add_f64(f)
                } else {
                    Err(ConvertError::MalformedInput(format!(
                        "unrepresentable json number: value={n}"
                    )))
                }
            }
            other => Err(ConvertError::SchemaConflict(format!(
                "expected json primitive: value_kind={}",
                value_kind(other)
            ))),
        }
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
