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
//! Avro object-container adapter over the direct binary decoder.
//!
//! Records decode straight from the container stream against the compacted
//! schema; no intermediate generic value is built. Classifying a union
//! datum consumes the branch selector from the wire; once the branch is
//! known, the remaining dispatch resolves the union statically.
//!
//! The node skeleton is built from the schema before the first record so a
//! record-level null finds all of its children in place.
//!
//! Current limitations:
//! - Record fields are decoded in schema order; out-of-order physical
//!   layouts produced by schema resolution are not handled.
//! - Avro maps are not converted.

mod decoder;
mod schema;

use std::io::{BufReader, Read};

use tracing::debug;

use crate::column::{EnumValue, PrimitiveVector};
use crate::convert::{convert, FieldKey, Format};
use crate::error::{ConvertError, Result};
use crate::filter::ColumnFilter;
use crate::node::{Node, NodeBody, NodeKind};

use self::decoder::{skip_value, Container};
use self::schema::{compile_schema, AvroKind, CNode};

use super::READ_BUFFER_SIZE;

/// Converts an Avro object-container file into a columnar tree.
pub fn convert_avro<R: Read>(reader: R) -> Result<Node> {
    convert_avro_inner(reader, None)
}

/// Converts an Avro object-container file, projecting columns through the
/// given filter. Excluded fields are skipped on the wire.
pub fn convert_avro_filtered<R: Read>(reader: R, filter: &ColumnFilter) -> Result<Node> {
    convert_avro_inner(reader, Some(filter))
}

fn convert_avro_inner<R: Read>(reader: R, filter: Option<&ColumnFilter>) -> Result<Node> {
    let buffered = BufReader::with_capacity(READ_BUFFER_SIZE, reader);
    let (mut container, schema_json) = Container::open(buffered)?;
    let root_schema = compile_schema(&schema_json, filter)?;
    if !root_schema.included {
        // The filter eliminated every column.
        return Ok(Node::incomplete());
    }

    let mut root = Node::new_list();
    let mut count = 0usize;
    if let NodeBody::List(list) = &mut root.body {
        initialize(&root_schema, &mut list.child);
        while container.has_more()? {
            container.consume_record();
            convert(&mut container, &mut list.child, &root_schema)?;
            count += 1;
        }
        list.lengths.push(count);
    }
    root.nulls.add_not_null();
    debug!("avro container converted: records={count}");
    Ok(root)
}

/// Pre-builds the node skeleton for a compacted schema: records get their
/// included fields, lists get their child, unions collapse to the branch
/// that carries data. Leaves stay incomplete until a value specializes them.
fn initialize(schema: &CNode, node: &mut Node) {
    match schema.kind {
        AvroKind::Record => {
            node.specialize(NodeKind::Record);
            if let NodeBody::Record(rec) = &mut node.body {
                for (child, name) in schema.children.iter().zip(&schema.field_names) {
                    if child.included {
                        initialize(child, rec.push_field(name));
                    }
                }
            }
        }
        AvroKind::Array => {
            node.specialize(NodeKind::List);
            if let NodeBody::List(list) = &mut node.body {
                initialize(&schema.children[0], &mut list.child);
            }
        }
        AvroKind::Union => initialize(schema.resolve_union(), node),
        _ => {}
    }
}

pub(crate) struct AvroFieldIter<'c> {
    record: &'c CNode,
    position: usize,
}

pub(crate) struct AvroListIter<'c> {
    element: &'c CNode,
    remaining: u64,
}

impl<'c, R: Read> Format<'c> for Container<R> {
    type Datum = &'c CNode;
    type FieldIter = AvroFieldIter<'c>;
    type ListIter = AvroListIter<'c>;

    fn classify(&mut self, datum: Self::Datum) -> Result<NodeKind> {
        match datum.kind {
            AvroKind::Union => {
                let index = self.dec.decode_union_index()?;
                let branch = datum.children.get(index).ok_or_else(|| {
                    ConvertError::MalformedInput(format!(
                        "union index out of range: index={}, branches={}",
                        index,
                        datum.children.len()
                    ))
                })?;
                if branch.kind == AvroKind::Null {
                    Ok(NodeKind::Incomplete)
                } else {
                    classify_static(branch)
                }
            }
            _ => classify_static(datum),
        }
    }

    fn fields(&mut self, datum: Self::Datum) -> Result<Self::FieldIter> {
        let resolved = datum.resolve_union();
        if resolved.kind != AvroKind::Record {
            return Err(ConvertError::SchemaConflict(format!(
                "expected record schema: kind={:?}",
                resolved.kind
            )));
        }
        Ok(AvroFieldIter {
            record: resolved,
            position: 0,
        })
    }

    fn field_next(
        &mut self,
        iter: &mut Self::FieldIter,
    ) -> Result<Option<(FieldKey<'c>, Self::Datum)>> {
        let record = iter.record;
        while iter.position < record.children.len() {
            let child = &record.children[iter.position];
            let name = record.field_names[iter.position].as_str();
            iter.position += 1;
            if child.included {
                return Ok(Some((FieldKey::Index(child.node_index, name), child)));
            }
            // Excluded fields still occupy bytes on the wire.
            skip_value(&mut self.dec, child)?;
        }
        Ok(None)
    }

    fn list(&mut self, datum: Self::Datum) -> Result<Self::ListIter> {
        let resolved = datum.resolve_union();
        if resolved.kind != AvroKind::Array {
            return Err(ConvertError::SchemaConflict(format!(
                "expected array schema: kind={:?}",
                resolved.kind
            )));
        }
        // Block headers are read lazily by `list_next`, so an empty array
        // (a lone zero-count terminator) is consumed exactly once.
        Ok(AvroListIter {
            element: &resolved.children[0],
            remaining: 0,
        })
    }

    fn list_next(&mut self, iter: &mut Self::ListIter) -> Result<Option<Self::Datum>> {
        if iter.remaining == 0 {
            let (count, _bytes) = self.dec.decode_block()?;
            if count == 0 {
                return Ok(None);
            }
            iter.remaining = count;
        }
        iter.remaining -= 1;
        Ok(Some(iter.element))
    }

    fn add_primitive(&mut self, column: &mut PrimitiveVector, datum: Self::Datum) -> Result<()> {
        let resolved = datum.resolve_union();
        match resolved.kind {
            AvroKind::Bool => column.add_bool(self.dec.decode_bool()?),
            AvroKind::Int => column.add_i32(self.dec.decode_int()?),
            AvroKind::Long => column.add_i64(self.dec.decode_long()?),
            AvroKind::Float => column.add_f32(self.dec.decode_f32()?),
            AvroKind::Double => column.add_f64(self.dec.decode_f64()?),
            AvroKind::String => {
                let slot = column.add_string_slot()?;
                self.dec.decode_string_into(slot)
            }
            AvroKind::Bytes => column.add_bytes(self.dec.decode_bytes()?),
            AvroKind::Fixed => column.add_bytes(self.dec.decode_fixed(resolved.fixed_size)?),
            AvroKind::Enum => {
                let dict = resolved.dict.clone().ok_or_else(|| {
                    ConvertError::MalformedInput("enum schema has no dictionary".to_string())
                })?;
                let index = self.dec.decode_int()?;
                let index = usize::try_from(index).ok().filter(|i| *i < dict.len());
                match index {
                    Some(index) => column.add_enum(EnumValue { index, dict }),
                    None => Err(ConvertError::MalformedInput(format!(
                        "enum index out of range: dict_size={}",
                        dict.len()
                    ))),
                }
            }
            other => Err(ConvertError::SchemaConflict(format!(
                "expected primitive schema: kind={other:?}"
            ))),
        }
    }
}

fn classify_static(schema: &CNode) -> Result<NodeKind> {
    match schema.kind {
        AvroKind::Null => Ok(NodeKind::Incomplete),
        AvroKind::Bool
        | AvroKind::Int
        | AvroKind::Long
        | AvroKind::Float
        | AvroKind::Double
        | AvroKind::Bytes
        | AvroKind::String
        | AvroKind::Fixed
        | AvroKind::Enum => Ok(NodeKind::Primitive),
        AvroKind::Array => Ok(NodeKind::List),
        AvroKind::Record => Ok(NodeKind::Record),
        AvroKind::Map => Err(ConvertError::NotImplemented("avro map".to_string())),
        AvroKind::Union => Err(ConvertError::UnsupportedUnion(
            "nested unions are not valid avro".to_string(),
        )),
    }
}
