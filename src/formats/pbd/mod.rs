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
//! Length-delimited protobuf stream adapter.
//!
//! Stream layout: a varint-delimited `FileDescriptorSet`, a varint-delimited
//! fully-qualified root message name, then varint-delimited message bodies
//! until end of stream.
//!
//! Each message body is read within a pushed stream limit. Fields are
//! dispatched by number as their tags fire; unknown and filtered-out
//! numbers are skipped by wire type. When the body is exhausted the
//! iterator switches to a missing pass over the declared fields that never
//! fired: scalars append their declared default (so they stay non-null),
//! repeated fields become empty lists, and nested messages record a null.
//!
//! Current limitations:
//! - Unpacked repeated elements are assumed contiguous; a second run of the
//!   same field later in the body starts a new list observation.
//! - A non-repeated field occurring twice is recorded twice, not merged.
//! - Protobuf maps and groups are rejected.

mod descriptor;
mod wire;

use std::io::{BufReader, Read};

use prost::Message;
use prost_types::FileDescriptorSet;
use tracing::debug;

use crate::column::{EnumValue, PrimitiveVector};
use crate::convert::{convert, FieldKey, Format};
use crate::error::{ConvertError, Result};
use crate::filter::ColumnFilter;
use crate::node::{Node, NodeBody, NodeKind};

use self::descriptor::{
    compile_pool, DefaultValue, DescriptorPool, FieldDescriptor, FieldKind, ScalarType,
};
use self::wire::{zigzag32, zigzag64, WireReader, WireType};

use super::READ_BUFFER_SIZE;

/// Converts a length-delimited protobuf stream into a columnar tree.
pub fn convert_pbd<R: Read>(reader: R) -> Result<Node> {
    convert_pbd_inner(reader, None)
}

/// Converts a length-delimited protobuf stream, projecting columns through
/// the given filter. Pruned fields are skipped on the wire.
pub fn convert_pbd_filtered<R: Read>(reader: R, filter: &ColumnFilter) -> Result<Node> {
    convert_pbd_inner(reader, Some(filter))
}

fn convert_pbd_inner<R: Read>(reader: R, filter: Option<&ColumnFilter>) -> Result<Node> {
    let buffered = BufReader::with_capacity(READ_BUFFER_SIZE, reader);
    let mut wire = WireReader::new(buffered);

    let set_len = wire.read_varint_opt()?.ok_or_else(|| {
        ConvertError::MalformedInput("stream has no descriptor header".to_string())
    })?;
    let set_bytes = wire.read_bytes(set_len)?;
    let set = FileDescriptorSet::decode(set_bytes.as_slice())?;
    let name_len = wire.read_varint()?;
    let name_bytes = wire.read_bytes(name_len)?;
    let root_name = String::from_utf8(name_bytes).map_err(|e| {
        ConvertError::MalformedInput(format!("root message name is not utf-8: error={e}"))
    })?;

    let pool = compile_pool(&set, &root_name, filter)?;
    debug!(
        "pbd descriptors compiled: root={root_name}, messages={}, enums={}",
        pool.messages.len(),
        pool.enums.len()
    );
    if filter.is_some() && pool.message(pool.root).fields.is_empty() {
        // The filter eliminated every column.
        return Ok(Node::incomplete());
    }

    let mut root = Node::new_list();
    let mut count = 0usize;
    if let NodeBody::List(list) = &mut root.body {
        let mut visiting = vec![pool.root];
        initialize(&pool, pool.root, &mut list.child, &mut visiting);

        let mut fmt = PbdFormat {
            wire,
            pool: &pool,
            read_ahead: None,
        };
        while let Some(len) = fmt.wire.read_varint_opt()? {
            fmt.wire.push_limit(len)?;
            let datum = PbdDatum {
                field: None,
                in_list: false,
                missing: false,
                wire_type: None,
            };
            convert(&mut fmt, &mut list.child, datum)?;
            count += 1;
        }
        list.lengths.push(count);
    }
    root.nulls.add_not_null();
    debug!("pbd stream converted: records={count}");
    Ok(root)
}

/// Pre-builds the node skeleton from the compiled descriptors so missing
/// observations land on existing nodes. Recursion into a message already on
/// the build path stops, leaving that node incomplete.
fn initialize(pool: &DescriptorPool, message: usize, node: &mut Node, visiting: &mut Vec<usize>) {
    node.specialize(NodeKind::Record);
    if let NodeBody::Record(rec) = &mut node.body {
        for field in &pool.message(message).fields {
            let child = rec.push_field(&field.name);
            if field.repeated {
                child.specialize(NodeKind::List);
                if let NodeBody::List(list) = &mut child.body {
                    initialize_element(pool, field, &mut list.child, visiting);
                }
            } else {
                initialize_element(pool, field, child, visiting);
            }
        }
    }
}

fn initialize_element(
    pool: &DescriptorPool,
    field: &FieldDescriptor,
    node: &mut Node,
    visiting: &mut Vec<usize>,
) {
    if let FieldKind::Message(index) = field.kind {
        if !visiting.contains(&index) {
            visiting.push(index);
            initialize(pool, index, node, visiting);
            visiting.pop();
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct PbdDatum<'d> {
    field: Option<&'d FieldDescriptor>,
    in_list: bool,
    missing: bool,
    /// Wire type of the tag that fired this datum, for fields read off the
    /// wire.
    wire_type: Option<WireType>,
}

pub(crate) struct PbdFormat<'d, R: Read> {
    wire: WireReader<R>,
    pool: &'d DescriptorPool,
    /// Tag peeked past the end of an unpacked repeated run.
    read_ahead: Option<(u32, WireType)>,
}

pub(crate) struct PbdFieldIter {
    message: usize,
    processed: Vec<bool>,
    cursor: usize,
    in_missing: bool,
}

pub(crate) enum PbdListIter<'d> {
    Missing,
    Packed { field: &'d FieldDescriptor },
    Unpacked { field: &'d FieldDescriptor, first: bool },
}

fn check_wire_type(field: &FieldDescriptor, actual: WireType) -> Result<()> {
    let expected = field.kind.element_wire_type();
    if actual == expected {
        return Ok(());
    }
    if field.repeated && actual == WireType::LengthDelimited && field.kind.packable() {
        return Ok(());
    }
    Err(ConvertError::MalformedInput(format!(
        "wire type mismatch: field={}, expected={expected:?}, actual={actual:?}",
        field.name
    )))
}

impl<'d, R: Read> Format<'d> for PbdFormat<'d, R> {
    type Datum = PbdDatum<'d>;
    type FieldIter = PbdFieldIter;
    type ListIter = PbdListIter<'d>;

    fn classify(&mut self, datum: Self::Datum) -> Result<NodeKind> {
        let Some(field) = datum.field else {
            return Ok(NodeKind::Record);
        };
        if field.repeated && !datum.in_list {
            return Ok(NodeKind::List);
        }
        match field.kind {
            FieldKind::Message(_) => {
                if datum.missing {
                    Ok(NodeKind::Incomplete)
                } else {
                    Ok(NodeKind::Record)
                }
            }
            _ => Ok(NodeKind::Primitive),
        }
    }

    fn fields(&mut self, datum: Self::Datum) -> Result<Self::FieldIter> {
        let message = match datum.field {
            None => self.pool.root,
            Some(field) => match field.kind {
                FieldKind::Message(index) => index,
                _ => {
                    return Err(ConvertError::SchemaConflict(format!(
                        "expected message field: field={}",
                        field.name
                    )))
                }
            },
        };
        if datum.field.is_some() {
            // The fired tag was length-delimited; the body follows.
            let len = self.wire.read_varint()?;
            self.wire.push_limit(len)?;
        }
        let field_count = self.pool.message(message).fields.len();
        Ok(PbdFieldIter {
            message,
            processed: vec![false; field_count],
            cursor: 0,
            in_missing: false,
        })
    }

    fn field_next(
        &mut self,
        iter: &mut Self::FieldIter,
    ) -> Result<Option<(FieldKey<'d>, Self::Datum)>> {
        let pool: &'d DescriptorPool = self.pool;
        let desc = pool.message(iter.message);
        if !iter.in_missing {
            loop {
                let tag = match self.read_ahead.take() {
                    Some(tag) => Some(tag),
                    None => self.wire.read_tag()?,
                };
                match tag {
                    None => {
                        self.wire.pop_limit()?;
                        iter.in_missing = true;
                        break;
                    }
                    Some((number, wire_type)) => {
                        if let Some(&index) = desc.by_number.get(&number) {
                            let field = &desc.fields[index];
                            check_wire_type(field, wire_type)?;
                            iter.processed[index] = true;
                            return Ok(Some((
                                FieldKey::Index(index, field.name.as_str()),
                                PbdDatum {
                                    field: Some(field),
                                    in_list: false,
                                    missing: false,
                                    wire_type: Some(wire_type),
                                },
                            )));
                        }
                        self.wire.skip_field(wire_type)?;
                    }
                }
            }
        }
        while iter.cursor < iter.processed.len() {
            let index = iter.cursor;
            iter.cursor += 1;
            if !iter.processed[index] {
                iter.processed[index] = true;
                let field = &desc.fields[index];
                return Ok(Some((
                    FieldKey::Index(index, field.name.as_str()),
                    PbdDatum {
                        field: Some(field),
                        in_list: false,
                        missing: true,
                        wire_type: None,
                    },
                )));
            }
        }
        Ok(None)
    }

    fn list(&mut self, datum: Self::Datum) -> Result<Self::ListIter> {
        let field = datum.field.ok_or_else(|| {
            ConvertError::SchemaConflict("the stream root is not a repeated field".to_string())
        })?;
        if !field.repeated {
            return Err(ConvertError::SchemaConflict(format!(
                "expected repeated field: field={}",
                field.name
            )));
        }
        if datum.missing {
            return Ok(PbdListIter::Missing);
        }
        match datum.wire_type {
            Some(WireType::LengthDelimited) if field.kind.packable() => {
                let len = self.wire.read_varint()?;
                self.wire.push_limit(len)?;
                Ok(PbdListIter::Packed { field })
            }
            Some(_) => Ok(PbdListIter::Unpacked { field, first: true }),
            None => Err(ConvertError::MalformedInput(format!(
                "repeated field without a fired tag: field={}",
                field.name
            ))),
        }
    }

    fn list_next(&mut self, iter: &mut Self::ListIter) -> Result<Option<Self::Datum>> {
        match iter {
            PbdListIter::Missing => Ok(None),
            PbdListIter::Packed { field } => {
                let field = *field;
                if self.wire.at_limit() {
                    self.wire.pop_limit()?;
                    return Ok(None);
                }
                Ok(Some(PbdDatum {
                    field: Some(field),
                    in_list: true,
                    missing: false,
                    wire_type: None,
                }))
            }
            PbdListIter::Unpacked { field, first } => {
                let field = *field;
                let element_wire_type = field.kind.element_wire_type();
                if *first {
                    *first = false;
                    return Ok(Some(PbdDatum {
                        field: Some(field),
                        in_list: true,
                        missing: false,
                        wire_type: Some(element_wire_type),
                    }));
                }
                match self.wire.read_tag()? {
                    None => Ok(None),
                    Some((number, wire_type))
                        if number == field.number && wire_type == element_wire_type =>
                    {
                        Ok(Some(PbdDatum {
                            field: Some(field),
                            in_list: true,
                            missing: false,
                            wire_type: Some(wire_type),
                        }))
                    }
                    Some(other) => {
                        self.read_ahead = Some(other);
                        Ok(None)
                    }
                }
            }
        }
    }

    fn add_primitive(&mut self, column: &mut PrimitiveVector, datum: Self::Datum) -> Result<()> {
        let pool: &'d DescriptorPool = self.pool;
        let field = datum.field.ok_or_else(|| {
            ConvertError::SchemaConflict("the stream root is not a primitive".to_string())
        })?;
        if datum.missing {
            return self.append_default(column, field);
        }
        match field.kind {
            FieldKind::Scalar(scalar) => match scalar {
                ScalarType::Double => column.add_f64(f64::from_bits(self.wire.read_fixed64()?)),
                ScalarType::Float => column.add_f32(f32::from_bits(self.wire.read_fixed32()?)),
                ScalarType::Int64 => column.add_i64(self.wire.read_varint()? as i64),
                ScalarType::UInt64 => column.add_u64(self.wire.read_varint()?),
                ScalarType::Int32 => column.add_i32(self.wire.read_varint()? as i64 as i32),
                ScalarType::Fixed64 => column.add_u64(self.wire.read_fixed64()?),
                ScalarType::Fixed32 => column.add_u32(self.wire.read_fixed32()?),
                ScalarType::Bool => column.add_bool(self.wire.read_varint()? != 0),
                ScalarType::String => {
                    let len = self.wire.read_varint()?;
                    let bytes = self.wire.read_bytes(len)?;
                    let value = String::from_utf8(bytes).map_err(|e| {
                        ConvertError::MalformedInput(format!(
                            "string field is not utf-8: field={}, error={e}",
                            field.name
                        ))
                    })?;
                    column.add_string(value)
                }
                ScalarType::Bytes => {
                    let len = self.wire.read_varint()?;
                    column.add_bytes(self.wire.read_bytes(len)?)
                }
                ScalarType::UInt32 => column.add_u32(self.wire.read_varint()? as u32),
                ScalarType::SFixed32 => column.add_i32(self.wire.read_fixed32()? as i32),
                ScalarType::SFixed64 => column.add_i64(self.wire.read_fixed64()? as i64),
                ScalarType::SInt32 => column.add_i32(zigzag32(self.wire.read_varint()?)),
                ScalarType::SInt64 => column.add_i64(zigzag64(self.wire.read_varint()?)),
            },
            FieldKind::Enum(enum_index) => {
                let compiled = pool.enum_at(enum_index);
                let number = self.wire.read_varint()? as i64 as i32;
                let index = compiled.by_number.get(&number).copied().ok_or_else(|| {
                    ConvertError::MalformedInput(format!(
                        "unknown enum number: field={}, number={number}",
                        field.name
                    ))
                })?;
                column.add_enum(EnumValue {
                    index,
                    dict: compiled.dict.clone(),
                })
            }
            FieldKind::Message(_) => Err(ConvertError::SchemaConflict(format!(
                "message field decoded as primitive: field={}",
                field.name
            ))),
        }
    }
}

impl<'d, R: Read> PbdFormat<'d, R> {
    /// Appends the declared default of a field absent from the wire.
    fn append_default(&self, column: &mut PrimitiveVector, field: &FieldDescriptor) -> Result<()> {
        match &field.default {
            DefaultValue::I32(v) => column.add_i32(*v),
            DefaultValue::I64(v) => column.add_i64(*v),
            DefaultValue::U32(v) => column.add_u32(*v),
            DefaultValue::U64(v) => column.add_u64(*v),
            DefaultValue::F32(v) => column.add_f32(*v),
            DefaultValue::F64(v) => column.add_f64(*v),
            DefaultValue::Bool(v) => column.add_bool(*v),
            DefaultValue::Str(v) => column.add_string(v.clone()),
            DefaultValue::Bytes(v) => column.add_bytes(v.clone()),
            DefaultValue::EnumIndex(index) => match field.kind {
                FieldKind::Enum(enum_index) => column.add_enum(EnumValue {
                    index: *index,
                    dict: self.pool.enum_at(enum_index).dict.clone(),
                }),
                _ => Err(ConvertError::SchemaConflict(format!(
                    "enum default on a non-enum field: field={}",
                    field.name
                ))),
            },
            DefaultValue::None => Err(ConvertError::SchemaConflict(format!(
                "no default for field: field={}",
                field.name
            ))),
        }
    }
}
