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
//! Descriptor compilation for the protobuf stream reader.
//!
//! A `FileDescriptorSet` is indexed by fully-qualified name and the root
//! message is compiled into a pool of flat descriptors: fields in
//! declaration order, a field-number map for wire dispatch, parsed default
//! values, and shared enum dictionaries. The column filter prunes fields
//! during compilation; a pruned field's number is simply absent from the
//! map, so its payload is skipped like any unknown field.
//!
//! Recursive message types compile to pool self-references. Enum types
//! compile once per name, so every field referencing an enum shares one
//! dictionary handle.
//!
//! Current limitations:
//! - Map fields are rejected when included.
//! - Group-typed fields are rejected outright (they cannot be skipped).
//! - Bytes defaults are taken verbatim; C-style escapes are not decoded.

use std::collections::HashMap;
use std::sync::Arc;

use prost_types::field_descriptor_proto::{Label, Type};
use prost_types::{DescriptorProto, EnumDescriptorProto, FieldDescriptorProto, FileDescriptorSet};

use super::wire::WireType;
use crate::column::EnumDict;
use crate::error::{ConvertError, Result};
use crate::filter::{field_of, included_of, ColumnFilter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ScalarType {
    Double,
    Float,
    Int64,
    UInt64,
    Int32,
    Fixed64,
    Fixed32,
    Bool,
    String,
    Bytes,
    UInt32,
    SFixed32,
    SFixed64,
    SInt32,
    SInt64,
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum FieldKind {
    Scalar(ScalarType),
    /// Index into the pool's enum table.
    Enum(usize),
    /// Index into the pool's message table.
    Message(usize),
}

impl FieldKind {
    /// Wire type of a single element of this field.
    pub(crate) fn element_wire_type(&self) -> WireType {
        match self {
            FieldKind::Scalar(scalar) => match scalar {
                ScalarType::Double | ScalarType::Fixed64 | ScalarType::SFixed64 => {
                    WireType::Fixed64
                }
                ScalarType::Float | ScalarType::Fixed32 | ScalarType::SFixed32 => {
                    WireType::Fixed32
                }
                ScalarType::String | ScalarType::Bytes => WireType::LengthDelimited,
                _ => WireType::Varint,
            },
            FieldKind::Enum(_) => WireType::Varint,
            FieldKind::Message(_) => WireType::LengthDelimited,
        }
    }

    /// True for element types that may be packed into one length-delimited run.
    pub(crate) fn packable(&self) -> bool {
        self.element_wire_type() != WireType::LengthDelimited
    }
}

/// Default appended when a declared field is absent from a message body.
#[derive(Debug, Clone)]
pub(crate) enum DefaultValue {
    I32(i32),
    I64(i64),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
    Bool(bool),
    Str(String),
    Bytes(Vec<u8>),
    /// Declaration index into the field's enum dictionary.
    EnumIndex(usize),
    /// Messages have no scalar default; absence is structural.
    None,
}

#[derive(Debug)]
pub(crate) struct FieldDescriptor {
    pub(crate) name: String,
    pub(crate) number: u32,
    pub(crate) repeated: bool,
    pub(crate) kind: FieldKind,
    pub(crate) default: DefaultValue,
}

#[derive(Debug)]
pub(crate) struct MessageDescriptor {
    /// Included fields, in declaration order; positions double as the node
    /// tree's record field indexes.
    pub(crate) fields: Vec<FieldDescriptor>,
    pub(crate) by_number: HashMap<u32, usize>,
}

#[derive(Debug)]
pub(crate) struct CompiledEnum {
    pub(crate) dict: Arc<EnumDict>,
    /// Wire value number to declaration index.
    pub(crate) by_number: HashMap<i32, usize>,
}

#[derive(Debug)]
pub(crate) struct DescriptorPool {
    pub(crate) messages: Vec<MessageDescriptor>,
    pub(crate) enums: Vec<CompiledEnum>,
    pub(crate) root: usize,
}

impl DescriptorPool {
    pub(crate) fn message(&self, index: usize) -> &MessageDescriptor {
        &self.messages[index]
    }

    pub(crate) fn enum_at(&self, index: usize) -> &CompiledEnum {
        &self.enums[index]
    }
}

struct Registry<'a> {
    messages: HashMap<String, &'a DescriptorProto>,
    enums: HashMap<String, &'a EnumDescriptorProto>,
}

impl<'a> Registry<'a> {
    fn build(set: &'a FileDescriptorSet) -> Registry<'a> {
        let mut registry = Registry {
            messages: HashMap::new(),
            enums: HashMap::new(),
        };
        for file in &set.file {
            let package = file.package.clone().unwrap_or_default();
            for message in &file.message_type {
                registry.add_message(&package, message);
            }
            for enum_type in &file.enum_type {
                registry.add_enum(&package, enum_type);
            }
        }
        registry
    }

    fn add_message(&mut self, scope: &str, message: &'a DescriptorProto) {
        let name = qualify(scope, message.name.as_deref().unwrap_or_default());
        for nested in &message.nested_type {
            self.add_message(&name, nested);
        }
        for enum_type in &message.enum_type {
            self.add_enum(&name, enum_type);
        }
        self.messages.insert(name, message);
    }

    fn add_enum(&mut self, scope: &str, enum_type: &'a EnumDescriptorProto) {
        let name = qualify(scope, enum_type.name.as_deref().unwrap_or_default());
        self.enums.insert(name, enum_type);
    }
}

fn qualify(scope: &str, name: &str) -> String {
    if scope.is_empty() {
        name.to_string()
    } else {
        format!("{scope}.{name}")
    }
}

pub(crate) fn compile_pool(
    set: &FileDescriptorSet,
    root_message: &str,
    filter: Option<&ColumnFilter>,
) -> Result<DescriptorPool> {
    let registry = Registry::build(set);
    let mut compiler = Compiler {
        registry,
        messages: Vec::new(),
        enums: Vec::new(),
        enum_index: HashMap::new(),
        building: HashMap::new(),
        filtering: filter.is_some(),
    };
    let implicit = filter.map(|f| f.root_implicit()).unwrap_or(true);
    let root = compiler.compile_message(root_message.trim_start_matches('.'), filter, implicit)?;
    let messages = compiler
        .messages
        .into_iter()
        .map(|slot| {
            slot.ok_or_else(|| {
                ConvertError::MalformedInput("descriptor compilation left a hole".to_string())
            })
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(DescriptorPool {
        messages,
        enums: compiler.enums,
        root,
    })
}

struct Compiler<'a> {
    registry: Registry<'a>,
    messages: Vec<Option<MessageDescriptor>>,
    enums: Vec<CompiledEnum>,
    enum_index: HashMap<String, usize>,
    /// Messages currently compiling, for recursive references.
    building: HashMap<String, usize>,
    filtering: bool,
}

impl<'a> Compiler<'a> {
    fn compile_message(
        &mut self,
        fq_name: &str,
        filter: Option<&ColumnFilter>,
        implicit: bool,
    ) -> Result<usize> {
        if let Some(&index) = self.building.get(fq_name) {
            return Ok(index);
        }
        let proto = *self.registry.messages.get(fq_name).ok_or_else(|| {
            ConvertError::MalformedInput(format!("unresolved message type: name={fq_name}"))
        })?;
        if proto.options.as_ref().and_then(|o| o.map_entry) == Some(true) {
            return Err(ConvertError::NotImplemented(format!(
                "protobuf map field: entry={fq_name}"
            )));
        }

        let index = self.messages.len();
        self.messages.push(None);
        self.building.insert(fq_name.to_string(), index);

        let mut fields = Vec::new();
        for field in &proto.field {
            if let Some(compiled) = self.compile_field(field, filter, implicit)? {
                fields.push(compiled);
            }
        }
        let by_number = fields
            .iter()
            .enumerate()
            .map(|(i, f)| (f.number, i))
            .collect();

        self.building.remove(fq_name);
        self.messages[index] = Some(MessageDescriptor { fields, by_number });
        Ok(index)
    }

    fn compile_field(
        &mut self,
        field: &FieldDescriptorProto,
        filter: Option<&ColumnFilter>,
        implicit: bool,
    ) -> Result<Option<FieldDescriptor>> {
        let name = field.name.clone().unwrap_or_default();
        let field_filter = field_of(filter, &name);
        let included = included_of(field_filter, implicit);

        if field.r#type() == Type::Group {
            return Err(ConvertError::UnsupportedGroups(format!(
                "group-typed field: field={name}"
            )));
        }
        if !included {
            return Ok(None);
        }

        let number = field.number.unwrap_or_default();
        let number = u32::try_from(number).ok().filter(|n| *n > 0).ok_or_else(|| {
            ConvertError::MalformedInput(format!(
                "invalid field number: field={name}, number={number}"
            ))
        })?;
        let repeated = field.label() == Label::Repeated;

        let kind = match field.r#type() {
            Type::Message => {
                let type_name = field.type_name.as_deref().unwrap_or_default();
                let child =
                    self.compile_message(type_name.trim_start_matches('.'), field_filter, included)?;
                // A submessage the filter emptied out is dropped with it.
                if self.filtering {
                    if let Some(Some(compiled)) = self.messages.get(child) {
                        if compiled.fields.is_empty() {
                            return Ok(None);
                        }
                    }
                }
                FieldKind::Message(child)
            }
            Type::Enum => {
                let type_name = field.type_name.as_deref().unwrap_or_default();
                FieldKind::Enum(self.compile_enum(type_name.trim_start_matches('.'))?)
            }
            scalar => FieldKind::Scalar(scalar_type(scalar, &name)?),
        };

        let default = self.parse_default(&kind, field.default_value.as_deref(), &name)?;

        Ok(Some(FieldDescriptor {
            name,
            number,
            repeated,
            kind,
            default,
        }))
    }

    fn compile_enum(&mut self, fq_name: &str) -> Result<usize> {
        if let Some(&index) = self.enum_index.get(fq_name) {
            return Ok(index);
        }
        let proto = self.registry.enums.get(fq_name).ok_or_else(|| {
            ConvertError::MalformedInput(format!("unresolved enum type: name={fq_name}"))
        })?;
        let names: Vec<String> = proto
            .value
            .iter()
            .map(|v| v.name.clone().unwrap_or_default())
            .collect();
        let by_number = proto
            .value
            .iter()
            .enumerate()
            .map(|(i, v)| (v.number.unwrap_or_default(), i))
            .collect();
        let index = self.enums.len();
        self.enums.push(CompiledEnum {
            dict: Arc::new(EnumDict::from_names(names)),
            by_number,
        });
        self.enum_index.insert(fq_name.to_string(), index);
        Ok(index)
    }

    fn parse_default(
        &self,
        kind: &FieldKind,
        declared: Option<&str>,
        field: &str,
    ) -> Result<DefaultValue> {
        let parse_err = |what: &str| {
            ConvertError::MalformedInput(format!(
                "bad declared default: field={field}, value={what}"
            ))
        };
        Ok(match kind {
            FieldKind::Message(_) => DefaultValue::None,
            FieldKind::Enum(index) => {
                let compiled = &self.enums[*index];
                match declared {
                    Some(name) => {
                        let position = match compiled.dict.values() {
                            crate::column::PrimitiveVector::String(values) => {
                                values.iter().position(|v| v == name)
                            }
                            _ => None,
                        };
                        DefaultValue::EnumIndex(position.ok_or_else(|| parse_err(name))?)
                    }
                    None => DefaultValue::EnumIndex(0),
                }
            }
            FieldKind::Scalar(scalar) => match scalar {
                ScalarType::Int32 | ScalarType::SInt32 | ScalarType::SFixed32 => DefaultValue::I32(
                    declared.map_or(Ok(0), |s| s.parse().map_err(|_| parse_err(s)))?,
                ),
                ScalarType::Int64 | ScalarType::SInt64 | ScalarType::SFixed64 => DefaultValue::I64(
                    declared.map_or(Ok(0), |s| s.parse().map_err(|_| parse_err(s)))?,
                ),
                ScalarType::UInt32 | ScalarType::Fixed32 => DefaultValue::U32(
                    declared.map_or(Ok(0), |s| s.parse().map_err(|_| parse_err(s)))?,
                ),
                ScalarType::UInt64 | ScalarType::Fixed64 => DefaultValue::U64(
                    declared.map_or(Ok(0), |s| s.parse().map_err(|_| parse_err(s)))?,
                ),
                ScalarType::Float => DefaultValue::F32(
                    declared.map_or(Ok(0.0), |s| s.parse().map_err(|_| parse_err(s)))?,
                ),
                ScalarType::Double => DefaultValue::F64(
                    declared.map_or(Ok(0.0), |s| s.parse().map_err(|_| parse_err(s)))?,
                ),
                ScalarType::Bool => DefaultValue::Bool(match declared {
                    None => false,
                    Some("true") => true,
                    Some("false") => false,
                    Some(other) => return Err(parse_err(other)),
                }),
                ScalarType::String => {
                    DefaultValue::Str(declared.unwrap_or_default().to_string())
                }
                ScalarType::Bytes => {
                    DefaultValue::Bytes(declared.unwrap_or_default().as_bytes().to_vec())
                }
            },
        })
    }
}

fn scalar_type(proto: Type, field: &str) -> Result<ScalarType> {
    Ok(match proto {
        Type::Double => ScalarType::Double,
        Type::Float => ScalarType::Float,
        Type::Int64 => ScalarType::Int64,
        Type::Uint64 => ScalarType::UInt64,
        Type::Int32 => ScalarType::Int32,
        Type::Fixed64 => ScalarType::Fixed64,
        Type::Fixed32 => ScalarType::Fixed32,
        Type::Bool => ScalarType::Bool,
        Type::String => ScalarType::String,
        Type::Bytes => ScalarType::Bytes,
        Type::Uint32 => ScalarType::UInt32,
        Type::Sfixed32 => ScalarType::SFixed32,
        Type::Sfixed64 => ScalarType::SFixed64,
        Type::Sint32 => ScalarType::SInt32,
        Type::Sint64 => ScalarType::SInt64,
        other => {
            return Err(ConvertError::MalformedInput(format!(
                "unexpected field type: field={field}, type={other:?}"
            )))
        }
    })
}
