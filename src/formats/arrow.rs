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
//! Arrow IPC stream adapter.
//!
//! Arrow input is already columnar, so this adapter bypasses the generic
//! converter: each batch column appends directly into the per-field node.
//! Values append first (non-null slots only), then the array validity
//! replays into the node's null indicator. Because children of a struct
//! carry their own validity for every slot, record children here observe
//! every position, including the struct-null ones.
//!
//! Batches accumulate: a column must keep the same shape across batches or
//! the append reports a schema conflict. Dictionary columns merge across
//! batches through the consistently-sourced dictionary marker.
//!
//! Current limitations:
//! - Supported arrays: numerics, half floats, booleans, utf-8 strings,
//!   lists, structs, and integer-keyed dictionaries.
//! - Null, binary, date/time/timestamp/interval, decimal, and union arrays
//!   are rejected.

use std::io::{BufReader, Read};
use std::sync::Arc;

use arrow::array::{
    Array, BooleanArray, DictionaryArray, Float16Array, Float32Array, Float64Array, Int16Array,
    Int32Array, Int64Array, Int8Array, ListArray, StringArray, StructArray, UInt16Array,
    UInt32Array, UInt64Array, UInt8Array,
};
use arrow::datatypes::{
    ArrowDictionaryKeyType, ArrowNativeType, DataType, Int16Type, Int32Type, Int64Type, Int8Type,
    UInt16Type, UInt32Type, UInt64Type, UInt8Type,
};
use arrow::ipc::reader::StreamReader;
use tracing::debug;

use crate::column::{EnumDict, EnumValue, PrimitiveVector};
use crate::error::{ConvertError, Result};
use crate::node::{Node, NodeBody, NodeKind};

use super::READ_BUFFER_SIZE;

/// Converts an Arrow IPC stream into a columnar tree. All batches fold into
/// one outer list observation over a single record node.
pub fn convert_arrow<R: Read>(reader: R) -> Result<Node> {
    let buffered = BufReader::with_capacity(READ_BUFFER_SIZE, reader);
    let stream = StreamReader::try_new(buffered, None)?;
    let schema = stream.schema();

    let mut root = Node::new_list();
    let mut rows = 0usize;
    let mut batches = 0usize;
    if let NodeBody::List(list) = &mut root.body {
        list.child.specialize(NodeKind::Record);
        for batch in stream {
            let batch = batch?;
            if let NodeBody::Record(rec) = &mut list.child.body {
                for (index, column) in batch.columns().iter().enumerate() {
                    let name = schema.field(index).name();
                    let field_index = rec.resolve_or_insert(name, 0);
                    let child = rec.child_mut(field_index).ok_or_else(|| {
                        ConvertError::MalformedInput(format!(
                            "batch column vanished: column={name}"
                        ))
                    })?;
                    append_array(child, column.as_ref())?;
                }
            }
            for _ in 0..batch.num_rows() {
                list.child.nulls.add_not_null();
            }
            rows += batch.num_rows();
            batches += 1;
        }
        list.lengths.push(rows);
    }
    root.nulls.add_not_null();
    debug!("arrow stream converted: batches={batches}, rows={rows}");
    Ok(root)
}

fn downcast<'a, T: 'static>(array: &'a dyn Array, what: &str) -> Result<&'a T> {
    array.as_any().downcast_ref::<T>().ok_or_else(|| {
        ConvertError::MalformedInput(format!(
            "array downcast failed: expected={what}, actual={:?}",
            array.data_type()
        ))
    })
}

fn expect_kind(node: &mut Node, kind: NodeKind, data_type: &DataType) -> Result<()> {
    node.specialize(kind);
    if node.kind() != kind {
        return Err(ConvertError::SchemaConflict(format!(
            "column changed shape between batches: node_kind={:?}, array_type={data_type:?}",
            node.kind()
        )));
    }
    Ok(())
}

/// Appends one array's values and validity into the node.
fn append_array(node: &mut Node, array: &dyn Array) -> Result<()> {
    match array.data_type() {
        DataType::List(_) => {
            expect_kind(node, NodeKind::List, array.data_type())?;
            let list_array = downcast::<ListArray>(array, "list")?;
            if let NodeBody::List(list) = &mut node.body {
                // Null slots may still span a non-empty offset range; only
                // the ranges of non-null slots reach the child.
                for i in 0..list_array.len() {
                    if !list_array.is_null(i) {
                        let elements = list_array.value(i);
                        list.lengths.push(elements.len());
                        append_array(&mut list.child, elements.as_ref())?;
                    }
                }
            }
            update_nulls(node, array);
            Ok(())
        }
        DataType::Struct(fields) => {
            expect_kind(node, NodeKind::Record, array.data_type())?;
            let struct_array = downcast::<StructArray>(array, "struct")?;
            if let NodeBody::Record(rec) = &mut node.body {
                for (field, column) in fields.iter().zip(struct_array.columns()) {
                    let index = rec.resolve_or_insert(field.name(), 0);
                    let child = rec.child_mut(index).ok_or_else(|| {
                        ConvertError::MalformedInput(format!(
                            "struct field vanished: field={}",
                            field.name()
                        ))
                    })?;
                    append_array(child, column.as_ref())?;
                }
            }
            update_nulls(node, array);
            Ok(())
        }
        DataType::Dictionary(key_type, _) => {
            expect_kind(node, NodeKind::Primitive, array.data_type())?;
            if let NodeBody::Primitive(column) = &mut node.body {
                match key_type.as_ref() {
                    DataType::Int8 => append_dictionary::<Int8Type>(column, array)?,
                    DataType::Int16 => append_dictionary::<Int16Type>(column, array)?,
                    DataType::Int32 => append_dictionary::<Int32Type>(column, array)?,
                    DataType::Int64 => append_dictionary::<Int64Type>(column, array)?,
                    DataType::UInt8 => append_dictionary::<UInt8Type>(column, array)?,
                    DataType::UInt16 => append_dictionary::<UInt16Type>(column, array)?,
                    DataType::UInt32 => append_dictionary::<UInt32Type>(column, array)?,
                    DataType::UInt64 => append_dictionary::<UInt64Type>(column, array)?,
                    other => {
                        return Err(ConvertError::NotImplemented(format!(
                            "dictionary key type: type={other:?}"
                        )))
                    }
                }
            }
            update_nulls(node, array);
            Ok(())
        }
        DataType::Boolean
        | DataType::Int8
        | DataType::Int16
        | DataType::Int32
        | DataType::Int64
        | DataType::UInt8
        | DataType::UInt16
        | DataType::UInt32
        | DataType::UInt64
        | DataType::Float16
        | DataType::Float32
        | DataType::Float64
        | DataType::Utf8 => {
            expect_kind(node, NodeKind::Primitive, array.data_type())?;
            if let NodeBody::Primitive(column) = &mut node.body {
                append_values(column, array)?;
            }
            update_nulls(node, array);
            Ok(())
        }
        other => Err(ConvertError::NotImplemented(format!(
            "arrow array type: type={other:?}"
        ))),
    }
}

macro_rules! append_numeric {
    ($column:expr, $array:expr, $array_ty:ty, $add:ident, $what:expr) => {{
        let array = downcast::<$array_ty>($array, $what)?;
        for i in 0..array.len() {
            if !array.is_null(i) {
                $column.$add(array.value(i))?;
            }
        }
        Ok(())
    }};
}

fn append_values(column: &mut PrimitiveVector, array: &dyn Array) -> Result<()> {
    match array.data_type() {
        DataType::Boolean => {
            let array = downcast::<BooleanArray>(array, "boolean")?;
            for i in 0..array.len() {
                if !array.is_null(i) {
                    column.add_bool(array.value(i))?;
                }
            }
            Ok(())
        }
        DataType::Int8 => append_numeric!(column, array, Int8Array, add_i8, "int8"),
        DataType::Int16 => append_numeric!(column, array, Int16Array, add_i16, "int16"),
        DataType::Int32 => append_numeric!(column, array, Int32Array, add_i32, "int32"),
        DataType::Int64 => append_numeric!(column, array, Int64Array, add_i64, "int64"),
        DataType::UInt8 => append_numeric!(column, array, UInt8Array, add_u8, "uint8"),
        DataType::UInt16 => append_numeric!(column, array, UInt16Array, add_u16, "uint16"),
        DataType::UInt32 => append_numeric!(column, array, UInt32Array, add_u32, "uint32"),
        DataType::UInt64 => append_numeric!(column, array, UInt64Array, add_u64, "uint64"),
        DataType::Float32 => append_numeric!(column, array, Float32Array, add_f32, "float32"),
        DataType::Float64 => append_numeric!(column, array, Float64Array, add_f64, "float64"),
        DataType::Float16 => {
            let array = downcast::<Float16Array>(array, "float16")?;
            for i in 0..array.len() {
                if !array.is_null(i) {
                    column.add_f16_bits(array.value(i).to_bits())?;
                }
            }
            Ok(())
        }
        DataType::Utf8 => {
            let array = downcast::<StringArray>(array, "utf8")?;
            for i in 0..array.len() {
                if !array.is_null(i) {
                    column.add_string(array.value(i).to_string())?;
                }
            }
            Ok(())
        }
        other => Err(ConvertError::NotImplemented(format!(
            "arrow primitive type: type={other:?}"
        ))),
    }
}

/// Builds a consistently-sourced dictionary from the array's values and
/// appends the non-null keys as enum indices.
fn append_dictionary<K: ArrowDictionaryKeyType>(
    column: &mut PrimitiveVector,
    array: &dyn Array,
) -> Result<()> {
    let dict_array = downcast::<DictionaryArray<K>>(array, "dictionary")?;

    let mut values_node = Node::incomplete();
    append_array(&mut values_node, dict_array.values().as_ref())?;
    let values = match values_node.body {
        NodeBody::Primitive(values) => values,
        _ => {
            return Err(ConvertError::NotImplemented(
                "dictionary values must be primitive".to_string(),
            ))
        }
    };
    let dict = Arc::new(EnumDict::consistently_sourced(values));

    let keys = dict_array.keys();
    for i in 0..keys.len() {
        if !dict_array.is_null(i) {
            let index = keys.value(i).to_usize().ok_or_else(|| {
                ConvertError::MalformedInput(format!(
                    "negative dictionary key: position={i}"
                ))
            })?;
            if index >= dict.len() {
                return Err(ConvertError::MalformedInput(format!(
                    "dictionary key out of range: key={index}, dict_size={}",
                    dict.len()
                )));
            }
            column.add_enum(EnumValue {
                index,
                dict: dict.clone(),
            })?;
        }
    }
    Ok(())
}

/// Replays the array validity into the node's null indicator.
fn update_nulls(node: &mut Node, array: &dyn Array) {
    for i in 0..array.len() {
        if array.is_null(i) {
            node.nulls.add_null();
        } else {
            node.nulls.add_not_null();
        }
    }
}
