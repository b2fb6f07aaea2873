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
//! Integration tests for the Arrow IPC converter.

use std::sync::Arc;

use arrow::array::{
    Array, ArrayRef, BooleanArray, Date32Array, DictionaryArray, Float16Array, Float32Array,
    Float64Array, Int32Array, Int64Array, ListArray, StringArray, StructArray,
};
use arrow::buffer::{NullBuffer, OffsetBuffer};
use arrow::datatypes::{DataType, Field, Int32Type, Schema};
use arrow::ipc::writer::StreamWriter;
use arrow::record_batch::RecordBatch;
use colshred::{convert_arrow, ConvertError, Node, NodeKind, PrimitiveVector};
use half::f16;

use crate::common::{check_invariants, enum_parts, f32_values, i32_values, i64_values, string_values};

mod common;

fn to_ipc(batches: &[RecordBatch]) -> Vec<u8> {
    let mut buf = Vec::new();
    let mut writer = StreamWriter::try_new(&mut buf, batches[0].schema().as_ref()).unwrap();
    for batch in batches {
        writer.write(batch).unwrap();
    }
    writer.finish().unwrap();
    drop(writer);
    buf
}

fn convert(batches: &[RecordBatch]) -> Node {
    let bytes = to_ipc(batches);
    let node = convert_arrow(bytes.as_slice()).expect("conversion failed");
    check_invariants(&node);
    node
}

fn batch_of(columns: Vec<(&str, ArrayRef)>) -> RecordBatch {
    let fields: Vec<Field> = columns
        .iter()
        .map(|(name, array)| Field::new(*name, array.data_type().clone(), true))
        .collect();
    let schema = Arc::new(Schema::new(fields));
    RecordBatch::try_new(schema, columns.into_iter().map(|(_, a)| a).collect()).unwrap()
}

#[test]
fn test_primitive_columns_with_nulls() {
    let batch = batch_of(vec![
        (
            "i",
            Arc::new(Int64Array::from(vec![Some(1), None, Some(3)])) as ArrayRef,
        ),
        (
            "s",
            Arc::new(StringArray::from(vec![Some("a"), None, Some("c")])) as ArrayRef,
        ),
        (
            "b",
            Arc::new(BooleanArray::from(vec![Some(true), Some(false), None])) as ArrayRef,
        ),
        (
            "f",
            Arc::new(Float64Array::from(vec![1.5, 2.5, 3.5])) as ArrayRef,
        ),
    ]);
    let node = convert(&[batch]);

    assert_eq!(node.offsets().unwrap(), &[3]);
    let record = node.list_child().unwrap();
    assert_eq!(record.size(), 3);

    let i = record.field("i").unwrap();
    assert_eq!(i.size(), 3);
    assert_eq!(i.null_indices(), &[1]);
    assert_eq!(i64_values(i), &[1, 3]);

    let s = record.field("s").unwrap();
    assert_eq!(s.null_indices(), &[1]);
    assert_eq!(string_values(s), &["a".to_string(), "c".to_string()]);

    let b = record.field("b").unwrap();
    assert_eq!(b.null_indices(), &[2]);

    let f = record.field("f").unwrap();
    assert_eq!(f.null_indices(), &[] as &[usize]);
}

#[test]
fn test_dictionary_column() {
    let keys = Int32Array::from(vec![Some(2), Some(0), Some(0), Some(1), None]);
    let values: ArrayRef = Arc::new(StringArray::from(vec!["a", "b", "c"]));
    let dict = DictionaryArray::<Int32Type>::try_new(keys, values).unwrap();
    let batch = batch_of(vec![("c", Arc::new(dict) as ArrayRef)]);
    let node = convert(&[batch]);

    let c = node.list_child().unwrap().field("c").unwrap();
    assert_eq!(c.kind(), NodeKind::Primitive);
    assert_eq!(c.size(), 5);
    assert_eq!(c.null_indices(), &[4]);
    let (indices, names) = enum_parts(c);
    assert_eq!(indices, &[2, 0, 0, 1]);
    assert_eq!(names, vec!["a".to_string(), "b".to_string(), "c".to_string()]);
}

#[test]
fn test_list_of_struct() {
    let x = Arc::new(Int32Array::from(vec![1, 2, 3])) as ArrayRef;
    let y = Arc::new(Float32Array::from(vec![1.0f32, 2.0, 3.0])) as ArrayRef;
    let inner = StructArray::from(vec![
        (Arc::new(Field::new("x", DataType::Int32, true)), x),
        (Arc::new(Field::new("y", DataType::Float32, true)), y),
    ]);
    let element_field = Arc::new(Field::new("item", inner.data_type().clone(), true));
    let list = ListArray::new(
        element_field,
        OffsetBuffer::new(vec![0i32, 2, 2, 3].into()),
        Arc::new(inner),
        None,
    );
    let batch = batch_of(vec![("c", Arc::new(list) as ArrayRef)]);
    let node = convert(&[batch]);

    let c = node.list_child().unwrap().field("c").unwrap();
    assert_eq!(c.kind(), NodeKind::List);
    assert_eq!(c.offsets().unwrap(), &[2, 0, 1]);

    let element = c.list_child().unwrap();
    assert_eq!(element.kind(), NodeKind::Record);
    assert_eq!(element.size(), 3);
    assert_eq!(i32_values(element.field("x").unwrap()), &[1, 2, 3]);
    assert_eq!(f32_values(element.field("y").unwrap()), &[1.0, 2.0, 3.0]);
}

#[test]
fn test_list_with_null_entries() {
    // The null slot spans a non-empty offset range; its values must not
    // leak into the child column.
    let values = Arc::new(Int64Array::from(vec![1, 2, 99, 3])) as ArrayRef;
    let element_field = Arc::new(Field::new("item", DataType::Int64, true));
    let list = ListArray::new(
        element_field,
        OffsetBuffer::new(vec![0i32, 2, 3, 4].into()),
        values,
        Some(NullBuffer::from(vec![true, false, true])),
    );
    let batch = batch_of(vec![("c", Arc::new(list) as ArrayRef)]);
    let node = convert(&[batch]);

    let c = node.list_child().unwrap().field("c").unwrap();
    assert_eq!(c.size(), 3);
    assert_eq!(c.null_indices(), &[1]);
    assert_eq!(c.offsets().unwrap(), &[2, 1]);
    assert_eq!(i64_values(c.list_child().unwrap()), &[1, 2, 3]);
}

#[test]
fn test_float16_stores_raw_bits() {
    let batch = batch_of(vec![(
        "h",
        Arc::new(Float16Array::from(vec![Some(f16::from_f32(1.5)), None])) as ArrayRef,
    )]);
    let node = convert(&[batch]);

    let h = node.list_child().unwrap().field("h").unwrap();
    assert_eq!(h.null_indices(), &[1]);
    match h.as_primitive().unwrap() {
        PrimitiveVector::Float16(bits) => assert_eq!(bits, &[f16::from_f32(1.5).to_bits()]),
        other => panic!("expected float16 column, got {:?}", other.primitive_type()),
    }
}

#[test]
fn test_batches_accumulate() {
    let first = batch_of(vec![(
        "v",
        Arc::new(Int64Array::from(vec![1, 2])) as ArrayRef,
    )]);
    let second = batch_of(vec![(
        "v",
        Arc::new(Int64Array::from(vec![Some(3), None])) as ArrayRef,
    )]);
    let node = convert(&[first, second]);

    assert_eq!(node.offsets().unwrap(), &[4]);
    let record = node.list_child().unwrap();
    assert_eq!(record.size(), 4);
    let v = record.field("v").unwrap();
    assert_eq!(v.size(), 4);
    assert_eq!(v.null_indices(), &[3]);
    assert_eq!(i64_values(v), &[1, 2, 3]);
}

#[test]
fn test_dictionary_merges_across_batches() {
    let make = |keys: Vec<Option<i32>>| {
        let values: ArrayRef = Arc::new(StringArray::from(vec!["x", "y"]));
        let dict =
            DictionaryArray::<Int32Type>::try_new(Int32Array::from(keys), values).unwrap();
        batch_of(vec![("c", Arc::new(dict) as ArrayRef)])
    };
    let node = convert(&[make(vec![Some(0), Some(1)]), make(vec![Some(1)])]);

    let c = node.list_child().unwrap().field("c").unwrap();
    assert_eq!(c.size(), 3);
    let (indices, names) = enum_parts(c);
    assert_eq!(indices, &[0, 1, 1]);
    assert_eq!(names, vec!["x".to_string(), "y".to_string()]);
}

#[test]
fn test_unsupported_array_type() {
    let batch = batch_of(vec![(
        "d",
        Arc::new(Date32Array::from(vec![1, 2])) as ArrayRef,
    )]);
    let bytes = to_ipc(&[batch]);
    let err = convert_arrow(bytes.as_slice()).unwrap_err();
    assert!(matches!(err, ConvertError::NotImplemented(_)));
}
