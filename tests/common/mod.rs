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
//! Shared helpers for the converter integration tests.

#![allow(dead_code)]

use colshred::{Node, NodeKind, PrimitiveVector};

/// Walks a tree and asserts the structural invariants every converter must
/// uphold: sorted sparse null indices, value vectors sized to the non-null
/// count, list offsets summing to the child size, record children aligned
/// with their parent, and enum indices within their dictionary.
pub fn check_invariants(node: &Node) {
    let mut previous: Option<usize> = None;
    for &index in node.null_indices() {
        assert!(index < node.size(), "null index beyond node size");
        if let Some(previous) = previous {
            assert!(index > previous, "null indices not strictly increasing");
        }
        previous = Some(index);
    }

    match node.kind() {
        NodeKind::Incomplete => {
            assert_eq!(node.size(), node.null_count());
        }
        NodeKind::Primitive => {
            let column = node.as_primitive().unwrap();
            assert_eq!(column.len(), node.non_null_count());
            if let Some(enums) = column.as_enum() {
                if let Some(dict) = enums.dict() {
                    for &index in enums.indices() {
                        assert!(index < dict.len(), "enum index beyond dictionary");
                    }
                } else {
                    assert!(enums.indices().is_empty());
                }
            }
        }
        NodeKind::List => {
            let offsets = node.offsets().unwrap();
            let child = node.list_child().unwrap();
            assert_eq!(offsets.len(), node.non_null_count());
            assert_eq!(offsets.iter().sum::<usize>(), child.size());
            check_invariants(child);
        }
        NodeKind::Record => {
            // Converter-built records give children one event per record
            // not-null; Arrow-built records give children every slot.
            for name in node.field_names() {
                let child = node.field(name).unwrap();
                assert!(
                    child.size() == node.non_null_count() || child.size() == node.size(),
                    "record child misaligned: field={name}, child_size={}, record_size={}, record_non_null={}",
                    child.size(),
                    node.size(),
                    node.non_null_count()
                );
                check_invariants(child);
            }
        }
    }
}

/// The single record node under the uniform list root.
pub fn root_record(root: &Node) -> &Node {
    assert_eq!(root.kind(), NodeKind::List);
    assert_eq!(root.size(), 1);
    root.list_child().unwrap()
}

pub fn i32_values(node: &Node) -> &[i32] {
    match node.as_primitive().expect("primitive node") {
        PrimitiveVector::Int32(values) => values,
        other => panic!("expected int32 column, got {:?}", other.primitive_type()),
    }
}

pub fn i64_values(node: &Node) -> &[i64] {
    match node.as_primitive().expect("primitive node") {
        PrimitiveVector::Int64(values) => values,
        other => panic!("expected int64 column, got {:?}", other.primitive_type()),
    }
}

pub fn u32_values(node: &Node) -> &[u32] {
    match node.as_primitive().expect("primitive node") {
        PrimitiveVector::UInt32(values) => values,
        other => panic!("expected uint32 column, got {:?}", other.primitive_type()),
    }
}

pub fn u64_values(node: &Node) -> &[u64] {
    match node.as_primitive().expect("primitive node") {
        PrimitiveVector::UInt64(values) => values,
        other => panic!("expected uint64 column, got {:?}", other.primitive_type()),
    }
}

pub fn f32_values(node: &Node) -> &[f32] {
    match node.as_primitive().expect("primitive node") {
        PrimitiveVector::Float32(values) => values,
        other => panic!("expected float32 column, got {:?}", other.primitive_type()),
    }
}

pub fn f64_values(node: &Node) -> &[f64] {
    match node.as_primitive().expect("primitive node") {
        PrimitiveVector::Float64(values) => values,
        other => panic!("expected float64 column, got {:?}", other.primitive_type()),
    }
}

pub fn bool_values(node: &Node) -> &[u8] {
    match node.as_primitive().expect("primitive node") {
        PrimitiveVector::Bool(values) => values,
        other => panic!("expected bool column, got {:?}", other.primitive_type()),
    }
}

pub fn string_values(node: &Node) -> &[String] {
    match node.as_primitive().expect("primitive node") {
        PrimitiveVector::String(values) => values,
        other => panic!("expected string column, got {:?}", other.primitive_type()),
    }
}

pub fn byte_values(node: &Node) -> &[Vec<u8>] {
    match node.as_primitive().expect("primitive node") {
        PrimitiveVector::ByteArray(values) => values,
        other => panic!("expected byte-array column, got {:?}", other.primitive_type()),
    }
}

pub fn enum_parts(node: &Node) -> (&[usize], Vec<String>) {
    let enums = node
        .as_primitive()
        .expect("primitive node")
        .as_enum()
        .expect("enum column");
    let dict = enums.dict().expect("dictionary");
    let names = match dict.values() {
        PrimitiveVector::String(values) => values.clone(),
        other => panic!("expected string dictionary, got {:?}", other.primitive_type()),
    };
    (enums.indices(), names)
}
