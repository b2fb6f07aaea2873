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
//! Column storage primitives.
//!
//! A [`PrimitiveVector`] holds the non-null values of one leaf column as a
//! contiguous typed vector. Vectors start out [`PrimitiveVector::Empty`] and
//! specialize to a concrete type on the first append; once specialized the
//! type is frozen and appends of any other type fail.
//!
//! Enum columns store dictionary indices next to a shared, reference-counted
//! dictionary. Dictionary identity decides whether two enum values may land
//! in the same column; values from a foreign dictionary are rejected.
//!
//! The [`NullIndicator`] records presence per observation as a total count
//! plus a sparse sorted list of the null positions.

use std::sync::Arc;

use crate::error::{ConvertError, Result};

/// Closed set of leaf column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimitiveType {
    Empty,
    Bool,
    Char,
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float16,
    Float32,
    Float64,
    String,
    ByteArray,
    Enum,
}

/// A shared enum dictionary: the value list plus its source marker.
///
/// Schema-sourced dictionaries (Avro enum schema nodes, protobuf enum
/// descriptors) compare by handle identity. Dictionaries decoded from Arrow
/// batches are marked consistently sourced and compare equal to one another,
/// which is what lets one dictionary column span several record batches.
#[derive(Debug)]
pub struct EnumDict {
    values: PrimitiveVector,
    consistently_sourced: bool,
}

impl EnumDict {
    /// Dictionary built from schema symbol names, in declaration order.
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        EnumDict {
            values: PrimitiveVector::String(names.into_iter().map(Into::into).collect()),
            consistently_sourced: false,
        }
    }

    /// Dictionary whose values were decoded alongside the indices.
    pub fn consistently_sourced(values: PrimitiveVector) -> Self {
        EnumDict {
            values,
            consistently_sourced: true,
        }
    }

    pub fn values(&self) -> &PrimitiveVector {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.len() == 0
    }

    fn same_source(a: &Arc<EnumDict>, b: &Arc<EnumDict>) -> bool {
        Arc::ptr_eq(a, b) || (a.consistently_sourced && b.consistently_sourced)
    }
}

/// One decoded enum observation: a dictionary index plus the dictionary it
/// indexes into.
#[derive(Debug, Clone)]
pub struct EnumValue {
    pub index: usize,
    pub dict: Arc<EnumDict>,
}

/// Index buffer of an enum column. The dictionary is adopted from the first
/// appended value.
#[derive(Debug, Default)]
pub struct EnumVector {
    indices: Vec<usize>,
    dict: Option<Arc<EnumDict>>,
}

impl EnumVector {
    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    pub fn dict(&self) -> Option<&Arc<EnumDict>> {
        self.dict.as_ref()
    }

    fn add(&mut self, value: EnumValue) -> Result<()> {
        match &self.dict {
            None => {
                self.indices.push(value.index);
                self.dict = Some(value.dict);
                Ok(())
            }
            Some(own) if EnumDict::same_source(own, &value.dict) => {
                self.indices.push(value.index);
                Ok(())
            }
            Some(own) => Err(ConvertError::MixedEnum(format!(
                "enum value from a different dictionary: column_dict_size={}, value_dict_size={}, value_index={}",
                own.len(),
                value.dict.len(),
                value.index
            ))),
        }
    }
}

/// Typed value storage for one leaf column.
///
/// `Bool` stores one byte per value and `Float16` stores the raw 16-bit
/// patterns; both keep their semantic type distinct from the storage width.
#[derive(Debug)]
pub enum PrimitiveVector {
    Empty,
    Bool(Vec<u8>),
    Char(Vec<u8>),
    Int8(Vec<i8>),
    Int16(Vec<i16>),
    Int32(Vec<i32>),
    Int64(Vec<i64>),
    UInt8(Vec<u8>),
    UInt16(Vec<u16>),
    UInt32(Vec<u32>),
    UInt64(Vec<u64>),
    Float16(Vec<u16>),
    Float32(Vec<f32>),
    Float64(Vec<f64>),
    String(Vec<String>),
    ByteArray(Vec<Vec<u8>>),
    Enum(EnumVector),
}

macro_rules! typed_add {
    ($fn_name:ident, $value_ty:ty, $arm:ident) => {
        pub fn $fn_name(&mut self, value: $value_ty) -> Result<()> {
            if matches!(self, PrimitiveVector::Empty) {
                *self = PrimitiveVector::$arm(Vec::new());
            }
            match self {
                PrimitiveVector::$arm(vec) => {
                    vec.push(value);
                    Ok(())
                }
                other => Err(other.type_mismatch(PrimitiveType::$arm)),
            }
        }
    };
}

impl PrimitiveVector {
    pub fn primitive_type(&self) -> PrimitiveType {
        match self {
            PrimitiveVector::Empty => PrimitiveType::Empty,
            PrimitiveVector::Bool(_) => PrimitiveType::Bool,
            PrimitiveVector::Char(_) => PrimitiveType::Char,
            PrimitiveVector::Int8(_) => PrimitiveType::Int8,
            PrimitiveVector::Int16(_) => PrimitiveType::Int16,
            PrimitiveVector::Int32(_) => PrimitiveType::Int32,
            PrimitiveVector::Int64(_) => PrimitiveType::Int64,
            PrimitiveVector::UInt8(_) => PrimitiveType::UInt8,
            PrimitiveVector::UInt16(_) => PrimitiveType::UInt16,
            PrimitiveVector::UInt32(_) => PrimitiveType::UInt32,
            PrimitiveVector::UInt64(_) => PrimitiveType::UInt64,
            PrimitiveVector::Float16(_) => PrimitiveType::Float16,
            PrimitiveVector::Float32(_) => PrimitiveType::Float32,
            PrimitiveVector::Float64(_) => PrimitiveType::Float64,
            PrimitiveVector::String(_) => PrimitiveType::String,
            PrimitiveVector::ByteArray(_) => PrimitiveType::ByteArray,
            PrimitiveVector::Enum(_) => PrimitiveType::Enum,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            PrimitiveVector::Empty => 0,
            PrimitiveVector::Bool(v) => v.len(),
            PrimitiveVector::Char(v) => v.len(),
            PrimitiveVector::Int8(v) => v.len(),
            PrimitiveVector::Int16(v) => v.len(),
            PrimitiveVector::Int32(v) => v.len(),
            PrimitiveVector::Int64(v) => v.len(),
            PrimitiveVector::UInt8(v) => v.len(),
            PrimitiveVector::UInt16(v) => v.len(),
            PrimitiveVector::UInt32(v) => v.len(),
            PrimitiveVector::UInt64(v) => v.len(),
            PrimitiveVector::Float16(v) => v.len(),
            PrimitiveVector::Float32(v) => v.len(),
            PrimitiveVector::Float64(v) => v.len(),
            PrimitiveVector::String(v) => v.len(),
            PrimitiveVector::ByteArray(v) => v.len(),
            PrimitiveVector::Enum(v) => v.indices.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn type_mismatch(&self, wanted: PrimitiveType) -> ConvertError {
        ConvertError::TypeMismatch(format!(
            "column_type={:?}, value_type={:?}",
            self.primitive_type(),
            wanted
        ))
    }

    typed_add!(add_char, u8, Char);
    typed_add!(add_i8, i8, Int8);
    typed_add!(add_i16, i16, Int16);
    typed_add!(add_i32, i32, Int32);
    typed_add!(add_i64, i64, Int64);
    typed_add!(add_u8, u8, UInt8);
    typed_add!(add_u16, u16, UInt16);
    typed_add!(add_u32, u32, UInt32);
    typed_add!(add_u64, u64, UInt64);
    typed_add!(add_f32, f32, Float32);
    typed_add!(add_f64, f64, Float64);
    typed_add!(add_string, String, String);
    typed_add!(add_bytes, Vec<u8>, ByteArray);

    /// Booleans are stored one byte per value.
    pub fn add_bool(&mut self, value: bool) -> Result<()> {
        if matches!(self, PrimitiveVector::Empty) {
            *self = PrimitiveVector::Bool(Vec::new());
        }
        match self {
            PrimitiveVector::Bool(vec) => {
                vec.push(value as u8);
                Ok(())
            }
            other => Err(other.type_mismatch(PrimitiveType::Bool)),
        }
    }

    /// Half floats are stored as their raw bit patterns, bypassing the
    /// 16-bit unsigned classification the width would otherwise pick.
    pub fn add_f16_bits(&mut self, bits: u16) -> Result<()> {
        if matches!(self, PrimitiveVector::Empty) {
            *self = PrimitiveVector::Float16(Vec::new());
        }
        match self {
            PrimitiveVector::Float16(vec) => {
                vec.push(bits);
                Ok(())
            }
            other => Err(other.type_mismatch(PrimitiveType::Float16)),
        }
    }

    /// Appends an empty string and hands back the slot so the caller can
    /// decode directly into place.
    pub fn add_string_slot(&mut self) -> Result<&mut String> {
        if matches!(self, PrimitiveVector::Empty) {
            *self = PrimitiveVector::String(Vec::new());
        }
        match self {
            PrimitiveVector::String(vec) => {
                vec.push(String::new());
                Ok(vec.last_mut().unwrap())
            }
            other => Err(other.type_mismatch(PrimitiveType::String)),
        }
    }

    pub fn add_enum(&mut self, value: EnumValue) -> Result<()> {
        if matches!(self, PrimitiveVector::Empty) {
            *self = PrimitiveVector::Enum(EnumVector::default());
        }
        match self {
            PrimitiveVector::Enum(vec) => vec.add(value),
            other => Err(other.type_mismatch(PrimitiveType::Enum)),
        }
    }

    pub fn as_enum(&self) -> Option<&EnumVector> {
        match self {
            PrimitiveVector::Enum(v) => Some(v),
            _ => None,
        }
    }
}

/// Per-node presence record: a total observation count plus a sparse sorted
/// index of the null positions.
#[derive(Debug, Default)]
pub struct NullIndicator {
    size: usize,
    nulls: Vec<usize>,
}

impl NullIndicator {
    pub fn add_null(&mut self) {
        self.nulls.push(self.size);
        self.size += 1;
    }

    pub fn add_not_null(&mut self) {
        self.size += 1;
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn null_indices(&self) -> &[usize] {
        &self.nulls
    }

    pub fn null_count(&self) -> usize {
        self.nulls.len()
    }

    pub fn non_null_count(&self) -> usize {
        self.size - self.nulls.len()
    }
}
