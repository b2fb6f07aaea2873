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
//! Error type shared by all converters.
//!
//! Every error aborts the current conversion; there is no partial-result
//! recovery and no retry path. Messages carry `key=value` context so a
//! failure can be traced back to the offending column or wire position.

use arrow::error::ArrowError;

pub type Result<T> = std::result::Result<T, ConvertError>;

#[derive(Debug, thiserror::Error)]
pub enum ConvertError {
    /// A node's established variant disagrees with a new observation.
    #[error("schema conflict: {0}")]
    SchemaConflict(String),
    /// An Avro union that is not of shape `null | T`.
    #[error("unsupported union: {0}")]
    UnsupportedUnion(String),
    /// Protobuf group wire types.
    #[error("unsupported protobuf groups: {0}")]
    UnsupportedGroups(String),
    /// A deliberately unsupported type or encoding.
    #[error("not implemented: {0}")]
    NotImplemented(String),
    /// An enum value from a foreign dictionary appended to an existing enum column.
    #[error("mixed enum sources: {0}")]
    MixedEnum(String),
    /// A decoding failure in the underlying byte stream: truncation, bad
    /// varints, bad length prefixes, failed library decodes.
    #[error("malformed input: {0}")]
    MalformedInput(String),
    /// A value appended to a primitive column of a different specialized type.
    #[error("mismatched primitive types: {0}")]
    TypeMismatch(String),
}

impl From<std::io::Error> for ConvertError {
    fn from(e: std::io::Error) -> Self {
        ConvertError::MalformedInput(format!("io error while decoding: error={e}"))
    }
}

impl From<serde_json::Error> for ConvertError {
    fn from(e: serde_json::Error) -> Self {
        ConvertError::MalformedInput(format!("json parse failed: error={e}"))
    }
}

impl From<ArrowError> for ConvertError {
    fn from(e: ArrowError) -> Self {
        ConvertError::MalformedInput(format!("arrow stream decode failed: error={e}"))
    }
}

impl From<prost::DecodeError> for ConvertError {
    fn from(e: prost::DecodeError) -> Self {
        ConvertError::MalformedInput(format!("descriptor set decode failed: error={e}"))
    }
}
