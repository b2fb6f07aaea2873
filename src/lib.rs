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
//! Shreds record streams into columnar, hierarchical in-memory trees.
//!
//! Four self-describing formats convert through one tree-shredding core:
//! Avro object-container files, Arrow IPC streams, JSON documents, and
//! length-delimited protobuf streams. The output is a [`Node`] tree
//! mirroring the logical record shape, where each leaf holds its non-null
//! values as one contiguous typed vector and every node carries a sparse
//! null indicator. Conversion is single-threaded, synchronous, and
//! stream-driven; any error aborts the conversion.

pub mod column;
mod convert;
pub mod error;
pub mod filter;
pub mod formats;
pub mod node;

pub use column::{EnumDict, EnumValue, EnumVector, NullIndicator, PrimitiveType, PrimitiveVector};
pub use error::{ConvertError, Result};
pub use filter::ColumnFilter;
pub use formats::arrow::convert_arrow;
pub use formats::avro::{convert_avro, convert_avro_filtered};
pub use formats::json::convert_json;
pub use formats::pbd::{convert_pbd, convert_pbd_filtered};
pub use node::{Node, NodeKind};
