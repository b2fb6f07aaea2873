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
//! Format adapters and their top-level drivers.
//!
//! Each submodule adapts one serialization format to the generic converter
//! and exposes a `convert` entry point taking a blocking byte source. The
//! record-stream formats (Avro, Arrow, Protobuf) all return the same root
//! shape: one outer list observation whose length is the record count, over
//! a record of the discovered columns.

pub mod arrow;
pub mod avro;
pub mod json;
pub mod pbd;

/// Reads pull through a buffer of this size so per-call cost stays amortized
/// even for remote or foreign byte sources.
pub(crate) const READ_BUFFER_SIZE: usize = 64 * 1024;
