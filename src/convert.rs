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
//! Schema-agnostic record shredding.
//!
//! [`convert`] walks one datum into one node. The format adapter supplies a
//! classification per datum, field and list iterators, and a primitive
//! append; the driver owns the recursion, the node specialization, and all
//! presence bookkeeping. Iterator state is plain data and every step goes
//! through the adapter, which keeps the adapter mutable (decoders advance
//! their input as a side effect of iteration).
//!
//! Presence accounting per record observation: every field the iterator
//! emits recurses into its child; every pre-existing field the iterator did
//! not emit receives a null; only then does the record count its own
//! observation. A datum classified incomplete records a null on its node
//! and never descends into children.

use crate::column::PrimitiveVector;
use crate::error::{ConvertError, Result};
use crate::node::{Node, NodeBody, NodeKind};

/// Field identity as reported by an adapter: a positional index for
/// schema-bearing formats whose node skeleton is built up front, or a name
/// for formats that discover fields as they appear. Indexed keys carry the
/// name too, because a node specialized mid-stream (a record first seen
/// beyond the pre-built skeleton) has no children to index into yet.
#[derive(Debug, Clone, Copy)]
pub(crate) enum FieldKey<'a> {
    Index(usize, &'a str),
    Name(&'a str),
}

pub(crate) trait Format<'d> {
    type Datum: Copy;
    type FieldIter;
    type ListIter;

    fn classify(&mut self, datum: Self::Datum) -> Result<NodeKind>;

    fn fields(&mut self, datum: Self::Datum) -> Result<Self::FieldIter>;

    fn field_next(
        &mut self,
        iter: &mut Self::FieldIter,
    ) -> Result<Option<(FieldKey<'d>, Self::Datum)>>;

    fn list(&mut self, datum: Self::Datum) -> Result<Self::ListIter>;

    fn list_next(&mut self, iter: &mut Self::ListIter) -> Result<Option<Self::Datum>>;

    fn add_primitive(&mut self, column: &mut PrimitiveVector, datum: Self::Datum) -> Result<()>;
}

pub(crate) fn convert<'d, F: Format<'d>>(
    fmt: &mut F,
    node: &mut Node,
    datum: F::Datum,
) -> Result<()> {
    let kind = fmt.classify(datum)?;
    if kind == NodeKind::Incomplete {
        node.nulls.add_null();
        return Ok(());
    }

    node.specialize(kind);
    if node.kind() != kind {
        return Err(ConvertError::SchemaConflict(format!(
            "node_kind={:?}, datum_kind={:?}",
            node.kind(),
            kind
        )));
    }

    match &mut node.body {
        NodeBody::Record(rec) => {
            let prior_not_null = node.nulls.non_null_count();
            let mut seen = vec![false; rec.len()];
            let mut iter = fmt.fields(datum)?;
            while let Some((key, child_datum)) = fmt.field_next(&mut iter)? {
                let index = match key {
                    FieldKey::Index(index, name) => {
                        if rec.name_at(index) == Some(name) {
                            index
                        } else {
                            rec.resolve_or_insert(name, prior_not_null)
                        }
                    }
                    FieldKey::Name(name) => rec.resolve_or_insert(name, prior_not_null),
                };
                if index >= seen.len() {
                    seen.resize(index + 1, false);
                }
                seen[index] = true;
                let child = rec.child_mut(index).ok_or_else(|| {
                    ConvertError::MalformedInput(format!(
                        "record field vanished during conversion: index={index}"
                    ))
                })?;
                convert(fmt, child, child_datum)?;
            }
            for index in 0..seen.len() {
                if !seen[index] {
                    if let Some(child) = rec.child_mut(index) {
                        child.nulls.add_null();
                    }
                }
            }
            node.nulls.add_not_null();
        }
        NodeBody::List(list) => {
            let mut count = 0usize;
            let mut iter = fmt.list(datum)?;
            while let Some(element) = fmt.list_next(&mut iter)? {
                convert(fmt, &mut list.child, element)?;
                count += 1;
            }
            list.lengths.push(count);
            node.nulls.add_not_null();
        }
        NodeBody::Primitive(column) => {
            fmt.add_primitive(column, datum)?;
            node.nulls.add_not_null();
        }
        NodeBody::Incomplete => {
            return Err(ConvertError::SchemaConflict(format!(
                "node failed to specialize: datum_kind={kind:?}"
            )));
        }
    }
    Ok(())
}
