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
//! The columnar node tree produced by every converter.
//!
//! A node couples a null indicator with one of four bodies:
//! - `Incomplete`: only nulls observed so far, shape unknown;
//! - `Primitive`: one typed value vector;
//! - `List`: per-observation element counts plus a single child node;
//! - `Record`: an insertion-ordered map of named children.
//!
//! A node specializes from `Incomplete` in place, carrying its accumulated
//! null indicator forward; after that the variant is frozen. List element
//! counts are recorded per non-null observation, so the child accumulates
//! exactly the summed count of observations. Record children observe one
//! presence event per record-level not-null observation.

use indexmap::IndexMap;

use crate::column::{NullIndicator, PrimitiveVector};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Incomplete,
    Primitive,
    List,
    Record,
}

#[derive(Debug)]
pub(crate) enum NodeBody {
    Incomplete,
    Primitive(PrimitiveVector),
    List(ListBody),
    Record(RecordBody),
}

#[derive(Debug)]
pub(crate) struct ListBody {
    /// Element count per non-null list observation.
    pub(crate) lengths: Vec<usize>,
    pub(crate) child: Box<Node>,
}

#[derive(Debug, Default)]
pub(crate) struct RecordBody {
    fields: IndexMap<String, Node>,
}

impl RecordBody {
    pub(crate) fn len(&self) -> usize {
        self.fields.len()
    }

    pub(crate) fn child_mut(&mut self, index: usize) -> Option<&mut Node> {
        self.fields.get_index_mut(index).map(|(_, node)| node)
    }

    pub(crate) fn name_at(&self, index: usize) -> Option<&str> {
        self.fields.get_index(index).map(|(name, _)| name.as_str())
    }

    /// Appends a new field with an incomplete child. Used when the schema is
    /// known up front and the skeleton is built before any data arrives.
    pub(crate) fn push_field(&mut self, name: &str) -> &mut Node {
        self.fields
            .entry(name.to_string())
            .or_insert_with(Node::incomplete)
    }

    /// Resolves a field by name, creating it on first encounter. A child
    /// created late is backfilled with one null per record observation it
    /// missed, so its positions stay aligned with its siblings.
    pub(crate) fn resolve_or_insert(&mut self, name: &str, backfill_nulls: usize) -> usize {
        if let Some(index) = self.fields.get_index_of(name) {
            return index;
        }
        let mut child = Node::incomplete();
        for _ in 0..backfill_nulls {
            child.nulls.add_null();
        }
        let (index, _) = self.fields.insert_full(name.to_string(), child);
        index
    }
}

#[derive(Debug)]
pub struct Node {
    pub(crate) nulls: NullIndicator,
    pub(crate) body: NodeBody,
}

impl Node {
    pub(crate) fn incomplete() -> Node {
        Node {
            nulls: NullIndicator::default(),
            body: NodeBody::Incomplete,
        }
    }

    pub(crate) fn new_list() -> Node {
        Node {
            nulls: NullIndicator::default(),
            body: NodeBody::List(ListBody {
                lengths: Vec::new(),
                child: Box::new(Node::incomplete()),
            }),
        }
    }

    /// Replaces an incomplete body with the given variant, keeping the null
    /// indicator accumulated so far. Non-incomplete nodes are left alone.
    pub(crate) fn specialize(&mut self, kind: NodeKind) {
        if !matches!(self.body, NodeBody::Incomplete) {
            return;
        }
        self.body = match kind {
            NodeKind::Incomplete => return,
            NodeKind::Primitive => NodeBody::Primitive(PrimitiveVector::Empty),
            NodeKind::List => NodeBody::List(ListBody {
                lengths: Vec::new(),
                child: Box::new(Node::incomplete()),
            }),
            NodeKind::Record => NodeBody::Record(RecordBody::default()),
        };
    }

    pub fn kind(&self) -> NodeKind {
        match self.body {
            NodeBody::Incomplete => NodeKind::Incomplete,
            NodeBody::Primitive(_) => NodeKind::Primitive,
            NodeBody::List(_) => NodeKind::List,
            NodeBody::Record(_) => NodeKind::Record,
        }
    }

    /// Total observations on this node, null or not.
    pub fn size(&self) -> usize {
        self.nulls.size()
    }

    /// Positions at which a null was observed, strictly increasing.
    pub fn null_indices(&self) -> &[usize] {
        self.nulls.null_indices()
    }

    pub fn null_count(&self) -> usize {
        self.nulls.null_count()
    }

    pub fn non_null_count(&self) -> usize {
        self.nulls.non_null_count()
    }

    pub fn as_primitive(&self) -> Option<&PrimitiveVector> {
        match &self.body {
            NodeBody::Primitive(vec) => Some(vec),
            _ => None,
        }
    }

    /// Element count per non-null list observation.
    pub fn offsets(&self) -> Option<&[usize]> {
        match &self.body {
            NodeBody::List(list) => Some(&list.lengths),
            _ => None,
        }
    }

    pub fn list_child(&self) -> Option<&Node> {
        match &self.body {
            NodeBody::List(list) => Some(&list.child),
            _ => None,
        }
    }

    /// Field names in insertion order. Empty for non-record nodes.
    pub fn field_names(&self) -> Vec<&str> {
        match &self.body {
            NodeBody::Record(rec) => rec.fields.keys().map(|k| k.as_str()).collect(),
            _ => Vec::new(),
        }
    }

    pub fn field_count(&self) -> usize {
        match &self.body {
            NodeBody::Record(rec) => rec.len(),
            _ => 0,
        }
    }

    pub fn field(&self, name: &str) -> Option<&Node> {
        match &self.body {
            NodeBody::Record(rec) => rec.fields.get(name),
            _ => None,
        }
    }

    pub fn field_at(&self, index: usize) -> Option<&Node> {
        match &self.body {
            NodeBody::Record(rec) => rec.fields.get_index(index).map(|(_, node)| node),
            _ => None,
        }
    }
}
