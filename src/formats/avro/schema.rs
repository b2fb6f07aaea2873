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
//! Compacted Avro schema.
//!
//! The schema document is compiled into a [`CNode`] tree that caches the
//! type tag, the children, enum dictionaries, and fixed sizes inline so the
//! decode loop dispatches without touching the JSON again. The column
//! filter is applied during compilation: excluded record fields stay in the
//! tree as skip-only entries (their bytes still sit on the wire), and the
//! surviving fields are numbered by their position among included siblings.
//!
//! Unions are validated at compilation when included: only the `null | T`
//! shape with exactly two branches is accepted. A union is included or
//! excluded atomically; filters do not descend into its branches.
//!
//! Current limitations:
//! - Named-type references resolve by the name as written (optionally
//!   qualified by the enclosing namespace); aliases are not supported.
//! - Recursive named-type references are rejected.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::column::EnumDict;
use crate::error::{ConvertError, Result};
use crate::filter::{field_of, included_of, ColumnFilter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AvroKind {
    Null,
    Bool,
    Int,
    Long,
    Float,
    Double,
    Bytes,
    String,
    Record,
    Enum,
    Array,
    Map,
    Union,
    Fixed,
}

#[derive(Debug, Clone)]
pub(crate) struct CNode {
    pub(crate) kind: AvroKind,
    /// Record fields, the array/map element, or union branches.
    pub(crate) children: Vec<CNode>,
    /// Record field names, parallel to `children`.
    pub(crate) field_names: Vec<String>,
    pub(crate) dict: Option<Arc<EnumDict>>,
    pub(crate) fixed_size: usize,
    pub(crate) included: bool,
    /// Index among included siblings; the node-tree field position.
    pub(crate) node_index: usize,
    /// Union only: the branch that carries data.
    pub(crate) union_branch: usize,
}

impl CNode {
    fn leaf(kind: AvroKind, included: bool) -> CNode {
        CNode {
            kind,
            children: Vec::new(),
            field_names: Vec::new(),
            dict: None,
            fixed_size: 0,
            included,
            node_index: 0,
            union_branch: 0,
        }
    }

    /// The non-null branch for unions, the node itself otherwise.
    pub(crate) fn resolve_union(&self) -> &CNode {
        match self.kind {
            AvroKind::Union => &self.children[self.union_branch],
            _ => self,
        }
    }
}

struct Compiler {
    /// Completed named types, for later references.
    names: HashMap<String, CNode>,
    /// Names currently being compiled; a reference to one is recursion.
    building: Vec<String>,
    /// Pruning only happens when a filter was supplied at all.
    filtering: bool,
}

pub(crate) fn compile_schema(schema: &Value, filter: Option<&ColumnFilter>) -> Result<CNode> {
    let implicit = filter.map(|f| f.root_implicit()).unwrap_or(true);
    let mut compiler = Compiler {
        names: HashMap::new(),
        building: Vec::new(),
        filtering: filter.is_some(),
    };
    compiler.compile(schema, filter, implicit, None)
}

impl Compiler {
    fn compile(
        &mut self,
        schema: &Value,
        filter: Option<&ColumnFilter>,
        implicit: bool,
        namespace: Option<&str>,
    ) -> Result<CNode> {
        match schema {
            Value::String(name) => self.compile_named(name, filter, implicit, namespace),
            Value::Array(branches) => self.compile_union(branches, filter, implicit, namespace),
            Value::Object(fields) => {
                let type_value = fields.get("type").ok_or_else(|| {
                    ConvertError::MalformedInput("schema object has no type".to_string())
                })?;
                let type_name = type_value.as_str().unwrap_or_default();
                match type_name {
                    "record" | "error" => self.compile_record(schema, filter, implicit, namespace),
                    "enum" => self.compile_enum(schema, filter, implicit, namespace),
                    "fixed" => self.compile_fixed(schema, filter, implicit, namespace),
                    "array" => {
                        let items = fields.get("items").ok_or_else(|| {
                            ConvertError::MalformedInput("array schema has no items".to_string())
                        })?;
                        let child = self.compile(items, filter, implicit, namespace)?;
                        let mut node = CNode::leaf(AvroKind::Array, child.included);
                        node.children.push(child);
                        Ok(node)
                    }
                    "map" => {
                        let included = included_of(filter, implicit);
                        if included {
                            return Err(ConvertError::NotImplemented("avro map".to_string()));
                        }
                        let values = fields.get("values").ok_or_else(|| {
                            ConvertError::MalformedInput("map schema has no values".to_string())
                        })?;
                        let child = self.compile(values, None, true, namespace)?;
                        let mut node = CNode::leaf(AvroKind::Map, false);
                        node.children.push(child);
                        Ok(node)
                    }
                    // Wrapped primitives and logical types compile as their
                    // underlying type.
                    _ => self.compile(type_value, filter, implicit, namespace),
                }
            }
            other => Err(ConvertError::MalformedInput(format!(
                "unexpected schema json: value={other}"
            ))),
        }
    }

    fn compile_named(
        &mut self,
        name: &str,
        filter: Option<&ColumnFilter>,
        implicit: bool,
        namespace: Option<&str>,
    ) -> Result<CNode> {
        let kind = match name {
            "null" => Some(AvroKind::Null),
            "boolean" => Some(AvroKind::Bool),
            "int" => Some(AvroKind::Int),
            "long" => Some(AvroKind::Long),
            "float" => Some(AvroKind::Float),
            "double" => Some(AvroKind::Double),
            "bytes" => Some(AvroKind::Bytes),
            "string" => Some(AvroKind::String),
            _ => None,
        };
        if let Some(kind) = kind {
            // The null type is structural, never a data column.
            let included = kind != AvroKind::Null && included_of(filter, implicit);
            return Ok(CNode::leaf(kind, included));
        }

        let qualified = namespace.map(|ns| format!("{ns}.{name}"));
        if self.building.iter().any(|b| {
            b == name || Some(b.as_str()) == qualified.as_deref()
        }) {
            return Err(ConvertError::NotImplemented(format!(
                "recursive type reference: name={name}"
            )));
        }
        let found = self
            .names
            .get(name)
            .or_else(|| qualified.as_deref().and_then(|q| self.names.get(q)));
        match found {
            Some(node) => {
                let mut node = node.clone();
                node.included = included_of(filter, implicit);
                Ok(node)
            }
            None => Err(ConvertError::MalformedInput(format!(
                "unresolved type reference: name={name}"
            ))),
        }
    }

    fn compile_union(
        &mut self,
        branches: &[Value],
        filter: Option<&ColumnFilter>,
        implicit: bool,
        namespace: Option<&str>,
    ) -> Result<CNode> {
        let included = included_of(filter, implicit);
        let mut children = Vec::with_capacity(branches.len());
        for branch in branches {
            children.push(self.compile(branch, None, true, namespace)?);
        }
        let null_count = children
            .iter()
            .filter(|c| c.kind == AvroKind::Null)
            .count();
        if included && (children.len() != 2 || null_count != 1) {
            return Err(ConvertError::UnsupportedUnion(format!(
                "only null|T unions are supported: branches={}, null_branches={}",
                children.len(),
                null_count
            )));
        }
        let union_branch = children
            .iter()
            .position(|c| c.kind != AvroKind::Null)
            .unwrap_or(0);
        let mut node = CNode::leaf(AvroKind::Union, included);
        node.children = children;
        node.union_branch = union_branch;
        Ok(node)
    }

    fn compile_record(
        &mut self,
        schema: &Value,
        filter: Option<&ColumnFilter>,
        implicit: bool,
        namespace: Option<&str>,
    ) -> Result<CNode> {
        let name = schema.get("name").and_then(Value::as_str);
        let own_namespace = schema
            .get("namespace")
            .and_then(Value::as_str)
            .or(namespace);
        if let Some(name) = name {
            self.building.push(name.to_string());
        }

        let included_self = included_of(filter, implicit);
        let fields = schema
            .get("fields")
            .and_then(Value::as_array)
            .ok_or_else(|| {
                ConvertError::MalformedInput("record schema has no fields".to_string())
            })?;

        let mut node = CNode::leaf(AvroKind::Record, included_self);
        let mut included_count = 0usize;
        for field in fields {
            let field_name = field
                .get("name")
                .and_then(Value::as_str)
                .ok_or_else(|| {
                    ConvertError::MalformedInput("record field has no name".to_string())
                })?;
            let field_type = field.get("type").ok_or_else(|| {
                ConvertError::MalformedInput(format!(
                    "record field has no type: field={field_name}"
                ))
            })?;
            let field_filter = field_of(filter, field_name);
            let mut child =
                self.compile(field_type, field_filter, included_self, own_namespace)?;
            if child.included {
                child.node_index = included_count;
                included_count += 1;
            }
            node.children.push(child);
            node.field_names.push(field_name.to_string());
        }
        if self.filtering {
            node.included = included_count > 0;
        }

        if let Some(name) = name {
            self.building.pop();
            self.names.insert(name.to_string(), node.clone());
            if let Some(ns) = own_namespace {
                self.names.insert(format!("{ns}.{name}"), node.clone());
            }
        }
        Ok(node)
    }

    fn compile_enum(
        &mut self,
        schema: &Value,
        filter: Option<&ColumnFilter>,
        implicit: bool,
        namespace: Option<&str>,
    ) -> Result<CNode> {
        let symbols = schema
            .get("symbols")
            .and_then(Value::as_array)
            .ok_or_else(|| {
                ConvertError::MalformedInput("enum schema has no symbols".to_string())
            })?;
        let mut names = Vec::with_capacity(symbols.len());
        for symbol in symbols {
            names.push(
                symbol
                    .as_str()
                    .ok_or_else(|| {
                        ConvertError::MalformedInput("enum symbol is not a string".to_string())
                    })?
                    .to_string(),
            );
        }
        let mut node = CNode::leaf(AvroKind::Enum, included_of(filter, implicit));
        node.dict = Some(Arc::new(EnumDict::from_names(names)));
        self.register_named(schema, namespace, &node);
        Ok(node)
    }

    fn compile_fixed(
        &mut self,
        schema: &Value,
        filter: Option<&ColumnFilter>,
        implicit: bool,
        namespace: Option<&str>,
    ) -> Result<CNode> {
        let size = schema
            .get("size")
            .and_then(Value::as_u64)
            .ok_or_else(|| {
                ConvertError::MalformedInput("fixed schema has no size".to_string())
            })?;
        let mut node = CNode::leaf(AvroKind::Fixed, included_of(filter, implicit));
        node.fixed_size = size as usize;
        self.register_named(schema, namespace, &node);
        Ok(node)
    }

    fn register_named(&mut self, schema: &Value, namespace: Option<&str>, node: &CNode) {
        if let Some(name) = schema.get("name").and_then(Value::as_str) {
            self.names.insert(name.to_string(), node.clone());
            let ns = schema
                .get("namespace")
                .and_then(Value::as_str)
                .or(namespace);
            if let Some(ns) = ns {
                self.names.insert(format!("{ns}.{name}"), node.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_compile_simple_record() {
        let schema = json!({
            "type": "record",
            "name": "row",
            "fields": [
                {"name": "a", "type": "long"},
                {"name": "b", "type": ["null", "string"]},
            ],
        });
        let node = compile_schema(&schema, None).unwrap();
        assert_eq!(node.kind, AvroKind::Record);
        assert_eq!(node.field_names, vec!["a", "b"]);
        assert_eq!(node.children[0].kind, AvroKind::Long);
        assert_eq!(node.children[1].kind, AvroKind::Union);
        assert_eq!(node.children[1].resolve_union().kind, AvroKind::String);
        assert!(node.included);
    }

    #[test]
    fn test_wide_union_rejected() {
        let schema = json!({
            "type": "record",
            "name": "row",
            "fields": [{"name": "u", "type": ["int", "string"]}],
        });
        let err = compile_schema(&schema, None).unwrap_err();
        assert!(matches!(err, ConvertError::UnsupportedUnion(_)));
    }

    #[test]
    fn test_excluded_union_skips_validation() {
        let schema = json!({
            "type": "record",
            "name": "row",
            "fields": [
                {"name": "keep", "type": "int"},
                {"name": "u", "type": ["int", "string"]},
            ],
        });
        let filter = ColumnFilter::from_paths(&["keep"], &[]).unwrap();
        let node = compile_schema(&schema, Some(&filter)).unwrap();
        assert!(node.children[0].included);
        assert!(!node.children[1].included);
        assert_eq!(node.children[0].node_index, 0);
    }

    #[test]
    fn test_filtered_record_numbering() {
        let schema = json!({
            "type": "record",
            "name": "row",
            "fields": [
                {"name": "a", "type": "int"},
                {"name": "b", "type": "int"},
                {"name": "c", "type": "int"},
            ],
        });
        let filter = ColumnFilter::from_paths(&[], &["b"]).unwrap();
        let node = compile_schema(&schema, Some(&filter)).unwrap();
        assert!(node.children[0].included);
        assert!(!node.children[1].included);
        assert!(node.children[2].included);
        assert_eq!(node.children[2].node_index, 1);
    }

    #[test]
    fn test_map_rejected_when_included() {
        let schema = json!({"type": "map", "values": "int"});
        let err = compile_schema(&schema, None).unwrap_err();
        assert!(matches!(err, ConvertError::NotImplemented(_)));
    }

    #[test]
    fn test_named_reference_shares_enum_dict() {
        let schema = json!({
            "type": "record",
            "name": "row",
            "fields": [
                {"name": "x", "type": {"type": "enum", "name": "color", "symbols": ["R", "G"]}},
                {"name": "y", "type": "color"},
            ],
        });
        let node = compile_schema(&schema, None).unwrap();
        let dx = node.children[0].dict.as_ref().unwrap();
        let dy = node.children[1].dict.as_ref().unwrap();
        assert!(Arc::ptr_eq(dx, dy));
    }
}
