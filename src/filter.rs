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
//! Column projection applied to schemas before conversion.
//!
//! A filter is a tree of include/exclude marks keyed by field name. With at
//! least one explicit include anywhere the filter is an allowlist (nothing
//! is kept unless a path leads to an include); with excludes only, every
//! field is kept unless a path leads to an exclude. A schema node inherits
//! an implicit-include flag from its parent and survives when
//! `explicit_include || (implicit_include && !explicit_exclude)`.
//!
//! Filters are built from dotted field paths, e.g. `"m.b"` names field `b`
//! inside record field `m`. A field that ends up both explicitly included
//! and explicitly excluded is a construction error.

use indexmap::IndexMap;

use crate::error::{ConvertError, Result};

#[derive(Debug, Default)]
pub struct ColumnFilter {
    explicitly_include: bool,
    explicitly_exclude: bool,
    fields: IndexMap<String, ColumnFilter>,
}

impl ColumnFilter {
    /// Builds a filter from dotted include and exclude paths.
    pub fn from_paths(include: &[&str], exclude: &[&str]) -> Result<ColumnFilter> {
        let mut root = ColumnFilter::default();
        for path in include {
            root.mark_path(path, true)?;
        }
        for path in exclude {
            root.mark_path(path, false)?;
        }
        root.check()?;
        Ok(root)
    }

    fn mark_path(&mut self, path: &str, include: bool) -> Result<()> {
        let mut node = self;
        for segment in path.split('.') {
            if segment.is_empty() {
                return Err(ConvertError::MalformedInput(format!(
                    "empty field name in filter path: path={path}"
                )));
            }
            node = node.fields.entry(segment.to_string()).or_default();
        }
        if include {
            node.explicitly_include = true;
        } else {
            node.explicitly_exclude = true;
        }
        Ok(())
    }

    fn check(&self) -> Result<()> {
        if self.explicitly_include && self.explicitly_exclude {
            return Err(ConvertError::MalformedInput(
                "field is both explicitly included and excluded".to_string(),
            ));
        }
        for filter in self.fields.values() {
            filter.check()?;
        }
        Ok(())
    }

    /// True when any node in the tree carries an explicit include, which
    /// switches the filter into allowlist mode.
    pub fn has_includes(&self) -> bool {
        self.explicitly_include || self.fields.values().any(|f| f.has_includes())
    }

    /// The implicit-include flag the schema root starts with.
    pub(crate) fn root_implicit(&self) -> bool {
        !self.has_includes()
    }

    pub(crate) fn field(&self, name: &str) -> Option<&ColumnFilter> {
        self.fields.get(name)
    }

    pub(crate) fn included(&self, implicit_include: bool) -> bool {
        self.explicitly_include || (implicit_include && !self.explicitly_exclude)
    }
}

/// Inclusion verdict for a schema position that may have no filter entry.
pub(crate) fn included_of(filter: Option<&ColumnFilter>, implicit_include: bool) -> bool {
    match filter {
        Some(f) => f.included(implicit_include),
        None => implicit_include,
    }
}

pub(crate) fn field_of<'f>(
    filter: Option<&'f ColumnFilter>,
    name: &str,
) -> Option<&'f ColumnFilter> {
    filter.and_then(|f| f.field(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflicting_marks_rejected() {
        let err = ColumnFilter::from_paths(&["m.b"], &["m.b"]).unwrap_err();
        assert!(matches!(err, ConvertError::MalformedInput(_)));
    }

    #[test]
    fn test_include_switches_to_allowlist() {
        let excludes_only = ColumnFilter::from_paths(&[], &["a"]).unwrap();
        assert!(!excludes_only.has_includes());
        assert!(excludes_only.root_implicit());

        let with_include = ColumnFilter::from_paths(&["m.b"], &["a"]).unwrap();
        assert!(with_include.has_includes());
        assert!(!with_include.root_implicit());
    }

    #[test]
    fn test_inclusion_rule() {
        let filter = ColumnFilter::from_paths(&["keep"], &["drop"]).unwrap();
        let implicit = filter.root_implicit();
        assert!(!implicit);
        assert!(included_of(filter.field("keep"), implicit));
        assert!(!included_of(filter.field("drop"), implicit));
        assert!(!included_of(filter.field("other"), implicit));

        let filter = ColumnFilter::from_paths(&[], &["drop"]).unwrap();
        let implicit = filter.root_implicit();
        assert!(implicit);
        assert!(!included_of(filter.field("drop"), implicit));
        assert!(included_of(filter.field("other"), implicit));
    }

    #[test]
    fn test_nested_paths_share_prefix() {
        let filter = ColumnFilter::from_paths(&["m.a", "m.b"], &[]).unwrap();
        let m = filter.field("m").unwrap();
        assert!(m.field("a").is_some());
        assert!(m.field("b").is_some());
        // The shared prefix itself carries no explicit mark.
        assert!(!m.included(false));
    }
}
