//! Group data model.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use crate::device::DeviceStatus;

/// Static groups hold explicit membership; dynamic groups are evaluated
/// against the device registry via [`GroupQuery`] on every `ListDevices`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupType {
    Static,
    Dynamic,
}

/// A group's position in the tenant's forest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ancestry {
    pub path: String,
    pub path_parts: Vec<Uuid>,
    pub depth: usize,
    pub children: Vec<Uuid>,
}

impl Ancestry {
    /// Root-form ancestry generated when a group is created with no parent.
    pub fn root(id: Uuid) -> Self {
        Self {
            path: format!("/{id}"),
            path_parts: vec![id],
            depth: 0,
            children: Vec::new(),
        }
    }
}

/// Dynamic-membership query, required on groups of type `dynamic`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupQuery {
    #[serde(default)]
    pub tags: HashMap<String, String>,
    pub status: Option<DeviceStatus>,
    #[serde(default)]
    pub regions: Vec<String>,
    pub custom_blob: Option<serde_json::Value>,
}

/// Group-level configuration and free-form metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupProperties {
    pub config_template: Option<Uuid>,
    #[serde(default)]
    pub policy_overrides: HashMap<String, Vec<u8>>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// A hierarchical device group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub id: Uuid,
    pub tenant_id: String,
    pub name: String,
    pub group_type: GroupType,
    pub parent_id: Option<Uuid>,
    pub ancestry: Ancestry,
    pub query: Option<GroupQuery>,
    pub properties: GroupProperties,
    pub device_count: usize,
    /// Static membership set; empty and unused for dynamic groups.
    #[serde(default)]
    pub members: HashSet<Uuid>,
}

impl Group {
    /// Builds a fresh root-form group: `path="/"+id`, `depth=0`, no children.
    pub fn new(tenant_id: impl Into<String>, name: impl Into<String>, group_type: GroupType) -> Self {
        let id = Uuid::new_v4();
        Self {
            id,
            tenant_id: tenant_id.into(),
            name: name.into(),
            group_type,
            parent_id: None,
            ancestry: Ancestry::root(id),
            query: match group_type {
                GroupType::Dynamic => Some(GroupQuery::default()),
                GroupType::Static => None,
            },
            properties: GroupProperties::default(),
            device_count: 0,
            members: HashSet::new(),
        }
    }

    /// Field validation (Group "Invariants", structural subset not
    /// requiring knowledge of sibling groups — the full acyclic/bidirectional
    /// checks live in [`crate::group::hierarchy`]).
    pub fn validate(&self) -> Result<(), String> {
        if self.tenant_id.is_empty() {
            return Err("tenant_id must not be empty".to_string());
        }
        if self.name.is_empty() {
            return Err("name must not be empty".to_string());
        }
        match self.group_type {
            GroupType::Dynamic if self.query.is_none() => {
                return Err("dynamic group must carry a query".to_string());
            }
            GroupType::Static if self.query.is_some() => {
                return Err("static group must not carry a query".to_string());
            }
            _ => {}
        }
        if self.ancestry.path_parts.last() != Some(&self.id) {
            return Err("ancestry path_parts must end with the group's own id".to_string());
        }
        if self.ancestry.depth != self.ancestry.path_parts.len().saturating_sub(1) {
            return Err("ancestry depth must equal len(path_parts) - 1".to_string());
        }
        if self.parent_id.is_none() && self.ancestry.path != format!("/{}", self.id) {
            return Err("root group path must be \"/\" + id".to_string());
        }
        Ok(())
    }
}

/// Recognized group list/filter options.
#[derive(Debug, Clone, Default)]
pub struct GroupListOptions {
    pub tenant_id: Option<String>,
    pub parent_id: Option<Uuid>,
    pub group_type: Option<GroupType>,
    pub tags: HashMap<String, String>,
    /// `-1` means no filter; "depth filter -1 does not filter".
    pub depth: i64,
    pub offset: usize,
    pub limit: i64,
    pub include_empty: bool,
}

impl GroupListOptions {
    pub fn new() -> Self {
        Self {
            depth: -1,
            include_empty: true,
            ..Default::default()
        }
    }

    pub fn with_tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    pub fn with_parent(mut self, parent_id: Uuid) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    pub fn with_type(mut self, group_type: GroupType) -> Self {
        self.group_type = Some(group_type);
        self
    }

    pub fn with_depth(mut self, depth: i64) -> Self {
        self.depth = depth;
        self
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_include_empty(mut self, include_empty: bool) -> Self {
        self.include_empty = include_empty;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_root_group_has_trivial_ancestry() {
        let g = Group::new("tenant-a", "fleet", GroupType::Static);
        assert_eq!(g.ancestry.depth, 0);
        assert_eq!(g.ancestry.path, format!("/{}", g.id));
        assert!(g.validate().is_ok());
    }

    #[test]
    fn dynamic_group_requires_query() {
        let mut g = Group::new("tenant-a", "fleet", GroupType::Dynamic);
        assert!(g.validate().is_ok());
        g.query = None;
        assert!(g.validate().is_err());
    }
}
