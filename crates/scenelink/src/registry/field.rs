// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Field handles and the field registry.

use super::value::{FieldType, FieldValue};
use super::{Arena, Handle};

/// Opaque field token, keyed by `(node id, field name)` on the server
/// side. Repeated resolution of the same pair yields the same token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FieldRef(pub(crate) Handle);

/// Client-side record for one scene-graph field.
#[derive(Debug)]
pub struct FieldHandle {
    pub name: String,
    pub field_type: FieldType,
    /// Element count for MF fields, `-1` for SF fields.
    pub count: i32,
    /// Server id of the owning node.
    pub node_id: i32,
    /// Server-assigned field id.
    pub field_id: i32,
    /// Read-only field inside a PROTO instance.
    pub is_proto_internal: bool,
    /// Cache of the most recently read value; also the short-circuit
    /// target of SET/GET coalescing.
    pub value: FieldValue,
}

/// Registry of every field handle the supervisor has resolved.
#[derive(Default)]
pub struct FieldRegistry {
    arena: Arena<FieldHandle>,
}

impl FieldRegistry {
    #[must_use]
    pub fn get(&self, field: FieldRef) -> Option<&FieldHandle> {
        self.arena.get(field.0)
    }

    pub fn get_mut(&mut self, field: FieldRef) -> Option<&mut FieldHandle> {
        self.arena.get_mut(field.0)
    }

    /// Membership check guarding external callers against stale tokens.
    #[must_use]
    pub fn is_valid(&self, field: FieldRef) -> bool {
        self.arena.contains(field.0)
    }

    /// At most one handle exists per `(node id, name)` pair.
    #[must_use]
    pub fn find(&self, name: &str, node_id: i32) -> Option<FieldRef> {
        self.arena
            .iter()
            .find(|(_, f)| f.node_id == node_id && f.name == name)
            .map(|(h, _)| FieldRef(h))
    }

    pub fn add(
        &mut self,
        name: &str,
        field_type: FieldType,
        count: i32,
        node_id: i32,
        field_id: i32,
        is_proto_internal: bool,
    ) -> FieldRef {
        log::debug!(
            "[REGISTRY] new field handle: node={node_id} name={name} type={}",
            field_type.name()
        );
        FieldRef(self.arena.insert(FieldHandle {
            name: name.to_owned(),
            field_type,
            count,
            node_id,
            field_id,
            is_proto_internal,
            value: FieldValue::zero(field_type.kind),
        }))
    }

    /// Purge every PROTO-internal handle (scene regeneration).
    pub fn remove_proto_internal(&mut self) {
        self.arena.retain(|f| !f.is_proto_internal);
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.arena.iter().count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::value::FieldKind;

    #[test]
    fn test_find_keys_on_node_and_name() {
        let mut reg = FieldRegistry::default();
        let a = reg.add("translation", FieldType::sf(FieldKind::Vec3f), -1, 4, 0, false);
        let b = reg.add("translation", FieldType::sf(FieldKind::Vec3f), -1, 9, 1, false);
        assert_eq!(reg.find("translation", 4), Some(a));
        assert_eq!(reg.find("translation", 9), Some(b));
        assert_eq!(reg.find("rotation", 4), None);
    }

    #[test]
    fn test_fresh_handle_has_zero_cache() {
        let mut reg = FieldRegistry::default();
        let f = reg.add("children", FieldType::mf(FieldKind::Node), 3, 0, 2, false);
        assert_eq!(reg.get(f).unwrap().value, FieldValue::Node(0));
        assert_eq!(reg.get(f).unwrap().count, 3);
    }

    #[test]
    fn test_internal_purge() {
        let mut reg = FieldRegistry::default();
        let internal = reg.add("radius", FieldType::sf(FieldKind::Float), -1, 2, 0, true);
        let outer = reg.add("mass", FieldType::sf(FieldKind::Float), -1, 3, 1, false);
        reg.remove_proto_internal();
        assert!(!reg.is_valid(internal));
        assert!(reg.is_valid(outer));
        assert_eq!(reg.len(), 1);
    }
}
