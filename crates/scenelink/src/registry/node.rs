// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Node handles and the node registry.
//!
//! A handle caches everything the supervisor has learned about one
//! scene-graph node. All vector caches start absent and are populated
//! by reply dispatch; presence means the value was validly received.

use super::{Arena, Handle};

/// Scene-graph node type tag.
///
/// Only the types the client core itself must distinguish are named;
/// everything else travels as [`NodeType::Other`] with its raw code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeType {
    None,
    Group,
    Transform,
    Solid,
    Robot,
    Viewpoint,
    WorldInfo,
    Camera,
    Lidar,
    RangeFinder,
    Other(u32),
}

impl NodeType {
    #[must_use]
    pub fn from_code(code: u32) -> Self {
        match code {
            0 => Self::None,
            1 => Self::Group,
            2 => Self::Transform,
            3 => Self::Solid,
            4 => Self::Robot,
            5 => Self::Viewpoint,
            6 => Self::WorldInfo,
            7 => Self::Camera,
            8 => Self::Lidar,
            9 => Self::RangeFinder,
            other => Self::Other(other),
        }
    }

    #[must_use]
    pub fn code(self) -> u32 {
        match self {
            Self::None => 0,
            Self::Group => 1,
            Self::Transform => 2,
            Self::Solid => 3,
            Self::Robot => 4,
            Self::Viewpoint => 5,
            Self::WorldInfo => 6,
            Self::Camera => 7,
            Self::Lidar => 8,
            Self::RangeFinder => 9,
            Self::Other(code) => code,
        }
    }

    /// Base type name as it appears in scene descriptions.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::None => "",
            Self::Group => "Group",
            Self::Transform => "Transform",
            Self::Solid => "Solid",
            Self::Robot => "Robot",
            Self::Viewpoint => "Viewpoint",
            Self::WorldInfo => "WorldInfo",
            Self::Camera => "Camera",
            Self::Lidar => "Lidar",
            Self::RangeFinder => "RangeFinder",
            Self::Other(_) => "Unknown",
        }
    }
}

/// One world-space contact point together with the node that owns it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContactPoint {
    pub point: [f64; 3],
    pub node_id: i32,
}

/// Opaque node token. Copyable; survives being kept across steps and
/// goes permanently stale when the node is removed or purged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeRef(pub(crate) Handle);

/// Client-side record for one scene-graph node.
#[derive(Debug)]
pub struct NodeHandle {
    /// Server-assigned unique id (`0` is the synthetic root).
    pub id: i32,
    pub node_type: NodeType,
    /// Model name, `None` when it equals the base type name.
    pub model_name: Option<String>,
    /// Effective DEF name (last segment of a dotted DEF path).
    pub def_name: Option<String>,
    /// Server id of the parent node, `-1` when unknown or removed.
    pub parent_id: i32,
    /// Device tag when this node wraps a device, `-1` otherwise.
    pub tag: i32,
    pub is_proto: bool,
    /// Set for nodes obtained through a PROTO scope or contact-point
    /// resolution; such nodes are read-only from outside the PROTO.
    pub is_proto_internal: bool,
    /// Owning PROTO instance when resolved through one.
    pub parent_proto: Option<NodeRef>,

    // Lazily populated caches, written by reply dispatch only.
    pub position: Option<[f64; 3]>,
    pub orientation: Option<[f64; 9]>,
    pub center_of_mass: Option<[f64; 3]>,
    pub contact_points: Vec<ContactPoint>,
    /// `-1` until the first contact query answered (also the sentinel
    /// for "not a solid").
    pub number_of_contact_points: i32,
    /// Simulated time of the last contact query, for per-step caching.
    pub contact_points_time_stamp: f64,
    pub static_balance: bool,
    pub solid_velocity: Option<[f64; 6]>,
}

impl NodeHandle {
    fn new(
        id: i32,
        node_type: NodeType,
        model_name: Option<String>,
        def_name: Option<String>,
        tag: i32,
        parent_id: i32,
        is_proto: bool,
    ) -> Self {
        Self {
            id,
            node_type,
            model_name,
            def_name,
            parent_id,
            tag,
            is_proto,
            is_proto_internal: false,
            parent_proto: None,
            position: None,
            orientation: None,
            center_of_mass: None,
            contact_points: Vec::new(),
            number_of_contact_points: -1,
            contact_points_time_stamp: -1.0,
            static_balance: false,
            solid_velocity: None,
        }
    }
}

/// Effective DEF name of a dotted DEF-path expression: the segment
/// after the last `.` (the prefix names the enclosing PROTO scopes).
#[must_use]
pub fn extract_def(expression: &str) -> &str {
    match expression.rfind('.') {
        Some(dot) => &expression[dot + 1..],
        None => expression,
    }
}

/// Registry of every node handle the supervisor has resolved.
#[derive(Default)]
pub struct NodeRegistry {
    arena: Arena<NodeHandle>,
}

impl NodeRegistry {
    #[must_use]
    pub fn get(&self, node: NodeRef) -> Option<&NodeHandle> {
        self.arena.get(node.0)
    }

    pub fn get_mut(&mut self, node: NodeRef) -> Option<&mut NodeHandle> {
        self.arena.get_mut(node.0)
    }

    /// Membership check guarding external callers against stale tokens.
    #[must_use]
    pub fn is_valid(&self, node: NodeRef) -> bool {
        self.arena.contains(node.0)
    }

    #[must_use]
    pub fn find_by_id(&self, id: i32) -> Option<NodeRef> {
        self.arena.iter().find(|(_, n)| n.id == id).map(|(h, _)| NodeRef(h))
    }

    /// DEF lookup, scoped: inside a PROTO when `parent_proto` is given,
    /// otherwise over non-internal nodes only.
    #[must_use]
    pub fn find_by_def(&self, def: &str, parent_proto: Option<NodeRef>) -> Option<NodeRef> {
        self.arena
            .iter()
            .find(|(_, n)| {
                n.parent_proto == parent_proto
                    && (parent_proto.is_some() || !n.is_proto_internal)
                    && n.def_name.as_deref() == Some(def)
            })
            .map(|(h, _)| NodeRef(h))
    }

    #[must_use]
    pub fn find_by_tag(&self, tag: i32) -> Option<NodeRef> {
        self.arena.iter().find(|(_, n)| n.tag == tag).map(|(h, _)| NodeRef(h))
    }

    /// Insert a node record, idempotent on the server id: when the id is
    /// already known only the DEF name is refreshed (dotted expressions
    /// keep their last segment).
    #[allow(clippy::too_many_arguments)]
    pub fn add(
        &mut self,
        id: i32,
        node_type: NodeType,
        model_name: Option<&str>,
        def_expression: Option<&str>,
        tag: i32,
        parent_id: i32,
        is_proto: bool,
    ) -> NodeRef {
        if let Some(existing) = self.find_by_id(id) {
            if let (Some(def), Some(handle)) = (def_expression, self.arena.get_mut(existing.0)) {
                let effective = extract_def(def);
                if handle.def_name.as_deref() != Some(effective) {
                    handle.def_name = Some(effective.to_owned());
                }
            }
            return existing;
        }

        // A model name equal to the base type name carries no information.
        let model = model_name
            .filter(|m| !m.is_empty() && *m != node_type.name())
            .map(str::to_owned);
        let def = def_expression.map(|d| extract_def(d).to_owned());
        log::debug!(
            "[REGISTRY] new node handle: id={id} type={} def={:?}",
            node_type.name(),
            def
        );
        NodeRef(self.arena.insert(NodeHandle::new(
            id, node_type, model, def, tag, parent_id, is_proto,
        )))
    }

    /// Unlink the node with the given server id and reset the parent id
    /// of every dependent handle to `-1`.
    pub fn remove_by_id(&mut self, id: i32) {
        if let Some(node) = self.find_by_id(id) {
            self.arena.remove(node.0);
        }
        for (_, n) in self.arena.iter_mut() {
            if n.parent_id == id {
                n.parent_id = -1;
            }
        }
    }

    /// Purge every PROTO-internal handle (scene regeneration).
    pub fn remove_proto_internal(&mut self) {
        self.arena.retain(|n| !n.is_proto_internal);
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.arena.iter().count()
    }
}
