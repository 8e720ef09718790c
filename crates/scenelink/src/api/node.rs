// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Node resolution, introspection and mutation operations.

use crate::registry::{NodeRef, NodeType};
use crate::runtime::StepDriver;
use crate::session::NodeLookup;

use super::{check_node, check_supervisor, StateGuard, Supervisor};
use super::{INVALID_VEC3, INVALID_VEC6, INVALID_VEC9};

impl<D: StepDriver> Supervisor<D> {
    /// The synthetic scene root (server id 0).
    #[must_use]
    pub fn root(&self) -> Option<NodeRef> {
        let state = self.lock();
        if !check_supervisor(&state, "root") {
            return None;
        }
        Some(state.root)
    }

    /// The controller's own robot node, once `CONFIGURE` has arrived.
    #[must_use]
    pub fn self_node(&self) -> Option<NodeRef> {
        let state = self.lock();
        if !check_supervisor(&state, "self_node") {
            return None;
        }
        state.self_node
    }

    /// Resolve a node by its server id.
    #[must_use]
    pub fn node_from_id(&self, id: i32) -> Option<NodeRef> {
        let state = self.lock();
        if !check_supervisor(&state, "node_from_id") {
            return None;
        }
        if id < 0 {
            log::error!("[API] node_from_id() called with a negative 'id' argument");
            return None;
        }
        self.resolve_by_id(state, id).1
    }

    /// Resolve a node by DEF name in the world scope. A dotted
    /// expression names enclosing PROTO scopes; the last segment is the
    /// effective DEF name.
    #[must_use]
    pub fn node_from_def(&self, def: &str) -> Option<NodeRef> {
        let mut state = self.lock();
        if !check_supervisor(&state, "node_from_def") {
            return None;
        }
        if def.is_empty() {
            log::error!("[API] node_from_def() called with an empty 'def' argument");
            return None;
        }
        if let Some(found) = state.nodes.find_by_def(def, None) {
            return Some(found);
        }
        state.one_shots.node_lookup = Some(NodeLookup::ByDef { def: def.to_owned(), proto_id: -1 });
        state.one_shots.resolved_node_id = None;
        let mut state = self.flush(state);
        state.one_shots.node_lookup = None;
        let uid = state.one_shots.resolved_node_id.take()?;
        state.nodes.find_by_id(uid)
    }

    /// Resolve the node wrapping the device with the given tag.
    #[must_use]
    pub fn node_from_device(&self, tag: i32) -> Option<NodeRef> {
        let mut state = self.lock();
        if !check_supervisor(&state, "node_from_device") {
            return None;
        }
        if tag < 0 || tag >= state.ctx.device_count {
            log::error!("[API] node_from_device() called with an invalid 'tag' argument");
            return None;
        }
        if let Some(found) = state.nodes.find_by_tag(tag) {
            return Some(found);
        }
        state.one_shots.node_lookup = Some(NodeLookup::ByTag(tag));
        state.one_shots.resolved_node_id = None;
        let mut state = self.flush(state);
        state.one_shots.node_lookup = None;
        let uid = state.one_shots.resolved_node_id.take()?;
        state.nodes.find_by_id(uid)
    }

    /// Resolve a DEF name inside a PROTO instance. The result is
    /// PROTO-internal: readable, never writable.
    #[must_use]
    pub fn node_from_proto_def(&self, node: NodeRef, def: &str) -> Option<NodeRef> {
        let mut state = self.lock();
        if !check_supervisor(&state, "node_from_proto_def") {
            return None;
        }
        if def.is_empty() {
            log::error!("[API] node_from_proto_def() called with an empty 'def' argument");
            return None;
        }
        if !check_node(&state, node, "node_from_proto_def") {
            return None;
        }
        let Some(handle) = state.nodes.get(node) else { return None };
        if !handle.is_proto {
            if !state.ctx.quitting {
                log::error!("[API] node_from_proto_def(): 'node' is not a PROTO node");
            }
            return None;
        }
        let proto_id = handle.id;
        if let Some(found) = state.nodes.find_by_def(def, Some(node)) {
            return Some(found);
        }
        state.one_shots.node_lookup = Some(NodeLookup::ByDef { def: def.to_owned(), proto_id });
        state.one_shots.resolved_node_id = None;
        let mut state = self.flush(state);
        state.one_shots.node_lookup = None;
        let uid = state.one_shots.resolved_node_id.take()?;
        let found = state.nodes.find_by_id(uid)?;
        if let Some(h) = state.nodes.get_mut(found) {
            h.is_proto_internal = true;
            h.parent_proto = Some(node);
        }
        Some(found)
    }

    /// The node currently selected in the simulator's scene tree.
    #[must_use]
    pub fn selected_node(&self) -> Option<NodeRef> {
        let mut state = self.lock();
        if !check_supervisor(&state, "selected_node") {
            return None;
        }
        state.one_shots.node_lookup = Some(NodeLookup::Selected);
        state.one_shots.resolved_node_id = None;
        let mut state = self.flush(state);
        state.one_shots.node_lookup = None;
        let uid = state.one_shots.resolved_node_id.take()?;
        state.nodes.find_by_id(uid)
    }

    /// Parent node, resolving through the server when unknown locally.
    #[must_use]
    pub fn node_parent(&self, node: NodeRef) -> Option<NodeRef> {
        let state = self.lock();
        if !check_supervisor(&state, "node_parent") {
            return None;
        }
        if !check_node(&state, node, "node_parent") {
            return None;
        }
        let parent_id = state.nodes.get(node)?.parent_id;
        if parent_id < 0 {
            return None;
        }
        self.resolve_by_id(state, parent_id).1
    }

    /// Server id, or `-1` for an invalid or PROTO-internal node.
    #[must_use]
    pub fn node_id(&self, node: NodeRef) -> i32 {
        let state = self.lock();
        if !check_supervisor(&state, "node_id") || !check_node(&state, node, "node_id") {
            return -1;
        }
        let Some(handle) = state.nodes.get(node) else { return -1 };
        if handle.is_proto_internal {
            if !state.ctx.quitting {
                log::error!("[API] node_id() called for a PROTO-internal node");
            }
            return -1;
        }
        handle.id
    }

    #[must_use]
    pub fn node_type(&self, node: NodeRef) -> NodeType {
        let state = self.lock();
        if !check_supervisor(&state, "node_type") || !check_node(&state, node, "node_type") {
            return NodeType::None;
        }
        state.nodes.get(node).map_or(NodeType::None, |n| n.node_type)
    }

    /// Model name when set, base type name otherwise.
    #[must_use]
    pub fn node_type_name(&self, node: NodeRef) -> String {
        let state = self.lock();
        if !check_supervisor(&state, "node_type_name")
            || !check_node(&state, node, "node_type_name")
        {
            return String::new();
        }
        state.nodes.get(node).map_or_else(String::new, |n| {
            n.model_name.clone().unwrap_or_else(|| n.node_type.name().to_owned())
        })
    }

    #[must_use]
    pub fn node_base_type_name(&self, node: NodeRef) -> String {
        let state = self.lock();
        if !check_supervisor(&state, "node_base_type_name")
            || !check_node(&state, node, "node_base_type_name")
        {
            return String::new();
        }
        state.nodes.get(node).map_or_else(String::new, |n| n.node_type.name().to_owned())
    }

    /// Effective DEF name, empty when the node has none.
    #[must_use]
    pub fn node_def(&self, node: NodeRef) -> String {
        let state = self.lock();
        if !check_supervisor(&state, "node_def") || !check_node(&state, node, "node_def") {
            return String::new();
        }
        state
            .nodes
            .get(node)
            .and_then(|n| n.def_name.clone())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn node_is_proto(&self, node: NodeRef) -> bool {
        let state = self.lock();
        if !check_supervisor(&state, "node_is_proto") || !check_node(&state, node, "node_is_proto")
        {
            return false;
        }
        state.nodes.get(node).is_some_and(|n| n.is_proto)
    }

    // -----------------------------------------------------------------
    // Cached vector queries (one round-trip each)
    // -----------------------------------------------------------------

    /// World position; all-NaN when the node carries no transform.
    #[must_use]
    pub fn node_position(&self, node: NodeRef) -> [f64; 3] {
        let mut state = self.lock();
        if !check_supervisor(&state, "node_position")
            || !check_node(&state, node, "node_position")
        {
            return INVALID_VEC3;
        }
        state.one_shots.position_node = Some(node);
        let mut state = self.flush(state);
        state.one_shots.position_node = None;
        state.nodes.get(node).and_then(|n| n.position).unwrap_or(INVALID_VEC3)
    }

    /// World orientation as a row-major 3x3 matrix; all-NaN when the
    /// node carries no transform.
    #[must_use]
    pub fn node_orientation(&self, node: NodeRef) -> [f64; 9] {
        let mut state = self.lock();
        if !check_supervisor(&state, "node_orientation")
            || !check_node(&state, node, "node_orientation")
        {
            return INVALID_VEC9;
        }
        state.one_shots.orientation_node = Some(node);
        let mut state = self.flush(state);
        state.one_shots.orientation_node = None;
        state.nodes.get(node).and_then(|n| n.orientation).unwrap_or(INVALID_VEC9)
    }

    /// Centre of mass; all-NaN when the node is not a solid.
    #[must_use]
    pub fn node_center_of_mass(&self, node: NodeRef) -> [f64; 3] {
        let mut state = self.lock();
        if !check_supervisor(&state, "node_center_of_mass")
            || !check_node(&state, node, "node_center_of_mass")
        {
            return INVALID_VEC3;
        }
        state.one_shots.center_of_mass_node = Some(node);
        let mut state = self.flush(state);
        state.one_shots.center_of_mass_node = None;
        state.nodes.get(node).and_then(|n| n.center_of_mass).unwrap_or(INVALID_VEC3)
    }

    /// Number of active contact points, `-1` when the node is not a
    /// solid. At most one round-trip per simulated time step; repeated
    /// calls in the same step answer from the cache.
    #[must_use]
    pub fn node_number_of_contact_points(&self, node: NodeRef, include_descendants: bool) -> i32 {
        let state = self.lock();
        if !check_supervisor(&state, "node_number_of_contact_points")
            || !check_node(&state, node, "node_number_of_contact_points")
        {
            return -1;
        }
        let state = self.refresh_contact_points(state, node, include_descendants);
        state.nodes.get(node).map_or(-1, |n| n.number_of_contact_points)
    }

    /// World coordinates of one contact point; all-NaN out of range.
    #[must_use]
    pub fn node_contact_point(&self, node: NodeRef, index: usize) -> [f64; 3] {
        let state = self.lock();
        if !check_supervisor(&state, "node_contact_point")
            || !check_node(&state, node, "node_contact_point")
        {
            return INVALID_VEC3;
        }
        let state = self.refresh_contact_points(state, node, false);
        state
            .nodes
            .get(node)
            .and_then(|n| n.contact_points.get(index))
            .map_or(INVALID_VEC3, |cp| cp.point)
    }

    /// The (possibly PROTO-internal) node owning one contact point.
    #[must_use]
    pub fn node_contact_point_node(&self, node: NodeRef, index: usize) -> Option<NodeRef> {
        let state = self.lock();
        if !check_supervisor(&state, "node_contact_point_node")
            || !check_node(&state, node, "node_contact_point_node")
        {
            return None;
        }
        let mut state = self.refresh_contact_points(state, node, false);
        let owner_id = state.nodes.get(node)?.contact_points.get(index)?.node_id;
        // Contact-point owners may live inside a PROTO; this is the one
        // lookup allowed to admit internal nodes into the registry.
        state.one_shots.allow_internal_contact_node = true;
        let (mut state, result) = self.resolve_by_id(state, owner_id);
        state.one_shots.allow_internal_contact_node = false;
        result
    }

    /// Whether the node (a top solid) is statically balanced.
    #[must_use]
    pub fn node_static_balance(&self, node: NodeRef) -> bool {
        let mut state = self.lock();
        if !check_supervisor(&state, "node_static_balance")
            || !check_node(&state, node, "node_static_balance")
        {
            return false;
        }
        state.one_shots.static_balance_node = Some(node);
        let mut state = self.flush(state);
        state.one_shots.static_balance_node = None;
        state.nodes.get(node).is_some_and(|n| n.static_balance)
    }

    /// Linear and angular velocity; all-NaN when the node is not a
    /// solid.
    #[must_use]
    pub fn node_velocity(&self, node: NodeRef) -> [f64; 6] {
        let mut state = self.lock();
        if !check_supervisor(&state, "node_velocity")
            || !check_node(&state, node, "node_velocity")
        {
            return INVALID_VEC6;
        }
        if let Some(handle) = state.nodes.get_mut(node) {
            handle.solid_velocity = None;
        }
        state.one_shots.velocity_get_node = Some(node);
        let mut state = self.flush(state);
        state.one_shots.velocity_get_node = None;
        state.nodes.get(node).and_then(|n| n.solid_velocity).unwrap_or(INVALID_VEC6)
    }

    pub fn node_set_velocity(&self, node: NodeRef, velocity: [f64; 6]) {
        let mut state = self.lock();
        if !check_supervisor(&state, "node_set_velocity")
            || !check_node(&state, node, "node_set_velocity")
            || !check_vector(&velocity, "node_set_velocity")
        {
            return;
        }
        state.one_shots.velocity_set = Some((node, velocity));
        let mut state = self.flush(state);
        state.one_shots.velocity_set = None;
    }

    /// Zero the velocities and forces of this solid only.
    pub fn node_reset_physics(&self, node: NodeRef) {
        let mut state = self.lock();
        if !check_supervisor(&state, "node_reset_physics")
            || !check_node(&state, node, "node_reset_physics")
        {
            return;
        }
        state.one_shots.reset_physics_node = Some(node);
        let mut state = self.flush(state);
        state.one_shots.reset_physics_node = None;
    }

    /// Restart the controller of a robot node.
    pub fn node_restart_controller(&self, node: NodeRef) {
        let mut state = self.lock();
        if !check_supervisor(&state, "node_restart_controller")
            || !check_node(&state, node, "node_restart_controller")
        {
            return;
        }
        state.one_shots.restart_controller_node = Some(node);
        let mut state = self.flush(state);
        state.one_shots.restart_controller_node = None;
    }

    /// Show or hide `node` for one specific viewer: the viewpoint or a
    /// camera, lidar or range-finder device node.
    pub fn node_set_visibility(&self, node: NodeRef, from: NodeRef, visible: bool) {
        let mut state = self.lock();
        if !check_supervisor(&state, "node_set_visibility")
            || !check_node(&state, node, "node_set_visibility")
        {
            return;
        }
        if !state.nodes.is_valid(from) {
            if !state.ctx.quitting {
                log::error!("[API] node_set_visibility() called with a stale 'from' argument");
            }
            return;
        }
        let viewer_type = state.nodes.get(from).map(|n| n.node_type);
        if !matches!(
            viewer_type,
            Some(NodeType::Viewpoint | NodeType::Camera | NodeType::Lidar | NodeType::RangeFinder)
        ) {
            log::error!(
                "[API] node_set_visibility(): 'from' must be the viewpoint or a camera, lidar \
                 or range-finder node"
            );
            return;
        }
        state.one_shots.visibility = Some((node, from, visible));
        let mut state = self.flush(state);
        state.one_shots.visibility = None;
    }

    /// Move the viewpoint so the given node fills the view.
    pub fn node_move_viewpoint(&self, node: NodeRef) {
        let mut state = self.lock();
        if !check_supervisor(&state, "node_move_viewpoint")
            || !check_node(&state, node, "node_move_viewpoint")
        {
            return;
        }
        state.one_shots.move_viewpoint_node = Some(node);
        let mut state = self.flush(state);
        state.one_shots.move_viewpoint_node = None;
    }

    /// Apply a force at the solid's centre of mass for this step.
    pub fn node_add_force(&self, node: NodeRef, force: [f64; 3], relative: bool) {
        let mut state = self.lock();
        if !check_supervisor(&state, "node_add_force")
            || !check_node(&state, node, "node_add_force")
            || !check_vector(&force, "node_add_force")
        {
            return;
        }
        state.one_shots.add_force = Some((node, force, relative));
        let mut state = self.flush(state);
        state.one_shots.add_force = None;
    }

    /// Apply a force at an offset from the solid's origin for this step.
    pub fn node_add_force_with_offset(
        &self,
        node: NodeRef,
        force: [f64; 3],
        offset: [f64; 3],
        relative: bool,
    ) {
        let mut state = self.lock();
        if !check_supervisor(&state, "node_add_force_with_offset")
            || !check_node(&state, node, "node_add_force_with_offset")
            || !check_vector(&force, "node_add_force_with_offset")
            || !check_vector(&offset, "node_add_force_with_offset")
        {
            return;
        }
        state.one_shots.add_force_with_offset = Some((node, force, offset, relative));
        let mut state = self.flush(state);
        state.one_shots.add_force_with_offset = None;
    }

    /// Apply a torque to the solid for this step.
    pub fn node_add_torque(&self, node: NodeRef, torque: [f64; 3], relative: bool) {
        let mut state = self.lock();
        if !check_supervisor(&state, "node_add_torque")
            || !check_node(&state, node, "node_add_torque")
            || !check_vector(&torque, "node_add_torque")
        {
            return;
        }
        state.one_shots.add_torque = Some((node, torque, relative));
        let mut state = self.flush(state);
        state.one_shots.add_torque = None;
    }

    /// Remove a node from the scene. The root, the viewpoint and the
    /// world-info node are refused. The local handle dies when the
    /// server's removal notification is dispatched.
    pub fn node_remove(&self, node: NodeRef) {
        let mut state = self.lock();
        if !check_supervisor(&state, "node_remove") || !check_node(&state, node, "node_remove") {
            return;
        }
        let Some(handle) = state.nodes.get(node) else { return };
        if handle.id == 0 {
            if !state.ctx.quitting {
                log::error!("[API] node_remove() cannot remove the scene root");
            }
            return;
        }
        if matches!(handle.node_type, NodeType::Viewpoint | NodeType::WorldInfo) {
            if !state.ctx.quitting {
                log::error!("[API] node_remove() called with a Viewpoint or WorldInfo node");
            }
            return;
        }
        state.one_shots.remove_node = Some(node);
        let _state = self.flush(state);
    }

    // -----------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------

    /// By-id resolution with local-cache short-circuit; round-trips at
    /// most once.
    pub(crate) fn resolve_by_id<'a>(
        &'a self,
        mut state: StateGuard<'a>,
        id: i32,
    ) -> (StateGuard<'a>, Option<NodeRef>) {
        if let Some(found) = state.nodes.find_by_id(id) {
            return (state, Some(found));
        }
        state.one_shots.node_lookup = Some(NodeLookup::ById(id));
        state.one_shots.resolved_node_id = None;
        let mut state = self.flush(state);
        state.one_shots.node_lookup = None;
        let found = state
            .one_shots
            .resolved_node_id
            .take()
            .and_then(|uid| state.nodes.find_by_id(uid));
        (state, found)
    }

    /// Refresh the contact-point cache at most once per simulated time
    /// step.
    fn refresh_contact_points<'a>(
        &'a self,
        mut state: StateGuard<'a>,
        node: NodeRef,
        include_descendants: bool,
    ) -> StateGuard<'a> {
        let now = state.ctx.time;
        let fresh = state
            .nodes
            .get(node)
            .is_some_and(|n| now <= n.contact_points_time_stamp);
        if fresh {
            return state;
        }
        if let Some(handle) = state.nodes.get_mut(node) {
            handle.contact_points_time_stamp = now;
        }
        state.one_shots.contact_points_node = Some(node);
        state.one_shots.contact_points_include_descendants = include_descendants;
        let mut state = self.flush(state);
        state.one_shots.contact_points_node = None;
        state
    }
}

/// Reject NaN and magnitudes beyond the field float range, with a
/// diagnostic naming the offending operation.
pub(crate) fn check_vector(values: &[f64], func: &str) -> bool {
    use crate::registry::value::{check_float, FloatFault};
    for value in values {
        match check_float(*value) {
            Ok(()) => {}
            Err(FloatFault::Nan) => {
                log::error!("[API] {func}() called with a NaN value");
                return false;
            }
            Err(FloatFault::TooLarge) => {
                log::error!("[API] {func}() called with a value greater than the float maximum");
                return false;
            }
            Err(FloatFault::TooSmall) => {
                log::error!("[API] {func}() called with a value smaller than the float minimum");
                return false;
            }
        }
    }
    true
}
