// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Typed field operations: resolution, getters, setters, inserters,
//! removal and node import.
//!
//! Reads look immediate: a GET either coalesces with a pending SET on
//! the same `(field, index)` (no round-trip at all) or flushes
//! synchronously. SETs only enqueue; they ride the next step's frame.

use crate::protocol::{file_extension, NODE_EXTENSION, SCENE_EXTENSION};
use crate::queue::{FieldRequest, RequestKind};
use crate::registry::{FieldKind, FieldRef, FieldType, FieldValue, NodeRef};
use crate::runtime::StepDriver;
use crate::session::{FieldLookup, SupervisorState};

use super::node::check_vector;
use super::{check_node, check_supervisor, StateGuard, Supervisor};

/// What a field check demands of the handle's type.
#[derive(Clone, Copy)]
pub(crate) enum FieldCheck {
    /// Type must match exactly; MF types also run the index math.
    Exact(FieldType),
    /// Any multi-valued field; runs the index math.
    MultiAny,
    /// Any field; no index math.
    Any,
}

// ---------------------------------------------------------------------
// Field resolution
// ---------------------------------------------------------------------

impl<D: StepDriver> Supervisor<D> {
    /// Resolve a field of a node by name. Repeated resolution returns
    /// the identical token without another round-trip.
    #[must_use]
    pub fn node_field(&self, node: NodeRef, name: &str) -> Option<FieldRef> {
        let state = self.lock();
        if !check_supervisor(&state, "node_field") || !check_node(&state, node, "node_field") {
            return None;
        }
        if name.is_empty() {
            log::error!("[API] node_field() called with an empty 'name' argument");
            return None;
        }
        self.node_field_inner(state, node, name, false).1
    }

    /// Resolve a field of a PROTO instance itself (read-only outside
    /// the PROTO scope).
    #[must_use]
    pub fn node_proto_field(&self, node: NodeRef, name: &str) -> Option<FieldRef> {
        let state = self.lock();
        if !check_supervisor(&state, "node_proto_field")
            || !check_node(&state, node, "node_proto_field")
        {
            return None;
        }
        if name.is_empty() {
            log::error!("[API] node_proto_field() called with an empty 'name' argument");
            return None;
        }
        if !state.nodes.get(node).is_some_and(|n| n.is_proto) {
            if !state.ctx.quitting {
                log::error!("[API] node_proto_field(): 'node' is not a PROTO node");
            }
            return None;
        }
        self.node_field_inner(state, node, name, true).1
    }

    fn node_field_inner<'a>(
        &'a self,
        mut state: StateGuard<'a>,
        node: NodeRef,
        name: &str,
        allow_proto: bool,
    ) -> (StateGuard<'a>, Option<FieldRef>) {
        let Some(handle) = state.nodes.get(node) else {
            return (state, None);
        };
        let node_id = handle.id;
        let node_internal = handle.is_proto_internal;
        if let Some(found) = state.fields.find(name, node_id) {
            return (state, Some(found));
        }

        state.one_shots.field_lookup = Some(FieldLookup {
            node_id,
            name: name.to_owned(),
            allow_proto,
        });
        state.one_shots.resolved_field = None;
        let mut state = self.flush(state);
        state.one_shots.field_lookup = None;
        let result = state.one_shots.resolved_field.take();
        if let Some(field) = result {
            // Fields reached through a PROTO scope are read-only.
            if allow_proto || node_internal {
                if let Some(f) = state.fields.get_mut(field) {
                    f.is_proto_internal = true;
                }
            }
        }
        (state, result)
    }

    /// Type tag of the field, `None` for a stale token.
    #[must_use]
    pub fn field_type(&self, field: FieldRef) -> Option<FieldType> {
        let state = self.lock();
        check_field(&state, field, "field_type", FieldCheck::Any, None, false, false)?;
        state.fields.get(field).map(|f| f.field_type)
    }

    /// Canonical type name (`"SFBool"`, ... `"MFNode"`), empty for a
    /// stale token.
    #[must_use]
    pub fn field_type_name(&self, field: FieldRef) -> String {
        let state = self.lock();
        if check_field(&state, field, "field_type_name", FieldCheck::Any, None, false, false)
            .is_none()
        {
            return String::new();
        }
        state.fields.get(field).map_or_else(String::new, |f| f.field_type.name().to_owned())
    }

    /// Element count of an MF field, `-1` on misuse.
    #[must_use]
    pub fn field_count(&self, field: FieldRef) -> i32 {
        let state = self.lock();
        if check_field(&state, field, "field_count", FieldCheck::Any, None, false, false).is_none()
        {
            return -1;
        }
        let Some(handle) = state.fields.get(field) else { return -1 };
        if !handle.field_type.multiple {
            if !state.ctx.quitting {
                log::error!("[API] field_count() can only be used with multi-valued (MF) fields");
            }
            return -1;
        }
        handle.count
    }
}

// ---------------------------------------------------------------------
// Typed getters
// ---------------------------------------------------------------------

impl<D: StepDriver> Supervisor<D> {
    #[must_use]
    pub fn field_get_sf_bool(&self, field: FieldRef) -> bool {
        match self.get_value(field, "field_get_sf_bool", FieldType::sf(FieldKind::Bool), None) {
            Some(FieldValue::Bool(b)) => b,
            _ => false,
        }
    }

    #[must_use]
    pub fn field_get_sf_int32(&self, field: FieldRef) -> i32 {
        match self.get_value(field, "field_get_sf_int32", FieldType::sf(FieldKind::Int32), None) {
            Some(FieldValue::Int32(i)) => i,
            _ => 0,
        }
    }

    #[must_use]
    pub fn field_get_sf_float(&self, field: FieldRef) -> f64 {
        match self.get_value(field, "field_get_sf_float", FieldType::sf(FieldKind::Float), None) {
            Some(FieldValue::Float(f)) => f,
            _ => 0.0,
        }
    }

    #[must_use]
    pub fn field_get_sf_vec2f(&self, field: FieldRef) -> Option<[f64; 2]> {
        match self.get_value(field, "field_get_sf_vec2f", FieldType::sf(FieldKind::Vec2f), None) {
            Some(FieldValue::Vec2f(v)) => Some(v),
            _ => None,
        }
    }

    #[must_use]
    pub fn field_get_sf_vec3f(&self, field: FieldRef) -> Option<[f64; 3]> {
        match self.get_value(field, "field_get_sf_vec3f", FieldType::sf(FieldKind::Vec3f), None) {
            Some(FieldValue::Vec3f(v)) => Some(v),
            _ => None,
        }
    }

    #[must_use]
    pub fn field_get_sf_rotation(&self, field: FieldRef) -> Option<[f64; 4]> {
        match self.get_value(field, "field_get_sf_rotation", FieldType::sf(FieldKind::Rotation), None)
        {
            Some(FieldValue::Rotation(v)) => Some(v),
            _ => None,
        }
    }

    #[must_use]
    pub fn field_get_sf_color(&self, field: FieldRef) -> Option<[f64; 3]> {
        match self.get_value(field, "field_get_sf_color", FieldType::sf(FieldKind::Color), None) {
            Some(FieldValue::Color(v)) => Some(v),
            _ => None,
        }
    }

    #[must_use]
    pub fn field_get_sf_string(&self, field: FieldRef) -> String {
        match self.get_value(field, "field_get_sf_string", FieldType::sf(FieldKind::String), None) {
            Some(FieldValue::String(s)) => s,
            _ => String::new(),
        }
    }

    #[must_use]
    pub fn field_get_sf_node(&self, field: FieldRef) -> Option<NodeRef> {
        let state = self.lock();
        let idx = check_field(
            &state,
            field,
            "field_get_sf_node",
            FieldCheck::Exact(FieldType::sf(FieldKind::Node)),
            None,
            false,
            false,
        )?;
        let state = self.field_operation(state, field, RequestKind::Get, idx, None);
        self.node_from_cached_uid(state, field)
    }

    #[must_use]
    pub fn field_get_mf_bool(&self, field: FieldRef, index: i32) -> bool {
        match self.get_value(
            field,
            "field_get_mf_bool",
            FieldType::mf(FieldKind::Bool),
            Some(index),
        ) {
            Some(FieldValue::Bool(b)) => b,
            _ => false,
        }
    }

    #[must_use]
    pub fn field_get_mf_int32(&self, field: FieldRef, index: i32) -> i32 {
        match self.get_value(
            field,
            "field_get_mf_int32",
            FieldType::mf(FieldKind::Int32),
            Some(index),
        ) {
            Some(FieldValue::Int32(i)) => i,
            _ => 0,
        }
    }

    #[must_use]
    pub fn field_get_mf_float(&self, field: FieldRef, index: i32) -> f64 {
        match self.get_value(
            field,
            "field_get_mf_float",
            FieldType::mf(FieldKind::Float),
            Some(index),
        ) {
            Some(FieldValue::Float(f)) => f,
            _ => 0.0,
        }
    }

    #[must_use]
    pub fn field_get_mf_vec2f(&self, field: FieldRef, index: i32) -> Option<[f64; 2]> {
        match self.get_value(
            field,
            "field_get_mf_vec2f",
            FieldType::mf(FieldKind::Vec2f),
            Some(index),
        ) {
            Some(FieldValue::Vec2f(v)) => Some(v),
            _ => None,
        }
    }

    #[must_use]
    pub fn field_get_mf_vec3f(&self, field: FieldRef, index: i32) -> Option<[f64; 3]> {
        match self.get_value(
            field,
            "field_get_mf_vec3f",
            FieldType::mf(FieldKind::Vec3f),
            Some(index),
        ) {
            Some(FieldValue::Vec3f(v)) => Some(v),
            _ => None,
        }
    }

    #[must_use]
    pub fn field_get_mf_rotation(&self, field: FieldRef, index: i32) -> Option<[f64; 4]> {
        match self.get_value(
            field,
            "field_get_mf_rotation",
            FieldType::mf(FieldKind::Rotation),
            Some(index),
        ) {
            Some(FieldValue::Rotation(v)) => Some(v),
            _ => None,
        }
    }

    #[must_use]
    pub fn field_get_mf_color(&self, field: FieldRef, index: i32) -> Option<[f64; 3]> {
        match self.get_value(
            field,
            "field_get_mf_color",
            FieldType::mf(FieldKind::Color),
            Some(index),
        ) {
            Some(FieldValue::Color(v)) => Some(v),
            _ => None,
        }
    }

    #[must_use]
    pub fn field_get_mf_string(&self, field: FieldRef, index: i32) -> String {
        match self.get_value(
            field,
            "field_get_mf_string",
            FieldType::mf(FieldKind::String),
            Some(index),
        ) {
            Some(FieldValue::String(s)) => s,
            _ => String::new(),
        }
    }

    #[must_use]
    pub fn field_get_mf_node(&self, field: FieldRef, index: i32) -> Option<NodeRef> {
        let state = self.lock();
        let idx = check_field(
            &state,
            field,
            "field_get_mf_node",
            FieldCheck::Exact(FieldType::mf(FieldKind::Node)),
            Some(index),
            false,
            false,
        )?;
        let state = self.field_operation(state, field, RequestKind::Get, idx, None);
        self.node_from_cached_uid(state, field)
    }
}

// ---------------------------------------------------------------------
// Typed setters
// ---------------------------------------------------------------------

impl<D: StepDriver> Supervisor<D> {
    pub fn field_set_sf_bool(&self, field: FieldRef, value: bool) {
        self.set_value(field, "field_set_sf_bool", FieldKind::Bool, None, FieldValue::Bool(value));
    }

    pub fn field_set_sf_int32(&self, field: FieldRef, value: i32) {
        self.set_value(
            field,
            "field_set_sf_int32",
            FieldKind::Int32,
            None,
            FieldValue::Int32(value),
        );
    }

    pub fn field_set_sf_float(&self, field: FieldRef, value: f64) {
        if !check_vector(&[value], "field_set_sf_float") {
            return;
        }
        self.set_value(
            field,
            "field_set_sf_float",
            FieldKind::Float,
            None,
            FieldValue::Float(value),
        );
    }

    pub fn field_set_sf_vec2f(&self, field: FieldRef, values: [f64; 2]) {
        if !check_vector(&values, "field_set_sf_vec2f") {
            return;
        }
        self.set_value(
            field,
            "field_set_sf_vec2f",
            FieldKind::Vec2f,
            None,
            FieldValue::Vec2f(values),
        );
    }

    pub fn field_set_sf_vec3f(&self, field: FieldRef, values: [f64; 3]) {
        if !check_vector(&values, "field_set_sf_vec3f") {
            return;
        }
        self.set_value(
            field,
            "field_set_sf_vec3f",
            FieldKind::Vec3f,
            None,
            FieldValue::Vec3f(values),
        );
    }

    pub fn field_set_sf_rotation(&self, field: FieldRef, values: [f64; 4]) {
        if !check_rotation(&values, "field_set_sf_rotation") {
            return;
        }
        self.set_value(
            field,
            "field_set_sf_rotation",
            FieldKind::Rotation,
            None,
            FieldValue::Rotation(values),
        );
    }

    pub fn field_set_sf_color(&self, field: FieldRef, values: [f64; 3]) {
        if !check_color(&values, "field_set_sf_color") {
            return;
        }
        self.set_value(
            field,
            "field_set_sf_color",
            FieldKind::Color,
            None,
            FieldValue::Color(values),
        );
    }

    pub fn field_set_sf_string(&self, field: FieldRef, value: &str) {
        self.set_value(
            field,
            "field_set_sf_string",
            FieldKind::String,
            None,
            FieldValue::String(value.to_owned()),
        );
    }

    pub fn field_set_mf_bool(&self, field: FieldRef, index: i32, value: bool) {
        self.set_value(
            field,
            "field_set_mf_bool",
            FieldKind::Bool,
            Some(index),
            FieldValue::Bool(value),
        );
    }

    pub fn field_set_mf_int32(&self, field: FieldRef, index: i32, value: i32) {
        self.set_value(
            field,
            "field_set_mf_int32",
            FieldKind::Int32,
            Some(index),
            FieldValue::Int32(value),
        );
    }

    pub fn field_set_mf_float(&self, field: FieldRef, index: i32, value: f64) {
        if !check_vector(&[value], "field_set_mf_float") {
            return;
        }
        self.set_value(
            field,
            "field_set_mf_float",
            FieldKind::Float,
            Some(index),
            FieldValue::Float(value),
        );
    }

    pub fn field_set_mf_vec2f(&self, field: FieldRef, index: i32, values: [f64; 2]) {
        if !check_vector(&values, "field_set_mf_vec2f") {
            return;
        }
        self.set_value(
            field,
            "field_set_mf_vec2f",
            FieldKind::Vec2f,
            Some(index),
            FieldValue::Vec2f(values),
        );
    }

    pub fn field_set_mf_vec3f(&self, field: FieldRef, index: i32, values: [f64; 3]) {
        if !check_vector(&values, "field_set_mf_vec3f") {
            return;
        }
        self.set_value(
            field,
            "field_set_mf_vec3f",
            FieldKind::Vec3f,
            Some(index),
            FieldValue::Vec3f(values),
        );
    }

    pub fn field_set_mf_rotation(&self, field: FieldRef, index: i32, values: [f64; 4]) {
        if !check_rotation(&values, "field_set_mf_rotation") {
            return;
        }
        self.set_value(
            field,
            "field_set_mf_rotation",
            FieldKind::Rotation,
            Some(index),
            FieldValue::Rotation(values),
        );
    }

    pub fn field_set_mf_color(&self, field: FieldRef, index: i32, values: [f64; 3]) {
        if !check_color(&values, "field_set_mf_color") {
            return;
        }
        self.set_value(
            field,
            "field_set_mf_color",
            FieldKind::Color,
            Some(index),
            FieldValue::Color(values),
        );
    }

    pub fn field_set_mf_string(&self, field: FieldRef, index: i32, value: &str) {
        self.set_value(
            field,
            "field_set_mf_string",
            FieldKind::String,
            Some(index),
            FieldValue::String(value.to_owned()),
        );
    }
}

// ---------------------------------------------------------------------
// Typed inserters
// ---------------------------------------------------------------------

impl<D: StepDriver> Supervisor<D> {
    pub fn field_insert_mf_bool(&self, field: FieldRef, index: i32, value: bool) {
        self.insert_value(field, "field_insert_mf_bool", FieldKind::Bool, index, FieldValue::Bool(value));
    }

    pub fn field_insert_mf_int32(&self, field: FieldRef, index: i32, value: i32) {
        self.insert_value(
            field,
            "field_insert_mf_int32",
            FieldKind::Int32,
            index,
            FieldValue::Int32(value),
        );
    }

    pub fn field_insert_mf_float(&self, field: FieldRef, index: i32, value: f64) {
        if !check_vector(&[value], "field_insert_mf_float") {
            return;
        }
        self.insert_value(
            field,
            "field_insert_mf_float",
            FieldKind::Float,
            index,
            FieldValue::Float(value),
        );
    }

    pub fn field_insert_mf_vec2f(&self, field: FieldRef, index: i32, values: [f64; 2]) {
        if !check_vector(&values, "field_insert_mf_vec2f") {
            return;
        }
        self.insert_value(
            field,
            "field_insert_mf_vec2f",
            FieldKind::Vec2f,
            index,
            FieldValue::Vec2f(values),
        );
    }

    pub fn field_insert_mf_vec3f(&self, field: FieldRef, index: i32, values: [f64; 3]) {
        if !check_vector(&values, "field_insert_mf_vec3f") {
            return;
        }
        self.insert_value(
            field,
            "field_insert_mf_vec3f",
            FieldKind::Vec3f,
            index,
            FieldValue::Vec3f(values),
        );
    }

    pub fn field_insert_mf_rotation(&self, field: FieldRef, index: i32, values: [f64; 4]) {
        if !check_rotation(&values, "field_insert_mf_rotation") {
            return;
        }
        self.insert_value(
            field,
            "field_insert_mf_rotation",
            FieldKind::Rotation,
            index,
            FieldValue::Rotation(values),
        );
    }

    pub fn field_insert_mf_color(&self, field: FieldRef, index: i32, values: [f64; 3]) {
        if !check_color(&values, "field_insert_mf_color") {
            return;
        }
        self.insert_value(
            field,
            "field_insert_mf_color",
            FieldKind::Color,
            index,
            FieldValue::Color(values),
        );
    }

    pub fn field_insert_mf_string(&self, field: FieldRef, index: i32, value: &str) {
        self.insert_value(
            field,
            "field_insert_mf_string",
            FieldKind::String,
            index,
            FieldValue::String(value.to_owned()),
        );
    }
}

// ---------------------------------------------------------------------
// Removal and node import
// ---------------------------------------------------------------------

impl<D: StepDriver> Supervisor<D> {
    /// Remove one element of an MF field. For MF_NODE fields the count
    /// update arrives with the server's removal notification.
    pub fn field_remove_mf(&self, field: FieldRef, index: i32) {
        let state = self.lock();
        if check_field(&state, field, "field_remove_mf", FieldCheck::Any, None, false, true)
            .is_none()
        {
            return;
        }
        let Some(handle) = state.fields.get(field) else { return };
        if handle.count == 0 {
            log::error!("[API] field_remove_mf() called for an empty field");
            return;
        }
        let is_node = handle.field_type == FieldType::mf(FieldKind::Node);
        let Some(idx) = check_field(
            &state,
            field,
            "field_remove_mf",
            FieldCheck::MultiAny,
            Some(index),
            false,
            true,
        ) else {
            return;
        };
        let mut state = self.field_operation(state, field, RequestKind::Remove, idx, None);
        if !is_node {
            if let Some(f) = state.fields.get_mut(field) {
                f.count -= 1;
            }
        }
    }

    /// Clear a non-empty SF_NODE field.
    pub fn field_remove_sf(&self, field: FieldRef) {
        let state = self.lock();
        let check = check_field(
            &state,
            field,
            "field_remove_sf",
            FieldCheck::Exact(FieldType::sf(FieldKind::Node)),
            None,
            false,
            true,
        );
        if check.is_none() {
            return;
        }
        if matches!(state.fields.get(field).map(|f| &f.value), Some(FieldValue::Node(0))) {
            log::error!("[API] field_remove_sf() called for an empty field");
            return;
        }
        let mut state = self.field_operation(state, field, RequestKind::Remove, -1, None);
        if let Some(f) = state.fields.get_mut(field) {
            f.count = 0;
            f.value = FieldValue::Node(0);
        }
    }

    /// Import a node description file into an MF_NODE field. `.wbo`
    /// files may land anywhere; `.wrl` files only at the tail of the
    /// root's `children` field.
    pub fn field_import_mf_node(&self, field: FieldRef, position: i32, filename: &str) {
        let state = self.lock();
        if check_field(&state, field, "field_import_mf_node", FieldCheck::Any, None, false, true)
            .is_none()
        {
            return;
        }
        if filename.is_empty() {
            log::error!("[API] field_import_mf_node() called with an empty 'filename' argument");
            return;
        }
        let Some(ext) = file_extension(filename) else {
            log::error!("[API] field_import_mf_node() called with a 'filename' without extension");
            return;
        };
        let is_wbo = ext == NODE_EXTENSION;
        let is_wrl = ext == SCENE_EXTENSION;
        if !is_wbo && !is_wrl {
            log::error!(
                "[API] field_import_mf_node() supports only '*.{NODE_EXTENSION}' and \
                 '*.{SCENE_EXTENSION}' files"
            );
            return;
        }

        let mut state = state;
        if is_wrl {
            let root = state.root;
            let (returned, root_children) = self.node_field_inner(state, root, "children", false);
            state = returned;
            if root_children != Some(field) {
                log::error!(
                    "[API] field_import_mf_node(): '*.{SCENE_EXTENSION}' import is supported \
                     only on the root's children field"
                );
                return;
            }
        }

        let Some(handle) = state.fields.get(field) else { return };
        if handle.field_type != FieldType::mf(FieldKind::Node) {
            if !state.ctx.quitting {
                log::error!(
                    "[API] field_import_mf_node() called with wrong field type: {}",
                    handle.field_type.name()
                );
            }
            return;
        }
        let count = handle.count;
        let Some(position) = resolve_import_position(position, count, "field_import_mf_node")
        else {
            return;
        };
        if is_wrl && position != count {
            log::error!(
                "[API] field_import_mf_node(): '*.{SCENE_EXTENSION}' import is supported only \
                 at the end of the root's children field"
            );
            return;
        }

        self.run_import(
            state,
            field,
            RequestKind::Import,
            position,
            filename.to_owned(),
        );
    }

    /// Import a textual node description into an MF_NODE field.
    pub fn field_import_mf_node_from_string(
        &self,
        field: FieldRef,
        position: i32,
        node_string: &str,
    ) {
        let state = self.lock();
        if check_field(
            &state,
            field,
            "field_import_mf_node_from_string",
            FieldCheck::Any,
            None,
            false,
            true,
        )
        .is_none()
        {
            return;
        }
        let Some(handle) = state.fields.get(field) else { return };
        if handle.field_type != FieldType::mf(FieldKind::Node) {
            if !state.ctx.quitting {
                log::error!(
                    "[API] field_import_mf_node_from_string() called with wrong field type: {}",
                    handle.field_type.name()
                );
            }
            return;
        }
        if node_string.is_empty() {
            log::error!(
                "[API] field_import_mf_node_from_string() called with an empty 'node_string' \
                 argument"
            );
            return;
        }
        let count = handle.count;
        let Some(position) =
            resolve_import_position(position, count, "field_import_mf_node_from_string")
        else {
            return;
        };

        self.run_import(
            state,
            field,
            RequestKind::ImportFromString,
            position,
            node_string.to_owned(),
        );
    }

    /// Import a `.wbo` node description file into an empty SF_NODE
    /// field.
    pub fn field_import_sf_node(&self, field: FieldRef, filename: &str) {
        let state = self.lock();
        if check_field(&state, field, "field_import_sf_node", FieldCheck::Any, None, false, true)
            .is_none()
        {
            return;
        }
        if filename.is_empty() {
            log::error!("[API] field_import_sf_node() called with an empty 'filename' argument");
            return;
        }
        let Some(ext) = file_extension(filename) else {
            log::error!("[API] field_import_sf_node() called with a 'filename' without extension");
            return;
        };
        if ext != NODE_EXTENSION {
            log::error!("[API] field_import_sf_node() supports only '*.{NODE_EXTENSION}' files");
            return;
        }
        if !self.check_empty_sf_node(&state, field, "field_import_sf_node") {
            return;
        }
        self.run_sf_import(state, field, RequestKind::Import, filename.to_owned());
    }

    /// Import a textual node description into an empty SF_NODE field.
    pub fn field_import_sf_node_from_string(&self, field: FieldRef, node_string: &str) {
        let state = self.lock();
        if check_field(
            &state,
            field,
            "field_import_sf_node_from_string",
            FieldCheck::Any,
            None,
            false,
            true,
        )
        .is_none()
        {
            return;
        }
        if node_string.is_empty() {
            log::error!(
                "[API] field_import_sf_node_from_string() called with an empty 'node_string' \
                 argument"
            );
            return;
        }
        if !self.check_empty_sf_node(&state, field, "field_import_sf_node_from_string") {
            return;
        }
        self.run_sf_import(state, field, RequestKind::ImportFromString, node_string.to_owned());
    }
}

// ---------------------------------------------------------------------
// Internals
// ---------------------------------------------------------------------

impl<D: StepDriver> Supervisor<D> {
    /// Record a field operation, applying the coalescing protocol.
    ///
    /// A GET that finds a pending SET on the same target copies the
    /// written value into the cache and completes without any network
    /// traffic; a SET folds into the pending SET. Everything else is
    /// appended FIFO, and anything but a plain SET flushes.
    pub(crate) fn field_operation<'a>(
        &'a self,
        mut state: StateGuard<'a>,
        field: FieldRef,
        kind: RequestKind,
        index: i32,
        value: Option<FieldValue>,
    ) -> StateGuard<'a> {
        match kind {
            RequestKind::Get => {
                let coalesced = state.queue.find_pending_set(field, index).map(|r| r.value.clone());
                if let Some(pending_value) = coalesced {
                    if let (Some(handle), Some(v)) = (state.fields.get_mut(field), pending_value) {
                        handle.value = v;
                    }
                    return state;
                }
            }
            RequestKind::Set => {
                if let Some(pending) = state.queue.find_pending_set(field, index) {
                    pending.value = value;
                    return state;
                }
            }
            _ => {}
        }

        debug_assert!(
            kind != RequestKind::Get || !state.queue.get_in_flight(),
            "GET issued while another GET is in flight"
        );
        state.queue.push(FieldRequest { kind, index, value, field });
        if kind != RequestKind::Set {
            // Only setters may be postponed; everything else round-trips.
            state = self.flush(state);
        }
        state
    }

    fn get_value(
        &self,
        field: FieldRef,
        func: &str,
        field_type: FieldType,
        index: Option<i32>,
    ) -> Option<FieldValue> {
        let state = self.lock();
        let idx = check_field(
            &state,
            field,
            func,
            FieldCheck::Exact(field_type),
            index,
            false,
            false,
        )?;
        let state = self.field_operation(state, field, RequestKind::Get, idx, None);
        state.fields.get(field).map(|f| f.value.clone())
    }

    fn set_value(
        &self,
        field: FieldRef,
        func: &str,
        kind: FieldKind,
        index: Option<i32>,
        value: FieldValue,
    ) {
        let field_type = FieldType { kind, multiple: index.is_some() };
        let state = self.lock();
        let Some(idx) =
            check_field(&state, field, func, FieldCheck::Exact(field_type), index, false, true)
        else {
            return;
        };
        let _state = self.field_operation(state, field, RequestKind::Set, idx, Some(value));
    }

    fn insert_value(
        &self,
        field: FieldRef,
        func: &str,
        kind: FieldKind,
        index: i32,
        value: FieldValue,
    ) {
        let state = self.lock();
        let Some(idx) = check_field(
            &state,
            field,
            func,
            FieldCheck::Exact(FieldType::mf(kind)),
            Some(index),
            true,
            true,
        ) else {
            return;
        };
        let mut state = self.field_operation(state, field, RequestKind::Import, idx, Some(value));
        if let Some(handle) = state.fields.get_mut(field) {
            handle.count += 1;
        }
    }

    /// Queue an MF node import and fold the server-reported insertion
    /// count back into the field.
    fn run_import(
        &self,
        mut state: StateGuard<'_>,
        field: FieldRef,
        kind: RequestKind,
        position: i32,
        payload: String,
    ) {
        state.queue.push(FieldRequest {
            kind,
            index: position,
            value: Some(FieldValue::String(payload)),
            field,
        });
        state.results.imported_nodes_number = -1;
        let mut state = self.flush(state);
        let imported = state.results.imported_nodes_number;
        if imported > 0 {
            if let Some(handle) = state.fields.get_mut(field) {
                handle.count += imported;
            }
        }
    }

    /// Queue an SF node import; the reply payload is the uid of the
    /// created node.
    fn run_sf_import(
        &self,
        mut state: StateGuard<'_>,
        field: FieldRef,
        kind: RequestKind,
        payload: String,
    ) {
        state.queue.push(FieldRequest {
            kind,
            index: -1,
            value: Some(FieldValue::String(payload)),
            field,
        });
        state.results.imported_nodes_number = -1;
        let mut state = self.flush(state);
        let imported = state.results.imported_nodes_number;
        if imported >= 0 {
            if let Some(handle) = state.fields.get_mut(field) {
                handle.value = FieldValue::Node(imported);
            }
        }
    }

    fn check_empty_sf_node(
        &self,
        state: &SupervisorState,
        field: FieldRef,
        func: &str,
    ) -> bool {
        let Some(handle) = state.fields.get(field) else { return false };
        if handle.field_type != FieldType::sf(FieldKind::Node) {
            if !state.ctx.quitting {
                log::error!(
                    "[API] {func}() called with wrong field type: {}",
                    handle.field_type.name()
                );
            }
            return false;
        }
        if !matches!(handle.value, FieldValue::Node(0)) {
            log::error!("[API] {func}() called with a non-empty field");
            return false;
        }
        true
    }

    /// Resolve the node uid cached by the last GET into a handle,
    /// propagating the PROTO-internal marker of the field.
    fn node_from_cached_uid(
        &self,
        mut state: StateGuard<'_>,
        field: FieldRef,
    ) -> Option<NodeRef> {
        let (uid, internal) = {
            let handle = state.fields.get(field)?;
            match handle.value {
                FieldValue::Node(uid) => (uid, handle.is_proto_internal),
                _ => return None,
            }
        };
        if uid <= 0 {
            return None;
        }
        let node = state.nodes.find_by_id(uid)?;
        if internal {
            if let Some(h) = state.nodes.get_mut(node) {
                h.is_proto_internal = true;
            }
        }
        Some(node)
    }
}

/// Argument checks shared by every typed accessor. Returns the resolved
/// element index (`-1` for SF operations) or `None` after logging a
/// diagnostic.
pub(crate) fn check_field(
    state: &SupervisorState,
    field: FieldRef,
    func: &str,
    expect: FieldCheck,
    index: Option<i32>,
    importing: bool,
    reject_internal: bool,
) -> Option<i32> {
    if !check_supervisor(state, func) {
        return None;
    }
    let Some(handle) = state.fields.get(field) else {
        if !state.ctx.quitting {
            log::error!("[API] {func}() called with a stale or invalid 'field' argument");
        }
        return None;
    };

    if reject_internal && handle.is_proto_internal {
        log::error!("[API] {func}() called on a read-only PROTO-internal field");
        return None;
    }

    let run_index_math = match expect {
        FieldCheck::Exact(expected) => {
            if handle.field_type != expected {
                if !state.ctx.quitting {
                    log::error!(
                        "[API] {func}() called with wrong field type: {}",
                        handle.field_type.name()
                    );
                }
                return None;
            }
            expected.multiple
        }
        FieldCheck::MultiAny => true,
        FieldCheck::Any => false,
    };

    if !run_index_math {
        return Some(index.unwrap_or(-1));
    }

    let Some(index) = index else {
        debug_assert!(false, "MF check without an index");
        return None;
    };
    // SF fields carry count -1, which makes every index out of bounds
    // here; that is the intended rejection for MultiAny misuse.
    let count = handle.count;
    let offset = if importing { 0 } else { -1 };
    if index < -(count + 1 + offset) || index > count + offset {
        log::error!(
            "[API] {func}() called with an out-of-bound index: {index} (should be between {} \
             and {})",
            -count - 1 - offset,
            count + offset
        );
        return None;
    }
    Some(if index < 0 { index + count + 1 + offset } else { index })
}

/// Insert-position math of the node import entry points (negative
/// positions count back from the tail).
fn resolve_import_position(position: i32, count: i32, func: &str) -> Option<i32> {
    if position < -(count + 1) || position > count {
        log::error!(
            "[API] {func}() called with an out-of-bound position: {position} (should be \
             between {} and {count})",
            -(count + 1)
        );
        return None;
    }
    Some(if position < 0 { count + position + 1 } else { position })
}

/// Rotation argument check: finite components and a non-zero axis.
fn check_rotation(values: &[f64; 4], func: &str) -> bool {
    if !check_vector(values, func) {
        return false;
    }
    if !crate::registry::value::valid_rotation(values) {
        log::error!("[API] {func}() called with an all-zero [x y z] rotation axis");
        return false;
    }
    true
}

/// Colour argument check: every component inside the [0,1] gamut.
fn check_color(values: &[f64; 3], func: &str) -> bool {
    if !crate::registry::value::valid_color(values) {
        log::error!("[API] {func}() called with RGB values outside the [0,1] range");
        return false;
    }
    true
}
