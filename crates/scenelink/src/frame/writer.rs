// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Outbound frame serialisation.
//!
//! Called once per flush with exclusive access to the session state.
//! Opcodes are emitted in a fixed priority order mirrored by the
//! simulator's reply dispatch; reordering would misattribute one-shot
//! results. Session action flags are consumed here; one-shot node slots
//! and resolution slots are consumed by the API layer once the paired
//! reply has been dispatched.

use crate::protocol::{opcode, FrameBuf};
use crate::queue::RequestKind;
use crate::registry::FieldValue;
use crate::session::{NodeLookup, SupervisorState};

/// Serialise every pending request into one outbound frame.
pub fn write_frame(state: &mut SupervisorState) -> Vec<u8> {
    let mut buf = FrameBuf::new();

    write_session_chain(state, &mut buf);

    if state.one_shots.node_lookup.is_some() || state.one_shots.field_lookup.is_some() {
        write_lookup(state, &mut buf);
    } else {
        write_field_requests(state, &mut buf);
    }

    write_labels(state, &mut buf);

    if let Some(node) = state.one_shots.remove_node.take() {
        if let Some(handle) = state.nodes.get(node) {
            buf.write_u8(opcode::NODE_REMOVE_NODE);
            buf.write_u32(handle.id as u32);
        }
    }

    write_one_shots(state, &mut buf);
    write_session_actions(state, &mut buf);

    log::debug!("[FRAME] outbound frame: {} bytes", buf.len());
    buf.into_bytes()
}

/// Mutually exclusive global actions; at most one rides a frame.
fn write_session_chain(state: &mut SupervisorState, buf: &mut FrameBuf) {
    let actions = &mut state.actions;
    if actions.change_mode {
        buf.write_u8(opcode::SIMULATION_CHANGE_MODE);
        buf.write_i32(state.ctx.mode.code());
        actions.change_mode = false;
    } else if let Some(status) = actions.quit.take() {
        buf.write_u8(opcode::SIMULATION_QUIT);
        buf.write_i32(status);
    } else if actions.reset {
        buf.write_u8(opcode::SIMULATION_RESET);
        actions.reset = false;
    } else if actions.reload {
        buf.write_u8(opcode::RELOAD_WORLD);
        actions.reload = false;
    } else if actions.reset_physics {
        buf.write_u8(opcode::SIMULATION_RESET_PHYSICS);
        actions.reset_physics = false;
    } else if let Some(world) = actions.load_world.take() {
        buf.write_u8(opcode::LOAD_WORLD);
        buf.write_string(&world);
    }
}

/// The armed resolution request. The slot itself stays armed: the API
/// layer clears it after inspecting the resolution result.
fn write_lookup(state: &SupervisorState, buf: &mut FrameBuf) {
    if let Some(lookup) = &state.one_shots.node_lookup {
        match lookup {
            NodeLookup::ById(id) => {
                buf.write_u8(opcode::NODE_GET_FROM_ID);
                buf.write_u32(*id as u32);
            }
            NodeLookup::ByDef { def, proto_id } => {
                buf.write_u8(opcode::NODE_GET_FROM_DEF);
                buf.write_string(def);
                buf.write_i32(*proto_id);
            }
            NodeLookup::ByTag(tag) => {
                buf.write_u8(opcode::NODE_GET_FROM_TAG);
                buf.write_i32(*tag);
            }
            NodeLookup::Selected => buf.write_u8(opcode::NODE_GET_SELECTED),
        }
    } else if let Some(lookup) = &state.one_shots.field_lookup {
        buf.write_u8(opcode::FIELD_GET_FROM_NAME);
        buf.write_u32(lookup.node_id as u32);
        buf.write_string(&lookup.name);
        buf.write_bool(lookup.allow_proto);
    }
}

/// The whole queued request list, in API call order. Non-GET requests
/// retire to the spent list; the lone GET parks in the mailbox until
/// its reply arrives.
fn write_field_requests(state: &mut SupervisorState, buf: &mut FrameBuf) {
    for request in state.queue.take_pending() {
        let Some(field) = state.fields.get(request.field) else {
            // The handle died (scene regeneration) after the request
            // was queued; nothing sensible can be emitted.
            log::warn!("[FRAME] dropping request against a purged field handle");
            continue;
        };
        let (node_id, field_id) = (field.node_id as u32, field.field_id as u32);

        match request.kind {
            RequestKind::Get => {
                buf.write_u8(opcode::FIELD_GET_VALUE);
                buf.write_u32(node_id);
                buf.write_u32(field_id);
                buf.write_bool(field.is_proto_internal);
                if request.index != -1 {
                    buf.write_u32(request.index as u32); // MF fields only
                }
            }
            RequestKind::Set => {
                buf.write_u8(opcode::FIELD_SET_VALUE);
                buf.write_u32(node_id);
                buf.write_u32(field_id);
                buf.write_u32(field.field_type.code());
                buf.write_u32(request.index as u32);
                write_value(buf, request.value.as_ref());
            }
            RequestKind::Import => {
                buf.write_u8(opcode::FIELD_INSERT_VALUE);
                buf.write_u32(node_id);
                buf.write_u32(field_id);
                buf.write_u32(request.index as u32);
                write_value(buf, request.value.as_ref());
            }
            RequestKind::ImportFromString => {
                buf.write_u8(opcode::FIELD_IMPORT_NODE_FROM_STRING);
                buf.write_u32(node_id);
                buf.write_u32(field_id);
                buf.write_u32(request.index as u32);
                write_value(buf, request.value.as_ref());
            }
            RequestKind::Remove => {
                buf.write_u8(opcode::FIELD_REMOVE_VALUE);
                buf.write_u32(node_id);
                buf.write_u32(field_id);
                buf.write_u32(request.index as u32);
            }
        }

        if request.kind == RequestKind::Get {
            state.queue.stash_get(request);
        } else {
            state.queue.retire(request);
        }
    }
}

fn write_value(buf: &mut FrameBuf, value: Option<&FieldValue>) {
    let Some(value) = value else {
        debug_assert!(false, "SET/IMPORT request without payload");
        return;
    };
    match value {
        FieldValue::Bool(b) => buf.write_bool(*b),
        FieldValue::Int32(i) => buf.write_i32(*i),
        FieldValue::Float(f) => buf.write_f64(*f),
        FieldValue::Vec2f(v) => v.iter().for_each(|c| buf.write_f64(*c)),
        FieldValue::Vec3f(v) | FieldValue::Color(v) => v.iter().for_each(|c| buf.write_f64(*c)),
        FieldValue::Rotation(v) => v.iter().for_each(|c| buf.write_f64(*c)),
        // Node imports travel as text (filename or node description).
        FieldValue::String(s) => buf.write_string(s),
        FieldValue::Node(uid) => buf.write_u32(*uid as u32),
    }
}

fn write_labels(state: &mut SupervisorState, buf: &mut FrameBuf) {
    for label in state.labels.drain(..) {
        buf.write_u8(opcode::SET_LABEL);
        buf.write_u16(label.id);
        buf.write_f64(label.x);
        buf.write_f64(label.y);
        buf.write_f64(label.size);
        buf.write_u32(label.color);
        buf.write_string(&label.text);
        buf.write_string(&label.font);
    }
}

fn write_one_shots(state: &SupervisorState, buf: &mut FrameBuf) {
    // Reborrowed locally so the node-id helper can stay a closure.
    let nodes = &state.nodes;
    let shots = &state.one_shots;
    let id_of = |node: &crate::registry::NodeRef| nodes.get(*node).map(|n| n.id as u32);

    if let Some(id) = shots.position_node.as_ref().and_then(&id_of) {
        buf.write_u8(opcode::NODE_GET_POSITION);
        buf.write_u32(id);
    }
    if let Some(id) = shots.orientation_node.as_ref().and_then(&id_of) {
        buf.write_u8(opcode::NODE_GET_ORIENTATION);
        buf.write_u32(id);
    }
    if let Some(id) = shots.center_of_mass_node.as_ref().and_then(&id_of) {
        buf.write_u8(opcode::NODE_GET_CENTER_OF_MASS);
        buf.write_u32(id);
    }
    if let Some(id) = shots.contact_points_node.as_ref().and_then(&id_of) {
        buf.write_u8(opcode::NODE_GET_CONTACT_POINTS);
        buf.write_u32(id);
        buf.write_bool(shots.contact_points_include_descendants);
    }
    if let Some(id) = shots.static_balance_node.as_ref().and_then(&id_of) {
        buf.write_u8(opcode::NODE_GET_STATIC_BALANCE);
        buf.write_u32(id);
    }
    if let Some(id) = shots.velocity_get_node.as_ref().and_then(&id_of) {
        buf.write_u8(opcode::NODE_GET_VELOCITY);
        buf.write_u32(id);
    }
    if let Some((node, velocity)) = &shots.velocity_set {
        if let Some(id) = id_of(node) {
            buf.write_u8(opcode::NODE_SET_VELOCITY);
            buf.write_u32(id);
            velocity.iter().for_each(|c| buf.write_f64(*c));
        }
    }
    if let Some(id) = shots.reset_physics_node.as_ref().and_then(&id_of) {
        buf.write_u8(opcode::NODE_RESET_PHYSICS);
        buf.write_u32(id);
    }
    if let Some(id) = shots.restart_controller_node.as_ref().and_then(&id_of) {
        buf.write_u8(opcode::NODE_RESTART_CONTROLLER);
        buf.write_u32(id);
    }
    if let Some((node, viewer, visible)) = &shots.visibility {
        if let (Some(id), Some(viewer_id)) = (id_of(node), id_of(viewer)) {
            buf.write_u8(opcode::NODE_SET_VISIBILITY);
            buf.write_u32(id);
            buf.write_u32(viewer_id);
            buf.write_bool(*visible);
        }
    }
    if let Some(id) = shots.move_viewpoint_node.as_ref().and_then(&id_of) {
        buf.write_u8(opcode::NODE_MOVE_VIEWPOINT);
        buf.write_u32(id);
    }
    if let Some((node, force, relative)) = &shots.add_force {
        if let Some(id) = id_of(node) {
            buf.write_u8(opcode::NODE_ADD_FORCE);
            buf.write_u32(id);
            force.iter().for_each(|c| buf.write_f64(*c));
            buf.write_bool(*relative);
        }
    }
    if let Some((node, force, offset, relative)) = &shots.add_force_with_offset {
        if let Some(id) = id_of(node) {
            buf.write_u8(opcode::NODE_ADD_FORCE_WITH_OFFSET);
            buf.write_u32(id);
            force.iter().for_each(|c| buf.write_f64(*c));
            offset.iter().for_each(|c| buf.write_f64(*c));
            buf.write_bool(*relative);
        }
    }
    if let Some((node, torque, relative)) = &shots.add_torque {
        if let Some(id) = id_of(node) {
            buf.write_u8(opcode::NODE_ADD_TORQUE);
            buf.write_u32(id);
            torque.iter().for_each(|c| buf.write_f64(*c));
            buf.write_bool(*relative);
        }
    }
}

fn write_session_actions(state: &mut SupervisorState, buf: &mut FrameBuf) {
    let actions = &mut state.actions;
    if let Some((filename, quality)) = actions.export_image.take() {
        buf.write_u8(opcode::EXPORT_IMAGE);
        buf.write_u8(quality);
        buf.write_string(&filename);
    }
    if let Some(movie) = actions.movie_start.take() {
        buf.write_u8(opcode::START_MOVIE);
        buf.write_i32(movie.width);
        buf.write_i32(movie.height);
        buf.write_u8(movie.codec);
        buf.write_u8(movie.quality);
        buf.write_u8(movie.acceleration);
        buf.write_bool(movie.caption);
        buf.write_string(&movie.filename);
    }
    if actions.movie_stop {
        buf.write_u8(opcode::STOP_MOVIE);
        actions.movie_stop = false;
    }
    if let Some(filename) = actions.animation_start.take() {
        buf.write_u8(opcode::START_ANIMATION);
        buf.write_string(&filename);
    }
    if actions.animation_stop {
        buf.write_u8(opcode::STOP_ANIMATION);
        actions.animation_stop = false;
    }
    if actions.save_request {
        buf.write_u8(opcode::SAVE_WORLD);
        match actions.save_filename.take() {
            Some(filename) => {
                buf.write_bool(true);
                buf.write_string(&filename);
            }
            None => buf.write_bool(false),
        }
        actions.save_request = false;
    }
    if actions.vr_is_used_request {
        buf.write_u8(opcode::VR_HEADSET_IS_USED);
    }
    if actions.vr_position_request {
        buf.write_u8(opcode::VR_HEADSET_GET_POSITION);
    }
    if actions.vr_orientation_request {
        buf.write_u8(opcode::VR_HEADSET_GET_ORIENTATION);
    }
}
