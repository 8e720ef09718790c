// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Inbound reply dispatch.
//!
//! The reply stream is a sequence of opcode-tagged chunks; each handler
//! decodes its full payload before touching any registry so the cursor
//! stays consistent even when a target slot has gone stale.

use crate::protocol::{opcode, Cursor, WireError, WireResult};
use crate::registry::{ContactPoint, FieldType, FieldValue, NodeRef, NodeType};
use crate::runtime::StepDriver;
use crate::session::{MovieStatus, NodeLookup, SupervisorState};

/// Decoded node description as it appears in resolution replies.
struct NodeInfo {
    uid: i32,
    node_type: NodeType,
    tag: i32,
    parent_uid: i32,
    is_proto: bool,
}

fn read_node_info(cur: &mut Cursor<'_>) -> WireResult<NodeInfo> {
    Ok(NodeInfo {
        uid: cur.read_u32()? as i32,
        node_type: NodeType::from_code(cur.read_u32()?),
        tag: cur.read_i32()?,
        parent_uid: cur.read_u32()? as i32,
        is_proto: cur.read_bool()?,
    })
}

/// Dispatch one reply frame into the session state.
///
/// Spent requests from the previous frame write are dropped first: once
/// the simulator has answered, the writer is guaranteed done with the
/// buffers backing that frame.
pub fn read_frame(
    state: &mut SupervisorState,
    driver: &mut dyn StepDriver,
    bytes: &[u8],
) -> WireResult<()> {
    state.queue.drain_spent();

    let mut cur = Cursor::new(bytes);
    while !cur.is_empty() {
        let op = cur.read_u8()?;
        dispatch(state, driver, op, &mut cur)?;
    }
    Ok(())
}

#[allow(clippy::too_many_lines)] // one arm per protocol opcode
fn dispatch(
    state: &mut SupervisorState,
    driver: &mut dyn StepDriver,
    op: u8,
    cur: &mut Cursor<'_>,
) -> WireResult<()> {
    match op {
        opcode::CONFIGURE => {
            let self_uid = cur.read_u32()? as i32;
            let is_proto = cur.read_bool()?;
            let is_proto_internal = cur.read_bool()?;
            let model_name = cur.read_string()?;
            let def_name = cur.read_string()?;
            let node = state.nodes.add(
                self_uid,
                NodeType::Robot,
                Some(&model_name),
                Some(&def_name),
                0,
                -1,
                is_proto,
            );
            if let Some(handle) = state.nodes.get_mut(node) {
                handle.is_proto_internal = is_proto_internal;
            }
            state.self_node = Some(node);
            log::debug!("[FRAME] configured: self node uid={self_uid}");
        }

        opcode::NODE_GET_FROM_DEF => {
            let info = read_node_info(cur)?;
            let model_name = cur.read_string()?;
            // The DEF comes from the armed lookup, not from the wire.
            let def = match &state.one_shots.node_lookup {
                Some(NodeLookup::ByDef { def, .. }) => Some(def.clone()),
                _ => None,
            };
            if info.uid != 0 {
                insert_resolved(state, &info, &model_name, def.as_deref(), false);
            }
        }

        opcode::NODE_GET_SELECTED | opcode::NODE_GET_FROM_ID | opcode::NODE_GET_FROM_TAG => {
            let info = read_node_info(cur)?;
            let is_proto_internal = cur.read_bool()?;
            let model_name = cur.read_string()?;
            let def_name = cur.read_string()?;
            let admit = !is_proto_internal || state.one_shots.allow_internal_contact_node;
            if info.uid != 0 && admit {
                insert_resolved(state, &info, &model_name, Some(&def_name), is_proto_internal);
            }
        }

        opcode::FIELD_GET_FROM_NAME => {
            let field_id = cur.read_i32()?;
            let type_code = cur.read_u32()?;
            let is_proto_internal = cur.read_bool()?;
            let count = if type_code & crate::registry::value::MF_BIT != 0 {
                cur.read_i32()?
            } else {
                -1
            };
            if field_id == -1 {
                // Not found: clearing the lookup slot is the signal.
                state.one_shots.field_lookup = None;
                state.one_shots.resolved_field = None;
            } else {
                let Some(lookup) = state.one_shots.field_lookup.clone() else {
                    return Err(WireError::Protocol(
                        "field resolution reply without an armed lookup".into(),
                    ));
                };
                let Some(field_type) = FieldType::from_code(type_code) else {
                    return Err(WireError::Protocol(format!(
                        "unknown field type code {type_code:#x}"
                    )));
                };
                let field = state.fields.add(
                    &lookup.name,
                    field_type,
                    count,
                    lookup.node_id,
                    field_id,
                    is_proto_internal,
                );
                state.one_shots.resolved_field = Some(field);
            }
        }

        opcode::FIELD_GET_VALUE => {
            let type_code = cur.read_i32()?;
            let Some(sent) = state.queue.take_sent_get() else {
                return Err(WireError::Protocol(
                    "field value reply without an outstanding GET".into(),
                ));
            };
            // A zero type means the target node was deleted server-side;
            // the cache keeps its previous value.
            if type_code != 0 {
                read_field_value(state, sent.field, cur)?;
            }
        }

        opcode::NODE_REGENERATED => {
            log::debug!("[FRAME] scene regenerated; purging PROTO-internal handles");
            state.nodes.remove_proto_internal();
            state.fields.remove_proto_internal();
        }

        opcode::FIELD_INSERT_VALUE => {
            state.results.imported_nodes_number = cur.read_i32()?;
        }

        opcode::NODE_REMOVE_NODE => {
            let removed_uid = cur.read_u32()? as i32;
            let parent_uid = cur.read_i32()?;
            let field_name = cur.read_string()?;
            let parent_count = cur.read_i32()?;
            state.nodes.remove_by_id(removed_uid);
            if parent_uid >= 0 {
                if let Some(field) = state.fields.find(&field_name, parent_uid) {
                    if let Some(handle) = state.fields.get_mut(field) {
                        handle.count = parent_count;
                    }
                }
            }
        }

        opcode::NODE_GET_POSITION => {
            let v = read_vec::<3>(cur)?;
            let slot = state.one_shots.position_node;
            store(state, slot, op, |n| n.position = Some(v));
        }
        opcode::NODE_GET_ORIENTATION => {
            let v = read_vec::<9>(cur)?;
            let slot = state.one_shots.orientation_node;
            store(state, slot, op, |n| n.orientation = Some(v));
        }
        opcode::NODE_GET_CENTER_OF_MASS => {
            let v = read_vec::<3>(cur)?;
            let slot = state.one_shots.center_of_mass_node;
            store(state, slot, op, |n| n.center_of_mass = Some(v));
        }
        opcode::NODE_GET_CONTACT_POINTS => {
            let n = cur.read_i32()?;
            let mut points = Vec::new();
            for _ in 0..n.max(0) {
                let point = read_vec::<3>(cur)?;
                let node_id = cur.read_i32()?;
                points.push(ContactPoint { point, node_id });
            }
            let slot = state.one_shots.contact_points_node;
            store(state, slot, op, |node| {
                node.number_of_contact_points = n;
                node.contact_points = points;
            });
        }
        opcode::NODE_GET_STATIC_BALANCE => {
            let balance = cur.read_bool()?;
            let slot = state.one_shots.static_balance_node;
            store(state, slot, op, |n| n.static_balance = balance);
        }
        opcode::NODE_GET_VELOCITY => {
            let v = read_vec::<6>(cur)?;
            let slot = state.one_shots.velocity_get_node;
            store(state, slot, op, |n| n.solid_velocity = Some(v));
        }

        opcode::ANIMATION_START_STATUS => {
            state.results.animation_start_status = cur.read_bool()?;
        }
        opcode::ANIMATION_STOP_STATUS => {
            state.results.animation_stop_status = cur.read_bool()?;
        }
        opcode::MOVIE_STATUS => {
            state.results.movie_status = MovieStatus::from_code(cur.read_u8()?);
        }
        opcode::SAVE_WORLD => {
            state.results.save_status = cur.read_bool()?;
        }

        opcode::VR_HEADSET_IS_USED => {
            state.results.vr_is_used = cur.read_bool()?;
        }
        opcode::VR_HEADSET_GET_POSITION => {
            state.results.vr_position = Some(read_vec::<3>(cur)?);
        }
        opcode::VR_HEADSET_GET_ORIENTATION => {
            state.results.vr_orientation = Some(read_vec::<9>(cur)?);
        }

        other => driver.read_extension(other, cur)?,
    }
    Ok(())
}

/// Insert a node handle from a resolution reply and publish its uid in
/// the ambient resolution slot.
fn insert_resolved(
    state: &mut SupervisorState,
    info: &NodeInfo,
    model_name: &str,
    def_name: Option<&str>,
    is_proto_internal: bool,
) {
    let node = state.nodes.add(
        info.uid,
        info.node_type,
        Some(model_name),
        def_name,
        info.tag,
        info.parent_uid,
        info.is_proto,
    );
    if is_proto_internal {
        if let Some(handle) = state.nodes.get_mut(node) {
            handle.is_proto_internal = true;
        }
    }
    state.one_shots.resolved_node_id = Some(info.uid);
}

/// Decode a GET reply into the field's cache, per the field's own type.
fn read_field_value(
    state: &mut SupervisorState,
    field: crate::registry::FieldRef,
    cur: &mut Cursor<'_>,
) -> WireResult<()> {
    use crate::registry::FieldKind;

    let Some(kind) = state.fields.get(field).map(|f| f.field_type.kind) else {
        return Err(WireError::Protocol(
            "field value reply targets a purged handle".into(),
        ));
    };

    let value = match kind {
        FieldKind::Bool => FieldValue::Bool(cur.read_bool()?),
        FieldKind::Int32 => FieldValue::Int32(cur.read_i32()?),
        FieldKind::Float => FieldValue::Float(cur.read_f64()?),
        FieldKind::Vec2f => FieldValue::Vec2f(read_vec::<2>(cur)?),
        FieldKind::Vec3f => FieldValue::Vec3f(read_vec::<3>(cur)?),
        FieldKind::Rotation => FieldValue::Rotation(read_vec::<4>(cur)?),
        FieldKind::Color => FieldValue::Color(read_vec::<3>(cur)?),
        FieldKind::String => FieldValue::String(cur.read_string()?),
        FieldKind::Node => {
            let uid = cur.read_u32()? as i32; // 0 => null node
            if uid != 0 {
                // The reply inlines the referenced node's description.
                let node_type = NodeType::from_code(cur.read_u32()?);
                let tag = cur.read_i32()?;
                let parent_uid = cur.read_u32()? as i32;
                let is_proto = cur.read_bool()?;
                let model_name = cur.read_string()?;
                let def_name = cur.read_string()?;
                state.nodes.add(
                    uid,
                    node_type,
                    Some(&model_name),
                    Some(&def_name),
                    tag,
                    parent_uid,
                    is_proto,
                );
            }
            FieldValue::Node(uid)
        }
    };

    if let Some(handle) = state.fields.get_mut(field) {
        handle.value = value;
    }
    Ok(())
}

fn read_vec<const N: usize>(cur: &mut Cursor<'_>) -> WireResult<[f64; N]> {
    let mut out = [0.0; N];
    for slot in &mut out {
        *slot = cur.read_f64()?;
    }
    Ok(out)
}

/// Apply a decoded payload to the node a one-shot slot points at.
fn store(
    state: &mut SupervisorState,
    slot: Option<NodeRef>,
    op: u8,
    apply: impl FnOnce(&mut crate::registry::NodeHandle),
) {
    match slot.and_then(|node| state.nodes.get_mut(node)) {
        Some(handle) => apply(handle),
        None => log::warn!("[FRAME] reply {op:#04x} without an armed one-shot slot"),
    }
}
