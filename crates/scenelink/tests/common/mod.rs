// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! In-process simulator stub for integration tests.
//!
//! Parses every outbound frame opcode by opcode, mutates a tiny scene
//! model, and synthesizes protocol-correct replies. Tests inspect the
//! stub afterwards to count round-trips and assert what actually went
//! over the wire.

#![allow(dead_code)] // each test binary uses a different slice of this module

use std::io;
use std::sync::{Arc, Mutex};

use scenelink::protocol::opcode;
use scenelink::{Cursor, FieldKind, FieldType, FieldValue, FrameBuf, StepDriver};

#[derive(Clone)]
pub struct SceneNode {
    pub id: i32,
    pub type_code: u32,
    pub tag: i32,
    pub parent: i32,
    pub is_proto: bool,
    pub internal: bool,
    pub model: String,
    pub def: String,
    pub position: [f64; 3],
    pub velocity: [f64; 6],
    pub balance: bool,
    pub contacts: Vec<([f64; 3], i32)>,
}

impl SceneNode {
    pub fn new(id: i32, type_code: u32, def: &str) -> Self {
        Self {
            id,
            type_code,
            tag: -1,
            parent: 0,
            is_proto: false,
            internal: false,
            model: String::new(),
            def: def.to_owned(),
            position: [0.0; 3],
            velocity: [0.0; 6],
            balance: false,
            contacts: Vec::new(),
        }
    }
}

pub enum Storage {
    Sf(FieldValue),
    Mf(Vec<FieldValue>),
}

pub struct SceneField {
    pub node_id: i32,
    pub field_id: i32,
    pub name: String,
    pub field_type: FieldType,
    pub internal: bool,
    pub storage: Storage,
}

/// Server-side half of the tests: scene model plus a wire log.
pub struct SimStub {
    pub nodes: Vec<SceneNode>,
    pub fields: Vec<SceneField>,
    pub selected: i32,
    pub exchanges: usize,
    /// Every opcode seen outbound, in order.
    pub seen: Vec<u8>,
    /// Every SET observed: (node, field, index, value).
    pub sets: Vec<(i32, i32, i32, FieldValue)>,
    /// Ids of nodes created by imports.
    pub created: Vec<i32>,
    /// Raw opcodes appended to the next reply (e.g. NODE_REGENERATED).
    pub push_extra: Vec<u8>,
    configured: bool,
    next_node_id: i32,
    next_field_id: i32,
}

impl SimStub {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            fields: Vec::new(),
            selected: 0,
            exchanges: 0,
            seen: Vec::new(),
            sets: Vec::new(),
            created: Vec::new(),
            push_extra: Vec::new(),
            configured: false,
            next_node_id: 1000,
            next_field_id: 100,
        }
    }

    pub fn add_node(&mut self, node: SceneNode) -> &mut Self {
        self.nodes.push(node);
        self
    }

    pub fn add_field(
        &mut self,
        node_id: i32,
        name: &str,
        field_type: FieldType,
        storage: Storage,
    ) -> &mut Self {
        let field_id = self.next_field_id;
        self.next_field_id += 1;
        self.fields.push(SceneField {
            node_id,
            field_id,
            name: name.to_owned(),
            field_type,
            internal: false,
            storage,
        });
        self
    }

    /// Wrap into a driver handle that tests can keep a clone of.
    pub fn share(self) -> (SharedSim, Arc<Mutex<SimStub>>) {
        let inner = Arc::new(Mutex::new(self));
        (SharedSim(inner.clone()), inner)
    }

    fn node(&self, id: i32) -> Option<&SceneNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    fn field_index(&self, node_id: i32, field_id: i32) -> Option<usize> {
        self.fields
            .iter()
            .position(|f| f.node_id == node_id && f.field_id == field_id)
    }

    fn count_of(field: &SceneField) -> i32 {
        match &field.storage {
            Storage::Sf(_) => -1,
            Storage::Mf(values) => values.len() as i32,
        }
    }

    fn handle_frame(&mut self, frame: &[u8], reply: &mut FrameBuf) {
        let mut cur = Cursor::new(frame);
        while !cur.is_empty() {
            let op = cur.read_u8().unwrap();
            self.seen.push(op);
            self.handle_op(op, &mut cur, reply);
        }
    }

    #[allow(clippy::too_many_lines)]
    fn handle_op(&mut self, op: u8, cur: &mut Cursor<'_>, reply: &mut FrameBuf) {
        match op {
            opcode::SIMULATION_CHANGE_MODE | opcode::SIMULATION_QUIT => {
                cur.read_i32().unwrap();
            }
            opcode::SIMULATION_RESET
            | opcode::RELOAD_WORLD
            | opcode::SIMULATION_RESET_PHYSICS
            | opcode::STOP_MOVIE
            | opcode::VR_HEADSET_IS_USED
            | opcode::VR_HEADSET_GET_POSITION
            | opcode::VR_HEADSET_GET_ORIENTATION => {}
            opcode::LOAD_WORLD => {
                cur.read_string().unwrap();
            }

            opcode::NODE_GET_FROM_ID => {
                let id = cur.read_u32().unwrap() as i32;
                self.reply_full_node(reply, opcode::NODE_GET_FROM_ID, id);
            }
            opcode::NODE_GET_FROM_DEF => {
                let expression = cur.read_string().unwrap();
                let _proto_scope = cur.read_i32().unwrap();
                let def = expression.rsplit('.').next().unwrap_or("").to_owned();
                let found = self.nodes.iter().find(|n| n.def == def).cloned();
                reply.write_u8(opcode::NODE_GET_FROM_DEF);
                match found {
                    Some(n) => {
                        reply.write_u32(n.id as u32);
                        reply.write_u32(n.type_code);
                        reply.write_i32(n.tag);
                        reply.write_u32(n.parent as u32);
                        reply.write_bool(n.is_proto);
                        reply.write_string(&n.model);
                    }
                    None => {
                        reply.write_u32(0);
                        reply.write_u32(0);
                        reply.write_i32(-1);
                        reply.write_u32(0);
                        reply.write_bool(false);
                        reply.write_string("");
                    }
                }
            }
            opcode::NODE_GET_FROM_TAG => {
                let tag = cur.read_i32().unwrap();
                let id = self.nodes.iter().find(|n| n.tag == tag).map_or(0, |n| n.id);
                self.reply_full_node(reply, opcode::NODE_GET_FROM_TAG, id);
            }
            opcode::NODE_GET_SELECTED => {
                let id = self.selected;
                self.reply_full_node(reply, opcode::NODE_GET_SELECTED, id);
            }

            opcode::FIELD_GET_FROM_NAME => {
                let node_id = cur.read_u32().unwrap() as i32;
                let name = cur.read_string().unwrap();
                let _allow_proto = cur.read_bool().unwrap();
                reply.write_u8(opcode::FIELD_GET_FROM_NAME);
                match self.fields.iter().find(|f| f.node_id == node_id && f.name == name) {
                    Some(f) => {
                        reply.write_i32(f.field_id);
                        reply.write_u32(f.field_type.code());
                        reply.write_bool(f.internal);
                        if f.field_type.multiple {
                            reply.write_i32(Self::count_of(f));
                        }
                    }
                    None => {
                        reply.write_i32(-1);
                        reply.write_u32(0);
                        reply.write_bool(false);
                    }
                }
            }

            opcode::FIELD_GET_VALUE => {
                let node_id = cur.read_u32().unwrap() as i32;
                let field_id = cur.read_u32().unwrap() as i32;
                let _internal = cur.read_bool().unwrap();
                let Some(index) = self.field_index(node_id, field_id) else {
                    reply.write_u8(opcode::FIELD_GET_VALUE);
                    reply.write_i32(0);
                    return;
                };
                let element = if self.fields[index].field_type.multiple {
                    cur.read_u32().unwrap() as usize
                } else {
                    0
                };
                let (type_code, value) = {
                    let f = &self.fields[index];
                    let value = match &f.storage {
                        Storage::Sf(v) => v.clone(),
                        Storage::Mf(values) => values[element].clone(),
                    };
                    (f.field_type.code() as i32, value)
                };
                reply.write_u8(opcode::FIELD_GET_VALUE);
                reply.write_i32(type_code);
                self.write_value(reply, &value);
            }

            opcode::FIELD_SET_VALUE => {
                let node_id = cur.read_u32().unwrap() as i32;
                let field_id = cur.read_u32().unwrap() as i32;
                let type_code = cur.read_u32().unwrap();
                let element = cur.read_u32().unwrap() as i32;
                let ty = FieldType::from_code(type_code).unwrap();
                let value = read_payload(cur, ty.kind);
                self.sets.push((node_id, field_id, element, value.clone()));
                if let Some(i) = self.field_index(node_id, field_id) {
                    match &mut self.fields[i].storage {
                        Storage::Sf(v) => *v = value,
                        Storage::Mf(values) => values[element as usize] = value,
                    }
                }
            }

            opcode::FIELD_INSERT_VALUE => {
                let node_id = cur.read_u32().unwrap() as i32;
                let field_id = cur.read_u32().unwrap() as i32;
                let element = cur.read_u32().unwrap() as i32;
                let Some(i) = self.field_index(node_id, field_id) else { return };
                let ty = self.fields[i].field_type;
                match (ty.multiple, ty.kind) {
                    (true, FieldKind::Node) => {
                        // Import: payload is a filename, one node created.
                        cur.read_string().unwrap();
                        let uid = self.create_node(node_id);
                        if let Storage::Mf(values) = &mut self.fields[i].storage {
                            values.insert(element as usize, FieldValue::Node(uid));
                        }
                        reply.write_u8(opcode::FIELD_INSERT_VALUE);
                        reply.write_i32(1);
                    }
                    (false, FieldKind::Node) => {
                        cur.read_string().unwrap();
                        let uid = self.create_node(node_id);
                        self.fields[i].storage = Storage::Sf(FieldValue::Node(uid));
                        reply.write_u8(opcode::FIELD_INSERT_VALUE);
                        reply.write_i32(uid);
                    }
                    _ => {
                        let value = read_payload(cur, ty.kind);
                        if let Storage::Mf(values) = &mut self.fields[i].storage {
                            values.insert(element as usize, value);
                        }
                        reply.write_u8(opcode::FIELD_INSERT_VALUE);
                        reply.write_i32(1);
                    }
                }
            }

            opcode::FIELD_IMPORT_NODE_FROM_STRING => {
                let node_id = cur.read_u32().unwrap() as i32;
                let field_id = cur.read_u32().unwrap() as i32;
                let element = cur.read_u32().unwrap() as i32;
                cur.read_string().unwrap();
                let Some(i) = self.field_index(node_id, field_id) else { return };
                let uid = self.create_node(node_id);
                reply.write_u8(opcode::FIELD_INSERT_VALUE);
                match &mut self.fields[i].storage {
                    Storage::Mf(values) => {
                        values.insert(element as usize, FieldValue::Node(uid));
                        reply.write_i32(1);
                    }
                    Storage::Sf(v) => {
                        *v = FieldValue::Node(uid);
                        reply.write_i32(uid);
                    }
                }
            }

            opcode::FIELD_REMOVE_VALUE => {
                let node_id = cur.read_u32().unwrap() as i32;
                let field_id = cur.read_u32().unwrap() as i32;
                let element = cur.read_u32().unwrap() as i32;
                let Some(i) = self.field_index(node_id, field_id) else { return };
                let ty = self.fields[i].field_type;
                if ty.kind == FieldKind::Node {
                    let (removed, new_count) = match &mut self.fields[i].storage {
                        Storage::Mf(values) => {
                            let removed = match values.remove(element as usize) {
                                FieldValue::Node(uid) => uid,
                                _ => 0,
                            };
                            (removed, values.len() as i32)
                        }
                        Storage::Sf(v) => {
                            let removed = match v {
                                FieldValue::Node(uid) => *uid,
                                _ => 0,
                            };
                            *v = FieldValue::Node(0);
                            (removed, 0)
                        }
                    };
                    let name = self.fields[i].name.clone();
                    self.nodes.retain(|n| n.id != removed);
                    reply.write_u8(opcode::NODE_REMOVE_NODE);
                    reply.write_u32(removed as u32);
                    reply.write_i32(node_id);
                    reply.write_string(&name);
                    reply.write_i32(new_count);
                } else if let Storage::Mf(values) = &mut self.fields[i].storage {
                    values.remove(element as usize);
                }
            }

            opcode::SET_LABEL => {
                cur.read_u16().unwrap();
                cur.read_f64().unwrap();
                cur.read_f64().unwrap();
                cur.read_f64().unwrap();
                cur.read_u32().unwrap();
                cur.read_string().unwrap();
                cur.read_string().unwrap();
            }

            opcode::NODE_REMOVE_NODE => {
                let uid = cur.read_u32().unwrap() as i32;
                self.nodes.retain(|n| n.id != uid);
                reply.write_u8(opcode::NODE_REMOVE_NODE);
                reply.write_u32(uid as u32);
                reply.write_i32(-1);
                reply.write_string("");
                reply.write_i32(0);
            }

            opcode::NODE_GET_POSITION => {
                let id = cur.read_u32().unwrap() as i32;
                let position = self.node(id).map_or([0.0; 3], |n| n.position);
                reply.write_u8(opcode::NODE_GET_POSITION);
                position.iter().for_each(|c| reply.write_f64(*c));
            }
            opcode::NODE_GET_ORIENTATION => {
                cur.read_u32().unwrap();
                reply.write_u8(opcode::NODE_GET_ORIENTATION);
                (0..9).for_each(|i| reply.write_f64(f64::from(i)));
            }
            opcode::NODE_GET_CENTER_OF_MASS => {
                cur.read_u32().unwrap();
                reply.write_u8(opcode::NODE_GET_CENTER_OF_MASS);
                (0..3).for_each(|_| reply.write_f64(0.5));
            }
            opcode::NODE_GET_CONTACT_POINTS => {
                let id = cur.read_u32().unwrap() as i32;
                let _descendants = cur.read_bool().unwrap();
                let contacts = self.node(id).map_or_else(Vec::new, |n| n.contacts.clone());
                reply.write_u8(opcode::NODE_GET_CONTACT_POINTS);
                reply.write_i32(contacts.len() as i32);
                for (point, owner) in contacts {
                    point.iter().for_each(|c| reply.write_f64(*c));
                    reply.write_i32(owner);
                }
            }
            opcode::NODE_GET_STATIC_BALANCE => {
                let id = cur.read_u32().unwrap() as i32;
                let balance = self.node(id).is_some_and(|n| n.balance);
                reply.write_u8(opcode::NODE_GET_STATIC_BALANCE);
                reply.write_bool(balance);
            }
            opcode::NODE_GET_VELOCITY => {
                let id = cur.read_u32().unwrap() as i32;
                let velocity = self.node(id).map_or([0.0; 6], |n| n.velocity);
                reply.write_u8(opcode::NODE_GET_VELOCITY);
                velocity.iter().for_each(|c| reply.write_f64(*c));
            }
            opcode::NODE_SET_VELOCITY => {
                let id = cur.read_u32().unwrap() as i32;
                let mut velocity = [0.0; 6];
                for slot in &mut velocity {
                    *slot = cur.read_f64().unwrap();
                }
                if let Some(n) = self.nodes.iter_mut().find(|n| n.id == id) {
                    n.velocity = velocity;
                }
            }
            opcode::NODE_RESET_PHYSICS
            | opcode::NODE_RESTART_CONTROLLER
            | opcode::NODE_MOVE_VIEWPOINT => {
                cur.read_u32().unwrap();
            }
            opcode::NODE_SET_VISIBILITY => {
                cur.read_u32().unwrap();
                cur.read_u32().unwrap();
                cur.read_bool().unwrap();
            }
            opcode::NODE_ADD_FORCE | opcode::NODE_ADD_TORQUE => {
                cur.read_u32().unwrap();
                (0..3).for_each(|_| {
                    cur.read_f64().unwrap();
                });
                cur.read_bool().unwrap();
            }
            opcode::NODE_ADD_FORCE_WITH_OFFSET => {
                cur.read_u32().unwrap();
                (0..6).for_each(|_| {
                    cur.read_f64().unwrap();
                });
                cur.read_bool().unwrap();
            }

            opcode::EXPORT_IMAGE => {
                cur.read_u8().unwrap();
                cur.read_string().unwrap();
            }
            opcode::START_MOVIE => {
                cur.read_i32().unwrap();
                cur.read_i32().unwrap();
                cur.read_u8().unwrap();
                cur.read_u8().unwrap();
                cur.read_u8().unwrap();
                cur.read_bool().unwrap();
                cur.read_string().unwrap();
                reply.write_u8(opcode::MOVIE_STATUS);
                reply.write_u8(1); // recording
            }
            opcode::START_ANIMATION => {
                cur.read_string().unwrap();
                reply.write_u8(opcode::ANIMATION_START_STATUS);
                reply.write_bool(true);
            }
            opcode::STOP_ANIMATION => {
                reply.write_u8(opcode::ANIMATION_STOP_STATUS);
                reply.write_bool(true);
            }
            opcode::SAVE_WORLD => {
                if cur.read_bool().unwrap() {
                    cur.read_string().unwrap();
                }
                reply.write_u8(opcode::SAVE_WORLD);
                reply.write_bool(true);
            }

            other => panic!("stub saw unexpected outbound opcode {other:#04x}"),
        }
    }

    fn create_node(&mut self, parent: i32) -> i32 {
        let uid = self.next_node_id;
        self.next_node_id += 1;
        let mut node = SceneNode::new(uid, 3, "");
        node.parent = parent;
        self.nodes.push(node);
        self.created.push(uid);
        uid
    }

    fn reply_full_node(&self, reply: &mut FrameBuf, op: u8, id: i32) {
        reply.write_u8(op);
        match self.node(id) {
            Some(n) => {
                reply.write_u32(n.id as u32);
                reply.write_u32(n.type_code);
                reply.write_i32(n.tag);
                reply.write_u32(n.parent as u32);
                reply.write_bool(n.is_proto);
                reply.write_bool(n.internal);
                reply.write_string(&n.model);
                reply.write_string(&n.def);
            }
            None => {
                reply.write_u32(0);
                reply.write_u32(0);
                reply.write_i32(-1);
                reply.write_u32(0);
                reply.write_bool(false);
                reply.write_bool(false);
                reply.write_string("");
                reply.write_string("");
            }
        }
    }

    fn write_value(&self, reply: &mut FrameBuf, value: &FieldValue) {
        match value {
            FieldValue::Bool(b) => reply.write_bool(*b),
            FieldValue::Int32(i) => reply.write_i32(*i),
            FieldValue::Float(f) => reply.write_f64(*f),
            FieldValue::Vec2f(v) => v.iter().for_each(|c| reply.write_f64(*c)),
            FieldValue::Vec3f(v) | FieldValue::Color(v) => {
                v.iter().for_each(|c| reply.write_f64(*c));
            }
            FieldValue::Rotation(v) => v.iter().for_each(|c| reply.write_f64(*c)),
            FieldValue::String(s) => reply.write_string(s),
            FieldValue::Node(uid) => {
                reply.write_u32(*uid as u32);
                if *uid != 0 {
                    match self.node(*uid) {
                        Some(n) => {
                            reply.write_u32(n.type_code);
                            reply.write_i32(n.tag);
                            reply.write_u32(n.parent as u32);
                            reply.write_bool(n.is_proto);
                            reply.write_string(&n.model);
                            reply.write_string(&n.def);
                        }
                        None => {
                            reply.write_u32(0);
                            reply.write_i32(-1);
                            reply.write_u32(0);
                            reply.write_bool(false);
                            reply.write_string("");
                            reply.write_string("");
                        }
                    }
                }
            }
        }
    }
}

fn read_payload(cur: &mut Cursor<'_>, kind: FieldKind) -> FieldValue {
    fn vec<const N: usize>(cur: &mut Cursor<'_>) -> [f64; N] {
        let mut out = [0.0; N];
        for slot in &mut out {
            *slot = cur.read_f64().unwrap();
        }
        out
    }
    match kind {
        FieldKind::Bool => FieldValue::Bool(cur.read_bool().unwrap()),
        FieldKind::Int32 => FieldValue::Int32(cur.read_i32().unwrap()),
        FieldKind::Float => FieldValue::Float(cur.read_f64().unwrap()),
        FieldKind::Vec2f => FieldValue::Vec2f(vec::<2>(cur)),
        FieldKind::Vec3f => FieldValue::Vec3f(vec::<3>(cur)),
        FieldKind::Rotation => FieldValue::Rotation(vec::<4>(cur)),
        FieldKind::Color => FieldValue::Color(vec::<3>(cur)),
        FieldKind::String => FieldValue::String(cur.read_string().unwrap()),
        FieldKind::Node => FieldValue::Node(cur.read_u32().unwrap() as i32),
    }
}

/// Cloneable driver handle over the shared stub.
pub struct SharedSim(pub Arc<Mutex<SimStub>>);

impl StepDriver for SharedSim {
    fn exchange(&mut self, frame: &[u8]) -> io::Result<Vec<u8>> {
        let mut stub = self.0.lock().unwrap();
        stub.exchanges += 1;
        let mut reply = FrameBuf::new();
        if !stub.configured {
            stub.configured = true;
            reply.write_u8(opcode::CONFIGURE);
            reply.write_u32(1); // self uid
            reply.write_bool(false);
            reply.write_bool(false);
            reply.write_string("my_robot");
            reply.write_string("SELF");
        }
        stub.handle_frame(frame, &mut reply);
        let extra: Vec<u8> = stub.push_extra.drain(..).collect();
        for op in extra {
            reply.write_u8(op);
        }
        Ok(reply.into_bytes())
    }
}
