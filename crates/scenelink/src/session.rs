// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Session state: one-shot request slots, global session actions,
//! on-screen labels, and the aggregate [`SupervisorState`].
//!
//! Everything that was process-global in classic supervisor clients is
//! collected here and owned by the API layer behind the step lock; one
//! instance exists per controller process.

use crate::queue::RequestQueue;
use crate::registry::{FieldRef, FieldRegistry, NodeRef, NodeRegistry, NodeType};
use crate::runtime::RobotContext;

/// On-screen overlay text, keyed by id. Setting an existing id replaces
/// the text and font in place.
#[derive(Debug, Clone)]
pub struct Label {
    pub id: u16,
    pub text: String,
    pub font: String,
    /// Horizontal position in [0,1].
    pub x: f64,
    /// Vertical position in [0,1].
    pub y: f64,
    /// Height in [0,1].
    pub size: f64,
    /// 0xAARRGGBB, alpha in the top byte.
    pub color: u32,
}

/// Movie capture pipeline status as reported by the simulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MovieStatus {
    #[default]
    Ready,
    Recording,
    Saving,
    SimulationError,
    FileError,
    EncodingError,
}

impl MovieStatus {
    #[must_use]
    pub fn from_code(code: u8) -> Self {
        match code {
            0 => Self::Ready,
            1 => Self::Recording,
            2 => Self::Saving,
            3 => Self::SimulationError,
            4 => Self::FileError,
            _ => Self::EncodingError,
        }
    }

    /// Anything beyond `Saving` is a failure state.
    #[must_use]
    pub fn is_failure(self) -> bool {
        matches!(self, Self::SimulationError | Self::FileError | Self::EncodingError)
    }
}

/// Parameters of a pending movie capture start.
#[derive(Debug, Clone)]
pub struct MovieStart {
    pub filename: String,
    pub width: i32,
    pub height: i32,
    pub codec: u8,
    pub quality: u8,
    pub acceleration: u8,
    pub caption: bool,
}

/// Armed node- or field-resolution request (at most one per frame).
#[derive(Debug, Clone)]
pub enum NodeLookup {
    ById(i32),
    ByDef {
        def: String,
        /// Server id of the enclosing PROTO instance, `-1` for the
        /// world scope.
        proto_id: i32,
    },
    ByTag(i32),
    Selected,
}

#[derive(Debug, Clone)]
pub struct FieldLookup {
    pub node_id: i32,
    pub name: String,
    pub allow_proto: bool,
}

/// Slots for non-queued round-trips. A slot is armed by the API layer,
/// serialised by the frame writer, answered into the handle caches by
/// the reader, and cleared by the API layer once the flush returns.
#[derive(Default)]
pub struct OneShots {
    pub node_lookup: Option<NodeLookup>,
    pub field_lookup: Option<FieldLookup>,
    /// Server id resolved by the last node lookup reply.
    pub resolved_node_id: Option<i32>,
    /// Handle created by the last field lookup reply.
    pub resolved_field: Option<FieldRef>,
    /// Contact-point node resolution is the only path allowed to admit
    /// PROTO-internal nodes into the registry.
    pub allow_internal_contact_node: bool,

    pub position_node: Option<NodeRef>,
    pub orientation_node: Option<NodeRef>,
    pub center_of_mass_node: Option<NodeRef>,
    pub contact_points_node: Option<NodeRef>,
    pub contact_points_include_descendants: bool,
    pub static_balance_node: Option<NodeRef>,
    pub velocity_get_node: Option<NodeRef>,
    pub velocity_set: Option<(NodeRef, [f64; 6])>,
    pub reset_physics_node: Option<NodeRef>,
    pub restart_controller_node: Option<NodeRef>,
    pub visibility: Option<(NodeRef, NodeRef, bool)>,
    pub move_viewpoint_node: Option<NodeRef>,
    pub add_force: Option<(NodeRef, [f64; 3], bool)>,
    pub add_force_with_offset: Option<(NodeRef, [f64; 3], [f64; 3], bool)>,
    pub add_torque: Option<(NodeRef, [f64; 3], bool)>,
    pub remove_node: Option<NodeRef>,
}

/// Global session actions, each consumed by the next frame write.
#[derive(Default)]
pub struct SessionActions {
    pub quit: Option<i32>,
    pub reset: bool,
    pub reset_physics: bool,
    pub reload: bool,
    pub load_world: Option<String>,
    pub change_mode: bool,

    pub export_image: Option<(String, u8)>,
    pub movie_start: Option<MovieStart>,
    pub movie_stop: bool,
    pub animation_start: Option<String>,
    pub animation_stop: bool,
    pub save_request: bool,
    pub save_filename: Option<String>,

    pub vr_is_used_request: bool,
    pub vr_position_request: bool,
    pub vr_orientation_request: bool,
}

/// Results written by reply dispatch and read back by the API layer.
pub struct SessionResults {
    /// Node count delta reported by the last import, `-1` while pending.
    pub imported_nodes_number: i32,
    pub movie_status: MovieStatus,
    pub animation_start_status: bool,
    pub animation_stop_status: bool,
    pub save_status: bool,
    pub vr_is_used: bool,
    pub vr_position: Option<[f64; 3]>,
    pub vr_orientation: Option<[f64; 9]>,
}

impl Default for SessionResults {
    fn default() -> Self {
        Self {
            imported_nodes_number: -1,
            movie_status: MovieStatus::default(),
            animation_start_status: true,
            animation_stop_status: true,
            save_status: true,
            vr_is_used: false,
            vr_position: None,
            vr_orientation: None,
        }
    }
}

/// The complete client-side state of one supervisor session.
pub struct SupervisorState {
    pub nodes: NodeRegistry,
    pub fields: FieldRegistry,
    pub queue: RequestQueue,
    pub one_shots: OneShots,
    pub actions: SessionActions,
    pub results: SessionResults,
    pub labels: Vec<Label>,
    pub ctx: RobotContext,
    /// The synthetic scene root (server id 0); lives forever.
    pub root: NodeRef,
    /// The controller's own robot node, announced by `CONFIGURE`.
    pub self_node: Option<NodeRef>,
}

impl SupervisorState {
    #[must_use]
    pub fn new(ctx: RobotContext) -> Self {
        let mut nodes = NodeRegistry::default();
        let root = nodes.add(0, NodeType::Group, None, None, -1, -1, false);
        Self {
            nodes,
            fields: FieldRegistry::default(),
            queue: RequestQueue::default(),
            one_shots: OneShots::default(),
            actions: SessionActions::default(),
            results: SessionResults::default(),
            labels: Vec::new(),
            ctx,
            root,
            self_node: None,
        }
    }

    /// Insert or replace the label with the given id.
    pub fn upsert_label(&mut self, label: Label) {
        match self.labels.iter_mut().find(|l| l.id == label.id) {
            Some(existing) => *existing = label,
            None => self.labels.push(label),
        }
    }
}
