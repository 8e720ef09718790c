// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # scenelink - Supervisor Client Core
//!
//! Client-side half of the scenelink scene-graph introspection and
//! mutation protocol. A controller process granted the *supervisor*
//! role uses this crate to observe and modify a live 3D scene graph
//! running inside a separate simulator process: resolve nodes by id,
//! DEF name, device tag or selection; read transforms, velocities,
//! contact points and static balance; read and write typed fields;
//! insert and remove nodes; and drive global session actions (world
//! load/save, physics reset, movie and animation capture).
//!
//! The API *looks* synchronous, but the transport is step-driven: pure
//! writes batch into the next step's outbound frame, reads either
//! coalesce with a pending write or round-trip immediately, and every
//! reply lands in a client-side handle cache.
//!
//! ## Quick Start
//!
//! ```no_run
//! use scenelink::{RobotContext, StepDriver, Supervisor};
//! use std::io;
//!
//! struct PipeDriver;
//!
//! impl StepDriver for PipeDriver {
//!     fn exchange(&mut self, _frame: &[u8]) -> io::Result<Vec<u8>> {
//!         // hand the frame to the simulator, block for its reply stream
//!         Ok(Vec::new())
//!     }
//! }
//!
//! let supervisor = Supervisor::new(PipeDriver, RobotContext::supervisor());
//! if let Some(robot) = supervisor.node_from_def("MY_ROBOT") {
//!     if let Some(translation) = supervisor.node_field(robot, "translation") {
//!         supervisor.field_set_sf_vec3f(translation, [0.0, 0.5, 0.0]);
//!     }
//! }
//! supervisor.step(0.032);
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +--------------------------------------------------------------+
//! |                       Public API layer                       |
//! |  role/argument checks | step lock | sentinel error returns   |
//! +--------------------------------------------------------------+
//! |   Handle registries   |  Request queue  |  One-shot slots    |
//! |   nodes + fields      |  SET batching,  |  session actions,  |
//! |   generational refs   |  GET coalescing |  labels, VR, movie |
//! +--------------------------------------------------------------+
//! |          Frame writer (fixed order)  |  Frame reader         |
//! +--------------------------------------------------------------+
//! |              StepDriver (transport, out of scope)            |
//! +--------------------------------------------------------------+
//! ```
//!
//! ## Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Supervisor`] | Entry point; owns all session state behind the step lock |
//! | [`StepDriver`] | Transport seam: one outbound frame in, one reply stream out |
//! | [`NodeRef`] / [`FieldRef`] | Opaque generational handles, stale-proof by construction |
//! | [`FieldValue`] | Tagged value over the nine field kinds (SF and MF) |
//! | [`RobotContext`] | Role, quitting flag, simulated time, simulation mode |

/// Public supervisor API (start here).
pub mod api;
/// Frame assembly (fixed-order writer) and reply dispatch (reader).
pub mod frame;
/// Wire constants and framing primitives.
pub mod protocol;
/// Pending field-request queue and the single-GET mailbox.
pub mod queue;
/// Node and field handle registries and the typed value model.
pub mod registry;
/// Seams to the surrounding robot runtime.
pub mod runtime;
/// One-shot slots, session actions, labels, aggregate session state.
pub mod session;

pub use api::Supervisor;
pub use protocol::{Cursor, FrameBuf, WireError, WireResult};
pub use registry::{
    ContactPoint, FieldKind, FieldRef, FieldType, FieldValue, NodeRef, NodeType,
};
pub use runtime::{RobotContext, SimulationMode, StepDriver};
pub use session::{Label, MovieStatus};
