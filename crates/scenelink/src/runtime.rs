// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Seams to the surrounding robot runtime.
//!
//! The core never touches a socket: it hands the assembled frame to a
//! [`StepDriver`] and dispatches whatever reply stream comes back. The
//! driver is also the extension point for opcodes this crate does not
//! know (the base robot protocol shares the reply stream).

use std::io;

use crate::protocol::{Cursor, WireResult};

/// Transport seam used by the flush primitive.
///
/// `exchange` transmits one outbound frame, blocks until the simulator
/// has produced the paired reply stream, and returns it. The step lock
/// is *not* held across this call.
pub trait StepDriver {
    fn exchange(&mut self, frame: &[u8]) -> io::Result<Vec<u8>>;

    /// Hook for inbound opcodes outside the supervisor family.
    ///
    /// The default discards the remainder of the frame, since an unknown
    /// opcode makes the payload boundary unknowable.
    fn read_extension(&mut self, op: u8, frame: &mut Cursor<'_>) -> WireResult<()> {
        log::warn!("[FRAME] unhandled opcode {op:#04x}; discarding {} bytes", frame.remaining());
        frame.skip_to_end();
        Ok(())
    }
}

/// Simulation execution mode, owned by the robot runtime and mirrored
/// here so a mode change can ride the outbound frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SimulationMode {
    Pause,
    #[default]
    Realtime,
    Run,
    Fast,
}

impl SimulationMode {
    #[must_use]
    pub fn code(self) -> i32 {
        match self {
            Self::Pause => 0,
            Self::Realtime => 1,
            Self::Run => 2,
            Self::Fast => 3,
        }
    }
}

/// Facts about the controller process, owned by the robot runtime.
#[derive(Debug, Clone)]
pub struct RobotContext {
    /// Whether this controller was granted the supervisor role.
    pub is_supervisor: bool,
    /// Once set, misuse diagnostics for stale handles are suppressed.
    pub quitting: bool,
    /// Simulated time, advanced by the step loop.
    pub time: f64,
    pub mode: SimulationMode,
    /// Number of devices attached to this robot (device tags are
    /// indices below this bound).
    pub device_count: i32,
}

impl RobotContext {
    #[must_use]
    pub fn supervisor() -> Self {
        Self {
            is_supervisor: true,
            quitting: false,
            time: 0.0,
            mode: SimulationMode::default(),
            device_count: 0,
        }
    }

    /// Context of an ordinary (non-supervisor) controller; every
    /// supervisor operation degrades to a diagnostic and a sentinel.
    #[must_use]
    pub fn ordinary() -> Self {
        Self { is_supervisor: false, ..Self::supervisor() }
    }
}
