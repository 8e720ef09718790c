// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Public supervisor API.
//!
//! Every operation follows the same shape: assert the supervisor role,
//! validate arguments, take the step lock, record the intent (queued
//! request or one-shot slot), flush when the semantics require a
//! round-trip, and copy the result out of the handle caches.
//!
//! Misuse never panics: a diagnostic goes to the log and the operation
//! returns a sentinel (`false`, `-1`, an empty string, `None`, or an
//! all-NaN vector).

mod field;
mod node;

use parking_lot::{Mutex, MutexGuard};

use crate::frame;
use crate::runtime::{RobotContext, SimulationMode, StepDriver};
use crate::session::{Label, MovieStart, SupervisorState};
use crate::protocol::{file_extension, ANIMATION_EXTENSION, WORLD_EXTENSION};

pub(crate) const INVALID_VEC3: [f64; 3] = [f64::NAN; 3];
pub(crate) const INVALID_VEC6: [f64; 6] = [f64::NAN; 6];
pub(crate) const INVALID_VEC9: [f64; 9] = [f64::NAN; 9];

pub(crate) type StateGuard<'a> = MutexGuard<'a, SupervisorState>;

/// Supervisor session over a step-driven transport.
///
/// All client-side state lives behind the step lock; the flush
/// primitive releases the lock while the driver performs the
/// round-trip and reacquires it to dispatch the reply.
pub struct Supervisor<D: StepDriver> {
    state: Mutex<SupervisorState>,
    driver: Mutex<D>,
}

impl<D: StepDriver> Supervisor<D> {
    /// Create a session. The synthetic root (id 0) exists immediately;
    /// the self node appears once the simulator's `CONFIGURE` reply has
    /// been dispatched.
    pub fn new(driver: D, ctx: RobotContext) -> Self {
        Self {
            state: Mutex::new(SupervisorState::new(ctx)),
            driver: Mutex::new(driver),
        }
    }

    /// Advance simulated time and flush everything pending (deferred
    /// SETs ride this frame). Called by the surrounding step loop.
    pub fn step(&self, dt: f64) {
        let mut state = self.lock();
        state.ctx.time += dt;
        let _state = self.flush(state);
    }

    /// Mark the controller as shutting down. From here on, stale-handle
    /// diagnostics are suppressed and flushes become no-ops.
    pub fn begin_shutdown(&self) {
        self.lock().ctx.quitting = true;
    }

    pub(crate) fn lock(&self) -> StateGuard<'_> {
        self.state.lock()
    }

    /// The flush-unlocked primitive: serialise the outbound frame under
    /// the lock, release it across the transport round-trip, reacquire
    /// it and dispatch the reply stream.
    pub(crate) fn flush<'a>(&'a self, mut state: StateGuard<'a>) -> StateGuard<'a> {
        if state.ctx.quitting {
            return state;
        }
        let frame = frame::write_frame(&mut state);
        drop(state);

        let mut driver = self.driver.lock();
        let reply = driver.exchange(&frame);
        let mut state = self.state.lock();
        match reply {
            Ok(bytes) => {
                if let Err(err) = frame::read_frame(&mut state, &mut *driver, &bytes) {
                    log::error!("[FRAME] malformed reply stream: {err}");
                    state.ctx.quitting = true;
                }
            }
            Err(err) => {
                log::error!("[FRAME] transport failure: {err}");
                state.ctx.quitting = true;
            }
        }
        state
    }
}

// ---------------------------------------------------------------------
// Session control
// ---------------------------------------------------------------------

impl<D: StepDriver> Supervisor<D> {
    /// Ask the simulator to terminate with the given exit status.
    pub fn simulation_quit(&self, status: i32) {
        let mut state = self.lock();
        if !check_supervisor(&state, "simulation_quit") {
            return;
        }
        state.actions.quit = Some(status);
        let _state = self.flush(state);
    }

    /// Reset the simulation to its initial state.
    pub fn simulation_reset(&self) {
        let mut state = self.lock();
        if !check_supervisor(&state, "simulation_reset") {
            return;
        }
        state.actions.reset = true;
        let _state = self.flush(state);
    }

    /// Zero every velocity and force in the world.
    pub fn simulation_reset_physics(&self) {
        let mut state = self.lock();
        if !check_supervisor(&state, "simulation_reset_physics") {
            return;
        }
        state.actions.reset_physics = true;
        let _state = self.flush(state);
    }

    #[must_use]
    pub fn simulation_mode(&self) -> SimulationMode {
        self.lock().ctx.mode
    }

    pub fn set_simulation_mode(&self, mode: SimulationMode) {
        let mut state = self.lock();
        if !check_supervisor(&state, "set_simulation_mode") {
            return;
        }
        state.ctx.mode = mode;
        state.actions.change_mode = true;
        let _state = self.flush(state);
    }

    /// Reload the current world from disk.
    pub fn world_reload(&self) {
        let mut state = self.lock();
        if !check_supervisor(&state, "world_reload") {
            return;
        }
        state.actions.reload = true;
        let _state = self.flush(state);
    }

    /// Replace the running world with the given world file.
    pub fn world_load(&self, filename: &str) {
        let mut state = self.lock();
        if !check_supervisor(&state, "world_load") {
            return;
        }
        if filename.is_empty() {
            log::error!("[API] world_load() called with an empty 'filename' argument");
            return;
        }
        state.actions.load_world = Some(filename.to_owned());
        let _state = self.flush(state);
    }

    /// Save the world to `filename` (must end in `.wbt`). Returns the
    /// server-reported save status.
    pub fn world_save(&self, filename: &str) -> bool {
        let mut state = self.lock();
        if !check_supervisor(&state, "world_save") {
            return false;
        }
        if filename.is_empty() {
            log::error!("[API] world_save() called with an empty 'filename' argument");
            return false;
        }
        if file_extension(filename) != Some(WORLD_EXTENSION) {
            log::error!(
                "[API] world_save(): the target file must have the '.{WORLD_EXTENSION}' extension"
            );
            return false;
        }
        state.results.save_status = true;
        state.actions.save_request = true;
        state.actions.save_filename = Some(filename.to_owned());
        let state = self.flush(state);
        state.results.save_status
    }

    /// Render the main viewport to an image file.
    pub fn export_image(&self, filename: &str, quality: u8) {
        let mut state = self.lock();
        if !check_supervisor(&state, "export_image") {
            return;
        }
        if filename.is_empty() {
            log::error!("[API] export_image() called with an empty 'filename' argument");
            return;
        }
        if !(1..=100).contains(&quality) {
            log::error!("[API] export_image(): 'quality' ({quality}) must be between 1 and 100");
            return;
        }
        state.actions.export_image = Some((filename.to_owned(), quality));
        let _state = self.flush(state);
    }

    /// Put a text overlay on screen. `x`, `y`, `size` and `transparency`
    /// live in [0,1]; `color` is 0xRRGGBB. Reusing an id replaces the
    /// previous text and font.
    #[allow(clippy::too_many_arguments)]
    pub fn set_label(
        &self,
        id: u16,
        text: &str,
        x: f64,
        y: f64,
        size: f64,
        color: u32,
        transparency: f64,
        font: &str,
    ) {
        for (name, value) in [("x", x), ("y", y), ("size", size), ("transparency", transparency)] {
            if !(0.0..=1.0).contains(&value) {
                log::error!("[API] set_label() called with '{name}' outside of the [0,1] range");
                return;
            }
        }
        let mut state = self.lock();
        if !check_supervisor(&state, "set_label") {
            return;
        }
        let packed = color | ((transparency * 255.0) as u32) << 24;
        state.upsert_label(Label {
            id,
            text: text.to_owned(),
            font: font.to_owned(),
            x,
            y,
            size,
            color: packed,
        });
        let _state = self.flush(state);
    }

    // -----------------------------------------------------------------
    // Movie capture
    // -----------------------------------------------------------------

    #[allow(clippy::too_many_arguments)]
    pub fn movie_start_recording(
        &self,
        filename: &str,
        width: i32,
        height: i32,
        codec: u8,
        quality: u8,
        acceleration: u8,
        caption: bool,
    ) {
        let mut state = self.lock();
        if !check_supervisor(&state, "movie_start_recording") {
            return;
        }
        if filename.is_empty() {
            log::error!("[API] movie_start_recording() called with an empty 'filename' argument");
            return;
        }
        if width <= 0 || height <= 0 {
            log::error!("[API] movie_start_recording(): 'width' and 'height' must be positive");
            return;
        }
        if !(1..=100).contains(&quality) {
            log::error!(
                "[API] movie_start_recording(): 'quality' ({quality}) must be between 1 and 100"
            );
            return;
        }
        if acceleration < 1 {
            log::error!(
                "[API] movie_start_recording(): 'acceleration' must be greater than or equal to 1"
            );
            return;
        }
        state.actions.movie_start = Some(MovieStart {
            filename: filename.to_owned(),
            width,
            height,
            codec,
            quality,
            acceleration,
            caption,
        });
        let _state = self.flush(state);
    }

    pub fn movie_stop_recording(&self) {
        let mut state = self.lock();
        if !check_supervisor(&state, "movie_stop_recording") {
            return;
        }
        state.actions.movie_stop = true;
        let _state = self.flush(state);
    }

    /// Whether the movie pipeline is idle (ready or failed terminally).
    #[must_use]
    pub fn movie_is_ready(&self) -> bool {
        let state = self.lock();
        if !check_supervisor(&state, "movie_is_ready") {
            return false;
        }
        let state = self.flush(state);
        let status = state.results.movie_status;
        status == crate::session::MovieStatus::Ready || status.is_failure()
    }

    /// Whether the movie pipeline ended in a failure state.
    #[must_use]
    pub fn movie_failed(&self) -> bool {
        let state = self.lock();
        if !check_supervisor(&state, "movie_failed") {
            return true;
        }
        let state = self.flush(state);
        state.results.movie_status.is_failure()
    }

    // -----------------------------------------------------------------
    // Animation capture
    // -----------------------------------------------------------------

    /// Start recording a 3D animation to `filename` (must end in
    /// `.html`). Returns the server-reported start status.
    pub fn animation_start_recording(&self, filename: &str) -> bool {
        let mut state = self.lock();
        state.results.animation_start_status = true;
        if !check_supervisor(&state, "animation_start_recording") {
            return false;
        }
        if filename.is_empty() {
            log::error!(
                "[API] animation_start_recording() called with an empty 'filename' argument"
            );
            return false;
        }
        if file_extension(filename) != Some(ANIMATION_EXTENSION) {
            log::error!(
                "[API] animation_start_recording(): the target file must have the \
                 '.{ANIMATION_EXTENSION}' extension"
            );
            return false;
        }
        state.actions.animation_start = Some(filename.to_owned());
        let state = self.flush(state);
        state.results.animation_start_status
    }

    pub fn animation_stop_recording(&self) -> bool {
        let mut state = self.lock();
        state.results.animation_stop_status = true;
        if !check_supervisor(&state, "animation_stop_recording") {
            return false;
        }
        state.actions.animation_stop = true;
        let state = self.flush(state);
        state.results.animation_stop_status
    }

    // -----------------------------------------------------------------
    // VR headset queries
    // -----------------------------------------------------------------

    #[must_use]
    pub fn vr_headset_is_used(&self) -> bool {
        let mut state = self.lock();
        if !check_supervisor(&state, "vr_headset_is_used") {
            return false;
        }
        state.actions.vr_is_used_request = true;
        let mut state = self.flush(state);
        state.actions.vr_is_used_request = false;
        state.results.vr_is_used
    }

    /// World position of the VR headset, all-NaN when none is used.
    #[must_use]
    pub fn vr_headset_position(&self) -> [f64; 3] {
        let mut state = self.lock();
        if !check_supervisor(&state, "vr_headset_position") {
            return INVALID_VEC3;
        }
        state.actions.vr_position_request = true;
        state.results.vr_position = None;
        let mut state = self.flush(state);
        state.actions.vr_position_request = false;
        state.results.vr_position.unwrap_or(INVALID_VEC3)
    }

    /// Orientation matrix of the VR headset, all-NaN when none is used.
    #[must_use]
    pub fn vr_headset_orientation(&self) -> [f64; 9] {
        let mut state = self.lock();
        if !check_supervisor(&state, "vr_headset_orientation") {
            return INVALID_VEC9;
        }
        state.actions.vr_orientation_request = true;
        state.results.vr_orientation = None;
        let mut state = self.flush(state);
        state.actions.vr_orientation_request = false;
        state.results.vr_orientation.unwrap_or(INVALID_VEC9)
    }
}

// ---------------------------------------------------------------------
// Shared checks
// ---------------------------------------------------------------------

/// Every supervisor operation starts here; ordinary controllers get a
/// diagnostic and a sentinel.
pub(crate) fn check_supervisor(state: &SupervisorState, func: &str) -> bool {
    if state.ctx.is_supervisor {
        return true;
    }
    log::error!("[API] {func}() can only be used by a supervisor controller");
    false
}

/// Validity check for node tokens held by the caller. Diagnostics are
/// suppressed while the controller is quitting.
pub(crate) fn check_node(state: &SupervisorState, node: crate::registry::NodeRef, func: &str) -> bool {
    if state.nodes.is_valid(node) {
        return true;
    }
    if !state.ctx.quitting {
        log::error!("[API] {func}() called with a stale or invalid 'node' argument");
    }
    false
}
