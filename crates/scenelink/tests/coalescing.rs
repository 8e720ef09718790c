// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

#![allow(clippy::float_cmp)] // Test assertions with constants
#![allow(clippy::unreadable_literal)] // Large test constants
#![allow(clippy::missing_panics_doc)] // Tests panic on failure

//! Read-your-writes coalescing and frame-count guarantees.

mod common;

use common::{SceneNode, SimStub, Storage};
use scenelink::{FieldKind, FieldType, FieldValue, RobotContext, Supervisor};

fn boot() -> (Supervisor<common::SharedSim>, std::sync::Arc<std::sync::Mutex<SimStub>>) {
    let mut stub = SimStub::new();
    stub.add_node(SceneNode::new(2, 3, "BODY"));
    stub.add_field(2, "enabled", FieldType::sf(FieldKind::Bool), Storage::Sf(FieldValue::Bool(false)));
    stub.add_field(
        2,
        "gains",
        FieldType::mf(FieldKind::Float),
        Storage::Mf(vec![
            FieldValue::Float(10.0),
            FieldValue::Float(11.0),
            FieldValue::Float(12.0),
            FieldValue::Float(13.0),
        ]),
    );
    let (driver, handle) = stub.share();
    (Supervisor::new(driver, RobotContext::supervisor()), handle)
}

#[test]
fn test_sf_set_then_get_coalesces_without_frames() {
    let (supervisor, stub) = boot();

    let body = supervisor.node_from_def("ROBOT.BODY").expect("resolve DEF");
    let enabled = supervisor.node_field(body, "enabled").expect("resolve field");
    let baseline = stub.lock().unwrap().exchanges;

    supervisor.field_set_sf_bool(enabled, true);
    assert_eq!(supervisor.field_get_sf_bool(enabled), true);

    // The set is deferred, the get answered from the pending write:
    // zero frames between the two calls.
    assert_eq!(stub.lock().unwrap().exchanges, baseline);

    // The write rides the next step's frame, exactly once.
    supervisor.step(0.032);
    let stub = stub.lock().unwrap();
    assert_eq!(stub.exchanges, baseline + 1);
    assert_eq!(stub.sets.len(), 1);
    assert_eq!(stub.sets[0].3, FieldValue::Bool(true));
}

#[test]
fn test_mf_write_coalescing_emits_single_set() {
    let (supervisor, stub) = boot();

    let body = supervisor.node_from_def("BODY").expect("resolve DEF");
    let gains = supervisor.node_field(body, "gains").expect("resolve field");
    let baseline = stub.lock().unwrap().exchanges;

    supervisor.field_set_mf_float(gains, 2, 1.0);
    supervisor.field_set_mf_float(gains, 2, 2.0);
    assert_eq!(supervisor.field_get_mf_float(gains, 2), 2.0);
    assert_eq!(stub.lock().unwrap().exchanges, baseline);

    supervisor.step(0.032);
    let stub = stub.lock().unwrap();
    // Both sets folded into one wire request carrying the last value.
    assert_eq!(stub.sets.len(), 1);
    assert_eq!(stub.sets[0].2, 2);
    assert_eq!(stub.sets[0].3, FieldValue::Float(2.0));
}

#[test]
fn test_get_without_pending_set_round_trips_once() {
    let (supervisor, stub) = boot();

    let body = supervisor.node_from_def("BODY").expect("resolve DEF");
    let gains = supervisor.node_field(body, "gains").expect("resolve field");
    let baseline = stub.lock().unwrap().exchanges;

    assert_eq!(supervisor.field_get_mf_float(gains, 1), 11.0);
    assert_eq!(stub.lock().unwrap().exchanges, baseline + 1);
}

#[test]
fn test_sets_on_distinct_indices_do_not_coalesce() {
    let (supervisor, stub) = boot();

    let body = supervisor.node_from_def("BODY").expect("resolve DEF");
    let gains = supervisor.node_field(body, "gains").expect("resolve field");

    supervisor.field_set_mf_float(gains, 0, 7.0);
    supervisor.field_set_mf_float(gains, 3, 8.0);
    supervisor.step(0.032);

    let stub = stub.lock().unwrap();
    assert_eq!(stub.sets.len(), 2);
    // FIFO: emission order matches call order.
    assert_eq!(stub.sets[0].2, 0);
    assert_eq!(stub.sets[1].2, 3);
}

#[test]
fn test_invalid_floats_never_reach_the_wire() {
    let (supervisor, stub) = boot();

    let body = supervisor.node_from_def("BODY").expect("resolve DEF");
    let gains = supervisor.node_field(body, "gains").expect("resolve field");

    supervisor.field_set_mf_float(gains, 0, f64::NAN);
    supervisor.field_set_mf_float(gains, 0, f64::INFINITY);
    supervisor.field_set_mf_float(gains, 0, f64::NEG_INFINITY);
    supervisor.field_set_mf_float(gains, 0, f64::from(f32::MAX) * 2.0);
    supervisor.step(0.032);

    assert!(stub.lock().unwrap().sets.is_empty());
}

#[test]
fn test_mf_index_out_of_bounds_rejected() {
    let (supervisor, stub) = boot();

    let body = supervisor.node_from_def("BODY").expect("resolve DEF");
    let gains = supervisor.node_field(body, "gains").expect("resolve field");

    // count is 4: valid setter indices are -4..=3.
    supervisor.field_set_mf_float(gains, 4, 1.0);
    supervisor.field_set_mf_float(gains, -5, 1.0);
    supervisor.step(0.032);

    assert!(stub.lock().unwrap().sets.is_empty());
}

#[test]
fn test_negative_set_index_resolves_to_tail() {
    let (supervisor, stub) = boot();

    let body = supervisor.node_from_def("BODY").expect("resolve DEF");
    let gains = supervisor.node_field(body, "gains").expect("resolve field");

    supervisor.field_set_mf_float(gains, -1, 99.0);
    supervisor.step(0.032);

    let stub = stub.lock().unwrap();
    assert_eq!(stub.sets.len(), 1);
    assert_eq!(stub.sets[0].2, 3);
}
