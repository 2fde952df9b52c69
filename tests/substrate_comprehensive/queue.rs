//! Task leasing and redelivery.

use crate::{agent, builder, respond, test_fleet};
use magpie::{FlowStatus, Value};
use std::time::Duration;

#[test]
fn test_unacked_task_reappears_after_lease_expiry() {
    // 1ms task lease so expiry is observable.
    let fleet = builder().task_lease_micros(1_000).build();
    let session = fleet
        .start_flow(&agent("C.1"), "fetch_file", Value::from("/etc/hostname"))
        .unwrap();

    let first = fleet.check_in(&agent("C.1"), 10);
    assert_eq!(first.len(), 1);
    // The agent crashes: no ack, no response.
    std::thread::sleep(Duration::from_millis(5));

    let second = fleet.check_in(&agent("C.1"), 10);
    assert_eq!(second.len(), 1, "expired lease redelivers the task");
    assert_eq!(second[0].request_id, first[0].request_id);

    // The redelivered copy completes the flow normally.
    fleet
        .post_response(respond(&second[0], Value::Bytes(b"host-1\n".to_vec())))
        .unwrap();
    assert_eq!(fleet.get_status(&session).unwrap(), FlowStatus::Finished);
}

#[test]
fn test_acked_task_never_returns() {
    let fleet = builder().task_lease_micros(1_000).build();
    fleet
        .start_flow(&agent("C.1"), "fetch_file", Value::from("/f"))
        .unwrap();

    let tasks = fleet.check_in(&agent("C.1"), 10);
    assert!(fleet.ack(&agent("C.1"), tasks[0].request_id));
    std::thread::sleep(Duration::from_millis(5));

    assert!(
        fleet.check_in(&agent("C.1"), 10).is_empty(),
        "acked work stays gone even after the lease would have expired"
    );
}

#[test]
fn test_mailboxes_are_isolated_per_agent() {
    let fleet = test_fleet();
    fleet
        .start_flow(&agent("C.1"), "fetch_file", Value::from("/a"))
        .unwrap();
    fleet
        .start_flow(&agent("C.2"), "fetch_file", Value::from("/b"))
        .unwrap();

    assert_eq!(fleet.check_in(&agent("C.1"), 10).len(), 1);
    assert_eq!(fleet.check_in(&agent("C.2"), 10).len(), 1);
    assert!(fleet.check_in(&agent("C.3"), 10).is_empty());
}

#[test]
fn test_finished_flow_cancels_stray_tasks() {
    let fleet = test_fleet();
    let session = fleet
        .start_flow(&agent("C.1"), "fetch_file", Value::from("/f"))
        .unwrap();

    // Respond without checking in; the task is still pending delivery.
    let pending = fleet.runner().pending_requests(&session).unwrap();
    assert_eq!(pending.len(), 1);
    fleet
        .post_response(magpie::TaskResponse {
            session_id: session.clone(),
            request_id: pending[0],
            result: Ok(Value::Bytes(b"x".to_vec())),
        })
        .unwrap();

    assert_eq!(fleet.get_status(&session).unwrap(), FlowStatus::Finished);
    assert!(
        fleet.check_in(&agent("C.1"), 10).is_empty(),
        "terminal session's queued tasks are dropped"
    );
}
