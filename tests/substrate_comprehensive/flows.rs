//! Flow lifecycle: determinism, isolation, and linearized checkpoints.

use crate::{agent, respond, test_fleet};
use magpie::{
    AgeSelector, Error, FlowStatus, ObjectName, SessionId, Value,
};
use rand::seq::SliceRandom;
use std::sync::Arc;
use std::thread;

#[test]
fn test_running_to_finished_with_deterministic_result() {
    let fleet = test_fleet();
    let session = fleet
        .start_flow(&agent("C.1"), "fetch_file", Value::from("/etc/motd"))
        .unwrap();
    assert_eq!(fleet.get_status(&session).unwrap(), FlowStatus::Running);

    let tasks = fleet.check_in(&agent("C.1"), 10);
    assert_eq!(tasks.len(), 1, "one initial request");
    fleet
        .post_response(respond(&tasks[0], Value::Bytes(b"welcome".to_vec())))
        .unwrap();

    assert_eq!(fleet.get_status(&session).unwrap(), FlowStatus::Finished);
    // fetch_file's result is the byte count of the fetched content.
    assert_eq!(fleet.get_result(&session).unwrap(), Some(Value::Int(7)));
}

#[test]
fn test_two_starts_yield_distinct_queryable_sessions() {
    let fleet = test_fleet();
    let a = fleet
        .start_flow(&agent("C.1"), "fetch_file", Value::from("/a"))
        .unwrap();
    let b = fleet
        .start_flow(&agent("C.1"), "fetch_file", Value::from("/b"))
        .unwrap();

    assert_ne!(a, b);
    assert_eq!(fleet.get_status(&a).unwrap(), FlowStatus::Running);
    assert_eq!(fleet.get_status(&b).unwrap(), FlowStatus::Running);

    // Finishing one leaves the other untouched.
    let tasks = fleet.check_in(&agent("C.1"), 10);
    let for_a: Vec<_> = tasks.iter().filter(|t| t.session_id == a).collect();
    fleet
        .post_response(respond(for_a[0], Value::Bytes(b"x".to_vec())))
        .unwrap();
    assert_eq!(fleet.get_status(&a).unwrap(), FlowStatus::Finished);
    assert_eq!(fleet.get_status(&b).unwrap(), FlowStatus::Running);
}

#[test]
fn test_store_outage_keeps_responses_deliverable() {
    let fleet = test_fleet();
    let session = fleet
        .start_flow(&agent("C.1"), "fetch_file", Value::from("/a"))
        .unwrap();
    let tasks = fleet.check_in(&agent("C.1"), 10);
    assert_eq!(tasks.len(), 1);

    fleet.store().fail_next_writes(100);
    let err = fleet
        .post_response(respond(&tasks[0], Value::Bytes(b"x".to_vec())))
        .unwrap_err();
    assert!(matches!(err, Error::Unavailable(_)));

    // The outage committed nothing: the session is still RUNNING, the
    // task is still in flight, and the response is back in the inbox.
    assert_eq!(fleet.get_status(&session).unwrap(), FlowStatus::Running);
    assert_eq!(fleet.runner().pending_requests(&session).unwrap().len(), 1);
    assert_eq!(fleet.queue().in_flight_len(&agent("C.1")), 1);

    fleet.store().fail_next_writes(0);
    fleet
        .post_response(respond(&tasks[0], Value::Bytes(b"x".to_vec())))
        .unwrap();
    assert_eq!(fleet.get_status(&session).unwrap(), FlowStatus::Finished);
    assert_eq!(fleet.queue().in_flight_len(&agent("C.1")), 0);
}

#[test]
fn test_missing_session_status_is_not_found() {
    let fleet = test_fleet();
    let ghost = SessionId::new(ObjectName::parse("C.1/flows/F:deadbeef").unwrap());
    assert!(matches!(
        fleet.get_status(&ghost),
        Err(Error::NotFound(_))
    ));
}

/// Concurrent deliveries to one session never interleave a checkpoint:
/// a reader polling the instance observes a consistent progression and
/// the final state accounts for every response exactly once.
#[test]
fn test_concurrent_deliveries_linearize_per_session() {
    let fleet = Arc::new(test_fleet());
    let session = fleet
        .start_flow(&agent("C.1"), "fetch_file", Value::from("/f"))
        .unwrap();
    let tasks = fleet.check_in(&agent("C.1"), 10);
    let response = respond(&tasks[0], Value::Bytes(b"payload".to_vec()));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let fleet = Arc::clone(&fleet);
        let response = response.clone();
        handles.push(thread::spawn(move || {
            // Duplicates and contention are both legal outcomes here;
            // only an interleaved/corrupt checkpoint would be a bug.
            match fleet.post_response(response) {
                Ok(()) => {}
                Err(Error::LockContention(_)) => {}
                Err(other) => panic!("unexpected delivery failure: {other}"),
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    // However the races resolved, the session is terminal with the
    // deterministic result, and the content landed exactly once.
    assert_eq!(fleet.get_status(&session).unwrap(), FlowStatus::Finished);
    assert_eq!(fleet.get_result(&session).unwrap(), Some(Value::Int(7)));
    let stream = fleet
        .open_stream(
            &ObjectName::parse("C.1/fs/f").unwrap(),
            AgeSelector::Newest,
        )
        .unwrap();
    assert_eq!(stream.read(0, 0).unwrap(), b"payload");
}

/// Status history of a session is monotone: once a poller sees
/// FINISHED it never sees RUNNING again, across many sessions resolved
/// in random order.
#[test]
fn test_status_never_regresses() {
    let fleet = test_fleet();
    let mut sessions = Vec::new();
    for index in 0..6 {
        let session = fleet
            .start_flow(
                &agent("C.1"),
                "fetch_file",
                Value::from(format!("/file-{index}").as_str()),
            )
            .unwrap();
        sessions.push(session);
    }

    let mut tasks = fleet.check_in(&agent("C.1"), 100);
    tasks.shuffle(&mut rand::thread_rng());
    let mut finished = std::collections::HashSet::new();
    for task in &tasks {
        fleet
            .post_response(respond(task, Value::Bytes(b"content".to_vec())))
            .unwrap();
        for (index, session) in sessions.iter().enumerate() {
            match fleet.get_status(session).unwrap() {
                FlowStatus::Finished => {
                    finished.insert(index);
                }
                FlowStatus::Running => {
                    assert!(!finished.contains(&index), "session regressed to RUNNING");
                }
                FlowStatus::Error => panic!("no session may fail in this scenario"),
            }
        }
    }
    for session in &sessions {
        assert_eq!(fleet.get_status(session).unwrap(), FlowStatus::Finished);
    }
}

#[test]
fn test_list_directory_end_to_end() {
    let fleet = test_fleet();
    let session = fleet
        .start_flow(&agent("C.1"), "list_directory", Value::from("/etc"))
        .unwrap();
    let tasks = fleet.check_in(&agent("C.1"), 10);

    let entry = |name: &str, dir: bool| {
        let mut record = std::collections::BTreeMap::new();
        record.insert("name".to_string(), Value::from(name));
        record.insert("directory".to_string(), Value::Bool(dir));
        Value::Object(record)
    };
    fleet
        .post_response(respond(
            &tasks[0],
            Value::Array(vec![entry("passwd", false), entry("ssh", true)]),
        ))
        .unwrap();

    assert_eq!(fleet.get_status(&session).unwrap(), FlowStatus::Finished);
    let listed = fleet
        .open_object(
            &ObjectName::parse("C.1/fs/etc/passwd").unwrap(),
            AgeSelector::Newest,
        )
        .unwrap();
    assert!(listed.get("stat").is_some());
}
