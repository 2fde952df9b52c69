//! Versioned store properties through the facade.

use crate::test_fleet;
use magpie::{AgeSelector, ObjectName, Value};

fn name(s: &str) -> ObjectName {
    ObjectName::parse(s).unwrap()
}

#[test]
fn test_writes_are_append_only_across_versions() {
    let fleet = test_fleet();
    let store = fleet.store();
    let subject = name("C.1/fs/etc/passwd");

    store
        .write(&subject, "stat", Value::Int(1), Some(100))
        .unwrap();
    store
        .write(&subject, "stat", Value::Int(2), Some(200))
        .unwrap();
    store
        .write(&subject, "stat", Value::Int(3), Some(300))
        .unwrap();

    let all = store.read(&subject, "stat", AgeSelector::AllTimes).unwrap();
    assert_eq!(
        all,
        vec![
            (Value::Int(3), 300),
            (Value::Int(2), 200),
            (Value::Int(1), 100),
        ],
        "every version survives, newest first"
    );

    // Another write never removes prior versions.
    store
        .write(&subject, "stat", Value::Int(4), Some(400))
        .unwrap();
    let all = store.read(&subject, "stat", AgeSelector::AllTimes).unwrap();
    assert_eq!(all.len(), 4);
    assert!(all.contains(&(Value::Int(1), 100)));
}

#[test]
fn test_age_selectors_pick_views_of_one_history() {
    let fleet = test_fleet();
    let store = fleet.store();
    let subject = name("C.1/fs/f");
    for (value, ts) in [(10, 100), (20, 200), (30, 300)] {
        store
            .write(&subject, "size", Value::Int(value), Some(ts))
            .unwrap();
    }

    assert_eq!(
        store.read(&subject, "size", AgeSelector::Newest).unwrap(),
        vec![(Value::Int(30), 300)]
    );
    assert_eq!(
        store
            .read(&subject, "size", AgeSelector::AtOrBefore(250))
            .unwrap(),
        vec![(Value::Int(20), 200)]
    );
    assert_eq!(
        store
            .read(&subject, "size", AgeSelector::AtOrBefore(50))
            .unwrap(),
        vec![]
    );
}

#[test]
fn test_open_object_sees_point_in_time_view() {
    let fleet = test_fleet();
    let store = fleet.store();
    let subject = name("C.1/fs/f");
    store
        .write(&subject, "type", Value::from("object"), Some(100))
        .unwrap();
    store
        .write(&subject, "stat", Value::from("old"), Some(100))
        .unwrap();
    store
        .write(&subject, "stat", Value::from("new"), Some(300))
        .unwrap();

    let then = fleet
        .open_object(&subject, AgeSelector::AtOrBefore(200))
        .unwrap();
    assert_eq!(then.get("stat"), Some(&Value::from("old")));

    let now = fleet.open_object(&subject, AgeSelector::Newest).unwrap();
    assert_eq!(now.get("stat"), Some(&Value::from("new")));
}
