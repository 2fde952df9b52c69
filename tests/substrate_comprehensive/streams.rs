//! Chunked stream reads through the facade.

use crate::test_fleet;
use magpie::{AgeSelector, ObjectName, Value};

fn name(s: &str) -> ObjectName {
    ObjectName::parse(s).unwrap()
}

#[test]
fn test_read_to_end_returns_exactly_size_bytes() {
    let fleet = test_fleet(); // 8-byte chunks
    let body = b"0123456789abcdefghij"; // 2.5 chunks
    let mut stream = fleet.create_stream(name("C.1/fs/f")).unwrap();
    stream.append(body).unwrap();

    let reopened = fleet
        .open_stream(&name("C.1/fs/f"), AgeSelector::Newest)
        .unwrap();
    assert_eq!(reopened.size(), body.len() as u64);

    let all = reopened.read(0, 0).unwrap();
    assert_eq!(all.len() as u64, reopened.size());
    assert_eq!(all, body);
}

#[test]
fn test_windowed_reads_slice_exactly() {
    let fleet = test_fleet();
    let mut stream = fleet.create_stream(name("C.1/fs/f")).unwrap();
    stream.append(b"0123456789abcdefghij").unwrap();

    assert_eq!(stream.read(6, 4).unwrap(), b"6789", "crosses a chunk edge");
    assert_eq!(stream.read(8, 8).unwrap(), b"89abcdef", "aligned chunk");
    assert_eq!(stream.read(18, 100).unwrap(), b"ij", "clamped at the end");
    assert_eq!(stream.read(20, 1).unwrap(), b"", "offset at size");
}

#[test]
fn test_incremental_appends_accumulate() {
    let fleet = test_fleet();
    let mut stream = fleet.create_stream(name("C.1/fs/log")).unwrap();
    for line in [b"one\n".as_slice(), b"two\n", b"three\n"] {
        stream.append(line).unwrap();
    }
    assert_eq!(stream.read(0, 0).unwrap(), b"one\ntwo\nthree\n");
    assert_eq!(stream.size(), 14);
}

#[test]
fn test_stream_attributes_are_derived() {
    let fleet = test_fleet();
    let mut stream = fleet.create_stream(name("C.1/fs/f")).unwrap();
    stream.append(b"data").unwrap();

    let handle = fleet
        .open_object(&name("C.1/fs/f"), AgeSelector::Newest)
        .unwrap();
    assert_eq!(handle.get("size"), Some(&Value::Int(4)));
    assert_eq!(handle.get("chunk_size"), Some(&Value::Int(8)));
}
