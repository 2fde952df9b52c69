//! Archive export: one member per stream, content intact.

use crate::{agent, respond, test_fleet};
use magpie::{Compression, ObjectName, Value};
use std::io::Read;

fn name(s: &str) -> ObjectName {
    ObjectName::parse(s).unwrap()
}

fn unpack(bytes: &[u8]) -> Vec<(String, Vec<u8>)> {
    let mut archive = tar::Archive::new(std::io::Cursor::new(bytes));
    archive
        .entries()
        .unwrap()
        .map(|entry| {
            let mut entry = entry.unwrap();
            let path = entry.path().unwrap().to_string_lossy().into_owned();
            let mut content = Vec::new();
            entry.read_to_end(&mut content).unwrap();
            (path, content)
        })
        .collect()
}

#[test]
fn test_exactly_one_member_per_stream() {
    let fleet = test_fleet(); // 8-byte chunks force interleaved windows
    let bodies: [(&str, &[u8]); 4] = [
        ("C.1/fs/a", b"aaaaaaaaaaaaaaaaaaaaaaaaa"),
        ("C.1/fs/b", b""),
        ("C.1/fs/c/deep/file", b"ccc"),
        ("C.1/fs/d", b"dddddddddddd"),
    ];
    for (path, body) in bodies {
        let mut stream = fleet.create_stream(name(path)).unwrap();
        if !body.is_empty() {
            stream.append(body).unwrap();
        }
    }

    let streamer = fleet
        .export_archive(&[name("C.1")], "export", Compression::None)
        .unwrap();
    let bytes: Vec<u8> = streamer
        .map(|piece| piece.unwrap())
        .collect::<Vec<_>>()
        .concat();

    let entries = unpack(&bytes);
    assert_eq!(entries.len(), bodies.len(), "one member per stream");
    for (path, body) in bodies {
        let member = entries
            .iter()
            .find(|(p, _)| p == &format!("export/{path}"))
            .unwrap_or_else(|| panic!("missing member for {path}"));
        assert_eq!(member.1, body);
    }
}

#[test]
fn test_zstd_export_round_trips() {
    let fleet = test_fleet();
    let mut stream = fleet.create_stream(name("C.1/fs/big")).unwrap();
    let body = b"compressible ".repeat(200);
    stream.append(&body).unwrap();

    let streamer = fleet
        .export_archive(&[name("C.1")], "", Compression::Zstd)
        .unwrap();
    let compressed: Vec<u8> = streamer
        .map(|piece| piece.unwrap())
        .collect::<Vec<_>>()
        .concat();
    assert!(compressed.len() < body.len(), "compression actually ran");

    let raw = zstd::decode_all(std::io::Cursor::new(compressed)).unwrap();
    let entries = unpack(&raw);
    assert_eq!(entries, vec![("C.1/fs/big".to_string(), body)]);
}

#[test]
fn test_export_over_collected_flow_output() {
    let fleet = test_fleet();
    fleet
        .start_flow(&agent("C.1"), "fetch_file", Value::from("/etc/passwd"))
        .unwrap();
    let tasks = fleet.check_in(&agent("C.1"), 10);
    fleet
        .post_response(respond(&tasks[0], Value::Bytes(b"root:x:0:0".to_vec())))
        .unwrap();

    let streamer = fleet
        .export_archive(&[name("C.1/fs")], "case-42", Compression::None)
        .unwrap();
    let bytes: Vec<u8> = streamer
        .map(|piece| piece.unwrap())
        .collect::<Vec<_>>()
        .concat();
    let entries = unpack(&bytes);
    assert_eq!(
        entries,
        vec![(
            "case-42/C.1/fs/etc/passwd".to_string(),
            b"root:x:0:0".to_vec()
        )]
    );
}

#[test]
fn test_export_of_nothing_is_an_empty_archive() {
    let fleet = test_fleet();
    let streamer = fleet
        .export_archive(&[name("C.9")], "export", Compression::None)
        .unwrap();
    let bytes: Vec<u8> = streamer
        .map(|piece| piece.unwrap())
        .collect::<Vec<_>>()
        .concat();
    assert!(unpack(&bytes).is_empty());
}
