//! Built-in flow kinds
//!
//! Two simple collection flows ship with the substrate: one lists a
//! remote directory into typed child objects, one fetches a file's
//! content into a chunked stream. Both are single-round-trip flows and
//! double as realistic fixtures for the runner.

use crate::logic::{FlowLogic, OutboundRequest, StepContext, StepOutcome};
use magpie_core::{AgentId, Error, ObjectName, Result, Value};
use magpie_object::{attrs, KindTag, ObjectHandle, Stream};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Kind name of [`ListDirectory`].
pub const LIST_DIRECTORY: &str = "list_directory";
/// Kind name of [`FetchFile`].
pub const FETCH_FILE: &str = "fetch_file";

/// The store name a remote path's data lives under: the agent's
/// namespace, `fs`, then the path's components.
pub fn vfs_name(agent: &AgentId, path: &str) -> Result<ObjectName> {
    let mut name = agent.root_name().child("fs")?;
    for component in path.split('/').filter(|c| !c.is_empty()) {
        name = name.child(component)?;
    }
    Ok(name)
}

fn path_arg(args: &Value) -> Result<String> {
    let path = match args {
        Value::String(s) => Some(s.as_str()),
        Value::Object(map) => map.get("path").and_then(Value::as_str),
        _ => None,
    };
    path.map(String::from)
        .ok_or_else(|| Error::FlowLogic("args must carry a path".into()))
}

fn request_payload(op: &str, path: &str) -> Value {
    let mut payload = BTreeMap::new();
    payload.insert("op".to_string(), Value::from(op));
    payload.insert("path".to_string(), Value::from(path));
    Value::Object(payload)
}

/// Lists one remote directory.
///
/// The agent answers with an array of entry records; each becomes a
/// typed child object under the agent's `fs` namespace, directories as
/// containers, the rest as plain objects carrying their stat record.
pub struct ListDirectory;

impl FlowLogic for ListDirectory {
    fn initial(&self, _ctx: &StepContext<'_>, args: &Value) -> Result<StepOutcome> {
        let path = path_arg(args)?;
        let request = OutboundRequest::new(request_payload(LIST_DIRECTORY, &path));
        Ok(StepOutcome::waiting(Value::from(path), vec![request]))
    }

    fn on_responses(
        &self,
        ctx: &StepContext<'_>,
        state: &Value,
        responses: &[magpie_queue::TaskResponse],
    ) -> Result<StepOutcome> {
        let path = state
            .as_str()
            .ok_or_else(|| Error::FlowLogic("lost directory path".into()))?;
        let entries = match &responses[0].result {
            Ok(value) => value
                .as_array()
                .ok_or_else(|| Error::FlowLogic("listing response is not an array".into()))?,
            Err(agent_error) => {
                return Err(Error::FlowLogic(format!(
                    "agent failed to list {path}: {agent_error}"
                )))
            }
        };

        let parent = vfs_name(ctx.agent, path)?;
        for entry in entries {
            let Some(record) = entry.as_object() else {
                return Err(Error::FlowLogic("listing entry is not a record".into()));
            };
            let Some(basename) = record.get("name").and_then(Value::as_str) else {
                return Err(Error::FlowLogic("listing entry has no name".into()));
            };
            let child = parent.child(basename)?;
            let is_dir = record
                .get("directory")
                .and_then(Value::as_bool)
                .unwrap_or(false);
            let kind = if is_dir {
                KindTag::container()
            } else {
                KindTag::object()
            };
            let mut handle = ObjectHandle::create(
                Arc::clone(ctx.store),
                Arc::clone(ctx.schema),
                child,
                kind,
            )?;
            handle.set(attrs::STAT, entry.clone())?;
        }
        debug!(path, count = entries.len(), "directory listing collected");
        Ok(StepOutcome::finished(Value::Int(entries.len() as i64)))
    }
}

/// Fetches one remote file into a chunked stream.
pub struct FetchFile;

impl FlowLogic for FetchFile {
    fn initial(&self, _ctx: &StepContext<'_>, args: &Value) -> Result<StepOutcome> {
        let path = path_arg(args)?;
        let request = OutboundRequest::new(request_payload(FETCH_FILE, &path));
        Ok(StepOutcome::waiting(Value::from(path), vec![request]))
    }

    fn on_responses(
        &self,
        ctx: &StepContext<'_>,
        state: &Value,
        responses: &[magpie_queue::TaskResponse],
    ) -> Result<StepOutcome> {
        let path = state
            .as_str()
            .ok_or_else(|| Error::FlowLogic("lost file path".into()))?;
        let bytes = match &responses[0].result {
            Ok(value) => value
                .as_bytes()
                .ok_or_else(|| Error::FlowLogic("file response is not bytes".into()))?,
            Err(agent_error) => {
                return Err(Error::FlowLogic(format!(
                    "agent failed to fetch {path}: {agent_error}"
                )))
            }
        };

        let name = vfs_name(ctx.agent, path)?;
        let mut stream = Stream::create(
            Arc::clone(ctx.store),
            Arc::clone(ctx.schema),
            name,
            None,
        )?;
        stream.append(bytes)?;
        debug!(path, size = bytes.len(), "file content collected");
        Ok(StepOutcome::finished(Value::Int(bytes.len() as i64)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::FlowRegistry;
    use crate::runner::FlowRunner;
    use crate::status::FlowStatus;
    use magpie_core::AgeSelector;
    use magpie_object::Schema;
    use magpie_queue::{TaskQueue, TaskResponse};
    use magpie_store::AttributeStore;

    fn fixture() -> (FlowRunner, Arc<AttributeStore>, Arc<TaskQueue>, Arc<Schema>) {
        let store = Arc::new(AttributeStore::new());
        let schema = Arc::new(Schema::with_builtins());
        let queue = Arc::new(TaskQueue::new());
        let registry = Arc::new(FlowRegistry::with_builtins());
        let runner = FlowRunner::new(
            Arc::clone(&store),
            Arc::clone(&schema),
            Arc::clone(&queue),
            registry,
        );
        (runner, store, queue, schema)
    }

    fn agent() -> AgentId {
        AgentId::new("C.1")
    }

    fn entry(name: &str, directory: bool) -> Value {
        let mut record = BTreeMap::new();
        record.insert("name".to_string(), Value::from(name));
        record.insert("directory".to_string(), Value::Bool(directory));
        record.insert("size".to_string(), Value::Int(42));
        Value::Object(record)
    }

    #[test]
    fn test_vfs_name_mapping() {
        let name = vfs_name(&agent(), "/etc/ssh/sshd_config").unwrap();
        assert_eq!(name.to_string(), "C.1/fs/etc/ssh/sshd_config");
        assert_eq!(vfs_name(&agent(), "").unwrap().to_string(), "C.1/fs");
    }

    #[test]
    fn test_list_directory_writes_typed_children() {
        let (runner, store, queue, schema) = fixture();
        let session = runner
            .start_flow(&agent(), LIST_DIRECTORY, Value::from("/etc"))
            .unwrap();

        let tasks = queue.check_in(&agent(), 10);
        assert_eq!(tasks.len(), 1);
        assert_eq!(
            tasks[0].payload,
            request_payload(LIST_DIRECTORY, "/etc")
        );

        runner
            .deliver_responses(
                &session,
                vec![TaskResponse {
                    session_id: session.clone(),
                    request_id: tasks[0].request_id,
                    result: Ok(Value::Array(vec![
                        entry("passwd", false),
                        entry("ssh", true),
                    ])),
                }],
            )
            .unwrap();

        assert_eq!(runner.get_status(&session).unwrap(), FlowStatus::Finished);
        assert_eq!(runner.get_result(&session).unwrap(), Some(Value::Int(2)));

        let passwd = ObjectHandle::open_any(
            Arc::clone(&store),
            Arc::clone(&schema),
            &vfs_name(&agent(), "/etc/passwd").unwrap(),
            AgeSelector::Newest,
        )
        .unwrap();
        assert_eq!(passwd.kind(), &KindTag::object());
        assert!(passwd.get(attrs::STAT).is_some());

        let ssh = ObjectHandle::open_any(
            store,
            schema,
            &vfs_name(&agent(), "/etc/ssh").unwrap(),
            AgeSelector::Newest,
        )
        .unwrap();
        assert_eq!(ssh.kind(), &KindTag::container());
    }

    #[test]
    fn test_list_directory_agent_error_fails_flow() {
        let (runner, _store, queue, _schema) = fixture();
        let session = runner
            .start_flow(&agent(), LIST_DIRECTORY, Value::from("/etc"))
            .unwrap();
        let tasks = queue.check_in(&agent(), 10);
        runner
            .deliver_responses(
                &session,
                vec![TaskResponse {
                    session_id: session.clone(),
                    request_id: tasks[0].request_id,
                    result: Err("permission denied".into()),
                }],
            )
            .unwrap();
        assert_eq!(runner.get_status(&session).unwrap(), FlowStatus::Error);
        assert!(runner
            .get_error(&session)
            .unwrap()
            .unwrap()
            .contains("permission denied"));
    }

    #[test]
    fn test_fetch_file_lands_in_stream() {
        let (runner, store, queue, schema) = fixture();
        let session = runner
            .start_flow(&agent(), FETCH_FILE, Value::from("/etc/passwd"))
            .unwrap();
        let tasks = queue.check_in(&agent(), 10);

        runner
            .deliver_responses(
                &session,
                vec![TaskResponse {
                    session_id: session.clone(),
                    request_id: tasks[0].request_id,
                    result: Ok(Value::Bytes(b"root:x:0:0".to_vec())),
                }],
            )
            .unwrap();

        assert_eq!(runner.get_status(&session).unwrap(), FlowStatus::Finished);
        assert_eq!(runner.get_result(&session).unwrap(), Some(Value::Int(10)));

        let stream = Stream::open(
            store,
            schema,
            &vfs_name(&agent(), "/etc/passwd").unwrap(),
            AgeSelector::Newest,
        )
        .unwrap();
        assert_eq!(stream.read(0, 0).unwrap(), b"root:x:0:0");
    }

    #[test]
    fn test_missing_path_arg_fails_initial() {
        let (runner, _store, _queue, _schema) = fixture();
        let session = runner
            .start_flow(&agent(), FETCH_FILE, Value::Null)
            .unwrap();
        assert_eq!(runner.get_status(&session).unwrap(), FlowStatus::Error);
    }
}
