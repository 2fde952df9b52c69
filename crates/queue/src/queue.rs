//! Mailboxes, leases, and response inboxes

use crate::task::{Priority, Task, TaskResponse};
use dashmap::DashMap;
use magpie_core::{types::now_micros, AgentId, RequestId, SessionId, Timestamp};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::collections::VecDeque;
use tracing::debug;

/// Default task lease: 10 minutes.
pub const DEFAULT_LEASE_MICROS: i64 = 10 * 60 * 1_000_000;

#[derive(Debug)]
struct InFlight {
    task: Task,
    expires: Timestamp,
}

#[derive(Debug, Default)]
struct Mailbox {
    next_seq: u64,
    // One FIFO per priority class, indexed by Priority::index().
    pending: [VecDeque<Task>; Priority::COUNT],
    in_flight: FxHashMap<RequestId, InFlight>,
}

impl Mailbox {
    fn requeue_expired(&mut self, now: Timestamp) {
        let expired: Vec<RequestId> = self
            .in_flight
            .iter()
            .filter(|(_, lease)| lease.expires <= now)
            .map(|(id, _)| *id)
            .collect();
        if expired.is_empty() {
            return;
        }

        let mut tasks: Vec<Task> = expired
            .into_iter()
            .filter_map(|id| self.in_flight.remove(&id))
            .map(|lease| lease.task)
            .collect();
        // Leased tasks left the front of their queue, so pushing them
        // back in descending seq order restores the original order.
        tasks.sort_by(|a, b| b.seq.cmp(&a.seq));
        for task in tasks {
            debug!(
                agent = %task.agent_id,
                request = %task.request_id,
                seq = task.seq,
                "requeueing expired task lease"
            );
            self.pending[task.priority.index()].push_front(task);
        }
    }
}

/// Per-agent outbound mailboxes plus per-session response inboxes.
///
/// All operations are point lookups under short locks; check-in holds
/// one mailbox lock for its whole requeue-then-drain step so two
/// concurrent check-ins for the same agent never lease the same task.
#[derive(Debug)]
pub struct TaskQueue {
    mailboxes: DashMap<AgentId, Mutex<Mailbox>>,
    inboxes: DashMap<SessionId, Mutex<Vec<TaskResponse>>>,
    lease_micros: i64,
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskQueue {
    /// Queue with the default 10-minute lease.
    pub fn new() -> Self {
        Self::with_lease(DEFAULT_LEASE_MICROS)
    }

    /// Queue with a custom lease interval in microseconds.
    pub fn with_lease(lease_micros: i64) -> Self {
        TaskQueue {
            mailboxes: DashMap::new(),
            inboxes: DashMap::new(),
            lease_micros,
        }
    }

    /// Append a task to its agent's mailbox.
    ///
    /// The task's `seq` is assigned here; the caller's value is
    /// ignored.
    pub fn enqueue(&self, mut task: Task) {
        let mailbox = self
            .mailboxes
            .entry(task.agent_id.clone())
            .or_insert_with(|| Mutex::new(Mailbox::default()));
        let mut mailbox = mailbox.lock();
        task.seq = mailbox.next_seq;
        mailbox.next_seq += 1;
        debug!(
            agent = %task.agent_id,
            session = %task.session_id,
            request = %task.request_id,
            priority = ?task.priority,
            "task enqueued"
        );
        mailbox.pending[task.priority.index()].push_back(task);
    }

    /// Lease up to `max_items` tasks to a checking-in agent.
    ///
    /// Expired leases are requeued first, so a crashed agent's work is
    /// redelivered on its next check-in. Tasks drain
    /// highest-priority-first, FIFO within a class.
    pub fn check_in(&self, agent: &AgentId, max_items: usize) -> Vec<Task> {
        let Some(mailbox) = self.mailboxes.get(agent) else {
            return Vec::new();
        };
        let mut mailbox = mailbox.lock();
        let now = now_micros();
        mailbox.requeue_expired(now);

        let mut leased = Vec::new();
        for index in (0..Priority::COUNT).rev() {
            while leased.len() < max_items {
                let Some(task) = mailbox.pending[index].pop_front() else {
                    break;
                };
                mailbox.in_flight.insert(
                    task.request_id,
                    InFlight {
                        task: task.clone(),
                        expires: now + self.lease_micros,
                    },
                );
                leased.push(task);
            }
        }
        leased
    }

    /// Acknowledge a delivered task, dropping its lease.
    ///
    /// Returns false for an unknown request id, which covers the late
    /// ack of a task that already expired and was requeued.
    pub fn ack(&self, agent: &AgentId, request_id: RequestId) -> bool {
        self.mailboxes
            .get(agent)
            .map(|mailbox| mailbox.lock().in_flight.remove(&request_id).is_some())
            .unwrap_or(false)
    }

    /// Drop every pending and in-flight task of a session.
    ///
    /// Called when a flow terminates with requests still queued. The
    /// session's response inbox is dropped too; anything an agent sends
    /// afterwards is delivered to a terminal session and ignored there.
    pub fn cancel_session(&self, session: &SessionId) {
        let Some(agent) = session.name().components().first() else {
            return;
        };
        let agent = AgentId::new(agent.clone());
        if let Some(mailbox) = self.mailboxes.get(&agent) {
            let mut mailbox = mailbox.lock();
            for queue in &mut mailbox.pending {
                queue.retain(|task| &task.session_id != session);
            }
            mailbox
                .in_flight
                .retain(|_, lease| &lease.task.session_id != session);
        }
        self.inboxes.remove(session);
        debug!(%session, "session tasks cancelled");
    }

    /// Append an agent response to its session's inbox.
    pub fn post_response(&self, response: TaskResponse) {
        let inbox = self
            .inboxes
            .entry(response.session_id.clone())
            .or_insert_with(|| Mutex::new(Vec::new()));
        inbox.lock().push(response);
    }

    /// Take everything currently in a session's inbox.
    pub fn drain_responses(&self, session: &SessionId) -> Vec<TaskResponse> {
        self.inboxes
            .remove(session)
            .map(|(_, inbox)| inbox.into_inner())
            .unwrap_or_default()
    }

    /// Number of tasks waiting in an agent's mailbox.
    pub fn pending_len(&self, agent: &AgentId) -> usize {
        self.mailboxes
            .get(agent)
            .map(|m| m.lock().pending.iter().map(VecDeque::len).sum())
            .unwrap_or(0)
    }

    /// Number of tasks currently leased to an agent.
    pub fn in_flight_len(&self, agent: &AgentId) -> usize {
        self.mailboxes
            .get(agent)
            .map(|m| m.lock().in_flight.len())
            .unwrap_or(0)
    }
}
