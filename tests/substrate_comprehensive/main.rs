//! Substrate Comprehensive Test Suite
//!
//! End-to-end verification of the substrate's contract, driven entirely
//! through the `magpie` facade the way an operator-facing frontend
//! would: versioned reads, task leasing, flow lifecycle, and archive
//! export.
//!
//! ## Running Tests
//!
//! ```bash
//! # Run the whole suite
//! cargo test --test substrate_comprehensive
//!
//! # Flow lifecycle tests only
//! cargo test --test substrate_comprehensive flows::
//! ```

use magpie::{AgentId, Fleet, FleetBuilder, RetryPolicy, TaskResponse, Value};
use std::time::Duration;

// Test modules
pub mod archive;
pub mod flows;
pub mod queue;
pub mod store;
pub mod streams;

// =============================================================================
// SHARED TEST UTILITIES
// =============================================================================

/// A fleet tuned for tests: tight retries, short leases.
pub fn test_fleet() -> Fleet {
    init_tracing();
    builder().build()
}

/// The test fleet's builder, for tests that tweak one knob.
pub fn builder() -> FleetBuilder {
    Fleet::builder()
        .chunk_size(8)
        .retry(RetryPolicy {
            attempts: 4,
            base: Duration::from_millis(1),
            multiplier: 2,
        })
}

pub fn agent(id: &str) -> AgentId {
    AgentId::new(id)
}

/// A successful response to `task` carrying `value`.
pub fn respond(task: &magpie::Task, value: Value) -> TaskResponse {
    TaskResponse {
        session_id: task.session_id.clone(),
        request_id: task.request_id,
        result: Ok(value),
    }
}

fn init_tracing() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    });
}
