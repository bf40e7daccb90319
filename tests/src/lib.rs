//! # ebeast Jsonipc Test Suite
//!
//! End-to-end flows against a loopback stub of the sound engine.
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! ├── stub.rs           # Stub engine: handshake, event hub, scripted replies
//! └── integration/
//!     ├── rpc_flows.rs      # Correlation, references, open/close lifecycle
//!     ├── event_flows.rs    # Event hub subscriptions
//!     └── session_flows.rs  # Engine activity, SHM delivery, frame loop
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p ebeast-tests
//! cargo test -p ebeast-tests integration::event_flows::
//! ```

#![allow(dead_code)]

pub mod integration;

pub use stub::{Answer, Recorded, StubEngine};

/// Route client logs to the test writer; safe to call from every test.
pub fn init_logging() {
    ebeast_telemetry::try_init_for_tests();
}
