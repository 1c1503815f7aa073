//! Pipeline orchestration: routing, workers, sessions and event streaming.
//!
//! ## Module Map
//!
//! ```text
//! ┌──────────────┐ start/resume/revise ┌───────────────────────────────────┐
//! │ server / CLI │ ──────────────────> │ orchestrator.rs (control loop)    │
//! │              │                     │   │ routing::next(&Document)      │
//! │              │                     │   v                               │
//! │              │                     │ runner.rs (spawn_blocking stage)  │
//! │              │                     │   │ mpsc: Progress*, Finished     │
//! │              │                     │   v                               │
//! │              │                     │ bridge.rs ──> session.rs          │
//! │              │                     │               (event log +        │
//! │              │ <────────────────── │ stream.rs <──  broadcast sender)  │
//! └──────────────┘ replay, live, done  └───────────────────────────────────┘
//! ```
//!
//! ## Pass lifecycle
//!
//! `starting -> running -> suspended -> running -> completed`, with `error`
//! reachable from any pass. A pass ends at a suspend point, on completion or
//! on failure; `resume` and `request_revision` start the next one.

pub mod bridge;
pub mod orchestrator;
pub mod routing;
pub mod runner;
pub mod session;
pub mod stream;

pub use orchestrator::{Limits, Orchestrator};
pub use routing::Route;
pub use session::{Session, SessionRegistry};
pub use stream::StreamItem;
