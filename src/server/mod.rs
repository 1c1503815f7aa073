//! HTTP surface for the pipeline.
//!
//! ```text
//! ┌──────────┐  POST start/resume/revise  ┌────────────────────────────────┐
//! │  Client  │ ─────────────────────────> │ api.rs  (handlers, ApiError)   │
//! │          │                            │   └─ Orchestrator              │
//! │          │ <───── SSE /api/stream ─── │ sse.rs                         │
//! │          │ <───── WS  /api/ws ─────── │ ws.rs   (ping/pong keepalive)  │
//! └──────────┘                            └────────────────────────────────┘
//! ```
//!
//! `app.rs` assembles the router and runs the serve loop.

pub mod api;
pub mod app;
pub mod sse;
pub mod ws;

pub use api::{AppState, SharedState};
pub use app::{build_router, start_server};
