//! HTTP surface for the FCFS booking core.
//!
//! `routes::build_router` is the single entry point; `main.rs` attaches
//! middleware layers. Handlers are `pub(crate)` and the router is built from
//! plain state so the scenario tests can drive it in-process.

pub mod api_types;
pub mod auth;
pub mod error;
pub mod routes;
pub mod state;
