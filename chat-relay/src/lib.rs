//! chat-relay: streams Gemini chat generations to HTTP clients with
//! out-of-band cancellation.

pub mod config;
pub mod handlers;
pub mod models;
pub mod services;
pub mod startup;

pub use startup::{build_router, AppState, Application};
