//! Voicebridge server
//!
//! The axum application tying the SFU, dialog engine, webhook delivery, and
//! orchestrator together behind one REST surface.

pub mod control;
pub mod error;
pub mod http;
pub mod state;

pub use error::ApiError;
pub use http::create_router;
pub use state::AppState;
