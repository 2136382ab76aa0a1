//! Core types shared across the voicebridge crates
//!
//! This crate provides the foundations used everywhere else:
//! - Typed event envelopes and the event publisher
//! - Audio frame types
//! - Outbound URL validation (SSRF guard)
//! - The bounded task pool

pub mod audio;
pub mod events;
pub mod publisher;
pub mod queue;
pub mod task;
pub mod urlcheck;

pub use audio::AudioFrame;
pub use events::{Envelope, EventType};
pub use publisher::{EventError, Publisher};
pub use queue::{MemoryQueue, QueueError, QueueTransport};
pub use task::TaskPool;
pub use urlcheck::{validate_outbound_url, UrlError};
