//! Switchboard - a model-routing proxy for chat-completion backends
//!
//! Requests are validated, rate limited per client, routed to a provider by
//! model name and answered either as a single completion or as a relayed
//! server-sent event stream.

pub mod application;
pub mod config;
pub mod domain;
pub mod error;
pub mod providers;
pub mod proxy;

pub use application::Application;
pub use error::{Error, Result};
