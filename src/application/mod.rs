//! Application startup and serving
//!
//! Turns loaded settings into the proxy service and runs it until shutdown.

pub mod app;

pub use app::Application;
