//! Pagewire - session and request coordination for remotely driven,
//! page-oriented UI applications.
//!
//! A remote client sends sequence-numbered operations and navigation
//! requests; the server runs the application's render code against a
//! per-request context and streams UI operations back.

pub mod app;
pub mod background;
pub mod build_info;
pub mod config;
pub mod demo;
pub mod dispatcher;
pub mod error;
pub mod handlers;
pub mod layout;
pub mod menu;
pub mod request;
pub mod server;
pub mod session;
pub mod widget;

pub use pagewire_protocol as protocol;
