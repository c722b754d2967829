//! Scroll of Seven Seals multiplayer backend.
//!
//! Session lifecycle, progress reporting and single-winner arbitration over
//! a shared realtime store, plus the client-side reporter and listener that
//! sit on top of the same store.

#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod app;
pub mod client;
pub mod common;
pub mod config;
pub mod handler;
pub mod service;
pub mod store;
pub mod util;

pub use app::App;
pub use common::ProtocolError;
pub use config::{GameConfig, ServerConfig};
