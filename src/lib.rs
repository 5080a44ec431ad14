//! Receives the Solo's H.264 video stream over UDP and displays it.
//!
//! The `solo-stream` binary assembles the receive chain stage by stage and
//! `solo-stream2` parses it from a textual description; both share the
//! configuration, logging and supervision set up here.

pub mod cli;
pub mod config;
pub mod logging;
pub mod run;
pub mod solo;

pub use config::{EngineKind, SoloVideoConfig};
pub use run::{run, supervise};
