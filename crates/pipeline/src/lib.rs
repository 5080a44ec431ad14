//! Build, run and supervise linear streaming pipelines.
//!
//! A [`Graph`] is assembled either stage by stage with a [`ChainBuilder`] or
//! from a textual description with [`parse_launch`]. A [`Supervisor`] then
//! hands it to an [`Engine`], waits on the event bus for end-of-stream, an
//! error or an interrupt, and tears everything down.

pub mod builder;
pub mod bus;
pub mod caps;
pub mod describe;
pub mod engine;
pub mod error;
pub mod graph;
pub mod launch;
pub mod registry;
pub mod stage;
pub mod supervisor;

pub use builder::ChainBuilder;
pub use bus::{handle_event, Bus, BusSender, Event, Flow, Subscription};
pub use caps::{Caps, Structure, Value};
pub use describe::{describe, render_caps, report};
pub use engine::{Engine, SoftwareEngine};
pub use error::{LinkFailure, PipelineError};
pub use graph::{Graph, Link};
pub use launch::parse_launch;
pub use registry::Registry;
pub use stage::{Direction, Port, PropertyValue, Stage, StageKind};
pub use supervisor::{Outcome, Supervisor, SupervisorState, SupervisorTask};
