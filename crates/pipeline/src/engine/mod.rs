//! The media framework behind a graph. The supervisor only ever asks an
//! engine to bring a built graph up and to tear it down again.

use crate::{bus::BusSender, error::Result, graph::Graph, registry::Registry};

#[cfg(feature = "gstreamer")]
pub mod gstreamer;
pub mod software;

pub use software::SoftwareEngine;

pub trait Engine: Send {
    fn name(&self) -> &'static str;

    /// The stage kinds this engine can realize.
    fn registry(&self) -> Registry {
        Registry::builtin()
    }

    /// Realizes `graph` and starts data flowing. Events raised while the graph
    /// runs are posted to `bus`.
    fn play(&mut self, graph: &Graph, bus: BusSender) -> Result<()>;

    /// Returns everything to the idle state. Must be safe to call when
    /// nothing is playing.
    fn stop(&mut self) -> Result<()>;
}

impl<E: Engine + ?Sized> Engine for Box<E> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn registry(&self) -> Registry {
        (**self).registry()
    }

    fn play(&mut self, graph: &Graph, bus: BusSender) -> Result<()> {
        (**self).play(graph, bus)
    }

    fn stop(&mut self) -> Result<()> {
        (**self).stop()
    }
}
