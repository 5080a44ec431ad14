use std::net::{SocketAddr, UdpSocket};

use tracing::{debug, info};

use super::Engine;
use crate::{
    bus::{BusSender, Event},
    error::{PipelineError, Result},
    graph::Graph,
    stage::{PropertyValue, StageKind},
};

/// Runs the lifecycle without a media framework. Sources that were given a
/// port bind it for as long as the graph plays; no media is processed.
#[derive(Debug, Default)]
pub struct SoftwareEngine {
    sockets: Vec<(String, UdpSocket)>,
}

impl SoftwareEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Where a playing source stage is listening.
    pub fn local_addr(&self, stage: &str) -> Option<SocketAddr> {
        self.sockets
            .iter()
            .find(|(name, _)| name == stage)
            .and_then(|(_, socket)| socket.local_addr().ok())
    }

    fn bind_sources(&mut self, graph: &Graph) -> Result<()> {
        for stage in graph.stages() {
            if stage.kind() != StageKind::Source {
                continue;
            }

            let port = match stage.property("port") {
                Some(PropertyValue::Int(port)) => *port as u16,
                _ => continue,
            };

            let address = match stage.property("address") {
                Some(PropertyValue::Str(address)) => address.as_str(),
                _ => "0.0.0.0",
            };

            let socket = UdpSocket::bind((address, port)).map_err(|err| PipelineError::Runtime {
                origin: stage.name().to_owned(),
                message: format!("could not bind {address}:{port}: {err}"),
            })?;

            info!(
                "{} listening on {}",
                stage.name(),
                socket
                    .local_addr()
                    .map(|a| a.to_string())
                    .unwrap_or_else(|_| format!("{address}:{port}"))
            );

            self.sockets.push((stage.name().to_owned(), socket));
        }

        Ok(())
    }
}

impl Engine for SoftwareEngine {
    fn name(&self) -> &'static str {
        "software"
    }

    fn play(&mut self, graph: &Graph, bus: BusSender) -> Result<()> {
        if let Err(err) = self.bind_sources(graph) {
            self.sockets.clear();
            return Err(err);
        }

        bus.post(Event::Other(format!(
            "{}: state changed from NULL to PLAYING",
            graph.name()
        )));

        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        for (name, _) in self.sockets.drain(..) {
            debug!("{name}: released socket");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{bus::Bus, ChainBuilder, Registry};

    fn source_graph(port: u16) -> Graph {
        ChainBuilder::new(&Registry::builtin(), "test")
            .stage("udpsrc", "source")
            .stage("rtpjitterbuffer", "jbuffer")
            .option("source", "port", port)
            .option("source", "address", "127.0.0.1")
            .build()
            .unwrap()
    }

    #[test]
    fn binds_while_playing() {
        let mut bus = Bus::new(8);
        let sub = bus.subscribe().unwrap();
        let mut engine = SoftwareEngine::new();

        engine.play(&source_graph(0), bus.sender()).unwrap();
        let addr = engine.local_addr("source").unwrap();
        assert_ne!(addr.port(), 0);
        assert!(matches!(sub.try_recv(), Some(Event::Other(_))));

        engine.stop().unwrap();
        assert!(engine.local_addr("source").is_none());
        engine.stop().unwrap();
    }

    #[test]
    fn port_in_use_is_a_runtime_error() {
        let taken = UdpSocket::bind("127.0.0.1:0").unwrap();
        let port = taken.local_addr().unwrap().port();

        let bus = Bus::new(8);
        let mut engine = SoftwareEngine::new();
        let err = engine.play(&source_graph(port), bus.sender()).unwrap_err();

        assert!(matches!(err, PipelineError::Runtime { .. }));
        assert!(engine.local_addr("source").is_none());
    }
}
