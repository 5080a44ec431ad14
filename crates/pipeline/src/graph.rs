use tracing::{debug, trace};

use crate::{
    caps::Caps,
    error::{LinkFailure, PipelineError, Result},
    stage::{Port, Stage},
};

/// A directed connection from an output port to an input port.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Link {
    pub upstream: String,
    pub src_port: String,
    pub downstream: String,
    pub sink_port: String,
}

/// The container that owns every stage and link of one pipeline.
#[derive(Debug)]
pub struct Graph {
    name: String,
    stages: Vec<Stage>,
    links: Vec<Link>,
}

impl Graph {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stages: Vec::new(),
            links: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stages in the order they were added.
    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn links(&self) -> &[Link] {
        &self.links
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn stage(&self, name: &str) -> Option<&Stage> {
        self.stages.iter().find(|s| s.name() == name)
    }

    pub fn stage_mut(&mut self, name: &str) -> Option<&mut Stage> {
        self.stages.iter_mut().find(|s| s.name() == name)
    }

    pub fn add(&mut self, stage: Stage) -> Result<()> {
        if self.stage(stage.name()).is_some() {
            return Err(PipelineError::DuplicateStage(stage.name().to_owned()));
        }

        trace!("{}: added '{}'", self.name, stage.name());
        self.stages.push(stage);
        Ok(())
    }

    /// Takes a stage out of the graph along with every link touching it.
    pub fn remove(&mut self, name: &str) -> Option<Stage> {
        let index = self.stages.iter().position(|s| s.name() == name)?;

        self.links
            .retain(|l| l.upstream != name && l.downstream != name);

        trace!("{}: removed '{name}'", self.name);
        Some(self.stages.remove(index))
    }

    /// Links the first output port of `upstream` to the first input port of
    /// `downstream`. Both must already be in this graph and their port
    /// templates must intersect.
    pub fn link(&mut self, upstream: &str, downstream: &str) -> Result<()> {
        let fail = |reason| PipelineError::link(upstream, downstream, reason);

        let up = self
            .stage(upstream)
            .ok_or_else(|| fail(LinkFailure::MissingStage(upstream.to_owned())))?;
        let down = self
            .stage(downstream)
            .ok_or_else(|| fail(LinkFailure::MissingStage(downstream.to_owned())))?;

        if upstream == downstream {
            return Err(fail(LinkFailure::SelfLink));
        }

        let src = up.output().ok_or_else(|| fail(LinkFailure::NoOutput))?;
        let sink = down.input().ok_or_else(|| fail(LinkFailure::NoInput))?;

        if self.peer_link(upstream, src.name()).is_some() {
            return Err(fail(LinkFailure::AlreadyLinked(format!(
                "{upstream}:{}",
                src.name()
            ))));
        }

        if self.peer_link(downstream, sink.name()).is_some() {
            return Err(fail(LinkFailure::AlreadyLinked(format!(
                "{downstream}:{}",
                sink.name()
            ))));
        }

        if !src.template().can_intersect(sink.template()) {
            return Err(fail(LinkFailure::Incompatible {
                upstream: src.template().to_string(),
                downstream: sink.template().to_string(),
            }));
        }

        let link = Link {
            upstream: upstream.to_owned(),
            src_port: src.name().to_owned(),
            downstream: downstream.to_owned(),
            sink_port: sink.name().to_owned(),
        };

        debug!("linked {upstream}:{} -> {downstream}:{}", link.src_port, link.sink_port);
        self.links.push(link);
        Ok(())
    }

    /// Links each stage to the next, stopping at the first failure.
    pub fn link_many(&mut self, names: &[&str]) -> Result<()> {
        for pair in names.windows(2) {
            self.link(pair[0], pair[1])?;
        }
        Ok(())
    }

    fn peer_link(&self, stage: &str, port: &str) -> Option<&Link> {
        self.links.iter().find(|l| {
            (l.upstream == stage && l.src_port == port)
                || (l.downstream == stage && l.sink_port == port)
        })
    }

    /// The stage and port on the other end of a link, if `stage:port` is
    /// linked.
    pub fn peer(&self, stage: &str, port: &str) -> Option<(&Stage, &Port)> {
        let link = self.peer_link(stage, port)?;

        let (peer, peer_port) = if link.upstream == stage {
            (&link.downstream, &link.sink_port)
        } else {
            (&link.upstream, &link.src_port)
        };

        let peer = self.stage(peer)?;
        Some((peer, peer.port(peer_port)?))
    }

    /// What the port could accept given its own template and, when linked,
    /// its peer's.
    pub fn allowed_caps(&self, stage: &str, port: &str) -> Result<Caps> {
        let own = self.resolve_port(stage, port)?;

        Ok(match self.peer(stage, port) {
            Some((_, peer)) => own.template().intersect(peer.template()),
            None => own.template().clone(),
        })
    }

    pub(crate) fn resolve_port(&self, stage: &str, port: &str) -> Result<&Port> {
        self.stage(stage)
            .ok_or_else(|| PipelineError::NoSuchStage(stage.to_owned()))?
            .port(port)
            .ok_or_else(|| PipelineError::NoSuchPort {
                stage: stage.to_owned(),
                port: port.to_owned(),
            })
    }

    /// Fixes the format on both ends of every link.
    pub fn negotiate(&mut self) {
        let agreed = self
            .links
            .iter()
            .filter_map(|link| {
                let caps = self.allowed_caps(&link.upstream, &link.src_port).ok()?;
                Some((link.clone(), caps))
            })
            .collect::<Vec<_>>();

        for (link, caps) in agreed {
            trace!(
                "negotiated {}:{} -> {}:{}: {caps}",
                link.upstream,
                link.src_port,
                link.downstream,
                link.sink_port
            );

            if let Some(port) = self
                .stage_mut(&link.upstream)
                .and_then(|s| s.port_mut(&link.src_port))
            {
                port.set_current(Some(caps.clone()));
            }

            if let Some(port) = self
                .stage_mut(&link.downstream)
                .and_then(|s| s.port_mut(&link.sink_port))
            {
                port.set_current(Some(caps));
            }
        }
    }

    /// Forgets negotiated formats, as when the graph returns to idle.
    pub fn reset_negotiation(&mut self) {
        for port in self.stages.iter_mut().flat_map(|s| s.ports_mut()) {
            port.set_current(None);
        }
    }

    /// Stage names from the head of the chain to its tail, or `None` if the
    /// graph is not a single unbranched chain.
    pub fn chain(&self) -> Option<Vec<&str>> {
        if self.stages.is_empty() || self.links.len() + 1 != self.stages.len() {
            return None;
        }

        let head = self
            .stages
            .iter()
            .find(|s| !self.links.iter().any(|l| l.downstream == s.name()))?;

        let mut order = vec![head.name()];
        let mut current = head.name();

        while let Some(next) = self
            .links
            .iter()
            .find(|l| l.upstream == current)
            .map(|l| l.downstream.as_str())
        {
            if order.contains(&next) {
                return None;
            }
            order.push(next);
            current = next;
        }

        (order.len() == self.stages.len()).then(|| order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Registry;

    fn graph_of(kinds: &[(&str, &str)]) -> Graph {
        let registry = Registry::builtin();
        let mut graph = Graph::new("test");
        for (kind, name) in kinds {
            graph.add(registry.create(kind, name).unwrap()).unwrap();
        }
        graph
    }

    #[test]
    fn link_requires_both_stages() {
        let mut graph = graph_of(&[("udpsrc", "source")]);

        let err = graph.link("source", "ghost").unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Link {
                reason: LinkFailure::MissingStage(_),
                ..
            }
        ));
        assert!(graph.links().is_empty());
    }

    #[test]
    fn link_is_order_sensitive() {
        let mut graph = graph_of(&[("rtph264depay", "depayloader"), ("avdec_h264", "dec")]);

        let err = graph.link("dec", "depayloader").unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Link {
                reason: LinkFailure::Incompatible { .. },
                ..
            }
        ));

        graph.link("depayloader", "dec").unwrap();
    }

    #[test]
    fn sinks_cannot_feed_and_ports_link_once() {
        let mut graph = graph_of(&[
            ("videoconvert", "vconvert"),
            ("autovideosink", "sink-a"),
            ("autovideosink", "sink-b"),
        ]);

        assert!(graph.link("sink-a", "vconvert").is_err());
        graph.link("vconvert", "sink-a").unwrap();

        let err = graph.link("vconvert", "sink-b").unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Link {
                reason: LinkFailure::AlreadyLinked(_),
                ..
            }
        ));
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let mut graph = graph_of(&[("udpsrc", "source")]);
        let again = Registry::builtin().create("udpsrc", "source").unwrap();
        assert!(matches!(
            graph.add(again),
            Err(PipelineError::DuplicateStage(_))
        ));
    }

    #[test]
    fn remove_drops_touching_links() {
        let mut graph = graph_of(&[("avdec_h264", "dec"), ("videoconvert", "vconvert")]);
        graph.link("dec", "vconvert").unwrap();

        assert!(graph.remove("vconvert").is_some());
        assert!(graph.links().is_empty());
        assert!(graph.remove("vconvert").is_none());
    }

    #[test]
    fn negotiation_sets_current_caps() {
        let mut graph = graph_of(&[("avdec_h264", "dec"), ("videoconvert", "vconvert")]);
        graph.link("dec", "vconvert").unwrap();

        assert!(graph.resolve_port("dec", "src").unwrap().current().is_none());
        graph.negotiate();

        let current = graph.resolve_port("vconvert", "sink").unwrap().current().unwrap();
        assert_eq!(current.structures()[0].name(), "video/x-raw");

        graph.reset_negotiation();
        assert!(graph.resolve_port("vconvert", "sink").unwrap().current().is_none());
    }

    #[test]
    fn chain_reports_linear_order() {
        let mut graph = graph_of(&[
            ("videoconvert", "vconvert"),
            ("avdec_h264", "dec"),
            ("autovideosink", "sync"),
        ]);
        assert!(graph.chain().is_none());

        graph.link_many(&["dec", "vconvert", "sync"]).unwrap();
        assert_eq!(graph.chain().unwrap(), vec!["dec", "vconvert", "sync"]);
    }
}
