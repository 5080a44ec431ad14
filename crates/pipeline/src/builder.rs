//! Explicit, stage-by-stage graph construction.

use tracing::{debug, error, info};

use crate::{
    error::{PipelineError, Result},
    graph::Graph,
    registry::Registry,
    stage::{PropertyValue, Stage},
};

struct StageRequest {
    factory: String,
    name: String,
}

/// Collects the stages of a linear chain, then creates, adds, configures and
/// links them in one step. Either the whole chain ends up in the graph or none
/// of it does.
pub struct ChainBuilder<'r> {
    registry: &'r Registry,
    name: String,
    requests: Vec<StageRequest>,
    options: Vec<(String, String, PropertyValue)>,
}

impl<'r> ChainBuilder<'r> {
    pub fn new(registry: &'r Registry, name: impl Into<String>) -> Self {
        Self {
            registry,
            name: name.into(),
            requests: Vec::new(),
            options: Vec::new(),
        }
    }

    /// Appends a stage to the end of the chain.
    pub fn stage(mut self, factory: impl Into<String>, name: impl Into<String>) -> Self {
        self.requests.push(StageRequest {
            factory: factory.into(),
            name: name.into(),
        });
        self
    }

    pub fn option(
        mut self,
        stage: impl Into<String>,
        key: impl Into<String>,
        value: impl Into<PropertyValue>,
    ) -> Self {
        self.options.push((stage.into(), key.into(), value.into()));
        self
    }

    pub fn build(self) -> Result<Graph> {
        let mut graph = Graph::new(self.name.clone());
        self.build_into(&mut graph)?;
        Ok(graph)
    }

    /// Builds the chain inside an existing container. On failure the
    /// container is left holding exactly what it held before.
    pub fn build_into(self, graph: &mut Graph) -> Result<()> {
        let Self {
            registry,
            name,
            requests,
            options,
        } = self;

        debug!("creating {} stages for '{name}'", requests.len());

        let mut stages = Vec::with_capacity(requests.len());
        let mut first_err = None;

        for req in &requests {
            match registry.create(&req.factory, &req.name) {
                Ok(stage) => stages.push(stage),
                Err(err) => {
                    error!("{err}");
                    first_err.get_or_insert(err);
                }
            }
        }

        if let Some(err) = first_err {
            error!("not all elements could be created");
            return Err(err);
        }

        let mut added = Vec::with_capacity(stages.len());

        if let Err(err) = assemble(graph, stages, &options, &mut added) {
            for stage in added.iter().rev() {
                debug!("releasing '{stage}'");
                graph.remove(stage);
            }
            return Err(err);
        }

        info!("pipeline '{name}' is built and linked");
        Ok(())
    }
}

fn assemble(
    graph: &mut Graph,
    stages: Vec<Stage>,
    options: &[(String, String, PropertyValue)],
    added: &mut Vec<String>,
) -> Result<()> {
    for stage in stages {
        let name = stage.name().to_owned();
        graph.add(stage)?;
        added.push(name);
    }

    for (stage, key, value) in options {
        if !added.contains(stage) {
            return Err(PipelineError::NoSuchStage(stage.clone()));
        }

        graph
            .stage_mut(stage)
            .ok_or_else(|| PipelineError::NoSuchStage(stage.clone()))?
            .configure([(key, value.clone())])?;
    }

    debug!("linking...");

    let chain = added.iter().map(String::as_str).collect::<Vec<_>>();
    graph.link_many(&chain)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LinkFailure;

    fn chain<'a>(registry: &'a Registry, kinds: &[(&str, &str)]) -> ChainBuilder<'a> {
        kinds
            .iter()
            .fold(ChainBuilder::new(registry, "test"), |b, (kind, name)| {
                b.stage(*kind, *name)
            })
    }

    #[test]
    fn builds_linked_chain() {
        let registry = Registry::builtin();
        let graph = chain(
            &registry,
            &[
                ("udpsrc", "source"),
                ("rtpjitterbuffer", "jbuffer"),
                ("rtph264depay", "depayloader"),
            ],
        )
        .option("source", "port", 0)
        .build()
        .unwrap();

        assert_eq!(graph.len(), 3);
        assert_eq!(graph.chain().unwrap(), vec!["source", "jbuffer", "depayloader"]);
        assert_eq!(
            graph.stage("source").unwrap().property("port"),
            Some(&PropertyValue::Int(0))
        );
    }

    #[test]
    fn creation_failure_adds_nothing() {
        let registry = Registry::builtin().with_probe(|kind| kind != "avdec_h264");
        let mut graph = Graph::new("test");

        let err = chain(
            &registry,
            &[
                ("udpsrc", "source"),
                ("rtph264depay", "depayloader"),
                ("avdec_h264", "dec"),
                ("videoconvert", "vconvert"),
            ],
        )
        .build_into(&mut graph)
        .unwrap_err();

        assert!(matches!(err, PipelineError::Creation { .. }));
        assert!(graph.is_empty());
    }

    #[test]
    fn unknown_option_rolls_back() {
        let registry = Registry::builtin();
        let mut graph = Graph::new("test");

        let err = chain(&registry, &[("udpsrc", "source"), ("capsfilter", "capfilter")])
            .option("source", "no-such-option", 1)
            .build_into(&mut graph)
            .unwrap_err();

        assert!(matches!(err, PipelineError::Creation { .. }));
        assert!(graph.is_empty());
    }

    #[test]
    fn link_failure_rolls_back() {
        let registry = Registry::builtin();
        let mut graph = Graph::new("test");

        let err = chain(
            &registry,
            &[
                ("udpsrc", "source"),
                ("capsfilter", "capfilter"),
                ("avdec_h264", "dec"),
                ("rtph264depay", "depayloader"),
            ],
        )
        .option(
            "capfilter",
            "caps",
            "application/x-rtp, encoding-name=H264, payload=96",
        )
        .build_into(&mut graph)
        .unwrap_err();

        assert!(matches!(
            err,
            PipelineError::Link {
                reason: LinkFailure::Incompatible { .. },
                ..
            }
        ));
        assert!(graph.is_empty());
        assert!(graph.links().is_empty());
    }

    #[test]
    fn rollback_keeps_existing_stages() {
        let registry = Registry::builtin();
        let mut graph = Graph::new("test");
        graph
            .add(registry.create("udpsrc", "other").unwrap())
            .unwrap();

        let err = chain(&registry, &[("videoconvert", "other"), ("autovideosink", "sync")])
            .build_into(&mut graph)
            .unwrap_err();

        assert!(matches!(err, PipelineError::DuplicateStage(_)));
        assert_eq!(graph.len(), 1);
        assert_eq!(graph.stage("other").unwrap().factory(), "udpsrc");
    }
}
