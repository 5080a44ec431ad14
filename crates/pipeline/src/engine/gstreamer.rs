use std::fmt::Display;

use futures::StreamExt;
use gst::prelude::*;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use super::Engine;
use crate::{
    bus::{BusSender, Event},
    error::{LinkFailure, PipelineError, Result},
    graph::Graph,
    registry::Registry,
};

fn runtime_error(origin: impl Into<String>, err: impl Display) -> PipelineError {
    PipelineError::Runtime {
        origin: origin.into(),
        message: err.to_string(),
    }
}

/// Process-wide GStreamer initialisation. Acquire it once at startup and keep
/// it alive until every pipeline has been dropped.
pub struct Runtime {
    _private: (),
}

impl Runtime {
    pub fn acquire() -> Result<Self> {
        gst::init().map_err(|err| runtime_error("gstreamer", err))?;
        debug!("initialized {}", gst::version_string());
        Ok(Self { _private: () })
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        debug!("deinitializing gstreamer");
        // SAFETY: the runtime outlives every engine built from it, so no
        // GStreamer objects remain
        unsafe { gst::deinit() }
    }
}

/// Realizes graphs as real GStreamer pipelines.
pub struct GstEngine {
    pipeline: Option<gst::Pipeline>,
    forwarder: Option<JoinHandle<()>>,
}

impl GstEngine {
    pub fn new(_runtime: &Runtime) -> Self {
        Self {
            pipeline: None,
            forwarder: None,
        }
    }

    fn realize(graph: &Graph) -> Result<gst::Pipeline> {
        let pipeline = gst::Pipeline::new(Some(graph.name()));

        for stage in graph.stages() {
            let element = gst::ElementFactory::make(stage.factory(), Some(stage.name()))
                .map_err(|err| PipelineError::creation(stage.factory(), stage.name(), err.to_string()))?;

            for (key, value) in stage.properties() {
                element
                    .try_set_property_from_str(key, &value.to_string())
                    .map_err(|err| {
                        PipelineError::creation(
                            stage.factory(),
                            stage.name(),
                            format!("option '{key}': {err}"),
                        )
                    })?;
            }

            pipeline
                .add(&element)
                .map_err(|err| PipelineError::creation(stage.factory(), stage.name(), err.to_string()))?;
        }

        for link in graph.links() {
            let lookup = |name: &str| {
                pipeline.by_name(name).ok_or_else(|| {
                    PipelineError::link(
                        &link.upstream,
                        &link.downstream,
                        LinkFailure::MissingStage(name.to_owned()),
                    )
                })
            };

            let upstream = lookup(&link.upstream)?;
            let downstream = lookup(&link.downstream)?;

            upstream
                .link_pads(Some(&link.src_port), &downstream, Some(&link.sink_port))
                .map_err(|err| {
                    PipelineError::link(
                        &link.upstream,
                        &link.downstream,
                        LinkFailure::Refused(err.to_string()),
                    )
                })?;
        }

        Ok(pipeline)
    }
}

impl Engine for GstEngine {
    fn name(&self) -> &'static str {
        "gstreamer"
    }

    fn registry(&self) -> Registry {
        Registry::builtin().with_probe(|kind| gst::ElementFactory::find(kind).is_some())
    }

    fn play(&mut self, graph: &Graph, bus: BusSender) -> Result<()> {
        let pipeline = Self::realize(graph)?;

        let gst_bus = pipeline
            .bus()
            .ok_or_else(|| runtime_error(graph.name(), "pipeline has no bus"))?;
        let mut messages = gst_bus.stream();

        if let Err(err) = pipeline.set_state(gst::State::Playing) {
            let _ = pipeline.set_state(gst::State::Null);
            return Err(runtime_error(graph.name(), err));
        }

        self.forwarder = Some(tokio::spawn(async move {
            while let Some(msg) = messages.next().await {
                use gst::MessageView;

                let event = match msg.view() {
                    MessageView::Eos(..) => Event::Eos,
                    MessageView::Error(err) => Event::error(
                        err.src()
                            .map(|s| s.path_string().to_string())
                            .unwrap_or_else(|| "unknown".to_owned()),
                        err.error().to_string(),
                    ),
                    MessageView::Warning(w) => {
                        warn!("{}", w.error());
                        continue;
                    }
                    other => Event::Other(format!("{other:?}")),
                };

                let terminal = event.is_terminal();
                if !bus.post_async(event).await || terminal {
                    break;
                }
            }

            trace!("bus forwarder exited");
        }));

        self.pipeline = Some(pipeline);
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        if let Some(forwarder) = self.forwarder.take() {
            forwarder.abort();
        }

        if let Some(pipeline) = self.pipeline.take() {
            debug!("setting pipeline to NULL");
            pipeline
                .set_state(gst::State::Null)
                .map_err(|err| runtime_error(pipeline.name().to_string(), err))?;
        }

        Ok(())
    }
}
