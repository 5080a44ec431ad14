//! The catalog of stage factories a graph can be built from.

use std::fmt;

use tracing::trace;

use crate::{
    caps::Caps,
    error::{PipelineError, Result},
    stage::{Direction, Port, PropertyType, Stage, StageKind},
};

#[derive(Debug)]
pub struct PadTemplate {
    pub name: &'static str,
    pub direction: Direction,
    pub caps: &'static str,
}

#[derive(Debug)]
pub struct PropertySpec {
    pub name: &'static str,
    pub ty: PropertyType,
}

#[derive(Debug)]
pub struct Factory {
    pub name: &'static str,
    pub kind: StageKind,
    pub pads: &'static [PadTemplate],
    pub properties: &'static [PropertySpec],
}

const fn src(caps: &'static str) -> PadTemplate {
    PadTemplate {
        name: "src",
        direction: Direction::Output,
        caps,
    }
}

const fn sink(caps: &'static str) -> PadTemplate {
    PadTemplate {
        name: "sink",
        direction: Direction::Input,
        caps,
    }
}

const fn int(name: &'static str, min: i64, max: i64) -> PropertySpec {
    PropertySpec {
        name,
        ty: PropertyType::Int { min, max },
    }
}

const fn prop(name: &'static str, ty: PropertyType) -> PropertySpec {
    PropertySpec { name, ty }
}

const RTP_H264: &str = "application/x-rtp, media=video, clock-rate=90000, encoding-name=H264";

static CATALOG: &[Factory] = &[
    Factory {
        name: "udpsrc",
        kind: StageKind::Source,
        pads: &[src("ANY")],
        properties: &[
            int("port", 0, 65535),
            prop("address", PropertyType::Str),
            prop("caps", PropertyType::Caps),
            int("buffer-size", 0, i32::MAX as i64),
            int("timeout", 0, i64::MAX),
        ],
    },
    Factory {
        name: "capsfilter",
        kind: StageKind::Filter,
        pads: &[sink("ANY"), src("ANY")],
        properties: &[prop("caps", PropertyType::Caps)],
    },
    Factory {
        name: "rtpjitterbuffer",
        kind: StageKind::Buffer,
        pads: &[sink("application/x-rtp"), src("application/x-rtp")],
        properties: &[
            int("latency", 0, u32::MAX as i64),
            prop("drop-on-latency", PropertyType::Bool),
        ],
    },
    Factory {
        name: "rtph264depay",
        kind: StageKind::Depayloader,
        pads: &[sink(RTP_H264), src("video/x-h264")],
        properties: &[],
    },
    Factory {
        name: "avdec_h264",
        kind: StageKind::Decoder,
        pads: &[sink("video/x-h264"), src("video/x-raw")],
        properties: &[int("max-threads", 0, i32::MAX as i64)],
    },
    Factory {
        name: "videoconvert",
        kind: StageKind::Converter,
        pads: &[sink("video/x-raw"), src("video/x-raw")],
        properties: &[],
    },
    Factory {
        name: "autovideosink",
        kind: StageKind::Sink,
        pads: &[sink("video/x-raw")],
        properties: &[prop("sync", PropertyType::Bool)],
    },
];

type Probe = Box<dyn Fn(&str) -> bool + Send + Sync>;

/// Creates stages by factory name. A probe can further restrict the catalog
/// to what the running media framework actually provides.
pub struct Registry {
    factories: &'static [Factory],
    probe: Option<Probe>,
}

impl Registry {
    pub fn builtin() -> Self {
        Self {
            factories: CATALOG,
            probe: None,
        }
    }

    pub fn with_probe(mut self, probe: impl Fn(&str) -> bool + Send + Sync + 'static) -> Self {
        self.probe = Some(Box::new(probe));
        self
    }

    pub fn factory(&self, name: &str) -> Option<&'static Factory> {
        let factories = self.factories;
        factories.iter().find(|f| f.name == name)
    }

    pub fn factories(&self) -> impl Iterator<Item = &'static Factory> {
        self.factories.iter()
    }

    /// Instantiates a stage. Fails if the factory is unknown, unavailable, or
    /// `name` is empty.
    pub fn create(&self, factory: &str, name: &str) -> Result<Stage> {
        if name.is_empty() {
            return Err(PipelineError::creation(factory, name, "stage name is empty"));
        }

        let desc = self
            .factory(factory)
            .ok_or_else(|| PipelineError::creation(factory, name, "no such element kind"))?;

        if let Some(probe) = &self.probe {
            if !probe(desc.name) {
                return Err(PipelineError::creation(
                    factory,
                    name,
                    "element kind is not available in this runtime",
                ));
            }
        }

        let ports = desc
            .pads
            .iter()
            .map(|pad| {
                let caps = pad
                    .caps
                    .parse::<Caps>()
                    .map_err(|e| PipelineError::creation(factory, name, e.to_string()))?;
                Ok(Port::new(pad.name, pad.direction, caps))
            })
            .collect::<Result<Vec<_>>>()?;

        trace!("created {} '{name}' ({})", desc.kind, desc.name);

        Ok(Stage::new(name, desc.name, desc.kind, desc.properties, ports))
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field(
                "factories",
                &self.factories.iter().map(|f| f.name).collect::<Vec<_>>(),
            )
            .field("probe", &self.probe.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_kind_fails_creation() {
        let registry = Registry::builtin();

        for kind in ["", "udpsink", "x264enc", "UDPSRC"] {
            let err = registry.create(kind, "stage").unwrap_err();
            assert!(matches!(err, PipelineError::Creation { .. }), "{kind}");
        }
    }

    #[test]
    fn every_catalog_entry_is_creatable() {
        let registry = Registry::builtin();

        for factory in registry.factories() {
            let stage = registry.create(factory.name, factory.name).unwrap();
            assert_eq!(stage.kind(), factory.kind);
            assert_eq!(stage.ports().len(), factory.pads.len());
        }
    }

    #[test]
    fn probe_hides_unavailable_kinds() {
        let registry = Registry::builtin().with_probe(|kind| kind != "avdec_h264");

        assert!(registry.create("udpsrc", "source").is_ok());
        let err = registry.create("avdec_h264", "dec").unwrap_err();
        assert!(matches!(err, PipelineError::Creation { .. }));
    }

    #[test]
    fn empty_name_is_rejected() {
        assert!(Registry::builtin().create("udpsrc", "").is_err());
    }
}
