//! The two ways of building the Solo receive chain.
//!
//! Both produce the same seven-stage linear graph: UDP source, RTP caps
//! filter, jitter buffer, H.264 depayloader, decoder, colour converter and an
//! auto-selected display sink.

use sv_pipeline::{
    parse_launch, report, ChainBuilder, Graph, PipelineError, PropertyValue, Registry,
};

/// The port the Solo streams video to.
pub const DEFAULT_PORT: u16 = 5600;

/// What the Solo sends: H.264 over RTP, dynamic payload type 96.
pub const SOLO_CAPS: &str =
    "application/x-rtp, media=video, clock-rate=90000, encoding-name=H264, payload=96";

/// Stage names in the explicitly built chain, source first.
pub const STAGES: [(&str, &str); 7] = [
    ("udpsrc", "source"),
    ("capsfilter", "capfilter"),
    ("rtpjitterbuffer", "jbuffer"),
    ("rtph264depay", "depayloader"),
    ("avdec_h264", "dec"),
    ("videoconvert", "vconvert"),
    ("autovideosink", "sync"),
];

/// Builds the chain stage by stage. Nothing is left behind on failure.
pub fn explicit_chain(registry: &Registry, port: u16) -> Result<Graph, PipelineError> {
    let builder = STAGES
        .iter()
        .fold(ChainBuilder::new(registry, "solo-video"), |b, (factory, name)| {
            b.stage(*factory, *name)
        });

    builder
        .option("source", "port", port)
        .option("capfilter", "caps", SOLO_CAPS)
        .build()
}

/// What the explicit chain reports once it is linked: the caps on the
/// source's output and on both sides of the caps filter, then the UDP port
/// read back from the source.
pub fn diagnostics(graph: &Graph) -> Result<Vec<String>, PipelineError> {
    let mut lines = vec![
        report(graph, "source", "src")?,
        report(graph, "capfilter", "src")?,
        report(graph, "capfilter", "sink")?,
    ];

    let source = graph
        .stage("source")
        .ok_or_else(|| PipelineError::NoSuchStage("source".to_owned()))?;

    lines.push(match source.property("port") {
        Some(PropertyValue::Int(port)) => format!("UDP port: {port}"),
        _ => "UDP port: unset".to_owned(),
    });

    Ok(lines)
}

pub fn launch_description(port: u16) -> String {
    format!(
        "udpsrc port={port} ! application/x-rtp,encoding-name=H264,payload=96 \
         ! rtpjitterbuffer ! rtph264depay ! avdec_h264 ! videoconvert ! autovideosink"
    )
}

/// Builds the same chain from its textual description.
pub fn parsed_chain(registry: &Registry, port: u16) -> Result<Graph, PipelineError> {
    parse_launch(registry, &launch_description(port))
}
