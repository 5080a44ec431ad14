//! Human-readable capability reports, used for diagnostics only.

use std::fmt::Write;

use crate::{caps::Caps, error::Result, graph::Graph};

/// Renders `caps` one structure per line, each line prefixed by `indent`.
/// Fields follow their structure on their own lines.
pub fn render_caps(caps: &Caps, indent: &str) -> String {
    if caps.is_any() {
        return format!("{indent}ANY\n");
    }

    if caps.is_empty() {
        return format!("{indent}EMPTY\n");
    }

    let mut out = String::new();

    for structure in caps.structures() {
        let _ = writeln!(out, "{indent}{}", structure.name());
        for (field, value) in structure.fields() {
            let _ = writeln!(out, "{indent}  {field:>15}: {value}");
        }
    }

    out
}

/// The negotiated caps of `stage:port`, or what it would accept if nothing
/// has been negotiated yet.
pub fn describe(graph: &Graph, stage: &str, port: &str, indent: &str) -> Result<String> {
    let resolved = graph.resolve_port(stage, port)?;

    let caps = match resolved.current() {
        Some(current) => current.clone(),
        None => graph.allowed_caps(stage, port)?,
    };

    Ok(render_caps(&caps, indent))
}

/// The full report printed after linking: a header naming the port followed
/// by its caps.
pub fn report(graph: &Graph, stage: &str, port: &str) -> Result<String> {
    Ok(format!(
        "Caps for the {port} pad:\n{}",
        describe(graph, stage, port, "      ")?
    ))
}
