//! Graph construction from a textual description such as
//! `udpsrc port=5600 ! application/x-rtp,payload=96 ! autovideosink`.

use std::collections::HashMap;

use tracing::{debug, error};

use crate::{
    caps::split_top_level,
    error::{PipelineError, Result},
    graph::Graph,
    registry::Registry,
};

/// Parses a `!`-separated chain into a linked graph. Any problem fails the
/// whole description; no partial graph is returned.
pub fn parse_launch(registry: &Registry, description: &str) -> Result<Graph> {
    debug!("parsing pipeline description: {description}");

    parse(registry, description).map_err(|reason| {
        error!("pipeline could not be built: {reason}");
        PipelineError::Parse(reason)
    })
}

fn parse(registry: &Registry, description: &str) -> std::result::Result<Graph, String> {
    if description.trim().is_empty() {
        return Err("empty pipeline description".to_owned());
    }

    let mut graph = Graph::new("pipeline0");
    let mut counters = HashMap::<String, usize>::new();
    let mut chain = Vec::new();

    for segment in split_top_level(description, |c| c == '!') {
        let segment = segment.trim();
        if segment.is_empty() {
            return Err("empty element in description".to_owned());
        }

        let tokens = split_top_level(segment, char::is_whitespace)
            .into_iter()
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>();

        let (factory, mut props) = if tokens[0].contains('/') {
            ("capsfilter", vec![("caps".to_owned(), segment.to_owned())])
        } else {
            let props = tokens[1..]
                .iter()
                .map(|tok| {
                    let (key, value) = tok
                        .split_once('=')
                        .ok_or_else(|| format!("'{tok}' is not a property assignment"))?;
                    Ok((key.trim().to_owned(), unquote(value.trim())))
                })
                .collect::<std::result::Result<Vec<_>, String>>()?;
            (tokens[0], props)
        };

        let name = match props.iter().position(|(k, _)| k == "name") {
            Some(i) => props.remove(i).1,
            None => default_name(&mut counters, factory),
        };

        let mut stage = registry.create(factory, &name).map_err(|err| match err {
            PipelineError::Creation { reason, .. } => format!("no element \"{factory}\" ({reason})"),
            other => other.to_string(),
        })?;

        stage
            .configure_lenient(props)
            .map_err(|err| err.to_string())?;

        graph.add(stage).map_err(|err| err.to_string())?;
        chain.push(name);
    }

    let chain = chain.iter().map(String::as_str).collect::<Vec<_>>();
    graph.link_many(&chain).map_err(|err| err.to_string())?;

    Ok(graph)
}

/// `udpsrc0`, `udpsrc1`, ... and `avdec_h264-0` for factories ending in a
/// digit.
fn default_name(counters: &mut HashMap<String, usize>, factory: &str) -> String {
    let n = counters.entry(factory.to_owned()).or_insert(0);
    let sep = if factory.ends_with(|c: char| c.is_ascii_digit()) {
        "-"
    } else {
        ""
    };
    let name = format!("{factory}{sep}{n}");
    *n += 1;
    name
}

fn unquote(value: &str) -> String {
    match value.strip_prefix('"').and_then(|v| v.strip_suffix('"')) {
        Some(inner) => inner.replace("\\\"", "\""),
        None => value.to_owned(),
    }
}
