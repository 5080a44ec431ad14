use std::fmt;

use tracing::{debug, warn};

use crate::{
    caps::Caps,
    error::{PipelineError, Result},
    registry::PropertySpec,
};

/// The fixed catalog of roles a stage can play in a chain.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum StageKind {
    Source,
    Filter,
    Buffer,
    Depayloader,
    Decoder,
    Converter,
    Sink,
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StageKind::Source => "source",
            StageKind::Filter => "filter",
            StageKind::Buffer => "buffer",
            StageKind::Depayloader => "depayloader",
            StageKind::Decoder => "decoder",
            StageKind::Converter => "converter",
            StageKind::Sink => "sink",
        })
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Direction {
    Input,
    Output,
}

#[derive(Clone, Debug)]
pub struct Port {
    name: String,
    direction: Direction,
    template: Caps,
    current: Option<Caps>,
}

impl Port {
    pub(crate) fn new(name: &str, direction: Direction, template: Caps) -> Self {
        Self {
            name: name.to_owned(),
            direction,
            template,
            current: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Everything this port could ever accept.
    pub fn template(&self) -> &Caps {
        &self.template
    }

    /// The format agreed with the peer, once the graph has started.
    pub fn current(&self) -> Option<&Caps> {
        self.current.as_ref()
    }

    pub(crate) fn set_current(&mut self, caps: Option<Caps>) {
        self.current = caps;
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum PropertyValue {
    Int(i64),
    Bool(bool),
    Str(String),
    Caps(Caps),
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Int(v) => write!(f, "{v}"),
            PropertyValue::Bool(v) => write!(f, "{v}"),
            PropertyValue::Str(v) => f.write_str(v),
            PropertyValue::Caps(v) => write!(f, "{v}"),
        }
    }
}

impl From<i64> for PropertyValue {
    fn from(v: i64) -> Self {
        PropertyValue::Int(v)
    }
}

impl From<i32> for PropertyValue {
    fn from(v: i32) -> Self {
        PropertyValue::Int(v.into())
    }
}

impl From<u16> for PropertyValue {
    fn from(v: u16) -> Self {
        PropertyValue::Int(v.into())
    }
}

impl From<bool> for PropertyValue {
    fn from(v: bool) -> Self {
        PropertyValue::Bool(v)
    }
}

impl From<&str> for PropertyValue {
    fn from(v: &str) -> Self {
        PropertyValue::Str(v.to_owned())
    }
}

impl From<String> for PropertyValue {
    fn from(v: String) -> Self {
        PropertyValue::Str(v)
    }
}

impl From<Caps> for PropertyValue {
    fn from(v: Caps) -> Self {
        PropertyValue::Caps(v)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PropertyType {
    Int { min: i64, max: i64 },
    Bool,
    Str,
    Caps,
}

impl PropertyType {
    /// Checks `value` against this type. Strings are converted, which is how
    /// values from textual descriptions arrive.
    pub fn coerce(&self, value: PropertyValue) -> std::result::Result<PropertyValue, String> {
        match (self, value) {
            (PropertyType::Int { min, max }, PropertyValue::Int(v)) => {
                if (*min..=*max).contains(&v) {
                    Ok(PropertyValue::Int(v))
                } else {
                    Err(format!("{v} is outside [{min}, {max}]"))
                }
            }
            (ty @ PropertyType::Int { .. }, PropertyValue::Str(s)) => {
                let v = s
                    .trim()
                    .parse::<i64>()
                    .map_err(|_| format!("'{s}' is not an integer"))?;
                ty.coerce(PropertyValue::Int(v))
            }
            (PropertyType::Bool, PropertyValue::Bool(v)) => Ok(PropertyValue::Bool(v)),
            (PropertyType::Bool, PropertyValue::Str(s)) => match s.trim() {
                "true" | "yes" | "1" => Ok(PropertyValue::Bool(true)),
                "false" | "no" | "0" => Ok(PropertyValue::Bool(false)),
                _ => Err(format!("'{s}' is not a boolean")),
            },
            (PropertyType::Str, PropertyValue::Str(s)) => Ok(PropertyValue::Str(s)),
            (PropertyType::Caps, PropertyValue::Caps(c)) => Ok(PropertyValue::Caps(c)),
            (PropertyType::Caps, PropertyValue::Str(s)) => s
                .parse::<Caps>()
                .map(PropertyValue::Caps)
                .map_err(|e| e.to_string()),
            (ty, value) => Err(format!("expected {ty:?}, got '{value}'")),
        }
    }
}

/// A named, configured processing unit. Stages are produced by
/// [`Registry::create`](crate::Registry::create) and owned by a graph.
#[derive(Clone, Debug)]
pub struct Stage {
    name: String,
    factory: &'static str,
    kind: StageKind,
    specs: &'static [PropertySpec],
    properties: Vec<(String, PropertyValue)>,
    ports: Vec<Port>,
}

impl Stage {
    pub(crate) fn new(
        name: &str,
        factory: &'static str,
        kind: StageKind,
        specs: &'static [PropertySpec],
        ports: Vec<Port>,
    ) -> Self {
        Self {
            name: name.to_owned(),
            factory,
            kind,
            specs,
            properties: Vec::new(),
            ports,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn factory(&self) -> &'static str {
        self.factory
    }

    pub fn kind(&self) -> StageKind {
        self.kind
    }

    /// Applies options, rejecting unknown keys.
    pub fn configure<I, K, V>(&mut self, options: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<PropertyValue>,
    {
        for (key, value) in options {
            self.set(key.as_ref(), value.into(), true)?;
        }
        Ok(())
    }

    /// Applies options, skipping unknown keys with a warning. Badly typed
    /// values are still rejected.
    pub fn configure_lenient<I, K, V>(&mut self, options: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<PropertyValue>,
    {
        for (key, value) in options {
            self.set(key.as_ref(), value.into(), false)?;
        }
        Ok(())
    }

    fn set(&mut self, key: &str, value: PropertyValue, strict: bool) -> Result<()> {
        let specs = self.specs;
        let spec = match specs.iter().find(|s| s.name == key) {
            Some(spec) => spec,
            None if strict => {
                return Err(PipelineError::creation(
                    self.factory,
                    &self.name,
                    format!("unknown option '{key}'"),
                ))
            }
            None => {
                warn!("no property '{key}' in element '{}', ignoring", self.name);
                return Ok(());
            }
        };

        let value = spec.ty.coerce(value).map_err(|reason| {
            PipelineError::creation(self.factory, &self.name, format!("option '{key}': {reason}"))
        })?;

        debug!("{}: {key}={value}", self.name);

        if let PropertyValue::Caps(caps) = &value {
            for port in &mut self.ports {
                port.template = caps.clone();
            }
        }

        match self.properties.iter_mut().find(|(k, _)| k == key) {
            Some(slot) => slot.1 = value,
            None => self.properties.push((key.to_owned(), value)),
        }

        Ok(())
    }

    pub fn property(&self, key: &str) -> Option<&PropertyValue> {
        self.properties
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    /// Properties in the order they were set.
    pub fn properties(&self) -> impl Iterator<Item = (&str, &PropertyValue)> {
        self.properties.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn ports(&self) -> &[Port] {
        &self.ports
    }

    pub fn port(&self, name: &str) -> Option<&Port> {
        self.ports.iter().find(|p| p.name == name)
    }

    pub(crate) fn ports_mut(&mut self) -> &mut [Port] {
        &mut self.ports
    }

    pub(crate) fn port_mut(&mut self, name: &str) -> Option<&mut Port> {
        self.ports.iter_mut().find(|p| p.name == name)
    }

    pub fn output(&self) -> Option<&Port> {
        self.ports.iter().find(|p| p.direction == Direction::Output)
    }

    pub fn input(&self) -> Option<&Port> {
        self.ports.iter().find(|p| p.direction == Direction::Input)
    }
}
