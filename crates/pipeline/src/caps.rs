//! Capability sets: the structured data formats a port accepts or has
//! negotiated.

use std::{fmt, str::FromStr};

use thiserror::Error;

#[derive(Debug, Error)]
#[error("invalid caps '{input}': {reason}")]
pub struct CapsParseError {
    pub input: String,
    pub reason: String,
}

impl CapsParseError {
    fn new(input: &str, reason: impl Into<String>) -> Self {
        Self {
            input: input.to_owned(),
            reason: reason.into(),
        }
    }
}

/// A single field value inside a caps structure.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Value {
    Int(i64),
    Bool(bool),
    Str(String),
    /// Inclusive integer range, `[ min, max ]`.
    IntRange(i64, i64),
    /// Any one of the listed values, `{ a, b }`.
    List(Vec<Value>),
}

impl Value {
    /// Parses a field value, honouring an optional `(type)` annotation.
    pub fn parse(src: &str) -> Result<Self, CapsParseError> {
        let src = src.trim();

        let (ty, body) = match src.strip_prefix('(') {
            Some(rest) => {
                let end = rest
                    .find(')')
                    .ok_or_else(|| CapsParseError::new(src, "unterminated type annotation"))?;
                (Some(rest[..end].trim()), rest[end + 1..].trim())
            }
            None => (None, src),
        };

        if body.is_empty() {
            return Err(CapsParseError::new(src, "missing value"));
        }

        if let Some(inner) = body.strip_prefix('[').and_then(|b| b.strip_suffix(']')) {
            let bounds = split_top_level(inner, |c| c == ',');
            if bounds.len() != 2 {
                return Err(CapsParseError::new(src, "a range needs exactly two bounds"));
            }

            let parse_bound = |b: &str| {
                b.trim()
                    .parse::<i64>()
                    .map_err(|_| CapsParseError::new(src, "range bounds must be integers"))
            };
            let (min, max) = (parse_bound(bounds[0])?, parse_bound(bounds[1])?);
            if min > max {
                return Err(CapsParseError::new(src, "range minimum exceeds maximum"));
            }

            return Ok(Value::IntRange(min, max));
        }

        if let Some(inner) = body.strip_prefix('{').and_then(|b| b.strip_suffix('}')) {
            let items = split_top_level(inner, |c| c == ',')
                .into_iter()
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(Value::parse)
                .collect::<Result<Vec<_>, _>>()?;

            if items.is_empty() {
                return Err(CapsParseError::new(src, "empty value list"));
            }

            return Ok(Value::List(items));
        }

        if let Some(quoted) = body.strip_prefix('"').and_then(|b| b.strip_suffix('"')) {
            return Ok(Value::Str(quoted.replace("\\\"", "\"")));
        }

        match ty {
            Some("int") | Some("i") | Some("uint") | Some("u") => body
                .parse::<i64>()
                .map(Value::Int)
                .map_err(|_| CapsParseError::new(src, "expected an integer")),
            Some("boolean") | Some("bool") | Some("b") => body
                .parse::<bool>()
                .map(Value::Bool)
                .map_err(|_| CapsParseError::new(src, "expected a boolean")),
            Some("string") | Some("s") => Ok(Value::Str(body.to_owned())),
            Some(other) => Err(CapsParseError::new(
                src,
                format!("unsupported type annotation '{other}'"),
            )),
            None => Ok(if let Ok(v) = body.parse::<i64>() {
                Value::Int(v)
            } else if let Ok(v) = body.parse::<bool>() {
                Value::Bool(v)
            } else {
                Value::Str(body.to_owned())
            }),
        }
    }

    /// Returns the subset of values acceptable to both sides, if any.
    pub fn intersect(&self, other: &Value) -> Option<Value> {
        use Value::*;

        match (self, other) {
            (List(items), _) => collapse(items.iter().filter_map(|v| v.intersect(other)).collect()),
            (_, List(_)) => other.intersect(self),
            (IntRange(a_min, a_max), IntRange(b_min, b_max)) => {
                let (min, max) = (*a_min.max(b_min), *a_max.min(b_max));
                match min.cmp(&max) {
                    std::cmp::Ordering::Greater => None,
                    std::cmp::Ordering::Equal => Some(Int(min)),
                    std::cmp::Ordering::Less => Some(IntRange(min, max)),
                }
            }
            (Int(v), IntRange(min, max)) | (IntRange(min, max), Int(v)) => {
                (min..=max).contains(&v).then(|| Int(*v))
            }
            (a, b) if a == b => Some(a.clone()),
            _ => None,
        }
    }
}

fn collapse(mut hits: Vec<Value>) -> Option<Value> {
    match hits.len() {
        0 => None,
        1 => hits.pop(),
        _ => Some(Value::List(hits)),
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{v}"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Str(s) => {
                let needs_quotes = s.is_empty()
                    || s
                        .chars()
                        .any(|c| c.is_whitespace() || matches!(c, ',' | ';' | '=' | '"' | '!'));
                if needs_quotes {
                    write!(f, "\"{}\"", s.replace('"', "\\\""))
                } else {
                    f.write_str(s)
                }
            }
            Value::IntRange(min, max) => write!(f, "[ {min}, {max} ]"),
            Value::List(items) => {
                f.write_str("{ ")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str(" }")
            }
        }
    }
}

/// A media type name plus an ordered list of constrained fields.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Structure {
    name: String,
    fields: Vec<(String, Value)>,
}

impl Structure {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    /// Sets `key`, replacing any previous value in place.
    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        let key = key.into();
        match self.fields.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((key, value)),
        }
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn intersect(&self, other: &Structure) -> Option<Structure> {
        if self.name != other.name {
            return None;
        }

        let mut fields = Vec::with_capacity(self.fields.len() + other.fields.len());

        for (key, value) in &self.fields {
            match other.get(key) {
                Some(theirs) => fields.push((key.clone(), value.intersect(theirs)?)),
                None => fields.push((key.clone(), value.clone())),
            }
        }

        for (key, value) in &other.fields {
            if self.get(key).is_none() {
                fields.push((key.clone(), value.clone()));
            }
        }

        Some(Structure {
            name: self.name.clone(),
            fields,
        })
    }
}

impl FromStr for Structure {
    type Err = CapsParseError;

    fn from_str(src: &str) -> Result<Self, Self::Err> {
        let mut parts = split_top_level(src, |c| c == ',').into_iter().map(str::trim);

        let name = parts.next().unwrap_or_default();
        if name.is_empty() || name.contains('=') {
            return Err(CapsParseError::new(src, "missing media type name"));
        }

        let mut structure = Structure::new(name);

        for part in parts.filter(|p| !p.is_empty()) {
            let (key, value) = part
                .split_once('=')
                .ok_or_else(|| CapsParseError::new(src, format!("field '{part}' has no value")))?;

            let key = key.trim();
            if key.is_empty() {
                return Err(CapsParseError::new(src, "empty field name"));
            }

            structure = structure.with_field(key, Value::parse(value)?);
        }

        Ok(structure)
    }
}

impl fmt::Display for Structure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        for (key, value) in &self.fields {
            write!(f, ", {key}={value}")?;
        }
        Ok(())
    }
}

/// A capability set. `Formats` with no structures is the empty set, which
/// accepts nothing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Caps {
    Any,
    Formats(Vec<Structure>),
}

impl Caps {
    pub fn any() -> Self {
        Caps::Any
    }

    pub fn empty() -> Self {
        Caps::Formats(Vec::new())
    }

    pub fn is_any(&self) -> bool {
        matches!(self, Caps::Any)
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Caps::Formats(s) if s.is_empty())
    }

    /// The concrete alternatives; empty for both `ANY` and `EMPTY`.
    pub fn structures(&self) -> &[Structure] {
        match self {
            Caps::Any => &[],
            Caps::Formats(s) => s,
        }
    }

    pub fn intersect(&self, other: &Caps) -> Caps {
        match (self, other) {
            (Caps::Any, caps) | (caps, Caps::Any) => caps.clone(),
            (Caps::Formats(ours), Caps::Formats(theirs)) => {
                let mut out: Vec<Structure> = Vec::new();
                for a in ours {
                    for b in theirs {
                        if let Some(s) = a.intersect(b) {
                            if !out.contains(&s) {
                                out.push(s);
                            }
                        }
                    }
                }
                Caps::Formats(out)
            }
        }
    }

    pub fn can_intersect(&self, other: &Caps) -> bool {
        !self.intersect(other).is_empty()
    }
}

impl From<Structure> for Caps {
    fn from(s: Structure) -> Self {
        Caps::Formats(vec![s])
    }
}

impl FromStr for Caps {
    type Err = CapsParseError;

    fn from_str(src: &str) -> Result<Self, Self::Err> {
        match src.trim() {
            "ANY" => return Ok(Caps::Any),
            "EMPTY" | "NONE" => return Ok(Caps::empty()),
            _ => {}
        }

        let structures = split_top_level(src, |c| c == ';')
            .into_iter()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::parse)
            .collect::<Result<Vec<Structure>, _>>()?;

        if structures.is_empty() {
            return Err(CapsParseError::new(src, "no structures"));
        }

        Ok(Caps::Formats(structures))
    }
}

impl fmt::Display for Caps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Caps::Any => f.write_str("ANY"),
            Caps::Formats(s) if s.is_empty() => f.write_str("EMPTY"),
            Caps::Formats(s) => {
                for (i, structure) in s.iter().enumerate() {
                    if i > 0 {
                        f.write_str("; ")?;
                    }
                    write!(f, "{structure}")?;
                }
                Ok(())
            }
        }
    }
}

/// Splits `input` on delimiters that are outside quotes and brackets.
pub(crate) fn split_top_level(input: &str, is_delim: impl Fn(char) -> bool) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut quoted = false;
    let mut escaped = false;
    let mut start = 0;

    for (i, c) in input.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }

        match c {
            '\\' if quoted => escaped = true,
            '"' => quoted = !quoted,
            '[' | '{' | '(' if !quoted => depth += 1,
            ']' | '}' | ')' if !quoted => depth = depth.saturating_sub(1),
            c if !quoted && depth == 0 && is_delim(c) => {
                parts.push(&input[start..i]);
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }

    parts.push(&input[start..]);
    parts
}
