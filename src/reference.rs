//! Reference strings.
//!
//! A reference is a string starting with `:` that points to another value in the
//! same graph. `:./` and `:../` prefixes make it relative to the referencing node;
//! anything else after the colon is resolved from the graph root.
//!
//! ```text
//! :./frequency          sibling field
//! :../resonator.xy      up one level, then down
//! :qubits[0].xy         absolute, with a list index
//! :wiring['q1']         absolute, with a quoted dict key
//! ```

use crate::error::QuamError;
use std::fmt;

pub const REFERENCE_PREFIX: char = ':';
pub const DEFAULT_SPLITTERS: [char; 2] = ['.', '['];

pub fn is_reference(s: &str) -> bool {
    s.starts_with(REFERENCE_PREFIX)
}

pub fn is_absolute_reference(s: &str) -> bool {
    is_reference(s) && !s.starts_with(":.")
}

/// Split off the next attribute name, up to the earliest splitter character.
///
/// The remainder keeps the splitter. Without any splitter the whole string is the head.
pub fn split_next_attribute<'a>(s: &'a str, splitters: &[char]) -> (&'a str, &'a str) {
    match s.find(|c| splitters.contains(&c)) {
        Some(idx) => (&s[..idx], &s[idx..]),
        None => (s, ""),
    }
}

fn is_segment(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Parent,
    Current,
    Attr(String),
    Item(String),
}

impl Step {
    pub fn key(&self) -> Option<&str> {
        match self {
            Step::Attr(name) | Step::Item(name) => Some(name),
            Step::Parent | Step::Current => None,
        }
    }
}

/// Parsed form of a reference string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub absolute: bool,
    pub steps: Vec<Step>,
}

impl Reference {
    pub fn parse(s: &str) -> Result<Self, QuamError> {
        if !is_reference(s) {
            return Err(QuamError::invalid_reference(s, "not a reference"));
        }
        let absolute = is_absolute_reference(s);

        let mut rest = &s[REFERENCE_PREFIX.len_utf8()..];
        if absolute {
            rest = rest.strip_prefix('/').unwrap_or(rest);
        }

        let mut steps = Vec::new();
        while !rest.is_empty() {
            if let Some(tail) = rest.strip_prefix("../") {
                steps.push(Step::Parent);
                rest = tail;
            } else if let Some(tail) = rest.strip_prefix("./") {
                steps.push(Step::Current);
                rest = tail;
            } else if rest.starts_with('[') {
                let close = rest
                    .find(']')
                    .ok_or_else(|| QuamError::invalid_reference(s, "unclosed '['"))?;
                let key = rest[1..close].trim_matches(|c| c == '\'' || c == '"');
                steps.push(Step::Item(key.to_string()));
                rest = &rest[close + 1..];
            } else if let Some(tail) = rest.strip_prefix('.') {
                rest = tail;
            } else {
                let (head, tail) = split_next_attribute(rest, &DEFAULT_SPLITTERS);
                if !is_segment(head) {
                    return Err(QuamError::invalid_reference(
                        s,
                        format!("invalid path segment '{}'", head),
                    ));
                }
                steps.push(Step::Attr(head.to_string()));
                rest = tail;
            }
        }

        Ok(Self { absolute, steps })
    }

    pub fn absolute(steps: Vec<Step>) -> Self {
        Self {
            absolute: true,
            steps,
        }
    }

    /// Split into the reference of the owning container and the final key step.
    pub fn split_last(&self) -> Option<(Reference, Step)> {
        let (last, init) = self.steps.split_last()?;
        last.key()?;
        Some((
            Reference {
                absolute: self.absolute,
                steps: init.to_vec(),
            },
            last.clone(),
        ))
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", REFERENCE_PREFIX)?;
        let needs_anchor = !self.absolute
            && !matches!(self.steps.first(), Some(Step::Parent) | Some(Step::Current));
        if needs_anchor {
            write!(f, "./")?;
        }

        let mut after_key = false;
        for step in &self.steps {
            match step {
                Step::Parent => write!(f, "../")?,
                Step::Current => write!(f, "./")?,
                Step::Attr(name) => {
                    if after_key {
                        write!(f, ".")?;
                    }
                    write!(f, "{}", name)?;
                }
                Step::Item(key) => {
                    if !key.is_empty() && key.chars().all(|c| c.is_ascii_digit() || c == '-') {
                        write!(f, "[{}]", key)?;
                    } else {
                        write!(f, "['{}']", key)?;
                    }
                }
            }
            after_key = step.key().is_some();
        }
        Ok(())
    }
}
