//! Transition and machine definitions.
//!
//! Machines can be declared in code or loaded from JSON/YAML:
//!
//! ```yaml
//! initial: closed
//! transitions:
//!   - event: open
//!     from: closed
//!     to: open
//!   - event: close
//!     from: [open, ajar]
//!     to: closed
//! ```
//!
//! `from` accepts a single state or a list. `src`/`sources` and
//! `dst`/`destination` are accepted as aliases.

use crate::callback::Callback;
use crate::engine::Machine;
use crate::error::FsmError;
use crate::table::Label;
use crate::template;
use serde::de::{DeserializeOwned, IntoDeserializer};
use serde::{Deserialize, Deserializer, Serialize};
use std::marker::PhantomData;
use std::path::Path;

/// A transition: `event` moves the machine from any of `sources` to
/// `destination`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition<E, S> {
    /// Event that triggers this transition.
    pub event: E,

    /// Source state(s). Can be a single state or multiple.
    #[serde(
        rename = "from",
        alias = "src",
        alias = "sources",
        deserialize_with = "deserialize_sources"
    )]
    pub sources: Vec<S>,

    /// Target state.
    #[serde(rename = "to", alias = "dst", alias = "destination")]
    pub destination: S,
}

impl<E, S> Transition<E, S> {
    pub fn new(event: E, sources: impl IntoIterator<Item = S>, destination: S) -> Self {
        Self {
            event,
            sources: sources.into_iter().collect(),
            destination,
        }
    }
}

fn deserialize_sources<'de, D, S>(deserializer: D) -> Result<Vec<S>, D::Error>
where
    D: Deserializer<'de>,
    S: Deserialize<'de>,
{
    use serde::de::{self, Visitor};
    use std::fmt;

    struct SourcesVisitor<S>(PhantomData<S>);

    impl<'de, S: Deserialize<'de>> Visitor<'de> for SourcesVisitor<S> {
        type Value = Vec<S>;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a state or array of states")
        }

        fn visit_str<Er>(self, v: &str) -> Result<Self::Value, Er>
        where
            Er: de::Error,
        {
            S::deserialize(v.into_deserializer()).map(|s| vec![s])
        }

        fn visit_string<Er>(self, v: String) -> Result<Self::Value, Er>
        where
            Er: de::Error,
        {
            S::deserialize(v.into_deserializer()).map(|s| vec![s])
        }

        fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
        where
            A: de::SeqAccess<'de>,
        {
            let mut states = Vec::new();
            while let Some(s) = seq.next_element::<S>()? {
                states.push(s);
            }
            Ok(states)
        }
    }

    deserializer.deserialize_any(SourcesVisitor(PhantomData))
}

/// Declarative description of a machine: its initial state and transitions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineDefinition<E, S> {
    /// State a freshly built machine starts in.
    pub initial: S,

    /// Transitions.
    pub transitions: Vec<Transition<E, S>>,
}

impl<E: Label, S: Label> MachineDefinition<E, S> {
    /// Creates and validates a definition.
    pub fn new(initial: S, transitions: Vec<Transition<E, S>>) -> Result<Self, FsmError> {
        let definition = Self {
            initial,
            transitions,
        };
        definition.validate()?;
        Ok(definition)
    }

    /// Checks the definition is well formed.
    ///
    /// Only shape is checked: there is at least one transition and every
    /// transition names at least one source.
    pub fn validate(&self) -> Result<(), FsmError> {
        if self.transitions.is_empty() {
            return Err(FsmError::InvalidDefinition {
                reason: "no transitions defined".to_string(),
            });
        }
        for t in &self.transitions {
            if t.sources.is_empty() {
                return Err(FsmError::InvalidDefinition {
                    reason: format!("transition on event '{}' has no source states", t.event),
                });
            }
        }
        Ok(())
    }

    /// Builds a machine starting in the definition's initial state.
    pub fn build(
        self,
        callbacks: impl IntoIterator<Item = Callback<E, S>>,
    ) -> Result<Machine<E, S>, FsmError> {
        Machine::new(self.initial, self.transitions, callbacks)
    }
}

impl<E, S> MachineDefinition<E, S>
where
    E: Label + Serialize + DeserializeOwned,
    S: Label + Serialize + DeserializeOwned,
{
    /// Parses and validates a definition from JSON.
    pub fn from_json(json: &serde_json::Value) -> Result<Self, FsmError> {
        let definition: Self = serde_json::from_value(json.clone())?;
        definition.validate()?;
        Ok(definition)
    }

    /// Parses and validates a definition from YAML.
    pub fn from_yaml(yaml: &str) -> Result<Self, FsmError> {
        let definition: Self = serde_yaml::from_str(yaml)?;
        definition.validate()?;
        Ok(definition)
    }

    /// Returns the definition as JSON.
    pub fn to_json(&self) -> Result<serde_json::Value, FsmError> {
        Ok(serde_json::to_value(self)?)
    }

    /// Hash of the definition's JSON form for integrity checks.
    pub fn checksum(&self) -> Result<String, FsmError> {
        let json_bytes = serde_json::to_vec(self)?;
        Ok(format!("{:08x}", crc32c::crc32c(&json_bytes)))
    }
}

impl MachineDefinition<String, String> {
    /// Parses a definition from the line-oriented template format.
    ///
    /// See [`template`](crate::template) for the syntax.
    pub fn from_template(initial: impl Into<String>, tpl: &str) -> Result<Self, FsmError> {
        let transitions = template::parse(tpl)?;
        Self::new(initial.into(), transitions)
    }

    /// Loads a definition from a file.
    ///
    /// `.json`, `.yaml` and `.yml` files are parsed as such. Any other file is
    /// read as a template, which needs `initial` since templates do not name
    /// one.
    pub fn load(path: impl AsRef<Path>, initial: Option<&str>) -> Result<Self, FsmError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| FsmError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        let mut definition = match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => {
                let json: serde_json::Value = serde_json::from_str(&content)?;
                Self::from_json(&json)?
            }
            Some("yaml") | Some("yml") => Self::from_yaml(&content)?,
            _ => {
                let initial = initial.ok_or_else(|| FsmError::InvalidDefinition {
                    reason: format!("template {} needs an initial state", path.display()),
                })?;
                return Self::from_template(initial, &content);
            }
        };

        if let Some(initial) = initial {
            definition.initial = initial.to_string();
        }
        Ok(definition)
    }
}
