//! Edge Adapters
//!
//! An adapter reshapes one mapping into a fragment that is merged into a
//! consumer's input. Adapters are attached to nodes, either on the
//! producing side (`adapt_to`, evaluated against the node's own raw result)
//! or on the consuming side (`adapt_from`, evaluated against the
//! predecessor's raw result). Both attachments are observably equivalent.
//!
//! # Kinds
//!
//! - `Identity`: `{dest: source[source_key]}`
//! - `Get`: `{dest: <path navigated from the root source map>}`
//! - `WrapInList`: `{dest: [source[source_key]]}`
//! - `Pick`: the sub-map of `source` restricted to a list of keys
//!
//! The destination key defaults to the source key. Adapters never mutate
//! their source and are safe to share between tasks.

mod path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AdapterError, PathError, SerializationError};
use crate::value::ArgMap;

pub use path::{Path, PathStep};

/// The transform an adapter performs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdapterKind {
    Identity,
    Get { path: Path },
    WrapInList,
    Pick { keys: Vec<String> },
}

impl AdapterKind {
    /// Name used in the structural document.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Identity => "identity",
            Self::Get { .. } => "get",
            Self::WrapInList => "wrap_in_list",
            Self::Pick { .. } => "pick",
        }
    }
}

/// A stateless value transform applied at a graph edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "AdapterRecord", into = "AdapterRecord")]
pub struct Adapter {
    source_key: Option<String>,
    dest_key: Option<String>,
    kind: AdapterKind,
}

impl Adapter {
    /// Copy `source[key]` under the same key.
    pub fn identity(key: impl Into<String>) -> Self {
        Self {
            source_key: Some(key.into()),
            dest_key: None,
            kind: AdapterKind::Identity,
        }
    }

    /// Copy `source[from]` to `to`.
    pub fn rename(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self::identity(from).with_dest(to)
    }

    /// Navigate `path` from the root of the source map.
    pub fn get(path: &str) -> Result<Self, PathError> {
        Ok(Self {
            source_key: None,
            dest_key: None,
            kind: AdapterKind::Get {
                path: Path::parse(path)?,
            },
        })
    }

    /// Wrap `source[key]` in a one-element list.
    pub fn wrap_in_list(key: impl Into<String>) -> Self {
        Self {
            source_key: Some(key.into()),
            dest_key: None,
            kind: AdapterKind::WrapInList,
        }
    }

    /// Keep only `keys`, under their original names.
    pub fn pick<I, K>(keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        Self {
            source_key: None,
            dest_key: None,
            kind: AdapterKind::Pick {
                keys: keys.into_iter().map(Into::into).collect(),
            },
        }
    }

    /// Set the destination key.
    pub fn with_dest(mut self, key: impl Into<String>) -> Self {
        self.dest_key = Some(key.into());
        self
    }

    /// Set the source key. For `Get` this documents intent only.
    pub fn with_source(mut self, key: impl Into<String>) -> Self {
        self.source_key = Some(key.into());
        self
    }

    pub fn kind(&self) -> &AdapterKind {
        &self.kind
    }

    pub fn source_key(&self) -> Option<&str> {
        self.source_key.as_deref()
    }

    pub fn dest_key(&self) -> Option<&str> {
        self.dest_key.as_deref()
    }

    /// The key the fragment is written under.
    pub fn destination(&self) -> Option<&str> {
        self.dest_key
            .as_deref()
            .or(self.source_key.as_deref())
            .or(match &self.kind {
                AdapterKind::Get { path } => path.last_field(),
                _ => None,
            })
    }

    /// Apply leniently: anything missing yields an empty fragment.
    pub fn apply(&self, source: &ArgMap) -> ArgMap {
        self.fragment(source, false).unwrap_or_default()
    }

    /// Apply strictly: anything missing is an error.
    pub fn try_apply(&self, source: &ArgMap) -> Result<ArgMap, AdapterError> {
        self.fragment(source, true)
    }

    fn fragment(&self, source: &ArgMap, strict: bool) -> Result<ArgMap, AdapterError> {
        let mut out = ArgMap::new();

        if let AdapterKind::Pick { keys } = &self.kind {
            for key in keys {
                match source.get(key) {
                    Some(value) => {
                        out.insert(key.clone(), value.clone());
                    }
                    None if strict => return Err(AdapterError::MissingKey { key: key.clone() }),
                    None => {}
                }
            }
            return Ok(out);
        }

        let dest = self.destination().ok_or(AdapterError::NoDestination)?;
        let value = match &self.kind {
            AdapterKind::Get { path } => {
                path.resolve(source)
                    .ok_or_else(|| AdapterError::MissingKey {
                        key: path.to_string(),
                    })?
            }
            _ => {
                let key = self.source_key.as_deref().ok_or(AdapterError::NoDestination)?;
                source.get(key).ok_or_else(|| AdapterError::MissingKey {
                    key: key.to_string(),
                })?
            }
        };

        let value = match self.kind {
            AdapterKind::WrapInList => Value::Array(vec![value.clone()]),
            _ => value.clone(),
        };
        out.insert(dest.to_string(), value);
        Ok(out)
    }
}

/// Apply a list of adapters independently and merge their fragments
/// left to right.
pub fn apply_all<'a, I>(adapters: I, source: &ArgMap, strict: bool) -> Result<ArgMap, AdapterError>
where
    I: IntoIterator<Item = &'a Adapter>,
{
    let mut merged = ArgMap::new();
    for adapter in adapters {
        let fragment = if strict {
            adapter.try_apply(source)?
        } else {
            adapter.apply(source)
        };
        crate::value::merge_into(&mut merged, fragment);
    }
    Ok(merged)
}

/// Structural form of an adapter: a kind name plus kind-specific args.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct AdapterRecord {
    #[serde(default)]
    source_key: Option<String>,
    #[serde(default)]
    dest_key: Option<String>,
    #[serde(default = "default_kind")]
    kind: String,
    #[serde(default)]
    kind_args: ArgMap,
}

fn default_kind() -> String {
    "identity".to_string()
}

impl From<Adapter> for AdapterRecord {
    fn from(adapter: Adapter) -> Self {
        let name = adapter.kind.name().to_string();
        let mut kind_args = ArgMap::new();
        match adapter.kind {
            AdapterKind::Get { path } => {
                kind_args.insert("path".into(), Value::String(path.as_str().to_string()));
            }
            AdapterKind::Pick { keys } => {
                kind_args.insert(
                    "keys".into(),
                    Value::Array(keys.into_iter().map(Value::String).collect()),
                );
            }
            AdapterKind::Identity | AdapterKind::WrapInList => {}
        }
        Self {
            source_key: adapter.source_key,
            dest_key: adapter.dest_key,
            kind: name,
            kind_args,
        }
    }
}

impl TryFrom<AdapterRecord> for Adapter {
    type Error = SerializationError;

    fn try_from(record: AdapterRecord) -> Result<Self, Self::Error> {
        let kind = match record.kind.as_str() {
            "identity" | "wrap_in_list" => {
                if record.source_key.is_none() {
                    return Err(SerializationError::InvalidAdapter(format!(
                        "`{}` adapter requires a source_key",
                        record.kind
                    )));
                }
                if record.kind == "identity" {
                    AdapterKind::Identity
                } else {
                    AdapterKind::WrapInList
                }
            }
            "get" => {
                let raw = record
                    .kind_args
                    .get("path")
                    .and_then(Value::as_str)
                    .ok_or_else(|| {
                        SerializationError::InvalidAdapter(
                            "`get` adapter requires a string `path`".into(),
                        )
                    })?;
                AdapterKind::Get {
                    path: Path::parse(raw)?,
                }
            }
            "pick" => {
                let keys = record
                    .kind_args
                    .get("keys")
                    .and_then(Value::as_array)
                    .ok_or_else(|| {
                        SerializationError::InvalidAdapter(
                            "`pick` adapter requires a `keys` list".into(),
                        )
                    })?
                    .iter()
                    .map(|k| {
                        k.as_str().map(str::to_string).ok_or_else(|| {
                            SerializationError::InvalidAdapter("`pick` keys must be strings".into())
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                AdapterKind::Pick { keys }
            }
            other => return Err(SerializationError::UnknownAdapterKind(other.to_string())),
        };

        Ok(Self {
            source_key: record.source_key,
            dest_key: record.dest_key,
            kind,
        })
    }
}
