//! Record, section and tree-submission model.
//!
//! # Responsibility
//! - Name the closed set of configuration sections.
//! - Carry record metadata (`parent_id`, `rank`, `manual`) apart from payload.
//! - Parse client-submitted tree forests into typed nodes.
//!
//! # Invariants
//! - Reserved metadata keys (`_id`, `_parent`, `_rank`, `_manual`,
//!   `_children`) never end up inside a stored payload; the repository
//!   strips them when encoding.
//! - A submitted tree node always carries a non-empty payload.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// Store-wide record identifier, drawn from one global sequence.
pub type RecordId = i64;

/// Section-specific record body. The store never interprets its shape except
/// when scanning for dependencies or literal matches.
pub type Payload = Map<String, Value>;

pub const ID_KEY: &str = "_id";
pub const PARENT_KEY: &str = "_parent";
pub const RANK_KEY: &str = "_rank";
pub const MANUAL_KEY: &str = "_manual";
pub const CHILDREN_KEY: &str = "_children";
/// Key of the nested section body in payloads written by the web client.
pub const DATA_KEY: &str = "data";

const RESERVED_KEYS: [&str; 5] = [ID_KEY, PARENT_KEY, RANK_KEY, MANUAL_KEY, CHILDREN_KEY];

/// Configuration category. Sections are independent namespaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Section {
    Sources,
    Caches,
    Layers,
    Grids,
    Globals,
    Services,
    Defaults,
    /// Capability documents fetched from remote WMS servers.
    WmsCapabilities,
}

impl Section {
    pub const ALL: [Section; 8] = [
        Section::Sources,
        Section::Caches,
        Section::Layers,
        Section::Grids,
        Section::Globals,
        Section::Services,
        Section::Defaults,
        Section::WmsCapabilities,
    ];

    /// Column value used in `records.section`.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sources => "sources",
            Self::Caches => "caches",
            Self::Layers => "layers",
            Self::Grids => "grids",
            Self::Globals => "globals",
            Self::Services => "services",
            Self::Defaults => "defaults",
            Self::WmsCapabilities => "wms_capabilities",
        }
    }
}

impl Display for Section {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Section {
    type Err = UnknownSection;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|section| section.as_str() == value)
            .ok_or_else(|| UnknownSection(value.to_string()))
    }
}

/// Section name outside the closed set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownSection(pub String);

impl Display for UnknownSection {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown section `{}`", self.0)
    }
}

impl Error for UnknownSection {}

/// Input that is not a valid payload or tree submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MalformedInput(pub String);

impl Display for MalformedInput {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "malformed input: {}", self.0)
    }
}

impl Error for MalformedInput {}

/// Placement and origin metadata stored next to a payload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecordMeta {
    pub parent_id: Option<RecordId>,
    pub rank: Option<i64>,
    /// `true` for user-authored records, `false` for automated imports.
    pub manual: bool,
}

impl RecordMeta {
    pub fn with_parent(mut self, parent_id: RecordId) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    pub fn with_rank(mut self, rank: i64) -> Self {
        self.rank = Some(rank);
        self
    }

    pub fn manual(mut self, manual: bool) -> Self {
        self.manual = manual;
        self
    }

    /// Removes reserved metadata keys from `payload` and returns them typed.
    ///
    /// Accepts payloads in the shape the web client sends, where `_parent`,
    /// `_rank` and `_manual` travel inside the document. `null` counts as
    /// unset. `_id` and `_children` are dropped.
    pub fn split_from(payload: &mut Payload) -> Result<Self, MalformedInput> {
        let parent_id = take_optional_i64(payload, PARENT_KEY)?;
        let rank = take_optional_i64(payload, RANK_KEY)?;
        let manual = match payload.remove(MANUAL_KEY) {
            None | Some(Value::Null) => false,
            Some(Value::Bool(flag)) => flag,
            Some(other) => {
                return Err(MalformedInput(format!(
                    "`{MANUAL_KEY}` must be a boolean, got {other}"
                )))
            }
        };
        payload.remove(ID_KEY);
        payload.remove(CHILDREN_KEY);
        Ok(Self {
            parent_id,
            rank,
            manual,
        })
    }
}

/// One stored record.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub id: RecordId,
    pub section: Section,
    pub project: String,
    pub parent_id: Option<RecordId>,
    pub rank: Option<i64>,
    pub manual: bool,
    pub data: Payload,
}

impl Record {
    pub fn meta(&self) -> RecordMeta {
        RecordMeta {
            parent_id: self.parent_id,
            rank: self.rank,
            manual: self.manual,
        }
    }
}

/// Node of a client-submitted ordered forest.
///
/// Position among siblings defines rank, nesting defines parent.
#[derive(Debug, Clone, PartialEq)]
pub enum TreeNode {
    /// Node without a stored counterpart yet; inserted on reconciliation.
    New {
        payload: Payload,
        children: Vec<TreeNode>,
    },
    /// Node mirroring an existing record; rewritten in place.
    Existing {
        id: RecordId,
        payload: Payload,
        children: Vec<TreeNode>,
    },
}

impl TreeNode {
    pub fn new(payload: Payload) -> Self {
        Self::New {
            payload,
            children: Vec::new(),
        }
    }

    pub fn existing(id: RecordId, payload: Payload) -> Self {
        Self::Existing {
            id,
            payload,
            children: Vec::new(),
        }
    }

    /// Appends one child node and returns the updated node.
    pub fn with_child(mut self, child: TreeNode) -> Self {
        match &mut self {
            Self::New { children, .. } | Self::Existing { children, .. } => children.push(child),
        }
        self
    }

    pub fn id(&self) -> Option<RecordId> {
        match self {
            Self::New { .. } => None,
            Self::Existing { id, .. } => Some(*id),
        }
    }

    pub fn payload(&self) -> &Payload {
        match self {
            Self::New { payload, .. } | Self::Existing { payload, .. } => payload,
        }
    }

    pub fn children(&self) -> &[TreeNode] {
        match self {
            Self::New { children, .. } | Self::Existing { children, .. } => children,
        }
    }

    /// Parses one submitted node: `_id` selects existing vs new, `_children`
    /// holds nested nodes, every other key is payload.
    ///
    /// Nesting depth is bounded by `serde_json`'s parser recursion limit.
    pub fn from_json(value: &Value) -> Result<Self, MalformedInput> {
        let Value::Object(object) = value else {
            return Err(MalformedInput(format!(
                "tree node must be an object, got {value}"
            )));
        };

        let id = match object.get(ID_KEY) {
            None | Some(Value::Null) => None,
            Some(Value::Number(number)) => Some(number.as_i64().ok_or_else(|| {
                MalformedInput(format!("`{ID_KEY}` must be an integer, got {number}"))
            })?),
            Some(other) => {
                return Err(MalformedInput(format!(
                    "`{ID_KEY}` must be an integer, got {other}"
                )))
            }
        };

        let children = match object.get(CHILDREN_KEY) {
            None | Some(Value::Null) => Vec::new(),
            Some(value) => Self::forest_from_json(value)?,
        };

        let payload = without_reserved_keys(object);
        if payload.is_empty() {
            return Err(MalformedInput(match id {
                Some(id) => format!("tree node {id} has no payload"),
                None => "new tree node has no payload".to_string(),
            }));
        }

        Ok(match id {
            Some(id) => Self::Existing {
                id,
                payload,
                children,
            },
            None => Self::New { payload, children },
        })
    }

    /// Parses an ordered forest (JSON array of nodes).
    pub fn forest_from_json(value: &Value) -> Result<Vec<Self>, MalformedInput> {
        let Value::Array(items) = value else {
            return Err(MalformedInput(format!(
                "tree forest must be an array, got {value}"
            )));
        };
        items.iter().map(Self::from_json).collect()
    }
}

/// Converts an arbitrary JSON value into a payload map.
pub fn payload_from_value(value: Value) -> Result<Payload, MalformedInput> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(MalformedInput(format!(
            "payload must be a JSON object, got {other}"
        ))),
    }
}

/// Copy of `payload` without reserved metadata keys.
pub fn without_reserved_keys(payload: &Payload) -> Payload {
    payload
        .iter()
        .filter(|(key, _)| !is_reserved_key(key))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

pub fn is_reserved_key(key: &str) -> bool {
    RESERVED_KEYS.contains(&key)
}

/// Serialized `"key":value` fragment as it appears in stored payload text.
///
/// A hit on this fragment is only a candidate: `"n":7` is also found inside
/// `"n":70`, so callers confirm the match on the parsed payload.
pub fn key_literal(key_field: &str, value: &Value) -> Result<String, MalformedInput> {
    let key = serde_json::to_string(key_field).map_err(|err| MalformedInput(err.to_string()))?;
    let value = serde_json::to_string(value).map_err(|err| MalformedInput(err.to_string()))?;
    Ok(format!("{key}:{value}"))
}

/// Looks up `field` in the nested `data` object first, then at the top level.
///
/// Returns the object that holds the field together with its value, so
/// sibling keys (such as `name`) can be read from the same scope.
pub fn find_field<'a>(payload: &'a Payload, field: &str) -> Option<(&'a Payload, &'a Value)> {
    if let Some(Value::Object(inner)) = payload.get(DATA_KEY) {
        if let Some(value) = inner.get(field) {
            return Some((inner, value));
        }
    }
    payload.get(field).map(|value| (payload, value))
}

fn take_optional_i64(payload: &mut Payload, key: &str) -> Result<Option<i64>, MalformedInput> {
    match payload.remove(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(number)) => number
            .as_i64()
            .map(Some)
            .ok_or_else(|| MalformedInput(format!("`{key}` must be an integer, got {number}"))),
        Some(other) => Err(MalformedInput(format!(
            "`{key}` must be an integer, got {other}"
        ))),
    }
}
