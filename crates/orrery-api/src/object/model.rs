//! Replicated object snapshot model
//!
//! An `ObjectInfo` is one node's current value for one named object, plus the
//! metadata the replication protocol needs to route and reconcile it.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use orrery_common::{OrreryError, Result};

pub const NODE_URL_FIELD: &str = "nodeURL";
pub const NAME_FIELD: &str = "name";
pub const VALUE_FIELD: &str = "value";
pub const KIND_FIELD: &str = "kind";
pub const ACTION_FIELD: &str = "action";

/// Handshake marker carried by a snapshot
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InfoKind {
    /// Regular update, replaces whatever is stored
    #[default]
    Normal,
    /// First-contact push, stored only when nothing is known for the node yet
    Initial,
}

impl InfoKind {
    pub fn as_str(self) -> &'static str {
        match self {
            InfoKind::Normal => "normal",
            InfoKind::Initial => "initial",
        }
    }

    pub fn is_normal(&self) -> bool {
        *self == InfoKind::Normal
    }

    /// Anything other than the literal `initial` is a normal update
    pub fn from_wire(kind: Option<&str>) -> Self {
        match kind {
            Some("initial") => InfoKind::Initial,
            _ => InfoKind::Normal,
        }
    }
}

impl std::fmt::Display for InfoKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One node's snapshot of a named object
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ObjectInfo<T> {
    #[serde(rename = "nodeURL")]
    node_url: String,
    name: String,
    value: T,
    #[serde(skip_serializing_if = "InfoKind::is_normal")]
    kind: InfoKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    action: Option<String>,
}

impl<T> ObjectInfo<T> {
    pub fn new(node_url: impl Into<String>, name: impl Into<String>, value: T) -> Self {
        Self {
            node_url: node_url.into(),
            name: name.into(),
            value,
            kind: InfoKind::Normal,
            action: None,
        }
    }

    /// Build a snapshot from a wire field set.
    ///
    /// `adapt` turns the raw `value` field into `T`; its failure, like a
    /// missing identifying field, makes the element malformed.
    pub fn from_fields<F>(fields: &Map<String, Value>, adapt: F) -> Result<Self>
    where
        F: FnOnce(Value) -> Result<T>,
    {
        let node_url = field_str(fields, NODE_URL_FIELD)
            .ok_or_else(|| OrreryError::malformed(format!("missing '{}'", NODE_URL_FIELD)))?;
        let name = field_str(fields, NAME_FIELD)
            .ok_or_else(|| OrreryError::malformed(format!("missing '{}'", NAME_FIELD)))?;
        let raw = fields
            .get(VALUE_FIELD)
            .filter(|v| !v.is_null())
            .cloned()
            .ok_or_else(|| OrreryError::malformed(format!("missing '{}'", VALUE_FIELD)))?;
        let value = adapt(raw).map_err(|e| {
            OrreryError::malformed(format!("value from {} rejected: {}", node_url, e))
        })?;

        Ok(Self {
            node_url: node_url.to_string(),
            name: name.to_string(),
            value,
            kind: InfoKind::from_wire(field_str(fields, KIND_FIELD)),
            action: field_str(fields, ACTION_FIELD).map(str::to_string),
        })
    }

    pub fn node_url(&self) -> &str {
        &self.node_url
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn into_value(self) -> T {
        self.value
    }

    pub fn kind(&self) -> InfoKind {
        self.kind
    }

    pub fn is_initial(&self) -> bool {
        self.kind == InfoKind::Initial
    }

    pub fn action(&self) -> Option<&str> {
        self.action.as_deref()
    }

    pub fn with_kind(mut self, kind: InfoKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }
}

impl<T: Serialize> ObjectInfo<T> {
    /// Encode as the field set published on the wire
    pub fn to_payload(&self) -> Result<Value> {
        serde_json::to_value(self).map_err(|e| {
            OrreryError::invalid_argument(format!("cannot encode '{}': {}", self.name, e))
        })
    }
}

impl<T: Serialize> std::fmt::Display for ObjectInfo<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let value = serde_json::to_string(&self.value).map_err(|_| std::fmt::Error)?;
        write!(f, "'{}' (from {}): {}", self.name, self.node_url, value)
    }
}

/// String field of a wire field set, if present and a string
pub fn field_str<'a>(fields: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    fields.get(key).and_then(Value::as_str)
}
