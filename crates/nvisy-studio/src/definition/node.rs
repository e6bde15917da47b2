//! Node definition types.

use std::collections::BTreeMap;

use derive_more::{Debug, Display, From, Into};
use serde::de::Error as _;
use serde::ser::SerializeStruct;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use super::field::Field;
use super::workflow::LlmConfig;

/// Identifier of a node, stable within a workflow.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[derive(Debug, Display, From, Into)]
#[debug("{_0}")]
#[display("{_0}")]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Creates a node ID from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the ID as a string slice.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for NodeId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

impl AsRef<str> for NodeId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A node of a studio workflow.
///
/// On the wire a node is `{ "id", "type", "data" }`. Type tags without a
/// compilation path are kept as [`NodeKind::Unsupported`] so that a workflow
/// containing editor-only nodes still loads.
#[derive(Clone, PartialEq)]
#[derive(Debug)]
pub struct Node {
    /// Node identifier.
    pub id: NodeId,
    /// Kind-specific payload.
    pub kind: NodeKind,
}

impl Node {
    /// Creates a new node.
    pub fn new(id: impl Into<NodeId>, kind: impl Into<NodeKind>) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
        }
    }

    /// Returns the wire type tag of this node.
    pub fn type_name(&self) -> &str {
        self.kind.type_name()
    }

    /// Returns the declared input fields of this node.
    pub fn inputs(&self) -> &[Field] {
        self.kind
            .component()
            .and_then(|c| c.inputs.as_deref())
            .unwrap_or_default()
    }

    /// Returns the display name of this node, if any.
    pub fn name(&self) -> Option<&str> {
        self.kind.component().and_then(|c| c.name.as_deref())
    }
}

/// Node kind, one variant per compilation path.
#[derive(Debug, Clone, PartialEq, From)]
pub enum NodeKind {
    /// Prompting step bound to a language model.
    Signature(Signature),
    /// Passage retrieval from a registered backend.
    Retriever(Retriever),
    /// Scoring step, hosted or local.
    Evaluator(Evaluator),
    /// Terminal collector, returns its inputs.
    End(End),
    /// Any other type tag.
    #[from(skip)]
    Unsupported {
        /// The unrecognized type tag.
        type_name: String,
        /// The raw node data.
        data: Value,
    },
}

impl NodeKind {
    /// Returns the wire type tag.
    pub fn type_name(&self) -> &str {
        match self {
            Self::Signature(_) => "signature",
            Self::Retriever(_) => "retriever",
            Self::Evaluator(_) => "evaluator",
            Self::End(_) => "end",
            Self::Unsupported { type_name, .. } => type_name,
        }
    }

    /// Returns the data shared by all supported kinds.
    pub fn component(&self) -> Option<&Component> {
        match self {
            Self::Signature(s) => Some(&s.component),
            Self::Retriever(r) => Some(&r.component),
            Self::Evaluator(e) => Some(&e.component),
            Self::End(e) => Some(&e.component),
            Self::Unsupported { .. } => None,
        }
    }
}

/// Data common to every node kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Component {
    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Description shown in the editor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Ordered input fields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inputs: Option<Vec<Field>>,
    /// Ordered output fields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outputs: Option<Vec<Field>>,
    /// Configuration parameters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Vec<Field>>,
}

impl Component {
    /// Creates component data with the given display name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    /// Returns the input fields, empty if unset.
    pub fn input_fields(&self) -> &[Field] {
        self.inputs.as_deref().unwrap_or_default()
    }

    /// Returns the output fields, empty if unset.
    pub fn output_fields(&self) -> &[Field] {
        self.outputs.as_deref().unwrap_or_default()
    }

    /// Returns the parameter fields, empty if unset.
    pub fn parameter_fields(&self) -> &[Field] {
        self.parameters.as_deref().unwrap_or_default()
    }
}

/// Signature node data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Signature {
    /// Shared component data.
    #[serde(flatten)]
    pub component: Component,
    /// Instruction text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    /// Node-level language model override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub llm: Option<LlmConfig>,
    /// Few-shot demonstrations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub demonstrations: Option<Dataset>,
}

/// Retriever node data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Retriever {
    /// Shared component data.
    #[serde(flatten)]
    pub component: Component,
    /// Backend class name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cls: Option<String>,
}

/// Evaluator node data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Evaluator {
    /// Shared component data.
    #[serde(flatten)]
    pub component: Component,
    /// Backend class name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cls: Option<String>,
    /// Evaluator identifier on the hosted evaluation service.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluator: Option<String>,
}

/// End node data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct End {
    /// Shared component data.
    #[serde(flatten)]
    pub component: Component,
}

/// A dataset attached to a node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    /// Stored dataset identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Dataset name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Inline records.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline: Option<InlineDataset>,
}

/// Column-oriented inline dataset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InlineDataset {
    /// Column name to column values.
    pub records: BTreeMap<String, Vec<Value>>,
    /// Column declarations, in editor order.
    #[serde(
        rename = "columnTypes",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub column_types: Option<Vec<DatasetColumn>>,
}

/// A declared dataset column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetColumn {
    /// Column name.
    pub name: String,
    /// Column type tag.
    #[serde(rename = "type")]
    pub column_type: String,
}

impl InlineDataset {
    /// Transposes the columns into one record per row.
    ///
    /// Shorter columns leave their key out of the trailing rows.
    pub fn to_examples(&self) -> Vec<Map<String, Value>> {
        let rows = self.records.values().map(Vec::len).max().unwrap_or(0);
        (0..rows)
            .map(|row| {
                self.records
                    .iter()
                    .filter_map(|(column, values)| {
                        values.get(row).map(|v| (column.clone(), v.clone()))
                    })
                    .collect()
            })
            .collect()
    }
}

#[derive(Deserialize)]
struct RawNode {
    id: NodeId,
    #[serde(rename = "type")]
    type_name: String,
    #[serde(default)]
    data: Value,
}

impl TryFrom<RawNode> for Node {
    type Error = serde_json::Error;

    fn try_from(raw: RawNode) -> Result<Self, Self::Error> {
        let data = match raw.data {
            Value::Null => Value::Object(Map::new()),
            data => data,
        };

        let kind = match raw.type_name.as_str() {
            "signature" => NodeKind::Signature(serde_json::from_value(data)?),
            "retriever" => NodeKind::Retriever(serde_json::from_value(data)?),
            "evaluator" => NodeKind::Evaluator(serde_json::from_value(data)?),
            "end" => NodeKind::End(serde_json::from_value(data)?),
            _ => NodeKind::Unsupported {
                type_name: raw.type_name,
                data,
            },
        };

        Ok(Self { id: raw.id, kind })
    }
}

impl<'de> Deserialize<'de> for Node {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = RawNode::deserialize(deserializer)?;
        Node::try_from(raw).map_err(D::Error::custom)
    }
}

impl Serialize for Node {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("Node", 3)?;
        state.serialize_field("id", &self.id)?;
        state.serialize_field("type", self.type_name())?;
        match &self.kind {
            NodeKind::Signature(data) => state.serialize_field("data", data)?,
            NodeKind::Retriever(data) => state.serialize_field("data", data)?,
            NodeKind::Evaluator(data) => state.serialize_field("data", data)?,
            NodeKind::End(data) => state.serialize_field("data", data)?,
            NodeKind::Unsupported { data, .. } => state.serialize_field("data", data)?,
        }
        state.end()
    }
}
