//! Client-supplied description of a reordered block tree.
//!
//! The JSON form is an ordered object keyed by block code:
//!
//! ```json
//! {
//!   "cms-block-2": {
//!     "type": "core.container",
//!     "child": {
//!       "cms-block-4": { "type": "core.action" },
//!       "cms-block-9": { "type": "core.container", "child": { "cms-block-3": { "type": "core.text" } } }
//!     }
//!   }
//! }
//! ```
//!
//! Key order is significant: it is the new sibling order. `child` may also be
//! spelled `children`, and `null`, `""`, `[]` or a missing key all mean no
//! children. Codes are kept verbatim; the position editor validates them.

use std::fmt;

use folio_store::BlockId;
use serde::de::{self, Deserializer, IgnoredAny, MapAccess, SeqAccess, Unexpected, Visitor};
use serde::ser::{SerializeMap, SerializeStruct, Serializer};
use serde::{Deserialize, Serialize};

const CODE_PREFIX: &str = "cms-block-";

/// Block code used as the key of an edited tree entry.
#[must_use]
pub fn block_code(id: BlockId) -> String {
    format!("{CODE_PREFIX}{id}")
}

/// Extract the block id from a `cms-block-<id>` code.
///
/// Returns `None` unless the suffix is a positive decimal integer.
#[must_use]
pub fn parse_block_code(code: &str) -> Option<BlockId> {
    let digits = code.strip_prefix(CODE_PREFIX)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let id: i64 = digits.parse().ok()?;
    (id > 0).then_some(BlockId(id))
}

/// Ordered sequence of sibling entries.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EditedTree(Vec<EditedNode>);

impl EditedTree {
    #[must_use]
    pub fn new(nodes: Vec<EditedNode>) -> Self {
        Self(nodes)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, EditedNode> {
        self.0.iter()
    }

    /// Total number of entries at every depth.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.0.iter().map(|n| 1 + n.children.node_count()).sum()
    }
}

impl FromIterator<EditedNode> for EditedTree {
    fn from_iter<I: IntoIterator<Item = EditedNode>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a EditedTree {
    type Item = &'a EditedNode;
    type IntoIter = std::slice::Iter<'a, EditedNode>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// One entry of an edited tree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EditedNode {
    /// Block code as sent by the client.
    pub code: String,
    /// Block type as sent by the client. Informational only.
    pub block_type: String,
    pub children: EditedTree,
}

impl EditedNode {
    #[must_use]
    pub fn new(code: impl Into<String>, block_type: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            block_type: block_type.into(),
            children: EditedTree::default(),
        }
    }

    /// Entry for an existing block id.
    #[must_use]
    pub fn for_block(id: BlockId, block_type: &str) -> Self {
        Self::new(block_code(id), block_type)
    }

    #[must_use]
    pub fn with_children(mut self, children: EditedTree) -> Self {
        self.children = children;
        self
    }

    /// Block id embedded in the code, if the code is well formed.
    #[must_use]
    pub fn block_id(&self) -> Option<BlockId> {
        parse_block_code(&self.code)
    }
}

#[derive(Deserialize)]
struct NodeBody {
    #[serde(rename = "type", default)]
    block_type: String,
    #[serde(default, alias = "children")]
    child: EditedTree,
}

struct TreeVisitor;

impl<'de> Visitor<'de> for TreeVisitor {
    type Value = EditedTree;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("an object keyed by block code, or an empty value")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
        let mut nodes = Vec::with_capacity(map.size_hint().unwrap_or(0));
        while let Some((code, body)) = map.next_entry::<String, NodeBody>()? {
            nodes.push(EditedNode {
                code,
                block_type: body.block_type,
                children: body.child,
            });
        }
        Ok(EditedTree(nodes))
    }

    fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(EditedTree::default())
    }

    fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(EditedTree::default())
    }

    fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<Self::Value, D::Error> {
        deserializer.deserialize_any(self)
    }

    fn visit_str<E: de::Error>(self, value: &str) -> Result<Self::Value, E> {
        if value.is_empty() {
            Ok(EditedTree::default())
        } else {
            Err(E::invalid_value(Unexpected::Str(value), &self))
        }
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
        if seq.next_element::<IgnoredAny>()?.is_some() {
            return Err(de::Error::invalid_value(Unexpected::Seq, &self));
        }
        Ok(EditedTree::default())
    }
}

impl<'de> Deserialize<'de> for EditedTree {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(TreeVisitor)
    }
}

struct NodeBodyRef<'a>(&'a EditedNode);

impl Serialize for NodeBodyRef<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let node = self.0;
        let fields = if node.children.is_empty() { 1 } else { 2 };
        let mut body = serializer.serialize_struct("EditedNode", fields)?;
        body.serialize_field("type", &node.block_type)?;
        if node.children.is_empty() {
            body.skip_field("child")?;
        } else {
            body.serialize_field("child", &node.children)?;
        }
        body.end()
    }
}

impl Serialize for EditedTree {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for node in &self.0 {
            map.serialize_entry(&node.code, &NodeBodyRef(node))?;
        }
        map.end()
    }
}
