//! Persisted records and identifiers.
//!
//! Records mirror the rows a relational store keeps for pages, templates and
//! blocks. They carry no behavior beyond small accessors; tree shape lives in
//! the engine, not here.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }
    };
}

define_id!(
    /// Block identifier.
    BlockId
);
define_id!(
    /// Page identifier.
    PageId
);
define_id!(
    /// Template identifier.
    TemplateId
);

/// A block row.
///
/// `parent_id` is `None` for root-level blocks of the page. `position` is
/// 1-based among siblings sharing the same `(page_id, parent_id)`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BlockRecord {
    pub id: BlockId,
    pub page_id: PageId,
    pub parent_id: Option<BlockId>,
    pub position: u32,
    /// Rendering capability key (e.g. `core.container`).
    #[serde(rename = "type")]
    pub block_type: String,
    /// Optional human label shown in the admin tree.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Renderer settings.
    #[serde(default)]
    pub settings: serde_json::Value,
}

impl BlockRecord {
    /// Whether this block sits at the root of its page.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }
}

/// Input for creating a block.
#[derive(Clone, Debug, PartialEq)]
pub struct NewBlock {
    pub page_id: PageId,
    pub parent_id: Option<BlockId>,
    pub position: u32,
    pub block_type: String,
    pub name: Option<String>,
    pub settings: serde_json::Value,
}

/// A page row.
///
/// Hybrid pages are addressed by `route_name`, CMS pages by `slug`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRecord {
    pub id: PageId,
    pub name: String,
    pub route_name: Option<String>,
    pub slug: Option<String>,
    pub template_id: Option<TemplateId>,
    pub enabled: bool,
    pub login_required: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a page.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewPage {
    pub name: String,
    pub route_name: Option<String>,
    pub slug: Option<String>,
    pub template_id: Option<TemplateId>,
    pub enabled: bool,
    pub login_required: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl NewPage {
    /// Page attached to an application route, with creation defaults.
    ///
    /// Enabled, no login required, named after the route, both timestamps set
    /// to `now`.
    #[must_use]
    pub fn for_route(route_name: &str, template_id: Option<TemplateId>, now: DateTime<Utc>) -> Self {
        Self {
            name: route_name.to_owned(),
            route_name: Some(route_name.to_owned()),
            slug: None,
            template_id,
            enabled: true,
            login_required: false,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A page layout template.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Template {
    pub id: TemplateId,
    pub name: String,
    pub path: String,
}

/// Input for creating a template.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewTemplate {
    pub name: String,
    pub path: String,
}

/// Current structural placement of a block, read inside a transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockLocation {
    pub page_id: PageId,
    pub parent_id: Option<BlockId>,
}

/// New structural placement of a block, written inside a transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockPlacement {
    pub block_id: BlockId,
    pub parent_id: BlockId,
    pub position: u32,
    pub page_id: PageId,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_display() {
        assert_eq!(BlockId(42).to_string(), "42");
        assert_eq!(PageId::from(7).to_string(), "7");
    }

    #[test]
    fn test_block_record_serializes_type_field() {
        let block = BlockRecord {
            id: BlockId(2),
            page_id: PageId(1),
            parent_id: None,
            position: 1,
            block_type: "core.container".to_owned(),
            name: None,
            settings: serde_json::json!({}),
        };

        let json = serde_json::to_value(&block).unwrap();

        assert_eq!(json["type"], "core.container");
        assert_eq!(json["id"], 2);
        assert!(json.get("name").is_none());
        assert!(block.is_root());
    }

    #[test]
    fn test_new_page_for_route_defaults() {
        let now = Utc::now();

        let page = NewPage::for_route("homepage", Some(TemplateId(1)), now);

        assert_eq!(page.name, "homepage");
        assert_eq!(page.route_name.as_deref(), Some("homepage"));
        assert!(page.slug.is_none());
        assert!(page.enabled);
        assert!(!page.login_required);
        assert_eq!(page.created_at, now);
        assert_eq!(page.updated_at, now);
    }
}
