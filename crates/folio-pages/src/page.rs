//! Page with its template and loaded block tree.

use folio_store::{BlockRecord, PageId, PageRecord, Template};

use crate::block_tree::BlockTree;

/// A page as handed to consumers.
///
/// `tree` is `None` until the tree loader has run; once set it is complete.
#[derive(Clone, Debug)]
pub struct Page {
    pub record: PageRecord,
    pub template: Option<Template>,
    pub tree: Option<BlockTree>,
}

impl Page {
    /// Wrap a page record without template or tree.
    #[must_use]
    pub fn new(record: PageRecord) -> Self {
        Self {
            record,
            template: None,
            tree: None,
        }
    }

    /// Attach the page's template.
    #[must_use]
    pub fn with_template(mut self, template: Option<Template>) -> Self {
        self.template = template;
        self
    }

    #[must_use]
    pub fn id(&self) -> PageId {
        self.record.id
    }

    /// Route name for hybrid pages, slug for CMS pages.
    #[must_use]
    pub fn address(&self) -> &str {
        self.record
            .route_name
            .as_deref()
            .or(self.record.slug.as_deref())
            .unwrap_or_default()
    }

    /// Root-level blocks in position order. Empty if the tree is not loaded.
    #[must_use]
    pub fn root_blocks(&self) -> Vec<&BlockRecord> {
        self.tree
            .as_ref()
            .map(|tree| tree.roots().collect())
            .unwrap_or_default()
    }
}
