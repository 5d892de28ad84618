//! Block rendering through a registry keyed by block type.
//!
//! Rendering never fails as a whole: an unknown block type or a renderer
//! error is logged and the block renders as an empty string, while its
//! siblings still render. Nesting deeper than
//! [`RendererRegistry::MAX_DEPTH`] is cut off the same way.

use std::collections::HashMap;
use std::fmt::Write as _;

use folio_store::{BlockId, BlockRecord};

use crate::block_tree::BlockTree;
use crate::edited_tree::block_code;
use crate::page::Page;

/// Error raised by a single block renderer.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("Setting {name:?} is invalid: {reason}")]
    InvalidSetting { name: &'static str, reason: String },
    #[error("{0}")]
    Failed(String),
}

/// Renders blocks of one type.
pub trait BlockRenderer: Send + Sync {
    /// Render `block` to HTML.
    ///
    /// Children are rendered through [`RenderContext::render_children`].
    fn render(&self, ctx: &RenderContext<'_>, block: &BlockRecord) -> Result<String, RenderError>;
}

/// State passed to renderers.
pub struct RenderContext<'a> {
    registry: &'a RendererRegistry,
    tree: &'a BlockTree,
    depth: usize,
}

impl<'a> RenderContext<'a> {
    #[must_use]
    pub fn tree(&self) -> &'a BlockTree {
        self.tree
    }

    /// Nesting level of the block being rendered, 0 for the block passed to
    /// [`RendererRegistry::render_block`].
    #[must_use]
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Render every child of `id` in order and concatenate the output.
    #[must_use]
    pub fn render_children(&self, id: BlockId) -> String {
        self.tree
            .children(id)
            .map(|child| self.registry.render_at(self.tree, child.id, self.depth + 1))
            .collect()
    }
}

/// Maps block types to renderers.
#[derive(Default)]
pub struct RendererRegistry {
    renderers: HashMap<String, Box<dyn BlockRenderer>>,
}

impl RendererRegistry {
    /// Deepest nesting level that is rendered.
    pub const MAX_DEPTH: usize = 64;

    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with `core.text` and `core.container`.
    #[must_use]
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register(TextRenderer::BLOCK_TYPE, TextRenderer);
        registry.register(ContainerRenderer::BLOCK_TYPE, ContainerRenderer);
        registry
    }

    /// Register a renderer, replacing any previous one for the type.
    pub fn register(&mut self, block_type: impl Into<String>, renderer: impl BlockRenderer + 'static) {
        self.renderers.insert(block_type.into(), Box::new(renderer));
    }

    #[must_use]
    pub fn get(&self, block_type: &str) -> Option<&dyn BlockRenderer> {
        self.renderers.get(block_type).map(|renderer| &**renderer)
    }

    /// Render one block of `tree`, or an empty string if that fails.
    #[must_use]
    pub fn render_block(&self, tree: &BlockTree, id: BlockId) -> String {
        self.render_at(tree, id, 0)
    }

    fn render_at(&self, tree: &BlockTree, id: BlockId, depth: usize) -> String {
        if depth > Self::MAX_DEPTH {
            tracing::error!(
                block = %id,
                page = %tree.page_id(),
                max_depth = Self::MAX_DEPTH,
                "Block nested too deep to render"
            );
            return String::new();
        }

        let Some(block) = tree.get(id) else {
            tracing::error!(block = %id, page = %tree.page_id(), "Block not in page tree");
            return String::new();
        };

        let Some(renderer) = self.get(&block.block_type) else {
            tracing::error!(
                block = %id,
                block_type = %block.block_type,
                "No renderer registered for block type"
            );
            return String::new();
        };

        let ctx = RenderContext {
            registry: self,
            tree,
            depth,
        };
        match renderer.render(&ctx, block) {
            Ok(html) => html,
            Err(e) => {
                tracing::error!(
                    block = %id,
                    block_type = %block.block_type,
                    error = %e,
                    "Block render failed"
                );
                String::new()
            }
        }
    }

    /// Render the root blocks of a page in order.
    ///
    /// A page without a loaded tree renders as an empty string.
    #[must_use]
    pub fn render_page(&self, page: &Page) -> String {
        let Some(tree) = &page.tree else {
            return String::new();
        };
        tree.roots()
            .map(|block| self.render_block(tree, block.id))
            .collect()
    }
}

/// `core.text`: the `content` setting, HTML-escaped.
#[derive(Debug, Default)]
pub struct TextRenderer;

impl TextRenderer {
    pub const BLOCK_TYPE: &'static str = "core.text";
}

impl BlockRenderer for TextRenderer {
    fn render(&self, _ctx: &RenderContext<'_>, block: &BlockRecord) -> Result<String, RenderError> {
        match block.settings.get("content") {
            None | Some(serde_json::Value::Null) => Ok(String::new()),
            Some(serde_json::Value::String(content)) => {
                Ok(html_escape::encode_text(content).into_owned())
            }
            Some(other) => Err(RenderError::InvalidSetting {
                name: "content",
                reason: format!("expected a string, got {other}"),
            }),
        }
    }
}

/// `core.container`: children wrapped in a `div` identified by the block code.
#[derive(Debug, Default)]
pub struct ContainerRenderer;

impl ContainerRenderer {
    pub const BLOCK_TYPE: &'static str = "core.container";
}

impl BlockRenderer for ContainerRenderer {
    fn render(&self, ctx: &RenderContext<'_>, block: &BlockRecord) -> Result<String, RenderError> {
        let mut html = format!("<div id=\"{}\"", block_code(block.id));
        if let Some(class) = block.settings.get("class").and_then(serde_json::Value::as_str) {
            let _ = write!(
                html,
                " class=\"{}\"",
                html_escape::encode_double_quoted_attribute(class)
            );
        }
        html.push('>');
        html.push_str(&ctx.render_children(block.id));
        html.push_str("</div>");
        Ok(html)
    }
}

#[cfg(test)]
mod tests {
    use folio_store::PageId;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::block_tree::OrphanPolicy;

    fn block(id: i64, parent: Option<i64>, position: u32, block_type: &str, settings: serde_json::Value) -> BlockRecord {
        BlockRecord {
            id: BlockId(id),
            page_id: PageId(1),
            parent_id: parent.map(BlockId),
            position,
            block_type: block_type.to_owned(),
            name: None,
            settings,
        }
    }

    fn tree(records: Vec<BlockRecord>) -> BlockTree {
        BlockTree::from_records(PageId(1), records, OrphanPolicy::Reject).unwrap()
    }

    struct FailingRenderer;

    impl BlockRenderer for FailingRenderer {
        fn render(&self, _ctx: &RenderContext<'_>, _block: &BlockRecord) -> Result<String, RenderError> {
            Err(RenderError::Failed("boom".to_owned()))
        }
    }

    #[test]
    fn test_text_is_escaped() {
        let tree = tree(vec![block(1, None, 1, "core.text", json!({"content": "<b>Hi & bye</b>"}))]);
        let registry = RendererRegistry::with_builtin();

        let html = registry.render_block(&tree, BlockId(1));

        assert_eq!(html, "&lt;b&gt;Hi &amp; bye&lt;/b&gt;");
    }

    #[test]
    fn test_text_without_content_is_empty() {
        let tree = tree(vec![block(1, None, 1, "core.text", json!({}))]);

        assert_eq!(RendererRegistry::with_builtin().render_block(&tree, BlockId(1)), "");
    }

    #[test]
    fn test_container_renders_children_in_order() {
        let tree = tree(vec![
            block(2, None, 1, "core.container", json!({"class": "hero"})),
            block(4, Some(2), 1, "core.text", json!({"content": "first"})),
            block(3, Some(2), 2, "core.text", json!({"content": "second"})),
        ]);

        let html = RendererRegistry::with_builtin().render_block(&tree, BlockId(2));

        assert_eq!(html, r#"<div id="cms-block-2" class="hero">firstsecond</div>"#);
    }

    #[test]
    fn test_unknown_type_renders_empty() {
        let tree = tree(vec![
            block(2, None, 1, "core.container", json!({})),
            block(3, Some(2), 1, "vendor.slider", json!({})),
            block(4, Some(2), 2, "core.text", json!({"content": "kept"})),
        ]);
        let registry = RendererRegistry::with_builtin();

        assert!(registry.get("vendor.slider").is_none());
        assert_eq!(
            registry.render_block(&tree, BlockId(2)),
            r#"<div id="cms-block-2">kept</div>"#
        );
    }

    #[test]
    fn test_failing_renderer_degrades_only_its_block() {
        let tree = tree(vec![
            block(2, None, 1, "core.container", json!({})),
            block(3, Some(2), 1, "test.failing", json!({})),
            block(4, Some(2), 2, "core.text", json!({"content": "kept"})),
        ]);
        let mut registry = RendererRegistry::with_builtin();
        registry.register("test.failing", FailingRenderer);

        assert_eq!(
            registry.render_block(&tree, BlockId(2)),
            r#"<div id="cms-block-2">kept</div>"#
        );
        assert_eq!(registry.render_block(&tree, BlockId(3)), "");
    }

    #[test]
    fn test_deep_nesting_is_cut_off() {
        let levels = i64::try_from(RendererRegistry::MAX_DEPTH).unwrap() + 10;
        let records = (1..=levels)
            .map(|id| block(id, (id > 1).then_some(id - 1), 1, "core.container", json!({})))
            .collect();
        let tree = tree(records);

        let html = RendererRegistry::with_builtin().render_block(&tree, BlockId(1));

        assert_eq!(html.matches("<div").count(), RendererRegistry::MAX_DEPTH + 1);
        assert_eq!(html.matches("</div>").count(), RendererRegistry::MAX_DEPTH + 1);
        assert!(!html.contains(&format!("cms-block-{}\"", RendererRegistry::MAX_DEPTH + 2)));
    }

    #[test]
    fn test_context_reports_depth() {
        struct DepthRenderer;

        impl BlockRenderer for DepthRenderer {
            fn render(&self, ctx: &RenderContext<'_>, block: &BlockRecord) -> Result<String, RenderError> {
                Ok(format!("{}[{}]", ctx.depth(), ctx.render_children(block.id)))
            }
        }

        let tree = tree(vec![
            block(1, None, 1, "test.depth", json!({})),
            block(2, Some(1), 1, "test.depth", json!({})),
            block(3, Some(2), 1, "test.depth", json!({})),
        ]);
        let mut registry = RendererRegistry::new();
        registry.register("test.depth", DepthRenderer);

        assert_eq!(registry.render_block(&tree, BlockId(1)), "0[1[2[]]]");
    }

    #[test]
    fn test_invalid_setting_renders_empty() {
        let tree = tree(vec![block(1, None, 1, "core.text", json!({"content": 5}))]);

        assert_eq!(RendererRegistry::with_builtin().render_block(&tree, BlockId(1)), "");
    }

    #[test]
    fn test_missing_block_renders_empty() {
        let tree = tree(Vec::new());

        assert_eq!(RendererRegistry::with_builtin().render_block(&tree, BlockId(9)), "");
    }

    #[test]
    fn test_render_page_concatenates_roots() {
        let now = chrono::Utc::now();
        let mut page = Page::new(folio_store::PageRecord {
            id: PageId(1),
            name: "homepage".to_owned(),
            route_name: Some("homepage".to_owned()),
            slug: None,
            template_id: None,
            enabled: true,
            login_required: false,
            created_at: now,
            updated_at: now,
        });
        let registry = RendererRegistry::with_builtin();
        assert_eq!(registry.render_page(&page), "");

        page.tree = Some(tree(vec![
            block(1, None, 1, "core.text", json!({"content": "a"})),
            block(2, None, 2, "core.text", json!({"content": "b"})),
        ]));

        assert_eq!(registry.render_page(&page), "ab");
    }
}
