//! In-memory block tree of a page.
//!
//! Blocks are stored in a flat `Vec<BlockRecord>` with parent/children
//! relationships tracked by indices, plus an id index. This provides:
//! - O(1) block lookups by id
//! - Sibling order equal to storage order, with no extra sort
//! - O(d) ancestor walks where d is the block depth
//!
//! A [`BlockTree`] is always complete: it is built once from every block of
//! the page, so no access ever goes back to the store for more children.

use std::collections::HashMap;

use folio_store::{BlockId, BlockRecord, PageId};

use crate::edited_tree::{EditedNode, EditedTree};

/// What to do with a block whose parent is not among the page's blocks.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OrphanPolicy {
    /// Fail the load with [`TreeError::OrphanedBlock`].
    #[default]
    Reject,
    /// Attach the block at the root of the page and log a warning.
    Promote,
}

/// Error returned when a page's blocks do not form a tree.
#[derive(Debug, thiserror::Error)]
pub enum TreeError {
    /// A block references a parent that is not part of the same page.
    #[error("Block {block} references parent {parent} which is not on page {page}")]
    OrphanedBlock {
        page: PageId,
        block: BlockId,
        parent: BlockId,
    },
    /// Some blocks are not reachable from the page roots.
    #[error("Blocks {unreachable:?} on page {page} form a parent cycle")]
    Cycle {
        page: PageId,
        unreachable: Vec<BlockId>,
    },
    /// Store failure while fetching blocks.
    #[error("Store error: {0}")]
    Store(#[from] folio_store::StoreError),
}

/// Complete block tree of one page.
#[derive(Clone, Debug)]
pub struct BlockTree {
    page_id: PageId,
    blocks: Vec<BlockRecord>,
    children: Vec<Vec<usize>>,
    parents: Vec<Option<usize>>,
    roots: Vec<usize>,
    index: HashMap<BlockId, usize>,
}

impl BlockTree {
    /// Empty tree for a page without blocks.
    #[must_use]
    pub fn empty(page_id: PageId) -> Self {
        Self {
            page_id,
            blocks: Vec::new(),
            children: Vec::new(),
            parents: Vec::new(),
            roots: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Build the tree from a page's blocks.
    ///
    /// `records` must be ascending by `position`; siblings keep that order.
    /// Every record is indexed before any linking happens, so a child may
    /// come before its parent in the input.
    ///
    /// # Errors
    ///
    /// Returns [`TreeError::OrphanedBlock`] under [`OrphanPolicy::Reject`] if a
    /// parent is missing, and [`TreeError::Cycle`] if some blocks cannot be
    /// reached from the roots.
    pub fn from_records(
        page_id: PageId,
        records: Vec<BlockRecord>,
        orphans: OrphanPolicy,
    ) -> Result<Self, TreeError> {
        let index: HashMap<BlockId, usize> = records
            .iter()
            .enumerate()
            .map(|(i, block)| (block.id, i))
            .collect();

        let mut children = vec![Vec::new(); records.len()];
        let mut parents = vec![None; records.len()];
        let mut roots = Vec::new();

        for (idx, block) in records.iter().enumerate() {
            let Some(parent_id) = block.parent_id else {
                roots.push(idx);
                continue;
            };

            match index.get(&parent_id) {
                Some(&parent_idx) => {
                    children[parent_idx].push(idx);
                    parents[idx] = Some(parent_idx);
                }
                None if orphans == OrphanPolicy::Promote => {
                    tracing::warn!(
                        page = %page_id,
                        block = %block.id,
                        parent = %parent_id,
                        "Parent block not on page, promoting block to root"
                    );
                    roots.push(idx);
                }
                None => {
                    return Err(TreeError::OrphanedBlock {
                        page: page_id,
                        block: block.id,
                        parent: parent_id,
                    });
                }
            }
        }

        let tree = Self {
            page_id,
            blocks: records,
            children,
            parents,
            roots,
            index,
        };

        let reachable = tree.reachable();
        if reachable.iter().any(|seen| !seen) {
            let unreachable = reachable
                .iter()
                .enumerate()
                .filter(|&(_, seen)| !seen)
                .map(|(i, _)| tree.blocks[i].id)
                .collect();
            return Err(TreeError::Cycle {
                page: page_id,
                unreachable,
            });
        }

        Ok(tree)
    }

    /// Mark every block reachable from the roots.
    fn reachable(&self) -> Vec<bool> {
        let mut seen = vec![false; self.blocks.len()];
        let mut stack: Vec<usize> = self.roots.clone();
        while let Some(idx) = stack.pop() {
            if seen[idx] {
                continue;
            }
            seen[idx] = true;
            stack.extend(&self.children[idx]);
        }
        seen
    }

    /// Page the tree belongs to.
    #[must_use]
    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    /// Number of blocks in the tree.
    #[must_use]
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Whether the page has no blocks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Block by id.
    #[must_use]
    pub fn get(&self, id: BlockId) -> Option<&BlockRecord> {
        self.index.get(&id).map(|&i| &self.blocks[i])
    }

    /// Root-level blocks, ascending by position.
    pub fn roots(&self) -> impl ExactSizeIterator<Item = &BlockRecord> + '_ {
        self.roots.iter().map(|&i| &self.blocks[i])
    }

    /// Children of a block, ascending by position. Empty for unknown ids.
    pub fn children(&self, id: BlockId) -> impl ExactSizeIterator<Item = &BlockRecord> + '_ {
        self.index
            .get(&id)
            .map_or(&[][..], |&i| self.children[i].as_slice())
            .iter()
            .map(|&c| &self.blocks[c])
    }

    /// Ids of the root-level blocks.
    #[must_use]
    pub fn root_ids(&self) -> Vec<BlockId> {
        self.roots().map(|b| b.id).collect()
    }

    /// Ids of a block's children.
    #[must_use]
    pub fn child_ids(&self, id: BlockId) -> Vec<BlockId> {
        self.children(id).map(|b| b.id).collect()
    }

    /// Parent of a block, `None` for roots and unknown ids.
    #[must_use]
    pub fn parent(&self, id: BlockId) -> Option<&BlockRecord> {
        let idx = *self.index.get(&id)?;
        self.parents[idx].map(|p| &self.blocks[p])
    }

    /// Ancestors of a block, nearest first.
    #[must_use]
    pub fn ancestors(&self, id: BlockId) -> Vec<&BlockRecord> {
        let mut ancestors = Vec::new();
        let mut current = self.index.get(&id).and_then(|&i| self.parents[i]);
        while let Some(i) = current {
            ancestors.push(&self.blocks[i]);
            current = self.parents[i];
        }
        ancestors
    }

    /// Pre-order walk of the whole tree as `(depth, block)` pairs.
    ///
    /// Roots have depth 0.
    #[must_use]
    pub fn depth_first(&self) -> Vec<(usize, &BlockRecord)> {
        let mut out = Vec::with_capacity(self.blocks.len());
        let mut stack: Vec<(usize, usize)> = self.roots.iter().rev().map(|&i| (0, i)).collect();
        while let Some((depth, idx)) = stack.pop() {
            out.push((depth, &self.blocks[idx]));
            stack.extend(self.children[idx].iter().rev().map(|&c| (depth + 1, c)));
        }
        out
    }

    /// Describe the current shape as an edited tree.
    ///
    /// Every root becomes a top-level entry. Applying the result with the
    /// position editor renumbers siblings densely without moving anything.
    #[must_use]
    pub fn to_edited_tree(&self) -> EditedTree {
        self.roots.iter().map(|&i| self.edited_node(i)).collect()
    }

    fn edited_node(&self, idx: usize) -> EditedNode {
        let block = &self.blocks[idx];
        let children: EditedTree = self.children[idx]
            .iter()
            .map(|&c| self.edited_node(c))
            .collect();
        EditedNode::for_block(block.id, &block.block_type).with_children(children)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn block(id: i64, parent: Option<i64>, position: u32, block_type: &str) -> BlockRecord {
        BlockRecord {
            id: BlockId(id),
            page_id: PageId(1),
            parent_id: parent.map(BlockId),
            position,
            block_type: block_type.to_owned(),
            name: None,
            settings: serde_json::json!({}),
        }
    }

    fn ids(values: &[i64]) -> Vec<BlockId> {
        values.iter().copied().map(BlockId).collect()
    }

    #[test]
    fn test_from_records_builds_nested_tree() {
        let records = vec![
            block(2, None, 1, "core.container"),
            block(3, Some(2), 1, "core.text"),
            block(4, Some(2), 2, "core.action"),
        ];

        let tree = BlockTree::from_records(PageId(1), records, OrphanPolicy::Reject).unwrap();

        assert_eq!(tree.root_ids(), ids(&[2]));
        assert_eq!(tree.child_ids(BlockId(2)), ids(&[3, 4]));
        assert_eq!(tree.len(), 3);
    }

    #[test]
    fn test_from_records_keeps_input_order_for_siblings() {
        // Input is already sorted by position; ids are deliberately out of order.
        let records = vec![
            block(9, None, 1, "core.container"),
            block(1, None, 2, "core.container"),
            block(7, Some(9), 1, "core.text"),
            block(5, Some(9), 2, "core.text"),
            block(6, Some(9), 3, "core.text"),
        ];

        let tree = BlockTree::from_records(PageId(1), records, OrphanPolicy::Reject).unwrap();

        assert_eq!(tree.root_ids(), ids(&[9, 1]));
        assert_eq!(tree.child_ids(BlockId(9)), ids(&[7, 5, 6]));
    }

    #[test]
    fn test_from_records_child_before_parent() {
        // Child sorts before its parent when the child has a lower position.
        let records = vec![
            block(3, Some(2), 1, "core.text"),
            block(2, None, 2, "core.container"),
        ];

        let tree = BlockTree::from_records(PageId(1), records, OrphanPolicy::Reject).unwrap();

        assert_eq!(tree.root_ids(), ids(&[2]));
        assert_eq!(tree.child_ids(BlockId(2)), ids(&[3]));
    }

    #[test]
    fn test_from_records_empty_page() {
        let tree = BlockTree::from_records(PageId(1), Vec::new(), OrphanPolicy::Reject).unwrap();

        assert!(tree.is_empty());
        assert_eq!(tree.roots().len(), 0);
    }

    #[test]
    fn test_orphan_rejected_by_default() {
        let records = vec![
            block(2, None, 1, "core.container"),
            block(3, Some(42), 1, "core.text"),
        ];

        let err = BlockTree::from_records(PageId(1), records, OrphanPolicy::default()).unwrap_err();

        assert!(matches!(
            err,
            TreeError::OrphanedBlock { block, parent, .. }
                if block == BlockId(3) && parent == BlockId(42)
        ));
    }

    #[test]
    fn test_orphan_promoted_to_root() {
        let records = vec![
            block(2, None, 1, "core.container"),
            block(3, Some(42), 1, "core.text"),
        ];

        let tree = BlockTree::from_records(PageId(1), records, OrphanPolicy::Promote).unwrap();

        assert_eq!(tree.root_ids(), ids(&[2, 3]));
        assert!(tree.parent(BlockId(3)).is_none());
    }

    #[test]
    fn test_parent_cycle_rejected() {
        let records = vec![
            block(2, None, 1, "core.container"),
            block(5, Some(6), 1, "core.container"),
            block(6, Some(5), 1, "core.container"),
        ];

        let err = BlockTree::from_records(PageId(1), records, OrphanPolicy::Promote).unwrap_err();

        match err {
            TreeError::Cycle { page, unreachable } => {
                assert_eq!(page, PageId(1));
                assert_eq!(unreachable, ids(&[5, 6]));
            }
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn test_self_parent_rejected() {
        let records = vec![block(4, Some(4), 1, "core.container")];

        let err = BlockTree::from_records(PageId(1), records, OrphanPolicy::Reject).unwrap_err();

        assert!(matches!(err, TreeError::Cycle { .. }));
    }

    #[test]
    fn test_children_of_unknown_block_is_empty() {
        let tree = BlockTree::from_records(
            PageId(1),
            vec![block(2, None, 1, "core.container")],
            OrphanPolicy::Reject,
        )
        .unwrap();

        assert_eq!(tree.children(BlockId(99)).len(), 0);
        assert!(tree.get(BlockId(99)).is_none());
    }

    #[test]
    fn test_ancestors_nearest_first() {
        let records = vec![
            block(1, None, 1, "core.container"),
            block(2, Some(1), 1, "core.container"),
            block(3, Some(2), 1, "core.text"),
        ];
        let tree = BlockTree::from_records(PageId(1), records, OrphanPolicy::Reject).unwrap();

        let ancestors: Vec<BlockId> = tree.ancestors(BlockId(3)).iter().map(|b| b.id).collect();

        assert_eq!(ancestors, ids(&[2, 1]));
        assert_eq!(tree.parent(BlockId(3)).map(|b| b.id), Some(BlockId(2)));
        assert!(tree.ancestors(BlockId(1)).is_empty());
    }

    #[test]
    fn test_depth_first_preorder() {
        let records = vec![
            block(1, None, 1, "core.container"),
            block(5, None, 2, "core.container"),
            block(2, Some(1), 1, "core.container"),
            block(4, Some(1), 2, "core.text"),
            block(3, Some(2), 1, "core.text"),
        ];
        let tree = BlockTree::from_records(PageId(1), records, OrphanPolicy::Reject).unwrap();

        let walk: Vec<(usize, i64)> = tree
            .depth_first()
            .into_iter()
            .map(|(depth, b)| (depth, b.id.0))
            .collect();

        assert_eq!(walk, vec![(0, 1), (1, 2), (2, 3), (1, 4), (0, 5)]);
    }

    #[test]
    fn test_to_edited_tree_mirrors_shape() {
        let records = vec![
            block(2, None, 1, "core.container"),
            block(3, Some(2), 1, "core.text"),
            block(4, Some(2), 2, "core.action"),
        ];
        let tree = BlockTree::from_records(PageId(1), records, OrphanPolicy::Reject).unwrap();

        let edited = tree.to_edited_tree();

        let json = serde_json::to_value(&edited).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "cms-block-2": {
                    "type": "core.container",
                    "child": {
                        "cms-block-3": {"type": "core.text"},
                        "cms-block-4": {"type": "core.action"}
                    }
                }
            })
        );
    }
}
