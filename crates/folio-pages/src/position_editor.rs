//! Persists a reordered block tree.
//!
//! [`PositionEditor::save_position`] takes an [`EditedTree`] and rewrites the
//! parent, position and page of every block below its top-level entries so the
//! store matches the described shape. The whole call is one transaction: either
//! every placement is committed or none is.
//!
//! Top-level entries are anchors. They keep their own placement and only serve
//! as the parent of their listed children.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex};

use folio_store::{
    BlockId, BlockPlacement, PageId, Store, StoreError, StoreErrorKind, StoreTransaction,
};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::edited_tree::{EditedNode, EditedTree};

/// Error returned when an edit cannot be applied.
///
/// Every variant means nothing was committed.
#[derive(Debug, thiserror::Error)]
pub enum EditError {
    #[error("Invalid block code {0:?}, expected cms-block-<id>")]
    InvalidCode(String),
    #[error("Block {0} appears more than once in the edited tree")]
    DuplicateBlock(BlockId),
    #[error("Block {0} does not exist")]
    UnknownBlock(BlockId),
    /// The edit would make a block its own ancestor.
    #[error("Edit would place block {anchor} inside its own subtree")]
    Cycle { anchor: BlockId },
    /// A sibling group is not numbered `1..=expected` after the edit.
    ///
    /// `parent` is `None` for the root blocks of `page`.
    #[error(
        "Children of {} on page {page} have positions {positions:?}, expected 1..={expected}",
        sibling_group(.parent.as_ref())
    )]
    SiblingConflict {
        page: PageId,
        parent: Option<BlockId>,
        expected: usize,
        positions: Vec<u32>,
    },
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

fn sibling_group(parent: Option<&BlockId>) -> String {
    parent.map_or_else(|| "the page root".to_owned(), |id| format!("block {id}"))
}

/// One placement the editor will write.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Assignment {
    pub block: BlockId,
    pub parent: BlockId,
    /// 1-based index among the parent's listed children.
    pub position: u32,
}

/// Validated, flattened form of an edited tree.
///
/// Assignments are in pre-order, so a block's new parent is always written
/// before the block itself.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EditPlan {
    anchors: Vec<BlockId>,
    assignments: Vec<Assignment>,
    parents: Vec<BlockId>,
}

impl EditPlan {
    /// Flatten `tree`, checking codes and duplicates.
    ///
    /// # Errors
    ///
    /// Returns [`EditError::InvalidCode`] or [`EditError::DuplicateBlock`].
    pub fn from_tree(tree: &EditedTree) -> Result<Self, EditError> {
        let mut plan = Self::default();
        let mut seen = HashSet::new();

        for node in tree {
            let anchor = node_id(node, &mut seen)?;
            plan.anchors.push(anchor);
            plan.assign_positions(&node.children, anchor, &mut seen)?;
        }

        Ok(plan)
    }

    fn assign_positions(
        &mut self,
        children: &EditedTree,
        parent: BlockId,
        seen: &mut HashSet<BlockId>,
    ) -> Result<(), EditError> {
        if children.is_empty() {
            return Ok(());
        }
        self.parents.push(parent);

        for (position, child) in (1u32..).zip(children) {
            let block = node_id(child, seen)?;
            self.assignments.push(Assignment {
                block,
                parent,
                position,
            });
            self.assign_positions(&child.children, block, seen)?;
        }
        Ok(())
    }

    /// Top-level block ids, in input order.
    #[must_use]
    pub fn anchors(&self) -> &[BlockId] {
        &self.anchors
    }

    #[must_use]
    pub fn assignments(&self) -> &[Assignment] {
        &self.assignments
    }

    /// Blocks that receive at least one child.
    #[must_use]
    pub fn parents(&self) -> &[BlockId] {
        &self.parents
    }

    /// Every block the plan references, anchors first.
    fn blocks(&self) -> impl Iterator<Item = BlockId> + '_ {
        self.anchors
            .iter()
            .copied()
            .chain(self.assignments.iter().map(|a| a.block))
    }
}

fn node_id(node: &EditedNode, seen: &mut HashSet<BlockId>) -> Result<BlockId, EditError> {
    let id = node
        .block_id()
        .ok_or_else(|| EditError::InvalidCode(node.code.clone()))?;
    if !seen.insert(id) {
        return Err(EditError::DuplicateBlock(id));
    }
    Ok(id)
}

/// Outcome of a committed edit.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EditReport {
    /// Number of placements written.
    pub updated: usize,
    /// Pages whose blocks were read or moved.
    pub pages: BTreeSet<PageId>,
    pub anchors: Vec<BlockId>,
}

/// In-process advisory locks keyed by page.
///
/// Clones share the same lock table. Entries nobody holds or waits on are
/// pruned on the next [`PageLocks::acquire`], so the table only tracks pages
/// with editors in flight.
#[derive(Clone, Debug, Default)]
pub struct PageLocks {
    table: Arc<Mutex<HashMap<PageId, Arc<AsyncMutex<()>>>>>,
}

impl PageLocks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock every page in ascending id order.
    ///
    /// # Panics
    ///
    /// Panics if the lock table is poisoned.
    pub async fn acquire(&self, pages: &BTreeSet<PageId>) -> Vec<OwnedMutexGuard<()>> {
        let mutexes: Vec<Arc<AsyncMutex<()>>> = {
            let mut table = self.table.lock().unwrap();
            // Only the table holds these: no guard and no waiter.
            table.retain(|_, mutex| Arc::strong_count(mutex) > 1);
            pages
                .iter()
                .map(|&page| Arc::clone(table.entry(page).or_default()))
                .collect()
        };

        let mut guards = Vec::with_capacity(mutexes.len());
        for mutex in mutexes {
            guards.push(mutex.lock_owned().await);
        }
        guards
    }

    /// Number of pages currently in the lock table.
    ///
    /// # Panics
    ///
    /// Panics if the lock table is poisoned.
    #[must_use]
    pub fn tracked_pages(&self) -> usize {
        self.table.lock().unwrap().len()
    }

    /// Whether some editor currently holds the page.
    ///
    /// # Panics
    ///
    /// Panics if the lock table is poisoned.
    #[must_use]
    pub fn is_locked(&self, page: PageId) -> bool {
        self.table
            .lock()
            .unwrap()
            .get(&page)
            .is_some_and(|mutex| mutex.try_lock().is_err())
    }
}

/// Applies edited trees to a store.
pub struct PositionEditor<'s, S: Store> {
    store: &'s S,
    locks: PageLocks,
    verify_sibling_positions: bool,
}

impl<'s, S: Store> PositionEditor<'s, S> {
    /// Create an editor with its own lock table and sibling verification on.
    #[must_use]
    pub fn new(store: &'s S) -> Self {
        Self {
            store,
            locks: PageLocks::default(),
            verify_sibling_positions: true,
        }
    }

    /// Share a lock table with other editors.
    #[must_use]
    pub fn with_locks(mut self, locks: PageLocks) -> Self {
        self.locks = locks;
        self
    }

    /// Check that every sibling group the edit writes into or moves blocks
    /// out of ends up with positions `1..N`.
    #[must_use]
    pub fn with_sibling_verification(mut self, enabled: bool) -> Self {
        self.verify_sibling_positions = enabled;
        self
    }

    /// Rewrite block placements to match `tree`.
    ///
    /// For each top-level entry, its children get the entry as parent and
    /// positions `1, 2, 3, ...` in listed order, and take the page their new
    /// parent currently has. Nested entries are handled the same way with the
    /// child as parent. Re-applying the same tree leaves the store unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`EditError`] on invalid input, a failed check, or a store
    /// failure. The transaction is rolled back in every error case.
    pub async fn save_position(&self, tree: &EditedTree) -> Result<EditReport, EditError> {
        let plan = EditPlan::from_tree(tree)?;
        self.apply(&plan).await
    }

    /// Apply an already validated plan.
    ///
    /// # Errors
    ///
    /// See [`PositionEditor::save_position`].
    pub async fn apply(&self, plan: &EditPlan) -> Result<EditReport, EditError> {
        if plan.anchors().is_empty() {
            return Ok(EditReport::default());
        }

        let pages = self.touched_pages(plan).await?;
        let _guards = self.locks.acquire(&pages).await;

        let mut tx = self.store.begin().await?;
        match write_plan(&mut tx, plan, &pages, self.verify_sibling_positions).await {
            Ok(updated) => {
                tx.commit().await?;
                tracing::info!(
                    updated,
                    pages = ?pages,
                    anchors = ?plan.anchors(),
                    "Saved block positions"
                );
                Ok(EditReport {
                    updated,
                    pages,
                    anchors: plan.anchors().to_vec(),
                })
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::warn!(error = %rollback_err, "Rollback after failed edit failed");
                }
                tracing::warn!(error = %err, "Block positions not saved");
                Err(err)
            }
        }
    }

    /// Read the current page of every referenced block without writing.
    async fn touched_pages(&self, plan: &EditPlan) -> Result<BTreeSet<PageId>, EditError> {
        let mut tx = self.store.begin().await?;
        let mut pages = BTreeSet::new();
        let mut outcome = Ok(());

        for block in plan.blocks() {
            match tx.block_location(block).await {
                Ok(Some(location)) => {
                    pages.insert(location.page_id);
                }
                Ok(None) => {
                    outcome = Err(EditError::UnknownBlock(block));
                    break;
                }
                Err(err) => {
                    outcome = Err(err.into());
                    break;
                }
            }
        }

        tx.rollback().await?;
        outcome.map(|()| pages)
    }
}

async fn write_plan<T: StoreTransaction>(
    tx: &mut T,
    plan: &EditPlan,
    locked: &BTreeSet<PageId>,
    verify_siblings: bool,
) -> Result<usize, EditError> {
    for &anchor in plan.anchors() {
        let location = tx
            .block_location(anchor)
            .await?
            .ok_or(EditError::UnknownBlock(anchor))?;
        ensure_locked(locked, location.page_id, anchor)?;
    }

    // Sibling groups blocks were moved out of, as (page, parent).
    let mut vacated = BTreeSet::new();

    for assignment in plan.assignments() {
        let parent = tx
            .block_location(assignment.parent)
            .await?
            .ok_or(EditError::UnknownBlock(assignment.parent))?;
        let current = tx
            .block_location(assignment.block)
            .await?
            .ok_or(EditError::UnknownBlock(assignment.block))?;
        ensure_locked(locked, current.page_id, assignment.block)?;
        if current.parent_id != Some(assignment.parent) || current.page_id != parent.page_id {
            vacated.insert((current.page_id, current.parent_id));
        }

        tx.update_block_placement(&BlockPlacement {
            block_id: assignment.block,
            parent_id: assignment.parent,
            position: assignment.position,
            page_id: parent.page_id,
        })
        .await?;
    }

    for &anchor in plan.anchors() {
        check_ancestry(tx, anchor).await?;
    }

    if verify_siblings {
        let mut checked = HashSet::new();
        for &parent in plan.parents() {
            let location = tx
                .block_location(parent)
                .await?
                .ok_or(EditError::UnknownBlock(parent))?;
            let group = (location.page_id, Some(parent));
            check_siblings(tx, group).await?;
            checked.insert(group);
        }
        for group in vacated {
            if !checked.contains(&group) {
                check_siblings(tx, group).await?;
            }
        }
    }

    Ok(plan.assignments().len())
}

/// A block moved to another page after the locks were chosen.
fn ensure_locked(
    locked: &BTreeSet<PageId>,
    page: PageId,
    block: BlockId,
) -> Result<(), EditError> {
    if locked.contains(&page) {
        Ok(())
    } else {
        Err(StoreError::new(StoreErrorKind::Conflict)
            .with_context(format!("block {block} moved to page {page} during edit"))
            .into())
    }
}

async fn check_ancestry<T: StoreTransaction>(tx: &mut T, anchor: BlockId) -> Result<(), EditError> {
    let mut visited = HashSet::from([anchor]);
    let mut current = anchor;

    while let Some(location) = tx.block_location(current).await? {
        let Some(parent) = location.parent_id else {
            return Ok(());
        };
        if !visited.insert(parent) {
            return Err(EditError::Cycle { anchor });
        }
        current = parent;
    }

    // Dangling parent reference; the loader reports it on the next read.
    Ok(())
}

async fn check_siblings<T: StoreTransaction>(
    tx: &mut T,
    (page, parent): (PageId, Option<BlockId>),
) -> Result<(), EditError> {
    let siblings = tx.sibling_positions(page, parent).await?;

    let dense = (1u32..).zip(&siblings).all(|(want, &(_, got))| want == got);
    if dense {
        return Ok(());
    }

    Err(EditError::SiblingConflict {
        page,
        parent,
        expected: siblings.len(),
        positions: siblings.into_iter().map(|(_, position)| position).collect(),
    })
}
