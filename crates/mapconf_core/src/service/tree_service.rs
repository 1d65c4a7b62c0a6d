//! Tree reconciliation use-case service.
//!
//! # Responsibility
//! - Turn a client-submitted ordered forest into parent/rank state.
//! - Rebuild the stored forest of a section for round-tripping to clients.
//!
//! # Invariants
//! - Malformed submissions are rejected before any row is touched.
//! - A submission is applied atomically or not at all.
//! - Records absent from a submission keep their stored placement.

use crate::model::record::{Record, RecordId, Section, TreeNode};
use crate::repo::record_repo::{RecordRepository, RepoResult};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

/// Tree reconciliation service facade.
pub struct TreeService<R: RecordRepository> {
    repo: R,
}

impl<R: RecordRepository> TreeService<R> {
    /// Creates service from repository implementation.
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Applies a typed forest. Returns submitted ids in depth-first pre-order.
    pub fn reconcile(
        &self,
        section: Section,
        project: &str,
        forest: &[TreeNode],
    ) -> RepoResult<Vec<RecordId>> {
        self.repo.reconcile_tree(section, project, forest)
    }

    /// Parses and applies a forest in client JSON form.
    ///
    /// Each node is an object; `_id` marks an existing record, `_children`
    /// holds the ordered child nodes, and all other keys form the payload.
    pub fn reconcile_json(
        &self,
        section: Section,
        project: &str,
        tree: &Value,
    ) -> RepoResult<Vec<RecordId>> {
        let forest = TreeNode::forest_from_json(tree)?;
        self.reconcile(section, project, &forest)
    }

    /// Loads the stored forest of one section as `Existing` nodes.
    ///
    /// Submitting the result back unchanged is a no-op on parent/rank state.
    pub fn load_forest(&self, section: Section, project: &str) -> RepoResult<Vec<TreeNode>> {
        let records = self.repo.list_records(section, project)?;

        let mut children_of: BTreeMap<Option<RecordId>, Vec<RecordId>> = BTreeMap::new();
        let mut by_id: HashMap<RecordId, Record> = HashMap::with_capacity(records.len());
        for record in records {
            children_of
                .entry(record.parent_id)
                .or_default()
                .push(record.id);
            by_id.insert(record.id, record);
        }

        let roots = children_of.get(&None).cloned().unwrap_or_default();

        let mut preorder = Vec::with_capacity(by_id.len());
        let mut stack: Vec<RecordId> = roots.iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            preorder.push(id);
            if let Some(children) = children_of.get(&Some(id)) {
                stack.extend(children.iter().rev().copied());
            }
        }

        // Children always follow their parent in pre-order, so building in
        // reverse finishes every subtree before its parent needs it.
        let mut built: HashMap<RecordId, TreeNode> = HashMap::with_capacity(preorder.len());
        for id in preorder.into_iter().rev() {
            let Some(record) = by_id.remove(&id) else {
                continue;
            };
            let children = children_of
                .get(&Some(id))
                .map(|ids| ids.iter().filter_map(|child| built.remove(child)).collect())
                .unwrap_or_default();
            built.insert(
                id,
                TreeNode::Existing {
                    id,
                    payload: record.data,
                    children,
                },
            );
        }

        Ok(roots
            .iter()
            .filter_map(|root| built.remove(root))
            .collect())
    }
}
