//! Locating a command within its hierarchy.
//!
//! Both lookups are total: an absent node or the root simply resolves to nothing,
//! they never fail.

use crate::commands::flags::FlagSpec;
use crate::commands::tree::{CommandTree, NodeId};

impl<C> CommandTree<C> {
    /// Iterate from `node` up to the root, `node` first.
    pub fn ancestors(&self, node: Option<NodeId>) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(node, |&current| self.node(current).parent())
    }

    /// Names from the root down to `node`, inclusive.
    ///
    /// For `peer node start` this is `["peer", "node", "start"]`. An absent node yields
    /// an empty path, the root yields just its own name.
    #[must_use]
    pub fn path_of(&self, node: Option<NodeId>) -> Vec<&str> {
        let mut path: Vec<&str> = self
            .ancestors(node)
            .map(|id| self.node(id).name())
            .collect();
        path.reverse();
        path
    }

    /// The top-level group containing `node`: the ancestor whose own parent is the root.
    ///
    /// A direct child of the root is its own group. The walk does not stop at the first
    /// ancestor, so `node -> sub -> leaf -> sub-leaf` still resolves to `node`. The root
    /// and an absent node have no group.
    #[must_use]
    pub fn group_of(&self, node: Option<NodeId>) -> Option<NodeId> {
        let mut current = node?;
        while let Some(parent) = self.node(current).parent() {
            if self.node(parent).parent().is_none() {
                return Some(current);
            }
            current = parent;
        }
        None
    }

    /// Name of the group containing `node`, or an empty string when there is none.
    #[must_use]
    pub fn group_name_of(&self, node: Option<NodeId>) -> &str {
        self.group_of(node).map_or("", |group| self.node(group).name())
    }

    /// Persistent flags declared by the ancestors of `node`, outermost first.
    pub fn inherited_flags(&self, node: NodeId) -> impl Iterator<Item = &FlagSpec> + '_ {
        let mut ancestors: Vec<NodeId> = self.ancestors(self.node(node).parent()).collect();
        ancestors.reverse();
        ancestors
            .into_iter()
            .flat_map(|id| self.node(id).flags().iter().filter(|f| f.persistent))
    }

    /// Every flag usable when invoking `node`: inherited persistent flags plus its own.
    #[must_use]
    pub fn flags_in_scope(&self, node: NodeId) -> Vec<&FlagSpec> {
        self.inherited_flags(node)
            .chain(self.node(node).flags())
            .collect()
    }
}
