use std::fmt;

use crate::commands::flags::FlagSpec;
use crate::dispatch::Invocation;

/// Error type returned by setup hooks and command actions
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Callable run when a command is dispatched.
///
/// `C` is the context injected by the caller at dispatch time.
pub type Action<C> = Box<dyn Fn(&C, &Invocation) -> Result<(), BoxError> + Send + Sync>;

/// Setup callable attached to the root or to a group, receiving the scope name
pub type SetupHook<C> = Box<dyn Fn(&C, &str) -> Result<(), BoxError> + Send + Sync>;

/// Index of a node inside its [`CommandTree`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

/// A single named command, linked to its parent by index
pub struct CommandNode<C> {
    name: String,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    aliases: Vec<String>,
    about: Option<String>,
    long_about: Option<String>,
    flags: Vec<FlagSpec>,
    action: Option<Action<C>>,
    setup_hook: Option<SetupHook<C>>,
}

impl<C> CommandNode<C> {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        CommandNode {
            name: name.into(),
            parent: None,
            children: Vec::new(),
            aliases: Vec::new(),
            about: None,
            long_about: None,
            flags: Vec::new(),
            action: None,
            setup_hook: None,
        }
    }

    #[must_use]
    pub fn about(mut self, about: impl Into<String>) -> Self {
        self.about = Some(about.into());
        self
    }

    #[must_use]
    pub fn long_about(mut self, long_about: impl Into<String>) -> Self {
        self.long_about = Some(long_about.into());
        self
    }

    #[must_use]
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    #[must_use]
    pub fn flag(mut self, flag: FlagSpec) -> Self {
        self.flags.push(flag);
        self
    }

    #[must_use]
    pub fn action<F>(mut self, action: F) -> Self
    where
        F: Fn(&C, &Invocation) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.action = Some(Box::new(action));
        self
    }

    #[must_use]
    pub fn setup_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(&C, &str) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.setup_hook = Some(Box::new(hook));
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Children in registration order.
    #[must_use]
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    #[must_use]
    pub fn aliases(&self) -> &[String] {
        &self.aliases
    }

    #[must_use]
    pub fn about_text(&self) -> Option<&str> {
        self.about.as_deref()
    }

    #[must_use]
    pub fn long_about_text(&self) -> Option<&str> {
        self.long_about.as_deref()
    }

    #[must_use]
    pub fn flags(&self) -> &[FlagSpec] {
        &self.flags
    }

    #[must_use]
    pub fn has_action(&self) -> bool {
        self.action.is_some()
    }

    pub(crate) fn action_fn(&self) -> Option<&Action<C>> {
        self.action.as_ref()
    }

    pub(crate) fn hook_fn(&self) -> Option<&SetupHook<C>> {
        self.setup_hook.as_ref()
    }

    fn answers_to(&self, name: &str) -> bool {
        self.name == name || self.aliases.iter().any(|a| a == name)
    }
}

impl<C> fmt::Debug for CommandNode<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandNode")
            .field("name", &self.name)
            .field("parent", &self.parent)
            .field("children", &self.children)
            .field("aliases", &self.aliases)
            .field("flags", &self.flags)
            .field("action", &self.action.is_some())
            .field("setup_hook", &self.setup_hook.is_some())
            .finish_non_exhaustive()
    }
}

/// Command hierarchy stored as an arena.
///
/// The tree owns every node; children refer to their parent by [`NodeId`], so there
/// are no reference cycles. Nodes can only be created beneath an existing node, which
/// keeps the structure acyclic with exactly one root.
pub struct CommandTree<C> {
    nodes: Vec<CommandNode<C>>,
}

impl<C> CommandTree<C> {
    /// Create a tree whose root is `root`.
    #[must_use]
    pub fn new(mut root: CommandNode<C>) -> Self {
        root.parent = None;
        root.children.clear();
        CommandTree { nodes: vec![root] }
    }

    #[must_use]
    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    /// Register `node` as the last child of `parent`.
    ///
    /// # Panics
    ///
    /// Panics if `parent` does not belong to this tree, if a sibling already answers
    /// to the node's name or one of its aliases, or if a setup hook is attached below
    /// group level. These are construction mistakes in the static command table.
    pub fn add_command(&mut self, parent: NodeId, mut node: CommandNode<C>) -> NodeId {
        assert!(
            parent.0 < self.nodes.len(),
            "parent {parent:?} is not part of this tree"
        );
        assert!(
            node.setup_hook.is_none() || parent == self.root(),
            "setup hook on '{}' is only allowed at root or group level",
            node.name
        );
        for sibling in &self.nodes[parent.0].children {
            let sibling = &self.nodes[sibling.0];
            let clash = std::iter::once(&node.name)
                .chain(&node.aliases)
                .find(|name| sibling.answers_to(name));
            assert!(
                clash.is_none(),
                "command '{}' registered twice under '{}'",
                clash.map_or("", String::as_str),
                self.nodes[parent.0].name
            );
        }

        let id = NodeId(self.nodes.len());
        node.parent = Some(parent);
        node.children.clear();
        self.nodes.push(node);
        self.nodes[parent.0].children.push(id);
        id
    }

    /// # Panics
    ///
    /// Panics if `id` was produced by a different tree.
    #[must_use]
    pub fn node(&self, id: NodeId) -> &CommandNode<C> {
        &self.nodes[id.0]
    }

    #[must_use]
    pub fn get(&self, id: NodeId) -> Option<&CommandNode<C>> {
        self.nodes.get(id.0)
    }

    /// Find the direct child of `parent` answering to `name` (by name or alias).
    #[must_use]
    pub fn child(&self, parent: NodeId, name: &str) -> Option<NodeId> {
        self.get(parent)?
            .children
            .iter()
            .copied()
            .find(|&child| self.nodes[child.0].answers_to(name))
    }

    /// Look up a node by the names below the root, e.g. `["node", "start"]`.
    ///
    /// An empty path yields the root.
    #[must_use]
    pub fn find(&self, path: &[&str]) -> Option<NodeId> {
        path.iter()
            .try_fold(self.root(), |current, name| self.child(current, name))
    }

    /// Number of nodes, including the root.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Iterate over every node in registration order, root first.
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &CommandNode<C>)> {
        self.nodes.iter().enumerate().map(|(i, n)| (NodeId(i), n))
    }
}

impl<C> fmt::Debug for CommandTree<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandTree")
            .field("nodes", &self.nodes)
            .finish()
    }
}
