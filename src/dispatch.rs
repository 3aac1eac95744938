//! Hook sequencing and command dispatch.
//!
//! Each invocation moves through a fixed sequence of stages:
//!
//! ```text
//! NotStarted -> RootHookRun -> GroupHookRun -> ActionRun -> Done
//! ```
//!
//! Any stage can end in `Failed`, which stops the sequence; the failing stage is
//! carried by [`DispatchError::stage`]. The root hook runs at most once per
//! [`Dispatcher`], the group hook runs according to the dispatcher's
//! [`GroupHookPolicy`], and the target's action always runs last.

use std::fmt;

use log::{debug, trace};
use parking_lot::Mutex;
use thiserror::Error;

use crate::commands::flags::FlagValues;
use crate::commands::tree::{BoxError, CommandTree, NodeId};

/// A parsed request to run one command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub node: NodeId,
    pub args: Vec<String>,
    pub flags: FlagValues,
}

impl Invocation {
    #[must_use]
    pub fn new(node: NodeId) -> Self {
        Invocation {
            node,
            args: Vec::new(),
            flags: FlagValues::new(),
        }
    }

    #[must_use]
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_flags(mut self, flags: FlagValues) -> Self {
        self.flags = flags;
        self
    }
}

/// Position of an invocation within the tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved<'t> {
    pub path: Vec<&'t str>,
    pub group: Option<NodeId>,
    pub group_name: &'t str,
}

/// Stage of the sequence that produced a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    RootHookRun,
    GroupHookRun,
    ActionRun,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::RootHookRun => "root hook",
            Stage::GroupHookRun => "group hook",
            Stage::ActionRun => "action",
        };
        f.write_str(name)
    }
}

/// When group hooks run across successive invocations on one dispatcher
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GroupHookPolicy {
    /// Run the group hook on every invocation that resolves to a group.
    #[default]
    EveryInvocation,
    /// Skip the group hook when the group equals the previous invocation's group.
    OnGroupChange,
}

/// Failure of a dispatched invocation, by the stage that produced it
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("failed to initialize '{root}': {source}")]
    RootSetup {
        root: String,
        #[source]
        source: BoxError,
    },
    #[error("failed to initialize command group '{group}': {source}")]
    GroupSetup {
        group: String,
        #[source]
        source: BoxError,
    },
    #[error("{}: {source}", .path.join(" "))]
    Action {
        path: Vec<String>,
        #[source]
        source: BoxError,
    },
    #[error("'{}' has no action of its own, a subcommand is required", .path.join(" "))]
    NoAction { path: Vec<String> },
}

impl DispatchError {
    /// Stage that was running when the invocation failed.
    #[must_use]
    pub fn stage(&self) -> Stage {
        match self {
            DispatchError::RootSetup { .. } => Stage::RootHookRun,
            DispatchError::GroupSetup { .. } => Stage::GroupHookRun,
            DispatchError::Action { .. } | DispatchError::NoAction { .. } => Stage::ActionRun,
        }
    }

    /// Root setup failures leave the process unable to serve any command.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, DispatchError::RootSetup { .. })
    }

    /// Non-zero process exit status for this failure.
    #[must_use]
    pub fn exit_code(&self) -> u8 {
        match self {
            DispatchError::RootSetup { .. } => 2,
            DispatchError::GroupSetup { .. }
            | DispatchError::Action { .. }
            | DispatchError::NoAction { .. } => 1,
        }
    }
}

#[derive(Debug, Default)]
struct SequencerState {
    root_done: bool,
    last_group: Option<NodeId>,
}

/// Runs invocations against a command tree, sequencing setup hooks before actions.
///
/// Hook execution is serialized across threads; actions run outside the lock so an
/// action may itself dispatch through the same dispatcher. Setup hooks run while the
/// lock is held and must not dispatch through the dispatcher that invoked them: the
/// lock is not reentrant and such a call deadlocks.
pub struct Dispatcher<'t, C> {
    tree: &'t CommandTree<C>,
    policy: GroupHookPolicy,
    state: Mutex<SequencerState>,
}

impl<'t, C> Dispatcher<'t, C> {
    #[must_use]
    pub fn new(tree: &'t CommandTree<C>) -> Self {
        Self::with_policy(tree, GroupHookPolicy::default())
    }

    #[must_use]
    pub fn with_policy(tree: &'t CommandTree<C>, policy: GroupHookPolicy) -> Self {
        Dispatcher {
            tree,
            policy,
            state: Mutex::new(SequencerState::default()),
        }
    }

    #[must_use]
    pub fn tree(&self) -> &'t CommandTree<C> {
        self.tree
    }

    #[must_use]
    pub fn policy(&self) -> GroupHookPolicy {
        self.policy
    }

    /// Whether the root hook has completed successfully on this dispatcher.
    #[must_use]
    pub fn root_initialized(&self) -> bool {
        self.state.lock().root_done
    }

    /// Compute the path and group of an invocation's target.
    #[must_use]
    pub fn resolve(&self, invocation: &Invocation) -> Resolved<'t> {
        let node = Some(invocation.node);
        Resolved {
            path: self.tree.path_of(node),
            group: self.tree.group_of(node),
            group_name: self.tree.group_name_of(node),
        }
    }

    /// Run the root hook (once), the group hook, then the target's action.
    ///
    /// # Errors
    ///
    /// Returns the first failure, tagged with the stage that produced it:
    /// `RootSetup`, `GroupSetup`, `Action`, or `NoAction` when the target has no action.
    pub fn dispatch(&self, context: &C, invocation: &Invocation) -> Result<(), DispatchError> {
        let resolved = self.resolve(invocation);
        let path: Vec<String> = resolved.path.iter().map(ToString::to_string).collect();
        debug!("Dispatching '{}'", path.join(" "));

        let result = self.run_stages(context, invocation, &resolved, &path);
        if let Err(e) = &result {
            debug!("Dispatch of '{}' failed during {}: {e}", path.join(" "), e.stage());
        }
        result
    }

    fn run_stages(
        &self,
        context: &C,
        invocation: &Invocation,
        resolved: &Resolved<'t>,
        path: &[String],
    ) -> Result<(), DispatchError> {
        {
            let mut state = self.state.lock();

            if !state.root_done {
                let root = self.tree.node(self.tree.root());
                if let Some(hook) = root.hook_fn() {
                    debug!("Running root setup for '{}'", root.name());
                    hook(context, root.name()).map_err(|source| DispatchError::RootSetup {
                        root: root.name().to_string(),
                        source,
                    })?;
                }
                state.root_done = true;
            }

            // The root has no group; dispatching it still counts as a group change.
            let repeat = state.last_group == resolved.group;
            state.last_group = resolved.group;
            if let Some(group) = resolved.group {
                if repeat && self.policy == GroupHookPolicy::OnGroupChange {
                    trace!("Group '{}' already initialized", resolved.group_name);
                } else if let Some(hook) = self.tree.node(group).hook_fn() {
                    debug!("Running group setup for '{}'", resolved.group_name);
                    if let Err(source) = hook(context, resolved.group_name) {
                        state.last_group = None;
                        return Err(DispatchError::GroupSetup {
                            group: resolved.group_name.to_string(),
                            source,
                        });
                    }
                }
            }
        }

        trace!("Running action for '{}'", path.join(" "));
        let Some(action) = self.tree.node(invocation.node).action_fn() else {
            return Err(DispatchError::NoAction {
                path: path.to_vec(),
            });
        };
        action(context, invocation).map_err(|source| DispatchError::Action {
            path: path.to_vec(),
            source,
        })
    }
}

impl<C> fmt::Debug for Dispatcher<'_, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("policy", &self.policy)
            .field("state", &*self.state.lock())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::tree::CommandNode;

    /// Records every hook and action call in order.
    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<String>>,
        fail_root: bool,
        fail_group: Option<&'static str>,
    }

    impl Recorder {
        fn record(&self, entry: impl Into<String>) {
            self.calls.lock().push(entry.into());
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().clone()
        }
    }

    fn group(name: &str) -> CommandNode<Recorder> {
        CommandNode::new(name).setup_hook(|rec: &Recorder, group| {
            rec.record(format!("group:{group}"));
            if rec.fail_group == Some(group) {
                return Err(format!("logging spec for {group} is invalid").into());
            }
            Ok(())
        })
    }

    fn leaf(name: &'static str) -> CommandNode<Recorder> {
        CommandNode::new(name).action(move |rec: &Recorder, inv| {
            rec.record(format!("action:{name}:{}", inv.args.join(",")));
            Ok(())
        })
    }

    fn tree() -> CommandTree<Recorder> {
        let root = CommandNode::new("peer").setup_hook(|rec: &Recorder, root| {
            rec.record(format!("root:{root}"));
            if rec.fail_root {
                return Err("cannot load configuration".into());
            }
            Ok(())
        });
        let mut tree = CommandTree::new(root);
        let node = tree.add_command(tree.root(), group("node"));
        tree.add_command(node, leaf("start"));
        let network = tree.add_command(tree.root(), group("network"));
        tree.add_command(network, leaf("login"));
        tree.add_command(
            network,
            CommandNode::new("fail")
                .action(|_: &Recorder, _| Err("peer unreachable".into())),
        );
        let chaincode = tree.add_command(tree.root(), group("chaincode"));
        let deep = tree.add_command(chaincode, CommandNode::new("package"));
        tree.add_command(deep, leaf("sign"));
        tree
    }

    fn invoke(tree: &CommandTree<Recorder>, path: &[&str]) -> Invocation {
        Invocation::new(tree.find(path).unwrap())
    }

    #[test]
    fn test_leaf_dispatch_runs_hooks_in_order() {
        let tree = tree();
        let dispatcher = Dispatcher::new(&tree);
        let rec = Recorder::default();
        let inv = invoke(&tree, &["node", "start"]).with_args(["a", "b"]);

        let resolved = dispatcher.resolve(&inv);
        assert_eq!(resolved.path, ["peer", "node", "start"]);
        assert_eq!(resolved.group_name, "node");

        dispatcher.dispatch(&rec, &inv).unwrap();
        assert_eq!(rec.calls(), ["root:peer", "group:node", "action:start:a,b"]);
        assert!(dispatcher.root_initialized());
    }

    #[test]
    fn test_group_without_action_reports_no_action_after_hooks() {
        let tree = tree();
        let dispatcher = Dispatcher::new(&tree);
        let rec = Recorder::default();

        let err = dispatcher
            .dispatch(&rec, &invoke(&tree, &["node"]))
            .unwrap_err();
        match &err {
            DispatchError::NoAction { path } => assert_eq!(path, &["peer", "node"]),
            other => panic!("Expected NoAction, got: {other:?}"),
        }
        assert_eq!(err.stage(), Stage::ActionRun);
        assert_eq!(rec.calls(), ["root:peer", "group:node"]);
    }

    #[test]
    fn test_root_dispatch_skips_group_hook() {
        let tree = tree();
        let dispatcher = Dispatcher::new(&tree);
        let rec = Recorder::default();

        let err = dispatcher
            .dispatch(&rec, &Invocation::new(tree.root()))
            .unwrap_err();
        assert!(matches!(err, DispatchError::NoAction { .. }));
        assert_eq!(rec.calls(), ["root:peer"]);
    }

    #[test]
    fn test_root_hook_runs_once_across_invocations() {
        let tree = tree();
        let dispatcher = Dispatcher::new(&tree);
        let rec = Recorder::default();

        let _ = dispatcher.dispatch(&rec, &invoke(&tree, &["node"]));
        let _ = dispatcher.dispatch(&rec, &invoke(&tree, &["network"]));
        dispatcher
            .dispatch(&rec, &invoke(&tree, &["network", "login"]).with_args(["jim"]))
            .unwrap();

        assert_eq!(
            rec.calls(),
            [
                "root:peer",
                "group:node",
                "group:network",
                "group:network",
                "action:login:jim"
            ]
        );
    }

    #[test]
    fn test_on_group_change_policy_skips_repeated_group() {
        let tree = tree();
        let dispatcher = Dispatcher::with_policy(&tree, GroupHookPolicy::OnGroupChange);
        let rec = Recorder::default();

        dispatcher
            .dispatch(&rec, &invoke(&tree, &["network", "login"]))
            .unwrap();
        dispatcher
            .dispatch(&rec, &invoke(&tree, &["network", "login"]))
            .unwrap();
        dispatcher
            .dispatch(&rec, &invoke(&tree, &["node", "start"]))
            .unwrap();

        assert_eq!(
            rec.calls(),
            [
                "root:peer",
                "group:network",
                "action:login:",
                "action:login:",
                "group:node",
                "action:start:"
            ]
        );
    }

    #[test]
    fn test_on_group_change_policy_reruns_group_after_root_invocation() {
        let tree = tree();
        let dispatcher = Dispatcher::with_policy(&tree, GroupHookPolicy::OnGroupChange);
        let rec = Recorder::default();

        dispatcher
            .dispatch(&rec, &invoke(&tree, &["node", "start"]))
            .unwrap();
        let err = dispatcher
            .dispatch(&rec, &Invocation::new(tree.root()))
            .unwrap_err();
        assert_eq!(err.stage(), Stage::ActionRun);
        dispatcher
            .dispatch(&rec, &invoke(&tree, &["node", "start"]))
            .unwrap();

        let calls = rec.calls();
        assert_eq!(calls.iter().filter(|c| *c == "group:node").count(), 2);
        assert_eq!(
            calls,
            [
                "root:peer",
                "group:node",
                "action:start:",
                "group:node",
                "action:start:"
            ]
        );
    }

    #[test]
    fn test_error_stage_matches_failing_step() {
        let tree = tree();
        let dispatcher = Dispatcher::new(&tree);
        let failing_root = Recorder {
            fail_root: true,
            ..Default::default()
        };
        let err = dispatcher
            .dispatch(&failing_root, &invoke(&tree, &["node", "start"]))
            .unwrap_err();
        assert_eq!(err.stage(), Stage::RootHookRun);

        let failing_group = Recorder {
            fail_group: Some("node"),
            ..Default::default()
        };
        let err = dispatcher
            .dispatch(&failing_group, &invoke(&tree, &["node", "start"]))
            .unwrap_err();
        assert_eq!(err.stage(), Stage::GroupHookRun);
        assert_eq!(err.stage().to_string(), "group hook");

        let err = dispatcher
            .dispatch(&Recorder::default(), &invoke(&tree, &["network", "fail"]))
            .unwrap_err();
        assert_eq!(err.stage(), Stage::ActionRun);
    }

    #[test]
    fn test_root_failure_stops_before_group_and_action() {
        let tree = tree();
        let dispatcher = Dispatcher::new(&tree);
        let rec = Recorder {
            fail_root: true,
            ..Default::default()
        };

        let err = dispatcher
            .dispatch(&rec, &invoke(&tree, &["node", "start"]))
            .unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(err.exit_code(), 2);
        assert_eq!(
            err.to_string(),
            "failed to initialize 'peer': cannot load configuration"
        );
        assert_eq!(rec.calls(), ["root:peer"]);
        assert!(!dispatcher.root_initialized());
    }

    #[test]
    fn test_group_failure_stops_before_action() {
        let tree = tree();
        let dispatcher = Dispatcher::new(&tree);
        let rec = Recorder {
            fail_group: Some("network"),
            ..Default::default()
        };

        let err = dispatcher
            .dispatch(&rec, &invoke(&tree, &["network", "login"]))
            .unwrap_err();
        match &err {
            DispatchError::GroupSetup { group, .. } => assert_eq!(group, "network"),
            other => panic!("Expected GroupSetup, got: {other:?}"),
        }
        assert!(!err.is_fatal());
        assert_eq!(rec.calls(), ["root:peer", "group:network"]);

        // A later invocation in another group still proceeds.
        dispatcher
            .dispatch(&rec, &invoke(&tree, &["node", "start"]))
            .unwrap();
        assert_eq!(
            rec.calls(),
            ["root:peer", "group:network", "group:node", "action:start:"]
        );
    }

    #[test]
    fn test_action_error_keeps_message_and_path() {
        let tree = tree();
        let dispatcher = Dispatcher::new(&tree);
        let rec = Recorder::default();

        let err = dispatcher
            .dispatch(&rec, &invoke(&tree, &["network", "fail"]))
            .unwrap_err();
        assert_eq!(err.to_string(), "peer network fail: peer unreachable");
        assert_eq!(err.exit_code(), 1);
        let source = std::error::Error::source(&err).unwrap();
        assert_eq!(source.to_string(), "peer unreachable");
    }

    #[test]
    fn test_deep_leaf_uses_top_level_group() {
        let tree = tree();
        let dispatcher = Dispatcher::new(&tree);
        let rec = Recorder::default();

        dispatcher
            .dispatch(&rec, &invoke(&tree, &["chaincode", "package", "sign"]))
            .unwrap();
        assert_eq!(rec.calls(), ["root:peer", "group:chaincode", "action:sign:"]);
    }

    #[test]
    fn test_concurrent_dispatch_runs_root_hook_once() {
        let tree = tree();
        let dispatcher = Dispatcher::new(&tree);
        let rec = Recorder::default();

        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    dispatcher
                        .dispatch(&rec, &invoke(&tree, &["node", "start"]))
                        .unwrap();
                });
            }
        });

        let calls = rec.calls();
        assert_eq!(calls.iter().filter(|c| c.starts_with("root:")).count(), 1);
        assert_eq!(calls.iter().filter(|c| *c == "group:node").count(), 8);
        assert_eq!(calls[0], "root:peer");
    }
}
