//! Command-line front-end over a [`CommandTree`]
//!
//! The clap command is generated from the tree, so names, aliases and flags have a
//! single source. Persistent flags become global clap arguments and reach every
//! descendant's matches.

use std::ffi::OsString;

use clap::{Arg, ArgAction, ArgMatches, Command};
use thiserror::Error;

use crate::commands::flags::{FlagKind, FlagSpec, FlagValues};
use crate::commands::tree::{CommandTree, NodeId};
use crate::dispatch::Invocation;

/// Argument id collecting the positional arguments of a leaf command
pub const ARGS_ID: &str = "args";

#[derive(Error, Debug)]
pub enum CliError {
    #[error(transparent)]
    Parse(#[from] clap::Error),
    #[error("unknown command '{0}'")]
    UnknownCommand(String),
}

fn flag_arg(flag: &FlagSpec) -> Arg {
    let mut arg = Arg::new(flag.name.clone())
        .long(flag.name.clone())
        .help(flag.help.clone())
        .global(flag.persistent);
    if let Some(short) = flag.short {
        arg = arg.short(short);
    }
    match &flag.kind {
        FlagKind::Switch => arg.action(ArgAction::SetTrue),
        FlagKind::Value { default } => arg.action(ArgAction::Set).default_value(default.clone()),
    }
}

fn build_node<C>(tree: &CommandTree<C>, id: NodeId) -> Command {
    let node = tree.node(id);
    let mut cmd = Command::new(node.name().to_string());
    if let Some(about) = node.about_text() {
        cmd = cmd.about(about.to_string());
    }
    if let Some(long_about) = node.long_about_text() {
        cmd = cmd.long_about(long_about.to_string());
    }
    for alias in node.aliases() {
        cmd = cmd.visible_alias(alias.clone());
    }
    for flag in node.flags() {
        cmd = cmd.arg(flag_arg(flag));
    }

    if node.children().is_empty() {
        cmd.arg(Arg::new(ARGS_ID).action(ArgAction::Append))
    } else {
        node.children()
            .iter()
            .fold(cmd, |cmd, &child| cmd.subcommand(build_node(tree, child)))
    }
}

/// Build the clap command for the whole tree.
#[must_use]
pub fn build_command<C>(tree: &CommandTree<C>) -> Command {
    build_node(tree, tree.root())
}

/// Parse `argv` (program name first) into an invocation of the selected node.
///
/// # Errors
///
/// Returns `CliError::Parse` for anything clap rejects, including `--help`.
pub fn parse<C, I, T>(tree: &CommandTree<C>, argv: I) -> Result<Invocation, CliError>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let matches = build_command(tree).try_get_matches_from(argv)?;
    invocation_from_matches(tree, &matches)
}

/// Walk the subcommand chain of `matches` down to the selected node.
///
/// Every flag in scope for that node is recorded, including defaults, so actions
/// never have to distinguish "absent" from "default".
///
/// # Errors
///
/// Returns `CliError::UnknownCommand` if `matches` names a subcommand the tree lacks.
pub fn invocation_from_matches<C>(
    tree: &CommandTree<C>,
    matches: &ArgMatches,
) -> Result<Invocation, CliError> {
    let mut node = tree.root();
    let mut current = matches;
    while let Some((name, sub)) = current.subcommand() {
        node = tree
            .child(node, name)
            .ok_or_else(|| CliError::UnknownCommand(name.to_string()))?;
        current = sub;
    }

    let mut flags = FlagValues::new();
    for spec in tree.flags_in_scope(node) {
        let value = match spec.kind {
            FlagKind::Switch => current.get_flag(&spec.name).to_string(),
            FlagKind::Value { .. } => current
                .get_one::<String>(&spec.name)
                .cloned()
                .unwrap_or_default(),
        };
        flags.insert(spec.name.clone(), value);
    }

    let args: Vec<String> = if tree.node(node).children().is_empty() {
        current
            .get_many::<String>(ARGS_ID)
            .map(|values| values.cloned().collect())
            .unwrap_or_default()
    } else {
        Vec::new()
    };

    Ok(Invocation::new(node).with_args(args).with_flags(flags))
}

/// Help text for `node`, including the persistent flags it inherits.
#[must_use]
pub fn render_help<C>(tree: &CommandTree<C>, node: NodeId) -> String {
    let mut cmd = build_node(tree, node).bin_name(tree.path_of(Some(node)).join(" "));
    for flag in tree.inherited_flags(node) {
        cmd = cmd.arg(flag_arg(flag));
    }
    cmd.render_help().to_string()
}
