//! The peer command table
//!
//! ```text
//! peer
//! ├── node       start | stop | status
//! ├── network    list (ls) | login
//! └── chaincode  deploy | invoke | query
//! ```
//!
//! The root hook caches configuration and initializes crypto; each group hook initializes logging scoped to
//! the group's name. The table is built once per process on first access.

use std::sync::OnceLock;

use log::debug;

use crate::commands::flags::{FlagSpec, FlagValues};
use crate::commands::tree::{BoxError, CommandNode, CommandTree};
use crate::config_file::{ConfigError, ConfigStore};
use crate::dispatch::Invocation;
use crate::logger::{self, LOGGING_LEVEL_KEY};
use crate::operations::{
    ChaincodeArgs, FLAG_ATTRIBUTES, FLAG_CHAINCODE_DEV, FLAG_CTOR, FLAG_HEX, FLAG_LANG,
    FLAG_NAME, FLAG_PASSWORD, FLAG_PATH, FLAG_RAW, FLAG_STOP_PID_FILE, FLAG_TID, FLAG_USERNAME,
    LoginArgs, OperationError, PeerOperations, QueryArgs, StartArgs, StopArgs,
};
use crate::settings::CachedSettings;

pub const ROOT_NAME: &str = "peer";
pub const NODE_FUNC_NAME: &str = "node";
pub const NETWORK_FUNC_NAME: &str = "network";
pub const CHAIN_FUNC_NAME: &str = "chaincode";

/// Root persistent flag bound to [`LOGGING_LEVEL_KEY`]
pub const FLAG_LOGGING_LEVEL: &str = "logging-level";

/// Everything a peer command needs at dispatch time
pub struct PeerContext {
    config: ConfigStore,
    operations: Box<dyn PeerOperations>,
    settings: OnceLock<CachedSettings>,
}

impl PeerContext {
    #[must_use]
    pub fn new(config: ConfigStore, operations: impl PeerOperations + 'static) -> Self {
        PeerContext {
            config,
            operations: Box::new(operations),
            settings: OnceLock::new(),
        }
    }

    #[must_use]
    pub fn config(&self) -> &ConfigStore {
        &self.config
    }

    #[must_use]
    pub fn operations(&self) -> &dyn PeerOperations {
        self.operations.as_ref()
    }

    /// Settings cached by the root hook, if it has run.
    #[must_use]
    pub fn settings(&self) -> Option<&CachedSettings> {
        self.settings.get()
    }

    /// Read the frequently used configuration values once and keep them.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` when a required value is missing or malformed.
    pub fn cache_configuration(&self) -> Result<&CachedSettings, ConfigError> {
        if let Some(settings) = self.settings.get() {
            return Ok(settings);
        }
        let settings = CachedSettings::from_config(&self.config)?;
        Ok(self.settings.get_or_init(|| settings))
    }
}

impl std::fmt::Debug for PeerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerContext")
            .field("config", &self.config)
            .field("settings", &self.settings.get())
            .finish_non_exhaustive()
    }
}

/// Bind flag values that map onto configuration keys.
pub fn apply_flag_overrides(config: &mut ConfigStore, flags: &FlagValues) {
    if let Some(level) = flags.non_empty(FLAG_LOGGING_LEVEL) {
        config.set_override(LOGGING_LEVEL_KEY, level);
    }
}

static PEER_COMMANDS: OnceLock<CommandTree<PeerContext>> = OnceLock::new();

/// The peer command tree, built on first call.
///
/// Concurrent first callers block until construction finishes; every caller gets the
/// same fully built tree.
pub fn peer_commands() -> &'static CommandTree<PeerContext> {
    PEER_COMMANDS.get_or_init(build_commands)
}

/// Build a fresh peer command tree.
#[must_use]
pub fn build_commands() -> CommandTree<PeerContext> {
    debug!("Initialising peer commands");
    let root = CommandNode::new(ROOT_NAME)
        .about("Peer process command line interface.")
        .flag(
            FlagSpec::value(
                FLAG_LOGGING_LEVEL,
                "",
                "Default logging level and overrides, see core.yaml for full syntax",
            )
            .persistent(),
        )
        .setup_hook(|ctx: &PeerContext, _| {
            ctx.cache_configuration()?;
            ctx.operations().init_crypto()?;
            Ok(())
        });

    let mut tree = CommandTree::new(root);
    add_node_commands(&mut tree);
    add_network_commands(&mut tree);
    add_chaincode_commands(&mut tree);
    tree
}

fn group(name: &'static str) -> CommandNode<PeerContext> {
    CommandNode::new(name)
        .about(format!("{name} specific commands."))
        .long_about(format!("{name} specific commands."))
        .setup_hook(|ctx: &PeerContext, scope| {
            logger::init_scope(scope, ctx.config())?;
            Ok(())
        })
}

fn run<F>(
    operation: F,
) -> impl Fn(&PeerContext, &Invocation) -> Result<(), BoxError> + Send + Sync + 'static
where
    F: Fn(&PeerContext, &Invocation) -> Result<(), OperationError> + Send + Sync + 'static,
{
    move |ctx: &PeerContext, invocation: &Invocation| {
        operation(ctx, invocation).map_err(Into::into)
    }
}

fn add_node_commands(tree: &mut CommandTree<PeerContext>) {
    let node = tree.add_command(tree.root(), group(NODE_FUNC_NAME));

    tree.add_command(
        node,
        CommandNode::new("start")
            .about("Starts the node.")
            .long_about("Starts a node that interacts with the network.")
            .flag(FlagSpec::switch(
                FLAG_CHAINCODE_DEV,
                "Whether peer in chaincode development mode",
            ))
            .action(run(|ctx, inv| {
                ctx.operations().start(&StartArgs::from_invocation(inv))
            })),
    );
    tree.add_command(
        node,
        CommandNode::new("stop")
            .about("Stops the running node.")
            .long_about("Stops the running node, disconnecting from the network.")
            .flag(FlagSpec::value(
                FLAG_STOP_PID_FILE,
                "",
                "Location of peer pid local file, for forces kill",
            ))
            .action(|ctx: &PeerContext, inv| {
                let pid_file = ctx.cache_configuration()?.pid_file();
                ctx.operations()
                    .stop(&StopArgs::from_invocation(inv, &pid_file))?;
                Ok(())
            }),
    );
    tree.add_command(
        node,
        CommandNode::new("status")
            .about("Returns status of the node.")
            .long_about("Returns the status of the running node.")
            .action(run(|ctx, _| ctx.operations().status())),
    );
}

fn add_network_commands(tree: &mut CommandTree<PeerContext>) {
    let network = tree.add_command(tree.root(), group(NETWORK_FUNC_NAME));

    tree.add_command(
        network,
        CommandNode::new("list")
            .alias("ls")
            .about("Lists all network peers.")
            .long_about(
                "Returns a list of all existing network connections for the target peer node, \
                 includes both validating and non-validating peers.",
            )
            .action(run(|ctx, _| ctx.operations().network_list())),
    );
    tree.add_command(
        network,
        CommandNode::new("login")
            .about("Logs in user to CLI.")
            .long_about("Logs in the local user to CLI. Must supply username as a parameter.")
            .flag(
                FlagSpec::value(
                    FLAG_PASSWORD,
                    "",
                    "The password for user. You will be requested to enter the password if this flag is not specified.",
                )
                .short('p')
                .persistent(),
            )
            .action(run(|ctx, inv| {
                ctx.operations()
                    .network_login(&LoginArgs::from_invocation(inv)?)
            })),
    );
}

fn add_chaincode_commands(tree: &mut CommandTree<PeerContext>) {
    let chaincode = group(CHAIN_FUNC_NAME)
        .flag(
            FlagSpec::value(FLAG_LANG, "golang", "Language the chaincode is written in")
                .short('l')
                .persistent(),
        )
        .flag(
            FlagSpec::value(FLAG_CTOR, "{}", "Constructor message for the chaincode in JSON format")
                .short('c')
                .persistent(),
        )
        .flag(
            FlagSpec::value(FLAG_ATTRIBUTES, "[]", "User attributes for the chaincode in JSON format")
                .short('a')
                .persistent(),
        )
        .flag(
            FlagSpec::value(FLAG_PATH, "", "Path to chaincode")
                .short('p')
                .persistent(),
        )
        .flag(
            FlagSpec::value(FLAG_NAME, "", "Name of the chaincode returned by the deploy transaction")
                .short('n')
                .persistent(),
        )
        .flag(
            FlagSpec::value(
                FLAG_USERNAME,
                "",
                "Username for chaincode operations when security is enabled",
            )
            .short('u')
            .persistent(),
        )
        .flag(
            FlagSpec::value(
                FLAG_TID,
                "",
                "Name of a custom ID generation algorithm (hashing and decoding) e.g. sha256base64",
            )
            .short('t')
            .persistent(),
        );
    let chaincode = tree.add_command(tree.root(), chaincode);

    tree.add_command(
        chaincode,
        CommandNode::new("deploy")
            .about("Deploy the specified chaincode to the network.")
            .long_about("Deploy the specified chaincode to the network.")
            .action(run(|ctx, inv| {
                ctx.operations()
                    .chaincode_deploy(&ChaincodeArgs::from_invocation(inv)?)
            })),
    );
    tree.add_command(
        chaincode,
        CommandNode::new("invoke")
            .about("Invoke the specified chaincode.")
            .long_about("Invoke the specified chaincode.")
            .action(run(|ctx, inv| {
                ctx.operations()
                    .chaincode_invoke(&ChaincodeArgs::from_invocation(inv)?)
            })),
    );
    tree.add_command(
        chaincode,
        CommandNode::new("query")
            .about("Query using the specified chaincode.")
            .long_about("Query using the specified chaincode.")
            .flag(
                FlagSpec::switch(
                    FLAG_RAW,
                    "If true, output the query value as raw bytes, otherwise format as a printable string",
                )
                .short('r'),
            )
            .flag(
                FlagSpec::switch(
                    FLAG_HEX,
                    "If true, output the query value byte array in hexadecimal. Incompatible with --raw",
                )
                .short('x'),
            )
            .action(run(|ctx, inv| {
                ctx.operations()
                    .chaincode_query(&QueryArgs::from_invocation(inv)?)
            })),
    );
}
