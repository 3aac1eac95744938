//! Boundary to the peer's service layer
//!
//! Commands translate their invocation into typed arguments here and hand them to a
//! [`PeerOperations`] implementation. The node, network and chaincode logic itself
//! lives behind that trait.

use std::path::{Path, PathBuf};

use serde_json::Value;
use thiserror::Error;

use crate::dispatch::Invocation;

pub const FLAG_CHAINCODE_DEV: &str = "peer-chaincodedev";
pub const FLAG_STOP_PID_FILE: &str = "stop-peer-pid-file";
pub const FLAG_PASSWORD: &str = "password";
pub const FLAG_LANG: &str = "lang";
pub const FLAG_CTOR: &str = "ctor";
pub const FLAG_ATTRIBUTES: &str = "attributes";
pub const FLAG_PATH: &str = "path";
pub const FLAG_NAME: &str = "name";
pub const FLAG_USERNAME: &str = "username";
pub const FLAG_TID: &str = "tid";
pub const FLAG_RAW: &str = "raw";
pub const FLAG_HEX: &str = "hex";

#[derive(Error, Debug)]
pub enum OperationError {
    #[error("cannot {operation}: peer services are not connected")]
    NotConnected { operation: &'static str },
    #[error("invalid arguments for {command}: {reason}")]
    InvalidArguments { command: &'static str, reason: String },
    #[error("--{flag} must be {expected} in JSON format: {source}")]
    Json {
        flag: &'static str,
        expected: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("--{flag} must be {expected} in JSON format")]
    JsonShape {
        flag: &'static str,
        expected: &'static str,
    },
}

/// Arguments for `node start`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartArgs {
    pub chaincode_dev: bool,
    pub args: Vec<String>,
}

impl StartArgs {
    #[must_use]
    pub fn from_invocation(invocation: &Invocation) -> Self {
        StartArgs {
            chaincode_dev: invocation.flags.switch(FLAG_CHAINCODE_DEV),
            args: invocation.args.clone(),
        }
    }
}

/// Arguments for `node stop`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopArgs {
    pub pid_file: PathBuf,
}

impl StopArgs {
    /// The pid file flag falls back to `default_pid_file` when empty.
    #[must_use]
    pub fn from_invocation(invocation: &Invocation, default_pid_file: &Path) -> Self {
        StopArgs {
            pid_file: invocation
                .flags
                .non_empty(FLAG_STOP_PID_FILE)
                .map_or_else(|| default_pid_file.to_path_buf(), PathBuf::from),
        }
    }
}

/// Arguments for `network login`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginArgs {
    pub username: String,
    /// `None` means the password should be requested interactively.
    pub password: Option<String>,
}

impl LoginArgs {
    /// # Errors
    ///
    /// Returns `OperationError::InvalidArguments` unless exactly one username is given.
    pub fn from_invocation(invocation: &Invocation) -> Result<Self, OperationError> {
        let [username] = invocation.args.as_slice() else {
            return Err(OperationError::InvalidArguments {
                command: "login",
                reason: format!(
                    "must supply exactly one username, got {}",
                    invocation.args.len()
                ),
            });
        };
        Ok(LoginArgs {
            username: username.clone(),
            password: invocation.flags.non_empty(FLAG_PASSWORD).map(str::to_string),
        })
    }
}

/// Arguments shared by the chaincode commands
#[derive(Debug, Clone, PartialEq)]
pub struct ChaincodeArgs {
    pub lang: String,
    pub ctor: Value,
    pub attributes: Vec<String>,
    pub path: Option<String>,
    pub name: Option<String>,
    pub username: Option<String>,
    pub id_generation: Option<String>,
}

impl ChaincodeArgs {
    /// # Errors
    ///
    /// Returns `OperationError::Json` or `OperationError::JsonShape` when the
    /// constructor is not a JSON object or the attributes are not a JSON string array.
    pub fn from_invocation(invocation: &Invocation) -> Result<Self, OperationError> {
        let flags = &invocation.flags;
        let ctor = parse_json(
            FLAG_CTOR,
            "an object",
            flags.non_empty(FLAG_CTOR).unwrap_or("{}"),
        )?;
        if !ctor.is_object() {
            return Err(OperationError::JsonShape {
                flag: FLAG_CTOR,
                expected: "an object",
            });
        }
        let attributes: Vec<String> = serde_json::from_str(
            flags.non_empty(FLAG_ATTRIBUTES).unwrap_or("[]"),
        )
        .map_err(|source| OperationError::Json {
            flag: FLAG_ATTRIBUTES,
            expected: "an array of strings",
            source,
        })?;

        let owned = |name| flags.non_empty(name).map(str::to_string);
        Ok(ChaincodeArgs {
            lang: owned(FLAG_LANG).unwrap_or_else(|| "golang".to_string()),
            ctor,
            attributes,
            path: owned(FLAG_PATH),
            name: owned(FLAG_NAME),
            username: owned(FLAG_USERNAME),
            id_generation: owned(FLAG_TID),
        })
    }
}

fn parse_json(
    flag: &'static str,
    expected: &'static str,
    raw: &str,
) -> Result<Value, OperationError> {
    serde_json::from_str(raw).map_err(|source| OperationError::Json {
        flag,
        expected,
        source,
    })
}

/// How `chaincode query` prints the returned value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueryOutput {
    #[default]
    Printable,
    Raw,
    Hex,
}

/// Arguments for `chaincode query`
#[derive(Debug, Clone, PartialEq)]
pub struct QueryArgs {
    pub chaincode: ChaincodeArgs,
    pub output: QueryOutput,
}

impl QueryArgs {
    /// # Errors
    ///
    /// Returns `OperationError::InvalidArguments` when both `--raw` and `--hex` are set,
    /// or any error from [`ChaincodeArgs::from_invocation`].
    pub fn from_invocation(invocation: &Invocation) -> Result<Self, OperationError> {
        let output = match (
            invocation.flags.switch(FLAG_RAW),
            invocation.flags.switch(FLAG_HEX),
        ) {
            (true, true) => {
                return Err(OperationError::InvalidArguments {
                    command: "query",
                    reason: "options --raw (-r) and --hex (-x) are not compatible".to_string(),
                });
            }
            (true, false) => QueryOutput::Raw,
            (false, true) => QueryOutput::Hex,
            (false, false) => QueryOutput::Printable,
        };
        Ok(QueryArgs {
            chaincode: ChaincodeArgs::from_invocation(invocation)?,
            output,
        })
    }
}

/// Operations provided by the peer's core service layer.
pub trait PeerOperations {
    /// Initialize the cryptographic material used by the service layer.
    ///
    /// Runs once from the root setup hook, after configuration is cached.
    ///
    /// # Errors
    ///
    /// Returns `OperationError` if the crypto layer cannot be initialized.
    fn init_crypto(&self) -> Result<(), OperationError> {
        Ok(())
    }

    /// Start the node and serve until it is stopped.
    ///
    /// # Errors
    ///
    /// Returns `OperationError` if the node cannot be started.
    fn start(&self, args: &StartArgs) -> Result<(), OperationError>;

    /// Stop a running node.
    ///
    /// # Errors
    ///
    /// Returns `OperationError` if the node cannot be stopped.
    fn stop(&self, args: &StopArgs) -> Result<(), OperationError>;

    /// Report the status of the running node.
    ///
    /// # Errors
    ///
    /// Returns `OperationError` if the node cannot be reached.
    fn status(&self) -> Result<(), OperationError>;

    /// List the peers known to the target node.
    ///
    /// # Errors
    ///
    /// Returns `OperationError` if the peer list cannot be retrieved.
    fn network_list(&self) -> Result<(), OperationError>;

    /// Log the local user in to the network.
    ///
    /// # Errors
    ///
    /// Returns `OperationError` if the login is rejected or cannot be performed.
    fn network_login(&self, args: &LoginArgs) -> Result<(), OperationError>;

    /// Deploy a chaincode.
    ///
    /// # Errors
    ///
    /// Returns `OperationError` if the deploy transaction fails.
    fn chaincode_deploy(&self, args: &ChaincodeArgs) -> Result<(), OperationError>;

    /// Invoke a deployed chaincode.
    ///
    /// # Errors
    ///
    /// Returns `OperationError` if the invoke transaction fails.
    fn chaincode_invoke(&self, args: &ChaincodeArgs) -> Result<(), OperationError>;

    /// Query a deployed chaincode.
    ///
    /// # Errors
    ///
    /// Returns `OperationError` if the query fails.
    fn chaincode_query(&self, args: &QueryArgs) -> Result<(), OperationError>;
}

/// Stand-in used when the binary runs without a service layer; every call fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct Detached;

impl PeerOperations for Detached {
    fn start(&self, _: &StartArgs) -> Result<(), OperationError> {
        Err(OperationError::NotConnected {
            operation: "start the node",
        })
    }

    fn stop(&self, _: &StopArgs) -> Result<(), OperationError> {
        Err(OperationError::NotConnected {
            operation: "stop the node",
        })
    }

    fn status(&self) -> Result<(), OperationError> {
        Err(OperationError::NotConnected {
            operation: "report node status",
        })
    }

    fn network_list(&self) -> Result<(), OperationError> {
        Err(OperationError::NotConnected {
            operation: "list network peers",
        })
    }

    fn network_login(&self, _: &LoginArgs) -> Result<(), OperationError> {
        Err(OperationError::NotConnected {
            operation: "log in",
        })
    }

    fn chaincode_deploy(&self, _: &ChaincodeArgs) -> Result<(), OperationError> {
        Err(OperationError::NotConnected {
            operation: "deploy chaincode",
        })
    }

    fn chaincode_invoke(&self, _: &ChaincodeArgs) -> Result<(), OperationError> {
        Err(OperationError::NotConnected {
            operation: "invoke chaincode",
        })
    }

    fn chaincode_query(&self, _: &QueryArgs) -> Result<(), OperationError> {
        Err(OperationError::NotConnected {
            operation: "query chaincode",
        })
    }
}
