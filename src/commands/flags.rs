use std::collections::HashMap;

/// How a flag takes its value on the command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlagKind {
    /// Boolean flag, present or absent
    Switch,
    /// Flag carrying a string value, with the value used when it is omitted
    Value { default: String },
}

/// Declaration of a single command-line flag attached to a command node.
///
/// Persistent flags are visible to every descendant of the node that declares them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlagSpec {
    pub name: String,
    pub short: Option<char>,
    pub help: String,
    pub kind: FlagKind,
    pub persistent: bool,
}

impl FlagSpec {
    #[must_use]
    pub fn switch(name: impl Into<String>, help: impl Into<String>) -> Self {
        FlagSpec {
            name: name.into(),
            short: None,
            help: help.into(),
            kind: FlagKind::Switch,
            persistent: false,
        }
    }

    #[must_use]
    pub fn value(
        name: impl Into<String>,
        default: impl Into<String>,
        help: impl Into<String>,
    ) -> Self {
        FlagSpec {
            name: name.into(),
            short: None,
            help: help.into(),
            kind: FlagKind::Value {
                default: default.into(),
            },
            persistent: false,
        }
    }

    #[must_use]
    pub fn short(mut self, short: char) -> Self {
        self.short = Some(short);
        self
    }

    #[must_use]
    pub fn persistent(mut self) -> Self {
        self.persistent = true;
        self
    }
}

/// Flag values collected for one invocation, keyed by the flag's long name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlagValues {
    values: HashMap<String, String>,
}

impl FlagValues {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert, mostly useful when constructing invocations by hand.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.insert(name.into(), value.into());
    }

    /// Raw value of a flag, if one was collected.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    /// Value of a flag, treating the empty string as unset.
    #[must_use]
    pub fn non_empty(&self, name: &str) -> Option<&str> {
        self.get(name).filter(|v| !v.is_empty())
    }

    #[must_use]
    pub fn switch(&self, name: &str) -> bool {
        self.get(name).is_some_and(|v| v == "true")
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
