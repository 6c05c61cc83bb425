use crate::warn;
use std::env;
use std::str::FromStr;

/// Default maximum stack depth in words.
pub const DEFAULT_STACK_LIMIT: usize = 1024;
/// Default maximum memory size in bytes (16 MiB).
pub const DEFAULT_MEMORY_LIMIT: usize = 16 * 1024 * 1024;

pub const STACK_LIMIT_ENV: &str = "CVM_STACK_LIMIT";
pub const MEMORY_LIMIT_ENV: &str = "CVM_MEMORY_LIMIT";
pub const STEP_LIMIT_ENV: &str = "CVM_STEP_LIMIT";
pub const CHECK_LABELS_ENV: &str = "CVM_CHECK_LABELS";

/// Resource limits and checks applied to one invocation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VmConfig {
    /// Maximum number of words on the stack.
    pub stack_limit: usize,
    /// Maximum memory size in bytes.
    pub memory_limit: usize,
    /// Maximum number of executed instructions; `None` is unbounded.
    pub step_limit: Option<u64>,
    /// Record the stack depth at each `LABEL` on first arrival and abort
    /// when a later arrival disagrees.
    pub check_label_depth: bool,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            stack_limit: DEFAULT_STACK_LIMIT,
            memory_limit: DEFAULT_MEMORY_LIMIT,
            step_limit: None,
            check_label_depth: false,
        }
    }
}

impl VmConfig {
    /// Defaults overridden by the `CVM_*` environment variables.
    ///
    /// Unparseable values are ignored with a warning.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an explicit variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(v) = parse_var::<usize>(&lookup, STACK_LIMIT_ENV) {
            config.stack_limit = v;
        }
        if let Some(v) = parse_var::<usize>(&lookup, MEMORY_LIMIT_ENV) {
            config.memory_limit = v;
        }
        if let Some(v) = parse_var::<u64>(&lookup, STEP_LIMIT_ENV) {
            config.step_limit = Some(v);
        }
        if let Some(raw) = lookup(CHECK_LABELS_ENV) {
            match raw.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => config.check_label_depth = true,
                "0" | "false" | "no" | "off" => config.check_label_depth = false,
                other => warn!("ignoring {CHECK_LABELS_ENV}={other}: expected a boolean"),
            }
        }
        config
    }

    pub fn with_step_limit(mut self, limit: u64) -> Self {
        self.step_limit = Some(limit);
        self
    }

    pub fn with_label_check(mut self) -> Self {
        self.check_label_depth = true;
        self
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!("ignoring {key}={raw}: not a valid number");
            None
        }
    }
}
