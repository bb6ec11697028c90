//! Weaver configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use weft_model::ty::CORE_NAMESPACE;

/// Name of the bootstrap module, excluded from weaving.
pub const DEFAULT_ENTRY_MODULE: &str = "weft.entry";

/// Configuration of one processing pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    /// Bootstrap/entry module name, never woven
    pub entry_module: String,
    /// Module names excluded from weaving and advice scanning
    pub ignore: Vec<String>,
    /// Name of the fixed core runtime module
    pub core_module: String,
    /// Directory for signature side-log reports
    pub log_dir: PathBuf,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            entry_module: DEFAULT_ENTRY_MODULE.to_string(),
            ignore: vec![CORE_NAMESPACE.to_string()],
            core_module: CORE_NAMESPACE.to_string(),
            log_dir: PathBuf::from("logs/signatures"),
        }
    }
}

impl Options {
    /// Whether a module is excluded from processing entirely.
    pub fn is_excluded(&self, module_name: &str) -> bool {
        module_name == self.entry_module || self.ignore.iter().any(|m| m == module_name)
    }
}
