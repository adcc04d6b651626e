//! Analysis configuration.
//!
//! Everything here is a policy knob, never a correctness switch: the engine
//! stays conservative under every setting. Configurations are plain JSON:
//!
//! ```json
//! { "function_whitelist": ["sqrt", "my_pure_helper"], "strict_subscripts": true }
//! ```
//!
//! Missing fields take their defaults.

use crate::utils::errors::{AnalysisError, AnalysisResult};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

/// C math library routines that touch no memory reachable by the caller.
pub static MATH_LIBRARY: Lazy<BTreeSet<String>> = Lazy::new(|| {
    const BASE: [&str; 18] = [
        "acos", "asin", "atan", "atan2", "cos", "cosh", "exp", "fabs", "fmax", "fmin", "log", "log10",
        "pow", "sin", "sinh", "sqrt", "tan", "tanh",
    ];
    BASE.iter()
        .flat_map(|name| [name.to_string(), format!("{}f", name)])
        .collect()
});

/// Knobs for one analysis run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Callees assumed not to read or write anything aliased by the caller
    pub function_whitelist: BTreeSet<String>,
    /// Reject non-affine subscripts instead of assuming any direction
    pub strict_subscripts: bool,
    /// Resolve bounds and symbolic subscript terms through constant propagation
    pub propagate_constants: bool,
    /// Refuse to analyze regions with more accesses than this
    pub max_accesses: Option<usize>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            function_whitelist: MATH_LIBRARY.clone(),
            strict_subscripts: false,
            propagate_constants: true,
            max_accesses: None,
        }
    }
}

impl AnalysisConfig {
    /// Create a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a callee to the whitelist
    pub fn whitelist(mut self, name: impl Into<String>) -> Self {
        self.function_whitelist.insert(name.into());
        self
    }

    /// Set strict subscript handling
    pub fn strict_subscripts(mut self, strict: bool) -> Self {
        self.strict_subscripts = strict;
        self
    }

    /// Enable or disable constant propagation
    pub fn propagate_constants(mut self, enabled: bool) -> Self {
        self.propagate_constants = enabled;
        self
    }

    /// Cap the number of collected accesses
    pub fn max_accesses(mut self, limit: usize) -> Self {
        self.max_accesses = Some(limit);
        self
    }

    /// Parse a configuration from JSON text.
    pub fn from_json_str(text: &str) -> AnalysisResult<Self> {
        serde_json::from_str(text).map_err(|e| AnalysisError::Config(e.to_string()))
    }

    /// Read a configuration file.
    pub fn load(path: impl AsRef<Path>) -> AnalysisResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        log::debug!("loaded analysis config from {}", path.display());
        Self::from_json_str(&text)
    }

    /// Serialize to pretty JSON.
    pub fn to_json(&self) -> AnalysisResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| AnalysisError::Config(e.to_string()))
    }
}
