//! Analyzer configuration.
//!
//! ```rust
//! use pg_analyze::config::{AnalyzerConfig, NodeRole};
//!
//! let config = AnalyzerConfig::from_json(r#"{ "node": { "role": "datanode", "index": 2 } }"#).unwrap();
//! assert_eq!(config.node.role, NodeRole::Datanode);
//! assert_eq!(config.max_depth, 200);
//! ```

use serde::{Deserialize, Serialize};

use crate::Result;

/// Role of the local node in a multi-node cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeRole {
    #[default]
    Coordinator,
    Datanode,
}

/// Identity of the node running the analyzer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub role: NodeRole,
    /// Index of this node among the nodes of its role.
    pub index: u32,
}

/// Settings consulted during analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    pub node: NodeConfig,
    /// Lets EXECUTE DIRECT run DML and arbitrary utility statements.
    pub maintenance_mode: bool,
    /// Deepest allowed nesting of scopes, set operations and rewrite walks.
    pub max_depth: usize,
    /// Stack size, in bytes, to grow to when recursion gets close to the end of the stack.
    pub stack_size: usize,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self { node: NodeConfig::default(), maintenance_mode: false, max_depth: 200, stack_size: 8 * 1024 * 1024 }
    }
}

impl AnalyzerConfig {
    /// Loads a configuration from JSON. Missing keys take their default values.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn is_coordinator(&self) -> bool {
        self.node.role == NodeRole::Coordinator
    }
}
