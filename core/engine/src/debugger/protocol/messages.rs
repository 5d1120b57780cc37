//! Argument and body types of the supported commands.

use serde::{Deserialize, Serialize};

// ============================================================================
// Request Arguments
// ============================================================================

/// Arguments of `evaluate`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateArguments {
    /// Source text evaluated in the engine's global context.
    pub expression: String,
}

// ============================================================================
// Response Bodies
// ============================================================================

/// Body of a successful `evaluate`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateResponseBody {
    /// The completion value as JSON text.
    pub result: String,
}

/// Body of `version`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionResponseBody {
    /// Always `"boa"`.
    pub engine: String,
    /// Version of this crate.
    pub version: String,
}

/// Body of `threads`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadsResponseBody {
    /// Script threads; an engine has exactly one.
    pub threads: Vec<Thread>,
}

/// A script thread.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Thread {
    /// Thread id.
    pub id: i64,
    /// Display name.
    pub name: String,
}
