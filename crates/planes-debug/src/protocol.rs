//! Debug protocol - JSON command/response definitions

use serde::{Deserialize, Serialize};

/// Commands sent from a debug client to the debug server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd", content = "params")]
pub enum DebugCommand {
    /// Get the current floor and ceiling reference heights
    GetReferenceHeights,
    /// List active planes, optionally filtered by type names (empty = all)
    GetActivePlanes {
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        types: Vec<String>,
    },
    /// Get counters for the registry and the last refresh
    GetRegistryStats,
    /// Ask the host to run a refresh on its next tick
    RequestRefresh,
    /// Ping (health check)
    Ping,
}

/// Responses from debug server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status")]
pub enum DebugResponse {
    #[serde(rename = "ok")]
    Ok { data: ResponseData },
    #[serde(rename = "error")]
    Error { message: String },
}

/// Response data variants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResponseData {
    None,
    Pong { message: String },
    ReferenceHeights {
        floor_y: f32,
        ceiling_y: f32,
    },
    ActivePlanes { planes: Vec<PlaneInfo> },
    RegistryStats {
        cycle: u64,
        active: u32,
        visible: u32,
        per_type: Vec<TypeCount>,
        last_refresh: RefreshInfo,
    },
    RefreshQueued { accepted: bool },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaneInfo {
    pub handle: u64,
    pub semantic: String,
    pub center: [f32; 3],
    pub normal: [f32; 3],
    pub area: f32,
    pub visible: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeCount {
    pub semantic: String,
    pub count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefreshInfo {
    pub destroyed: u32,
    pub installed: u32,
    pub discarded: u32,
    pub failed: u32,
    pub rejected: u32,
}

impl DebugResponse {
    pub fn ok(data: ResponseData) -> Self {
        Self::Ok { data }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self::Error {
            message: msg.into(),
        }
    }

    pub fn pong() -> Self {
        Self::ok(ResponseData::Pong {
            message: "pong".into(),
        })
    }

    pub fn none() -> Self {
        Self::ok(ResponseData::None)
    }
}
