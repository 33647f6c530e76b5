// Network topology models

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Network name -> network entry. Always rebuilt from a full scan, never patched.
pub type NetworkTopology = BTreeMap<String, NetworkEntry>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerRef {
    pub id: String,
    pub name: String,
    pub status: String,
    pub ip_address: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkEntry {
    pub id: String,
    pub name: String,
    pub driver: String,
    pub scope: String,
    pub subnet: String,
    pub created: String,
    /// Members ordered by container name.
    pub containers: Vec<ContainerRef>,
}
