//! Control socket message types

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One control command, e.g. `display/picture` with `path=galaga duration=5`
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ControlRequest {
    pub command: String,
    #[serde(default)]
    pub params: BTreeMap<String, String>,
}

impl ControlRequest {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            params: BTreeMap::new(),
        }
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }
}

/// Reply to a [`ControlRequest`]: `OK`, an error description or the version
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ControlResponse {
    pub status: String,
}
