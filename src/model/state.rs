//! Wire-contract state strings, parsed once at the API boundary into
//! enums (DESIGN NOTES' "Magic-number state strings" guidance: keep the
//! strings for compatibility, never match on them past this module).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemoteFileState {
    Open,
    Closing,
    Closed,
}

impl RemoteFileState {
    pub fn is_done_closing(self) -> bool {
        matches!(self, Self::Closing | Self::Closed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartState {
    Pending,
    Complete,
    #[serde(other)]
    Other,
}

impl PartState {
    pub fn is_complete(self) -> bool {
        matches!(self, Self::Complete)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PartManifestEntry {
    pub state: PartState,
    pub size: u64,
    #[serde(default)]
    pub md5: String,
}
