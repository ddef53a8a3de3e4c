//! Read mode and timeout behaviour of readers

use serde::{Deserialize, Serialize};

/// Which buffer a reader converts from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
#[serde(rename_all = "snake_case")]
pub enum ReadMode {
    /// Raw backing buffer, no conversion; requested type must equal the raw type
    RawValue,
    /// Raw backing buffer converted to the requested type, post-scaling ignored
    Unscaled,
    /// Post-scaling applied, then converted to the requested type
    #[default]
    Scaled,
}

/// When a blocking read with a timeout returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
#[serde(rename_all = "snake_case")]
pub enum ReadTimeoutType {
    /// Wait until the full requested count is available
    #[default]
    All,
    /// Return as soon as any samples are available
    Any,
}
