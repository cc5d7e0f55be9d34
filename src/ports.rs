//! Device transport seam
//!
//! The engine never issues device commands itself; it asks a `DevicePort`
//! for raw material and works from there. Transports (adb, an emulator
//! bridge, a replay harness in tests) implement this trait.

use async_trait::async_trait;
use thiserror::Error;

/// Transport-level failure, opaque to the engine.
#[derive(Debug, Error, Clone)]
#[error("device command failed: {0}")]
pub struct DeviceError(pub String);

/// Read-only view of the device the engine runs against.
#[async_trait]
pub trait DevicePort: Send + Sync {
    /// Raw UI hierarchy dump as produced by the device, possibly with
    /// shell noise around the XML document.
    async fn dump_ui_hierarchy(&self) -> Result<String, DeviceError>;

    /// Package name of the foreground app.
    async fn current_package(&self) -> Result<String, DeviceError>;
}
