//! Device sink boundary - abstract virtual input device
//!
//! The relay forwards mapped values through [`DeviceSink`]; the real driver
//! lives outside this crate. Every call is independently failable so one
//! bad channel never blocks the rest of a packet. When no driver is
//! available the relay runs in an explicit dry mode ([`SinkMode::Dry`])
//! where state and telemetry keep updating but forwarding is skipped.

use crate::mapping::AxisChannel;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

/// Per-call device failures. Log, continue other channels, continue loop.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeviceError {
    /// Driver is not present or lost its handle
    #[error("device unavailable: {0}")]
    Unavailable(String),
    /// Driver refused this particular write
    #[error("device rejected write: {0}")]
    Rejected(String),
}

/// Capability interface to the virtual input device.
#[async_trait]
pub trait DeviceSink: Send + Sync {
    fn name(&self) -> &str;

    /// Write a device-native axis value (0..=DEVICE_MAX) to a channel.
    async fn set_axis(&self, channel: AxisChannel, value: u16) -> Result<(), DeviceError>;

    /// Press or release a button by index.
    async fn set_button(&self, index: u32, pressed: bool) -> Result<(), DeviceError>;
}

/// Forwarding mode for a relay session.
///
/// Dry mode is deliberate and observable: it is reported in logs at
/// connection time and in the telemetry endpoint, never inferred.
#[derive(Clone)]
pub enum SinkMode {
    /// Forward every mapped value to the device
    Live(Arc<dyn DeviceSink>),
    /// No driver: skip forwarding, keep state/telemetry running
    Dry,
}

impl SinkMode {
    pub fn is_dry(&self) -> bool {
        matches!(self, SinkMode::Dry)
    }

    /// Short label for logs and the telemetry endpoint.
    pub fn label(&self) -> &str {
        match self {
            SinkMode::Live(sink) => sink.name(),
            SinkMode::Dry => "dry",
        }
    }
}

/// Sink that logs every write instead of driving hardware.
///
/// Useful for running the relay without a virtual-device driver installed
/// and for eyeballing mapped values during development.
pub struct ConsoleSink {
    name: String,
}

impl ConsoleSink {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        info!("console sink '{}' ready (logging writes only)", name);
        Self { name }
    }
}

#[async_trait]
impl DeviceSink for ConsoleSink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn set_axis(&self, channel: AxisChannel, value: u16) -> Result<(), DeviceError> {
        debug!(sink = %self.name, %channel, value, "set_axis");
        Ok(())
    }

    async fn set_button(&self, index: u32, pressed: bool) -> Result<(), DeviceError> {
        debug!(sink = %self.name, index, pressed, "set_button");
        Ok(())
    }
}
