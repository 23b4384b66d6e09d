//! vpad-relay - relay remote controller input to a virtual joystick
//!
//! Accepts a stream of JSON control packets over a WebSocket connection,
//! maintains the latest control state, maps normalized axis values into
//! the device-native range and forwards them to a pluggable device sink,
//! while tracking cadence/throughput/latency telemetry for the dashboard.

pub mod config;
pub mod device;
pub mod layouts;
pub mod mapping;
pub mod packet;
pub mod paths;
pub mod relay;
pub mod server;
pub mod state;
pub mod telemetry;
