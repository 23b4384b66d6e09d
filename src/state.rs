//! Control state store - latest axis/button snapshot for one session
//!
//! Holds exactly the content of the most recently applied control packet.
//! Apply is full replacement, not a merge: an axis or button absent from
//! the new packet disappears from state. Readers (telemetry endpoint,
//! dashboard) always get a consistent owned snapshot.

use crate::packet::{AxisInput, ControlPacket};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

/// Layout name shown before any packet named one.
pub const NO_LAYOUT: &str = "—";

/// Owned, consistent copy of the session's control state.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ControlState {
    /// Active layout name, or [`NO_LAYOUT`] if never set
    pub layout_name: String,
    /// Axis entries from the latest packet
    pub axes: HashMap<String, AxisInput>,
    /// Button states by integer channel index
    pub buttons: HashMap<u32, bool>,
}

impl Default for ControlState {
    fn default() -> Self {
        Self {
            layout_name: NO_LAYOUT.to_string(),
            axes: HashMap::new(),
            buttons: HashMap::new(),
        }
    }
}

/// Single mutation point for session control state.
#[derive(Clone, Default)]
pub struct StateStore {
    inner: Arc<RwLock<ControlState>>,
}

impl StateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace state with the content of a decoded control packet.
    ///
    /// The axis and button maps are swapped wholesale. The layout name is
    /// replaced if the packet carries one, otherwise the previous name is
    /// retained. Button keys that do not parse as integer indices are
    /// dropped.
    pub fn apply(&self, packet: &ControlPacket) {
        let buttons: HashMap<u32, bool> = packet
            .buttons
            .iter()
            .filter_map(|(k, v)| k.parse::<u32>().ok().map(|idx| (idx, *v)))
            .collect();

        let mut state = self.inner.write();
        if let Some(name) = &packet.layout_name {
            state.layout_name = name.clone();
        }
        state.axes = packet.axes.clone();
        state.buttons = buttons;
    }

    /// Take an atomic, consistent copy of the current state.
    pub fn snapshot(&self) -> ControlState {
        self.inner.read().clone()
    }
}
