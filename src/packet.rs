//! Wire packet codec for the controller WebSocket protocol
//!
//! Every inbound frame is JSON with a `type` discriminator. Only a handful
//! of types are meaningful to the relay; anything else decodes to
//! [`Decoded::Skip`] so the loop can advance without side effects.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;

/// Axis interpretation mode sent by the client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AxisMode {
    /// Unidirectional 0..1 range (pedals, sliders)
    Normal,
    /// Bidirectional -1..1 range with a neutral midpoint (sticks, steering)
    Centered,
}

impl std::fmt::Display for AxisMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AxisMode::Normal => write!(f, "normal"),
            AxisMode::Centered => write!(f, "centered"),
        }
    }
}

/// One axis entry from a control packet
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AxisInput {
    /// Raw client value, not pre-clamped
    pub value: f64,
    pub mode: AxisMode,
}

/// A fully decoded `"controls"` packet
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ControlPacket {
    /// Layout name from `data.meta.layoutName`, if the client sent one
    pub layout_name: Option<String>,
    /// Axis entries by channel name; malformed entries are already dropped
    pub axes: HashMap<String, AxisInput>,
    /// Button states by raw (string) index as sent on the wire
    pub buttons: HashMap<String, bool>,
}

/// Result of decoding one inbound frame
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    /// A control packet to apply and forward
    Controls(ControlPacket),
    /// Latency probe; echoed back as `pong` with the same timestamp
    Ping { ts: Option<f64> },
    /// Client-initiated layout sync (id -> layout document)
    LayoutSync(HashMap<String, Value>),
    /// Well-formed JSON of a type the relay does not act on
    Skip,
}

/// Packet-level decode failures (drop the frame, keep the connection)
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    /// Binary frame that is not valid UTF-8
    #[error("binary frame is not valid UTF-8")]
    Encoding,
    /// Frame is not a JSON object
    #[error("frame is not a JSON object: {0}")]
    Malformed(String),
}

/// Decode a binary frame. Bytes must be UTF-8, then same as [`decode_text`].
pub fn decode_bytes(raw: &[u8]) -> Result<Decoded, DecodeError> {
    let text = std::str::from_utf8(raw).map_err(|_| DecodeError::Encoding)?;
    decode_text(text)
}

/// Decode a text frame into a typed message.
pub fn decode_text(text: &str) -> Result<Decoded, DecodeError> {
    let root: Value =
        serde_json::from_str(text).map_err(|e| DecodeError::Malformed(e.to_string()))?;

    let obj = root
        .as_object()
        .ok_or_else(|| DecodeError::Malformed("top-level value is not an object".into()))?;

    match obj.get("type").and_then(Value::as_str) {
        Some("controls") => Ok(Decoded::Controls(parse_controls(obj.get("data")))),
        Some("ping") => Ok(Decoded::Ping {
            ts: obj.get("ts").and_then(Value::as_f64),
        }),
        Some("layouts/sync") => {
            let layouts = obj
                .get("data")
                .and_then(Value::as_object)
                .map(|m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
                .unwrap_or_default();
            Ok(Decoded::LayoutSync(layouts))
        }
        // Unknown or missing type: not an error, just nothing to do
        _ => Ok(Decoded::Skip),
    }
}

/// Build a control packet from the (possibly absent) `data` object.
///
/// Missing substructure defaults to empty; a whole-packet failure only
/// happens at the JSON level, never for individual entries.
fn parse_controls(data: Option<&Value>) -> ControlPacket {
    let data = match data.and_then(Value::as_object) {
        Some(d) => d,
        None => return ControlPacket::default(),
    };

    let layout_name = data
        .get("meta")
        .and_then(Value::as_object)
        .and_then(|m| m.get("layoutName"))
        .and_then(Value::as_str)
        .map(str::to_string);

    let mut axes = HashMap::new();
    if let Some(raw_axes) = data.get("axes").and_then(Value::as_object) {
        for (name, entry) in raw_axes {
            // Entries that are not objects are dropped, not fatal
            if let Some(axis) = parse_axis(entry) {
                axes.insert(name.clone(), axis);
            }
        }
    }

    let mut buttons = HashMap::new();
    if let Some(raw_buttons) = data.get("buttons").and_then(Value::as_object) {
        for (index, pressed) in raw_buttons {
            buttons.insert(index.clone(), truthy(pressed));
        }
    }

    ControlPacket {
        layout_name,
        axes,
        buttons,
    }
}

fn parse_axis(entry: &Value) -> Option<AxisInput> {
    let obj = entry.as_object()?;
    let value = obj.get("value").map(coerce_f64).unwrap_or(0.0);
    let mode = obj
        .get("mode")
        .and_then(Value::as_str)
        .and_then(|s| match s {
            "normal" => Some(AxisMode::Normal),
            "centered" => Some(AxisMode::Centered),
            _ => None,
        })
        .unwrap_or(AxisMode::Centered);
    Some(AxisInput { value, mode })
}

/// Coerce a JSON value to f64; invalid coercion defaults to 0.0.
fn coerce_f64(v: &Value) -> f64 {
    match v {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => s.parse().unwrap_or(0.0),
        Value::Bool(b) => {
            if *b {
                1.0
            } else {
                0.0
            }
        }
        _ => 0.0,
    }
}

/// Truthiness coercion for button values (numbers, strings, bools).
fn truthy(v: &Value) -> bool {
    match v {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Null => false,
        _ => true,
    }
}
