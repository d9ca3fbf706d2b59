//! Typed Array Decoding
//!
//! Containers ship primitive arrays inside message payloads as
//! `{"clazz": "[I", "data": "<base64>"}`, little-endian. These are expanded
//! into plain JSON number arrays on receipt. Nothing is encoded this way on
//! transmission; outbound arrays stay plain JSON arrays.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use byteorder::{ByteOrder, LittleEndian};
use serde_json::{Map, Number, Value};
use tracing::debug;

/// Element type of an encoded array, keyed by its JVM array descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrayKind {
    Byte,
    Short,
    Int,
    Long,
    Float,
    Double,
}

impl ArrayKind {
    pub fn from_descriptor(descriptor: &str) -> Option<Self> {
        match descriptor {
            "[B" => Some(ArrayKind::Byte),
            "[S" => Some(ArrayKind::Short),
            "[I" => Some(ArrayKind::Int),
            "[J" => Some(ArrayKind::Long),
            "[F" => Some(ArrayKind::Float),
            "[D" => Some(ArrayKind::Double),
            _ => None,
        }
    }

    pub fn width(&self) -> usize {
        match self {
            ArrayKind::Byte => 1,
            ArrayKind::Short => 2,
            ArrayKind::Int | ArrayKind::Float => 4,
            ArrayKind::Long | ArrayKind::Double => 8,
        }
    }
}

/// Decode a base64 little-endian payload into JSON numbers.
///
/// Trailing bytes that do not fill a whole element are ignored. Non-finite
/// floats cannot be represented in JSON and become `null`.
pub fn decode_array(kind: ArrayKind, base64: &str) -> Option<Vec<Value>> {
    let bytes = STANDARD.decode(base64.trim()).ok()?;
    let values = bytes
        .chunks_exact(kind.width())
        .map(|chunk| match kind {
            ArrayKind::Byte => Value::from(chunk[0] as i8),
            ArrayKind::Short => Value::from(LittleEndian::read_i16(chunk)),
            ArrayKind::Int => Value::from(LittleEndian::read_i32(chunk)),
            ArrayKind::Long => Value::from(LittleEndian::read_i64(chunk)),
            ArrayKind::Float => float_value(LittleEndian::read_f32(chunk) as f64),
            ArrayKind::Double => float_value(LittleEndian::read_f64(chunk)),
        })
        .collect();
    Some(values)
}

fn float_value(v: f64) -> Value {
    Number::from_f64(v).map(Value::Number).unwrap_or(Value::Null)
}

/// Replace every encoded typed array in the tree with its decoded form
pub fn decode_typed_arrays(value: &mut Value) {
    match value {
        Value::Object(map) => {
            if let Some(decoded) = try_decode_object(map) {
                *value = Value::Array(decoded);
                return;
            }
            for child in map.values_mut() {
                decode_typed_arrays(child);
            }
        }
        Value::Array(items) => {
            for child in items.iter_mut() {
                decode_typed_arrays(child);
            }
        }
        _ => {}
    }
}

fn try_decode_object(map: &Map<String, Value>) -> Option<Vec<Value>> {
    let descriptor = map.get("clazz")?.as_str()?;
    if descriptor.len() != 2 || !descriptor.starts_with('[') {
        return None;
    }
    let data = map.get("data")?.as_str()?;
    let Some(kind) = ArrayKind::from_descriptor(descriptor) else {
        debug!(descriptor, "Unknown typed array descriptor left as-is");
        return None;
    };
    decode_array(kind, data)
}
