//! Text to fixed-width value conversion.

use tuplescan_row::{SlotType, Value};

/// Convert the text of one field to a value of `ty`.
///
/// `None` means the text is not a valid `ty`. Variable-length types are never
/// converted here: strings are stored as-is and binary is not a text type.
pub(crate) fn parse_fixed(ty: SlotType, bytes: &[u8]) -> Option<Value<'static>> {
    let text = std::str::from_utf8(bytes).ok()?;
    let value = match ty {
        SlotType::Boolean => Value::Boolean(parse_bool(text)?),
        SlotType::TinyInt => Value::TinyInt(text.parse().ok()?),
        SlotType::SmallInt => Value::SmallInt(text.parse().ok()?),
        SlotType::Int => Value::Int(text.parse().ok()?),
        SlotType::BigInt => Value::BigInt(text.parse().ok()?),
        SlotType::Float => Value::Float(text.parse().ok()?),
        SlotType::Double => Value::Double(text.parse().ok()?),
        SlotType::Timestamp => Value::Timestamp(text.parse().ok()?),
        SlotType::String | SlotType::Binary => return None,
    };
    Some(value)
}

fn parse_bool(text: &str) -> Option<bool> {
    if text.eq_ignore_ascii_case("true") {
        Some(true)
    } else if text.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}
