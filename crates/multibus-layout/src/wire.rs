// SPDX-License-Identifier: Apache-2.0

//! Layout-driven reference codec
//!
//! Encodes and decodes MultiBus frames directly from a [`ResolvedLayout`].
//! The generated C and Python bindings implement exactly these semantics;
//! the tests here pin the contract down in one place. Multi-byte integers
//! are big-endian and unsigned, `bool` encodes as 0/1 and decodes any
//! nonzero byte as true, and an enum byte that matches no declared symbol
//! is a decode error, never a silently coerced value.

use crate::resolver::{FieldSlot, OperationLayout, ResolvedLayout};
use crate::{DecodeError, EncodeError};
use byteorder::{BigEndian, ByteOrder};

/// A concrete field value for encoding or the result of decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Bool(bool),
    U8(u8),
    U16(u16),
    U32(u32),
    Str(String),
    Bytes(Vec<u8>),
    /// An enum symbol name, resolved against the slot's symbol table.
    Enum(String),
}

/// The decoded fixed preamble of a frame, assuming the canonical header
/// roles (component, operation, channel, payload_len). The sizes and
/// offsets still come from the configured header, nothing is hardcoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub component: u8,
    pub operation: u8,
    pub channel: u8,
    pub payload_len: u16,
}

impl FrameHeader {
    /// Parse the header from the start of `bytes`.
    pub fn parse(layout: &ResolvedLayout, bytes: &[u8]) -> Result<FrameHeader, DecodeError> {
        if bytes.len() < layout.header_size {
            return Err(DecodeError::ShortHeader {
                needed: layout.header_size,
                available: bytes.len(),
            });
        }
        let mut header = FrameHeader {
            component: 0,
            operation: 0,
            channel: 0,
            payload_len: 0,
        };
        for slot in &layout.header {
            let raw = read_unsigned(slot, bytes);
            match slot.name.as_str() {
                "component" => header.component = raw as u8,
                "operation" => header.operation = raw as u8,
                "channel" => header.channel = raw as u8,
                "payload_len" => header.payload_len = raw as u16,
                // same contract as encode_header: every header field must
                // map to a known role
                _ => {
                    return Err(DecodeError::UnknownHeaderField {
                        field: slot.name.clone(),
                    })
                }
            }
        }
        Ok(header)
    }
}

/// Serialize the header fields in declared order.
pub fn encode_header(
    layout: &ResolvedLayout,
    component: u8,
    operation: u8,
    channel: u8,
    payload_len: u16,
) -> Result<Vec<u8>, EncodeError> {
    let mut bytes = vec![0u8; layout.header_size];
    for slot in &layout.header {
        let value: u32 = match slot.name.as_str() {
            "component" => component.into(),
            "operation" => operation.into(),
            "channel" => channel.into(),
            "payload_len" => payload_len.into(),
            _ => {
                return Err(EncodeError::UnknownHeaderField {
                    field: slot.name.clone(),
                })
            }
        };
        write_unsigned(slot, &mut bytes, value);
    }
    Ok(bytes)
}

/// Encode a complete frame: header plus payload.
///
/// `values` must match the operation's declared fields in order. The
/// payload length is `fixed_size` plus the byte length of the variable
/// tail value, when present. Returns the full frame, whose length is
/// `header_size + payload_len`.
pub fn encode_frame(
    layout: &ResolvedLayout,
    op: &OperationLayout,
    channel: u8,
    values: &[FieldValue],
) -> Result<Vec<u8>, EncodeError> {
    if values.len() != op.slots.len() {
        return Err(EncodeError::FieldCountMismatch {
            operation: format!("{}.{}", op.component, op.operation),
            expected: op.slots.len(),
            given: values.len(),
        });
    }

    let variable_len = match (op.variable_tail(), values.last()) {
        (Some(tail), Some(value)) => match value {
            FieldValue::Bytes(data) => data.len(),
            FieldValue::Str(text) => text.len(),
            _ => {
                return Err(EncodeError::ValueTypeMismatch {
                    field: tail.name.clone(),
                    type_name: tail.tag.schema_name().to_string(),
                })
            }
        },
        _ => 0,
    };

    let payload_len = op.payload_len(variable_len);
    if payload_len > usize::from(u16::MAX) {
        return Err(EncodeError::PayloadTooLarge {
            operation: format!("{}.{}", op.component, op.operation),
            payload_len,
        });
    }
    let mut frame = encode_header(
        layout,
        op.component_id,
        op.operation_id,
        channel,
        payload_len as u16,
    )?;
    frame.resize(layout.header_size + payload_len, 0);
    let payload_start = layout.header_size;

    for (slot, value) in op.slots.iter().zip(values) {
        let at = payload_start + slot.offset;
        match (slot.tag, value) {
            (multibus_schema::TypeTag::Bool, FieldValue::Bool(v)) => {
                frame[at] = u8::from(*v);
            }
            (multibus_schema::TypeTag::U8, FieldValue::U8(v)) => {
                frame[at] = *v;
            }
            (multibus_schema::TypeTag::U16, FieldValue::U16(v)) => {
                BigEndian::write_u16(&mut frame[at..at + 2], *v);
            }
            (multibus_schema::TypeTag::U32, FieldValue::U32(v)) => {
                BigEndian::write_u32(&mut frame[at..at + 4], *v);
            }
            (multibus_schema::TypeTag::Enum, FieldValue::Enum(symbol)) => {
                let raw = slot
                    .symbols
                    .iter()
                    .find(|s| &s.name == symbol)
                    .map(|s| s.value)
                    .ok_or_else(|| EncodeError::UnknownEnumSymbol {
                        field: slot.name.clone(),
                        symbol: symbol.clone(),
                    })?;
                frame[at] = raw;
            }
            (multibus_schema::TypeTag::Bytes, FieldValue::Bytes(data)) => {
                frame[at..at + data.len()].copy_from_slice(data);
            }
            (multibus_schema::TypeTag::Str, FieldValue::Str(text)) => {
                frame[at..at + text.len()].copy_from_slice(text.as_bytes());
            }
            _ => {
                return Err(EncodeError::ValueTypeMismatch {
                    field: slot.name.clone(),
                    type_name: slot.tag.schema_name().to_string(),
                })
            }
        }
    }

    Ok(frame)
}

/// Decode one field from a payload at its resolved offset.
///
/// The variable-length tail yields all remaining payload bytes. An enum
/// byte outside the declared symbol set is a [`DecodeError`].
pub fn decode_field(slot: &FieldSlot, payload: &[u8]) -> Result<FieldValue, DecodeError> {
    let needed = if slot.is_variable() {
        slot.offset
    } else {
        slot.offset + slot.size
    };
    if payload.len() < needed {
        return Err(DecodeError::ShortPayload {
            field: slot.name.clone(),
            needed,
            available: payload.len(),
        });
    }

    let value = match slot.tag {
        multibus_schema::TypeTag::Bool => FieldValue::Bool(payload[slot.offset] != 0),
        multibus_schema::TypeTag::U8 => FieldValue::U8(payload[slot.offset]),
        multibus_schema::TypeTag::U16 => {
            FieldValue::U16(BigEndian::read_u16(&payload[slot.offset..slot.offset + 2]))
        }
        multibus_schema::TypeTag::U32 => {
            FieldValue::U32(BigEndian::read_u32(&payload[slot.offset..slot.offset + 4]))
        }
        multibus_schema::TypeTag::Enum => {
            let raw = payload[slot.offset];
            let symbol = slot.symbols.iter().find(|s| s.value == raw).ok_or_else(|| {
                DecodeError::UnknownEnumValue {
                    field: slot.name.clone(),
                    enum_name: slot.enum_name.clone().unwrap_or_default(),
                    value: raw,
                }
            })?;
            FieldValue::Enum(symbol.name.clone())
        }
        multibus_schema::TypeTag::Bytes => FieldValue::Bytes(payload[slot.offset..].to_vec()),
        multibus_schema::TypeTag::Str => {
            let text = std::str::from_utf8(&payload[slot.offset..]).map_err(|_| {
                DecodeError::InvalidText {
                    field: slot.name.clone(),
                }
            })?;
            FieldValue::Str(text.to_string())
        }
    };
    Ok(value)
}

/// Decode every field of an operation from a payload, in wire order.
pub fn decode_fields(
    op: &OperationLayout,
    payload: &[u8],
) -> Result<Vec<FieldValue>, DecodeError> {
    op.slots
        .iter()
        .map(|slot| decode_field(slot, payload))
        .collect()
}

fn read_unsigned(slot: &FieldSlot, bytes: &[u8]) -> u32 {
    match slot.size {
        2 => BigEndian::read_u16(&bytes[slot.offset..slot.offset + 2]).into(),
        4 => BigEndian::read_u32(&bytes[slot.offset..slot.offset + 4]),
        _ => bytes[slot.offset].into(),
    }
}

fn write_unsigned(slot: &FieldSlot, bytes: &mut [u8], value: u32) {
    match slot.size {
        2 => BigEndian::write_u16(&mut bytes[slot.offset..slot.offset + 2], value as u16),
        4 => BigEndian::write_u32(&mut bytes[slot.offset..slot.offset + 4], value),
        _ => bytes[slot.offset] = value as u8,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::resolve;
    use multibus_schema::parse_str;

    const SCHEMA: &str = r#"
version: 1
message:
  fields:
    component: u8
    operation: u8
    channel: u8
    payload_len: u16
  enums:
    status:
      ok: 0
      error: 1
  components:
    i2c_master:
      id: 1
      operations:
        write_request:
          id: 1
          fields:
            slave_address: u8
            data: u8[]
        write_response:
          id: 2
          fields:
            status: enum
        config_request:
          id: 3
          fields:
            enabled: bool
            frequency_hz: u32
        info_response:
          id: 5
          fields:
            info: string
"#;

    fn layout() -> ResolvedLayout {
        resolve(&parse_str(SCHEMA).unwrap()).unwrap()
    }

    #[test]
    fn header_bytes_match_wire_format() {
        // component=1, operation=2, channel=0, payload_len=0
        let layout = layout();
        let bytes = encode_header(&layout, 1, 2, 0, 0).unwrap();
        assert_eq!(bytes, [0x01, 0x02, 0x00, 0x00, 0x00]);

        let header = FrameHeader::parse(&layout, &bytes).unwrap();
        assert_eq!(header.component, 1);
        assert_eq!(header.operation, 2);
        assert_eq!(header.payload_len, 0);
    }

    #[test]
    fn payload_len_is_big_endian() {
        let layout = layout();
        let bytes = encode_header(&layout, 1, 2, 0, 0x0304).unwrap();
        assert_eq!(&bytes[3..], [0x03, 0x04]);
    }

    #[test]
    fn write_request_frame_matches_expected_bytes() {
        let layout = layout();
        let op = layout.operation("i2c_master", "write_request").unwrap();
        let frame = encode_frame(
            &layout,
            op,
            0,
            &[
                FieldValue::U8(0x23),
                FieldValue::Bytes(vec![0xAA, 0xBB]),
            ],
        )
        .unwrap();
        assert_eq!(frame, [0x01, 0x01, 0x00, 0x00, 0x03, 0x23, 0xAA, 0xBB]);

        let payload = &frame[layout.header_size..];
        assert_eq!(
            decode_field(&op.slots[0], payload).unwrap(),
            FieldValue::U8(0x23)
        );
        assert_eq!(
            decode_field(&op.slots[1], payload).unwrap(),
            FieldValue::Bytes(vec![0xAA, 0xBB])
        );
    }

    #[test]
    fn fixed_only_frame_length_is_constant() {
        let layout = layout();
        let op = layout.operation("i2c_master", "config_request").unwrap();
        for frequency in [0u32, 400_000, u32::MAX] {
            let frame = encode_frame(
                &layout,
                op,
                3,
                &[FieldValue::Bool(true), FieldValue::U32(frequency)],
            )
            .unwrap();
            assert_eq!(frame.len(), layout.header_size + 5);
        }
    }

    #[test]
    fn round_trip_preserves_all_field_values() {
        let layout = layout();
        let op = layout.operation("i2c_master", "config_request").unwrap();
        let values = vec![FieldValue::Bool(true), FieldValue::U32(0xDEAD_BEEF)];
        let frame = encode_frame(&layout, op, 0, &values).unwrap();
        let decoded = decode_fields(op, &frame[layout.header_size..]).unwrap();
        assert_eq!(decoded, values);
    }

    #[test]
    fn string_tail_round_trips() {
        let layout = layout();
        let op = layout.operation("i2c_master", "info_response").unwrap();
        let frame = encode_frame(&layout, op, 0, &[FieldValue::Str("Pico 1234".into())]).unwrap();
        assert_eq!(frame.len(), layout.header_size + 9);
        let decoded = decode_fields(op, &frame[layout.header_size..]).unwrap();
        assert_eq!(decoded, [FieldValue::Str("Pico 1234".into())]);
    }

    #[test]
    fn enum_round_trips_and_unknown_byte_is_an_error() {
        let layout = layout();
        let op = layout.operation("i2c_master", "write_response").unwrap();
        let frame = encode_frame(&layout, op, 0, &[FieldValue::Enum("error".into())]).unwrap();
        assert_eq!(frame[layout.header_size], 1);
        assert_eq!(
            decode_fields(op, &frame[layout.header_size..]).unwrap(),
            [FieldValue::Enum("error".into())]
        );

        let err = decode_field(&op.slots[0], &[2]).unwrap_err();
        assert!(matches!(
            err,
            DecodeError::UnknownEnumValue { value: 2, .. }
        ));
    }

    #[test]
    fn bool_decodes_any_nonzero_byte_as_true() {
        let layout = layout();
        let op = layout.operation("i2c_master", "config_request").unwrap();
        let payload = [0x7F, 0, 0, 0, 0];
        assert_eq!(
            decode_field(&op.slots[0], &payload).unwrap(),
            FieldValue::Bool(true)
        );
        let payload = [0x00, 0, 0, 0, 0];
        assert_eq!(
            decode_field(&op.slots[0], &payload).unwrap(),
            FieldValue::Bool(false)
        );
    }

    #[test]
    fn short_payload_is_a_decode_error() {
        let layout = layout();
        let op = layout.operation("i2c_master", "config_request").unwrap();
        let err = decode_field(&op.slots[1], &[1, 2]).unwrap_err();
        assert!(matches!(err, DecodeError::ShortPayload { needed: 5, .. }));
    }

    #[test]
    fn encode_rejects_wrong_arity_and_types() {
        let layout = layout();
        let op = layout.operation("i2c_master", "write_request").unwrap();
        assert!(matches!(
            encode_frame(&layout, op, 0, &[FieldValue::U8(1)]).unwrap_err(),
            EncodeError::FieldCountMismatch { expected: 2, .. }
        ));
        assert!(matches!(
            encode_frame(&layout, op, 0, &[FieldValue::U16(1), FieldValue::Bytes(vec![])])
                .unwrap_err(),
            EncodeError::ValueTypeMismatch { .. }
        ));
    }

    #[test]
    fn oversized_tail_is_rejected_before_encoding() {
        let layout = layout();
        let op = layout.operation("i2c_master", "write_request").unwrap();

        // fixed_size is 1, so a 65535-byte tail pushes the payload past
        // what the u16 length field can carry
        let err = encode_frame(
            &layout,
            op,
            0,
            &[FieldValue::U8(0x23), FieldValue::Bytes(vec![0; 65535])],
        )
        .unwrap_err();
        assert!(matches!(
            err,
            EncodeError::PayloadTooLarge {
                payload_len: 65536,
                ..
            }
        ));

        // the largest tail that still fits encodes with an honest header
        let frame = encode_frame(
            &layout,
            op,
            0,
            &[FieldValue::U8(0x23), FieldValue::Bytes(vec![0; 65534])],
        )
        .unwrap();
        let header = FrameHeader::parse(&layout, &frame).unwrap();
        assert_eq!(header.payload_len, 65535);
        assert_eq!(frame.len(), layout.header_size + 65535);
    }

    #[test]
    fn parse_rejects_unrecognized_header_field() {
        let yaml = r#"
version: 1
message:
  fields:
    component: u8
    operation: u8
    magic: u8
  components: {}
"#;
        let layout = resolve(&parse_str(yaml).unwrap()).unwrap();
        let err = FrameHeader::parse(&layout, &[0, 0, 0]).unwrap_err();
        match err {
            DecodeError::UnknownHeaderField { field } => assert_eq!(field, "magic"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn encode_rejects_unknown_enum_symbol() {
        let layout = layout();
        let op = layout.operation("i2c_master", "write_response").unwrap();
        let err =
            encode_frame(&layout, op, 0, &[FieldValue::Enum("missing".into())]).unwrap_err();
        assert!(matches!(err, EncodeError::UnknownEnumSymbol { .. }));
    }
}
