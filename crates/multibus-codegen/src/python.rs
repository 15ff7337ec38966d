// SPDX-License-Identifier: Apache-2.0

//! Python backend
//!
//! Emits a single `multibus_protocol.py` module: integer constants, a
//! header builder, one setup function per operation returning the full
//! frame as `bytes`, and per-field payload getters. Getters raise
//! `MBDecodeError` on short payloads and on enum bytes that name no
//! declared symbol.

use crate::{header_role_value, upper, CodegenResult};
use multibus_layout::{FieldSlot, OperationLayout, ResolvedLayout};
use multibus_schema::{ProtocolDescription, TypeTag};
use std::fmt::Write;

const MODULE_START: &str = "\
# MultiBus Protocol Bindings
#
# Generated by multibus_bindgen. Do not edit.

import struct


class MBDecodeError(Exception):
    \"\"\"A received frame does not match the protocol description.\"\"\"


";

/// `struct` format character for a fixed-size slot, big-endian.
fn py_fmt(tag: TypeTag) -> char {
    match tag {
        TypeTag::Bool | TypeTag::U8 | TypeTag::Enum => 'B',
        TypeTag::U16 => 'H',
        TypeTag::U32 => 'I',
        TypeTag::Str | TypeTag::Bytes => unreachable!("variable slots are never packed"),
    }
}

fn enum_values_name(enum_name: &str) -> String {
    format!("_MB_{}_VALUES", upper(enum_name))
}

fn pack_expr(slot: &FieldSlot) -> String {
    if slot.tag == TypeTag::Bool {
        format!("1 if {} else 0", slot.name)
    } else {
        slot.name.clone()
    }
}

/// Render `multibus_protocol.py`.
pub fn generate_module(
    proto: &ProtocolDescription,
    layout: &ResolvedLayout,
) -> CodegenResult<String> {
    let mut out = String::new();
    out.push_str(MODULE_START);

    let _ = writeln!(out, "MB_PROTOCOL_VERSION = {}", proto.version);
    let _ = writeln!(out, "MB_HEADER_SIZE = {}", layout.header_size);
    out.push('\n');

    out.push_str("# Component identifiers\n");
    for component in &proto.components {
        let _ = writeln!(
            out,
            "MB_COMPONENT_ID_{} = 0x{:x}",
            upper(&component.name),
            component.id
        );
    }
    out.push('\n');

    out.push_str("# Operation identifiers\n");
    for component in &proto.components {
        for op in &component.operations {
            let _ = writeln!(
                out,
                "MB_OPERATION_ID_{}_{} = 0x{:x}",
                upper(&component.name),
                upper(&op.name),
                op.id
            );
        }
    }
    out.push('\n');

    out.push_str("# Enumerations\n");
    for table in proto.general_enums.iter().chain(&proto.field_enums) {
        for symbol in &table.symbols {
            let _ = writeln!(
                out,
                "MB_{}_{} = 0x{:x}",
                upper(&table.name),
                upper(&symbol.name),
                symbol.value
            );
        }
        let values: Vec<String> = table
            .symbols
            .iter()
            .map(|s| format!("0x{:x}", s.value))
            .collect();
        let _ = writeln!(
            out,
            "{} = frozenset(({}))",
            enum_values_name(&table.name),
            join_tuple(&values)
        );
        out.push('\n');
    }

    for component in &proto.components {
        let ids: Vec<String> = layout
            .operations_of(&component.name)
            .filter(|op| op.kind == multibus_schema::OperationKind::Event)
            .map(|op| format!("0x{:x}", op.operation_id))
            .collect();
        let _ = writeln!(
            out,
            "_MB_{}_EVENT_IDS = frozenset(({}))",
            upper(&component.name),
            join_tuple(&ids)
        );
    }
    out.push('\n');

    write_header_builder(&mut out, layout);
    write_header_getters(&mut out, layout);

    for component in &proto.components {
        let _ = writeln!(out, "\n# Component: {}", component.name);
        let _ = writeln!(out, "def mb_{}_is_event(opcode):", component.name);
        let _ = writeln!(
            out,
            "    return opcode in _MB_{}_EVENT_IDS\n",
            upper(&component.name)
        );

        for op in layout.operations_of(&component.name) {
            write_setup(&mut out, layout, op)?;
            for slot in &op.slots {
                write_getter(&mut out, op, slot);
            }
        }
    }

    Ok(out)
}

fn join_tuple(items: &[String]) -> String {
    // single-element tuples need the trailing comma
    match items.len() {
        0 => String::new(),
        1 => format!("{},", items[0]),
        _ => items.join(", "),
    }
}

fn write_header_builder(out: &mut String, layout: &ResolvedLayout) {
    let args: Vec<&str> = layout.header.iter().map(|s| s.name.as_str()).collect();
    let fmt: String = layout.header.iter().map(|s| py_fmt(s.tag)).collect();
    let _ = writeln!(out, "\ndef mb_header_setup({}):", args.join(", "));
    let _ = writeln!(
        out,
        "    return struct.pack('>{}', {})\n",
        fmt,
        args.join(", ")
    );
}

fn write_header_getters(out: &mut String, layout: &ResolvedLayout) {
    for slot in &layout.header {
        let _ = writeln!(out, "\ndef mb_header_get_{}(header):", slot.name);
        out.push_str("    if len(header) < MB_HEADER_SIZE:\n");
        let _ = writeln!(
            out,
            "        raise MBDecodeError('header too short for {}')",
            slot.name
        );
        let _ = writeln!(
            out,
            "    (value,) = struct.unpack_from('>{}', header, {})",
            py_fmt(slot.tag),
            slot.offset
        );
        if slot.tag == TypeTag::Enum {
            write_enum_check(out, slot, "header");
        }
        out.push_str("    return value\n");
    }
}

fn write_enum_check(out: &mut String, slot: &FieldSlot, context: &str) {
    let enum_name = slot.enum_name.as_deref().unwrap_or(&slot.name);
    let _ = writeln!(out, "    if value not in {}:", enum_values_name(enum_name));
    let _ = writeln!(
        out,
        "        raise MBDecodeError('unknown {} value 0x%02x in {}' % value)",
        enum_name, context
    );
}

fn write_setup(
    out: &mut String,
    layout: &ResolvedLayout,
    op: &OperationLayout,
) -> CodegenResult<()> {
    let mut args = vec!["channel".to_string()];
    args.extend(op.slots.iter().map(|s| s.name.clone()));
    let _ = writeln!(
        out,
        "\ndef mb_{}_{}_setup({}):",
        op.component,
        op.operation,
        args.join(", ")
    );

    let tail = op.variable_tail();
    if let Some(tail) = tail {
        match tail.tag {
            TypeTag::Str => {
                let _ = writeln!(out, "    {name} = {name}.encode('utf-8')", name = tail.name);
            }
            _ => {
                let _ = writeln!(out, "    {name} = bytes({name})", name = tail.name);
            }
        }
        let _ = writeln!(
            out,
            "    payload_len = {} + len({})",
            op.fixed_size, tail.name
        );
    } else {
        let _ = writeln!(out, "    payload_len = {}", op.fixed_size);
    }

    let component_const = format!("MB_COMPONENT_ID_{}", upper(&op.component));
    let operation_const = format!(
        "MB_OPERATION_ID_{}_{}",
        upper(&op.component),
        upper(&op.operation)
    );
    let mut call_args = Vec::with_capacity(layout.header.len());
    for header_slot in &layout.header {
        call_args.push(header_role_value(
            &header_slot.name,
            &component_const,
            &operation_const,
            "channel",
            "payload_len",
        )?);
    }
    let _ = writeln!(out, "    header = mb_header_setup({})", call_args.join(", "));

    let fixed: Vec<&FieldSlot> = op.slots.iter().filter(|s| !s.is_variable()).collect();
    if fixed.is_empty() {
        out.push_str("    payload = b''\n");
    } else {
        let fmt: String = fixed.iter().map(|s| py_fmt(s.tag)).collect();
        let values: Vec<String> = fixed.iter().map(|s| pack_expr(s)).collect();
        let _ = writeln!(
            out,
            "    payload = struct.pack('>{}', {})",
            fmt,
            values.join(", ")
        );
    }

    match tail {
        Some(tail) => {
            let _ = writeln!(out, "    return header + payload + {}\n", tail.name);
        }
        None => {
            out.push_str("    return header + payload\n");
        }
    }
    Ok(())
}

fn write_getter(out: &mut String, op: &OperationLayout, slot: &FieldSlot) {
    if slot.is_variable() {
        let _ = writeln!(
            out,
            "\ndef mb_{}_{}_get_{}_len(payload_len):",
            op.component, op.operation, slot.name
        );
        if slot.offset == 0 {
            out.push_str("    return payload_len\n");
        } else {
            let _ = writeln!(out, "    return payload_len - {}", slot.offset);
        }
    }

    let _ = writeln!(
        out,
        "\ndef mb_{}_{}_get_{}(payload):",
        op.component, op.operation, slot.name
    );

    let needed = if slot.is_variable() {
        slot.offset
    } else {
        slot.offset + slot.size
    };
    let _ = writeln!(out, "    if len(payload) < {needed}:");
    let _ = writeln!(
        out,
        "        raise MBDecodeError('payload too short for {}')",
        slot.name
    );

    match slot.tag {
        TypeTag::Bytes => {
            let _ = writeln!(out, "    return bytes(payload[{}:])", slot.offset);
        }
        TypeTag::Str => {
            out.push_str("    try:\n");
            let _ = writeln!(
                out,
                "        return bytes(payload[{}:]).decode('utf-8')",
                slot.offset
            );
            out.push_str("    except UnicodeDecodeError as exc:\n");
            let _ = writeln!(
                out,
                "        raise MBDecodeError('invalid text in {}') from exc",
                slot.name
            );
        }
        TypeTag::Bool => {
            let _ = writeln!(out, "    return payload[{}] != 0", slot.offset);
        }
        _ => {
            let _ = writeln!(
                out,
                "    (value,) = struct.unpack_from('>{}', payload, {})",
                py_fmt(slot.tag),
                slot.offset
            );
            if slot.tag == TypeTag::Enum {
                write_enum_check(out, slot, "payload");
            }
            out.push_str("    return value\n");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use multibus_layout::resolve;
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
      unknown_error: 1
  components:
    i2c_master:
      id: 1
      operations:
        write_request:
          id: 1
          fields:
            slave_address: u8
            data: u8[]
        read_response:
          id: 4
          fields:
            status: enum
            slave_address: u16
            data: u8[]
        data_received_event:
          id: 128
          fields:
            data: u8[]
    bridge:
      id: 0
      operations:
        hardware_info_response:
          id: 3
          fields:
            info: string
"#;

    fn module() -> String {
        let proto = parse_str(SCHEMA).unwrap();
        let layout = resolve(&proto).unwrap();
        generate_module(&proto, &layout).unwrap()
    }

    #[test]
    fn module_defines_constants() {
        let module = module();
        assert!(module.contains("MB_PROTOCOL_VERSION = 1"));
        assert!(module.contains("MB_HEADER_SIZE = 5"));
        assert!(module.contains("MB_COMPONENT_ID_I2C_MASTER = 0x1"));
        assert!(module.contains("MB_OPERATION_ID_I2C_MASTER_READ_RESPONSE = 0x4"));
        assert!(module.contains("MB_STATUS_UNKNOWN_ERROR = 0x1"));
        assert!(module.contains("_MB_STATUS_VALUES = frozenset((0x0, 0x1))"));
    }

    #[test]
    fn header_builder_packs_big_endian() {
        let module = module();
        assert!(module.contains("def mb_header_setup(component, operation, channel, payload_len):"));
        assert!(module.contains("return struct.pack('>BBBH', component, operation, channel, payload_len)"));
    }

    #[test]
    fn setup_builds_header_then_payload_then_tail() {
        let module = module();
        assert!(module.contains("def mb_i2c_master_write_request_setup(channel, slave_address, data):"));
        assert!(module.contains("    data = bytes(data)"));
        assert!(module.contains("    payload_len = 1 + len(data)"));
        assert!(module.contains(
            "    header = mb_header_setup(MB_COMPONENT_ID_I2C_MASTER, MB_OPERATION_ID_I2C_MASTER_WRITE_REQUEST, channel, payload_len)"
        ));
        assert!(module.contains("    payload = struct.pack('>B', slave_address)"));
        assert!(module.contains("    return header + payload + data"));
    }

    #[test]
    fn string_setup_encodes_before_measuring() {
        let module = module();
        assert!(module.contains("    info = info.encode('utf-8')"));
        assert!(module.contains("    payload_len = 0 + len(info)"));
    }

    #[test]
    fn enum_getter_raises_on_unknown_value() {
        let module = module();
        assert!(module.contains("def mb_i2c_master_read_response_get_status(payload):"));
        assert!(module.contains("    if value not in _MB_STATUS_VALUES:"));
        assert!(module.contains("raise MBDecodeError('unknown status value 0x%02x in payload' % value)"));
    }

    #[test]
    fn getters_check_payload_length() {
        let module = module();
        // slave_address is a u16 at offset 1, so 3 bytes are required
        assert!(module.contains("def mb_i2c_master_read_response_get_slave_address(payload):"));
        assert!(module.contains("    if len(payload) < 3:"));
        assert!(module.contains("    (value,) = struct.unpack_from('>H', payload, 1)"));
        // the tail starts at 3 and may be empty
        assert!(module.contains("    return bytes(payload[3:])"));
    }

    #[test]
    fn variable_tail_gets_a_len_helper() {
        let module = module();
        // data starts at offset 1 in write_request, offset 3 in read_response
        assert!(module.contains("def mb_i2c_master_write_request_get_data_len(payload_len):"));
        assert!(module.contains("    return payload_len - 1"));
        assert!(module.contains("def mb_i2c_master_read_response_get_data_len(payload_len):"));
        assert!(module.contains("    return payload_len - 3"));
        // the whole payload when the tail is the only field
        let event = module
            .split("def mb_i2c_master_data_received_event_get_data_len(payload_len):")
            .nth(1)
            .unwrap();
        assert!(event.starts_with("\n    return payload_len\n"));
    }

    #[test]
    fn is_event_checks_membership() {
        let module = module();
        assert!(module.contains("_MB_I2C_MASTER_EVENT_IDS = frozenset((0x80,))"));
        assert!(module.contains("_MB_BRIDGE_EVENT_IDS = frozenset(())"));
        assert!(module.contains("def mb_i2c_master_is_event(opcode):"));
        assert!(module.contains("    return opcode in _MB_I2C_MASTER_EVENT_IDS"));
    }
}
