// SPDX-License-Identifier: Apache-2.0

//! C backend
//!
//! Emits `multibus_protocol.h` (constants, enums, inline getters, setup
//! prototypes), `multibus_protocol.c` (header builder, setup bodies,
//! is_event switches) and `multibus_transport_protocol.h` (send helpers
//! over `mb_transport_t`).
//!
//! Every offset in the emitted text comes from the resolved layout; this
//! module performs no offset arithmetic beyond adding the header size to
//! payload-relative slot offsets for setup bodies.

use crate::{header_role_value, upper, CodegenResult};
use multibus_layout::{FieldSlot, OperationLayout, ResolvedLayout};
use multibus_schema::{EnumSymbol, ProtocolDescription, TypeTag};
use std::fmt::Write;

const HEADER_START: &str = "
#ifndef MULTIBUS_PROTOCOL_H_
#define MULTIBUS_PROTOCOL_H_

// Generated by multibus_bindgen. Do not edit.

#include <assert.h>
#include <stdbool.h>
#include <stdint.h>
#include <string.h>

#if defined __cplusplus
extern \"C\" {
#endif

typedef struct {
    uint8_t         component;
    uint8_t         channel;
    uint8_t         operation;
    uint16_t        payload_len;
    const uint8_t * payload_data;
} mb_message_t;

";

const HEADER_END: &str = "
#if defined __cplusplus
}
#endif

#endif // MULTIBUS_PROTOCOL_H_
";

const CODE_START: &str = "
// MultiBus Protocol Implementation

// Generated by multibus_bindgen. Do not edit.

#include \"multibus_protocol.h\"

";

const TRANSPORT_START: &str = "
#ifndef MULTIBUS_PROTOCOL_TRANSPORT_H_
#define MULTIBUS_PROTOCOL_TRANSPORT_H_

// Generated by multibus_bindgen. Do not edit.

#include \"multibus_protocol.h\"
#include \"multibus_transport.h\"

#if defined __cplusplus
extern \"C\" {
#endif

";

const TRANSPORT_END: &str = "
#if defined __cplusplus
}
#endif

#endif // MULTIBUS_PROTOCOL_TRANSPORT_H_
";

fn enum_type_name(enum_name: &str) -> String {
    format!("mb_{}_t", enum_name.to_lowercase())
}

fn slot_c_type(slot: &FieldSlot) -> String {
    match slot.tag {
        TypeTag::Bool => "bool".to_string(),
        TypeTag::U8 => "uint8_t".to_string(),
        TypeTag::U16 => "uint16_t".to_string(),
        TypeTag::U32 => "uint32_t".to_string(),
        TypeTag::Str => "const char *".to_string(),
        TypeTag::Bytes => "const uint8_t *".to_string(),
        TypeTag::Enum => enum_type_name(slot.enum_name.as_deref().unwrap_or(&slot.name)),
    }
}

/// Read expression for a slot at its resolved offset within `buffer`.
fn slot_accessor(slot: &FieldSlot, buffer: &str) -> String {
    let offset = slot.offset;
    match slot.tag {
        TypeTag::Bool => format!("{buffer}[{offset}] != 0"),
        TypeTag::U8 => format!("{buffer}[{offset}]"),
        TypeTag::U16 => format!("(({buffer}[{offset}] << 8) | {buffer}[{offset} + 1])"),
        TypeTag::U32 => format!(
            "(((uint32_t) {buffer}[{offset}] << 24) | ((uint32_t) {buffer}[{offset} + 1] << 16) | ({buffer}[{offset} + 2] << 8) | {buffer}[{offset} + 3])"
        ),
        TypeTag::Str => format!("(const char *) &{buffer}[{offset}]"),
        TypeTag::Bytes => format!("&{buffer}[{offset}]"),
        TypeTag::Enum => format!("({}) {buffer}[{offset}]", slot_c_type(slot)),
    }
}

/// Argument list for a setup function: buffer, buffer length, channel and
/// the declared fields. Byte arrays get an explicit length argument.
fn setup_arguments(op: &OperationLayout) -> String {
    let mut args = vec![
        "uint8_t * buffer_data".to_string(),
        "uint16_t buffer_len".to_string(),
        "uint8_t channel".to_string(),
    ];
    for slot in &op.slots {
        if slot.tag == TypeTag::Bytes {
            args.push(format!("uint16_t {}_len", slot.name));
        }
        args.push(format!("{} {}", slot_c_type(slot), slot.name));
    }
    args.join(", ")
}

fn header_arguments(layout: &ResolvedLayout) -> String {
    layout
        .header
        .iter()
        .map(|slot| format!("{} {}", slot_c_type(slot), slot.name))
        .collect::<Vec<_>>()
        .join(", ")
}

fn write_enum(out: &mut String, enum_name: &str, symbols: &[EnumSymbol]) {
    out.push_str("typedef enum {\n");
    for symbol in symbols {
        let _ = writeln!(
            out,
            "    MB_{}_{} = 0x{:x},",
            upper(enum_name),
            upper(&symbol.name),
            symbol.value
        );
    }
    let _ = writeln!(out, "}} {};", enum_type_name(enum_name));
}

fn setup_fn_name(op: &OperationLayout) -> String {
    format!("mb_{}_{}_setup", op.component, op.operation)
}

fn component_const(op: &OperationLayout) -> String {
    format!("MB_COMPONENT_{}", upper(&op.component))
}

fn operation_const(op: &OperationLayout) -> String {
    format!(
        "MB_OPERATION_{}_{}",
        upper(&op.component),
        upper(&op.operation)
    )
}

/// Render `multibus_protocol.h`.
pub fn generate_header(
    proto: &ProtocolDescription,
    layout: &ResolvedLayout,
) -> CodegenResult<String> {
    let mut out = String::new();
    out.push_str(HEADER_START);

    let _ = writeln!(out, "// MultiBus Protocol Version");
    let _ = writeln!(out, "#define MB_PROTOCOL_VERSION {}", proto.version);
    out.push('\n');
    let _ = writeln!(out, "// MultiBus Protocol Header Size");
    let _ = writeln!(out, "#define MB_HEADER_SIZE {}", layout.header_size);
    out.push('\n');

    out.push_str("// Component Enumeration\n");
    let components: Vec<EnumSymbol> = proto
        .components
        .iter()
        .map(|c| EnumSymbol {
            name: c.name.clone(),
            value: c.id,
        })
        .collect();
    write_enum(&mut out, "component", &components);
    out.push('\n');

    out.push_str("// Operation Enumerations\n");
    for component in &proto.components {
        let ops: Vec<EnumSymbol> = component
            .operations
            .iter()
            .map(|op| EnumSymbol {
                name: op.name.clone(),
                value: op.id,
            })
            .collect();
        write_enum(&mut out, &format!("operation_{}", component.name), &ops);
        out.push('\n');
    }

    out.push_str("// General Enumerations\n");
    for table in &proto.general_enums {
        write_enum(&mut out, &table.name, &table.symbols);
    }
    out.push('\n');

    out.push_str("// Field Enumerations\n");
    for table in &proto.field_enums {
        write_enum(&mut out, &table.name, &table.symbols);
    }
    out.push('\n');

    out.push_str("// MultiBus Protocol Getter for Header\n");
    for slot in &layout.header {
        let _ = writeln!(
            out,
            "static inline {} mb_header_get_{}(const uint8_t * header) {{\n    return {};\n}}",
            slot_c_type(slot),
            slot.name,
            slot_accessor(slot, "header")
        );
    }
    out.push('\n');

    out.push_str("// MultiBus Header Builder\n");
    let _ = writeln!(
        out,
        "void mb_header_setup(uint8_t * buffer, {});",
        header_arguments(layout)
    );
    out.push('\n');

    for component in &proto.components {
        let _ = writeln!(out, "// Component: {}, is_event", component.name);
        let _ = writeln!(out, "bool mb_{}_is_event(uint8_t opcode);", component.name);
        out.push('\n');

        for op in layout.operations_of(&component.name) {
            let _ = writeln!(
                out,
                "// Component: {}, Operation: {}",
                op.component, op.operation
            );

            let op_prefix = format!("mb_{}_{}_", op.component, op.operation);
            let payload_prefix = format!("{op_prefix}get_");
            let message_prefix = format!("mb_message_{}_{}_get_", op.component, op.operation);
            for slot in &op.slots {
                if slot.tag.is_variable() {
                    write_len_getter(&mut out, &payload_prefix, slot);
                }
                if slot.tag == TypeTag::Enum {
                    write_enum_known_predicate(&mut out, &op_prefix, slot);
                }
                let _ = writeln!(
                    out,
                    "static inline {} {}{}(const uint8_t * payload) {{\n    return {};\n}}",
                    slot_c_type(slot),
                    payload_prefix,
                    slot.name,
                    slot_accessor(slot, "payload")
                );
                let _ = writeln!(
                    out,
                    "static inline {} {}{}(const mb_message_t * message) {{\n    return {};\n}}",
                    slot_c_type(slot),
                    message_prefix,
                    slot.name,
                    slot_accessor(slot, "message->payload_data")
                );
            }
            out.push('\n');

            let _ = writeln!(
                out,
                "uint16_t {}({});",
                setup_fn_name(op),
                setup_arguments(op)
            );
            out.push('\n');
        }
    }

    out.push_str(HEADER_END);
    Ok(out)
}

fn write_len_getter(out: &mut String, prefix: &str, slot: &FieldSlot) {
    if slot.offset == 0 {
        let _ = writeln!(
            out,
            "static inline uint16_t {}{}_len(uint16_t payload_len) {{\n    return payload_len;\n}}",
            prefix, slot.name
        );
    } else {
        let _ = writeln!(
            out,
            "static inline uint16_t {}{}_len(uint16_t payload_len) {{\n    return payload_len - {};\n}}",
            prefix, slot.name, slot.offset
        );
    }
}

/// A getter cannot report a bad byte in C, so each enum field also gets a
/// predicate telling the caller whether the raw byte names a declared
/// symbol.
fn write_enum_known_predicate(out: &mut String, prefix: &str, slot: &FieldSlot) {
    let enum_name = slot.enum_name.as_deref().unwrap_or(&slot.name);
    let _ = writeln!(
        out,
        "static inline bool {}{}_known(const uint8_t * payload) {{",
        prefix, slot.name
    );
    let _ = writeln!(out, "    switch (payload[{}]) {{", slot.offset);
    for symbol in &slot.symbols {
        let _ = writeln!(
            out,
            "        case MB_{}_{}:",
            upper(enum_name),
            upper(&symbol.name)
        );
    }
    if !slot.symbols.is_empty() {
        out.push_str("            return true;\n");
    }
    out.push_str("        default:\n            return false;\n    }\n}\n");
}

/// Render `multibus_protocol.c`.
pub fn generate_source(
    proto: &ProtocolDescription,
    layout: &ResolvedLayout,
) -> CodegenResult<String> {
    let mut out = String::new();
    out.push_str(CODE_START);

    out.push_str("// MultiBus Header Builder\n");
    let _ = writeln!(
        out,
        "void mb_header_setup(uint8_t * buffer, {}){{",
        header_arguments(layout)
    );
    for slot in &layout.header {
        write_field_store(&mut out, slot, "buffer", slot.offset, &slot.name);
    }
    out.push_str("}\n\n");

    for component in &proto.components {
        let mut event_ids: Vec<u8> = Vec::new();
        for op in layout.operations_of(&component.name) {
            if op.kind == multibus_schema::OperationKind::Event {
                event_ids.push(op.operation_id);
            }
            let _ = writeln!(
                out,
                "// Component: {}, Operation: {}",
                op.component, op.operation
            );
            write_setup_body(&mut out, layout, op)?;
        }

        let _ = writeln!(out, "bool mb_{}_is_event(uint8_t opcode){{", component.name);
        out.push_str("    switch (opcode){\n");
        for id in &event_ids {
            let _ = writeln!(out, "        case 0x{id:x}:");
        }
        if !event_ids.is_empty() {
            out.push_str("            return true;\n");
        }
        out.push_str("        default:\n            return false;\n    }\n}\n\n");
    }

    Ok(out)
}

fn write_setup_body(
    out: &mut String,
    layout: &ResolvedLayout,
    op: &OperationLayout,
) -> CodegenResult<()> {
    let _ = writeln!(out, "uint16_t {}({}){{", setup_fn_name(op), setup_arguments(op));

    // String length is derived at encode time; byte arrays carry theirs as
    // an argument.
    let mut variable_len: Option<String> = None;
    if let Some(tail) = op.variable_tail() {
        if tail.tag == TypeTag::Str {
            let _ = writeln!(
                out,
                "    uint16_t {}_len = (uint16_t) strlen({});",
                tail.name, tail.name
            );
        }
        variable_len = Some(format!("{}_len", tail.name));
    }

    match &variable_len {
        Some(len) => {
            let _ = writeln!(out, "    uint32_t payload_len = {} + {};", op.fixed_size, len);
            // the header length field is a u16; a longer tail must not
            // truncate silently
            out.push_str("    assert(payload_len <= 0xffff);\n");
        }
        None => {
            let _ = writeln!(out, "    uint32_t payload_len = {};", op.fixed_size);
        }
    }
    out.push_str("    uint32_t message_len = payload_len + MB_HEADER_SIZE;\n");
    out.push_str("    assert(buffer_len >= message_len);\n");

    let operation_cast = format!("(uint8_t) {}", operation_const(op));
    let mut call_args = vec!["buffer_data".to_string()];
    for header_slot in &layout.header {
        call_args.push(header_role_value(
            &header_slot.name,
            &component_const(op),
            &operation_cast,
            "channel",
            "payload_len",
        )?);
    }
    let _ = writeln!(out, "    mb_header_setup({});", call_args.join(", "));

    for slot in &op.slots {
        let at = layout.header_size + slot.offset;
        if slot.tag.is_variable() {
            let _ = writeln!(
                out,
                "    memcpy(&buffer_data[{at}], {name}, {name}_len);",
                name = slot.name
            );
        } else {
            write_field_store(out, slot, "buffer_data", at, &slot.name);
        }
    }
    out.push_str("    return (uint16_t) message_len;\n}\n\n");
    Ok(())
}

/// Store one fixed-size value into `buffer` at an absolute offset,
/// big-endian for the multi-byte types.
fn write_field_store(out: &mut String, slot: &FieldSlot, buffer: &str, at: usize, value: &str) {
    match slot.tag {
        TypeTag::Bool => {
            let _ = writeln!(out, "    {buffer}[{at}] = {value} ? 1 : 0;");
        }
        TypeTag::U8 => {
            let _ = writeln!(out, "    {buffer}[{at}] = {value};");
        }
        TypeTag::Enum => {
            let _ = writeln!(out, "    {buffer}[{at}] = (uint8_t) {value};");
        }
        TypeTag::U16 => {
            let _ = writeln!(out, "    {buffer}[{at}] = {value} >> 8;");
            let _ = writeln!(out, "    {buffer}[{}] = {value} & 0xff;", at + 1);
        }
        TypeTag::U32 => {
            let _ = writeln!(out, "    {buffer}[{at}] = {value} >> 24;");
            let _ = writeln!(out, "    {buffer}[{}] = {value} >> 16;", at + 1);
            let _ = writeln!(out, "    {buffer}[{}] = {value} >> 8;", at + 2);
            let _ = writeln!(out, "    {buffer}[{}] = {value} & 0xff;", at + 3);
        }
        TypeTag::Str | TypeTag::Bytes => {
            // handled by the caller via memcpy
        }
    }
}

/// Render `multibus_transport_protocol.h`: one send helper per operation
/// that builds into the transport's send buffer and hands the frame over.
pub fn generate_transport_header(
    proto: &ProtocolDescription,
    layout: &ResolvedLayout,
) -> CodegenResult<String> {
    let mut out = String::new();
    out.push_str(TRANSPORT_START);

    for component in &proto.components {
        for op in layout.operations_of(&component.name) {
            let _ = writeln!(
                out,
                "// Component: {}, Operation: {}",
                op.component, op.operation
            );

            let mut args = vec!["uint8_t channel".to_string()];
            let mut forward = vec!["channel".to_string()];
            for slot in &op.slots {
                if slot.tag == TypeTag::Bytes {
                    args.push(format!("uint16_t {}_len", slot.name));
                    forward.push(format!("{}_len", slot.name));
                }
                args.push(format!("{} {}", slot_c_type(slot), slot.name));
                forward.push(slot.name.clone());
            }

            let _ = writeln!(
                out,
                "static inline void mb_transport_{}_{}_send(mb_transport_t * transport, {}){{",
                op.component,
                op.operation,
                args.join(", ")
            );
            let _ = writeln!(
                out,
                "    uint16_t request_len = {}(transport->send_buffer_storage, transport->send_buffer_size, {});",
                setup_fn_name(op),
                forward.join(", ")
            );
            out.push_str("    mb_transport_send(transport, transport->send_buffer_storage, request_len);\n");
            out.push_str("}\n\n");
        }
    }

    out.push_str(TRANSPORT_END);
    Ok(out)
}
