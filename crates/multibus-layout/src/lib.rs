// SPDX-License-Identifier: Apache-2.0

//! # MultiBus Layout
//!
//! Resolves the byte layout of a validated protocol description and proves
//! it with a layout-driven reference codec.
//!
//! The resolver walks the IR exactly once and computes, for every header
//! field and every operation field, its byte offset and fixed size. The
//! resulting [`ResolvedLayout`] is immutable and language-neutral; every
//! backend emitter reads it and none recomputes offsets. Duplicating the
//! offset loop per backend is the single biggest cross-backend wire
//! compatibility risk, so it lives here and nowhere else.
//!
//! The [`wire`] module encodes and decodes frames directly from the
//! resolved layout. Tests use it to pin down the layout contract; Rust
//! collaborators can use it to talk to a MultiBus bridge without generated
//! bindings.

pub mod resolver;
pub mod wire;

pub use resolver::{resolve, FieldSlot, OperationLayout, ResolvedLayout};
pub use wire::{FieldValue, FrameHeader};

/// Layout resolution errors. Fatal: generation aborts, no artifact is
/// written.
#[derive(Debug, thiserror::Error)]
pub enum LayoutError {
    #[error("field '{field}' has type '{type_name}' which has no fixed wire size here")]
    UnsupportedType { field: String, type_name: String },
}

/// Errors raised while encoding a frame through the reference codec.
#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("operation '{operation}' takes {expected} field values, got {given}")]
    FieldCountMismatch {
        operation: String,
        expected: usize,
        given: usize,
    },

    #[error("value for field '{field}' does not match its declared type '{type_name}'")]
    ValueTypeMismatch { field: String, type_name: String },

    #[error("enum field '{field}' has no symbol named '{symbol}'")]
    UnknownEnumSymbol { field: String, symbol: String },

    #[error("header field '{field}' has no frame-level meaning")]
    UnknownHeaderField { field: String },

    #[error("payload of operation '{operation}' is {payload_len} bytes, which does not fit the u16 length field")]
    PayloadTooLarge {
        operation: String,
        payload_len: usize,
    },
}

/// Runtime decode errors.
///
/// Recoverable by the caller (a driver may retry the request), never
/// inside the accessor itself.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("payload too short for field '{field}': need {needed} bytes, have {available}")]
    ShortPayload {
        field: String,
        needed: usize,
        available: usize,
    },

    #[error("byte too short for header: need {needed} bytes, have {available}")]
    ShortHeader { needed: usize, available: usize },

    #[error("raw byte {value} of field '{field}' matches no symbol of enum '{enum_name}'")]
    UnknownEnumValue {
        field: String,
        enum_name: String,
        value: u8,
    },

    #[error("field '{field}' does not hold valid UTF-8 text")]
    InvalidText { field: String },

    #[error("header field '{field}' has no frame-level meaning")]
    UnknownHeaderField { field: String },
}
