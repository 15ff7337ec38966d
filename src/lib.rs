//! # MultiBus - schema-driven bindings compiler
//!
//! MultiBus turns a YAML description of a framed, multiplexed binary
//! protocol into encode/decode bindings for embedded C and host-side
//! Python. The pipeline has three stages, each its own crate:
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │  multibus-schema                            │
//! │  (YAML loader, validation, protocol IR)     │
//! └─────────────────────────────────────────────┘
//!                      ↓
//! ┌─────────────────────────────────────────────┐
//! │  multibus-layout                            │
//! │  (byte offsets, sizes, reference codec)     │
//! └─────────────────────────────────────────────┘
//!                      ↓
//! ┌─────────────────────────────────────────────┐
//! │  multibus-codegen                           │
//! │  (C and Python emitters, artifact writer)   │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! Offsets are resolved exactly once, in `multibus-layout`; every backend
//! reads the same table, so the generated C and Python can never disagree
//! about where a field lives.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use multibus::prelude::*;
//! use std::path::Path;
//!
//! let proto = load_file(Path::new("protocol/multibus.yml"))?;
//! let layout = resolve(&proto)?;
//! let artifacts = generate(&proto, &layout, ALL_BACKENDS)?;
//! write_artifacts(Path::new("generated"), &artifacts)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! The `multibus_bindgen` binary wraps exactly this pipeline in a CLI.
//!
//! ## License
//!
//! Apache-2.0

pub use multibus_codegen as codegen;
pub use multibus_layout as layout;
pub use multibus_schema as schema;

/// Prelude - commonly used types and functions
pub mod prelude {
    pub use crate::codegen::{generate, write_artifacts, Artifact, Backend, ALL_BACKENDS};
    pub use crate::layout::{resolve, FrameHeader, ResolvedLayout};
    pub use crate::schema::{load_file, parse_str, ProtocolDescription, SchemaError};
}
