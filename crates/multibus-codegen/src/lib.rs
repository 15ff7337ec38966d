// SPDX-License-Identifier: Apache-2.0

//! # MultiBus Codegen
//!
//! Backend emitters for the MultiBus bindings compiler. Each backend is a
//! stateless renderer over `(ProtocolDescription, ResolvedLayout)` and
//! produces source text; none of them computes a byte offset on its own,
//! they all read the resolver's table. Output is deterministic: two runs
//! over an unchanged schema produce byte-identical artifacts.
//!
//! Artifacts are buffered fully in memory and only written after every
//! backend succeeded, so a failing run never leaves a half-written file.
//!
//! ```rust
//! use multibus_codegen::{generate, Backend};
//!
//! let yaml = r#"
//! version: 1
//! message:
//!   fields:
//!     component: u8
//!     operation: u8
//!     channel: u8
//!     payload_len: u16
//!   components:
//!     bridge:
//!       id: 0
//!       operations:
//!         delay_request:
//!           id: 0
//!           fields:
//!             timeout_ms: u32
//! "#;
//! let proto = multibus_schema::parse_str(yaml).unwrap();
//! let layout = multibus_layout::resolve(&proto).unwrap();
//! let artifacts = generate(&proto, &layout, &[Backend::Python]).unwrap();
//! assert_eq!(artifacts[0].file_name, "multibus_protocol.py");
//! assert!(artifacts[0].contents.contains("mb_bridge_delay_request_setup"));
//! ```

pub mod c;
pub mod python;

use multibus_layout::ResolvedLayout;
use multibus_schema::ProtocolDescription;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Code generation errors. Fatal: no artifact is written.
#[derive(Debug, thiserror::Error)]
pub enum CodegenError {
    #[error("header field '{field}' has no frame-level meaning, cannot emit setup code")]
    UnsupportedHeaderField { field: String },

    #[error("failed to write artifact '{file_name}': {source}")]
    Write {
        file_name: String,
        source: std::io::Error,
    },

    #[error("failed to create output directory '{0}'")]
    OutputDir(PathBuf),
}

/// Result type for codegen operations
pub type CodegenResult<T> = Result<T, CodegenError>;

/// One fully rendered output file, still in memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub file_name: &'static str,
    pub contents: String,
}

/// Target language backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    C,
    Python,
}

/// All known backends, in emission order.
pub const ALL_BACKENDS: &[Backend] = &[Backend::C, Backend::Python];

/// Render all artifacts for the requested backends.
///
/// Emitters share no mutable state; each reads the IR and the resolved
/// layout and appends to its own artifact only.
pub fn generate(
    proto: &ProtocolDescription,
    layout: &ResolvedLayout,
    backends: &[Backend],
) -> CodegenResult<Vec<Artifact>> {
    let mut artifacts = Vec::new();
    for backend in backends {
        match backend {
            Backend::C => {
                artifacts.push(Artifact {
                    file_name: "multibus_protocol.h",
                    contents: c::generate_header(proto, layout)?,
                });
                artifacts.push(Artifact {
                    file_name: "multibus_protocol.c",
                    contents: c::generate_source(proto, layout)?,
                });
                artifacts.push(Artifact {
                    file_name: "multibus_transport_protocol.h",
                    contents: c::generate_transport_header(proto, layout)?,
                });
            }
            Backend::Python => {
                artifacts.push(Artifact {
                    file_name: "multibus_protocol.py",
                    contents: python::generate_module(proto, layout)?,
                });
            }
        }
        debug!(?backend, "rendered backend artifacts");
    }
    Ok(artifacts)
}

/// Write previously rendered artifacts into `out_dir`.
///
/// Kept separate from [`generate`] so that a generation failure can never
/// leave partial output behind: callers render everything first and write
/// second.
pub fn write_artifacts(out_dir: &Path, artifacts: &[Artifact]) -> CodegenResult<Vec<PathBuf>> {
    std::fs::create_dir_all(out_dir)
        .map_err(|_| CodegenError::OutputDir(out_dir.to_path_buf()))?;
    let mut written = Vec::with_capacity(artifacts.len());
    for artifact in artifacts {
        let path = out_dir.join(artifact.file_name);
        std::fs::write(&path, &artifact.contents).map_err(|source| CodegenError::Write {
            file_name: artifact.file_name.to_string(),
            source,
        })?;
        info!(path = %path.display(), "wrote bindings artifact");
        written.push(path);
    }
    Ok(written)
}

/// SCREAMING_SNAKE form of a schema identifier.
pub(crate) fn upper(name: &str) -> String {
    name.to_uppercase()
}

/// Value expression to pass for a header field when building a frame for
/// `(component_const, operation_const, channel_expr, payload_len_expr)`.
///
/// The header shape is configurable, but frame setup needs to know which
/// role each header field plays; an unrecognized name is a hard error
/// rather than a silently zeroed byte.
pub(crate) fn header_role_value(
    field_name: &str,
    component: &str,
    operation: &str,
    channel: &str,
    payload_len: &str,
) -> CodegenResult<String> {
    let value = match field_name {
        "component" => component,
        "operation" => operation,
        "channel" => channel,
        "payload_len" => payload_len,
        _ => {
            return Err(CodegenError::UnsupportedHeaderField {
                field: field_name.to_string(),
            })
        }
    };
    Ok(value.to_string())
}
