// SPDX-License-Identifier: Apache-2.0

/*!
MultiBus Bindings Generator

Compiles a YAML protocol description into C and Python bindings.

Usage:
  cargo run --bin multibus_bindgen -- [OUT_DIR] --schema protocol/multibus.yml --backend all

Artifacts land in OUT_DIR (default: the schema's directory). Nothing is
written unless every requested backend rendered successfully.
*/

use anyhow::Context;
use clap::{Parser, ValueEnum};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum BackendArg {
    C,
    Python,
    All,
}

impl BackendArg {
    fn backends(self) -> &'static [multibus::codegen::Backend] {
        match self {
            BackendArg::C => &[multibus::codegen::Backend::C],
            BackendArg::Python => &[multibus::codegen::Backend::Python],
            BackendArg::All => multibus::codegen::ALL_BACKENDS,
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "multibus_bindgen", about = "MultiBus protocol bindings generator")]
struct Args {
    /// Output directory (defaults to the schema's directory)
    out_dir: Option<PathBuf>,

    /// Protocol description to compile
    #[arg(long, default_value = "protocol/multibus.yml")]
    schema: PathBuf,

    /// Target language(s)
    #[arg(long, value_enum, default_value_t = BackendArg::All)]
    backend: BackendArg,

    /// Print the validated protocol model as YAML and exit
    #[arg(long)]
    dump_ir: bool,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let proto = multibus::schema::load_file(&args.schema)
        .with_context(|| format!("failed to load schema '{}'", args.schema.display()))?;
    info!(
        version = proto.version,
        components = proto.components.len(),
        "loaded protocol description"
    );

    if args.dump_ir {
        print!("{}", serde_yaml::to_string(&proto)?);
        return Ok(());
    }

    let layout = multibus::layout::resolve(&proto).context("layout resolution failed")?;

    let artifacts = multibus::codegen::generate(&proto, &layout, args.backend.backends())
        .context("code generation failed")?;

    let out_dir = match &args.out_dir {
        Some(dir) => dir.clone(),
        None => args
            .schema
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."))
            .to_path_buf(),
    };
    let written = multibus::codegen::write_artifacts(&out_dir, &artifacts)
        .with_context(|| format!("failed to write into '{}'", out_dir.display()))?;

    for path in &written {
        println!("wrote {}", path.display());
    }
    Ok(())
}
