mod args;
mod loader;

use std::fs;
use std::path::Path;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use strata_chart::codec;
use strata_core::builder::GraphOptions;
use strata_core::model::context::EvalContext;
use strata_render::render_request;

use args::{Args, UsageError, resolve_tz, resolve_window};

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_env("STRATA_LOG"))
        .with_writer(std::io::stderr)
        .init();

    // Clap itself exits 2 on malformed flags.
    let args = Args::parse();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("ERROR {}: {}", err.kind(), err);
            ExitCode::from(err.exit_code())
        }
    }
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Usage(#[from] UsageError),
    #[error(transparent)]
    Data(#[from] strata_core::model::context::DataError),
    #[error(transparent)]
    Loader(#[from] loader::LoaderError),
    #[error(transparent)]
    Graph(#[from] strata_render::GraphError),
    #[error(transparent)]
    Codec(#[from] strata_chart::CodecError),
    #[error("cannot write {path}: {source}")]
    Output {
        path: String,
        source: std::io::Error,
    },
}

impl CliError {
    fn kind(&self) -> &'static str {
        match self {
            CliError::Usage(_) => "usage",
            CliError::Data(_) => "data",
            CliError::Loader(_) => "io",
            CliError::Graph(err) => err.kind(),
            CliError::Codec(_) => "codec",
            CliError::Output { .. } => "io",
        }
    }

    fn exit_code(&self) -> u8 {
        match self {
            CliError::Usage(_) => 2,
            _ => 1,
        }
    }
}

fn run(args: &Args) -> Result<(), CliError> {
    let tz = resolve_tz(&args.tz)?;
    let (start, end) = resolve_window(&args.start, &args.end, args.step, chrono::Utc::now())?;
    let ctx = EvalContext::new(start, end, args.step, tz)?;

    let options = GraphOptions {
        width: args.width,
        height: args.height,
        theme: args.theme,
        layout: args.layout,
        palette: args.palette,
        legend: !args.no_legend,
        title: args.title.clone(),
        axis_label: args.ylabel.clone(),
        ..GraphOptions::default()
    };

    let index = loader::load_corpus(&args.data)?;
    let rendered = render_request(&args.query, &ctx, &options, &index)?;

    write_atomic(&args.out, &rendered.png_bytes)?;
    tracing::info!(path = %args.out.display(), bytes = rendered.png_bytes.len(), "wrote graph");

    if let Some(path) = &args.emit_v2 {
        codec::write_file(&rendered.graph_def, path)?;
        tracing::info!(path = %path.display(), "wrote graph definition");
    }
    Ok(())
}

/// Write through a sibling temp file and rename, so a failed render or
/// interrupted write never leaves a partial file at the PNG path.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), CliError> {
    let output = |source| CliError::Output {
        path: path.display().to_string(),
        source,
    };
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = Path::new(&tmp);
    if let Err(source) = fs::write(tmp, bytes) {
        let _ = fs::remove_file(tmp);
        return Err(output(source));
    }
    fs::rename(tmp, path).map_err(|source| {
        let _ = fs::remove_file(tmp);
        output(source)
    })
}
