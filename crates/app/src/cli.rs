use std::{net::SocketAddr, path::PathBuf};

use clap::{Args, Parser, Subcommand};
use vision::PipelineCliArgs;

/// Detection and tracking over a camera or video file, streamed as MJPEG.
#[derive(Debug, Parser)]
#[command(name = "vision-stream", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the HTTP control surface and MJPEG stream.
    Serve(ServeArgs),
    /// Probe camera indices and print the ones that open.
    Cameras(CamerasArgs),
}

#[derive(Debug, Args)]
pub struct ServeArgs {
    /// Address the HTTP server listens on.
    #[arg(long, value_name = "ADDR", default_value = "0.0.0.0:5000")]
    pub bind: SocketAddr,
    /// Source activated at startup: a camera index, `/dev/videoN`, or a path.
    #[arg(long, value_name = "SOURCE")]
    pub source: Option<String>,
    /// TorchScript detector (requires the `with-tch` feature).
    #[arg(long, value_name = "PATH")]
    pub model: Option<PathBuf>,
    /// Force CPU inference even when CUDA is available.
    #[arg(long = "cpu", action = clap::ArgAction::SetTrue)]
    pub use_cpu: bool,
    #[command(flatten)]
    pub pipeline: PipelineCliArgs,
}

#[derive(Debug, Args)]
pub struct CamerasArgs {
    /// Number of indices to probe, starting at 0.
    #[arg(long, value_name = "N", default_value_t = 5)]
    pub limit: i32,
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn serve_defaults_and_flattened_pipeline_flags() {
        let cli = Cli::try_parse_from([
            "vision-stream",
            "serve",
            "--source",
            "/dev/video0",
            "--confidence",
            "0.5",
        ])
        .expect("parse");
        let Command::Serve(args) = cli.command else {
            panic!("expected serve");
        };
        assert_eq!(args.bind, "0.0.0.0:5000".parse().expect("addr"));
        assert_eq!(args.source.as_deref(), Some("/dev/video0"));
        assert_eq!(args.pipeline.confidence, Some(0.5));
        assert!(args.model.is_none());
    }
}
