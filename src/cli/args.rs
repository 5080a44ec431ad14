use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Parser)]
pub struct MainArgs {
    /// Optional config file; `SOLO_VIDEO_*` environment variables override it
    #[clap(long, short)]
    pub config: Option<PathBuf>,
}
