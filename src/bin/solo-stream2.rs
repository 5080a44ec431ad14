use anyhow::Context;
use clap::Parser;
use solo_video::{cli::MainArgs, solo, SoloVideoConfig};

#[macro_use]
extern crate tracing;

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    // setup colorful backtraces
    color_backtrace::install();

    let _guard = solo_video::logging::init("solo-stream2")?;

    let main_args = MainArgs::parse();

    debug!("reading config from {:?}", &main_args.config);
    let config = SoloVideoConfig::read(main_args.config).context("failed to read config")?;

    solo_video::run(config, |registry, port| {
        let graph = solo::parsed_chain(registry, port)?;
        debug!("parsed chain: {:?}", graph.chain());
        Ok(graph)
    })
    .await
}
