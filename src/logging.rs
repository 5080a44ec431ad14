use anyhow::Context;
use tracing::metadata::LevelFilter;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{filter::Targets, layer::SubscriberExt, util::SubscriberInitExt, Layer};

/// Console output filtered by `RUST_LOG` (INFO when unset), plus an hourly
/// log file under `logs/` that always records DEBUG from our own crates.
///
/// The returned guard flushes the file writer when dropped; keep it alive for
/// the life of the process.
pub fn init(app: &str) -> anyhow::Result<WorkerGuard> {
    let mut targets = Targets::new().with_default(LevelFilter::INFO);

    if let Ok(directives) = std::env::var("RUST_LOG") {
        for directive in directives.split(',').filter(|d| !d.is_empty()) {
            if let Some((target, level)) = directive.split_once('=') {
                targets = targets.with_target(
                    target,
                    level.parse::<LevelFilter>().context("invalid log level")?,
                );
            } else {
                targets = targets.with_default(
                    directive
                        .parse::<LevelFilter>()
                        .context("invalid log level")?,
                );
            }
        }
    }

    let (writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::hourly("logs", app));

    tracing_subscriber::registry()
        // writer that outputs to console
        .with(tracing_subscriber::fmt::layer().with_filter(targets))
        // writer that outputs to files
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer)
                .with_filter(Targets::new().with_targets(vec![
                    ("solo_video", LevelFilter::DEBUG),
                    ("solo_stream", LevelFilter::DEBUG),
                    ("solo_stream2", LevelFilter::DEBUG),
                    ("sv_pipeline", LevelFilter::DEBUG),
                ])),
        )
        .try_init()
        .context("failed to install log subscriber")?;

    Ok(guard)
}
