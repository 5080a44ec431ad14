use anyhow::Context;
use sv_pipeline::{Engine, Graph, PipelineError, Registry, SoftwareEngine, Supervisor, SupervisorTask};
use sv_task::Task;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::{EngineKind, SoloVideoConfig};

/// Builds the graph with `build`, then supervises it until end of stream, an
/// error, or Ctrl+C. Construction failures are returned as errors; every way
/// the supervisor can finish is a success.
pub async fn run<F>(config: SoloVideoConfig, build: F) -> anyhow::Result<()>
where
    F: FnOnce(&Registry, u16) -> Result<Graph, PipelineError>,
{
    let cancellation_token = CancellationToken::new();

    ctrlc::set_handler({
        let cancellation_token = cancellation_token.clone();
        move || {
            info!("received interrupt, shutting down");
            cancellation_token.cancel();
        }
    })
    .context("could not set ctrl+c handler")?;

    // declared before the engine so it is dropped after it
    #[cfg(feature = "gstreamer")]
    let mut _runtime = None;

    let engine: Box<dyn Engine> = match config.engine {
        EngineKind::Software => Box::new(SoftwareEngine::new()),
        #[cfg(feature = "gstreamer")]
        EngineKind::Gstreamer => {
            use sv_pipeline::engine::gstreamer::{GstEngine, Runtime};

            let runtime = Runtime::acquire().context("failed to initialize gstreamer")?;
            let engine = GstEngine::new(&runtime);
            _runtime = Some(runtime);
            Box::new(engine)
        }
        #[cfg(not(feature = "gstreamer"))]
        EngineKind::Gstreamer => {
            anyhow::bail!("this build has no gstreamer support, use the software engine")
        }
    };

    debug!("using {} engine", engine.name());

    let registry = engine.registry();
    let graph = build(&registry, config.port).context("failed to build pipeline")?;
    info!("Pipeline is built");

    let supervisor = Supervisor::new(graph, engine, config.bus_capacity);
    supervise(supervisor, cancellation_token).await
}

/// Spawns the supervisor as a task and waits for it. Panics and task errors
/// cancel `cancel` and are propagated.
pub async fn supervise<E: Engine + 'static>(
    supervisor: Supervisor<E>,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let tasks: Vec<Box<dyn Task>> = vec![Box::new(SupervisorTask::new(supervisor))];

    let mut join_set = JoinSet::new();

    for task in tasks {
        debug!("starting {} task", task.name());
        join_set.spawn(task.run(cancel.clone()));
    }

    while let Some(res) = join_set.join_next().await {
        // Some(Err) if the task panicked, Some(Ok(Err)) if it returned an error
        match res {
            Err(err) => {
                cancel.cancel();
                return Err(err).context("task failed");
            }
            Ok(Err(err)) => {
                cancel.cancel();
                return Err(err).context("task terminated with error");
            }
            _ => {
                info!("exited task");
            }
        }
    }

    Ok(())
}
