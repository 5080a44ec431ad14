//! Owns a graph for its whole life: start it, wait for it to finish, tear it
//! down.

use std::fmt;

use async_trait::async_trait;
use sv_task::Task;
use tokio::select;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::{
    bus::{handle_event, Bus, BusSender, Event, Flow, Subscription},
    engine::Engine,
    error::{PipelineError, Result},
    graph::Graph,
};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SupervisorState {
    /// Built, not started.
    Idle,
    Running,
    /// A terminal condition arrived; teardown is in progress.
    Stopping,
    /// Torn down. The graph is gone and cannot be restarted.
    Stopped,
}

impl fmt::Display for SupervisorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SupervisorState::Idle => "idle",
            SupervisorState::Running => "running",
            SupervisorState::Stopping => "stopping",
            SupervisorState::Stopped => "stopped",
        })
    }
}

/// Why the event loop ended. All of these are graceful shutdowns.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    EndOfStream,
    Error { origin: String, message: String },
    Interrupted,
}

pub struct Supervisor<E: Engine> {
    state: SupervisorState,
    graph: Option<Graph>,
    engine: E,
    bus: Bus,
    subscription: Option<Subscription>,
}

impl<E: Engine> Supervisor<E> {
    pub fn new(graph: Graph, engine: E, bus_capacity: usize) -> Self {
        let mut bus = Bus::new(bus_capacity);
        let subscription = bus.subscribe();

        Self {
            state: SupervisorState::Idle,
            graph: Some(graph),
            engine,
            bus,
            subscription,
        }
    }

    pub fn state(&self) -> SupervisorState {
        self.state
    }

    /// `None` once the supervisor has stopped.
    pub fn graph(&self) -> Option<&Graph> {
        self.graph.as_ref()
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// A handle for posting events into the loop from outside the engine.
    pub fn bus(&self) -> BusSender {
        self.bus.sender()
    }

    /// Idle → Running. Fails in any other state; in particular a stopped
    /// supervisor has released its graph and cannot start again.
    pub fn start(&mut self) -> Result<()> {
        let invalid = PipelineError::InvalidState {
            action: "start",
            state: self.state,
        };

        if self.state != SupervisorState::Idle {
            return Err(invalid);
        }

        let graph = self.graph.as_mut().ok_or(invalid)?;
        graph.negotiate();

        info!(
            "starting '{}' ({} stages) on the {} engine",
            graph.name(),
            graph.len(),
            self.engine.name()
        );

        if let Err(err) = self.engine.play(graph, self.bus.sender()) {
            error!("could not start pipeline: {err}");
            self.shutdown();
            return Err(err);
        }

        self.state = SupervisorState::Running;
        Ok(())
    }

    /// Dispatches bus events one at a time until one of them is terminal or
    /// `cancel` fires, then shuts down.
    pub async fn run(&mut self, cancel: CancellationToken) -> Result<Outcome> {
        if self.state != SupervisorState::Running {
            return Err(PipelineError::InvalidState {
                action: "run",
                state: self.state,
            });
        }

        let subscription = match self.subscription.take() {
            Some(sub) => sub,
            None => {
                return Err(PipelineError::InvalidState {
                    action: "run",
                    state: self.state,
                })
            }
        };

        info!("Running...");

        let outcome = loop {
            select! {
                _ = cancel.cancelled() => {
                    info!("received interrupt");
                    break Outcome::Interrupted;
                }
                // the supervisor holds a sender, so the bus never closes
                Some(event) = subscription.recv() => {
                    match (handle_event(&event), event) {
                        (Flow::Continue, _) => {}
                        (Flow::Terminate, Event::Error { origin, message }) => {
                            break Outcome::Error { origin, message };
                        }
                        (Flow::Terminate, _) => break Outcome::EndOfStream,
                    }
                }
            }
        };

        drop(subscription);
        self.shutdown();

        Ok(outcome)
    }

    /// Drives the supervisor to Stopped. Always completes: engine errors are
    /// logged and otherwise ignored. Calling it again does nothing.
    pub fn shutdown(&mut self) {
        if self.state == SupervisorState::Stopped {
            return;
        }

        self.state = SupervisorState::Stopping;
        info!("Returned, stopping playback");

        if let Err(err) = self.engine.stop() {
            warn!("error while stopping pipeline: {err}");
        }

        self.subscription = None;

        if let Some(mut graph) = self.graph.take() {
            graph.reset_negotiation();
            info!("Deleting pipeline '{}'", graph.name());
        }

        self.state = SupervisorState::Stopped;
    }
}

impl<E: Engine> Drop for Supervisor<E> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Runs a supervisor to completion as a spawnable task, starting it first if
/// it is still idle.
pub struct SupervisorTask<E: Engine> {
    supervisor: Supervisor<E>,
}

impl<E: Engine> SupervisorTask<E> {
    pub fn new(supervisor: Supervisor<E>) -> Self {
        Self { supervisor }
    }
}

#[async_trait]
impl<E: Engine + 'static> Task for SupervisorTask<E> {
    fn name(&self) -> &'static str {
        "pipeline/supervisor"
    }

    async fn run(self: Box<Self>, cancel: CancellationToken) -> anyhow::Result<()> {
        let Self { mut supervisor } = *self;

        if supervisor.state() == SupervisorState::Idle {
            supervisor.start()?;
        }

        match supervisor.run(cancel).await? {
            Outcome::EndOfStream => info!("pipeline finished"),
            Outcome::Interrupted => info!("pipeline interrupted"),
            Outcome::Error { origin, message } => {
                info!("pipeline stopped after error in {origin}: {message}")
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{engine::SoftwareEngine, ChainBuilder, Registry};

    fn graph() -> Graph {
        ChainBuilder::new(&Registry::builtin(), "test")
            .stage("udpsrc", "source")
            .stage("rtpjitterbuffer", "jbuffer")
            .option("source", "port", 0)
            .option("source", "address", "127.0.0.1")
            .build()
            .unwrap()
    }

    /// An engine whose teardown always fails.
    struct FaultyEngine;

    impl Engine for FaultyEngine {
        fn name(&self) -> &'static str {
            "faulty"
        }

        fn play(&mut self, _: &Graph, _: BusSender) -> Result<()> {
            Ok(())
        }

        fn stop(&mut self) -> Result<()> {
            Err(PipelineError::Runtime {
                origin: "faulty".into(),
                message: "teardown failed".into(),
            })
        }
    }

    #[tokio::test]
    async fn eos_stops_and_releases_graph() {
        let mut sup = Supervisor::new(graph(), SoftwareEngine::new(), 16);
        sup.start().unwrap();
        assert_eq!(sup.state(), SupervisorState::Running);
        assert!(sup.engine().local_addr("source").is_some());

        sup.bus().post(Event::Eos);
        let outcome = sup.run(CancellationToken::new()).await.unwrap();

        assert_eq!(outcome, Outcome::EndOfStream);
        assert_eq!(sup.state(), SupervisorState::Stopped);
        assert!(sup.graph().is_none());
        assert!(sup.engine().local_addr("source").is_none());

        assert!(matches!(
            sup.start(),
            Err(PipelineError::InvalidState {
                state: SupervisorState::Stopped,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn error_event_stops_after_earlier_events() {
        let mut sup = Supervisor::new(graph(), SoftwareEngine::new(), 16);
        sup.start().unwrap();

        let bus = sup.bus();
        bus.post(Event::Other("latency".into()));
        bus.post(Event::error("dec", "decoding failed"));
        bus.post(Event::Eos);

        let outcome = sup.run(CancellationToken::new()).await.unwrap();
        assert_eq!(
            outcome,
            Outcome::Error {
                origin: "dec".into(),
                message: "decoding failed".into()
            }
        );
        assert_eq!(sup.state(), SupervisorState::Stopped);
        assert!(!bus.post(Event::Eos));
    }

    #[tokio::test]
    async fn cancellation_interrupts_the_loop() {
        let mut sup = Supervisor::new(graph(), SoftwareEngine::new(), 16);
        sup.start().unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();

        assert_eq!(sup.run(cancel).await.unwrap(), Outcome::Interrupted);
        assert_eq!(sup.state(), SupervisorState::Stopped);
    }

    #[tokio::test]
    async fn teardown_completes_despite_engine_errors() {
        let mut sup = Supervisor::new(graph(), FaultyEngine, 16);
        sup.start().unwrap();
        sup.bus().post(Event::Eos);

        assert_eq!(
            sup.run(CancellationToken::new()).await.unwrap(),
            Outcome::EndOfStream
        );
        assert_eq!(sup.state(), SupervisorState::Stopped);
        assert!(sup.graph().is_none());
    }

    #[tokio::test]
    async fn run_requires_running_state() {
        let mut sup = Supervisor::new(graph(), SoftwareEngine::new(), 16);
        assert!(sup.run(CancellationToken::new()).await.is_err());

        sup.start().unwrap();
        assert!(sup.start().is_err());
        sup.shutdown();
        sup.shutdown();
        assert_eq!(sup.state(), SupervisorState::Stopped);
    }

    #[test]
    fn start_returns_with_smallest_bus() {
        for capacity in [0, 1] {
            let mut sup = Supervisor::new(graph(), SoftwareEngine::new(), capacity);
            sup.start().unwrap();
            assert_eq!(sup.state(), SupervisorState::Running);
        }
    }

    #[tokio::test]
    async fn failed_start_tears_down() {
        let taken = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
        let port = taken.local_addr().unwrap().port();

        let graph = ChainBuilder::new(&Registry::builtin(), "test")
            .stage("udpsrc", "source")
            .option("source", "port", port)
            .option("source", "address", "127.0.0.1")
            .build()
            .unwrap();

        let mut sup = Supervisor::new(graph, SoftwareEngine::new(), 16);
        assert!(matches!(sup.start(), Err(PipelineError::Runtime { .. })));
        assert_eq!(sup.state(), SupervisorState::Stopped);
    }

    #[tokio::test]
    async fn task_runs_to_completion() {
        let sup = Supervisor::new(graph(), SoftwareEngine::new(), 16);
        let bus = sup.bus();
        let task: Box<dyn Task> = Box::new(SupervisorTask::new(sup));

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(task.run(cancel.clone()));

        bus.post_async(Event::Other("state changed".into())).await;
        cancel.cancel();

        handle.await.unwrap().unwrap();
    }
}
