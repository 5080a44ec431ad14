use std::time::Duration;

use solo_video::{solo, supervise, SoloVideoConfig};
use sv_pipeline::{
    Event, Graph, Outcome, PipelineError, Registry, SoftwareEngine, Supervisor, SupervisorState,
};
use tokio_util::sync::CancellationToken;

/// Keeps the source off external interfaces while testing.
fn loopback(graph: &mut Graph, source: &str) {
    graph
        .stage_mut(source)
        .unwrap()
        .configure([("address", "127.0.0.1")])
        .unwrap();
}

#[tokio::test]
async fn explicit_chain_reaches_running() {
    let mut graph = solo::explicit_chain(&Registry::builtin(), 0).unwrap();
    loopback(&mut graph, "source");

    let mut supervisor = Supervisor::new(graph, SoftwareEngine::new(), 16);
    supervisor.start().unwrap();

    assert_eq!(supervisor.state(), SupervisorState::Running);
    assert!(supervisor.engine().local_addr("source").is_some());

    // with no traffic the loop only sees the state change, never EOS or an error
    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            cancel.cancel();
        }
    });

    assert_eq!(supervisor.run(cancel).await.unwrap(), Outcome::Interrupted);
    assert_eq!(supervisor.state(), SupervisorState::Stopped);
}

#[tokio::test]
async fn parsed_chain_is_linear_and_runs() {
    let mut graph = solo::parsed_chain(&Registry::builtin(), 0).unwrap();
    loopback(&mut graph, "udpsrc0");

    assert_eq!(
        graph.chain().unwrap(),
        [
            "udpsrc0",
            "capsfilter0",
            "rtpjitterbuffer0",
            "rtph264depay0",
            "avdec_h264-0",
            "videoconvert0",
            "autovideosink0",
        ]
    );

    let mut supervisor = Supervisor::new(graph, SoftwareEngine::new(), 16);
    supervisor.start().unwrap();
    assert_eq!(supervisor.state(), SupervisorState::Running);
}

#[tokio::test]
async fn runtime_error_is_a_clean_shutdown() {
    let mut graph = solo::explicit_chain(&Registry::builtin(), 0).unwrap();
    loopback(&mut graph, "source");

    let supervisor = Supervisor::new(graph, SoftwareEngine::new(), 16);
    let bus = supervisor.bus();
    bus.post(Event::error("dec", "not-negotiated"));

    supervise(supervisor, CancellationToken::new()).await.unwrap();
    assert!(!bus.post(Event::Eos));
}

#[test]
fn construction_failure_is_an_error() {
    let registry = Registry::builtin().with_probe(|kind| kind != "autovideosink");

    let err = solo::explicit_chain(&registry, 0).unwrap_err();
    assert!(matches!(err, PipelineError::Creation { .. }));
    assert!(err.is_construction());
}

#[test]
fn default_port_is_5600() {
    assert_eq!(SoloVideoConfig::default().port, 5600);
    assert!(solo::launch_description(SoloVideoConfig::default().port).contains("port=5600"));
}
