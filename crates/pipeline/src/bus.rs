//! Notifications from a running graph to its supervisor.

use tracing::{debug, error, info, trace};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    /// The source ran dry; every stage has drained.
    Eos,
    /// A stage failed while the graph was running.
    Error { origin: String, message: String },
    /// Anything else: state changes, latency updates, warnings.
    Other(String),
}

impl Event {
    pub fn error(origin: impl Into<String>, message: impl Into<String>) -> Self {
        Event::Error {
            origin: origin.into(),
            message: message.into(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Event::Eos | Event::Error { .. })
    }
}

/// What the event loop does after handling one event.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Terminate,
}

/// The supervisor's handler. End-of-stream and errors end the loop; nothing
/// is ever retried.
pub fn handle_event(event: &Event) -> Flow {
    match event {
        Event::Eos => {
            info!("End of stream");
            Flow::Terminate
        }
        Event::Error { origin, message } => {
            error!("Error: {message} (from {origin})");
            Flow::Terminate
        }
        Event::Other(desc) => {
            trace!("bus: {desc}");
            Flow::Continue
        }
    }
}

/// Producer handle. Engines post events through it from their own threads.
#[derive(Clone, Debug)]
pub struct BusSender {
    tx: flume::Sender<Event>,
}

impl BusSender {
    /// Blocks while the bus is full. Returns `false` once nobody is
    /// subscribed any more.
    pub fn post(&self, event: Event) -> bool {
        match self.tx.send(event) {
            Ok(()) => true,
            Err(flume::SendError(event)) => {
                debug!("discarding {event:?}, bus has no subscriber");
                false
            }
        }
    }

    pub async fn post_async(&self, event: Event) -> bool {
        match self.tx.send_async(event).await {
            Ok(()) => true,
            Err(flume::SendError(event)) => {
                debug!("discarding {event:?}, bus has no subscriber");
                false
            }
        }
    }
}

/// The receiving end. Dropping it unsubscribes.
#[derive(Debug)]
pub struct Subscription {
    rx: flume::Receiver<Event>,
}

impl Subscription {
    /// Waits for the next event. `None` means every producer is gone.
    pub async fn recv(&self) -> Option<Event> {
        self.rx.recv_async().await.ok()
    }

    pub fn try_recv(&self) -> Option<Event> {
        self.rx.try_recv().ok()
    }
}

/// A bounded, single-consumer event channel.
#[derive(Debug)]
pub struct Bus {
    tx: flume::Sender<Event>,
    rx: Option<flume::Receiver<Event>>,
}

impl Bus {
    /// A capacity of zero is raised to one. A rendezvous channel would block
    /// an engine posting from inside `start()` before anyone receives.
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = flume::bounded(capacity.max(1));
        Self { tx, rx: Some(rx) }
    }

    pub fn sender(&self) -> BusSender {
        BusSender {
            tx: self.tx.clone(),
        }
    }

    /// Hands out the only subscription; later calls get `None`.
    pub fn subscribe(&mut self) -> Option<Subscription> {
        self.rx.take().map(|rx| Subscription { rx })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_events_stop_the_loop() {
        assert_eq!(handle_event(&Event::Eos), Flow::Terminate);
        assert_eq!(handle_event(&Event::error("dec", "boom")), Flow::Terminate);
        assert_eq!(
            handle_event(&Event::Other("state changed".into())),
            Flow::Continue
        );
    }

    #[test]
    fn single_subscriber_in_order() {
        let mut bus = Bus::new(4);
        let sub = bus.subscribe().unwrap();
        assert!(bus.subscribe().is_none());

        let tx = bus.sender();
        assert!(tx.post(Event::Other("a".into())));
        assert!(tx.post(Event::Eos));

        assert_eq!(sub.try_recv(), Some(Event::Other("a".into())));
        assert_eq!(sub.try_recv(), Some(Event::Eos));
        assert_eq!(sub.try_recv(), None);

        drop(sub);
        assert!(!tx.post(Event::Eos));
    }

    #[test]
    fn zero_capacity_still_buffers_one_event() {
        let mut bus = Bus::new(0);
        let sub = bus.subscribe().unwrap();

        assert!(bus.sender().post(Event::Other("playing".into())));
        assert_eq!(sub.try_recv(), Some(Event::Other("playing".into())));
    }
}
