use tokio::sync::{mpsc, oneshot};

use crate::frame::UpstreamEvent;

/// Capacity of the per-stream event queue between reader task and owner.
pub const EVENT_BUFFER: usize = 256;

/// Handle to one live upstream connection.
///
/// Events are consumed with [`next_event`](Self::next_event). Closing (or
/// dropping) the handle stops the reader task and discards everything still
/// queued; no event of a closed stream can be observed afterwards.
#[derive(Debug)]
pub struct UpstreamStream {
    events: mpsc::Receiver<UpstreamEvent>,
    shutdown: Option<oneshot::Sender<()>>,
}

impl UpstreamStream {
    /// Wrap an event queue. `shutdown` fires when the owner closes the stream.
    pub fn new(events: mpsc::Receiver<UpstreamEvent>, shutdown: oneshot::Sender<()>) -> Self {
        Self {
            events,
            shutdown: Some(shutdown),
        }
    }

    /// A stream fed by an arbitrary sender, for in-process providers.
    pub fn channel() -> (mpsc::Sender<UpstreamEvent>, Self) {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let (shutdown, _) = oneshot::channel();
        (tx, Self::new(rx, shutdown))
    }

    /// Next event in provider order. `None` once the reader has gone away.
    pub async fn next_event(&mut self) -> Option<UpstreamEvent> {
        self.events.recv().await
    }

    pub fn close(mut self) {
        self.shutdown_reader();
    }

    fn shutdown_reader(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        self.events.close();
    }
}

impl Drop for UpstreamStream {
    fn drop(&mut self) {
        self.shutdown_reader();
    }
}
