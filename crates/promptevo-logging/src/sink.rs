use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::StampedEvent;

/// Receiver of progress events emitted by a run
pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: &StampedEvent);
}

impl<F> ProgressSink for F
where
    F: Fn(&StampedEvent) + Send + Sync,
{
    fn emit(&self, event: &StampedEvent) {
        self(event)
    }
}

/// Discards every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl ProgressSink for NullSink {
    fn emit(&self, _event: &StampedEvent) {}
}

/// Forwards events into an unbounded tokio channel
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: UnboundedSender<StampedEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, UnboundedReceiver<StampedEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl ProgressSink for ChannelSink {
    fn emit(&self, event: &StampedEvent) {
        // A dropped receiver only means nobody is listening anymore
        let _ = self.sender.send(event.clone());
    }
}

/// Fans one event out to several sinks
#[derive(Default)]
pub struct FanoutSink {
    sinks: Vec<Box<dyn ProgressSink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: impl ProgressSink + 'static) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }
}

impl ProgressSink for FanoutSink {
    fn emit(&self, event: &StampedEvent) {
        for sink in &self.sinks {
            sink.emit(event);
        }
    }
}
