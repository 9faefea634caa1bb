use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::mpsc::{self, error::TryRecvError};

use crate::domain::TaskEvent;
use crate::ports::EventSink;

/// Fan-out of task events to synchronous sinks and async subscribers.
///
/// Publishing happens under the scheduler lock, so subscribers and sinks
/// observe transitions in the order they were applied. Every subscriber owns
/// an unbounded queue: nothing is dropped while it stays attached.
pub(crate) struct EventChannel {
    subscribers: Vec<mpsc::UnboundedSender<TaskEvent>>,
    open: bool,
    sinks: Vec<Arc<dyn EventSink>>,
}

impl EventChannel {
    pub(crate) fn new(sinks: Vec<Arc<dyn EventSink>>) -> Self {
        Self {
            subscribers: Vec::new(),
            open: true,
            sinks,
        }
    }

    pub(crate) fn publish(&mut self, event: TaskEvent) {
        for sink in &self.sinks {
            if let Err(err) = sink.emit(&event) {
                tracing::warn!(task = %event.record.identifier, error = %err, "event sink failed");
            }
        }
        // Dropped subscribers are pruned here.
        self.subscribers
            .retain(|subscriber| subscriber.send(event.clone()).is_ok());
    }

    /// Attach a subscriber that first yields `replay`, then live events.
    pub(crate) fn subscribe(&mut self, replay: Vec<TaskEvent>) -> TaskEvents {
        if !self.open {
            return TaskEvents::closed();
        }
        let (sender, receiver) = mpsc::unbounded_channel();
        self.subscribers.push(sender);
        TaskEvents {
            replay: replay.into(),
            receiver: Some(receiver),
        }
    }

    /// Existing subscribers drain what is queued, then end.
    pub(crate) fn close(&mut self) {
        self.open = false;
        self.subscribers.clear();
    }

    pub(crate) fn reopen(&mut self) {
        self.open = true;
    }

    #[cfg(test)]
    pub(crate) fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

/// A subscription to task events.
///
/// Yields a one-off snapshot of live tasks (`Replayed` events), then every
/// transition until the scheduler is deactivated.
#[derive(Debug)]
pub struct TaskEvents {
    replay: VecDeque<TaskEvent>,
    receiver: Option<mpsc::UnboundedReceiver<TaskEvent>>,
}

impl TaskEvents {
    fn closed() -> Self {
        Self {
            replay: VecDeque::new(),
            receiver: None,
        }
    }

    /// Next event, or `None` once the channel has closed.
    pub async fn next(&mut self) -> Option<TaskEvent> {
        if let Some(event) = self.replay.pop_front() {
            return Some(event);
        }
        let receiver = self.receiver.as_mut()?;
        let event = receiver.recv().await;
        if event.is_none() {
            self.receiver = None;
        }
        event
    }

    /// Non-blocking variant of [`next`](Self::next); `None` when nothing is
    /// ready or the channel has closed.
    pub fn try_next(&mut self) -> Option<TaskEvent> {
        if let Some(event) = self.replay.pop_front() {
            return Some(event);
        }
        let receiver = self.receiver.as_mut()?;
        match receiver.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                self.receiver = None;
                None
            }
        }
    }

    /// Has the channel closed and every queued event been consumed?
    pub fn is_closed(&self) -> bool {
        self.replay.is_empty() && self.receiver.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{TaskEventKind, TaskKind, TaskRecord, TaskRequest};
    use crate::ports::SinkError;
    use chrono::Utc;
    use std::sync::Mutex;

    fn event(kind: TaskEventKind, id: &str) -> TaskEvent {
        let record = TaskRecord::new(&TaskRequest::new(id, TaskKind::Sync), 0, 1, 0, Utc::now());
        TaskEvent::new(kind, record, Utc::now())
    }

    #[derive(Default)]
    struct Recorder(Mutex<Vec<TaskEventKind>>);

    impl EventSink for Recorder {
        fn emit(&self, event: &TaskEvent) -> Result<(), SinkError> {
            self.0.lock().unwrap().push(event.kind);
            Ok(())
        }
    }

    struct Broken;

    impl EventSink for Broken {
        fn emit(&self, _event: &TaskEvent) -> Result<(), SinkError> {
            Err(SinkError("down".into()))
        }
    }

    #[tokio::test]
    async fn replay_precedes_live_events() {
        let mut channel = EventChannel::new(Vec::new());
        let mut events = channel.subscribe(vec![event(TaskEventKind::Replayed, "live")]);
        channel.publish(event(TaskEventKind::Started, "live"));

        assert_eq!(events.next().await.unwrap().kind, TaskEventKind::Replayed);
        assert_eq!(events.next().await.unwrap().kind, TaskEventKind::Started);
        assert!(events.try_next().is_none());
    }

    #[tokio::test]
    async fn close_drains_then_ends() {
        let mut channel = EventChannel::new(Vec::new());
        let mut events = channel.subscribe(Vec::new());
        channel.publish(event(TaskEventKind::Cancelled, "a"));
        channel.close();

        assert_eq!(events.next().await.unwrap().kind, TaskEventKind::Cancelled);
        assert!(events.next().await.is_none());
        assert!(events.is_closed());

        let mut late = channel.subscribe(vec![event(TaskEventKind::Replayed, "a")]);
        assert!(late.next().await.is_none());

        channel.reopen();
        let mut reopened = channel.subscribe(Vec::new());
        channel.publish(event(TaskEventKind::Registered, "b"));
        assert_eq!(reopened.next().await.unwrap().kind, TaskEventKind::Registered);
    }

    #[test]
    fn sinks_see_every_event_and_failures_are_swallowed() {
        let recorder = Arc::new(Recorder::default());
        let sinks: Vec<Arc<dyn EventSink>> = vec![
            Arc::new(Broken) as Arc<dyn EventSink>,
            recorder.clone() as Arc<dyn EventSink>,
        ];
        let mut channel = EventChannel::new(sinks);
        channel.publish(event(TaskEventKind::Registered, "a"));
        channel.close();
        channel.publish(event(TaskEventKind::Unregistered, "a"));

        assert_eq!(
            *recorder.0.lock().unwrap(),
            [TaskEventKind::Registered, TaskEventKind::Unregistered]
        );
    }

    #[tokio::test]
    async fn slow_subscriber_receives_every_event() {
        let mut channel = EventChannel::new(Vec::new());
        let mut events = channel.subscribe(Vec::new());
        let ids: Vec<String> = (0..2048).map(|i| format!("t{i}")).collect();
        for id in &ids {
            channel.publish(event(TaskEventKind::Queued, id));
        }

        let mut got = Vec::new();
        while let Some(event) = events.try_next() {
            got.push(event.record.identifier.to_string());
        }
        assert_eq!(got, ids);
    }

    #[test]
    fn dropped_subscribers_are_pruned_on_publish() {
        let mut channel = EventChannel::new(Vec::new());
        let kept = channel.subscribe(Vec::new());
        drop(channel.subscribe(Vec::new()));
        assert_eq!(channel.subscriber_count(), 2);

        channel.publish(event(TaskEventKind::Queued, "a"));
        assert_eq!(channel.subscriber_count(), 1);
        drop(kept);
    }
}
