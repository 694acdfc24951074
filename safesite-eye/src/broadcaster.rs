//! Fan-out of encoded frames to stream viewers
//!
//! Built on `tokio::sync::broadcast`: the producer never waits on a receiver,
//! each receiver owns a bounded window of the ring buffer, and a receiver that
//! falls behind skips forward to the oldest retained frame. Every subscriber
//! therefore sees an in-order, duplicate-free subsequence of what was
//! published.

use crate::frame::EncodedFrame;
use futures::stream::{self, Stream};
use metrics::{counter, gauge};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info};

pub struct FrameBroadcaster {
    sender: RwLock<Option<broadcast::Sender<EncodedFrame>>>,
    capacity: usize,
    /// Live `FrameSubscription` handles, shared with each of them
    subscribers: Arc<AtomicUsize>,
}

impl FrameBroadcaster {
    /// `capacity` frames are retained per subscriber before the oldest are dropped
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: RwLock::new(Some(sender)),
            capacity,
            subscribers: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Hand a frame to every current subscriber, returning how many there were
    pub fn publish(&self, frame: EncodedFrame) -> usize {
        let guard = self.sender.read();
        match guard.as_ref() {
            Some(sender) => sender.send(frame).unwrap_or(0),
            None => 0,
        }
    }

    /// Register a viewer. After `close` the subscription ends immediately.
    pub fn subscribe(&self) -> FrameSubscription {
        let receiver = match self.sender.read().as_ref() {
            Some(sender) => sender.subscribe(),
            None => {
                let (sender, receiver) = broadcast::channel(1);
                drop(sender);
                receiver
            }
        };
        let active = self.subscribers.fetch_add(1, Ordering::SeqCst) + 1;
        gauge!("safesite_stream_subscribers").set(active as f64);
        debug!(subscribers = active, "stream subscriber attached");
        FrameSubscription {
            receiver,
            dropped: 0,
            live: self.subscribers.clone(),
        }
    }

    /// End every subscription once its buffered frames are drained
    pub fn close(&self) {
        if self.sender.write().take().is_some() {
            info!("Frame broadcaster closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.sender.read().is_none()
    }

    /// Subscriptions that have not been dropped yet, including ones still
    /// draining after `close`
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.load(Ordering::SeqCst)
    }
}

/// One viewer's view of the broadcast. Dropping it unsubscribes.
pub struct FrameSubscription {
    receiver: broadcast::Receiver<EncodedFrame>,
    dropped: u64,
    live: Arc<AtomicUsize>,
}

impl FrameSubscription {
    /// Next frame, or `None` once the broadcaster has closed
    pub async fn next(&mut self) -> Option<EncodedFrame> {
        loop {
            match self.receiver.recv().await {
                Ok(frame) => return Some(frame),
                Err(RecvError::Lagged(skipped)) => {
                    self.dropped += skipped;
                    counter!("safesite_frames_dropped_total").increment(skipped);
                    debug!(skipped, "slow stream subscriber skipped frames");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Frames this subscriber lost to lag so far
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn into_stream(self) -> impl Stream<Item = EncodedFrame> + Send {
        stream::unfold(self, |mut subscription| async move {
            subscription
                .next()
                .await
                .map(|frame| (frame, subscription))
        })
    }
}

impl Drop for FrameSubscription {
    fn drop(&mut self) {
        let active = self.live.fetch_sub(1, Ordering::SeqCst) - 1;
        gauge!("safesite_stream_subscribers").set(active as f64);
        debug!(subscribers = active, "stream subscriber detached");
    }
}
