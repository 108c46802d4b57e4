//! In-process publish/subscribe channels for the node's output.

use camnode_core::bus::{self, CAMERA_INFO_TOPIC, IMAGE_RAW_TOPIC};
use camnode_core::{CameraInfo, Image};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Messages buffered per subscriber before the oldest are dropped.
pub const QUEUE_DEPTH: usize = 10;

/// A named broadcast channel. Slow subscribers lag; they never block the publisher.
pub struct Topic<T> {
    name: String,
    tx: broadcast::Sender<T>,
}

impl<T: Clone> Topic<T> {
    pub fn new(name: String) -> Self {
        let (tx, _) = broadcast::channel(QUEUE_DEPTH);
        Self { name, tx }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Publish a message. Returns how many subscribers received it;
    /// publishing with nobody listening is not an error.
    pub fn publish(&self, msg: T) -> usize {
        self.tx.send(msg).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<T> {
        self.tx.subscribe()
    }
}

/// The two topics a camera node publishes.
pub struct Topics {
    pub image_raw: Topic<Arc<Image>>,
    pub camera_info: Topic<CameraInfo>,
}

impl Topics {
    pub fn new(namespace: &str) -> Self {
        Self {
            image_raw: Topic::new(bus::qualify(namespace, IMAGE_RAW_TOPIC)),
            camera_info: Topic::new(bus::qualify(namespace, CAMERA_INFO_TOPIC)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_names() {
        let topics = Topics::new("left");
        assert_eq!(topics.image_raw.name(), "/left/camera/image_raw");
        assert_eq!(topics.camera_info.name(), "/left/camera/camera_info");
    }

    #[test]
    fn test_publish_without_subscribers() {
        let topic: Topic<u32> = Topic::new("/t".into());
        assert_eq!(topic.publish(1), 0);
    }

    #[test]
    fn test_slow_subscriber_lags() {
        let topic: Topic<usize> = Topic::new("/t".into());
        let mut rx = topic.subscribe();
        // Capacity is rounded up to a power of two, so overflow it generously.
        for i in 0..QUEUE_DEPTH * 4 {
            assert_eq!(topic.publish(i), 1);
        }
        match rx.try_recv() {
            Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                assert!(skipped > 0);
                // Delivery resumes at the oldest message still buffered.
                assert_eq!(rx.try_recv().unwrap(), skipped as usize);
            }
            other => panic!("expected lag, got {other:?}"),
        }
    }
}
