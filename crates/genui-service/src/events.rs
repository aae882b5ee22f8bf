use chrono::{DateTime, Utc};
use genui_core::{GenerationId, GenerationProgress, GenerationRecord, GenerationStatus};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;

const BUFFER_CAPACITY: usize = 1024;
const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationEventKind {
    Created,
    Started,
    Progress,
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationEvent {
    pub seq: u64,
    pub kind: GenerationEventKind,
    pub generation_id: GenerationId,
    pub status: GenerationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<GenerationProgress>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Fan-out of record changes to live subscribers, with a ring buffer so a
/// reconnecting client can catch up from the last sequence number it saw.
pub struct GenerationEventBus {
    seq: AtomicU64,
    buffer: RwLock<VecDeque<GenerationEvent>>,
    sender: broadcast::Sender<GenerationEvent>,
}

impl Default for GenerationEventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl GenerationEventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            seq: AtomicU64::new(0),
            buffer: RwLock::new(VecDeque::with_capacity(BUFFER_CAPACITY)),
            sender,
        }
    }

    fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn last_seq(&self) -> u64 {
        self.seq.load(Ordering::Relaxed)
    }

    /// Publish the current state of `record`.
    pub fn publish(&self, kind: GenerationEventKind, record: &GenerationRecord) -> GenerationEvent {
        // buffer lock held across seq assignment so the buffer stays ordered
        let mut buf = self.buffer.write();
        let event = GenerationEvent {
            seq: self.next_seq(),
            kind,
            generation_id: record.id,
            status: record.status,
            progress: record.progress.clone(),
            error: record.error.clone(),
            timestamp: Utc::now(),
        };
        if buf.len() >= BUFFER_CAPACITY {
            buf.pop_front();
        }
        buf.push_back(event.clone());
        drop(buf);

        // no receivers is fine
        let _ = self.sender.send(event.clone());
        event
    }

    pub fn subscribe(&self) -> broadcast::Receiver<GenerationEvent> {
        self.sender.subscribe()
    }

    pub fn recent_since(&self, seq: u64, limit: usize) -> Vec<GenerationEvent> {
        let buf = self.buffer.read();
        buf.iter()
            .filter(|e| e.seq > seq)
            .take(limit)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_and_catch_up() {
        let bus = GenerationEventBus::new();
        let mut record = GenerationRecord::new("prompt");
        bus.publish(GenerationEventKind::Created, &record);
        record.start().unwrap();
        bus.publish(GenerationEventKind::Started, &record);
        record.fail("boom").unwrap();
        bus.publish(GenerationEventKind::Failed, &record);

        assert_eq!(bus.last_seq(), 3);
        let since = bus.recent_since(1, 10);
        assert_eq!(since.len(), 2);
        assert_eq!(since[0].kind, GenerationEventKind::Started);
        assert_eq!(since[1].error.as_deref(), Some("boom"));
        assert_eq!(bus.recent_since(0, 1).len(), 1);
    }

    #[test]
    fn test_buffer_is_bounded() {
        let bus = GenerationEventBus::new();
        let record = GenerationRecord::new("prompt");
        for _ in 0..(BUFFER_CAPACITY + 10) {
            bus.publish(GenerationEventKind::Progress, &record);
        }
        let all = bus.recent_since(0, usize::MAX);
        assert_eq!(all.len(), BUFFER_CAPACITY);
        assert_eq!(all[0].seq, 11);
    }

    #[tokio::test]
    async fn test_live_subscribers_receive_events() {
        let bus = GenerationEventBus::new();
        let mut rx = bus.subscribe();
        let record = GenerationRecord::new("prompt");
        bus.publish(GenerationEventKind::Created, &record);

        let event = rx.recv().await.unwrap();
        assert_eq!(event.generation_id, record.id);
        assert_eq!(event.status, GenerationStatus::Pending);
    }
}
