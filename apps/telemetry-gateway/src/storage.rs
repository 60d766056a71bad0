use crate::node::TelemetryValue;
use crate::ring_buffer::RingBuffer;
use crate::scheduler::{TelemetrySink, TelemetrySnapshot};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::Notify;

pub const DEFAULT_RECORD_CAPACITY: usize = 50;

/// Values that changed in one snapshot, queued for the cloud.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordBatch {
    #[serde(skip)]
    pub sequence: u64,
    pub batch_time: DateTime<Utc>,
    pub values: BTreeMap<String, TelemetryValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SensorRecord {
    pub name: String,
    pub last_value: TelemetryValue,
    pub last_record_time: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StorageStatus {
    pub queued_batches: usize,
    pub capacity: usize,
    pub overruns: u64,
    pub tracked_keys: usize,
    pub oldest_batch_time: Option<DateTime<Utc>>,
}

pub struct StorageController {
    state: Mutex<StorageState>,
    batch_added: Arc<Notify>,
}

struct StorageState {
    last_values: HashMap<String, SensorRecord>,
    records: RingBuffer<RecordBatch>,
    overruns: u64,
    next_sequence: u64,
}

impl StorageController {
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(StorageState {
                last_values: HashMap::new(),
                records: RingBuffer::new(capacity),
                overruns: 0,
                next_sequence: 0,
            }),
            batch_added: Arc::new(Notify::new()),
        }
    }

    /// Signalled once per enqueued batch. A signal raised while nobody waits is kept until the
    /// next wait.
    pub fn batch_added(&self) -> Arc<Notify> {
        self.batch_added.clone()
    }

    /// Queues the entries of `snapshot` that are new or differ from the last recorded value for
    /// their key. Returns the number of changed values; nothing is queued when it is zero.
    pub fn record_sensor_values(&self, snapshot: &TelemetrySnapshot) -> usize {
        let now = Utc::now();
        let mut state = self.lock();
        let mut values = BTreeMap::new();

        for (key, value) in snapshot {
            match state.last_values.get_mut(key) {
                Some(record) if record.last_value.same_as(value) => {}
                Some(record) => {
                    record.last_value = value.clone();
                    record.last_record_time = now;
                    values.insert(key.clone(), value.clone());
                }
                None => {
                    state.last_values.insert(
                        key.clone(),
                        SensorRecord {
                            name: key.clone(),
                            last_value: value.clone(),
                            last_record_time: now,
                        },
                    );
                    values.insert(key.clone(), value.clone());
                }
            }
        }

        let changed = values.len();
        if changed == 0 {
            return 0;
        }

        let sequence = state.next_sequence;
        state.next_sequence = state.next_sequence.wrapping_add(1);
        let evicted = state.records.push(RecordBatch {
            sequence,
            batch_time: now,
            values,
        });
        if let Some(evicted) = evicted {
            state.overruns += 1;
            tracing::warn!(
                dropped_batch_time = %evicted.batch_time,
                dropped_values = evicted.values.len(),
                overruns = state.overruns,
                "telemetry storage overrun; oldest unsent batch dropped"
            );
        }
        drop(state);

        tracing::debug!(changed, "batched telemetry records");
        self.batch_added.notify_one();
        changed
    }

    pub fn peek_oldest(&self) -> Option<RecordBatch> {
        self.lock().records.peek().cloned()
    }

    /// Removes the oldest batch only if it is still the one identified by `sequence`; an
    /// overrun may have evicted it while it was being sent.
    pub fn remove_sent(&self, sequence: u64) -> bool {
        let mut state = self.lock();
        match state.records.peek() {
            Some(oldest) if oldest.sequence == sequence => {
                state.records.remove(1);
                true
            }
            _ => false,
        }
    }

    pub fn remove_oldest(&self, count: usize) -> usize {
        self.lock().records.remove(count)
    }

    pub fn queued(&self) -> usize {
        self.lock().records.len()
    }

    pub fn last_record(&self, key: &str) -> Option<SensorRecord> {
        self.lock().last_values.get(key).cloned()
    }

    pub fn status(&self) -> StorageStatus {
        let state = self.lock();
        StorageStatus {
            queued_batches: state.records.len(),
            capacity: state.records.capacity(),
            overruns: state.overruns,
            tracked_keys: state.last_values.len(),
            oldest_batch_time: state.records.peek().map(|batch| batch.batch_time),
        }
    }

    fn lock(&self) -> MutexGuard<'_, StorageState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for StorageController {
    fn default() -> Self {
        Self::new(DEFAULT_RECORD_CAPACITY)
    }
}

impl TelemetrySink for StorageController {
    fn publish(&self, snapshot: &TelemetrySnapshot) {
        self.record_sensor_values(snapshot);
    }
}
