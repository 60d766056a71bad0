//! Period-bucketed read loop.
//!
//! Nodes are grouped by their period in whole seconds. Every tick reads the nodes of each bucket
//! whose period divides the tick counter, builds one [`TelemetrySnapshot`] and fans it out to the
//! registered sinks before the next tick starts.

use crate::node::{NodeKind, NodeSummary, ReadError, SensingNode, SensorReading, TelemetryValue};
use serde::Serialize;
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Telemetry key -> canonical value for one tick.
pub type TelemetrySnapshot = BTreeMap<String, TelemetryValue>;

/// Receives every non-empty snapshot, synchronously, on the read-loop task.
pub trait TelemetrySink: Send + Sync {
    fn publish(&self, snapshot: &TelemetrySnapshot);
}

#[derive(Debug, Clone, Copy)]
pub struct SchedulerConfig {
    pub tick_interval: Duration,
    pub read_timeout: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(1),
            read_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStatus {
    pub tick: u64,
    pub node_count: usize,
    pub periods: Vec<u64>,
    pub running: bool,
    pub controllers_loaded: bool,
}

#[derive(Clone)]
pub struct SensorScheduler {
    inner: Arc<SchedulerInner>,
}

struct SchedulerInner {
    config: SchedulerConfig,
    buckets: Mutex<BTreeMap<u64, Vec<Arc<SensingNode>>>>,
    sinks: Mutex<Vec<Arc<dyn TelemetrySink>>>,
    tick: AtomicU64,
    running: AtomicBool,
    controllers_loaded: AtomicBool,
}

impl SensorScheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                config,
                buckets: Mutex::new(BTreeMap::new()),
                sinks: Mutex::new(Vec::new()),
                tick: AtomicU64::new(0),
                running: AtomicBool::new(false),
                controllers_loaded: AtomicBool::new(false),
            }),
        }
    }

    pub fn add_sink(&self, sink: Arc<dyn TelemetrySink>) {
        lock(&self.inner.sinks).push(sink);
    }

    /// Registers a node under its period bucket. Safe to call while the read loop runs; the node
    /// is picked up from the next tick on.
    pub fn add_node(&self, node: SensingNode) {
        let node = Arc::new(node);
        let mut buckets = lock(&self.inner.buckets);
        let duplicate = buckets
            .values()
            .flatten()
            .any(|existing| existing.name() == node.name());
        if duplicate {
            tracing::warn!(
                node = %node.name(),
                "sensing node name already registered; the first reading per tick wins"
            );
        }
        tracing::debug!(
            node = %node.name(),
            id = %node.id(),
            period_seconds = node.period_seconds(),
            "sensing node registered"
        );
        buckets
            .entry(node.period_seconds())
            .or_default()
            .push(node);
    }

    pub fn add_nodes(&self, nodes: impl IntoIterator<Item = SensingNode>) {
        for node in nodes {
            self.add_node(node);
        }
    }

    pub fn node_count(&self) -> usize {
        lock(&self.inner.buckets).values().map(Vec::len).sum()
    }

    /// Node summaries in bucket-then-insertion order.
    pub fn node_summaries(&self) -> Vec<NodeSummary> {
        lock(&self.inner.buckets)
            .values()
            .flatten()
            .map(|node| node.summary())
            .collect()
    }

    pub fn tick(&self) -> u64 {
        self.inner.tick.load(Ordering::SeqCst)
    }

    pub fn mark_controllers_loaded(&self) {
        self.inner.controllers_loaded.store(true, Ordering::SeqCst);
    }

    pub fn controllers_loaded(&self) -> bool {
        self.inner.controllers_loaded.load(Ordering::SeqCst)
    }

    pub fn status(&self) -> SchedulerStatus {
        let buckets = lock(&self.inner.buckets);
        SchedulerStatus {
            tick: self.tick(),
            node_count: buckets.values().map(Vec::len).sum(),
            periods: buckets.keys().copied().collect(),
            running: self.inner.running.load(Ordering::SeqCst),
            controllers_loaded: self.controllers_loaded(),
        }
    }

    /// Spawns the read loop. Returns `None` if the loop is already running.
    pub fn start(&self, cancel: CancellationToken) -> Option<JoinHandle<()>> {
        if self.inner.running.swap(true, Ordering::SeqCst) {
            tracing::warn!("sensor scheduler already started");
            return None;
        }
        if !self.controllers_loaded() {
            tracing::warn!("sensor scheduler starting before all controllers have loaded");
        }
        let scheduler = self.clone();
        let interval = self.inner.config.tick_interval;
        Some(tokio::spawn(async move {
            tracing::info!(
                tick_interval_ms = interval.as_millis() as u64,
                "sensor read loop started"
            );
            loop {
                if cancel.is_cancelled() {
                    break;
                }
                scheduler.run_tick().await;
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {}
                }
            }
            scheduler.inner.running.store(false, Ordering::SeqCst);
            tracing::info!(tick = scheduler.tick(), "sensor read loop stopped");
        }))
    }

    /// Runs one iteration of the read loop and returns the snapshot it built.
    ///
    /// With no nodes registered the tick counter does not move. Otherwise every node whose period
    /// divides the current tick is read once, without holding the bucket lock, and the counter
    /// advances by exactly one.
    pub async fn run_tick(&self) -> TelemetrySnapshot {
        let tick = self.tick();
        let due: Vec<Arc<SensingNode>> = {
            let buckets = lock(&self.inner.buckets);
            if buckets.is_empty() {
                return TelemetrySnapshot::new();
            }
            buckets
                .iter()
                .filter(|(period, _)| tick % **period == 0)
                .flat_map(|(_, nodes)| nodes.iter().cloned())
                .collect()
        };

        let mut snapshot = TelemetrySnapshot::new();
        for node in &due {
            self.read_node(node, &mut snapshot).await;
        }

        if !snapshot.is_empty() {
            let sinks = lock(&self.inner.sinks).clone();
            for sink in sinks {
                sink.publish(&snapshot);
            }
        }

        self.inner.tick.store(tick.wrapping_add(1), Ordering::SeqCst);
        snapshot
    }

    async fn read_node(&self, node: &SensingNode, snapshot: &mut TelemetrySnapshot) {
        let timeout = self.inner.config.read_timeout;
        match node.kind() {
            NodeKind::Unitized(_) => {
                let result = match tokio::time::timeout(timeout, node.read_canonical()).await {
                    Ok(result) => result,
                    Err(_) => Err(ReadError::Timeout(timeout)),
                };
                match result {
                    Ok(Some(reading)) => {
                        insert_first(snapshot, node.name(), TelemetryValue::Number(reading.value));
                    }
                    Ok(None) => {
                        tracing::debug!(node = %node.name(), "no data this tick");
                    }
                    Err(err) => log_read_error(node, &err),
                }
            }
            NodeKind::Plain => {
                let result = match tokio::time::timeout(timeout, node.read()).await {
                    Ok(result) => result,
                    Err(_) => Err(ReadError::Timeout(timeout)),
                };
                match result {
                    Ok(Some(reading)) => {
                        tracing::trace!(node = %node.name(), ?reading, "node read");
                        flatten_into(snapshot, node.name(), reading);
                    }
                    Ok(None) => {
                        tracing::debug!(node = %node.name(), "no data this tick");
                    }
                    Err(err) => log_read_error(node, &err),
                }
            }
        }
    }
}

fn flatten_into(snapshot: &mut TelemetrySnapshot, key: &str, reading: SensorReading) {
    match reading {
        SensorReading::Quantity(quantity) => {
            insert_first(snapshot, key, TelemetryValue::Number(quantity.to_canonical()));
        }
        SensorReading::Value(value) => insert_first(snapshot, key, value),
        SensorReading::Composite(entries) => {
            for (sub_key, sub_reading) in entries {
                flatten_into(snapshot, &sub_key, sub_reading);
            }
        }
    }
}

fn insert_first(snapshot: &mut TelemetrySnapshot, key: &str, value: TelemetryValue) {
    match snapshot.entry(key.to_string()) {
        Entry::Vacant(slot) => {
            slot.insert(value);
        }
        Entry::Occupied(_) => {
            tracing::debug!(key, "duplicate telemetry key this tick; keeping first value");
        }
    }
}

fn log_read_error(node: &SensingNode, err: &ReadError) {
    if err.is_timeout() {
        tracing::debug!(node = %node.name(), error = %err, "sensor read timed out");
    } else {
        tracing::warn!(node = %node.name(), error = %err, "sensor read failed");
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
