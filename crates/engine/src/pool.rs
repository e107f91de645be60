//! Bounded worker pool driving a shared [`Store`].
//!
//! Requests enter a FIFO queue (default capacity 100) and are applied by a
//! fixed set of worker threads (default 4). Submission blocks up to the
//! submit timeout when the queue is full; awaiting a completion past the op
//! timeout releases the caller but does not cancel the work, so a timeout
//! means the outcome is unknown.
//!
//! Ordering: requests from one submitter are applied in submission order;
//! interleaving across submitters is arbitrary, and per-key correctness
//! comes from the store's lock table, not worker identity.

use crate::store::{CheckpointStats, Store};
use parking_lot::{Condvar, Mutex};
use ringkv_core::{Error, Result, Value};
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, SyncSender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{error, info};

/// Sizing and timeout knobs for [`WorkerPool`].
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Number of worker threads.
    pub workers: usize,
    /// Maximum queued requests before submitters block.
    pub queue_capacity: usize,
    /// How long a submitter waits for queue space.
    pub submit_timeout: Duration,
    /// How long a submitter waits for its completion.
    pub op_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            queue_capacity: 100,
            submit_timeout: Duration::from_secs(5),
            op_timeout: Duration::from_secs(30),
        }
    }
}

/// A snapshot of pool counters, surfaced by the node's stats endpoint.
#[derive(Debug, Clone)]
pub struct PoolStats {
    /// Whether the pool accepts requests.
    pub running: bool,
    /// Worker thread count.
    pub workers: usize,
    /// Requests currently queued.
    pub queue_depth: usize,
    /// Requests accepted since start.
    pub total_requests: u64,
    /// Requests completed, per worker.
    pub processed_per_worker: Vec<u64>,
}

enum Op {
    Get(String),
    Set(String, Value),
    Delete(String),
    Exists(String),
    Keys,
    Values,
    Items,
    Clear,
    Len,
    Update(BTreeMap<String, Value>),
    Checkpoint,
    Shutdown,
}

enum Reply {
    Unit,
    Bool(bool),
    Maybe(Option<Value>),
    Keys(Vec<String>),
    Values(Vec<Value>),
    Items(Vec<(String, Value)>),
    Len(usize),
    Checkpoint(CheckpointStats),
}

struct Request {
    op: Op,
    completion: Option<SyncSender<Result<Reply>>>,
}

struct PoolShared {
    queue: Mutex<VecDeque<Request>>,
    not_empty: Condvar,
    not_full: Condvar,
    running: AtomicBool,
    capacity: usize,
    total_requests: AtomicU64,
    processed: Vec<AtomicU64>,
}

/// Fixed worker-thread pool over a bounded FIFO request queue.
pub struct WorkerPool {
    shared: Arc<PoolShared>,
    store: Arc<Store>,
    config: PoolConfig,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    /// Spawn `config.workers` threads driving `store` and start accepting
    /// requests.
    pub fn start(store: Arc<Store>, config: PoolConfig) -> Self {
        let shared = Arc::new(PoolShared {
            queue: Mutex::new(VecDeque::new()),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            running: AtomicBool::new(true),
            capacity: config.queue_capacity,
            total_requests: AtomicU64::new(0),
            processed: (0..config.workers).map(|_| AtomicU64::new(0)).collect(),
        });

        let mut workers = Vec::with_capacity(config.workers);
        for worker_id in 0..config.workers {
            let shared = Arc::clone(&shared);
            let store = Arc::clone(&store);
            let handle = std::thread::Builder::new()
                .name(format!("ringkv-worker-{worker_id}"))
                .spawn(move || worker_loop(worker_id, &shared, &store))
                .expect("failed to spawn worker thread");
            workers.push(handle);
        }
        info!(workers = config.workers, capacity = config.queue_capacity, "worker pool started");

        Self {
            shared,
            store,
            config,
            workers: Mutex::new(workers),
        }
    }

    /// Whether the pool accepts requests.
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    fn enqueue(&self, request: Request, respect_capacity: bool) -> Result<()> {
        let mut queue = self.shared.queue.lock();
        if respect_capacity {
            let deadline = Instant::now() + self.config.submit_timeout;
            while queue.len() >= self.shared.capacity {
                if self
                    .shared
                    .not_full
                    .wait_until(&mut queue, deadline)
                    .timed_out()
                {
                    return Err(Error::Backpressure(self.config.submit_timeout));
                }
            }
        }
        queue.push_back(request);
        self.shared.not_empty.notify_one();
        Ok(())
    }

    fn submit(&self, op: Op) -> Result<Reply> {
        if !self.is_running() {
            return Err(Error::NotRunning);
        }
        self.shared.total_requests.fetch_add(1, Ordering::Relaxed);

        let (tx, rx) = mpsc::sync_channel(1);
        self.enqueue(
            Request {
                op,
                completion: Some(tx),
            },
            true,
        )?;
        match rx.recv_timeout(self.config.op_timeout) {
            Ok(result) => result,
            // The worker may still complete and mutate state after this
            // returns; the caller must treat the outcome as unknown.
            Err(_) => Err(Error::Timeout(self.config.op_timeout)),
        }
    }

    /// Read a value.
    pub fn get(&self, key: &str) -> Result<Option<Value>> {
        match self.submit(Op::Get(key.to_string()))? {
            Reply::Maybe(value) => Ok(value),
            _ => unreachable!("GET reply variant mismatch"),
        }
    }

    /// Write a value.
    pub fn set(&self, key: &str, value: Value) -> Result<()> {
        match self.submit(Op::Set(key.to_string(), value))? {
            Reply::Unit => Ok(()),
            _ => unreachable!("SET reply variant mismatch"),
        }
    }

    /// Delete a key; returns whether it was present.
    pub fn delete(&self, key: &str) -> Result<bool> {
        match self.submit(Op::Delete(key.to_string()))? {
            Reply::Bool(deleted) => Ok(deleted),
            _ => unreachable!("DELETE reply variant mismatch"),
        }
    }

    /// Whether a key is present.
    pub fn exists(&self, key: &str) -> Result<bool> {
        match self.submit(Op::Exists(key.to_string()))? {
            Reply::Bool(exists) => Ok(exists),
            _ => unreachable!("EXISTS reply variant mismatch"),
        }
    }

    /// All keys.
    pub fn keys(&self) -> Result<Vec<String>> {
        match self.submit(Op::Keys)? {
            Reply::Keys(keys) => Ok(keys),
            _ => unreachable!("KEYS reply variant mismatch"),
        }
    }

    /// All values.
    pub fn values(&self) -> Result<Vec<Value>> {
        match self.submit(Op::Values)? {
            Reply::Values(values) => Ok(values),
            _ => unreachable!("VALUES reply variant mismatch"),
        }
    }

    /// All key/value pairs.
    pub fn items(&self) -> Result<Vec<(String, Value)>> {
        match self.submit(Op::Items)? {
            Reply::Items(items) => Ok(items),
            _ => unreachable!("ITEMS reply variant mismatch"),
        }
    }

    /// Remove every key.
    pub fn clear(&self) -> Result<()> {
        match self.submit(Op::Clear)? {
            Reply::Unit => Ok(()),
            _ => unreachable!("CLEAR reply variant mismatch"),
        }
    }

    /// Number of keys.
    pub fn len(&self) -> Result<usize> {
        match self.submit(Op::Len)? {
            Reply::Len(len) => Ok(len),
            _ => unreachable!("LEN reply variant mismatch"),
        }
    }

    /// Whether the store holds no keys.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Bulk update.
    pub fn update(&self, entries: BTreeMap<String, Value>) -> Result<()> {
        match self.submit(Op::Update(entries))? {
            Reply::Unit => Ok(()),
            _ => unreachable!("UPDATE reply variant mismatch"),
        }
    }

    /// Flush durability state and report counters.
    pub fn checkpoint(&self) -> Result<CheckpointStats> {
        match self.submit(Op::Checkpoint)? {
            Reply::Checkpoint(stats) => Ok(stats),
            _ => unreachable!("CHECKPOINT reply variant mismatch"),
        }
    }

    /// Counter snapshot for the stats endpoint.
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            running: self.is_running(),
            workers: self.shared.processed.len(),
            queue_depth: self.shared.queue.lock().len(),
            total_requests: self.shared.total_requests.load(Ordering::Relaxed),
            processed_per_worker: self
                .shared
                .processed
                .iter()
                .map(|count| count.load(Ordering::Relaxed))
                .collect(),
        }
    }

    /// Stop accepting requests, drain workers, and close the store.
    ///
    /// One shutdown sentinel is enqueued per worker; each worker exits its
    /// loop when it dequeues one. Sentinels bypass the capacity limit so a
    /// full queue cannot wedge shutdown.
    pub fn stop(&self) -> Result<()> {
        if !self.shared.running.swap(false, Ordering::AcqRel) {
            return Ok(());
        }
        let worker_count = self.shared.processed.len();
        for _ in 0..worker_count {
            self.enqueue(
                Request {
                    op: Op::Shutdown,
                    completion: None,
                },
                false,
            )?;
        }
        let mut workers = self.workers.lock();
        for handle in workers.drain(..) {
            let _ = handle.join();
        }
        info!("worker pool stopped");
        self.store.close()
    }
}

fn next_request(shared: &PoolShared) -> Request {
    let mut queue = shared.queue.lock();
    loop {
        if let Some(request) = queue.pop_front() {
            shared.not_full.notify_one();
            return request;
        }
        shared.not_empty.wait(&mut queue);
    }
}

fn worker_loop(worker_id: usize, shared: &PoolShared, store: &Store) {
    loop {
        let request = next_request(shared);
        if matches!(request.op, Op::Shutdown) {
            if let Some(completion) = request.completion {
                let _ = completion.send(Ok(Reply::Unit));
            }
            break;
        }

        let result = execute(store, request.op);
        if let Err(err) = &result {
            error!(worker_id, %err, "request failed");
        }
        shared.processed[worker_id].fetch_add(1, Ordering::Relaxed);
        if let Some(completion) = request.completion {
            // Submitter may have timed out and gone away; that's fine.
            let _ = completion.send(result);
        }
    }
}

fn execute(store: &Store, op: Op) -> Result<Reply> {
    match op {
        Op::Get(key) => Ok(Reply::Maybe(store.get(&key)?)),
        Op::Set(key, value) => {
            store.set(&key, value)?;
            Ok(Reply::Unit)
        }
        Op::Delete(key) => Ok(Reply::Bool(store.delete(&key)?)),
        Op::Exists(key) => Ok(Reply::Bool(store.exists(&key)?)),
        Op::Keys => Ok(Reply::Keys(store.keys()?)),
        Op::Values => Ok(Reply::Values(store.values()?)),
        Op::Items => Ok(Reply::Items(store.items()?)),
        Op::Clear => {
            store.clear()?;
            Ok(Reply::Unit)
        }
        Op::Len => Ok(Reply::Len(store.len()?)),
        Op::Update(entries) => {
            store.update(entries)?;
            Ok(Reply::Unit)
        }
        Op::Checkpoint => Ok(Reply::Checkpoint(store.checkpoint()?)),
        Op::Shutdown => Ok(Reply::Unit),
    }
}
