//! Worker threads, their command channels, and leases.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use parking_lot::Mutex;

use super::WorkerSpec;

/// Worker events held until the front end drains them. Newer events are
/// dropped while the queue is full.
pub const EVENT_CAPACITY: usize = 256;

/// Identity of one worker thread: its tag and instance number.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WorkerId {
    pub tag: String,
    pub index: u32,
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.tag, self.index)
    }
}

/// Commands sent to a worker thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerCommand {
    /// Start analyzing the stream on a stream slot.
    Activate { stream_slot: u32 },
    /// Stop analyzing, stay alive.
    Deactivate,
    Ping,
    /// Exit the thread.
    Stop,
}

/// Events reported back by worker threads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerEvent {
    Activated { worker: WorkerId, stream_slot: u32 },
    Deactivated { worker: WorkerId },
    Pong { worker: WorkerId },
    Stopped { worker: WorkerId },
}

struct WorkerSlot {
    id: WorkerId,
    commands: Sender<WorkerCommand>,
}

struct PoolShared {
    workers: Vec<WorkerSlot>,
    /// Free worker indices per tag.
    free: Mutex<HashMap<String, Vec<usize>>>,
    stopped: Mutex<bool>,
}

impl PoolShared {
    fn send(&self, index: usize, command: WorkerCommand) -> bool {
        self.workers[index].commands.send(command).is_ok()
    }

    fn release(&self, index: usize) {
        if self.send(index, WorkerCommand::Deactivate) {
            tracing::debug!(worker = %self.workers[index].id, "Worker released");
        }
        let tag = self.workers[index].id.tag.clone();
        self.free.lock().entry(tag).or_default().push(index);
    }
}

/// Pool of machine-vision worker threads.
///
/// Each worker owns a command channel; all workers share one bounded
/// event channel.
pub struct WorkerPool {
    shared: Arc<PoolShared>,
    threads: Vec<JoinHandle<()>>,
    events: Receiver<WorkerEvent>,
    specs: Vec<WorkerSpec>,
}

impl WorkerPool {
    /// Spawn `max_instances` threads for every spec.
    pub fn start(specs: &[WorkerSpec]) -> std::io::Result<Self> {
        let (event_tx, event_rx) = bounded(EVENT_CAPACITY);
        let mut workers = Vec::new();
        let mut threads = Vec::new();
        let mut free: HashMap<String, Vec<usize>> = HashMap::new();

        for spec in specs {
            for n in 0..spec.max_instances {
                let id = WorkerId {
                    tag: spec.tag.clone(),
                    index: n,
                };
                let (cmd_tx, cmd_rx) = unbounded();
                let thread_id = id.clone();
                let events = event_tx.clone();
                let handle = thread::Builder::new()
                    .name(format!("mvision-{}", id))
                    .spawn(move || run_worker(thread_id, cmd_rx, events))?;

                free.entry(spec.tag.clone()).or_default().push(workers.len());
                workers.push(WorkerSlot {
                    id,
                    commands: cmd_tx,
                });
                threads.push(handle);
            }
        }

        // Hand out low instance numbers first
        for indices in free.values_mut() {
            indices.reverse();
        }

        tracing::info!(workers = workers.len(), "Machine vision worker pool started");

        Ok(Self {
            shared: Arc::new(PoolShared {
                workers,
                free: Mutex::new(free),
                stopped: Mutex::new(false),
            }),
            threads,
            events: event_rx,
            specs: specs.to_vec(),
        })
    }

    /// Specs the pool was started with.
    pub fn specs(&self) -> &[WorkerSpec] {
        &self.specs
    }

    /// Take a free worker for `tag`, if any.
    pub fn acquire(&self, tag: &str) -> Option<WorkerLease> {
        if *self.shared.stopped.lock() {
            return None;
        }
        let index = self.shared.free.lock().get_mut(tag)?.pop()?;
        tracing::debug!(worker = %self.shared.workers[index].id, "Worker acquired");
        Some(WorkerLease {
            shared: Arc::clone(&self.shared),
            index,
        })
    }

    /// Number of free workers for `tag`.
    pub fn available(&self, tag: &str) -> usize {
        self.shared.free.lock().get(tag).map_or(0, Vec::len)
    }

    /// Worker event stream.
    pub fn events(&self) -> &Receiver<WorkerEvent> {
        &self.events
    }

    /// Take every queued event without waiting.
    pub fn drain_events(&self) -> Vec<WorkerEvent> {
        self.events.try_iter().collect()
    }

    /// Ping every worker and count the replies received within `timeout`.
    ///
    /// Events queued before the ping are discarded.
    pub fn ping_all(&self, timeout: Duration) -> usize {
        let stale = self.events.try_iter().count();
        if stale > 0 {
            tracing::debug!(stale, "Discarded queued worker events");
        }
        let sent = (0..self.shared.workers.len())
            .filter(|&i| self.shared.send(i, WorkerCommand::Ping))
            .count();

        let deadline = Instant::now() + timeout;
        let mut pongs = 0;
        while pongs < sent {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.events.recv_timeout(remaining) {
                Ok(WorkerEvent::Pong { .. }) => pongs += 1,
                Ok(_) => {}
                Err(_) => break,
            }
        }
        pongs
    }

    /// Stop every worker: signal all, then join all.
    ///
    /// Outstanding leases stay valid objects but no longer reach a thread.
    pub fn shutdown(&mut self) {
        {
            let mut stopped = self.shared.stopped.lock();
            if *stopped {
                return;
            }
            *stopped = true;
        }

        for index in 0..self.shared.workers.len() {
            self.shared.send(index, WorkerCommand::Stop);
        }
        for handle in self.threads.drain(..) {
            if handle.join().is_err() {
                tracing::warn!("Machine vision worker panicked during shutdown");
            }
        }
        tracing::info!("Machine vision worker pool stopped");
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Exclusive use of one worker. Dropping the lease deactivates the worker
/// and returns it to the pool.
pub struct WorkerLease {
    shared: Arc<PoolShared>,
    index: usize,
}

impl WorkerLease {
    /// Worker behind this lease.
    pub fn id(&self) -> &WorkerId {
        &self.shared.workers[self.index].id
    }

    /// Point the worker at a stream slot. Returns `false` if the worker is gone.
    pub fn activate(&self, stream_slot: u32) -> bool {
        self.shared
            .send(self.index, WorkerCommand::Activate { stream_slot })
    }

    /// Stop analysing without giving the worker back.
    pub fn deactivate(&self) {
        self.shared.send(self.index, WorkerCommand::Deactivate);
    }

    /// Explicitly give the worker back.
    pub fn release(self) {}
}

impl fmt::Debug for WorkerLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerLease").field("worker", self.id()).finish()
    }
}

impl Drop for WorkerLease {
    fn drop(&mut self) {
        self.shared.release(self.index);
    }
}

fn run_worker(id: WorkerId, commands: Receiver<WorkerCommand>, events: Sender<WorkerEvent>) {
    let mut active: Option<u32> = None;

    for command in commands.iter() {
        let event = match command {
            WorkerCommand::Activate { stream_slot } => {
                active = Some(stream_slot);
                WorkerEvent::Activated {
                    worker: id.clone(),
                    stream_slot,
                }
            }
            WorkerCommand::Deactivate => {
                if active.take().is_none() {
                    continue;
                }
                WorkerEvent::Deactivated { worker: id.clone() }
            }
            WorkerCommand::Ping => WorkerEvent::Pong { worker: id.clone() },
            WorkerCommand::Stop => break,
        };
        if events.try_send(event).is_err() {
            tracing::trace!(worker = %id, "Worker event dropped");
        }
    }

    let _ = events.try_send(WorkerEvent::Stopped { worker: id });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(max: u32) -> WorkerPool {
        WorkerPool::start(&[WorkerSpec::new("Movement Detector", "movement", max)]).unwrap()
    }

    #[test]
    fn acquire_until_exhausted() {
        let pool = pool(2);
        let a = pool.acquire("movement").unwrap();
        let b = pool.acquire("movement").unwrap();
        assert_ne!(a.id(), b.id());
        assert_eq!(a.id().index, 0);
        assert!(pool.acquire("movement").is_none());
        assert_eq!(pool.available("movement"), 0);
    }

    #[test]
    fn unknown_tag_has_no_workers() {
        let pool = pool(1);
        assert!(pool.acquire("faces").is_none());
        assert_eq!(pool.available("faces"), 0);
    }

    #[test]
    fn dropping_lease_returns_worker() {
        let pool = pool(1);
        let lease = pool.acquire("movement").unwrap();
        assert_eq!(pool.available("movement"), 0);
        drop(lease);
        assert_eq!(pool.available("movement"), 1);
        assert!(pool.acquire("movement").is_some());
    }

    #[test]
    fn activate_reports_event() {
        let pool = pool(1);
        let lease = pool.acquire("movement").unwrap();
        assert!(lease.activate(4));

        let event = pool.events().recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(
            event,
            WorkerEvent::Activated {
                worker: lease.id().clone(),
                stream_slot: 4
            }
        );

        lease.release();
        let event = pool.events().recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(matches!(event, WorkerEvent::Deactivated { .. }));
    }

    #[test]
    fn undrained_events_stay_bounded() {
        let mut pool = pool(1);
        let lease = pool.acquire("movement").unwrap();
        for slot in 0..2000 {
            assert!(lease.activate(slot));
        }
        drop(lease);
        pool.shutdown();

        assert_eq!(pool.events().len(), EVENT_CAPACITY);
        assert_eq!(pool.drain_events().len(), EVENT_CAPACITY);
        assert!(pool.events().is_empty());
    }

    #[test]
    fn ping_reaches_every_worker() {
        let pool = WorkerPool::start(&[
            WorkerSpec::new("Movement Detector", "movement", 2),
            WorkerSpec::new("Plates", "plates", 1),
        ])
        .unwrap();
        assert_eq!(pool.ping_all(Duration::from_secs(5)), 3);
    }

    #[test]
    fn shutdown_stops_all_and_blocks_acquire() {
        let mut pool = pool(2);
        let lease = pool.acquire("movement").unwrap();
        pool.shutdown();

        let stopped = pool
            .events()
            .try_iter()
            .filter(|e| matches!(e, WorkerEvent::Stopped { .. }))
            .count();
        assert_eq!(stopped, 2);
        assert!(pool.acquire("movement").is_none());
        assert!(!lease.activate(1));

        // Second shutdown is a no-op
        pool.shutdown();
    }
}
