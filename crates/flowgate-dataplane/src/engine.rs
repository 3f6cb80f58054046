//! Engine: per-interface dispatch workers
//!
//! Traffic is statically partitioned: each physical interface is owned
//! by exactly one worker thread, so flow tables and counters are never
//! shared. Workers pull owned frame batches from a bounded channel,
//! run synchronous dispatch to completion, and exit cooperatively —
//! a worker observes the stop signal between batches, never mid-batch.
//!
//! Configuration (interfaces, ports, flows) happens strictly before
//! `start`; the registration boundary refuses changes while running.

use crate::flow::{FlowError, FlowHandle, FlowSelector};
use crate::frame::RxFrame;
use crate::interface::PhysicalInterface;
use crate::port::{Port, DEFAULT_STACK_CAPACITY};
use crate::BATCH_SIZE;
use crossbeam::channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use thiserror::Error;

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Sub-interface (tag) capacity per physical interface
    pub sub_interfaces: usize,
    /// Expected flow count, used to size new flow tables
    pub expected_flows: usize,
    /// Residual queue capacity per port
    pub stack_queue_capacity: usize,
    /// Frames per dispatch batch
    pub batch_size: usize,
    /// Queued batches per worker channel
    pub channel_depth: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sub_interfaces: crate::DEFAULT_SUB_INTERFACES,
            expected_flows: 1024,
            stack_queue_capacity: DEFAULT_STACK_CAPACITY,
            batch_size: BATCH_SIZE,
            channel_depth: 64,
        }
    }
}

/// One received frame, owned (copied off the reception ring)
#[derive(Debug, Clone)]
pub struct OwnedFrame {
    /// Frame bytes
    pub data: Vec<u8>,
    /// Outer sub-interface tag
    pub sub_interface: u8,
}

impl OwnedFrame {
    /// Owned frame from raw parts
    pub fn new(data: Vec<u8>, sub_interface: u8) -> Self {
        Self {
            data,
            sub_interface,
        }
    }

    /// Borrow as a dispatchable frame view
    #[inline(always)]
    pub fn as_rx(&self) -> RxFrame<'_> {
        RxFrame::new(&self.data, self.sub_interface)
    }
}

/// Engine errors
#[derive(Debug, Error)]
pub enum EngineError {
    /// The engine is already running
    #[error("engine already running")]
    AlreadyRunning,

    /// The engine is not running
    #[error("engine is not running")]
    NotRunning,

    /// Worker thread could not be spawned
    #[error("failed to spawn worker: {0}")]
    SpawnFailed(String),

    /// A configured index does not exist
    #[error("unknown dispatch target: interface {interface}, sub-interface {sub_interface}, port {port}")]
    UnknownTarget {
        /// Physical interface index
        interface: usize,
        /// Sub-interface index
        sub_interface: usize,
        /// Port index
        port: usize,
    },

    /// Flow registration failed
    #[error(transparent)]
    Flow(#[from] FlowError),
}

/// Shared atomic counters at the ingest boundary
#[derive(Debug, Default)]
struct EngineStats {
    rx_frames: AtomicU64,
    rx_bytes: AtomicU64,
    unrouted: AtomicU64,
    rejected_batches: AtomicU64,
}

/// Point-in-time engine counters (non-atomic)
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct EngineStatsSnapshot {
    /// Frames handed to workers
    pub rx_frames: u64,
    /// Bytes handed to workers
    pub rx_bytes: u64,
    /// Frames whose tag exceeded the configured capacity
    pub unrouted: u64,
    /// Batches refused because a worker channel was full
    pub rejected_batches: u64,
}

struct WorkerHandle {
    thread: Option<thread::JoinHandle<PhysicalInterface>>,
    sender: Option<Sender<Vec<OwnedFrame>>>,
}

/// Classification/dispatch engine
///
/// Owns the configured physical interfaces while idle and lends each
/// to a dedicated worker thread while running.
pub struct Engine {
    config: EngineConfig,
    interfaces: Vec<PhysicalInterface>,
    running: Arc<AtomicBool>,
    workers: Vec<WorkerHandle>,
    stats: Arc<EngineStats>,
}

impl Engine {
    /// Engine with no interfaces configured yet
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            interfaces: Vec::new(),
            running: Arc::new(AtomicBool::new(false)),
            workers: Vec::new(),
            stats: Arc::new(EngineStats::default()),
        }
    }

    /// Engine configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Add a physical interface, returning its index
    pub fn add_interface(&mut self) -> usize {
        self.interfaces
            .push(PhysicalInterface::with_capacity(self.config.sub_interfaces));
        self.interfaces.len() - 1
    }

    /// Build a port sized per the engine configuration
    pub fn new_port(
        &self,
        local_mac: flowgate_common::wire::MacAddr,
        local_ip: std::net::Ipv4Addr,
    ) -> Port {
        Port::with_parts(
            local_mac,
            local_ip,
            crate::flow::FlowTable::with_expected_flows(self.config.expected_flows),
            self.config.stack_queue_capacity,
        )
    }

    /// Add a port under `interface`/`sub_interface`
    pub fn add_port(
        &mut self,
        interface: usize,
        sub_interface: usize,
        port: Port,
    ) -> Result<usize, EngineError> {
        if self.is_running() {
            return Err(EngineError::AlreadyRunning);
        }
        let sub = self
            .interfaces
            .get_mut(interface)
            .and_then(|pi| pi.sub_interface_mut(sub_interface))
            .ok_or(EngineError::UnknownTarget {
                interface,
                sub_interface,
                port: 0,
            })?;
        sub.add_port(port);
        Ok(sub.port_count() - 1)
    }

    /// Flow registration boundary (configuration time only)
    pub fn register_flow(
        &mut self,
        interface: usize,
        sub_interface: usize,
        port: usize,
        selector: FlowSelector,
    ) -> Result<FlowHandle, EngineError> {
        if self.is_running() {
            return Err(EngineError::AlreadyRunning);
        }
        let target = self
            .interfaces
            .get_mut(interface)
            .and_then(|pi| pi.sub_interface_mut(sub_interface))
            .and_then(|sub| sub.port_mut(port))
            .ok_or(EngineError::UnknownTarget {
                interface,
                sub_interface,
                port,
            })?;
        Ok(target.add_flow(selector)?)
    }

    /// Interface access while idle (`None` while running)
    pub fn interface(&self, index: usize) -> Option<&PhysicalInterface> {
        self.interfaces.get(index)
    }

    /// Mutable interface access while idle
    pub fn interface_mut(&mut self, index: usize) -> Option<&mut PhysicalInterface> {
        self.interfaces.get_mut(index)
    }

    /// Start one worker per configured interface
    ///
    /// On a spawn failure the engine unwinds: already-started workers
    /// are stopped, every configured interface (including the one
    /// whose worker failed) returns to the idle set in its original
    /// order, and the engine can be started again.
    pub fn start(&mut self) -> Result<(), EngineError> {
        if self.running.swap(true, Ordering::AcqRel) {
            return Err(EngineError::AlreadyRunning);
        }

        let mut pending = std::mem::take(&mut self.interfaces).into_iter();
        while let Some(interface) = pending.next() {
            let index = self.workers.len();
            let (tx, rx) = bounded(self.config.channel_depth);
            let running = self.running.clone();
            let stats = self.stats.clone();

            // The interface is handed over through a one-slot seed
            // channel rather than moved into the closure, so a failed
            // spawn leaves it reclaimable.
            let (seed_tx, seed_rx) = bounded(1);
            let reclaim = seed_rx.clone();
            let _ = seed_tx.send(interface); // one slot, empty: cannot fail

            let spawned = thread::Builder::new()
                .name(format!("flowgate-worker-{index}"))
                .spawn(move || match seed_rx.recv() {
                    Ok(interface) => run_worker(interface, rx, running, stats),
                    // Unreachable: the seed is in the channel before
                    // the spawn.
                    Err(_) => PhysicalInterface::with_capacity(0),
                });

            match spawned {
                Ok(handle) => self.workers.push(WorkerHandle {
                    thread: Some(handle),
                    sender: Some(tx),
                }),
                Err(e) => {
                    self.unwind_failed_start(reclaim.try_recv().ok().into_iter().chain(pending));
                    return Err(EngineError::SpawnFailed(e.to_string()));
                }
            }
        }

        tracing::info!(workers = self.workers.len(), "engine started");
        Ok(())
    }

    /// Reclaim the configuration after a failed start
    ///
    /// Already-spawned workers are stopped first, so their interfaces
    /// come back in spawn order via [`Engine::stop`]; the interfaces
    /// whose workers never spawned are appended after them. The stop
    /// flag is cleared, leaving the engine restartable.
    fn unwind_failed_start(&mut self, pending: impl Iterator<Item = PhysicalInterface>) {
        let pending: Vec<_> = pending.collect();
        self.stop();
        self.interfaces.extend(pending);
    }

    /// Hand a frame batch to an interface's worker
    ///
    /// Non-blocking: a full channel rejects the batch (drop-newest)
    /// and bumps the rejected-batch counter. Returns whether the
    /// batch was queued.
    pub fn inject(
        &self,
        interface: usize,
        frames: Vec<OwnedFrame>,
    ) -> Result<bool, EngineError> {
        if !self.is_running() {
            return Err(EngineError::NotRunning);
        }
        let worker = self
            .workers
            .get(interface)
            .ok_or(EngineError::UnknownTarget {
                interface,
                sub_interface: 0,
                port: 0,
            })?;
        let sender = worker.sender.as_ref().ok_or(EngineError::NotRunning)?;
        match sender.try_send(frames) {
            Ok(()) => Ok(true),
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                self.stats.rejected_batches.fetch_add(1, Ordering::Relaxed);
                Ok(false)
            }
        }
    }

    /// Stop all workers and take the interfaces back
    ///
    /// Closes the feed channels first so every queued batch is still
    /// dispatched, then joins. Counters on the returned interfaces
    /// are final.
    pub fn stop(&mut self) {
        for worker in &mut self.workers {
            worker.sender.take();
        }
        for worker in &mut self.workers {
            if let Some(handle) = worker.thread.take() {
                if let Ok(interface) = handle.join() {
                    self.interfaces.push(interface);
                }
            }
        }
        self.workers.clear();
        self.running.store(false, Ordering::Release);
        tracing::info!("engine stopped");
    }

    /// True while workers are running
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Ingest-boundary counters
    pub fn stats(&self) -> EngineStatsSnapshot {
        EngineStatsSnapshot {
            rx_frames: self.stats.rx_frames.load(Ordering::Relaxed),
            rx_bytes: self.stats.rx_bytes.load(Ordering::Relaxed),
            unrouted: self.stats.unrouted.load(Ordering::Relaxed),
            rejected_batches: self.stats.rejected_batches.load(Ordering::Relaxed),
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Worker loop: drain batches until the feed closes
///
/// The stop flag is only consulted between batches; a batch always
/// dispatches to completion in time bounded by its size.
fn run_worker(
    mut interface: PhysicalInterface,
    rx: Receiver<Vec<OwnedFrame>>,
    running: Arc<AtomicBool>,
    stats: Arc<EngineStats>,
) -> PhysicalInterface {
    tracing::debug!("worker starting");

    loop {
        match rx.recv_timeout(Duration::from_millis(10)) {
            Ok(batch) => {
                let bytes: u64 = batch.iter().map(|f| f.data.len() as u64).sum();
                stats.rx_frames.fetch_add(batch.len() as u64, Ordering::Relaxed);
                stats.rx_bytes.fetch_add(bytes, Ordering::Relaxed);

                let capacity = interface.sub_interface_count();
                let unrouted = batch
                    .iter()
                    .filter(|f| f.sub_interface as usize >= capacity)
                    .count() as u64;
                if unrouted > 0 {
                    stats.unrouted.fetch_add(unrouted, Ordering::Relaxed);
                }

                let frames: Vec<RxFrame<'_>> = batch.iter().map(OwnedFrame::as_rx).collect();
                interface.pop_batch(&frames);
            }
            Err(RecvTimeoutError::Timeout) => {
                if !running.load(Ordering::Relaxed) {
                    break;
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    tracing::debug!("worker stopped");
    interface
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowgate_common::wire::{build_udp_frame, MacAddr};
    use std::net::Ipv4Addr;

    const PORT_MAC: MacAddr = MacAddr([1, 2, 3, 4, 5, 1]);
    const PORT_IP: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 1);
    const PEER_IP: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 2);

    fn configured_engine() -> Engine {
        let mut engine = Engine::new(EngineConfig {
            sub_interfaces: 4,
            ..Default::default()
        });
        let iface = engine.add_interface();
        engine
            .add_port(iface, 0, Port::new(PORT_MAC, PORT_IP))
            .unwrap();
        engine
            .register_flow(iface, 0, 0, FlowSelector::udp(PEER_IP, PORT_IP, 10, 10))
            .unwrap();
        engine
    }

    #[test]
    fn test_engine_lifecycle() {
        let mut engine = configured_engine();
        assert!(!engine.is_running());

        engine.start().unwrap();
        assert!(engine.is_running());
        assert!(matches!(engine.start(), Err(EngineError::AlreadyRunning)));

        engine.stop();
        assert!(!engine.is_running());
        assert!(engine.interface(0).is_some());
    }

    #[test]
    fn test_failed_start_unwind_restores_configuration() {
        let mut engine = configured_engine();
        engine.start().unwrap();

        // A worker is up; treat a second interface as one whose
        // worker never spawned.
        let stray = PhysicalInterface::with_capacity(4);
        engine.unwind_failed_start(std::iter::once(stray));

        assert!(!engine.is_running());
        assert_eq!(engine.interfaces.len(), 2);

        // The spawned interface came back first, flows intact.
        let port = engine
            .interface(0)
            .unwrap()
            .sub_interface(0)
            .unwrap()
            .port(0)
            .unwrap();
        assert_eq!(port.flow_table().len(), 1);

        // The engine is restartable after the unwind.
        engine.start().unwrap();
        assert!(engine.is_running());
        engine.stop();
        assert_eq!(engine.interfaces.len(), 2);
    }

    #[test]
    fn test_registration_refused_while_running() {
        let mut engine = configured_engine();
        engine.start().unwrap();
        assert!(matches!(
            engine.register_flow(0, 0, 0, FlowSelector::udp(PEER_IP, PORT_IP, 20, 20)),
            Err(EngineError::AlreadyRunning)
        ));
        engine.stop();

        engine
            .register_flow(0, 0, 0, FlowSelector::udp(PEER_IP, PORT_IP, 20, 20))
            .unwrap();
    }

    #[test]
    fn test_unknown_target_rejected() {
        let mut engine = configured_engine();
        assert!(matches!(
            engine.register_flow(0, 9, 0, FlowSelector::udp(PEER_IP, PORT_IP, 20, 20)),
            Err(EngineError::UnknownTarget { .. })
        ));
        assert!(matches!(
            engine.register_flow(0, 0, 3, FlowSelector::udp(PEER_IP, PORT_IP, 20, 20)),
            Err(EngineError::UnknownTarget { .. })
        ));
    }

    #[test]
    fn test_dispatch_through_worker() {
        let mut engine = configured_engine();
        engine.start().unwrap();

        let frames: Vec<OwnedFrame> = (0..50)
            .map(|_| {
                OwnedFrame::new(build_udp_frame(PORT_MAC, PEER_IP, PORT_IP, 10, 10), 0)
            })
            .collect();
        assert!(engine.inject(0, frames).unwrap());

        // One frame with a tag past the configured capacity.
        let stray = OwnedFrame::new(build_udp_frame(PORT_MAC, PEER_IP, PORT_IP, 10, 10), 9);
        assert!(engine.inject(0, vec![stray]).unwrap());

        engine.stop();

        let stats = engine.stats();
        assert_eq!(stats.rx_frames, 51);
        assert_eq!(stats.unrouted, 1);

        let port = engine
            .interface(0)
            .unwrap()
            .sub_interface(0)
            .unwrap()
            .port(0)
            .unwrap();
        assert_eq!(port.stats().unicast, 50);
        assert_eq!(port.stats().accepted, 50);
    }

    #[test]
    fn test_inject_requires_running() {
        let engine = configured_engine();
        assert!(matches!(
            engine.inject(0, Vec::new()),
            Err(EngineError::NotRunning)
        ));
    }
}
