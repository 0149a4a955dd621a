//! Primary accept loop, worker pool, and supervision.

use std::net::{SocketAddr, TcpListener, TcpStream};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex, RwLock};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use super::{ClusterConfig, ClusterError, MemoryMonitor, TlsConfig};

/// Connection handler supplied by the embedding application. Runs inside a
/// worker and owns the socket from the moment of handoff; HTTP (and TLS, if
/// configured) are parsed here, never in the primary.
pub type ConnHandler = dyn Fn(&WorkerContext, TcpStream) + Send + Sync;

/// Per-worker context handed to the connection handler.
#[derive(Debug, Clone)]
pub struct WorkerContext {
    pub index: usize,
    pub tls: Option<TlsConfig>,
}

enum WorkerMsg {
    Conn(TcpStream),
    Shutdown,
}

enum Event {
    Ready(usize),
    Exited(usize),
    Shutdown,
}

struct Workers {
    senders: RwLock<Vec<Sender<WorkerMsg>>>,
    joins: Mutex<Vec<Option<JoinHandle<()>>>>,
}

/// A validated cluster, ready to start.
pub struct Cluster {
    config: ClusterConfig,
    handler: Arc<ConnHandler>,
}

impl Cluster {
    /// Validate the topology and build the cluster. Fails fast when the
    /// worker count exceeds available cores.
    pub fn new(config: ClusterConfig, handler: Arc<ConnHandler>) -> Result<Self, ClusterError> {
        config.validate()?;
        Ok(Self { config, handler })
    }

    /// Bind the listener, spawn the workers, and return a handle. A fatal
    /// listener error at bind time surfaces here; after that the cluster
    /// runs until shutdown.
    pub fn start(self) -> Result<ClusterHandle, ClusterError> {
        let config = Arc::new(self.config);
        let listener = TcpListener::bind((config.host.as_str(), config.port))?;
        let addr = listener.local_addr()?;
        info!(
            %addr,
            workers = config.workers,
            strategy = ?config.strategy,
            "cluster listening"
        );

        let workers = Arc::new(Workers {
            senders: RwLock::new(Vec::with_capacity(config.workers)),
            joins: Mutex::new(Vec::new()),
        });
        {
            // Placeholder slots; spawn_worker installs the real channels.
            let mut senders = workers.senders.write().expect("worker slots poisoned");
            let mut joins = workers.joins.lock().expect("worker joins poisoned");
            for _ in 0..config.workers {
                let (tx, _rx) = mpsc::channel();
                senders.push(tx);
                joins.push(None);
            }
        }

        let shutting_down = Arc::new(AtomicBool::new(false));
        let (event_tx, event_rx) = mpsc::channel::<Event>();

        for index in 0..config.workers {
            spawn_worker(
                index,
                &config,
                &self.handler,
                &workers,
                event_tx.clone(),
            )?;
        }

        let accept = {
            let config = config.clone();
            let workers = workers.clone();
            let shutting_down = shutting_down.clone();
            let event_tx = event_tx.clone();
            std::thread::Builder::new()
                .name("turnpike-accept".to_string())
                .spawn(move || {
                    let counter = AtomicUsize::new(0);
                    for conn in listener.incoming() {
                        if shutting_down.load(Ordering::SeqCst) {
                            break;
                        }
                        match conn {
                            Ok(stream) => {
                                let peer = stream.peer_addr().ok().map(|a| a.ip());
                                let index = config.strategy.select(&counter, peer, config.workers);
                                let tx = {
                                    let senders =
                                        workers.senders.read().expect("worker slots poisoned");
                                    senders[index].clone()
                                };
                                debug!(worker = index, peer = ?peer, "routing connection");
                                if tx.send(WorkerMsg::Conn(stream)).is_err() {
                                    // Worker died between selection and handoff;
                                    // the connection is dropped, not failed over.
                                    warn!(worker = index, "dropping connection for dead worker");
                                }
                            }
                            Err(e) => {
                                error!(error = %e, "listener accept failed, shutting down");
                                let _ = event_tx.send(Event::Shutdown);
                                break;
                            }
                        }
                    }
                })
                .map_err(ClusterError::Listener)?
        };

        #[cfg(unix)]
        {
            let event_tx = event_tx.clone();
            if let Ok(mut signals) =
                signal_hook::iterator::Signals::new([signal_hook::consts::SIGINT])
            {
                std::thread::Builder::new()
                    .name("turnpike-signals".to_string())
                    .spawn(move || {
                        for _ in signals.forever() {
                            info!("SIGINT received, shutting cluster down");
                            if event_tx.send(Event::Shutdown).is_err() {
                                break;
                            }
                        }
                    })
                    .map_err(ClusterError::Listener)?;
            }
        }

        let supervisor = {
            let config = config.clone();
            let workers = workers.clone();
            let handler = self.handler.clone();
            let shutting_down = shutting_down.clone();
            let event_tx = event_tx.clone();
            std::thread::Builder::new()
                .name("turnpike-supervisor".to_string())
                .spawn(move || -> Result<(), ClusterError> {
                    let mut restart_log: Vec<Vec<Instant>> = vec![Vec::new(); config.workers];
                    while let Ok(event) = event_rx.recv() {
                        match event {
                            Event::Ready(index) => {
                                info!(worker = index, "worker ready");
                            }
                            Event::Exited(index) => {
                                let now = Instant::now();
                                let history = &mut restart_log[index];
                                history.retain(|at| now.duration_since(*at) < config.restart_window);
                                if history.len() >= config.max_restarts {
                                    error!(
                                        worker = index,
                                        restarts = history.len(),
                                        "worker crash loop, tripping circuit breaker"
                                    );
                                    let restarts = history.len();
                                    stop_cluster(&shutting_down, addr, &workers, &config);
                                    return Err(ClusterError::CrashLoop {
                                        index,
                                        restarts,
                                        window_secs: config.restart_window.as_secs(),
                                    });
                                }
                                let backoff = backoff_delay(history.len());
                                history.push(now);
                                warn!(
                                    worker = index,
                                    backoff_ms = backoff.as_millis() as u64,
                                    "worker exited, respawning"
                                );
                                // The backoff sleeps on its own thread so a
                                // queued Shutdown is not held up behind it.
                                let config = config.clone();
                                let handler = handler.clone();
                                let workers = workers.clone();
                                let event_tx = event_tx.clone();
                                let shutting_down = shutting_down.clone();
                                let scheduled = std::thread::Builder::new()
                                    .name(format!("turnpike-respawn-{index}"))
                                    .spawn(move || {
                                        std::thread::sleep(backoff);
                                        if shutting_down.load(Ordering::SeqCst) {
                                            return;
                                        }
                                        if let Err(e) = spawn_worker(
                                            index, &config, &handler, &workers, event_tx,
                                        ) {
                                            error!(worker = index, error = %e, "failed to respawn worker");
                                        }
                                    });
                                if let Err(e) = scheduled {
                                    error!(worker = index, error = %e, "failed to schedule worker respawn");
                                }
                            }
                            Event::Shutdown => {
                                stop_cluster(&shutting_down, addr, &workers, &config);
                                return Ok(());
                            }
                        }
                    }
                    Ok(())
                })
                .map_err(ClusterError::Listener)?
        };

        Ok(ClusterHandle {
            addr,
            event_tx,
            supervisor: Some(supervisor),
            accept: Some(accept),
        })
    }

    /// Start and block until shutdown (signal, fatal listener error, or
    /// crash-loop circuit breaker).
    pub fn run(self) -> Result<(), ClusterError> {
        self.start()?.join()
    }
}

/// Running-cluster handle: address, shutdown trigger, and join.
pub struct ClusterHandle {
    addr: SocketAddr,
    event_tx: Sender<Event>,
    supervisor: Option<JoinHandle<Result<(), ClusterError>>>,
    accept: Option<JoinHandle<()>>,
}

impl ClusterHandle {
    /// The bound listen address (useful when the port was 0).
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Request a graceful shutdown, same path as SIGINT.
    pub fn shutdown(&self) {
        let _ = self.event_tx.send(Event::Shutdown);
    }

    /// Wait for the cluster to stop.
    pub fn join(mut self) -> Result<(), ClusterError> {
        let result = match self.supervisor.take() {
            Some(handle) => match handle.join() {
                Ok(result) => result,
                Err(_) => {
                    error!("cluster supervisor panicked");
                    Ok(())
                }
            },
            None => Ok(()),
        };
        if let Some(accept) = self.accept.take() {
            let _ = accept.join();
        }
        result
    }
}

fn spawn_worker(
    index: usize,
    config: &Arc<ClusterConfig>,
    handler: &Arc<ConnHandler>,
    workers: &Arc<Workers>,
    event_tx: Sender<Event>,
) -> Result<(), ClusterError> {
    let (tx, rx) = mpsc::channel::<WorkerMsg>();
    let config = config.clone();
    let handler = handler.clone();
    let handle = std::thread::Builder::new()
        .name(format!("turnpike-worker-{index}"))
        .spawn(move || {
            let monitor = MemoryMonitor::spawn(
                index,
                config.memory_limit_bytes,
                config.memory_check_interval,
            );
            let _ = event_tx.send(Event::Ready(index));
            let ctx = WorkerContext {
                index,
                tls: config.tls.clone(),
            };
            let mut crashed = false;
            while let Ok(msg) = rx.recv() {
                match msg {
                    WorkerMsg::Conn(stream) => {
                        let result = std::panic::catch_unwind(AssertUnwindSafe(|| {
                            (handler)(&ctx, stream);
                        }));
                        if let Err(panic) = result {
                            error!(
                                worker = index,
                                panic = ?panic,
                                "connection handler panicked, terminating worker"
                            );
                            crashed = true;
                            break;
                        }
                    }
                    WorkerMsg::Shutdown => {
                        debug!(worker = index, "worker received shutdown");
                        break;
                    }
                }
            }
            monitor.stop();
            if crashed {
                let _ = event_tx.send(Event::Exited(index));
            }
        })
        .map_err(ClusterError::Listener)?;

    let mut senders = workers.senders.write().expect("worker slots poisoned");
    senders[index] = tx;
    let mut joins = workers.joins.lock().expect("worker joins poisoned");
    joins[index] = Some(handle);
    Ok(())
}

/// Exponential backoff between respawns of the same worker slot, capped.
fn backoff_delay(restarts_in_window: usize) -> Duration {
    let shift = restarts_in_window.min(5) as u32;
    Duration::from_millis(100)
        .saturating_mul(1 << shift)
        .min(Duration::from_secs(5))
}

fn stop_cluster(
    shutting_down: &AtomicBool,
    addr: SocketAddr,
    workers: &Workers,
    config: &ClusterConfig,
) {
    info!("broadcasting shutdown to workers");
    shutting_down.store(true, Ordering::SeqCst);
    // Wake the accept loop so it observes the flag.
    let _ = TcpStream::connect(addr);
    {
        let senders = workers.senders.read().expect("worker slots poisoned");
        for tx in senders.iter() {
            let _ = tx.send(WorkerMsg::Shutdown);
        }
    }
    let deadline = Instant::now() + config.shutdown_grace;
    let mut joins = workers.joins.lock().expect("worker joins poisoned");
    for (index, slot) in joins.iter_mut().enumerate() {
        let Some(handle) = slot.take() else { continue };
        while !handle.is_finished() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        if handle.is_finished() {
            let _ = handle.join();
        } else {
            // Grace period expired; abandon the worker rather than wait.
            warn!(worker = index, "worker did not drain within grace period");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_and_caps() {
        assert_eq!(backoff_delay(0), Duration::from_millis(100));
        assert_eq!(backoff_delay(1), Duration::from_millis(200));
        assert_eq!(backoff_delay(3), Duration::from_millis(800));
        assert_eq!(backoff_delay(10), Duration::from_millis(3200));
    }
}
