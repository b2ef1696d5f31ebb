//! Download engine - starts, tracks and cancels transfer sessions

use crate::engine::events::{Notifier, TransferCallbacks};
use crate::engine::throttle::Throttle;
use crate::engine::transport::{HttpTransport, Transport};
use crate::engine::worker::{SessionShared, TransferWorker};
use crate::error::TickloadError;
use crate::scheduler::TaskScheduler;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::JoinHandle;
use tickload_types::{DownloadSession, EngineConfig};
use tracing::{info, warn};
use url::Url;
use uuid::Uuid;

/// Handle to a transfer started by [`DownloadEngine::start_download`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionHandle(Uuid);

impl SessionHandle {
    pub fn id(&self) -> Uuid {
        self.0
    }
}

impl std::fmt::Display for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

struct SessionEntry {
    shared: Arc<SessionShared>,
    worker: Option<JoinHandle<()>>,
}

/// Resumable HTTP downloads, one worker thread per session.
///
/// Progress, completion, failure and cancellation reach the caller only
/// through the scheduler, so callbacks run on the thread that ticks it.
pub struct DownloadEngine {
    scheduler: Arc<TaskScheduler>,
    transport: Arc<dyn Transport>,
    config: EngineConfig,
    sessions: Mutex<HashMap<Uuid, SessionEntry>>,
}

impl DownloadEngine {
    /// Create an engine that downloads over HTTP.
    ///
    /// Must not be called from inside a tokio runtime.
    pub fn new(scheduler: Arc<TaskScheduler>, config: EngineConfig) -> Result<Self, TickloadError> {
        let transport = HttpTransport::new(&config)?;
        Ok(Self::with_transport(scheduler, Arc::new(transport), config))
    }

    pub fn with_transport(
        scheduler: Arc<TaskScheduler>,
        transport: Arc<dyn Transport>,
        config: EngineConfig,
    ) -> Self {
        Self {
            scheduler,
            transport,
            config,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn scheduler(&self) -> &Arc<TaskScheduler> {
        &self.scheduler
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Start or resume downloading `url` into `destination`.
    ///
    /// Returns as soon as the worker thread is running. An existing file at
    /// `destination` is treated as the already-downloaded prefix.
    pub fn start_download(
        &self,
        url: &str,
        destination: impl Into<PathBuf>,
        callbacks: TransferCallbacks,
    ) -> Result<SessionHandle, TickloadError> {
        let parsed =
            Url::parse(url).map_err(|e| TickloadError::InvalidUrl(format!("{}: {}", url, e)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(TickloadError::InvalidUrl(format!(
                "{}: unsupported scheme {}",
                url,
                parsed.scheme()
            )));
        }

        let destination: PathBuf = destination.into();
        let destination = destination_key(&destination);
        let mut sessions = self.sessions.lock();

        if let Some(active) = sessions.values().find(|entry| {
            entry.shared.state().is_active()
                && entry.shared.record.read().destination == destination
        }) {
            warn!("Transfer to {} already in progress", destination.display());
            return Err(TickloadError::AlreadyInProgress(active.shared.id));
        }

        let session = DownloadSession::new(parsed.to_string(), destination);
        let id = session.id;
        let shared = Arc::new(SessionShared::new(session));

        let worker = TransferWorker {
            shared: Arc::clone(&shared),
            transport: Arc::clone(&self.transport),
            notifier: Notifier::new(Arc::clone(&self.scheduler), callbacks, id),
            throttle: Throttle::from_limit(self.config.speed_limit),
            chunk_size: self.config.chunk_size,
            sync_writes: self.config.sync_writes,
        };

        let thread = std::thread::Builder::new()
            .name(format!("tickload-{}", id.simple()))
            .spawn(move || worker.run())?;

        info!("Started transfer {} for {}", id, url);
        sessions.insert(
            id,
            SessionEntry {
                shared,
                worker: Some(thread),
            },
        );

        Ok(SessionHandle(id))
    }

    /// Ask a transfer to stop at the next chunk boundary
    pub fn cancel(&self, handle: SessionHandle) -> Result<(), TickloadError> {
        let sessions = self.sessions.lock();
        let entry = sessions
            .get(&handle.0)
            .ok_or(TickloadError::NotFound(handle.0))?;

        entry.shared.request_cancel();
        info!("Signaled cancel for transfer {}", handle);
        Ok(())
    }

    pub fn session(&self, handle: SessionHandle) -> Option<DownloadSession> {
        self.sessions
            .lock()
            .get(&handle.0)
            .map(|entry| entry.shared.snapshot())
    }

    /// Every known session, oldest first
    pub fn sessions(&self) -> Vec<DownloadSession> {
        let mut all: Vec<DownloadSession> = self
            .sessions
            .lock()
            .values()
            .map(|entry| entry.shared.snapshot())
            .collect();
        all.sort_by_key(|s| s.started_at);
        all
    }

    pub fn is_active(&self, handle: SessionHandle) -> bool {
        self.sessions
            .lock()
            .get(&handle.0)
            .map(|entry| entry.shared.state().is_active())
            .unwrap_or(false)
    }

    /// Number of sessions still probing or downloading
    pub fn active_count(&self) -> usize {
        self.sessions
            .lock()
            .values()
            .filter(|entry| entry.shared.state().is_active())
            .count()
    }

    /// Block until the transfer's worker has exited and return its final state.
    ///
    /// Terminal notifications are still pending on the scheduler afterwards.
    pub fn wait(&self, handle: SessionHandle) -> Result<DownloadSession, TickloadError> {
        let (shared, worker) = {
            let mut sessions = self.sessions.lock();
            let entry = sessions
                .get_mut(&handle.0)
                .ok_or(TickloadError::NotFound(handle.0))?;
            (Arc::clone(&entry.shared), entry.worker.take())
        };

        if let Some(worker) = worker {
            join_worker(&shared, worker);
        }
        Ok(shared.snapshot())
    }

    /// Cancel every active transfer and wait for the workers to exit
    pub fn shutdown(&self) {
        let workers: Vec<_> = {
            let mut sessions = self.sessions.lock();
            sessions
                .values_mut()
                .filter_map(|entry| {
                    entry.shared.request_cancel();
                    entry
                        .worker
                        .take()
                        .map(|worker| (Arc::clone(&entry.shared), worker))
                })
                .collect()
        };

        info!("Shutting down download engine ({} workers)", workers.len());
        for (shared, worker) in workers {
            join_worker(&shared, worker);
        }
    }
}

/// Absolute form of `path` used to detect two sessions writing one file.
/// The parent directory is resolved when it exists, so `./out.bin` and
/// `sub/../out.bin` name the same destination as `out.bin`.
fn destination_key(path: &Path) -> PathBuf {
    let absolute = match std::env::current_dir() {
        Ok(cwd) if path.is_relative() => cwd.join(path),
        _ => path.to_path_buf(),
    };
    let (Some(parent), Some(name)) = (absolute.parent(), absolute.file_name()) else {
        return absolute;
    };
    match std::fs::canonicalize(parent) {
        Ok(parent) => parent.join(name),
        Err(_) => absolute,
    }
}

fn join_worker(shared: &SessionShared, worker: JoinHandle<()>) {
    if worker.join().is_err() {
        warn!("Worker for transfer {} panicked", shared.id);
        let mut record = shared.record.write();
        if record.transition(tickload_types::SessionState::Failed) {
            record.error = Some("worker thread panicked".to_string());
        }
    }
}

impl Drop for DownloadEngine {
    fn drop(&mut self) {
        // Workers are detached, not joined; they stop at their next chunk
        for entry in self.sessions.get_mut().values() {
            if entry.shared.state().is_active() {
                entry.shared.request_cancel();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::transport::RangeBody;
    use std::io::Read;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::mpsc::{self, Receiver, Sender};
    use tempfile::TempDir;
    use tickload_types::SessionState;

    const URL: &str = "http://files.test/resource.bin";

    fn resource(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    /// Pauses the body before the `at`-th read until released
    struct Gate {
        at: usize,
        reached: Sender<()>,
        release: Receiver<()>,
    }

    struct MemoryReader {
        data: Arc<Vec<u8>>,
        pos: usize,
        end: usize,
        read_size: usize,
        reads: usize,
        served: Arc<AtomicU64>,
        gate: Option<Gate>,
    }

    impl Read for MemoryReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if let Some(gate) = &self.gate {
                if gate.at == self.reads {
                    let _ = gate.reached.send(());
                    let _ = gate.release.recv();
                }
            }
            self.reads += 1;
            let n = self.read_size.min(buf.len()).min(self.end - self.pos);
            buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
            self.pos += n;
            self.served.fetch_add(n as u64, Ordering::SeqCst);
            Ok(n)
        }
    }

    struct MemoryTransport {
        data: Arc<Vec<u8>>,
        honor_range: bool,
        fail_probe: bool,
        body_limit: Option<usize>,
        read_size: usize,
        requests: Mutex<Vec<u64>>,
        served: Arc<AtomicU64>,
        gate: Mutex<Option<Gate>>,
    }

    impl MemoryTransport {
        fn new(data: Vec<u8>) -> Self {
            Self {
                data: Arc::new(data),
                honor_range: true,
                fail_probe: false,
                body_limit: None,
                read_size: 10,
                requests: Mutex::new(Vec::new()),
                served: Arc::new(AtomicU64::new(0)),
                gate: Mutex::new(None),
            }
        }

        /// Returns (reached, release) ends for the test side
        fn gated(mut self, at: usize) -> (Self, Receiver<()>, Sender<()>) {
            let (reached_tx, reached_rx) = mpsc::channel();
            let (release_tx, release_rx) = mpsc::channel();
            self.gate = Mutex::new(Some(Gate {
                at,
                reached: reached_tx,
                release: release_rx,
            }));
            (self, reached_rx, release_tx)
        }
    }

    impl Transport for MemoryTransport {
        fn probe(&self, _url: &str) -> Result<u64, TickloadError> {
            if self.fail_probe {
                return Err(TickloadError::ServerError {
                    status: 503,
                    message: "Service Unavailable".into(),
                });
            }
            Ok(self.data.len() as u64)
        }

        fn open_range(&self, _url: &str, offset: u64) -> Result<RangeBody, TickloadError> {
            self.requests.lock().push(offset);
            let start = if self.honor_range { offset as usize } else { 0 };
            let end = self.body_limit.unwrap_or(self.data.len());
            Ok(RangeBody {
                start: start as u64,
                reader: Box::new(MemoryReader {
                    data: Arc::clone(&self.data),
                    pos: start,
                    end,
                    read_size: self.read_size,
                    reads: 0,
                    served: Arc::clone(&self.served),
                    gate: self.gate.lock().take(),
                }),
            })
        }
    }

    fn test_config() -> EngineConfig {
        EngineConfig {
            chunk_size: 10,
            sync_writes: false,
            ..EngineConfig::default()
        }
    }

    fn engine_with(transport: Arc<MemoryTransport>) -> (DownloadEngine, Arc<TaskScheduler>) {
        let scheduler = Arc::new(TaskScheduler::new());
        let engine = DownloadEngine::with_transport(Arc::clone(&scheduler), transport, test_config());
        (engine, scheduler)
    }

    #[test]
    fn fresh_download_writes_whole_resource() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("nested").join("out.bin");
        let transport = Arc::new(MemoryTransport::new(resource(100)));
        let (engine, _) = engine_with(Arc::clone(&transport));

        let handle = engine
            .start_download(URL, &dest, TransferCallbacks::new())
            .unwrap();
        let session = engine.wait(handle).unwrap();

        assert_eq!(session.state, SessionState::Completed);
        assert_eq!(session.written_bytes, 100);
        assert_eq!(session.total_size, Some(100));
        assert_eq!(session.resumed_from, 0);
        assert!(session.finished_at.is_some());
        assert_eq!(std::fs::read(&dest).unwrap(), resource(100));
        assert_eq!(*transport.requests.lock(), vec![0]);
    }

    #[test]
    fn resume_requests_only_the_missing_range() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("out.bin");
        std::fs::write(&dest, &resource(100)[..40]).unwrap();
        let transport = Arc::new(MemoryTransport::new(resource(100)));
        let (engine, _) = engine_with(Arc::clone(&transport));

        let handle = engine
            .start_download(URL, &dest, TransferCallbacks::new())
            .unwrap();
        let session = engine.wait(handle).unwrap();

        assert_eq!(session.state, SessionState::Completed);
        assert_eq!(session.resumed_from, 40);
        assert_eq!(*transport.requests.lock(), vec![40]);
        assert_eq!(transport.served.load(Ordering::SeqCst), 60);
        assert_eq!(std::fs::read(&dest).unwrap(), resource(100));
    }

    #[test]
    fn complete_file_skips_the_request() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("out.bin");
        std::fs::write(&dest, resource(100)).unwrap();
        let transport = Arc::new(MemoryTransport::new(resource(100)));
        let (engine, scheduler) = engine_with(Arc::clone(&transport));

        let completed = Arc::new(AtomicU64::new(0));
        let hits = Arc::clone(&completed);
        let callbacks = TransferCallbacks::new().on_complete(move || {
            hits.fetch_add(1, Ordering::SeqCst);
        });
        let handle = engine.start_download(URL, &dest, callbacks).unwrap();
        let session = engine.wait(handle).unwrap();

        assert_eq!(session.state, SessionState::Completed);
        assert_eq!(session.written_bytes, 100);
        assert!(transport.requests.lock().is_empty());

        scheduler.tick(0.016, 0.016);
        scheduler.tick(0.016, 0.016);
        assert_eq!(completed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn oversized_file_is_truncated_to_total() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("out.bin");
        let mut existing = resource(100);
        existing.extend_from_slice(&[0xff; 20]);
        std::fs::write(&dest, existing).unwrap();
        let transport = Arc::new(MemoryTransport::new(resource(100)));
        let (engine, _) = engine_with(Arc::clone(&transport));

        let handle = engine
            .start_download(URL, &dest, TransferCallbacks::new())
            .unwrap();
        let session = engine.wait(handle).unwrap();

        assert_eq!(session.state, SessionState::Completed);
        assert!(transport.requests.lock().is_empty());
        assert_eq!(std::fs::read(&dest).unwrap(), resource(100));
    }

    #[test]
    fn cancellation_stops_on_a_chunk_boundary() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("out.bin");
        let (transport, reached, release) = MemoryTransport::new(resource(100)).gated(3);
        let (engine, scheduler) = engine_with(Arc::new(transport));

        let cancelled = Arc::new(AtomicU64::new(0));
        let hits = Arc::clone(&cancelled);
        let callbacks = TransferCallbacks::new().on_cancelled(move || {
            hits.fetch_add(1, Ordering::SeqCst);
        });
        let handle = engine.start_download(URL, &dest, callbacks).unwrap();

        // Three chunks written, fourth read is held
        reached.recv().unwrap();
        engine.cancel(handle).unwrap();
        release.send(()).unwrap();
        let session = engine.wait(handle).unwrap();

        assert_eq!(session.state, SessionState::Cancelled);
        assert_eq!(session.written_bytes, 30);
        let on_disk = std::fs::read(&dest).unwrap();
        assert_eq!(on_disk, &resource(100)[..30]);

        scheduler.tick(0.016, 0.016);
        assert_eq!(cancelled.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn cancelled_file_resumes_to_completion() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("out.bin");
        let (transport, reached, release) = MemoryTransport::new(resource(100)).gated(5);
        let (engine, _) = engine_with(Arc::new(transport));

        let first = engine
            .start_download(URL, &dest, TransferCallbacks::new())
            .unwrap();
        reached.recv().unwrap();
        engine.cancel(first).unwrap();
        release.send(()).unwrap();
        assert_eq!(engine.wait(first).unwrap().written_bytes, 50);

        let second = engine
            .start_download(URL, &dest, TransferCallbacks::new())
            .unwrap();
        let session = engine.wait(second).unwrap();
        assert_eq!(session.resumed_from, 50);
        assert_eq!(std::fs::read(&dest).unwrap(), resource(100));
    }

    #[test]
    fn probe_failure_fails_without_a_request() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("out.bin");
        let mut transport = MemoryTransport::new(resource(100));
        transport.fail_probe = true;
        let transport = Arc::new(transport);
        let (engine, scheduler) = engine_with(Arc::clone(&transport));

        let errors = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&errors);
        let callbacks =
            TransferCallbacks::new().on_failed(move |e| sink.lock().push(e.to_string()));
        let handle = engine.start_download(URL, &dest, callbacks).unwrap();
        let session = engine.wait(handle).unwrap();

        assert_eq!(session.state, SessionState::Failed);
        assert!(session.error.as_deref().unwrap().contains("503"));
        assert!(transport.requests.lock().is_empty());

        scheduler.tick(0.016, 0.016);
        assert_eq!(errors.lock().len(), 1);
        assert!(errors.lock()[0].contains("503"));
    }

    #[test]
    fn server_ignoring_range_still_resumes_correctly() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("out.bin");
        std::fs::write(&dest, &resource(100)[..45]).unwrap();
        let mut transport = MemoryTransport::new(resource(100));
        transport.honor_range = false;
        let (engine, _) = engine_with(Arc::new(transport));

        let handle = engine
            .start_download(URL, &dest, TransferCallbacks::new())
            .unwrap();
        let session = engine.wait(handle).unwrap();

        assert_eq!(session.state, SessionState::Completed);
        assert_eq!(std::fs::read(&dest).unwrap(), resource(100));
    }

    #[test]
    fn short_body_fails_and_keeps_prefix() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("out.bin");
        let mut transport = MemoryTransport::new(resource(100));
        transport.body_limit = Some(70);
        let (engine, _) = engine_with(Arc::new(transport));

        let handle = engine
            .start_download(URL, &dest, TransferCallbacks::new())
            .unwrap();
        let session = engine.wait(handle).unwrap();

        assert_eq!(session.state, SessionState::Failed);
        assert_eq!(session.written_bytes, 70);
        assert_eq!(std::fs::read(&dest).unwrap(), &resource(100)[..70]);
    }

    #[test]
    fn second_start_for_active_destination_is_rejected() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("out.bin");
        let (transport, reached, release) = MemoryTransport::new(resource(100)).gated(0);
        let (engine, _) = engine_with(Arc::new(transport));

        let first = engine
            .start_download(URL, &dest, TransferCallbacks::new())
            .unwrap();
        reached.recv().unwrap();

        let err = engine
            .start_download(URL, &dest, TransferCallbacks::new())
            .unwrap_err();
        assert!(matches!(err, TickloadError::AlreadyInProgress(id) if id == first.id()));
        assert_eq!(engine.active_count(), 1);

        release.send(()).unwrap();
        assert_eq!(engine.wait(first).unwrap().state, SessionState::Completed);
        assert!(!engine.is_active(first));
    }

    #[test]
    fn equivalent_destination_spellings_are_one_transfer() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        let dest = dir.path().join("out.bin");
        let (transport, reached, release) = MemoryTransport::new(resource(100)).gated(0);
        let (engine, _) = engine_with(Arc::new(transport));

        let first = engine
            .start_download(URL, &dest, TransferCallbacks::new())
            .unwrap();
        reached.recv().unwrap();

        for alias in [
            dir.path().join(".").join("out.bin"),
            dir.path().join("sub").join("..").join("out.bin"),
        ] {
            let err = engine
                .start_download(URL, &alias, TransferCallbacks::new())
                .unwrap_err();
            assert!(matches!(err, TickloadError::AlreadyInProgress(id) if id == first.id()));
        }
        assert_eq!(engine.sessions().len(), 1);

        release.send(()).unwrap();
        assert_eq!(engine.wait(first).unwrap().state, SessionState::Completed);
        assert_eq!(std::fs::read(&dest).unwrap(), resource(100));
    }

    #[test]
    fn host_loop_sees_completion_once_inactive() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("out.bin");
        std::fs::write(&dest, resource(100)).unwrap();
        let (engine, scheduler) = engine_with(Arc::new(MemoryTransport::new(resource(100))));

        // The loop a host runs: tick while active, then one more tick
        for round in 0..200 {
            let completed = Arc::new(AtomicU64::new(0));
            let hits = Arc::clone(&completed);
            let callbacks = TransferCallbacks::new().on_complete(move || {
                hits.fetch_add(1, Ordering::SeqCst);
            });
            let handle = engine.start_download(URL, &dest, callbacks).unwrap();
            while engine.is_active(handle) {
                scheduler.tick(0.016, 0.016);
                std::thread::yield_now();
            }
            scheduler.tick(0.016, 0.016);

            assert_eq!(completed.load(Ordering::SeqCst), 1, "round {}", round);
            engine.wait(handle).unwrap();
        }
        assert!(scheduler.is_empty());
    }

    #[test]
    fn rejects_invalid_urls() {
        let (engine, _) = engine_with(Arc::new(MemoryTransport::new(resource(10))));
        for url in ["not a url", "ftp://files.test/a.bin"] {
            let err = engine
                .start_download(url, "out.bin", TransferCallbacks::new())
                .unwrap_err();
            assert!(matches!(err, TickloadError::InvalidUrl(_)));
        }
        assert!(engine.sessions().is_empty());
    }

    #[test]
    fn cancel_unknown_session_is_not_found() {
        let (engine, _) = engine_with(Arc::new(MemoryTransport::new(resource(10))));
        let handle = SessionHandle(Uuid::new_v4());
        assert!(matches!(
            engine.cancel(handle),
            Err(TickloadError::NotFound(_))
        ));
        assert!(engine.session(handle).is_none());
    }

    #[test]
    fn finished_transfer_delivers_single_full_progress() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("out.bin");
        let (engine, scheduler) = engine_with(Arc::new(MemoryTransport::new(resource(100))));

        let log = Arc::new(Mutex::new(Vec::new()));
        let (progress_log, complete_log) = (Arc::clone(&log), Arc::clone(&log));
        let callbacks = TransferCallbacks::new()
            .on_progress(move |p| progress_log.lock().push(format!("{:.2}", p)))
            .on_complete(move || complete_log.lock().push("done".to_string()));
        let handle = engine.start_download(URL, &dest, callbacks).unwrap();
        engine.wait(handle).unwrap();

        // Every chunk-level progress task was replaced by the completion task
        scheduler.tick(0.016, 0.016);
        assert_eq!(*log.lock(), vec!["1.00", "done"]);

        scheduler.tick(0.016, 0.016);
        assert_eq!(log.lock().len(), 2);
        assert!(scheduler.is_empty());
    }

    #[test]
    fn shutdown_cancels_and_joins_workers() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("out.bin");
        let (transport, reached, release) = MemoryTransport::new(resource(100)).gated(2);
        let (engine, _) = engine_with(Arc::new(transport));

        let handle = engine
            .start_download(URL, &dest, TransferCallbacks::new())
            .unwrap();
        reached.recv().unwrap();
        release.send(()).unwrap();
        engine.shutdown();

        let session = engine.session(handle).unwrap();
        assert!(session.state.is_terminal());
        assert_eq!(engine.active_count(), 0);
    }
}
