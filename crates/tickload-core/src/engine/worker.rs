//! Transfer worker - one blocking thread per session
//!
//! The destination file's length is the only checkpoint. Every chunk is
//! written whole (and synced when configured) before `written_bytes` moves,
//! so after a crash or cancellation the file is always a prefix of the
//! resource and a later session resumes from its length.

use crate::engine::events::Notifier;
use crate::engine::throttle::Throttle;
use crate::engine::transport::Transport;
use crate::error::TickloadError;
use parking_lot::RwLock;
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tickload_types::{DownloadSession, SessionState};
use tracing::{debug, error, info};
use uuid::Uuid;

/// State shared between a worker and the engine
pub(crate) struct SessionShared {
    pub(crate) id: Uuid,
    pub(crate) record: RwLock<DownloadSession>,
    pub(crate) cancel: AtomicBool,
}

impl SessionShared {
    pub(crate) fn new(session: DownloadSession) -> Self {
        Self {
            id: session.id,
            record: RwLock::new(session),
            cancel: AtomicBool::new(false),
        }
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Acquire)
    }

    pub(crate) fn request_cancel(&self) {
        self.cancel.store(true, Ordering::Release);
    }

    pub(crate) fn state(&self) -> SessionState {
        self.record.read().state
    }

    pub(crate) fn snapshot(&self) -> DownloadSession {
        self.record.read().clone()
    }
}

/// How a transfer ended without error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Completed,
    Cancelled,
}

pub(crate) struct TransferWorker {
    pub(crate) shared: Arc<SessionShared>,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) notifier: Notifier,
    pub(crate) throttle: Throttle,
    pub(crate) chunk_size: usize,
    pub(crate) sync_writes: bool,
}

impl TransferWorker {
    /// Run the transfer to a terminal state. Errors end as Failed and are
    /// reported through the scheduler, never returned.
    pub(crate) fn run(self) {
        let id = self.shared.id;
        match self.transfer() {
            Ok(Outcome::Completed) => {
                info!("Transfer {} completed", id);
                self.finish(SessionState::Completed, None, Notifier::completed);
            }
            Ok(Outcome::Cancelled) => {
                info!("Transfer {} cancelled", id);
                self.finish(SessionState::Cancelled, None, Notifier::cancelled);
            }
            Err(e) => {
                let message = e.to_string();
                error!("Transfer {} failed: {}", id, message);
                self.finish(SessionState::Failed, Some(message.clone()), |n| n.failed(message));
            }
        }
    }

    /// Publish the terminal state. The notification is registered while the
    /// record is still write-locked, so anyone who reads the terminal state
    /// will find it on the scheduler's next tick.
    fn finish(&self, state: SessionState, message: Option<String>, notify: impl FnOnce(&Notifier)) {
        let mut record = self.shared.record.write();
        if record.transition(state) {
            record.error = message;
        }
        notify(&self.notifier);
    }

    fn transfer(&self) -> Result<Outcome, TickloadError> {
        let (url, destination) = {
            let record = self.shared.record.read();
            (record.url.clone(), record.destination.clone())
        };

        if let Some(parent) = destination.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&destination)?;
        let existing = file.metadata()?.len();
        {
            let mut record = self.shared.record.write();
            record.resumed_from = existing;
            record.written_bytes = existing;
        }

        info!("Starting transfer {}: {} -> {}", self.shared.id, url, destination.display());

        let total = self.transport.probe(&url)?;
        self.shared.record.write().total_size = Some(total);
        debug!("Probed {}: {} bytes", url, total);

        if self.shared.is_cancelled() {
            return Ok(Outcome::Cancelled);
        }

        if existing >= total {
            if existing > total {
                info!("Truncating {} from {} to {} bytes", destination.display(), existing, total);
                file.set_len(total)?;
                self.persist(&file)?;
            }
            self.shared.record.write().written_bytes = total;
            info!("{} is already complete", destination.display());
            return Ok(Outcome::Completed);
        }

        if existing > 0 {
            info!("Resuming {} from byte {}", destination.display(), existing);
        }

        self.shared.record.write().transition(SessionState::Downloading);
        file.seek(SeekFrom::Start(existing))?;

        let body = self.transport.open_range(&url, existing)?;
        if body.start > existing {
            return Err(TickloadError::ServerError {
                status: 206,
                message: format!("range starts at {} instead of {}", body.start, existing),
            });
        }

        self.stream(&mut file, body.reader, existing - body.start, existing, total)
    }

    fn stream(
        &self,
        file: &mut File,
        mut reader: Box<dyn Read + Send>,
        mut skip: u64,
        mut written: u64,
        total: u64,
    ) -> Result<Outcome, TickloadError> {
        let mut buffer = vec![0u8; self.chunk_size.max(1)];

        while written < total {
            let read = match reader.read(&mut buffer) {
                Ok(0) => {
                    return Err(TickloadError::IncompleteBody {
                        expected: total,
                        received: written,
                    })
                }
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(TickloadError::Interrupted(e)),
            };

            let mut chunk = &buffer[..read];
            if skip > 0 {
                // Server sent the whole resource; drop what is already on disk
                let dropped = skip.min(chunk.len() as u64) as usize;
                skip -= dropped as u64;
                chunk = &chunk[dropped..];
                if chunk.is_empty() {
                    continue;
                }
            }
            let room = total - written;
            if chunk.len() as u64 > room {
                chunk = &chunk[..room as usize];
            }

            self.throttle.acquire(chunk.len() as u64);

            // Checked before the write so a cancelled file ends on a chunk boundary
            if self.shared.is_cancelled() {
                return Ok(Outcome::Cancelled);
            }

            file.write_all(chunk)?;
            self.persist(file)?;
            written += chunk.len() as u64;

            self.shared.record.write().written_bytes = written;
            self.notifier.progress((written as f64 / total as f64) as f32);
        }

        Ok(Outcome::Completed)
    }

    fn persist(&self, file: &File) -> Result<(), TickloadError> {
        if self.sync_writes {
            file.sync_data()?;
        }
        Ok(())
    }
}
