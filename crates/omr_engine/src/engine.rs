use std::path::PathBuf;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use omr_core::{ArtifactKind, BatchStore, GroupKey, TraversalId};
use omr_logging::{omr_debug, omr_info, omr_warn};

use crate::{
    artifact_filename, ArtifactError, AtomicFileWriter, BatchSubmitter, CollectSettings,
    EngineEvent, EvaluationService, PersistError, ReqwestService, ResultCache, ServiceError,
    ServiceSettings, TreeCollector,
};

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub service: ServiceSettings,
    pub collect: CollectSettings,
    /// Where downloaded CSV and zip artifacts are written.
    pub download_dir: PathBuf,
}

impl EngineConfig {
    pub fn default_with_download_dir(download_dir: PathBuf) -> Self {
        Self {
            service: ServiceSettings::default(),
            collect: CollectSettings::default(),
            download_dir,
        }
    }
}

enum EngineCommand {
    Collect {
        traversal_id: TraversalId,
        paths: Vec<PathBuf>,
    },
    Submit {
        batch: BatchStore,
    },
    LoadSummary,
    LoadGroup {
        key: GroupKey,
    },
    SetVisible {
        key: GroupKey,
        visible: bool,
    },
    Download {
        key: GroupKey,
        kind: ArtifactKind,
    },
}

/// Everything a command task may touch. Shared by all tasks of one engine.
struct Workers {
    collector: TreeCollector,
    submitter: BatchSubmitter,
    cache: ResultCache,
    service: Arc<dyn EvaluationService>,
    writer: AtomicFileWriter,
}

/// Owns the engine thread. Commands go in over one channel, events come back
/// over another; the host never blocks on IO.
///
/// Clones share both channels, so each event is received by exactly one clone.
/// The engine thread stops once every handle is dropped.
#[derive(Clone)]
pub struct EngineHandle {
    cmd_tx: mpsc::Sender<EngineCommand>,
    events: EngineEvents,
}

/// Receiving end of an engine's events, detached from its command channel.
///
/// Holding one does not keep the engine running: after the last
/// [`EngineHandle`] is dropped and in-flight work is cancelled, receives
/// report [`RecvTimeoutError::Disconnected`].
#[derive(Clone)]
pub struct EngineEvents {
    rx: Arc<Mutex<mpsc::Receiver<EngineEvent>>>,
}

impl EngineEvents {
    pub fn try_recv(&self) -> Option<EngineEvent> {
        self.lock().try_recv().ok()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Result<EngineEvent, RecvTimeoutError> {
        self.lock().recv_timeout(timeout)
    }

    fn lock(&self) -> MutexGuard<'_, mpsc::Receiver<EngineEvent>> {
        self.rx.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl EngineHandle {
    pub fn new(config: EngineConfig) -> Result<Self, ServiceError> {
        let service = ReqwestService::new(config.service.clone())?;
        omr_info!("engine using service at {}", service.settings().base_url);
        Ok(Self::with_service(config, Arc::new(service)))
    }

    /// Runs the engine against any service implementation.
    pub fn with_service(config: EngineConfig, service: Arc<dyn EvaluationService>) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel();
        let (event_tx, event_rx) = mpsc::channel();
        let workers = Arc::new(Workers {
            collector: TreeCollector::new(config.collect),
            submitter: BatchSubmitter::new(Arc::clone(&service)),
            cache: ResultCache::new(Arc::clone(&service)),
            service,
            writer: AtomicFileWriter::new(config.download_dir),
        });

        thread::spawn(move || {
            let runtime = tokio::runtime::Runtime::new().expect("tokio runtime");
            while let Ok(command) = cmd_rx.recv() {
                let workers = Arc::clone(&workers);
                let event_tx = event_tx.clone();
                runtime.spawn(async move {
                    handle_command(&workers, command, event_tx).await;
                });
            }
            omr_debug!("engine thread: all handles dropped, shutting down");
        });

        Self {
            cmd_tx,
            events: EngineEvents {
                rx: Arc::new(Mutex::new(event_rx)),
            },
        }
    }

    pub fn collect(&self, traversal_id: TraversalId, paths: Vec<PathBuf>) {
        self.send(EngineCommand::Collect {
            traversal_id,
            paths,
        });
    }

    pub fn submit(&self, batch: BatchStore) {
        self.send(EngineCommand::Submit { batch });
    }

    pub fn load_summary(&self) {
        self.send(EngineCommand::LoadSummary);
    }

    pub fn load_group(&self, key: GroupKey) {
        self.send(EngineCommand::LoadGroup { key });
    }

    pub fn set_visible(&self, key: GroupKey, visible: bool) {
        self.send(EngineCommand::SetVisible { key, visible });
    }

    pub fn download(&self, key: GroupKey, kind: ArtifactKind) {
        self.send(EngineCommand::Download { key, kind });
    }

    pub fn try_recv(&self) -> Option<EngineEvent> {
        self.events.try_recv()
    }

    /// A receiver for this engine's events that does not keep the engine alive.
    pub fn events(&self) -> EngineEvents {
        self.events.clone()
    }

    fn send(&self, command: EngineCommand) {
        if self.cmd_tx.send(command).is_err() {
            omr_warn!("engine thread has stopped; command dropped");
        }
    }
}

async fn handle_command(
    workers: &Workers,
    command: EngineCommand,
    event_tx: mpsc::Sender<EngineEvent>,
) {
    let event = match command {
        EngineCommand::Collect {
            traversal_id,
            paths,
        } => {
            omr_debug!("collect {}: {} dropped paths", traversal_id, paths.len());
            let outcome = workers.collector.collect_paths(&paths).await;
            EngineEvent::TraversalCompleted {
                traversal_id,
                outcome,
            }
        }
        EngineCommand::Submit { batch } => {
            EngineEvent::SubmissionCompleted(workers.submitter.submit(&batch).await)
        }
        EngineCommand::LoadSummary => {
            let result = workers.service.fetch_summary().await;
            if let Err(err) = &result {
                omr_warn!("results overview failed: {}", err);
            }
            EngineEvent::SummaryLoaded(result)
        }
        EngineCommand::LoadGroup { key } => {
            let result = workers.cache.ensure_loaded(&key).await;
            EngineEvent::GroupLoaded { key, result }
        }
        EngineCommand::SetVisible { key, visible } => {
            workers.cache.set_visible(&key, visible);
            return;
        }
        EngineCommand::Download { key, kind } => {
            let result = save_artifact(workers, &key, &kind).await;
            match &result {
                Ok(path) => omr_info!("saved {} for {} to {}", kind, key, path.display()),
                Err(err) => omr_warn!("{} for {} not saved: {}", kind, key, err),
            }
            EngineEvent::ArtifactSaved { key, kind, result }
        }
    };
    let _ = event_tx.send(event);
}

async fn save_artifact(
    workers: &Workers,
    key: &GroupKey,
    kind: &ArtifactKind,
) -> Result<PathBuf, ArtifactError> {
    let content = workers.service.download_artifact(key, kind).await?;
    let writer = workers.writer.clone();
    let filename = artifact_filename(key, kind);
    let path = tokio::task::spawn_blocking(move || writer.write(&filename, &content))
        .await
        .map_err(|err| PersistError::Io(std::io::Error::other(err)))??;
    Ok(path)
}
