use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use omr_core::{Effect, Msg};
use omr_engine::{EngineEvent, EngineHandle};
use omr_logging::{omr_debug, omr_info, omr_warn};

/// Hands effects to the engine and turns engine events back into messages.
pub struct EffectRunner {
    engine: EngineHandle,
}

impl EffectRunner {
    pub fn new(engine: EngineHandle, msg_tx: mpsc::Sender<Msg>) -> Self {
        let runner = Self { engine };
        runner.spawn_event_loop(msg_tx);
        runner
    }

    pub fn enqueue(&self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::CollectFiles {
                    traversal_id,
                    paths,
                } => {
                    omr_info!("CollectFiles traversal_id={} roots={}", traversal_id, paths.len());
                    self.engine.collect(traversal_id, paths);
                }
                Effect::SubmitBatch { batch } => {
                    omr_info!("SubmitBatch files={}", batch.count());
                    self.engine.submit(batch);
                }
                Effect::LoadSummary => self.engine.load_summary(),
                Effect::LoadGroup { key } => {
                    omr_debug!("LoadGroup key={}", key);
                    self.engine.load_group(key);
                }
                Effect::GroupVisibility { key, visible } => self.engine.set_visible(key, visible),
                Effect::DownloadArtifact { key, kind } => {
                    omr_info!("DownloadArtifact key={} kind={}", key, kind);
                    self.engine.download(key, kind);
                }
            }
        }
    }

    // The loop holds only the event side, so dropping the runner stops the
    // engine thread, which in turn ends this loop.
    fn spawn_event_loop(&self, msg_tx: mpsc::Sender<Msg>) {
        let events = self.engine.events();
        thread::spawn(move || loop {
            match events.recv_timeout(Duration::from_millis(50)) {
                Ok(event) => {
                    if msg_tx.send(event_to_msg(event)).is_err() {
                        break;
                    }
                }
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => {
                    omr_debug!("engine stopped; event loop exiting");
                    break;
                }
            }
        });
    }
}

fn event_to_msg(event: EngineEvent) -> Msg {
    match event {
        EngineEvent::TraversalCompleted {
            traversal_id,
            outcome,
        } => {
            let failed_subtrees = outcome
                .failures
                .iter()
                .map(|failure| {
                    omr_warn!("traversal {}: {}", traversal_id, failure);
                    failure.subtree().to_string()
                })
                .collect();
            Msg::TraversalFinished {
                traversal_id,
                files: outcome.files,
                failed_subtrees,
            }
        }
        EngineEvent::SubmissionCompleted(result) => {
            Msg::SubmissionFinished(result.map_err(|err| err.to_string()))
        }
        EngineEvent::SummaryLoaded(result) => {
            Msg::SummaryLoaded(result.map_err(|err| err.to_string()))
        }
        EngineEvent::GroupLoaded { key, result } => Msg::GroupLoaded {
            key,
            result: result.map_err(|err| err.to_string()),
        },
        EngineEvent::ArtifactSaved { key, kind, result } => Msg::DownloadFinished {
            key,
            kind,
            result: result.map_err(|err| err.to_string()),
        },
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use omr_core::{ArtifactKind, FileEntry, GroupKey};
    use omr_engine::{
        ArtifactError, CollectError, CollectOutcome, EngineConfig, FailureKind, ServiceError,
        SubmitError,
    };
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn traversal_failures_become_subtree_names() {
        let file = FileEntry::from_bytes("a.png", b"a".to_vec());
        let msg = event_to_msg(EngineEvent::TraversalCompleted {
            traversal_id: 3,
            outcome: CollectOutcome {
                files: vec![file.clone()],
                failures: vec![CollectError::Read {
                    subtree: "scans/broken".to_string(),
                    message: "permission denied".to_string(),
                }],
            },
        });
        assert_eq!(
            msg,
            Msg::TraversalFinished {
                traversal_id: 3,
                files: vec![file],
                failed_subtrees: vec!["scans/broken".to_string()],
            }
        );
    }

    #[test]
    fn errors_are_carried_as_display_strings() {
        let msg = event_to_msg(EngineEvent::SubmissionCompleted(Err(SubmitError::EmptyBatch)));
        assert_eq!(msg, Msg::SubmissionFinished(Err("batch is empty".to_string())));

        let err = ServiceError::new(FailureKind::HttpStatus(404), "404 Not Found");
        let msg = event_to_msg(EngineEvent::ArtifactSaved {
            key: GroupKey::from("X"),
            kind: ArtifactKind::GradesCsv,
            result: Err(ArtifactError::Download(err)),
        });
        assert_eq!(
            msg,
            Msg::DownloadFinished {
                key: GroupKey::from("X"),
                kind: ArtifactKind::GradesCsv,
                result: Err("download failed: http status 404: 404 Not Found".to_string()),
            }
        );

        let msg = event_to_msg(EngineEvent::ArtifactSaved {
            key: GroupKey::from("X"),
            kind: ArtifactKind::GradesCsv,
            result: Ok(PathBuf::from("downloads/X_grades.csv")),
        });
        assert!(matches!(msg, Msg::DownloadFinished { result: Ok(_), .. }));
    }

    #[test]
    fn dropping_the_runner_stops_the_event_loop() {
        let temp = TempDir::new().unwrap();
        let config = EngineConfig::default_with_download_dir(temp.path().join("downloads"));
        let (msg_tx, msg_rx) = mpsc::channel();
        let runner = EffectRunner::new(EngineHandle::new(config).unwrap(), msg_tx);

        drop(runner);

        // The loop owns the only sender; it is gone once the loop has exited.
        assert_eq!(
            msg_rx.recv_timeout(Duration::from_secs(10)),
            Err(RecvTimeoutError::Disconnected)
        );
    }
}
