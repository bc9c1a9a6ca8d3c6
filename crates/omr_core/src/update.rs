use crate::{
    AppState, DownloadStatus, Effect, Msg, RejectReason, SubmissionState, SummaryState,
    ToggleOutcome,
};

/// Pure update function: applies a message to state and returns any effects.
pub fn update(mut state: AppState, msg: Msg) -> (AppState, Vec<Effect>) {
    let effects = match msg {
        Msg::FilesDropped(paths) => {
            if paths.is_empty() {
                return (state, Vec::new());
            }
            // Every drop gets its own traversal so concurrent drops never share a pending-count.
            let traversal_id = state.begin_traversal();
            vec![Effect::CollectFiles {
                traversal_id,
                paths,
            }]
        }
        Msg::TraversalFinished {
            traversal_id,
            files,
            failed_subtrees,
        } => {
            state.finish_traversal(traversal_id, files, failed_subtrees);
            Vec::new()
        }
        Msg::RemoveFile(index) => {
            if state.batch_mut().remove_at(index).is_some() {
                state.mark_dirty();
            }
            Vec::new()
        }
        Msg::ClearFiles => {
            if !state.batch().is_empty() {
                state.batch_mut().clear();
                state.mark_dirty();
            }
            Vec::new()
        }
        Msg::SubmitClicked => {
            if state.submission() == &SubmissionState::InFlight {
                Vec::new()
            } else if state.batch().is_empty() {
                state.set_submission(SubmissionState::Rejected(RejectReason::EmptyBatch));
                Vec::new()
            } else {
                let batch = state.batch().clone();
                state.set_submission(SubmissionState::InFlight);
                vec![Effect::SubmitBatch { batch }]
            }
        }
        Msg::SubmissionFinished(result) => {
            if state.submission() == &SubmissionState::InFlight {
                state.set_submission(match result {
                    Ok(receipt) => SubmissionState::Succeeded(receipt),
                    Err(err) => SubmissionState::Failed(err),
                });
            }
            Vec::new()
        }
        Msg::SummaryRequested => {
            if state.summary() == &SummaryState::Loading {
                Vec::new()
            } else {
                state.set_summary(SummaryState::Loading);
                vec![Effect::LoadSummary]
            }
        }
        Msg::SummaryLoaded(result) => {
            state.set_summary(match result {
                Ok(rows) => SummaryState::Loaded(rows),
                Err(err) => SummaryState::Failed(err),
            });
            Vec::new()
        }
        Msg::GroupToggled(key) => match state.expansion_mut().toggle(&key) {
            ToggleOutcome::Ignored => Vec::new(),
            ToggleOutcome::RequestLoad => {
                state.mark_dirty();
                vec![
                    Effect::GroupVisibility {
                        key: key.clone(),
                        visible: true,
                    },
                    Effect::LoadGroup { key },
                ]
            }
            ToggleOutcome::Expanded => {
                state.mark_dirty();
                vec![Effect::GroupVisibility { key, visible: true }]
            }
            ToggleOutcome::Collapsed => {
                state.mark_dirty();
                vec![Effect::GroupVisibility {
                    key,
                    visible: false,
                }]
            }
        },
        Msg::GroupLoaded { key, result } => {
            let failed = result.is_err();
            if state.expansion_mut().settle(&key, result) {
                state.mark_dirty();
                if failed {
                    vec![Effect::GroupVisibility {
                        key,
                        visible: false,
                    }]
                } else {
                    Vec::new()
                }
            } else {
                Vec::new()
            }
        }
        Msg::DownloadRequested { key, kind } => vec![Effect::DownloadArtifact { key, kind }],
        Msg::DownloadFinished { key, kind, result } => {
            state.set_last_download(DownloadStatus { key, kind, result });
            Vec::new()
        }
        Msg::NoOp => Vec::new(),
    };

    (state, effects)
}
