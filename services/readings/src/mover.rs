//! Status moves.
//!
//! The bucket has no rename, so a move copies every object of a session to
//! the target status folder and then deletes the original, one object at a
//! time. Nothing is rolled back: a failure halfway leaves the session split
//! between the two folders, and the outcome says exactly where it stopped.

use crate::layout::{candidate_session_prefixes, session_folder_name, Layout, SourceType, Status};
use crate::store::ObjectStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

/// One requested status change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveRequest {
    pub session_id: String,
    pub source_type: SourceType,
    pub current_status: Status,
    pub target_status: Status,
    /// Defaults to the primary work type
    #[serde(default)]
    pub work_type: Option<String>,
}

/// Result of moving one session
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum MoveOutcome {
    /// Every object now lives under the target folder
    Moved { objects: usize },
    /// Stopped at `failed_key`; `moved` objects are already at the target,
    /// `remaining` (including the failed one) are still at the source
    PartiallyMoved {
        moved: usize,
        failed_key: String,
        remaining: usize,
        error: String,
    },
    /// No candidate folder exists for the session
    NotFound,
    /// The folder vanished between the probe and the full listing
    Empty { prefix: String },
    /// Listing the session's objects failed; nothing was touched
    Failed { error: String },
}

impl MoveOutcome {
    pub fn is_moved(&self) -> bool {
        matches!(self, MoveOutcome::Moved { .. })
    }

    fn label(&self) -> &'static str {
        match self {
            MoveOutcome::Moved { .. } => "moved",
            MoveOutcome::PartiallyMoved { .. } => "partially_moved",
            MoveOutcome::NotFound => "not_found",
            MoveOutcome::Empty { .. } => "empty",
            MoveOutcome::Failed { .. } => "failed",
        }
    }
}

/// Per-session entry of a bulk move
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveItemResult {
    pub session_id: String,
    #[serde(flatten)]
    pub outcome: MoveOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BulkMoveReport {
    pub moved: usize,
    pub total: usize,
    pub results: Vec<MoveItemResult>,
}

pub struct StatusMover {
    store: Arc<dyn ObjectStore>,
    layout: Layout,
}

impl StatusMover {
    pub fn new(store: Arc<dyn ObjectStore>, layout: Layout) -> Self {
        Self { store, layout }
    }

    /// Find the folder currently holding `request`'s session
    async fn locate(&self, request: &MoveRequest, status_prefix: &str) -> Option<String> {
        for candidate in
            candidate_session_prefixes(status_prefix, request.source_type, &request.session_id)
        {
            match self.store.list_objects(&candidate, Some(1)).await {
                Ok(objects) if !objects.is_empty() => return Some(candidate),
                Ok(_) => {}
                Err(e) => {
                    debug!(prefix = %candidate, error = %e, "Probe failed, trying next candidate");
                }
            }
        }
        None
    }

    /// Move one session between status folders
    #[instrument(skip(self), fields(session_id = %request.session_id))]
    pub async fn move_session(&self, request: &MoveRequest) -> MoveOutcome {
        let work_type = request
            .work_type
            .as_deref()
            .unwrap_or_else(|| self.layout.primary_work_type());
        let source_folder =
            self.layout
                .status_prefix(work_type, request.source_type, request.current_status);
        let target_folder =
            self.layout
                .status_prefix(work_type, request.source_type, request.target_status);

        let outcome = self
            .relocate(request, &source_folder, &target_folder)
            .await;

        metrics::counter!("readings.moves", "outcome" => outcome.label()).increment(1);
        outcome
    }

    async fn relocate(
        &self,
        request: &MoveRequest,
        source_folder: &str,
        target_folder: &str,
    ) -> MoveOutcome {
        let Some(session_prefix) = self.locate(request, source_folder).await else {
            warn!(source_folder = %source_folder, "Session folder not found");
            return MoveOutcome::NotFound;
        };

        let objects = match self.store.list_objects(&session_prefix, None).await {
            Ok(objects) => objects,
            Err(e) => {
                error!(prefix = %session_prefix, error = %e, "Failed to list session objects");
                return MoveOutcome::Failed {
                    error: e.to_string(),
                };
            }
        };

        if objects.is_empty() {
            warn!(prefix = %session_prefix, "No objects found in session folder");
            return MoveOutcome::Empty {
                prefix: session_prefix,
            };
        }

        let target_prefix = format!("{}{}/", target_folder, session_folder_name(&session_prefix));
        info!(from = %session_prefix, to = %target_prefix, objects = objects.len(), "Moving session");

        for (moved, object) in objects.iter().enumerate() {
            let relative = &object.key[session_prefix.len()..];
            let target_key = format!("{}{}", target_prefix, relative);

            // Same folder on both sides: copying onto itself then deleting
            // would destroy the object. The object still counts towards
            // `Moved { objects }` although nothing was copied.
            if target_key == object.key {
                continue;
            }

            let step = match self.store.copy_object(&object.key, &target_key).await {
                Ok(()) => self.store.delete_object(&object.key).await,
                Err(e) => Err(e),
            };

            if let Err(e) = step {
                error!(key = %object.key, moved = moved, error = %e, "Move interrupted");
                return MoveOutcome::PartiallyMoved {
                    moved,
                    failed_key: object.key.clone(),
                    remaining: objects.len() - moved,
                    error: e.to_string(),
                };
            }
        }

        info!(objects = objects.len(), "Session moved");
        MoveOutcome::Moved {
            objects: objects.len(),
        }
    }

    /// Move every request in order. One failure never stops the batch.
    pub async fn bulk_move(&self, requests: &[MoveRequest]) -> BulkMoveReport {
        info!(total = requests.len(), "Bulk move started");

        let mut results = Vec::with_capacity(requests.len());
        for request in requests {
            debug!(
                session_id = %request.session_id,
                from = %request.current_status,
                to = %request.target_status,
                "Moving reading"
            );
            let outcome = self.move_session(request).await;
            results.push(MoveItemResult {
                session_id: request.session_id.clone(),
                outcome,
            });
        }

        let moved = results.iter().filter(|r| r.outcome.is_moved()).count();
        info!(moved = moved, total = requests.len(), "Bulk move finished");

        BulkMoveReport {
            moved,
            total: requests.len(),
            results,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_store::{InMemoryObjectStore, StoreOperation};
    use crate::store::{MockObjectStore, ObjectSummary, StoreError};
    use metrics_util::debugging::{DebugValue, DebuggingRecorder};

    fn request(id: &str, from: Status, to: Status) -> MoveRequest {
        MoveRequest {
            session_id: id.to_string(),
            source_type: SourceType::Field,
            current_status: from,
            target_status: to,
            work_type: None,
        }
    }

    fn mover_with(store: Arc<InMemoryObjectStore>) -> StatusMover {
        StatusMover::new(store, Layout::new("METR"))
    }

    #[tokio::test]
    async fn test_partial_move_reports_failure_point() {
        let store = Arc::new(InMemoryObjectStore::new("bucket"));
        store.put("f_incorrect/s1/dial_1.jpg", "d1");
        store.put("f_incorrect/s1/metadata.json", "{}");
        store.put("f_incorrect/s1/original.jpg", "o");
        store.fail_on(StoreOperation::Copy, "f_incorrect/s1/metadata.json");

        let outcome = mover_with(store.clone())
            .move_session(&request("s1", Status::IncorrectNew, Status::IncorrectAnalyzed))
            .await;

        assert_eq!(
            outcome,
            MoveOutcome::PartiallyMoved {
                moved: 1,
                failed_key: "f_incorrect/s1/metadata.json".to_string(),
                remaining: 2,
                error: "Store copy_object failed for f_incorrect/s1/metadata.json: injected failure"
                    .to_string(),
            }
        );
        assert!(store.contains("f_incorrect_analyzed/s1/dial_1.jpg"));
        assert!(!store.contains("f_incorrect/s1/dial_1.jpg"));
        assert!(store.contains("f_incorrect/s1/metadata.json"));
        assert!(store.contains("f_incorrect/s1/original.jpg"));
    }

    #[tokio::test]
    async fn test_delete_failure_is_partial() {
        let store = Arc::new(InMemoryObjectStore::new("bucket"));
        store.put("f_correct/s2/metadata.json", "{}");
        store.fail_on(StoreOperation::Delete, "f_correct/s2/");

        let outcome = mover_with(store.clone())
            .move_session(&request("s2", Status::Correct, Status::IncorrectNew))
            .await;

        assert!(matches!(outcome, MoveOutcome::PartiallyMoved { moved: 0, remaining: 1, .. }));
        // Copy landed before the delete failed
        assert!(store.contains("f_incorrect/s2/metadata.json"));
        assert!(store.contains("f_correct/s2/metadata.json"));
    }

    #[tokio::test]
    async fn test_self_transition_keeps_objects() {
        let store = Arc::new(InMemoryObjectStore::new("bucket"));
        store.put("f_correct/s3/metadata.json", "{}");
        store.put("f_correct/s3/original.jpg", "o");

        let outcome = mover_with(store.clone())
            .move_session(&request("s3", Status::Correct, Status::Correct))
            .await;

        assert_eq!(outcome, MoveOutcome::Moved { objects: 2 });
        assert_eq!(store.len(), 2);
        assert!(store.contains("f_correct/s3/original.jpg"));
    }

    #[tokio::test]
    async fn test_probe_failure_falls_through_to_legacy_folder() {
        let store = Arc::new(InMemoryObjectStore::new("bucket"));
        store.put("f_correct/f_s4/metadata.json", "{}");
        store.fail_on(StoreOperation::ListObjects, "f_correct/s4/");

        let outcome = mover_with(store.clone())
            .move_session(&request("s4", Status::Correct, Status::IncorrectNew))
            .await;

        assert_eq!(outcome, MoveOutcome::Moved { objects: 1 });
        assert!(store.contains("f_incorrect/f_s4/metadata.json"));
    }

    #[tokio::test]
    async fn test_full_listing_failure_is_reported() {
        let mut store = MockObjectStore::new();
        store
            .expect_list_objects()
            .withf(|prefix, max_keys| prefix == "f_correct/s5/" && max_keys.is_some())
            .returning(|prefix, _| {
                Ok(vec![ObjectSummary {
                    key: format!("{}metadata.json", prefix),
                    size: 2,
                }])
            });
        store
            .expect_list_objects()
            .withf(|_, max_keys| max_keys.is_none())
            .returning(|prefix, _| {
                Err(StoreError::Backend {
                    operation: "list_objects",
                    key: prefix.to_string(),
                    message: "throttled".to_string(),
                })
            });
        store.expect_copy_object().never();
        store.expect_delete_object().never();

        let mover = StatusMover::new(Arc::new(store), Layout::new("METR"));
        let outcome = mover
            .move_session(&request("s5", Status::Correct, Status::IncorrectNew))
            .await;

        assert!(matches!(outcome, MoveOutcome::Failed { .. }));
    }

    #[tokio::test]
    async fn test_outcome_serialization() {
        let item = MoveItemResult {
            session_id: "s1".to_string(),
            outcome: MoveOutcome::Moved { objects: 3 },
        };
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["sessionId"], "s1");
        assert_eq!(json["outcome"], "moved");
        assert_eq!(json["objects"], 3);

        let missing = MoveItemResult {
            session_id: "s2".to_string(),
            outcome: MoveOutcome::NotFound,
        };
        let json = serde_json::to_value(&missing).unwrap();
        assert_eq!(json["outcome"], "not_found");
    }

    #[tokio::test]
    async fn test_moves_are_counted_by_outcome() {
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();
        let _guard = metrics::set_default_local_recorder(&recorder);

        let store = Arc::new(InMemoryObjectStore::new("bucket"));
        store.put("f_correct/s1/original.jpg", "o");
        let mover = mover_with(store);
        mover
            .move_session(&request("s1", Status::Correct, Status::IncorrectNew))
            .await;
        mover
            .move_session(&request("ghost", Status::Correct, Status::IncorrectNew))
            .await;

        let counts: Vec<(String, String, DebugValue)> = snapshotter
            .snapshot()
            .into_vec()
            .into_iter()
            .map(|(key, _, _, value)| {
                let outcome = key
                    .key()
                    .labels()
                    .find(|label| label.key() == "outcome")
                    .map(|label| label.value().to_string())
                    .unwrap_or_default();
                (key.key().name().to_string(), outcome, value)
            })
            .collect();

        assert!(counts.contains(&(
            "readings.moves".to_string(),
            "moved".to_string(),
            DebugValue::Counter(1)
        )));
        assert!(counts.contains(&(
            "readings.moves".to_string(),
            "not_found".to_string(),
            DebugValue::Counter(1)
        )));
    }
}
