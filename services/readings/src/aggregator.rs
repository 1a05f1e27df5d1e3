use crate::layout::{Layout, SourceFilter, Status};
use crate::locator::SessionLocator;
use crate::parser::{ScanContext, SessionParser};
use crate::reading::{ReadingCounts, SessionRecord, WorkTypeStats};
use crate::work_types::WorkType;
use tracing::{info, instrument};

/// What part of the bucket a read covers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scope {
    pub source: SourceFilter,
    pub work_type: String,
}

/// Rebuilds session records from the bucket on every call.
///
/// There is no index or cache: every method walks each (source, status)
/// folder in scope, sequentially, and parses every session it finds.
pub struct ReadingsAggregator {
    layout: Layout,
    locator: SessionLocator,
    parser: SessionParser,
}

impl ReadingsAggregator {
    pub fn new(layout: Layout, locator: SessionLocator, parser: SessionParser) -> Self {
        Self {
            layout,
            locator,
            parser,
        }
    }

    /// All sessions in scope, newest first
    #[instrument(skip(self))]
    pub async fn readings(&self, scope: &Scope) -> Vec<SessionRecord> {
        metrics::counter!("readings.scans").increment(1);

        let mut records = Vec::new();

        for &source in scope.source.sources() {
            for status in Status::ALL {
                let prefix = self.layout.status_prefix(&scope.work_type, source, status);
                let context = ScanContext {
                    work_type: scope.work_type.clone(),
                    source,
                    status,
                };

                for session_prefix in self.locator.list_sessions(&prefix).await {
                    if let Some(record) = self.parser.parse(&session_prefix, &context).await {
                        records.push(record);
                    }
                }
            }
        }

        // Stable: equal timestamps keep scan order
        records.sort_by(|a, b| b.captured_at.cmp(&a.captured_at));

        info!(
            source = ?scope.source,
            work_type = %scope.work_type,
            total = records.len(),
            "Scan complete"
        );

        records
    }

    /// Look a session up by id across both sources
    pub async fn find(&self, id: &str, work_type: &str) -> Option<SessionRecord> {
        let scope = Scope {
            source: SourceFilter::All,
            work_type: work_type.to_string(),
        };

        self.readings(&scope).await.into_iter().find(|r| r.id == id)
    }

    pub async fn counts(&self, scope: &Scope) -> ReadingCounts {
        ReadingCounts::from_records(&self.readings(scope).await)
    }

    /// Status, verdict and condition-code totals over one work type's folders
    pub async fn work_type_stats(&self, work_type: &WorkType) -> WorkTypeStats {
        let scope = Scope {
            source: SourceFilter::All,
            work_type: work_type.code.to_string(),
        };

        WorkTypeStats::from_records(work_type.code, work_type.name, &self.readings(&scope).await)
    }
}
