use crate::layout::{session_folder_name, SourceType, Status};
use crate::reading::{parse_timestamp, ImageReference, SessionMetadata, SessionRecord};
use crate::store::{ObjectStore, ObjectSummary, StoreError};
use crate::work_types::WorkTypeCatalog;
use regex::Regex;
use std::cmp::Ordering;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, instrument, warn};

const METADATA_FILE: &str = "metadata.json";
const OVERVIEW_FILE: &str = "original.jpg";
const IMAGE_EXTENSIONS: [&str; 3] = [".jpg", ".jpeg", ".png"];

const OVERVIEW_RESOLUTION: &str = "4032x3024";
// Dial crops are not inspected; every non-overview image gets this tag.
const CROP_RESOLUTION: &str = "224x224";

/// Why a session folder produced no record
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("Failed to fetch metadata: {0}")]
    Metadata(StoreError),

    #[error("Malformed metadata: {0}")]
    MalformedMetadata(#[from] serde_json::Error),

    #[error("Unparseable timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("Failed to list session objects: {0}")]
    Listing(StoreError),

    #[error("Failed to sign image URL: {0}")]
    Presign(StoreError),
}

/// Structural context a session folder was found under
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanContext {
    pub work_type: String,
    pub source: SourceType,
    pub status: Status,
}

/// How a file inside a session folder is presented
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    /// `original.jpg`, the full meter view
    Overview,
    /// `dial_<N>...` with N >= 1
    Dial(u32),
    Other,
}

impl ImageKind {
    pub fn classify(file_name: &str) -> Self {
        if file_name == OVERVIEW_FILE {
            return ImageKind::Overview;
        }

        static DIAL_PATTERN: OnceLock<Regex> = OnceLock::new();
        let pattern = DIAL_PATTERN.get_or_init(|| {
            Regex::new(r"^dial_(\d+)").expect("dial pattern is a valid regex")
        });

        pattern
            .captures(file_name)
            .and_then(|caps| caps[1].parse::<u32>().ok())
            .filter(|n| *n >= 1)
            .map(ImageKind::Dial)
            .unwrap_or(ImageKind::Other)
    }

    pub fn label(&self) -> String {
        match self {
            ImageKind::Overview => "Full Meter View".to_string(),
            ImageKind::Dial(n) => format!("Dial {}", n),
            ImageKind::Other => "Image".to_string(),
        }
    }

    /// Zero-based dial index
    pub fn dial_index(&self) -> Option<u32> {
        match self {
            ImageKind::Dial(n) => Some(n - 1),
            _ => None,
        }
    }

    fn resolution(&self) -> &'static str {
        match self {
            ImageKind::Overview => OVERVIEW_RESOLUTION,
            _ => CROP_RESOLUTION,
        }
    }
}

pub fn is_image(file_name: &str) -> bool {
    IMAGE_EXTENSIONS.iter().any(|ext| file_name.ends_with(ext))
}

/// Display order: overview first, then byte-wise by file name
pub fn compare_images(a: &ImageReference, b: &ImageReference) -> Ordering {
    sort_key(a).cmp(&sort_key(b))
}

fn sort_key(image: &ImageReference) -> (bool, &str) {
    (image.file_name != OVERVIEW_FILE, &image.file_name)
}

/// Turns a session folder into a [`SessionRecord`]
pub struct SessionParser {
    store: Arc<dyn ObjectStore>,
    catalog: WorkTypeCatalog,
    url_expiry: Duration,
}

impl SessionParser {
    pub fn new(store: Arc<dyn ObjectStore>, catalog: WorkTypeCatalog, url_expiry: Duration) -> Self {
        Self {
            store,
            catalog,
            url_expiry,
        }
    }

    /// Parse one session folder. Any failure is logged and yields `None`.
    pub async fn parse(&self, session_prefix: &str, context: &ScanContext) -> Option<SessionRecord> {
        match self.try_parse(session_prefix, context).await {
            Ok(record) => {
                metrics::counter!("readings.sessions.parsed").increment(1);
                Some(record)
            }
            Err(e) => {
                metrics::counter!("readings.sessions.skipped").increment(1);
                warn!(prefix = %session_prefix, error = %e, "Skipping session");
                None
            }
        }
    }

    #[instrument(skip(self, context), fields(status = %context.status, source = %context.source))]
    pub async fn try_parse(
        &self,
        session_prefix: &str,
        context: &ScanContext,
    ) -> Result<SessionRecord, ParseError> {
        let metadata_key = format!("{}{}", session_prefix, METADATA_FILE);
        let raw = self
            .store
            .get_object(&metadata_key)
            .await
            .map_err(ParseError::Metadata)?;
        let metadata: SessionMetadata = serde_json::from_slice(&raw)?;

        let captured_at = parse_timestamp(&metadata.timestamp)
            .ok_or_else(|| ParseError::InvalidTimestamp(metadata.timestamp.clone()))?;

        let objects = self
            .store
            .list_objects(session_prefix, None)
            .await
            .map_err(ParseError::Listing)?;

        let mut images = Vec::new();
        for object in objects.iter().filter(|o| is_image(o.file_name())) {
            images.push(self.image_reference(object).await?);
        }
        images.sort_by(compare_images);

        debug!(prefix = %session_prefix, images = images.len(), "Parsed session");

        let work_type = metadata
            .work_type
            .filter(|w| !w.is_empty())
            .unwrap_or_else(|| context.work_type.clone());

        Ok(SessionRecord {
            id: metadata
                .session_id
                .unwrap_or_else(|| session_folder_name(session_prefix).to_string()),
            captured_at,
            source_type: context.source,
            location: context.source.location(),
            work_type_name: self.catalog.name_of(&work_type),
            work_type,
            status: context.status,
            predicted_value: metadata.ml_prediction,
            raw_prediction: metadata.ml_raw_prediction,
            user_correction: metadata.user_correction.filter(|c| !c.is_empty()),
            is_correct: metadata.is_correct,
            processing_time_ms: metadata.processing_time_ms,
            confidence: metadata.confidence.unwrap_or(0.0),
            dial_count: metadata.dial_count.unwrap_or(0),
            per_dial_details: metadata.dial_details.unwrap_or_default(),
            condition_code: metadata.condition_code,
            images,
        })
    }

    async fn image_reference(&self, object: &ObjectSummary) -> Result<ImageReference, ParseError> {
        let access_url = self
            .store
            .presign_get(&object.key, self.url_expiry)
            .await
            .map_err(ParseError::Presign)?;

        let file_name = object.file_name().to_string();
        let kind = ImageKind::classify(&file_name);

        Ok(ImageReference {
            object_key: object.key.clone(),
            access_url,
            label: kind.label(),
            file_name,
            byte_size: object.size,
            resolution: kind.resolution(),
            dial_index: kind.dial_index(),
        })
    }
}
