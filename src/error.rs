//! Unified error handling for the course-photo-matcher library.
//!
//! Every failure is scoped to one request: a course load, one photo's
//! embedding, or one search. Nothing here is fatal to the process, and an
//! empty gallery is an `Ok(vec![])`, never an error.

use thiserror::Error;

/// Unified error type for course-photo-matcher operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PhotoMatchError {
    /// Event id has no configured route source
    #[error("Event '{event_id}' is not configured")]
    UnknownEvent { event_id: String },

    /// Route source missing or unparseable; the course stays unusable
    #[error("Route for event '{event_id}' is unavailable: {reason}")]
    RouteUnavailable { event_id: String, reason: String },

    /// Course built from too few valid track points
    #[error("Course '{event_id}' has {point_count} points, minimum {minimum_required} required")]
    InsufficientPoints {
        event_id: String,
        point_count: usize,
        minimum_required: usize,
    },

    /// The embedding function failed on an image
    #[error("Embedding failed for {photo}: {message}")]
    EmbeddingFailure { photo: String, message: String },

    /// Embedding length does not match the store's dimension
    #[error("Embedding has {actual} dimensions, store expects {expected}")]
    InvalidEmbedding { expected: usize, actual: usize },

    /// Photo id not present where it was looked up
    #[error("Photo '{photo_id}' not found")]
    PhotoNotFound { photo_id: String },

    /// Search id evicted from the result cache or never issued
    #[error("Search '{search_id}' has expired")]
    SearchExpired { search_id: String },

    /// Configuration error
    #[error("Configuration error: {message}")]
    ConfigError { message: String },
}

impl PhotoMatchError {
    /// Build an `EmbeddingFailure` from any displayable cause.
    pub fn embedding(photo: impl Into<String>, cause: impl std::fmt::Display) -> Self {
        PhotoMatchError::EmbeddingFailure {
            photo: photo.into(),
            message: cause.to_string(),
        }
    }

    /// Build a `RouteUnavailable` from any displayable cause.
    pub fn route_unavailable(event_id: &str, cause: impl std::fmt::Display) -> Self {
        PhotoMatchError::RouteUnavailable {
            event_id: event_id.to_string(),
            reason: cause.to_string(),
        }
    }
}

/// Result type alias for course-photo-matcher operations.
pub type Result<T> = std::result::Result<T, PhotoMatchError>;

/// Extension trait for converting Option to PhotoMatchError.
pub trait OptionExt<T> {
    /// Convert Option to Result with an unknown event error.
    fn ok_or_unknown_event(self, event_id: &str) -> Result<T>;

    /// Convert Option to Result with a photo not found error.
    fn ok_or_photo_not_found(self, photo_id: &str) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_unknown_event(self, event_id: &str) -> Result<T> {
        self.ok_or_else(|| PhotoMatchError::UnknownEvent {
            event_id: event_id.to_string(),
        })
    }

    fn ok_or_photo_not_found(self, photo_id: &str) -> Result<T> {
        self.ok_or_else(|| PhotoMatchError::PhotoNotFound {
            photo_id: photo_id.to_string(),
        })
    }
}
