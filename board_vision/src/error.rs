//! Error types for the inspection pipeline.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for inspection operations.
pub type InspectionOutcome<T> = Result<T, InspectionError>;

/// Which side of the comparison an image belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageRole {
    Reference,
    Test,
}

impl fmt::Display for ImageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageRole::Reference => write!(f, "reference"),
            ImageRole::Test => write!(f, "test"),
        }
    }
}

/// Errors that abort an inspection. No variant ever degrades into an approval.
#[derive(Debug, Error)]
pub enum InspectionError {
    /// The image could not be read or decoded.
    #[error("failed to load {role} image: {source}")]
    Decode {
        role: ImageRole,
        #[source]
        source: image::ImageError,
    },

    /// The image decoded but has zero area.
    #[error("{role} image has degenerate dimensions {width}x{height}")]
    Dimension {
        role: ImageRole,
        width: u32,
        height: u32,
    },

    /// Lit-pixel segmentation failed.
    #[error("LED segmentation failed: {0}")]
    Segmentation(String),

    /// Region-wise pattern comparison failed.
    #[error("pattern comparison failed: {0}")]
    Comparison(String),

    /// An attached verification strategy failed.
    #[error("verification failed: {0}")]
    Verification(String),

    /// The annotated image could not be encoded.
    #[error("failed to encode annotated image: {0}")]
    Encode(#[source] image::ImageError),

    /// A pooled inspection task panicked or could not be scheduled.
    #[error("inspection worker failed: {0}")]
    Worker(String),
}

impl InspectionError {
    /// Create a segmentation error.
    #[must_use]
    pub fn segmentation(details: impl Into<String>) -> Self {
        Self::Segmentation(details.into())
    }

    /// Create a comparison error.
    #[must_use]
    pub fn comparison(details: impl Into<String>) -> Self {
        Self::Comparison(details.into())
    }

    /// Create a verification error.
    #[must_use]
    pub fn verification(details: impl Into<String>) -> Self {
        Self::Verification(details.into())
    }
}

/// Writing the annotated artifact failed. Never aborts a verdict.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("failed to write artifact {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("artifact store rejected the write: {0}")]
    Storage(String),
}

/// Loading or validating an `InspectionConfig` failed.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = InspectionError::Dimension {
            role: ImageRole::Test,
            width: 0,
            height: 12,
        };
        assert_eq!(format!("{err}"), "test image has degenerate dimensions 0x12");

        let err = InspectionError::comparison("size mismatch");
        assert!(format!("{err}").contains("size mismatch"));

        let err = PersistenceError::Storage("disk full".into());
        assert!(format!("{err}").contains("disk full"));
    }
}
