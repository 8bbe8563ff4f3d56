//! Error types for the I/O side of photoavg.

use std::io;
use std::path::PathBuf;

use photoavg_pipeline::PipelineError;
use thiserror::Error;

/// Errors from the composite cache.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The cache directory could not be created.
    #[error("failed to create cache directory '{path}': {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The index file exists but could not be read.
    #[error("failed to read cache index '{path}': {source}")]
    ReadIndex {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The index file is not valid JSON for a cache index.
    #[error("failed to parse cache index '{path}': {source}")]
    ParseIndex {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The index file could not be written.
    #[error("failed to write cache index '{path}': {source}")]
    WriteIndex {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A backing sum file could not be read.
    #[error("failed to read cached composite '{path}': {source}")]
    ReadComposite {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A backing sum file could not be written.
    #[error("failed to write cached composite '{path}': {source}")]
    WriteComposite {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A pruned backing sum file could not be deleted.
    #[error("failed to delete cached composite '{path}': {source}")]
    DeleteComposite {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A backing sum file does not match the size its record implies.
    #[error("cached composite '{path}' is {actual} bytes, expected {expected}")]
    CorruptComposite {
        path: PathBuf,
        expected: u64,
        actual: u64,
    },

    /// A backing sum file does not describe a usable composite.
    #[error("cached composite '{path}' is invalid: {source}")]
    InvalidComposite {
        path: PathBuf,
        #[source]
        source: PipelineError,
    },
}

/// Errors from the external metadata tool.
#[derive(Debug, Error)]
pub enum MetadataError {
    /// The external program could not be started.
    #[error("failed to run '{program}': {source}")]
    Spawn {
        program: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The external program exited unsuccessfully.
    #[error("'{program}' exited with {status}: {stderr}")]
    Failed {
        program: PathBuf,
        status: std::process::ExitStatus,
        stderr: String,
    },

    /// The tool's JSON output could not be parsed.
    #[error("failed to parse metadata output: {0}")]
    Parse(#[from] serde_json::Error),

    /// An image lacks a required tag.
    #[error("'{path}' is missing the {tag} tag")]
    MissingTag { path: PathBuf, tag: &'static str },

    /// An image's date tag is not an EXIF timestamp.
    #[error("'{path}' has an unreadable timestamp '{value}'")]
    InvalidTimestamp { path: PathBuf, value: String },
}

/// Errors from the publisher.
#[derive(Debug, Error)]
pub enum PublishError {
    /// The external program could not be started.
    #[error("failed to run '{program}': {source}")]
    Spawn {
        program: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The external program exited unsuccessfully.
    #[error("'{program}' exited with {status}: {stderr}")]
    Failed {
        program: PathBuf,
        status: std::process::ExitStatus,
        stderr: String,
    },
}

/// Errors that abort the averaging of one bucket.
#[derive(Debug, Error)]
pub enum AverageError {
    /// A source image could not be read.
    #[error("failed to read image '{path}': {source}")]
    ReadImage {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The composite could not be encoded as JPEG.
    #[error("failed to encode composite: {0}")]
    Encode(#[source] image::ImageError),

    /// The composite could not be written to the output directory.
    #[error("failed to write composite '{path}': {source}")]
    WriteOutput {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The pipeline rejected the bucket.
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

/// Errors that abort a whole run before any bucket is processed.
#[derive(Debug, Error)]
pub enum RunError {
    /// The input directory could not be traversed.
    #[error("failed to read directory '{path}': {source}")]
    Discover {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    /// A discovered path could not be resolved.
    #[error("failed to resolve '{path}': {source}")]
    Canonicalize {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The output directory could not be created.
    #[error("failed to create output directory '{path}': {source}")]
    CreateOutputDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Source metadata could not be read.
    #[error(transparent)]
    Metadata(#[from] MetadataError),

    /// A cache could not be opened.
    #[error(transparent)]
    Cache(#[from] CacheError),
}
