//! photoavg-io: Filesystem, subprocess, and cache I/O for photoavg.
//!
//! Everything with side effects lives here:
//!
//! - [`discover`]: recursive search for source photographs
//! - [`metadata`]: reading capture metadata and writing composite tags
//!   through `exiftool`
//! - [`cache`]: the incremental composite cache
//! - [`publish`]: handing finished composites to an outside service
//! - [`averager`]: the per-bucket orchestrator tying them to the pure
//!   pipeline in `photoavg-pipeline`

pub mod averager;
pub mod cache;
pub mod discover;
pub mod error;
pub mod metadata;
pub mod publish;

pub use averager::{
    Averager, AveragerConfig, CacheConfig, FailedBucket, GroupResult, RunReport, SkipReason,
    SkippedBucket, collect_sources,
};
pub use cache::{CompositeCache, Member};
pub use error::{AverageError, CacheError, MetadataError, PublishError, RunError};
pub use metadata::{ExifTool, MetadataReader, MetadataWriter};
pub use publish::{CommandPublisher, Publisher};
