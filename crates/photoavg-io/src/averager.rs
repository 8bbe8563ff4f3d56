//! Per-bucket orchestration: group, skip, average, write, describe.
//!
//! For each bucket of one granularity the [`Averager`]:
//!
//! 1. skips buckets with a single member
//! 2. skips buckets whose output file already exists
//! 3. resolves the common dimension from the members' metadata
//! 4. substitutes a cached prefix, if the granularity is cached
//! 5. streams every remaining member through the pipeline
//! 6. writes the JPEG, then metadata, publication, and the cache entry
//!
//! A failing bucket is logged and recorded in the [`RunReport`]; the
//! run continues with the next bucket. Nothing is written for a failed
//! bucket. Metadata, publishing, and cache write failures only warn,
//! since the composite itself was produced.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{Local, NaiveDate, Utc};
use image::ImageEncoder;
use image::codecs::jpeg::JpegEncoder;
use photoavg_pipeline::diagnostics::{StageMetrics, duration_serde};
use photoavg_pipeline::group::total_exposure;
use photoavg_pipeline::{
    AverageDiagnostics, Clock, CombinationMode, Contribution, Credits, Granularity, RgbImage,
    SourceImage, SystemClock, describe, dimension, group, naming,
};
use serde::{Deserialize, Serialize};

use crate::cache::{CompositeCache, DEFAULT_RETENTION, Member};
use crate::discover::discover;
use crate::error::{AverageError, CacheError, RunError};
use crate::metadata::{MetadataReader, MetadataWriter};
use crate::publish::Publisher;

/// Default JPEG quality of written composites.
pub const DEFAULT_JPEG_QUALITY: u8 = 95;

/// Default copyright notice.
pub const DEFAULT_COPYRIGHT: &str = "all rights reserved";

/// Default cache directory, relative to the working directory.
pub const DEFAULT_CACHE_DIR: &str = ".avg_cache";

/// Settings of the composite cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Root cache directory; each cached granularity gets a subdirectory.
    pub dir: PathBuf,
    /// Entries kept per granularity.
    pub retention: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(DEFAULT_CACHE_DIR),
            retention: DEFAULT_RETENTION,
        }
    }
}

impl CacheConfig {
    /// Cache directory for `granularity`, or `None` when it is not
    /// cached. Daily buckets are rebuilt from scratch every time.
    #[must_use]
    pub fn dir_for(&self, granularity: Granularity) -> Option<PathBuf> {
        match granularity {
            Granularity::Day => None,
            Granularity::Month => Some(self.dir.join("monthly")),
            Granularity::Year => Some(self.dir.join("yearly")),
        }
    }
}

/// Settings of one averaging run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AveragerConfig {
    /// Directory receiving the composites.
    pub output_dir: PathBuf,
    /// Geometric harmonization policy.
    pub mode: CombinationMode,
    /// Keyword prefix whose suffix overrides the capture date.
    pub grouping_tag: Option<String>,
    /// Author and copyright recorded on each composite.
    pub credits: Credits,
    /// JPEG quality, 1-100.
    pub jpeg_quality: u8,
    /// Composite cache, `None` to disable.
    pub cache: Option<CacheConfig>,
    /// Granularities whose composites are handed to the publisher.
    ///
    /// Month and year file names change whenever a bucket grows, so
    /// only days are published by default.
    pub publish: Vec<Granularity>,
}

impl Default for AveragerConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            mode: CombinationMode::default(),
            grouping_tag: None,
            credits: Credits {
                author: String::new(),
                copyright: DEFAULT_COPYRIGHT.to_owned(),
            },
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            cache: Some(CacheConfig::default()),
            publish: vec![Granularity::Day],
        }
    }
}

/// A composite written by a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupResult {
    /// Written file.
    pub path: PathBuf,
    /// Bucket key.
    pub date: NaiveDate,
    /// Number of source images.
    pub count: usize,
    /// Total exposure of the source images, in seconds.
    pub exposure_seconds: f64,
    /// Wall-clock time spent on the bucket.
    #[serde(with = "duration_serde")]
    pub elapsed: Duration,
    /// Pipeline diagnostics.
    pub diagnostics: AverageDiagnostics,
}

impl GroupResult {
    /// Source images taken from the cache instead of being decoded.
    #[must_use]
    pub const fn cached_images(&self) -> u32 {
        match self.diagnostics.fold.metrics {
            StageMetrics::Fold { cached_images, .. } => cached_images,
            StageMetrics::Finish { .. } => 0,
        }
    }
}

/// Why a bucket was not averaged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Only one image; nothing to average.
    SingleMember,
    /// The output file exists from an earlier run.
    AlreadyGenerated,
}

/// A bucket that was not averaged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedBucket {
    /// Bucket key.
    pub date: NaiveDate,
    /// Why it was skipped.
    pub reason: SkipReason,
}

/// A bucket whose averaging failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedBucket {
    /// Bucket key.
    pub date: NaiveDate,
    /// Output path that was not written.
    pub path: PathBuf,
    /// Rendered error.
    pub error: String,
}

/// Outcome of averaging every bucket of one granularity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    /// Granularity the images were bucketed by.
    pub granularity: Granularity,
    /// Composites written.
    pub generated: Vec<GroupResult>,
    /// Buckets skipped.
    pub skipped: Vec<SkippedBucket>,
    /// Buckets that failed.
    pub failed: Vec<FailedBucket>,
    /// Wall-clock time of the whole run.
    #[serde(with = "duration_serde")]
    pub elapsed: Duration,
}

impl RunReport {
    const fn new(granularity: Granularity) -> Self {
        Self {
            granularity,
            generated: Vec::new(),
            skipped: Vec::new(),
            failed: Vec::new(),
            elapsed: Duration::ZERO,
        }
    }

    /// Whether any bucket failed.
    #[must_use]
    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty()
    }

    /// One-line summary.
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "{}: {} generated, {} skipped, {} failed in {:.3}s",
            self.granularity,
            self.generated.len(),
            self.skipped.len(),
            self.failed.len(),
            self.elapsed.as_secs_f64(),
        )
    }
}

/// Discover the source images below `root` and read their metadata.
///
/// # Errors
///
/// Returns an error if discovery or the metadata read fails.
pub fn collect_sources(
    root: &Path,
    reader: &dyn MetadataReader,
) -> Result<Vec<SourceImage>, RunError> {
    let paths = discover(root)?;
    Ok(reader.read(&paths)?)
}

/// Runs the averaging of every bucket of a granularity.
///
/// Collaborators are borrowed for the lifetime of the averager and
/// passed explicitly; none is required.
pub struct Averager<'a, C = SystemClock> {
    config: AveragerConfig,
    writer: Option<&'a dyn MetadataWriter>,
    publisher: Option<&'a dyn Publisher>,
    clock: C,
}

impl<'a> Averager<'a> {
    /// An averager without metadata writer or publisher.
    #[must_use]
    pub const fn new(config: AveragerConfig) -> Self {
        Self {
            config,
            writer: None,
            publisher: None,
            clock: SystemClock,
        }
    }
}

impl<'a, C: Clock> Averager<'a, C> {
    /// Tag every composite through `writer`.
    #[must_use]
    pub fn with_metadata_writer(mut self, writer: &'a dyn MetadataWriter) -> Self {
        self.writer = Some(writer);
        self
    }

    /// Publish every composite through `publisher`.
    #[must_use]
    pub fn with_publisher(mut self, publisher: &'a dyn Publisher) -> Self {
        self.publisher = Some(publisher);
        self
    }

    /// Measure durations with `clock`.
    #[must_use]
    pub fn with_clock<D: Clock>(self, clock: D) -> Averager<'a, D> {
        Averager {
            config: self.config,
            writer: self.writer,
            publisher: self.publisher,
            clock,
        }
    }

    /// The run configuration.
    #[must_use]
    pub const fn config(&self) -> &AveragerConfig {
        &self.config
    }

    /// Average every bucket of `images` grouped by `granularity`.
    ///
    /// # Errors
    ///
    /// Returns an error only if the output directory cannot be created
    /// or the cache cannot be opened. Per-bucket failures are recorded
    /// in the report.
    pub fn run(
        &self,
        images: &[SourceImage],
        granularity: Granularity,
    ) -> Result<RunReport, RunError> {
        let start = self.clock.now();
        let output_dir = &self.config.output_dir;
        fs::create_dir_all(output_dir).map_err(|source| RunError::CreateOutputDir {
            path: output_dir.clone(),
            source,
        })?;

        let mut cache = match self
            .config
            .cache
            .as_ref()
            .and_then(|config| Some((config.dir_for(granularity)?, config.retention)))
        {
            Some((dir, retention)) => Some(open_cache(dir, retention)?),
            None => None,
        };

        let tag = self.config.grouping_tag.as_deref();
        let groups = group(images, granularity, tag);
        tracing::info!(%granularity, buckets = groups.len(), "now processing images");

        let mut report = RunReport::new(granularity);
        for (&date, members) in &groups {
            if members.len() < 2 {
                tracing::info!(%date, "only one photo, skipping");
                report.skipped.push(SkippedBucket {
                    date,
                    reason: SkipReason::SingleMember,
                });
                continue;
            }

            let path = output_dir.join(naming::output_path(granularity, date, members, tag));
            if path.exists() {
                tracing::info!(path = %path.display(), "already generated, skipping");
                report.skipped.push(SkippedBucket {
                    date,
                    reason: SkipReason::AlreadyGenerated,
                });
                continue;
            }

            match self.average_bucket(granularity, date, members, &path, cache.as_mut()) {
                Ok(result) => {
                    tracing::info!(
                        path = %result.path.display(),
                        count = result.count,
                        seconds = result.elapsed.as_secs_f64(),
                        "wrote composite"
                    );
                    report.generated.push(result);
                }
                Err(e) => {
                    tracing::error!(%date, path = %path.display(), error = %e, "bucket failed");
                    report.failed.push(FailedBucket {
                        date,
                        path,
                        error: e.to_string(),
                    });
                }
            }
        }

        report.elapsed = self.clock.elapsed(&start);
        tracing::info!("{}", report.summary());
        Ok(report)
    }

    fn average_bucket(
        &self,
        granularity: Granularity,
        date: NaiveDate,
        members: &[SourceImage],
        path: &Path,
        cache: Option<&mut CompositeCache>,
    ) -> Result<GroupResult, AverageError> {
        let start = self.clock.now();
        let mode = self.config.mode;
        let sizes: Vec<_> = members.iter().map(|m| m.dimensions).collect();
        let dimension = dimension::resolve(mode, &sizes)?;
        tracing::info!(%date, members = members.len(), dimension, %mode, "working on bucket");

        let effective = match cache.as_deref() {
            Some(cache) => cache.search(members, mode, dimension),
            None => members.iter().cloned().map(Member::Source).collect(),
        };

        let total = members.len();
        let mut position = 0;
        let contributions = effective.into_iter().map(|member| match member {
            Member::Source(image) => {
                position += 1;
                tracing::debug!("processing {} ({position} of {total})", image.file_name());
                fs::read(&image.path)
                    .map(Contribution::Encoded)
                    .map_err(|source| AverageError::ReadImage {
                        path: image.path.clone(),
                        source,
                    })
            }
            Member::Cached(prefix) => {
                position += prefix.composite.count() as usize;
                tracing::debug!(key = %prefix.key, "using cached composite");
                Ok(Contribution::Partial(prefix.composite))
            }
        });
        let averaged = photoavg_pipeline::average(mode, dimension, contributions, &self.clock)?;
        tracing::debug!("\n{}", averaged.diagnostics.report());

        write_jpeg(path, &averaged.image, self.config.jpeg_quality)?;

        let exposure_seconds = total_exposure(members);
        let description = describe(
            granularity,
            date,
            members.len(),
            exposure_seconds,
            &self.config.credits,
            Local::now().naive_local(),
        );
        if let Some(writer) = self.writer
            && let Err(e) = writer.write(path, &description)
        {
            tracing::warn!(path = %path.display(), error = %e, "failed to write metadata");
        }
        if let Some(publisher) = self.publisher
            && self.config.publish.contains(&granularity)
            && let Err(e) = publisher.publish(path, &description)
        {
            tracing::warn!(path = %path.display(), error = %e, "failed to publish");
        }
        if let Some(cache) = cache
            && let Err(e) =
                cache.write(members, &averaged.composite, mode, exposure_seconds, Utc::now())
        {
            tracing::warn!(dir = %cache.dir().display(), error = %e, "failed to write cache entry");
        }

        Ok(GroupResult {
            path: path.to_path_buf(),
            date,
            count: members.len(),
            exposure_seconds,
            elapsed: self.clock.elapsed(&start),
            diagnostics: averaged.diagnostics,
        })
    }
}

/// Open the cache in `dir`, starting over when its index is unreadable.
fn open_cache(dir: PathBuf, retention: usize) -> Result<CompositeCache, CacheError> {
    match CompositeCache::open(&dir, retention) {
        Err(e @ CacheError::ParseIndex { .. }) => {
            tracing::warn!(error = %e, "discarding unreadable cache index");
            CompositeCache::empty(dir, retention)
        }
        result => result,
    }
}

/// Encode `image` as JPEG and move it into place at `path`.
///
/// The bytes go to a sibling temporary file first so an interrupted
/// run never leaves a truncated composite that a rerun would skip.
fn write_jpeg(path: &Path, image: &RgbImage, quality: u8) -> Result<(), AverageError> {
    let mut bytes = Vec::new();
    JpegEncoder::new_with_quality(&mut bytes, quality)
        .write_image(
            image.as_raw(),
            image.width(),
            image.height(),
            image::ExtendedColorType::Rgb8,
        )
        .map_err(AverageError::Encode)?;

    let write_err = |source| AverageError::WriteOutput {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(write_err)?;
    }
    let partial = path.with_extension("jpg.partial");
    fs::write(&partial, bytes).map_err(write_err)?;
    fs::rename(&partial, path).map_err(write_err)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn only_months_and_years_are_cached() {
        let config = CacheConfig::default();
        assert_eq!(config.dir_for(Granularity::Day), None);
        assert_eq!(
            config.dir_for(Granularity::Month),
            Some(PathBuf::from(".avg_cache/monthly"))
        );
        assert_eq!(
            config.dir_for(Granularity::Year),
            Some(PathBuf::from(".avg_cache/yearly"))
        );
    }

    #[test]
    fn config_fills_missing_fields_with_defaults() {
        let config: AveragerConfig =
            serde_json::from_str(r#"{"output_dir": "/out", "mode": "pad"}"#).unwrap();
        assert_eq!(config.output_dir, PathBuf::from("/out"));
        assert_eq!(config.mode, CombinationMode::Pad);
        assert_eq!(config.jpeg_quality, DEFAULT_JPEG_QUALITY);
        assert_eq!(config.credits.copyright, DEFAULT_COPYRIGHT);
        assert_eq!(config.cache, Some(CacheConfig::default()));
        assert_eq!(config.publish, vec![Granularity::Day]);
    }

    #[test]
    fn publish_list_is_configurable() {
        let config: AveragerConfig =
            serde_json::from_str(r#"{"publish": ["month", "year"]}"#).unwrap();
        assert_eq!(config.publish, vec![Granularity::Month, Granularity::Year]);
    }

    #[test]
    fn null_cache_disables_it() {
        let config: AveragerConfig = serde_json::from_str(r#"{"cache": null}"#).unwrap();
        assert_eq!(config.cache, None);
    }

    #[test]
    fn summary_counts_outcomes() {
        let mut report = RunReport::new(Granularity::Month);
        report.skipped.push(SkippedBucket {
            date: NaiveDate::from_ymd_opt(2017, 1, 1).unwrap(),
            reason: SkipReason::SingleMember,
        });
        report.elapsed = Duration::from_millis(1500);
        assert_eq!(report.summary(), "month: 0 generated, 1 skipped, 0 failed in 1.500s");
        assert!(!report.has_failures());
    }

    #[test]
    fn write_jpeg_creates_parent_and_leaves_no_partial() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("01/20170120.jpg");
        write_jpeg(&path, &RgbImage::new(8, 8), DEFAULT_JPEG_QUALITY).unwrap();
        assert!(path.exists());
        assert!(!path.with_extension("jpg.partial").exists());
        let decoded = image::open(&path).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (8, 8));
    }
}
