//! Grouping of source images into day, month, and year buckets.
//!
//! Each image's grouping date is its capture date, unless a grouping
//! tag prefix is configured and exactly one of the image's keywords
//! contains it. In that case the prefix is stripped and the remainder
//! parsed as `YYYYMMDD`, which lets a photo taken after midnight still
//! count towards the previous day.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{Datelike, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::types::{Dimensions, PipelineError};

/// Date format of a grouping tag suffix.
pub const TAG_DATE_FORMAT: &str = "%Y%m%d";

/// One source photograph, as described by its metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceImage {
    /// Location of the encoded image.
    pub path: PathBuf,
    /// Pixel dimensions reported by the metadata.
    pub dimensions: Dimensions,
    /// Exposure duration in seconds.
    pub exposure_seconds: f64,
    /// Capture timestamp.
    pub captured: NaiveDateTime,
    /// IPTC keywords.
    #[serde(default)]
    pub keywords: Vec<String>,
}

impl SourceImage {
    /// The base file name, used for cache keys and logging.
    #[must_use]
    pub fn file_name(&self) -> String {
        file_name(&self.path)
    }

    /// Timestamp used to bucket and order this image.
    ///
    /// A matching grouping tag yields midnight of the tagged date;
    /// otherwise the capture timestamp is used.
    #[must_use]
    pub fn grouping_timestamp(&self, tag_prefix: Option<&str>) -> NaiveDateTime {
        tag_prefix
            .and_then(|prefix| self.tagged_date(prefix))
            .and_then(|date| date.and_hms_opt(0, 0, 0))
            .unwrap_or(self.captured)
    }

    /// Date used to bucket this image.
    #[must_use]
    pub fn grouping_date(&self, tag_prefix: Option<&str>) -> NaiveDate {
        self.grouping_timestamp(tag_prefix).date()
    }

    fn tagged_date(&self, prefix: &str) -> Option<NaiveDate> {
        let mut matches = self.keywords.iter().filter(|k| k.contains(prefix));
        let keyword = matches.next()?;
        if matches.next().is_some() {
            tracing::warn!(
                path = %self.path.display(),
                prefix,
                "several keywords match the grouping tag, using capture date"
            );
            return None;
        }

        let suffix = keyword.replacen(prefix, "", 1);
        match NaiveDate::parse_from_str(suffix.trim(), TAG_DATE_FORMAT) {
            Ok(date) => Some(date),
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    keyword = %keyword,
                    error = %e,
                    "grouping tag is not a date, using capture date"
                );
                None
            }
        }
    }
}

/// Base file name of `path` as a lossy UTF-8 string.
#[must_use]
pub fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Time span of one bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    /// One calendar day.
    Day,
    /// One calendar month.
    Month,
    /// One calendar year.
    Year,
}

impl Granularity {
    /// All granularities, from finest to coarsest.
    pub const ALL: [Self; 3] = [Self::Day, Self::Month, Self::Year];

    /// Lowercase name, as accepted by [`FromStr`].
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Day => "day",
            Self::Month => "month",
            Self::Year => "year",
        }
    }

    /// First day of the bucket containing `date`.
    #[must_use]
    pub fn bucket_key(self, date: NaiveDate) -> NaiveDate {
        let key = match self {
            Self::Day => Some(date),
            Self::Month => date.with_day(1),
            Self::Year => NaiveDate::from_ymd_opt(date.year(), 1, 1),
        };
        key.unwrap_or(date)
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Granularity {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|g| g.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| PipelineError::InvalidGranularity(s.to_owned()))
    }
}

/// Bucketed images, keyed by the first day of each bucket.
pub type Groups = BTreeMap<NaiveDate, Vec<SourceImage>>;

/// Bucket `images` by `granularity`.
///
/// Members are ordered by grouping timestamp; images with equal
/// timestamps keep their input order. Buckets iterate in ascending
/// date order.
#[must_use]
pub fn group(images: &[SourceImage], granularity: Granularity, tag_prefix: Option<&str>) -> Groups {
    let mut ordered: Vec<(NaiveDateTime, &SourceImage)> = images
        .iter()
        .map(|image| (image.grouping_timestamp(tag_prefix), image))
        .collect();
    ordered.sort_by_key(|(timestamp, _)| *timestamp);

    let mut groups = Groups::new();
    for (timestamp, image) in ordered {
        groups
            .entry(granularity.bucket_key(timestamp.date()))
            .or_default()
            .push(image.clone());
    }
    groups
}

/// Total exposure of a set of images, in seconds.
#[must_use]
pub fn total_exposure(images: &[SourceImage]) -> f64 {
    images.iter().map(|image| image.exposure_seconds).sum()
}
