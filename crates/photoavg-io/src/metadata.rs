//! Reading and writing photo metadata through `exiftool`.
//!
//! The orchestrator only sees the [`MetadataReader`] and
//! [`MetadataWriter`] traits; [`ExifTool`] implements both by running
//! the external `exiftool` program.

use std::path::{Path, PathBuf};
use std::process::Command;

use chrono::NaiveDateTime;
use photoavg_pipeline::{Description, Dimensions, SourceImage};
use serde::Deserialize;
use serde_json::Value;

use crate::error::MetadataError;

/// Timestamp format used by EXIF and IPTC date tags.
pub const EXIF_DATETIME_FORMAT: &str = "%Y:%m:%d %H:%M:%S";

/// Paths passed to a single `exiftool` invocation.
const BATCH_SIZE: usize = 256;

const EXPOSURE_TAG: &str = "EXIF:ExposureTime";
const WIDTH_TAG: &str = "File:ImageWidth";
const HEIGHT_TAG: &str = "File:ImageHeight";
const KEYWORDS_TAG: &str = "IPTC:Keywords";
const CREATED_TAG: &str = "Composite:DateTimeCreated";
const ORIGINAL_TAG: &str = "EXIF:DateTimeOriginal";

/// Reads the metadata needed to group and average source images.
pub trait MetadataReader {
    /// Describe every file in `paths`, in the same order.
    ///
    /// # Errors
    ///
    /// Returns an error if the metadata cannot be read or a required
    /// tag is missing.
    fn read(&self, paths: &[PathBuf]) -> Result<Vec<SourceImage>, MetadataError>;
}

/// Stores descriptive metadata on a finished composite.
pub trait MetadataWriter {
    /// Tag the image at `path` with `description`.
    ///
    /// # Errors
    ///
    /// Returns an error if the tags cannot be written.
    fn write(&self, path: &Path, description: &Description) -> Result<(), MetadataError>;
}

/// [`MetadataReader`] and [`MetadataWriter`] backed by `exiftool`.
#[derive(Debug, Clone)]
pub struct ExifTool {
    program: PathBuf,
}

impl Default for ExifTool {
    fn default() -> Self {
        Self::new("exiftool")
    }
}

impl ExifTool {
    /// Use the `exiftool` executable at `program`.
    #[must_use]
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn run(&self, command: &mut Command) -> Result<Vec<u8>, MetadataError> {
        tracing::debug!(command = ?command, "running exiftool");
        let output = command.output().map_err(|source| MetadataError::Spawn {
            program: self.program.clone(),
            source,
        })?;
        if !output.status.success() {
            return Err(MetadataError::Failed {
                program: self.program.clone(),
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
            });
        }
        Ok(output.stdout)
    }
}

impl MetadataReader for ExifTool {
    fn read(&self, paths: &[PathBuf]) -> Result<Vec<SourceImage>, MetadataError> {
        let mut images = Vec::with_capacity(paths.len());
        for batch in paths.chunks(BATCH_SIZE) {
            let mut command = Command::new(&self.program);
            command.args(["-j", "-n", "-G"]);
            for tag in [
                EXPOSURE_TAG,
                WIDTH_TAG,
                HEIGHT_TAG,
                KEYWORDS_TAG,
                CREATED_TAG,
                ORIGINAL_TAG,
            ] {
                command.arg(format!("-{tag}"));
            }
            command.args(batch);

            let stdout = self.run(&mut command)?;
            images.extend(parse_exiftool_json(&stdout)?);
        }
        Ok(images)
    }
}

impl MetadataWriter for ExifTool {
    fn write(&self, path: &Path, description: &Description) -> Result<(), MetadataError> {
        let mut command = Command::new(&self.program);
        command.args(write_args(description)).arg(path);
        self.run(&mut command)?;
        tracing::debug!(path = %path.display(), title = %description.title, "wrote metadata");
        Ok(())
    }
}

/// `exiftool` arguments that apply `description`.
#[must_use]
pub fn write_args(description: &Description) -> Vec<String> {
    let credits = &description.credits;
    let mut args = vec![
        "-overwrite_original".to_owned(),
        format!("-IPTC:ObjectName={}", description.title),
        format!("-IPTC:Caption-Abstract={}", description.caption),
    ];
    args.extend(
        description
            .keywords
            .iter()
            .map(|keyword| format!("-{KEYWORDS_TAG}={keyword}")),
    );
    args.extend([
        format!("-EXIF:Software={}", description.software),
        format!(
            "-{ORIGINAL_TAG}={}",
            description.created.format(EXIF_DATETIME_FORMAT)
        ),
        format!("-IPTC:By-Line={}", credits.author),
        format!("-EXIF:Artist={}", credits.author),
        format!("-EXIF:Copyright={}", credits.copyright),
        format!("-IPTC:CopyrightNotice={}", credits.copyright),
    ]);
    args
}

/// One file as reported by `exiftool -j -n -G`.
#[derive(Debug, Deserialize)]
struct ExifRecord {
    #[serde(rename = "SourceFile")]
    source_file: PathBuf,
    #[serde(rename = "EXIF:ExposureTime")]
    exposure_time: Option<f64>,
    #[serde(rename = "File:ImageWidth")]
    width: Option<u32>,
    #[serde(rename = "File:ImageHeight")]
    height: Option<u32>,
    #[serde(rename = "IPTC:Keywords")]
    keywords: Option<Value>,
    #[serde(rename = "Composite:DateTimeCreated")]
    date_created: Option<String>,
    #[serde(rename = "EXIF:DateTimeOriginal")]
    date_original: Option<String>,
}

/// Parse the JSON printed by `exiftool -j -n -G`.
///
/// The capture time is taken from `Composite:DateTimeCreated`, falling
/// back to `EXIF:DateTimeOriginal`; any timezone suffix is ignored. A
/// missing exposure time counts as zero seconds.
///
/// # Errors
///
/// Returns an error for malformed JSON, a missing size or capture
/// time, or an unparsable timestamp.
pub fn parse_exiftool_json(json: &[u8]) -> Result<Vec<SourceImage>, MetadataError> {
    let records: Vec<ExifRecord> = serde_json::from_slice(json)?;
    records.into_iter().map(into_source_image).collect()
}

fn into_source_image(record: ExifRecord) -> Result<SourceImage, MetadataError> {
    let path = record.source_file;
    let missing = |tag| MetadataError::MissingTag {
        path: path.clone(),
        tag,
    };

    let width = record.width.ok_or_else(|| missing(WIDTH_TAG))?;
    let height = record.height.ok_or_else(|| missing(HEIGHT_TAG))?;
    let timestamp = record
        .date_created
        .or(record.date_original)
        .ok_or_else(|| missing(CREATED_TAG))?;
    let captured = parse_timestamp(&timestamp).ok_or_else(|| MetadataError::InvalidTimestamp {
        path: path.clone(),
        value: timestamp.clone(),
    })?;

    let exposure_seconds = record.exposure_time.unwrap_or_else(|| {
        tracing::warn!(path = %path.display(), "no exposure time, counting as zero");
        0.0
    });

    Ok(SourceImage {
        dimensions: Dimensions::new(width, height),
        exposure_seconds,
        captured,
        keywords: record.keywords.map(keyword_list).unwrap_or_default(),
        path,
    })
}

/// Parse `YYYY:MM:DD HH:MM:SS`, ignoring subseconds and timezone.
fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    let prefix = value.get(..19)?;
    NaiveDateTime::parse_from_str(prefix, EXIF_DATETIME_FORMAT).ok()
}

/// `exiftool` prints one keyword as a scalar and several as an array;
/// with `-n` numeric keywords come back as numbers.
fn keyword_list(value: Value) -> Vec<String> {
    match value {
        Value::Array(items) => items.into_iter().flat_map(keyword_list).collect(),
        Value::String(s) => vec![s],
        Value::Null => Vec::new(),
        other => vec![other.to_string()],
    }
}
