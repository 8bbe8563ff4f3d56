//! Incremental cache of partial composites.
//!
//! Monthly and yearly buckets grow one image at a time, so most of a
//! bucket's sum was already computed on the previous run. After each
//! successful average the full composite sum is stored, keyed by a hash
//! of the members' base file names. The next run looks for an entry
//! whose key matches a prefix of the bucket's members and substitutes
//! it for those images.
//!
//! Cache format:
//! - `index.json`: map of key to [`CacheRecord`]
//! - `{key}.bin`: raw `f32` little-endian sum, row-major RGB,
//!   `dimension * dimension * 3 * 4` bytes
//!
//! Keys depend on file names only, never on pixel data. An entry is
//! sound only while buckets grow by appending newer images and existing
//! files keep their names and content. Reordering, deletion, or
//! replacing a file under the same name produces a stale hit.
//!
//! The index is the sole source of truth. A crash between writing a
//! `.bin` file and the index can leave an orphaned file behind; it is
//! never read.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::hash::Hasher;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use photoavg_pipeline::{
    CombinationMode, Composite, Dimensions, PipelineError, Rgb32FImage, SourceImage,
};
use serde::{Deserialize, Serialize};
use siphasher::sip128::{Hasher128, SipHasher13};

use crate::error::CacheError;

/// File name of the JSON index inside a cache directory.
pub const INDEX_FILE: &str = "index.json";

/// Number of entries kept by default.
pub const DEFAULT_RETENTION: usize = 2;

/// Joins member names before hashing. Never part of a file name.
const KEY_SEPARATOR: &str = "/";

const BYTES_PER_SAMPLE: u64 = 4;

/// One cached composite, as stored in the index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheRecord {
    /// When the entry was written.
    pub created: DateTime<Utc>,
    /// Combination mode the sum was prepared with.
    pub mode: CombinationMode,
    /// Shape of the stored sum.
    pub dimension: Dimensions,
    /// Total exposure of the cached members, in seconds.
    pub exposure_seconds: f64,
    /// Number of members the sum represents.
    pub count: u32,
    /// Backing file, relative to the cache directory.
    pub file: PathBuf,
}

/// Key → record map persisted as `index.json`.
pub type CacheIndex = BTreeMap<String, CacheRecord>;

/// A cache hit standing in for a prefix of a bucket's members.
#[derive(Debug, Clone)]
pub struct CachedPrefix {
    /// Key of the matching entry.
    pub key: String,
    /// Stored sum, already reshaped to the requested dimension.
    pub composite: Composite,
    /// Total exposure recorded with the entry.
    pub exposure_seconds: f64,
}

/// One element of a bucket after cache substitution.
#[derive(Debug, Clone)]
pub enum Member {
    /// A source image that still has to be decoded and folded.
    Source(SourceImage),
    /// A cached sum replacing the first `count` members.
    Cached(CachedPrefix),
}

/// Cache key of an ordered list of base file names.
///
/// 128-bit SipHash-1-3 of the names joined with `/`, as lowercase hex.
#[must_use]
pub fn cache_key<S: AsRef<str>>(names: &[S]) -> String {
    let mut hasher = SipHasher13::new();
    for (i, name) in names.iter().enumerate() {
        if i > 0 {
            hasher.write(KEY_SEPARATOR.as_bytes());
        }
        hasher.write(name.as_ref().as_bytes());
    }
    format!("{:032x}", hasher.finish128().as_u128())
}

fn member_key(members: &[SourceImage]) -> String {
    let names: Vec<String> = members.iter().map(SourceImage::file_name).collect();
    cache_key(&names)
}

/// A directory of cached partial composites.
#[derive(Debug)]
pub struct CompositeCache {
    dir: PathBuf,
    retention: usize,
    index: CacheIndex,
}

impl CompositeCache {
    /// Open (creating if needed) the cache in `dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or an
    /// existing index cannot be read or parsed.
    pub fn open(dir: impl Into<PathBuf>, retention: usize) -> Result<Self, CacheError> {
        let mut cache = Self::empty(dir, retention)?;
        let dir = &cache.dir;

        let index_path = dir.join(INDEX_FILE);
        let index = match fs::read(&index_path) {
            Ok(bytes) => {
                serde_json::from_slice(&bytes).map_err(|source| CacheError::ParseIndex {
                    path: index_path.clone(),
                    source,
                })?
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => CacheIndex::new(),
            Err(source) => {
                return Err(CacheError::ReadIndex {
                    path: index_path,
                    source,
                });
            }
        };

        tracing::debug!(dir = %dir.display(), entries = index.len(), "opened composite cache");
        cache.index = index;
        Ok(cache)
    }

    /// Create (if needed) `dir` and start with no entries, ignoring any
    /// existing index. The next [`write`](Self::write) replaces it.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn empty(dir: impl Into<PathBuf>, retention: usize) -> Result<Self, CacheError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| CacheError::CreateDir {
            path: dir.clone(),
            source,
        })?;
        Ok(Self {
            dir,
            retention,
            index: CacheIndex::new(),
        })
    }

    /// Cache directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Number of indexed entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Whether the index is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// The index as loaded or last written.
    #[must_use]
    pub const fn index(&self) -> &CacheIndex {
        &self.index
    }

    /// Entries sorted newest first.
    fn newest_first(&self) -> Vec<(&String, &CacheRecord)> {
        let mut entries: Vec<_> = self.index.iter().collect();
        entries.sort_by(|a, b| b.1.created.cmp(&a.1.created));
        entries
    }

    /// Replace the leading members covered by a cache entry.
    ///
    /// Entries are tried newest first. An entry matches when its mode
    /// equals `mode`, its count does not exceed the member count, and
    /// its key equals the key of that many leading members. The first
    /// usable match replaces those members with a single
    /// [`Member::Cached`]. Entries whose backing file is unreadable or
    /// whose sum cannot be reshaped to `dimension` are skipped.
    ///
    /// Without a match every member is returned as [`Member::Source`].
    #[must_use]
    pub fn search(
        &self,
        members: &[SourceImage],
        mode: CombinationMode,
        dimension: u32,
    ) -> Vec<Member> {
        for (key, record) in self.newest_first() {
            let Ok(count) = usize::try_from(record.count) else {
                continue;
            };
            if record.mode != mode || count == 0 || count > members.len() {
                continue;
            }
            if member_key(&members[..count]) != *key {
                continue;
            }

            let composite = match self.load(record) {
                Ok(composite) => composite,
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "skipping unreadable cache entry");
                    continue;
                }
            };
            let composite = match composite.reshape(mode, dimension) {
                Ok(composite) => composite,
                Err(e) => {
                    tracing::debug!(key = %key, error = %e, "cache entry does not fit this bucket");
                    continue;
                }
            };

            tracing::info!(
                key = %key,
                cached = count,
                remaining = members.len() - count,
                "cache hit, assuming members were only appended since it was written"
            );
            let mut effective = Vec::with_capacity(members.len() - count + 1);
            effective.push(Member::Cached(CachedPrefix {
                key: key.clone(),
                composite,
                exposure_seconds: record.exposure_seconds,
            }));
            effective.extend(members[count..].iter().cloned().map(Member::Source));
            return effective;
        }

        tracing::debug!(members = members.len(), "cache miss");
        members.iter().cloned().map(Member::Source).collect()
    }

    /// Read the backing file of `record`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, has the wrong
    /// length, or does not describe a square sum.
    pub fn load(&self, record: &CacheRecord) -> Result<Composite, CacheError> {
        let path = self.dir.join(&record.file);
        let bytes = fs::read(&path).map_err(|source| CacheError::ReadComposite {
            path: path.clone(),
            source,
        })?;

        let Some(expected) = record
            .dimension
            .pixel_count()
            .checked_mul(3 * BYTES_PER_SAMPLE)
        else {
            return Err(CacheError::CorruptComposite {
                path,
                expected: u64::MAX,
                actual: bytes.len() as u64,
            });
        };
        if bytes.len() as u64 != expected {
            return Err(CacheError::CorruptComposite {
                path,
                expected,
                actual: bytes.len() as u64,
            });
        }

        let samples: Vec<f32> = bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect();
        let sum = Rgb32FImage::from_raw(record.dimension.width, record.dimension.height, samples)
            .ok_or_else(|| CacheError::CorruptComposite {
                path: path.clone(),
                expected,
                actual: bytes.len() as u64,
            })?;

        Composite::from_sum(sum, record.count)
            .map_err(|source: PipelineError| CacheError::InvalidComposite { path, source })
    }

    /// Store the full composite of `members` and prune old entries.
    ///
    /// Returns the key of the new entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing file or the index cannot be
    /// written, or a pruned file cannot be deleted.
    pub fn write(
        &mut self,
        members: &[SourceImage],
        composite: &Composite,
        mode: CombinationMode,
        exposure_seconds: f64,
        created: DateTime<Utc>,
    ) -> Result<String, CacheError> {
        let key = member_key(members);
        let file = PathBuf::from(format!("{key}.bin"));
        let path = self.dir.join(&file);
        write_sum(&path, composite.sum())?;

        self.index.insert(
            key.clone(),
            CacheRecord {
                created,
                mode,
                dimension: Dimensions::square(composite.dimension()),
                exposure_seconds,
                count: composite.count(),
                file,
            },
        );
        self.prune()?;
        self.persist()?;

        tracing::debug!(key = %key, count = composite.count(), "wrote cache entry");
        Ok(key)
    }

    /// Drop entries beyond the retention count, oldest first.
    fn prune(&mut self) -> Result<(), CacheError> {
        let evicted: Vec<String> = self
            .newest_first()
            .into_iter()
            .skip(self.retention)
            .map(|(key, _)| key.clone())
            .collect();

        for key in evicted {
            let Some(record) = self.index.remove(&key) else {
                continue;
            };
            let path = self.dir.join(&record.file);
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(source) => return Err(CacheError::DeleteComposite { path, source }),
            }
            tracing::debug!(key = %key, "pruned cache entry");
        }
        Ok(())
    }

    fn persist(&self) -> Result<(), CacheError> {
        let path = self.dir.join(INDEX_FILE);
        let json = serde_json::to_vec_pretty(&self.index).map_err(|e| CacheError::WriteIndex {
            path: path.clone(),
            source: io::Error::other(e),
        })?;
        let partial = path.with_extension("json.partial");
        fs::write(&partial, json).map_err(|source| CacheError::WriteIndex {
            path: partial.clone(),
            source,
        })?;
        fs::rename(&partial, &path).map_err(|source| CacheError::WriteIndex { path, source })
    }
}

/// Write a sum as raw little-endian `f32` samples.
fn write_sum(path: &Path, sum: &Rgb32FImage) -> Result<(), CacheError> {
    let write_err = |source| CacheError::WriteComposite {
        path: path.to_path_buf(),
        source,
    };

    let file = File::create(path).map_err(write_err)?;
    let mut writer = BufWriter::new(file);
    for sample in sum.iter() {
        writer.write_all(&sample.to_le_bytes()).map_err(write_err)?;
    }
    writer.flush().map_err(write_err)
}
