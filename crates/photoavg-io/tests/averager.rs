//! End-to-end runs of the averager over JPEG files in temporary
//! directories. Metadata is constructed directly instead of read with
//! `exiftool`.

#![allow(clippy::unwrap_used, clippy::cast_possible_truncation)]

use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use image::{Rgb, RgbImage};
use photoavg_io::{
    Averager, AveragerConfig, CacheConfig, MetadataError, MetadataWriter, PublishError, Publisher,
    SkipReason,
};
use photoavg_pipeline::{CombinationMode, Description, Dimensions, Granularity, SourceImage};
use tempfile::TempDir;

struct Photos {
    dir: TempDir,
    images: Vec<SourceImage>,
}

impl Photos {
    fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
            images: Vec::new(),
        }
    }

    /// Write a patterned JPEG and record its metadata.
    fn add(&mut self, name: &str, width: u32, height: u32, timestamp: &str) -> &mut Self {
        let seed = self.images.len() as u32;
        let image = RgbImage::from_fn(width, height, |x, y| {
            let v = (x * 5 + y * 3 + seed * 41) % 230;
            Rgb([v as u8, (v / 2 + 10) as u8, (230 - v) as u8])
        });
        let path = self.dir.path().join(name);
        image.save(&path).unwrap();

        self.images.push(SourceImage {
            path,
            dimensions: Dimensions::new(width, height),
            exposure_seconds: 0.5,
            captured: NaiveDateTime::parse_from_str(timestamp, "%Y-%m-%d %H:%M:%S").unwrap(),
            keywords: Vec::new(),
        });
        self
    }
}

fn config(output: &Path, mode: CombinationMode, cache: Option<&Path>) -> AveragerConfig {
    AveragerConfig {
        output_dir: output.to_path_buf(),
        mode,
        cache: cache.map(|dir| CacheConfig {
            dir: dir.to_path_buf(),
            retention: 2,
        }),
        ..AveragerConfig::default()
    }
}

fn one_day() -> Photos {
    let mut photos = Photos::new();
    photos
        .add("a.jpg", 200, 150, "2017-01-20 08:00:00")
        .add("b.jpg", 131, 111, "2017-01-20 12:00:00")
        .add("c.jpg", 160, 199, "2017-01-20 19:00:00");
    photos
}

fn dimensions_of(path: &Path) -> (u32, u32) {
    let image = image::open(path).unwrap();
    (image.width(), image.height())
}

#[test]
fn pad_uses_largest_extent() {
    let photos = one_day();
    let out = tempfile::tempdir().unwrap();

    let report = Averager::new(config(out.path(), CombinationMode::Pad, None))
        .run(&photos.images, Granularity::Day)
        .unwrap();

    assert_eq!(report.generated.len(), 1);
    let result = &report.generated[0];
    assert_eq!(result.path, out.path().join("01/20170120.jpg"));
    assert_eq!(result.count, 3);
    assert!((result.exposure_seconds - 1.5).abs() < 1e-12);
    assert_eq!(dimensions_of(&result.path), (200, 200));
}

#[test]
fn crop_uses_smallest_extent() {
    let photos = one_day();
    let out = tempfile::tempdir().unwrap();

    let report = Averager::new(config(out.path(), CombinationMode::Crop, None))
        .run(&photos.images, Granularity::Day)
        .unwrap();

    assert_eq!(dimensions_of(&report.generated[0].path), (110, 110));
}

#[test]
fn resize_covers_largest_extent() {
    let photos = one_day();
    let out = tempfile::tempdir().unwrap();

    let report = Averager::new(config(out.path(), CombinationMode::Resize, None))
        .run(&photos.images, Granularity::Day)
        .unwrap();

    assert_eq!(dimensions_of(&report.generated[0].path), (200, 200));
}

#[test]
fn rerun_skips_existing_output() {
    let photos = one_day();
    let out = tempfile::tempdir().unwrap();
    let averager = Averager::new(config(out.path(), CombinationMode::Crop, None));

    let first = averager.run(&photos.images, Granularity::Day).unwrap();
    let path = first.generated[0].path.clone();
    let before = fs::read(&path).unwrap();

    let second = averager.run(&photos.images, Granularity::Day).unwrap();
    assert!(second.generated.is_empty());
    assert_eq!(second.skipped.len(), 1);
    assert_eq!(second.skipped[0].reason, SkipReason::AlreadyGenerated);
    assert_eq!(fs::read(&path).unwrap(), before);
}

#[test]
fn single_member_buckets_are_skipped() {
    let mut photos = one_day();
    photos.add("d.jpg", 120, 120, "2017-01-21 09:00:00");
    let out = tempfile::tempdir().unwrap();

    let report = Averager::new(config(out.path(), CombinationMode::Crop, None))
        .run(&photos.images, Granularity::Day)
        .unwrap();

    assert_eq!(report.generated.len(), 1);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].reason, SkipReason::SingleMember);
    assert!(!out.path().join("01/20170121.jpg").exists());
}

#[test]
fn failed_bucket_does_not_stop_the_run() {
    let mut photos = one_day();
    photos
        .add("d.jpg", 120, 120, "2017-01-21 09:00:00")
        .add("e.jpg", 120, 120, "2017-01-21 10:00:00");
    fs::remove_file(&photos.images[4].path).unwrap();
    let out = tempfile::tempdir().unwrap();

    let report = Averager::new(config(out.path(), CombinationMode::Crop, None))
        .run(&photos.images, Granularity::Day)
        .unwrap();

    assert_eq!(report.generated.len(), 1);
    assert_eq!(report.failed.len(), 1);
    assert!(report.has_failures());
    assert!(report.failed[0].error.contains("e.jpg"));
    assert!(!report.failed[0].path.exists());
}

#[test]
fn cached_month_matches_full_recompute() {
    let mut photos = Photos::new();
    photos
        .add("a.jpg", 140, 120, "2017-01-03 08:00:00")
        .add("b.jpg", 150, 130, "2017-01-09 08:00:00")
        .add("c.jpg", 160, 124, "2017-01-14 08:00:00");
    let cache = tempfile::tempdir().unwrap();
    let cached_out = tempfile::tempdir().unwrap();
    let averager = Averager::new(config(
        cached_out.path(),
        CombinationMode::Crop,
        Some(cache.path()),
    ));

    let first = averager.run(&photos.images, Granularity::Month).unwrap();
    assert_eq!(first.generated[0].cached_images(), 0);
    assert!(cache.path().join("monthly/index.json").exists());

    // A smaller image shrinks the crop, so the cached sum is reshaped.
    photos.add("d.jpg", 130, 114, "2017-01-25 08:00:00");
    let second = averager.run(&photos.images, Granularity::Month).unwrap();
    assert_eq!(second.generated.len(), 1);
    let cached = &second.generated[0];
    assert_eq!(cached.cached_images(), 3);
    assert_eq!(cached.count, 4);
    assert_eq!(cached.path, cached_out.path().join("201701_03-25.jpg"));

    let fresh_out = tempfile::tempdir().unwrap();
    let fresh = Averager::new(config(fresh_out.path(), CombinationMode::Crop, None))
        .run(&photos.images, Granularity::Month)
        .unwrap();
    let fresh = &fresh.generated[0];
    assert_eq!(fresh.cached_images(), 0);
    assert_eq!(fs::read(&cached.path).unwrap(), fs::read(&fresh.path).unwrap());
}

#[test]
fn renamed_member_misses_the_cache() {
    let mut photos = Photos::new();
    photos
        .add("a.jpg", 120, 120, "2017-01-03 08:00:00")
        .add("b.jpg", 120, 120, "2017-01-09 08:00:00");
    let cache = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let averager = Averager::new(config(out.path(), CombinationMode::Pad, Some(cache.path())));
    averager.run(&photos.images, Granularity::Month).unwrap();

    let renamed = photos.dir.path().join("b2.jpg");
    fs::rename(&photos.images[1].path, &renamed).unwrap();
    photos.images[1].path = renamed;
    photos.add("c.jpg", 120, 120, "2017-01-20 08:00:00");

    let report = averager.run(&photos.images, Granularity::Month).unwrap();
    assert_eq!(report.generated[0].cached_images(), 0);
}

#[test]
fn days_are_never_cached() {
    let photos = one_day();
    let cache = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();

    Averager::new(config(out.path(), CombinationMode::Crop, Some(cache.path())))
        .run(&photos.images, Granularity::Day)
        .unwrap();
    assert_eq!(fs::read_dir(cache.path()).unwrap().count(), 0);
}

#[derive(Default)]
struct Recorder {
    calls: RefCell<Vec<(PathBuf, String)>>,
    fail: bool,
}

impl MetadataWriter for Recorder {
    fn write(&self, path: &Path, description: &Description) -> Result<(), MetadataError> {
        self.calls
            .borrow_mut()
            .push((path.to_path_buf(), description.title.clone()));
        if self.fail {
            return Err(MetadataError::MissingTag {
                path: path.to_path_buf(),
                tag: "IPTC:ObjectName",
            });
        }
        Ok(())
    }
}

impl Publisher for Recorder {
    fn publish(&self, path: &Path, description: &Description) -> Result<(), PublishError> {
        self.calls
            .borrow_mut()
            .push((path.to_path_buf(), description.title.clone()));
        Ok(())
    }
}

#[test]
fn collaborators_see_every_composite() {
    let photos = one_day();
    let out = tempfile::tempdir().unwrap();
    let writer = Recorder::default();
    let publisher = Recorder::default();

    let report = Averager::new(config(out.path(), CombinationMode::Crop, None))
        .with_metadata_writer(&writer)
        .with_publisher(&publisher)
        .run(&photos.images, Granularity::Day)
        .unwrap();

    let expected = vec![(report.generated[0].path.clone(), "avg20170120".to_owned())];
    assert_eq!(*writer.calls.borrow(), expected);
    assert_eq!(*publisher.calls.borrow(), expected);
}

#[test]
fn metadata_failure_keeps_the_composite() {
    let photos = one_day();
    let out = tempfile::tempdir().unwrap();
    let writer = Recorder {
        fail: true,
        ..Recorder::default()
    };

    let report = Averager::new(config(out.path(), CombinationMode::Crop, None))
        .with_metadata_writer(&writer)
        .run(&photos.images, Granularity::Day)
        .unwrap();

    assert_eq!(report.generated.len(), 1);
    assert!(!report.has_failures());
    assert!(report.generated[0].path.exists());
}

#[test]
fn truncated_cache_index_is_rebuilt() {
    let mut photos = Photos::new();
    photos
        .add("a.jpg", 120, 120, "2017-01-03 08:00:00")
        .add("b.jpg", 120, 120, "2017-01-09 08:00:00");
    let cache = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let averager = Averager::new(config(out.path(), CombinationMode::Crop, Some(cache.path())));
    averager.run(&photos.images, Granularity::Month).unwrap();

    let index = cache.path().join("monthly/index.json");
    let bytes = fs::read(&index).unwrap();
    fs::write(&index, &bytes[..bytes.len() / 2]).unwrap();
    photos.add("c.jpg", 120, 120, "2017-01-20 08:00:00");

    let report = averager.run(&photos.images, Granularity::Month).unwrap();
    assert_eq!(report.generated.len(), 1);
    assert_eq!(report.generated[0].cached_images(), 0);
    assert!(report.generated[0].path.exists());

    // The rewritten index is usable by the next run.
    let reopened = photoavg_io::CompositeCache::open(cache.path().join("monthly"), 2).unwrap();
    assert_eq!(reopened.len(), 1);
}

#[test]
fn only_days_are_published_by_default() {
    let mut photos = one_day();
    photos.add("d.jpg", 120, 120, "2017-02-02 09:00:00");
    let out = tempfile::tempdir().unwrap();
    let publisher = Recorder::default();
    let averager =
        Averager::new(config(out.path(), CombinationMode::Crop, None)).with_publisher(&publisher);

    for granularity in [Granularity::Day, Granularity::Month, Granularity::Year] {
        averager.run(&photos.images, granularity).unwrap();
    }

    let titles: Vec<String> = publisher.calls.borrow().iter().map(|(_, t)| t.clone()).collect();
    assert_eq!(titles, ["avg20170120"]);
}

#[test]
fn published_granularities_follow_config() {
    let photos = one_day();
    let out = tempfile::tempdir().unwrap();
    let publisher = Recorder::default();
    let config = AveragerConfig {
        publish: vec![Granularity::Year],
        ..config(out.path(), CombinationMode::Crop, None)
    };
    let averager = Averager::new(config).with_publisher(&publisher);

    averager.run(&photos.images, Granularity::Day).unwrap();
    averager.run(&photos.images, Granularity::Year).unwrap();

    let titles: Vec<String> = publisher.calls.borrow().iter().map(|(_, t)| t.clone()).collect();
    assert_eq!(titles, ["avg 2017"]);
}
