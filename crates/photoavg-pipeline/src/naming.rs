//! Deterministic output file names for bucket composites.
//!
//! | Granularity | Relative path                      |
//! |-------------|------------------------------------|
//! | day         | `MM/YYYYMMDD.jpg`                  |
//! | month       | `YYYYMM_DD-DD.jpg`                 |
//! | year        | `YYYY_MM-DD_MM-DD.jpg`             |
//!
//! Month and year names carry the dates of the first and last members,
//! so a bucket that gains images produces a new file instead of
//! colliding with the earlier, smaller composite.

use std::path::PathBuf;

use chrono::NaiveDate;

use crate::group::{Granularity, SourceImage};

/// Extension of every composite.
pub const EXTENSION: &str = "jpg";

/// Path of a bucket's composite, relative to the output directory.
#[must_use]
pub fn output_path(
    granularity: Granularity,
    key: NaiveDate,
    members: &[SourceImage],
    tag_prefix: Option<&str>,
) -> PathBuf {
    let span = members.first().zip(members.last()).map(|(first, last)| {
        (
            first.grouping_date(tag_prefix),
            last.grouping_date(tag_prefix),
        )
    });

    match granularity {
        Granularity::Day => {
            PathBuf::from(key.format("%m").to_string())
                .join(format!("{}.{EXTENSION}", key.format("%Y%m%d")))
        }
        Granularity::Month => {
            let suffix = span
                .map(|(first, last)| format!("_{}-{}", first.format("%d"), last.format("%d")))
                .unwrap_or_default();
            PathBuf::from(format!("{}{suffix}.{EXTENSION}", key.format("%Y%m")))
        }
        Granularity::Year => {
            let suffix = span
                .map(|(first, last)| {
                    format!("_{}_{}", first.format("%m-%d"), last.format("%m-%d"))
                })
                .unwrap_or_default();
            PathBuf::from(format!("{}{suffix}.{EXTENSION}", key.format("%Y")))
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::group::tests::image_at;

    fn members() -> Vec<SourceImage> {
        vec![
            image_at("a.jpg", "2017-01-03 08:00:00", &[]),
            image_at("b.jpg", "2017-01-20 07:00:00", &["t=20170121"]),
        ]
    }

    #[test]
    fn day_goes_into_month_folder() {
        let key = NaiveDate::from_ymd_opt(2017, 1, 20).unwrap();
        assert_eq!(
            output_path(Granularity::Day, key, &members(), None),
            PathBuf::from("01/20170120.jpg")
        );
    }

    #[test]
    fn month_names_first_and_last_day() {
        let key = NaiveDate::from_ymd_opt(2017, 1, 1).unwrap();
        assert_eq!(
            output_path(Granularity::Month, key, &members(), None),
            PathBuf::from("201701_03-20.jpg")
        );
        assert_eq!(
            output_path(Granularity::Month, key, &members(), Some("t=")),
            PathBuf::from("201701_03-21.jpg")
        );
    }

    #[test]
    fn year_names_first_and_last_month_day() {
        let key = NaiveDate::from_ymd_opt(2017, 1, 1).unwrap();
        assert_eq!(
            output_path(Granularity::Year, key, &members(), None),
            PathBuf::from("2017_01-03_01-20.jpg")
        );
    }

    #[test]
    fn empty_members_drop_the_suffix() {
        let key = NaiveDate::from_ymd_opt(2017, 1, 1).unwrap();
        assert_eq!(
            output_path(Granularity::Year, key, &[], None),
            PathBuf::from("2017.jpg")
        );
    }
}
