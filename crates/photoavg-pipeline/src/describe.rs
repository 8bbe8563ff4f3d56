//! Descriptive metadata attached to each composite.
//!
//! Builds the title, caption, and keyword list that the metadata
//! writer stores as IPTC/EXIF tags. Pure string formatting; writing
//! the tags is the job of the I/O layer.

use chrono::NaiveDate;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::group::Granularity;

/// Software name recorded in every composite.
pub const SOFTWARE_NAME: &str = concat!("photoavg v", env!("CARGO_PKG_VERSION"));

/// Keywords shared by every granularity.
const COMMON_KEYWORDS: [&str; 3] = ["multiple exposure", "art", "average"];

/// Who made a composite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credits {
    /// Author, recorded as byline and artist.
    pub author: String,
    /// Copyright notice.
    pub copyright: String,
}

/// Everything the metadata writer records for one composite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Description {
    /// Object name / title.
    pub title: String,
    /// Caption-abstract, lines separated by carriage returns.
    pub caption: String,
    /// Keyword list.
    pub keywords: Vec<String>,
    /// Producing software.
    pub software: String,
    /// Creation timestamp of the composite.
    pub created: NaiveDateTime,
    /// Author and copyright.
    pub credits: Credits,
}

/// Describe the composite of a bucket.
///
/// `date` is the bucket key, `count` the number of source images and
/// `seconds` their total exposure.
#[must_use]
pub fn describe(
    granularity: Granularity,
    date: NaiveDate,
    count: usize,
    seconds: f64,
    credits: &Credits,
    created: NaiveDateTime,
) -> Description {
    let year = date.format("%Y").to_string();
    let exposure = format!("{count:06} image exposure\r{seconds:.4} seconds exposed");

    let (title, caption, mut keywords) = match granularity {
        Granularity::Day => {
            let day = date.format("%Y%m%d").to_string();
            (
                format!("avg{day}"),
                exposure,
                vec![
                    format!("avgday:date={day}"),
                    format!("avgday:count={count}"),
                    year,
                ],
            )
        }
        Granularity::Month => {
            let month_name = date.format("%B").to_string().to_lowercase();
            let short_month = date.format("%b").to_string().to_lowercase();
            (
                format!("avg {short_month}"),
                format!("average of all daily photos published {month_name} {year}\r{exposure}"),
                vec![
                    format!("avgmonth:date={}", date.format("%Y%m")),
                    format!("avgmonth:count={count}"),
                    year,
                    month_name,
                ],
            )
        }
        Granularity::Year => (
            format!("avg {year}"),
            format!("average of all daily photos published in {year}\r{exposure}"),
            vec![
                format!("avgyear:date={year}"),
                format!("avgyear:count={count}"),
                year,
            ],
        ),
    };
    keywords.extend(COMMON_KEYWORDS.iter().map(|k| (*k).to_owned()));

    Description {
        title,
        caption,
        keywords,
        software: SOFTWARE_NAME.to_owned(),
        created,
        credits: credits.clone(),
    }
}
