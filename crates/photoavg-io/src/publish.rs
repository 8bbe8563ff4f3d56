//! Publishing finished composites to an outside service.

use std::path::{Path, PathBuf};
use std::process::Command;

use photoavg_pipeline::Description;

use crate::error::PublishError;

/// Hands a finished composite to an outside service.
pub trait Publisher {
    /// Publish the composite at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if publishing fails. Callers treat this as
    /// non-fatal: the composite has already been written.
    fn publish(&self, path: &Path, description: &Description) -> Result<(), PublishError>;
}

/// Publishes by running an external program.
///
/// The program is invoked as `program [args...] <path> <title>`, so an
/// upload script only has to read its last two arguments.
#[derive(Debug, Clone)]
pub struct CommandPublisher {
    program: PathBuf,
    args: Vec<String>,
}

impl CommandPublisher {
    /// Run `program` with no extra arguments.
    #[must_use]
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Split a shell-style command line on whitespace into a program
    /// and leading arguments. Returns `None` for a blank line.
    #[must_use]
    pub fn from_command_line(line: &str) -> Option<Self> {
        let mut words = line.split_whitespace();
        let program = words.next()?;
        Some(Self::new(program).with_args(words.map(str::to_owned)))
    }

    /// Add leading arguments.
    #[must_use]
    pub fn with_args(mut self, args: impl IntoIterator<Item = String>) -> Self {
        self.args.extend(args);
        self
    }
}

impl Publisher for CommandPublisher {
    fn publish(&self, path: &Path, description: &Description) -> Result<(), PublishError> {
        let mut command = Command::new(&self.program);
        command.args(&self.args).arg(path).arg(&description.title);

        tracing::info!(path = %path.display(), program = %self.program.display(), "publishing");
        let output = command.output().map_err(|source| PublishError::Spawn {
            program: self.program.clone(),
            source,
        })?;
        if !output.status.success() {
            return Err(PublishError::Failed {
                program: self.program.clone(),
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::NaiveDate;
    use photoavg_pipeline::{Credits, Granularity, describe};

    use super::*;

    fn description() -> Description {
        let date = NaiveDate::from_ymd_opt(2017, 1, 20).unwrap();
        let created = date.and_hms_opt(12, 0, 0).unwrap();
        let credits = Credits {
            author: "a".to_owned(),
            copyright: "c".to_owned(),
        };
        describe(Granularity::Day, date, 2, 1.0, &credits, created)
    }

    #[test]
    fn command_line_splits_program_and_args() {
        let publisher = CommandPublisher::from_command_line("upload.sh --album daily").unwrap();
        assert_eq!(publisher.program, PathBuf::from("upload.sh"));
        assert_eq!(publisher.args, vec!["--album", "daily"]);
        assert!(CommandPublisher::from_command_line("   ").is_none());
    }

    #[cfg(unix)]
    #[test]
    fn successful_command_publishes() {
        let publisher = CommandPublisher::new("true");
        publisher
            .publish(Path::new("/tmp/x.jpg"), &description())
            .unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn failing_command_is_reported() {
        let publisher = CommandPublisher::new("false");
        assert!(matches!(
            publisher.publish(Path::new("/tmp/x.jpg"), &description()),
            Err(PublishError::Failed { .. })
        ));
    }

    #[cfg(unix)]
    #[test]
    fn arguments_end_with_path_and_title() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("args.txt");
        let publisher = CommandPublisher::new("sh").with_args([
            "-c".to_owned(),
            format!("printf '%s\\n' \"$@\" > {}", log.display()),
            "sh".to_owned(),
        ]);
        publisher
            .publish(Path::new("/out/01/20170120.jpg"), &description())
            .unwrap();

        let written = std::fs::read_to_string(&log).unwrap();
        assert_eq!(written, "/out/01/20170120.jpg\navg20170120\n");
    }

    #[test]
    fn missing_program_is_a_spawn_error() {
        let publisher = CommandPublisher::new("/nonexistent/uploader");
        assert!(matches!(
            publisher.publish(Path::new("x.jpg"), &description()),
            Err(PublishError::Spawn { .. })
        ));
    }
}
