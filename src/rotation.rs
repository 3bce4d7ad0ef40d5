// Copyright 2024 FastLabs Developers
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::path::Path;
use std::path::PathBuf;

use jiff::SignedDuration;
use jiff::Zoned;

use crate::Error;
use crate::ErrorKind;

/// Hour resolution: two checkpoints in the same hour map to the same file.
const FILENAME_DATE_FORMAT: &str = "%Y-%m-%d-%H";
const LINE_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Defines the elapsed time after which the active file is switched.
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub(crate) struct Rotation {
    interval: SignedDuration,
}

impl Rotation {
    pub fn new(interval: SignedDuration) -> Result<Self, Error> {
        if interval.is_negative() {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                "rotation interval must not be negative",
            )
            .with_context("interval", interval));
        }
        Ok(Self { interval })
    }

    pub fn hours(hours: u32) -> Self {
        Self {
            interval: SignedDuration::from_hours(i64::from(hours)),
        }
    }

    pub fn interval(&self) -> SignedDuration {
        self.interval
    }

    /// Whether the checkpoint is stale at `now`.
    ///
    /// A clock that moved backwards yields a negative elapsed time and never triggers.
    pub fn should_rotate(&self, checkpoint: &Zoned, now: &Zoned) -> bool {
        now.duration_since(checkpoint) >= self.interval
    }
}

/// The parts of a base name that the active file name is derived from.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct BaseName {
    path: PathBuf,
    dir: PathBuf,
    stem: String,
    ext: String,
}

impl BaseName {
    /// Split `path` into directory, stem and extension.
    ///
    /// The extension starts at the last `.` of the file name, so `.bashrc` has an empty stem.
    pub fn parse(path: impl Into<PathBuf>) -> Result<Self, Error> {
        let path = path.into();
        let invalid = |message: &str| {
            Error::new(ErrorKind::InvalidInput, message).with_context("base_name", path.display())
        };

        let text = path
            .to_str()
            .ok_or_else(|| invalid("base name must be valid UTF-8"))?;
        if text.ends_with(std::path::is_separator) {
            return Err(invalid("base name must not end with a path separator"));
        }
        let filename = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| invalid("base name must name a file"))?;

        let (stem, ext) = match filename.rfind('.') {
            Some(pos) => filename.split_at(pos),
            None => (filename, ""),
        };
        let dir = path.parent().map(Path::to_path_buf).unwrap_or_default();

        Ok(Self {
            stem: stem.to_string(),
            ext: ext.to_string(),
            dir,
            path,
        })
    }

    pub fn as_path(&self) -> &Path {
        &self.path
    }

    /// Derive the active file path for a checkpoint: `dir/stem_<YYYY-MM-DD-HH>.ext`.
    pub fn active_path(&self, checkpoint: &Zoned) -> PathBuf {
        let date = checkpoint.strftime(FILENAME_DATE_FORMAT);
        let filename = format!("{}_{}{}", self.stem, date, self.ext);
        self.dir.join(filename)
    }
}

/// Format one record as `<category> <YYYY-MM-DD HH:MM:SS> <message>\n`.
pub(crate) fn format_line(category: &str, now: &Zoned, message: &str) -> String {
    format!(
        "{category} {} {message}\n",
        now.strftime(LINE_DATE_FORMAT)
    )
}
