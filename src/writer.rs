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

use std::fs;
use std::fs::File;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Mutex;
use std::sync::MutexGuard;

use jiff::SignedDuration;
use jiff::Zoned;

use crate::Error;
use crate::Trap;
use crate::clock::Clock;
use crate::rotation::BaseName;
use crate::rotation::Rotation;
use crate::rotation::format_line;
use crate::trap::BestEffortTrap;

const DEFAULT_ROTATION_HOURS: u32 = 24;
#[cfg(unix)]
const DEFAULT_FILE_MODE: u32 = 0o666;

/// A line writer that switches to a new file once the rotation interval elapses.
///
/// Rotation is checked lazily on every [`write`](RotatingWriter::write); there is no background
/// thread. All writes are serialized by an internal lock, so a writer can be shared between
/// threads by reference or through an `Arc`.
///
/// # Examples
///
/// ```no_run
/// use hourlog::RotatingWriter;
///
/// let writer = RotatingWriter::init("logs/app.log", 1)?;
/// writer.write("INFO", "service started")?;
/// writer.close();
/// # Ok::<(), hourlog::Error>(())
/// ```
#[derive(Debug)]
pub struct RotatingWriter {
    base_name: BaseName,
    rotation: Rotation,
    options: OpenOptions,
    trap: Box<dyn Trap>,
    state: Mutex<State>,
}

#[derive(Debug)]
struct State {
    checkpoint: Zoned,
    current_path: PathBuf,
    handle: Option<File>,
    clock: Clock,
}

impl RotatingWriter {
    /// Create a writer for `base_name` that rotates every `rotation_hours` hours.
    ///
    /// The active file is opened for appending only if it already exists; otherwise nothing is
    /// created until the first write. A zero interval rotates on every write.
    ///
    /// # Errors
    ///
    /// Return an error if either:
    ///
    /// * The base name does not name a file, or is not valid UTF-8.
    /// * The active file exists but cannot be opened.
    pub fn init(base_name: impl Into<PathBuf>, rotation_hours: u32) -> Result<Self, Error> {
        Self::builder(base_name).rotation_hours(rotation_hours).build()
    }

    /// Creates a new [`RotatingWriterBuilder`].
    ///
    /// # Examples
    ///
    /// ```
    /// use hourlog::RotatingWriter;
    ///
    /// let builder = RotatingWriter::builder("logs/app.log").rotation_hours(6);
    /// ```
    #[must_use]
    pub fn builder(base_name: impl Into<PathBuf>) -> RotatingWriterBuilder {
        RotatingWriterBuilder::new(base_name)
    }

    /// Append `<category> <YYYY-MM-DD HH:MM:SS> <message>\n` to the active file.
    ///
    /// The active file is rotated first if the interval has elapsed since the last checkpoint,
    /// and created if no file is open. Neither `category` nor `message` is escaped.
    ///
    /// # Errors
    ///
    /// Return the first error from opening, creating or writing the active file. The writer stays
    /// usable; the next write tries again.
    pub fn write(&self, category: &str, message: &str) -> Result<(), Error> {
        let mut state = self.state();
        let now = state.clock.now();

        if self.rotation.should_rotate(&state.checkpoint, &now) {
            state.checkpoint = now.clone();
            self.rotate(&mut state)?;
        }

        let State {
            current_path,
            handle,
            ..
        } = &mut *state;
        let file = match handle {
            Some(file) => file,
            None => handle.insert(self.open_active_file(current_path)?),
        };

        let line = format_line(category, &now, message);
        file.write_all(line.as_bytes())
            .map_err(|err| Error::from_io_error("failed to write log line", current_path, err))
    }

    /// Release the active file, if any.
    ///
    /// Failures while releasing are discarded. The writer is not terminated: a later
    /// [`write`](RotatingWriter::write) opens the active file again.
    pub fn close(&self) {
        let mut state = self.state();
        if let Some(file) = state.handle.take() {
            log::trace!("closing log file {}", state.current_path.display());
            self.release(file, &state.current_path);
        }
    }

    /// The base name this writer derives its file names from.
    pub fn base_name(&self) -> &Path {
        self.base_name.as_path()
    }

    /// The file currently targeted by writes.
    pub fn current_path(&self) -> PathBuf {
        self.state().current_path.clone()
    }

    /// The elapsed time after which the active file is switched.
    pub fn rotation_interval(&self) -> SignedDuration {
        self.rotation.interval()
    }

    /// Whether a file handle is currently held.
    pub fn is_open(&self) -> bool {
        self.state().handle.is_some()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Switch to the file named after the (already advanced) checkpoint.
    fn rotate(&self, state: &mut State) -> Result<(), Error> {
        if let Some(file) = state.handle.take() {
            self.release(file, &state.current_path);
        }

        state.current_path = self.base_name.active_path(&state.checkpoint);
        log::debug!("rotating log file to {}", state.current_path.display());

        state.handle = Some(self.open_active_file(&state.current_path)?);
        Ok(())
    }

    /// Continue the file at `path` if it exists, create it otherwise.
    fn open_active_file(&self, path: &Path) -> Result<File, Error> {
        let exists = fs::exists(path)
            .map_err(|err| Error::from_io_error("failed to stat log file", path, err))?;
        if exists {
            open_log_file(path)
        } else {
            self.create_log_file(path)
        }
    }

    /// Create a new log file.
    ///
    /// The file is opened in append mode, so a file that appeared since the existence check is
    /// continued rather than overwritten.
    fn create_log_file(&self, path: &Path) -> Result<File, Error> {
        log::debug!("creating log file {}", path.display());
        self.options
            .open(path)
            .map_err(|err| Error::from_io_error("failed to create log file", path, err))
    }

    /// Best-effort release of a file handle; failures go to the trap.
    fn release(&self, mut file: File, path: &Path) {
        if let Err(err) = file.flush() {
            let err = Error::from_io_error("failed to release log file", path, err);
            self.trap.trap(&err);
        }
        drop(file);
    }
}

/// Open an existing log file for appending.
fn open_log_file(path: &Path) -> Result<File, Error> {
    OpenOptions::new()
        .append(true)
        .open(path)
        .map_err(|err| Error::from_io_error("failed to open log file", path, err))
}

/// A builder for configuring [`RotatingWriter`].
#[derive(Debug)]
pub struct RotatingWriterBuilder {
    // required
    base_name: PathBuf,

    // has default
    interval: SignedDuration,
    trap: Box<dyn Trap>,
    #[cfg(unix)]
    mode: u32,
    clock: Clock,
}

impl RotatingWriterBuilder {
    /// Creates a new [`RotatingWriterBuilder`].
    ///
    /// The rotation interval defaults to 24 hours.
    #[must_use]
    pub fn new(base_name: impl Into<PathBuf>) -> Self {
        Self {
            base_name: base_name.into(),
            interval: SignedDuration::from_hours(i64::from(DEFAULT_ROTATION_HOURS)),
            trap: Box::new(BestEffortTrap::default()),
            #[cfg(unix)]
            mode: DEFAULT_FILE_MODE,
            clock: Clock::DefaultClock,
        }
    }

    /// Set the rotation interval in whole hours. Zero rotates on every write.
    #[must_use]
    pub fn rotation_hours(mut self, hours: u32) -> Self {
        self.interval = Rotation::hours(hours).interval();
        self
    }

    /// Set the rotation interval. A negative interval is rejected by [`build`](Self::build).
    #[must_use]
    pub fn rotation_interval(mut self, interval: SignedDuration) -> Self {
        self.interval = interval;
        self
    }

    /// Set the trap for errors discarded while releasing file handles.
    ///
    /// Default to [`BestEffortTrap`].
    ///
    /// # Examples
    ///
    /// ```
    /// use hourlog::RotatingWriter;
    /// use hourlog::trap::DefaultTrap;
    ///
    /// let builder = RotatingWriter::builder("logs/app.log").trap(DefaultTrap::default());
    /// ```
    #[must_use]
    pub fn trap(mut self, trap: impl Into<Box<dyn Trap>>) -> Self {
        self.trap = trap.into();
        self
    }

    /// Set the permission bits of created log files, before the process umask applies.
    ///
    /// Default to `0o666`.
    #[cfg(unix)]
    #[must_use]
    pub fn file_mode(mut self, mode: u32) -> Self {
        self.mode = mode;
        self
    }

    #[cfg(test)]
    fn clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Builds the [`RotatingWriter`].
    ///
    /// # Errors
    ///
    /// Return an error if either:
    ///
    /// * The base name does not name a file, or is not valid UTF-8.
    /// * The rotation interval is negative.
    /// * The active file exists but cannot be opened.
    pub fn build(self) -> Result<RotatingWriter, Error> {
        let Self {
            base_name,
            interval,
            trap,
            #[cfg(unix)]
            mode,
            clock,
        } = self;

        let base_name = BaseName::parse(base_name)?;
        let rotation = Rotation::new(interval)?;

        let mut options = OpenOptions::new();
        options.append(true).create(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(mode);
        }

        let checkpoint = clock.now();
        let current_path = base_name.active_path(&checkpoint);

        // continue an existing file for this hour; a missing one is created on first write
        let exists = fs::exists(&current_path)
            .map_err(|err| Error::from_io_error("failed to stat log file", &current_path, err))?;
        let handle = if exists {
            Some(open_log_file(&current_path)?)
        } else {
            None
        };

        let state = State {
            checkpoint,
            current_path,
            handle,
            clock,
        };

        Ok(RotatingWriter {
            base_name,
            rotation,
            options,
            trap,
            state: Mutex::new(state),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::io;
    use std::ops::Add;
    use std::str::FromStr;
    use std::sync::Arc;

    use jiff::Span;
    use jiff::Zoned;
    use tempfile::TempDir;

    use super::*;
    use crate::ErrorKind;
    use crate::clock::ManualClock;
    use crate::trap::testing::CollectingTrap;

    fn start_time() -> Zoned {
        Zoned::from_str("2024-08-10T17:12:52+08[+08]").unwrap()
    }

    fn build_writer(temp_dir: &TempDir, hours: u32, now: Zoned) -> RotatingWriter {
        RotatingWriterBuilder::new(temp_dir.path().join("app.log"))
            .rotation_hours(hours)
            .clock(Clock::ManualClock(ManualClock::new(now)))
            .build()
            .unwrap()
    }

    fn set_now(writer: &RotatingWriter, now: Zoned) {
        writer.state().clock.set_now(now);
    }

    fn read(temp_dir: &TempDir, filename: &str) -> String {
        fs::read_to_string(temp_dir.path().join(filename)).unwrap()
    }

    fn count_files(temp_dir: &TempDir) -> usize {
        fs::read_dir(temp_dir.path()).unwrap().count()
    }

    #[test]
    fn test_build_is_lazy() {
        let temp_dir = TempDir::new().expect("failed to create a temporary directory");
        let writer = build_writer(&temp_dir, 1, start_time());

        assert!(!writer.is_open());
        assert_eq!(count_files(&temp_dir), 0);
        assert_eq!(
            writer.current_path(),
            temp_dir.path().join("app_2024-08-10-17.log")
        );

        writer.write("ERROR", "boot failed").unwrap();
        assert!(writer.is_open());
        assert_eq!(
            read(&temp_dir, "app_2024-08-10-17.log"),
            "ERROR 2024-08-10 17:12:52 boot failed\n"
        );
    }

    #[test]
    fn test_no_rotation_within_interval() {
        let temp_dir = TempDir::new().expect("failed to create a temporary directory");
        let start = start_time();
        let writer = build_writer(&temp_dir, 1, start.clone());

        // crossing the hour boundary does not rotate; only elapsed time does
        let mut now = start.clone();
        let end = start.add(Span::new().minutes(59).seconds(59));
        while now <= end {
            set_now(&writer, now.clone());
            writer.write("INFO", "tick").unwrap();
            now = now.add(Span::new().minutes(5));
        }

        assert_eq!(count_files(&temp_dir), 1);
        let content = read(&temp_dir, "app_2024-08-10-17.log");
        assert_eq!(content.lines().count(), 12);
        assert!(content.ends_with("INFO 2024-08-10 18:07:52 tick\n"));
    }

    #[test]
    fn test_rotation_on_threshold() {
        let temp_dir = TempDir::new().expect("failed to create a temporary directory");
        let start = start_time();
        let writer = build_writer(&temp_dir, 1, start.clone());

        writer.write("ERROR", "boot failed").unwrap();

        set_now(&writer, start.add(Span::new().hours(1).minutes(1)));
        writer.write("INFO", "recovered").unwrap();

        assert_eq!(count_files(&temp_dir), 2);
        assert_eq!(
            read(&temp_dir, "app_2024-08-10-17.log"),
            "ERROR 2024-08-10 17:12:52 boot failed\n"
        );
        assert_eq!(
            read(&temp_dir, "app_2024-08-10-18.log"),
            "INFO 2024-08-10 18:13:52 recovered\n"
        );
        assert_eq!(
            writer.current_path(),
            temp_dir.path().join("app_2024-08-10-18.log")
        );
    }

    #[test]
    fn test_rotation_resets_checkpoint() {
        let temp_dir = TempDir::new().expect("failed to create a temporary directory");
        let start = start_time();
        let writer = build_writer(&temp_dir, 2, start.clone());

        // 17:12 -> rotate at 19:12 -> next rotation not before 21:12
        let times = [
            (Span::new().hours(2), "app_2024-08-10-19.log"),
            (Span::new().hours(3), "app_2024-08-10-19.log"),
            (Span::new().hours(3).minutes(59), "app_2024-08-10-19.log"),
            (Span::new().hours(4), "app_2024-08-10-21.log"),
        ];
        for (offset, expected) in times {
            set_now(&writer, start.clone().add(offset));
            writer.write("INFO", "tick").unwrap();
            assert_eq!(writer.current_path(), temp_dir.path().join(expected));
        }
        assert_eq!(read(&temp_dir, "app_2024-08-10-19.log").lines().count(), 3);
        assert_eq!(read(&temp_dir, "app_2024-08-10-21.log").lines().count(), 1);
    }

    #[test]
    fn test_zero_interval_rotates_into_same_hour() {
        let temp_dir = TempDir::new().expect("failed to create a temporary directory");
        let writer = build_writer(&temp_dir, 0, start_time());

        // every write rotates, but within one hour the name collides and appends
        for i in 0..5 {
            writer.write("INFO", &format!("line {i}")).unwrap();
        }

        assert_eq!(count_files(&temp_dir), 1);
        let content = read(&temp_dir, "app_2024-08-10-17.log");
        assert_eq!(content.lines().count(), 5);
        assert!(content.starts_with("INFO 2024-08-10 17:12:52 line 0\n"));
    }

    #[test]
    fn test_clock_moving_backwards_keeps_file() {
        let temp_dir = TempDir::new().expect("failed to create a temporary directory");
        let start = start_time();
        let writer = build_writer(&temp_dir, 1, start.clone());

        writer.write("INFO", "first").unwrap();
        set_now(&writer, start.add(Span::new().hours(-3)));
        writer.write("INFO", "second").unwrap();

        assert_eq!(count_files(&temp_dir), 1);
        assert_eq!(
            read(&temp_dir, "app_2024-08-10-17.log"),
            "INFO 2024-08-10 17:12:52 first\nINFO 2024-08-10 14:12:52 second\n"
        );
    }

    #[test]
    fn test_write_after_close_reopens() {
        let temp_dir = TempDir::new().expect("failed to create a temporary directory");
        let writer = build_writer(&temp_dir, 1, start_time());

        writer.close();
        assert!(!writer.is_open());

        writer.write("INFO", "first").unwrap();
        writer.close();
        assert!(!writer.is_open());

        // the reopened file is continued, not truncated
        writer.write("INFO", "second").unwrap();
        assert!(writer.is_open());

        writer.close();
        writer.close();
        assert!(!writer.is_open());
        assert_eq!(
            read(&temp_dir, "app_2024-08-10-17.log"),
            "INFO 2024-08-10 17:12:52 first\nINFO 2024-08-10 17:12:52 second\n"
        );
    }

    #[test]
    fn test_restart_appends_to_existing_file() {
        let temp_dir = TempDir::new().expect("failed to create a temporary directory");

        let writer = build_writer(&temp_dir, 1, start_time());
        writer.write("INFO", "before restart").unwrap();
        drop(writer);

        let writer = build_writer(&temp_dir, 1, start_time());
        assert!(writer.is_open());
        writer.write("INFO", "after restart").unwrap();

        assert_eq!(count_files(&temp_dir), 1);
        assert_eq!(
            read(&temp_dir, "app_2024-08-10-17.log"),
            "INFO 2024-08-10 17:12:52 before restart\nINFO 2024-08-10 17:12:52 after restart\n"
        );
    }

    #[test]
    fn test_writers_sharing_a_file_do_not_overwrite() {
        let temp_dir = TempDir::new().expect("failed to create a temporary directory");
        let first = build_writer(&temp_dir, 1, start_time());
        let second = build_writer(&temp_dir, 1, start_time());

        // both start without a handle, so both create the file on their first write
        first.write("INFO", "one").unwrap();
        second.write("INFO", "two").unwrap();
        first.write("INFO", "three").unwrap();

        assert_eq!(
            read(&temp_dir, "app_2024-08-10-17.log"),
            "INFO 2024-08-10 17:12:52 one\nINFO 2024-08-10 17:12:52 two\nINFO 2024-08-10 17:12:52 three\n"
        );
    }

    #[test]
    fn test_failed_rotation_is_recovered() {
        let temp_dir = TempDir::new().expect("failed to create a temporary directory");
        let start = start_time();
        let writer = build_writer(&temp_dir, 1, start.clone());
        writer.write("INFO", "before").unwrap();

        // a directory squatting on the next file name makes the rotation fail
        let blocker = temp_dir.path().join("app_2024-08-10-18.log");
        fs::create_dir(&blocker).unwrap();

        set_now(&writer, start.add(Span::new().hours(1)));
        let err = writer.write("INFO", "lost").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
        assert!(!writer.is_open());

        // another process created the file meanwhile; its content is kept
        fs::remove_dir(&blocker).unwrap();
        fs::write(&blocker, "kept\n").unwrap();
        writer.write("INFO", "after").unwrap();
        assert_eq!(
            read(&temp_dir, "app_2024-08-10-18.log"),
            "kept\nINFO 2024-08-10 18:12:52 after\n"
        );
        assert_eq!(
            read(&temp_dir, "app_2024-08-10-17.log"),
            "INFO 2024-08-10 17:12:52 before\n"
        );
    }

    #[test]
    fn test_missing_directory_fails_on_write() {
        let temp_dir = TempDir::new().expect("failed to create a temporary directory");
        let writer = RotatingWriterBuilder::new(temp_dir.path().join("missing/app.log"))
            .rotation_hours(1)
            .clock(Clock::ManualClock(ManualClock::new(start_time())))
            .build()
            .unwrap();

        let err = writer.write("INFO", "hello").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
        assert_eq!(
            err.io_error().map(|err| err.kind()),
            Some(io::ErrorKind::NotFound)
        );
    }

    #[test]
    fn test_negative_interval_is_rejected() {
        let temp_dir = TempDir::new().expect("failed to create a temporary directory");
        let err = RotatingWriterBuilder::new(temp_dir.path().join("app.log"))
            .rotation_interval(SignedDuration::from_secs(-60))
            .build()
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn test_release_errors_are_not_returned() {
        let temp_dir = TempDir::new().expect("failed to create a temporary directory");
        let trap = CollectingTrap::default();
        let start = start_time();
        let writer = RotatingWriterBuilder::new(temp_dir.path().join("app.log"))
            .rotation_hours(1)
            .trap(trap.clone())
            .clock(Clock::ManualClock(ManualClock::new(start.clone())))
            .build()
            .unwrap();

        writer.write("INFO", "first").unwrap();
        set_now(&writer, start.add(Span::new().hours(1)));
        writer.write("INFO", "second").unwrap();
        writer.close();

        // flushing a plain file never fails, so nothing is trapped
        assert!(trap.messages().is_empty());
    }

    #[test]
    fn test_serialized_rotation_across_threads() {
        let temp_dir = TempDir::new().expect("failed to create a temporary directory");
        let start = start_time();
        let writer = Arc::new(build_writer(&temp_dir, 1, start.clone()));
        writer.write("INFO", "warmup").unwrap();

        // all threads observe the crossed threshold; only the first one rotates
        set_now(&writer, start.add(Span::new().hours(1)));
        std::thread::scope(|s| {
            for t in 0..8 {
                let writer = writer.clone();
                s.spawn(move || {
                    for i in 0..10 {
                        writer.write("INFO", &format!("thread {t} line {i}")).unwrap();
                    }
                });
            }
        });

        assert_eq!(count_files(&temp_dir), 2);
        assert_eq!(read(&temp_dir, "app_2024-08-10-18.log").lines().count(), 80);
    }
}
