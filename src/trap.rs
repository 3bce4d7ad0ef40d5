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

//! Traps for errors that have no caller to be returned to.
//!
//! Releasing a file handle, either on rotation or on close, is best-effort: a failure there is
//! never returned from [`RotatingWriter::write`] or [`RotatingWriter::close`]. Such errors are
//! handed to a [`Trap`] instead.
//!
//! [`RotatingWriter::write`]: crate::RotatingWriter::write
//! [`RotatingWriter::close`]: crate::RotatingWriter::close

use std::fmt;
use std::io;
use std::io::Write;

use crate::Error;

/// A sink for errors that are discarded by the writer.
pub trait Trap: fmt::Debug + Send + Sync + 'static {
    /// Handle a discarded error.
    fn trap(&self, err: &Error);
}

impl<T: Trap> From<T> for Box<dyn Trap> {
    fn from(value: T) -> Self {
        Box::new(value)
    }
}

/// A trap that sends errors to standard error if possible.
///
/// If standard error is not available, it does nothing.
#[derive(Debug, Default)]
#[non_exhaustive]
pub struct DefaultTrap {}

impl Trap for DefaultTrap {
    fn trap(&self, err: &Error) {
        let _ = writeln!(io::stderr(), "{err}");
    }
}

/// A trap that reports errors through the `log` facade and otherwise drops them.
///
/// This is the default trap of [`RotatingWriter`](crate::RotatingWriter).
#[derive(Debug, Default)]
#[non_exhaustive]
pub struct BestEffortTrap {}

impl Trap for BestEffortTrap {
    fn trap(&self, err: &Error) {
        log::warn!("hourlog discarded an error: {err}");
    }
}
