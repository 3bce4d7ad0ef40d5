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

//! Hourlog appends timestamped lines to a file and switches to a new file, named after the
//! current date and hour, once a configured interval has elapsed.
//!
//! # Overview
//!
//! Given the base name `logs/app.log`, lines go to `logs/app_<YYYY-MM-DD-HH>.log`, where the
//! timestamp is taken when the writer is created and whenever it rotates. Each line reads:
//!
//! ```text
//! <category> <YYYY-MM-DD HH:MM:SS> <message>
//! ```
//!
//! Rotation is decided on the write path; there is no background thread. A file for the current
//! hour that already exists is continued, and no file is created before the first write.
//!
//! # Examples
//!
//! ```no_run
//! use hourlog::RotatingWriter;
//!
//! let writer = RotatingWriter::init("logs/app.log", 1)?;
//! writer.write("INFO", "service started")?;
//! writer.write("ERROR", "upstream unreachable")?;
//! writer.close();
//! # Ok::<(), hourlog::Error>(())
//! ```
//!
//! Configure the writer with a builder:
//!
//! ```no_run
//! use hourlog::RotatingWriter;
//! use hourlog::trap::DefaultTrap;
//! use jiff::SignedDuration;
//!
//! let writer = RotatingWriter::builder("logs/app.log")
//!     .rotation_interval(SignedDuration::from_mins(30))
//!     .trap(DefaultTrap::default())
//!     .build()?;
//! writer.write("INFO", "service started")?;
//! # Ok::<(), hourlog::Error>(())
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]

pub use self::error::Error;
pub use self::error::ErrorKind;
pub use self::trap::Trap;
pub use self::writer::RotatingWriter;
pub use self::writer::RotatingWriterBuilder;

pub mod trap;

mod clock;
mod error;
mod rotation;
mod writer;
