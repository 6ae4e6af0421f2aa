// Copyright (C) 2025  Tom Waddington
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published
// by the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("pointer injection failed: {0}")]
    Injection(String),

    #[error("input source failed: {0}")]
    Input(String),

    #[error("playback aborted unexpectedly")]
    Aborted,

    #[error("a playback run is in progress")]
    RunInProgress,

    #[error("a capture session is in progress")]
    CaptureInProgress,

    #[error("the sequence is empty")]
    EmptySequence,

    #[error("no point at position {0}")]
    IndexOutOfRange(usize),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
