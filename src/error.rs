// Copyright (c) 2023 The TQUIC Authors.
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

//! Error type for congestion control operations.

use strum_macros::EnumIter;

/// Congestion control error.
#[derive(Clone, Debug, PartialEq, Eq, EnumIter)]
pub enum Error {
    /// A delivery sample carried zero delivered bytes or a zero round-trip
    /// time. The sample was dropped and no estimate was touched.
    InvalidSample(String),

    /// The configuration is invalid.
    InvalidConfig(String),

    /// The operation cannot be completed because it was attempted in an
    /// invalid state.
    InvalidState(String),

    /// There is no more work to do.
    Done,

    /// I/O error.
    IoError(String),
}

impl Error {
    /// Return the error number using by the C caller.
    pub fn to_errno(&self) -> libc::c_int {
        match self {
            Error::InvalidSample(_) => -1,
            Error::InvalidConfig(_) => -2,
            Error::InvalidState(_) => -3,
            Error::Done => -100,
            Error::IoError(_) => -101,
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        None
    }
}

impl std::convert::From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::IoError(format!("{}", err))
    }
}

impl std::convert::From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        if err.is_io() {
            return Error::IoError(format!("{}", err));
        }
        Error::InvalidState(format!("serialize: {}", err))
    }
}
