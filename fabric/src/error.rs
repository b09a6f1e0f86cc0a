// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::fmt;

#[derive(Debug)]
pub enum Error {
    /// A configuration value is missing, out of range, or inconsistent.
    InvalidSetting(String),
    /// A factory registry was asked for a variant it does not know.
    UnknownVariant {
        family: &'static str,
        name: String,
    },
    /// The relative-injection CSV has no line for the given terminal id.
    RelativeInjectionMissing(u32),
    /// The event queue drained before the workload signalled completion.
    PrematureQuiescence,
    Io(std::io::Error),
    Yaml(serde_yaml::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::InvalidSetting(what) => {
                write!(f, "ERROR: invalid setting: {}", what)
            }
            Self::UnknownVariant { family, name } => {
                write!(f, "ERROR: unknown {} variant '{}'", family, name)
            }
            Self::RelativeInjectionMissing(id) => {
                write!(f, "ERROR: no relative injection entry for terminal {}", id)
            }
            Self::PrematureQuiescence => {
                write!(f, "ERROR: event queue drained with the workload still active")
            }
            Self::Io(e) => write!(f, "ERROR: {}", e),
            Self::Yaml(e) => write!(f, "ERROR: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Yaml(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(e: serde_yaml::Error) -> Self {
        Self::Yaml(e)
    }
}
