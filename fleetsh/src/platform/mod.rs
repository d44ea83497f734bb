//! Device dialect knowledge.
//!
//! Everything vendor-specific is data keyed by [`OsFamily`]: the classifier's
//! ordered rule table and the [`TerminalProfile`] table of pager commands.
//! Adding a dialect means adding rows, not types.

mod classifier;
mod terminal;

pub use classifier::{Classification, classify, parse_prompt};
pub use terminal::{TerminalProfile, TerminalSettings};

use std::fmt;

use serde::{Deserialize, Serialize};

/// Coarse classification of a device's command dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OsFamily {
    /// Cisco IOS and IOS-XE.
    Ios,
    /// Cisco NX-OS.
    Nxos,
    /// Cisco ASA.
    Asa,
    /// Cisco IOS-XR.
    IosXr,
    /// Not (yet) classified.
    #[default]
    Unknown,
}

impl OsFamily {
    /// Short display name.
    pub fn as_str(&self) -> &'static str {
        match self {
            OsFamily::Ios => "IOS",
            OsFamily::Nxos => "NXOS",
            OsFamily::Asa => "ASA",
            OsFamily::IosXr => "IOS-XR",
            OsFamily::Unknown => "unknown",
        }
    }
}

impl fmt::Display for OsFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Privilege mode implied by the prompt delimiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrivilegeMode {
    /// User EXEC, `>` prompt.
    #[default]
    User,
    /// Privileged EXEC, `#` prompt.
    Privileged,
}

impl PrivilegeMode {
    /// Determine the mode from a prompt's final character.
    pub fn from_delimiter(delimiter: char) -> Option<Self> {
        match delimiter {
            '>' => Some(PrivilegeMode::User),
            '#' => Some(PrivilegeMode::Privileged),
            _ => None,
        }
    }
}
