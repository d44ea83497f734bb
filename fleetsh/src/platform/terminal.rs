//! Per-family terminal display commands and pagination markers.

use std::sync::LazyLock;

use regex::Regex;

use super::OsFamily;

static LENGTH_VALUE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)length:?\s*(\d+)").expect("static length pattern"));
static WIDTH_VALUE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)width\s*[:=]?\s*(\d+)").expect("static width pattern"));
static PAGER_VALUE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)pager\s+(?:lines\s+)?(\d+)").expect("static pager pattern"));

/// Terminal length/width as reported by the device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TerminalSettings {
    /// Lines per screen; 0 means paging is already off.
    pub length: Option<u32>,

    /// Columns; `None` if the device did not report it.
    pub width: Option<u32>,
}

/// How one OS family shows and sets its terminal display parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TerminalProfile {
    /// Family this profile applies to.
    pub family: OsFamily,

    /// Command whose output reports the current length (and width, where
    /// the same command shows both).
    pub show_settings: Option<&'static str>,

    /// Command prefix that sets the length; the value is appended.
    pub set_length: Option<&'static str>,

    /// Command prefix that sets the width; the value is appended.
    pub set_width: Option<&'static str>,

    /// Width value meaning "no wrapping" on this family.
    pub unbounded_width: u32,

    /// Regex fragment for the pagination marker.
    pub more_marker: &'static str,
}

const CISCO_MORE: &str = r" ?-{2,} ?[Mm]ore ?-{2,} ?";
const ASA_MORE: &str = r"<-{2,} More -{2,}>";

const IOS: TerminalProfile = TerminalProfile {
    family: OsFamily::Ios,
    show_settings: Some("show terminal | include Length"),
    set_length: Some("terminal length"),
    set_width: Some("terminal width"),
    unbounded_width: 0,
    more_marker: CISCO_MORE,
};

const IOS_XR: TerminalProfile = TerminalProfile {
    family: OsFamily::IosXr,
    ..IOS
};

// NX-OS caps the width at 511.
const NXOS: TerminalProfile = TerminalProfile {
    family: OsFamily::Nxos,
    unbounded_width: 511,
    ..IOS
};

// ASA has a pager but no width command worth touching.
const ASA: TerminalProfile = TerminalProfile {
    family: OsFamily::Asa,
    show_settings: Some("show pager"),
    set_length: Some("terminal pager"),
    set_width: None,
    unbounded_width: 0,
    more_marker: ASA_MORE,
};

const UNKNOWN: TerminalProfile = TerminalProfile {
    family: OsFamily::Unknown,
    show_settings: None,
    set_length: None,
    set_width: None,
    unbounded_width: 0,
    more_marker: CISCO_MORE,
};

impl TerminalProfile {
    /// Look up the profile for a family.
    pub fn for_family(family: OsFamily) -> &'static TerminalProfile {
        match family {
            OsFamily::Ios => &IOS,
            OsFamily::IosXr => &IOS_XR,
            OsFamily::Nxos => &NXOS,
            OsFamily::Asa => &ASA,
            OsFamily::Unknown => &UNKNOWN,
        }
    }

    /// Whether this family can have paging switched off.
    pub fn supports_suppress(&self) -> bool {
        self.show_settings.is_some() && self.set_length.is_some()
    }

    /// Command setting the terminal length to `value`.
    pub fn length_command(&self, value: u32) -> Option<String> {
        self.set_length.map(|prefix| format!("{} {}", prefix, value))
    }

    /// Command setting the terminal width to `value`.
    pub fn width_command(&self, value: u32) -> Option<String> {
        self.set_width.map(|prefix| format!("{} {}", prefix, value))
    }

    /// Parse the output of `show_settings`.
    pub fn parse_settings(&self, output: &str) -> TerminalSettings {
        let capture = |re: &Regex| -> Option<u32> {
            re.captures(output)
                .and_then(|c| c.get(1))
                .and_then(|m| m.as_str().parse().ok())
        };

        match self.family {
            OsFamily::Asa => {
                let length = if output.to_ascii_lowercase().contains("no pager") {
                    Some(0)
                } else {
                    capture(&PAGER_VALUE)
                };
                TerminalSettings {
                    length,
                    width: None,
                }
            }
            _ => TerminalSettings {
                length: capture(&LENGTH_VALUE),
                width: capture(&WIDTH_VALUE),
            },
        }
    }
}
