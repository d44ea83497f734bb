//! Prompt classifier: OS family and hostname from raw banner text.

use std::sync::LazyLock;

use log::debug;
use regex::Regex;

use super::{OsFamily, PrivilegeMode};
use crate::channel::patterns::last_line;
use crate::error::UnsupportedDeviceError;

/// One classification rule: a banner marker that identifies a family.
struct Rule {
    family: OsFamily,
    marker: &'static str,
}

/// Ordered most specific first, so overlapping dialects resolve the same way
/// every time (NX-OS and IOS-XR banners both mention "Cisco" and "IOS").
const RULES: &[Rule] = &[
    Rule {
        family: OsFamily::Nxos,
        marker: r"(?i)cisco nexus operating system|\bnx-os\b",
    },
    Rule {
        family: OsFamily::IosXr,
        marker: r"(?i)cisco ios xr software|\bios[ -]xr\b",
    },
    Rule {
        family: OsFamily::Asa,
        marker: r"(?i)cisco adaptive security appliance",
    },
    Rule {
        family: OsFamily::Ios,
        marker: r"(?i)cisco ios[ -]xe software|\bios-xe\b",
    },
    Rule {
        family: OsFamily::Ios,
        marker: r"(?i)cisco ios software|cisco internetwork operating system",
    },
];

static COMPILED_RULES: LazyLock<Vec<(OsFamily, Regex)>> = LazyLock::new(|| {
    RULES
        .iter()
        .map(|rule| {
            let regex = Regex::new(rule.marker).expect("static classifier rule");
            (rule.family, regex)
        })
        .collect()
});

/// IOS-XR prompts carry the route processor location: `RP/0/RSP0/CPU0:host#`.
static LOCATION_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[\w/]+:").expect("static location pattern"));

/// Result of classifying a device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    /// Detected OS family.
    pub family: OsFamily,

    /// Hostname derived from the prompt.
    pub hostname: String,

    /// The prompt line as seen.
    pub prompt: String,

    /// Privilege mode implied by the prompt.
    pub privilege: PrivilegeMode,

    /// Whether the prompt shows a configuration mode marker.
    pub config_mode: bool,
}

/// Split a prompt into `(hostname, privilege, config_mode)`.
///
/// Returns `None` for prompts that do not end in `#` or `>`.
pub fn parse_prompt(prompt: &str) -> Option<(String, PrivilegeMode, bool)> {
    let prompt = prompt.trim();
    let delimiter = prompt.chars().last()?;
    let privilege = PrivilegeMode::from_delimiter(delimiter)?;
    let body = &prompt[..prompt.len() - delimiter.len_utf8()];

    let (body, config_mode) = match body.find('(') {
        Some(pos) if body.ends_with(')') => (&body[..pos], true),
        _ => (body, false),
    };

    let hostname = LOCATION_PREFIX.replace(body, "");
    if hostname.is_empty() {
        return None;
    }

    Some((hostname.into_owned(), privilege, config_mode))
}

/// Classify a device from the text captured after login.
///
/// Only the last `sample_size` bytes are considered. The trailing non-empty
/// line is the prompt; the rest is searched for vendor markers.
pub fn classify(text: &str, sample_size: usize) -> Result<Classification, UnsupportedDeviceError> {
    let sample = bounded_tail(text, sample_size);

    let prompt = last_line(sample)
        .ok_or(UnsupportedDeviceError::PromptNotFound { attempts: 1 })?
        .to_string();

    let (hostname, privilege, config_mode) =
        parse_prompt(&prompt).ok_or_else(|| UnsupportedDeviceError::InvalidPrompt {
            prompt: prompt.clone(),
        })?;

    let family = COMPILED_RULES
        .iter()
        .find(|(_, marker)| marker.is_match(sample))
        .map(|(family, _)| *family)
        .ok_or_else(|| UnsupportedDeviceError::UnrecognizedBanner {
            prompt: prompt.clone(),
        })?;

    debug!(
        "Classified '{}' as {} (privilege {:?})",
        hostname, family, privilege
    );

    Ok(Classification {
        family,
        hostname,
        prompt,
        privilege,
        config_mode,
    })
}

fn bounded_tail(text: &str, sample_size: usize) -> &str {
    let mut start = text.len().saturating_sub(sample_size);
    while !text.is_char_boundary(start) {
        start += 1;
    }
    &text[start..]
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: usize = 4096;

    fn banner(body: &str, prompt: &str) -> String {
        format!("{}\r\n\r\n{}", body, prompt)
    }

    #[test]
    fn test_ios() {
        let text = banner(
            "Cisco IOS Software, C3750E Software (C3750E-UNIVERSALK9-M), Version 15.2(4)E10",
            "access-sw01#",
        );
        let c = classify(&text, SAMPLE).unwrap();
        assert_eq!(c.family, OsFamily::Ios);
        assert_eq!(c.hostname, "access-sw01");
        assert_eq!(c.privilege, PrivilegeMode::Privileged);
        assert!(!c.config_mode);
    }

    #[test]
    fn test_ios_xe() {
        let text = banner(
            "Cisco IOS XE Software, Version 17.03.04a\nCisco IOS Software [Amsterdam]",
            "wan-rtr01>",
        );
        let c = classify(&text, SAMPLE).unwrap();
        assert_eq!(c.family, OsFamily::Ios);
        assert_eq!(c.hostname, "wan-rtr01");
        assert_eq!(c.privilege, PrivilegeMode::User);
    }

    #[test]
    fn test_nxos_wins_over_ios_markers() {
        let text = banner(
            "Cisco Nexus Operating System (NX-OS) Software\nCisco IOS Software compatible",
            "dc-spine01#",
        );
        let c = classify(&text, SAMPLE).unwrap();
        assert_eq!(c.family, OsFamily::Nxos);
        assert_eq!(c.hostname, "dc-spine01");
    }

    #[test]
    fn test_asa() {
        let text = banner(
            "Cisco Adaptive Security Appliance Software Version 9.12(4)",
            "fw-edge01>",
        );
        let c = classify(&text, SAMPLE).unwrap();
        assert_eq!(c.family, OsFamily::Asa);
        assert_eq!(c.hostname, "fw-edge01");
    }

    #[test]
    fn test_ios_xr_strips_location() {
        let text = banner(
            "Cisco IOS XR Software, Version 6.5.3",
            "RP/0/RSP0/CPU0:core-pe01#",
        );
        let c = classify(&text, SAMPLE).unwrap();
        assert_eq!(c.family, OsFamily::IosXr);
        assert_eq!(c.hostname, "core-pe01");
    }

    #[test]
    fn test_unrecognized_banner_fails() {
        let text = banner("Welcome to the lab. Authorized users only.", "lab-sw#");
        let err = classify(&text, SAMPLE).unwrap_err();
        assert!(matches!(
            err,
            UnsupportedDeviceError::UnrecognizedBanner { ref prompt } if prompt == "lab-sw#"
        ));
    }

    #[test]
    fn test_non_cisco_prompt_fails() {
        let text = banner("Cisco IOS Software", "user@host:~$");
        assert!(matches!(
            classify(&text, SAMPLE),
            Err(UnsupportedDeviceError::InvalidPrompt { .. })
        ));
        assert!(matches!(
            classify("\r\n  \r\n", SAMPLE),
            Err(UnsupportedDeviceError::PromptNotFound { .. })
        ));
    }

    #[test]
    fn test_marker_outside_sample_is_ignored() {
        let mut text = String::from("Cisco IOS Software\n");
        text.push_str(&"x".repeat(100));
        text.push_str("\nsw1#");
        assert!(classify(&text, 50).is_err());
        assert!(classify(&text, SAMPLE).is_ok());
    }

    #[test]
    fn test_config_mode_prompt() {
        let text = banner("Cisco IOS Software", "sw1(config-if)#");
        let c = classify(&text, SAMPLE).unwrap();
        assert_eq!(c.hostname, "sw1");
        assert!(c.config_mode);
    }

    #[test]
    fn test_parse_prompt() {
        assert_eq!(
            parse_prompt("router>"),
            Some(("router".to_string(), PrivilegeMode::User, false))
        );
        assert_eq!(parse_prompt("#"), None);
        assert_eq!(parse_prompt("router$"), None);
    }
}
