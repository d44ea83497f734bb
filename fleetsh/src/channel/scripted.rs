//! Simulated device for dry runs and tests.
//!
//! [`ScriptedDevice`] describes a device (hostname, banner, canned command
//! output, pager behavior) and [`ScriptedDevice::connect`] turns it into a
//! [`ScriptedChannel`] that behaves like a live Cisco-style CLI: it echoes
//! commands, paginates long output with a `--More--` marker until the terminal
//! length is set to 0, tracks `terminal length`/`width`, supports `enable` and
//! `configure terminal`, and never answers commands marked silent or stalled.
//!
//! Reads never block: an empty output queue is reported as "nothing arrived
//! within the timeout", which makes stall scenarios instant to test.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::trace;

use super::TerminalChannel;
use crate::error::{ChannelError, Result};

const ERASE: &str = "\x08\x08\x08\x08\x08\x08\x08\x08\x08        \x08\x08\x08\x08\x08\x08\x08\x08\x08";
/// Wrong enable secrets accepted before `% Bad secrets`, as on IOS.
const SECRET_ATTEMPTS: u8 = 3;
const INVALID_INPUT: &str = "                ^\n% Invalid input detected at '^' marker.\n";

/// Pager dialect of a scripted device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PagerStyle {
    /// `terminal length`/`terminal width`, ` --More-- ` marker.
    Ios,
    /// `terminal pager`, `<--- More --->` marker.
    Asa,
}

/// Shared record of every line a scripted device received.
#[derive(Debug, Clone, Default)]
pub struct ScriptedLog(Arc<Mutex<Vec<String>>>);

impl ScriptedLog {
    /// All received lines, in order. Password input is masked.
    pub fn commands(&self) -> Vec<String> {
        self.0.lock().map(|log| log.clone()).unwrap_or_default()
    }

    /// How many times exactly `command` was received.
    pub fn count(&self, command: &str) -> usize {
        self.commands().iter().filter(|c| c.as_str() == command).count()
    }

    fn push(&self, line: impl Into<String>) {
        if let Ok(mut log) = self.0.lock() {
            log.push(line.into());
        }
    }
}

/// Description of a simulated device.
#[derive(Debug, Clone)]
pub struct ScriptedDevice {
    hostname: String,
    banner: String,
    privileged: bool,
    enable_secret: Option<String>,
    mode: Option<String>,
    pager: PagerStyle,
    outputs: HashMap<String, String>,
    silent: HashSet<String>,
    stalled: HashMap<String, String>,
    length: u32,
    width: u32,
    chunk_size: Option<usize>,
    log: ScriptedLog,
}

impl ScriptedDevice {
    fn new(hostname: &str, pager: PagerStyle, version: Option<&str>) -> Self {
        let mut outputs = HashMap::new();
        if let Some(version) = version {
            outputs.insert("show version".to_string(), version.to_string());
        }
        Self {
            hostname: hostname.to_string(),
            banner: String::new(),
            privileged: true,
            enable_secret: None,
            mode: None,
            pager,
            outputs,
            silent: HashSet::new(),
            stalled: HashMap::new(),
            length: 24,
            width: 80,
            chunk_size: None,
            log: ScriptedLog::default(),
        }
    }

    /// A Cisco IOS device.
    pub fn ios(hostname: &str) -> Self {
        Self::new(
            hostname,
            PagerStyle::Ios,
            Some(
                "Cisco IOS Software, C3750E Software (C3750E-UNIVERSALK9-M), Version 15.2(4)E10\n\
                 Technical Support: http://www.cisco.com/techsupport\n\
                 ROM: Bootstrap program is C3750E boot loader",
            ),
        )
    }

    /// A Cisco NX-OS device.
    pub fn nxos(hostname: &str) -> Self {
        let mut device = Self::new(
            hostname,
            PagerStyle::Ios,
            Some(
                "Cisco Nexus Operating System (NX-OS) Software\n\
                 TAC support: http://www.cisco.com/tac\n\
                 NXOS: version 9.3(8)",
            ),
        );
        device.length = 31;
        device
    }

    /// A Cisco ASA firewall.
    pub fn asa(hostname: &str) -> Self {
        Self::new(
            hostname,
            PagerStyle::Asa,
            Some("Cisco Adaptive Security Appliance Software Version 9.12(4)\nDevice Manager Version 7.12(2)"),
        )
    }

    /// A device that answers `show version` with an error.
    pub fn generic(hostname: &str) -> Self {
        Self::new(hostname, PagerStyle::Ios, None)
    }

    /// Set the login banner printed before the first prompt.
    pub fn with_banner(mut self, banner: impl Into<String>) -> Self {
        self.banner = banner.into();
        self
    }

    /// Start in user EXEC (`>`), escalating with `enable` and `secret`.
    pub fn with_enable_secret(mut self, secret: impl Into<String>) -> Self {
        self.privileged = false;
        self.enable_secret = Some(secret.into());
        self
    }

    /// Start in user EXEC with no enable password configured.
    pub fn unprivileged(mut self) -> Self {
        self.privileged = false;
        self.enable_secret = None;
        self
    }

    /// Start with the CLI left in global configuration mode.
    pub fn in_config_mode(mut self) -> Self {
        self.mode = Some("config".to_string());
        self
    }

    /// Canned output for a command.
    pub fn with_output(mut self, command: impl Into<String>, output: impl Into<String>) -> Self {
        self.outputs.insert(command.into(), output.into());
        self
    }

    /// A command the device echoes but never completes.
    pub fn with_silent_command(mut self, command: impl Into<String>) -> Self {
        self.silent.insert(command.into());
        self
    }

    /// A command that prints `partial` and then hangs without a prompt.
    pub fn with_stalled_output(
        mut self,
        command: impl Into<String>,
        partial: impl Into<String>,
    ) -> Self {
        self.stalled.insert(command.into(), partial.into());
        self
    }

    /// Initial terminal length (0 disables paging).
    pub fn with_terminal_length(mut self, length: u32) -> Self {
        self.length = length;
        self
    }

    /// Deliver output in chunks of at most `size` bytes.
    pub fn with_chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = Some(size.max(1));
        self
    }

    /// Handle to the log of received lines, shared with every channel.
    pub fn log(&self) -> ScriptedLog {
        self.log.clone()
    }

    /// Hostname of the simulated device.
    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    /// Open a channel to this device; the banner and first prompt are queued.
    pub fn connect(&self) -> ScriptedChannel {
        let mut channel = ScriptedChannel {
            device: self.clone(),
            mode: self.mode.clone(),
            awaiting_password: false,
            awaiting_confirmation: false,
            failed_secrets: 0,
            line: String::new(),
            pending_pages: VecDeque::new(),
            outbound: VecDeque::new(),
            open: true,
            closed_by_peer: false,
        };
        let mut greeting = String::new();
        if !self.banner.is_empty() {
            greeting.push_str(&self.banner.replace('\n', "\r\n"));
            greeting.push_str("\r\n\r\n");
        }
        greeting.push_str(&channel.prompt());
        channel.queue(greeting);
        channel
    }
}

/// Live channel to a [`ScriptedDevice`].
#[derive(Debug)]
pub struct ScriptedChannel {
    device: ScriptedDevice,
    mode: Option<String>,
    awaiting_password: bool,
    awaiting_confirmation: bool,
    failed_secrets: u8,
    line: String,
    pending_pages: VecDeque<String>,
    outbound: VecDeque<Vec<u8>>,
    open: bool,
    closed_by_peer: bool,
}

impl ScriptedChannel {
    fn prompt(&self) -> String {
        let mode = self
            .mode
            .as_ref()
            .map(|m| format!("({})", m))
            .unwrap_or_default();
        let delimiter = if self.device.privileged { '#' } else { '>' };
        format!("{}{}{}", self.device.hostname, mode, delimiter)
    }

    fn queue(&mut self, text: String) {
        let bytes = text.into_bytes();
        match self.device.chunk_size {
            Some(size) => {
                for chunk in bytes.chunks(size) {
                    self.outbound.push_back(chunk.to_vec());
                }
            }
            None => self.outbound.push_back(bytes),
        }
    }

    fn marker(&self) -> &'static str {
        match self.device.pager {
            PagerStyle::Ios => " --More-- ",
            PagerStyle::Asa => "<--- More --->",
        }
    }

    fn page_size(&self) -> Option<usize> {
        match self.device.length {
            0 => None,
            n => Some((n as usize).saturating_sub(1).max(1)),
        }
    }

    /// Queue command output followed by the prompt, paginating if needed.
    fn respond(&mut self, output: &str) {
        let lines: Vec<&str> = output.lines().collect();
        let pages: Vec<String> = match self.page_size() {
            Some(size) if lines.len() > size => lines
                .chunks(size)
                .map(|page| page.iter().map(|l| format!("{}\r\n", l)).collect())
                .collect(),
            _ => vec![lines.iter().map(|l| format!("{}\r\n", l)).collect()],
        };

        let mut pages = pages.into_iter();
        let first = pages.next().unwrap_or_default();
        self.pending_pages = pages.collect();
        self.emit_page(first);
    }

    fn emit_page(&mut self, page: String) {
        let text = if self.pending_pages.is_empty() {
            format!("{}{}", page, self.prompt())
        } else {
            format!("{}{}", page, self.marker())
        };
        self.queue(text);
    }

    fn advance_page(&mut self) {
        if let Some(page) = self.pending_pages.pop_front() {
            self.outbound.push_back(ERASE.as_bytes().to_vec());
            self.emit_page(page);
        }
    }

    fn handle_line(&mut self, raw: &str) {
        let line = raw.trim_end_matches('\r');

        if self.awaiting_password {
            self.awaiting_password = false;
            self.device.log.push("********");
            let accepted = self.device.enable_secret.as_deref() == Some(line);
            if accepted {
                self.failed_secrets = 0;
                self.device.privileged = true;
                let prompt = self.prompt();
                self.queue(format!("\r\n{}", prompt));
                return;
            }
            self.failed_secrets += 1;
            if self.failed_secrets < SECRET_ATTEMPTS {
                self.awaiting_password = true;
                self.queue("\r\nPassword: ".to_string());
            } else {
                self.failed_secrets = 0;
                let prompt = self.prompt();
                self.queue(format!("\r\n% Bad secrets\r\n\r\n{}", prompt));
            }
            return;
        }

        self.device.log.push(line);
        trace!("scripted {} <- {:?}", self.device.hostname, line);
        self.queue(format!("{}\r\n", line));

        let command = line.trim();
        if self.awaiting_confirmation {
            self.awaiting_confirmation = false;
            match command {
                "" | "startup-config" => self.respond("Building configuration...\n[OK]"),
                _ => self.respond("%Error opening flash:/startup-config (Permission denied)"),
            }
            return;
        }
        if self.device.silent.contains(command) {
            return;
        }
        if let Some(partial) = self.device.stalled.get(command).cloned() {
            let text: String = partial.lines().map(|l| format!("{}\r\n", l)).collect();
            self.queue(text);
            return;
        }

        let words: Vec<&str> = command.split_whitespace().collect();
        match words.as_slice() {
            [] => {
                let prompt = self.prompt();
                self.queue(prompt);
            }
            ["terminal" | "term", "length", n] if self.device.pager == PagerStyle::Ios => {
                self.set_length(n)
            }
            ["terminal" | "term", "width", n] if self.device.pager == PagerStyle::Ios => {
                match n.parse() {
                    Ok(width) => {
                        self.device.width = width;
                        self.respond("");
                    }
                    Err(_) => self.respond(INVALID_INPUT),
                }
            }
            ["terminal", "pager", n] | ["terminal", "pager", "lines", n]
                if self.device.pager == PagerStyle::Asa =>
            {
                self.set_length(n)
            }
            ["show", "terminal", "|", "include" | "i", "Length"]
                if self.device.pager == PagerStyle::Ios =>
            {
                let text = format!(
                    "Length: {} lines, Width: {} columns",
                    self.device.length, self.device.width
                );
                self.respond(&text);
            }
            ["show", "pager"] if self.device.pager == PagerStyle::Asa => {
                let text = match self.device.length {
                    0 => "no pager".to_string(),
                    n => format!("pager lines {}", n),
                };
                self.respond(&text);
            }
            ["enable"] => {
                if self.device.privileged {
                    self.respond("");
                } else if self.device.enable_secret.is_some() {
                    self.awaiting_password = true;
                    self.queue("Password: ".to_string());
                } else {
                    self.respond("% No password set");
                }
            }
            ["copy", "running-config", "startup-config"] if self.device.privileged => {
                self.awaiting_confirmation = true;
                self.queue("Destination filename [startup-config]? ".to_string());
            }
            ["write", "memory"] | ["wr"] if self.device.privileged => {
                self.respond("Building configuration...\n[OK]");
            }
            ["configure", "terminal"] | ["conf", "t"] if self.device.privileged => {
                self.mode = Some("config".to_string());
                self.respond("Enter configuration commands, one per line.  End with CNTL/Z.");
            }
            ["end"] if self.mode.is_some() => {
                self.mode = None;
                self.respond("");
            }
            ["exit"] | ["logout"] => {
                if self.mode.take().is_some() {
                    self.respond("");
                } else {
                    self.closed_by_peer = true;
                }
            }
            _ => {
                let output = self.lookup(command);
                match output {
                    Some(text) => self.respond(&text),
                    None if self.mode.is_some() => self.respond(""),
                    None => self.respond(INVALID_INPUT),
                }
            }
        }
    }

    /// Canned output for `command`, applying a trailing `| include` filter.
    fn lookup(&self, command: &str) -> Option<String> {
        if let Some(output) = self.device.outputs.get(command) {
            return Some(output.clone());
        }

        let (base, filter) = command.split_once('|')?;
        let needle = match filter.split_whitespace().collect::<Vec<_>>().as_slice() {
            ["include" | "i", rest @ ..] if !rest.is_empty() => rest.join(" "),
            _ => return None,
        };
        let output = self.device.outputs.get(base.trim())?;
        Some(
            output
                .lines()
                .filter(|line| line.contains(needle.as_str()))
                .collect::<Vec<_>>()
                .join("\n"),
        )
    }

    fn set_length(&mut self, n: &str) {
        match n.parse() {
            Ok(length) => {
                self.device.length = length;
                self.respond("");
            }
            Err(_) => self.respond(INVALID_INPUT),
        }
    }
}

impl TerminalChannel for ScriptedChannel {
    async fn send(&mut self, text: &str) -> Result<()> {
        if !self.open || self.closed_by_peer {
            return Err(ChannelError::Closed.into());
        }

        for ch in text.chars() {
            if !self.pending_pages.is_empty() {
                match ch {
                    ' ' => self.advance_page(),
                    'q' => {
                        self.pending_pages.clear();
                        let prompt = self.prompt();
                        self.queue(format!("\r\n{}", prompt));
                    }
                    _ => {}
                }
                continue;
            }

            match ch {
                '\n' => {
                    let line = std::mem::take(&mut self.line);
                    self.handle_line(&line);
                }
                '\x03' => {
                    self.line.clear();
                    self.awaiting_password = false;
                    self.awaiting_confirmation = false;
                    self.failed_secrets = 0;
                    self.device.log.push("^C");
                    let prompt = self.prompt();
                    self.queue(format!("\r\n{}", prompt));
                }
                _ => self.line.push(ch),
            }
        }
        Ok(())
    }

    async fn read(&mut self, _timeout: Duration) -> Result<Option<Vec<u8>>> {
        if let Some(chunk) = self.outbound.pop_front() {
            return Ok(Some(chunk));
        }
        if !self.open || self.closed_by_peer {
            return Err(ChannelError::Closed.into());
        }
        Ok(None)
    }

    async fn close(&mut self) -> Result<()> {
        self.open = false;
        self.outbound.clear();
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open && !self.closed_by_peer
    }
}
