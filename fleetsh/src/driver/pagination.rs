//! Pagination suppression with guaranteed restore.
//!
//! [`TerminalGuard`] records the device's terminal length and width, switches
//! them to unbounded, and remembers exactly which of the two it changed.
//! [`TerminalGuard::release`] puts back only what was changed, and only once:
//!
//! ```text
//! show terminal          -> Length: 24 lines, Width: 80 columns
//! terminal length 0      (length_modified)
//! terminal width 0       (width_modified)
//! ... session work ...
//! terminal length 24     release()
//! terminal width 80
//! ```
//!
//! The guard is owned by the session from before the first change, so a
//! failure half-way through suppression still gets restored at teardown.

use log::{debug, warn};

use super::executor::CommandExecutor;
use crate::channel::TerminalChannel;
use crate::error::Result;
use crate::platform::{OsFamily, TerminalProfile, TerminalSettings};

/// Tracks terminal display changes made for a session.
#[derive(Debug)]
pub struct TerminalGuard {
    profile: &'static TerminalProfile,
    saved: TerminalSettings,
    suppressed: bool,
    length_modified: bool,
    width_modified: bool,
    released: bool,
}

impl TerminalGuard {
    /// Create a guard for a device family. Nothing is sent yet.
    pub fn new(family: OsFamily) -> Self {
        Self {
            profile: TerminalProfile::for_family(family),
            saved: TerminalSettings::default(),
            suppressed: false,
            length_modified: false,
            width_modified: false,
            released: false,
        }
    }

    /// Read the current settings and switch paging off.
    ///
    /// A rejected set command is not an error: the guard simply reports
    /// [`is_suppressed`](Self::is_suppressed) as `false` and the caller falls
    /// back to advancing past markers. Channel errors and timeouts propagate;
    /// whatever was already changed stays recorded for [`release`](Self::release).
    pub async fn suppress<C: TerminalChannel>(
        &mut self,
        exec: &mut CommandExecutor<'_, C>,
    ) -> Result<()> {
        let Some(show) = self.profile.show_settings else {
            debug!("No pager commands for {}, leaving pagination on", self.profile.family);
            return Ok(());
        };

        let current = exec.execute(show).await?;
        self.saved = self.profile.parse_settings(&current.text);
        debug!("Saved terminal settings: {:?}", self.saved);

        match self.saved.length {
            Some(0) => self.suppressed = true,
            Some(_) => {
                if let Some(cmd) = self.profile.length_command(0) {
                    let result = exec.execute(&cmd).await?;
                    if result.is_success() {
                        self.length_modified = true;
                        self.suppressed = true;
                    } else {
                        warn!("Device rejected {:?}, advancing past pagination markers instead", cmd);
                    }
                }
            }
            None => warn!("Could not read terminal length from {:?}", current.text),
        }

        let unbounded = self.profile.unbounded_width;
        if let (Some(width), Some(cmd)) = (self.saved.width, self.profile.width_command(unbounded))
            && width != unbounded
        {
            let result = exec.execute(&cmd).await?;
            if result.is_success() {
                self.width_modified = true;
            } else {
                warn!("Device rejected {:?}", cmd);
            }
        }

        Ok(())
    }

    /// Restore whatever [`suppress`](Self::suppress) changed.
    ///
    /// Runs at most once; later calls are no-ops. Both settings are attempted
    /// even if the first restore fails, and the first error is returned.
    pub async fn release<C: TerminalChannel>(
        &mut self,
        exec: &mut CommandExecutor<'_, C>,
    ) -> Result<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;

        let mut restores = Vec::new();
        if self.length_modified
            && let Some(cmd) = self.saved.length.and_then(|v| self.profile.length_command(v))
        {
            restores.push(cmd);
        }
        if self.width_modified
            && let Some(cmd) = self.saved.width.and_then(|v| self.profile.width_command(v))
        {
            restores.push(cmd);
        }

        let mut first_error = None;
        for cmd in restores {
            debug!("Restoring terminal setting: {:?}", cmd);
            if let Err(e) = exec.execute(&cmd).await {
                warn!("Failed to restore terminal setting {:?}: {}", cmd, e);
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Whether paging is off for the rest of the session.
    pub fn is_suppressed(&self) -> bool {
        self.suppressed
    }

    /// Settings as they were before the session changed them.
    pub fn saved(&self) -> TerminalSettings {
        self.saved
    }

    /// Whether any setting was changed and needs restoring.
    pub fn is_modified(&self) -> bool {
        self.length_modified || self.width_modified
    }

    /// Whether [`release`](Self::release) has run.
    pub fn is_released(&self) -> bool {
        self.released
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        if self.is_modified() && !self.released {
            warn!("TerminalGuard dropped without restoring terminal settings");
        }
    }
}
