//! Text of every [`Message`].
//!
//! Keeping all wording in one `Display` implementation lets the commands stay
//! free of string literals and keeps phrasing consistent between the check,
//! download and install steps.

use super::types::Message;
use std::fmt;

/// Human-readable byte count (`1.5 MB`).
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            // === CONFIG MESSAGES ===
            Message::ConfigSaved => "Configuration saved successfully".to_string(),
            Message::ConfigHeader => "Update settings".to_string(),
            Message::PromptResourceId => "Resource id on the metadata service".to_string(),
            Message::PromptChannel => "Release channel (stable/beta)".to_string(),
            Message::PromptCdk => "Download key (leave empty if none)".to_string(),
            Message::PromptEndpoints => "Metadata endpoints, comma separated".to_string(),
            Message::PromptRepositoryUrl => "Public repository URL (leave empty to disable)".to_string(),
            Message::PromptProjectName => "Project name used in artifact file names".to_string(),
            Message::PromptShortName => "Short product name preferred among assets".to_string(),
            Message::PromptProxy => "Proxy for the public channel (leave empty if none)".to_string(),
            Message::PromptInstallDir => "Installation directory".to_string(),
            Message::PromptRelaunch => "Relaunch the application after installing?".to_string(),
            Message::InvalidChannel(value) => format!("Unknown channel '{}', expected stable or beta", value),

            // === CHECK MESSAGES ===
            Message::CheckingForUpdates(version) => format!("Checking for updates (current version {})...", version),
            Message::CheckSkipped(last) => format!("Last check was at {}, skipping", last),
            Message::DebugVersionSuppressed(version) => {
                format!("Version {} is a development build, updates are disabled", version)
            }
            Message::UpToDate(version) => format!("You are running the latest version ({})", version),
            Message::UpdateAvailable { current, latest } => {
                format!("A new version is available: {} -> {}", current, latest)
            }
            Message::ReleaseFromPublicChannel => "The download comes from the public release channel".to_string(),
            Message::ReleaseNotesHeader => "Release notes:".to_string(),
            Message::UpdateNotEntitled { version, code, message } => format!(
                "Version {} is available, but no download was authorized (code {}): {}",
                version, code, message
            ),
            Message::UpdateNoArtifact(version) => {
                format!("Version {} is available, but no artifact for this platform was found", version)
            }

            // === DOWNLOAD MESSAGES ===
            Message::DownloadStarting(url) => format!("Downloading {}", url),
            Message::DownloadProgress {
                downloaded,
                total,
                percent,
                speed,
            } => {
                if *total > 0 {
                    format!(
                        "{:>5.1}%  {} / {}  {}/s",
                        percent,
                        format_bytes(*downloaded),
                        format_bytes(*total),
                        format_bytes(*speed)
                    )
                } else {
                    format!("{}  {}/s", format_bytes(*downloaded), format_bytes(*speed))
                }
            }
            Message::DownloadCancelling => "Cancelling download...".to_string(),
            Message::DownloadCancelled => "Download cancelled".to_string(),
            Message::DownloadCompleted(path) => format!("Update downloaded to {}", path),
            Message::NoUpdateToDownload => "There is nothing to download".to_string(),

            // === INSTALL MESSAGES ===
            Message::NoPendingUpdate => "No downloaded update is waiting to be installed".to_string(),
            Message::Installing(version) => format!("Installing version {}...", version),
            Message::UpdateInstalled { version, mode } => format!("Version {} installed ({} package)", version, mode),
            Message::Relaunching => "Restarting the application".to_string(),
            Message::InstallerLaunched(pid) => format!(
                "Installer started (pid {}); the result is confirmed on next launch",
                pid
            ),
            Message::FallbackInstalled { path, cause } => format!(
                "The installation directory could not be updated ({}). The new version was installed to {}",
                cause, path
            ),
            Message::ConfirmUpdate(version) => format!("Download and install version {} now?", version),
            Message::UpdateDeclined => "Update postponed".to_string(),

            // === STARTUP MESSAGES ===
            Message::UpdateCompleted { previous, new } => format!("Updated from {} to {}", previous, new),
            Message::InstallerUnconfirmed { expected, running } => format!(
                "The installer for {} did not finish; still running version {}",
                expected, running
            ),
            Message::PendingInstallReady { version, path } => {
                format!("Version {} is downloaded and ready to install ({})", version, path)
            }
            Message::NothingPending => "No pending update".to_string(),

            // === STATUS MESSAGES ===
            Message::StatusHeader => "Update status".to_string(),
            Message::StatusNoPending => "none".to_string(),
            Message::StatusNever => "never".to_string(),

            // === ERROR MESSAGES ===
            Message::StageFailed { stage, detail } => format!("Update failed at the {} step: {}", stage, detail),
            Message::RetryHint => "This looks temporary, try again in a moment".to_string(),
        };
        write!(f, "{}", s)
    }
}
