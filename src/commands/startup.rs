use crate::{
    libs::{messages::Message, orchestrator::StartupNotice},
    msg_info, msg_print, msg_success, msg_warning,
};
use anyhow::Result;

pub fn cmd() -> Result<()> {
    let orchestrator = super::orchestrator()?;

    match orchestrator.startup() {
        Some(StartupNotice::Completed(complete)) => {
            msg_success!(Message::UpdateCompleted {
                previous: complete.previous_version,
                new: complete.new_version,
            });
            if !complete.release_note.trim().is_empty() {
                msg_print!(Message::ReleaseNotesHeader);
                msg_print!(complete.release_note.trim());
            }
        }
        Some(StartupNotice::InstallerUnconfirmed(complete)) => msg_warning!(Message::InstallerUnconfirmed {
            expected: complete.new_version,
            running: orchestrator.settings().current_version.clone(),
        }),
        Some(StartupNotice::PendingInstall(pending)) => msg_info!(Message::PendingInstallReady {
            version: pending.version_name,
            path: pending.downloaded_artifact_path.display().to_string(),
        }),
        None => msg_info!(Message::NothingPending),
    }
    Ok(())
}
