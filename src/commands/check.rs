use crate::{
    libs::{
        messages::Message,
        orchestrator::{CheckOutcome, Orchestrator},
        release::{DownloadSource, ReleaseInfo},
        view::View,
    },
    msg_info, msg_print, msg_success, msg_warning,
};
use anyhow::Result;
use chrono::{Local, Utc};
use clap::Args;

#[derive(Debug, Args)]
pub struct CheckArgs {
    /// Skip the check when the last one is less than a day old
    #[arg(long)]
    auto: bool,
}

pub async fn cmd(args: CheckArgs) -> Result<()> {
    let orchestrator = super::orchestrator()?;

    if args.auto && !orchestrator.state().is_check_due(Utc::now()) {
        let last = orchestrator
            .state()
            .last_check()
            .map(|t| t.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_default();
        msg_info!(Message::CheckSkipped(last));
        return Ok(());
    }

    check(&orchestrator).await?;
    Ok(())
}

/// Runs a check and prints its outcome.
pub(crate) async fn check(orchestrator: &Orchestrator) -> Result<CheckOutcome> {
    let current = orchestrator.settings().current_version.clone();
    msg_info!(Message::CheckingForUpdates(current.clone()));

    let outcome = orchestrator.check_and_prepare().await?;
    match &outcome {
        CheckOutcome::Suppressed => msg_info!(Message::DebugVersionSuppressed(current)),
        CheckOutcome::UpToDate(_) => msg_success!(Message::UpToDate(current)),
        CheckOutcome::Available(release) => show_available(&current, release),
        CheckOutcome::NotEntitled(release) => msg_warning!(Message::UpdateNotEntitled {
            version: release.version_name.clone(),
            code: release.error_code.unwrap_or_default(),
            message: release.error_message.clone().unwrap_or_default(),
        }),
        CheckOutcome::Unlinked(release) => msg_warning!(Message::UpdateNoArtifact(release.version_name.clone())),
    }
    Ok(outcome)
}

fn show_available(current: &str, release: &ReleaseInfo) {
    msg_info!(Message::UpdateAvailable {
        current: current.to_string(),
        latest: release.version_name.clone(),
    });
    View::release(release);
    if release.download_source == DownloadSource::Secondary {
        msg_info!(Message::ReleaseFromPublicChannel);
    }
    if !release.release_note.trim().is_empty() {
        msg_print!(Message::ReleaseNotesHeader);
        msg_print!(release.release_note.trim());
    }
}
