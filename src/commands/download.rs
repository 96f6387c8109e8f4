use crate::{
    libs::{
        error::UpdateError,
        messages::{macros::is_debug_mode, Message},
        orchestrator::{CheckOutcome, Orchestrator},
        release::ReleaseInfo,
        state::PendingUpdate,
    },
    msg_debug, msg_info, msg_success, msg_warning,
};
use anyhow::Result;
use std::io::Write;

pub async fn cmd() -> Result<()> {
    let orchestrator = super::orchestrator()?;
    match super::check::check(&orchestrator).await? {
        CheckOutcome::Available(release) => {
            download(&orchestrator, &release).await?;
        }
        CheckOutcome::UpToDate(_) | CheckOutcome::Suppressed => msg_info!(Message::NoUpdateToDownload),
        CheckOutcome::NotEntitled(_) | CheckOutcome::Unlinked(_) => {}
    }
    Ok(())
}

/// Downloads `release`, drawing progress until it ends. Ctrl-C cancels.
/// Returns `None` when the user cancelled.
pub(crate) async fn download(orchestrator: &Orchestrator, release: &ReleaseInfo) -> Result<Option<PendingUpdate>> {
    msg_info!(Message::DownloadStarting(release.download_url.clone().unwrap_or_default()));

    let mut download = orchestrator.start_download(release)?;
    let progress = download.take_progress();
    let printer = tokio::spawn(async move {
        let Some(mut progress) = progress else { return };
        while let Some(event) = progress.next().await {
            let line = Message::DownloadProgress {
                downloaded: event.downloaded_bytes,
                total: event.total_bytes,
                percent: event.percent,
                speed: event.bytes_per_second,
            };
            if is_debug_mode() {
                msg_debug!(line);
            } else {
                print!("\r{}   ", line);
                let _ = std::io::stdout().flush();
            }
        }
    });

    let wait = download.wait();
    tokio::pin!(wait);
    let result = tokio::select! {
        result = &mut wait => result,
        _ = tokio::signal::ctrl_c() => {
            msg_warning!(Message::DownloadCancelling);
            orchestrator.cancel_download();
            wait.await
        }
    };
    let _ = printer.await;
    if !is_debug_mode() {
        println!();
    }

    match result {
        Ok(pending) => {
            msg_success!(Message::DownloadCompleted(pending.downloaded_artifact_path.display().to_string()));
            Ok(Some(pending))
        }
        Err(UpdateError::DownloadCancelled) => {
            msg_info!(Message::DownloadCancelled);
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}
