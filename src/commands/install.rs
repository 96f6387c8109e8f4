use crate::{
    libs::{
        messages::Message,
        orchestrator::{InstallReport, Orchestrator},
        state::PendingUpdate,
    },
    msg_info, msg_success, msg_warning,
};
use anyhow::Result;

pub async fn cmd() -> Result<()> {
    let orchestrator = super::orchestrator()?;
    let Some(pending) = orchestrator.state().load_pending() else {
        msg_info!(Message::NoPendingUpdate);
        return Ok(());
    };
    install(&orchestrator, &pending).await
}

pub(crate) async fn install(orchestrator: &Orchestrator, pending: &PendingUpdate) -> Result<()> {
    msg_info!(Message::Installing(pending.version_name.clone()));

    match orchestrator.install_now(pending).await? {
        InstallReport::Installed { mode, relaunched } => {
            msg_success!(Message::UpdateInstalled {
                version: pending.version_name.clone(),
                mode: mode.to_string(),
            });
            if relaunched {
                msg_info!(Message::Relaunching);
            }
        }
        InstallReport::InstallerLaunched { pid } => msg_info!(Message::InstallerLaunched(pid)),
        InstallReport::FallbackRecovered { path, cause } => msg_warning!(
            Message::FallbackInstalled {
                path: path.display().to_string(),
                cause,
            },
            true
        ),
    }
    Ok(())
}
