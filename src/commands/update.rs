use crate::{
    libs::{messages::Message, orchestrator::CheckOutcome},
    msg_info,
};
use anyhow::Result;
use clap::Args;
use dialoguer::{theme::ColorfulTheme, Confirm};

#[derive(Debug, Args)]
pub struct UpdateArgs {
    /// Do not ask for confirmation
    #[arg(short, long)]
    yes: bool,
}

pub async fn cmd(args: UpdateArgs) -> Result<()> {
    let orchestrator = super::orchestrator()?;

    let release = match super::check::check(&orchestrator).await? {
        CheckOutcome::Available(release) => release,
        _ => return Ok(()),
    };

    if !args.yes {
        let confirmed = Confirm::with_theme(&ColorfulTheme::default())
            .with_prompt(Message::ConfirmUpdate(release.version_name.clone()).to_string())
            .default(true)
            .interact()?;
        if !confirmed {
            msg_info!(Message::UpdateDeclined);
            return Ok(());
        }
    }

    let Some(pending) = super::download::download(&orchestrator, &release).await? else {
        return Ok(());
    };
    super::install::install(&orchestrator, &pending).await
}
