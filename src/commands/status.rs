use crate::libs::{messages::Message, view::View};
use crate::msg_print;
use anyhow::Result;

pub fn cmd() -> Result<()> {
    let orchestrator = super::orchestrator()?;
    let state = orchestrator.state();
    let pending = state.load_pending();

    msg_print!(Message::StatusHeader);
    View::status(orchestrator.settings(), orchestrator.phase(), state.last_check(), pending.as_ref());
    Ok(())
}
