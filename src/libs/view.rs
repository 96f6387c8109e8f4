use super::messages::display::format_bytes;
use super::messages::Message;
use super::orchestrator::{Phase, UpdateSettings};
use super::release::ReleaseInfo;
use super::state::PendingUpdate;
use chrono::{DateTime, Local, Utc};
use prettytable::{row, Table};

pub struct View {}

impl View {
    fn local(time: DateTime<Utc>) -> String {
        time.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string()
    }

    pub fn status(settings: &UpdateSettings, phase: Phase, last_check: Option<DateTime<Utc>>, pending: Option<&PendingUpdate>) {
        let mut table = Table::new();

        table.add_row(row!["CURRENT VERSION", settings.current_version]);
        table.add_row(row!["CHANNEL", settings.channel]);
        table.add_row(row!["INSTALL DIR", settings.install_dir.display()]);
        table.add_row(row![
            "LAST CHECK",
            last_check.map(Self::local).unwrap_or_else(|| Message::StatusNever.to_string())
        ]);
        table.add_row(row!["PHASE", format!("{:?}", phase)]);
        match pending {
            Some(pending) => {
                table.add_row(row!["PENDING VERSION", pending.version_name]);
                table.add_row(row!["ARTIFACT", pending.downloaded_artifact_path.display()]);
                table.add_row(row![
                    "SIZE",
                    pending.file_size.map(format_bytes).unwrap_or_default()
                ]);
                table.add_row(row!["DOWNLOADED", Self::local(pending.timestamp)]);
            }
            None => {
                table.add_row(row!["PENDING VERSION", Message::StatusNoPending]);
            }
        }
        table.printstd();
    }

    pub fn release(release: &ReleaseInfo) {
        let mut table = Table::new();

        table.add_row(row!["VERSION", "CHANNEL", "SIZE", "FILE"]);
        table.add_row(row![
            release.version_name,
            release.channel,
            release.file_size.map(format_bytes).unwrap_or_default(),
            release.artifact_name()
        ]);
        table.printstd();
    }
}
