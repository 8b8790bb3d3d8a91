use anyhow::Result;
use clap::Subcommand;
use civicdb::Settings;
use comfy_table::Table;
use serde::Serialize;

use crate::output::{OutputManager, TableDisplay, styled_table};

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Print the effective settings after environment overrides
    Show,
}

#[derive(Serialize)]
struct SettingsView<'a>(&'a Settings);

impl TableDisplay for SettingsView<'_> {
    fn to_table(&self) -> Table {
        let settings = self.0;
        let mut table = styled_table(&["Setting", "Value"]);
        let rows = [
            ("database.url", settings.database.url.clone()),
            ("database.max_connections", settings.database.max_connections.to_string()),
            ("redis.url", settings.redis.url.clone()),
            ("redis.key_prefix", settings.redis.key_prefix.clone()),
            ("cache.time_to_live_secs", settings.cache.time_to_live_secs.to_string()),
            ("lock.wait_secs", settings.lock.wait_secs.to_string()),
            ("lock.lease_secs", settings.lock.lease_secs.to_string()),
            ("lock.retry_interval_ms", settings.lock.retry_interval_ms.to_string()),
            ("schema.central_instance", settings.schema.central_instance.to_string()),
            ("schema.state_schema_index", settings.schema.state_schema_index.to_string()),
            (
                "schema.default_schema",
                settings.schema.default_schema.clone().unwrap_or_else(|| "-".to_string()),
            ),
            (
                "stream.max_len",
                settings.stream.max_len.map_or_else(|| "unbounded".to_string(), |len| len.to_string()),
            ),
        ];
        for (key, value) in rows {
            table.add_row(vec![key.to_string(), value]);
        }
        table
    }
}

pub async fn handle_config_commands(command: ConfigCommands, settings: &Settings, output: &OutputManager) -> Result<()> {
    match command {
        ConfigCommands::Show => output.display(&SettingsView(&settings.redacted())),
    }
}
