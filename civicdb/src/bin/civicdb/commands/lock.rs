use anyhow::{Context, Result};
use clap::Subcommand;
use civicdb::{ConnectionManager, RedisLockBackend, Settings, keys::KeyContext};
use colored::Colorize;
use comfy_table::Table;
use serde::Serialize;

use crate::{
    output::{OutputManager, TableDisplay, styled_table},
    theme::{ICONS, THEME},
};

#[derive(Subcommand)]
pub enum LockCommands {
    /// List record locks currently held
    Status,
    /// Force-release the locks of the given record ids, whoever holds them
    Clear {
        #[arg(required = true)]
        record_ids: Vec<String>,
    },
}

#[derive(Serialize)]
struct HeldLock {
    key: String,
    owner: String,
}

#[derive(Serialize)]
struct HeldLocks(Vec<HeldLock>);

impl TableDisplay for HeldLocks {
    fn to_table(&self) -> Table {
        let mut table = styled_table(&["Lock", "Owner"]);
        for lock in &self.0 {
            table.add_row(vec![format!("{} {}", ICONS.lock, lock.key), lock.owner.clone()]);
        }
        table
    }
}

pub async fn handle_lock_commands(command: LockCommands, settings: &Settings, output: &OutputManager) -> Result<()> {
    let client = redis::Client::open(settings.redis.url.as_str()).context("invalid redis url")?;
    let conn = ConnectionManager::new(client)
        .await
        .context("failed to connect to redis")?;
    let backend = RedisLockBackend::new(conn);
    let keys = KeyContext::new(&settings.redis.key_prefix);

    match command {
        LockCommands::Status => {
            let held = backend.scan(&keys.lock_pattern()).await?;
            if held.is_empty() {
                output.success("no record locks held");
                return Ok(());
            }
            output.display(&HeldLocks(
                held.into_iter().map(|(key, owner)| HeldLock { key, owner }).collect(),
            ))
        }
        LockCommands::Clear { record_ids } => {
            for id in record_ids {
                if backend.force_release(&keys.record_lock(&id)).await? {
                    output.success(&format!("released lock on {}", id.color(THEME.highlight)));
                } else {
                    output.warning(&format!("{} was not locked", id.color(THEME.muted)));
                }
            }
            Ok(())
        }
    }
}
