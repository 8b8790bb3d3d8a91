use std::time::Duration;

use anyhow::{Context, Result};
use clap::Subcommand;
use civicdb::{EntityCache, RedisHashCache, Settings};
use comfy_table::Table;
use serde::Serialize;

use crate::output::{OutputManager, TableDisplay, styled_table};

#[derive(Subcommand)]
pub enum CacheCommands {
    /// List the entities cached for a table
    Show {
        /// Table whose cache hash to read
        table: String,
    },
    /// Drop a table's cache hash
    Evict {
        table: String,
    },
}

#[derive(Serialize)]
struct CachedEntry {
    id: String,
    bytes: usize,
}

#[derive(Serialize)]
struct CachedTable {
    table: String,
    ttl_secs: Option<u64>,
    entries: Vec<CachedEntry>,
}

impl TableDisplay for CachedTable {
    fn to_table(&self) -> Table {
        let mut table = styled_table(&["Id", "Bytes"]);
        for entry in &self.entries {
            table.add_row(vec![entry.id.clone(), entry.bytes.to_string()]);
        }
        table
    }
}

pub async fn handle_cache_commands(command: CacheCommands, settings: &Settings, output: &OutputManager) -> Result<()> {
    let cache = RedisHashCache::connect(&settings.redis.url, settings.redis.key_prefix.clone())
        .await
        .context("failed to connect to redis")?;

    match command {
        CacheCommands::Show { table } => {
            let ttl = cache.time_to_live(&table).await?;
            let Some(ttl) = ttl else {
                output.warning(&format!("nothing cached for `{table}`"));
                return Ok(());
            };
            let mut entries: Vec<CachedEntry> = cache
                .get_all(&table)
                .await?
                .into_iter()
                .map(|(id, json)| CachedEntry { id, bytes: json.len() })
                .collect();
            entries.sort_by(|a, b| a.id.cmp(&b.id));

            output.key_value("table", &table);
            output.key_value("entries", &entries.len().to_string());
            output.key_value("expires in", &describe_ttl(ttl));
            output.display(&CachedTable {
                table,
                ttl_secs: (ttl != Duration::MAX).then(|| ttl.as_secs()),
                entries,
            })
        }
        CacheCommands::Evict { table } => {
            if cache.evict(&table).await? {
                output.success(&format!("evicted cache for `{table}`"));
            } else {
                output.warning(&format!("nothing cached for `{table}`"));
            }
            Ok(())
        }
    }
}

fn describe_ttl(ttl: Duration) -> String {
    if ttl == Duration::MAX {
        "never".to_string()
    } else {
        format!("{}s", ttl.as_secs())
    }
}
