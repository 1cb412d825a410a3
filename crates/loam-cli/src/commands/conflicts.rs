use std::path::Path;

use loam_core::db::{ConflictLog, ConflictRecord};

use crate::commands::common::{format_relative, open_conflict_log};
use crate::error::CliError;

pub async fn run_conflicts(limit: usize, as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let (_db, log) = open_conflict_log(db_path).await?;
    let records = log.list_recent(limit).await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    if records.is_empty() {
        println!("No sync conflicts recorded.");
        return Ok(());
    }

    for line in format_conflict_lines(&records) {
        println!("{line}");
    }
    Ok(())
}

fn format_conflict_lines(records: &[ConflictRecord]) -> Vec<String> {
    let now = chrono::Utc::now().timestamp_millis();
    records
        .iter()
        .map(|record| {
            format!(
                "{}  {} {}  local@{} vs remote@{}  resolved {} via {}",
                record.id,
                record.entity_kind,
                record.item_id,
                record.local_updated_at,
                record.remote_updated_at,
                format_relative(record.resolved_at, now),
                record.strategy
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use loam_core::models::EntityKind;

    #[test]
    fn conflict_lines_name_strategy_and_sides() {
        let records = vec![ConflictRecord {
            id: 7,
            item_id: "item-1".to_string(),
            entity_kind: EntityKind::KnowledgeItem,
            local_updated_at: 100,
            remote_updated_at: 2_000,
            resolved_at: chrono::Utc::now().timestamp_millis(),
            strategy: "merge".to_string(),
        }];

        let lines = format_conflict_lines(&records);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("knowledge_items item-1"));
        assert!(lines[0].contains("via merge"));
        assert!(lines[0].contains("local@100"));
    }
}
