use std::path::Path;

use loam_core::db::QueueRepository;
use loam_core::models::KnowledgeItem;
use loam_core::sync::OperationPayload;

use crate::commands::common::{current_user, default_title, open_queue, parse_capture};
use crate::error::CliError;

pub async fn run_capture(
    content_parts: &[String],
    title: Option<&str>,
    db_path: &Path,
) -> Result<(), CliError> {
    let raw = content_parts.join(" ");
    if raw.trim().is_empty() {
        return Err(CliError::EmptyContent);
    }

    let (content, tags) = parse_capture(&raw);
    let title = title
        .map(str::to_string)
        .unwrap_or_else(|| default_title(&content));
    let item = KnowledgeItem::new(current_user(), title, content, tags);

    let (_db, queue) = open_queue(db_path).await?;
    let operation = queue
        .enqueue(OperationPayload::CreateKnowledgeItem(item))
        .await?;

    println!("{}", operation.payload.entity_id());
    tracing::debug!(operation = %operation.id, "Capture queued");
    Ok(())
}
