use crate::domain::model::ResponseEnvelope;
use crate::domain::ports::{Interaction, InteractionFlow, InteractionHandle, InteractionStore};
use crate::utils::error::Result;
use chrono::Utc;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// Append-only interaction log, one JSON document per line.
#[derive(Debug)]
pub struct JsonlInteractionStore {
    path: PathBuf,
    sequence: AtomicU64,
    write_lock: Mutex<()>,
}

impl JsonlInteractionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            sequence: AtomicU64::new(0),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

impl InteractionStore for JsonlInteractionStore {
    async fn record(
        &self,
        flow: InteractionFlow,
        request: &serde_json::Value,
        envelope: &ResponseEnvelope,
    ) -> Result<InteractionHandle> {
        let created_at = Utc::now();
        let seq = self.sequence.fetch_add(1, Ordering::SeqCst);
        let id = InteractionHandle(format!(
            "{}-{:04}",
            created_at.format("%Y%m%dT%H%M%S%.3f"),
            seq
        ));

        let interaction = Interaction {
            id: id.clone(),
            flow,
            created_at,
            request_body: request.clone(),
            response_body: envelope.body.clone(),
            http_status_code: envelope.status,
        };
        let mut line = serde_json::to_string(&interaction)?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;

        tracing::debug!("💾 Stored interaction {}", id.0);
        Ok(id)
    }

    async fn all(&self) -> Result<Vec<Interaction>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut interactions = Vec::new();
        for (line_no, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Interaction>(line) {
                Ok(interaction) => interactions.push(interaction),
                Err(e) => tracing::warn!(
                    "⚠️ Skipping unreadable interaction at {}:{}: {}",
                    self.path.display(),
                    line_no + 1,
                    e
                ),
            }
        }
        Ok(interactions)
    }
}
