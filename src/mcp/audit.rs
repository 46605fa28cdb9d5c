//! MCP call audit log (§4.4), persisted to SQLite.

use sqlx::SqlitePool;

use crate::mcp::types::McpAuditRecord;

const PREVIEW_MAX_CHARS: usize = 500;

pub struct AuditLog {
    pool: SqlitePool,
}

impl AuditLog {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS mcp_audit_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                server_slug TEXT NOT NULL,
                tool_name TEXT NOT NULL,
                arguments TEXT NOT NULL,
                result_preview TEXT NOT NULL,
                duration_ms INTEGER NOT NULL,
                success INTEGER NOT NULL,
                project_id TEXT,
                error_message TEXT,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn record(&self, record: &McpAuditRecord) -> Result<(), sqlx::Error> {
        let preview = truncate_on_char_boundary(&record.result_preview, PREVIEW_MAX_CHARS);
        sqlx::query(
            r#"
            INSERT INTO mcp_audit_log
                (server_slug, tool_name, arguments, result_preview, duration_ms, success, project_id, error_message, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.server_slug)
        .bind(&record.tool_name)
        .bind(record.arguments.to_string())
        .bind(preview)
        .bind(record.duration_ms)
        .bind(record.success)
        .bind(&record.project_id)
        .bind(&record.error_message)
        .bind(record.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

/// Truncate `text` to at most `max_chars` *characters*, not bytes — the
/// naive byte-slice approach can panic or corrupt multi-byte UTF-8
/// sequences mid-character.
fn truncate_on_char_boundary(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    text.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncation_never_splits_a_multibyte_char() {
        let text = "日".repeat(600);
        let truncated = truncate_on_char_boundary(&text, PREVIEW_MAX_CHARS);
        assert_eq!(truncated.chars().count(), PREVIEW_MAX_CHARS);
        // Re-parsing confirms no invalid UTF-8 was produced (would have
        // panicked during `.chars()` collection above if it had been).
        assert!(truncated.len() > 0);
    }
}
