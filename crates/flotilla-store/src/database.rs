// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::Path;
use std::sync::Mutex;

use anyhow::Context;
use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection, Row};
use tracing::debug;

use crate::models::{AgentRecord, TaskRecord};

/// SQLite store for agent and task records.
///
/// Statements are short and serialized behind one connection lock; every
/// write is an `INSERT OR REPLACE` keyed by the record id, so re-persisting
/// the same entity is always safe.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (creating if needed) the database at `path`.
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("creating {}", parent.display()))?;
            }
        }
        let conn = Connection::open(path)
            .with_context(|| format!("opening database {}", path.display()))?;
        let db = Self { conn: Mutex::new(conn) };
        db.create_tables()?;
        debug!(path = %path.display(), "database ready");
        Ok(db)
    }

    /// An in-memory database, used by tests and `--dry-run` flows.
    pub fn in_memory() -> anyhow::Result<Self> {
        let db = Self { conn: Mutex::new(Connection::open_in_memory()?) };
        db.create_tables()?;
        Ok(db)
    }

    fn create_tables(&self) -> anyhow::Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS agents (
                agent_id      TEXT PRIMARY KEY,
                name          TEXT NOT NULL,
                role          TEXT NOT NULL,
                model         TEXT NOT NULL,
                status        TEXT NOT NULL,
                total_cost    REAL DEFAULT 0.0,
                total_tokens  INTEGER DEFAULT 0,
                messages_sent INTEGER DEFAULT 0,
                created_at    TEXT NOT NULL,
                completed_at  TEXT,
                deleted_at    TEXT
            );
            CREATE TABLE IF NOT EXISTS tasks (
                task_id         TEXT PRIMARY KEY,
                description     TEXT NOT NULL,
                task_type       TEXT NOT NULL,
                status          TEXT NOT NULL,
                assigned_agents TEXT,
                total_cost      REAL DEFAULT 0.0,
                created_at      TEXT NOT NULL,
                completed_at    TEXT,
                result          TEXT
            );",
        )?;
        Ok(())
    }

    // ── Agent operations ──────────────────────────────────────────────────────

    /// Insert or update an agent record.
    pub fn save_agent(&self, record: &AgentRecord) -> anyhow::Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR REPLACE INTO agents
             (agent_id, name, role, model, status, total_cost, total_tokens,
              messages_sent, created_at, completed_at, deleted_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                record.agent_id,
                record.name,
                record.role,
                record.model,
                record.status,
                record.total_cost,
                record.total_tokens as i64,
                record.messages_sent as i64,
                record.created_at.to_rfc3339(),
                record.completed_at.map(|t| t.to_rfc3339()),
                record.deleted_at.map(|t| t.to_rfc3339()),
            ],
        )?;
        Ok(())
    }

    pub fn get_agent(&self, agent_id: &str) -> anyhow::Result<Option<AgentRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT * FROM agents WHERE agent_id = ?1")?;
        let mut rows = stmt.query_map(params![agent_id], agent_from_row)?;
        rows.next().transpose().map_err(Into::into)
    }

    /// List agent records, optionally filtered by status and/or role.
    pub fn list_agents(
        &self,
        status: Option<&str>,
        role: Option<&str>,
    ) -> anyhow::Result<Vec<AgentRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut sql = String::from("SELECT * FROM agents WHERE 1=1");
        let mut args: Vec<String> = Vec::new();
        if let Some(s) = status {
            sql.push_str(" AND status = ?");
            args.push(s.to_string());
        }
        if let Some(r) = role {
            sql.push_str(" AND role = ?");
            args.push(r.to_string());
        }
        sql.push_str(" ORDER BY created_at");

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(args.iter()), agent_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    // ── Task operations ───────────────────────────────────────────────────────

    /// Insert or update a task record.
    pub fn save_task(&self, record: &TaskRecord) -> anyhow::Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR REPLACE INTO tasks
             (task_id, description, task_type, status, assigned_agents,
              total_cost, created_at, completed_at, result)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                record.task_id,
                record.description,
                record.task_type,
                record.status,
                record.assigned_agents,
                record.total_cost,
                record.created_at.to_rfc3339(),
                record.completed_at.map(|t| t.to_rfc3339()),
                record.result,
            ],
        )?;
        Ok(())
    }

    pub fn get_task(&self, task_id: &str) -> anyhow::Result<Option<TaskRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT * FROM tasks WHERE task_id = ?1")?;
        let mut rows = stmt.query_map(params![task_id], task_from_row)?;
        rows.next().transpose().map_err(Into::into)
    }

    pub fn list_tasks(&self) -> anyhow::Result<Vec<TaskRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT * FROM tasks ORDER BY created_at")?;
        let rows = stmt.query_map([], task_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    // ── Housekeeping ──────────────────────────────────────────────────────────

    /// Count records created more than `days` days ago (dry-run for `clean`).
    pub fn count_older_than(&self, days: i64) -> anyhow::Result<(usize, usize)> {
        let cutoff = cutoff(days);
        let conn = self.conn.lock().unwrap();
        let agents: i64 = conn.query_row(
            "SELECT COUNT(*) FROM agents WHERE created_at < ?1",
            params![cutoff],
            |row| row.get(0),
        )?;
        let tasks: i64 = conn.query_row(
            "SELECT COUNT(*) FROM tasks WHERE created_at < ?1",
            params![cutoff],
            |row| row.get(0),
        )?;
        Ok((agents as usize, tasks as usize))
    }

    /// Delete records created more than `days` days ago.  Returns
    /// `(agents_deleted, tasks_deleted)`.
    pub fn prune_older_than(&self, days: i64) -> anyhow::Result<(usize, usize)> {
        let cutoff = cutoff(days);
        let conn = self.conn.lock().unwrap();
        let agents =
            conn.execute("DELETE FROM agents WHERE created_at < ?1", params![cutoff])?;
        let tasks = conn.execute("DELETE FROM tasks WHERE created_at < ?1", params![cutoff])?;
        Ok((agents, tasks))
    }
}

fn cutoff(days: i64) -> String {
    (Utc::now() - Duration::days(days)).to_rfc3339()
}

// ─── Row mapping ──────────────────────────────────────────────────────────────

fn parse_timestamp(value: Option<String>) -> Option<DateTime<Utc>> {
    value
        .as_deref()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|t| t.with_timezone(&Utc))
}

fn agent_from_row(row: &Row<'_>) -> rusqlite::Result<AgentRecord> {
    Ok(AgentRecord {
        agent_id: row.get("agent_id")?,
        name: row.get("name")?,
        role: row.get("role")?,
        model: row.get("model")?,
        status: row.get("status")?,
        total_cost: row.get("total_cost")?,
        total_tokens: row.get::<_, i64>("total_tokens")? as u64,
        messages_sent: row.get::<_, i64>("messages_sent")? as u64,
        created_at: parse_timestamp(row.get("created_at")?).unwrap_or_else(Utc::now),
        completed_at: parse_timestamp(row.get("completed_at")?),
        deleted_at: parse_timestamp(row.get("deleted_at")?),
    })
}

fn task_from_row(row: &Row<'_>) -> rusqlite::Result<TaskRecord> {
    Ok(TaskRecord {
        task_id: row.get("task_id")?,
        description: row.get("description")?,
        task_type: row.get("task_type")?,
        status: row.get("status")?,
        assigned_agents: row
            .get::<_, Option<String>>("assigned_agents")?
            .unwrap_or_else(|| "[]".into()),
        total_cost: row.get("total_cost")?,
        created_at: parse_timestamp(row.get("created_at")?).unwrap_or_else(Utc::now),
        completed_at: parse_timestamp(row.get("completed_at")?),
        result: row.get("result")?,
    })
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn agent(id: &str, cost: f64) -> AgentRecord {
        AgentRecord {
            agent_id: id.into(),
            name: "Builder Agent".into(),
            role: "builder".into(),
            model: "test-model".into(),
            status: "completed".into(),
            total_cost: cost,
            total_tokens: 1000,
            messages_sent: 1,
            created_at: Utc::now(),
            completed_at: Some(Utc::now()),
            deleted_at: None,
        }
    }

    fn task(id: &str) -> TaskRecord {
        TaskRecord {
            task_id: id.into(),
            description: "do things".into(),
            task_type: "bug_fix".into(),
            status: "completed".into(),
            assigned_agents: r#"["a1","a2"]"#.into(),
            total_cost: 0.5,
            created_at: Utc::now(),
            completed_at: None,
            result: None,
        }
    }

    #[test]
    fn agent_round_trip() {
        let db = Database::in_memory().unwrap();
        db.save_agent(&agent("a1", 0.25)).unwrap();
        let back = db.get_agent("a1").unwrap().unwrap();
        assert_eq!(back.agent_id, "a1");
        assert_eq!(back.role, "builder");
        assert_eq!(back.total_cost, 0.25);
        assert_eq!(back.total_tokens, 1000);
        assert!(back.completed_at.is_some());
        assert!(db.get_agent("missing").unwrap().is_none());
    }

    #[test]
    fn save_agent_is_an_upsert() {
        let db = Database::in_memory().unwrap();
        db.save_agent(&agent("a1", 0.1)).unwrap();
        let mut updated = agent("a1", 0.9);
        updated.status = "deleted".into();
        updated.deleted_at = Some(Utc::now());
        db.save_agent(&updated).unwrap();

        let all = db.list_agents(None, None).unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].total_cost, 0.9);
        assert_eq!(all[0].status, "deleted");
        assert!(all[0].deleted_at.is_some());
    }

    #[test]
    fn list_agents_filters_by_status_and_role() {
        let db = Database::in_memory().unwrap();
        db.save_agent(&agent("a1", 0.1)).unwrap();
        let mut other = agent("a2", 0.2);
        other.role = "tester".into();
        other.status = "failed".into();
        db.save_agent(&other).unwrap();

        assert_eq!(db.list_agents(None, None).unwrap().len(), 2);
        assert_eq!(db.list_agents(Some("failed"), None).unwrap().len(), 1);
        assert_eq!(db.list_agents(None, Some("builder")).unwrap().len(), 1);
        assert_eq!(db.list_agents(Some("failed"), Some("builder")).unwrap().len(), 0);
    }

    #[test]
    fn task_round_trip_preserves_assigned_agents_json() {
        let db = Database::in_memory().unwrap();
        db.save_task(&task("t1")).unwrap();
        let back = db.get_task("t1").unwrap().unwrap();
        let agents: Vec<String> = serde_json::from_str(&back.assigned_agents).unwrap();
        assert_eq!(agents, vec!["a1", "a2"]);
        assert_eq!(db.list_tasks().unwrap().len(), 1);
    }

    #[test]
    fn prune_removes_only_old_records() {
        let db = Database::in_memory().unwrap();
        let mut old = agent("old", 0.1);
        old.created_at = Utc::now() - Duration::days(30);
        db.save_agent(&old).unwrap();
        db.save_agent(&agent("fresh", 0.1)).unwrap();

        let mut old_task = task("t-old");
        old_task.created_at = Utc::now() - Duration::days(30);
        db.save_task(&old_task).unwrap();

        assert_eq!(db.count_older_than(7).unwrap(), (1, 1));
        assert_eq!(db.prune_older_than(7).unwrap(), (1, 1));
        assert!(db.get_agent("old").unwrap().is_none());
        assert!(db.get_agent("fresh").unwrap().is_some());
        assert!(db.get_task("t-old").unwrap().is_none());
    }

    #[test]
    fn open_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/dir/flotilla.db");
        let db = Database::open(&path).unwrap();
        db.save_agent(&agent("a1", 0.0)).unwrap();
        assert!(path.exists());
    }
}
