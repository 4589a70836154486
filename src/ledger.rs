// 📒 Run Ledger - audit trail of merge runs (SQLite + WAL)
// "Every change is an event": each committed run is a row in `runs`,
// each metric layer that changed value is a row in `events`.

use crate::merge::LayerChange;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Event for audit trail
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Event {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub entity_type: String,
    pub entity_id: String,
    pub data: serde_json::Value,
    /// Run that produced the event
    pub actor: String,
}

impl Event {
    pub fn new(
        event_type: &str,
        entity_type: &str,
        entity_id: &str,
        data: serde_json::Value,
        actor: &str,
    ) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type: event_type.to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            data,
            actor: actor.to_string(),
        }
    }

    /// `layer_changed` event for one commune layer
    pub fn from_change(change: &LayerChange, run_id: &str) -> Self {
        Event::new(
            "layer_changed",
            "commune",
            &change.entity_id,
            serde_json::json!({
                "layer": change.layer,
                "old": change.old_value,
                "new": change.new_value,
            }),
            run_id,
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: String,
    pub command: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub summary: serde_json::Value,
}

impl RunRecord {
    pub fn new(command: &str, started_at: DateTime<Utc>, summary: serde_json::Value) -> Self {
        RunRecord {
            run_id: uuid::Uuid::new_v4().to_string(),
            command: command.to_string(),
            started_at,
            finished_at: Utc::now(),
            summary,
        }
    }
}

pub struct RunLedger {
    conn: Connection,
}

impl RunLedger {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open ledger: {}", path.display()))?;
        // WAL for crash recovery
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        setup_ledger(&conn)?;
        Ok(RunLedger { conn })
    }

    /// Record one run and its layer changes in a single transaction
    pub fn record_run(&mut self, run: &RunRecord, changes: &[LayerChange]) -> Result<usize> {
        let tx = self.conn.transaction()?;

        tx.execute(
            "INSERT INTO runs (run_id, command, started_at, finished_at, summary)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                run.run_id,
                run.command,
                run.started_at.to_rfc3339(),
                run.finished_at.to_rfc3339(),
                serde_json::to_string(&run.summary)?,
            ],
        )?;

        for change in changes {
            insert_event(&tx, &Event::from_change(change, &run.run_id))?;
        }

        tx.commit().context("Failed to commit run to ledger")?;
        Ok(changes.len())
    }

    pub fn run_count(&self) -> Result<i64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM runs", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Events for one commune, newest first
    pub fn events_for_entity(&self, entity_id: &str) -> Result<Vec<Event>> {
        let mut stmt = self.conn.prepare(
            "SELECT event_id, timestamp, event_type, entity_type, entity_id, data, actor
             FROM events
             WHERE entity_type = 'commune' AND entity_id = ?1
             ORDER BY id DESC",
        )?;

        let events = stmt
            .query_map(params![entity_id], |row| {
                let timestamp_str: String = row.get(1)?;
                let data_json: String = row.get(5)?;

                Ok(Event {
                    event_id: row.get(0)?,
                    timestamp: DateTime::parse_from_rfc3339(&timestamp_str)
                        .map_err(|_| rusqlite::Error::InvalidQuery)?
                        .with_timezone(&Utc),
                    event_type: row.get(2)?,
                    entity_type: row.get(3)?,
                    entity_id: row.get(4)?,
                    data: serde_json::from_str(&data_json)
                        .map_err(|_| rusqlite::Error::InvalidQuery)?,
                    actor: row.get(6)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(events)
    }
}

fn setup_ledger(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS runs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            run_id TEXT UNIQUE NOT NULL,
            command TEXT NOT NULL,
            started_at TEXT NOT NULL,
            finished_at TEXT NOT NULL,
            summary TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id TEXT UNIQUE NOT NULL,
            timestamp TEXT NOT NULL,
            event_type TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            data TEXT NOT NULL,
            actor TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_entity ON events(entity_type, entity_id)",
        [],
    )?;

    Ok(())
}

fn insert_event(conn: &Connection, event: &Event) -> Result<()> {
    let data_json = serde_json::to_string(&event.data)?;

    conn.execute(
        "INSERT INTO events (
            event_id, timestamp, event_type, entity_type, entity_id, data, actor
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            event.event_id,
            event.timestamp.to_rfc3339(),
            event.event_type,
            event.entity_type,
            event.entity_id,
            data_json,
            event.actor,
        ],
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn change(id: &str, old: Option<i64>, new: i64) -> LayerChange {
        LayerChange {
            entity_id: id.to_string(),
            layer: "population".to_string(),
            old_value: old.map(|v| serde_json::json!({"value": v})),
            new_value: serde_json::json!({"value": new}),
        }
    }

    #[test]
    fn test_record_run_and_events() {
        let mut ledger = RunLedger::open_in_memory().unwrap();
        let run = RunRecord::new("demographics", Utc::now(), serde_json::json!({"matched": 2}));

        let written = ledger
            .record_run(&run, &[change("mamer", None, 1000), change("kayl", None, 900)])
            .unwrap();

        assert_eq!(written, 2);
        assert_eq!(ledger.run_count().unwrap(), 1);

        let events = ledger.events_for_entity("mamer").unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "layer_changed");
        assert_eq!(events[0].actor, run.run_id);
        assert_eq!(events[0].data["new"]["value"], 1000);
        assert!(events[0].data["old"].is_null());
    }

    #[test]
    fn test_events_newest_first() {
        let mut ledger = RunLedger::open_in_memory().unwrap();

        let first = RunRecord::new("demographics", Utc::now(), serde_json::json!({}));
        ledger.record_run(&first, &[change("ell", None, 1400)]).unwrap();
        let second = RunRecord::new("demographics", Utc::now(), serde_json::json!({}));
        ledger
            .record_run(&second, &[change("ell", Some(1400), 1450)])
            .unwrap();

        let events = ledger.events_for_entity("ell").unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].actor, second.run_id);
        assert_eq!(events[0].data["old"]["value"], 1400);
    }

    #[test]
    fn test_ledger_file_reopens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("runs.db");

        {
            let mut ledger = RunLedger::open(&path).unwrap();
            let run = RunRecord::new("prices", Utc::now(), serde_json::json!({}));
            ledger.record_run(&run, &[]).unwrap();
        }

        let ledger = RunLedger::open(&path).unwrap();
        assert_eq!(ledger.run_count().unwrap(), 1);
    }
}
