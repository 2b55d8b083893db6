use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::Connection;

use crate::record::ProjectRecord;

pub fn connect(path: &Path) -> Result<Connection> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
    }
    let conn = Connection::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    conn.execute_batch("PRAGMA journal_mode=WAL;")?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS projects (
            record_key         TEXT PRIMARY KEY,
            project_id         TEXT,
            description        TEXT,
            location           TEXT,
            contractor         TEXT,
            cost               TEXT,
            completion_date    TEXT,
            report_contract_id TEXT,
            start_date         TEXT,
            project_type       TEXT,
            funding_year       TEXT,
            report_year        TEXT,
            region             TEXT,
            lat                REAL,
            lng                REAL,
            run_id             TEXT NOT NULL,
            updated_at         TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_projects_pid ON projects(project_id);
        CREATE INDEX IF NOT EXISTS idx_projects_rcid ON projects(report_contract_id);

        CREATE TABLE IF NOT EXISTS runs (
            run_id           TEXT PRIMARY KEY,
            command          TEXT NOT NULL,
            started_at       TEXT NOT NULL,
            finished_at      TEXT NOT NULL,
            pages_fetched    INTEGER NOT NULL DEFAULT 0,
            rows_parsed      INTEGER NOT NULL DEFAULT 0,
            rows_skipped     INTEGER NOT NULL DEFAULT 0,
            collected        INTEGER NOT NULL DEFAULT 0,
            unique_records   INTEGER NOT NULL DEFAULT 0,
            duplicates       INTEGER NOT NULL DEFAULT 0,
            fallback_records INTEGER NOT NULL DEFAULT 0,
            backfilled       INTEGER NOT NULL DEFAULT 0,
            termination      TEXT NOT NULL,
            detail           TEXT
        );
        ",
    )?;
    Ok(())
}

// ── Projects ──

/// Upsert by composite key; a later run replaces the stored row.
pub fn save_projects(conn: &Connection, run_id: &str, records: &[ProjectRecord]) -> Result<usize> {
    let tx = conn.unchecked_transaction()?;
    let mut count = 0;
    {
        let mut stmt = tx.prepare(
            "INSERT OR REPLACE INTO projects
             (record_key, project_id, description, location, contractor, cost, completion_date,
              report_contract_id, start_date, project_type, funding_year, report_year, region,
              lat, lng, run_id)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16)",
        )?;
        for r in records {
            count += stmt.execute(rusqlite::params![
                r.key().to_string(),
                r.project_id, r.description, r.location, r.contractor, r.cost, r.completion_date,
                r.report_contract_id, r.start_date, r.project_type, r.funding_year, r.report_year,
                r.region, r.lat, r.lng, run_id,
            ])?;
        }
    }
    tx.commit()?;
    Ok(count)
}

pub fn fetch_projects(conn: &Connection) -> Result<Vec<ProjectRecord>> {
    let mut stmt = conn.prepare(
        "SELECT project_id, description, location, contractor, cost, completion_date,
                report_contract_id, start_date, project_type, funding_year, report_year,
                region, lat, lng
         FROM projects ORDER BY rowid",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok(ProjectRecord {
                project_id: row.get(0)?,
                description: row.get(1)?,
                location: row.get(2)?,
                contractor: row.get(3)?,
                cost: row.get(4)?,
                completion_date: row.get(5)?,
                report_contract_id: row.get(6)?,
                start_date: row.get(7)?,
                project_type: row.get(8)?,
                funding_year: row.get(9)?,
                report_year: row.get(10)?,
                region: row.get(11)?,
                lat: row.get(12)?,
                lng: row.get(13)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ── Runs ──

pub struct RunRow {
    pub run_id: String,
    pub command: String,
    pub started_at: String,
    pub finished_at: String,
    pub pages_fetched: u32,
    pub rows_parsed: usize,
    pub rows_skipped: usize,
    pub collected: usize,
    pub unique_records: usize,
    pub duplicates: usize,
    pub fallback_records: usize,
    pub backfilled: usize,
    pub termination: String,
    pub detail: Option<String>,
}

pub fn record_run(conn: &Connection, run: &RunRow) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO runs
         (run_id, command, started_at, finished_at, pages_fetched, rows_parsed, rows_skipped,
          collected, unique_records, duplicates, fallback_records, backfilled, termination, detail)
         VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14)",
        rusqlite::params![
            run.run_id, run.command, run.started_at, run.finished_at, run.pages_fetched,
            run.rows_parsed, run.rows_skipped, run.collected, run.unique_records, run.duplicates,
            run.fallback_records, run.backfilled, run.termination, run.detail,
        ],
    )?;
    Ok(())
}

pub fn fetch_runs(conn: &Connection, limit: usize) -> Result<Vec<RunRow>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT run_id, command, started_at, finished_at, pages_fetched, rows_parsed,
                rows_skipped, collected, unique_records, duplicates, fallback_records,
                backfilled, termination, detail
         FROM runs ORDER BY started_at DESC, run_id DESC LIMIT {}",
        limit
    ))?;
    let rows = stmt
        .query_map([], |row| {
            Ok(RunRow {
                run_id: row.get(0)?,
                command: row.get(1)?,
                started_at: row.get(2)?,
                finished_at: row.get(3)?,
                pages_fetched: row.get(4)?,
                rows_parsed: row.get(5)?,
                rows_skipped: row.get(6)?,
                collected: row.get(7)?,
                unique_records: row.get(8)?,
                duplicates: row.get(9)?,
                fallback_records: row.get(10)?,
                backfilled: row.get(11)?,
                termination: row.get(12)?,
                detail: row.get(13)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ── Stats ──

pub struct Stats {
    pub projects: usize,
    pub with_coordinates: usize,
    pub with_project_type: usize,
    pub with_region: usize,
    pub runs: usize,
}

pub fn get_stats(conn: &Connection) -> Result<Stats> {
    let count = |sql: &str| -> Result<usize> { Ok(conn.query_row(sql, [], |r| r.get(0))?) };
    Ok(Stats {
        projects: count("SELECT COUNT(*) FROM projects")?,
        with_coordinates: count("SELECT COUNT(*) FROM projects WHERE lat IS NOT NULL AND lng IS NOT NULL")?,
        with_project_type: count("SELECT COUNT(*) FROM projects WHERE project_type IS NOT NULL")?,
        with_region: count("SELECT COUNT(*) FROM projects WHERE region IS NOT NULL")?,
        runs: count("SELECT COUNT(*) FROM runs")?,
    })
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    fn mem() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        conn
    }

    fn rec(pid: &str, region: Option<&str>) -> ProjectRecord {
        ProjectRecord {
            project_id: Some(pid.into()),
            region: region.map(Into::into),
            lat: Some(14.5),
            lng: Some(121.0),
            ..Default::default()
        }
    }

    fn run(id: &str, started: &str) -> RunRow {
        RunRow {
            run_id: id.into(),
            command: "run".into(),
            started_at: started.into(),
            finished_at: started.into(),
            pages_fetched: 2,
            rows_parsed: 4,
            rows_skipped: 1,
            collected: 4,
            unique_records: 3,
            duplicates: 1,
            fallback_records: 0,
            backfilled: 0,
            termination: "exhausted".into(),
            detail: None,
        }
    }

    #[test]
    fn projects_upsert_by_key() {
        let conn = mem();
        save_projects(&conn, "r1", &[rec("1", None), rec("2", Some("NCR"))]).unwrap();
        save_projects(&conn, "r2", &[rec("2", Some("Region III"))]).unwrap();
        let rows = fetch_projects(&conn).unwrap();
        assert_eq!(rows.len(), 2);
        let two = rows.iter().find(|r| r.project_id.as_deref() == Some("2")).unwrap();
        assert_eq!(two.region.as_deref(), Some("Region III"));
        assert_eq!(two.lat, Some(14.5));
    }

    #[test]
    fn null_identifier_halves_are_distinct_keys() {
        let conn = mem();
        let a = ProjectRecord {
            report_contract_id: Some("C1".into()),
            ..Default::default()
        };
        let b = ProjectRecord {
            project_id: Some("C1".into()),
            ..Default::default()
        };
        assert_eq!(save_projects(&conn, "r", &[a, b]).unwrap(), 2);
    }

    #[test]
    fn runs_and_stats() {
        let conn = mem();
        record_run(&conn, &run("a", "2026-01-01T00:00:00Z")).unwrap();
        record_run(&conn, &run("b", "2026-02-01T00:00:00Z")).unwrap();
        save_projects(&conn, "b", &[rec("1", Some("NCR"))]).unwrap();

        let runs = fetch_runs(&conn, 10).unwrap();
        assert_eq!(runs[0].run_id, "b");
        assert_eq!(runs[1].unique_records, 3);

        let s = get_stats(&conn).unwrap();
        assert_eq!(s.projects, 1);
        assert_eq!(s.with_coordinates, 1);
        assert_eq!(s.with_region, 1);
        assert_eq!(s.with_project_type, 0);
        assert_eq!(s.runs, 2);
    }
}
