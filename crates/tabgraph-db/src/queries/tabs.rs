//! Tab queries.

use chrono::{DateTime, Utc};
use rusqlite::{params, Row};
use tabgraph_core::{Tab, TabMetadata};

use crate::pool::{DbError, DbPool, DbResult};
use crate::{time, vector};

const TAB_COLUMNS: &str = "id, url, title, favicon_url, summary, label, source, display_label, \
     embedding, opened_at, last_accessed, closed_at, window_id, group_id, is_active, important";

/// Column list as `alias.column` for joined selects.
pub(crate) fn prefixed_columns(alias: &str) -> String {
    TAB_COLUMNS
        .split(", ")
        .map(|column| format!("{}.{}", alias, column))
        .collect::<Vec<_>>()
        .join(", ")
}

struct TabRow {
    id: i64,
    url: String,
    title: String,
    favicon_url: Option<String>,
    summary: Option<String>,
    label: Option<String>,
    source: Option<String>,
    display_label: Option<String>,
    embedding: Option<Vec<u8>>,
    opened_at: String,
    last_accessed: String,
    closed_at: Option<String>,
    window_id: Option<i64>,
    group_id: Option<i64>,
    is_active: bool,
    important: bool,
}

fn read_row(row: &Row) -> rusqlite::Result<TabRow> {
    Ok(TabRow {
        id: row.get(0)?,
        url: row.get(1)?,
        title: row.get(2)?,
        favicon_url: row.get(3)?,
        summary: row.get(4)?,
        label: row.get(5)?,
        source: row.get(6)?,
        display_label: row.get(7)?,
        embedding: row.get(8)?,
        opened_at: row.get(9)?,
        last_accessed: row.get(10)?,
        closed_at: row.get(11)?,
        window_id: row.get(12)?,
        group_id: row.get(13)?,
        is_active: row.get(14)?,
        important: row.get(15)?,
    })
}

fn into_tab(row: TabRow) -> DbResult<Tab> {
    Ok(Tab {
        id: row.id,
        url: row.url,
        title: row.title,
        favicon_url: row.favicon_url,
        summary: row.summary,
        label: row.label,
        source: row.source,
        display_label: row.display_label,
        // Entities live in tab_entities; load them via queries::links.
        entities: Vec::new(),
        embedding: row.embedding.as_deref().map(vector::from_blob),
        opened_at: time::parse(&row.opened_at)?,
        last_accessed: time::parse(&row.last_accessed)?,
        closed_at: time::parse_opt(row.closed_at)?,
        window_id: row.window_id,
        group_id: row.group_id,
        is_active: row.is_active,
        important: row.important,
    })
}

/// Run a tab SELECT and map the rows into domain tabs.
///
/// The statement must select `TAB_COLUMNS` in order.
pub(crate) fn query_tabs(
    conn: &rusqlite::Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> DbResult<Vec<Tab>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, read_row)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(DbError::from)?;
    rows.into_iter().map(into_tab).collect()
}

/// Insert a tab, or update it in place when the id already exists.
///
/// Updates preserve `opened_at`, reactivate the tab and clear `closed_at`.
pub fn upsert(pool: &DbPool, tab: &Tab) -> DbResult<()> {
    pool.with_conn(|conn| {
        let embedding_blob = tab.embedding.as_deref().map(vector::to_blob);
        let now = time::to_column(Utc::now());

        let updated = conn.execute(
            "UPDATE tabs
             SET url = ?1, title = ?2, favicon_url = ?3, embedding = ?4,
                 window_id = ?5, group_id = ?6, important = ?7,
                 last_accessed = ?8, is_active = 1, closed_at = NULL
             WHERE id = ?9",
            params![
                tab.url,
                tab.title,
                tab.favicon_url,
                embedding_blob,
                tab.window_id,
                tab.group_id,
                tab.important,
                now,
                tab.id,
            ],
        )?;

        if updated == 0 {
            conn.execute(
                "INSERT INTO tabs
                     (id, url, title, favicon_url, summary, label, source, display_label,
                      embedding, opened_at, last_accessed, window_id, group_id,
                      is_active, important)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, 1, ?14)",
                params![
                    tab.id,
                    tab.url,
                    tab.title,
                    tab.favicon_url,
                    tab.summary,
                    tab.label,
                    tab.source,
                    tab.display_label,
                    embedding_blob,
                    time::to_column(tab.opened_at),
                    now,
                    tab.window_id,
                    tab.group_id,
                    tab.important,
                ],
            )?;
        }
        Ok(())
    })
}

/// Fetch a tab by id. `entities` is left empty; see `queries::links`.
pub fn get(pool: &DbPool, tab_id: i64) -> DbResult<Option<Tab>> {
    pool.with_conn(|conn| {
        let rows = query_tabs(
            conn,
            &format!("SELECT {} FROM tabs WHERE id = ?1", TAB_COLUMNS),
            params![tab_id],
        )?;
        Ok(rows.into_iter().next())
    })
}

/// All currently active (open) tabs, most recently accessed first.
pub fn list_active(pool: &DbPool) -> DbResult<Vec<Tab>> {
    pool.with_conn(|conn| {
        query_tabs(
            conn,
            &format!(
                "SELECT {} FROM tabs WHERE is_active = 1 ORDER BY last_accessed DESC",
                TAB_COLUMNS
            ),
            [],
        )
    })
}

/// Tabs that were open at any point during the given time range.
pub fn list_in_range(pool: &DbPool, start: DateTime<Utc>, end: DateTime<Utc>) -> DbResult<Vec<Tab>> {
    pool.with_conn(|conn| {
        query_tabs(
            conn,
            &format!(
                "SELECT {} FROM tabs
                 WHERE opened_at <= ?1 AND (closed_at IS NULL OR closed_at >= ?2)
                 ORDER BY opened_at DESC",
                TAB_COLUMNS
            ),
            params![time::to_column(end), time::to_column(start)],
        )
    })
}

/// Mark a tab as closed (sets `closed_at`, `is_active = 0`).
pub fn mark_closed(pool: &DbPool, tab_id: i64) -> DbResult<bool> {
    pool.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE tabs SET closed_at = ?1, is_active = 0 WHERE id = ?2 AND is_active = 1",
            params![time::to_column(Utc::now()), tab_id],
        )?;
        Ok(changed > 0)
    })
}

/// Permanently delete a tab, cascading links, contexts and edges.
pub fn delete(pool: &DbPool, tab_id: i64) -> DbResult<bool> {
    pool.with_conn(|conn| {
        let changed = conn.execute("DELETE FROM tabs WHERE id = ?1", params![tab_id])?;
        Ok(changed > 0)
    })
}

/// Write provider-generated metadata onto a tab.
pub fn update_metadata(pool: &DbPool, tab_id: i64, metadata: &TabMetadata) -> DbResult<bool> {
    pool.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE tabs SET summary = ?1, label = ?2, source = ?3, display_label = ?4
             WHERE id = ?5",
            params![
                metadata.summary,
                metadata.label,
                metadata.source,
                metadata.display_label,
                tab_id,
            ],
        )?;
        Ok(changed > 0)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::test_pool;

    #[test]
    fn upsert_preserves_opened_at_on_update() {
        let pool = test_pool();
        let mut tab = Tab::new(1, "https://react.dev", "React");
        tab.opened_at = Utc::now() - chrono::Duration::hours(2);
        upsert(&pool, &tab).unwrap();

        mark_closed(&pool, 1).unwrap();

        tab.title = "React Documentation".to_string();
        upsert(&pool, &tab).unwrap();

        let stored = get(&pool, 1).unwrap().unwrap();
        assert_eq!(stored.title, "React Documentation");
        assert!(stored.is_active);
        assert!(stored.closed_at.is_none());
        assert_eq!(stored.opened_at.timestamp(), tab.opened_at.timestamp());
    }

    #[test]
    fn mark_closed_deactivates_once() {
        let pool = test_pool();
        upsert(&pool, &Tab::new(1, "https://a", "A")).unwrap();

        assert!(mark_closed(&pool, 1).unwrap());
        assert!(!mark_closed(&pool, 1).unwrap());
        assert!(list_active(&pool).unwrap().is_empty());
    }

    #[test]
    fn list_in_range_includes_overlapping_tabs() {
        let pool = test_pool();
        let now = Utc::now();
        let mut tab = Tab::new(1, "https://a", "A");
        tab.opened_at = now - chrono::Duration::hours(3);
        upsert(&pool, &tab).unwrap();

        let hits = list_in_range(&pool, now - chrono::Duration::hours(1), now).unwrap();
        assert_eq!(hits.len(), 1);

        let misses = list_in_range(
            &pool,
            now - chrono::Duration::hours(6),
            now - chrono::Duration::hours(4),
        )
        .unwrap();
        assert!(misses.is_empty());
    }

    #[test]
    fn metadata_round_trip() {
        let pool = test_pool();
        upsert(&pool, &Tab::new(1, "https://a", "A")).unwrap();

        let metadata = TabMetadata {
            label: "React hooks guide".to_string(),
            source: "React".to_string(),
            summary: "An introduction to hooks.".to_string(),
            display_label: "React hooks guide • React".to_string(),
        };
        assert!(update_metadata(&pool, 1, &metadata).unwrap());

        let stored = get(&pool, 1).unwrap().unwrap();
        assert_eq!(stored.label.as_deref(), Some("React hooks guide"));
        assert_eq!(stored.display_label.as_deref(), Some("React hooks guide • React"));
    }
}
