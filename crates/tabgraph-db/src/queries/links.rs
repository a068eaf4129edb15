//! Tab-entity link queries.

use chrono::Utc;
use rusqlite::params;
use tabgraph_core::{Entity, Tab};

use crate::pool::{DbError, DbPool, DbResult};
use crate::queries::{entities, tabs};
use crate::time;

/// Link a tab to an entity, updating `last_seen` when the link exists.
pub fn link(pool: &DbPool, tab_id: i64, entity_id: i64) -> DbResult<()> {
    pool.with_conn(|conn| {
        let now = time::to_column(Utc::now());
        conn.execute(
            "INSERT INTO tab_entities (tab_id, entity_id, first_seen, last_seen)
             VALUES (?1, ?2, ?3, ?3)
             ON CONFLICT (tab_id, entity_id) DO UPDATE SET last_seen = ?3",
            params![tab_id, entity_id, now],
        )?;
        Ok(())
    })
}

/// Drop every entity link of a tab. Used by reconciliation when a tab
/// closes, so orphan collection can see truly unreferenced entities.
pub fn unlink_all(pool: &DbPool, tab_id: i64) -> DbResult<usize> {
    pool.with_conn(|conn| {
        let removed = conn.execute("DELETE FROM tab_entities WHERE tab_id = ?1", params![tab_id])?;
        Ok(removed)
    })
}

/// All entities linked to a tab.
pub fn entities_for_tab(pool: &DbPool, tab_id: i64) -> DbResult<Vec<Entity>> {
    pool.with_conn(|conn| {
        entities::query_entities(
            conn,
            &format!(
                "SELECT {} FROM entities e
                 JOIN tab_entities te ON e.id = te.entity_id
                 WHERE te.tab_id = ?1
                 ORDER BY te.first_seen",
                entities::prefixed_columns("e")
            ),
            params![tab_id],
        )
    })
}

/// All tabs that mention an entity.
pub fn tabs_for_entity(pool: &DbPool, entity_id: i64) -> DbResult<Vec<Tab>> {
    pool.with_conn(|conn| {
        tabs::query_tabs(
            conn,
            &format!(
                "SELECT {} FROM tabs t
                 JOIN tab_entities te ON t.id = te.tab_id
                 WHERE te.entity_id = ?1
                 ORDER BY t.last_accessed DESC",
                tabs::prefixed_columns("t")
            ),
            params![entity_id],
        )
    })
}

/// Tabs sharing at least `min_shared` entities with the given tab,
/// ordered by overlap descending, with the shared count.
pub fn tabs_sharing_entities(
    pool: &DbPool,
    tab_id: i64,
    min_shared: i64,
    limit: i64,
) -> DbResult<Vec<(i64, i64)>> {
    pool.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT te2.tab_id, COUNT(DISTINCT te2.entity_id) AS shared_count
             FROM tab_entities te1
             JOIN tab_entities te2 ON te1.entity_id = te2.entity_id
             WHERE te1.tab_id = ?1 AND te2.tab_id != ?1
             GROUP BY te2.tab_id
             HAVING shared_count >= ?2
             ORDER BY shared_count DESC
             LIMIT ?3",
        )?;
        let rows = stmt.query_map(params![tab_id, min_shared, limit], |row| {
            Ok((row.get(0)?, row.get(1)?))
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(DbError::from)
    })
}
