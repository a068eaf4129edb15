//! Materialized tab-tab edges with Jaccard strength.

use std::collections::HashSet;

use chrono::Utc;
use rusqlite::params;
use tabgraph_core::{TabEdge, TabRelationship};

use crate::pool::{DbError, DbPool, DbResult};
use crate::queries::links;
use crate::time;

/// Create or update the edge between two tabs.
///
/// Edges are undirected and stored once with `tab_id_1 < tab_id_2`.
pub fn upsert(
    pool: &DbPool,
    tab_id_1: i64,
    tab_id_2: i64,
    shared_entities: &[String],
    strength: f64,
) -> DbResult<()> {
    let (low, high) = if tab_id_1 < tab_id_2 {
        (tab_id_1, tab_id_2)
    } else {
        (tab_id_2, tab_id_1)
    };

    pool.with_conn(|conn| {
        let shared_json = serde_json::to_string(shared_entities)?;
        let now = time::to_column(Utc::now());
        conn.execute(
            "INSERT INTO tab_relationships
                 (tab_id_1, tab_id_2, shared_entity_count, shared_entities,
                  relationship_strength, first_connected, last_updated)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
             ON CONFLICT (tab_id_1, tab_id_2) DO UPDATE SET
                 shared_entity_count = ?3,
                 shared_entities = ?4,
                 relationship_strength = ?5,
                 last_updated = ?6",
            params![low, high, shared_entities.len() as i64, shared_json, strength, now],
        )?;
        Ok(())
    })
}

/// Drop every edge touching a tab. Used when a tab closes or is deleted.
pub fn delete_for_tab(pool: &DbPool, tab_id: i64) -> DbResult<usize> {
    pool.with_conn(|conn| {
        let removed = conn.execute(
            "DELETE FROM tab_relationships WHERE tab_id_1 = ?1 OR tab_id_2 = ?1",
            params![tab_id],
        )?;
        Ok(removed)
    })
}

fn parse_shared(raw: Option<String>) -> Vec<String> {
    raw.as_deref()
        .and_then(|json| serde_json::from_str(json).ok())
        .unwrap_or_default()
}

/// All edges touching a tab, strongest first, with the far tab resolved.
pub fn list_for_tab(
    pool: &DbPool,
    tab_id: i64,
    min_strength: f64,
    limit: i64,
) -> DbResult<Vec<TabRelationship>> {
    pool.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT
                 CASE WHEN tr.tab_id_1 = ?1 THEN tr.tab_id_2 ELSE tr.tab_id_1 END AS related_id,
                 t.title, t.url,
                 tr.shared_entity_count, tr.shared_entities, tr.relationship_strength,
                 tr.first_connected, tr.last_updated
             FROM tab_relationships tr
             JOIN tabs t
               ON t.id = CASE WHEN tr.tab_id_1 = ?1 THEN tr.tab_id_2 ELSE tr.tab_id_1 END
             WHERE (tr.tab_id_1 = ?1 OR tr.tab_id_2 = ?1)
               AND tr.relationship_strength >= ?2
             ORDER BY tr.relationship_strength DESC
             LIMIT ?3",
        )?;

        let rows = stmt.query_map(params![tab_id, min_strength, limit], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, Option<String>>(4)?,
                row.get::<_, f64>(5)?,
                row.get::<_, String>(6)?,
                row.get::<_, String>(7)?,
            ))
        })?;

        let rows = rows.collect::<Result<Vec<_>, _>>().map_err(DbError::from)?;
        rows.into_iter()
            .map(|(id, title, url, count, shared, strength, first, last)| {
                Ok(TabRelationship {
                    related_tab_id: id,
                    related_tab_title: title,
                    related_tab_url: url,
                    shared_entities: parse_shared(shared),
                    shared_entity_count: count,
                    strength,
                    first_connected: time::parse(&first)?,
                    last_updated: time::parse(&last)?,
                })
            })
            .collect()
    })
}

/// All edges at or above the given strength, strongest first.
pub fn list_all(pool: &DbPool, min_strength: f64) -> DbResult<Vec<TabEdge>> {
    pool.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT tab_id_1, tab_id_2, shared_entity_count, shared_entities,
                    relationship_strength, first_connected, last_updated
             FROM tab_relationships
             WHERE relationship_strength >= ?1
             ORDER BY relationship_strength DESC",
        )?;

        let rows = stmt.query_map(params![min_strength], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, f64>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, String>(6)?,
            ))
        })?;

        let rows = rows.collect::<Result<Vec<_>, _>>().map_err(DbError::from)?;
        rows.into_iter()
            .map(|(low, high, count, shared, strength, first, last)| {
                Ok(TabEdge {
                    tab_id_low: low,
                    tab_id_high: high,
                    shared_entities: parse_shared(shared),
                    shared_entity_count: count,
                    strength,
                    first_connected: time::parse(&first)?,
                    last_updated: time::parse(&last)?,
                })
            })
            .collect()
    })
}

/// Recompute and store every edge between a tab and the tabs it shares
/// entities with. Returns the number of edges written.
pub fn rebuild_for_tab(pool: &DbPool, tab_id: i64, min_shared: i64) -> DbResult<usize> {
    let tab_entities: HashSet<String> = links::entities_for_tab(pool, tab_id)?
        .into_iter()
        .map(|e| e.name)
        .collect();
    if tab_entities.is_empty() {
        return Ok(0);
    }

    let related = links::tabs_sharing_entities(pool, tab_id, min_shared, 50)?;

    let mut count = 0;
    for (related_id, _) in related {
        let related_entities: HashSet<String> = links::entities_for_tab(pool, related_id)?
            .into_iter()
            .map(|e| e.name)
            .collect();

        let mut shared: Vec<String> = tab_entities
            .intersection(&related_entities)
            .cloned()
            .collect();
        shared.sort();

        let union = tab_entities.union(&related_entities).count();
        let strength = if union > 0 {
            shared.len() as f64 / union as f64
        } else {
            0.0
        };

        upsert(pool, tab_id, related_id, &shared, strength)?;
        count += 1;
    }

    Ok(count)
}
