//! Entity queries.

use chrono::Utc;
use rusqlite::{params, Row};
use tabgraph_core::Entity;
use tracing::info;

use crate::pool::{DbError, DbPool, DbResult};
use crate::{time, vector};

const ENTITY_COLUMNS: &str = "id, name, entity_type, description, web_description, \
     related_concepts, source_url, is_enriched, enriched_at, embedding, created_at";

/// Column list as `alias.column` for joined selects.
pub(crate) fn prefixed_columns(alias: &str) -> String {
    ENTITY_COLUMNS
        .split(", ")
        .map(|column| format!("{}.{}", alias, column))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Raw entity row, before timestamp and JSON decoding.
struct EntityRow {
    id: i64,
    name: String,
    entity_type: String,
    description: Option<String>,
    web_description: Option<String>,
    related_concepts: Option<String>,
    source_url: Option<String>,
    is_enriched: bool,
    enriched_at: Option<String>,
    embedding: Option<Vec<u8>>,
    created_at: String,
}

fn read_row(row: &Row) -> rusqlite::Result<EntityRow> {
    Ok(EntityRow {
        id: row.get(0)?,
        name: row.get(1)?,
        entity_type: row.get(2)?,
        description: row.get(3)?,
        web_description: row.get(4)?,
        related_concepts: row.get(5)?,
        source_url: row.get(6)?,
        is_enriched: row.get(7)?,
        enriched_at: row.get(8)?,
        embedding: row.get(9)?,
        created_at: row.get(10)?,
    })
}

fn into_entity(row: EntityRow) -> DbResult<Entity> {
    let related_concepts = row
        .related_concepts
        .as_deref()
        .and_then(|raw| serde_json::from_str(raw).ok())
        .unwrap_or_default();

    Ok(Entity {
        id: Some(row.id),
        name: row.name,
        entity_type: row.entity_type,
        description: row.description,
        web_description: row.web_description,
        related_concepts,
        source_url: row.source_url,
        is_enriched: row.is_enriched,
        enriched_at: time::parse_opt(row.enriched_at)?,
        embedding: row.embedding.as_deref().map(vector::from_blob),
        created_at: time::parse(&row.created_at)?,
    })
}

/// Run an entity SELECT and map the rows into domain entities.
///
/// The statement must select `ENTITY_COLUMNS` in order.
pub(crate) fn query_entities(
    conn: &rusqlite::Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> DbResult<Vec<Entity>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, read_row)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(DbError::from)?;
    rows.into_iter().map(into_entity).collect()
}

/// Insert an entity if `(name, entity_type)` is new, returning the id of
/// the inserted or existing row.
pub fn upsert(pool: &DbPool, entity: &Entity) -> DbResult<i64> {
    pool.with_conn(|conn| {
        let related_json = if entity.related_concepts.is_empty() {
            None
        } else {
            Some(serde_json::to_string(&entity.related_concepts)?)
        };
        let embedding_blob = entity.embedding.as_deref().map(vector::to_blob);

        conn.execute(
            "INSERT OR IGNORE INTO entities
                 (name, entity_type, description, web_description, related_concepts,
                  source_url, is_enriched, enriched_at, embedding, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                entity.name,
                entity.entity_type,
                entity.description,
                entity.web_description,
                related_json,
                entity.source_url,
                entity.is_enriched,
                entity.enriched_at.map(time::to_column),
                embedding_blob,
                time::to_column(entity.created_at),
            ],
        )?;

        conn.query_row(
            "SELECT id FROM entities WHERE name = ?1 AND entity_type = ?2",
            params![entity.name, entity.entity_type],
            |row| row.get(0),
        )
        .map_err(DbError::from)
    })
}

/// Fetch an entity by id.
pub fn get(pool: &DbPool, entity_id: i64) -> DbResult<Option<Entity>> {
    pool.with_conn(|conn| {
        let rows = query_entities(
            conn,
            &format!("SELECT {} FROM entities WHERE id = ?1", ENTITY_COLUMNS),
            params![entity_id],
        )?;
        Ok(rows.into_iter().next())
    })
}

/// Fetch an entity by name, first match across types unless a type is given.
pub fn get_by_name(pool: &DbPool, name: &str, entity_type: Option<&str>) -> DbResult<Option<Entity>> {
    pool.with_conn(|conn| {
        let rows = match entity_type {
            Some(kind) => query_entities(
                conn,
                &format!(
                    "SELECT {} FROM entities WHERE name = ?1 AND entity_type = ?2",
                    ENTITY_COLUMNS
                ),
                params![name, kind],
            )?,
            None => query_entities(
                conn,
                &format!("SELECT {} FROM entities WHERE name = ?1 ORDER BY id", ENTITY_COLUMNS),
                params![name],
            )?,
        };
        Ok(rows.into_iter().next())
    })
}

/// Batch-fetch entities by name in a single query. Missing names are
/// simply absent from the result.
pub fn get_by_names(pool: &DbPool, names: &[String]) -> DbResult<Vec<Entity>> {
    if names.is_empty() {
        return Ok(Vec::new());
    }

    pool.with_conn(|conn| {
        let placeholders = vec!["?"; names.len()].join(",");
        let sql = format!(
            "SELECT {} FROM entities WHERE name IN ({})",
            ENTITY_COLUMNS, placeholders
        );
        query_entities(conn, &sql, rusqlite::params_from_iter(names.iter()))
    })
}

/// Search entities by name substring.
pub fn search_by_name(pool: &DbPool, query: &str, limit: i64) -> DbResult<Vec<Entity>> {
    pool.with_conn(|conn| {
        query_entities(
            conn,
            &format!(
                "SELECT {} FROM entities WHERE name LIKE ?1 ORDER BY name LIMIT ?2",
                ENTITY_COLUMNS
            ),
            params![format!("%{}%", query), limit],
        )
    })
}

/// Write global enrichment fields onto an entity.
pub fn update_enrichment(
    pool: &DbPool,
    entity_id: i64,
    web_description: &str,
    entity_type: &str,
    related_concepts: &[String],
    source_url: Option<&str>,
) -> DbResult<bool> {
    pool.with_conn(|conn| {
        let related_json = serde_json::to_string(related_concepts)?;
        let changed = conn.execute(
            "UPDATE entities
             SET web_description = ?1, entity_type = ?2, related_concepts = ?3,
                 source_url = ?4, is_enriched = 1, enriched_at = ?5
             WHERE id = ?6",
            params![
                web_description,
                entity_type,
                related_json,
                source_url,
                time::to_column(Utc::now()),
                entity_id,
            ],
        )?;
        Ok(changed > 0)
    })
}

/// Write an embedding of the entity name.
pub fn update_embedding(pool: &DbPool, entity_id: i64, embedding: &[f32]) -> DbResult<bool> {
    pool.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE entities SET embedding = ?1 WHERE id = ?2",
            params![vector::to_blob(embedding), entity_id],
        )?;
        Ok(changed > 0)
    })
}

/// Entities that are un-enriched or whose enrichment is older than the TTL.
pub fn list_needing_enrichment(pool: &DbPool, limit: i64, cache_ttl_days: i64) -> DbResult<Vec<Entity>> {
    pool.with_conn(|conn| {
        let expiry = time::to_column(Utc::now() - chrono::Duration::days(cache_ttl_days));
        query_entities(
            conn,
            &format!(
                "SELECT {} FROM entities
                 WHERE is_enriched = 0 OR enriched_at IS NULL OR enriched_at < ?1
                 LIMIT ?2",
                ENTITY_COLUMNS
            ),
            params![expiry, limit],
        )
    })
}

/// Delete an entity by id, cascading triplets and links.
pub fn delete(pool: &DbPool, entity_id: i64) -> DbResult<bool> {
    pool.with_conn(|conn| {
        let changed = conn.execute("DELETE FROM entities WHERE id = ?1", params![entity_id])?;
        Ok(changed > 0)
    })
}

/// Remove every entity that no tab references, returning the count removed.
///
/// Run after reconciliation closes tabs and their links are gone.
pub fn remove_orphans(pool: &DbPool) -> DbResult<usize> {
    pool.with_conn(|conn| {
        let removed = conn.execute(
            "DELETE FROM entities WHERE id IN (
                 SELECT e.id FROM entities e
                 LEFT JOIN tab_entities te ON e.id = te.entity_id
                 WHERE te.entity_id IS NULL
             )",
            [],
        )?;
        if removed > 0 {
            info!(removed, "Removed orphaned entities");
        }
        Ok(removed)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::test_pool;

    #[test]
    fn upsert_is_unique_by_name_and_type() {
        let pool = test_pool();

        let first = upsert(&pool, &Entity::concept("React")).unwrap();
        let second = upsert(&pool, &Entity::concept("React")).unwrap();
        assert_eq!(first, second);

        let mut tool = Entity::concept("React");
        tool.entity_type = "tool".to_string();
        let third = upsert(&pool, &tool).unwrap();
        assert_ne!(first, third);
    }

    #[test]
    fn get_by_name_without_type_returns_first_match() {
        let pool = test_pool();
        upsert(&pool, &Entity::concept("Rust")).unwrap();

        let found = get_by_name(&pool, "Rust", None).unwrap().unwrap();
        assert_eq!(found.name, "Rust");
        assert_eq!(found.entity_type, "concept");
        assert!(get_by_name(&pool, "Go", None).unwrap().is_none());
    }

    #[test]
    fn get_by_names_returns_only_found_rows() {
        let pool = test_pool();
        upsert(&pool, &Entity::concept("React")).unwrap();
        upsert(&pool, &Entity::concept("Vue")).unwrap();

        let found = get_by_names(
            &pool,
            &["React".to_string(), "Vue".to_string(), "Angular".to_string()],
        )
        .unwrap();
        assert_eq!(found.len(), 2);

        assert!(get_by_names(&pool, &[]).unwrap().is_empty());
    }

    #[test]
    fn enrichment_round_trip() {
        let pool = test_pool();
        let id = upsert(&pool, &Entity::concept("CRISPR")).unwrap();

        update_enrichment(
            &pool,
            id,
            "A gene editing technique.",
            "method",
            &["Gene Editing".to_string()],
            None,
        )
        .unwrap();

        let entity = get(&pool, id).unwrap().unwrap();
        assert!(entity.is_enriched);
        assert_eq!(entity.entity_type, "method");
        assert_eq!(entity.web_description.as_deref(), Some("A gene editing technique."));
        assert_eq!(entity.related_concepts, vec!["Gene Editing".to_string()]);
        assert!(!entity.needs_enrichment(7, Utc::now()));
    }

    #[test]
    fn embedding_round_trip() {
        let pool = test_pool();
        let id = upsert(&pool, &Entity::concept("Neo4j")).unwrap();

        update_embedding(&pool, id, &[0.5, -0.5, 1.0]).unwrap();
        let entity = get(&pool, id).unwrap().unwrap();
        assert_eq!(entity.embedding, Some(vec![0.5, -0.5, 1.0]));
    }

    #[test]
    fn list_needing_enrichment_applies_ttl() {
        let pool = test_pool();
        let stale = upsert(&pool, &Entity::concept("Stale")).unwrap();
        let fresh = upsert(&pool, &Entity::concept("Fresh")).unwrap();
        update_enrichment(&pool, fresh, "desc", "concept", &[], None).unwrap();

        let needing = list_needing_enrichment(&pool, 10, 7).unwrap();
        let ids: Vec<i64> = needing.iter().filter_map(|e| e.id).collect();
        assert!(ids.contains(&stale));
        assert!(!ids.contains(&fresh));
    }
}
