//! Per-tab contextual entity descriptions.
//!
//! The same entity name can mean different things on different pages;
//! each `(entity, tab)` pair carries its own agent-written description.

use std::collections::HashMap;

use chrono::Utc;
use rusqlite::params;

use crate::pool::{DbError, DbPool, DbResult};
use crate::time;

/// Save the context-specific description for an entity on a tab.
pub fn upsert(pool: &DbPool, entity_id: i64, tab_id: i64, description: &str) -> DbResult<()> {
    pool.with_conn(|conn| {
        conn.execute(
            "INSERT OR REPLACE INTO entity_tab_contexts
                 (entity_id, tab_id, description, enriched_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![entity_id, tab_id, description, time::to_column(Utc::now())],
        )?;
        Ok(())
    })
}

/// The description of an entity in the context of one tab.
pub fn get(pool: &DbPool, entity_id: i64, tab_id: i64) -> DbResult<Option<String>> {
    pool.with_conn(|conn| {
        conn.query_row(
            "SELECT description FROM entity_tab_contexts
             WHERE entity_id = ?1 AND tab_id = ?2",
            params![entity_id, tab_id],
            |row| row.get(0),
        )
        .map(Some)
        .or_else(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => Ok(None),
            other => Err(DbError::from(other)),
        })
    })
}

/// All contextual descriptions for an entity, keyed by tab id.
pub fn map_for_entity(pool: &DbPool, entity_id: i64) -> DbResult<HashMap<i64, String>> {
    pool.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT tab_id, description FROM entity_tab_contexts WHERE entity_id = ?1",
        )?;
        let rows = stmt.query_map(params![entity_id], |row| Ok((row.get(0)?, row.get(1)?)))?;
        rows.collect::<Result<HashMap<_, _>, _>>()
            .map_err(DbError::from)
    })
}

/// `(entity_id, tab_id)` link pairs that have no contextual description yet.
pub fn pairs_missing(pool: &DbPool) -> DbResult<Vec<(i64, i64)>> {
    pool.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT te.entity_id, te.tab_id
             FROM tab_entities te
             LEFT JOIN entity_tab_contexts etc
               ON etc.entity_id = te.entity_id AND etc.tab_id = te.tab_id
             WHERE etc.entity_id IS NULL",
        )?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
        rows.collect::<Result<Vec<_>, _>>().map_err(DbError::from)
    })
}

/// Every `(entity_id, tab_id)` link pair.
pub fn all_pairs(pool: &DbPool) -> DbResult<Vec<(i64, i64)>> {
    pool.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT entity_id, tab_id FROM tab_entities")?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
        rows.collect::<Result<Vec<_>, _>>().map_err(DbError::from)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::test_pool;
    use crate::queries::{entities, links, tabs};
    use tabgraph_core::{Entity, Tab};

    #[test]
    fn same_entity_carries_distinct_descriptions_per_tab() {
        let pool = test_pool();
        tabs::upsert(&pool, &Tab::new(1, "https://ai.dev/docs", "Model Docs")).unwrap();
        tabs::upsert(&pool, &Tab::new(2, "https://hardware.shop", "Hardware Store")).unwrap();
        let entity_id = entities::upsert(&pool, &Entity::concept("tools")).unwrap();
        links::link(&pool, 1, entity_id).unwrap();
        links::link(&pool, 2, entity_id).unwrap();

        upsert(&pool, entity_id, 1, "Functions a model can call.").unwrap();
        upsert(&pool, entity_id, 2, "Hand tools for home repair.").unwrap();

        let contexts = map_for_entity(&pool, entity_id).unwrap();
        assert_eq!(contexts.len(), 2);
        assert_eq!(contexts[&1], "Functions a model can call.");
        assert_eq!(contexts[&2], "Hand tools for home repair.");
    }

    #[test]
    fn pairs_missing_shrinks_as_contexts_are_written() {
        let pool = test_pool();
        tabs::upsert(&pool, &Tab::new(1, "https://a", "A")).unwrap();
        let entity_id = entities::upsert(&pool, &Entity::concept("React")).unwrap();
        links::link(&pool, 1, entity_id).unwrap();

        assert_eq!(pairs_missing(&pool).unwrap(), vec![(entity_id, 1)]);
        upsert(&pool, entity_id, 1, "A UI library.").unwrap();
        assert!(pairs_missing(&pool).unwrap().is_empty());
        assert_eq!(all_pairs(&pool).unwrap().len(), 1);
    }

    #[test]
    fn contexts_cascade_with_tab_deletion() {
        let pool = test_pool();
        tabs::upsert(&pool, &Tab::new(1, "https://a", "A")).unwrap();
        let entity_id = entities::upsert(&pool, &Entity::concept("React")).unwrap();
        links::link(&pool, 1, entity_id).unwrap();
        upsert(&pool, entity_id, 1, "A UI library.").unwrap();

        tabs::delete(&pool, 1).unwrap();
        assert!(get(&pool, entity_id, 1).unwrap().is_none());
    }
}
