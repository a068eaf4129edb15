//! Temporal triplet queries.

use chrono::{DateTime, Utc};
use rusqlite::{params, Row};
use tabgraph_core::{TemporalValidity, Triplet};

use crate::pool::{DbError, DbPool, DbResult};
use crate::time;

const TRIPLET_SELECT: &str = "SELECT t.id, t.subject_id, e1.name, t.predicate, t.object_id, e2.name, \
            t.start_time, t.end_time, t.is_current, t.confidence, t.source, t.created_at \
     FROM triplets t \
     JOIN entities e1 ON t.subject_id = e1.id \
     JOIN entities e2 ON t.object_id = e2.id";

struct TripletRow {
    id: i64,
    subject_id: i64,
    subject_name: String,
    predicate: String,
    object_id: i64,
    object_name: String,
    start_time: Option<String>,
    end_time: Option<String>,
    is_current: bool,
    confidence: f64,
    source: Option<String>,
    created_at: String,
}

fn read_row(row: &Row) -> rusqlite::Result<TripletRow> {
    Ok(TripletRow {
        id: row.get(0)?,
        subject_id: row.get(1)?,
        subject_name: row.get(2)?,
        predicate: row.get(3)?,
        object_id: row.get(4)?,
        object_name: row.get(5)?,
        start_time: row.get(6)?,
        end_time: row.get(7)?,
        is_current: row.get(8)?,
        confidence: row.get(9)?,
        source: row.get(10)?,
        created_at: row.get(11)?,
    })
}

fn into_triplet(row: TripletRow) -> DbResult<Triplet> {
    Ok(Triplet {
        id: Some(row.id),
        subject_id: row.subject_id,
        subject_name: row.subject_name,
        predicate: row.predicate,
        object_id: row.object_id,
        object_name: row.object_name,
        temporal_validity: TemporalValidity {
            start_time: time::parse_opt(row.start_time)?,
            end_time: time::parse_opt(row.end_time)?,
            is_current: row.is_current,
        },
        confidence: row.confidence,
        source: row.source,
        created_at: time::parse(&row.created_at)?,
    })
}

fn query_triplets(
    conn: &rusqlite::Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> DbResult<Vec<Triplet>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, read_row)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(DbError::from)?;
    rows.into_iter().map(into_triplet).collect()
}

/// Insert a triplet, returning its id.
pub fn insert(pool: &DbPool, triplet: &Triplet) -> DbResult<i64> {
    pool.with_conn(|conn| {
        let validity = &triplet.temporal_validity;
        conn.execute(
            "INSERT INTO triplets
                 (subject_id, predicate, object_id, start_time, end_time,
                  is_current, confidence, source, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                triplet.subject_id,
                triplet.predicate,
                triplet.object_id,
                validity.start_time.map(time::to_column),
                validity.end_time.map(time::to_column),
                validity.is_current,
                triplet.confidence,
                triplet.source,
                time::to_column(triplet.created_at),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    })
}

/// Triplets where the entity appears as subject or as object.
pub fn for_entity(pool: &DbPool, entity_id: i64, as_subject: bool) -> DbResult<Vec<Triplet>> {
    pool.with_conn(|conn| {
        let column = if as_subject { "t.subject_id" } else { "t.object_id" };
        query_triplets(
            conn,
            &format!("{} WHERE {} = ?1", TRIPLET_SELECT, column),
            params![entity_id],
        )
    })
}

/// All currently-valid triplets, highest confidence first.
pub fn list_current(pool: &DbPool, limit: i64) -> DbResult<Vec<Triplet>> {
    pool.with_conn(|conn| {
        query_triplets(
            conn,
            &format!(
                "{} WHERE t.is_current = 1 ORDER BY t.confidence DESC LIMIT ?1",
                TRIPLET_SELECT
            ),
            params![limit],
        )
    })
}

/// Current triplets between entities in the given name set.
pub fn between_names(pool: &DbPool, names: &[String]) -> DbResult<Vec<Triplet>> {
    if names.is_empty() {
        return Ok(Vec::new());
    }

    pool.with_conn(|conn| {
        let placeholders = vec!["?"; names.len()].join(",");
        let sql = format!(
            "{} WHERE e1.name IN ({ph}) AND e2.name IN ({ph}) AND t.is_current = 1",
            TRIPLET_SELECT,
            ph = placeholders
        );
        let params = names.iter().chain(names.iter());
        query_triplets(conn, &sql, rusqlite::params_from_iter(params))
    })
}

/// Triplets whose validity window contains the given instant.
pub fn snapshot_at(pool: &DbPool, entity_id: i64, at: DateTime<Utc>) -> DbResult<Vec<Triplet>> {
    pool.with_conn(|conn| {
        let at_column = time::to_column(at);
        query_triplets(
            conn,
            &format!(
                "{} WHERE (t.subject_id = ?1 OR t.object_id = ?1)
                   AND (t.start_time IS NULL OR t.start_time <= ?2)
                   AND (t.end_time IS NULL OR t.end_time >= ?2)",
                TRIPLET_SELECT
            ),
            params![entity_id, at_column],
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::test_pool;
    use crate::queries::entities;
    use tabgraph_core::Entity;

    fn seed_triplet(pool: &DbPool, subject: &str, predicate: &str, object: &str) -> Triplet {
        let subject_id = entities::upsert(pool, &Entity::concept(subject)).unwrap();
        let object_id = entities::upsert(pool, &Entity::concept(object)).unwrap();
        Triplet {
            id: None,
            subject_id,
            subject_name: subject.to_string(),
            predicate: predicate.to_string(),
            object_id,
            object_name: object.to_string(),
            temporal_validity: TemporalValidity::default(),
            confidence: 0.9,
            source: Some("agent".to_string()),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn insert_and_list_for_entity() {
        let pool = test_pool();
        let triplet = seed_triplet(&pool, "React", "builds_on", "JavaScript");
        insert(&pool, &triplet).unwrap();

        let as_subject = for_entity(&pool, triplet.subject_id, true).unwrap();
        assert_eq!(as_subject.len(), 1);
        assert_eq!(as_subject[0].predicate, "builds_on");
        assert_eq!(as_subject[0].object_name, "JavaScript");

        let as_object = for_entity(&pool, triplet.object_id, false).unwrap();
        assert_eq!(as_object.len(), 1);
    }

    #[test]
    fn between_names_filters_both_endpoints() {
        let pool = test_pool();
        insert(&pool, &seed_triplet(&pool, "React", "builds_on", "JavaScript")).unwrap();
        insert(&pool, &seed_triplet(&pool, "React", "competes_with", "Vue")).unwrap();

        let names = vec!["React".to_string(), "JavaScript".to_string()];
        let found = between_names(&pool, &names).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].object_name, "JavaScript");
    }

    #[test]
    fn deleting_an_entity_cascades_its_triplets() {
        let pool = test_pool();
        let triplet = seed_triplet(&pool, "React", "builds_on", "JavaScript");
        insert(&pool, &triplet).unwrap();

        assert!(entities::delete(&pool, triplet.subject_id).unwrap());
        assert!(for_entity(&pool, triplet.object_id, false).unwrap().is_empty());
    }

    #[test]
    fn snapshot_respects_validity_window() {
        let pool = test_pool();
        let now = Utc::now();
        let mut triplet = seed_triplet(&pool, "Company", "employs", "Person");
        triplet.temporal_validity = TemporalValidity {
            start_time: Some(now - chrono::Duration::days(10)),
            end_time: Some(now - chrono::Duration::days(5)),
            is_current: false,
        };
        insert(&pool, &triplet).unwrap();

        let inside = snapshot_at(&pool, triplet.subject_id, now - chrono::Duration::days(7)).unwrap();
        assert_eq!(inside.len(), 1);

        let outside = snapshot_at(&pool, triplet.subject_id, now).unwrap();
        assert!(outside.is_empty());
    }
}
