//! Tag fact persistence
//!
//! The tag table holds one row per (metric key, tag key, tag value, class).
//! A unique constraint on that tuple plus `ON CONFLICT DO NOTHING` makes
//! repeated and concurrent upserts no-ops instead of errors.

use crate::schema::TAG_TABLE;
use crate::{Result, Tag, TagClass, TagFact};
use sqlx::{FromRow, PgConnection, Postgres, QueryBuilder};
use std::collections::{BTreeSet, HashMap};

/// Raw row of the tag table
#[derive(Debug, Clone, FromRow)]
struct TagRow {
    fk_timescale_metric: String,
    key: String,
    value: String,
    #[sqlx(rename = "type")]
    class: String,
}

impl TryFrom<TagRow> for TagFact {
    type Error = crate::StorageError;

    fn try_from(row: TagRow) -> Result<Self> {
        Ok(TagFact {
            metric_key: row.fk_timescale_metric,
            tag: Tag::new(row.key, row.value),
            class: row.class.parse()?,
        })
    }
}

/// Reads and writes tag facts
pub struct TagStore;

impl TagStore {
    /// Insert every (metric_key, tag, class) tuple, ignoring ones that exist
    pub async fn upsert_tags(
        conn: &mut PgConnection,
        metric_key: &str,
        class: TagClass,
        tags: &BTreeSet<Tag>,
    ) -> Result<()> {
        let Some(mut qb) = Self::upsert_query(metric_key, class, tags) else {
            return Ok(());
        };
        qb.build().execute(conn).await?;
        Ok(())
    }

    /// Load all facts for the given keys in one round trip.
    ///
    /// Every requested key gets an entry; keys without facts map to an
    /// empty list.
    pub async fn load_tag_facts(
        conn: &mut PgConnection,
        metric_keys: &[String],
    ) -> Result<HashMap<String, Vec<TagFact>>> {
        let mut facts: HashMap<String, Vec<TagFact>> = metric_keys
            .iter()
            .map(|k| (k.clone(), Vec::new()))
            .collect();
        if metric_keys.is_empty() {
            return Ok(facts);
        }

        let rows = sqlx::query_as::<_, TagRow>(&format!(
            "SELECT fk_timescale_metric, key, value, type FROM {} WHERE fk_timescale_metric = ANY($1)",
            TAG_TABLE
        ))
        .bind(metric_keys)
        .fetch_all(conn)
        .await?;

        for row in rows {
            let fact = TagFact::try_from(row)?;
            facts.entry(fact.metric_key.clone()).or_default().push(fact);
        }
        Ok(facts)
    }

    fn upsert_query(
        metric_key: &str,
        class: TagClass,
        tags: &BTreeSet<Tag>,
    ) -> Option<QueryBuilder<'static, Postgres>> {
        if tags.is_empty() {
            return None;
        }

        let mut qb = QueryBuilder::new(format!(
            "INSERT INTO {}(fk_timescale_metric, key, value, type) ",
            TAG_TABLE
        ));
        qb.push_values(tags, |mut row, tag| {
            row.push_bind(metric_key.to_string())
                .push_bind(tag.key.clone())
                .push_bind(tag.value.clone())
                .push_bind(class.as_str());
        });
        qb.push(" ON CONFLICT (fk_timescale_metric, key, value, type) DO NOTHING");
        Some(qb)
    }
}
