//! Metric discovery and reconstruction from tag facts

use super::SchemaCapabilities;
use crate::query::metric_keys_query;
use crate::tags::TagStore;
use crate::{Metric, MetricBuilder, Result, TagFact, TagMatcher};
use sqlx::PgConnection;
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Resolves tag matchers into metrics. Never writes, never caches.
pub struct MetricResolver;

impl MetricResolver {
    /// Metrics satisfying every matcher. Result order is unspecified.
    pub async fn find_metrics(
        conn: &mut PgConnection,
        matchers: &[TagMatcher],
        capabilities: SchemaCapabilities,
    ) -> Result<Vec<Metric>> {
        let mut qb = metric_keys_query(matchers)?;
        let keys: HashSet<String> = qb
            .build_query_scalar::<String>()
            .fetch_all(&mut *conn)
            .await?
            .into_iter()
            .collect();

        debug!("{} metric keys matched {} matchers", keys.len(), matchers.len());

        let keys: Vec<String> = keys.into_iter().collect();
        Self::load_metrics(conn, &keys, capabilities).await
    }

    /// Rebuild the metrics for `keys` from their stored tag facts
    pub async fn load_metrics(
        conn: &mut PgConnection,
        keys: &[String],
        capabilities: SchemaCapabilities,
    ) -> Result<Vec<Metric>> {
        let facts = TagStore::load_tag_facts(conn, keys).await?;
        Self::fold_metrics(facts, capabilities)
    }

    /// Group facts per key into metrics.
    ///
    /// Each metric keeps the key it was stored under. A key with no
    /// intrinsic fact is not a valid metric and is dropped.
    pub fn fold_metrics(
        facts: HashMap<String, Vec<TagFact>>,
        capabilities: SchemaCapabilities,
    ) -> Result<Vec<Metric>> {
        let mut metrics = Vec::with_capacity(facts.len());

        for (key, facts) in facts {
            let mut builder = MetricBuilder::default();
            for fact in facts {
                if !capabilities.supports(fact.class) {
                    continue;
                }
                builder.add(fact.class, fact.tag);
            }

            if builder.has_intrinsic_tags() {
                metrics.push(builder.build_with_key(key)?);
            } else {
                debug!("Skipping metric {} without intrinsic tags", key);
            }
        }

        Ok(metrics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Tag, TagClass};

    fn class_counts(metric: &Metric) -> [usize; 3] {
        TagClass::ALL.map(|c| metric.tags(c).len())
    }

    fn fact(key: &str, tag: (&str, &str), class: TagClass) -> TagFact {
        TagFact {
            metric_key: key.to_string(),
            tag: Tag::new(tag.0, tag.1),
            class,
        }
    }

    fn facts(rows: Vec<TagFact>) -> HashMap<String, Vec<TagFact>> {
        let mut map: HashMap<String, Vec<TagFact>> = HashMap::new();
        for row in rows {
            map.entry(row.metric_key.clone()).or_default().push(row);
        }
        map
    }

    #[test]
    fn test_partitions_tags_by_class() {
        let input = facts(vec![
            fact("name=cpu", ("name", "cpu"), TagClass::Intrinsic),
            fact("name=cpu", ("unit", "percent"), TagClass::Meta),
            fact("name=cpu", ("owner", "ops"), TagClass::External),
        ]);

        let metrics = MetricResolver::fold_metrics(input, SchemaCapabilities::default()).unwrap();
        assert_eq!(metrics.len(), 1);

        let metric = &metrics[0];
        assert_eq!(metric.key(), "name=cpu");
        assert_eq!(class_counts(metric), [1, 1, 1]);
        assert!(metric.meta_tags().contains(&Tag::new("unit", "percent")));
        assert!(metric.external_tags().contains(&Tag::new("owner", "ops")));
    }

    #[test]
    fn test_drops_keys_without_intrinsic_tags() {
        let mut input = facts(vec![
            fact("name=cpu", ("name", "cpu"), TagClass::Intrinsic),
            fact("orphan", ("unit", "bytes"), TagClass::Meta),
            fact("orphan", ("owner", "ops"), TagClass::External),
        ]);
        input.insert("empty".to_string(), Vec::new());

        let metrics = MetricResolver::fold_metrics(input, SchemaCapabilities::default()).unwrap();
        let keys: Vec<_> = metrics.iter().map(|m| m.key()).collect();
        assert_eq!(keys, vec!["name=cpu"]);
    }

    #[test]
    fn test_external_tags_dropped_without_capability() {
        let input = facts(vec![
            fact("name=cpu", ("name", "cpu"), TagClass::Intrinsic),
            fact("name=cpu", ("owner", "ops"), TagClass::External),
        ]);
        let capabilities = SchemaCapabilities {
            external_tags: false,
        };

        let metrics = MetricResolver::fold_metrics(input, capabilities).unwrap();
        assert_eq!(class_counts(&metrics[0]), [1, 0, 0]);
    }

    #[test]
    fn test_reconstructed_key_matches_written_key() {
        let written = Metric::builder()
            .intrinsic_tag("resourceId", "node1")
            .intrinsic_tag("name", "ifInOctets")
            .meta_tag("mtype", "counter")
            .build()
            .unwrap();

        let mut rows = Vec::new();
        for class in TagClass::ALL {
            for tag in written.tags(class) {
                rows.push(TagFact {
                    metric_key: written.key().to_string(),
                    tag: tag.clone(),
                    class,
                });
            }
        }

        let metrics = MetricResolver::fold_metrics(facts(rows), SchemaCapabilities::default()).unwrap();
        assert_eq!(metrics, vec![written]);
    }

    #[test]
    fn test_keeps_stored_key() {
        let input = facts(vec![
            fact("resourceId=node1_name=cpu", ("resourceId", "node1"), TagClass::Intrinsic),
            fact("resourceId=node1_name=cpu", ("name", "cpu"), TagClass::Intrinsic),
        ]);

        let metrics = MetricResolver::fold_metrics(input, SchemaCapabilities::default()).unwrap();
        assert_eq!(metrics.len(), 1);
        assert_eq!(metrics[0].key(), "resourceId=node1_name=cpu");
        assert_eq!(metrics[0].intrinsic_tags().len(), 2);
    }

    #[test]
    fn test_escaped_keys_stay_distinct() {
        let packed = Metric::builder().intrinsic_tag("a", "1,b=2").build().unwrap();
        let split = Metric::builder()
            .intrinsic_tag("a", "1")
            .intrinsic_tag("b", "2")
            .build()
            .unwrap();

        let mut rows = Vec::new();
        for metric in [&packed, &split] {
            for tag in metric.intrinsic_tags() {
                rows.push(TagFact {
                    metric_key: metric.key().to_string(),
                    tag: tag.clone(),
                    class: TagClass::Intrinsic,
                });
            }
        }

        let mut metrics = MetricResolver::fold_metrics(facts(rows), SchemaCapabilities::default()).unwrap();
        metrics.sort_by(|a, b| a.key().cmp(b.key()));
        let mut expected = vec![packed, split];
        expected.sort_by(|a, b| a.key().cmp(b.key()));
        assert_eq!(metrics, expected);
    }
}
