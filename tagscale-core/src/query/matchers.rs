//! Tag matcher lookups

use crate::schema::TAG_TABLE;
use crate::{Result, StorageError, TagMatcher};
use sqlx::{Postgres, QueryBuilder};

/// Build the query returning every metric key that satisfies all matchers.
///
/// The tag table interleaves all keys and classes of a metric, so each
/// matcher gets its own alias `t{i}` joined on the metric key. Two matchers
/// on different tag keys can then be true for the same metric.
pub fn metric_keys_query(matchers: &[TagMatcher]) -> Result<QueryBuilder<'static, Postgres>> {
    if matchers.is_empty() {
        return Err(StorageError::invalid("tag matchers can not be empty"));
    }

    let mut qb = QueryBuilder::new(format!(
        "SELECT DISTINCT t0.fk_timescale_metric FROM {} t0",
        TAG_TABLE
    ));
    for i in 1..matchers.len() {
        qb.push(format!(
            " JOIN {} t{i} ON t{i}.fk_timescale_metric = t0.fk_timescale_metric",
            TAG_TABLE
        ));
    }

    qb.push(" WHERE");
    for (i, matcher) in matchers.iter().enumerate() {
        if i > 0 {
            qb.push(" AND");
        }
        qb.push(format!(" (t{i}.key = "));
        qb.push_bind(matcher.key.clone());
        qb.push(format!(" AND t{i}.value {} ", matcher.kind.sql_operator()));
        qb.push_bind(matcher.value.clone());
        qb.push(")");
    }

    Ok(qb)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlparser::dialect::PostgreSqlDialect;
    use sqlparser::parser::Parser;

    #[test]
    fn test_single_matcher_has_no_join() {
        let qb = metric_keys_query(&[TagMatcher::equals("app", "web")]).unwrap();
        assert_eq!(
            qb.sql(),
            "SELECT DISTINCT t0.fk_timescale_metric FROM timescale_tag t0 \
             WHERE (t0.key = $1 AND t0.value = $2)"
        );
    }

    #[test]
    fn test_one_join_per_extra_matcher() {
        let matchers = vec![
            TagMatcher::equals("app", "web"),
            TagMatcher::regex("region", "us-.*"),
            TagMatcher::not_regex("host", "^test"),
        ];
        let qb = metric_keys_query(&matchers).unwrap();
        let sql = qb.sql();

        assert_eq!(sql.matches(" JOIN ").count(), 2);
        assert!(sql.contains(
            "JOIN timescale_tag t1 ON t1.fk_timescale_metric = t0.fk_timescale_metric"
        ));
        assert!(sql.contains(
            "JOIN timescale_tag t2 ON t2.fk_timescale_metric = t0.fk_timescale_metric"
        ));
        assert!(sql.ends_with(
            "WHERE (t0.key = $1 AND t0.value = $2) \
             AND (t1.key = $3 AND t1.value ~ $4) \
             AND (t2.key = $5 AND t2.value !~ $6)"
        ));
    }

    #[test]
    fn test_operators() {
        let qb = metric_keys_query(&[
            TagMatcher::not_equals("a", "1"),
            TagMatcher::regex("b", "2"),
        ])
        .unwrap();
        assert!(qb.sql().contains("t0.value != $2"));
        assert!(qb.sql().contains("t1.value ~ $4"));
    }

    #[test]
    fn test_tag_content_never_reaches_sql_text() {
        let hostile = "x'; DROP TABLE timescale_tag; --";
        let qb = metric_keys_query(&[TagMatcher::equals(hostile, hostile)]).unwrap();
        assert!(!qb.sql().contains("DROP"));
        assert!(!qb.sql().contains('\''));
    }

    #[test]
    fn test_empty_matchers_rejected() {
        assert!(matches!(
            metric_keys_query(&[]),
            Err(StorageError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_generated_sql_parses() {
        let matchers: Vec<_> = (0..5)
            .map(|i| TagMatcher::regex(format!("k{}", i), ".*"))
            .collect();
        let qb = metric_keys_query(&matchers).unwrap();

        let statements = Parser::parse_sql(&PostgreSqlDialect {}, qb.sql()).unwrap();
        assert_eq!(statements.len(), 1);
    }
}
