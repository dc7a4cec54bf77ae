use opentelemetry_semantic_conventions::attribute::{DB_QUERY_TEXT, HTTP_ROUTE};

use crate::attributes::Attributes;
use crate::stats::Category;

// Pre-1.26 semantic convention keys; still emitted by many instrumentations.
const HTTP_TARGET: &str = "http.target";
const DB_STATEMENT: &str = "db.statement";

/// The traffic categories a single span counts toward.
///
/// Every span counts toward [`Category::Total`]. HTTP and SQL are decided
/// independently, so one span may count toward both.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SpanCategories {
    http: bool,
    sql: bool,
}

impl SpanCategories {
    /// Classifies a span from its kind and attributes.
    ///
    /// * HTTP: a server span carrying `http.target` or `http.route`.
    /// * SQL: any span carrying `db.statement` or `db.query.text`.
    ///
    /// Only the presence of the attributes matters, not their values.
    pub(crate) fn classify<A: Attributes + ?Sized>(is_server: bool, attributes: &A) -> Self {
        SpanCategories {
            http: is_server
                && (attributes.contains_key(HTTP_TARGET) || attributes.contains_key(HTTP_ROUTE)),
            sql: attributes.contains_key(DB_STATEMENT) || attributes.contains_key(DB_QUERY_TEXT),
        }
    }

    /// Categories for a span that is neither HTTP nor SQL.
    pub fn other() -> Self {
        SpanCategories::default()
    }

    /// Returns a copy with the HTTP category set.
    pub fn with_http(mut self) -> Self {
        self.http = true;
        self
    }

    /// Returns a copy with the SQL category set.
    pub fn with_sql(mut self) -> Self {
        self.sql = true;
        self
    }

    /// Whether the span is an HTTP server request.
    pub fn is_http(&self) -> bool {
        self.http
    }

    /// Whether the span is a SQL-like database call.
    pub fn is_sql(&self) -> bool {
        self.sql
    }

    /// Iterates the categories to increment, always starting with `Total`.
    pub fn iter(self) -> impl Iterator<Item = Category> {
        let http = self.http.then_some(Category::Http);
        let sql = self.sql.then_some(Category::Sql);
        std::iter::once(Category::Total).chain(http).chain(sql)
    }
}

#[cfg(test)]
mod tests {
    use super::SpanCategories;
    use crate::stats::Category;
    use opentelemetry::KeyValue;

    #[test]
    fn server_span_with_route_is_http() {
        let attrs = vec![KeyValue::new("http.route", "/api/data")];
        let categories = SpanCategories::classify(true, attrs.as_slice());
        assert!(categories.is_http());
        assert!(!categories.is_sql());
    }

    #[test]
    fn server_span_with_legacy_target_is_http() {
        let attrs = vec![KeyValue::new("http.target", "/api/data?x=1")];
        assert!(SpanCategories::classify(true, attrs.as_slice()).is_http());
    }

    #[test]
    fn client_span_with_route_is_not_http() {
        let attrs = vec![KeyValue::new("http.route", "/api/data")];
        let categories = SpanCategories::classify(false, attrs.as_slice());
        assert_eq!(categories, SpanCategories::other());
    }

    #[test]
    fn db_attributes_are_sql_regardless_of_kind() {
        let statement = vec![KeyValue::new("db.statement", "SELECT 1")];
        let query_text = vec![KeyValue::new("db.query.text", "SELECT 1")];
        assert!(SpanCategories::classify(false, statement.as_slice()).is_sql());
        assert!(SpanCategories::classify(true, query_text.as_slice()).is_sql());
    }

    #[test]
    fn span_can_be_both_http_and_sql() {
        let attrs = vec![
            KeyValue::new("http.route", "/users"),
            KeyValue::new("db.statement", "SELECT * FROM users"),
        ];
        let categories = SpanCategories::classify(true, attrs.as_slice());
        assert_eq!(categories, SpanCategories::other().with_http().with_sql());
        assert_eq!(
            categories.iter().collect::<Vec<_>>(),
            vec![Category::Total, Category::Http, Category::Sql]
        );
    }

    #[test]
    fn plain_span_counts_only_toward_total() {
        assert_eq!(
            SpanCategories::other().iter().collect::<Vec<_>>(),
            vec![Category::Total]
        );
    }
}
