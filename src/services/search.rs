//! Document search — case-insensitive substring match over published documents.

use serde::Serialize;
use sqlx::PgPool;

/// Maximum number of hits returned per query.
pub const SEARCH_LIMIT: i64 = 25;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct DocumentHit {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub category: Option<String>,
}

/// Build an `ILIKE` pattern matching `query` anywhere, with wildcards in the
/// query itself treated literally.
#[must_use]
pub fn like_pattern(query: &str) -> String {
    let mut pattern = String::with_capacity(query.len() + 2);
    pattern.push('%');
    for c in query.trim().chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

/// Newest published documents whose title or description contains `query`.
///
/// # Errors
///
/// Returns a database error if the query fails.
pub async fn search_documents(pool: &PgPool, query: &str) -> Result<Vec<DocumentHit>, sqlx::Error> {
    sqlx::query_as::<_, DocumentHit>(
        r"SELECT d.id, d.title, d.description, c.name AS category
          FROM documents d
          LEFT JOIN categories c ON c.id = d.category_id
          WHERE d.is_published = TRUE AND (d.title ILIKE $1 OR d.description ILIKE $1)
          ORDER BY d.created_at DESC
          LIMIT $2",
    )
    .bind(like_pattern(query))
    .bind(SEARCH_LIMIT)
    .fetch_all(pool)
    .await
}
