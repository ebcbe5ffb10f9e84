use async_trait::async_trait;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteConnection, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow,
};
use sqlx::{QueryBuilder, Row, Sqlite};
use serde_json::{Map, Value};
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

use crate::error::{AppError, AppResult};
use crate::infrastructure::database::{
    DatabaseInterface, Document, DocumentQuery, Filter, FilterOp, Precondition, SortDirection,
    Write, WriteKind,
};

/// SQLite implementation of the document store. Document bodies live in a
/// TEXT column and are queried through SQLite's JSON functions.
pub struct SqliteDatabase {
    pool: SqlitePool,
}

impl SqliteDatabase {
    /// Connect to a SQLite url such as `sqlite:data/aurify.db` or `sqlite::memory:`.
    pub async fn connect(url: &str) -> AppResult<Self> {
        if url.contains(":memory:") {
            return Self::new_in_memory().await;
        }

        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| AppError::ConfigurationError(format!("Invalid database url {}: {}", url, e)))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to connect to {}: {}", url, e)))?;

        let db = Self { pool };
        db.initialize().await?;
        Ok(db)
    }

    pub async fn new_in_memory() -> AppResult<Self> {
        // Each connection to :memory: is a separate database, so the pool must
        // hold exactly one connection for the lifetime of the store.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| {
                AppError::DatabaseError(format!("Failed to connect to in-memory SQLite: {}", e))
            })?;

        let db = Self { pool };
        db.initialize().await?;
        Ok(db)
    }

    /// Create the documents table and its indexes.
    pub async fn initialize(&self) -> AppResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                collection TEXT NOT NULL,
                id TEXT NOT NULL,
                data TEXT NOT NULL,
                version INTEGER NOT NULL DEFAULT 1,
                time_created INTEGER NOT NULL,
                time_updated INTEGER NOT NULL,
                PRIMARY KEY (collection, id)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to create documents table: {}", e)))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_documents_collection_updated ON documents(collection, time_updated DESC)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to create documents index: {}", e)))?;

        Ok(())
    }

    async fn fetch_in_tx(
        conn: &mut SqliteConnection,
        collection: &str,
        id: &str,
    ) -> AppResult<Option<Document>> {
        let row = sqlx::query(
            "SELECT collection, id, data, version, time_created, time_updated FROM documents WHERE collection = ? AND id = ?",
        )
        .bind(collection)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| write_error(format!("Failed to read {}/{}", collection, id), e))?;

        row.map(|r| row_to_document(&r)).transpose()
    }

    async fn apply_write(conn: &mut SqliteConnection, write: Write, now: i64) -> AppResult<()> {
        let current = Self::fetch_in_tx(conn, &write.collection, &write.id).await?;
        check_precondition(&write, current.as_ref())?;

        let base = current.as_ref().map(|d| d.data.clone());
        let next = match write.kind {
            WriteKind::Delete => {
                sqlx::query("DELETE FROM documents WHERE collection = ? AND id = ?")
                    .bind(&write.collection)
                    .bind(&write.id)
                    .execute(&mut *conn)
                    .await
                    .map_err(|e| {
                        write_error(format!("Failed to delete {}/{}", write.collection, write.id), e)
                    })?;
                return Ok(());
            }
            WriteKind::Create(data) | WriteKind::Set(data) => data,
            WriteKind::Update(patch) => merge_fields(base, patch),
            WriteKind::ArrayUnion { field, values } => {
                let mut doc = object_or_empty(base);
                let mut items = take_array(&mut doc, &field);
                for value in values {
                    if !items.contains(&value) {
                        items.push(value);
                    }
                }
                doc.insert(field, Value::Array(items));
                Value::Object(doc)
            }
            WriteKind::ArrayRemove { field, values } => {
                let mut doc = object_or_empty(base);
                let mut items = take_array(&mut doc, &field);
                items.retain(|item| !values.contains(item));
                doc.insert(field, Value::Array(items));
                Value::Object(doc)
            }
        };

        let body = serde_json::to_string(&next)?;
        let result = if current.is_some() {
            sqlx::query(
                "UPDATE documents SET data = ?, version = version + 1, time_updated = ? WHERE collection = ? AND id = ?",
            )
            .bind(body)
            .bind(now)
            .bind(&write.collection)
            .bind(&write.id)
            .execute(&mut *conn)
            .await
        } else {
            sqlx::query(
                "INSERT INTO documents (collection, id, data, version, time_created, time_updated) VALUES (?, ?, ?, 1, ?, ?)",
            )
            .bind(&write.collection)
            .bind(&write.id)
            .bind(body)
            .bind(now)
            .bind(now)
            .execute(&mut *conn)
            .await
        };

        result.map_err(|e| write_error(format!("Failed to write {}/{}", write.collection, write.id), e))?;
        Ok(())
    }

    /// Apply a batch inside `BEGIN IMMEDIATE` so the write lock is taken up
    /// front and concurrent batches queue on the busy timeout.
    async fn commit_immediate(pool: &SqlitePool, writes: Vec<Write>, now: i64) -> AppResult<()> {
        let mut conn = pool
            .acquire()
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to acquire connection: {}", e)))?;

        sqlx::query("BEGIN IMMEDIATE")
            .execute(&mut *conn)
            .await
            .map_err(|e| write_error("Failed to begin transaction".to_string(), e))?;

        let mut applied = Ok(());
        for write in writes {
            applied = Self::apply_write(&mut *conn, write, now).await;
            if applied.is_err() {
                break;
            }
        }

        if applied.is_ok() {
            applied = sqlx::query("COMMIT")
                .execute(&mut *conn)
                .await
                .map(|_| ())
                .map_err(|e| write_error("Failed to commit transaction".to_string(), e));
        }

        if applied.is_err() {
            if let Err(rollback) = sqlx::query("ROLLBACK").execute(&mut *conn).await {
                warn!(error = %rollback, "failed to roll back batch, discarding connection");
                drop(conn.detach());
            }
        }
        applied
    }
}

/// Lock contention surfaces as `Conflict` so callers retry it like a
/// failed version precondition.
fn write_error(context: String, err: sqlx::Error) -> AppError {
    let contended = err
        .as_database_error()
        .and_then(|db| db.code())
        .and_then(|code| code.parse::<i32>().ok())
        .map(|code| matches!(code & 0xff, SQLITE_BUSY | SQLITE_LOCKED))
        .unwrap_or(false);
    if contended {
        AppError::Conflict(format!("{}: database is busy", context))
    } else {
        AppError::DatabaseError(format!("{}: {}", context, err))
    }
}

const SQLITE_BUSY: i32 = 5;
const SQLITE_LOCKED: i32 = 6;

fn row_to_document(row: &SqliteRow) -> AppResult<Document> {
    let raw: String = row.try_get("data")?;
    Ok(Document {
        collection: row.try_get("collection")?,
        id: row.try_get("id")?,
        data: serde_json::from_str(&raw)?,
        version: row.try_get("version")?,
        created_time: row.try_get("time_created")?,
        updated_time: row.try_get("time_updated")?,
    })
}

fn check_precondition(write: &Write, current: Option<&Document>) -> AppResult<()> {
    let path = format!("{}/{}", write.collection, write.id);
    match (&write.precondition, current) {
        (Precondition::Exists, None) => Err(AppError::NotFound(format!("Document {} not found", path))),
        (Precondition::NotExists, Some(_)) => {
            Err(AppError::Conflict(format!("Document {} already exists", path)))
        }
        (Precondition::Version(_), None) => {
            Err(AppError::Conflict(format!("Document {} was removed concurrently", path)))
        }
        (Precondition::Version(expected), Some(doc)) if doc.version != *expected => {
            Err(AppError::Conflict(format!(
                "Document {} was modified concurrently (expected version {}, found {})",
                path, expected, doc.version
            )))
        }
        _ => Ok(()),
    }
}

fn object_or_empty(base: Option<Value>) -> Map<String, Value> {
    match base {
        Some(Value::Object(map)) => map,
        _ => Map::new(),
    }
}

fn take_array(doc: &mut Map<String, Value>, field: &str) -> Vec<Value> {
    match doc.remove(field) {
        Some(Value::Array(items)) => items,
        _ => Vec::new(),
    }
}

fn merge_fields(base: Option<Value>, patch: Map<String, Value>) -> Value {
    let mut doc = object_or_empty(base);
    for (key, value) in patch {
        doc.insert(key, value);
    }
    Value::Object(doc)
}

fn validate_field(field: &str) -> AppResult<()> {
    if field.is_empty() || !field.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(AppError::Validation(format!("Invalid field name: {}", field)));
    }
    Ok(())
}

fn push_json_bind(qb: &mut QueryBuilder<'_, Sqlite>, value: &Value) {
    // json_extract yields SQL scalars: booleans come back as 0/1.
    match value {
        Value::String(s) => {
            qb.push_bind(s.clone());
        }
        Value::Bool(b) => {
            qb.push_bind(i64::from(*b));
        }
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                qb.push_bind(i);
            } else {
                qb.push_bind(n.as_f64().unwrap_or_default());
            }
        }
        other => {
            qb.push_bind(other.to_string());
        }
    }
}

fn push_filter(qb: &mut QueryBuilder<'_, Sqlite>, filter: &Filter) -> AppResult<()> {
    match filter {
        Filter::Field { field, op, value } => {
            validate_field(field)?;
            let path = format!("'$.{}'", field);
            if *op == FilterOp::ArrayContains {
                qb.push(format!(
                    "EXISTS (SELECT 1 FROM json_each(documents.data, {}) WHERE json_each.value = ",
                    path
                ));
                push_json_bind(qb, value);
                qb.push(")");
                return Ok(());
            }
            if value.is_null() && *op == FilterOp::Eq {
                qb.push(format!("json_extract(data, {}) IS NULL", path));
                return Ok(());
            }
            let sql_op = match op {
                FilterOp::Eq => "=",
                FilterOp::Lt => "<",
                FilterOp::Lte => "<=",
                FilterOp::Gt => ">",
                FilterOp::Gte => ">=",
                FilterOp::ArrayContains => unreachable!("handled above"),
            };
            qb.push(format!("json_extract(data, {}) {} ", path, sql_op));
            push_json_bind(qb, value);
        }
        Filter::And(children) | Filter::Or(children) => {
            if children.is_empty() {
                qb.push(if matches!(filter, Filter::And(_)) { "1" } else { "0" });
                return Ok(());
            }
            let joiner = if matches!(filter, Filter::And(_)) { " AND " } else { " OR " };
            qb.push("(");
            for (i, child) in children.iter().enumerate() {
                if i > 0 {
                    qb.push(joiner);
                }
                push_filter(qb, child)?;
            }
            qb.push(")");
        }
    }
    Ok(())
}

#[async_trait]
impl DatabaseInterface for SqliteDatabase {
    async fn get(&self, collection: &str, id: &str) -> AppResult<Option<Document>> {
        let row = sqlx::query(
            "SELECT collection, id, data, version, time_created, time_updated FROM documents WHERE collection = ? AND id = ?",
        )
        .bind(collection)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to get {}/{}: {}", collection, id, e)))?;

        row.map(|r| row_to_document(&r)).transpose()
    }

    async fn query(&self, query: DocumentQuery) -> AppResult<Vec<Document>> {
        let mut qb = QueryBuilder::<Sqlite>::new(
            "SELECT collection, id, data, version, time_created, time_updated FROM documents WHERE collection = ",
        );
        qb.push_bind(query.collection.clone());

        for filter in &query.filters {
            qb.push(" AND ");
            push_filter(&mut qb, filter)?;
        }

        match &query.order_by {
            Some((field, direction)) => {
                validate_field(field)?;
                let dir = match direction {
                    SortDirection::Asc => "ASC",
                    SortDirection::Desc => "DESC",
                };
                qb.push(format!(" ORDER BY json_extract(data, '$.{}') {}, rowid {}", field, dir, dir));
            }
            None => {
                qb.push(" ORDER BY rowid");
            }
        }

        if let Some(limit) = query.limit {
            qb.push(" LIMIT ");
            qb.push_bind(limit);
        }

        let rows = qb.build().fetch_all(&self.pool).await.map_err(|e| {
            AppError::DatabaseError(format!("Failed to query {}: {}", query.collection, e))
        })?;

        rows.iter().map(row_to_document).collect()
    }

    async fn commit_batch(&self, writes: Vec<Write>) -> AppResult<()> {
        if writes.is_empty() {
            return Ok(());
        }

        let now = chrono::Utc::now().timestamp_millis();
        let pool = self.pool.clone();
        // Run to completion on its own task so a dropped caller cannot leave
        // an open transaction on a pooled connection.
        tokio::spawn(async move { Self::commit_immediate(&pool, writes, now).await })
            .await
            .map_err(|e| AppError::Internal(format!("Batch commit task failed: {}", e)))?
    }

    async fn delete(&self, collection: &str, id: &str) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM documents WHERE collection = ? AND id = ?")
            .bind(collection)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                AppError::DatabaseError(format!("Failed to delete {}/{}: {}", collection, id, e))
            })?;
        Ok(result.rows_affected() > 0)
    }

    async fn health_check(&self) -> AppResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Health check failed: {}", e)))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::database::fields;
    use serde_json::json;
    use std::sync::Arc;

    async fn db() -> SqliteDatabase {
        SqliteDatabase::new_in_memory().await.unwrap()
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let db = db().await;
        db.create("users", "u1", json!({"displayName": "Ada"})).await.unwrap();

        let doc = db.get("users", "u1").await.unwrap().unwrap();
        assert_eq!(doc.data["displayName"], "Ada");
        assert_eq!(doc.version, 1);

        let missing = db.get("users", "u2").await.unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_create_twice_conflicts() {
        let db = db().await;
        db.create("users", "u1", json!({})).await.unwrap();
        let err = db.create("users", "u1", json!({})).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_update_merges_and_bumps_version() {
        let db = db().await;
        db.create("users", "u1", json!({"a": 1, "b": 2})).await.unwrap();
        db.update("users", "u1", fields([("b", json!(3)), ("c", json!("x"))]))
            .await
            .unwrap();

        let doc = db.get("users", "u1").await.unwrap().unwrap();
        assert_eq!(doc.data, json!({"a": 1, "b": 3, "c": "x"}));
        assert_eq!(doc.version, 2);
    }

    #[tokio::test]
    async fn test_update_missing_is_not_found() {
        let db = db().await;
        let err = db.update("users", "ghost", Map::new()).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_array_union_and_remove() {
        let db = db().await;
        db.create("bookings", "b1", json!({"requests": ["a"]})).await.unwrap();
        db.commit_batch(vec![Write::array_union(
            "bookings",
            "b1",
            "requests",
            vec![json!("a"), json!("b")],
        )])
        .await
        .unwrap();
        let doc = db.get("bookings", "b1").await.unwrap().unwrap();
        assert_eq!(doc.data["requests"], json!(["a", "b"]));

        db.commit_batch(vec![Write::array_remove("bookings", "b1", "requests", vec![json!("a")])])
            .await
            .unwrap();
        let doc = db.get("bookings", "b1").await.unwrap().unwrap();
        assert_eq!(doc.data["requests"], json!(["b"]));
    }

    #[tokio::test]
    async fn test_batch_is_atomic() {
        let db = db().await;
        db.create("a", "1", json!({"n": 1})).await.unwrap();

        let writes = vec![
            Write::set("a", "2", json!({"n": 2})).unwrap(),
            Write::create("a", "1", json!({"n": 9})).unwrap(),
        ];
        assert!(db.commit_batch(writes).await.is_err());

        assert!(db.get("a", "2").await.unwrap().is_none());
        assert_eq!(db.get("a", "1").await.unwrap().unwrap().data["n"], 1);
    }

    #[tokio::test]
    async fn test_version_precondition() {
        let db = db().await;
        db.create("reputation", "u1", json!({"average": 1.0, "count": 1})).await.unwrap();

        let stale = Write::set("reputation", "u1", json!({"average": 2.0, "count": 2}))
            .unwrap()
            .if_version(7);
        let err = db.commit_batch(vec![stale]).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        let fresh = Write::set("reputation", "u1", json!({"average": 2.0, "count": 2}))
            .unwrap()
            .if_version(1);
        db.commit_batch(vec![fresh]).await.unwrap();
    }

    #[tokio::test]
    async fn test_query_filters_and_ordering() {
        let db = db().await;
        db.create("posts", "p1", json!({"userId": "a", "createdAt": 10, "tags": ["x"]})).await.unwrap();
        db.create("posts", "p2", json!({"userId": "b", "createdAt": 30, "tags": ["y"]})).await.unwrap();
        db.create("posts", "p3", json!({"userId": "a", "createdAt": 20, "tags": ["x", "y"]})).await.unwrap();

        let by_user = db
            .query(
                DocumentQuery::new("posts")
                    .where_eq("userId", "a")
                    .order_by("createdAt", SortDirection::Desc),
            )
            .await
            .unwrap();
        let ids: Vec<_> = by_user.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["p3", "p1"]);

        let tagged = db
            .query(DocumentQuery::new("posts").filter(Filter::array_contains("tags", "y")))
            .await
            .unwrap();
        assert_eq!(tagged.len(), 2);

        let either = db
            .query(DocumentQuery::new("posts").any_of(vec![
                Filter::eq("userId", "b"),
                Filter::op("createdAt", FilterOp::Lt, 15),
            ]))
            .await
            .unwrap();
        let ids: Vec<_> = either.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["p1", "p2"]);

        let limited = db.query(DocumentQuery::new("posts").limit(1)).await.unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[tokio::test]
    async fn test_rejects_unsafe_field_names() {
        let db = db().await;
        let err = db
            .query(DocumentQuery::new("posts").where_eq("a') OR 1=1 --", "x"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_boolean_filter() {
        let db = db().await;
        db.create("events", "e1", json!({"ok": true})).await.unwrap();
        db.create("events", "e2", json!({"ok": false})).await.unwrap();
        let docs = db.query(DocumentQuery::new("events").where_eq("ok", true)).await.unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].id, "e1");
    }

    #[tokio::test]
    async fn test_delete_reports_removal() {
        let db = db().await;
        db.create("blocks", "x", json!({})).await.unwrap();
        assert!(db.delete("blocks", "x").await.unwrap());
        assert!(!db.delete("blocks", "x").await.unwrap());
        db.health_check().await.unwrap();
    }

    #[tokio::test]
    async fn test_file_database_persists_across_connections() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite:{}", dir.path().join("aurify.db").display());

        let db = SqliteDatabase::connect(&url).await.unwrap();
        db.create("users", "u1", json!({"displayName": "Ada"})).await.unwrap();
        drop(db);

        let reopened = SqliteDatabase::connect(&url).await.unwrap();
        let doc = reopened.get("users", "u1").await.unwrap().unwrap();
        assert_eq!(doc.data["displayName"], "Ada");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_file_database_concurrent_creates_conflict_instead_of_failing() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite:{}", dir.path().join("aurify.db").display());
        let db = Arc::new(SqliteDatabase::connect(&url).await.unwrap());

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let db = db.clone();
                tokio::spawn(async move {
                    db.commit_batch(vec![
                        Write::create("guards", "alice_bob", json!({"by": i})).unwrap(),
                        Write::create("requests", &format!("r{}", i), json!({"n": i})).unwrap(),
                    ])
                    .await
                })
            })
            .collect();

        let mut created = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(()) => created += 1,
                Err(e) => assert!(matches!(e, AppError::Conflict(_)), "unexpected error: {}", e),
            }
        }
        assert_eq!(created, 1);
        let requests = db.query(DocumentQuery::new("requests")).await.unwrap();
        assert_eq!(requests.len(), 1);
    }
}
