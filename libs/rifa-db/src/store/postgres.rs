use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::{PgPool, Postgres, Row, Transaction};

use super::{
    Condition, Document, DocumentStore, Filter, StoreError, StoreResult, WriteBatch, WriteOp, add_to_field,
};

/// Documents live in a single `documents (collection, id, data JSONB)` table.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn lock_document(
        tx: &mut Transaction<'_, Postgres>,
        collection: &str,
        id: &str,
    ) -> StoreResult<Option<Value>> {
        let row = sqlx::query(
            "SELECT data FROM documents WHERE collection = $1 AND id = $2 FOR UPDATE",
        )
        .bind(collection)
        .bind(id)
        .fetch_optional(&mut **tx)
        .await?;
        Ok(row.map(|r| r.get::<Value, _>("data")))
    }

    async fn upsert(
        tx: &mut Transaction<'_, Postgres>,
        collection: &str,
        id: &str,
        data: &Value,
    ) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO documents (collection, id, data)
            VALUES ($1, $2, $3)
            ON CONFLICT (collection, id) DO UPDATE SET
                data = excluded.data,
                updated_at = CURRENT_TIMESTAMP
            "#,
        )
        .bind(collection)
        .bind(id)
        .bind(data)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    /// Plain insert; a concurrent insert of the same key surfaces as a failed precondition.
    async fn insert_new(
        tx: &mut Transaction<'_, Postgres>,
        collection: &str,
        id: &str,
        data: &Value,
    ) -> StoreResult<()> {
        let result = sqlx::query(
            "INSERT INTO documents (collection, id, data) VALUES ($1, $2, $3) ON CONFLICT (collection, id) DO NOTHING",
        )
        .bind(collection)
        .bind(id)
        .bind(data)
        .execute(&mut **tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::precondition(collection, id));
        }
        Ok(())
    }

    async fn update_in_tx(
        tx: &mut Transaction<'_, Postgres>,
        collection: &str,
        id: &str,
        patch: &Value,
    ) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE documents SET data = data || $3, updated_at = CURRENT_TIMESTAMP WHERE collection = $1 AND id = $2",
        )
        .bind(collection)
        .bind(id)
        .bind(patch)
        .execute(&mut **tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found(collection, id));
        }
        Ok(())
    }

    async fn increment_in_tx(
        tx: &mut Transaction<'_, Postgres>,
        collection: &str,
        id: &str,
        field: &str,
        delta: i64,
        seed: Option<Value>,
    ) -> StoreResult<()> {
        let Some(mut seed) = seed else {
            let result = sqlx::query(
                r#"
                UPDATE documents
                SET data = jsonb_set(data, ARRAY[$3::TEXT], to_jsonb(COALESCE((data ->> $3::TEXT)::BIGINT, 0) + $4)),
                    updated_at = CURRENT_TIMESTAMP
                WHERE collection = $1 AND id = $2
                "#,
            )
            .bind(collection)
            .bind(id)
            .bind(field)
            .bind(delta)
            .execute(&mut **tx)
            .await?;
            if result.rows_affected() == 0 {
                return Err(StoreError::not_found(collection, id));
            }
            return Ok(());
        };

        // Insert-or-add in one statement so concurrent first grants cannot overwrite each other.
        add_to_field(&mut seed, collection, id, field, delta)?;
        sqlx::query(
            r#"
            INSERT INTO documents (collection, id, data)
            VALUES ($1, $2, $3)
            ON CONFLICT (collection, id) DO UPDATE SET
                data = jsonb_set(documents.data, ARRAY[$4::TEXT], to_jsonb(COALESCE((documents.data ->> $4::TEXT)::BIGINT, 0) + $5)),
                updated_at = CURRENT_TIMESTAMP
            "#,
        )
        .bind(collection)
        .bind(id)
        .bind(&seed)
        .bind(field)
        .bind(delta)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for PgStore {
    async fn get(&self, collection: &str, id: &str) -> StoreResult<Option<Document>> {
        let row = sqlx::query("SELECT id, data FROM documents WHERE collection = $1 AND id = $2")
            .bind(collection)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| Document {
            id: r.get("id"),
            data: r.get("data"),
        }))
    }

    async fn query(&self, collection: &str, filters: &[Filter]) -> StoreResult<Vec<Document>> {
        let mut sql = String::from("SELECT id, data FROM documents WHERE collection = $1");
        let mut bind_index = 2;
        for filter in filters {
            match filter {
                Filter::Eq(..) => {
                    sql.push_str(&format!(" AND data @> ${}", bind_index));
                    bind_index += 1;
                }
                Filter::Contains(..) => {
                    sql.push_str(&format!(
                        " AND data ->> ${}::TEXT ILIKE ${}",
                        bind_index,
                        bind_index + 1
                    ));
                    bind_index += 2;
                }
            }
        }
        sql.push_str(" ORDER BY id");

        let mut q = sqlx::query(&sql).bind(collection);
        for filter in filters {
            q = match filter {
                Filter::Eq(field, value) => {
                    let mut containment = Map::new();
                    containment.insert(field.clone(), value.clone());
                    q.bind(Value::Object(containment))
                }
                Filter::Contains(field, needle) => q
                    .bind(field.clone())
                    .bind(format!("%{}%", needle.replace('%', "\\%").replace('_', "\\_"))),
            };
        }

        let rows = q.fetch_all(&self.pool).await?;
        Ok(rows
            .into_iter()
            .map(|r| Document {
                id: r.get("id"),
                data: r.get("data"),
            })
            .collect())
    }

    async fn set(&self, collection: &str, id: &str, data: Value) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        Self::upsert(&mut tx, collection, id, &data).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn update(&self, collection: &str, id: &str, patch: Value) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        Self::update_in_tx(&mut tx, collection, id, &patch).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn increment(
        &self,
        collection: &str,
        id: &str,
        field: &str,
        delta: i64,
    ) -> StoreResult<i64> {
        let value = sqlx::query_scalar::<_, i64>(
            r#"
            UPDATE documents
            SET data = jsonb_set(data, ARRAY[$3::TEXT], to_jsonb(COALESCE((data ->> $3::TEXT)::BIGINT, 0) + $4)),
                updated_at = CURRENT_TIMESTAMP
            WHERE collection = $1 AND id = $2
            RETURNING (data ->> $3::TEXT)::BIGINT
            "#,
        )
        .bind(collection)
        .bind(id)
        .bind(field)
        .bind(delta)
        .fetch_optional(&self.pool)
        .await?;

        value.ok_or_else(|| StoreError::not_found(collection, id))
    }

    async fn commit(&self, batch: WriteBatch) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;

        // Lock in one global order, then check preconditions against what is locked.
        let mut locked: HashMap<(&str, &str), Option<Value>> = HashMap::new();
        for (collection, id) in batch.lock_keys() {
            let current = Self::lock_document(&mut tx, collection, id).await?;
            locked.insert((collection, id), current);
        }
        for pre in &batch.preconditions {
            let current = locked
                .get(&(pre.collection.as_str(), pre.id.as_str()))
                .and_then(Option::as_ref);
            if !pre.holds(current) {
                tx.rollback().await?;
                return Err(StoreError::precondition(&pre.collection, &pre.id));
            }
        }

        // Row locks cannot cover rows that do not exist yet.
        let must_be_new: HashSet<(&str, &str)> = batch
            .preconditions
            .iter()
            .filter(|p| p.condition == Condition::NotExists)
            .map(|p| (p.collection.as_str(), p.id.as_str()))
            .collect();

        // An early `?` return drops `tx`, which rolls the transaction back.
        for op in &batch.ops {
            match op {
                WriteOp::Set {
                    collection,
                    id,
                    data,
                } => {
                    if must_be_new.contains(&(collection.as_str(), id.as_str())) {
                        Self::insert_new(&mut tx, collection, id, data).await?
                    } else {
                        Self::upsert(&mut tx, collection, id, data).await?
                    }
                }
                WriteOp::Update {
                    collection,
                    id,
                    patch,
                } => Self::update_in_tx(&mut tx, collection, id, patch).await?,
                WriteOp::Increment {
                    collection,
                    id,
                    field,
                    delta,
                    seed,
                } => {
                    Self::increment_in_tx(&mut tx, collection, id, field, *delta, seed.clone())
                        .await?
                }
            }
        }

        tx.commit().await?;
        Ok(())
    }
}
