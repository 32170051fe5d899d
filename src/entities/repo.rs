use std::{fmt::Debug, marker::PhantomData};

use anyhow::Context;
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use sqlx::{
    postgres::{PgArguments, PgRow},
    query::QueryAs,
    FromRow, PgPool, Postgres,
};

use thiserror::Error;

use crate::entities::dto::{Page, PageRequest};

pub type EntityQuery<'q, E> = QueryAs<'q, Postgres, E, PgArguments>;

/// A table-backed record with a surrogate `id` and one owning reference.
pub trait Entity:
    for<'r> FromRow<'r, PgRow> + Serialize + DeserializeOwned + Clone + Debug + Send + Sync + Unpin + 'static
{
    const NAME: &'static str;
    const TABLE: &'static str;
    /// Columns other than `id`, in the order `bind_fields` binds them.
    const FIELDS: &'static [&'static str];
    /// Column of `FIELDS` referencing the owner (a user or a student).
    const OWNER_COLUMN: &'static str;
    /// Unique constraint on `OWNER_COLUMN`, for one-per-owner entities.
    const OWNER_UNIQUE: Option<&'static str> = None;

    fn id(&self) -> Option<i64>;
    fn with_id(self, id: i64) -> Self;
    fn owner_id(&self) -> i64;
    fn bind_fields<'q>(&'q self, q: EntityQuery<'q, Self>) -> EntityQuery<'q, Self>;
}

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("{entity} already exists for owner {owner_id}")]
    OwnerTaken { entity: &'static str, owner_id: i64 },
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

#[async_trait]
pub trait Repository<E: Entity>: Send + Sync {
    /// Inserts when `id` is unset, otherwise overwrites the stored row.
    /// Fails with [`RepoError::OwnerTaken`] when a one-per-owner entity
    /// already exists for another row.
    async fn save(&self, entity: E) -> Result<E, RepoError>;
    async fn find_all(&self, page: PageRequest) -> anyhow::Result<Page<E>>;
    async fn find_by_id(&self, id: i64) -> anyhow::Result<Option<E>>;
    async fn find_by_owner(&self, owner_id: i64) -> anyhow::Result<Option<E>>;
    async fn delete_by_id(&self, id: i64) -> anyhow::Result<()>;
}

pub struct PgRepository<E> {
    db: PgPool,
    _entity: PhantomData<fn() -> E>,
}

impl<E> PgRepository<E> {
    pub fn new(db: PgPool) -> Self {
        Self {
            db,
            _entity: PhantomData,
        }
    }
}

fn select_columns<E: Entity>() -> String {
    format!("id, {}", E::FIELDS.join(", "))
}

#[async_trait]
impl<E: Entity> Repository<E> for PgRepository<E> {
    async fn save(&self, entity: E) -> Result<E, RepoError> {
        let sql = match entity.id() {
            None => {
                let placeholders: Vec<String> =
                    (1..=E::FIELDS.len()).map(|i| format!("${}", i)).collect();
                format!(
                    "INSERT INTO {} ({}) VALUES ({}) RETURNING {}",
                    E::TABLE,
                    E::FIELDS.join(", "),
                    placeholders.join(", "),
                    select_columns::<E>()
                )
            }
            Some(_) => {
                let assignments: Vec<String> = E::FIELDS
                    .iter()
                    .enumerate()
                    .map(|(i, f)| format!("{} = ${}", f, i + 1))
                    .collect();
                format!(
                    "UPDATE {} SET {} WHERE id = ${} RETURNING {}",
                    E::TABLE,
                    assignments.join(", "),
                    E::FIELDS.len() + 1,
                    select_columns::<E>()
                )
            }
        };
        let mut q = entity.bind_fields(sqlx::query_as::<_, E>(&sql));
        if let Some(id) = entity.id() {
            q = q.bind(id);
        }
        match q.fetch_one(&self.db).await {
            Ok(saved) => Ok(saved),
            Err(sqlx::Error::Database(db))
                if db.is_unique_violation()
                    && E::OWNER_UNIQUE.is_some()
                    && db.constraint() == E::OWNER_UNIQUE =>
            {
                Err(RepoError::OwnerTaken {
                    entity: E::NAME,
                    owner_id: entity.owner_id(),
                })
            }
            Err(e) => Err(anyhow::Error::new(e)
                .context(format!("save {}", E::NAME))
                .into()),
        }
    }

    async fn find_all(&self, page: PageRequest) -> anyhow::Result<Page<E>> {
        let total = sqlx::query_scalar::<_, i64>(&format!("SELECT COUNT(*) FROM {}", E::TABLE))
            .fetch_one(&self.db)
            .await
            .with_context(|| format!("count {}", E::NAME))?;
        let sql = format!(
            "SELECT {} FROM {} ORDER BY id LIMIT $1 OFFSET $2",
            select_columns::<E>(),
            E::TABLE
        );
        let content = sqlx::query_as::<_, E>(&sql)
            .bind(page.limit())
            .bind(page.offset())
            .fetch_all(&self.db)
            .await
            .with_context(|| format!("list {}", E::NAME))?;
        Ok(Page {
            content,
            total_elements: total,
            page: page.page,
            size: page.limit(),
        })
    }

    async fn find_by_id(&self, id: i64) -> anyhow::Result<Option<E>> {
        let sql = format!(
            "SELECT {} FROM {} WHERE id = $1",
            select_columns::<E>(),
            E::TABLE
        );
        sqlx::query_as::<_, E>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await
            .with_context(|| format!("get {} {}", E::NAME, id))
    }

    async fn find_by_owner(&self, owner_id: i64) -> anyhow::Result<Option<E>> {
        let sql = format!(
            "SELECT {} FROM {} WHERE {} = $1 ORDER BY id LIMIT 1",
            select_columns::<E>(),
            E::TABLE,
            E::OWNER_COLUMN
        );
        sqlx::query_as::<_, E>(&sql)
            .bind(owner_id)
            .fetch_optional(&self.db)
            .await
            .with_context(|| format!("get {} by owner {}", E::NAME, owner_id))
    }

    async fn delete_by_id(&self, id: i64) -> anyhow::Result<()> {
        sqlx::query(&format!("DELETE FROM {} WHERE id = $1", E::TABLE))
            .bind(id)
            .execute(&self.db)
            .await
            .with_context(|| format!("delete {} {}", E::NAME, id))?;
        Ok(())
    }
}
