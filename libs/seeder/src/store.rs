//! SQL operations over the `user_data` table.
//!
//! Every statement exists in two placeholder dialects: `?` for MySQL and
//! SQLite, `$n` for PostgreSQL. Engine dispatch happens per operation so
//! the loader and the read-side code stay engine-agnostic.

use db::{DbEngine, DbError, DbHandle, DbTransaction};
use futures::stream::BoxStream;
use futures::{StreamExt, TryStreamExt};
use serde::Serialize;

use crate::error::{Result, SeedError};
use crate::model::UserRecord;

// Schema in engine dialects: MySQL declares the secondary index inline,
// PostgreSQL and SQLite create it as a separate statement.
#[cfg(feature = "mysql")]
const CREATE_TABLE_MYSQL: &str = "CREATE TABLE IF NOT EXISTS user_data (
    user_id VARCHAR(36) PRIMARY KEY,
    name VARCHAR(255) NOT NULL,
    email VARCHAR(255) NOT NULL,
    age INT NOT NULL,
    INDEX idx_user_id (user_id)
)";

#[cfg(any(feature = "pg", feature = "sqlite"))]
const CREATE_TABLE_ANSI: &str = "CREATE TABLE IF NOT EXISTS user_data (
    user_id VARCHAR(36) PRIMARY KEY,
    name VARCHAR(255) NOT NULL,
    email VARCHAR(255) NOT NULL,
    age INT NOT NULL
)";

#[cfg(any(feature = "pg", feature = "sqlite"))]
const CREATE_INDEX_ANSI: &str = "CREATE INDEX IF NOT EXISTS idx_user_id ON user_data (user_id)";

#[cfg(any(feature = "mysql", feature = "sqlite"))]
const EXISTS_QMARK: &str = "SELECT user_id FROM user_data WHERE user_id = ?";
#[cfg(feature = "pg")]
const EXISTS_PG: &str = "SELECT user_id FROM user_data WHERE user_id = $1";

#[cfg(any(feature = "mysql", feature = "sqlite"))]
const INSERT_QMARK: &str =
    "INSERT INTO user_data (user_id, name, email, age) VALUES (?, ?, ?, ?)";
#[cfg(feature = "pg")]
const INSERT_PG: &str =
    "INSERT INTO user_data (user_id, name, email, age) VALUES ($1, $2, $3, $4)";

const SELECT_ALL: &str = "SELECT user_id, name, email, age FROM user_data ORDER BY user_id";
const SELECT_AGES: &str = "SELECT age FROM user_data";
const COUNT_ALL: &str = "SELECT COUNT(*) FROM user_data";

#[cfg(any(feature = "mysql", feature = "sqlite"))]
const SELECT_OLDER_QMARK: &str =
    "SELECT user_id, name, email, age FROM user_data WHERE age > ? ORDER BY user_id";
#[cfg(feature = "pg")]
const SELECT_OLDER_PG: &str =
    "SELECT user_id, name, email, age FROM user_data WHERE age > $1 ORDER BY user_id";

#[cfg(any(feature = "mysql", feature = "sqlite"))]
const COUNT_OLDER_QMARK: &str = "SELECT COUNT(*) FROM user_data WHERE age > ?";
#[cfg(feature = "pg")]
const COUNT_OLDER_PG: &str = "SELECT COUNT(*) FROM user_data WHERE age > $1";

#[cfg(any(feature = "mysql", feature = "sqlite"))]
const SELECT_PAGE_QMARK: &str =
    "SELECT user_id, name, email, age FROM user_data ORDER BY user_id LIMIT ? OFFSET ?";
#[cfg(feature = "pg")]
const SELECT_PAGE_PG: &str =
    "SELECT user_id, name, email, age FROM user_data ORDER BY user_id LIMIT $1 OFFSET $2";

/// Aggregates over the seeded table, gathered concurrently by [`UserStore::summary`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TableSummary {
    pub total_users: i64,
    pub average_age: f64,
    pub older_than_40: i64,
}

/// Read-side and schema operations bound to one open handle.
///
/// Borrows the handle rather than owning it, so the caller keeps the
/// exclusive right to close the pool.
#[derive(Clone, Copy)]
pub struct UserStore<'a> {
    db: &'a DbHandle,
}

impl<'a> UserStore<'a> {
    pub fn new(db: &'a DbHandle) -> Self {
        Self { db }
    }

    pub fn db(&self) -> &'a DbHandle {
        self.db
    }

    /// Create the `user_data` table and its index if they are missing.
    /// Safe to run repeatedly.
    pub async fn ensure_table(&self) -> Result<()> {
        match self.db.engine() {
            #[cfg(feature = "mysql")]
            DbEngine::MySql => {
                sqlx::query(CREATE_TABLE_MYSQL)
                    .execute(self.mysql()?)
                    .await
                    .map_err(SeedError::Schema)?;
            }
            #[cfg(feature = "pg")]
            DbEngine::Postgres => {
                let pool = self.pg()?;
                sqlx::query(CREATE_TABLE_ANSI)
                    .execute(pool)
                    .await
                    .map_err(SeedError::Schema)?;
                sqlx::query(CREATE_INDEX_ANSI)
                    .execute(pool)
                    .await
                    .map_err(SeedError::Schema)?;
            }
            #[cfg(feature = "sqlite")]
            DbEngine::Sqlite => {
                let pool = self.sqlite()?;
                sqlx::query(CREATE_TABLE_ANSI)
                    .execute(pool)
                    .await
                    .map_err(SeedError::Schema)?;
                sqlx::query(CREATE_INDEX_ANSI)
                    .execute(pool)
                    .await
                    .map_err(SeedError::Schema)?;
            }
            #[cfg(not(feature = "pg"))]
            DbEngine::Postgres => return Err(feature_disabled("PostgreSQL feature not enabled")),
            #[cfg(not(feature = "mysql"))]
            DbEngine::MySql => return Err(feature_disabled("MySQL feature not enabled")),
            #[cfg(not(feature = "sqlite"))]
            DbEngine::Sqlite => return Err(feature_disabled("SQLite feature not enabled")),
        }
        tracing::info!(table = "user_data", "table ensured");
        Ok(())
    }

    /// Total number of seeded users.
    pub async fn count_users(&self) -> Result<i64> {
        match self.db.engine() {
            #[cfg(feature = "pg")]
            DbEngine::Postgres => Ok(sqlx::query_scalar(COUNT_ALL)
                .fetch_one(self.pg()?)
                .await?),
            #[cfg(feature = "mysql")]
            DbEngine::MySql => Ok(sqlx::query_scalar(COUNT_ALL)
                .fetch_one(self.mysql()?)
                .await?),
            #[cfg(feature = "sqlite")]
            DbEngine::Sqlite => Ok(sqlx::query_scalar(COUNT_ALL)
                .fetch_one(self.sqlite()?)
                .await?),
            #[cfg(not(feature = "pg"))]
            DbEngine::Postgres => Err(feature_disabled("PostgreSQL feature not enabled")),
            #[cfg(not(feature = "mysql"))]
            DbEngine::MySql => Err(feature_disabled("MySQL feature not enabled")),
            #[cfg(not(feature = "sqlite"))]
            DbEngine::Sqlite => Err(feature_disabled("SQLite feature not enabled")),
        }
    }

    /// Number of users strictly older than `age`.
    pub async fn count_older_than(&self, age: i32) -> Result<i64> {
        match self.db.engine() {
            #[cfg(feature = "pg")]
            DbEngine::Postgres => Ok(sqlx::query_scalar(COUNT_OLDER_PG)
                .bind(age)
                .fetch_one(self.pg()?)
                .await?),
            #[cfg(feature = "mysql")]
            DbEngine::MySql => Ok(sqlx::query_scalar(COUNT_OLDER_QMARK)
                .bind(age)
                .fetch_one(self.mysql()?)
                .await?),
            #[cfg(feature = "sqlite")]
            DbEngine::Sqlite => Ok(sqlx::query_scalar(COUNT_OLDER_QMARK)
                .bind(age)
                .fetch_one(self.sqlite()?)
                .await?),
            #[cfg(not(feature = "pg"))]
            DbEngine::Postgres => Err(feature_disabled("PostgreSQL feature not enabled")),
            #[cfg(not(feature = "mysql"))]
            DbEngine::MySql => Err(feature_disabled("MySQL feature not enabled")),
            #[cfg(not(feature = "sqlite"))]
            DbEngine::Sqlite => Err(feature_disabled("SQLite feature not enabled")),
        }
    }

    /// Users strictly older than `age`, via a bound parameter.
    pub async fn fetch_older_than(&self, age: i32) -> Result<Vec<UserRecord>> {
        match self.db.engine() {
            #[cfg(feature = "pg")]
            DbEngine::Postgres => Ok(sqlx::query_as::<_, UserRecord>(SELECT_OLDER_PG)
                .bind(age)
                .fetch_all(self.pg()?)
                .await?),
            #[cfg(feature = "mysql")]
            DbEngine::MySql => Ok(sqlx::query_as::<_, UserRecord>(SELECT_OLDER_QMARK)
                .bind(age)
                .fetch_all(self.mysql()?)
                .await?),
            #[cfg(feature = "sqlite")]
            DbEngine::Sqlite => Ok(sqlx::query_as::<_, UserRecord>(SELECT_OLDER_QMARK)
                .bind(age)
                .fetch_all(self.sqlite()?)
                .await?),
            #[cfg(not(feature = "pg"))]
            DbEngine::Postgres => Err(feature_disabled("PostgreSQL feature not enabled")),
            #[cfg(not(feature = "mysql"))]
            DbEngine::MySql => Err(feature_disabled("MySQL feature not enabled")),
            #[cfg(not(feature = "sqlite"))]
            DbEngine::Sqlite => Err(feature_disabled("SQLite feature not enabled")),
        }
    }

    /// One page of users ordered by `user_id`.
    pub async fn fetch_page(&self, limit: u32, offset: u64) -> Result<Vec<UserRecord>> {
        let limit = i64::from(limit);
        let offset = offset as i64;
        match self.db.engine() {
            #[cfg(feature = "pg")]
            DbEngine::Postgres => Ok(sqlx::query_as::<_, UserRecord>(SELECT_PAGE_PG)
                .bind(limit)
                .bind(offset)
                .fetch_all(self.pg()?)
                .await?),
            #[cfg(feature = "mysql")]
            DbEngine::MySql => Ok(sqlx::query_as::<_, UserRecord>(SELECT_PAGE_QMARK)
                .bind(limit)
                .bind(offset)
                .fetch_all(self.mysql()?)
                .await?),
            #[cfg(feature = "sqlite")]
            DbEngine::Sqlite => Ok(sqlx::query_as::<_, UserRecord>(SELECT_PAGE_QMARK)
                .bind(limit)
                .bind(offset)
                .fetch_all(self.sqlite()?)
                .await?),
            #[cfg(not(feature = "pg"))]
            DbEngine::Postgres => Err(feature_disabled("PostgreSQL feature not enabled")),
            #[cfg(not(feature = "mysql"))]
            DbEngine::MySql => Err(feature_disabled("MySQL feature not enabled")),
            #[cfg(not(feature = "sqlite"))]
            DbEngine::Sqlite => Err(feature_disabled("SQLite feature not enabled")),
        }
    }

    /// Stream every user row one by one, without materializing the table.
    pub fn stream_users(&self) -> Result<BoxStream<'a, Result<UserRecord>>> {
        match self.db.engine() {
            #[cfg(feature = "pg")]
            DbEngine::Postgres => Ok(sqlx::query_as::<_, UserRecord>(SELECT_ALL)
                .fetch(self.pg()?)
                .map_err(SeedError::from)
                .boxed()),
            #[cfg(feature = "mysql")]
            DbEngine::MySql => Ok(sqlx::query_as::<_, UserRecord>(SELECT_ALL)
                .fetch(self.mysql()?)
                .map_err(SeedError::from)
                .boxed()),
            #[cfg(feature = "sqlite")]
            DbEngine::Sqlite => Ok(sqlx::query_as::<_, UserRecord>(SELECT_ALL)
                .fetch(self.sqlite()?)
                .map_err(SeedError::from)
                .boxed()),
            #[cfg(not(feature = "pg"))]
            DbEngine::Postgres => Err(feature_disabled("PostgreSQL feature not enabled")),
            #[cfg(not(feature = "mysql"))]
            DbEngine::MySql => Err(feature_disabled("MySQL feature not enabled")),
            #[cfg(not(feature = "sqlite"))]
            DbEngine::Sqlite => Err(feature_disabled("SQLite feature not enabled")),
        }
    }

    /// Stream the `age` column only.
    pub fn stream_ages(&self) -> Result<BoxStream<'a, Result<i32>>> {
        match self.db.engine() {
            #[cfg(feature = "pg")]
            DbEngine::Postgres => Ok(sqlx::query_scalar::<_, i32>(SELECT_AGES)
                .fetch(self.pg()?)
                .map_err(SeedError::from)
                .boxed()),
            #[cfg(feature = "mysql")]
            DbEngine::MySql => Ok(sqlx::query_scalar::<_, i32>(SELECT_AGES)
                .fetch(self.mysql()?)
                .map_err(SeedError::from)
                .boxed()),
            #[cfg(feature = "sqlite")]
            DbEngine::Sqlite => Ok(sqlx::query_scalar::<_, i32>(SELECT_AGES)
                .fetch(self.sqlite()?)
                .map_err(SeedError::from)
                .boxed()),
            #[cfg(not(feature = "pg"))]
            DbEngine::Postgres => Err(feature_disabled("PostgreSQL feature not enabled")),
            #[cfg(not(feature = "mysql"))]
            DbEngine::MySql => Err(feature_disabled("MySQL feature not enabled")),
            #[cfg(not(feature = "sqlite"))]
            DbEngine::Sqlite => Err(feature_disabled("SQLite feature not enabled")),
        }
    }

    /// Average age computed incrementally from the age stream; an empty
    /// table reports 0.
    pub async fn average_age(&self) -> Result<f64> {
        let mut ages = self.stream_ages()?;
        let mut count = 0u64;
        let mut total = 0i64;
        while let Some(age) = ages.try_next().await? {
            count += 1;
            total += i64::from(age);
        }
        if count == 0 {
            return Ok(0.0);
        }
        Ok(total as f64 / count as f64)
    }

    /// Pages of `page_size` users, fetched lazily: the next page is only
    /// queried when the previous one has been consumed.
    pub fn paginate(&self, page_size: u32) -> BoxStream<'a, Result<Vec<UserRecord>>> {
        let store = *self;
        futures::stream::try_unfold(0u64, move |offset| async move {
            let page = store.fetch_page(page_size, offset).await?;
            if page.is_empty() {
                Ok(None)
            } else {
                let next = offset + page.len() as u64;
                Ok(Some((page, next)))
            }
        })
        .boxed()
    }

    /// Batched fetch over the whole table; same lazy mechanics as
    /// [`paginate`](Self::paginate) with batch-sized pages.
    pub fn fetch_in_batches(&self, batch_size: u32) -> BoxStream<'a, Result<Vec<UserRecord>>> {
        self.paginate(batch_size)
    }

    /// Aggregate view of the table; the three queries run concurrently on
    /// the pool.
    pub async fn summary(&self) -> Result<TableSummary> {
        let (total_users, average_age, older_than_40) = tokio::try_join!(
            self.count_users(),
            self.average_age(),
            self.count_older_than(40),
        )?;
        Ok(TableSummary {
            total_users,
            average_age,
            older_than_40,
        })
    }

    #[cfg(feature = "pg")]
    fn pg(&self) -> Result<&'a sqlx::PgPool> {
        self.db
            .sqlx_postgres()
            .ok_or_else(|| feature_disabled("not a postgres pool"))
    }

    #[cfg(feature = "mysql")]
    fn mysql(&self) -> Result<&'a sqlx::MySqlPool> {
        self.db
            .sqlx_mysql()
            .ok_or_else(|| feature_disabled("not a mysql pool"))
    }

    #[cfg(feature = "sqlite")]
    fn sqlite(&self) -> Result<&'a sqlx::SqlitePool> {
        self.db
            .sqlx_sqlite()
            .ok_or_else(|| feature_disabled("not a sqlite pool"))
    }
}

/// Duplicate check inside the load transaction.
pub async fn user_exists(tx: &mut DbTransaction<'_>, user_id: &str) -> Result<bool> {
    match tx {
        #[cfg(feature = "pg")]
        DbTransaction::Postgres(tx) => {
            let row = sqlx::query_scalar::<_, String>(EXISTS_PG)
                .bind(user_id)
                .fetch_optional(&mut **tx)
                .await?;
            Ok(row.is_some())
        }
        #[cfg(feature = "mysql")]
        DbTransaction::MySql(tx) => {
            let row = sqlx::query_scalar::<_, String>(EXISTS_QMARK)
                .bind(user_id)
                .fetch_optional(&mut **tx)
                .await?;
            Ok(row.is_some())
        }
        #[cfg(feature = "sqlite")]
        DbTransaction::Sqlite(tx) => {
            let row = sqlx::query_scalar::<_, String>(EXISTS_QMARK)
                .bind(user_id)
                .fetch_optional(&mut **tx)
                .await?;
            Ok(row.is_some())
        }
        #[cfg(not(any(feature = "pg", feature = "mysql", feature = "sqlite")))]
        _ => Err(feature_disabled("no database backends enabled")),
    }
}

/// Parameterized insert inside the load transaction. Values never get
/// spliced into the SQL text.
pub async fn insert_user(tx: &mut DbTransaction<'_>, rec: &UserRecord) -> Result<()> {
    match tx {
        #[cfg(feature = "pg")]
        DbTransaction::Postgres(tx) => {
            sqlx::query(INSERT_PG)
                .bind(&rec.user_id)
                .bind(&rec.name)
                .bind(&rec.email)
                .bind(rec.age)
                .execute(&mut **tx)
                .await?;
            Ok(())
        }
        #[cfg(feature = "mysql")]
        DbTransaction::MySql(tx) => {
            sqlx::query(INSERT_QMARK)
                .bind(&rec.user_id)
                .bind(&rec.name)
                .bind(&rec.email)
                .bind(rec.age)
                .execute(&mut **tx)
                .await?;
            Ok(())
        }
        #[cfg(feature = "sqlite")]
        DbTransaction::Sqlite(tx) => {
            sqlx::query(INSERT_QMARK)
                .bind(&rec.user_id)
                .bind(&rec.name)
                .bind(&rec.email)
                .bind(rec.age)
                .execute(&mut **tx)
                .await?;
            Ok(())
        }
        #[cfg(not(any(feature = "pg", feature = "mysql", feature = "sqlite")))]
        _ => Err(feature_disabled("no database backends enabled")),
    }
}

fn feature_disabled(which: &'static str) -> SeedError {
    SeedError::Connection(DbError::FeatureDisabled(which))
}
