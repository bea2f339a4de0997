#![cfg(feature = "integration")]

mod common;
use anyhow::Result;

#[cfg(feature = "sqlite")]
#[tokio::test]
async fn admin_sqlite() -> Result<()> {
    let dut = common::bring_up_sqlite().await?;
    run_admin_suite(&dut.url, &dut.admin_url).await
}

#[cfg(feature = "pg")]
#[tokio::test]
async fn admin_postgres() -> Result<()> {
    let dut = common::bring_up_postgres().await?;
    run_admin_suite(&dut.url, &dut.admin_url).await
}

#[cfg(feature = "mysql")]
#[tokio::test]
async fn admin_mysql() -> Result<()> {
    let dut = common::bring_up_mysql().await?;
    run_admin_suite(&dut.url, &dut.admin_url).await
}

/// Runs the same assertions for any backend: the admin connection can
/// provision a fresh database twice without error, and the database is
/// visible afterwards.
async fn run_admin_suite(scoped_url: &str, admin_url: &str) -> Result<()> {
    let engine = db::DbHandle::detect(scoped_url)?;

    let admin = db::DbHandle::connect(admin_url, db::ConnectOpts::default()).await?;
    assert_eq!(admin.engine(), engine);

    // Creating the same database twice must not fail.
    db::admin::ensure_database(&admin, "seedbed_admin_test").await?;
    db::admin::ensure_database(&admin, "seedbed_admin_test").await?;
    assert!(db::admin::database_exists(&admin, "seedbed_admin_test").await?);

    // Identifier validation happens before any SQL text is built.
    let err = db::admin::ensure_database(&admin, "x; DROP DATABASE app")
        .await
        .unwrap_err();
    assert!(matches!(err, db::DbError::InvalidIdentifier(_)));

    admin.close().await;

    // A scoped connection to the new database works for server engines.
    if engine != db::DbEngine::Sqlite {
        let mut url = url::Url::parse(admin_url)?;
        url.set_path("/seedbed_admin_test");
        let scoped = db::DbHandle::connect(url.as_str(), db::ConnectOpts::default()).await?;
        match engine {
            #[cfg(feature = "pg")]
            db::DbEngine::Postgres => {
                sqlx::query("SELECT 1")
                    .execute(scoped.sqlx_postgres().unwrap())
                    .await?;
            }
            #[cfg(feature = "mysql")]
            db::DbEngine::MySql => {
                sqlx::query("SELECT 1")
                    .execute(scoped.sqlx_mysql().unwrap())
                    .await?;
            }
            _ => {}
        }
        scoped.close().await;
    }

    Ok(())
}
