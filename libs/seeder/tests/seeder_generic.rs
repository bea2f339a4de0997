#![cfg(feature = "integration")]
//! End-to-end pipeline against real database servers (Docker required):
//! create the database, ensure the schema, load the CSV twice, read back.

mod common;

use anyhow::Result;
use db::{admin, ConnectOpts, DbHandle};
use seeder::{load_csv, UserStore};

// Three valid unique rows, one in-file duplicate, one row without an age.
const SAMPLE: &str = "\
user_id,name,email,age
00234e50-34eb-4ce2-94ec-26e3fa3fe830,Dan Altenwerth Jr.,Molly59@gmail.com,67
006bfede-724d-4cdd-a2a6-59700f40d0da,Glenda Wisozk,Miriam21@gmail.com,119
006e1f95-90c7-4f38-8ea6-881841149cd1,Daniel Fahey IV,Delia.Lesch11@hotmail.com,49
00234e50-34eb-4ce2-94ec-26e3fa3fe830,Dan Altenwerth Jr.,Molly59@gmail.com,67
0a4bd093-a617-4c7e-91f9-f725cdbb4080,Keith Olson,broderick39@hotmail.com,
";

async fn run_pipeline(url: &str) -> Result<()> {
    let dir = tempfile::tempdir()?;
    let csv_path = dir.path().join("user_data.csv");
    std::fs::write(&csv_path, SAMPLE)?;

    // Server-level stage: create the application database if the engine
    // has a notion of one.
    let admin_db = DbHandle::connect(&admin::admin_dsn(url)?, ConnectOpts::default()).await?;
    if let Some(name) = admin::database_from_dsn(url)? {
        admin::ensure_database(&admin_db, &name).await?;
    }
    admin_db.close().await;

    // Application stage: schema, load, read back.
    let db = DbHandle::connect(url, ConnectOpts::default()).await?;
    let store = UserStore::new(&db);
    store.ensure_table().await?;
    store.ensure_table().await?;

    let report = load_csv(&store, &csv_path).await?;
    assert_eq!(report.rows_read, 5);
    assert_eq!(report.inserted, 3);
    assert_eq!(report.duplicates_skipped, 1);
    assert_eq!(report.invalid_rows, 1);

    let second = load_csv(&store, &csv_path).await?;
    assert_eq!(second.inserted, 0);
    assert_eq!(second.duplicates_skipped, 4);
    assert_eq!(second.invalid_rows, 1);

    assert_eq!(store.count_users().await?, 3);
    assert_eq!(store.fetch_older_than(50).await?.len(), 2);

    let summary = store.summary().await?;
    assert_eq!(summary.total_users, 3);
    assert_eq!(summary.older_than_40, 3);
    assert!((summary.average_age - 235.0 / 3.0).abs() < 1e-9);

    db.close().await;
    Ok(())
}

#[cfg(feature = "sqlite")]
#[tokio::test]
async fn e2e_sqlite() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let url = format!("sqlite://{}", dir.path().join("e2e.db").display());
    run_pipeline(&url).await
}

#[cfg(feature = "pg")]
#[tokio::test]
async fn e2e_postgres() -> Result<()> {
    let server = common::bring_up_postgres().await?;
    run_pipeline(&server.url).await
}

#[cfg(feature = "mysql")]
#[tokio::test]
async fn e2e_mysql() -> Result<()> {
    let server = common::bring_up_mysql().await?;
    run_pipeline(&server.url).await
}
