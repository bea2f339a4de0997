//! Seeding engine: reads `user_data.csv`, validates rows, and loads them
//! into the `user_data` table of any supported engine, then serves the
//! read side (streams, pages, aggregates) over the same pool.
//!
//! ```no_run
//! use db::{ConnectOpts, DbHandle};
//! use seeder::{load_csv, UserStore};
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let db = DbHandle::connect("sqlite://data/seedbed.db", ConnectOpts::default()).await?;
//! let store = UserStore::new(&db);
//! store.ensure_table().await?;
//! let report = load_csv(&store, "user_data.csv".as_ref()).await?;
//! println!("{report}");
//! db.close().await;
//! # Ok(())
//! # }
//! ```
#![cfg_attr(
    not(any(feature = "pg", feature = "mysql", feature = "sqlite")),
    allow(unused)
)]

pub mod error;
pub mod loader;
pub mod model;
pub mod source;
pub mod store;

pub use error::{Result, RowError, SeedError};
pub use loader::{load_csv, LoadReport};
pub use model::{RawRow, UserRecord};
pub use source::{CsvSource, NextRow};
pub use store::{insert_user, user_exists, TableSummary, UserStore};
