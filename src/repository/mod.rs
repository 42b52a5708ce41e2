pub mod activity_repository;
pub mod database;
pub mod models;
pub mod watchlist_repository;

pub use activity_repository::{ActivityFilter, ActivityRepository, ActivityUpsert};
pub use database::Database;
pub use models::{ActivityRecord, WatchEntry};
pub use watchlist_repository::{WatchListRepository, WatchTable};
