pub mod classifier;
pub mod config;
pub mod connection;
pub mod events;
pub mod poller;
pub mod price;
pub mod query;
pub mod recorder;
pub mod repository;
pub mod rpc;
pub mod shutdown;
pub mod watchlist;
