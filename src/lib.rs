pub mod auth;
pub mod compactor;
pub mod conflict;
pub mod engine;
pub mod limits;
pub mod model;
pub mod observability;
pub mod repository;
pub mod search;
pub mod semester;
pub mod sql;
pub mod tls;
pub mod wal;
pub mod wire;

#[cfg(test)]
mod testing;
