//! # keygate-database
//!
//! PostgreSQL connection management, the per-request unit of work, the
//! migration runner, and concrete repository implementations for all
//! Keygate entities.

pub mod connection;
pub mod migration;
pub mod repositories;
pub mod unit_of_work;

pub use connection::DatabasePool;
pub use unit_of_work::UnitOfWork;
