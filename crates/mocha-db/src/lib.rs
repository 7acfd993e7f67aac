//! # mocha-db: Database Layer for Mocha POS
//!
//! SQLite persistence for ingredient stock and the inventory ledger, plus the
//! configuration file that points at it.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Mocha POS Data Flow                              │
//! │                                                                         │
//! │  Counter confirms an order (OrderPlan from mocha-core)                 │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     mocha-db (THIS CRATE)                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌────────────────┐    ┌──────────────┐  │   │
//! │  │   │   Database    │    │  Repositories  │    │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │    │                │    │  (embedded)  │  │   │
//! │  │   │               │    │ IngredientRepo │    │ 001_init.sql │  │   │
//! │  │   │ SqlitePool    │◄───│ LedgerRepo     │    │              │  │   │
//! │  │   │ WAL, FKs      │    │ OrderRepo      │    │              │  │   │
//! │  │   └───────────────┘    └────────────────┘    └──────────────┘  │   │
//! │  │           ▲                                                     │   │
//! │  │   AppConfig (mocha.toml + MOCHA_* env)                          │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     SQLite Database                             │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`config`] - `mocha.toml` loading with environment overrides
//! - [`error`] - Database error types
//! - [`repository`] - Ingredient, ledger and order repositories
//!
//! ## Usage
//!
//! ```rust,ignore
//! use mocha_db::{AppConfig, Database, DbConfig};
//!
//! let config = AppConfig::load(None)?;
//! let db = Database::new(DbConfig::from(&config.database)).await?;
//!
//! let export = db.orders().place_order(&plan, &catalog, Utc::now()).await?;
//! let report = db.ledger().consumption_report(&range, config.engine.valuation).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::{AppConfig, DatabaseSettings, EngineSettings};
pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

// Repository re-exports for convenience
pub use repository::ingredient::IngredientRepository;
pub use repository::ledger::LedgerRepository;
pub use repository::order::OrderRepository;
