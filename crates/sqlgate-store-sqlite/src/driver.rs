// crates/sqlgate-store-sqlite/src/driver.rs
// ============================================================================
// Module: Drivers
// Description: SQLite driver and the name-to-driver registry.
// Purpose: Turn configured driver names and connection strings into handles.
// Dependencies: sqlgate-core
// ============================================================================

//! ## Overview
//! [`DriverRegistry`] maps driver names from configuration to [`Driver`]
//! implementations. `sqlite` is always available; embedders may register more.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use sqlgate_core::Driver;
use sqlgate_core::QueryError;
use sqlgate_core::Queryable;

use crate::queryable::SqliteOpenOptions;
use crate::queryable::SqliteQueryable;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Driver name for the built-in `SQLite` driver.
pub const SQLITE_DRIVER: &str = "sqlite";

// ============================================================================
// SECTION: SQLite Driver
// ============================================================================

/// Opens [`SqliteQueryable`] pools.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDriver {
    /// Options applied to every pool.
    options: SqliteOpenOptions,
}

impl SqliteDriver {
    /// Creates a driver with explicit open options.
    #[must_use]
    pub const fn new(options: SqliteOpenOptions) -> Self {
        Self {
            options,
        }
    }
}

impl Driver for SqliteDriver {
    fn open(&self, connection: &str) -> Result<Box<dyn Queryable>, QueryError> {
        Ok(Box::new(SqliteQueryable::open(connection, self.options)?))
    }
}

// ============================================================================
// SECTION: Registry
// ============================================================================

/// Driver lookup table keyed by driver name.
///
/// # Invariants
/// - Names are unique; registering an existing name replaces it.
#[derive(Clone)]
pub struct DriverRegistry {
    /// Registered drivers.
    drivers: BTreeMap<String, Arc<dyn Driver>>,
}

impl fmt::Debug for DriverRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverRegistry").field("drivers", &self.names()).finish()
    }
}

impl Default for DriverRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(SQLITE_DRIVER, Arc::new(SqliteDriver::default()));
        registry
    }
}

impl DriverRegistry {
    /// Creates a registry with no drivers.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            drivers: BTreeMap::new(),
        }
    }

    /// Registers `driver` under `name`.
    pub fn register(&mut self, name: impl Into<String>, driver: Arc<dyn Driver>) {
        self.drivers.insert(name.into(), driver);
    }

    /// Returns true when `name` is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.drivers.contains_key(name)
    }

    /// Returns registered driver names in sorted order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.drivers.keys().map(String::as_str).collect()
    }

    /// Opens `connection` with the driver registered as `name`.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::Driver`] for unknown drivers or open failures.
    pub fn open(&self, name: &str, connection: &str) -> Result<Box<dyn Queryable>, QueryError> {
        let driver = self
            .drivers
            .get(name)
            .ok_or_else(|| QueryError::Driver(format!("unknown driver \"{name}\"")))?;
        driver.open(connection)
    }
}
