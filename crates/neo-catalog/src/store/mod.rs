//! Catalog persistence.
//!
//! Loaders talk to the catalog through [`CatalogStore`], so the same load
//! logic runs against SQL Server ([`MssqlStore`]) or an in-memory catalog
//! ([`MemoryStore`]) for dry runs.

mod memory;
mod mssql;

pub use memory::MemoryStore;
pub use mssql::MssqlStore;

use crate::catalog::IdentityResolver;
use crate::error::Result;
use crate::model::{Asteroid, LoadErrorRecord, MergePolicy, Orbit, OrbitalClass, UpsertAction};
use async_trait::async_trait;

/// Prefix of orbit ids minted for rows that carry none.
pub const MPC_SEQUENCE_PREFIX: &str = "MPC";

/// Write access to the catalog tables.
///
/// Calls between `begin` and `commit` form one transaction; `rollback`
/// discards everything since the last `begin`.
#[async_trait]
pub trait CatalogStore: Send {
    async fn begin(&mut self) -> Result<()>;

    async fn commit(&mut self) -> Result<()>;

    async fn rollback(&mut self) -> Result<()>;

    /// Seed `Priority` and `Level` when they are empty.
    async fn ensure_reference_data(&mut self) -> Result<()>;

    /// Resolver seeded with every stored asteroid and the next free id.
    async fn load_identities(&mut self) -> Result<IdentityResolver>;

    /// Next number for `MPC<n>` orbit ids.
    async fn next_mpc_sequence(&mut self) -> Result<i64>;

    /// Insert the class unless it exists. Returns true when inserted.
    async fn ensure_class(&mut self, class: &OrbitalClass) -> Result<bool>;

    /// Match by SPK-ID, then record id; update under `policy` or insert.
    async fn upsert_asteroid(
        &mut self,
        asteroid: &Asteroid,
        policy: MergePolicy,
    ) -> Result<UpsertAction>;

    /// Update under `policy` or insert. Orbits owned by another asteroid are
    /// left untouched.
    async fn upsert_orbit(&mut self, orbit: &Orbit, policy: MergePolicy) -> Result<UpsertAction>;

    async fn orbit_exists(&mut self, orbit_id: &str) -> Result<bool>;

    async fn find_asteroid_by_pdes(&mut self, pdes: &str) -> Result<Option<i64>>;

    /// Append to `Load_Error`. A no-op when the table does not exist.
    async fn record_load_error(&mut self, record: &LoadErrorRecord) -> Result<()>;
}

/// Sequence number of an `MPC<n>` orbit id.
pub fn mpc_sequence_of(orbit_id: &str) -> Option<i64> {
    orbit_id
        .strip_prefix(MPC_SEQUENCE_PREFIX)?
        .trim()
        .parse::<i64>()
        .ok()
}
