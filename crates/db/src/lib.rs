pub mod connection;
pub mod fixtures;
pub mod migrations;
pub mod repositories;

pub use connection::{connect_from_config, connect_with_settings, DbPool};
pub use fixtures::{seed_demo_dataset, SeedSummary};
pub use repositories::{
    RepositoryError, SqlExperimentCatalog, SqlFactSource, SqlSnapshotStore,
};
