use crate::cache::{IdMappingCache, UniqueConstraintCache};

/// Caches owned by one orchestrator and lent to every table migration.
#[derive(Debug, Clone, Default)]
pub struct MigrationState {
    pub id_map: IdMappingCache,
    pub unique: UniqueConstraintCache,
    is_dry_run: bool,
}

impl MigrationState {
    pub fn new(dry_run: bool) -> Self {
        MigrationState {
            is_dry_run: dry_run,
            ..Default::default()
        }
    }

    /// Dry runs roll every destination transaction back instead of committing.
    pub fn is_dry_run(&self) -> bool {
        self.is_dry_run
    }

    pub fn mark_dry_run(&mut self, dry_run: bool) {
        self.is_dry_run = dry_run;
    }

    /// Drops both caches. The dry-run flag is kept.
    pub fn reset(&mut self) {
        self.id_map.clear();
        self.unique.clear();
    }
}
