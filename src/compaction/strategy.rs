use crate::config::LEVEL_FILE_COUNT_TRIGGERS;
use crate::tables::Table;

/**
Decides when compaction runs and which files it consumes.

The policy is size-tiered whole-level compaction: a level whose file count
exceeds its trigger has all of its files merged into one file at the next
level. Triggers double per level and the deepest configured trigger is reused
for any deeper level.
*/
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct CompactionStrategy {}

impl CompactionStrategy {
    /// Create a new instance of [`CompactionStrategy`].
    pub fn new() -> Self {
        CompactionStrategy {}
    }

    /// Return true if any level's file count exceeds its trigger.
    pub fn should_compact(&self, level_file_counts: &[usize]) -> bool {
        self.level_needing_compaction(level_file_counts).is_some()
    }

    /// The shallowest level whose file count exceeds its trigger, if any.
    pub fn level_needing_compaction(&self, level_file_counts: &[usize]) -> Option<usize> {
        level_file_counts
            .iter()
            .enumerate()
            .find(|&(level, &count)| count > Self::trigger_for_level(level))
            .map(|(level, _)| level)
    }

    /// Positions of every table at `level`, i.e. the whole level.
    pub fn compaction_files(&self, tables: &[Table], level: usize) -> Vec<usize> {
        tables
            .iter()
            .enumerate()
            .filter(|(_, table)| table.metadata().level == level)
            .map(|(position, _)| position)
            .collect()
    }

    /// The file count past which `level` is compacted.
    fn trigger_for_level(level: usize) -> usize {
        *LEVEL_FILE_COUNT_TRIGGERS
            .get(level)
            .unwrap_or_else(|| LEVEL_FILE_COUNT_TRIGGERS.last().unwrap())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn counts_at_the_trigger_do_not_compact() {
        let strategy = CompactionStrategy::new();

        assert!(!strategy.should_compact(&[4]));
        assert!(!strategy.should_compact(&[4, 8]));
        assert!(!strategy.should_compact(&[]));
    }

    #[test]
    fn counts_above_the_trigger_compact_the_shallowest_offending_level() {
        let strategy = CompactionStrategy::new();

        assert_eq!(strategy.level_needing_compaction(&[5]), Some(0));
        assert_eq!(strategy.level_needing_compaction(&[4, 9]), Some(1));
        assert_eq!(strategy.level_needing_compaction(&[5, 9]), Some(0));
    }

    #[test]
    fn the_deepest_trigger_is_reused_for_deeper_levels() {
        let strategy = CompactionStrategy::new();
        let mut counts = vec![0; 8];

        counts[7] = 64;
        assert_eq!(strategy.level_needing_compaction(&counts), None);

        counts[7] = 65;
        assert_eq!(strategy.level_needing_compaction(&counts), Some(7));
    }
}
