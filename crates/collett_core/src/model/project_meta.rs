//! Project-level metadata persisted next to the outline.

use std::time::{SystemTime, UNIX_EPOCH};

/// Creation and last-save timestamps of a project, in epoch milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProjectMeta {
    pub created_at: i64,
    pub updated_at: i64,
}

impl ProjectMeta {
    /// Metadata for a project created now.
    pub fn new() -> Self {
        let now = now_epoch_ms();
        Self {
            created_at: now,
            updated_at: now,
        }
    }

    /// Moves `updated_at` to the current time and returns the previous value.
    pub fn touch(&mut self) -> i64 {
        std::mem::replace(&mut self.updated_at, now_epoch_ms().max(self.created_at))
    }
}

impl Default for ProjectMeta {
    fn default() -> Self {
        Self::new()
    }
}

/// Current wall-clock time in Unix epoch milliseconds.
///
/// Clocks set before 1970 read as zero.
pub fn now_epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::ProjectMeta;

    #[test]
    fn touch_returns_previous_update_time() {
        let mut meta = ProjectMeta {
            created_at: 10,
            updated_at: 20,
        };
        let previous = meta.touch();
        assert_eq!(previous, 20);
        assert!(meta.updated_at >= meta.created_at);
    }
}
