//! Execution status and parallel scope values carried by a context.

use bitflags::bitflags;

/// Whether the run should keep going.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ExecutionStatus {
    /// Tests keep running.
    #[default]
    Running = 0,
    /// No further tests should start; running tests may finish.
    StopRequested = 1,
    /// Running tests should be abandoned as soon as possible.
    AbortRequested = 2,
}

impl ExecutionStatus {
    pub(crate) const fn as_u8(self) -> u8 {
        self as u8
    }

    pub(crate) const fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::StopRequested,
            2 => Self::AbortRequested,
            _ => Self::Running,
        }
    }
}

bitflags! {
    /// Which items may run in parallel with the item declaring the scope.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct ParallelScope: u8 {
        /// The item itself may run in parallel with its siblings.
        const SELF = 0b0001;
        /// The item's children may run in parallel with one another.
        const CHILDREN = 0b0010;
        /// Fixtures beneath the item may run in parallel.
        const FIXTURES = 0b0100;
        /// The item must not run in parallel with anything.
        const NONE = 0b1000;
        /// The item and all of its descendants may run in parallel.
        const ALL = Self::SELF.bits() | Self::CHILDREN.bits();
    }
}

impl ParallelScope {
    /// Returns `true` when some form of parallelism is allowed.
    #[must_use]
    pub fn allows_parallelism(self) -> bool {
        !self.contains(Self::NONE) && self.intersects(Self::SELF | Self::CHILDREN | Self::FIXTURES)
    }
}

#[cfg(test)]
mod tests {
    use super::{ExecutionStatus, ParallelScope};

    #[test]
    fn status_round_trips_through_its_tag() {
        for status in [
            ExecutionStatus::Running,
            ExecutionStatus::StopRequested,
            ExecutionStatus::AbortRequested,
        ] {
            assert_eq!(ExecutionStatus::from_u8(status.as_u8()), status);
        }
        assert_eq!(ExecutionStatus::from_u8(200), ExecutionStatus::Running);
    }

    #[test]
    fn none_overrides_other_flags() {
        assert!(ParallelScope::ALL.allows_parallelism());
        assert!(!ParallelScope::default().allows_parallelism());
        assert!(!(ParallelScope::NONE | ParallelScope::SELF).allows_parallelism());
    }
}
