//! `ContinuationOptions`: the bit-set gating which antecedent terminal
//! states let a continuation run (§3, §7).

use super::TaskState;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ContinuationOptions(u8);

impl ContinuationOptions {
    pub const ON_COMPLETED_SUCCESSFULLY: Self = Self(1 << 0);
    pub const ON_FAILED: Self = Self(1 << 1);
    pub const ON_CANCELED: Self = Self(1 << 2);
    pub const INLINE: Self = Self(1 << 3);

    /// `ON_COMPLETED_SUCCESSFULLY` alone — the common case.
    pub const DEFAULT: Self = Self::ON_COMPLETED_SUCCESSFULLY;

    pub const ALL_TERMINAL: Self =
        Self(Self::ON_COMPLETED_SUCCESSFULLY.0 | Self::ON_FAILED.0 | Self::ON_CANCELED.0);

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_inline(self) -> bool {
        self.contains(Self::INLINE)
    }

    /// Whether terminal state `state` is one of the flags this option set
    /// allows the continuation to run on.
    pub fn matches_state(self, state: TaskState) -> bool {
        match state {
            TaskState::Completed => self.contains(Self::ON_COMPLETED_SUCCESSFULLY),
            TaskState::Failed => self.contains(Self::ON_FAILED),
            TaskState::Canceled => self.contains(Self::ON_CANCELED),
            TaskState::NotStarted | TaskState::Scheduled | TaskState::Running => false,
        }
    }
}

impl std::ops::BitOr for ContinuationOptions {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl Default for ContinuationOptions {
    fn default() -> Self {
        Self::DEFAULT
    }
}
