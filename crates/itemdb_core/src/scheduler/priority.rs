//! Transaction priorities.

use std::fmt;

/// Coarse priority class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PriorityClass {
    /// Work a user is waiting for.
    Foreground,
    /// Everything else.
    Background,
}

/// Priority of a submitted transaction.
///
/// Foreground always outranks background; `relative` orders work within a
/// class, higher first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DbPriority {
    class: PriorityClass,
    relative: i32,
}

impl DbPriority {
    /// Foreground, relative 0.
    pub const FOREGROUND: DbPriority = DbPriority::foreground(0);

    /// Background, relative 0.
    pub const BACKGROUND: DbPriority = DbPriority::background(0);

    /// Foreground with a relative priority.
    #[must_use]
    pub const fn foreground(relative: i32) -> Self {
        Self {
            class: PriorityClass::Foreground,
            relative,
        }
    }

    /// Background with a relative priority.
    #[must_use]
    pub const fn background(relative: i32) -> Self {
        Self {
            class: PriorityClass::Background,
            relative,
        }
    }

    /// The class.
    #[must_use]
    pub const fn class(self) -> PriorityClass {
        self.class
    }

    /// The relative priority.
    #[must_use]
    pub const fn relative(self) -> i32 {
        self.relative
    }

    /// Returns true for the foreground class.
    #[must_use]
    pub const fn is_foreground(self) -> bool {
        matches!(self.class, PriorityClass::Foreground)
    }

    /// Queue rank; larger runs first.
    pub(crate) const fn rank(self) -> i64 {
        let boost = match self.class {
            PriorityClass::Foreground => 1_i64 << 32,
            PriorityClass::Background => 0,
        };
        boost + self.relative as i64
    }
}

impl Default for DbPriority {
    fn default() -> Self {
        Self::BACKGROUND
    }
}

impl fmt::Display for DbPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.class {
            PriorityClass::Foreground => write!(f, "fg({})", self.relative),
            PriorityClass::Background => write!(f, "bg({})", self.relative),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn foreground_outranks_any_background() {
        assert!(DbPriority::foreground(i32::MIN).rank() > DbPriority::background(i32::MAX).rank());
        assert!(DbPriority::background(2).rank() > DbPriority::background(1).rank());
    }

    #[test]
    fn display() {
        assert_eq!(DbPriority::FOREGROUND.to_string(), "fg(0)");
        assert_eq!(DbPriority::background(-3).to_string(), "bg(-3)");
    }
}
