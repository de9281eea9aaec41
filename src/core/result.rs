//! Result codes of event dispatch.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

/// Outcome of dispatching one event.
///
/// The values are bit flags: a single dispatch can touch several orthogonal
/// regions and rows, and the per-region outcomes are combined with `|`.
/// [`canonical`](HandledResult::canonical) then clears the rejection bit when
/// something else handled or deferred the event.
///
/// ```rust
/// use hsm::core::HandledResult;
///
/// let merged = (HandledResult::GUARD_REJECTED | HandledResult::HANDLED).canonical();
/// assert_eq!(merged, HandledResult::HANDLED);
/// assert!(HandledResult::NOT_HANDLED.is_not_handled());
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct HandledResult(u8);

impl HandledResult {
    /// No row matched and no state deferred the event.
    pub const NOT_HANDLED: Self = Self(0);
    /// A row fired.
    pub const HANDLED: Self = Self(1);
    /// A row matched but its guard refused, and nothing else handled it.
    pub const GUARD_REJECTED: Self = Self(2);
    /// The event was deferred.
    pub const DEFERRED: Self = Self(4);

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_handled(self) -> bool {
        self.contains(Self::HANDLED)
    }

    pub fn is_deferred(self) -> bool {
        self.contains(Self::DEFERRED)
    }

    pub fn is_guard_rejected(self) -> bool {
        self.contains(Self::GUARD_REJECTED)
    }

    pub fn is_not_handled(self) -> bool {
        self.0 == 0
    }

    /// Drops the rejection bit when the event was handled or deferred.
    pub fn canonical(self) -> Self {
        if self.0 & (Self::HANDLED.0 | Self::DEFERRED.0) != 0 {
            Self(self.0 & !Self::GUARD_REJECTED.0)
        } else {
            self
        }
    }
}

impl BitOr for HandledResult {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for HandledResult {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for HandledResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_not_handled() {
            return f.write_str("NOT_HANDLED");
        }
        let names = [
            (Self::HANDLED, "HANDLED"),
            (Self::GUARD_REJECTED, "GUARD_REJECTED"),
            (Self::DEFERRED, "DEFERRED"),
        ];
        let set: Vec<&str> = names
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect();
        f.write_str(&set.join(" | "))
    }
}
