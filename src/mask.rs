use std::{fmt, ops};

/// A set of readiness directions.
///
/// `Mask` is used both when registering a descriptor with an
/// [`EventLoop`] — to say which directions should be monitored — and when
/// a callback is invoked, to say which directions actually became ready.
///
/// Unlike an interest set that is never empty, `Mask` has a [`NONE`]
/// value: a registration slot whose mask is `NONE` is unregistered.
///
/// [`EventLoop`]: crate::EventLoop
/// [`NONE`]: Mask::NONE
///
/// # Examples
///
/// ```
/// use evio::Mask;
///
/// let mask = Mask::READABLE | Mask::WRITABLE;
/// assert!(mask.is_readable());
/// assert!(mask.is_writable());
/// assert!(!Mask::NONE.is_readable());
/// ```
#[derive(Copy, PartialEq, Eq, Clone, PartialOrd, Ord)]
#[repr(transparent)]
pub struct Mask(u8);

// These must be unique.
const READABLE: u8 = 0b01;
const WRITABLE: u8 = 0b10;

impl Mask {
    /// The empty mask. A slot with this mask is unregistered.
    pub const NONE: Mask = Mask(0);

    /// Readable readiness.
    pub const READABLE: Mask = Mask(READABLE);

    /// Writable readiness.
    ///
    /// Error and hangup conditions reported by the kernel are coalesced
    /// into this direction, so a write callback can observe them.
    pub const WRITABLE: Mask = Mask(WRITABLE);

    /// Add together two `Mask`s.
    ///
    /// This does the same thing as the `BitOr` implementation, but is a
    /// constant function.
    ///
    /// ```
    /// use evio::Mask;
    ///
    /// const BOTH: Mask = Mask::READABLE.add(Mask::WRITABLE);
    /// # fn silent_dead_code_warning(_: Mask) { }
    /// # silent_dead_code_warning(BOTH)
    /// ```
    #[allow(clippy::should_implement_trait)]
    pub const fn add(self, other: Mask) -> Mask {
        Mask(self.0 | other.0)
    }

    /// Removes `other`'s directions from `self`.
    pub const fn remove(self, other: Mask) -> Mask {
        Mask(self.0 & !other.0)
    }

    /// Returns true if the value contains no direction at all.
    pub const fn is_none(self) -> bool {
        self.0 == 0
    }

    /// Returns true if the value includes readable readiness.
    pub const fn is_readable(self) -> bool {
        (self.0 & READABLE) != 0
    }

    /// Returns true if the value includes writable readiness.
    pub const fn is_writable(self) -> bool {
        (self.0 & WRITABLE) != 0
    }

    /// Returns true if every direction in `other` is also in `self`.
    pub const fn contains(self, other: Mask) -> bool {
        (self.0 & other.0) == other.0
    }
}

impl ops::BitOr for Mask {
    type Output = Self;

    #[inline]
    fn bitor(self, other: Self) -> Self {
        Mask(self.0 | other.0)
    }
}

impl ops::BitOrAssign for Mask {
    #[inline]
    fn bitor_assign(&mut self, other: Self) {
        self.0 |= other.0;
    }
}

impl ops::BitAnd for Mask {
    type Output = Self;

    #[inline]
    fn bitand(self, other: Self) -> Self {
        Mask(self.0 & other.0)
    }
}

impl fmt::Debug for Mask {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            return write!(fmt, "NONE");
        }
        let mut one = false;
        if self.is_readable() {
            write!(fmt, "READABLE")?;
            one = true
        }
        if self.is_writable() {
            if one {
                write!(fmt, " | ")?
            }
            write!(fmt, "WRITABLE")?;
        }
        Ok(())
    }
}
