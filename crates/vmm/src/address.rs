//! Address types for the simulated machine.
//!
//! Virtual addresses are what user programs issue; physical addresses are byte offsets
//! into [`PhysicalMemory`](crate::PhysicalMemory). Neither carries a page size, since
//! the page size is a startup configuration value rather than a constant.

use core::fmt;
use core::ops::{Add, Sub};

use crate::{FrameNumber, PageNumber};

/// Macro to define common address type functionality.
macro_rules! impl_address_common {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
        #[repr(transparent)]
        pub struct $name(usize);

        impl $name {
            /// Creates a new address.
            #[inline]
            pub const fn new(addr: usize) -> Self {
                Self(addr)
            }

            /// Returns the raw address value.
            #[inline]
            pub const fn as_usize(self) -> usize {
                self.0
            }

            /// Returns the offset of this address within its page.
            #[inline]
            pub const fn page_offset(self, page_size: usize) -> usize {
                self.0 % page_size
            }

            /// Returns true if this address is aligned to the given power-of-two boundary.
            #[inline]
            pub const fn is_aligned(self, align: usize) -> bool {
                self.0 & (align - 1) == 0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({:#x})", stringify!($name), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{:#x}", self.0)
            }
        }

        impl Add<usize> for $name {
            type Output = Self;

            #[inline]
            fn add(self, rhs: usize) -> Self::Output {
                Self(self.0 + rhs)
            }
        }

        impl Sub<usize> for $name {
            type Output = Self;

            #[inline]
            fn sub(self, rhs: usize) -> Self::Output {
                Self(self.0 - rhs)
            }
        }
    };
}

impl_address_common!(VirtualAddress, "A virtual address issued by a user program.");
impl_address_common!(
    PhysicalAddress,
    "A byte offset into simulated physical memory."
);

impl VirtualAddress {
    /// Returns the virtual page containing this address.
    #[inline]
    pub const fn page_number(self, page_size: usize) -> PageNumber {
        PageNumber::new(self.0 / page_size)
    }
}

impl PhysicalAddress {
    /// Builds the physical address of `offset` bytes into `frame`.
    #[inline]
    pub const fn from_frame(frame: FrameNumber, offset: usize, page_size: usize) -> Self {
        Self(frame.start(page_size) + offset)
    }

    /// Returns the frame containing this address.
    #[inline]
    pub const fn frame_number(self, page_size: usize) -> FrameNumber {
        FrameNumber::new(self.0 / page_size)
    }
}
