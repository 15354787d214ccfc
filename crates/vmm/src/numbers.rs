//! Page, frame and owner number types.
//!
//! These newtypes keep physical frame indices, virtual page numbers and owner
//! identities from being mixed up as bare integers.

use core::{
    fmt,
    ops::{Add, Sub},
};

/// Macro to define common index-number functionality.
///
/// This macro generates the basic structure and methods shared by frame numbers,
/// page numbers and identity tags.
macro_rules! impl_number_common {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
        #[repr(transparent)]
        pub struct $name(usize);

        impl $name {
            /// Creates a new number.
            #[inline]
            pub const fn new(number: usize) -> Self {
                Self(number)
            }

            /// Returns the raw number.
            #[inline]
            pub const fn as_usize(self) -> usize {
                self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

/// Adds offset arithmetic for numbers that index a contiguous range.
macro_rules! impl_number_arith {
    ($name:ident) => {
        impl Add<usize> for $name {
            type Output = Self;

            #[inline]
            fn add(self, rhs: usize) -> Self::Output {
                Self(self.0 + rhs)
            }
        }

        impl Sub<$name> for $name {
            type Output = usize;

            #[inline]
            fn sub(self, rhs: $name) -> Self::Output {
                self.0 - rhs.0
            }
        }
    };
}

impl_number_common!(
    FrameNumber,
    "A physical memory frame number.\n\n\
     Frame numbers are zero-indexed and correspond to `page_size`-aligned offsets into\n\
     simulated physical memory."
);
impl_number_arith!(FrameNumber);

impl FrameNumber {
    /// Returns the physical byte offset at the start of this frame.
    #[inline]
    pub const fn start(self, page_size: usize) -> usize {
        self.0 * page_size
    }
}

impl_number_common!(
    PageNumber,
    "A virtual page number.\n\n\
     Indexes an address space's page table; page `n` covers virtual bytes\n\
     `[n * page_size, (n + 1) * page_size)`."
);
impl_number_arith!(PageNumber);

impl PageNumber {
    /// Returns the virtual byte offset at the start of this page.
    #[inline]
    pub const fn start(self, page_size: usize) -> usize {
        self.0 * page_size
    }
}

impl_number_common!(
    AddressSpaceId,
    "Identity of an address space.\n\n\
     Frame-table entries carry this tag instead of a pointer to their owner; it is\n\
     resolved through the manager's registry when a frame must be evicted."
);

impl_number_common!(
    ThreadId,
    "Identity of the kernel thread that owns an address space."
);
