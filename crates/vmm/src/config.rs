//! Startup configuration for the simulated machine's memory system.
//!
//! A [`VmConfig`] is chosen once, validated, and handed to
//! [`VirtualMemoryManager::new`](crate::VirtualMemoryManager::new). Nothing in it can
//! change while the manager is alive.

use core::fmt;

/// Default page size in bytes.
pub const DEFAULT_PAGE_SIZE: usize = 128;

/// Smallest usable page: one machine word, so aligned accesses never straddle pages.
pub const MIN_PAGE_SIZE: usize = 4;

/// Default number of physical frames.
pub const DEFAULT_FRAME_COUNT: usize = 32;

/// Default number of translation-cache slots.
pub const DEFAULT_TLB_SIZE: usize = 4;

/// Default bytes reserved for a user program's stack.
pub const DEFAULT_USER_STACK_SIZE: usize = 1024;

/// How program content reaches physical memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadMode {
    /// Every page is materialized when the address space is created.
    Eager,
    /// Pages are materialized on first reference.
    DemandPaged,
}

/// Which frame is evicted when physical memory is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyKind {
    /// Evict the frame that has been resident the longest.
    Fifo,
    /// Second-chance sweep over reference and dirty bits.
    Clock,
    /// Uniform random choice among occupied frames.
    Random,
}

/// Errors reported by [`VmConfig::validate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// The page size is not a power of two of at least one machine word.
    InvalidPageSize,
    /// There are no physical frames.
    NoFrames,
    /// The translation cache has no slots.
    NoTlbSlots,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidPageSize => write!(
                f,
                "page size must be a power of two of at least {MIN_PAGE_SIZE} bytes"
            ),
            Self::NoFrames => write!(f, "physical memory needs at least one frame"),
            Self::NoTlbSlots => write!(f, "translation cache needs at least one slot"),
        }
    }
}

impl core::error::Error for ConfigError {}

/// Memory-system configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VmConfig {
    /// Page and frame size in bytes.
    pub page_size: usize,
    /// Number of physical frames.
    pub frame_count: usize,
    /// Number of translation-cache slots.
    pub tlb_size: usize,
    /// Stack bytes appended after a program's segments.
    pub user_stack_size: usize,
    pub load_mode: LoadMode,
    pub policy: PolicyKind,
    /// Whether evicted pages are written to a per-address-space swap file.
    pub swap: bool,
    /// Seed for [`PolicyKind::Random`].
    pub random_seed: u64,
}

impl VmConfig {
    /// Returns the default configuration of the simulated machine.
    pub const fn new() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            frame_count: DEFAULT_FRAME_COUNT,
            tlb_size: DEFAULT_TLB_SIZE,
            user_stack_size: DEFAULT_USER_STACK_SIZE,
            load_mode: LoadMode::DemandPaged,
            policy: PolicyKind::Fifo,
            swap: true,
            random_seed: 0x2545_F491_4F6C_DD1D,
        }
    }

    pub const fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub const fn with_frame_count(mut self, frame_count: usize) -> Self {
        self.frame_count = frame_count;
        self
    }

    pub const fn with_tlb_size(mut self, tlb_size: usize) -> Self {
        self.tlb_size = tlb_size;
        self
    }

    pub const fn with_user_stack_size(mut self, user_stack_size: usize) -> Self {
        self.user_stack_size = user_stack_size;
        self
    }

    pub const fn with_load_mode(mut self, load_mode: LoadMode) -> Self {
        self.load_mode = load_mode;
        self
    }

    pub const fn with_policy(mut self, policy: PolicyKind) -> Self {
        self.policy = policy;
        self
    }

    pub const fn with_swap(mut self, swap: bool) -> Self {
        self.swap = swap;
        self
    }

    pub const fn with_random_seed(mut self, seed: u64) -> Self {
        self.random_seed = seed;
        self
    }

    /// Total bytes of simulated physical memory.
    pub const fn memory_size(&self) -> usize {
        self.page_size * self.frame_count
    }

    /// Checks that the configuration describes a usable machine.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.page_size < MIN_PAGE_SIZE || !self.page_size.is_power_of_two() {
            return Err(ConfigError::InvalidPageSize);
        }
        if self.frame_count == 0 {
            return Err(ConfigError::NoFrames);
        }
        if self.tlb_size == 0 {
            return Err(ConfigError::NoTlbSlots);
        }
        Ok(())
    }
}

impl Default for VmConfig {
    fn default() -> Self {
        Self::new()
    }
}
