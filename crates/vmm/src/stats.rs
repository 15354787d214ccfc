use core::sync::atomic::{AtomicUsize, Ordering};

/// A snapshot of paging activity since boot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FaultStats {
    /// Translation-cache misses handed to the fault resolver.
    pub page_faults: usize,
    /// Misses on pages that were already resident.
    pub tlb_refills: usize,
    /// Pages materialized from the executable or zero-filled.
    pub demand_loads: usize,
    /// Pages written to swap.
    pub swap_outs: usize,
    /// Pages read back from swap.
    pub swap_ins: usize,
}

#[derive(Default)]
pub(crate) struct StatCounters {
    page_faults: AtomicUsize,
    tlb_refills: AtomicUsize,
    demand_loads: AtomicUsize,
    swap_outs: AtomicUsize,
    swap_ins: AtomicUsize,
}

impl StatCounters {
    pub fn page_fault(&self) {
        self.page_faults.fetch_add(1, Ordering::Relaxed);
    }

    pub fn tlb_refill(&self) {
        self.tlb_refills.fetch_add(1, Ordering::Relaxed);
    }

    pub fn demand_load(&self) {
        self.demand_loads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn swap_out(&self) {
        self.swap_outs.fetch_add(1, Ordering::Relaxed);
    }

    pub fn swap_in(&self) {
        self.swap_ins.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> FaultStats {
        FaultStats {
            page_faults: self.page_faults.load(Ordering::Relaxed),
            tlb_refills: self.tlb_refills.load(Ordering::Relaxed),
            demand_loads: self.demand_loads.load(Ordering::Relaxed),
            swap_outs: self.swap_outs.load(Ordering::Relaxed),
            swap_ins: self.swap_ins.load(Ordering::Relaxed),
        }
    }
}
