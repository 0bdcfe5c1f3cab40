//! Run-scoped identifier allocation.
//!
//! Identifiers are sequential within a run so that re-running the same input
//! with the same configuration yields byte-identical graphs. Allocators are
//! owned by the run context and never shared between runs.

/// Sequential id allocator producing `prefix-000001` style identifiers.
#[derive(Debug, Clone)]
pub struct IdAllocator {
    prefix: &'static str,
    width: usize,
    next: u64,
}

impl IdAllocator {
    pub fn new(prefix: &'static str, width: usize) -> Self {
        Self {
            prefix,
            width,
            next: 1,
        }
    }

    pub fn next_id(&mut self) -> String {
        let id = format!("{}-{:0width$}", self.prefix, self.next, width = self.width);
        self.next += 1;
        id
    }

    /// Number of ids handed out so far.
    pub fn issued(&self) -> u64 {
        self.next - 1
    }
}

/// Global page numbering across all uploaded documents (1-based, upload order).
#[derive(Debug, Clone)]
pub struct PageAllocator {
    next: u32,
}

impl PageAllocator {
    pub fn new() -> Self {
        Self { next: 1 }
    }

    pub fn allocate(&mut self) -> u32 {
        let page = self.next;
        self.next += 1;
        page
    }

    pub fn allocated(&self) -> usize {
        (self.next - 1) as usize
    }
}

impl Default for PageAllocator {
    fn default() -> Self {
        Self::new()
    }
}
