use tracing::warn;

/// A block of memory reserved up front and released when the process comes
/// under memory pressure. Refinement keeps going only while the padding is
/// still held, so releasing it makes the loop wind down cooperatively with
/// enough headroom left to build the final heuristic.
pub struct MemoryPadding {
    padding: Option<Vec<u8>>,
}

impl MemoryPadding {
    pub fn reserve(megabytes: usize) -> Self {
        let num_bytes = megabytes * 1024 * 1024;
        let mut buffer: Vec<u8> = Vec::new();
        if buffer.try_reserve_exact(num_bytes).is_err() {
            warn!("Failed to reserve {megabytes} MB of memory padding");
            return MemoryPadding { padding: None };
        }
        buffer.resize(num_bytes, 0);
        MemoryPadding { padding: Some(buffer) }
    }

    pub fn is_reserved(&self) -> bool {
        self.padding.is_some()
    }

    pub fn release(&mut self) {
        self.padding = None;
    }
}
