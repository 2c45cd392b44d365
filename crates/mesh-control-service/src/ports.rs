//! Local port allocation for registered adapters

use std::collections::BTreeSet;
use std::net::{Ipv4Addr, TcpListener};
use std::ops::RangeInclusive;
use std::sync::Mutex;
use thiserror::Error;
use tracing::debug;

/// Errors from port allocation
#[derive(Error, Debug, PartialEq, Eq)]
pub enum PortAllocatorError {
    #[error("No free port left in range {start}..={end}")]
    Exhausted { start: u16, end: u16 },
}

#[derive(Debug)]
struct AllocatorState {
    cursor: u16,
    allocated: BTreeSet<u16>,
}

/// Hands out ports from a fixed range, round-robin.
///
/// A port is never handed out twice while allocated. When host checking is
/// on, ports something else on the host is already listening on are skipped.
#[derive(Debug)]
pub struct PortAllocator {
    range: RangeInclusive<u16>,
    check_host: bool,
    state: Mutex<AllocatorState>,
}

impl PortAllocator {
    pub fn new(range: RangeInclusive<u16>) -> Self {
        Self::build(range, true)
    }

    /// Allocator that trusts its own bookkeeping and never binds test sockets.
    pub fn without_host_check(range: RangeInclusive<u16>) -> Self {
        Self::build(range, false)
    }

    fn build(range: RangeInclusive<u16>, check_host: bool) -> Self {
        let cursor = *range.start();
        Self {
            range,
            check_host,
            state: Mutex::new(AllocatorState {
                cursor,
                allocated: BTreeSet::new(),
            }),
        }
    }

    /// Reserve the next free port.
    pub fn allocate(&self) -> Result<u16, PortAllocatorError> {
        let (start, end) = (*self.range.start(), *self.range.end());
        if start > end {
            return Err(PortAllocatorError::Exhausted { start, end });
        }
        let span = u32::from(end - start) + 1;

        let mut state = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        for step in 0..span {
            let offset = (u32::from(state.cursor - start) + step) % span;
            // offset < span <= u16::MAX + 1 - start
            let port = start + offset as u16;

            if state.allocated.contains(&port) || (self.check_host && !Self::is_free_on_host(port)) {
                continue;
            }

            state.allocated.insert(port);
            state.cursor = if port == end { start } else { port + 1 };
            debug!(port, "Allocated adapter port");
            return Ok(port);
        }

        Err(PortAllocatorError::Exhausted { start, end })
    }

    /// Return a port to the pool. Unknown ports are ignored.
    pub fn release(&self, port: u16) {
        let mut state = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if state.allocated.remove(&port) {
            debug!(port, "Released adapter port");
        }
    }

    /// Number of ports currently handed out.
    pub fn allocated(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .allocated
            .len()
    }

    fn is_free_on_host(port: u16) -> bool {
        TcpListener::bind((Ipv4Addr::LOCALHOST, port)).is_ok()
    }
}
