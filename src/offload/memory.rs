//! Shared memory pool between the host and the coprocessor.
//!
//! Every region has a host-side cached copy and the backing store the
//! coprocessor sees. [`SharedMemory::begin`] cleans the cache into the
//! backing store and hands the region to the device; [`SharedMemory::end`]
//! invalidates the cache from the backing store and hands it back to the
//! host. Reads and writes are only accepted from the side that currently
//! owns the region, so skipping either call is reported instead of
//! silently observing stale data.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::trace::trace_event;
use crate::util::alloc::try_filled;
use crate::util::{CornerMatchError, CornerMatchResult};

/// Alignment of every allocation in bytes.
pub const ALIGNMENT: usize = 64;
/// Host address of pool offset zero.
pub const HOST_BASE: u32 = 0x4000_0000;
/// Device address of pool offset zero.
pub const DEVICE_BASE: u32 = 0x8000_0000;
/// Largest pool that fits the address windows.
pub const MAX_POOL_BYTES: usize = (DEVICE_BASE - HOST_BASE) as usize;

/// Side currently allowed to touch a region.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Owner {
    /// The control processor.
    Host,
    /// The coprocessor.
    Device,
}

impl Owner {
    fn label(self) -> &'static str {
        match self {
            Owner::Host => "host",
            Owner::Device => "device",
        }
    }
}

#[derive(Debug)]
struct Region {
    size: usize,
    generation: u64,
    cache: Vec<u8>,
    backing: Vec<u8>,
    owner: Owner,
}

#[derive(Debug)]
struct Pool {
    capacity: usize,
    used: usize,
    next_generation: u64,
    regions: BTreeMap<usize, Region>,
}

impl Pool {
    fn place(&self, size: usize) -> Option<usize> {
        let mut candidate = 0usize;
        for (&offset, region) in &self.regions {
            if candidate.checked_add(size)? <= offset {
                return Some(candidate);
            }
            candidate = align_up(offset + region.size);
        }
        let end = candidate.checked_add(size)?;
        (end <= self.capacity).then_some(candidate)
    }

    fn region(&mut self, addr: u32, base: u32) -> CornerMatchResult<&mut Region> {
        self.region_of(addr, base, None)
    }

    /// Looks up a region; with `generation`, a region reallocated since the
    /// handle was issued counts as unregistered.
    fn region_of(
        &mut self,
        addr: u32,
        base: u32,
        generation: Option<u64>,
    ) -> CornerMatchResult<&mut Region> {
        let offset = addr
            .checked_sub(base)
            .ok_or(CornerMatchError::UnregisteredBuffer { addr })? as usize;
        self.regions
            .get_mut(&offset)
            .filter(|region| generation.map_or(true, |g| g == region.generation))
            .ok_or(CornerMatchError::UnregisteredBuffer { addr })
    }
}

fn align_up(value: usize) -> usize {
    value.div_ceil(ALIGNMENT) * ALIGNMENT
}

fn check_range(addr: u32, region: &Region, offset: usize, len: usize) -> CornerMatchResult<()> {
    if offset.checked_add(len).map_or(true, |end| end > region.size) {
        return Err(CornerMatchError::BufferOverrun {
            addr,
            offset,
            len,
            size: region.size,
        });
    }
    Ok(())
}

fn check_owner(addr: u32, region: &Region, side: Owner) -> CornerMatchResult<()> {
    if region.owner != side {
        return Err(CornerMatchError::BufferNotOwned {
            addr,
            owner: region.owner.label(),
        });
    }
    Ok(())
}

/// Handle to a shared memory pool; clones refer to the same pool.
#[derive(Clone, Debug)]
pub struct SharedMemory {
    pool: Arc<Mutex<Pool>>,
}

impl SharedMemory {
    /// Creates a pool of `capacity` bytes.
    pub fn new(capacity: usize) -> CornerMatchResult<Self> {
        if capacity == 0 || capacity > MAX_POOL_BYTES {
            return Err(CornerMatchError::InvalidInput(
                "pool capacity must fit the shared address window",
            ));
        }
        Ok(Self {
            pool: Arc::new(Mutex::new(Pool {
                capacity,
                used: 0,
                next_generation: 0,
                regions: BTreeMap::new(),
            })),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Pool> {
        self.pool.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Pool capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.lock().capacity
    }

    /// Bytes not held by live regions (before alignment padding).
    pub fn available(&self) -> usize {
        let pool = self.lock();
        pool.capacity - pool.used
    }

    /// Number of live regions.
    pub fn live_buffers(&self) -> usize {
        self.lock().regions.len()
    }

    /// Allocates a zeroed, host-owned region of `size` bytes.
    pub fn alloc(&self, size: usize) -> CornerMatchResult<SharedBuffer> {
        if size == 0 {
            return Err(CornerMatchError::InvalidInput("shared buffer must not be empty"));
        }
        let mut pool = self.lock();
        let offset = pool.place(size).ok_or(CornerMatchError::PoolExhausted {
            requested: size,
            available: pool.capacity - pool.used,
        })?;
        let generation = pool.next_generation;
        pool.next_generation += 1;
        let region = Region {
            size,
            generation,
            cache: try_filled(size, 0u8)?,
            backing: try_filled(size, 0u8)?,
            owner: Owner::Host,
        };
        pool.regions.insert(offset, region);
        pool.used += size;
        drop(pool);

        Ok(SharedBuffer {
            memory: self.clone(),
            host_addr: HOST_BASE + offset as u32,
            size,
            generation,
        })
    }

    /// Releases the region at `host_addr`.
    ///
    /// A [`SharedBuffer`] whose region was freed this way no longer refers
    /// to the pool, even after the address is handed out again.
    pub fn free(&self, host_addr: u32) -> CornerMatchResult<()> {
        self.release(host_addr, None)
    }

    fn release(&self, host_addr: u32, generation: Option<u64>) -> CornerMatchResult<()> {
        let mut pool = self.lock();
        let size = pool.region_of(host_addr, HOST_BASE, generation)?.size;
        pool.regions.remove(&((host_addr - HOST_BASE) as usize));
        pool.used -= size;
        Ok(())
    }

    /// Maps a host address to the address the coprocessor uses.
    pub fn translate(&self, host_addr: u32) -> CornerMatchResult<u32> {
        let mut pool = self.lock();
        pool.region(host_addr, HOST_BASE)?;
        Ok(host_addr - HOST_BASE + DEVICE_BASE)
    }

    /// Current owner of the region at `host_addr`.
    pub fn owner(&self, host_addr: u32) -> CornerMatchResult<Owner> {
        let mut pool = self.lock();
        Ok(pool.region(host_addr, HOST_BASE)?.owner)
    }

    /// Cleans the host cache into the backing store and hands the region to
    /// the coprocessor.
    pub fn begin(&self, host_addr: u32) -> CornerMatchResult<()> {
        self.begin_checked(host_addr, None)
    }

    fn begin_checked(&self, host_addr: u32, generation: Option<u64>) -> CornerMatchResult<()> {
        let mut pool = self.lock();
        let region = pool.region_of(host_addr, HOST_BASE, generation)?;
        check_owner(host_addr, region, Owner::Host)?;
        region.backing.copy_from_slice(&region.cache);
        region.owner = Owner::Device;
        Ok(())
    }

    /// Invalidates the host cache from the backing store and hands the
    /// region back to the host.
    pub fn end(&self, host_addr: u32) -> CornerMatchResult<()> {
        self.end_checked(host_addr, None)
    }

    fn end_checked(&self, host_addr: u32, generation: Option<u64>) -> CornerMatchResult<()> {
        let mut pool = self.lock();
        let region = pool.region_of(host_addr, HOST_BASE, generation)?;
        check_owner(host_addr, region, Owner::Device)?;
        region.cache.copy_from_slice(&region.backing);
        region.owner = Owner::Host;
        Ok(())
    }

    /// Writes through the host cache.
    pub fn host_write(&self, host_addr: u32, offset: usize, bytes: &[u8]) -> CornerMatchResult<()> {
        self.write_checked(host_addr, None, offset, bytes)
    }

    fn write_checked(
        &self,
        host_addr: u32,
        generation: Option<u64>,
        offset: usize,
        bytes: &[u8],
    ) -> CornerMatchResult<()> {
        let mut pool = self.lock();
        let region = pool.region_of(host_addr, HOST_BASE, generation)?;
        check_owner(host_addr, region, Owner::Host)?;
        check_range(host_addr, region, offset, bytes.len())?;
        region.cache[offset..offset + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    /// Reads from the host cache.
    pub fn host_read(&self, host_addr: u32, offset: usize, len: usize) -> CornerMatchResult<Vec<u8>> {
        self.read_checked(host_addr, None, offset, len)
    }

    fn read_checked(
        &self,
        host_addr: u32,
        generation: Option<u64>,
        offset: usize,
        len: usize,
    ) -> CornerMatchResult<Vec<u8>> {
        let mut pool = self.lock();
        let region = pool.region_of(host_addr, HOST_BASE, generation)?;
        check_owner(host_addr, region, Owner::Host)?;
        check_range(host_addr, region, offset, len)?;
        Ok(region.cache[offset..offset + len].to_vec())
    }

    /// Writes to the backing store on behalf of the coprocessor.
    pub fn device_write(
        &self,
        device_addr: u32,
        offset: usize,
        bytes: &[u8],
    ) -> CornerMatchResult<()> {
        let mut pool = self.lock();
        let region = pool.region(device_addr, DEVICE_BASE)?;
        check_owner(device_addr, region, Owner::Device)?;
        check_range(device_addr, region, offset, bytes.len())?;
        region.backing[offset..offset + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    /// Reads the backing store on behalf of the coprocessor.
    pub fn device_read(
        &self,
        device_addr: u32,
        offset: usize,
        len: usize,
    ) -> CornerMatchResult<Vec<u8>> {
        let mut pool = self.lock();
        let region = pool.region(device_addr, DEVICE_BASE)?;
        check_owner(device_addr, region, Owner::Device)?;
        check_range(device_addr, region, offset, len)?;
        Ok(region.backing[offset..offset + len].to_vec())
    }
}

/// Region of a [`SharedMemory`] pool, released on drop.
#[derive(Debug)]
pub struct SharedBuffer {
    memory: SharedMemory,
    host_addr: u32,
    size: usize,
    generation: u64,
}

impl SharedBuffer {
    /// Host address of the region.
    pub fn host_addr(&self) -> u32 {
        self.host_addr
    }

    /// Device address of the region.
    pub fn device_addr(&self) -> u32 {
        self.host_addr - HOST_BASE + DEVICE_BASE
    }

    /// Size in bytes.
    pub fn len(&self) -> usize {
        self.size
    }

    /// Always false; empty regions cannot be allocated.
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// See [`SharedMemory::begin`].
    pub fn begin(&self) -> CornerMatchResult<()> {
        self.memory.begin_checked(self.host_addr, Some(self.generation))
    }

    /// See [`SharedMemory::end`].
    pub fn end(&self) -> CornerMatchResult<()> {
        self.memory.end_checked(self.host_addr, Some(self.generation))
    }

    /// Writes at `offset` through the host cache.
    pub fn write(&self, offset: usize, bytes: &[u8]) -> CornerMatchResult<()> {
        self.memory
            .write_checked(self.host_addr, Some(self.generation), offset, bytes)
    }

    /// Reads `len` bytes at `offset` from the host cache.
    pub fn read(&self, offset: usize, len: usize) -> CornerMatchResult<Vec<u8>> {
        self.memory
            .read_checked(self.host_addr, Some(self.generation), offset, len)
    }
}

impl Drop for SharedBuffer {
    fn drop(&mut self) {
        // an explicitly freed region is already gone; its address may belong
        // to a newer buffer now
        if self.memory.release(self.host_addr, Some(self.generation)).is_err() {
            trace_event!("shared_buffer_already_released", addr = self.host_addr);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Owner, SharedMemory, ALIGNMENT, DEVICE_BASE, HOST_BASE};
    use crate::util::CornerMatchError;

    #[test]
    fn allocations_are_aligned_and_translated() {
        let memory = SharedMemory::new(1024).unwrap();
        let a = memory.alloc(10).unwrap();
        let b = memory.alloc(10).unwrap();
        assert_eq!(a.host_addr(), HOST_BASE);
        assert_eq!((b.host_addr() - HOST_BASE) as usize % ALIGNMENT, 0);
        assert_eq!(memory.translate(b.host_addr()).unwrap(), b.device_addr());
        assert_eq!(b.device_addr() - DEVICE_BASE, b.host_addr() - HOST_BASE);
    }

    #[test]
    fn writes_reach_the_device_only_after_begin() {
        let memory = SharedMemory::new(256).unwrap();
        let buf = memory.alloc(4).unwrap();
        buf.write(0, &[1, 2, 3, 4]).unwrap();
        assert!(matches!(
            memory.device_read(buf.device_addr(), 0, 4),
            Err(CornerMatchError::BufferNotOwned { .. })
        ));

        buf.begin().unwrap();
        assert_eq!(memory.owner(buf.host_addr()).unwrap(), Owner::Device);
        assert_eq!(memory.device_read(buf.device_addr(), 0, 4).unwrap(), vec![1, 2, 3, 4]);
        memory.device_write(buf.device_addr(), 0, &[9, 9]).unwrap();
        assert!(buf.read(0, 4).is_err());

        buf.end().unwrap();
        assert_eq!(buf.read(0, 4).unwrap(), vec![9, 9, 3, 4]);
    }

    #[test]
    fn exhausted_pool_and_unknown_addresses_are_errors() {
        let memory = SharedMemory::new(128).unwrap();
        let _a = memory.alloc(100).unwrap();
        assert!(matches!(
            memory.alloc(64),
            Err(CornerMatchError::PoolExhausted { .. })
        ));
        assert_eq!(
            memory.translate(HOST_BASE + 4096).unwrap_err(),
            CornerMatchError::UnregisteredBuffer {
                addr: HOST_BASE + 4096
            }
        );
        assert!(memory.free(HOST_BASE + 64).is_err());
    }

    #[test]
    fn stale_handle_does_not_release_a_reused_region() {
        let memory = SharedMemory::new(256).unwrap();
        let a = memory.alloc(16).unwrap();
        memory.free(a.host_addr()).unwrap();
        let b = memory.alloc(16).unwrap();
        assert_eq!(a.host_addr(), b.host_addr());

        assert_eq!(
            a.write(0, &[1]).unwrap_err(),
            CornerMatchError::UnregisteredBuffer { addr: a.host_addr() }
        );
        drop(a);
        assert_eq!(memory.live_buffers(), 1);
        b.write(0, &[7, 7]).unwrap();
        assert_eq!(b.read(0, 2).unwrap(), vec![7, 7]);
        drop(b);
        assert_eq!(memory.live_buffers(), 0);
    }

    #[test]
    fn oversized_requests_exhaust_instead_of_overflowing() {
        let memory = SharedMemory::new(256).unwrap();
        let _a = memory.alloc(8).unwrap();
        assert!(matches!(
            memory.alloc(usize::MAX),
            Err(CornerMatchError::PoolExhausted { .. })
        ));
        assert!(matches!(
            memory.alloc(usize::MAX - 32),
            Err(CornerMatchError::PoolExhausted { .. })
        ));
        assert_eq!(memory.live_buffers(), 1);
    }

    #[test]
    fn dropped_buffers_return_to_the_pool() {
        let memory = SharedMemory::new(128).unwrap();
        {
            let _a = memory.alloc(128).unwrap();
            assert_eq!(memory.available(), 0);
        }
        assert_eq!(memory.live_buffers(), 0);
        assert!(memory.alloc(128).is_ok());
    }
}
