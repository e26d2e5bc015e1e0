//! Shared memory segment between the renderer and this process.
//!
//! Layout: `[0, tile_count)` holds one completion byte per tile, followed by
//! `tile_count` body slots of `tile_bytes` each. The renderer writes a tile's
//! body first and then sets its header byte to [`TILE_READY`]; that byte is the
//! only ordering signal between the two processes.

use std::ffi::CString;
use std::io::{self, Error as IoError, ErrorKind};
use std::ptr;

use log::{debug, warn};

use crate::error::{Error, Result};
use crate::geometry::{ImageGeometry, BYTES_PER_PIXEL};

/// Header value of a tile the renderer has not finished.
pub const TILE_EMPTY: u8 = 0;
/// Header value of a finished tile awaiting delivery.
pub const TILE_READY: u8 = 1;
/// Header value written back once a tile has been delivered.
pub const TILE_CONSUMED: u8 = 2;

/// Decoded meaning of a header byte.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum TileStatus {
    Empty,
    Ready,
    Consumed,
}

impl TileStatus {
    /// Any value above [`TILE_READY`] counts as consumed.
    #[inline]
    pub fn from_byte(b: u8) -> Self {
        match b {
            TILE_EMPTY => TileStatus::Empty,
            TILE_READY => TileStatus::Ready,
            _ => TileStatus::Consumed,
        }
    }
}

/// A mapped shared memory segment sized for one render.
///
/// The creating side ([`SharedChannel::open`]) owns the name and unlinks it on
/// drop; [`SharedChannel::attach`] maps an existing segment without owning it.
/// Dropping the channel always unmaps.
pub struct SharedChannel {
    name: String,
    ptr: *mut u8,
    size: usize,
    fd: libc::c_int,
    owner: bool,
    geometry: ImageGeometry,
}

// SAFETY: the mapping is exclusively owned by this value and all access goes
// through bounds-checked copies. Concurrent writes from the other process are
// coordinated by the header protocol, not by Rust aliasing rules.
unsafe impl Send for SharedChannel {}
unsafe impl Sync for SharedChannel {}

impl SharedChannel {
    /// Creates (or recreates) the named segment with exactly
    /// `geometry.total_bytes()` zeroed bytes.
    pub fn open(name: &str, geometry: &ImageGeometry) -> Result<Self> {
        let name = normalize_name(name);
        let size = geometry.total_bytes();
        let unavailable = |source: IoError| Error::ChannelUnavailable { name: name.clone(), source };

        let c_path = c_name(&name).map_err(unavailable)?;

        // A stale segment from a crashed render would carry old header bytes.
        unsafe {
            libc::shm_unlink(c_path.as_ptr());
        }

        let fd = unsafe {
            libc::shm_open(
                c_path.as_ptr(),
                libc::O_RDWR | libc::O_CREAT | libc::O_EXCL,
                (libc::S_IRUSR | libc::S_IWUSR) as libc::c_uint,
            )
        };
        if fd < 0 {
            return Err(unavailable(IoError::last_os_error()));
        }

        if unsafe { libc::ftruncate(fd, size as libc::off_t) } < 0 {
            let err = IoError::last_os_error();
            unsafe {
                libc::close(fd);
                libc::shm_unlink(c_path.as_ptr());
            }
            return Err(unavailable(err));
        }

        let ptr = match map(fd, size) {
            Ok(ptr) => ptr,
            Err(err) => {
                unsafe {
                    libc::close(fd);
                    libc::shm_unlink(c_path.as_ptr());
                }
                return Err(unavailable(err));
            }
        };

        debug!("opened shared segment {name} ({size} bytes)");

        Ok(Self { name, ptr, size, fd, owner: true, geometry: *geometry })
    }

    /// Maps an existing segment created by another process.
    ///
    /// Fails if the segment is smaller than `geometry.total_bytes()`.
    pub fn attach(name: &str, geometry: &ImageGeometry) -> Result<Self> {
        let name = normalize_name(name);
        let size = geometry.total_bytes();
        let unavailable = |source: IoError| Error::ChannelUnavailable { name: name.clone(), source };

        let c_path = c_name(&name).map_err(unavailable)?;

        let fd = unsafe { libc::shm_open(c_path.as_ptr(), libc::O_RDWR, 0) };
        if fd < 0 {
            return Err(unavailable(IoError::last_os_error()));
        }

        let mut stat: libc::stat = unsafe { std::mem::zeroed() };
        let stat_err = if unsafe { libc::fstat(fd, &mut stat) } < 0 {
            Some(IoError::last_os_error())
        } else if (stat.st_size as usize) < size {
            Some(IoError::new(
                ErrorKind::InvalidData,
                format!("segment holds {} bytes, expected {size}", stat.st_size),
            ))
        } else {
            None
        };
        if let Some(err) = stat_err {
            unsafe {
                libc::close(fd);
            }
            return Err(unavailable(err));
        }

        let ptr = match map(fd, size) {
            Ok(ptr) => ptr,
            Err(err) => {
                unsafe {
                    libc::close(fd);
                }
                return Err(unavailable(err));
            }
        };

        debug!("attached to shared segment {name} ({size} bytes)");

        Ok(Self { name, ptr, size, fd, owner: false, geometry: *geometry })
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.size
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    #[inline]
    pub fn geometry(&self) -> &ImageGeometry {
        &self.geometry
    }

    /// Reads header byte `index`.
    pub fn read_header_byte(&self, index: usize) -> Result<u8> {
        self.check_header(index)?;
        // Volatile: the other process writes this byte behind our back.
        Ok(unsafe { ptr::read_volatile(self.ptr.add(index)) })
    }

    /// Writes header byte `index`. The consumer only ever uses this to
    /// acknowledge a delivered tile.
    pub fn write_header_byte(&self, index: usize, value: u8) -> Result<()> {
        self.check_header(index)?;
        unsafe { ptr::write_volatile(self.ptr.add(index), value) };
        Ok(())
    }

    /// Copies the tail of tile `index`'s body slot, starting `from_row` rows
    /// into the slot where each row is `row_pixels` pixels wide.
    pub fn read_tile_bytes(&self, index: usize, from_row: usize, row_pixels: usize) -> Result<Vec<u8>> {
        self.check_header(index)?;
        let skip = from_row * row_pixels * BYTES_PER_PIXEL;
        let tile_bytes = self.geometry.tile_bytes();
        let start = self.geometry.body_offset(index);
        if skip > tile_bytes {
            return Err(Error::OutOfBounds { offset: start + skip, len: 0, size: self.size });
        }
        self.read_bytes(start + skip, tile_bytes - skip)
    }

    /// Copies `bytes` into tile `index`'s body slot at byte `offset` within
    /// the slot. Producer side.
    pub fn write_tile_bytes(&self, index: usize, offset: usize, bytes: &[u8]) -> Result<()> {
        self.check_header(index)?;
        let tile_bytes = self.geometry.tile_bytes();
        if offset + bytes.len() > tile_bytes {
            return Err(Error::OutOfBounds {
                offset: self.geometry.body_offset(index) + offset,
                len: bytes.len(),
                size: self.size,
            });
        }
        self.write_bytes(self.geometry.body_offset(index) + offset, bytes)
    }

    /// Copies `len` bytes starting at absolute segment offset `offset`.
    pub fn read_bytes(&self, offset: usize, len: usize) -> Result<Vec<u8>> {
        self.check_range(offset, len)?;
        let mut out = vec![0u8; len];
        unsafe {
            ptr::copy_nonoverlapping(self.ptr.add(offset), out.as_mut_ptr(), len);
        }
        Ok(out)
    }

    /// Copies `bytes` to absolute segment offset `offset`.
    pub fn write_bytes(&self, offset: usize, bytes: &[u8]) -> Result<()> {
        self.check_range(offset, bytes.len())?;
        unsafe {
            ptr::copy_nonoverlapping(bytes.as_ptr(), self.ptr.add(offset), bytes.len());
        }
        Ok(())
    }

    /// Unmaps the segment (and unlinks it if this side created it).
    pub fn close(self) {
        drop(self);
    }

    fn check_header(&self, index: usize) -> Result<()> {
        if index >= self.geometry.header_bytes() {
            return Err(Error::OutOfBounds { offset: index, len: 1, size: self.geometry.header_bytes() });
        }
        Ok(())
    }

    fn check_range(&self, offset: usize, len: usize) -> Result<()> {
        match offset.checked_add(len) {
            Some(end) if end <= self.size => Ok(()),
            _ => Err(Error::OutOfBounds { offset, len, size: self.size }),
        }
    }
}

impl Drop for SharedChannel {
    fn drop(&mut self) {
        if !self.ptr.is_null() {
            unsafe {
                libc::munmap(self.ptr as *mut libc::c_void, self.size);
            }
            self.ptr = ptr::null_mut();
        }

        if self.fd >= 0 {
            unsafe {
                libc::close(self.fd);
            }
            self.fd = -1;
        }

        if self.owner {
            match c_name(&self.name) {
                Ok(c) => unsafe {
                    libc::shm_unlink(c.as_ptr());
                },
                Err(e) => warn!("cannot unlink {}: {e}", self.name),
            }
        }

        debug!("closed shared segment {}", self.name);
    }
}

impl std::fmt::Debug for SharedChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedChannel")
            .field("name", &self.name)
            .field("size", &self.size)
            .field("owner", &self.owner)
            .finish()
    }
}

/// POSIX shared memory names start with a single slash.
fn normalize_name(name: &str) -> String {
    format!("/{}", name.trim_start_matches('/'))
}

fn c_name(name: &str) -> io::Result<CString> {
    CString::new(name).map_err(|_| IoError::new(ErrorKind::InvalidInput, "name contains null byte"))
}

fn map(fd: libc::c_int, size: usize) -> io::Result<*mut u8> {
    let ptr = unsafe {
        libc::mmap(
            ptr::null_mut(),
            size,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_SHARED,
            fd,
            0,
        )
    };
    if ptr == libc::MAP_FAILED {
        return Err(IoError::last_os_error());
    }
    Ok(ptr as *mut u8)
}
