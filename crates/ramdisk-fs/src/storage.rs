//! Byte-buffer read/write algorithm.
//!
//! Writes at the current end append. Writes inside the buffer overwrite in
//! place and extend it when they run past the end. Writes past the end
//! zero-fill the gap first. No buffer grows beyond [`MAX_FILE_SIZE`].

use crate::FsError;

/// Largest size a file may reach, in bytes.
pub const MAX_FILE_SIZE: u64 = 1 << 32;

/// Writes `payload` at `offset`, growing the buffer as needed.
///
/// Returns the number of bytes accepted, which is always `payload.len()`.
/// On error the buffer is left untouched.
pub fn write_at(buffer: &mut Vec<u8>, offset: usize, payload: &[u8]) -> Result<usize, FsError> {
    let len = buffer.len();
    let end = end_of(offset, payload.len())?;
    reserve_to(buffer, end)?;

    if offset == len {
        buffer.extend_from_slice(payload);
    } else {
        // Covers both partial overwrites running past the end and holes.
        if end > len {
            buffer.resize(end, 0);
        }
        buffer[offset..end].copy_from_slice(payload);
    }

    Ok(payload.len())
}

/// Sets the buffer length to `size`, zero-filling when it grows.
pub fn truncate(buffer: &mut Vec<u8>, size: usize) -> Result<(), FsError> {
    let size = end_of(size, 0)?;
    reserve_to(buffer, size)?;
    buffer.resize(size, 0);
    Ok(())
}

/// Returns up to `len` bytes starting at `offset`.
///
/// Reading at or past the end yields an empty slice.
pub fn read_at(buffer: &[u8], offset: usize, len: usize) -> &[u8] {
    if offset >= buffer.len() {
        return &[];
    }
    let end = offset.saturating_add(len).min(buffer.len());
    &buffer[offset..end]
}

fn end_of(offset: usize, len: usize) -> Result<usize, FsError> {
    match offset.checked_add(len) {
        Some(end) if end as u64 <= MAX_FILE_SIZE => Ok(end),
        _ => Err(FsError::FileTooLarge),
    }
}

fn reserve_to(buffer: &mut Vec<u8>, end: usize) -> Result<(), FsError> {
    if end > buffer.len() {
        buffer
            .try_reserve(end - buffer.len())
            .map_err(|_| FsError::NoSpace)?;
    }
    Ok(())
}
