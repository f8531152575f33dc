// Copyright 2025 Crrow
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Sliding windows over one chain of segment files.
//!
//! A [`MemoryView`] keeps at most one segment open and at most one window of
//! it mapped. Sequential access stays inside the window; an address outside it
//! (or in another segment) drops the window and maps a new one starting at the
//! page holding the address.

use std::path::{Path, PathBuf};

use bytes::Bytes;
use memmap2::{Mmap, MmapMut, MmapOptions};
use snafu::{ResultExt, ensure};
use tracing::debug;

use crate::{
    Result,
    config::RetryPolicy,
    error::{InternalSnafu, IoSnafu, ReadOnlyWindowSnafu, WindowOutOfBoundsSnafu},
    file::{self, Access, SegmentFile},
    page::PageCount,
    path::{SegmentKind, segment_file_path},
    sequence::SequenceNumber,
};

enum Mapping {
    ReadOnly(Mmap),
    ReadWrite(MmapMut),
}

impl Mapping {
    fn as_slice(&self) -> &[u8] {
        match self {
            Self::ReadOnly(m) => m,
            Self::ReadWrite(m) => m,
        }
    }
}

/// One mapped byte range `[start, end)` of a segment.
struct Window {
    segment: u16,
    start:   u64,
    end:     u64,
    mapping: Mapping,
}

impl Window {
    const fn contains(&self, segment: u16, offset: u64, size: u64) -> bool {
        self.segment == segment && offset >= self.start && offset + size <= self.end
    }

    #[allow(clippy::cast_possible_truncation)]
    const fn relative(&self, offset: u64) -> usize { (offset - self.start) as usize }
}

/// Window manager over the data or index segments of one queue.
///
/// Owned by a single appender or tailer and never shared between threads.
pub struct MemoryView {
    base:         PathBuf,
    kind:         SegmentKind,
    capacity:     PageCount,
    default_size: PageCount,
    access:       Access,
    retry:        RetryPolicy,
    file:         Option<(u16, SegmentFile)>,
    window:       Option<Window>,
}

impl std::fmt::Debug for MemoryView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryView")
            .field("base", &self.base)
            .field("kind", &self.kind)
            .field("access", &self.access)
            .field(
                "window",
                &self.window.as_ref().map(|w| (w.segment, w.start, w.end)),
            )
            .finish_non_exhaustive()
    }
}

impl MemoryView {
    pub fn new(
        base: impl Into<PathBuf>,
        kind: SegmentKind,
        capacity: PageCount,
        default_size: PageCount,
        access: Access,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            base: base.into(),
            kind,
            capacity,
            default_size,
            access,
            retry,
            file: None,
            window: None,
        }
    }

    pub fn base(&self) -> &Path { &self.base }

    pub const fn capacity(&self) -> PageCount { self.capacity }

    /// Segment currently open, if any.
    pub fn segment(&self) -> Option<u16> { self.file.as_ref().map(|(segment, _)| *segment) }

    /// Copy `buf.len()` bytes starting at `address`.
    pub fn read(&mut self, address: SequenceNumber, buf: &mut [u8]) -> Result<()> {
        if buf.is_empty() {
            return Ok(());
        }
        let window = self.window(address, buf.len() as u64)?;
        let start = window.relative(address.offset());
        buf.copy_from_slice(&window.mapping.as_slice()[start..start + buf.len()]);
        Ok(())
    }

    #[allow(clippy::cast_possible_truncation)]
    pub fn read_bytes(&mut self, address: SequenceNumber, len: u64) -> Result<Bytes> {
        // An empty payload may sit flush against the end of a segment.
        if len == 0 {
            return Ok(Bytes::new());
        }
        let window = self.window(address, len)?;
        let start = window.relative(address.offset());
        Ok(Bytes::copy_from_slice(
            &window.mapping.as_slice()[start..start + len as usize],
        ))
    }

    pub fn read_u32(&mut self, address: SequenceNumber) -> Result<u32> {
        let mut raw = [0u8; 4];
        self.read(address, &mut raw)?;
        Ok(u32::from_le_bytes(raw))
    }

    /// Write `parts` back to back starting at `address`, through a single
    /// window.
    pub fn write(&mut self, address: SequenceNumber, parts: &[&[u8]]) -> Result<()> {
        let total: usize = parts.iter().map(|p| p.len()).sum();
        let window = self.window(address, total as u64)?;
        let mut at = window.relative(address.offset());
        let Mapping::ReadWrite(map) = &mut window.mapping else {
            return ReadOnlyWindowSnafu { address }.fail();
        };
        for part in parts {
            map[at..at + part.len()].copy_from_slice(part);
            at += part.len();
        }
        Ok(())
    }

    /// Flush the current window to disk. A no-op for read-only views.
    pub fn flush(&self) -> Result<()> {
        if let Some(Window {
            mapping: Mapping::ReadWrite(map),
            ..
        }) = &self.window
        {
            let path = self.file.as_ref().map_or(self.base.as_path(), |(_, f)| f.path());
            map.flush().context(IoSnafu { path })?;
        }
        Ok(())
    }

    /// Unmap the window and close the segment.
    pub fn close(&mut self) {
        self.window = None;
        self.file = None;
    }

    /// A window guaranteed to contain `[address, address + size)`.
    fn window(&mut self, address: SequenceNumber, size: u64) -> Result<&mut Window> {
        let capacity = self.capacity.bytes();
        let (segment, offset) = (address.segment(), address.offset());
        ensure!(
            offset < capacity && offset + size <= capacity,
            WindowOutOfBoundsSnafu {
                address,
                size,
                capacity,
            }
        );

        if !matches!(&self.file, Some((open, _)) if *open == segment) {
            self.close();
            self.file = Some((segment, self.open_segment(segment)?));
        }

        if !self
            .window
            .as_ref()
            .is_some_and(|w| w.contains(segment, offset, size))
        {
            self.window = None;
            let start = PageCount::containing(offset).bytes();
            let end = (start + self.default_size.bytes())
                .max(PageCount::covering(offset + size).bytes())
                .min(capacity);
            ensure!(
                start < capacity && offset + size <= end,
                WindowOutOfBoundsSnafu {
                    address,
                    size,
                    capacity,
                }
            );
            let Some((_, file)) = &self.file else {
                return InternalSnafu {
                    message: "segment closed while mapping",
                }
                .fail();
            };
            self.window = Some(map_window(file, self.access, segment, start, end)?);
        }

        match &mut self.window {
            Some(window) => Ok(window),
            None => InternalSnafu {
                message: "window missing after remap",
            }
            .fail(),
        }
    }

    fn open_segment(&self, segment: u16) -> Result<SegmentFile> {
        let path = segment_file_path(&self.base, self.kind, segment);
        match self.access {
            Access::ReadOnly => {
                file::open_existing(&path, Access::ReadOnly, self.capacity.bytes(), &self.retry)
            }
            Access::ReadWrite => file::open_or_create(&path, self.capacity, &self.retry),
        }
    }
}

#[allow(unsafe_code, clippy::cast_possible_truncation)]
fn map_window(
    file: &SegmentFile,
    access: Access,
    segment: u16,
    start: u64,
    end: u64,
) -> Result<Window> {
    let path = file.path();
    let mut options = MmapOptions::new();
    options.offset(start).len((end - start) as usize);

    // SAFETY: segment files are sized once at creation and never truncated,
    // and `end` is clipped to that size. Writers only touch slots reserved for
    // them and readers only look at published slots, so no two mappings race
    // on the same bytes.
    let mapping = match access {
        Access::ReadOnly => {
            Mapping::ReadOnly(unsafe { options.map(file.file()) }.context(IoSnafu { path })?)
        }
        Access::ReadWrite => {
            Mapping::ReadWrite(unsafe { options.map_mut(file.file()) }.context(IoSnafu { path })?)
        }
    };

    debug!(path = ?path, start, end, "Mapped window");
    Ok(Window {
        segment,
        start,
        end,
        mapping,
    })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tempfile::TempDir;

    use super::*;
    use crate::QueueError;

    fn retry() -> RetryPolicy {
        RetryPolicy {
            attempts: 3,
            scale:    Duration::from_millis(1),
        }
    }

    fn writer(base: &Path, capacity: u32, window: u32) -> MemoryView {
        MemoryView::new(
            base,
            SegmentKind::Data,
            PageCount::new(capacity),
            PageCount::new(window),
            Access::ReadWrite,
            retry(),
        )
    }

    fn reader(base: &Path, capacity: u32, window: u32) -> MemoryView {
        MemoryView::new(
            base,
            SegmentKind::Data,
            PageCount::new(capacity),
            PageCount::new(window),
            Access::ReadOnly,
            retry(),
        )
    }

    #[test]
    fn test_write_then_read_across_views() {
        let temp_dir = TempDir::new().unwrap();
        let mut w = writer(temp_dir.path(), 4, 1);
        let mut r = reader(temp_dir.path(), 4, 1);

        let at = SequenceNumber::new(0, 100);
        w.write(at, &[&5u32.to_le_bytes(), b"hello"]).unwrap();

        assert_eq!(r.read_u32(at).unwrap(), 5);
        assert_eq!(r.read_bytes(at.advance(4), 5).unwrap().as_ref(), b"hello");
    }

    #[test]
    fn test_remaps_on_page_and_segment_change() {
        let temp_dir = TempDir::new().unwrap();
        let mut w = writer(temp_dir.path(), 4, 1);

        w.write(SequenceNumber::new(0, 0), &[b"a"]).unwrap();
        assert_eq!(w.segment(), Some(0));
        // Straddles the first page: the window grows to cover it.
        w.write(SequenceNumber::new(0, 4090), &[&[7u8; 12]]).unwrap();
        w.write(SequenceNumber::new(1, 0), &[b"b"]).unwrap();
        assert_eq!(w.segment(), Some(1));

        let mut r = reader(temp_dir.path(), 4, 1);
        let mut buf = [0u8; 12];
        r.read(SequenceNumber::new(0, 4090), &mut buf).unwrap();
        assert_eq!(buf, [7u8; 12]);
        assert_eq!(r.read_bytes(SequenceNumber::new(1, 0), 1).unwrap().as_ref(), b"b");
        assert!(
            temp_dir
                .path()
                .join(crate::path::segment_file_name(SegmentKind::Data, 1))
                .exists()
        );
    }

    #[test]
    fn test_out_of_bounds_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let mut w = writer(temp_dir.path(), 1, 1);

        let err = w
            .write(SequenceNumber::new(0, 4090), &[&[0u8; 8]])
            .unwrap_err();
        assert!(matches!(err, QueueError::WindowOutOfBounds { .. }));

        let err = w.read_u32(SequenceNumber::new(0, 4096)).unwrap_err();
        assert!(matches!(err, QueueError::WindowOutOfBounds { .. }));
    }

    #[test]
    fn test_empty_read_at_segment_end() {
        let temp_dir = TempDir::new().unwrap();
        let mut w = writer(temp_dir.path(), 1, 1);
        w.write(SequenceNumber::new(0, 4092), &[&0u32.to_le_bytes()])
            .unwrap();

        assert!(
            w.read_bytes(SequenceNumber::new(0, 4096), 0)
                .unwrap()
                .is_empty()
        );
    }

    #[test]
    fn test_reader_never_creates_segments() {
        let temp_dir = TempDir::new().unwrap();
        let mut r = reader(temp_dir.path(), 1, 1);

        assert!(r.read_u32(SequenceNumber::new(3, 0)).is_err());
        assert!(
            !temp_dir
                .path()
                .join(crate::path::segment_file_name(SegmentKind::Data, 3))
                .exists()
        );
    }

    #[test]
    fn test_read_only_view_rejects_writes() {
        let temp_dir = TempDir::new().unwrap();
        writer(temp_dir.path(), 1, 1)
            .write(SequenceNumber::ZERO, &[b"x"])
            .unwrap();

        let mut r = reader(temp_dir.path(), 1, 1);
        let err = r.write(SequenceNumber::ZERO, &[b"y"]).unwrap_err();
        assert!(matches!(err, QueueError::ReadOnlyWindow { .. }));
    }
}
