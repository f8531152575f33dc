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

//! Page-granular sizes.
//!
//! Segment capacities, window bounds and the head file size are all expressed
//! in whole pages so every mapping starts on a page boundary.

use std::ops::Add;

use serde::{Deserialize, Serialize};

/// Size of one page in bytes.
pub const PAGE_SIZE: u64 = 4096;

/// A number of [`PAGE_SIZE`] pages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PageCount(u32);

impl PageCount {
    pub const fn new(pages: u32) -> Self { Self(pages) }

    pub const fn pages(self) -> u32 { self.0 }

    pub const fn bytes(self) -> u64 { self.0 as u64 * PAGE_SIZE }

    /// The page holding byte `offset`, i.e. `offset` rounded down to a page.
    #[allow(clippy::cast_possible_truncation)]
    pub const fn containing(offset: u64) -> Self { Self((offset / PAGE_SIZE) as u32) }

    /// The smallest page count covering `bytes` bytes.
    #[allow(clippy::cast_possible_truncation)]
    pub const fn covering(bytes: u64) -> Self { Self(bytes.div_ceil(PAGE_SIZE) as u32) }

    /// Round up so the byte size is an exact multiple of `width`.
    ///
    /// Index segments are sized with this so a segment never ends in a tail too
    /// short to hold one more record.
    #[must_use]
    pub const fn aligned_to(self, width: u64) -> Self {
        if width == 0 || self.bytes() % width == 0 {
            return self;
        }
        let mut pages = self.0;
        while (pages as u64 * PAGE_SIZE) % width != 0 {
            pages += 1;
        }
        Self(pages)
    }
}

impl Add for PageCount {
    type Output = Self;

    fn add(self, rhs: Self) -> Self { Self(self.0 + rhs.0) }
}

impl Add<u32> for PageCount {
    type Output = Self;

    fn add(self, rhs: u32) -> Self { Self(self.0 + rhs) }
}

impl From<u32> for PageCount {
    fn from(pages: u32) -> Self { Self(pages) }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test]
    fn test_bytes() {
        assert_eq!(PageCount::new(0).bytes(), 0);
        assert_eq!(PageCount::new(1).bytes(), 4096);
        assert_eq!(PageCount::new(2560).bytes(), 10 * 1024 * 1024);
    }

    #[test_case(0, 0 ; "zero")]
    #[test_case(4095, 0 ; "last byte of first page")]
    #[test_case(4096, 1 ; "first byte of second page")]
    #[test_case(10_000, 2 ; "inside third page")]
    fn test_containing(offset: u64, page: u32) {
        assert_eq!(PageCount::containing(offset).pages(), page);
    }

    #[test_case(0, 0 ; "nothing")]
    #[test_case(1, 1 ; "one byte")]
    #[test_case(4096, 1 ; "exact page")]
    #[test_case(4097, 2 ; "spills over")]
    fn test_covering(bytes: u64, pages: u32) {
        assert_eq!(PageCount::covering(bytes).pages(), pages);
    }

    #[test_case(8, 10, 10 ; "eight divides every page")]
    #[test_case(16, 10, 10 ; "sixteen divides every page")]
    #[test_case(12, 10, 12 ; "twelve needs multiples of three")]
    #[test_case(20, 10, 10 ; "twenty needs multiples of five")]
    #[test_case(20, 11, 15 ; "twenty rounds up to fifteen")]
    fn test_aligned_to(width: u64, pages: u32, expected: u32) {
        let aligned = PageCount::new(pages).aligned_to(width);
        assert_eq!(aligned.pages(), expected);
        assert_eq!(aligned.bytes() % width, 0);
    }

    #[test]
    fn test_add() {
        assert_eq!(PageCount::new(3) + PageCount::new(4), PageCount::new(7));
        assert_eq!(PageCount::new(3) + 2, PageCount::new(5));
    }
}
