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

use std::path::PathBuf;

use crate::{Queue, QueueConfig, Result, header::QueueFlags, page::PageCount};

pub struct QueueBuilder {
    config: QueueConfig,
}

impl QueueBuilder {
    pub fn new<P: Into<PathBuf>>(base_path: P) -> Self {
        Self {
            config: QueueConfig {
                base_path: base_path.into(),
                ..Default::default()
            },
        }
    }

    pub fn data_segment_size(mut self, size: PageCount) -> Self {
        self.config.data_segment_size = size;
        self
    }

    pub fn index_segment_size(mut self, size: PageCount) -> Self {
        self.config.index_segment_size = size;
        self
    }

    pub fn store_size_in_index(mut self, store: bool) -> Self {
        self.set_flag(QueueFlags::STORE_SIZE, store);
        self
    }

    pub fn store_timestamp_in_index(mut self, store: bool) -> Self {
        self.set_flag(QueueFlags::STORE_TIMESTAMP, store);
        self
    }

    pub fn max_data_segments(mut self, max: u16) -> Self {
        self.config.max_data_segments = max;
        self
    }

    pub fn write_ahead_segments(mut self, count: u16) -> Self {
        self.config.write_ahead_segments = count;
        self
    }

    pub fn head_size(mut self, size: PageCount) -> Self {
        self.config.head_size = size;
        self
    }

    /// Create a new queue. Fails if one already exists at the path.
    pub fn create(self) -> Result<Queue> { Queue::create(self.config) }

    /// Open the existing queue at the path. Creation settings are ignored;
    /// they come from the head file.
    pub fn open(self) -> Result<Queue> { Queue::open(self.config.base_path) }

    fn set_flag(&mut self, flag: QueueFlags, on: bool) {
        let bits = if on {
            self.config.flags.bits() | flag.bits()
        } else {
            self.config.flags.bits() & !flag.bits()
        };
        self.config.flags = QueueFlags::from_bits_truncate(bits);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_default_config() {
        let builder = QueueBuilder::new("/tmp/test_queue");
        assert_eq!(builder.config.base_path, PathBuf::from("/tmp/test_queue"));
        assert_eq!(builder.config.data_segment_size.pages(), 2560);
        assert_eq!(builder.config.index_segment_size.pages(), 2560);
        assert_eq!(builder.config.flags, QueueFlags::empty());
        assert_eq!(builder.config.max_data_segments, 0);
    }

    #[test]
    fn test_builder_custom_config() {
        let builder = QueueBuilder::new("/tmp/test_queue")
            .data_segment_size(PageCount::new(1))
            .index_segment_size(PageCount::new(2))
            .store_size_in_index(true)
            .store_timestamp_in_index(true)
            .store_size_in_index(false)
            .max_data_segments(16)
            .write_ahead_segments(2)
            .head_size(PageCount::new(8));

        assert_eq!(builder.config.data_segment_size.pages(), 1);
        assert_eq!(builder.config.index_segment_size.pages(), 2);
        assert_eq!(builder.config.flags, QueueFlags::STORE_TIMESTAMP);
        assert_eq!(builder.config.max_data_segments, 16);
        assert_eq!(builder.config.write_ahead_segments, 2);
        assert_eq!(builder.config.head_size.pages(), 8);
    }
}
