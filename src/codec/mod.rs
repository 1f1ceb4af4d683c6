// Copyright 2021 Datafuse Labs
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Binary layout of cached rows and cache values.
//!
//! A row is a fixed-width concatenation of its columns:
//!
//! ```text
//! bool     1 byte
//! int64    8 bytes little-endian
//! float64  8 bytes little-endian IEEE-754
//! string   32 bytes UTF-8, zero padded, truncated when longer
//! ```
//!
//! A cache value frames one record per tag combination and ends with `\r\n`:
//!
//! ```text
//! <sub-segment-key> SP <flag:u8> [<start:i64> <end:i64> if flag=1] <len:i64> <rows[len]>
//! ...
//! \r\n
//! ```

mod entry;
mod rows;

pub use entry::decode_segment;
pub use entry::encode_segment;
pub use entry::CacheEntry;
pub use entry::SegmentRecord;
pub use entry::TERMINATOR;
pub use rows::decode_rows;
pub use rows::encode_rows;
pub use rows::encode_rows_into;
