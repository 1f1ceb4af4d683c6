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

use crate::dialect::InfluxQl;
use crate::dialect::Timescale;
use crate::testing::database::TestDatabase;
use crate::testing::store::MemStore;
use crate::TypeConfig;

/// A cache in front of an InfluxDB stand-in.
#[derive(Debug, Default)]
pub struct TestConfig;

impl TypeConfig for TestConfig {
    type Dialect = InfluxQl;
    type Store = MemStore;
    type Database = TestDatabase<InfluxQl>;
}

/// A cache in front of a TimescaleDB stand-in.
#[derive(Debug, Default)]
pub struct TimescaleTestConfig;

impl TypeConfig for TimescaleTestConfig {
    type Dialect = Timescale;
    type Store = MemStore;
    type Database = TestDatabase<Timescale>;
}
