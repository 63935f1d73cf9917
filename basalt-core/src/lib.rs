// Copyright 2025 Sushanth (https://github.com/sushanthpy)
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

//! Basalt Core
//!
//! Shared data model for the basalt columnar segment store:
//!
//! - **Columns and schemas** (`column`, `schema`): versioned column
//!   definitions folded into an effective schema, with rule-based validation
//!   of proposed changes.
//! - **Key encoding** (`keycode`): order-preserving byte encodings so that
//!   encoded keys compare bytewise in value order.
//! - **Ingest values** (`value`): the typed cell model rows are made of.
//! - **Packed vector codec** (`vector`): the built-in column-vector
//!   serializer (validity bitmap + payload).
//! - **Wire helpers** (`wire`): big-endian primitives shared by every
//!   persisted format in the workspace.
//!
//! All persisted formats in this workspace are big-endian with
//! length-prefixed UTF-8 strings; see the `wire` module.

pub mod column;
pub mod error;
pub mod keycode;
pub mod schema;
pub mod value;
pub mod vector;
pub mod wire;

pub use column::{Column, ColumnType, SchemaViolation, DEFAULT_SERIALIZER};
pub use error::{BasaltError, Result};
pub use schema::Schema;
pub use value::IngestValue;
pub use vector::{ValidityBitmap, ValueVector};
