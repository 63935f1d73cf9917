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

//! The schema/metadata tier: datasets and their versioned column records.
//!
//! Column records are stored with the type as its wire tag string and parsed
//! on every read, so the read path fails closed on tags this build does not
//! know, which is what a reader sees against a metadata tier written by a
//! newer or corrupted peer.

use std::collections::HashMap;

use parking_lot::RwLock;
use tracing::{debug, info};

use basalt_core::column::{Column, ColumnType};
use basalt_core::error::{BasaltError, Result};
use basalt_core::schema::Schema;
use basalt_core::value::IngestValue;

/// How a partition's rows are grouped into segments by key range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segmenting {
    /// Every row of a partition lands in segment `"0"`.
    Single,
    /// Numeric keys are bucketed into ranges of this width; the segment id
    /// is the bucket index.
    ByKeyWidth(u64),
}

impl Segmenting {
    /// The segment id holding `key`. Ids are formatted so that lexical
    /// order equals key-range order.
    pub fn segment_of(&self, key: &IngestValue) -> Result<String> {
        match self {
            Segmenting::Single => Ok("0".to_string()),
            Segmenting::ByKeyWidth(width) => {
                let value = match key {
                    IngestValue::Int(v) => *v as i64,
                    IngestValue::Long(v) => *v,
                    other => {
                        return Err(BasaltError::InvalidRow(format!(
                            "key {other} cannot be range-segmented; only numeric keys can"
                        )))
                    }
                };
                let bucket = value.div_euclid(*width as i64);
                Ok(format!("{:020}", (bucket as u64) ^ (1u64 << 63)))
            }
        }
    }
}

/// Dataset definition: routing configuration plus the key column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dataset {
    pub name: String,
    /// Column whose values key rows within a segment.
    pub key_column: String,
    pub key_type: ColumnType,
    /// Column whose (stringified) value routes a row to its partition.
    /// `None` routes everything through `default_partition_key`.
    pub partition_column: Option<String>,
    /// Fallback partition for rows with a null partition value.
    pub default_partition_key: Option<String>,
    pub segmenting: Segmenting,
}

impl Dataset {
    pub fn new(
        name: impl Into<String>,
        key_column: impl Into<String>,
        key_type: ColumnType,
    ) -> Self {
        Self {
            name: name.into(),
            key_column: key_column.into(),
            key_type,
            partition_column: None,
            default_partition_key: None,
            segmenting: Segmenting::Single,
        }
    }

    pub fn with_partition_column(mut self, column: impl Into<String>) -> Self {
        self.partition_column = Some(column.into());
        self
    }

    pub fn with_default_partition_key(mut self, key: impl Into<String>) -> Self {
        self.default_partition_key = Some(key.into());
        self
    }

    pub fn with_segmenting(mut self, segmenting: Segmenting) -> Self {
        self.segmenting = segmenting;
        self
    }
}

/// The metadata-store seam: datasets and append-only column records.
pub trait MetaStore: Send + Sync {
    /// Register a dataset. `AlreadyExists` on duplicate names.
    fn new_dataset(&self, dataset: Dataset) -> Result<()>;

    /// `NotFound` if the dataset was never created.
    fn get_dataset(&self, name: &str) -> Result<Dataset>;

    /// Remove a dataset and its column records. `NotFound` when absent.
    fn delete_dataset(&self, name: &str) -> Result<()>;

    /// Validate a proposed column against the dataset's current effective
    /// schema and append it. All violated rules are reported together.
    fn insert_column(&self, column: Column) -> Result<()>;

    /// The effective schema folded from every stored column with
    /// `version <= version_horizon`.
    fn get_schema(&self, dataset: &str, version_horizon: u32) -> Result<Schema>;
}

/// A column record as the metadata tier holds it: the type is a raw tag
/// string, parsed on read.
#[derive(Debug, Clone)]
struct ColumnRecord {
    name: String,
    dataset: String,
    version: u32,
    type_tag: String,
    serializer: String,
    is_deleted: bool,
    is_system: bool,
}

impl ColumnRecord {
    fn from_column(column: &Column) -> Self {
        Self {
            name: column.name.clone(),
            dataset: column.dataset.clone(),
            version: column.version,
            type_tag: column.column_type.tag().to_string(),
            serializer: column.serializer.clone(),
            is_deleted: column.is_deleted,
            is_system: column.is_system,
        }
    }

    /// Parse back into the typed model; unknown tags fail closed.
    fn to_column(&self) -> Result<Column> {
        let column_type = ColumnType::from_tag(&self.type_tag)?;
        let mut column = Column::new(
            self.name.clone(),
            self.dataset.clone(),
            self.version,
            column_type,
        );
        column.serializer = self.serializer.clone();
        column.is_deleted = self.is_deleted;
        column.is_system = self.is_system;
        Ok(column)
    }
}

#[derive(Debug, Default)]
struct MetaInner {
    datasets: HashMap<String, Dataset>,
    columns: HashMap<String, Vec<ColumnRecord>>,
}

/// In-memory reference implementation of [`MetaStore`].
#[derive(Debug, Default)]
pub struct MemMetaStore {
    inner: RwLock<MetaInner>,
}

impl MemMetaStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    fn insert_raw_record(&self, record: ColumnRecord) {
        self.inner
            .write()
            .columns
            .entry(record.dataset.clone())
            .or_default()
            .push(record);
    }
}

impl MetaStore for MemMetaStore {
    fn new_dataset(&self, dataset: Dataset) -> Result<()> {
        let mut inner = self.inner.write();
        if inner.datasets.contains_key(&dataset.name) {
            return Err(BasaltError::AlreadyExists(format!(
                "dataset '{}'",
                dataset.name
            )));
        }
        info!(dataset = %dataset.name, "creating dataset");
        inner.datasets.insert(dataset.name.clone(), dataset);
        Ok(())
    }

    fn get_dataset(&self, name: &str) -> Result<Dataset> {
        self.inner
            .read()
            .datasets
            .get(name)
            .cloned()
            .ok_or_else(|| BasaltError::NotFound(format!("dataset '{name}'")))
    }

    fn delete_dataset(&self, name: &str) -> Result<()> {
        let mut inner = self.inner.write();
        if inner.datasets.remove(name).is_none() {
            return Err(BasaltError::NotFound(format!("dataset '{name}'")));
        }
        inner.columns.remove(name);
        info!(dataset = %name, "deleted dataset");
        Ok(())
    }

    fn insert_column(&self, column: Column) -> Result<()> {
        let current = self.get_schema(&column.dataset, u32::MAX)?;
        let violations = column.validate(&current);
        if !violations.is_empty() {
            return Err(BasaltError::SchemaViolations(violations));
        }

        debug!(
            dataset = %column.dataset,
            column = %column.name,
            version = column.version,
            "inserting column"
        );
        self.inner
            .write()
            .columns
            .entry(column.dataset.clone())
            .or_default()
            .push(ColumnRecord::from_column(&column));
        Ok(())
    }

    fn get_schema(&self, dataset: &str, version_horizon: u32) -> Result<Schema> {
        let inner = self.inner.read();
        let records = match inner.columns.get(dataset) {
            Some(records) => records,
            None => return Ok(Schema::empty()),
        };
        let columns = records
            .iter()
            .filter(|r| r.version <= version_horizon)
            .map(|r| r.to_column())
            .collect::<Result<Vec<_>>>()?;
        Ok(Schema::fold(columns))
    }
}
