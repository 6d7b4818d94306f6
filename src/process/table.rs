use anyhow::{anyhow, Context, Result};
use arrow::{
    array::ArrayRef,
    datatypes::{DataType, Field, Schema, SchemaRef},
    record_batch::RecordBatch,
};
use std::sync::Arc;

use super::RebaseMode;

/// A loaded table: one record batch plus the rebase mode it was read under.
#[derive(Debug, Clone)]
pub struct Table {
    batch: RecordBatch,
    rebase: RebaseMode,
}

impl Table {
    pub fn new(batch: RecordBatch, rebase: RebaseMode) -> Self {
        Self { batch, rebase }
    }

    pub fn batch(&self) -> &RecordBatch {
        &self.batch
    }

    pub fn into_batch(self) -> RecordBatch {
        self.batch
    }

    pub fn schema(&self) -> SchemaRef {
        self.batch.schema()
    }

    pub fn rebase(&self) -> RebaseMode {
        self.rebase
    }

    pub fn num_rows(&self) -> usize {
        self.batch.num_rows()
    }

    pub fn column_names(&self) -> Vec<String> {
        self.batch
            .schema()
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .collect()
    }

    pub fn column(&self, name: &str) -> Option<&ArrayRef> {
        self.batch.column_by_name(name)
    }

    pub fn data_type(&self, name: &str) -> Option<DataType> {
        self.column(name).map(|c| c.data_type().clone())
    }

    /// Replace column `name` in place with `array`; the field takes the array's type.
    pub fn with_column(self, name: &str, array: ArrayRef) -> Result<Table> {
        let schema = self.batch.schema();
        let idx = schema
            .index_of(name)
            .map_err(|_| anyhow!("no column named `{}`", name))?;

        let mut fields: Vec<Field> = schema.fields().iter().map(|f| f.as_ref().clone()).collect();
        fields[idx] = Field::new(name, array.data_type().clone(), true);

        let mut columns: Vec<ArrayRef> = self.batch.columns().to_vec();
        columns[idx] = array;

        let batch = RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)
            .with_context(|| format!("replacing column `{}`", name))?;
        Ok(Table {
            batch,
            rebase: self.rebase,
        })
    }
}
