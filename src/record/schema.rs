use super::error::{RecordError, RecordResult};
use super::record::Record;

/// Shape of the records in one heap file: how many fixed-width 4-byte
/// fields and how many variable-length fields each record carries.
///
/// This is all the record store needs to know; column names, types and
/// constraints live with the catalog, which also persists the schema.
/// The descriptor is supplied again on every `open`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordSchema {
    fixed_fields: usize,
    var_fields: usize,
}

impl RecordSchema {
    pub fn new(fixed_fields: usize, var_fields: usize) -> Self {
        Self {
            fixed_fields,
            var_fields,
        }
    }

    pub fn fixed_fields(&self) -> usize {
        self.fixed_fields
    }

    pub fn var_fields(&self) -> usize {
        self.var_fields
    }

    pub fn field_count(&self) -> usize {
        self.fixed_fields + self.var_fields
    }

    /// Bytes of the leading null bitmap (one bit per field, rounded up)
    pub fn null_bitmap_size(&self) -> usize {
        self.field_count().div_ceil(8)
    }

    /// Serialized size of a record with all var fields null
    pub fn min_record_size(&self) -> usize {
        self.null_bitmap_size() + 4 * self.fixed_fields
    }

    /// Check that a record has this schema's arity
    pub fn validate_record(&self, record: &Record) -> RecordResult<()> {
        if record.fixed_len() != self.fixed_fields || record.var_len() != self.var_fields {
            return Err(RecordError::SchemaMismatch(format!(
                "expected {} fixed + {} var fields, got {} + {}",
                self.fixed_fields,
                self.var_fields,
                record.fixed_len(),
                record.var_len()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derived_sizes() {
        let schema = RecordSchema::new(3, 2);
        assert_eq!(schema.field_count(), 5);
        assert_eq!(schema.null_bitmap_size(), 1);
        assert_eq!(schema.min_record_size(), 13);

        let wide = RecordSchema::new(7, 2);
        assert_eq!(wide.null_bitmap_size(), 2);
    }

    #[test]
    fn test_validate_record() {
        let schema = RecordSchema::new(2, 1);
        let good = Record::new(vec![Some(1), None], vec![Some("x".to_string())]);
        assert!(schema.validate_record(&good).is_ok());

        let bad = Record::new(vec![Some(1)], vec![]);
        assert!(matches!(
            schema.validate_record(&bad),
            Err(RecordError::SchemaMismatch(_))
        ));
    }
}
