use super::PAGE_SLOT_CAPACITY;
use super::error::{RecordError, RecordResult};
use super::schema::RecordSchema;
use crate::file::PageId;

/// Slot identifier within a page
pub type SlotId = usize;

/// Physical identifier for a record (page + slot)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordId {
    pub page_id: PageId,
    pub slot_id: SlotId,
}

impl RecordId {
    pub fn new(page_id: PageId, slot_id: SlotId) -> Self {
        Self { page_id, slot_id }
    }

    /// Single-integer form of the locator, the value an index stores
    pub fn to_locator(self) -> i32 {
        (self.page_id * PAGE_SLOT_CAPACITY + self.slot_id) as i32
    }

    pub fn from_locator(locator: i32) -> Self {
        let locator = locator as usize;
        Self {
            page_id: locator / PAGE_SLOT_CAPACITY,
            slot_id: locator % PAGE_SLOT_CAPACITY,
        }
    }
}

/// A single record: fixed-width 4-byte fields followed by
/// variable-length string fields, any of which may be NULL.
///
/// Fixed fields are raw words; a float column travels as its `f32` bit
/// pattern through the same word (see `set_float`/`get_float`). The
/// store never interprets the words, only the catalog does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    fixed: Vec<Option<i32>>,
    vars: Vec<Option<String>>,
}

impl Record {
    pub fn new(fixed: Vec<Option<i32>>, vars: Vec<Option<String>>) -> Self {
        Self { fixed, vars }
    }

    /// An all-NULL record of the given shape
    pub fn nulls(schema: &RecordSchema) -> Self {
        Self {
            fixed: vec![None; schema.fixed_fields()],
            vars: vec![None; schema.var_fields()],
        }
    }

    pub fn fixed_len(&self) -> usize {
        self.fixed.len()
    }

    pub fn var_len(&self) -> usize {
        self.vars.len()
    }

    pub fn get_int(&self, idx: usize) -> Option<i32> {
        self.fixed[idx]
    }

    pub fn set_int(&mut self, idx: usize, value: Option<i32>) {
        self.fixed[idx] = value;
    }

    /// Read a fixed field as a float (reinterprets the stored word)
    pub fn get_float(&self, idx: usize) -> Option<f32> {
        self.fixed[idx].map(|w| f32::from_bits(w as u32))
    }

    pub fn set_float(&mut self, idx: usize, value: Option<f32>) {
        self.fixed[idx] = value.map(|f| f.to_bits() as i32);
    }

    pub fn get_string(&self, idx: usize) -> Option<&str> {
        self.vars[idx].as_deref()
    }

    pub fn set_string(&mut self, idx: usize, value: Option<String>) {
        self.vars[idx] = value;
    }

    /// Serialized byte length under `schema`
    pub fn serialized_size(&self, schema: &RecordSchema) -> usize {
        let var_bytes: usize = self
            .vars
            .iter()
            .flatten()
            .map(|s| 2 + s.len())
            .sum();
        schema.min_record_size() + var_bytes
    }

    /// Serialize to the wire layout: null bitmap (fixed fields first,
    /// then var fields), every fixed word, then `(len: u16, bytes)` for
    /// each non-null var field.
    pub fn serialize(&self, schema: &RecordSchema) -> RecordResult<Vec<u8>> {
        schema.validate_record(self)?;

        let mut out = Vec::with_capacity(self.serialized_size(schema));

        let mut bitmap = vec![0u8; schema.null_bitmap_size()];
        for (i, field) in self.fixed.iter().enumerate() {
            if field.is_none() {
                bitmap[i / 8] |= 1 << (i % 8);
            }
        }
        for (j, field) in self.vars.iter().enumerate() {
            let i = self.fixed.len() + j;
            if field.is_none() {
                bitmap[i / 8] |= 1 << (i % 8);
            }
        }
        out.extend_from_slice(&bitmap);

        for field in &self.fixed {
            out.extend_from_slice(&field.unwrap_or(0).to_le_bytes());
        }

        for field in self.vars.iter().flatten() {
            if field.len() > u16::MAX as usize {
                return Err(RecordError::InvalidRecord(format!(
                    "string field of {} bytes exceeds the u16 length prefix",
                    field.len()
                )));
            }
            out.extend_from_slice(&(field.len() as u16).to_le_bytes());
            out.extend_from_slice(field.as_bytes());
        }

        Ok(out)
    }

    /// Deserialize a record from the front of `data`; trailing bytes
    /// (the rest of the page) are ignored.
    pub fn deserialize(data: &[u8], schema: &RecordSchema) -> RecordResult<Self> {
        let bitmap_size = schema.null_bitmap_size();
        if data.len() < schema.min_record_size() {
            return Err(RecordError::Deserialization(format!(
                "record truncated: {} bytes, need at least {}",
                data.len(),
                schema.min_record_size()
            )));
        }

        let bitmap = &data[..bitmap_size];
        let is_null = |i: usize| bitmap[i / 8] & (1 << (i % 8)) != 0;

        let mut offset = bitmap_size;
        let mut fixed = Vec::with_capacity(schema.fixed_fields());
        for i in 0..schema.fixed_fields() {
            let word = i32::from_le_bytes(data[offset..offset + 4].try_into().unwrap());
            fixed.push(if is_null(i) { None } else { Some(word) });
            offset += 4;
        }

        let mut vars = Vec::with_capacity(schema.var_fields());
        for j in 0..schema.var_fields() {
            if is_null(schema.fixed_fields() + j) {
                vars.push(None);
                continue;
            }
            if data.len() < offset + 2 {
                return Err(RecordError::Deserialization(
                    "record truncated in string length".to_string(),
                ));
            }
            let len = u16::from_le_bytes(data[offset..offset + 2].try_into().unwrap()) as usize;
            offset += 2;
            if data.len() < offset + len {
                return Err(RecordError::Deserialization(
                    "record truncated in string body".to_string(),
                ));
            }
            let text = std::str::from_utf8(&data[offset..offset + len])
                .map_err(|e| RecordError::Deserialization(e.to_string()))?;
            vars.push(Some(text.to_string()));
            offset += len;
        }

        Ok(Self { fixed, vars })
    }

    /// Byte length of the serialized record at the front of `data`,
    /// without materializing it. Used to walk payloads during the
    /// open-time scan and update fit checks.
    pub fn measure(data: &[u8], schema: &RecordSchema) -> RecordResult<usize> {
        let bitmap_size = schema.null_bitmap_size();
        if data.len() < schema.min_record_size() {
            return Err(RecordError::Deserialization(
                "record truncated".to_string(),
            ));
        }
        let bitmap = &data[..bitmap_size];
        let mut offset = schema.min_record_size();
        for j in 0..schema.var_fields() {
            let i = schema.fixed_fields() + j;
            if bitmap[i / 8] & (1 << (i % 8)) != 0 {
                continue;
            }
            if data.len() < offset + 2 {
                return Err(RecordError::Deserialization(
                    "record truncated in string length".to_string(),
                ));
            }
            let len = u16::from_le_bytes(data[offset..offset + 2].try_into().unwrap()) as usize;
            offset += 2 + len;
        }
        if data.len() < offset {
            return Err(RecordError::Deserialization(
                "record truncated in string body".to_string(),
            ));
        }
        Ok(offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_schema() -> RecordSchema {
        RecordSchema::new(2, 2)
    }

    #[test]
    fn test_locator_round_trip() {
        let rid = RecordId::new(17, 342);
        let locator = rid.to_locator();
        assert_eq!(RecordId::from_locator(locator), rid);

        assert_eq!(RecordId::new(0, 0).to_locator(), 0);
        assert_eq!(
            RecordId::from_locator(RecordId::new(3, 0).to_locator()),
            RecordId::new(3, 0)
        );
    }

    #[test]
    fn test_serialize_round_trip() {
        let schema = test_schema();
        let record = Record::new(
            vec![Some(42), Some(-7)],
            vec![Some("hello".to_string()), Some("".to_string())],
        );

        let bytes = record.serialize(&schema).unwrap();
        assert_eq!(bytes.len(), record.serialized_size(&schema));
        assert_eq!(Record::deserialize(&bytes, &schema).unwrap(), record);
    }

    #[test]
    fn test_null_bits() {
        let schema = test_schema();
        let record = Record::new(vec![Some(1), None], vec![None, Some("x".to_string())]);

        let bytes = record.serialize(&schema).unwrap();
        // bit 1 (second fixed) and bit 2 (first var) set
        assert_eq!(bytes[0], 0b0000_0110);
        assert_eq!(Record::deserialize(&bytes, &schema).unwrap(), record);
    }

    #[test]
    fn test_all_null_record() {
        let schema = test_schema();
        let record = Record::nulls(&schema);
        let bytes = record.serialize(&schema).unwrap();
        assert_eq!(bytes.len(), schema.min_record_size());
        assert_eq!(Record::deserialize(&bytes, &schema).unwrap(), record);
    }

    #[test]
    fn test_float_round_trip() {
        let schema = RecordSchema::new(1, 0);
        let mut record = Record::nulls(&schema);
        record.set_float(0, Some(3.25));

        let bytes = record.serialize(&schema).unwrap();
        let back = Record::deserialize(&bytes, &schema).unwrap();
        assert_eq!(back.get_float(0), Some(3.25));
    }

    #[test]
    fn test_deserialize_ignores_trailing_bytes() {
        let schema = test_schema();
        let record = Record::new(
            vec![Some(5), Some(6)],
            vec![Some("ab".to_string()), None],
        );
        let mut bytes = record.serialize(&schema).unwrap();
        let exact = bytes.len();
        bytes.extend_from_slice(&[0xAA; 32]);

        assert_eq!(Record::deserialize(&bytes, &schema).unwrap(), record);
        assert_eq!(Record::measure(&bytes, &schema).unwrap(), exact);
    }

    #[test]
    fn test_measure_matches_serialized_size() {
        let schema = RecordSchema::new(3, 3);
        let record = Record::new(
            vec![Some(1), None, Some(3)],
            vec![Some("long string here".to_string()), None, Some("y".to_string())],
        );
        let bytes = record.serialize(&schema).unwrap();
        assert_eq!(Record::measure(&bytes, &schema).unwrap(), bytes.len());
    }

    #[test]
    fn test_deserialize_truncated() {
        let schema = test_schema();
        let record = Record::new(
            vec![Some(5), Some(6)],
            vec![Some("abcdef".to_string()), None],
        );
        let bytes = record.serialize(&schema).unwrap();
        let result = Record::deserialize(&bytes[..bytes.len() - 2], &schema);
        assert!(matches!(result, Err(RecordError::Deserialization(_))));
    }
}
