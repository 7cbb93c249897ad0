//! Tuple serialization: `null_bitmap ‖ fixed_area ‖ variable_area`.

use log::trace;

use crate::common::Rid;
use crate::error::{DbResult, Status};
use crate::transaction::VersionMeta;

use super::schema::Schema;
use super::value::{TypeId, Value};

/// Bytes occupied by a serialized `VersionMeta`: `created_by`(8) +
/// `deleted_by`(8, `0` = none) + `begin_ts`(8) + `end_ts`(8).
const VERSION_META_SIZE: usize = 32;

fn encode_version(v: &VersionMeta) -> [u8; VERSION_META_SIZE] {
    let mut out = [0u8; VERSION_META_SIZE];
    out[0..8].copy_from_slice(&v.created_by.to_le_bytes());
    out[8..16].copy_from_slice(&v.deleted_by.unwrap_or(0).to_le_bytes());
    out[16..24].copy_from_slice(&v.begin_ts.to_le_bytes());
    out[24..32].copy_from_slice(&v.end_ts.to_le_bytes());
    out
}

fn decode_version(bytes: &[u8]) -> VersionMeta {
    let created_by = u64::from_le_bytes(bytes[0..8].try_into().unwrap());
    let deleted_raw = u64::from_le_bytes(bytes[8..16].try_into().unwrap());
    let begin_ts = u64::from_le_bytes(bytes[16..24].try_into().unwrap());
    let end_ts = u64::from_le_bytes(bytes[24..32].try_into().unwrap());
    VersionMeta {
        created_by,
        deleted_by: if deleted_raw == 0 { None } else { Some(deleted_raw) },
        begin_ts,
        end_ts,
    }
}

/// A decoded row, optionally carrying the RID it was read from, plus the
/// MVCC version metadata it was stored with.
#[derive(Debug, Clone)]
pub struct Tuple {
    pub values: Vec<Value>,
    pub rid: Rid,
    pub version: VersionMeta,
}

impl Tuple {
    pub fn new(values: Vec<Value>) -> Tuple {
        Tuple {
            values,
            rid: Rid::invalid(),
            version: VersionMeta::default(),
        }
    }

    pub fn with_rid(values: Vec<Value>, rid: Rid) -> Tuple {
        Tuple {
            values,
            rid,
            version: VersionMeta::default(),
        }
    }

    pub fn get(&self, index: usize) -> &Value {
        &self.values[index]
    }

    fn bit_set(bitmap: &mut [u8], i: usize) {
        bitmap[i / 8] |= 1 << (i % 8);
    }

    fn bit_get(bitmap: &[u8], i: usize) -> bool {
        (bitmap[i / 8] & (1 << (i % 8))) != 0
    }

    /// Serializes this tuple against `schema`. Null columns still reserve
    /// their fixed-area slot so offsets stay statically computable.
    pub fn serialize(&self, schema: &Schema) -> DbResult<Vec<u8>> {
        if self.values.len() != schema.len() {
            return Err(Status::invalid_argument(format!(
                "tuple has {} values, schema expects {}",
                self.values.len(),
                schema.len()
            )));
        }

        let mut bitmap = vec![0u8; schema.null_bitmap_bytes()];
        let mut fixed = vec![0u8; schema.fixed_area_size()];
        let mut variable = Vec::new();

        for (i, col) in schema.columns.iter().enumerate() {
            let value = &self.values[i];
            if value.is_null() {
                Self::bit_set(&mut bitmap, i);
                continue;
            }
            if col.type_id.is_variable_length() {
                let s = value.as_str().ok_or_else(|| {
                    Status::invalid_argument(format!("column {} expects VARCHAR", col.name))
                })?;
                let bytes = s.as_bytes();
                if bytes.len() > u16::MAX as usize {
                    return Err(Status::invalid_argument("varchar exceeds u16 length"));
                }
                variable.extend_from_slice(&(bytes.len() as u16).to_le_bytes());
                variable.extend_from_slice(bytes);
            } else {
                let off = schema.fixed_offset(i);
                let width = col.type_id.fixed_size();
                encode_fixed(value, col.type_id, &mut fixed[off..off + width])?;
            }
        }

        trace!(
            "serialize tuple: version={}B bitmap={}B fixed={}B var={}B",
            VERSION_META_SIZE,
            bitmap.len(),
            fixed.len(),
            variable.len()
        );

        let mut out = Vec::with_capacity(VERSION_META_SIZE + bitmap.len() + fixed.len() + variable.len());
        out.extend_from_slice(&encode_version(&self.version));
        out.extend_from_slice(&bitmap);
        out.extend_from_slice(&fixed);
        out.extend_from_slice(&variable);
        Ok(out)
    }

    /// Decodes a tuple from `bytes` according to `schema`. To locate
    /// variable column `k`, scans only the variable columns before it
    /// (spec §3 Tuple).
    pub fn deserialize(bytes: &[u8], schema: &Schema) -> DbResult<Tuple> {
        if bytes.len() < VERSION_META_SIZE {
            return Err(Status::corruption("tuple buffer shorter than version header"));
        }
        let version = decode_version(&bytes[..VERSION_META_SIZE]);
        let bytes = &bytes[VERSION_META_SIZE..];

        let bitmap_len = schema.null_bitmap_bytes();
        if bytes.len() < bitmap_len {
            return Err(Status::corruption("tuple buffer shorter than null bitmap"));
        }
        let bitmap = &bytes[..bitmap_len];
        let fixed_start = bitmap_len;
        let fixed_len = schema.fixed_area_size();
        if bytes.len() < fixed_start + fixed_len {
            return Err(Status::corruption("tuple buffer shorter than fixed area"));
        }
        let fixed = &bytes[fixed_start..fixed_start + fixed_len];
        let var_area = &bytes[fixed_start + fixed_len..];

        let mut values = Vec::with_capacity(schema.len());
        let mut var_cursor = 0usize;

        for (i, col) in schema.columns.iter().enumerate() {
            let is_null = Self::bit_get(bitmap, i);
            if col.type_id.is_variable_length() {
                // Variable columns are stored in schema order, so a
                // sequential decode only needs a running cursor rather than
                // re-scanning from the start for each column.
                if is_null {
                    values.push(Value::Null(col.type_id));
                    continue;
                }
                if var_area.len() < var_cursor + 2 {
                    return Err(Status::corruption("truncated varchar length prefix"));
                }
                let len = u16::from_le_bytes([var_area[var_cursor], var_area[var_cursor + 1]])
                    as usize;
                var_cursor += 2;
                if var_area.len() < var_cursor + len {
                    return Err(Status::corruption("truncated varchar payload"));
                }
                let s = String::from_utf8(var_area[var_cursor..var_cursor + len].to_vec())
                    .map_err(|e| Status::corruption(e.to_string()))?;
                var_cursor += len;
                values.push(Value::Varchar(s));
            } else {
                if is_null {
                    values.push(Value::Null(col.type_id));
                    continue;
                }
                let off = schema.fixed_offset(i);
                let width = col.type_id.fixed_size();
                values.push(decode_fixed(&fixed[off..off + width], col.type_id)?);
            }
        }

        Ok(Tuple { values, rid: Rid::invalid(), version })
    }
}

fn encode_fixed(value: &Value, type_id: TypeId, out: &mut [u8]) -> DbResult<()> {
    match type_id {
        TypeId::Boolean => out[0] = if value.as_bool().unwrap_or(false) { 1 } else { 0 },
        TypeId::TinyInt => out[0] = value.as_i64().unwrap_or(0) as i8 as u8,
        TypeId::SmallInt => out.copy_from_slice(&(value.as_i64().unwrap_or(0) as i16).to_le_bytes()),
        TypeId::Integer => out.copy_from_slice(&(value.as_i64().unwrap_or(0) as i32).to_le_bytes()),
        TypeId::BigInt | TypeId::Timestamp | TypeId::Decimal => {
            out.copy_from_slice(&value.as_i64().unwrap_or(0).to_le_bytes())
        }
        TypeId::Float => out.copy_from_slice(&(value.as_f64().unwrap_or(0.0) as f32).to_le_bytes()),
        TypeId::Double => out.copy_from_slice(&value.as_f64().unwrap_or(0.0).to_le_bytes()),
        TypeId::Varchar => return Err(Status::internal("varchar is not fixed-width")),
    }
    Ok(())
}

fn decode_fixed(bytes: &[u8], type_id: TypeId) -> DbResult<Value> {
    Ok(match type_id {
        TypeId::Boolean => Value::Boolean(bytes[0] != 0),
        TypeId::TinyInt => Value::TinyInt(bytes[0] as i8),
        TypeId::SmallInt => Value::SmallInt(i16::from_le_bytes(bytes.try_into().unwrap())),
        TypeId::Integer => Value::Integer(i32::from_le_bytes(bytes.try_into().unwrap())),
        TypeId::BigInt => Value::BigInt(i64::from_le_bytes(bytes.try_into().unwrap())),
        TypeId::Float => Value::Float(f32::from_le_bytes(bytes.try_into().unwrap())),
        TypeId::Double => Value::Double(f64::from_le_bytes(bytes.try_into().unwrap())),
        TypeId::Timestamp => Value::Timestamp(i64::from_le_bytes(bytes.try_into().unwrap())),
        TypeId::Decimal => Value::Decimal(i64::from_le_bytes(bytes.try_into().unwrap())),
        TypeId::Varchar => return Err(Status::internal("varchar is not fixed-width")),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tuple::schema::Column;

    fn schema() -> Schema {
        Schema::new(vec![
            Column::new("id", TypeId::Integer),
            Column::new("name", TypeId::Varchar),
            Column::new("score", TypeId::Double),
        ])
    }

    #[test]
    fn round_trip() {
        let schema = schema();
        let tuple = Tuple::new(vec![
            Value::Integer(42),
            Value::Varchar("hello".to_string()),
            Value::Double(3.5),
        ]);
        let bytes = tuple.serialize(&schema).unwrap();
        let decoded = Tuple::deserialize(&bytes, &schema).unwrap();
        assert_eq!(decoded.get(0).as_i64(), Some(42));
        assert_eq!(decoded.get(1).as_str(), Some("hello"));
        assert_eq!(decoded.get(2).as_f64(), Some(3.5));
    }

    #[test]
    fn nulls_round_trip_and_reserve_fixed_slot() {
        let schema = schema();
        let tuple = Tuple::new(vec![
            Value::Null(TypeId::Integer),
            Value::Null(TypeId::Varchar),
            Value::Double(1.0),
        ]);
        let bytes = tuple.serialize(&schema).unwrap();
        assert_eq!(bytes.len(), VERSION_META_SIZE + 1 + (4 + 8) + 0);
        let decoded = Tuple::deserialize(&bytes, &schema).unwrap();
        assert!(decoded.get(0).is_null());
        assert!(decoded.get(1).is_null());
        assert_eq!(decoded.get(2).as_f64(), Some(1.0));
    }

    #[test]
    fn version_metadata_round_trips() {
        let schema = schema();
        let mut tuple = Tuple::new(vec![Value::Integer(1), Value::Varchar("x".into()), Value::Double(0.0)]);
        tuple.version = VersionMeta::init_version(7);
        let bytes = tuple.serialize(&schema).unwrap();
        let decoded = Tuple::deserialize(&bytes, &schema).unwrap();
        assert_eq!(decoded.version.created_by, 7);
        assert_eq!(decoded.version.begin_ts, 0);
    }

    #[test]
    fn multiple_varchars_decode_in_order() {
        let schema = Schema::new(vec![
            Column::new("a", TypeId::Varchar),
            Column::new("b", TypeId::Varchar),
        ]);
        let tuple = Tuple::new(vec![
            Value::Varchar("foo".into()),
            Value::Varchar("barbaz".into()),
        ]);
        let bytes = tuple.serialize(&schema).unwrap();
        let decoded = Tuple::deserialize(&bytes, &schema).unwrap();
        assert_eq!(decoded.get(0).as_str(), Some("foo"));
        assert_eq!(decoded.get(1).as_str(), Some("barbaz"));
    }
}
