//! Serialize connection ids as JSON strings; clients treat them as opaque handles.

use serde::{Serialize, Serializer};

pub fn serialize<S>(value: &u64, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    value.to_string().serialize(serializer)
}
