use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::types::Timestamp;

/// Serializes a Timestamp as a [seconds, nanoseconds] array
pub fn serialize_timestamp<S>(time: &Timestamp, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    [time.seconds(), time.nanoseconds()].serialize(serializer)
}

/// Deserializes a Timestamp from a [seconds, nanoseconds] array
pub fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<Timestamp, D::Error>
where
    D: Deserializer<'de>,
{
    let [seconds, nanoseconds]: [u32; 2] = Deserialize::deserialize(deserializer)?;
    Timestamp::new(seconds, nanoseconds).map_err(D::Error::custom)
}
