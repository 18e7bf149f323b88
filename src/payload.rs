//! Realtime-data payloads for the growth workload.
//!
//! The payload is a fixed-cardinality `u32 -> i64` map stored under the
//! `RT_DATA` key. Encoding walks the map in key order, so the same map
//! always produces the same bytes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Key the value map is stored under
pub const RT_DATA_KEY: &str = "RT_DATA";

/// Number of entries in the default payload map
pub const DEFAULT_PAYLOAD_ENTRIES: u32 = 10_000;

/// Shape of the initial payload and how it evolves per iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PayloadShape {
    /// Number of map entries (keys `0..entries`)
    pub entries: u32,
    /// Value every entry starts at
    pub initial_value: i64,
    /// Amount added to every value per iteration
    pub step: i64,
}

impl Default for PayloadShape {
    fn default() -> Self {
        Self {
            entries: DEFAULT_PAYLOAD_ENTRIES,
            initial_value: 0,
            step: 1,
        }
    }
}

/// The logical payload: a map of realtime values
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RealtimeData {
    values: BTreeMap<u32, i64>,
}

impl RealtimeData {
    pub fn new(shape: &PayloadShape) -> Self {
        let values = (0..shape.entries)
            .map(|key| (key, shape.initial_value))
            .collect();
        Self { values }
    }

    /// Adds `step` to every value
    pub fn advance(&mut self, step: i64) {
        for value in self.values.values_mut() {
            *value = value.wrapping_add(step);
        }
    }

    pub fn get(&self, key: u32) -> Option<i64> {
        self.values.get(&key).copied()
    }

    pub fn values(&self) -> impl Iterator<Item = (u32, i64)> + '_ {
        self.values.iter().map(|(key, value)| (*key, *value))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Serialize to the binary payload format:
    /// [tag len u8][tag][entry count varint] then per entry
    /// [key varint][zigzag value varint]
    pub fn encode(&self) -> Vec<u8> {
        let mut buffer = Vec::with_capacity(16 + self.values.len() * 4);

        buffer.push(RT_DATA_KEY.len() as u8);
        buffer.extend_from_slice(RT_DATA_KEY.as_bytes());
        put_varint(&mut buffer, self.values.len() as u64);

        for (key, value) in &self.values {
            put_varint(&mut buffer, *key as u64);
            put_varint(&mut buffer, zigzag(*value));
        }

        buffer
    }

    /// Deserialize from the binary payload format
    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut cursor = 0;

        let tag_len = *data
            .first()
            .ok_or_else(|| Error::Other("Empty payload".to_string()))? as usize;
        cursor += 1;
        if cursor + tag_len > data.len() {
            return Err(Error::Other(
                "Unexpected end of payload reading tag".to_string(),
            ));
        }
        if &data[cursor..cursor + tag_len] != RT_DATA_KEY.as_bytes() {
            return Err(Error::Other(format!(
                "Payload tag is not {RT_DATA_KEY}: {}",
                String::from_utf8_lossy(&data[cursor..cursor + tag_len])
            )));
        }
        cursor += tag_len;

        let count = get_varint(data, &mut cursor)?;
        let mut values = BTreeMap::new();
        for _ in 0..count {
            let key = get_varint(data, &mut cursor)?;
            let key = u32::try_from(key)
                .map_err(|_| Error::Other(format!("Payload key {key} out of range")))?;
            let value = unzigzag(get_varint(data, &mut cursor)?);
            values.insert(key, value);
        }

        if cursor != data.len() {
            return Err(Error::Other(format!(
                "{} trailing bytes after payload",
                data.len() - cursor
            )));
        }
        Ok(Self { values })
    }
}

/// Deterministic stream of serialized payloads.
///
/// Each `next` advances every value by the shape's step and yields the
/// encoded map; two workloads built from the same shape yield identical
/// byte sequences.
#[derive(Debug, Clone)]
pub struct Workload {
    data: RealtimeData,
    step: i64,
}

impl Workload {
    pub fn new(shape: &PayloadShape) -> Self {
        Self {
            data: RealtimeData::new(shape),
            step: shape.step,
        }
    }

    /// Encoding of the current map, before any advance
    pub fn current_payload(&self) -> Vec<u8> {
        self.data.encode()
    }

    /// Advances the map one iteration and returns its encoding
    pub fn next_payload(&mut self) -> Vec<u8> {
        self.data.advance(self.step);
        self.data.encode()
    }

    pub fn data(&self) -> &RealtimeData {
        &self.data
    }
}

impl Iterator for Workload {
    type Item = Vec<u8>;

    fn next(&mut self) -> Option<Vec<u8>> {
        Some(self.next_payload())
    }
}

fn put_varint(buffer: &mut Vec<u8>, mut value: u64) {
    while value >= 0x80 {
        buffer.push((value as u8) | 0x80);
        value >>= 7;
    }
    buffer.push(value as u8);
}

fn get_varint(data: &[u8], cursor: &mut usize) -> Result<u64> {
    let mut result = 0u64;
    let mut shift = 0u32;
    loop {
        let byte = *data
            .get(*cursor)
            .ok_or_else(|| Error::Other("Unexpected end of payload reading varint".to_string()))?;
        *cursor += 1;
        if shift >= 64 {
            return Err(Error::Other("Varint overflows 64 bits".to_string()));
        }
        result |= ((byte & 0x7f) as u64) << shift;
        if byte & 0x80 == 0 {
            return Ok(result);
        }
        shift += 7;
    }
}

fn zigzag(value: i64) -> u64 {
    ((value << 1) ^ (value >> 63)) as u64
}

fn unzigzag(value: u64) -> i64 {
    ((value >> 1) as i64) ^ -((value & 1) as i64)
}
