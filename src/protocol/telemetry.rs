// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Binary telemetry records.
//!
//! Every record is a fixed sequence of 4-byte little-endian fields with no framing; the
//! consumer knows the schema for the running protocol.

/// Byte sink for telemetry, e.g. the debug USART.
pub trait TelemetrySink {
    fn write_all(&mut self, bytes: &[u8]);

    fn emit<R: Record>(&mut self, record: &R) {
        self.write_all(record.to_bytes().as_ref());
    }
}

impl<T: TelemetrySink + ?Sized> TelemetrySink for &mut T {
    fn write_all(&mut self, bytes: &[u8]) {
        (**self).write_all(bytes)
    }
}

/// Discards everything.
impl TelemetrySink for () {
    fn write_all(&mut self, _bytes: &[u8]) {}
}

/// A fixed-width telemetry record.
pub trait Record: Sized {
    type Bytes: AsRef<[u8]> + AsMut<[u8]> + Default;

    fn to_bytes(&self) -> Self::Bytes;

    fn from_bytes(bytes: &Self::Bytes) -> Self;
}

#[inline]
fn put(out: &mut [u8], field: usize, bytes: [u8; 4]) {
    out[field * 4..field * 4 + 4].copy_from_slice(&bytes);
}

#[inline]
fn word(bytes: &[u8], field: usize) -> [u8; 4] {
    let mut w = [0u8; 4];
    w.copy_from_slice(&bytes[field * 4..field * 4 + 4]);
    w
}

/// Carriage tracking sample: `<Iffff`, 20 bytes.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct AxisRecord {
    pub timestamp_ms: u32,
    pub target_1: f32,
    pub position_1: f32,
    pub target_2: f32,
    pub position_2: f32,
}

impl Record for AxisRecord {
    type Bytes = [u8; 20];

    fn to_bytes(&self) -> [u8; 20] {
        let mut out = [0u8; 20];
        put(&mut out, 0, self.timestamp_ms.to_le_bytes());
        put(&mut out, 1, self.target_1.to_le_bytes());
        put(&mut out, 2, self.position_1.to_le_bytes());
        put(&mut out, 3, self.target_2.to_le_bytes());
        put(&mut out, 4, self.position_2.to_le_bytes());
        out
    }

    fn from_bytes(bytes: &[u8; 20]) -> Self {
        Self {
            timestamp_ms: u32::from_le_bytes(word(bytes, 0)),
            target_1: f32::from_le_bytes(word(bytes, 1)),
            position_1: f32::from_le_bytes(word(bytes, 2)),
            target_2: f32::from_le_bytes(word(bytes, 3)),
            position_2: f32::from_le_bytes(word(bytes, 4)),
        }
    }
}

/// Object motion against contact force: `<IfIf`, 16 bytes.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ContactRecord {
    pub timestamp_ms: u32,
    pub object_position: f32,
    pub force_timestamp_ms: u32,
    pub force: f32,
}

impl Record for ContactRecord {
    type Bytes = [u8; 16];

    fn to_bytes(&self) -> [u8; 16] {
        let mut out = [0u8; 16];
        put(&mut out, 0, self.timestamp_ms.to_le_bytes());
        put(&mut out, 1, self.object_position.to_le_bytes());
        put(&mut out, 2, self.force_timestamp_ms.to_le_bytes());
        put(&mut out, 3, self.force.to_le_bytes());
        out
    }

    fn from_bytes(bytes: &[u8; 16]) -> Self {
        Self {
            timestamp_ms: u32::from_le_bytes(word(bytes, 0)),
            object_position: f32::from_le_bytes(word(bytes, 1)),
            force_timestamp_ms: u32::from_le_bytes(word(bytes, 2)),
            force: f32::from_le_bytes(word(bytes, 3)),
        }
    }
}
