//! Run-length codecs for stream payloads.
//!
//! Four payload layouts share one header (see [`crate::StreamUpdate`]):
//!
//! * `None`: `(attr, symbol)` for every cell.
//! * `Classic`: the symbol layer then the attribute layer, each a list of
//!   `(count, value)` byte pairs. Counts run 1..=127; bit 7 marks a record
//!   whose run carries on into the next record after a split.
//! * `Large`: the same two layers with a little-endian `u16` count.
//! * `Color`: one list of `(varint count, attr, symbol)` triples.
//!
//! The encoder measures every eligible layout and keeps the smallest.

use serde::{Deserialize, Serialize};

use crate::{cell::Cell, error::ProtoError};

/// Longest run a single `Classic` record can carry.
pub const CLASSIC_MAX_RUN: usize = 127;

const LARGE_MAX_RUN: usize = u16::MAX as usize;
const CONTINUATION: u8 = 0x80;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum RleMode {
    None = 0,
    Classic = 1,
    Large = 2,
    Color = 3,
}

impl RleMode {
    /// Tie-break order used when two layouts measure the same.
    pub const PREFERENCE: [RleMode; 4] = [
        RleMode::Classic,
        RleMode::Large,
        RleMode::Color,
        RleMode::None,
    ];

    pub fn from_u8(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(RleMode::None),
            1 => Some(RleMode::Classic),
            2 => Some(RleMode::Large),
            3 => Some(RleMode::Color),
            _ => None,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn label(self) -> &'static str {
        match self {
            RleMode::None => "none",
            RleMode::Classic => "classic",
            RleMode::Large => "large",
            RleMode::Color => "color",
        }
    }
}

/// Runs of a cell slice, computed once and shared by every layout.
#[derive(Debug, Clone)]
pub struct RunPlan {
    area: usize,
    symbols: Vec<(usize, u8)>,
    attrs: Vec<(usize, u8)>,
    cells: Vec<(usize, Cell)>,
}

impl RunPlan {
    pub fn new(cells: &[Cell]) -> Self {
        Self {
            area: cells.len(),
            symbols: runs(cells.iter().map(|cell| cell.symbol)),
            attrs: runs(cells.iter().map(|cell| cell.attr)),
            cells: runs(cells.iter().copied()),
        }
    }

    pub fn longest_layer_run(&self) -> usize {
        self.symbols
            .iter()
            .chain(&self.attrs)
            .map(|(len, _)| *len)
            .max()
            .unwrap_or(0)
    }

    /// `Large` only pays off when some run overflows a `Classic` record.
    pub fn is_eligible(&self, mode: RleMode) -> bool {
        match mode {
            RleMode::Large => self.longest_layer_run() > CLASSIC_MAX_RUN,
            RleMode::None | RleMode::Classic | RleMode::Color => true,
        }
    }

    /// Payload size in bytes under `mode`, without encoding.
    pub fn payload_len(&self, mode: RleMode) -> usize {
        match mode {
            RleMode::None => self.area * 2,
            RleMode::Classic => {
                layer_records(&self.symbols, CLASSIC_MAX_RUN) * 2
                    + layer_records(&self.attrs, CLASSIC_MAX_RUN) * 2
            }
            RleMode::Large => {
                layer_records(&self.symbols, LARGE_MAX_RUN) * 3
                    + layer_records(&self.attrs, LARGE_MAX_RUN) * 3
            }
            RleMode::Color => self
                .cells
                .iter()
                .map(|(len, _)| varint_len(*len) + 2)
                .sum(),
        }
    }

    /// Smallest eligible layout; ties go to the earlier entry of
    /// [`RleMode::PREFERENCE`].
    pub fn best_mode(&self) -> RleMode {
        let mut best = RleMode::Classic;
        let mut best_len = self.payload_len(best);
        for mode in RleMode::PREFERENCE.into_iter().skip(1) {
            if !self.is_eligible(mode) {
                continue;
            }
            let len = self.payload_len(mode);
            if len < best_len {
                best = mode;
                best_len = len;
            }
        }
        best
    }

    pub fn write(&self, mode: RleMode, out: &mut Vec<u8>) {
        out.reserve(self.payload_len(mode));
        match mode {
            RleMode::None => {
                for (len, cell) in &self.cells {
                    for _ in 0..*len {
                        out.push(cell.attr);
                        out.push(cell.symbol);
                    }
                }
            }
            RleMode::Classic => {
                write_classic_layer(&self.symbols, out);
                write_classic_layer(&self.attrs, out);
            }
            RleMode::Large => {
                write_large_layer(&self.symbols, out);
                write_large_layer(&self.attrs, out);
            }
            RleMode::Color => {
                for (len, cell) in &self.cells {
                    write_varint(*len, out);
                    out.push(cell.attr);
                    out.push(cell.symbol);
                }
            }
        }
    }
}

/// Encode `cells` into `out`, choosing the layout unless one is forced.
pub fn encode(cells: &[Cell], forced: Option<RleMode>, out: &mut Vec<u8>) -> RleMode {
    let plan = RunPlan::new(cells);
    let mode = forced.unwrap_or_else(|| plan.best_mode());
    plan.write(mode, out);
    mode
}

/// Decode a payload that must describe exactly `area` cells.
pub fn decode(mode: RleMode, payload: &[u8], area: usize) -> Result<Vec<Cell>, ProtoError> {
    match mode {
        RleMode::None => {
            if payload.len() != area * 2 {
                return Err(ProtoError::MalformedStream {
                    expected: area,
                    actual: payload.len() / 2,
                });
            }
            Ok(payload
                .chunks_exact(2)
                .map(|pair| Cell {
                    attr: pair[0],
                    symbol: pair[1],
                })
                .collect())
        }
        RleMode::Classic | RleMode::Large => {
            let mut reader = Reader::new(payload);
            let symbols = read_layer(&mut reader, mode, area)?;
            let attrs = read_layer(&mut reader, mode, area)?;
            reader.finish()?;
            Ok(attrs
                .into_iter()
                .zip(symbols)
                .map(|(attr, symbol)| Cell { attr, symbol })
                .collect())
        }
        RleMode::Color => {
            let mut reader = Reader::new(payload);
            let mut cells = Vec::with_capacity(reserve_hint(area, payload.len()));
            while !reader.is_empty() {
                let at = reader.pos;
                let len = reader.varint(area)?;
                if len == 0 {
                    return Err(ProtoError::ZeroRun(at));
                }
                let attr = reader.byte(area, cells.len())?;
                let symbol = reader.byte(area, cells.len())?;
                if cells.len() + len > area {
                    return Err(ProtoError::MalformedStream {
                        expected: area,
                        actual: cells.len() + len,
                    });
                }
                cells.extend(std::iter::repeat(Cell { attr, symbol }).take(len));
            }
            if cells.len() != area {
                return Err(ProtoError::MalformedStream {
                    expected: area,
                    actual: cells.len(),
                });
            }
            Ok(cells)
        }
    }
}

/// Upfront reservation for a run-length payload. The header's area is
/// untrusted, so never reserve more than a full `Classic` run per byte.
fn reserve_hint(area: usize, payload_len: usize) -> usize {
    area.min(payload_len.saturating_mul(CLASSIC_MAX_RUN))
}

fn runs<T: PartialEq + Copy>(values: impl IntoIterator<Item = T>) -> Vec<(usize, T)> {
    let mut out: Vec<(usize, T)> = Vec::new();
    for value in values {
        match out.last_mut() {
            Some((len, last)) if *last == value => *len += 1,
            _ => out.push((1, value)),
        }
    }
    out
}

fn layer_records(runs: &[(usize, u8)], cap: usize) -> usize {
    runs.iter().map(|(len, _)| len.div_ceil(cap)).sum()
}

fn write_classic_layer(runs: &[(usize, u8)], out: &mut Vec<u8>) {
    for &(len, value) in runs {
        let mut remaining = len;
        while remaining > 0 {
            let chunk = remaining.min(CLASSIC_MAX_RUN);
            remaining -= chunk;
            let marker = if remaining > 0 { CONTINUATION } else { 0 };
            out.push(chunk as u8 | marker);
            out.push(value);
        }
    }
}

fn write_large_layer(runs: &[(usize, u8)], out: &mut Vec<u8>) {
    for &(len, value) in runs {
        let mut remaining = len;
        while remaining > 0 {
            let chunk = remaining.min(LARGE_MAX_RUN);
            remaining -= chunk;
            out.extend_from_slice(&(chunk as u16).to_le_bytes());
            out.push(value);
        }
    }
}

fn varint_len(mut value: usize) -> usize {
    let mut len = 1;
    while value >= 0x80 {
        value >>= 7;
        len += 1;
    }
    len
}

fn write_varint(mut value: usize, out: &mut Vec<u8>) {
    while value >= 0x80 {
        out.push((value as u8 & 0x7f) | 0x80);
        value >>= 7;
    }
    out.push(value as u8);
}

fn read_layer(reader: &mut Reader<'_>, mode: RleMode, area: usize) -> Result<Vec<u8>, ProtoError> {
    let mut values = Vec::with_capacity(reserve_hint(area, reader.bytes.len()));
    let mut continued: Option<u8> = None;
    while values.len() < area {
        let at = reader.pos;
        let (len, more) = match mode {
            RleMode::Classic => {
                let count = reader.byte(area, values.len())?;
                (
                    (count & !CONTINUATION) as usize,
                    count & CONTINUATION != 0,
                )
            }
            _ => {
                let lo = reader.byte(area, values.len())?;
                let hi = reader.byte(area, values.len())?;
                (u16::from_le_bytes([lo, hi]) as usize, false)
            }
        };
        if len == 0 {
            return Err(ProtoError::ZeroRun(at));
        }
        let value = reader.byte(area, values.len())?;
        if continued.is_some_and(|previous| previous != value) {
            return Err(ProtoError::BrokenContinuation(at));
        }
        continued = more.then_some(value);
        values.extend(std::iter::repeat(value).take(len));
    }
    if values.len() > area {
        return Err(ProtoError::MalformedStream {
            expected: area,
            actual: values.len(),
        });
    }
    if continued.is_some() {
        return Err(ProtoError::BrokenContinuation(reader.pos));
    }
    Ok(values)
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn is_empty(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    /// A payload that ends early has run totals short of the area.
    fn byte(&mut self, area: usize, decoded: usize) -> Result<u8, ProtoError> {
        let byte = *self
            .bytes
            .get(self.pos)
            .ok_or(ProtoError::MalformedStream {
                expected: area,
                actual: decoded,
            })?;
        self.pos += 1;
        Ok(byte)
    }

    fn varint(&mut self, area: usize) -> Result<usize, ProtoError> {
        let mut value = 0usize;
        for shift in (0..32).step_by(7) {
            let byte = *self.bytes.get(self.pos).ok_or(ProtoError::Truncated {
                needed: 1,
            })?;
            self.pos += 1;
            value |= ((byte & 0x7f) as usize) << shift;
            if byte & 0x80 == 0 {
                if value > area {
                    return Err(ProtoError::MalformedStream {
                        expected: area,
                        actual: value,
                    });
                }
                return Ok(value);
            }
        }
        Err(ProtoError::VarintOverflow)
    }

    fn finish(&self) -> Result<(), ProtoError> {
        match self.bytes.len() - self.pos.min(self.bytes.len()) {
            0 => Ok(()),
            extra => Err(ProtoError::TrailingBytes(extra)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uniform(len: usize, symbol: u8, attr: u8) -> Vec<Cell> {
        vec![Cell::new(symbol, attr); len]
    }

    #[test]
    fn ten_uniform_cells_are_one_classic_run_per_layer() {
        let cells = uniform(10, b'x', 1);
        let mut payload = Vec::new();
        let mode = encode(&cells, Some(RleMode::Classic), &mut payload);
        assert_eq!(mode, RleMode::Classic);
        assert_eq!(payload, vec![10, b'x', 10, 1]);
        assert_eq!(decode(mode, &payload, 10).unwrap(), cells);
    }

    #[test]
    fn classic_splits_long_runs_with_continuation() {
        let cells = uniform(300, b'#', 2);
        let mut payload = Vec::new();
        encode(&cells, Some(RleMode::Classic), &mut payload);
        let symbol_layer = &payload[..6];
        assert_eq!(
            symbol_layer,
            &[127 | CONTINUATION, b'#', 127 | CONTINUATION, b'#', 46, b'#']
        );
        for record in payload.chunks(2) {
            assert!((record[0] & !CONTINUATION) as usize <= CLASSIC_MAX_RUN);
        }
        assert_eq!(decode(RleMode::Classic, &payload, 300).unwrap(), cells);
    }

    #[test]
    fn large_is_only_eligible_past_the_classic_cap() {
        assert!(!RunPlan::new(&uniform(127, b'.', 1)).is_eligible(RleMode::Large));
        let plan = RunPlan::new(&uniform(2000, b'.', 1));
        assert!(plan.is_eligible(RleMode::Large));
        // One u16 record per layer beats sixteen classic records per layer.
        assert_eq!(plan.payload_len(RleMode::Large), 6);
        assert_eq!(plan.payload_len(RleMode::Color), 4);
        assert_eq!(plan.best_mode(), RleMode::Color);
    }

    #[test]
    fn ties_prefer_classic() {
        // Two cells differing in both layers: classic 8 bytes, color 6,
        // none 4. None wins only because it is strictly smaller.
        let cells = vec![Cell::new(b'a', 1), Cell::new(b'b', 2)];
        assert_eq!(RunPlan::new(&cells).best_mode(), RleMode::None);

        // One cell: classic 4, color 3, none 2.
        let single = RunPlan::new(&uniform(1, b'a', 1));
        assert_eq!(single.best_mode(), RleMode::None);

        // Empty grid: every layout is zero bytes, classic wins the tie.
        assert_eq!(RunPlan::new(&[]).best_mode(), RleMode::Classic);
    }

    #[test]
    fn varint_counts_span_bytes() {
        let cells = uniform(200, b'~', 4);
        let mut payload = Vec::new();
        encode(&cells, Some(RleMode::Color), &mut payload);
        assert_eq!(payload, vec![0xc8, 0x01, 4, b'~']);
        assert_eq!(decode(RleMode::Color, &payload, 200).unwrap(), cells);
    }

    #[test]
    fn short_runs_are_malformed() {
        let payload = vec![5, b'x', 5, 1];
        assert!(matches!(
            decode(RleMode::Classic, &payload, 10),
            Err(ProtoError::MalformedStream {
                expected: 10,
                actual: 5
            })
        ));
    }

    #[test]
    fn overlong_runs_are_malformed() {
        let payload = vec![12, b'x', 12, 1];
        assert!(matches!(
            decode(RleMode::Classic, &payload, 10),
            Err(ProtoError::MalformedStream {
                expected: 10,
                actual: 12
            })
        ));
        assert!(matches!(
            decode(RleMode::Color, &[11, 1, b'x'], 10),
            Err(ProtoError::MalformedStream { .. })
        ));
    }

    #[test]
    fn zero_runs_and_broken_continuations_are_rejected() {
        assert!(matches!(
            decode(RleMode::Classic, &[0, b'x', 1, 1], 1),
            Err(ProtoError::ZeroRun(0))
        ));
        let broken = vec![1 | CONTINUATION, b'x', 1, b'y', 2, 1];
        assert!(matches!(
            decode(RleMode::Classic, &broken, 2),
            Err(ProtoError::BrokenContinuation(2))
        ));
    }

    #[test]
    fn trailing_bytes_are_rejected() {
        assert!(matches!(
            decode(RleMode::Classic, &[1, b'x', 1, 1, 9], 1),
            Err(ProtoError::TrailingBytes(1))
        ));
        assert!(matches!(
            decode(RleMode::None, &[1, b'x', 9], 1),
            Err(ProtoError::MalformedStream { .. })
        ));
    }

    #[test]
    fn huge_area_with_tiny_payload_fails_without_reserving_the_area() {
        let area = u16::MAX as usize * u16::MAX as usize;
        assert_eq!(reserve_hint(area, 3), 3 * CLASSIC_MAX_RUN);
        assert!(matches!(
            decode(RleMode::Color, &[1, 1, b'x'], area),
            Err(ProtoError::MalformedStream { actual: 1, .. })
        ));
        assert!(matches!(
            decode(RleMode::Classic, &[1, b'x'], area),
            Err(ProtoError::MalformedStream { .. })
        ));
    }
}
