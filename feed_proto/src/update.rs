use crate::{
    cell::{Cell, Grid},
    error::ProtoError,
    rle::{self, RleMode, RunPlan},
};

/// `stream_id u8, mode u8, width u16le, height u16le`.
pub const HEADER_LEN: usize = 6;

/// One stream's grid (full or delta) as it travels on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamUpdate {
    pub stream: u8,
    pub mode: RleMode,
    pub width: u16,
    pub height: u16,
    pub payload: Vec<u8>,
}

impl StreamUpdate {
    /// Encode `grid` with the smallest layout.
    pub fn encode(stream: u8, grid: &Grid) -> Self {
        Self::encode_with(stream, grid, None)
    }

    pub fn encode_with(stream: u8, grid: &Grid, forced: Option<RleMode>) -> Self {
        let mut payload = Vec::new();
        let mode = rle::encode(grid.cells(), forced, &mut payload);
        Self {
            stream,
            mode,
            width: grid.width(),
            height: grid.height(),
            payload,
        }
    }

    /// Encode straight into a caller-owned buffer, header included.
    pub fn encode_into(
        stream: u8,
        grid: &Grid,
        forced: Option<RleMode>,
        out: &mut Vec<u8>,
    ) -> RleMode {
        let plan = RunPlan::new(grid.cells());
        let mode = forced.unwrap_or_else(|| plan.best_mode());
        write_header(stream, mode, grid.width(), grid.height(), out);
        plan.write(mode, out);
        mode
    }

    pub fn area(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn encoded_len(&self) -> usize {
        HEADER_LEN + self.payload.len()
    }

    pub fn write_to(&self, out: &mut Vec<u8>) {
        write_header(self.stream, self.mode, self.width, self.height, out);
        out.extend_from_slice(&self.payload);
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len());
        self.write_to(&mut out);
        out
    }

    /// Split header from payload without decoding runs, so a receiver can
    /// check the stream id first.
    pub fn parse(bytes: &[u8]) -> Result<Self, ProtoError> {
        if bytes.len() < HEADER_LEN {
            return Err(ProtoError::Truncated {
                needed: HEADER_LEN - bytes.len(),
            });
        }
        let mode = RleMode::from_u8(bytes[1]).ok_or(ProtoError::UnknownMode(bytes[1]))?;
        Ok(Self {
            stream: bytes[0],
            mode,
            width: u16::from_le_bytes([bytes[2], bytes[3]]),
            height: u16::from_le_bytes([bytes[4], bytes[5]]),
            payload: bytes[HEADER_LEN..].to_vec(),
        })
    }

    /// Expand the runs into a grid, checking they cover exactly
    /// `width * height` cells.
    pub fn decode_cells(&self) -> Result<Vec<Cell>, ProtoError> {
        rle::decode(self.mode, &self.payload, self.area())
    }

    pub fn decode_grid(&self) -> Result<Grid, ProtoError> {
        let cells = self.decode_cells()?;
        Grid::from_cells(self.width, self.height, cells).ok_or(ProtoError::MalformedStream {
            expected: self.area(),
            actual: 0,
        })
    }
}

fn write_header(stream: u8, mode: RleMode, width: u16, height: u16, out: &mut Vec<u8>) {
    out.push(stream);
    out.push(mode.as_u8());
    out.extend_from_slice(&width.to_le_bytes());
    out.extend_from_slice(&height.to_le_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_layout_is_little_endian() {
        let grid = Grid::filled(10, 1, Cell::new(b'x', 1));
        let bytes = StreamUpdate::encode_with(7, &grid, Some(RleMode::Classic)).to_bytes();
        assert_eq!(&bytes[..HEADER_LEN], &[7, 1, 10, 0, 1, 0]);
        assert_eq!(&bytes[HEADER_LEN..], &[10, b'x', 10, 1]);

        let update = StreamUpdate::parse(&bytes).unwrap();
        assert_eq!(update.decode_grid().unwrap(), grid);
    }

    #[test]
    fn encode_into_matches_encode() {
        let mut grid = Grid::filled(20, 3, Cell::BLANK);
        grid.set(4, 1, Cell::new(b'@', 3));
        let mut direct = Vec::new();
        let mode = StreamUpdate::encode_into(2, &grid, None, &mut direct);
        let update = StreamUpdate::encode(2, &grid);
        assert_eq!(mode, update.mode);
        assert_eq!(direct, update.to_bytes());
    }

    #[test]
    fn short_header_and_unknown_mode_are_rejected() {
        assert!(matches!(
            StreamUpdate::parse(&[1, 1, 0]),
            Err(ProtoError::Truncated { needed: 3 })
        ));
        assert!(matches!(
            StreamUpdate::parse(&[1, 9, 0, 0, 0, 0]),
            Err(ProtoError::UnknownMode(9))
        ));
    }

    #[test]
    fn declared_area_must_match_runs() {
        let grid = Grid::filled(10, 1, Cell::new(b'x', 1));
        let mut bytes = StreamUpdate::encode_with(0, &grid, Some(RleMode::Classic)).to_bytes();
        // Claim a 10x2 grid.
        bytes[4] = 2;
        let update = StreamUpdate::parse(&bytes).unwrap();
        assert!(matches!(
            update.decode_grid(),
            Err(ProtoError::MalformedStream { expected: 20, .. })
        ));
    }
}
