use feed_proto::{rle::CLASSIC_MAX_RUN, Cell, Grid, RleMode, StreamUpdate, HEADER_LEN};
use proptest::prelude::*;

/// Grids built from a small palette so long runs show up often.
fn grid_strategy() -> impl Strategy<Value = Grid> {
    (0u16..48, 0u16..12).prop_flat_map(|(width, height)| {
        let area = width as usize * height as usize;
        let cell = (0u8..3, prop_oneof![Just(0u8), Just(b'.'), Just(b'#'), any::<u8>()])
            .prop_map(|(attr, symbol)| Cell { attr, symbol });
        let run = (cell, 1usize..400);
        prop::collection::vec(run, 0..16).prop_map(move |runs| {
            let mut cells: Vec<Cell> = runs
                .into_iter()
                .flat_map(|(cell, len)| std::iter::repeat(cell).take(len))
                .take(area)
                .collect();
            cells.resize(area, Cell::UNSET);
            Grid::from_cells(width, height, cells).expect("area matches")
        })
    })
}

proptest! {
    #[test]
    fn every_mode_round_trips(grid in grid_strategy()) {
        for mode in RleMode::PREFERENCE {
            let bytes = StreamUpdate::encode_with(3, &grid, Some(mode)).to_bytes();
            let update = StreamUpdate::parse(&bytes).unwrap();
            prop_assert_eq!(update.mode, mode);
            prop_assert_eq!(update.decode_grid().unwrap(), grid.clone());
        }
    }

    #[test]
    fn selected_mode_is_smallest_and_round_trips(grid in grid_strategy()) {
        let chosen = StreamUpdate::encode(0, &grid);
        for mode in RleMode::PREFERENCE {
            let forced = StreamUpdate::encode_with(0, &grid, Some(mode));
            prop_assert!(chosen.payload.len() <= forced.payload.len());
        }
        prop_assert_eq!(chosen.decode_grid().unwrap(), grid);
    }

    #[test]
    fn encoding_is_deterministic(grid in grid_strategy()) {
        let first = StreamUpdate::encode(1, &grid).to_bytes();
        let second = StreamUpdate::encode(1, &grid).to_bytes();
        prop_assert_eq!(first, second);
    }

    #[test]
    fn classic_counts_never_exceed_the_cap(grid in grid_strategy()) {
        let update = StreamUpdate::encode_with(0, &grid, Some(RleMode::Classic));
        for record in update.payload.chunks(2) {
            prop_assert!(((record[0] & 0x7f) as usize) <= CLASSIC_MAX_RUN);
            prop_assert!(record[0] & 0x7f != 0);
        }
        let bytes = update.to_bytes();
        prop_assert!(bytes.len() >= HEADER_LEN);
    }

    #[test]
    fn truncated_payloads_never_decode(grid in grid_strategy(), cut in 1usize..8) {
        prop_assume!(grid.area() > 0);
        for mode in RleMode::PREFERENCE {
            let mut update = StreamUpdate::encode_with(0, &grid, Some(mode));
            let keep = update.payload.len().saturating_sub(cut);
            update.payload.truncate(keep);
            prop_assert!(update.decode_grid().is_err());
        }
    }
}

#[test]
fn long_runs_decode_identically_split_or_promoted() {
    let grid = Grid::filled(300, 1, Cell::new(b'=', 5));
    let classic = StreamUpdate::encode_with(0, &grid, Some(RleMode::Classic));
    let large = StreamUpdate::encode_with(0, &grid, Some(RleMode::Large));
    assert_eq!(classic.payload.len(), 12);
    assert_eq!(large.payload.len(), 6);
    assert_eq!(classic.decode_grid().unwrap(), large.decode_grid().unwrap());
}
