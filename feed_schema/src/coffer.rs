use crate::{MAX_COFFERS, MAX_SHORT};

/// Value stored in a single coffer slot.
pub type CofferValue = i16;

/// Sentinel for "no value". Lies outside the writable range, so the
/// simulation can never produce it by accident.
pub const COFFER_EMPTY: CofferValue = i16::MIN;

/// Fixed-capacity bank of coffers owned by one connection.
///
/// The server keeps one per connection and the client keeps a mirror fed from
/// the wire. Every slot starts out [`COFFER_EMPTY`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CofferBank {
    values: Vec<CofferValue>,
}

impl Default for CofferBank {
    fn default() -> Self {
        Self::new()
    }
}

impl CofferBank {
    pub fn new() -> Self {
        Self {
            values: vec![COFFER_EMPTY; MAX_COFFERS],
        }
    }

    /// Write a value produced by the simulation, clamping it to the coffer
    /// range.
    ///
    /// # Panics
    ///
    /// Panics when `index` is outside the bank. Such a write means the
    /// simulation and the schema disagree about the coffer layout.
    pub fn set(&mut self, index: usize, value: i32) {
        assert!(
            index < MAX_COFFERS,
            "coffer index {index} out of range (capacity {MAX_COFFERS})"
        );
        let clamped = value.clamp(-(MAX_SHORT as i32), MAX_SHORT as i32);
        self.values[index] = clamped as CofferValue;
    }

    /// Mark a coffer as holding no value.
    ///
    /// # Panics
    ///
    /// Panics when `index` is outside the bank.
    pub fn set_empty(&mut self, index: usize) {
        assert!(
            index < MAX_COFFERS,
            "coffer index {index} out of range (capacity {MAX_COFFERS})"
        );
        self.values[index] = COFFER_EMPTY;
    }

    /// Store a value received from the wire. Returns `false` and leaves the
    /// bank untouched when the index is unknown to this side.
    pub fn apply_remote(&mut self, index: usize, value: CofferValue) -> bool {
        match self.values.get_mut(index) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    /// Read a coffer. Indices past the end read as [`COFFER_EMPTY`].
    pub fn get(&self, index: usize) -> CofferValue {
        self.values.get(index).copied().unwrap_or(COFFER_EMPTY)
    }

    /// Zero a coffer. Out-of-range indices are ignored.
    pub fn reset(&mut self, index: usize) {
        if let Some(slot) = self.values.get_mut(index) {
            *slot = 0;
        }
    }

    pub fn values(&self) -> &[CofferValue] {
        &self.values
    }

    /// Coffers whose value differs from `previous`, in index order.
    pub fn changed_since<'a>(
        &'a self,
        previous: &'a CofferBank,
    ) -> impl Iterator<Item = (u8, CofferValue)> + 'a {
        self.values
            .iter()
            .zip(previous.values.iter())
            .enumerate()
            .filter(|(_, (now, before))| now != before)
            .map(|(index, (now, _))| (index as u8, *now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_bank_is_empty() {
        let bank = CofferBank::new();
        assert_eq!(bank.values().len(), MAX_COFFERS);
        assert!(bank.values().iter().all(|v| *v == COFFER_EMPTY));
    }

    #[test]
    fn writes_clamp_to_short_range() {
        let mut bank = CofferBank::new();
        bank.set(3, 100_000);
        bank.set(4, -100_000);
        assert_eq!(bank.get(3), MAX_SHORT);
        assert_eq!(bank.get(4), -MAX_SHORT);
        assert_ne!(bank.get(4), COFFER_EMPTY);
    }

    #[test]
    fn writes_are_idempotent() {
        let mut bank = CofferBank::new();
        bank.set(7, 42);
        let once = bank.clone();
        bank.set(7, 42);
        assert_eq!(bank, once);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn out_of_range_write_fails_fast() {
        let mut bank = CofferBank::new();
        bank.set(MAX_COFFERS, 1);
    }

    #[test]
    fn remote_writes_tolerate_unknown_indices() {
        let mut bank = CofferBank::new();
        assert!(!bank.apply_remote(MAX_COFFERS + 4, 9));
        assert!(bank.apply_remote(0, 9));
        assert_eq!(bank.get(0), 9);
        assert_eq!(bank.get(MAX_COFFERS + 4), COFFER_EMPTY);
    }

    #[test]
    fn changed_since_reports_only_differences() {
        let before = CofferBank::new();
        let mut after = before.clone();
        after.set(1, 5);
        after.set(10, -3);
        let changes: Vec<_> = after.changed_since(&before).collect();
        assert_eq!(changes, vec![(1, 5), (10, -3)]);
    }
}
