//! Terminal colour attributes and their one-letter codes.

pub const TERM_DARK: u8 = 0;
pub const TERM_WHITE: u8 = 1;
pub const TERM_L_WHITE: u8 = 9;

const LETTERS: &[u8; 16] = b"dwsorgbuDWvyRGBU";

/// Attribute for a colour letter (`'d'` dark through `'U'` light umber).
pub fn attr_from_letter(letter: char) -> Option<u8> {
    if !letter.is_ascii() {
        return None;
    }
    LETTERS
        .iter()
        .position(|candidate| *candidate == letter as u8)
        .map(|index| index as u8)
}

pub fn letter_for_attr(attr: u8) -> Option<char> {
    LETTERS.get(attr as usize).map(|byte| *byte as char)
}
