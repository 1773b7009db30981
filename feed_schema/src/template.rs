//! Indicator prompts, parsed once at load time.
//!
//! A prompt is split into one segment per coffer step by form feeds (`\f`).
//! Inside a segment, `%d`/`%s` directives (with optional `-`, `+`, `0` flags
//! and a width) mark where the formatted value goes, and vertical tabs (`\v`)
//! mark trigger points for the indicator's control operations.

use crate::color::attr_from_letter;

const STEP_SEPARATOR: char = '\u{000c}';
const TRIGGER: char = '\u{000b}';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectiveKind {
    Numeric,
    Text,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Directive {
    pub left: bool,
    pub plus: bool,
    pub zero: bool,
    pub width: usize,
    pub kind: DirectiveKind,
}

/// Whether a colour letter follows each trigger point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TriggerColor {
    #[default]
    Never,
    Required,
    /// Read a letter when the next character is one. A trigger without a
    /// letter restores the colour in force before the last one that had it.
    Optional,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Piece {
    Text(String),
    Value(Directive),
    /// Control operations fire here. `color` is the attribute read after the
    /// trigger when the indicator sets colours.
    Trigger { color: Option<u8> },
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Template {
    segments: Vec<Vec<Piece>>,
}

impl Template {
    pub fn parse(prompt: &str, trigger_color: TriggerColor) -> Result<Self, String> {
        let mut segments = Vec::new();
        let mut pieces = Vec::new();
        let mut text = String::new();
        let mut chars = prompt.chars().peekable();

        while let Some(ch) = chars.next() {
            match ch {
                STEP_SEPARATOR => {
                    flush_text(&mut text, &mut pieces);
                    segments.push(std::mem::take(&mut pieces));
                }
                TRIGGER => {
                    flush_text(&mut text, &mut pieces);
                    let color = match trigger_color {
                        TriggerColor::Never => None,
                        TriggerColor::Required => {
                            let letter = chars.next().ok_or_else(|| {
                                "trigger at end of prompt has no colour".to_string()
                            })?;
                            let attr = attr_from_letter(letter)
                                .ok_or_else(|| format!("unknown colour letter {letter:?}"))?;
                            Some(attr)
                        }
                        TriggerColor::Optional => {
                            let attr = chars.peek().copied().and_then(attr_from_letter);
                            if attr.is_some() {
                                chars.next();
                            }
                            attr
                        }
                    };
                    pieces.push(Piece::Trigger { color });
                }
                '%' => {
                    if chars.peek() == Some(&'%') {
                        chars.next();
                        text.push('%');
                        continue;
                    }
                    let mut directive = Directive {
                        left: false,
                        plus: false,
                        zero: false,
                        width: 0,
                        kind: DirectiveKind::Numeric,
                    };
                    while let Some(flag) = chars.peek().copied() {
                        match flag {
                            '-' => directive.left = true,
                            '+' => directive.plus = true,
                            '0' => directive.zero = true,
                            _ => break,
                        }
                        chars.next();
                    }
                    while let Some(digit) = chars.peek().and_then(|c| c.to_digit(10)) {
                        directive.width = directive.width * 10 + digit as usize;
                        chars.next();
                        if directive.width > u8::MAX as usize {
                            return Err("directive width too large".to_string());
                        }
                    }
                    directive.kind = match chars.next() {
                        Some('d') => DirectiveKind::Numeric,
                        Some('s') => DirectiveKind::Text,
                        Some(other) => return Err(format!("unsupported conversion %{other}")),
                        None => return Err("dangling % at end of prompt".to_string()),
                    };
                    flush_text(&mut text, &mut pieces);
                    pieces.push(Piece::Value(directive));
                }
                other => text.push(other),
            }
        }
        flush_text(&mut text, &mut pieces);
        segments.push(pieces);

        Ok(Self { segments })
    }

    /// Pieces for a coffer step. Steps past the last segment reuse it.
    pub fn segment(&self, step: usize) -> &[Piece] {
        match self.segments.len() {
            0 => &[],
            len => &self.segments[step.min(len - 1)],
        }
    }

    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    pub fn has_trigger(&self) -> bool {
        self.pieces()
            .any(|piece| matches!(piece, Piece::Trigger { .. }))
    }

    pub fn has_value(&self) -> bool {
        self.pieces().any(|piece| matches!(piece, Piece::Value(_)))
    }

    fn pieces(&self) -> impl Iterator<Item = &Piece> {
        self.segments.iter().flatten()
    }
}

fn flush_text(text: &mut String, pieces: &mut Vec<Piece>) {
    if !text.is_empty() {
        pieces.push(Piece::Text(std::mem::take(text)));
    }
}
