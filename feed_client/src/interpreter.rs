//! Turns coffer values into positioned status text.
//!
//! Each indicator walks its coffer sequence one step at a time: read the
//! step's value, run the stride test, render the step's prompt segment, fire
//! control operations at trigger points, then either advance or stop. The
//! walk never fails; anything it cannot render is simply left out.

use std::collections::BTreeMap;

use feed_schema::{
    CofferBank, ControlOp, DirectiveKind, DisplayType, IndicatorDef, IndicatorFilter,
    IndicatorTable, Piece, StopPolicy, Stride, StrideTest, TextFormat, COFFER_EMPTY,
};
use serde::Serialize;

use crate::format::{cut, format_number, format_text, label, likert, stat};

/// A run of text at a terminal position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Span {
    pub row: u16,
    pub col: u16,
    pub text: String,
    pub attr: u8,
}

/// What the interpreter needs to know about the terminal and the character.
#[derive(Debug, Clone, Copy)]
pub struct RenderContext<'a> {
    pub term_width: u16,
    pub term_height: u16,
    /// Whether the character can cast from books.
    pub can_cast: bool,
    /// Externally supplied text for string indicators, by indicator id.
    pub strings: &'a BTreeMap<u8, String>,
}

/// Render every indicator in table order.
pub fn render_all(
    table: &IndicatorTable,
    coffers: &mut CofferBank,
    ctx: &RenderContext<'_>,
) -> Vec<Span> {
    let mut spans = Vec::new();
    for def in table.iter() {
        spans.extend(render_indicator(def, coffers, ctx));
    }
    spans
}

/// Render one indicator. `coffers` is only written by the coffer reset
/// control operation.
pub fn render_indicator(
    def: &IndicatorDef,
    coffers: &mut CofferBank,
    ctx: &RenderContext<'_>,
) -> Vec<Span> {
    let mut spans = Vec::new();
    if def.config.filter == Some(IndicatorFilter::SpellBook) && !ctx.can_cast {
        return spans;
    }
    let Some(row) = resolve_row(def.row, ctx.term_height) else {
        return spans;
    };

    let mut walk = Walk {
        def,
        ctx,
        cursor: Cursor {
            row,
            col: def.col,
            attr: def.attr,
            text: String::new(),
        },
        stride_active: true,
        saved_attrs: Vec::new(),
        spans: &mut spans,
    };

    for step in 0..def.steps {
        let value = read_step(def, coffers, ctx, step);
        if value.is_none() && def.config.stop == StopPolicy::Exhausted {
            break;
        }
        if walk.stride_active {
            if let Some(stride) = def.config.stride {
                if stride_skips(stride, def, coffers, ctx, step, value) {
                    // The first failing coffer ends the walk; later ones are not examined.
                    if def.config.stop == StopPolicy::StrideMiss {
                        break;
                    }
                    continue;
                }
            }
        }
        let Some(value) = value else {
            continue;
        };

        walk.emit(coffers, step, value);
        if def.config.stop == StopPolicy::Once {
            break;
        }
    }
    spans
}

/// Negative rows count up from the bottom of the terminal.
fn resolve_row(row: i16, term_height: u16) -> Option<u16> {
    let resolved = if row < 0 {
        term_height as i32 + row as i32
    } else {
        row as i32
    };
    (0..term_height as i32)
        .contains(&resolved)
        .then_some(resolved as u16)
}

fn present(raw: i16) -> Option<i32> {
    (raw != COFFER_EMPTY).then_some(raw as i32)
}

/// Value for a step, or `None` when its coffers hold no data.
fn read_step(
    def: &IndicatorDef,
    coffers: &CofferBank,
    ctx: &RenderContext<'_>,
    step: usize,
) -> Option<i32> {
    let index = def.coffer_for_step(step);
    match def.display {
        DisplayType::Tiny => present(coffers.get(index)).map(|value| value.clamp(0, 255)),
        DisplayType::Normal => present(coffers.get(index)),
        DisplayType::Large => {
            let high = present(coffers.get(index))?;
            let low = present(coffers.get(index + 1))?;
            Some((high << 16) | (low as u16 as i32))
        }
        // The text lives outside the bank; its presence is the data.
        DisplayType::String => ctx.strings.contains_key(&def.id).then_some(0),
    }
}

fn stride_skips(
    stride: Stride,
    def: &IndicatorDef,
    coffers: &CofferBank,
    ctx: &RenderContext<'_>,
    step: usize,
    value: Option<i32>,
) -> bool {
    let skip = match (stride.test, value) {
        (StrideTest::Empty, value) => value.is_none(),
        (_, None) => return true,
        (StrideTest::Positive, Some(value)) => value <= 0,
        (StrideTest::NonZero, Some(value)) => value == 0,
        (StrideTest::Larger, Some(value)) => {
            let previous = step
                .checked_sub(1)
                .and_then(|prev| read_step(def, coffers, ctx, prev));
            match previous {
                Some(previous) => value <= previous,
                None => return false,
            }
        }
        (StrideTest::Lesser, Some(value)) => {
            let next = (step + 1 < def.steps)
                .then(|| read_step(def, coffers, ctx, step + 1))
                .flatten();
            match next {
                Some(next) => value >= next,
                None => return false,
            }
        }
    };
    skip != stride.invert
}

struct Cursor {
    row: u16,
    col: u16,
    attr: u8,
    text: String,
}

struct Walk<'a, 'c> {
    def: &'a IndicatorDef,
    ctx: &'a RenderContext<'c>,
    cursor: Cursor,
    stride_active: bool,
    /// Attributes displaced by colour triggers, innermost last.
    saved_attrs: Vec<u8>,
    spans: &'a mut Vec<Span>,
}

impl Walk<'_, '_> {
    fn emit(&mut self, coffers: &mut CofferBank, step: usize, value: i32) {
        let def = self.def;
        let mut value = value;
        for piece in def.template.segment(step) {
            match piece {
                Piece::Text(text) => self.cursor.text.push_str(text),
                Piece::Value(directive) => {
                    let text = match &def.config.format {
                        TextFormat::Label(labels) => format_text(directive, label(labels, value)),
                        TextFormat::Printf => match directive.kind {
                            DirectiveKind::Numeric => format_number(directive, value as i64),
                            DirectiveKind::Text => format_text(directive, &value.to_string()),
                        },
                        TextFormat::Stat => format_text(directive, &stat(value)),
                        TextFormat::Cut => {
                            let external = self
                                .ctx
                                .strings
                                .get(&def.id)
                                .map(String::as_str)
                                .unwrap_or("");
                            format_text(directive, cut(external, def.width))
                        }
                        TextFormat::Likert(buckets) => {
                            // The bucket's own colour applies to its label only.
                            if let Some(bucket) = likert(buckets, value) {
                                self.flush();
                                let attr = self.cursor.attr;
                                self.cursor.attr = bucket.attr;
                                self.cursor.text = format_text(directive, &bucket.label);
                                self.flush();
                                self.cursor.attr = attr;
                            }
                            continue;
                        }
                    };
                    self.cursor.text.push_str(&text);
                }
                Piece::Trigger { color } => {
                    self.flush();
                    for op in &def.config.controls {
                        match op {
                            ControlOp::CarriageReturn => self.cursor.col = def.col,
                            ControlOp::LineFeed => {
                                self.cursor.row = self.cursor.row.saturating_add(1)
                            }
                            ControlOp::FormFeed => {
                                self.cursor.row = self.cursor.row.saturating_add(1);
                                self.cursor.col = def.col;
                            }
                            ControlOp::SetColor => {
                                if let Some(color) = color {
                                    self.saved_attrs.push(self.cursor.attr);
                                    self.cursor.attr = *color;
                                }
                            }
                            ControlOp::ResetColor => {
                                if color.is_none() {
                                    self.cursor.attr = self.saved_attrs.pop().unwrap_or(def.attr);
                                }
                            }
                            ControlOp::FlipStride => self.stride_active = !self.stride_active,
                            ControlOp::DecrementValue => value -= 1,
                            ControlOp::ResetCoffer => {
                                let first = def.coffer_for_step(step);
                                for index in first..first + def.display.coffers_per_step() {
                                    coffers.reset(index);
                                }
                            }
                        }
                    }
                }
            }
        }
        self.flush();
    }

    /// Close the pending text into a span and advance the cursor past it.
    fn flush(&mut self) {
        if self.cursor.text.is_empty() {
            return;
        }
        let text = std::mem::take(&mut self.cursor.text);
        let len = text.chars().count();
        let col = self.cursor.col;
        self.cursor.col = col.saturating_add(len.min(u16::MAX as usize) as u16);

        if self.cursor.row >= self.ctx.term_height {
            return;
        }
        let room = self.ctx.term_width.saturating_sub(col) as usize;
        let text = if len <= room {
            text
        } else if self.def.config.auto_cut && room > 0 {
            text.chars().take(room).collect()
        } else {
            return;
        };
        self.spans.push(Span {
            row: self.cursor.row,
            col,
            text,
            attr: self.cursor.attr,
        });
    }
}
