use std::collections::BTreeMap;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::{
    color::TERM_WHITE,
    error::DefinitionError,
    template::{Template, TriggerColor},
    MAX_COFFERS, MAX_INDICATORS,
};

bitflags! {
    /// Packed indicator configuration as it appears in schema records.
    ///
    /// Only [`IndicatorConfig::decode`] looks at these bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct IndicatorBits: u32 {
        const TEXT_LABEL = 0x0000_0001;
        const TEXT_PRINTF = 0x0000_0002;
        const TEXT_STAT = 0x0000_0004;
        const TEXT_CUT = 0x0000_0008;
        const TEXT_LIKERT = 0x0000_0010;

        const VT_CR = 0x0000_0100;
        const VT_LF = 0x0000_0200;
        const VT_FF = 0x0000_0400;
        const VT_COLOR_SET = 0x0000_0800;
        const VT_COLOR_RESET = 0x0000_1000;
        const VT_STRIDE_FLIP = 0x0000_2000;
        const VT_DEC_VALUE = 0x0000_4000;

        const STRIDE_LESSER = 0x0001_0000;
        const VT_COFFER_RESET = 0x0004_0000;
        const STRIDE_NOT = 0x0008_0000;
        const STRIDE_EMPTY = 0x0010_0000;
        const STRIDE_LARGER = 0x0020_0000;
        const STRIDE_POSITIVE = 0x0040_0000;
        const STRIDE_NONZERO = 0x0080_0000;

        const STOP_ONCE = 0x0100_0000;
        const STOP_STRIDE = 0x0200_0000;
        const STOP_EMPTY = 0x0400_0000;
        const AUTO_CUT = 0x0800_0000;

        const FILTER_SPELL_BOOK = 0x1000_0000;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayType {
    Tiny,
    Normal,
    Large,
    String,
}

impl DisplayType {
    /// Large values span two consecutive coffers.
    pub fn coffers_per_step(self) -> usize {
        match self {
            DisplayType::Large => 2,
            DisplayType::Tiny | DisplayType::Normal | DisplayType::String => 1,
        }
    }
}

/// Schema record for one indicator, as loaded from JSON or received at
/// connect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndicatorRecord {
    pub id: u8,
    #[serde(default)]
    pub name: String,
    pub coffer: u8,
    #[serde(default = "default_amount")]
    pub amount: u8,
    pub display_type: DisplayType,
    #[serde(default)]
    pub flags: IndicatorBits,
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub labels: Option<String>,
    #[serde(default)]
    pub likert: Option<String>,
    #[serde(default)]
    pub row: i16,
    #[serde(default)]
    pub col: u16,
    #[serde(default)]
    pub width: u16,
    #[serde(default = "default_attr")]
    pub attr: u8,
}

fn default_amount() -> u8 {
    1
}

fn default_attr() -> u8 {
    TERM_WHITE
}

/// One step of a discrete severity scale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LikertBucket {
    pub threshold: i32,
    pub label: String,
    #[serde(default = "default_attr")]
    pub attr: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrideTest {
    /// Skip coffers holding the empty sentinel.
    Empty,
    /// Skip while the value is not larger than the previous step's.
    Larger,
    /// Skip values that are not positive.
    Positive,
    /// Skip zero values.
    NonZero,
    /// Skip unless the value is less than the next step's.
    Lesser,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stride {
    pub test: StrideTest,
    pub invert: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopPolicy {
    /// Walk every coffer in the sequence.
    Continue,
    /// Stop after the first emission.
    Once,
    /// Stop at the first step that fails its stride test.
    StrideMiss,
    /// An empty coffer ends the sequence.
    Exhausted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextFormat {
    Label(Vec<String>),
    Printf,
    Stat,
    Cut,
    Likert(Vec<LikertBucket>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlOp {
    CarriageReturn,
    LineFeed,
    FormFeed,
    SetColor,
    ResetColor,
    FlipStride,
    DecrementValue,
    ResetCoffer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndicatorFilter {
    /// Hidden for characters that cannot cast from books.
    SpellBook,
}

/// Structured form of [`IndicatorBits`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndicatorConfig {
    pub stop: StopPolicy,
    pub stride: Option<Stride>,
    pub format: TextFormat,
    pub controls: Vec<ControlOp>,
    pub auto_cut: bool,
    pub filter: Option<IndicatorFilter>,
}

const STRIDE_TESTS: [(IndicatorBits, StrideTest); 5] = [
    (IndicatorBits::STRIDE_EMPTY, StrideTest::Empty),
    (IndicatorBits::STRIDE_LARGER, StrideTest::Larger),
    (IndicatorBits::STRIDE_POSITIVE, StrideTest::Positive),
    (IndicatorBits::STRIDE_NONZERO, StrideTest::NonZero),
    (IndicatorBits::STRIDE_LESSER, StrideTest::Lesser),
];

const STOP_POLICIES: [(IndicatorBits, StopPolicy); 3] = [
    (IndicatorBits::STOP_ONCE, StopPolicy::Once),
    (IndicatorBits::STOP_STRIDE, StopPolicy::StrideMiss),
    (IndicatorBits::STOP_EMPTY, StopPolicy::Exhausted),
];

// Bit order is execution order.
const CONTROL_OPS: [(IndicatorBits, ControlOp); 8] = [
    (IndicatorBits::VT_CR, ControlOp::CarriageReturn),
    (IndicatorBits::VT_LF, ControlOp::LineFeed),
    (IndicatorBits::VT_FF, ControlOp::FormFeed),
    (IndicatorBits::VT_COLOR_SET, ControlOp::SetColor),
    (IndicatorBits::VT_COLOR_RESET, ControlOp::ResetColor),
    (IndicatorBits::VT_STRIDE_FLIP, ControlOp::FlipStride),
    (IndicatorBits::VT_DEC_VALUE, ControlOp::DecrementValue),
    (IndicatorBits::VT_COFFER_RESET, ControlOp::ResetCoffer),
];

const TEXT_FORMATS: IndicatorBits = IndicatorBits::TEXT_LABEL
    .union(IndicatorBits::TEXT_PRINTF)
    .union(IndicatorBits::TEXT_STAT)
    .union(IndicatorBits::TEXT_CUT)
    .union(IndicatorBits::TEXT_LIKERT);

impl IndicatorConfig {
    pub fn decode(
        record: &IndicatorRecord,
        label_tables: &BTreeMap<String, Vec<String>>,
        likert_scales: &BTreeMap<String, Vec<LikertBucket>>,
    ) -> Result<Self, DefinitionError> {
        let id = record.id;
        let bits = record.flags;

        let unknown = bits.bits() & !IndicatorBits::all().bits();
        if unknown != 0 {
            return Err(DefinitionError::UnknownBits {
                indicator: id,
                bits: unknown,
            });
        }

        let mut tests = STRIDE_TESTS
            .iter()
            .filter(|(flag, _)| bits.contains(*flag))
            .map(|(_, test)| *test);
        let test = tests.next();
        if tests.next().is_some() {
            return Err(DefinitionError::ConflictingStride(id));
        }
        let invert = bits.contains(IndicatorBits::STRIDE_NOT);
        let stride = match test {
            Some(test) => {
                if matches!(test, StrideTest::Larger | StrideTest::Lesser) && record.amount < 2 {
                    return Err(DefinitionError::StrideNeedsSequence(id));
                }
                Some(Stride { test, invert })
            }
            None if invert => return Err(DefinitionError::InvertWithoutStride(id)),
            None => None,
        };

        let mut stops = STOP_POLICIES
            .iter()
            .filter(|(flag, _)| bits.contains(*flag))
            .map(|(_, stop)| *stop);
        let stop = stops.next().unwrap_or(StopPolicy::Continue);
        if stops.next().is_some() {
            return Err(DefinitionError::ConflictingStop(id));
        }

        let format_bits = bits & TEXT_FORMATS;
        if format_bits.bits().count_ones() != 1 {
            return Err(DefinitionError::TextFormatCount(
                id,
                format_bits.bits().count_ones(),
            ));
        }
        let format = if format_bits == IndicatorBits::TEXT_LABEL {
            let name = record.labels.clone().unwrap_or_default();
            match label_tables.get(&name) {
                Some(labels) => TextFormat::Label(labels.clone()),
                None => {
                    return Err(DefinitionError::MissingLabelTable {
                        indicator: id,
                        name,
                    })
                }
            }
        } else if format_bits == IndicatorBits::TEXT_PRINTF {
            TextFormat::Printf
        } else if format_bits == IndicatorBits::TEXT_STAT {
            TextFormat::Stat
        } else if format_bits == IndicatorBits::TEXT_CUT {
            TextFormat::Cut
        } else {
            let name = record.likert.clone().unwrap_or_default();
            match likert_scales.get(&name) {
                Some(buckets) if !buckets.is_empty() => {
                    let ascending = buckets
                        .windows(2)
                        .all(|pair| pair[0].threshold < pair[1].threshold);
                    if !ascending {
                        return Err(DefinitionError::UnsortedLikert(name));
                    }
                    TextFormat::Likert(buckets.clone())
                }
                _ => {
                    return Err(DefinitionError::MissingLikertScale {
                        indicator: id,
                        name,
                    })
                }
            }
        };
        let is_string = record.display_type == DisplayType::String;
        if is_string != (format == TextFormat::Cut) {
            return Err(DefinitionError::StringDisplayMismatch(id));
        }

        let controls: Vec<ControlOp> = CONTROL_OPS
            .iter()
            .filter(|(flag, _)| bits.contains(*flag))
            .map(|(_, op)| *op)
            .collect();
        let feeds_twice = bits.contains(IndicatorBits::VT_FF)
            && bits.intersects(IndicatorBits::VT_CR | IndicatorBits::VT_LF);
        if feeds_twice {
            return Err(DefinitionError::ConflictingControls(id));
        }

        Ok(Self {
            stop,
            stride,
            format,
            controls,
            auto_cut: bits.contains(IndicatorBits::AUTO_CUT),
            filter: bits
                .contains(IndicatorBits::FILTER_SPELL_BOOK)
                .then_some(IndicatorFilter::SpellBook),
        })
    }

    pub fn has_control(&self, op: ControlOp) -> bool {
        self.controls.contains(&op)
    }

    /// Setting alone needs a letter at every trigger. With resetting too, a
    /// bare trigger is the reset.
    pub fn trigger_color(&self) -> TriggerColor {
        match (
            self.has_control(ControlOp::SetColor),
            self.has_control(ControlOp::ResetColor),
        ) {
            (false, _) => TriggerColor::Never,
            (true, false) => TriggerColor::Required,
            (true, true) => TriggerColor::Optional,
        }
    }
}

/// A fully validated indicator ready for interpretation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndicatorDef {
    pub id: u8,
    pub name: String,
    pub first_coffer: usize,
    pub steps: usize,
    pub display: DisplayType,
    pub config: IndicatorConfig,
    pub template: Template,
    pub row: i16,
    pub col: u16,
    pub width: u16,
    pub attr: u8,
}

impl IndicatorDef {
    pub fn from_record(
        record: &IndicatorRecord,
        label_tables: &BTreeMap<String, Vec<String>>,
        likert_scales: &BTreeMap<String, Vec<LikertBucket>>,
    ) -> Result<Self, DefinitionError> {
        let id = record.id;
        if id as usize >= MAX_INDICATORS {
            return Err(DefinitionError::IndicatorIdOutOfRange(id));
        }
        if record.amount == 0 {
            return Err(DefinitionError::EmptyCofferSequence(id));
        }
        let first = record.coffer as usize;
        let last = first + record.amount as usize * record.display_type.coffers_per_step() - 1;
        if last >= MAX_COFFERS {
            return Err(DefinitionError::CofferOutOfRange {
                indicator: id,
                first,
                last,
            });
        }

        let config = IndicatorConfig::decode(record, label_tables, likert_scales)?;
        let template = Template::parse(&record.prompt, config.trigger_color())
            .map_err(|reason| DefinitionError::Template {
                indicator: id,
                reason,
            })?;
        if !config.controls.is_empty() && !template.has_trigger() {
            return Err(DefinitionError::UnusedControls(id));
        }

        Ok(Self {
            id,
            name: record.name.clone(),
            first_coffer: first,
            steps: record.amount as usize,
            display: record.display_type,
            config,
            template,
            row: record.row,
            col: record.col,
            width: record.width,
            attr: record.attr,
        })
    }

    /// First coffer read by a step.
    pub fn coffer_for_step(&self, step: usize) -> usize {
        self.first_coffer + step * self.display.coffers_per_step()
    }
}

/// Loaded indicators in declaration order.
#[derive(Debug, Clone, Default)]
pub struct IndicatorTable {
    indicators: Vec<IndicatorDef>,
    slots: Vec<Option<usize>>,
}

impl IndicatorTable {
    pub fn new(
        records: &[IndicatorRecord],
        label_tables: &BTreeMap<String, Vec<String>>,
        likert_scales: &BTreeMap<String, Vec<LikertBucket>>,
    ) -> Result<Self, DefinitionError> {
        let mut slots = vec![None; MAX_INDICATORS];
        let mut indicators = Vec::with_capacity(records.len());
        for record in records {
            let def = IndicatorDef::from_record(record, label_tables, likert_scales)?;
            let slot = &mut slots[def.id as usize];
            if slot.is_some() {
                return Err(DefinitionError::DuplicateIndicator(def.id));
            }
            *slot = Some(indicators.len());
            indicators.push(def);
        }
        Ok(Self { indicators, slots })
    }

    pub fn get(&self, id: u8) -> Option<&IndicatorDef> {
        let position = (*self.slots.get(id as usize)?)?;
        self.indicators.get(position)
    }

    pub fn iter(&self) -> impl Iterator<Item = &IndicatorDef> {
        self.indicators.iter()
    }

    pub fn len(&self) -> usize {
        self.indicators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indicators.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::Piece;

    fn record(flags: IndicatorBits) -> IndicatorRecord {
        IndicatorRecord {
            id: 0,
            name: "test".into(),
            coffer: 0,
            amount: 2,
            display_type: DisplayType::Normal,
            flags,
            prompt: "%d".into(),
            labels: None,
            likert: None,
            row: 0,
            col: 0,
            width: 0,
            attr: TERM_WHITE,
        }
    }

    fn decode(record: &IndicatorRecord) -> Result<IndicatorDef, DefinitionError> {
        let mut labels = BTreeMap::new();
        labels.insert("hunger".to_string(), vec!["Weak".to_string()]);
        let mut likert = BTreeMap::new();
        likert.insert(
            "skill".to_string(),
            vec![
                LikertBucket {
                    threshold: 0,
                    label: "Bad".into(),
                    attr: 4,
                },
                LikertBucket {
                    threshold: 10,
                    label: "Good".into(),
                    attr: 5,
                },
            ],
        );
        IndicatorDef::from_record(record, &labels, &likert)
    }

    #[test]
    fn decodes_structured_configuration() {
        let def = decode(&record(
            IndicatorBits::TEXT_PRINTF
                | IndicatorBits::STOP_EMPTY
                | IndicatorBits::STRIDE_NONZERO
                | IndicatorBits::STRIDE_NOT
                | IndicatorBits::AUTO_CUT,
        ))
        .unwrap();
        assert_eq!(def.config.stop, StopPolicy::Exhausted);
        assert_eq!(
            def.config.stride,
            Some(Stride {
                test: StrideTest::NonZero,
                invert: true
            })
        );
        assert_eq!(def.config.format, TextFormat::Printf);
        assert!(def.config.auto_cut);
        assert!(def.config.controls.is_empty());
    }

    #[test]
    fn controls_follow_bit_order() {
        let mut rec = record(
            IndicatorBits::TEXT_PRINTF
                | IndicatorBits::VT_COFFER_RESET
                | IndicatorBits::VT_DEC_VALUE
                | IndicatorBits::VT_CR,
        );
        rec.prompt = "\u{000b}%d".into();
        let def = decode(&rec).unwrap();
        assert_eq!(
            def.config.controls,
            vec![
                ControlOp::CarriageReturn,
                ControlOp::DecrementValue,
                ControlOp::ResetCoffer
            ]
        );
    }

    #[test]
    fn rejects_contradictory_combinations() {
        let both_strides = record(
            IndicatorBits::TEXT_PRINTF | IndicatorBits::STRIDE_EMPTY | IndicatorBits::STRIDE_NONZERO,
        );
        assert_eq!(
            decode(&both_strides).unwrap_err(),
            DefinitionError::ConflictingStride(0)
        );

        let bare_invert = record(IndicatorBits::TEXT_PRINTF | IndicatorBits::STRIDE_NOT);
        assert_eq!(
            decode(&bare_invert).unwrap_err(),
            DefinitionError::InvertWithoutStride(0)
        );

        let two_stops =
            record(IndicatorBits::TEXT_PRINTF | IndicatorBits::STOP_ONCE | IndicatorBits::STOP_EMPTY);
        assert_eq!(
            decode(&two_stops).unwrap_err(),
            DefinitionError::ConflictingStop(0)
        );

        let no_format = record(IndicatorBits::STOP_ONCE);
        assert_eq!(
            decode(&no_format).unwrap_err(),
            DefinitionError::TextFormatCount(0, 0)
        );

        let mut feeds =
            record(IndicatorBits::TEXT_PRINTF | IndicatorBits::VT_FF | IndicatorBits::VT_LF);
        feeds.prompt = "%d\u{000b}".into();
        assert_eq!(
            decode(&feeds).unwrap_err(),
            DefinitionError::ConflictingControls(0)
        );
    }

    #[test]
    fn colour_set_and_reset_share_triggers() {
        let mut rec = record(
            IndicatorBits::TEXT_PRINTF
                | IndicatorBits::VT_COLOR_SET
                | IndicatorBits::VT_COLOR_RESET,
        );
        rec.prompt = "\u{000b}r%d\u{000b}".into();
        let def = decode(&rec).unwrap();
        assert_eq!(def.config.trigger_color(), TriggerColor::Optional);
        assert_eq!(
            def.config.controls,
            vec![ControlOp::SetColor, ControlOp::ResetColor]
        );
        assert_eq!(def.template.segment(0)[0], Piece::Trigger { color: Some(4) });
        assert_eq!(def.template.segment(0)[2], Piece::Trigger { color: None });
    }

    #[test]
    fn rejects_unknown_bits() {
        let rec = record(IndicatorBits::TEXT_PRINTF | IndicatorBits::from_bits_retain(0x8000));
        assert_eq!(
            decode(&rec).unwrap_err(),
            DefinitionError::UnknownBits {
                indicator: 0,
                bits: 0x8000
            }
        );
    }

    #[test]
    fn rejects_coffer_ranges_past_the_bank() {
        let mut rec = record(IndicatorBits::TEXT_PRINTF);
        rec.coffer = 254;
        rec.amount = 1;
        rec.display_type = DisplayType::Large;
        assert!(matches!(
            decode(&rec),
            Err(DefinitionError::CofferOutOfRange {
                first: 254,
                last: 255,
                ..
            })
        ));
    }

    #[test]
    fn neighbour_strides_need_a_sequence() {
        let mut rec = record(IndicatorBits::TEXT_PRINTF | IndicatorBits::STRIDE_LARGER);
        rec.amount = 1;
        assert_eq!(
            decode(&rec).unwrap_err(),
            DefinitionError::StrideNeedsSequence(0)
        );
    }

    #[test]
    fn controls_need_a_trigger_point() {
        let rec = record(IndicatorBits::TEXT_PRINTF | IndicatorBits::VT_LF);
        assert_eq!(decode(&rec).unwrap_err(), DefinitionError::UnusedControls(0));
    }

    #[test]
    fn resolves_label_and_likert_references() {
        let mut labelled = record(IndicatorBits::TEXT_LABEL);
        labelled.labels = Some("hunger".into());
        assert!(matches!(
            decode(&labelled).unwrap().config.format,
            TextFormat::Label(ref labels) if labels.len() == 1
        ));

        labelled.labels = Some("thirst".into());
        assert!(matches!(
            decode(&labelled),
            Err(DefinitionError::MissingLabelTable { .. })
        ));

        let mut scaled = record(IndicatorBits::TEXT_LIKERT);
        scaled.likert = Some("skill".into());
        assert!(matches!(
            decode(&scaled).unwrap().config.format,
            TextFormat::Likert(_)
        ));
    }

    #[test]
    fn string_display_pairs_with_cut() {
        let mut rec = record(IndicatorBits::TEXT_CUT);
        assert_eq!(
            decode(&rec).unwrap_err(),
            DefinitionError::StringDisplayMismatch(0)
        );
        rec.display_type = DisplayType::String;
        assert!(decode(&rec).is_ok());
    }

    #[test]
    fn table_rejects_duplicates() {
        let rec = record(IndicatorBits::TEXT_PRINTF);
        let err = IndicatorTable::new(&[rec.clone(), rec], &BTreeMap::new(), &BTreeMap::new())
            .unwrap_err();
        assert_eq!(err, DefinitionError::DuplicateIndicator(0));
    }
}
