//! Region tag to table field bindings.
//!
//! Each configured region feeds one table field. The last validated reading
//! of every region is cached so that a card can be assembled from a rank
//! region that changed this cycle and a suit region that did not.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::ocr::{EnsembleResult, FieldType, FieldValue};

/// Number of board card slots.
pub const BOARD_SLOTS: u8 = 5;

/// Number of hero card slots.
pub const HERO_SLOTS: u8 = 2;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CardPart {
    Rank,
    Suit,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeatAttr {
    Name,
    Stack,
    Position,
}

/// The table field a region feeds. Card slots are 0-based.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RegionTarget {
    Pot,
    Board { slot: u8, part: CardPart },
    Hero { slot: u8, part: CardPart },
    Seat { seat: u8, attr: SeatAttr },
}

impl RegionTarget {
    pub fn field_type(&self) -> FieldType {
        match self {
            RegionTarget::Pot => FieldType::PotSize,
            RegionTarget::Board { part, .. } | RegionTarget::Hero { part, .. } => match part {
                CardPart::Rank => FieldType::CardRank,
                CardPart::Suit => FieldType::CardSuit,
            },
            RegionTarget::Seat { attr, .. } => match attr {
                SeatAttr::Name => FieldType::PlayerName,
                SeatAttr::Stack => FieldType::StackSize,
                SeatAttr::Position => FieldType::Position,
            },
        }
    }
}

/// Which table fields received a new reading this cycle.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Touched {
    pub pot: bool,
    pub board: bool,
    pub hero: bool,
    pub seats: BTreeSet<u8>,
}

impl Touched {
    pub fn is_empty(&self) -> bool {
        !self.pot && !self.board && !self.hero && self.seats.is_empty()
    }

    fn mark(&mut self, target: RegionTarget) {
        match target {
            RegionTarget::Pot => self.pot = true,
            RegionTarget::Board { .. } => self.board = true,
            RegionTarget::Hero { .. } => self.hero = true,
            RegionTarget::Seat { seat, .. } => {
                self.seats.insert(seat);
            }
        }
    }
}

/// Cached reading of one region.
#[derive(Clone, Debug, PartialEq)]
enum Reading {
    /// The engines agreed the region is empty
    Blank,
    Value { value: FieldValue, confidence: f32 },
}

/// Fields assembled for one seat. Absent fields were never read.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SeatReading {
    pub stack: Option<f64>,
    pub name: Option<String>,
    pub position: Option<String>,
    /// `Some(false)` once the name region reads blank
    pub is_active: Option<bool>,
    pub confidence: f32,
}

pub struct RegionBindings {
    targets: HashMap<String, RegionTarget>,
    readings: HashMap<String, Reading>,
}

impl RegionBindings {
    pub fn new<'a>(bindings: impl IntoIterator<Item = (&'a str, RegionTarget)>) -> Self {
        Self {
            targets: bindings
                .into_iter()
                .map(|(tag, target)| (tag.to_string(), target))
                .collect(),
            readings: HashMap::new(),
        }
    }

    pub fn target(&self, tag: &str) -> Option<RegionTarget> {
        self.targets.get(tag).copied()
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Records the ensemble result for region `tag` and marks its field in
    /// `touched`.
    ///
    /// Blank text from at least one engine records the region as empty; a
    /// validated value replaces the cached one; anything else (no engine
    /// answered, validation failed) keeps the previous reading. Returns
    /// whether the cache changed.
    pub fn apply(&mut self, tag: &str, result: &EnsembleResult, touched: &mut Touched) -> bool {
        let Some(target) = self.target(tag) else {
            log::debug!("No binding for region {}", tag);
            return false;
        };

        let reading = if result.has_observations() && result.text.trim().is_empty() {
            Reading::Blank
        } else if let (true, Some(value)) = (result.validation_passed, result.value.clone()) {
            Reading::Value {
                value,
                confidence: result.confidence,
            }
        } else {
            if result.has_observations() {
                log::debug!(
                    "Keeping previous reading for {}: '{}' rejected ({})",
                    tag,
                    result.text,
                    result.messages.join("; ")
                );
            }
            return false;
        };

        if self.readings.get(tag) == Some(&reading) {
            return false;
        }
        self.readings.insert(tag.to_string(), reading);
        touched.mark(target);
        true
    }

    fn value_of(&self, target: RegionTarget) -> Option<(&FieldValue, f32)> {
        self.targets
            .iter()
            .filter(|(_, t)| **t == target)
            .find_map(|(tag, _)| match self.readings.get(tag) {
                Some(Reading::Value { value, confidence }) => Some((value, *confidence)),
                _ => None,
            })
    }

    fn is_blank(&self, target: RegionTarget) -> bool {
        self.targets
            .iter()
            .filter(|(_, t)| **t == target)
            .any(|(tag, _)| matches!(self.readings.get(tag), Some(Reading::Blank)))
    }

    fn card(&self, rank: RegionTarget, suit: RegionTarget) -> Option<(String, f32)> {
        let (rank_value, rank_conf) = self.value_of(rank)?;
        let (suit_value, suit_conf) = self.value_of(suit)?;
        match (rank_value, suit_value) {
            (FieldValue::Rank(r), FieldValue::Suit(s)) => {
                Some((format!("{}{}", r, s), rank_conf.min(suit_conf)))
            }
            _ => None,
        }
    }

    pub fn pot(&self) -> Option<(f64, f32)> {
        let (value, confidence) = self.value_of(RegionTarget::Pot)?;
        Some((value.as_amount()?, confidence))
    }

    /// Board cards read left to right, stopping at the first incomplete slot.
    pub fn board_cards(&self) -> (Vec<String>, f32) {
        let mut cards = Vec::new();
        let mut confidence = 1.0f32;
        for slot in 0..BOARD_SLOTS {
            let card = self.card(
                RegionTarget::Board {
                    slot,
                    part: CardPart::Rank,
                },
                RegionTarget::Board {
                    slot,
                    part: CardPart::Suit,
                },
            );
            match card {
                Some((card, conf)) => {
                    cards.push(card);
                    confidence = confidence.min(conf);
                }
                None => break,
            }
        }
        if cards.is_empty() {
            confidence = 0.0;
        }
        (cards, confidence)
    }

    /// Both hero cards, or none.
    pub fn hero_cards(&self) -> (Vec<String>, f32) {
        let mut cards = Vec::new();
        let mut confidence = 1.0f32;
        for slot in 0..HERO_SLOTS {
            let card = self.card(
                RegionTarget::Hero {
                    slot,
                    part: CardPart::Rank,
                },
                RegionTarget::Hero {
                    slot,
                    part: CardPart::Suit,
                },
            );
            let Some((card, conf)) = card else {
                return (Vec::new(), 0.0);
            };
            cards.push(card);
            confidence = confidence.min(conf);
        }
        (cards, confidence)
    }

    pub fn seat(&self, seat: u8) -> SeatReading {
        let mut reading = SeatReading::default();
        let mut confidences = Vec::new();

        let name_target = RegionTarget::Seat {
            seat,
            attr: SeatAttr::Name,
        };
        if let Some((value, conf)) = self.value_of(name_target) {
            reading.name = value.as_str().map(str::to_string);
            reading.is_active = Some(true);
            confidences.push(conf);
        } else if self.is_blank(name_target) {
            reading.is_active = Some(false);
        }

        if let Some((value, conf)) = self.value_of(RegionTarget::Seat {
            seat,
            attr: SeatAttr::Stack,
        }) {
            reading.stack = value.as_amount();
            confidences.push(conf);
        }

        if let Some((value, conf)) = self.value_of(RegionTarget::Seat {
            seat,
            attr: SeatAttr::Position,
        }) {
            reading.position = value.as_str().map(str::to_string);
            confidences.push(conf);
        }

        reading.confidence = confidences.iter().copied().fold(f32::NAN, f32::min);
        if reading.confidence.is_nan() {
            reading.confidence = 0.0;
        }
        reading
    }

    /// Seats that have at least one bound region.
    pub fn seats(&self) -> BTreeMap<u8, SeatReading> {
        self.targets
            .values()
            .filter_map(|t| match t {
                RegionTarget::Seat { seat, .. } => Some(*seat),
                _ => None,
            })
            .collect::<BTreeSet<u8>>()
            .into_iter()
            .map(|seat| (seat, self.seat(seat)))
            .collect()
    }
}
