//! Domain validation of OCR text.
//!
//! Every field type maps to a rule and a confusable-character table through
//! `FieldType::spec()`. Validation never fails hard: it reports a reason
//! that the ensemble attaches to its result.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Largest monetary amount accepted from a single reading.
pub const MAX_AMOUNT: f64 = 100_000_000.0;

/// Longest timer value accepted, in seconds.
pub const MAX_TIMER_SECONDS: u32 = 300;

pub const RANKS: [&str; 13] = [
    "A", "K", "Q", "J", "T", "9", "8", "7", "6", "5", "4", "3", "2",
];

pub const POSITIONS: [&str; 10] = [
    "BTN", "SB", "BB", "UTG", "UTG+1", "UTG+2", "MP", "MP+1", "HJ", "CO",
];

pub const BLINDS: [&str; 4] = ["SB", "BB", "ANTE", "STRADDLE"];

/// Pattern for amounts after currency symbols and separators are stripped.
const AMOUNT_PATTERN: &str = r"^(\d+(?:\.\d+)?)([KM]?)$";

const TIMER_PATTERN: &str = r"^(\d{1,2}):(\d{2})$";

fn amount_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(AMOUNT_PATTERN).expect("amount pattern is valid"))
}

fn timer_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(TIMER_PATTERN).expect("timer pattern is valid"))
}

/// The kind of value a region holds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FieldType {
    PlayerName,
    BetSize,
    PotSize,
    StackSize,
    CardRank,
    CardSuit,
    Timer,
    Position,
    Blind,
}

/// A validated, normalized value.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    Text(String),
    Amount(f64),
    /// One of `RANKS`
    Rank(String),
    /// One of "s", "h", "d", "c"
    Suit(char),
    Seconds(u32),
    /// Position or blind label, uppercase
    Label(String),
}

impl FieldValue {
    pub fn as_amount(&self) -> Option<f64> {
        match self {
            FieldValue::Amount(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) | FieldValue::Rank(s) | FieldValue::Label(s) => Some(s),
            _ => None,
        }
    }
}

type Rule = fn(&str) -> Result<FieldValue, String>;

/// Per-field entry of the dispatch table.
pub struct FieldSpec {
    pub rule: Rule,
    /// Character substitutions applied once when `rule` rejects the text
    pub substitutions: &'static [(char, char)],
    /// Default ROI sensitivity for regions holding this field
    pub sensitivity: f32,
}

/// Letters OCR tends to produce in place of digits.
const LETTER_TO_DIGIT: &[(char, char)] = &[
    ('O', '0'),
    ('o', '0'),
    ('D', '0'),
    ('Q', '0'),
    ('I', '1'),
    ('l', '1'),
    ('|', '1'),
    ('i', '1'),
    ('Z', '2'),
    ('z', '2'),
    ('S', '5'),
    ('s', '5'),
    ('G', '6'),
    ('B', '8'),
    ('g', '9'),
];

/// Digits OCR tends to produce in place of letters.
const DIGIT_TO_LETTER: &[(char, char)] = &[
    ('0', 'O'),
    ('1', 'I'),
    ('5', 'S'),
    ('8', 'B'),
    ('6', 'G'),
    ('2', 'Z'),
];

const RANK_FIXES: &[(char, char)] = &[('1', 'T'), ('I', 'T'), ('l', 'J'), ('B', '8'), ('S', '5'), ('Z', '2')];

const SUIT_FIXES: &[(char, char)] = &[('5', 's'), ('$', 's'), ('n', 'h'), ('0', 'd'), ('e', 'c')];

const NO_FIXES: &[(char, char)] = &[];

static PLAYER_NAME: FieldSpec = FieldSpec {
    rule: validate_player_name,
    substitutions: NO_FIXES,
    sensitivity: 0.15,
};

static MONEY: FieldSpec = FieldSpec {
    rule: validate_amount,
    substitutions: LETTER_TO_DIGIT,
    sensitivity: 0.05,
};

static CARD_RANK: FieldSpec = FieldSpec {
    rule: validate_rank,
    substitutions: RANK_FIXES,
    sensitivity: 0.10,
};

static CARD_SUIT: FieldSpec = FieldSpec {
    rule: validate_suit,
    substitutions: SUIT_FIXES,
    sensitivity: 0.10,
};

static TIMER: FieldSpec = FieldSpec {
    rule: validate_timer,
    substitutions: LETTER_TO_DIGIT,
    sensitivity: 0.03,
};

static POSITION: FieldSpec = FieldSpec {
    rule: validate_position,
    substitutions: DIGIT_TO_LETTER,
    sensitivity: 0.20,
};

static BLIND: FieldSpec = FieldSpec {
    rule: validate_blind,
    substitutions: DIGIT_TO_LETTER,
    sensitivity: 0.20,
};

impl FieldType {
    pub const ALL: [FieldType; 9] = [
        FieldType::PlayerName,
        FieldType::BetSize,
        FieldType::PotSize,
        FieldType::StackSize,
        FieldType::CardRank,
        FieldType::CardSuit,
        FieldType::Timer,
        FieldType::Position,
        FieldType::Blind,
    ];

    pub fn spec(self) -> &'static FieldSpec {
        match self {
            FieldType::PlayerName => &PLAYER_NAME,
            FieldType::BetSize | FieldType::PotSize | FieldType::StackSize => &MONEY,
            FieldType::CardRank => &CARD_RANK,
            FieldType::CardSuit => &CARD_SUIT,
            FieldType::Timer => &TIMER,
            FieldType::Position => &POSITION,
            FieldType::Blind => &BLIND,
        }
    }

    pub fn sensitivity(self) -> f32 {
        self.spec().sensitivity
    }
}

/// Result of validating one piece of text.
#[derive(Clone, Debug, PartialEq)]
pub struct Validation {
    /// The text that passed (or the last text tried)
    pub text: String,
    pub value: Option<FieldValue>,
    pub messages: Vec<String>,
    pub corrected: bool,
}

impl Validation {
    pub fn passed(&self) -> bool {
        self.value.is_some()
    }
}

/// Validates `text` for `field`, retrying once with confusable characters
/// substituted when the first attempt fails.
pub fn validate(field: FieldType, text: &str) -> Validation {
    let spec = field.spec();

    let first_error = match (spec.rule)(text) {
        Ok(value) => {
            return Validation {
                text: text.to_string(),
                value: Some(value),
                messages: Vec::new(),
                corrected: false,
            };
        }
        Err(e) => e,
    };

    let substituted = substitute(text, spec.substitutions);
    if substituted != text {
        match (spec.rule)(&substituted) {
            Ok(value) => {
                return Validation {
                    messages: vec![format!("auto-corrected: '{}' -> '{}'", text, substituted)],
                    text: substituted,
                    value: Some(value),
                    corrected: true,
                };
            }
            Err(second_error) => {
                return Validation {
                    text: text.to_string(),
                    value: None,
                    messages: vec![
                        first_error,
                        format!("after substitution '{}': {}", substituted, second_error),
                    ],
                    corrected: false,
                };
            }
        }
    }

    Validation {
        text: text.to_string(),
        value: None,
        messages: vec![first_error],
        corrected: false,
    }
}

/// Replaces every character found in `table`, in one pass.
pub fn substitute(text: &str, table: &[(char, char)]) -> String {
    text.chars()
        .map(|c| {
            table
                .iter()
                .find(|(from, _)| *from == c)
                .map(|(_, to)| *to)
                .unwrap_or(c)
        })
        .collect()
}

pub fn validate_player_name(text: &str) -> Result<FieldValue, String> {
    let name = text.trim();
    let len = name.chars().count();
    if !(2..=20).contains(&len) {
        return Err(format!("player name length {} outside 2-20", len));
    }
    if !name.chars().any(|c| c.is_alphanumeric()) {
        return Err(format!("player name '{}' has no alphanumerics", name));
    }
    Ok(FieldValue::Text(name.to_string()))
}

/// Parses a monetary amount, removing currency symbols, whitespace and
/// thousands separators. Accepts a K/M magnitude suffix.
pub fn parse_amount(text: &str) -> Result<f64, String> {
    let cleaned: String = text
        .chars()
        .filter(|c| !matches!(c, '$' | '€' | '£' | '¥' | '₹' | ',' | '_') && !c.is_whitespace())
        .collect::<String>()
        .to_uppercase();

    if cleaned.starts_with('-') {
        return Err(format!("negative amount '{}'", text));
    }

    let caps = amount_regex()
        .captures(&cleaned)
        .ok_or_else(|| format!("'{}' is not a monetary amount", text))?;

    let base: f64 = caps[1]
        .parse()
        .map_err(|e| format!("failed to parse amount '{}': {}", text, e))?;
    let multiplier = match &caps[2] {
        "K" => 1_000.0,
        "M" => 1_000_000.0,
        _ => 1.0,
    };

    Ok(base * multiplier)
}

pub fn validate_amount(text: &str) -> Result<FieldValue, String> {
    let amount = parse_amount(text)?;
    if !amount.is_finite() || amount > MAX_AMOUNT {
        return Err(format!("amount {} above ceiling {}", amount, MAX_AMOUNT));
    }
    Ok(FieldValue::Amount(amount))
}

/// Maps rank spellings to the single-character rank token.
pub fn normalize_rank(text: &str) -> Option<&'static str> {
    let upper = text.trim().to_uppercase();
    let token = match upper.as_str() {
        "10" | "0" | "O" => "T",
        other => other,
    };
    RANKS.iter().copied().find(|r| *r == token)
}

pub fn validate_rank(text: &str) -> Result<FieldValue, String> {
    normalize_rank(text)
        .map(|r| FieldValue::Rank(r.to_string()))
        .ok_or_else(|| format!("'{}' is not a card rank", text.trim()))
}

/// Maps a suit symbol or letter to one of 's', 'h', 'd', 'c'.
pub fn normalize_suit(text: &str) -> Option<char> {
    let trimmed = text.trim();
    let mut chars = trimmed.chars();
    let c = chars.next()?;
    if chars.next().is_some() {
        return None;
    }
    match c {
        '♠' | '♤' | 's' | 'S' => Some('s'),
        '♥' | '♡' | 'h' | 'H' => Some('h'),
        '♦' | '♢' | 'd' | 'D' => Some('d'),
        '♣' | '♧' | 'c' | 'C' => Some('c'),
        _ => None,
    }
}

pub fn validate_suit(text: &str) -> Result<FieldValue, String> {
    normalize_suit(text)
        .map(FieldValue::Suit)
        .ok_or_else(|| format!("'{}' is not a card suit", text.trim()))
}

pub fn validate_timer(text: &str) -> Result<FieldValue, String> {
    let trimmed = text.trim();

    let seconds = if let Some(caps) = timer_regex().captures(trimmed) {
        let minutes: u32 = caps[1].parse().map_err(|_| format!("bad minutes in '{}'", trimmed))?;
        let secs: u32 = caps[2].parse().map_err(|_| format!("bad seconds in '{}'", trimmed))?;
        if secs >= 60 {
            return Err(format!("timer '{}' has {} seconds", trimmed, secs));
        }
        minutes * 60 + secs
    } else if !trimmed.is_empty() && trimmed.chars().all(|c| c.is_ascii_digit()) {
        trimmed
            .parse()
            .map_err(|_| format!("timer '{}' out of range", trimmed))?
    } else {
        return Err(format!("'{}' is not a timer", trimmed));
    };

    if seconds > MAX_TIMER_SECONDS {
        return Err(format!("timer {}s above {}s", seconds, MAX_TIMER_SECONDS));
    }
    Ok(FieldValue::Seconds(seconds))
}

fn validate_label(text: &str, vocabulary: &[&str], what: &str) -> Result<FieldValue, String> {
    let upper = text.trim().to_uppercase();
    vocabulary
        .iter()
        .find(|v| **v == upper)
        .map(|v| FieldValue::Label(v.to_string()))
        .ok_or_else(|| format!("'{}' is not a {}", text.trim(), what))
}

pub fn validate_position(text: &str) -> Result<FieldValue, String> {
    validate_label(text, &POSITIONS, "position")
}

pub fn validate_blind(text: &str) -> Result<FieldValue, String> {
    validate_label(text, &BLINDS, "blind label")
}
