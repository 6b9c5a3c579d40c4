//! Card-table vocabulary shared by the sanity checker and the dispatcher.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::ocr::validate::{normalize_rank, normalize_suit};

/// Betting round, determined by how many board cards are showing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Street {
    #[default]
    Preflop,
    Flop,
    Turn,
    River,
}

impl Street {
    pub fn expected_board_cards(self) -> usize {
        match self {
            Street::Preflop => 0,
            Street::Flop => 3,
            Street::Turn => 4,
            Street::River => 5,
        }
    }

    /// Street implied by a board of `count` cards, if it is a legal count.
    pub fn from_board_count(count: usize) -> Option<Street> {
        match count {
            0 => Some(Street::Preflop),
            3 => Some(Street::Flop),
            4 => Some(Street::Turn),
            5 => Some(Street::River),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Street::Preflop => "preflop",
            Street::Flop => "flop",
            Street::Turn => "turn",
            Street::River => "river",
        }
    }
}

impl fmt::Display for Street {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Street {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "preflop" | "pre-flop" => Ok(Street::Preflop),
            "flop" => Ok(Street::Flop),
            "turn" => Ok(Street::Turn),
            "river" => Ok(Street::River),
            other => Err(format!("unknown street '{}'", other)),
        }
    }
}

/// Player actions that can be read off the table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Fold,
    Check,
    Call,
    Bet,
    Raise,
    AllIn,
    PostBlind,
}

impl ActionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ActionKind::Fold => "fold",
            ActionKind::Check => "check",
            ActionKind::Call => "call",
            ActionKind::Bet => "bet",
            ActionKind::Raise => "raise",
            ActionKind::AllIn => "all_in",
            ActionKind::PostBlind => "post_blind",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ActionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace(['-', ' '], "_").as_str() {
            "fold" => Ok(ActionKind::Fold),
            "check" => Ok(ActionKind::Check),
            "call" => Ok(ActionKind::Call),
            "bet" => Ok(ActionKind::Bet),
            "raise" => Ok(ActionKind::Raise),
            "all_in" | "allin" => Ok(ActionKind::AllIn),
            "post_blind" | "post" | "small_blind" | "big_blind" => Ok(ActionKind::PostBlind),
            other => Err(format!("unknown action '{}'", other)),
        }
    }
}

/// Normalizes a two-part card such as "Ah", "10♠" or "td" to rank + suit
/// letter ("Ah", "Ts", "Td"). Returns `None` when either part is invalid.
pub fn normalize_card(card: &str) -> Option<String> {
    let trimmed = card.trim();
    let suit_char = trimmed.chars().last()?;
    let rank_part = &trimmed[..trimmed.len() - suit_char.len_utf8()];
    let rank = normalize_rank(rank_part)?;
    let suit = normalize_suit(&suit_char.to_string())?;
    Some(format!("{}{}", rank, suit))
}

/// Card identity used for duplicate checks: normalized when possible, the
/// raw trimmed text otherwise.
pub fn card_key(card: &str) -> String {
    normalize_card(card).unwrap_or_else(|| card.trim().to_string())
}
