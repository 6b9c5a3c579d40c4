//! Consistency rules for extracted table state.
//!
//! Every check is a pure function returning a `SanityResult`; none of them
//! panic or return errors. A result fails only on `Error` or `Critical`
//! violations. Missing fields are not applicable and pass.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

use crate::table::{card_key, ActionKind, Street};

/// Pots above this are flagged as suspicious.
pub const MAX_REASONABLE_POT: f64 = 1_000_000.0;

/// Stacks above this are flagged as suspicious.
pub const MAX_REASONABLE_STACK: f64 = 10_000_000.0;

/// Bets larger than this multiple of the pot are flagged.
pub const MAX_BET_TO_POT_RATIO: f64 = 100.0;

pub const MIN_PLAYERS: usize = 2;
pub const MAX_PLAYERS: usize = 10;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Error,
    Critical,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Violation {
    pub field: String,
    pub message: String,
    pub severity: Severity,
    pub value: serde_json::Value,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct SanityResult {
    pub violations: Vec<Violation>,
}

impl SanityResult {
    pub fn ok() -> Self {
        Self::default()
    }

    pub fn passed(&self) -> bool {
        !self
            .violations
            .iter()
            .any(|v| v.severity >= Severity::Error)
    }

    pub fn has_severity(&self, severity: Severity) -> bool {
        self.violations.iter().any(|v| v.severity == severity)
    }

    fn push(&mut self, field: &str, severity: Severity, message: String, value: serde_json::Value) {
        self.violations.push(Violation {
            field: field.to_string(),
            message,
            severity,
            value,
        });
    }

    /// Appends the violations of `other`, keeping order.
    pub fn merge(&mut self, other: SanityResult) {
        self.violations.extend(other.violations);
    }

    pub fn summary(&self) -> String {
        self.violations
            .iter()
            .map(|v| format!("{}: {}", v.field, v.message))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

fn check_amount(field: &str, amount: f64, ceiling: f64) -> SanityResult {
    let mut result = SanityResult::ok();
    if !amount.is_finite() {
        result.push(field, Severity::Error, format!("{} is not a number", field), serde_json::Value::Null);
    } else if amount < 0.0 {
        result.push(field, Severity::Error, format!("{} is negative", field), amount.into());
    } else if amount > ceiling {
        result.push(
            field,
            Severity::Warning,
            format!("{} {} exceeds {}", field, amount, ceiling),
            amount.into(),
        );
    }
    result
}

pub fn check_pot_size(pot: f64) -> SanityResult {
    check_amount("pot", pot, MAX_REASONABLE_POT)
}

pub fn check_stack_size(stack: f64) -> SanityResult {
    check_amount("stack", stack, MAX_REASONABLE_STACK)
}

/// Checks a bet; when the pot is known, bets over 100x the pot are flagged.
pub fn check_bet_amount(bet: f64, pot: Option<f64>) -> SanityResult {
    let mut result = SanityResult::ok();
    if !bet.is_finite() || bet < 0.0 {
        result.push("bet", Severity::Error, "bet is negative or not a number".to_string(), bet.into());
        return result;
    }
    if let Some(pot) = pot {
        if pot > 0.0 && bet > pot * MAX_BET_TO_POT_RATIO {
            result.push(
                "bet",
                Severity::Warning,
                format!("bet {} is more than {}x the pot {}", bet, MAX_BET_TO_POT_RATIO, pot),
                bet.into(),
            );
        }
    }
    result
}

pub fn check_player_count(count: usize) -> SanityResult {
    let mut result = SanityResult::ok();
    if !(MIN_PLAYERS..=MAX_PLAYERS).contains(&count) {
        result.push(
            "player_count",
            Severity::Error,
            format!("{} players outside {}-{}", count, MIN_PLAYERS, MAX_PLAYERS),
            count.into(),
        );
    }
    result
}

fn check_duplicates(field: &str, cards: &[String], result: &mut SanityResult) {
    let mut seen = HashSet::new();
    for card in cards {
        if !seen.insert(card_key(card)) {
            result.push(
                field,
                Severity::Critical,
                format!("duplicate card {} in {}", card, field),
                card.as_str().into(),
            );
        }
    }
}

pub fn check_board_cards(cards: &[String]) -> SanityResult {
    let mut result = SanityResult::ok();
    if !matches!(cards.len(), 0 | 3 | 4 | 5) {
        result.push(
            "board_cards",
            Severity::Error,
            format!("board has {} cards", cards.len()),
            cards.len().into(),
        );
    }
    check_duplicates("board_cards", cards, &mut result);
    result
}

/// Hole cards must be exactly two when present.
pub fn check_hole_cards(cards: &[String]) -> SanityResult {
    let mut result = SanityResult::ok();
    if cards.is_empty() {
        return result;
    }
    if cards.len() != 2 {
        result.push(
            "hole_cards",
            Severity::Error,
            format!("{} hole cards", cards.len()),
            cards.len().into(),
        );
    }
    check_duplicates("hole_cards", cards, &mut result);
    result
}

pub fn check_card_overlap(hole: &[String], board: &[String]) -> SanityResult {
    let mut result = SanityResult::ok();
    let board_keys: HashSet<String> = board.iter().map(|c| card_key(c)).collect();
    for card in hole {
        if board_keys.contains(&card_key(card)) {
            result.push(
                "cards",
                Severity::Critical,
                format!("card {} is both a hole card and on the board", card),
                card.as_str().into(),
            );
        }
    }
    result
}

pub fn check_action(action: &str) -> SanityResult {
    let mut result = SanityResult::ok();
    if let Err(e) = action.parse::<ActionKind>() {
        result.push("action", Severity::Error, e, action.into());
    }
    result
}

/// The board can lag the street label by a frame, so a mismatch is a warning.
pub fn check_street(street: &str, board_count: Option<usize>) -> SanityResult {
    let mut result = SanityResult::ok();
    let street = match street.parse::<Street>() {
        Ok(s) => s,
        Err(e) => {
            result.push("street", Severity::Error, e, street.into());
            return result;
        }
    };
    if let Some(count) = board_count {
        let expected = street.expected_board_cards();
        if count != expected {
            result.push(
                "street",
                Severity::Warning,
                format!("{} expects {} board cards, saw {}", street, expected, count),
                count.into(),
            );
        }
    }
    result
}

/// A full or partial proposed state. Absent fields are skipped.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ProposedState {
    #[serde(default)]
    pub pot: Option<f64>,
    #[serde(default)]
    pub stacks: Option<BTreeMap<u8, f64>>,
    #[serde(default)]
    pub bet: Option<f64>,
    #[serde(default)]
    pub player_count: Option<usize>,
    #[serde(default)]
    pub board_cards: Option<Vec<String>>,
    #[serde(default)]
    pub hole_cards: Option<Vec<String>>,
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub street: Option<String>,
}

/// Runs every applicable check and unions the violations.
pub fn check_state(state: &ProposedState) -> SanityResult {
    let mut result = SanityResult::ok();

    if let Some(pot) = state.pot {
        result.merge(check_pot_size(pot));
    }
    if let Some(stacks) = &state.stacks {
        for stack in stacks.values() {
            result.merge(check_stack_size(*stack));
        }
    }
    if let Some(bet) = state.bet {
        result.merge(check_bet_amount(bet, state.pot));
    }
    if let Some(count) = state.player_count {
        result.merge(check_player_count(count));
    }
    if let Some(board) = &state.board_cards {
        result.merge(check_board_cards(board));
    }
    if let Some(hole) = &state.hole_cards {
        result.merge(check_hole_cards(hole));
    }
    if let (Some(hole), Some(board)) = (&state.hole_cards, &state.board_cards) {
        result.merge(check_card_overlap(hole, board));
    }
    if let Some(action) = &state.action {
        result.merge(check_action(action));
    }
    if let Some(street) = &state.street {
        result.merge(check_street(street, state.board_cards.as_ref().map(Vec::len)));
    }

    result
}
