use serde::Serialize;
use std::collections::BTreeMap;

use crate::table::Street;

/// What is known about one seat. Persists across hands.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct SeatState {
    pub stack: Option<f64>,
    pub name: Option<String>,
    pub position: Option<String>,
    pub is_active: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct PerformanceSample {
    pub fps: f64,
    pub frame_time_ms: f64,
    pub memory_mb: Option<f64>,
    pub cpu_percent: Option<f64>,
}

/// The canonical table state.
///
/// Hand-scoped fields (pot, side pots, board, hero cards, street) are cleared
/// by `clear_hand`; seats, button and performance survive it.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct TableSnapshot {
    pub pot: f64,
    pub side_pots: Vec<f64>,
    /// 0, 3, 4 or 5 cards
    pub board_cards: Vec<String>,
    /// 0 or 2 cards
    pub hero_cards: Vec<String>,
    pub seats: BTreeMap<u8, SeatState>,
    pub street: Street,
    pub hand_id: Option<String>,
    pub button_seat: Option<u8>,
    pub performance: Option<PerformanceSample>,
}

impl TableSnapshot {
    pub fn clear_hand(&mut self) {
        self.pot = 0.0;
        self.side_pots.clear();
        self.board_cards.clear();
        self.hero_cards.clear();
        self.street = Street::Preflop;
    }

    pub fn active_players(&self) -> usize {
        self.seats.values().filter(|s| s.is_active).count()
    }

    pub fn player_name(&self, seat: u8) -> Option<&str> {
        self.seats.get(&seat).and_then(|s| s.name.as_deref())
    }
}
