//! Owner of the canonical table snapshot.
//!
//! Proposed values from one capture cycle come in through the `update_*`
//! methods. Each is sanity-checked, compared with the stored state with a
//! field-appropriate tolerance, and on a real change the snapshot is mutated
//! and an event is published tagged with the cycle's correlation id.
//!
//! The dispatcher itself is the single writer. Other threads read through a
//! `DispatcherHandle`, which only ever sees whole updates.

use serde::Serialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

use super::events::{DetectionEvent, EventCategory, EventSeverity};
use super::queue::{EventPublisher, QueueMonitor, QueueStats};
use super::snapshot::{PerformanceSample, SeatState, TableSnapshot};
use crate::sanity::{self, SanityResult};
use crate::table::{card_key, ActionKind, Street};

/// Pot and stack differences at or below this are treated as OCR noise.
pub const CURRENCY_EPSILON: f64 = 0.01;

/// Relative fps change needed before a performance event is emitted.
pub const FPS_CHANGE_RATIO: f64 = 0.20;

/// Absolute frame-time change needed before a performance event is emitted.
pub const FRAME_TIME_CHANGE_MS: f64 = 10.0;

/// Below this frame rate performance events are warnings.
const LOW_FPS: f64 = 10.0;

/// Point-in-time dispatcher counters.
#[derive(Clone, Debug, Default, Serialize)]
pub struct DispatcherStats {
    pub events_total: u64,
    pub events_by_category: BTreeMap<String, u64>,
    pub rejected_updates: u64,
    pub hands_started: u64,
    pub hands_reset: u64,
    pub frames: u64,
    pub hand_id: Option<String>,
    pub street: Street,
    pub pot: f64,
    pub active_players: usize,
    pub queue: QueueStats,
}

#[derive(Default)]
struct Shared {
    snapshot: TableSnapshot,
    stats: DispatcherStats,
}

fn read(shared: &RwLock<Shared>) -> RwLockReadGuard<'_, Shared> {
    shared.read().unwrap_or_else(|e| e.into_inner())
}

fn write(shared: &RwLock<Shared>) -> RwLockWriteGuard<'_, Shared> {
    shared.write().unwrap_or_else(|e| e.into_inner())
}

/// Read-only view for status readers on other threads.
#[derive(Clone)]
pub struct DispatcherHandle {
    shared: Arc<RwLock<Shared>>,
    queue: QueueMonitor,
}

impl DispatcherHandle {
    /// A copy of the snapshot taken under the lock.
    pub fn snapshot(&self) -> TableSnapshot {
        read(&self.shared).snapshot.clone()
    }

    pub fn stats(&self) -> DispatcherStats {
        let shared = read(&self.shared);
        collect_stats(&shared, self.queue.stats())
    }
}

fn collect_stats(shared: &Shared, queue: QueueStats) -> DispatcherStats {
    DispatcherStats {
        hand_id: shared.snapshot.hand_id.clone(),
        street: shared.snapshot.street,
        pot: shared.snapshot.pot,
        active_players: shared.snapshot.active_players(),
        queue,
        ..shared.stats.clone()
    }
}

pub struct StateDispatcher {
    shared: Arc<RwLock<Shared>>,
    publisher: EventPublisher,
    correlation_id: Option<String>,
    sequence: u64,
}

fn amounts_differ(a: &[f64], b: &[f64]) -> bool {
    a.len() != b.len()
        || a.iter()
            .zip(b)
            .any(|(x, y)| (x - y).abs() > CURRENCY_EPSILON)
}

fn new_hand_id() -> String {
    Uuid::new_v4().to_string()
}

impl StateDispatcher {
    pub fn new(publisher: EventPublisher) -> Self {
        Self {
            shared: Arc::new(RwLock::new(Shared::default())),
            publisher,
            correlation_id: None,
            sequence: 0,
        }
    }

    pub fn handle(&self) -> DispatcherHandle {
        DispatcherHandle {
            shared: Arc::clone(&self.shared),
            queue: self.publisher.monitor(),
        }
    }

    pub fn snapshot(&self) -> TableSnapshot {
        read(&self.shared).snapshot.clone()
    }

    pub fn get_stats(&self) -> DispatcherStats {
        let shared = read(&self.shared);
        collect_stats(&shared, self.publisher.stats())
    }

    pub fn correlation_id(&self) -> Option<&str> {
        self.correlation_id.as_deref()
    }

    /// Starts a capture cycle and returns its correlation id.
    pub fn begin_frame(&mut self) -> String {
        let id = Uuid::new_v4().to_string();
        self.correlation_id = Some(id.clone());
        write(&self.shared).stats.frames += 1;
        id
    }

    pub fn end_frame(&mut self) {
        self.correlation_id = None;
    }

    fn emit(
        &mut self,
        shared: &mut Shared,
        category: EventCategory,
        severity: EventSeverity,
        message: String,
        payload: serde_json::Value,
    ) {
        self.sequence += 1;
        log::debug!("event #{} {}: {}", self.sequence, category, message);

        let event = DetectionEvent::new(
            self.sequence,
            category,
            severity,
            message,
            payload,
            self.correlation_id.clone(),
        );

        shared.stats.events_total += 1;
        *shared
            .stats
            .events_by_category
            .entry(category.as_str().to_string())
            .or_default() += 1;

        self.publisher.publish(event);
    }

    fn reject(shared: &mut Shared, what: &str, result: &SanityResult) {
        shared.stats.rejected_updates += 1;
        log::warn!("Rejected {} update: {}", what, result.summary());
    }

    pub fn update_pot(&mut self, pot: f64, side_pots: &[f64], confidence: f32) -> bool {
        let shared_arc = Arc::clone(&self.shared);
        let mut shared = write(&shared_arc);

        let mut check = sanity::check_pot_size(pot);
        for side in side_pots {
            check.merge(sanity::check_pot_size(*side));
        }
        if !check.passed() {
            Self::reject(&mut shared, "pot", &check);
            return false;
        }

        let old_pot = shared.snapshot.pot;
        let old_side = shared.snapshot.side_pots.clone();
        let changed =
            (pot - old_pot).abs() > CURRENCY_EPSILON || amounts_differ(&old_side, side_pots);
        if !changed {
            return false;
        }

        let payload = json!({
            "old_pot": old_pot,
            "new_pot": pot,
            "old_side_pots": old_side,
            "side_pots": side_pots,
            "confidence": confidence,
            "hand_id": shared.snapshot.hand_id,
        });
        self.emit(
            &mut shared,
            EventCategory::Pot,
            EventSeverity::Info,
            format!("Pot {:.2} -> {:.2}", old_pot, pot),
            payload,
        );

        shared.snapshot.pot = pot;
        shared.snapshot.side_pots = side_pots.to_vec();
        true
    }

    pub fn update_board_cards(&mut self, cards: &[String], confidence: f32) -> bool {
        let shared_arc = Arc::clone(&self.shared);
        let mut shared = write(&shared_arc);

        let cards: Vec<String> = cards.iter().map(|c| card_key(c)).collect();

        let mut check = sanity::check_board_cards(&cards);
        check.merge(sanity::check_card_overlap(&shared.snapshot.hero_cards, &cards));
        if !check.passed() {
            Self::reject(&mut shared, "board", &check);
            return false;
        }

        let old_cards = shared.snapshot.board_cards.clone();
        if old_cards == cards {
            return false;
        }

        let payload = json!({
            "target": "board",
            "old_cards": old_cards,
            "cards": cards,
            "confidence": confidence,
            "hand_id": shared.snapshot.hand_id,
        });
        self.emit(
            &mut shared,
            EventCategory::Card,
            EventSeverity::Info,
            format!("Board: {}", cards.join(" ")),
            payload,
        );

        let old_street = shared.snapshot.street;
        if cards.len() > old_cards.len() {
            if let Some(new_street) = Street::from_board_count(cards.len()).filter(|s| *s != Street::Preflop) {
                let payload = json!({
                    "transition": "street",
                    "from": old_street,
                    "to": new_street,
                    "hand_id": shared.snapshot.hand_id,
                });
                self.emit(
                    &mut shared,
                    EventCategory::StateTransition,
                    EventSeverity::Info,
                    format!("Street {} -> {}", old_street, new_street),
                    payload,
                );
                shared.snapshot.street = new_street;
            }
        } else if let Some(street) = Street::from_board_count(cards.len()) {
            // Board shrank or was replaced: follow it without a transition
            shared.snapshot.street = street;
        }

        shared.snapshot.board_cards = cards;
        true
    }

    pub fn update_hero_cards(&mut self, cards: &[String], confidence: f32) -> bool {
        let shared_arc = Arc::clone(&self.shared);
        let mut shared = write(&shared_arc);

        let cards: Vec<String> = cards.iter().map(|c| card_key(c)).collect();

        let mut check = sanity::check_hole_cards(&cards);
        check.merge(sanity::check_card_overlap(&cards, &shared.snapshot.board_cards));
        if !check.passed() {
            Self::reject(&mut shared, "hero cards", &check);
            return false;
        }

        let old_cards = shared.snapshot.hero_cards.clone();
        if old_cards == cards {
            return false;
        }

        let payload = json!({
            "target": "hero",
            "old_cards": old_cards,
            "cards": cards,
            "confidence": confidence,
            "hand_id": shared.snapshot.hand_id,
        });
        self.emit(
            &mut shared,
            EventCategory::Card,
            EventSeverity::Info,
            format!("Hero cards: {}", cards.join(" ")),
            payload,
        );

        if old_cards.is_empty() && cards.len() == 2 {
            let hand_id = shared.snapshot.hand_id.get_or_insert_with(new_hand_id).clone();
            shared.stats.hands_started += 1;
            let payload = json!({
                "transition": "hand_start",
                "hand_id": hand_id,
                "cards": cards,
            });
            self.emit(
                &mut shared,
                EventCategory::StateTransition,
                EventSeverity::Success,
                format!("Hand {} started", hand_id),
                payload,
            );
        }

        shared.snapshot.hero_cards = cards;
        true
    }

    /// Updates the supplied fields of `seat`. One event carrying every
    /// supplied field is emitted when any of them differs.
    pub fn update_player(
        &mut self,
        seat: u8,
        stack: Option<f64>,
        name: Option<&str>,
        position: Option<&str>,
        is_active: Option<bool>,
        confidence: f32,
    ) -> bool {
        let shared_arc = Arc::clone(&self.shared);
        let mut shared = write(&shared_arc);

        if let Some(stack) = stack {
            let check = sanity::check_stack_size(stack);
            if !check.passed() {
                Self::reject(&mut shared, "player", &check);
                return false;
            }
        }

        let current = shared.snapshot.seats.get(&seat).cloned().unwrap_or_default();

        let stack_changed = stack.is_some_and(|s| {
            current
                .stack
                .is_none_or(|old| (s - old).abs() > CURRENCY_EPSILON)
        });
        let name_changed = name.is_some_and(|n| current.name.as_deref() != Some(n));
        let position_changed = position.is_some_and(|p| current.position.as_deref() != Some(p));
        let active_changed = is_active.is_some_and(|a| a != current.is_active);

        if !(stack_changed || name_changed || position_changed || active_changed) {
            return false;
        }

        let payload = json!({
            "seat": seat,
            "stack": stack,
            "name": name,
            "position": position,
            "is_active": is_active,
            "old_stack": current.stack,
            "confidence": confidence,
        });
        let label = name
            .map(str::to_string)
            .or_else(|| current.name.clone())
            .unwrap_or_else(|| format!("seat {}", seat));
        self.emit(
            &mut shared,
            EventCategory::Player,
            EventSeverity::Info,
            format!("Player {} updated", label),
            payload,
        );

        let entry = shared.snapshot.seats.entry(seat).or_insert_with(SeatState::default);
        if let Some(s) = stack {
            entry.stack = Some(s);
        }
        if let Some(n) = name {
            entry.name = Some(n.to_string());
        }
        if let Some(p) = position {
            entry.position = Some(p.to_string());
        }
        if let Some(a) = is_active {
            entry.is_active = a;
        }
        if position.is_some_and(|p| p.eq_ignore_ascii_case("BTN")) {
            shared.snapshot.button_seat = Some(seat);
        }
        true
    }

    /// Publishes an action. Actions are not diffed: every call that passes
    /// the sanity check emits.
    pub fn emit_player_action(
        &mut self,
        seat: u8,
        action: &str,
        amount: Option<f64>,
        confidence: f32,
    ) -> bool {
        let shared_arc = Arc::clone(&self.shared);
        let mut shared = write(&shared_arc);

        let mut check = sanity::check_action(action);
        if let Some(amount) = amount {
            check.merge(sanity::check_bet_amount(amount, Some(shared.snapshot.pot)));
        }
        if !check.passed() {
            Self::reject(&mut shared, "action", &check);
            return false;
        }
        let Ok(kind) = action.parse::<ActionKind>() else {
            return false;
        };

        let player = shared.snapshot.player_name(seat).map(str::to_string);
        let label = player.clone().unwrap_or_else(|| format!("Seat {}", seat));
        let message = match amount {
            Some(a) => format!("{} {} {:.2}", label, kind, a),
            None => format!("{} {}", label, kind),
        };
        let severity = if kind == ActionKind::AllIn {
            EventSeverity::Warning
        } else {
            EventSeverity::Info
        };
        let payload = json!({
            "seat": seat,
            "action": kind,
            "amount": amount,
            "player": player,
            "confidence": confidence,
            "hand_id": shared.snapshot.hand_id,
            "street": shared.snapshot.street,
        });
        self.emit(&mut shared, EventCategory::Action, severity, message, payload);
        true
    }

    /// Emits when fps moves by more than `FPS_CHANGE_RATIO` or frame time by
    /// more than `FRAME_TIME_CHANGE_MS` relative to the last emitted sample.
    pub fn update_performance(
        &mut self,
        fps: f64,
        frame_time_ms: f64,
        memory_mb: Option<f64>,
        cpu_percent: Option<f64>,
    ) -> bool {
        let shared_arc = Arc::clone(&self.shared);
        let mut shared = write(&shared_arc);

        let significant = match shared.snapshot.performance {
            None => true,
            Some(old) => {
                let fps_delta = if old.fps > 0.0 {
                    (fps - old.fps).abs() / old.fps
                } else if fps > 0.0 {
                    f64::INFINITY
                } else {
                    0.0
                };
                fps_delta > FPS_CHANGE_RATIO
                    || (frame_time_ms - old.frame_time_ms).abs() > FRAME_TIME_CHANGE_MS
            }
        };
        if !significant {
            return false;
        }

        let sample = PerformanceSample {
            fps,
            frame_time_ms,
            memory_mb,
            cpu_percent,
        };
        let severity = if fps < LOW_FPS {
            EventSeverity::Warning
        } else {
            EventSeverity::Info
        };
        self.emit(
            &mut shared,
            EventCategory::Performance,
            severity,
            format!("{:.1} fps, {:.1} ms/frame", fps, frame_time_ms),
            json!(sample),
        );
        shared.snapshot.performance = Some(sample);
        true
    }

    /// Ends the current hand (if any) and starts a new one. Seats survive.
    pub fn reset_hand(&mut self) -> String {
        let shared_arc = Arc::clone(&self.shared);
        let mut shared = write(&shared_arc);

        if let Some(previous) = shared.snapshot.hand_id.clone() {
            let payload = json!({
                "transition": "hand_end",
                "hand_id": previous,
                "final_pot": shared.snapshot.pot,
                "board": shared.snapshot.board_cards,
            });
            self.emit(
                &mut shared,
                EventCategory::StateTransition,
                EventSeverity::Info,
                format!("Hand {} ended", previous),
                payload,
            );
        }

        let hand_id = new_hand_id();
        shared.snapshot.clear_hand();
        shared.snapshot.hand_id = Some(hand_id.clone());
        shared.stats.hands_reset += 1;
        log::info!("New hand {}", hand_id);
        hand_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::queue::{create_event_queue, EventReceiver};

    fn dispatcher() -> (StateDispatcher, EventReceiver) {
        let (publisher, receiver) = create_event_queue(64);
        (StateDispatcher::new(publisher), receiver)
    }

    fn cards(list: &[&str]) -> Vec<String> {
        list.iter().map(|c| c.to_string()).collect()
    }

    fn categories(receiver: &EventReceiver) -> Vec<EventCategory> {
        receiver.drain().iter().map(|e| e.category).collect()
    }

    #[test]
    fn test_pot_within_epsilon() {
        let (mut d, rx) = dispatcher();
        assert!(d.update_pot(100.00, &[], 0.9));
        rx.drain();

        assert!(!d.update_pot(100.005, &[], 0.9));
        assert!(rx.drain().is_empty());
    }

    #[test]
    fn test_pot_change_carries_old_and_new() {
        let (mut d, rx) = dispatcher();
        d.update_pot(100.00, &[], 0.9);
        rx.drain();

        assert!(d.update_pot(100.02, &[], 0.9));
        let events = rx.drain();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].category, EventCategory::Pot);
        assert_eq!(events[0].payload["old_pot"], 100.00);
        assert_eq!(events[0].payload["new_pot"], 100.02);
    }

    #[test]
    fn test_side_pots_diffed_by_value() {
        let (mut d, rx) = dispatcher();
        d.update_pot(50.0, &[10.0], 1.0);
        rx.drain();

        assert!(!d.update_pot(50.0, &[10.001], 1.0));
        assert!(d.update_pot(50.0, &[10.0, 5.0], 1.0));
        assert_eq!(d.snapshot().side_pots, vec![10.0, 5.0]);
    }

    #[test]
    fn test_negative_pot_rejected() {
        let (mut d, rx) = dispatcher();
        assert!(!d.update_pot(-5.0, &[], 1.0));
        assert!(rx.drain().is_empty());
        assert_eq!(d.get_stats().rejected_updates, 1);
        assert_eq!(d.snapshot().pot, 0.0);
    }

    #[test]
    fn test_flop_emits_card_then_street() {
        let (mut d, rx) = dispatcher();
        assert!(d.update_board_cards(&cards(&["Ah", "Kd", "7c"]), 0.9));

        let events = rx.drain();
        assert_eq!(
            events.iter().map(|e| e.category).collect::<Vec<_>>(),
            vec![EventCategory::Card, EventCategory::StateTransition]
        );
        assert_eq!(events[1].payload["from"], "preflop");
        assert_eq!(events[1].payload["to"], "flop");
        assert_eq!(d.snapshot().street, Street::Flop);
    }

    #[test]
    fn test_same_board_no_event() {
        let (mut d, rx) = dispatcher();
        d.update_board_cards(&cards(&["Ah", "Kd", "7c"]), 0.9);
        rx.drain();

        assert!(!d.update_board_cards(&cards(&["AH", "kd", "7C"]), 0.9));
        assert!(rx.drain().is_empty());
    }

    #[test]
    fn test_turn_and_river_transitions() {
        let (mut d, rx) = dispatcher();
        d.update_board_cards(&cards(&["Ah", "Kd", "7c"]), 0.9);
        d.update_board_cards(&cards(&["Ah", "Kd", "7c", "2s"]), 0.9);
        d.update_board_cards(&cards(&["Ah", "Kd", "7c", "2s", "9h"]), 0.9);

        let transitions: Vec<String> = rx
            .drain()
            .iter()
            .filter(|e| e.category == EventCategory::StateTransition)
            .map(|e| e.payload["to"].as_str().unwrap_or_default().to_string())
            .collect();
        assert_eq!(transitions, vec!["flop", "turn", "river"]);
    }

    #[test]
    fn test_invalid_board_rejected() {
        let (mut d, rx) = dispatcher();
        assert!(!d.update_board_cards(&cards(&["Ah", "Kd"]), 0.9));
        assert!(!d.update_board_cards(&cards(&["Ah", "Ah", "7c"]), 0.9));
        assert!(rx.drain().is_empty());
    }

    #[test]
    fn test_board_overlapping_hero_rejected() {
        let (mut d, rx) = dispatcher();
        d.update_hero_cards(&cards(&["Ah", "Qs"]), 0.9);
        rx.drain();

        assert!(!d.update_board_cards(&cards(&["Ah", "Kd", "7c"]), 0.9));
        assert!(rx.drain().is_empty());
        assert!(d.snapshot().board_cards.is_empty());
    }

    #[test]
    fn test_hero_cards_start_hand() {
        let (mut d, rx) = dispatcher();
        assert!(d.snapshot().hand_id.is_none());

        d.update_hero_cards(&cards(&["Ah", "Qs"]), 0.9);
        let events = rx.drain();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].category, EventCategory::Card);
        assert_eq!(events[1].transition(), Some("hand_start"));

        let hand_id = d.snapshot().hand_id.expect("hand should be active");
        assert_eq!(events[1].payload["hand_id"], hand_id.as_str());

        // Changing one card is a card update only
        d.update_hero_cards(&cards(&["Ah", "Qd"]), 0.9);
        assert_eq!(categories(&rx), vec![EventCategory::Card]);
    }

    #[test]
    fn test_player_update_carries_supplied_fields() {
        let (mut d, rx) = dispatcher();
        d.update_player(3, Some(200.0), Some("villain"), None, Some(true), 0.9);
        rx.drain();

        // Only the stack differs, but the event carries name too
        assert!(d.update_player(3, Some(150.0), Some("villain"), None, None, 0.9));
        let events = rx.drain();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].payload["stack"], 150.0);
        assert_eq!(events[0].payload["name"], "villain");
        assert_eq!(events[0].payload["old_stack"], 200.0);

        // Nothing differs
        assert!(!d.update_player(3, Some(150.004), Some("villain"), None, Some(true), 0.9));

        let seat = d.snapshot().seats[&3].clone();
        assert_eq!(seat.stack, Some(150.0));
        assert!(seat.is_active);
    }

    #[test]
    fn test_player_position_sets_button() {
        let (mut d, _rx) = dispatcher();
        d.update_player(6, None, None, Some("BTN"), None, 0.9);
        assert_eq!(d.snapshot().button_seat, Some(6));
    }

    #[test]
    fn test_actions_always_emit() {
        let (mut d, rx) = dispatcher();
        d.update_player(2, None, Some("alice"), None, Some(true), 0.9);
        rx.drain();

        assert!(d.emit_player_action(2, "call", Some(10.0), 0.8));
        assert!(d.emit_player_action(2, "call", Some(10.0), 0.8));
        let events = rx.drain();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].payload["player"], "alice");
        assert_eq!(events[0].payload["action"], "call");

        assert!(!d.emit_player_action(2, "dance", None, 0.8));
        assert!(rx.drain().is_empty());
    }

    #[test]
    fn test_performance_thresholds() {
        let (mut d, rx) = dispatcher();
        assert!(d.update_performance(30.0, 33.0, None, None));
        assert!(!d.update_performance(28.0, 36.0, None, None));
        assert!(d.update_performance(20.0, 36.0, None, None));
        assert!(d.update_performance(20.0, 50.0, Some(120.0), Some(15.0)));
        assert_eq!(categories(&rx).len(), 3);
    }

    #[test]
    fn test_reset_hand_twice() {
        let (mut d, rx) = dispatcher();
        d.update_player(1, Some(500.0), Some("hero"), Some("BB"), Some(true), 0.9);
        d.update_hero_cards(&cards(&["Ah", "Qs"]), 0.9);
        d.update_pot(30.0, &[], 0.9);
        d.update_board_cards(&cards(&["2h", "Kd", "7c"]), 0.9);
        let first_hand = d.snapshot().hand_id.unwrap();
        rx.drain();

        let second_hand = d.reset_hand();
        let events = rx.drain();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].transition(), Some("hand_end"));
        assert_eq!(events[0].payload["hand_id"], first_hand.as_str());

        let third_hand = d.reset_hand();
        let events = rx.drain();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].transition(), Some("hand_end"));
        assert_eq!(events[0].payload["hand_id"], second_hand.as_str());

        assert_ne!(first_hand, second_hand);
        assert_ne!(second_hand, third_hand);

        let snapshot = d.snapshot();
        assert_eq!(snapshot.pot, 0.0);
        assert!(snapshot.board_cards.is_empty());
        assert!(snapshot.hero_cards.is_empty());
        assert_eq!(snapshot.street, Street::Preflop);
        assert_eq!(snapshot.seats[&1].stack, Some(500.0));
        assert_eq!(snapshot.seats[&1].name.as_deref(), Some("hero"));
        assert_eq!(snapshot.hand_id.as_deref(), Some(third_hand.as_str()));
    }

    #[test]
    fn test_correlation_ids_per_frame() {
        let (mut d, rx) = dispatcher();

        let first = d.begin_frame();
        d.update_pot(10.0, &[], 1.0);
        d.emit_player_action(1, "bet", Some(5.0), 1.0);
        d.end_frame();

        let second = d.begin_frame();
        d.update_pot(20.0, &[], 1.0);
        d.end_frame();

        d.update_pot(25.0, &[], 1.0);

        let ids: Vec<Option<String>> = rx.drain().into_iter().map(|e| e.correlation_id).collect();
        assert_ne!(first, second);
        assert_eq!(
            ids,
            vec![Some(first.clone()), Some(first), Some(second), None]
        );
    }

    #[test]
    fn test_stats_and_handle() {
        let (mut d, _rx) = dispatcher();
        let handle = d.handle();

        d.update_hero_cards(&cards(&["Ah", "Qs"]), 0.9);
        d.update_pot(12.0, &[], 0.9);

        let stats = handle.stats();
        assert_eq!(stats.events_total, 3);
        assert_eq!(stats.events_by_category["card"], 1);
        assert_eq!(stats.events_by_category["state_transition"], 1);
        assert_eq!(stats.events_by_category["pot"], 1);
        assert_eq!(stats.hands_started, 1);
        assert_eq!(stats.pot, 12.0);
        assert_eq!(stats.queue.published, 3);
        assert_eq!(handle.snapshot(), d.snapshot());
    }

    #[test]
    fn test_handle_reads_from_other_thread() {
        let (mut d, _rx) = dispatcher();
        let handle = d.handle();

        let reader = std::thread::spawn(move || {
            for _ in 0..100 {
                let snapshot = handle.snapshot();
                // Board and street are always written together
                assert_eq!(
                    Street::from_board_count(snapshot.board_cards.len()),
                    Some(snapshot.street)
                );
            }
        });

        for _ in 0..50 {
            d.update_board_cards(&cards(&["Ah", "Kd", "7c"]), 0.9);
            d.update_board_cards(&cards(&[]), 0.9);
        }
        reader.join().expect("reader thread panicked");
    }
}
