use serde::Serialize;

use crate::classifier::GestureFeatures;
use crate::config::Thresholds;
use crate::landmarks::Point;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum GestureEvent {
    HandLost,
    Rotate { dx: f32, dy: f32 },
    ZoomPinchStart,
    /// Positive when the fingers moved closer together.
    ZoomDelta { amount: f32 },
    ZoomPinchEnd,
    PointSelectOn,
    PointSelectOff,
    Idle,
}

/// True for a tick that produced nothing but `Idle`.
pub fn is_idle(events: &[GestureEvent]) -> bool {
    events == [GestureEvent::Idle]
}

// `last_centroid` is None exactly when the most recent tick had no hand
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackingState {
    pub last_centroid: Option<Point>,
    pub is_pinching: bool,
    pub last_pinch_distance: f32,
    pub is_pointing: bool,
}

impl TrackingState {
    pub fn new() -> Self {
        Self::default()
    }

    fn hand_lost(&mut self) {
        self.last_centroid = None;
        self.is_pinching = false;
        self.is_pointing = false;
    }
}

#[derive(Debug, Clone)]
pub struct GestureStateMachine {
    th: Thresholds,
}

impl GestureStateMachine {
    pub fn new(th: &Thresholds) -> Self {
        Self { th: th.clone() }
    }

    pub fn set_thresholds(&mut self, th: &Thresholds) {
        self.th = th.clone();
    }

    /// Advances `state` by one tick. Events come out in rotate, zoom, select order.
    pub fn update(
        &self,
        features: Option<&GestureFeatures>,
        state: &mut TrackingState,
    ) -> Vec<GestureEvent> {
        let Some(f) = features else {
            state.hand_lost();
            return vec![GestureEvent::HandLost];
        };

        let mut events = Vec::new();

        // --- rotation ---
        if let Some(last) = state.last_centroid {
            let dx = f.centroid.x - last.x;
            let dy = f.centroid.y - last.y;
            if dx.abs() > self.th.deadzone_px || dy.abs() > self.th.deadzone_px {
                events.push(GestureEvent::Rotate { dx, dy });
            }
        }
        // track every tick, not only qualifying moves
        state.last_centroid = Some(f.centroid);

        // --- pinch / zoom ---
        let pinch = f.pinch_distance;
        if pinch < self.th.pinch_threshold {
            if state.is_pinching {
                events.push(GestureEvent::ZoomDelta {
                    amount: state.last_pinch_distance - pinch,
                });
            } else {
                // first pinched tick only records the baseline
                state.is_pinching = true;
                events.push(GestureEvent::ZoomPinchStart);
            }
            state.last_pinch_distance = pinch;
        } else if state.is_pinching {
            state.is_pinching = false;
            events.push(GestureEvent::ZoomPinchEnd);
        }

        // --- pointing (edge-triggered) ---
        let pointing = f.is_pointing();
        if pointing && !state.is_pointing {
            state.is_pointing = true;
            events.push(GestureEvent::PointSelectOn);
        } else if !pointing && state.is_pointing {
            state.is_pointing = false;
            events.push(GestureEvent::PointSelectOff);
        }

        if events.is_empty() {
            events.push(GestureEvent::Idle);
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use GestureEvent::*;

    #[test]
    fn test_is_idle_only_for_bare_idle() {
        assert!(is_idle(&[Idle]));
        assert!(!is_idle(&[HandLost]));
        assert!(!is_idle(&[Rotate { dx: 1.0, dy: 0.0 }]));
        assert!(!is_idle(&[]));
    }

    fn features(cx: f32, cy: f32, pinch: f32) -> GestureFeatures {
        GestureFeatures {
            centroid: Point::new(cx, cy),
            pinch_distance: pinch,
            index_extended: false,
            middle_closed: false,
        }
    }

    fn pointing(cx: f32, cy: f32) -> GestureFeatures {
        GestureFeatures {
            index_extended: true,
            middle_closed: true,
            ..features(cx, cy, 200.0)
        }
    }

    fn machine() -> GestureStateMachine {
        GestureStateMachine::new(&Thresholds::default())
    }

    #[test]
    fn test_scenario_three_ticks() {
        let m = machine();
        let mut st = TrackingState::new();

        let ev = m.update(Some(&features(0.0, 5.0, 40.0)), &mut st);
        assert_eq!(ev, vec![ZoomPinchStart]);
        assert!(st.is_pinching);
        assert_eq!(st.last_centroid, Some(Point::new(0.0, 5.0)));

        let ev = m.update(Some(&features(10.0, 5.0, 30.0)), &mut st);
        assert_eq!(
            ev,
            vec![Rotate { dx: 10.0, dy: 0.0 }, ZoomDelta { amount: 10.0 }]
        );

        let ev = m.update(None, &mut st);
        assert_eq!(ev, vec![HandLost]);
        assert!(!st.is_pinching);
        assert!(!st.is_pointing);
        assert_eq!(st.last_centroid, None);
    }

    #[test]
    fn test_deadzone() {
        let m = machine();
        let mut st = TrackingState::new();
        m.update(Some(&features(100.0, 100.0, 200.0)), &mut st);

        let ev = m.update(Some(&features(104.0, 104.0, 200.0)), &mut st);
        assert_eq!(ev, vec![Idle]);

        let ev = m.update(Some(&features(110.0, 104.0, 200.0)), &mut st);
        assert_eq!(ev, vec![Rotate { dx: 6.0, dy: 0.0 }]);
    }

    #[test]
    fn test_deadzone_is_strict_at_the_boundary() {
        let m = machine();
        let mut st = TrackingState::new();
        m.update(Some(&features(0.0, 0.0, 200.0)), &mut st);
        let ev = m.update(Some(&features(5.0, -5.0, 200.0)), &mut st);
        assert_eq!(ev, vec![Idle]);
    }

    #[test]
    fn test_small_moves_do_not_accumulate_into_rotation() {
        let m = machine();
        let mut st = TrackingState::new();
        for i in 0..50 {
            let ev = m.update(Some(&features(i as f32 * 3.0, 0.0, 200.0)), &mut st);
            assert_eq!(ev, vec![Idle], "tick {i}");
        }
        assert_eq!(st.last_centroid, Some(Point::new(147.0, 0.0)));
    }

    #[test]
    fn test_centroid_tracks_every_tick_with_a_hand() {
        let m = machine();
        let mut st = TrackingState::new();
        let seq = [Some((1.0, 1.0)), Some((2.0, 1.0)), None, Some((40.0, 40.0)), None, None];
        for step in seq {
            let f = step.map(|(x, y)| features(x, y, 200.0));
            m.update(f.as_ref(), &mut st);
            assert_eq!(st.last_centroid, step.map(|(x, y)| Point::new(x, y)));
        }
    }

    #[test]
    fn test_first_tick_after_hand_lost_never_rotates() {
        let m = machine();
        let mut st = TrackingState::new();
        m.update(Some(&features(0.0, 0.0, 200.0)), &mut st);
        m.update(None, &mut st);
        let ev = m.update(Some(&features(300.0, 300.0, 200.0)), &mut st);
        assert_eq!(ev, vec![Idle]);
    }

    #[test]
    fn test_constant_pinch_gives_one_start_then_zero_deltas() {
        let m = machine();
        let mut st = TrackingState::new();
        let n = 8;
        let mut all = Vec::new();
        for _ in 0..n {
            all.extend(m.update(Some(&features(0.0, 0.0, 49.0)), &mut st));
        }
        assert_eq!(all.iter().filter(|e| **e == ZoomPinchStart).count(), 1);
        assert_eq!(
            all.iter().filter(|e| **e == ZoomDelta { amount: 0.0 }).count(),
            n - 1
        );
        assert_eq!(all.len(), n);
    }

    #[test]
    fn test_spreading_fingers_gives_negative_delta_then_end() {
        let m = machine();
        let mut st = TrackingState::new();
        m.update(Some(&features(0.0, 0.0, 20.0)), &mut st);
        let ev = m.update(Some(&features(0.0, 0.0, 35.0)), &mut st);
        assert_eq!(ev, vec![ZoomDelta { amount: -15.0 }]);
        let ev = m.update(Some(&features(0.0, 0.0, 50.0)), &mut st);
        assert_eq!(ev, vec![ZoomPinchEnd]);
        assert!(!st.is_pinching);
        let ev = m.update(Some(&features(0.0, 0.0, 80.0)), &mut st);
        assert_eq!(ev, vec![Idle]);
    }

    // One threshold serves both entry and exit, so noise straddling it flips
    // the pinch on and off every tick. No dead-band is applied.
    #[test]
    fn test_pinch_uses_single_threshold_for_entry_and_exit() {
        let m = machine();
        let mut st = TrackingState::new();
        let noisy = [49.5, 50.5, 49.5, 50.5];
        let ev: Vec<_> = noisy
            .iter()
            .flat_map(|d| m.update(Some(&features(0.0, 0.0, *d)), &mut st))
            .collect();
        assert_eq!(
            ev,
            vec![ZoomPinchStart, ZoomPinchEnd, ZoomPinchStart, ZoomPinchEnd]
        );
    }

    #[test]
    fn test_pinch_restart_after_hand_lost_records_new_baseline() {
        let m = machine();
        let mut st = TrackingState::new();
        m.update(Some(&features(0.0, 0.0, 40.0)), &mut st);
        m.update(None, &mut st);
        let ev = m.update(Some(&features(0.0, 0.0, 10.0)), &mut st);
        assert_eq!(ev, vec![ZoomPinchStart]);
        let ev = m.update(Some(&features(0.0, 0.0, 8.0)), &mut st);
        assert_eq!(ev, vec![ZoomDelta { amount: 2.0 }]);
    }

    #[test]
    fn test_select_is_edge_triggered() {
        let m = machine();
        let mut st = TrackingState::new();
        let mut on = 0;
        let mut off = 0;
        let ticks = [false, true, true, true, false, false, true, false];
        for p in ticks {
            let f = if p { pointing(0.0, 0.0) } else { features(0.0, 0.0, 200.0) };
            for e in m.update(Some(&f), &mut st) {
                match e {
                    PointSelectOn => on += 1,
                    PointSelectOff => off += 1,
                    _ => {}
                }
            }
            assert_eq!(st.is_pointing, p);
        }
        assert_eq!((on, off), (2, 2));
    }

    #[test]
    fn test_hand_lost_while_pointing_clears_without_select_off() {
        let m = machine();
        let mut st = TrackingState::new();
        m.update(Some(&pointing(0.0, 0.0)), &mut st);
        assert!(st.is_pointing);
        assert_eq!(m.update(None, &mut st), vec![HandLost]);
        assert_eq!(m.update(None, &mut st), vec![HandLost]);
        assert_eq!(m.update(Some(&pointing(0.0, 0.0)), &mut st), vec![PointSelectOn]);
    }

    #[test]
    fn test_all_three_families_in_one_tick_keep_order() {
        let m = machine();
        let mut st = TrackingState::new();
        m.update(Some(&features(0.0, 0.0, 40.0)), &mut st);
        let f = GestureFeatures {
            pinch_distance: 35.0,
            ..pointing(20.0, -20.0)
        };
        let ev = m.update(Some(&f), &mut st);
        assert_eq!(
            ev,
            vec![
                Rotate { dx: 20.0, dy: -20.0 },
                ZoomDelta { amount: 5.0 },
                PointSelectOn
            ]
        );
    }

    #[test]
    fn test_events_serialize_with_tag() {
        let json = serde_json::to_string(&ZoomDelta { amount: 2.5 }).unwrap();
        assert_eq!(json, r#"{"event":"zoom_delta","amount":2.5}"#);
        let json = serde_json::to_string(&HandLost).unwrap();
        assert_eq!(json, r#"{"event":"hand_lost"}"#);
    }
}
