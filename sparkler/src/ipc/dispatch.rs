//! IPC message dispatch: parse s-expressions and route to handlers.

use std::time::{Duration, Instant};

use lexpr::Value;
use tracing::{debug, warn};

use crate::state::SparklerState;
use crate::vr::gesture::{
    dominant_effect, FrameEffect, GestureEvent, SnapCountEdge, SnapFinger, SnapOrigin,
};
use crate::vr::hand_tracking::{Hand, HandJoint};

/// Parse an s-expression message and dispatch to the appropriate handler.
/// Returns an optional response string (s-expression).
pub fn handle_message(state: &mut SparklerState, raw: &str) -> Option<String> {
    let value = match lexpr::from_str(raw) {
        Ok(v) => v,
        Err(e) => {
            warn!("malformed s-expression: {}", e);
            return Some(error_response(0, &format!("malformed s-expression: {e}")));
        }
    };

    let msg_type = get_keyword(&value, "type");
    let msg_id = get_int(&value, "id").unwrap_or(0);

    match msg_type.as_deref() {
        Some("ping") => Some(ok_response(msg_id)),
        Some("gesture-status") => handle_gesture_status(state, msg_id),
        Some("gesture-config") => handle_gesture_config(state, msg_id, &value),
        Some("gesture-reset") => handle_gesture_reset(state, msg_id),
        Some("hand-joint") => handle_hand_joint(state, msg_id, &value),
        Some("hand-tracked") => handle_hand_tracked(state, msg_id, &value),
        Some("hand-publish") => handle_hand_publish(state, msg_id, &value),
        Some("hand-remove") => handle_hand_remove(state, msg_id, &value),
        Some("frame") => handle_frame(state, msg_id, &value),
        Some(other) => {
            debug!(msg_type = other, "unknown message type");
            Some(error_response(msg_id, &format!("unknown message type: {other}")))
        }
        None => Some(error_response(msg_id, "missing :type")),
    }
}

// ── Gesture ────────────────────────────────────────────────

fn handle_gesture_status(state: &mut SparklerState, msg_id: i64) -> Option<String> {
    let now = Instant::now();
    let status = state.recognizer.status_sexp(now);
    Some(format!(
        "(:type :response :id {} :status :ok :gesture {})",
        msg_id, status
    ))
}

fn handle_gesture_config(
    state: &mut SparklerState,
    msg_id: i64,
    value: &Value,
) -> Option<String> {
    // Validate everything before touching the live config.
    let mut config = state.recognizer.config.clone();

    if let Some(enabled) = get_bool(value, "enabled") {
        config.enabled = enabled;
    }
    if let Some(hand) = get_string(value, "hand") {
        match Hand::parse(&hand) {
            Some(h) => config.dominant_hand = h,
            None => return Some(error_response(msg_id, &format!("unknown hand: {hand}"))),
        }
    }
    if let Some(finger) = get_string(value, "snap-finger") {
        match SnapFinger::parse(&finger) {
            Some(f) => config.snap_finger = f,
            None => {
                return Some(error_response(msg_id, &format!("unknown snap finger: {finger}")))
            }
        }
    }
    if let Some(origin) = get_string(value, "snap-origin") {
        match SnapOrigin::parse(&origin) {
            Some(o) => config.snap_origin = o,
            None => {
                return Some(error_response(msg_id, &format!("unknown snap origin: {origin}")))
            }
        }
    }
    if let Some(edge) = get_string(value, "count-on") {
        match SnapCountEdge::parse(&edge) {
            Some(e) => config.count_on = e,
            None => return Some(error_response(msg_id, &format!("unknown count edge: {edge}"))),
        }
    }
    if let Some(v) = get_float(value, "snap-start-threshold") {
        config.snap_start_threshold_m = v as f32;
    }
    if let Some(v) = get_float(value, "snap-finish-threshold") {
        config.snap_finish_threshold_m = v as f32;
    }
    if let Some(v) = get_float(value, "snap-done-threshold") {
        config.snap_done_threshold_m = v as f32;
    }
    if let Some(v) = get_float(value, "open-palm-normal-threshold") {
        config.open_palm_normal_threshold = v as f32;
    }
    if let Some(v) = get_float(value, "degenerate-distance") {
        config.degenerate_hand_distance_m = v as f32;
    }
    if let Some(ms) = get_float(value, "snap-window-ms") {
        match millis(ms) {
            Some(d) => config.snap_window = d,
            None => return Some(error_response(msg_id, "snap-window-ms must be >= 0")),
        }
    }
    if let Some(ms) = get_float(value, "open-palm-window-ms") {
        match millis(ms) {
            Some(d) => config.open_palm_window = d,
            None => return Some(error_response(msg_id, "open-palm-window-ms must be >= 0")),
        }
    }

    if let Err(reason) = config.validate() {
        return Some(error_response(msg_id, &reason));
    }
    state.recognizer.config = config;
    debug!(config = %state.recognizer.config_sexp(), "gesture config updated");
    Some(format!(
        "(:type :response :id {} :status :ok :config {})",
        msg_id,
        state.recognizer.config_sexp()
    ))
}

fn handle_gesture_reset(state: &mut SparklerState, msg_id: i64) -> Option<String> {
    state.reset();
    Some(ok_response(msg_id))
}

// ── Hand poses ─────────────────────────────────────────────

fn require_hand(value: &Value, msg_id: i64) -> Result<Hand, String> {
    let hand_str = get_string(value, "hand").ok_or_else(|| error_response(msg_id, "missing :hand"))?;
    Hand::parse(&hand_str).ok_or_else(|| error_response(msg_id, &format!("unknown hand: {hand_str}")))
}

fn handle_hand_joint(state: &mut SparklerState, msg_id: i64, value: &Value) -> Option<String> {
    let hand = match require_hand(value, msg_id) {
        Ok(h) => h,
        Err(resp) => return Some(resp),
    };
    let joint_name = match get_string(value, "joint") {
        Some(j) => j,
        None => return Some(error_response(msg_id, "missing :joint")),
    };
    let Some(joint) = HandJoint::parse(&joint_name) else {
        return Some(error_response(msg_id, &format!("unknown joint: {joint_name}")));
    };
    let (Some(x), Some(y), Some(z)) = (
        get_float(value, "x"),
        get_float(value, "y"),
        get_float(value, "z"),
    ) else {
        return Some(error_response(msg_id, "missing :x/:y/:z"));
    };
    let position = [x as f32, y as f32, z as f32];
    if !position.iter().all(|c| c.is_finite()) {
        return Some(error_response(msg_id, ":x/:y/:z must be finite"));
    }
    let tracked = get_bool(value, "tracked").unwrap_or(true);

    state
        .staged_mut(hand)
        .set_joint(joint, position, tracked);
    Some(ok_response(msg_id))
}

fn handle_hand_tracked(state: &mut SparklerState, msg_id: i64, value: &Value) -> Option<String> {
    let hand = match require_hand(value, msg_id) {
        Ok(h) => h,
        Err(resp) => return Some(resp),
    };
    let Some(tracked) = get_bool(value, "tracked") else {
        return Some(error_response(msg_id, "missing :tracked"));
    };
    state.staged_mut(hand).tracked = tracked;
    Some(ok_response(msg_id))
}

fn handle_hand_publish(state: &mut SparklerState, msg_id: i64, value: &Value) -> Option<String> {
    let hand = match require_hand(value, msg_id) {
        Ok(h) => h,
        Err(resp) => return Some(resp),
    };
    let timestamp_ns = get_int(value, "timestamp").unwrap_or(0).max(0) as u64;
    let stored = state.publish(hand, timestamp_ns);
    Some(format!(
        "(:type :response :id {} :status :ok :stored {})",
        msg_id,
        if stored { "t" } else { "nil" }
    ))
}

fn handle_hand_remove(state: &mut SparklerState, msg_id: i64, value: &Value) -> Option<String> {
    let hand = match require_hand(value, msg_id) {
        Ok(h) => h,
        Err(resp) => return Some(resp),
    };
    state.feed.remove(hand);
    Some(ok_response(msg_id))
}

// ── Frame ──────────────────────────────────────────────────

fn handle_frame(state: &mut SparklerState, msg_id: i64, value: &Value) -> Option<String> {
    let offset = match get_float(value, "t") {
        Some(secs) => match Duration::try_from_secs_f64(secs) {
            Ok(d) => Some(d),
            Err(_) => return Some(error_response(msg_id, ":t must be a finite, non-negative number")),
        },
        None => None,
    };
    let Some(now) = state.frame_time(offset) else {
        return Some(error_response(msg_id, ":t out of range"));
    };
    let (_, events) = state.run_frame(now);

    let events_sexp = if events.is_empty() {
        "nil".to_string()
    } else {
        let items: Vec<String> = events.iter().map(event_sexp).collect();
        format!("({})", items.join(" "))
    };
    let effect = dominant_effect(&events)
        .map(|e| effect_sexp(&e))
        .unwrap_or_else(|| "nil".to_string());

    Some(format!(
        "(:type :response :id {} :status :ok :frame {} :events {} :effect {} :gesture {})",
        msg_id,
        state.frames,
        events_sexp,
        effect,
        state.recognizer.status_sexp(now)
    ))
}

fn vec3_sexp(v: &[f32; 3]) -> String {
    format!("({:.4} {:.4} {:.4})", v[0], v[1], v[2])
}

fn event_sexp(event: &GestureEvent) -> String {
    let (hand, extra) = match event {
        GestureEvent::SnapStarted { hand } | GestureEvent::FireballLost { hand } => {
            (hand, String::new())
        }
        GestureEvent::SnapFinished { hand, origin, count } => (
            hand,
            format!(" :origin {} :count {}", vec3_sexp(origin), count),
        ),
        GestureEvent::Sparkle { hand, origin } => {
            (hand, format!(" :origin {}", vec3_sexp(origin)))
        }
        GestureEvent::SnapDone { hand, count } => (hand, format!(" :count {}", count)),
        GestureEvent::Fireball {
            hand,
            radius,
            center,
        } => (
            hand,
            format!(" :radius {:.4} :center {}", radius, vec3_sexp(center)),
        ),
    };
    format!("(:event :{} :hand :{}{})", event.name(), hand.as_str(), extra)
}

fn effect_sexp(effect: &FrameEffect) -> String {
    match effect {
        FrameEffect::Sparkler { origin } => {
            format!("(:kind :sparkler :origin {})", vec3_sexp(origin))
        }
        FrameEffect::Fireball { radius, center } => format!(
            "(:kind :fireball :radius {:.4} :center {})",
            radius,
            vec3_sexp(center)
        ),
    }
}

// ── Protocol helpers ───────────────────────────────────────

fn millis(ms: f64) -> Option<Duration> {
    (ms.is_finite() && ms >= 0.0).then(|| Duration::from_micros((ms * 1000.0).round() as u64))
}

fn ok_response(id: i64) -> String {
    format!("(:type :response :id {} :status :ok)", id)
}

pub(super) fn error_response(id: i64, reason: &str) -> String {
    format!(
        "(:type :response :id {} :status :error :reason \"{}\")",
        id,
        escape_string(reason)
    )
}

/// Escape a string for s-expression output.
fn escape_string(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Extract a keyword value from an s-expression plist.
///
/// Walks cons pairs to find `:key` followed by its value.  Accepts both
/// `Value::Keyword("key")` and `Value::Symbol(":key")` spellings.
fn get_keyword(value: &Value, key: &str) -> Option<String> {
    let prefixed = format!(":{}", key);
    let mut current = value;
    while let Value::Cons(pair) = current {
        let is_key = match pair.car() {
            Value::Keyword(k) => k.as_ref() == key,
            Value::Symbol(s) => s.as_ref() == prefixed,
            _ => false,
        };
        if is_key {
            let Value::Cons(next) = pair.cdr() else {
                return None;
            };
            let val = next.car();
            return Some(match val {
                Value::Keyword(v) => v.to_string(),
                Value::Symbol(v) => v.strip_prefix(':').unwrap_or(&**v).to_string(),
                Value::String(v) => v.to_string(),
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => (if *b { "t" } else { "nil" }).to_string(),
                Value::Nil | Value::Null => "nil".to_string(),
                _ => val.to_string(),
            });
        }
        current = pair.cdr();
    }
    None
}

fn get_int(value: &Value, key: &str) -> Option<i64> {
    get_keyword(value, key).and_then(|s| s.parse().ok())
}

fn get_string(value: &Value, key: &str) -> Option<String> {
    get_keyword(value, key)
}

/// Treats "nil" as false, anything else as true.
fn get_bool(value: &Value, key: &str) -> Option<bool> {
    get_keyword(value, key).map(|s| s != "nil")
}

fn get_float(value: &Value, key: &str) -> Option<f64> {
    get_keyword(value, key).and_then(|s| s.parse().ok())
}

// ── Tests ──────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vr::gesture::GestureConfig;

    fn state() -> SparklerState {
        SparklerState::new(GestureConfig::default())
    }

    fn send(state: &mut SparklerState, raw: &str) -> Value {
        let resp = handle_message(state, raw).expect("every message gets a response");
        lexpr::from_str(&resp).unwrap_or_else(|e| panic!("invalid response {resp}: {e}"))
    }

    fn joint(state: &mut SparklerState, name: &str, x: f32, y: f32, z: f32) {
        let v = send(
            state,
            &format!("(:type :hand-joint :id 1 :hand :right :joint \"{name}\" :x {x} :y {y} :z {z})"),
        );
        assert_eq!(get_keyword(&v, "status"), Some("ok".to_string()));
    }

    #[test]
    fn test_error_response_format() {
        let r = error_response(7, "bad \"input\"");
        assert!(r.contains(":status :error"));
        assert!(r.contains(":reason \"bad \\\"input\\\"\""));
        assert!(lexpr::from_str(&r).is_ok());
    }

    #[test]
    fn test_get_keyword_from_plist() {
        let v = lexpr::from_str("(:type :frame :id 3 :hand \"right\" :t 0.25)").unwrap();
        assert_eq!(get_keyword(&v, "type"), Some("frame".to_string()));
        assert_eq!(get_int(&v, "id"), Some(3));
        assert_eq!(get_string(&v, "hand"), Some("right".to_string()));
        assert_eq!(get_float(&v, "t"), Some(0.25));
        assert_eq!(get_keyword(&v, "missing"), None);
    }

    #[test]
    fn test_get_bool() {
        let v = lexpr::from_str("(:a t :b nil)").unwrap();
        assert_eq!(get_bool(&v, "a"), Some(true));
        assert_eq!(get_bool(&v, "b"), Some(false));
    }

    #[test]
    fn test_malformed_message() {
        let mut st = state();
        let v = send(&mut st, "(:type :frame");
        assert_eq!(get_keyword(&v, "status"), Some("error".to_string()));
    }

    #[test]
    fn test_unknown_message_type() {
        let mut st = state();
        let v = send(&mut st, "(:type :teleport :id 9)");
        assert_eq!(get_int(&v, "id"), Some(9));
        assert_eq!(get_keyword(&v, "status"), Some("error".to_string()));
    }

    #[test]
    fn test_gesture_config_overrides() {
        let mut st = state();
        let v = send(
            &mut st,
            "(:type :gesture-config :id 2 :snap-start-threshold 0.025 :snap-window-ms 400 :snap-finger :middle :count-on :done)",
        );
        assert_eq!(get_keyword(&v, "status"), Some("ok".to_string()));
        let c = &st.recognizer.config;
        assert!((c.snap_start_threshold_m - 0.025).abs() < 1e-6);
        assert_eq!(c.snap_window, Duration::from_millis(400));
        assert_eq!(c.snap_finger, SnapFinger::Middle);
        assert_eq!(c.count_on, SnapCountEdge::Done);
    }

    #[test]
    fn test_gesture_config_rejects_bad_value_atomically() {
        let mut st = state();
        let v = send(
            &mut st,
            "(:type :gesture-config :id 2 :snap-start-threshold 0.025 :snap-origin :elbow)",
        );
        assert_eq!(get_keyword(&v, "status"), Some("error".to_string()));
        assert_eq!(st.recognizer.config, GestureConfig::default());

        for bad in [
            ":snap-done-threshold -0.1",
            ":snap-start-threshold nan",
            ":open-palm-normal-threshold 2.0",
        ] {
            let v = send(&mut st, &format!("(:type :gesture-config :id 3 :snap-window-ms 400 {bad})"));
            assert_eq!(get_keyword(&v, "status"), Some("error".to_string()), "{bad}");
            assert_eq!(st.recognizer.config, GestureConfig::default(), "{bad}");
        }
    }

    #[test]
    fn test_hand_joint_requires_known_joint() {
        let mut st = state();
        let v = send(
            &mut st,
            "(:type :hand-joint :id 4 :hand :right :joint \"sixth-finger-tip\" :x 0 :y 0 :z 0)",
        );
        assert_eq!(get_keyword(&v, "status"), Some("error".to_string()));
    }

    #[test]
    fn test_frame_rejects_negative_time() {
        let mut st = state();
        let v = send(&mut st, "(:type :frame :id 5 :t -1.0)");
        assert_eq!(get_keyword(&v, "status"), Some("error".to_string()));
        assert_eq!(st.frames, 0);
    }

    #[test]
    fn test_frame_rejects_huge_time() {
        let mut st = state();
        let v = send(&mut st, "(:type :frame :id 5 :t 1e19)");
        assert_eq!(get_keyword(&v, "status"), Some("error".to_string()));
        assert_eq!(st.frames, 0);
    }

    #[test]
    fn test_hand_joint_rejects_non_finite() {
        let mut st = state();
        let v = send(
            &mut st,
            "(:type :hand-joint :id 4 :hand :right :joint \"thumb-tip\" :x nan :y 0 :z 0)",
        );
        assert_eq!(get_keyword(&v, "status"), Some("error".to_string()));
        assert!(st.staged(Hand::Right).joint(HandJoint::ThumbTip).is_none());
    }

    #[test]
    fn test_snap_over_ipc() {
        let mut st = state();
        joint(&mut st, "thumb-tip", 0.0, 0.0, 0.0);
        joint(&mut st, "index-finger-tip", 0.0, 0.0, 0.01);
        joint(&mut st, "thumb-intermediate-tip", 0.0, 0.0, 0.0);
        joint(&mut st, "index-finger-intermediate-tip", 0.0, 0.0, 0.02);
        let v = send(&mut st, "(:type :hand-publish :id 6 :hand :right)");
        assert_eq!(get_bool(&v, "stored"), Some(true));

        let resp = handle_message(&mut st, "(:type :frame :id 7 :t 0.0)").unwrap();
        assert!(resp.contains(":event :snap-started"), "{resp}");
        assert!(resp.contains(":event :snap-finished"), "{resp}");
        assert!(resp.contains(":kind :sparkler"), "{resp}");
        assert!(resp.contains(":snap-count 1"), "{resp}");
        assert_eq!(st.recognizer.snap_count(), 1);
    }

    #[test]
    fn test_untracked_publish_keeps_previous_pose() {
        let mut st = state();
        send(&mut st, "(:type :hand-publish :id 1 :hand :right)");
        send(&mut st, "(:type :hand-tracked :id 2 :hand :right :tracked nil)");
        let v = send(&mut st, "(:type :hand-publish :id 3 :hand :right)");
        assert_eq!(get_bool(&v, "stored"), Some(false));
        assert!(st.feed.latest().right.as_ref().unwrap().tracked);
    }

    #[test]
    fn test_gesture_reset() {
        let mut st = state();
        send(&mut st, "(:type :hand-publish :id 1 :hand :left)");
        send(&mut st, "(:type :frame :id 2)");
        send(&mut st, "(:type :gesture-reset :id 3)");
        assert!(st.feed.latest().left.is_none());
        assert_eq!(st.frames, 0);
    }

    #[test]
    fn test_gesture_status() {
        let mut st = state();
        let resp = handle_message(&mut st, "(:type :gesture-status :id 8)").unwrap();
        assert!(resp.contains(":phase :idle"));
        assert!(resp.contains(":snap-count 0"));
    }
}
