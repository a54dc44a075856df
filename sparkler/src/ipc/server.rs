//! Line-framed IPC server: one s-expression request per line in, one
//! response per line out.

use std::io::{self, BufRead, Write};

use tracing::{debug, info};

use super::dispatch;
use crate::state::SparklerState;

/// Maximum accepted request length in bytes (64 KiB).
const MAX_MESSAGE_SIZE: usize = 65_536;

/// Serve requests from `reader` until EOF, writing responses to `writer`.
///
/// Returns the number of requests handled.  Only I/O errors end the loop
/// early; protocol errors are answered with an error response.
pub fn serve<R: BufRead, W: Write>(
    state: &mut SparklerState,
    reader: R,
    mut writer: W,
    trace: bool,
) -> io::Result<u64> {
    let mut handled = 0u64;
    for line in reader.lines() {
        let line = line?;
        let raw = line.trim();
        if raw.is_empty() || raw.starts_with(';') {
            continue;
        }
        if trace {
            debug!(direction = "in", "{}", raw);
        }

        let response = if raw.len() > MAX_MESSAGE_SIZE {
            Some(dispatch::error_response(
                0,
                &format!("message too large ({} bytes)", raw.len()),
            ))
        } else {
            dispatch::handle_message(state, raw)
        };

        if let Some(resp) = response {
            if trace {
                debug!(direction = "out", "{}", resp);
            }
            writeln!(writer, "{}", resp)?;
            writer.flush()?;
        }
        handled += 1;
    }
    info!(handled, frames = state.frames, "input closed");
    Ok(handled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vr::gesture::GestureConfig;

    fn run(input: &str) -> (SparklerState, u64, String) {
        let mut state = SparklerState::new(GestureConfig::default());
        let mut out = Vec::new();
        let handled = serve(&mut state, input.as_bytes(), &mut out, false).unwrap();
        (state, handled, String::from_utf8(out).unwrap())
    }

    #[test]
    fn test_one_response_per_request() {
        let (_, handled, out) = run("(:type :ping :id 1)\n(:type :gesture-status :id 2)\n");
        assert_eq!(handled, 2);
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains(":id 1"));
        assert!(lines[1].contains(":id 2"));
    }

    #[test]
    fn test_skips_blank_and_comment_lines() {
        let (_, handled, out) = run("\n; scripted snap\n   \n(:type :ping :id 3)\n");
        assert_eq!(handled, 1);
        assert_eq!(out.lines().count(), 1);
    }

    #[test]
    fn test_oversized_message_rejected() {
        let big = format!("(:type :ping :pad \"{}\")\n", "x".repeat(MAX_MESSAGE_SIZE));
        let (_, _, out) = run(&big);
        assert!(out.contains(":status :error"));
        assert!(out.contains("too large"));
    }

    #[test]
    fn test_scripted_snap_then_fireball() {
        let script = "\
(:type :hand-joint :id 1 :hand :right :joint \"thumb-tip\" :x 0 :y 0 :z 0)
(:type :hand-joint :id 2 :hand :right :joint \"index-finger-tip\" :x 0 :y 0 :z 0.01)
(:type :hand-joint :id 3 :hand :right :joint \"thumb-intermediate-tip\" :x 0 :y 0 :z 0)
(:type :hand-joint :id 4 :hand :right :joint \"index-finger-intermediate-tip\" :x 0 :y 0 :z 0.02)
(:type :hand-publish :id 5 :hand :right)
(:type :frame :id 6 :t 0.0)
(:type :hand-joint :id 7 :hand :right :joint \"thumb-tip\" :x 0.075 :y 0 :z 0)
(:type :hand-joint :id 8 :hand :right :joint \"index-finger-tip\" :x 0 :y 0.0856965 :z -0.084)
(:type :hand-joint :id 9 :hand :right :joint \"little-finger-tip\" :x -0.075 :y 0.032136 :z -0.0315)
(:type :hand-joint :id 10 :hand :right :joint \"thumb-intermediate-tip\" :x 0.05 :y 0 :z 0 :tracked nil)
(:type :hand-publish :id 11 :hand :right)
(:type :frame :id 12 :t 0.2)
";
        let (state, handled, out) = run(script);
        assert_eq!(handled, 12);
        let lines: Vec<&str> = out.lines().collect();
        assert!(lines[5].contains(":kind :sparkler"), "{}", lines[5]);
        assert!(lines[11].contains(":event :snap-done"), "{}", lines[11]);
        assert!(lines[11].contains(":kind :fireball"), "{}", lines[11]);
        assert!(state.recognizer.is_fireballing());
        assert_eq!(state.recognizer.snap_count(), 1);
    }
}
