/*
 *   Copyright (c) 2024-2025 R3BL LLC
 *   All rights reserved.
 *
 *   Licensed under the Apache License, Version 2.0 (the "License");
 *   you may not use this file except in compliance with the License.
 *   You may obtain a copy of the License at
 *
 *   http://www.apache.org/licenses/LICENSE-2.0
 *
 *   Unless required by applicable law or agreed to in writing, software
 *   distributed under the License is distributed on an "AS IS" BASIS,
 *   WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *   See the License for the specific language governing permissions and
 *   limitations under the License.
 */

//! Terminal-state controller: a declarative record of the modes the event
//! loop wants, and the escape sequences that establish/restore them.
//!
//! The controller is stateless with respect to I/O — it only formats
//! strings. [`crate::transport`] is responsible for actually writing them.

/// The bitwise-OR components of the extended keyboard-protocol push, see
/// spec.md §6 "Keyboard protocol".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct KeyboardProtocolBits {
    pub disambiguate: bool,
    pub report_event_types: bool,
    pub report_alternate_keys: bool,
    pub report_all_keys_as_escapes: bool,
    pub report_text_with_keys: bool,
}

impl KeyboardProtocolBits {
    #[must_use]
    pub fn as_u8(self) -> u8 {
        let mut bits = 0u8;
        if self.disambiguate {
            bits |= 0b0000_0001;
        }
        if self.report_event_types {
            bits |= 0b0000_0010;
        }
        if self.report_alternate_keys {
            bits |= 0b0000_0100;
        }
        if self.report_all_keys_as_escapes {
            bits |= 0b0000_1000;
        }
        if self.report_text_with_keys {
            bits |= 0b0001_0000;
        }
        bits
    }

    #[must_use]
    pub fn is_legacy(self) -> bool {
        self.as_u8() == 0
    }
}

/// Declarative description of the terminal modes a session wants active.
#[derive(Debug, Clone, Default)]
pub struct DesiredState {
    pub alternate_screen: bool,
    pub clear_alt_screen: bool,
    pub mouse_tracking: bool,
    pub bracketed_paste: bool,
    pub focus_tracking: bool,
    pub in_band_resize_notifications: bool,
    pub color_scheme_change_notifications: bool,
    pub keyboard_protocol: KeyboardProtocolBits,
    pub save_colors: bool,
}

const SAVE_CURSOR: &str = "\x1b7";
const RESTORE_CURSOR: &str = "\x1b8";
const SAVE_PRIVATE_MODES: &str = "\x1b[?s";
const RESTORE_PRIVATE_MODES: &str = "\x1b[?r";
const ENTER_ALT_SCREEN: &str = "\x1b[?1049h";
const LEAVE_ALT_SCREEN: &str = "\x1b[?1049l";
const CLEAR_SCREEN: &str = "\x1b[2J\x1b[H";
const RESET_IRM: &str = "\x1b[4l";
const RESET_DECKM: &str = "\x1b[?1l";
const RESET_DECSCNM: &str = "\x1b[?5l";
const DISABLE_BRACKETED_PASTE: &str = "\x1b[?2004l";
const ENABLE_BRACKETED_PASTE: &str = "\x1b[?2004h";
const DISABLE_MOUSE: &str = "\x1b[?1000;1002;1003;1006l";
const ENABLE_MOUSE: &str = "\x1b[?1000;1003;1006h";
const ENABLE_FOCUS_TRACKING: &str = "\x1b[?1004h";
const DISABLE_FOCUS_TRACKING: &str = "\x1b[?1004l";
const ENABLE_IN_BAND_RESIZE: &str = "\x1b[?2048h";
const DISABLE_IN_BAND_RESIZE: &str = "\x1b[?2048l";
const ENABLE_COLOR_SCHEME_NOTIFY: &str = "\x1b[?2031h";
const DISABLE_COLOR_SCHEME_NOTIFY: &str = "\x1b[?2031l";
const SAVE_COLORS: &str = "\x1b]30001\x1b\\";
const RESTORE_COLORS: &str = "\x1b]30101\x1b\\";
const LEGACY_KEYBOARD_PROTOCOL: &str = "\x1b[>u";

/// Stateless formatter for the set-state/reset-state escape strings
/// spec.md §4.B describes.
#[derive(Debug, Default)]
pub struct TerminalStateController {
    desired: DesiredState,
}

impl TerminalStateController {
    #[must_use]
    pub fn new(desired: DesiredState) -> Self {
        TerminalStateController { desired }
    }

    /// The sequence emitted once at loop start.
    #[must_use]
    pub fn set_state(&self) -> String {
        let d = &self.desired;
        let mut out = String::new();

        if d.alternate_screen {
            out.push_str(SAVE_CURSOR);
        }
        out.push_str(SAVE_PRIVATE_MODES);
        if d.save_colors {
            out.push_str(SAVE_COLORS);
        }

        // Known-safe baseline before applying requested modes.
        out.push_str(RESET_IRM);
        out.push_str(RESET_DECKM);
        out.push_str(RESET_DECSCNM);
        out.push_str(DISABLE_BRACKETED_PASTE);
        out.push_str(DISABLE_MOUSE);

        if d.bracketed_paste {
            out.push_str(ENABLE_BRACKETED_PASTE);
        }
        if d.mouse_tracking {
            out.push_str(ENABLE_MOUSE);
        }
        if d.focus_tracking {
            out.push_str(ENABLE_FOCUS_TRACKING);
        }
        if d.in_band_resize_notifications {
            out.push_str(ENABLE_IN_BAND_RESIZE);
        }
        if d.color_scheme_change_notifications {
            out.push_str(ENABLE_COLOR_SCHEME_NOTIFY);
        }

        if d.alternate_screen {
            out.push_str(ENTER_ALT_SCREEN);
            if d.clear_alt_screen {
                out.push_str(CLEAR_SCREEN);
            }
        }

        if d.keyboard_protocol.is_legacy() {
            out.push_str(LEGACY_KEYBOARD_PROTOCOL);
        } else {
            out.push_str(&format!("\x1b[>{}u", d.keyboard_protocol.as_u8()));
        }

        out
    }

    /// The sequence emitted at loop teardown, reversing [`set_state`](Self::set_state).
    #[must_use]
    pub fn reset_state(&self) -> String {
        let d = &self.desired;
        let mut out = String::new();

        // Pop keyboard protocol.
        out.push_str("\x1b[<u");

        if d.alternate_screen {
            out.push_str(LEAVE_ALT_SCREEN);
        } else {
            out.push_str(RESTORE_CURSOR);
        }

        out.push_str(DISABLE_IN_BAND_RESIZE);
        out.push_str(RESTORE_PRIVATE_MODES);
        if d.save_colors {
            out.push_str(RESTORE_COLORS);
        }
        out.push_str(DISABLE_COLOR_SCHEME_NOTIFY);
        out.push_str(RESTORE_CURSOR);

        out
    }

    /// Returns `(set_state, reset_state)` without requiring a live output
    /// device, for unit testing.
    #[must_use]
    pub fn dry_run(&self) -> (String, String) {
        (self.set_state(), self.reset_state())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_bits_is_legacy_keyboard_protocol() {
        assert!(KeyboardProtocolBits::default().is_legacy());
    }

    #[test]
    fn bits_combine_with_bitwise_or() {
        let bits = KeyboardProtocolBits {
            disambiguate: true,
            report_event_types: true,
            ..Default::default()
        };
        assert_eq!(bits.as_u8(), 0b0000_0011);
    }

    #[test]
    fn legacy_mode_emits_push_with_gt_u() {
        let controller = TerminalStateController::new(DesiredState::default());
        assert!(controller.set_state().ends_with("\x1b[>u"));
    }

    #[test]
    fn non_legacy_mode_encodes_bits_before_u() {
        let desired = DesiredState {
            keyboard_protocol: KeyboardProtocolBits {
                disambiguate: true,
                ..Default::default()
            },
            ..Default::default()
        };
        let controller = TerminalStateController::new(desired);
        assert!(controller.set_state().ends_with("\x1b[>1u"));
    }

    #[test]
    fn alt_screen_saves_cursor_before_entering() {
        let desired = DesiredState {
            alternate_screen: true,
            ..Default::default()
        };
        let controller = TerminalStateController::new(desired);
        let set = controller.set_state();
        let save_pos = set.find(SAVE_CURSOR).unwrap();
        let enter_pos = set.find(ENTER_ALT_SCREEN).unwrap();
        assert!(save_pos < enter_pos);
    }

    #[test]
    fn reset_pops_keyboard_protocol_first() {
        let controller = TerminalStateController::new(DesiredState::default());
        assert!(controller.reset_state().starts_with("\x1b[<u"));
    }

    #[test]
    fn dry_run_matches_individual_calls() {
        let controller = TerminalStateController::new(DesiredState {
            mouse_tracking: true,
            ..Default::default()
        });
        let (set, reset) = controller.dry_run();
        assert_eq!(set, controller.set_state());
        assert_eq!(reset, controller.reset_state());
    }
}
