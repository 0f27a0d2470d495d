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

//! Decodes [`crate::ansi::ParserEvent::Csi`] bodies into typed key and mouse
//! events: the extended keyboard protocol grammar and SGR-pixel mouse mode.

/// Size of a terminal cell grid in both cells and pixels, used to translate
/// SGR-pixel-mode mouse coordinates into cell coordinates. Re-queried on
/// `SIGWINCH`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScreenSize {
    pub width_px: u32,
    pub height_px: u32,
    pub cell_width: u32,
    pub cell_height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyEventType {
    Press,
    Release,
    Repeat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Modifiers {
    pub shift: bool,
    pub alt: bool,
    pub ctrl: bool,
    pub super_: bool,
    pub hyper: bool,
    pub meta: bool,
    pub caps_lock: bool,
    pub num_lock: bool,
}

impl Modifiers {
    /// The extended keyboard protocol encodes modifiers as `1 + bitmask`.
    #[must_use]
    pub fn from_encoded(value: u32) -> Modifiers {
        let bits = value.saturating_sub(1);
        Modifiers {
            shift: bits & 1 != 0,
            alt: bits & 2 != 0,
            ctrl: bits & 4 != 0,
            super_: bits & 8 != 0,
            hyper: bits & 16 != 0,
            meta: bits & 32 != 0,
            caps_lock: bits & 64 != 0,
            num_lock: bits & 128 != 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyEvent {
    pub key: u32,
    pub shifted_key: Option<u32>,
    pub alternate_key: Option<u32>,
    pub modifiers: Modifiers,
    pub event_type: KeyEventType,
    pub text: Option<String>,
    pub handled: bool,
}

/// Errors returned while decoding a CSI body that doesn't match a known
/// grammar; callers should simply ignore bodies they don't recognize.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("csi body did not match a recognized key/mouse grammar")]
pub struct DecodeError;

/// Parses a CSI body of the shape `code;modifiers;event-type;text u` (or the
/// legacy final bytes `~`, letters, etc.) into a [`KeyEvent`].
pub fn decode_key_event(body: &[u8]) -> Result<KeyEvent, DecodeError> {
    let Some((&final_byte, rest)) = body.split_last() else {
        return Err(DecodeError);
    };
    if final_byte != b'u' && final_byte != b'~' {
        return Err(DecodeError);
    }

    let text = std::str::from_utf8(rest).map_err(|_| DecodeError)?;
    let mut fields = text.split(';');

    let key_field = fields.next().unwrap_or_default();
    let mut key_parts = key_field.split(':');
    let key: u32 = key_parts
        .next()
        .unwrap_or_default()
        .parse()
        .map_err(|_| DecodeError)?;
    let shifted_key = key_parts.next().and_then(|s| s.parse().ok());
    let alternate_key = key_parts.next().and_then(|s| s.parse().ok());

    let modifier_field = fields.next();
    let mut modifier_parts = modifier_field.unwrap_or_default().split(':');
    let modifiers = modifier_parts
        .next()
        .and_then(|s| s.parse::<u32>().ok())
        .map_or(Modifiers::default(), Modifiers::from_encoded);
    let event_type = match modifier_parts.next() {
        Some("2") => KeyEventType::Repeat,
        Some("3") => KeyEventType::Release,
        _ => KeyEventType::Press,
    };

    let text_field = fields.next();
    let text = text_field.and_then(|field| {
        let codepoints: Vec<char> = field
            .split(':')
            .filter_map(|part| part.parse::<u32>().ok())
            .filter_map(char::from_u32)
            .collect();
        if codepoints.is_empty() {
            None
        } else {
            Some(codepoints.into_iter().collect())
        }
    });

    Ok(KeyEvent {
        key,
        shifted_key,
        alternate_key,
        modifiers,
        event_type,
        text,
        handled: false,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseButton {
    Left,
    Middle,
    Right,
    None,
    WheelUp,
    WheelDown,
    WheelLeft,
    WheelRight,
    Extended(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseEventKind {
    Press,
    Release,
    Move,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MouseEvent {
    pub button: MouseButton,
    pub kind: MouseEventKind,
    pub modifiers: Modifiers,
    pub pixel_x: u32,
    pub pixel_y: u32,
    pub cell_x: u32,
    pub cell_y: u32,
}

/// Parses an SGR-pixel-mode mouse CSI body (the part after the `<` prefix):
/// `cb;px;py(M|m)`, per spec.md §4.D.
pub fn decode_mouse_event(body: &[u8], screen: ScreenSize) -> Result<MouseEvent, DecodeError> {
    let Some((&final_byte, rest)) = body.split_last() else {
        return Err(DecodeError);
    };
    if final_byte != b'M' && final_byte != b'm' {
        return Err(DecodeError);
    }

    let text = std::str::from_utf8(rest).map_err(|_| DecodeError)?;
    let mut parts = text.split(';');
    let cb: u32 = parts
        .next()
        .ok_or(DecodeError)?
        .parse()
        .map_err(|_| DecodeError)?;
    let pixel_x: u32 = parts
        .next()
        .ok_or(DecodeError)?
        .parse()
        .map_err(|_| DecodeError)?;
    let pixel_y: u32 = parts
        .next()
        .ok_or(DecodeError)?
        .parse()
        .map_err(|_| DecodeError)?;

    let is_motion = cb & 0b0010_0000 != 0;
    let button = if cb < 64 {
        match cb & 3 {
            0 => MouseButton::Left,
            1 => MouseButton::Middle,
            2 => MouseButton::Right,
            _ => MouseButton::None,
        }
    } else if cb < 128 {
        match cb & 3 {
            0 => MouseButton::WheelUp,
            1 => MouseButton::WheelDown,
            2 => MouseButton::WheelLeft,
            _ => MouseButton::WheelRight,
        }
    } else {
        MouseButton::Extended(cb)
    };

    let modifiers = Modifiers {
        shift: cb & 0b0000_0100 != 0,
        alt: cb & 0b0000_1000 != 0,
        ctrl: cb & 0b0001_0000 != 0,
        ..Default::default()
    };

    let kind = if final_byte == b'm' {
        MouseEventKind::Release
    } else if is_motion {
        MouseEventKind::Move
    } else {
        MouseEventKind::Press
    };

    let cell_x = if screen.cell_width == 0 {
        0
    } else {
        pixel_x / screen.cell_width
    };
    let cell_y = if screen.cell_height == 0 {
        0
    } else {
        pixel_y / screen.cell_height
    };

    Ok(MouseEvent {
        button,
        kind,
        modifiers,
        pixel_x,
        pixel_y,
        cell_x,
        cell_y,
    })
}
