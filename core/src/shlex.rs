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

//! POSIX-like shell word splitting plus ANSI-C (`$'...'`) escape expansion
//! (spec.md §4.J), used to turn `--stdin`'s lines into argv-style word
//! lists.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ShlexError {
    /// EOF inside `'...'`; carries the partial token accumulated so far.
    #[error("unterminated single-quoted string (partial token: {0:?})")]
    UnterminatedSingleQuote(String),
    /// EOF inside `"..."`; carries the partial token accumulated so far.
    #[error("unterminated double-quoted string (partial token: {0:?})")]
    UnterminatedDoubleQuote(String),
    /// EOF inside `$'...'`; carries the partial token accumulated so far.
    #[error("unterminated ANSI-C quoted string (partial token: {0:?})")]
    UnterminatedAnsiCQuote(String),
    #[error("dangling backslash at end of input")]
    DanglingBackslash,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Unquoted,
    Single,
    Double,
    AnsiC,
}

/// Splits `line` into words, honoring single quotes (no escapes), double
/// quotes (backslash escapes only `\\` and `\"`; any other backslash stays
/// literal), and `$'...'` ANSI-C quoting (full backslash escape
/// expansion). Outside quotes, unescaped whitespace separates words and a
/// trailing unescaped backslash is an error.
pub fn split(line: &str) -> Result<Vec<String>, ShlexError> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut have_current = false;
    let mut mode = Mode::Unquoted;
    let mut chars = line.chars().peekable();

    while let Some(ch) = chars.next() {
        match mode {
            Mode::Unquoted => match ch {
                ' ' | '\t' | '\n' => {
                    if have_current {
                        words.push(std::mem::take(&mut current));
                        have_current = false;
                    }
                }
                '\'' => {
                    mode = Mode::Single;
                    have_current = true;
                }
                '"' => {
                    mode = Mode::Double;
                    have_current = true;
                }
                '$' if chars.peek() == Some(&'\'') => {
                    chars.next();
                    mode = Mode::AnsiC;
                    have_current = true;
                }
                '\\' => {
                    let escaped = chars.next().ok_or(ShlexError::DanglingBackslash)?;
                    current.push(escaped);
                    have_current = true;
                }
                _ => {
                    current.push(ch);
                    have_current = true;
                }
            },
            Mode::Single => {
                if ch == '\'' {
                    mode = Mode::Unquoted;
                } else {
                    current.push(ch);
                }
            }
            Mode::Double => match ch {
                '"' => mode = Mode::Unquoted,
                '\\' => match chars.peek() {
                    Some(&c @ ('\\' | '"')) => {
                        chars.next();
                        current.push(c);
                    }
                    _ => current.push('\\'),
                },
                _ => current.push(ch),
            },
            Mode::AnsiC => {
                if ch == '\'' {
                    mode = Mode::Unquoted;
                } else if ch == '\\' {
                    current.push_str(&expand_ansi_c_escape(&mut chars)?);
                } else {
                    current.push(ch);
                }
            }
        }
    }

    match mode {
        Mode::Single => return Err(ShlexError::UnterminatedSingleQuote(current)),
        Mode::Double => return Err(ShlexError::UnterminatedDoubleQuote(current)),
        Mode::AnsiC => return Err(ShlexError::UnterminatedAnsiCQuote(current)),
        Mode::Unquoted => {}
    }

    if have_current {
        words.push(current);
    }
    Ok(words)
}

/// Expands one backslash escape inside a `$'...'` string. Unknown escapes
/// pass through as-is (backslash kept); codepoints outside the valid
/// Unicode range are dropped rather than erroring (spec.md §4.J).
fn expand_ansi_c_escape(
    chars: &mut std::iter::Peekable<std::str::Chars<'_>>,
) -> Result<String, ShlexError> {
    let Some(tag) = chars.next() else {
        return Err(ShlexError::DanglingBackslash);
    };
    let single = |c: char| Ok(c.to_string());
    match tag {
        'n' => single('\n'),
        't' => single('\t'),
        'r' => single('\r'),
        'a' => single('\u{07}'),
        'b' => single('\u{08}'),
        'f' => single('\u{0c}'),
        'v' => single('\u{0b}'),
        '\\' => single('\\'),
        '\'' => single('\''),
        '"' => single('"'),
        '?' => single('?'),
        'e' | 'E' => single('\u{1b}'),
        'x' => Ok(take_hex_digits(chars, 2)
            .map(|c| c.to_string())
            .unwrap_or_default()),
        'u' => Ok(take_hex_digits(chars, 4)
            .map(|c| c.to_string())
            .unwrap_or_default()),
        'U' => Ok(take_hex_digits(chars, 8)
            .map(|c| c.to_string())
            .unwrap_or_default()),
        'c' => {
            let Some(control) = chars.next() else {
                return Ok("\\c".to_string());
            };
            let upper = control.to_ascii_uppercase();
            Ok(char::from_u32(u32::from(upper as u8) ^ 0x40)
                .map(|c| c.to_string())
                .unwrap_or_default())
        }
        digit @ '0'..='7' => {
            let mut value = digit.to_digit(8).unwrap_or(0);
            for _ in 0..2 {
                match chars.peek() {
                    Some(&d) if ('0'..='7').contains(&d) => {
                        value = value * 8 + d.to_digit(8).unwrap_or(0);
                        chars.next();
                    }
                    _ => break,
                }
            }
            Ok(char::from_u32(value).map(|c| c.to_string()).unwrap_or_default())
        }
        // Unknown escape: pass through literally, backslash included.
        other => Ok(format!("\\{other}")),
    }
}

/// Reads up to `count` hex digits and decodes them as a codepoint. Returns
/// `None` on a malformed or out-of-range escape rather than erroring, so
/// the caller can drop it per spec.md §4.J.
fn take_hex_digits(
    chars: &mut std::iter::Peekable<std::str::Chars<'_>>,
    count: usize,
) -> Option<char> {
    let mut value = 0u32;
    let mut consumed = 0;
    for _ in 0..count {
        let Some(&digit) = chars.peek() else { break };
        let Some(nibble) = digit.to_digit(16) else {
            break;
        };
        value = value * 16 + nibble;
        chars.next();
        consumed += 1;
    }
    if consumed == 0 {
        return None;
    }
    char::from_u32(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_unquoted_whitespace() {
        assert_eq!(split("ls -la /tmp").unwrap(), vec!["ls", "-la", "/tmp"]);
    }

    #[test]
    fn single_quotes_are_fully_literal() {
        assert_eq!(split(r"'a\nb $x'").unwrap(), vec![r"a\nb $x"]);
    }

    #[test]
    fn double_quotes_allow_only_backslash_and_quote_escapes() {
        assert_eq!(split(r#""a\"b\\c\td""#).unwrap(), vec![r#"a"b\c\td"#]);
    }

    #[test]
    fn double_quotes_leave_other_backslash_sequences_literal() {
        assert_eq!(split(r#""\$x\`y""#).unwrap(), vec![r"\$x\`y"]);
    }

    #[test]
    fn ansi_c_quoting_expands_named_and_hex_escapes() {
        assert_eq!(split(r"$'a\tb\x41'").unwrap(), vec!["a\tb\x41"]);
    }

    #[test]
    fn ansi_c_quoting_expands_control_escape() {
        assert_eq!(split(r"$'\cA'").unwrap(), vec!["\u{01}"]);
    }

    #[test]
    fn ansi_c_quoting_expands_question_mark_escape() {
        assert_eq!(split(r"$'\?'").unwrap(), vec!["?"]);
    }

    #[test]
    fn ansi_c_quoting_passes_through_unknown_escapes() {
        assert_eq!(split(r"$'\q'").unwrap(), vec![r"\q"]);
    }

    #[test]
    fn ansi_c_quoting_drops_an_out_of_range_unicode_escape() {
        assert_eq!(split(r"$'a\UFFFFFFFFb'").unwrap(), vec!["ab"]);
    }

    #[test]
    fn unterminated_single_quote_carries_the_partial_token() {
        assert_eq!(
            split("'abc").unwrap_err(),
            ShlexError::UnterminatedSingleQuote("abc".to_string())
        );
    }

    #[test]
    fn dangling_backslash_is_an_error() {
        assert_eq!(split("abc\\").unwrap_err(), ShlexError::DanglingBackslash);
    }

    #[test]
    fn adjacent_quoted_segments_join_into_one_word() {
        assert_eq!(split("foo'bar'baz").unwrap(), vec!["foobarbaz"]);
    }

    #[test]
    fn empty_input_yields_no_words() {
        assert_eq!(split("   ").unwrap(), Vec::<String>::new());
    }
}
