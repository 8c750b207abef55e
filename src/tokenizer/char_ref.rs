// Copyright 2024-2026 The canopy Project Developers. See the
// COPYRIGHT file at the top-level directory of this distribution.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//§ tokenizing-character-references

use super::Tokenizer;
use crate::data;

use log::debug;
use mac::format_if;
use std::borrow::Cow::Borrowed;
use std::char::from_u32;
use tendril::StrTendril;

pub(super) struct CharRef {
    /// The resulting character(s)
    pub(super) chars: [char; 2],

    /// How many slots in `chars` are valid?
    pub(super) num_chars: u8,
}

impl CharRef {
    const EMPTY: CharRef = CharRef {
        chars: ['\0', '\0'],
        num_chars: 0,
    };
}

#[derive(Debug)]
enum State {
    Begin,
    Octothorpe,
    Numeric(u32), // base
    NumericSemicolon,
    Named,
    BogusName,
}

/// The character-reference sub-tokenizer.
///
/// The input is fully materialized, so unlike the main state machine this
/// one never has to wait for more characters: [`run`](Self::run) drives it
/// to completion, and running off the end of the input is the end-of-file
/// case, not a suspend. Un-consuming is a cursor rollback on the main
/// tokenizer.
pub(super) struct CharRefTokenizer {
    state: State,
    is_consumed_in_attribute: bool,

    num: u32,
    num_too_big: bool,
    seen_digit: bool,
    hex_marker: Option<char>,

    name_buf: StrTendril,
    name_match: Option<(u32, u32)>,
    name_len: usize,
}

impl CharRefTokenizer {
    pub(super) fn new(is_consumed_in_attribute: bool) -> CharRefTokenizer {
        CharRefTokenizer {
            is_consumed_in_attribute,
            state: State::Begin,
            num: 0,
            num_too_big: false,
            seen_digit: false,
            hex_marker: None,
            name_buf: StrTendril::new(),
            name_match: None,
            name_len: 0,
        }
    }

    /// Run to completion. The `&` itself has already been consumed.
    pub(super) fn run(mut self, tokenizer: &mut Tokenizer) -> CharRef {
        loop {
            debug!("char ref tokenizer stepping in state {:?}", self.state);
            let done = match self.state {
                State::Begin => self.do_begin(tokenizer),
                State::Octothorpe => self.do_octothorpe(tokenizer),
                State::Numeric(base) => self.do_numeric(tokenizer, base),
                State::NumericSemicolon => self.do_numeric_semicolon(tokenizer),
                State::Named => self.do_named(tokenizer),
                State::BogusName => self.do_bogus_name(tokenizer),
            };
            if let Some(char_ref) = done {
                return char_ref;
            }
        }
    }

    fn finish_one(&mut self, c: char) -> Option<CharRef> {
        Some(CharRef {
            chars: [c, '\0'],
            num_chars: 1,
        })
    }

    fn do_begin(&mut self, tokenizer: &mut Tokenizer) -> Option<CharRef> {
        match tokenizer.peek() {
            Some('a'..='z' | 'A'..='Z' | '0'..='9') => {
                self.state = State::Named;
                None
            },
            Some('#') => {
                tokenizer.discard_char();
                self.state = State::Octothorpe;
                None
            },
            // Anything else, including end of input: not a reference.
            _ => Some(CharRef::EMPTY),
        }
    }

    fn do_octothorpe(&mut self, tokenizer: &mut Tokenizer) -> Option<CharRef> {
        match tokenizer.peek() {
            Some(c @ ('x' | 'X')) => {
                tokenizer.discard_char();
                self.hex_marker = Some(c);
                self.state = State::Numeric(16);
                None
            },
            Some(_) => {
                self.hex_marker = None;
                self.state = State::Numeric(10);
                None
            },
            None => {
                tokenizer.unconsume(1); // the '#'
                tokenizer.emit_error(Borrowed("EOF after '#' in character reference"));
                Some(CharRef::EMPTY)
            },
        }
    }

    fn do_numeric(&mut self, tokenizer: &mut Tokenizer, base: u32) -> Option<CharRef> {
        let Some(c) = tokenizer.peek() else {
            return if self.seen_digit {
                tokenizer.emit_error(Borrowed("EOF in numeric character reference"));
                self.finish_numeric(tokenizer)
            } else {
                Some(self.unconsume_numeric(tokenizer))
            };
        };
        match c.to_digit(base) {
            Some(n) => {
                tokenizer.discard_char();
                self.num = self.num.wrapping_mul(base);
                if self.num > 0x10FFFF {
                    // We might overflow, and the character is definitely invalid.
                    // We still parse digits and semicolon, but don't use the result.
                    self.num_too_big = true;
                }
                self.num = self.num.wrapping_add(n);
                self.seen_digit = true;
                None
            },

            None if !self.seen_digit => Some(self.unconsume_numeric(tokenizer)),

            None => {
                self.state = State::NumericSemicolon;
                None
            },
        }
    }

    fn do_numeric_semicolon(&mut self, tokenizer: &mut Tokenizer) -> Option<CharRef> {
        match tokenizer.peek() {
            Some(';') => tokenizer.discard_char(),
            Some(_) => tokenizer.emit_error(Borrowed(
                "Semicolon missing after numeric character reference",
            )),
            None => tokenizer.emit_error(Borrowed("EOF in numeric character reference")),
        };
        self.finish_numeric(tokenizer)
    }

    fn unconsume_numeric(&mut self, tokenizer: &mut Tokenizer) -> CharRef {
        let mut unconsume = 1; // the '#'
        if let Some(c) = self.hex_marker {
            unconsume += c.len_utf8();
        }

        tokenizer.unconsume(unconsume);
        tokenizer.emit_error(Borrowed("Numeric character reference without digits"));
        CharRef::EMPTY
    }

    fn finish_numeric(&mut self, tokenizer: &mut Tokenizer) -> Option<CharRef> {
        fn conv(n: u32) -> char {
            from_u32(n).expect("invalid char missed by error handling cases")
        }

        let (c, error) = match self.num {
            n if (n > 0x10FFFF) || self.num_too_big => ('\u{fffd}', true),
            0x00 | 0xD800..=0xDFFF => ('\u{fffd}', true),

            0x80..=0x9F => match data::C1_REPLACEMENTS[(self.num - 0x80) as usize] {
                Some(c) => (c, true),
                None => (conv(self.num), true),
            },

            0x01..=0x08 | 0x0B | 0x0D..=0x1F | 0x7F | 0xFDD0..=0xFDEF => (conv(self.num), true),

            n if (n & 0xFFFE) == 0xFFFE => (conv(n), true),

            n => (conv(n), false),
        };

        if error {
            let msg = format_if!(
                tokenizer.opts.exact_errors,
                "Invalid numeric character reference",
                "Invalid numeric character reference value 0x{:06X}",
                self.num
            );
            tokenizer.emit_error(msg);
        }

        self.finish_one(c)
    }

    fn do_named(&mut self, tokenizer: &mut Tokenizer) -> Option<CharRef> {
        // peek + discard skips over newline normalization, making the
        // rollback in finish_named exact.
        let Some(c) = tokenizer.peek() else {
            return self.finish_named(tokenizer, None);
        };
        tokenizer.discard_char();
        self.name_buf.push_char(c);
        match data::NAMED_ENTITIES.get(&self.name_buf[..]) {
            // We have either a full match or a prefix of one.
            Some(&m) => {
                if m.0 != 0 {
                    // We have a full match, but there might be a longer one to come.
                    self.name_match = Some(m);
                    self.name_len = self.name_buf.len();
                }
                // Otherwise we just have a prefix match.
                None
            },

            // Can't continue the match.
            None => self.finish_named(tokenizer, Some(c)),
        }
    }

    fn emit_name_error(&mut self, tokenizer: &mut Tokenizer) {
        let msg = format_if!(
            tokenizer.opts.exact_errors,
            "Invalid character reference",
            "Invalid character reference &{}",
            &*self.name_buf
        );
        tokenizer.emit_error(msg);
    }

    fn unconsume_name(&mut self, tokenizer: &mut Tokenizer) {
        tokenizer.unconsume(self.name_buf.len());
    }

    fn finish_named(&mut self, tokenizer: &mut Tokenizer, end_char: Option<char>) -> Option<CharRef> {
        match self.name_match {
            None => {
                match end_char {
                    Some(c) if c.is_ascii_alphanumeric() => {
                        // Keep looking for a semicolon, to determine whether
                        // we emit a parse error.
                        self.state = State::BogusName;
                        return None;
                    },

                    // Check length because &; is not a parse error.
                    Some(';') if self.name_buf.len() > 1 => self.emit_name_error(tokenizer),

                    _ => (),
                }
                self.unconsume_name(tokenizer);
                Some(CharRef::EMPTY)
            },

            Some((c1, c2)) => {
                // We have a complete match, but we may have consumed
                // additional characters into self.name_buf.  Usually
                // at least one, but several in cases like
                //
                //     &not    => match for U+00AC
                //     &noti   => valid prefix for &notin
                //     &notit  => can't continue match
                let name_len = self.name_len;
                assert!(name_len > 0);
                let last_matched = self.name_buf[name_len - 1..].chars().next().unwrap();

                // There might not be a next character after the match, if
                // we had a full match and then hit EOF.
                let next_after = if name_len == self.name_buf.len() {
                    None
                } else {
                    Some(self.name_buf[name_len..].chars().next().unwrap())
                };

                // If the character reference was consumed as part of an attribute, and the last
                // character matched is not a U+003B SEMICOLON character (;), and the next input
                // character is either a U+003D EQUALS SIGN character (=) or an ASCII alphanumeric,
                // then, for historical reasons, flush code points consumed as a character
                // reference and switch to the return state.
                let unconsume_all = match (self.is_consumed_in_attribute, last_matched, next_after) {
                    (_, ';', _) => false,
                    (true, _, Some('=')) => true,
                    (true, _, Some(c)) if c.is_ascii_alphanumeric() => true,
                    _ => {
                        // 1. If the last character matched is not a U+003B SEMICOLON character
                        //    (;), then this is a missing-semicolon-after-character-reference parse
                        //    error.
                        tokenizer.emit_error(Borrowed(
                            "Character reference does not end with semicolon",
                        ));
                        false
                    },
                };

                if unconsume_all {
                    self.unconsume_name(tokenizer);
                    Some(CharRef::EMPTY)
                } else {
                    tokenizer.unconsume(self.name_buf.len() - name_len);
                    Some(CharRef {
                        chars: [from_u32(c1).unwrap(), from_u32(c2).unwrap()],
                        num_chars: if c2 == 0 { 1 } else { 2 },
                    })
                }
            },
        }
    }

    fn do_bogus_name(&mut self, tokenizer: &mut Tokenizer) -> Option<CharRef> {
        let Some(c) = tokenizer.peek() else {
            self.unconsume_name(tokenizer);
            return Some(CharRef::EMPTY);
        };
        tokenizer.discard_char();
        self.name_buf.push_char(c);
        match c {
            _ if c.is_ascii_alphanumeric() => return None,
            ';' => self.emit_name_error(tokenizer),
            _ => (),
        }
        self.unconsume_name(tokenizer);
        Some(CharRef::EMPTY)
    }
}
