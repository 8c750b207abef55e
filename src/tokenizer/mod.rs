// Copyright 2024-2026 The canopy Project Developers. See the
// COPYRIGHT file at the top-level directory of this distribution.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! The HTML5 tokenizer.
//!
//! The tokenizer owns the whole input and a single cursor over it, and
//! hands out tokens one at a time from [`next_token`](Tokenizer::next_token).
//! The tree builder nudges it between tokens: into a raw-text state after
//! a `<script>`/`<style>`/... start tag, into PLAINTEXT after
//! `<plaintext>`, and in and out of CDATA-permitting foreign content.

pub use self::tokens::{Doctype, Span, Tag, TagKind, Token};

use self::states::{DoctypeIdKind, Public, System};
use self::states::{DoubleEscaped, Escaped};
use self::states::{DoubleQuoted, RawKind, SingleQuoted, Unquoted};
use self::states::{Rawtext, Rcdata, ScriptData, ScriptDataEscaped};

use self::char_ref::CharRefTokenizer;

use crate::interface::{Attribute, ParseError, QualName};
use crate::util::smallcharset::SmallCharSet;
use crate::util::str::lower_ascii_letter;
use crate::LocalName;

use log::{debug, trace};
use mac::format_if;
use std::borrow::Cow::{self, Borrowed};
use std::collections::VecDeque;
use std::mem;
use tendril::StrTendril;

mod char_ref;
pub mod states;
mod tokens;

/// Result of scanning for the next significant character: either a single
/// character from a [`SmallCharSet`], or a run of characters none of which
/// are in the set, sliced out of the input without copying.
#[derive(PartialEq, Eq, Debug)]
enum SetResult {
    FromSet(char),
    NotFromSet(StrTendril),
}
use self::SetResult::{FromSet, NotFromSet};

fn option_push(opt_str: &mut Option<StrTendril>, c: char) {
    match *opt_str {
        Some(ref mut s) => s.push_char(c),
        None => *opt_str = Some(StrTendril::from_char(c)),
    }
}

/// Tokenizer options, with an impl for `Default`.
#[derive(Clone)]
pub struct TokenizerOpts {
    /// Report all parse errors described in the spec, at some
    /// performance penalty?  Default: false
    pub exact_errors: bool,

    /// Discard a `U+FEFF BYTE ORDER MARK` if we see one at the beginning
    /// of the stream?  Default: true
    pub discard_bom: bool,

    /// Initial state override.  Used by the fragment parsing algorithm
    /// and the test runner.
    pub initial_state: Option<states::State>,

    /// Last start tag.  Used by the fragment parsing algorithm and the
    /// test runner to make "appropriate end tag" checks work from the
    /// first token.
    pub last_start_tag_name: Option<String>,
}

impl Default for TokenizerOpts {
    fn default() -> TokenizerOpts {
        TokenizerOpts {
            exact_errors: false,
            discard_bom: true,
            initial_state: None,
            last_start_tag_name: None,
        }
    }
}

/// The HTML tokenizer.
pub struct Tokenizer {
    /// Options controlling the behavior of the tokenizer.
    opts: TokenizerOpts,

    /// The input. All of it; the cursor below is the only notion of
    /// progress.
    input: StrTendril,

    /// Byte offset of the next character to consume.
    pos: usize,

    /// Byte offset at which the most recently consumed character started.
    char_start: usize,

    /// The abstract machine state as described in the spec.
    state: states::State,

    /// Tokens produced but not yet handed out. A single state step can
    /// produce more than one (error recovery paths emit `<` and friends
    /// as text before switching states).
    pending: VecDeque<Token>,

    /// Are we done consuming input? EOF steps may still emit tokens.
    at_eof: bool,

    /// Has the end-of-input `Error` token been reached?
    eof_emitted: bool,

    /// Current input character.  Just consumed, may reconsume.
    current_char: char,

    /// Should we reconsume the current input character?
    reconsume: bool,

    /// Did we just consume \r, translating it to \n?  In that case we need
    /// to ignore the next character if it's \n.
    ignore_lf: bool,

    /// Buffered text run not yet emitted as a token, with the byte offsets
    /// it covers. Flushed whenever a non-text token is about to be emitted.
    current_text: StrTendril,
    text_start: usize,
    text_end: usize,

    /// Byte offset where the token being built started (its `<` or `<!`).
    token_start: usize,

    /// Current tag kind.
    current_tag_kind: TagKind,

    /// Current tag name.
    current_tag_name: StrTendril,

    /// Current tag is self-closing?
    current_tag_self_closing: bool,

    /// Current tag attributes.
    current_tag_attrs: Vec<Attribute>,

    /// Current attribute name.
    current_attr_name: StrTendril,

    /// Current attribute value.
    current_attr_value: StrTendril,

    /// Current comment.
    current_comment: StrTendril,

    /// Current doctype token.
    current_doctype: Doctype,

    /// Last start tag name, for use in checking "appropriate end tag".
    last_start_tag_name: Option<LocalName>,

    /// The "temporary buffer" mentioned in the spec.
    temp_buf: StrTendril,

    /// May `<![CDATA[` open a CDATA section? True while the adjusted
    /// current node is in foreign content; the driver refreshes this
    /// after every tree-builder step.
    allow_cdata: bool,

    /// Diagnostics accumulated so far.
    errors: Vec<ParseError>,
}

impl Tokenizer {
    /// Create a new tokenizer which reads from the given input.
    pub fn new(input: StrTendril, mut opts: TokenizerOpts) -> Tokenizer {
        let start_tag_name = opts.last_start_tag_name.take().map(|s| LocalName::from(&*s));
        let state = opts.initial_state.unwrap_or(states::Data);
        let pos = if opts.discard_bom && input.starts_with('\u{feff}') {
            '\u{feff}'.len_utf8()
        } else {
            0
        };
        Tokenizer {
            opts,
            input,
            pos,
            char_start: pos,
            state,
            pending: VecDeque::new(),
            at_eof: false,
            eof_emitted: false,
            current_char: '\0',
            reconsume: false,
            ignore_lf: false,
            current_text: StrTendril::new(),
            text_start: 0,
            text_end: 0,
            token_start: 0,
            current_tag_kind: TagKind::StartTag,
            current_tag_name: StrTendril::new(),
            current_tag_self_closing: false,
            current_tag_attrs: vec![],
            current_attr_name: StrTendril::new(),
            current_attr_value: StrTendril::new(),
            current_comment: StrTendril::new(),
            current_doctype: Doctype::default(),
            last_start_tag_name: start_tag_name,
            temp_buf: StrTendril::new(),
            allow_cdata: false,
            errors: vec![],
        }
    }

    /// Get the next token. At the end of the input this returns
    /// `Token::Error`, and keeps returning it on every later call.
    pub fn next_token(&mut self) -> Token {
        loop {
            if let Some(token) = self.pending.pop_front() {
                return token;
            }
            if self.eof_emitted {
                return Token::Error {
                    span: Span::new(self.input.len(), self.input.len()),
                };
            }
            self.step();
        }
    }

    /// Switch the tokenizer into one of the raw text states. Called by the
    /// tree constructor after it processes a start tag whose content model
    /// is raw text or RCDATA.
    pub fn set_raw_text_mode(&mut self, kind: RawKind) {
        self.state = states::RawData(kind);
    }

    /// Switch into the PLAINTEXT state; there is no way back out.
    pub fn set_plaintext_state(&mut self) {
        self.state = states::Plaintext;
    }

    /// Set whether `<![CDATA[` opens a CDATA section (true while the
    /// adjusted current node is a foreign element).
    pub fn set_allow_cdata(&mut self, allow: bool) {
        self.allow_cdata = allow;
    }

    /// Drain the diagnostics collected so far.
    pub fn take_errors(&mut self) -> Vec<ParseError> {
        mem::take(&mut self.errors)
    }

    //§ preprocessing-the-input-stream
    // Consume the next raw input character, with no newline normalization.
    fn next_raw(&mut self) -> Option<char> {
        let c = self.input[self.pos..].chars().next()?;
        self.char_start = self.pos;
        self.pos += c.len_utf8();
        Some(c)
    }

    // Apply newline normalization to a just-consumed character.
    fn get_preprocessed_char(&mut self, mut c: char) -> Option<char> {
        if self.ignore_lf {
            self.ignore_lf = false;
            if c == '\n' {
                c = self.next_raw()?;
            }
        }

        if c == '\r' {
            self.ignore_lf = true;
            c = '\n';
        }

        if self.opts.exact_errors
            && match c as u32 {
                0x01..=0x08 | 0x0B | 0x0E..=0x1F | 0x7F..=0x9F | 0xFDD0..=0xFDEF => true,
                n if (n & 0xFFFE) == 0xFFFE => true,
                _ => false,
            }
        {
            let msg = format!("Bad character {c}");
            self.emit_error(Cow::Owned(msg));
        }

        trace!("got character {c}");
        self.current_char = c;
        Some(c)
    }

    //§ tokenization
    // Get the next input character, if one is available.
    fn get_char(&mut self) -> Option<char> {
        if self.reconsume {
            self.reconsume = false;
            Some(self.current_char)
        } else {
            self.next_raw().and_then(|c| self.get_preprocessed_char(c))
        }
    }

    // Either a single character from the set, or the run of characters
    // before the next one. The fallback `FromSet` cases must do the same
    // thing as the `NotFromSet` case, because the slow path can return
    // characters not in the set.
    fn pop_except_from(&mut self, set: SmallCharSet) -> Option<SetResult> {
        // Bail to the slow path for various corner cases.
        if self.opts.exact_errors || self.reconsume || self.ignore_lf {
            return self.get_char().map(FromSet);
        }

        let n = set.nonmember_prefix_len(&self.input[self.pos..]);
        if n > 0 {
            let run = self.input.subtendril(self.pos as u32, n);
            self.pos += n as usize;
            trace!("got characters {run:?}");
            Some(NotFromSet(run))
        } else {
            self.get_char().map(FromSet)
        }
    }

    // Check whether the next characters match `pat`, under the byte
    // comparison `eq`; consume them if so. With the whole input in hand
    // there is no "not enough input to know" case: a short remainder is
    // simply not a match.
    //
    // NB: this doesn't set the current input character.
    fn eat(&mut self, pat: &str, eq: fn(&u8, &u8) -> bool) -> bool {
        if self.ignore_lf {
            self.ignore_lf = false;
            if self.peek() == Some('\n') {
                self.discard_char();
            }
        }

        let rest = self.input[self.pos..].as_bytes();
        if rest.len() < pat.len() {
            return false;
        }
        if pat.as_bytes().iter().zip(rest).all(|(p, b)| eq(b, p)) {
            self.pos += pat.len();
            true
        } else {
            false
        }
    }

    fn peek(&self) -> Option<char> {
        if self.reconsume {
            Some(self.current_char)
        } else {
            self.input[self.pos..].chars().next()
        }
    }

    fn discard_char(&mut self) {
        // peek() deals in un-processed characters (no newline
        // normalization), while get_char() does.
        //
        // since discard_char is supposed to be used in combination with
        // peek(), discard_char must discard a single raw input character,
        // not a normalized newline.
        if self.reconsume {
            self.reconsume = false;
        } else {
            self.next_raw();
        }
    }

    // Roll the cursor back by `n` bytes; the inverse of consuming them
    // raw. This is how the character-reference tokenizer un-consumes.
    fn unconsume(&mut self, n: usize) {
        debug_assert!(n <= self.pos);
        self.pos -= n;
    }

    fn bad_char_error(&mut self) {
        let msg = format_if!(
            self.opts.exact_errors,
            "Bad character",
            "Saw {} in state {:?}",
            self.current_char,
            self.state
        );
        self.emit_error(msg);
    }

    fn bad_eof_error(&mut self) {
        let msg = format_if!(
            self.opts.exact_errors,
            "Unexpected EOF",
            "Saw EOF in state {:?}",
            self.state
        );
        self.emit_error(msg);
    }

    fn emit_error(&mut self, error: Cow<'static, str>) {
        self.errors.push(ParseError {
            offset: self.char_start,
            msg: error,
        });
    }

    // Text is accumulated across steps and flushed as a single token
    // whenever anything else is about to be emitted.
    fn emit(&mut self, token: Token) {
        self.flush_text();
        self.pending.push_back(token);
    }

    fn flush_text(&mut self) {
        if self.current_text.is_empty() {
            return;
        }
        let text = mem::take(&mut self.current_text);
        let span = Span::new(self.text_start, self.text_end);
        self.pending.push_back(Token::Text { text, span });
    }

    fn emit_char(&mut self, c: char) {
        #[cfg(feature = "trace_tokenizer")]
        trace!("  emit");

        if self.current_text.is_empty() {
            self.text_start = self.char_start;
        }
        self.current_text.push_char(c);
        self.text_end = self.pos;
    }

    // The string must already be free of '\r'; the significant-character
    // sets all contain it, so runs never do.
    fn emit_chars(&mut self, b: StrTendril) {
        if self.current_text.is_empty() {
            self.text_start = self.pos - b.len();
        }
        self.current_text.push_tendril(&b);
        self.text_end = self.pos;
    }

    fn emit_current_tag(&mut self) {
        self.finish_attribute();

        let name = LocalName::from(&*self.current_tag_name);
        self.current_tag_name.clear();
        let span = Span::new(self.token_start, self.pos);

        let token = match self.current_tag_kind {
            TagKind::StartTag => {
                self.last_start_tag_name = Some(name.clone());
                let tag = Tag {
                    name,
                    attrs: mem::take(&mut self.current_tag_attrs),
                    span,
                };
                if self.current_tag_self_closing {
                    Token::SelfClosingTag(tag)
                } else {
                    Token::StartTag(tag)
                }
            },
            TagKind::EndTag => {
                if !self.current_tag_attrs.is_empty() {
                    self.emit_error(Borrowed("Attributes on an end tag"));
                    self.current_tag_attrs.clear();
                }
                if self.current_tag_self_closing {
                    self.emit_error(Borrowed("Self-closing end tag"));
                }
                Token::EndTag(Tag {
                    name,
                    attrs: vec![],
                    span,
                })
            },
        };
        self.emit(token);
    }

    fn emit_temp_buf(&mut self) {
        // FIXME: Make sure that clearing on emit is spec-compatible.
        let buf = mem::take(&mut self.temp_buf);
        if self.current_text.is_empty() {
            self.text_start = self.char_start;
        }
        self.current_text.push_tendril(&buf);
        self.text_end = self.pos;
    }

    fn clear_temp_buf(&mut self) {
        // Do this without a new allocation.
        self.temp_buf.clear();
    }

    fn emit_current_comment(&mut self) {
        let text = mem::take(&mut self.current_comment);
        let span = Span::new(self.token_start, self.pos);
        self.emit(Token::Comment { text, span });
    }

    fn emit_current_doctype(&mut self) {
        let mut doctype = mem::take(&mut self.current_doctype);
        doctype.span = Span::new(self.token_start, self.pos);
        self.emit(Token::Doctype(doctype));
    }

    fn emit_eof(&mut self) {
        self.flush_text();
        self.eof_emitted = true;
    }

    fn discard_tag(&mut self) {
        self.current_tag_name.clear();
        self.current_tag_self_closing = false;
        self.current_tag_attrs = vec![];
    }

    fn create_tag(&mut self, kind: TagKind, c: char) {
        self.discard_tag();
        self.current_tag_name.push_char(c);
        self.current_tag_kind = kind;
    }

    fn have_appropriate_end_tag(&self) -> bool {
        match self.last_start_tag_name.as_ref() {
            Some(last) => {
                (self.current_tag_kind == TagKind::EndTag)
                    && (*self.current_tag_name == **last)
            },
            None => false,
        }
    }

    fn create_attribute(&mut self, c: char) {
        self.finish_attribute();

        self.current_attr_name.push_char(c);
    }

    fn finish_attribute(&mut self) {
        if self.current_attr_name.is_empty() {
            return;
        }

        // Check for a duplicate attribute.
        // FIXME: the spec says we should error as soon as the name is finished.
        let dup = {
            let name = &*self.current_attr_name;
            self.current_tag_attrs
                .iter()
                .any(|a| &*a.name.local == name)
        };

        if dup {
            self.emit_error(Borrowed("Duplicate attribute"));
            self.current_attr_name.clear();
            self.current_attr_value.clear();
        } else {
            let name = LocalName::from(&*self.current_attr_name);
            self.current_attr_name.clear();
            self.current_tag_attrs.push(Attribute {
                // The tree builder will adjust the namespace if necessary.
                // This only happens in foreign elements.
                name: QualName::new(None, ns!(), name),
                value: mem::take(&mut self.current_attr_value),
            });
        }
    }

    fn doctype_id(&mut self, kind: DoctypeIdKind) -> &mut Option<StrTendril> {
        match kind {
            Public => &mut self.current_doctype.public_id,
            System => &mut self.current_doctype.system_id,
        }
    }

    fn clear_doctype_id(&mut self, kind: DoctypeIdKind) {
        match *self.doctype_id(kind) {
            Some(ref mut s) => s.clear(),
            ref mut id => *id = Some(StrTendril::new()),
        }
    }

    fn consume_char_ref(&mut self) {
        let is_attr = matches!(self.state, states::AttributeValue(_));
        // Cover the '&' in spans of text that begins with a reference.
        self.char_start = self.pos - 1;
        let char_ref = CharRefTokenizer::new(is_attr).run(self);
        self.process_char_ref(char_ref);
    }

    fn process_char_ref(&mut self, char_ref: char_ref::CharRef) {
        let char_ref::CharRef {
            mut chars,
            mut num_chars,
        } = char_ref;

        if num_chars == 0 {
            chars[0] = '&';
            num_chars = 1;
        }

        for i in 0..num_chars {
            let c = chars[i as usize];
            match self.state {
                states::Data | states::RawData(states::Rcdata) => self.emit_char(c),

                states::AttributeValue(_) => self.current_attr_value.push_char(c),

                _ => panic!(
                    "state {:?} should not be reachable in process_char_ref",
                    self.state
                ),
            }
        }
    }

    // Transition into EOF handling; called the first time the cursor runs
    // off the end of the input.
    fn enter_eof(&mut self) {
        self.at_eof = true;
        self.eof_step();
    }
}

// Shorthand for common state machine behaviors.
macro_rules! shorthand (
    ( $me:ident : emit $c:expr                     ) => ( $me.emit_char($c)                             );
    ( $me:ident : create_tag $kind:ident $c:expr   ) => ( $me.create_tag(TagKind::$kind, $c)            );
    ( $me:ident : push_tag $c:expr                 ) => ( $me.current_tag_name.push_char($c)            );
    ( $me:ident : discard_tag                      ) => ( $me.discard_tag()                             );
    ( $me:ident : discard_char                     ) => ( $me.discard_char()                            );
    ( $me:ident : push_temp $c:expr                ) => ( $me.temp_buf.push_char($c)                    );
    ( $me:ident : emit_temp                        ) => ( $me.emit_temp_buf()                           );
    ( $me:ident : clear_temp                       ) => ( $me.clear_temp_buf()                          );
    ( $me:ident : create_attr $c:expr              ) => ( $me.create_attribute($c)                      );
    ( $me:ident : push_name $c:expr                ) => ( $me.current_attr_name.push_char($c)           );
    ( $me:ident : push_value $c:expr               ) => ( $me.current_attr_value.push_char($c)          );
    ( $me:ident : append_value $c:expr             ) => ( $me.current_attr_value.push_tendril($c)       );
    ( $me:ident : push_comment $c:expr             ) => ( $me.current_comment.push_char($c)             );
    ( $me:ident : append_comment $c:expr           ) => ( $me.current_comment.push_slice($c)            );
    ( $me:ident : emit_comment                     ) => ( $me.emit_current_comment()                    );
    ( $me:ident : clear_comment                    ) => ( $me.current_comment.clear()                   );
    ( $me:ident : create_doctype                   ) => ( $me.current_doctype = Doctype::default()      );
    ( $me:ident : push_doctype_name $c:expr        ) => ( option_push(&mut $me.current_doctype.name, $c) );
    ( $me:ident : push_doctype_id $k:ident $c:expr ) => ( option_push($me.doctype_id($k), $c)           );
    ( $me:ident : clear_doctype_id $k:ident        ) => ( $me.clear_doctype_id($k)                      );
    ( $me:ident : force_quirks                     ) => ( $me.current_doctype.force_quirks = true       );
    ( $me:ident : emit_doctype                     ) => ( $me.emit_current_doctype()                    );
    ( $me:ident : error                            ) => ( $me.bad_char_error()                          );
    ( $me:ident : error_eof                        ) => ( $me.bad_eof_error()                           );
);

// Tracing of tokenizer actions.  This adds significant bloat and compile time,
// so it's behind a cfg flag.
#[cfg(feature = "trace_tokenizer")]
macro_rules! sh_trace ( ( $me:ident : $($cmds:tt)* ) => ({
    trace!("  {:?}", stringify!($($cmds)*));
    shorthand!($me : $($cmds)*);
}));

#[cfg(not(feature = "trace_tokenizer"))]
macro_rules! sh_trace ( ( $me:ident : $($cmds:tt)* ) => ( shorthand!($me: $($cmds)*) ) );

// A little DSL for sequencing shorthand actions.
macro_rules! go (
    // A pattern like $($cmd:tt)* ; $($rest:tt)* causes parse ambiguity.
    // We have to tell the parser how much lookahead we need.

    ( $me:ident : $a:tt                   ; $($rest:tt)* ) => ({ sh_trace!($me: $a);          go!($me: $($rest)*); });
    ( $me:ident : $a:tt $b:tt             ; $($rest:tt)* ) => ({ sh_trace!($me: $a $b);       go!($me: $($rest)*); });
    ( $me:ident : $a:tt $b:tt $c:tt       ; $($rest:tt)* ) => ({ sh_trace!($me: $a $b $c);    go!($me: $($rest)*); });
    ( $me:ident : $a:tt $b:tt $c:tt $d:tt ; $($rest:tt)* ) => ({ sh_trace!($me: $a $b $c $d); go!($me: $($rest)*); });

    // These can only come at the end.

    ( $me:ident : to $s:ident                    ) => ({ $me.state = states::$s; return;           });
    ( $me:ident : to $s:ident $k1:expr           ) => ({ $me.state = states::$s($k1); return;      });
    ( $me:ident : to $s:ident $k1:ident $k2:expr ) => ({ $me.state = states::$s($k1($k2)); return; });

    ( $me:ident : reconsume $s:ident                    ) => ({ $me.reconsume = true; go!($me: to $s);         });
    ( $me:ident : reconsume $s:ident $k1:expr           ) => ({ $me.reconsume = true; go!($me: to $s $k1);     });
    ( $me:ident : reconsume $s:ident $k1:ident $k2:expr ) => ({ $me.reconsume = true; go!($me: to $s $k1 $k2); });

    ( $me:ident : consume_char_ref ) => ({ $me.consume_char_ref(); return; });

    ( $me:ident : emit_tag $s:ident ) => ({
        $me.state = states::$s;
        $me.emit_current_tag();
        return;
    });

    ( $me:ident : eof ) => ({ $me.emit_eof(); return; });

    // If nothing else matched, it's a single command
    ( $me:ident : $($cmd:tt)+ ) => ( sh_trace!($me: $($cmd)+) );

    // or nothing.
    ( $me:ident : ) => (());
);

// These can cause early return from the function where they are used,
// when the input runs dry.
macro_rules! get_char ( ($me:expr) => (
    unwrap_or_return!($me.get_char(), $me.enter_eof())
));

macro_rules! peek ( ($me:expr) => (
    unwrap_or_return!($me.peek(), $me.enter_eof())
));

macro_rules! pop_except_from ( ($me:expr, $set:expr) => (
    unwrap_or_return!($me.pop_except_from($set), $me.enter_eof())
));

impl Tokenizer {
    // Run the state machine until it makes progress we can observe:
    // a token in the queue, buffered text, or EOF.
    #[allow(clippy::never_loop)]
    fn step(&mut self) {
        if self.at_eof {
            return self.eof_step();
        }

        trace!("processing in state {:?}", self.state);
        match self.state {
            //§ data-state
            states::Data => loop {
                match pop_except_from!(self, small_char_set!('\r' '\0' '&' '<' '\n')) {
                    FromSet('\0') => {
                        // Emitted as a replacement character so that a
                        // lone NUL still yields a text node downstream.
                        go!(self: error; emit '\u{fffd}')
                    },
                    FromSet('&') => go!(self: consume_char_ref),
                    FromSet('<') => {
                        self.token_start = self.char_start;
                        go!(self: to TagOpen);
                    },
                    FromSet(c) => go!(self: emit c),
                    NotFromSet(b) => self.emit_chars(b),
                }
            },

            //§ rcdata-state
            states::RawData(Rcdata) => loop {
                match pop_except_from!(self, small_char_set!('\r' '\0' '&' '<' '\n')) {
                    FromSet('\0') => go!(self: error; emit '\u{fffd}'),
                    FromSet('&') => go!(self: consume_char_ref),
                    FromSet('<') => {
                        self.token_start = self.char_start;
                        go!(self: to RawLessThanSign Rcdata);
                    },
                    FromSet(c) => go!(self: emit c),
                    NotFromSet(b) => self.emit_chars(b),
                }
            },

            //§ rawtext-state
            states::RawData(Rawtext) => loop {
                match pop_except_from!(self, small_char_set!('\r' '\0' '<' '\n')) {
                    FromSet('\0') => go!(self: error; emit '\u{fffd}'),
                    FromSet('<') => {
                        self.token_start = self.char_start;
                        go!(self: to RawLessThanSign Rawtext);
                    },
                    FromSet(c) => go!(self: emit c),
                    NotFromSet(b) => self.emit_chars(b),
                }
            },

            //§ script-data-state
            states::RawData(ScriptData) => loop {
                match pop_except_from!(self, small_char_set!('\r' '\0' '<' '\n')) {
                    FromSet('\0') => go!(self: error; emit '\u{fffd}'),
                    FromSet('<') => {
                        self.token_start = self.char_start;
                        go!(self: to RawLessThanSign ScriptData);
                    },
                    FromSet(c) => go!(self: emit c),
                    NotFromSet(b) => self.emit_chars(b),
                }
            },

            //§ script-data-escaped-state
            states::RawData(ScriptDataEscaped(Escaped)) => loop {
                match pop_except_from!(self, small_char_set!('\r' '\0' '-' '<' '\n')) {
                    FromSet('\0') => go!(self: error; emit '\u{fffd}'),
                    FromSet('-') => go!(self: emit '-'; to ScriptDataEscapedDash Escaped),
                    FromSet('<') => go!(self: to RawLessThanSign ScriptDataEscaped Escaped),
                    FromSet(c) => go!(self: emit c),
                    NotFromSet(b) => self.emit_chars(b),
                }
            },

            //§ script-data-double-escaped-state
            states::RawData(ScriptDataEscaped(DoubleEscaped)) => loop {
                match pop_except_from!(self, small_char_set!('\r' '\0' '-' '<' '\n')) {
                    FromSet('\0') => go!(self: error; emit '\u{fffd}'),
                    FromSet('-') => go!(self: emit '-'; to ScriptDataEscapedDash DoubleEscaped),
                    FromSet('<') => {
                        go!(self: emit '<'; to RawLessThanSign ScriptDataEscaped DoubleEscaped)
                    },
                    FromSet(c) => go!(self: emit c),
                    NotFromSet(b) => self.emit_chars(b),
                }
            },

            //§ plaintext-state
            states::Plaintext => loop {
                match pop_except_from!(self, small_char_set!('\r' '\0' '\n')) {
                    FromSet('\0') => go!(self: error; emit '\u{fffd}'),
                    FromSet(c) => go!(self: emit c),
                    NotFromSet(b) => self.emit_chars(b),
                }
            },

            //§ tag-open-state
            states::TagOpen => loop {
                match get_char!(self) {
                    '!' => go!(self: to MarkupDeclarationOpen),
                    '/' => go!(self: to EndTagOpen),
                    '?' => go!(self: error; clear_comment; reconsume BogusComment),
                    c => match lower_ascii_letter(c) {
                        Some(cl) => go!(self: create_tag StartTag cl; to TagName),
                        None => go!(self: error; emit '<'; reconsume Data),
                    },
                }
            },

            //§ end-tag-open-state
            states::EndTagOpen => loop {
                match get_char!(self) {
                    '>' => go!(self: error; to Data),
                    c => match lower_ascii_letter(c) {
                        Some(cl) => go!(self: create_tag EndTag cl; to TagName),
                        None => go!(self: error; clear_comment; reconsume BogusComment),
                    },
                }
            },

            //§ tag-name-state
            states::TagName => loop {
                match get_char!(self) {
                    '\t' | '\n' | '\x0C' | ' ' => go!(self: to BeforeAttributeName),
                    '/' => go!(self: to SelfClosingStartTag),
                    '>' => go!(self: emit_tag Data),
                    '\0' => go!(self: error; push_tag '\u{fffd}'),
                    c => go!(self: push_tag (c.to_ascii_lowercase())),
                }
            },

            //§ script-data-escaped-less-than-sign-state
            states::RawLessThanSign(ScriptDataEscaped(Escaped)) => loop {
                match get_char!(self) {
                    '/' => go!(self: clear_temp; to RawEndTagOpen ScriptDataEscaped Escaped),
                    c => match lower_ascii_letter(c) {
                        Some(cl) => go!(self: clear_temp; push_temp cl; emit '<'; emit c;
                                        to ScriptDataEscapeStart DoubleEscaped),
                        None => go!(self: emit '<'; reconsume RawData ScriptDataEscaped Escaped),
                    },
                }
            },

            //§ script-data-double-escaped-less-than-sign-state
            states::RawLessThanSign(ScriptDataEscaped(DoubleEscaped)) => loop {
                match get_char!(self) {
                    '/' => go!(self: clear_temp; emit '/'; to ScriptDataDoubleEscapeEnd),
                    _ => go!(self: reconsume RawData ScriptDataEscaped DoubleEscaped),
                }
            },

            //§ rcdata-less-than-sign-state rawtext-less-than-sign-state script-data-less-than-sign-state
            // otherwise
            states::RawLessThanSign(kind) => loop {
                match get_char!(self) {
                    '/' => go!(self: clear_temp; to RawEndTagOpen kind),
                    '!' if kind == ScriptData => {
                        go!(self: emit '<'; emit '!'; to ScriptDataEscapeStart Escaped)
                    },
                    _ => go!(self: emit '<'; reconsume RawData kind),
                }
            },

            //§ rcdata-end-tag-open-state rawtext-end-tag-open-state script-data-end-tag-open-state script-data-escaped-end-tag-open-state
            states::RawEndTagOpen(kind) => loop {
                let c = get_char!(self);
                match lower_ascii_letter(c) {
                    Some(cl) => go!(self: create_tag EndTag cl; push_temp c; to RawEndTagName kind),
                    None => go!(self: emit '<'; emit '/'; reconsume RawData kind),
                }
            },

            //§ rcdata-end-tag-name-state rawtext-end-tag-name-state script-data-end-tag-name-state script-data-escaped-end-tag-name-state
            states::RawEndTagName(kind) => loop {
                let c = get_char!(self);
                if self.have_appropriate_end_tag() {
                    match c {
                        '\t' | '\n' | '\x0C' | ' ' => go!(self: clear_temp; to BeforeAttributeName),
                        '/' => go!(self: clear_temp; to SelfClosingStartTag),
                        '>' => go!(self: clear_temp; emit_tag Data),
                        _ => (),
                    }
                }

                match lower_ascii_letter(c) {
                    Some(cl) => go!(self: push_tag cl; push_temp c),
                    None => {
                        go!(self: discard_tag; emit '<'; emit '/'; emit_temp; reconsume RawData kind)
                    },
                }
            },

            //§ script-data-double-escape-start-state
            states::ScriptDataEscapeStart(DoubleEscaped) => loop {
                let c = get_char!(self);
                match c {
                    '\t' | '\n' | '\x0C' | ' ' | '/' | '>' => {
                        let esc = if &*self.temp_buf == "script" {
                            DoubleEscaped
                        } else {
                            Escaped
                        };
                        go!(self: emit c; to RawData ScriptDataEscaped esc);
                    },
                    _ => match lower_ascii_letter(c) {
                        Some(cl) => go!(self: push_temp cl; emit c),
                        None => go!(self: reconsume RawData ScriptDataEscaped Escaped),
                    },
                }
            },

            //§ script-data-escape-start-state
            states::ScriptDataEscapeStart(Escaped) => loop {
                match get_char!(self) {
                    '-' => go!(self: emit '-'; to ScriptDataEscapeStartDash),
                    _ => go!(self: reconsume RawData ScriptData),
                }
            },

            //§ script-data-escape-start-dash-state
            states::ScriptDataEscapeStartDash => loop {
                match get_char!(self) {
                    '-' => go!(self: emit '-'; to ScriptDataEscapedDashDash Escaped),
                    _ => go!(self: reconsume RawData ScriptData),
                }
            },

            //§ script-data-escaped-dash-state script-data-double-escaped-dash-state
            states::ScriptDataEscapedDash(kind) => loop {
                match get_char!(self) {
                    '-' => go!(self: emit '-'; to ScriptDataEscapedDashDash kind),
                    '<' => {
                        if kind == DoubleEscaped {
                            go!(self: emit '<');
                        }
                        go!(self: to RawLessThanSign ScriptDataEscaped kind);
                    },
                    '\0' => go!(self: error; emit '\u{fffd}'; to RawData ScriptDataEscaped kind),
                    c => go!(self: emit c; to RawData ScriptDataEscaped kind),
                }
            },

            //§ script-data-escaped-dash-dash-state script-data-double-escaped-dash-dash-state
            states::ScriptDataEscapedDashDash(kind) => loop {
                match get_char!(self) {
                    '-' => go!(self: emit '-'),
                    '<' => {
                        if kind == DoubleEscaped {
                            go!(self: emit '<');
                        }
                        go!(self: to RawLessThanSign ScriptDataEscaped kind);
                    },
                    '>' => go!(self: emit '>'; to RawData ScriptData),
                    '\0' => go!(self: error; emit '\u{fffd}'; to RawData ScriptDataEscaped kind),
                    c => go!(self: emit c; to RawData ScriptDataEscaped kind),
                }
            },

            //§ script-data-double-escape-end-state
            states::ScriptDataDoubleEscapeEnd => loop {
                let c = get_char!(self);
                match c {
                    '\t' | '\n' | '\x0C' | ' ' | '/' | '>' => {
                        let esc = if &*self.temp_buf == "script" {
                            Escaped
                        } else {
                            DoubleEscaped
                        };
                        go!(self: emit c; to RawData ScriptDataEscaped esc);
                    },
                    _ => match lower_ascii_letter(c) {
                        Some(cl) => go!(self: push_temp cl; emit c),
                        None => go!(self: reconsume RawData ScriptDataEscaped DoubleEscaped),
                    },
                }
            },

            //§ before-attribute-name-state
            states::BeforeAttributeName => loop {
                match get_char!(self) {
                    '\t' | '\n' | '\x0C' | ' ' => (),
                    '/' => go!(self: to SelfClosingStartTag),
                    '>' => go!(self: emit_tag Data),
                    '\0' => go!(self: error; create_attr '\u{fffd}'; to AttributeName),
                    c => match lower_ascii_letter(c) {
                        Some(cl) => go!(self: create_attr cl; to AttributeName),
                        None => {
                            if matches!(c, '"' | '\'' | '<' | '=') {
                                go!(self: error);
                            }
                            go!(self: create_attr c; to AttributeName);
                        },
                    },
                }
            },

            //§ attribute-name-state
            states::AttributeName => loop {
                match get_char!(self) {
                    '\t' | '\n' | '\x0C' | ' ' => go!(self: to AfterAttributeName),
                    '/' => go!(self: to SelfClosingStartTag),
                    '=' => go!(self: to BeforeAttributeValue),
                    '>' => go!(self: emit_tag Data),
                    '\0' => go!(self: error; push_name '\u{fffd}'),
                    c => match lower_ascii_letter(c) {
                        Some(cl) => go!(self: push_name cl),
                        None => {
                            if matches!(c, '"' | '\'' | '<') {
                                go!(self: error);
                            }
                            go!(self: push_name c);
                        },
                    },
                }
            },

            //§ after-attribute-name-state
            states::AfterAttributeName => loop {
                match get_char!(self) {
                    '\t' | '\n' | '\x0C' | ' ' => (),
                    '/' => go!(self: to SelfClosingStartTag),
                    '=' => go!(self: to BeforeAttributeValue),
                    '>' => go!(self: emit_tag Data),
                    '\0' => go!(self: error; create_attr '\u{fffd}'; to AttributeName),
                    c => match lower_ascii_letter(c) {
                        Some(cl) => go!(self: create_attr cl; to AttributeName),
                        None => {
                            if matches!(c, '"' | '\'' | '<') {
                                go!(self: error);
                            }
                            go!(self: create_attr c; to AttributeName);
                        },
                    },
                }
            },

            //§ before-attribute-value-state
            // Use peek so we can handle the first attr character along with the rest,
            // hopefully in the same zero-copy buffer.
            states::BeforeAttributeValue => loop {
                match peek!(self) {
                    '\t' | '\n' | '\r' | '\x0C' | ' ' => go!(self: discard_char),
                    '"' => go!(self: discard_char; to AttributeValue DoubleQuoted),
                    '\'' => go!(self: discard_char; to AttributeValue SingleQuoted),
                    '>' => go!(self: discard_char; error; emit_tag Data),
                    _ => go!(self: to AttributeValue Unquoted),
                }
            },

            //§ attribute-value-(double-quoted)-state
            states::AttributeValue(DoubleQuoted) => loop {
                match pop_except_from!(self, small_char_set!('\r' '"' '&' '\0' '\n')) {
                    FromSet('"') => go!(self: to AfterAttributeValueQuoted),
                    FromSet('&') => go!(self: consume_char_ref),
                    FromSet('\0') => go!(self: error; push_value '\u{fffd}'),
                    FromSet(c) => go!(self: push_value c),
                    NotFromSet(ref b) => go!(self: append_value b),
                }
            },

            //§ attribute-value-(single-quoted)-state
            states::AttributeValue(SingleQuoted) => loop {
                match pop_except_from!(self, small_char_set!('\r' '\'' '&' '\0' '\n')) {
                    FromSet('\'') => go!(self: to AfterAttributeValueQuoted),
                    FromSet('&') => go!(self: consume_char_ref),
                    FromSet('\0') => go!(self: error; push_value '\u{fffd}'),
                    FromSet(c) => go!(self: push_value c),
                    NotFromSet(ref b) => go!(self: append_value b),
                }
            },

            //§ attribute-value-(unquoted)-state
            states::AttributeValue(Unquoted) => loop {
                match pop_except_from!(
                    self,
                    small_char_set!('\r' '\t' '\n' '\x0C' ' ' '&' '>' '\0')
                ) {
                    FromSet('\t') | FromSet('\n') | FromSet('\x0C') | FromSet(' ') => {
                        go!(self: to BeforeAttributeName)
                    },
                    FromSet('&') => go!(self: consume_char_ref),
                    FromSet('>') => go!(self: emit_tag Data),
                    FromSet('\0') => go!(self: error; push_value '\u{fffd}'),
                    FromSet(c) => {
                        if matches!(c, '"' | '\'' | '<' | '=' | '`') {
                            go!(self: error);
                        }
                        go!(self: push_value c);
                    },
                    NotFromSet(ref b) => go!(self: append_value b),
                }
            },

            //§ after-attribute-value-(quoted)-state
            states::AfterAttributeValueQuoted => loop {
                match get_char!(self) {
                    '\t' | '\n' | '\x0C' | ' ' => go!(self: to BeforeAttributeName),
                    '/' => go!(self: to SelfClosingStartTag),
                    '>' => go!(self: emit_tag Data),
                    _ => go!(self: error; reconsume BeforeAttributeName),
                }
            },

            //§ self-closing-start-tag-state
            states::SelfClosingStartTag => loop {
                match get_char!(self) {
                    '>' => {
                        self.current_tag_self_closing = true;
                        go!(self: emit_tag Data);
                    },
                    _ => go!(self: error; reconsume BeforeAttributeName),
                }
            },

            //§ comment-start-state
            states::CommentStart => loop {
                match get_char!(self) {
                    '-' => go!(self: to CommentStartDash),
                    '\0' => go!(self: error; push_comment '\u{fffd}'; to Comment),
                    '>' => go!(self: error; emit_comment; to Data),
                    c => go!(self: push_comment c; to Comment),
                }
            },

            //§ comment-start-dash-state
            states::CommentStartDash => loop {
                match get_char!(self) {
                    '-' => go!(self: to CommentEnd),
                    '\0' => go!(self: error; append_comment "-\u{fffd}"; to Comment),
                    '>' => go!(self: error; emit_comment; to Data),
                    c => go!(self: push_comment '-'; push_comment c; to Comment),
                }
            },

            //§ comment-state
            states::Comment => loop {
                match get_char!(self) {
                    c @ '<' => go!(self: push_comment c; to CommentLessThanSign),
                    '-' => go!(self: to CommentEndDash),
                    '\0' => go!(self: error; push_comment '\u{fffd}'),
                    c => go!(self: push_comment c),
                }
            },

            //§ comment-less-than-sign-state
            states::CommentLessThanSign => loop {
                match get_char!(self) {
                    c @ '!' => go!(self: push_comment c; to CommentLessThanSignBang),
                    c @ '<' => go!(self: push_comment c),
                    _ => go!(self: reconsume Comment),
                }
            },

            //§ comment-less-than-sign-bang-state
            states::CommentLessThanSignBang => loop {
                match get_char!(self) {
                    '-' => go!(self: to CommentLessThanSignBangDash),
                    _ => go!(self: reconsume Comment),
                }
            },

            //§ comment-less-than-sign-bang-dash-state
            states::CommentLessThanSignBangDash => loop {
                match get_char!(self) {
                    '-' => go!(self: to CommentLessThanSignBangDashDash),
                    _ => go!(self: reconsume CommentEndDash),
                }
            },

            //§ comment-less-than-sign-bang-dash-dash-state
            states::CommentLessThanSignBangDashDash => loop {
                match get_char!(self) {
                    '>' => go!(self: reconsume CommentEnd),
                    _ => go!(self: error; reconsume CommentEnd),
                }
            },

            //§ comment-end-dash-state
            states::CommentEndDash => loop {
                match get_char!(self) {
                    '-' => go!(self: to CommentEnd),
                    '\0' => go!(self: error; append_comment "-\u{fffd}"; to Comment),
                    c => go!(self: push_comment '-'; push_comment c; to Comment),
                }
            },

            //§ comment-end-state
            states::CommentEnd => loop {
                match get_char!(self) {
                    '>' => go!(self: emit_comment; to Data),
                    '!' => go!(self: to CommentEndBang),
                    '-' => go!(self: push_comment '-'),
                    _ => go!(self: append_comment "--"; reconsume Comment),
                }
            },

            //§ comment-end-bang-state
            states::CommentEndBang => loop {
                match get_char!(self) {
                    '-' => go!(self: append_comment "--!"; to CommentEndDash),
                    '>' => go!(self: error; emit_comment; to Data),
                    '\0' => go!(self: error; append_comment "--!\u{fffd}"; to Comment),
                    c => go!(self: append_comment "--!"; push_comment c; to Comment),
                }
            },

            //§ doctype-state
            states::Doctype => loop {
                match get_char!(self) {
                    '\t' | '\n' | '\x0C' | ' ' => go!(self: to BeforeDoctypeName),
                    '>' => go!(self: reconsume BeforeDoctypeName),
                    _ => go!(self: error; reconsume BeforeDoctypeName),
                }
            },

            //§ before-doctype-name-state
            states::BeforeDoctypeName => loop {
                match get_char!(self) {
                    '\t' | '\n' | '\x0C' | ' ' => (),
                    '\0' => {
                        go!(self: error; create_doctype; push_doctype_name '\u{fffd}'; to DoctypeName)
                    },
                    '>' => go!(self: error; create_doctype; force_quirks; emit_doctype; to Data),
                    c => go!(self: create_doctype; push_doctype_name (c.to_ascii_lowercase());
                                  to DoctypeName),
                }
            },

            //§ doctype-name-state
            states::DoctypeName => loop {
                match get_char!(self) {
                    '\t' | '\n' | '\x0C' | ' ' => go!(self: clear_temp; to AfterDoctypeName),
                    '>' => go!(self: emit_doctype; to Data),
                    '\0' => go!(self: error; push_doctype_name '\u{fffd}'),
                    c => go!(self: push_doctype_name (c.to_ascii_lowercase())),
                }
            },

            //§ after-doctype-name-state
            states::AfterDoctypeName => loop {
                if self.eat("public", u8::eq_ignore_ascii_case) {
                    go!(self: to AfterDoctypeKeyword Public);
                } else if self.eat("system", u8::eq_ignore_ascii_case) {
                    go!(self: to AfterDoctypeKeyword System);
                } else {
                    match get_char!(self) {
                        '\t' | '\n' | '\x0C' | ' ' => (),
                        '>' => go!(self: emit_doctype; to Data),
                        _ => go!(self: error; force_quirks; reconsume BogusDoctype),
                    }
                }
            },

            //§ after-doctype-public-keyword-state after-doctype-system-keyword-state
            states::AfterDoctypeKeyword(kind) => loop {
                match get_char!(self) {
                    '\t' | '\n' | '\x0C' | ' ' => go!(self: to BeforeDoctypeIdentifier kind),
                    '"' => {
                        go!(self: error; clear_doctype_id kind; to DoctypeIdentifierDoubleQuoted kind)
                    },
                    '\'' => {
                        go!(self: error; clear_doctype_id kind; to DoctypeIdentifierSingleQuoted kind)
                    },
                    '>' => go!(self: error; force_quirks; emit_doctype; to Data),
                    _ => go!(self: error; force_quirks; reconsume BogusDoctype),
                }
            },

            //§ before-doctype-public-identifier-state before-doctype-system-identifier-state
            states::BeforeDoctypeIdentifier(kind) => loop {
                match get_char!(self) {
                    '\t' | '\n' | '\x0C' | ' ' => (),
                    '"' => go!(self: clear_doctype_id kind; to DoctypeIdentifierDoubleQuoted kind),
                    '\'' => go!(self: clear_doctype_id kind; to DoctypeIdentifierSingleQuoted kind),
                    '>' => go!(self: error; force_quirks; emit_doctype; to Data),
                    _ => go!(self: error; force_quirks; reconsume BogusDoctype),
                }
            },

            //§ doctype-public-identifier-(double-quoted)-state doctype-system-identifier-(double-quoted)-state
            states::DoctypeIdentifierDoubleQuoted(kind) => loop {
                match get_char!(self) {
                    '"' => go!(self: to AfterDoctypeIdentifier kind),
                    '\0' => go!(self: error; push_doctype_id kind '\u{fffd}'),
                    '>' => go!(self: error; force_quirks; emit_doctype; to Data),
                    c => go!(self: push_doctype_id kind c),
                }
            },

            //§ doctype-public-identifier-(single-quoted)-state doctype-system-identifier-(single-quoted)-state
            states::DoctypeIdentifierSingleQuoted(kind) => loop {
                match get_char!(self) {
                    '\'' => go!(self: to AfterDoctypeIdentifier kind),
                    '\0' => go!(self: error; push_doctype_id kind '\u{fffd}'),
                    '>' => go!(self: error; force_quirks; emit_doctype; to Data),
                    c => go!(self: push_doctype_id kind c),
                }
            },

            //§ after-doctype-public-identifier-state
            states::AfterDoctypeIdentifier(Public) => loop {
                match get_char!(self) {
                    '\t' | '\n' | '\x0C' | ' ' => {
                        go!(self: to BetweenDoctypePublicAndSystemIdentifiers)
                    },
                    '>' => go!(self: emit_doctype; to Data),
                    '"' => {
                        go!(self: error; clear_doctype_id System; to DoctypeIdentifierDoubleQuoted System)
                    },
                    '\'' => {
                        go!(self: error; clear_doctype_id System; to DoctypeIdentifierSingleQuoted System)
                    },
                    _ => go!(self: error; force_quirks; reconsume BogusDoctype),
                }
            },

            //§ after-doctype-system-identifier-state
            states::AfterDoctypeIdentifier(System) => loop {
                match get_char!(self) {
                    '\t' | '\n' | '\x0C' | ' ' => (),
                    '>' => go!(self: emit_doctype; to Data),
                    _ => go!(self: error; reconsume BogusDoctype),
                }
            },

            //§ between-doctype-public-and-system-identifiers-state
            states::BetweenDoctypePublicAndSystemIdentifiers => loop {
                match get_char!(self) {
                    '\t' | '\n' | '\x0C' | ' ' => (),
                    '>' => go!(self: emit_doctype; to Data),
                    '"' => go!(self: clear_doctype_id System; to DoctypeIdentifierDoubleQuoted System),
                    '\'' => {
                        go!(self: clear_doctype_id System; to DoctypeIdentifierSingleQuoted System)
                    },
                    _ => go!(self: error; force_quirks; reconsume BogusDoctype),
                }
            },

            //§ bogus-doctype-state
            states::BogusDoctype => loop {
                match get_char!(self) {
                    '>' => go!(self: emit_doctype; to Data),
                    '\0' => go!(self: error),
                    _ => (),
                }
            },

            //§ bogus-comment-state
            states::BogusComment => loop {
                match get_char!(self) {
                    '>' => go!(self: emit_comment; to Data),
                    '\0' => go!(self: error; push_comment '\u{fffd}'),
                    c => go!(self: push_comment c),
                }
            },

            //§ markup-declaration-open-state
            states::MarkupDeclarationOpen => loop {
                if self.eat("--", u8::eq) {
                    go!(self: clear_comment; to CommentStart);
                } else if self.eat("doctype", u8::eq_ignore_ascii_case) {
                    go!(self: to Doctype);
                } else {
                    // The tree builder may still be behind on text we have
                    // buffered; let it catch up before consulting the
                    // foreign-content flag.
                    if !self.current_text.is_empty() {
                        self.flush_text();
                        return;
                    }
                    if self.allow_cdata && self.eat("[CDATA[", u8::eq) {
                        go!(self: clear_temp; to CdataSection);
                    }
                    go!(self: error; clear_comment; to BogusComment);
                }
            },

            //§ cdata-section-state
            states::CdataSection => loop {
                match get_char!(self) {
                    ']' => go!(self: to CdataSectionBracket),
                    '\0' => go!(self: emit_temp; emit '\0'),
                    c => go!(self: push_temp c),
                }
            },

            //§ cdata-section-bracket-state
            states::CdataSectionBracket => match get_char!(self) {
                ']' => go!(self: to CdataSectionEnd),
                _ => go!(self: push_temp ']'; reconsume CdataSection),
            },

            //§ cdata-section-end-state
            states::CdataSectionEnd => loop {
                match get_char!(self) {
                    ']' => go!(self: push_temp ']'),
                    '>' => go!(self: emit_temp; to Data),
                    _ => go!(self: push_temp ']'; push_temp ']'; reconsume CdataSection),
                }
            },
            //§ END
        }
    }

    fn eof_step(&mut self) {
        debug!("processing EOF in state {:?}", self.state);
        match self.state {
            states::Data
            | states::RawData(Rcdata)
            | states::RawData(Rawtext)
            | states::RawData(ScriptData)
            | states::Plaintext => go!(self: eof),

            states::TagName
            | states::RawData(ScriptDataEscaped(_))
            | states::BeforeAttributeName
            | states::AttributeName
            | states::AfterAttributeName
            | states::AttributeValue(_)
            | states::AfterAttributeValueQuoted
            | states::SelfClosingStartTag
            | states::ScriptDataEscapedDash(_)
            | states::ScriptDataEscapedDashDash(_) => go!(self: error_eof; to Data),

            states::BeforeAttributeValue => go!(self: reconsume AttributeValue Unquoted),

            states::TagOpen => go!(self: error_eof; emit '<'; to Data),

            states::EndTagOpen => go!(self: error_eof; emit '<'; emit '/'; to Data),

            states::RawLessThanSign(ScriptDataEscaped(DoubleEscaped)) => {
                go!(self: to RawData ScriptDataEscaped DoubleEscaped)
            },

            states::RawLessThanSign(kind) => go!(self: emit '<'; to RawData kind),

            states::RawEndTagOpen(kind) => go!(self: emit '<'; emit '/'; to RawData kind),

            states::RawEndTagName(kind) => {
                go!(self: emit '<'; emit '/'; emit_temp; to RawData kind)
            },

            states::ScriptDataEscapeStart(kind) => go!(self: to RawData ScriptDataEscaped kind),

            states::ScriptDataEscapeStartDash => go!(self: to RawData ScriptData),

            states::ScriptDataDoubleEscapeEnd => {
                go!(self: to RawData ScriptDataEscaped DoubleEscaped)
            },

            states::CommentStart
            | states::CommentStartDash
            | states::Comment
            | states::CommentEndDash
            | states::CommentEnd
            | states::CommentEndBang => go!(self: error_eof; emit_comment; to Data),

            states::CommentLessThanSign | states::CommentLessThanSignBang => {
                go!(self: reconsume Comment)
            },

            states::CommentLessThanSignBangDash => go!(self: reconsume CommentEndDash),

            states::CommentLessThanSignBangDashDash => go!(self: reconsume CommentEnd),

            states::Doctype | states::BeforeDoctypeName => {
                go!(self: error_eof; create_doctype; force_quirks; emit_doctype; to Data)
            },

            states::DoctypeName
            | states::AfterDoctypeName
            | states::AfterDoctypeKeyword(_)
            | states::BeforeDoctypeIdentifier(_)
            | states::DoctypeIdentifierDoubleQuoted(_)
            | states::DoctypeIdentifierSingleQuoted(_)
            | states::AfterDoctypeIdentifier(_)
            | states::BetweenDoctypePublicAndSystemIdentifiers => {
                go!(self: error_eof; force_quirks; emit_doctype; to Data)
            },

            states::BogusDoctype => go!(self: emit_doctype; to Data),

            states::BogusComment => go!(self: emit_comment; to Data),

            states::MarkupDeclarationOpen => go!(self: error; to BogusComment),

            states::CdataSection => go!(self: emit_temp; error_eof; to Data),

            states::CdataSectionBracket => go!(self: push_temp ']'; to CdataSection),

            states::CdataSectionEnd => go!(self: push_temp ']'; push_temp ']'; to CdataSection),
        }
    }
}

#[cfg(test)]
#[allow(non_snake_case)]
mod test {
    use super::states::{RawData, RawKind};
    use super::tokens::{Span, TagKind};
    use super::{option_push, Token, Tokenizer, TokenizerOpts};

    use crate::interface::Attribute;
    use crate::{LocalName, QualName};
    use tendril::{SliceExt, StrTendril};

    // Collect all tokens until Error, merging adjacent Text tokens the
    // way a tree-building consumer would.
    fn tokenize_opts(input: &str, opts: TokenizerOpts) -> Vec<Token> {
        let mut tok = Tokenizer::new(input.to_tendril(), opts);
        let mut out: Vec<Token> = vec![];
        loop {
            match tok.next_token() {
                Token::Error { .. } => break,
                Token::Text { text, span } => match out.last_mut() {
                    Some(Token::Text {
                        text: prev,
                        span: prev_span,
                    }) => {
                        prev.push_tendril(&text);
                        prev_span.end = span.end;
                    },
                    _ => out.push(Token::Text { text, span }),
                },
                token => out.push(token),
            }
        }
        out
    }

    fn tokenize(input: &str) -> Vec<Token> {
        tokenize_opts(input, TokenizerOpts::default())
    }

    fn attr(name: &str, value: &str) -> Attribute {
        Attribute {
            name: QualName::new(None, ns!(), LocalName::from(name)),
            value: value.to_tendril(),
        }
    }

    fn tag_parts(token: &Token) -> (TagKind, &LocalName, &[Attribute]) {
        match token {
            Token::StartTag(t) | Token::SelfClosingTag(t) => (TagKind::StartTag, &t.name, &t.attrs),
            Token::EndTag(t) => (TagKind::EndTag, &t.name, &t.attrs),
            other => panic!("not a tag: {other:?}"),
        }
    }

    #[test]
    fn push_to_None_gives_singleton() {
        let mut s: Option<StrTendril> = None;
        option_push(&mut s, 'x');
        assert_eq!(s, Some("x".to_tendril()));
    }

    #[test]
    fn push_to_empty_appends() {
        let mut s: Option<StrTendril> = Some(StrTendril::new());
        option_push(&mut s, 'x');
        assert_eq!(s, Some("x".to_tendril()));
    }

    #[test]
    fn simple_tags_and_text() {
        let tokens = tokenize("<p>one</p>");
        assert_eq!(tokens.len(), 3);
        assert_eq!(tag_parts(&tokens[0]).1, &local_name!("p"));
        assert!(matches!(&tokens[1], Token::Text { text, .. } if &**text == "one"));
        let (kind, name, _) = tag_parts(&tokens[2]);
        assert_eq!((kind, name), (TagKind::EndTag, &local_name!("p")));
    }

    #[test]
    fn tag_names_are_lowercased() {
        let tokens = tokenize("<DiV></dIv>");
        assert_eq!(tag_parts(&tokens[0]).1, &local_name!("div"));
        assert_eq!(tag_parts(&tokens[1]).1, &local_name!("div"));
    }

    #[test]
    fn attributes_parse_in_order() {
        let tokens = tokenize(r#"<input type="button" VALUE=ok disabled>"#);
        let (_, name, attrs) = tag_parts(&tokens[0]);
        assert_eq!(name, &local_name!("input"));
        assert_eq!(
            attrs,
            &[
                attr("type", "button"),
                attr("value", "ok"),
                attr("disabled", ""),
            ]
        );
    }

    #[test]
    fn duplicate_attributes_keep_the_first() {
        let tokens = tokenize(r#"<p a=1 a=2>"#);
        let (_, _, attrs) = tag_parts(&tokens[0]);
        assert_eq!(attrs, &[attr("a", "1")]);
    }

    #[test]
    fn self_closing_is_its_own_token_kind() {
        let tokens = tokenize("<br/><br>");
        assert!(matches!(&tokens[0], Token::SelfClosingTag(t) if t.name == local_name!("br")));
        assert!(matches!(&tokens[1], Token::StartTag(t) if t.name == local_name!("br")));
    }

    #[test]
    fn tag_spans_cover_the_source() {
        let input = "ab<i x=1>c";
        let tokens = tokenize(input);
        match &tokens[1] {
            Token::StartTag(t) => {
                assert_eq!(t.span, Span::new(2, 9));
                assert_eq!(&input[t.span.start..t.span.end], "<i x=1>");
            },
            other => panic!("expected tag, got {other:?}"),
        }
    }

    #[test]
    fn entities_resolve_with_longest_match() {
        let tokens = tokenize("&amp;&#65;&unknown;&notin;&not");
        assert_eq!(tokens.len(), 1);
        assert!(
            matches!(&tokens[0], Token::Text { text, .. } if &**text == "&A&unknown;\u{2209}\u{ac}")
        );
    }

    #[test]
    fn entity_without_semicolon_in_attribute() {
        // The historical rule: `&copy` followed by an alphanumeric stays raw.
        let tokens = tokenize(r#"<a href="x&copyz" title="&copy"></a>"#);
        let (_, _, attrs) = tag_parts(&tokens[0]);
        assert_eq!(attrs[0], attr("href", "x&copyz"));
        assert_eq!(attrs[1], attr("title", "\u{a9}"));
    }

    #[test]
    fn numeric_entities_apply_replacements() {
        let tokens = tokenize("&#x80;&#0;&#x110000;");
        assert!(
            matches!(&tokens[0], Token::Text { text, .. } if &**text == "\u{20ac}\u{fffd}\u{fffd}")
        );
    }

    #[test]
    fn crlf_normalizes_to_lf() {
        let tokens = tokenize("a\r\nb\rc");
        assert!(matches!(&tokens[0], Token::Text { text, .. } if &**text == "a\nb\nc"));
    }

    #[test]
    fn nul_becomes_replacement_text() {
        let tokens = tokenize("\0");
        assert!(matches!(&tokens[0], Token::Text { text, .. } if &**text == "\u{fffd}"));
    }

    #[test]
    fn bom_is_discarded() {
        let tokens = tokenize("\u{feff}hi");
        assert!(matches!(&tokens[0], Token::Text { text, .. } if &**text == "hi"));
    }

    #[test]
    fn comments_and_bogus_comments() {
        let tokens = tokenize("<!--x--y--><?php >");
        assert!(matches!(&tokens[0], Token::Comment { text, .. } if &**text == "x--y"));
        assert!(matches!(&tokens[1], Token::Comment { text, .. } if &**text == "?php "));
    }

    #[test]
    fn abruptly_closed_comment() {
        let tokens = tokenize("<!-->z");
        assert!(matches!(&tokens[0], Token::Comment { text, .. } if text.is_empty()));
        assert!(matches!(&tokens[1], Token::Text { text, .. } if &**text == "z"));
    }

    #[test]
    fn doctype_with_ids() {
        let tokens = tokenize(
            r#"<!DOCTYPE html PUBLIC "-//W3C//DTD HTML 4.01//EN" "http://www.w3.org/TR/html4/strict.dtd">"#,
        );
        match &tokens[0] {
            Token::Doctype(d) => {
                assert_eq!(d.name.as_deref(), Some("html"));
                assert_eq!(d.public_id.as_deref(), Some("-//W3C//DTD HTML 4.01//EN"));
                assert_eq!(
                    d.system_id.as_deref(),
                    Some("http://www.w3.org/TR/html4/strict.dtd")
                );
                assert!(!d.force_quirks);
            },
            other => panic!("expected doctype, got {other:?}"),
        }
    }

    #[test]
    fn truncated_doctype_forces_quirks() {
        let tokens = tokenize("<!DOCTYPE");
        assert!(matches!(&tokens[0], Token::Doctype(d) if d.force_quirks && d.name.is_none()));
    }

    #[test]
    fn rawtext_runs_to_matching_end_tag() {
        let mut tok = Tokenizer::new("<style>a<b&amp;</x></style>".to_tendril(), Default::default());
        // Start tag comes out; a tree builder would now switch us to RAWTEXT.
        let start = tok.next_token();
        assert!(matches!(&start, Token::StartTag(t) if t.name == local_name!("style")));
        tok.set_raw_text_mode(RawKind::Rawtext);

        let mut text = StrTendril::new();
        loop {
            match tok.next_token() {
                Token::Text { text: t, .. } => text.push_tendril(&t),
                Token::EndTag(t) => {
                    assert_eq!(t.name, local_name!("style"));
                    break;
                },
                other => panic!("unexpected {other:?}"),
            }
        }
        assert_eq!(&*text, "a<b&amp;</x>");
    }

    #[test]
    fn rcdata_resolves_entities_but_not_tags() {
        let tokens = tokenize_opts(
            "a&amp;<b></title>",
            TokenizerOpts {
                initial_state: Some(RawData(RawKind::Rcdata)),
                last_start_tag_name: Some("title".into()),
                ..Default::default()
            },
        );
        assert!(matches!(&tokens[0], Token::Text { text, .. } if &**text == "a&<b>"));
        assert!(matches!(&tokens[1], Token::EndTag(t) if t.name == local_name!("title")));
    }

    #[test]
    fn script_double_escape() {
        let tokens = tokenize_opts(
            "<!--<script>x</script>--></script>",
            TokenizerOpts {
                initial_state: Some(RawData(RawKind::ScriptData)),
                last_start_tag_name: Some("script".into()),
                ..Default::default()
            },
        );
        assert!(matches!(&tokens[0], Token::Text { text, .. } if &**text == "<!--<script>x</script>-->"));
        assert!(matches!(&tokens[1], Token::EndTag(t) if t.name == local_name!("script")));
    }

    #[test]
    fn cdata_only_when_allowed() {
        let tokens = tokenize("<![CDATA[x]]>");
        assert!(matches!(&tokens[0], Token::Comment { text, .. } if &**text == "[CDATA[x]]"));

        let mut tok = Tokenizer::new("<![CDATA[x]]>".to_tendril(), Default::default());
        tok.set_allow_cdata(true);
        assert!(matches!(tok.next_token(), Token::Text { text, .. } if &*text == "x"));
    }

    #[test]
    fn plaintext_never_ends() {
        let mut tok = Tokenizer::new("a</plaintext>b".to_tendril(), Default::default());
        tok.set_plaintext_state();
        assert!(matches!(tok.next_token(), Token::Text { text, .. } if &*text == "a</plaintext>b"));
        assert!(matches!(tok.next_token(), Token::Error { .. }));
    }

    #[test]
    fn error_token_repeats_at_eof() {
        let mut tok = Tokenizer::new("x".to_tendril(), Default::default());
        assert!(matches!(tok.next_token(), Token::Text { .. }));
        assert!(matches!(tok.next_token(), Token::Error { .. }));
        assert!(matches!(tok.next_token(), Token::Error { .. }));
    }

    #[test]
    fn eof_inside_tag_recovers() {
        let tokens = tokenize("<a href=");
        assert!(tokens.is_empty());

        let tokens = tokenize("</");
        assert!(matches!(&tokens[0], Token::Text { text, .. } if &**text == "</"));
    }

    #[test]
    fn tokenization_is_bounded() {
        // A pathological input still terminates in a bounded number of calls.
        let input = "<".repeat(1000);
        let mut tok = Tokenizer::new(input.to_tendril(), Default::default());
        let mut calls = 0;
        loop {
            calls += 1;
            assert!(calls <= 4000);
            if let Token::Error { .. } = tok.next_token() {
                break;
            }
        }
    }
}
