// Copyright 2024-2026 The canopy Project Developers. See the
// COPYRIGHT file at the top-level directory of this distribution.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! The HTML5 tree builder.
//!
//! Consumes the tokenizer's output and grows a [`Document`], maintaining
//! the stack of open elements, the list of active formatting elements,
//! the insertion mode, and the element pointers the WHATWG algorithm
//! calls for. All DOM mutation goes through the primitives in
//! [`crate::dom`], so foster parenting and the adoption agency cannot
//! drift apart in how they splice nodes.

use self::tag_sets::*;
use self::types::*;

use crate::dom::{self, Document, Handle, NodeData};
use crate::dom::NodeOrText::{AppendNode, AppendText};
use crate::interface::QuirksMode::{self, NoQuirks};
use crate::interface::{Attribute, ExpandedName, ParseError, QualName};
use crate::tokenizer::states::{RawKind, Rawtext, Rcdata, ScriptData};
use crate::tokenizer::{self, states as tok_state, TagKind};
use crate::util::str::to_escaped_string;
use crate::{LocalName, Namespace};

use log::{debug, log_enabled, Level};
use mac::format_if;
use std::borrow::Cow::{self, Borrowed};
use std::collections::VecDeque;
use std::fmt;
use std::mem;
use std::rc::Rc;
use tendril::StrTendril;

#[macro_use]
mod tag_sets;

mod data;
mod rules;
mod types;

/// Tree builder options, with an impl for Default.
#[derive(Copy, Clone)]
pub struct TreeBuilderOpts {
    /// Report all parse errors described in the spec, at some
    /// performance penalty? Default: false
    pub exact_errors: bool,

    /// Is scripting enabled?
    ///
    /// This affects how `<noscript>` elements are parsed:
    ///   - If scripting **is** enabled then the contents of a `<noscript>` element are parsed as a single text node
    ///   - If scripting is **not** enabled then the contents of a `<noscript>` element are parsed as a normal tree of nodes
    pub scripting_enabled: bool,

    /// Is this document being parsed from the `srcdoc` attribute of an `<iframe>` element?
    ///
    /// This affects heuristics that infer `QuirksMode` from `<!DOCTYPE>`.
    pub iframe_srcdoc: bool,

    /// Should we drop the DOCTYPE (if any) from the tree?
    pub drop_doctype: bool,

    /// Initial tree builder quirks mode. Default: NoQuirks
    pub quirks_mode: QuirksMode,

    /// Maximum depth of the stack of open elements. A start tag that
    /// would push past this is dropped with a diagnostic, which keeps
    /// pathological nesting from growing the stack without bound.
    /// Default: 512
    pub max_depth: usize,
}

impl Default for TreeBuilderOpts {
    fn default() -> TreeBuilderOpts {
        TreeBuilderOpts {
            exact_errors: false,
            scripting_enabled: true,
            iframe_srcdoc: false,
            drop_doctype: false,
            quirks_mode: NoQuirks,
            max_depth: 512,
        }
    }
}

/// What the tree builder asks of the tokenizer after processing a token.
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub enum TreeBuilderFeedback {
    /// Nothing to change.
    Continue,
    /// Switch to a raw text state (RCDATA, RAWTEXT, or script data).
    ToRawData(RawKind),
    /// Switch to the PLAINTEXT state.
    ToPlaintext,
}

pub(crate) enum PushFlag {
    Push,
    NoPush,
}

enum Bookmark {
    Replace(Handle),
    InsertAfter(Handle),
}

macro_rules! qualname {
    ("", $local:tt) => {
        QualName {
            prefix: None,
            ns: ns!(),
            local: local_name!($local),
        }
    };
    ($prefix: tt $ns:tt $local:tt) => {
        QualName {
            prefix: Some(namespace_prefix!($prefix)),
            ns: ns!($ns),
            local: local_name!($local),
        }
    };
}

/// The name of an element node, as (namespace, local name).
///
/// # Panics
///
/// Panics if the node is not an element.
pub(crate) fn elem_name(target: &Handle) -> ExpandedName {
    match target.data {
        NodeData::Element { ref name, .. } => name.expanded(),
        _ => panic!("not an element!"),
    }
}

fn same_node(x: &Handle, y: &Handle) -> bool {
    Rc::ptr_eq(x, y)
}

fn any_not_whitespace(x: &StrTendril) -> bool {
    // FIXME: this might be much faster as a byte scan
    x.chars().any(|c| !c.is_ascii_whitespace())
}

/// The HTML tree builder.
pub struct TreeBuilder {
    /// Options controlling the behavior of the tree builder.
    opts: TreeBuilderOpts,

    /// The document node at the root of the growing tree.
    doc_handle: Handle,

    /// Diagnostics accumulated so far.
    errors: Vec<ParseError>,

    /// Byte offset of the token being processed, for diagnostics.
    current_offset: usize,

    /// Insertion mode.
    mode: InsertionMode,

    /// Original insertion mode, used by Text and InTableText modes.
    orig_mode: Option<InsertionMode>,

    /// Stack of template insertion modes.
    template_modes: Vec<InsertionMode>,

    /// Pending table character tokens.
    pending_table_text: Vec<(SplitStatus, StrTendril)>,

    /// Quirks mode as set by the parser.
    quirks_mode: QuirksMode,

    /// Stack of open elements, most recently added at end.
    open_elems: Vec<Handle>,

    /// List of active formatting elements.
    active_formatting: Vec<FormatEntry>,

    //§ the-element-pointers
    /// Head element pointer.
    head_elem: Option<Handle>,

    /// Form element pointer.
    form_elem: Option<Handle>,
    //§ END
    /// Frameset-ok flag.
    frameset_ok: bool,

    /// Ignore a following U+000A LINE FEED?
    ignore_lf: bool,

    /// Is foster parenting enabled?
    foster_parenting: bool,

    /// The context element for the fragment parsing algorithm.
    context_elem: Option<Handle>,
}

impl TreeBuilder {
    /// Create a new tree builder which constructs a fresh document.
    pub fn new(opts: TreeBuilderOpts) -> TreeBuilder {
        TreeBuilder {
            opts,
            doc_handle: dom::Node::new(NodeData::Document),
            errors: vec![],
            current_offset: 0,
            mode: InsertionMode::Initial,
            orig_mode: None,
            template_modes: vec![],
            pending_table_text: vec![],
            quirks_mode: opts.quirks_mode,
            open_elems: vec![],
            active_formatting: vec![],
            head_elem: None,
            form_elem: None,
            frameset_ok: true,
            ignore_lf: false,
            foster_parenting: false,
            context_elem: None,
        }
    }

    /// Create a new tree builder for parsing a fragment in the context of
    /// the given element.
    pub fn new_for_fragment(
        opts: TreeBuilderOpts,
        context_elem: Handle,
        form_elem: Option<Handle>,
    ) -> TreeBuilder {
        let context_is_template =
            elem_name(&context_elem) == ExpandedName { ns: &ns!(html), local: &local_name!("template") };
        let template_modes = if context_is_template {
            vec![InsertionMode::InTemplate]
        } else {
            vec![]
        };

        let mut tb = TreeBuilder {
            opts,
            doc_handle: dom::Node::new(NodeData::Document),
            errors: vec![],
            current_offset: 0,
            mode: InsertionMode::Initial,
            orig_mode: None,
            template_modes,
            pending_table_text: vec![],
            quirks_mode: opts.quirks_mode,
            open_elems: vec![],
            active_formatting: vec![],
            head_elem: None,
            form_elem,
            frameset_ok: true,
            ignore_lf: false,
            foster_parenting: false,
            context_elem: Some(context_elem),
        };

        // https://html.spec.whatwg.org/multipage/#parsing-html-fragments
        // 5. Let root be a new html element with no attributes.
        // 6. Append the element root to the Document node created above.
        // 7. Set up the parser's stack of open elements so that it contains just the single element root.
        tb.create_root(vec![]);
        // 10. Reset the parser's insertion mode appropriately.
        tb.mode = tb.reset_insertion_mode();

        tb
    }

    // https://html.spec.whatwg.org/multipage/#concept-frag-parse-context
    // Step 4. Set the state of the HTML parser's tokenization stage as follows:
    pub fn tokenizer_state_for_context_elem(&self) -> tok_state::State {
        let elem = self.context_elem.as_ref().expect("no context element");
        let name = elem_name(elem);
        if *name.ns != ns!(html) {
            return tok_state::Data;
        }
        match &**name.local {
            "title" | "textarea" => tok_state::RawData(Rcdata),

            "style" | "xmp" | "iframe" | "noembed" | "noframes" => tok_state::RawData(Rawtext),

            "script" => tok_state::RawData(ScriptData),

            "noscript" => {
                if self.opts.scripting_enabled {
                    tok_state::RawData(Rawtext)
                } else {
                    tok_state::Data
                }
            },

            "plaintext" => tok_state::Plaintext,

            _ => tok_state::Data,
        }
    }

    /// Are we parsing a HTML fragment?
    pub fn is_fragment(&self) -> bool {
        self.context_elem.is_some()
    }

    /// Is the adjusted current node a non-HTML (foreign) element? The
    /// tokenizer needs to know to decide whether `<![CDATA[` opens a
    /// CDATA section.
    pub fn adjusted_current_node_present_but_not_in_html_namespace(&self) -> bool {
        !self.open_elems.is_empty() && *elem_name(&self.adjusted_current_node()).ns != ns!(html)
    }

    /// Process one token from the tokenizer. `Token::Error` marks the end
    /// of the input and makes the builder close all open elements.
    pub fn process_token(&mut self, token: tokenizer::Token) -> TreeBuilderFeedback {
        let ignore_lf = mem::take(&mut self.ignore_lf);

        // Handle `Doctype` here; convert everything else to the local `Token` type.
        let token = match token {
            tokenizer::Token::Doctype(dt) => {
                self.current_offset = dt.span.start;
                if self.mode == InsertionMode::Initial {
                    let (err, quirk) = data::doctype_error_and_quirks(&dt, self.opts.iframe_srcdoc);
                    if err {
                        let msg = format_if!(
                            self.opts.exact_errors,
                            "Bad DOCTYPE",
                            "Bad DOCTYPE: {:?}",
                            dt
                        );
                        self.parse_error(msg);
                    }
                    if !self.opts.drop_doctype {
                        dom::append_child(
                            &self.doc_handle,
                            AppendNode(dom::Node::new(NodeData::Doctype {
                                name: dt.name.unwrap_or_default(),
                                public_id: dt.public_id.unwrap_or_default(),
                                system_id: dt.system_id.unwrap_or_default(),
                            })),
                        );
                    }
                    self.set_quirks_mode(quirk);

                    self.mode = InsertionMode::BeforeHtml;
                } else {
                    let msg = format_if!(
                        self.opts.exact_errors,
                        "DOCTYPE in body",
                        "DOCTYPE in insertion mode {:?}",
                        self.mode
                    );
                    self.parse_error(msg);
                }
                return TreeBuilderFeedback::Continue;
            },

            tokenizer::Token::StartTag(t) => {
                self.current_offset = t.span.start;
                Token::Tag(Tag {
                    kind: TagKind::StartTag,
                    name: t.name,
                    self_closing: false,
                    attrs: t.attrs,
                })
            },
            tokenizer::Token::SelfClosingTag(t) => {
                self.current_offset = t.span.start;
                Token::Tag(Tag {
                    kind: TagKind::StartTag,
                    name: t.name,
                    self_closing: true,
                    attrs: t.attrs,
                })
            },
            tokenizer::Token::EndTag(t) => {
                self.current_offset = t.span.start;
                Token::Tag(Tag {
                    kind: TagKind::EndTag,
                    name: t.name,
                    self_closing: false,
                    attrs: t.attrs,
                })
            },
            tokenizer::Token::Comment { text, span } => {
                self.current_offset = span.start;
                Token::Comment(text)
            },
            tokenizer::Token::Error { span } => {
                self.current_offset = span.start;
                Token::Eof
            },

            tokenizer::Token::Text { mut text, span } => {
                self.current_offset = span.start;
                if ignore_lf && text.starts_with('\n') {
                    text.pop_front(1);
                }
                if text.is_empty() {
                    return TreeBuilderFeedback::Continue;
                }
                Token::Characters(SplitStatus::NotSplit, text)
            },
        };

        // Drop start tags that would grow the stack past the configured
        // bound; everything else still runs so the stack can unwind.
        if matches!(
            token,
            Token::Tag(Tag {
                kind: TagKind::StartTag,
                ..
            })
        ) && self.open_elems.len() >= self.opts.max_depth
        {
            self.parse_error(Borrowed("Nesting depth cap exceeded; start tag dropped"));
            return TreeBuilderFeedback::Continue;
        }

        self.process_to_completion(token)
    }

    /// Finish parsing: close any remaining open elements and hand back
    /// the document.
    pub fn finish(mut self) -> Document {
        self.open_elems.clear();
        Document {
            document: self.doc_handle,
            errors: self.errors,
            quirks_mode: self.quirks_mode,
        }
    }

    /// Drain the diagnostics collected so far without finishing.
    pub fn take_errors(&mut self) -> Vec<ParseError> {
        mem::take(&mut self.errors)
    }

    fn debug_step(&self, mode: InsertionMode, token: &Token) {
        if log_enabled!(Level::Debug) {
            debug!(
                "processing {} in insertion mode {:?}",
                to_escaped_string(token),
                mode
            );
        }
    }

    fn process_to_completion(&mut self, mut token: Token) -> TreeBuilderFeedback {
        // Queue of additional tokens yet to be processed.
        // This stays empty in the common case where we don't split whitespace.
        let mut more_tokens = VecDeque::new();

        loop {
            let should_have_acknowledged_self_closing_flag = matches!(
                token,
                Token::Tag(Tag {
                    self_closing: true,
                    kind: TagKind::StartTag,
                    ..
                })
            );
            let result = if self.is_foreign(&token) {
                self.step_foreign(token)
            } else {
                let mode = self.mode;
                self.step(mode, token)
            };
            match result {
                ProcessResult::Done => {
                    if should_have_acknowledged_self_closing_flag {
                        self.parse_error(Borrowed("Unacknowledged self-closing tag"));
                    }
                    let Some(new_token) = more_tokens.pop_front() else {
                        return TreeBuilderFeedback::Continue;
                    };
                    token = new_token;
                },
                ProcessResult::DoneAckSelfClosing => {
                    let Some(new_token) = more_tokens.pop_front() else {
                        return TreeBuilderFeedback::Continue;
                    };
                    token = new_token;
                },
                ProcessResult::Reprocess(m, t) => {
                    self.mode = m;
                    token = t;
                },
                ProcessResult::SplitWhitespace(mut buf) => {
                    let p = buf.pop_front_char_run(|c| c.is_ascii_whitespace());
                    let Some((first, is_ws)) = p else {
                        return TreeBuilderFeedback::Continue;
                    };
                    let status = if is_ws {
                        SplitStatus::Whitespace
                    } else {
                        SplitStatus::NotWhitespace
                    };
                    token = Token::Characters(status, first);

                    if buf.len32() > 0 {
                        more_tokens.push_back(Token::Characters(SplitStatus::NotSplit, buf));
                    }
                },
                ProcessResult::ToPlaintext => {
                    debug_assert!(more_tokens.is_empty());
                    return TreeBuilderFeedback::ToPlaintext;
                },
                ProcessResult::ToRawData(k) => {
                    debug_assert!(more_tokens.is_empty());
                    return TreeBuilderFeedback::ToRawData(k);
                },
            }
        }
    }

    /// <https://html.spec.whatwg.org/multipage/#appropriate-place-for-inserting-a-node>
    fn appropriate_place_for_insertion(&self, override_target: Option<Handle>) -> InsertionPoint {
        declare_tag_set!(foster_target = "table" "tbody" "tfoot" "thead" "tr");
        let target = override_target.unwrap_or_else(|| self.current_node());
        if !(self.foster_parenting && self.elem_in(&target, foster_target)) {
            // No foster parenting (the common case).
            return InsertionPoint::LastChild(target);
        }

        // Foster parenting
        let mut iter = self.open_elems.iter().rev().peekable();
        while let Some(elem) = iter.next() {
            if self.html_elem_named(elem, local_name!("table")) {
                return InsertionPoint::TableFosterParenting {
                    element: elem.clone(),
                    prev_element: (*iter.peek().unwrap()).clone(),
                };
            }
        }
        InsertionPoint::LastChild(self.html_elem())
    }

    fn insert_at(&mut self, insertion_point: InsertionPoint, child: dom::NodeOrText) {
        match insertion_point {
            InsertionPoint::LastChild(parent) => dom::append_child(&parent, child),
            InsertionPoint::BeforeSibling(sibling) => dom::insert_before(&sibling, child),
            InsertionPoint::TableFosterParenting {
                element,
                prev_element,
            } => dom::append_based_on_parent_node(&element, &prev_element, child),
        }
    }

    fn parse_error(&mut self, msg: Cow<'static, str>) {
        self.errors.push(ParseError {
            offset: self.current_offset,
            msg,
        });
    }

    fn unexpected<T: fmt::Debug>(&mut self, _thing: &T) -> ProcessResult {
        let msg = format_if!(
            self.opts.exact_errors,
            "Unexpected token",
            "Unexpected token {} in insertion mode {:?}",
            to_escaped_string(_thing),
            self.mode
        );
        self.parse_error(msg);
        ProcessResult::Done
    }

    fn assert_named(&self, node: &Handle, name: LocalName) {
        debug_assert!(self.html_elem_named(node, name));
    }

    /// Iterate over the active formatting elements (with index in the list) from the end
    /// to the last marker, or the beginning if there are no markers.
    fn active_formatting_end_to_marker(&self) -> impl Iterator<Item = (usize, &Handle, &Tag)> + '_ {
        self.active_formatting
            .iter()
            .enumerate()
            .rev()
            .map_while(|(i, entry)| match entry {
                FormatEntry::Element(h, t) => Some((i, h, t)),
                FormatEntry::Marker => None,
            })
    }

    fn position_in_active_formatting(&self, element: &Handle) -> Option<usize> {
        self.active_formatting.iter().position(|n| match n {
            FormatEntry::Marker => false,
            FormatEntry::Element(ref handle, _) => same_node(handle, element),
        })
    }

    fn set_quirks_mode(&mut self, mode: QuirksMode) {
        self.quirks_mode = mode;
    }

    fn stop_parsing(&mut self) -> ProcessResult {
        ProcessResult::Done
    }

    //§ parsing-elements-that-contain-only-text
    // Switch to `Text` insertion mode, save the old mode, and
    // switch the tokenizer to a raw-data state.
    // The latter only takes effect after the current token
    // has been fully processed!
    fn to_raw_text_mode(&mut self, k: RawKind) -> ProcessResult {
        self.orig_mode = Some(self.mode);
        self.mode = InsertionMode::Text;
        ProcessResult::ToRawData(k)
    }

    // The generic raw text / RCDATA parsing algorithm.
    fn parse_raw_data(&mut self, tag: Tag, k: RawKind) -> ProcessResult {
        self.insert_element_for(tag);
        self.to_raw_text_mode(k)
    }
    //§ END

    fn current_node(&self) -> Handle {
        self.open_elems.last().expect("no current element").clone()
    }

    fn adjusted_current_node(&self) -> Handle {
        if self.open_elems.len() == 1 {
            if let Some(ctx) = self.context_elem.as_ref() {
                return ctx.clone();
            }
        }
        self.current_node()
    }

    fn current_node_in<TagSet>(&self, set: TagSet) -> bool
    where
        TagSet: Fn(ExpandedName) -> bool,
    {
        let current = self.current_node();
        set(elem_name(&current))
    }

    // Insert at the "appropriate place for inserting a node".
    fn insert_appropriately(&mut self, child: dom::NodeOrText, override_target: Option<Handle>) {
        let insertion_point = self.appropriate_place_for_insertion(override_target);
        self.insert_at(insertion_point, child);
    }

    fn adoption_agency(&mut self, subject: LocalName) {
        // 1.
        if self.current_node_named(subject.clone())
            && self
                .position_in_active_formatting(&self.current_node())
                .is_none()
        {
            self.pop();
            return;
        }

        // 2. 3. 4.
        for _ in 0..8 {
            // 5.
            // We clone the Handle and Tag so they don't cause an immutable borrow of self.
            let maybe_fmt_entry = self
                .active_formatting_end_to_marker()
                .find(|&(_, _, tag)| tag.name == subject)
                .map(|(i, h, t)| (i, h.clone(), t.clone()));

            let Some((fmt_elem_index, fmt_elem, fmt_elem_tag)) = maybe_fmt_entry else {
                return self.process_end_tag_in_body(Tag {
                    kind: TagKind::EndTag,
                    name: subject,
                    self_closing: false,
                    attrs: vec![],
                });
            };

            let Some(fmt_elem_stack_index) = self
                .open_elems
                .iter()
                .rposition(|n| same_node(n, &fmt_elem))
            else {
                self.parse_error(Borrowed("Formatting element not open"));
                self.active_formatting.remove(fmt_elem_index);
                return;
            };

            // 7.
            if !self.in_scope(default_scope, |n| same_node(&n, &fmt_elem)) {
                self.parse_error(Borrowed("Formatting element not in scope"));
                return;
            }

            // 8.
            if !same_node(&self.current_node(), &fmt_elem) {
                self.parse_error(Borrowed("Formatting element not current node"));
            }

            // 9.
            let maybe_furthest_block = self
                .open_elems
                .iter()
                .enumerate()
                .skip(fmt_elem_stack_index)
                .find(|&(_, open_element)| self.elem_in(open_element, special_tag))
                .map(|(i, h)| (i, h.clone()));

            let Some((furthest_block_index, furthest_block)) = maybe_furthest_block else {
                // 10.
                self.open_elems.truncate(fmt_elem_stack_index);
                self.active_formatting.remove(fmt_elem_index);
                return;
            };

            // 11.
            let common_ancestor = self.open_elems[fmt_elem_stack_index - 1].clone();

            // 12.
            let mut bookmark = Bookmark::Replace(fmt_elem.clone());

            // 13.
            let mut node;
            let mut node_index = furthest_block_index;
            let mut last_node = furthest_block.clone();

            // 13.1.
            let mut inner_counter = 0;
            loop {
                // 13.2.
                inner_counter += 1;

                // 13.3.
                node_index -= 1;
                node = self.open_elems[node_index].clone();

                // 13.4.
                if same_node(&node, &fmt_elem) {
                    break;
                }

                // 13.5.
                if inner_counter > 3 {
                    if let Some(position) = self.position_in_active_formatting(&node) {
                        self.active_formatting.remove(position);
                    }
                    self.open_elems.remove(node_index);
                    continue;
                }

                let Some(node_formatting_index) = self.position_in_active_formatting(&node) else {
                    // 13.6.
                    self.open_elems.remove(node_index);
                    continue;
                };

                // 13.7.
                let tag = match self.active_formatting[node_formatting_index] {
                    FormatEntry::Element(ref h, ref t) => {
                        debug_assert!(same_node(h, &node));
                        t.clone()
                    },
                    FormatEntry::Marker => panic!("Found marker during adoption agency"),
                };
                // FIXME: Is there a way to avoid cloning the attributes twice here (once on their
                // own, once as part of t.clone() above)?
                let new_element = dom::create_element(
                    QualName::new(None, ns!(html), tag.name.clone()),
                    tag.attrs.clone(),
                );
                self.open_elems[node_index] = new_element.clone();
                self.active_formatting[node_formatting_index] =
                    FormatEntry::Element(new_element.clone(), tag);
                node = new_element;

                // 13.8.
                if same_node(&last_node, &furthest_block) {
                    bookmark = Bookmark::InsertAfter(node.clone());
                }

                // 13.9.
                dom::remove_from_parent(&last_node);
                dom::append_child(&node, AppendNode(last_node.clone()));

                // 13.10.
                last_node = node.clone();

                // 13.11.
            }

            // 14.
            dom::remove_from_parent(&last_node);
            self.insert_appropriately(AppendNode(last_node.clone()), Some(common_ancestor));

            // 15.
            let new_element = dom::create_element(
                QualName::new(None, ns!(html), fmt_elem_tag.name.clone()),
                fmt_elem_tag.attrs.clone(),
            );
            let new_entry = FormatEntry::Element(new_element.clone(), fmt_elem_tag);

            // 16.
            dom::reparent_children(&furthest_block, &new_element);

            // 17.
            dom::append_child(&furthest_block, AppendNode(new_element.clone()));

            // 18.
            match bookmark {
                Bookmark::Replace(to_replace) => {
                    let index = self
                        .position_in_active_formatting(&to_replace)
                        .expect("bookmark not found in active formatting elements");
                    self.active_formatting[index] = new_entry;
                },
                Bookmark::InsertAfter(previous) => {
                    let index = self
                        .position_in_active_formatting(&previous)
                        .expect("bookmark not found in active formatting elements")
                        + 1;
                    self.active_formatting.insert(index, new_entry);
                    let old_index = self
                        .position_in_active_formatting(&fmt_elem)
                        .expect("formatting element not found in active formatting elements");
                    self.active_formatting.remove(old_index);
                },
            }

            // 19.
            self.remove_from_stack(&fmt_elem);
            let new_furthest_block_index = self
                .open_elems
                .iter()
                .position(|n| same_node(n, &furthest_block))
                .expect("furthest block missing from open element stack");
            self.open_elems
                .insert(new_furthest_block_index + 1, new_element);

            // 20.
        }
    }

    fn push(&mut self, elem: &Handle) {
        self.open_elems.push(elem.clone());
    }

    fn pop(&mut self) -> Handle {
        self.open_elems.pop().expect("no current element")
    }

    fn remove_from_stack(&mut self, elem: &Handle) {
        let position = self.open_elems.iter().rposition(|x| same_node(elem, x));
        if let Some(position) = position {
            self.open_elems.remove(position);
        }
    }

    fn is_marker_or_open(&self, entry: &FormatEntry) -> bool {
        match *entry {
            FormatEntry::Marker => true,
            FormatEntry::Element(ref node, _) => {
                self.open_elems.iter().rev().any(|n| same_node(n, node))
            },
        }
    }

    /// <https://html.spec.whatwg.org/#reconstruct-the-active-formatting-elements>
    fn reconstruct_active_formatting_elements(&mut self) {
        {
            // Step 1. If there are no entries in the list of active formatting elements,
            // then there is nothing to reconstruct; stop this algorithm.
            let Some(last) = self.active_formatting.last() else {
                return;
            };

            // Step 2. If the last (most recently added) entry in the list of active formatting elements is a marker,
            // or if it is an element that is in the stack of open elements, then there is nothing to reconstruct;
            // stop this algorithm.
            if self.is_marker_or_open(last) {
                return;
            }
        }

        // Step 3. Let entry be the last (most recently added) element in the list of active formatting elements.
        // NOTE: We track the index of the element instead
        let mut entry_index = self.active_formatting.len() - 1;
        loop {
            // Step 4. Rewind: If there are no entries before entry in the list of active formatting elements,
            // then jump to the step labeled create.
            if entry_index == 0 {
                break;
            }

            // Step 5. Let entry be the entry one earlier than entry in the list of active formatting elements.
            entry_index -= 1;

            // Step 6. If entry is neither a marker nor an element that is also in the stack of open elements,
            // go to the step labeled rewind.
            // Step 7. Advance: Let entry be the element one later than entry in the list
            // of active formatting elements.
            if self.is_marker_or_open(&self.active_formatting[entry_index]) {
                entry_index += 1;
                break;
            }
        }

        loop {
            // Step 8. Create: Insert an HTML element for the token for which the element entry was created,
            // to obtain new element.
            let tag = match self.active_formatting[entry_index] {
                FormatEntry::Element(_, ref t) => t.clone(),
                FormatEntry::Marker => {
                    panic!("Found marker during formatting element reconstruction")
                },
            };

            let new_element = self.insert_element(
                PushFlag::Push,
                ns!(html),
                tag.name.clone(),
                tag.attrs.clone(),
            );

            // Step 9. Replace the entry for entry in the list with an entry for new element.
            self.active_formatting[entry_index] = FormatEntry::Element(new_element, tag);

            // Step 10. If the entry for new element in the list of active formatting elements is
            // not the last entry in the list, return to the step labeled advance.
            if entry_index == self.active_formatting.len() - 1 {
                break;
            }
            entry_index += 1;
        }
    }

    /// Get the first element on the stack, which will be the <html> element.
    fn html_elem(&self) -> Handle {
        self.open_elems[0].clone()
    }

    /// Get the second element on the stack, if it's a HTML body element.
    fn body_elem(&self) -> Option<Handle> {
        if self.open_elems.len() <= 1 {
            return None;
        }

        let node = self.open_elems[1].clone();
        if self.html_elem_named(&node, local_name!("body")) {
            Some(node)
        } else {
            None
        }
    }

    /// Signal an error depending on the state of the stack of open elements at
    /// the end of the body.
    fn check_body_end(&mut self) {
        declare_tag_set!(body_end_ok =
            "dd" "dt" "li" "optgroup" "option" "p" "rp" "rt" "tbody" "td" "tfoot" "th"
            "thead" "tr" "body" "html");

        for i in 0..self.open_elems.len() {
            let error = {
                let name = elem_name(&self.open_elems[i]);
                if body_end_ok(name) {
                    continue;
                }

                format_if!(
                    self.opts.exact_errors,
                    "Unexpected open tag at end of body",
                    "Unexpected open tag {:?} at end of body",
                    name
                )
            };
            self.parse_error(error);
            // FIXME: Do we keep checking after finding one bad tag?
            // The spec suggests not.
            return;
        }
    }

    fn in_scope<TagSet, Pred>(&self, scope: TagSet, pred: Pred) -> bool
    where
        TagSet: Fn(ExpandedName) -> bool,
        Pred: Fn(Handle) -> bool,
    {
        for node in self.open_elems.iter().rev() {
            if pred(node.clone()) {
                return true;
            }
            if scope(elem_name(node)) {
                return false;
            }
        }

        // supposed to be impossible, because <html> is always in scope

        false
    }

    fn elem_in<TagSet>(&self, elem: &Handle, set: TagSet) -> bool
    where
        TagSet: Fn(ExpandedName) -> bool,
    {
        set(elem_name(elem))
    }

    fn html_elem_named(&self, elem: &Handle, name: LocalName) -> bool {
        let expanded = elem_name(elem);
        *expanded.ns == ns!(html) && *expanded.local == name
    }

    fn in_html_elem_named(&self, name: LocalName) -> bool {
        self.open_elems
            .iter()
            .any(|elem| self.html_elem_named(elem, name.clone()))
    }

    fn current_node_named(&self, name: LocalName) -> bool {
        self.html_elem_named(&self.current_node(), name)
    }

    fn in_scope_named<TagSet>(&self, scope: TagSet, name: LocalName) -> bool
    where
        TagSet: Fn(ExpandedName) -> bool,
    {
        self.in_scope(scope, |elem| self.html_elem_named(&elem, name.clone()))
    }

    /// <https://html.spec.whatwg.org/#generate-implied-end-tags>
    fn generate_implied_end_tags<TagSet>(&mut self, set: TagSet)
    where
        TagSet: Fn(ExpandedName) -> bool,
    {
        loop {
            {
                let Some(elem) = self.open_elems.last() else {
                    return;
                };
                if !set(elem_name(elem)) {
                    return;
                }
            }
            self.pop();
        }
    }

    fn generate_implied_end_except(&mut self, except: LocalName) {
        self.generate_implied_end_tags(|p| {
            if *p.ns == ns!(html) && *p.local == except {
                false
            } else {
                cursory_implied_end(p)
            }
        });
    }
    //§ END

    // Pop elements until the current element is in the set.
    fn pop_until_current<TagSet>(&mut self, tag_set: TagSet)
    where
        TagSet: Fn(ExpandedName) -> bool,
    {
        while !self.current_node_in(&tag_set) {
            self.open_elems.pop();
        }
    }

    // Pop elements until an element from the set has been popped.  Returns the
    // number of elements popped.
    fn pop_until<P>(&mut self, pred: P) -> usize
    where
        P: Fn(ExpandedName) -> bool,
    {
        let mut n = 0;
        loop {
            n += 1;
            match self.open_elems.pop() {
                None => break,
                Some(elem) => {
                    if pred(elem_name(&elem)) {
                        break;
                    }
                },
            }
        }
        n
    }

    fn pop_until_named(&mut self, name: LocalName) -> usize {
        self.pop_until(|p| *p.ns == ns!(html) && *p.local == name)
    }

    /// Pop elements until one with the specified name has been popped.
    /// Signal an error if it was not the first one.
    fn expect_to_close(&mut self, name: LocalName) {
        if self.pop_until_named(name.clone()) != 1 {
            let msg = format_if!(
                self.opts.exact_errors,
                "Unexpected open element",
                "Unexpected open element while closing {:?}",
                name
            );
            self.parse_error(msg);
        }
    }

    fn close_p_element(&mut self) {
        declare_tag_set!(implied = [cursory_implied_end] - "p");
        self.generate_implied_end_tags(implied);
        self.expect_to_close(local_name!("p"));
    }

    fn close_p_element_in_button_scope(&mut self) {
        if self.in_scope_named(button_scope, local_name!("p")) {
            self.close_p_element();
        }
    }

    // Check <input> tags for type=hidden
    fn is_type_hidden(&self, tag: &Tag) -> bool {
        match tag
            .attrs
            .iter()
            .find(|&at| at.name.expanded() == crate::expanded_name!("", "type"))
        {
            None => false,
            Some(at) => at.value.eq_ignore_ascii_case("hidden"),
        }
    }

    fn foster_parent_in_body(&mut self, token: Token) -> ProcessResult {
        self.foster_parenting = true;
        let res = self.step(InsertionMode::InBody, token);
        // FIXME: what if res is Reprocess?
        self.foster_parenting = false;
        res
    }

    fn process_chars_in_table(&mut self, token: Token) -> ProcessResult {
        declare_tag_set!(table_outer = "table" "tbody" "tfoot" "thead" "tr");
        if self.current_node_in(table_outer) {
            debug_assert!(self.pending_table_text.is_empty());
            self.orig_mode = Some(self.mode);
            ProcessResult::Reprocess(InsertionMode::InTableText, token)
        } else {
            let msg = format_if!(
                self.opts.exact_errors,
                "Unexpected characters in table",
                "Unexpected characters {} in table",
                to_escaped_string(&token)
            );
            self.parse_error(msg);
            self.foster_parent_in_body(token)
        }
    }

    // https://html.spec.whatwg.org/multipage/#reset-the-insertion-mode-appropriately
    fn reset_insertion_mode(&self) -> InsertionMode {
        for (i, mut node) in self.open_elems.iter().enumerate().rev() {
            let last = i == 0usize;
            if let (true, Some(ctx)) = (last, self.context_elem.as_ref()) {
                node = ctx;
            }
            let name = elem_name(node);
            if *name.ns != ns!(html) {
                continue;
            }
            match &**name.local {
                "select" => {
                    for ancestor in self.open_elems[0..i].iter().rev() {
                        if self.html_elem_named(ancestor, local_name!("template")) {
                            return InsertionMode::InSelect;
                        } else if self.html_elem_named(ancestor, local_name!("table")) {
                            return InsertionMode::InSelectInTable;
                        }
                    }
                    return InsertionMode::InSelect;
                },
                "td" | "th" => {
                    if !last {
                        return InsertionMode::InCell;
                    }
                },
                "tr" => return InsertionMode::InRow,
                "tbody" | "thead" | "tfoot" => return InsertionMode::InTableBody,
                "caption" => return InsertionMode::InCaption,
                "colgroup" => return InsertionMode::InColumnGroup,
                "table" => return InsertionMode::InTable,
                "template" => return *self.template_modes.last().unwrap(),
                "head" => {
                    if !last {
                        return InsertionMode::InHead;
                    }
                },
                "body" => return InsertionMode::InBody,
                "frameset" => return InsertionMode::InFrameset,
                "html" => match self.head_elem {
                    None => return InsertionMode::BeforeHead,
                    Some(_) => return InsertionMode::AfterHead,
                },

                _ => (),
            }
        }
        InsertionMode::InBody
    }

    fn close_the_cell(&mut self) {
        self.generate_implied_end_tags(cursory_implied_end);
        if self.pop_until(td_th) != 1 {
            self.parse_error(Borrowed("expected to close <td> or <th> with cell"));
        }
        self.clear_active_formatting_to_marker();
    }

    fn append_text(&mut self, text: StrTendril) -> ProcessResult {
        self.insert_appropriately(AppendText(text), None);
        ProcessResult::Done
    }

    fn append_comment(&mut self, text: StrTendril) -> ProcessResult {
        let comment = dom::Node::new(NodeData::Comment { contents: text });
        self.insert_appropriately(AppendNode(comment), None);
        ProcessResult::Done
    }

    fn append_comment_to_doc(&mut self, text: StrTendril) -> ProcessResult {
        let comment = dom::Node::new(NodeData::Comment { contents: text });
        dom::append_child(&self.doc_handle, AppendNode(comment));
        ProcessResult::Done
    }

    fn append_comment_to_html(&mut self, text: StrTendril) -> ProcessResult {
        let target = self.html_elem();
        let comment = dom::Node::new(NodeData::Comment { contents: text });
        dom::append_child(&target, AppendNode(comment));
        ProcessResult::Done
    }

    //§ creating-and-inserting-nodes
    fn create_root(&mut self, attrs: Vec<Attribute>) {
        let elem = dom::create_element(
            QualName::new(None, ns!(html), local_name!("html")),
            attrs,
        );
        self.push(&elem);
        dom::append_child(&self.doc_handle, AppendNode(elem));
        // FIXME: application cache selection algorithm
    }

    // https://html.spec.whatwg.org/multipage/#create-an-element-for-the-token
    fn insert_element(
        &mut self,
        push: PushFlag,
        ns: Namespace,
        name: LocalName,
        attrs: Vec<Attribute>,
    ) -> Handle {
        let qname = QualName::new(None, ns, name);
        let elem = dom::create_element(qname, attrs);

        let insertion_point = self.appropriate_place_for_insertion(None);
        self.insert_at(insertion_point, AppendNode(elem.clone()));

        match push {
            PushFlag::Push => self.push(&elem),
            PushFlag::NoPush => (),
        }
        // FIXME: Remove from the stack if we can't append?
        elem
    }

    fn insert_element_for(&mut self, tag: Tag) -> Handle {
        self.insert_element(PushFlag::Push, ns!(html), tag.name, tag.attrs)
    }

    fn insert_and_pop_element_for(&mut self, tag: Tag) -> Handle {
        self.insert_element(PushFlag::NoPush, ns!(html), tag.name, tag.attrs)
    }

    fn insert_phantom(&mut self, name: LocalName) -> Handle {
        self.insert_element(PushFlag::Push, ns!(html), name, vec![])
    }
    //§ END

    fn create_formatting_element_for(&mut self, tag: Tag) -> Handle {
        // FIXME: This really wants unit tests.
        let mut first_match = None;
        let mut matches = 0usize;
        for (i, _, old_tag) in self.active_formatting_end_to_marker() {
            if tag.equiv_modulo_attr_order(old_tag) {
                first_match = Some(i);
                matches += 1;
            }
        }

        if matches >= 3 {
            self.active_formatting
                .remove(first_match.expect("matches with no index"));
        }

        let elem = self.insert_element(
            PushFlag::Push,
            ns!(html),
            tag.name.clone(),
            tag.attrs.clone(),
        );
        self.active_formatting
            .push(FormatEntry::Element(elem.clone(), tag));
        elem
    }

    fn clear_active_formatting_to_marker(&mut self) {
        loop {
            match self.active_formatting.pop() {
                None | Some(FormatEntry::Marker) => break,
                _ => (),
            }
        }
    }

    fn process_end_tag_in_body(&mut self, tag: Tag) {
        // Look back for a matching open element.
        let mut match_idx = None;
        for (i, elem) in self.open_elems.iter().enumerate().rev() {
            if self.html_elem_named(elem, tag.name.clone()) {
                match_idx = Some(i);
                break;
            }

            if self.elem_in(elem, special_tag) {
                self.parse_error(Borrowed("Found special tag while closing generic tag"));
                return;
            }
        }

        let Some(match_idx) = match_idx else {
            // I believe this is impossible, because the root
            // <html> element is in special_tag.
            self.unexpected(&tag);
            return;
        };

        self.generate_implied_end_except(tag.name.clone());

        if match_idx != self.open_elems.len() - 1 {
            // mis-nested tags
            self.unexpected(&tag);
        }
        self.open_elems.truncate(match_idx);
    }

    fn handle_misnested_a_tags(&mut self, tag: &Tag) {
        let Some(node) = self
            .active_formatting_end_to_marker()
            .find(|&(_, n, _)| self.html_elem_named(n, local_name!("a")))
            .map(|(_, n, _)| n.clone())
        else {
            return;
        };

        self.unexpected(tag);
        self.adoption_agency(local_name!("a"));
        if let Some(index) = self.position_in_active_formatting(&node) {
            self.active_formatting.remove(index);
        }
        self.remove_from_stack(&node);
    }

    //§ tree-construction
    fn is_foreign(&self, token: &Token) -> bool {
        if let Token::Eof = *token {
            return false;
        }

        if self.open_elems.is_empty() {
            return false;
        }

        let current = self.adjusted_current_node();
        let name = elem_name(&current);
        if *name.ns == ns!(html) {
            return false;
        }

        if mathml_text_integration_point(name) {
            match *token {
                Token::Characters(..) => return false,
                Token::Tag(Tag {
                    kind: TagKind::StartTag,
                    ref name,
                    ..
                }) if !matches!(&**name, "mglyph" | "malignmark") => {
                    return false;
                },
                _ => (),
            }
        }

        if svg_html_integration_point(name) {
            match *token {
                Token::Characters(..) => return false,
                Token::Tag(Tag {
                    kind: TagKind::StartTag,
                    ..
                }) => return false,
                _ => (),
            }
        }

        if name == (ExpandedName { ns: &ns!(mathml), local: &local_name!("annotation-xml") }) {
            match *token {
                Token::Tag(Tag {
                    kind: TagKind::StartTag,
                    ref name,
                    ..
                }) if &**name == "svg" => return false,
                Token::Characters(..)
                | Token::Tag(Tag {
                    kind: TagKind::StartTag,
                    ..
                }) => {
                    return !dom::is_mathml_annotation_xml_integration_point(
                        &self.adjusted_current_node(),
                    );
                },
                _ => {},
            };
        }

        true
    }
    //§ END

    fn enter_foreign(&mut self, mut tag: Tag, ns: Namespace) -> ProcessResult {
        match ns {
            ref n if *n == ns!(mathml) => self.adjust_mathml_attributes(&mut tag),
            ref n if *n == ns!(svg) => self.adjust_svg_attributes(&mut tag),
            _ => (),
        }
        self.adjust_foreign_attributes(&mut tag);

        if tag.self_closing {
            self.insert_element(PushFlag::NoPush, ns, tag.name, tag.attrs);
            ProcessResult::DoneAckSelfClosing
        } else {
            self.insert_element(PushFlag::Push, ns, tag.name, tag.attrs);
            ProcessResult::Done
        }
    }

    fn adjust_svg_tag_name(&mut self, tag: &mut Tag) {
        let Tag { ref mut name, .. } = *tag;
        match &**name {
            "altglyph" => *name = LocalName::from("altGlyph"),
            "altglyphdef" => *name = LocalName::from("altGlyphDef"),
            "altglyphitem" => *name = LocalName::from("altGlyphItem"),
            "animatecolor" => *name = LocalName::from("animateColor"),
            "animatemotion" => *name = LocalName::from("animateMotion"),
            "animatetransform" => *name = LocalName::from("animateTransform"),
            "clippath" => *name = LocalName::from("clipPath"),
            "feblend" => *name = LocalName::from("feBlend"),
            "fecolormatrix" => *name = LocalName::from("feColorMatrix"),
            "fecomponenttransfer" => *name = LocalName::from("feComponentTransfer"),
            "fecomposite" => *name = LocalName::from("feComposite"),
            "feconvolvematrix" => *name = LocalName::from("feConvolveMatrix"),
            "fediffuselighting" => *name = LocalName::from("feDiffuseLighting"),
            "fedisplacementmap" => *name = LocalName::from("feDisplacementMap"),
            "fedistantlight" => *name = LocalName::from("feDistantLight"),
            "fedropshadow" => *name = LocalName::from("feDropShadow"),
            "feflood" => *name = LocalName::from("feFlood"),
            "fefunca" => *name = LocalName::from("feFuncA"),
            "fefuncb" => *name = LocalName::from("feFuncB"),
            "fefuncg" => *name = LocalName::from("feFuncG"),
            "fefuncr" => *name = LocalName::from("feFuncR"),
            "fegaussianblur" => *name = LocalName::from("feGaussianBlur"),
            "feimage" => *name = LocalName::from("feImage"),
            "femerge" => *name = LocalName::from("feMerge"),
            "femergenode" => *name = LocalName::from("feMergeNode"),
            "femorphology" => *name = LocalName::from("feMorphology"),
            "feoffset" => *name = LocalName::from("feOffset"),
            "fepointlight" => *name = LocalName::from("fePointLight"),
            "fespecularlighting" => *name = LocalName::from("feSpecularLighting"),
            "fespotlight" => *name = LocalName::from("feSpotLight"),
            "fetile" => *name = LocalName::from("feTile"),
            "feturbulence" => *name = LocalName::from("feTurbulence"),
            "foreignobject" => *name = LocalName::from("foreignObject"),
            "glyphref" => *name = LocalName::from("glyphRef"),
            "lineargradient" => *name = LocalName::from("linearGradient"),
            "radialgradient" => *name = LocalName::from("radialGradient"),
            "textpath" => *name = LocalName::from("textPath"),
            _ => (),
        }
    }

    fn adjust_attributes<F>(&mut self, tag: &mut Tag, mut map: F)
    where
        F: FnMut(&str) -> Option<QualName>,
    {
        for &mut Attribute { ref mut name, .. } in &mut tag.attrs {
            if let Some(replacement) = map(&name.local) {
                *name = replacement;
            }
        }
    }

    fn adjust_svg_attributes(&mut self, tag: &mut Tag) {
        self.adjust_attributes(tag, |k| match k {
            "attributename" => Some(qualname!("", "attributeName")),
            "attributetype" => Some(qualname!("", "attributeType")),
            "basefrequency" => Some(qualname!("", "baseFrequency")),
            "baseprofile" => Some(qualname!("", "baseProfile")),
            "calcmode" => Some(qualname!("", "calcMode")),
            "clippathunits" => Some(qualname!("", "clipPathUnits")),
            "diffuseconstant" => Some(qualname!("", "diffuseConstant")),
            "edgemode" => Some(qualname!("", "edgeMode")),
            "filterunits" => Some(qualname!("", "filterUnits")),
            "glyphref" => Some(qualname!("", "glyphRef")),
            "gradienttransform" => Some(qualname!("", "gradientTransform")),
            "gradientunits" => Some(qualname!("", "gradientUnits")),
            "kernelmatrix" => Some(qualname!("", "kernelMatrix")),
            "kernelunitlength" => Some(qualname!("", "kernelUnitLength")),
            "keypoints" => Some(qualname!("", "keyPoints")),
            "keysplines" => Some(qualname!("", "keySplines")),
            "keytimes" => Some(qualname!("", "keyTimes")),
            "lengthadjust" => Some(qualname!("", "lengthAdjust")),
            "limitingconeangle" => Some(qualname!("", "limitingConeAngle")),
            "markerheight" => Some(qualname!("", "markerHeight")),
            "markerunits" => Some(qualname!("", "markerUnits")),
            "markerwidth" => Some(qualname!("", "markerWidth")),
            "maskcontentunits" => Some(qualname!("", "maskContentUnits")),
            "maskunits" => Some(qualname!("", "maskUnits")),
            "numoctaves" => Some(qualname!("", "numOctaves")),
            "pathlength" => Some(qualname!("", "pathLength")),
            "patterncontentunits" => Some(qualname!("", "patternContentUnits")),
            "patterntransform" => Some(qualname!("", "patternTransform")),
            "patternunits" => Some(qualname!("", "patternUnits")),
            "pointsatx" => Some(qualname!("", "pointsAtX")),
            "pointsaty" => Some(qualname!("", "pointsAtY")),
            "pointsatz" => Some(qualname!("", "pointsAtZ")),
            "preservealpha" => Some(qualname!("", "preserveAlpha")),
            "preserveaspectratio" => Some(qualname!("", "preserveAspectRatio")),
            "primitiveunits" => Some(qualname!("", "primitiveUnits")),
            "refx" => Some(qualname!("", "refX")),
            "refy" => Some(qualname!("", "refY")),
            "repeatcount" => Some(qualname!("", "repeatCount")),
            "repeatdur" => Some(qualname!("", "repeatDur")),
            "requiredextensions" => Some(qualname!("", "requiredExtensions")),
            "requiredfeatures" => Some(qualname!("", "requiredFeatures")),
            "specularconstant" => Some(qualname!("", "specularConstant")),
            "specularexponent" => Some(qualname!("", "specularExponent")),
            "spreadmethod" => Some(qualname!("", "spreadMethod")),
            "startoffset" => Some(qualname!("", "startOffset")),
            "stddeviation" => Some(qualname!("", "stdDeviation")),
            "stitchtiles" => Some(qualname!("", "stitchTiles")),
            "surfacescale" => Some(qualname!("", "surfaceScale")),
            "systemlanguage" => Some(qualname!("", "systemLanguage")),
            "tablevalues" => Some(qualname!("", "tableValues")),
            "targetx" => Some(qualname!("", "targetX")),
            "targety" => Some(qualname!("", "targetY")),
            "textlength" => Some(qualname!("", "textLength")),
            "viewbox" => Some(qualname!("", "viewBox")),
            "viewtarget" => Some(qualname!("", "viewTarget")),
            "xchannelselector" => Some(qualname!("", "xChannelSelector")),
            "ychannelselector" => Some(qualname!("", "yChannelSelector")),
            "zoomandpan" => Some(qualname!("", "zoomAndPan")),
            _ => None,
        });
    }

    fn adjust_mathml_attributes(&mut self, tag: &mut Tag) {
        self.adjust_attributes(tag, |k| match k {
            "definitionurl" => Some(qualname!("", "definitionURL")),
            _ => None,
        });
    }

    fn adjust_foreign_attributes(&mut self, tag: &mut Tag) {
        self.adjust_attributes(tag, |k| match k {
            "xlink:actuate" => Some(qualname!("xlink" xlink "actuate")),
            "xlink:arcrole" => Some(qualname!("xlink" xlink "arcrole")),
            "xlink:href" => Some(qualname!("xlink" xlink "href")),
            "xlink:role" => Some(qualname!("xlink" xlink "role")),
            "xlink:show" => Some(qualname!("xlink" xlink "show")),
            "xlink:title" => Some(qualname!("xlink" xlink "title")),
            "xlink:type" => Some(qualname!("xlink" xlink "type")),
            "xml:lang" => Some(qualname!("xml" xml "lang")),
            "xml:space" => Some(qualname!("xml" xml "space")),
            "xmlns" => Some(qualname!("" xmlns "xmlns")),
            "xmlns:xlink" => Some(qualname!("xmlns" xmlns "xlink")),
            _ => None,
        });
    }

    fn foreign_start_tag(&mut self, mut tag: Tag) -> ProcessResult {
        let current_ns = elem_name(&self.adjusted_current_node()).ns.clone();
        if current_ns == ns!(mathml) {
            self.adjust_mathml_attributes(&mut tag);
        } else if current_ns == ns!(svg) {
            self.adjust_svg_tag_name(&mut tag);
            self.adjust_svg_attributes(&mut tag);
        }
        self.adjust_foreign_attributes(&mut tag);
        if tag.self_closing {
            // FIXME: <script /> in SVG
            self.insert_element(PushFlag::NoPush, current_ns, tag.name, tag.attrs);
            ProcessResult::DoneAckSelfClosing
        } else {
            self.insert_element(PushFlag::Push, current_ns, tag.name, tag.attrs);
            ProcessResult::Done
        }
    }

    fn unexpected_start_tag_in_foreign_content(&mut self, tag: Tag) -> ProcessResult {
        self.unexpected(&tag);
        while !self.current_node_in(|n| {
            *n.ns == ns!(html) || mathml_text_integration_point(n) || svg_html_integration_point(n)
        }) {
            self.pop();
        }
        self.step(self.mode, Token::Tag(tag))
    }
}
