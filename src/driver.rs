// Copyright 2024-2026 The canopy Project Developers. See the
// COPYRIGHT file at the top-level directory of this distribution.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! High-level interface to the parser: wires the tokenizer and the tree
//! builder together and drives them to completion.

use crate::dom::{self, Document};
use crate::interface::{Attribute, QualName};
use crate::tokenizer::{Token, Tokenizer, TokenizerOpts};
use crate::tree_builder::{TreeBuilder, TreeBuilderFeedback, TreeBuilderOpts};

use tendril::StrTendril;

/// Options for the parser as a whole.
#[derive(Clone, Default)]
pub struct ParseOpts {
    pub tokenizer: TokenizerOpts,
    pub tree_builder: TreeBuilderOpts,
}

/// A parser bound to one input. Owns the tokenizer, the tree builder,
/// and the growing document; [`parse`](Parser::parse) runs it to
/// completion and hands the document back.
pub struct Parser {
    tokenizer: Tokenizer,
    tree_builder: TreeBuilder,
}

impl Parser {
    /// Create a parser for a complete document.
    pub fn new(input: StrTendril, opts: ParseOpts) -> Parser {
        let tree_builder = TreeBuilder::new(opts.tree_builder);
        let tokenizer = Tokenizer::new(input, opts.tokenizer);
        Parser {
            tokenizer,
            tree_builder,
        }
    }

    /// Create a parser for a fragment, in the context of an element with
    /// the given name and attributes.
    ///
    /// The parsed nodes end up as children of a synthetic `html` root
    /// element below the returned document; the context element itself is
    /// not part of the tree.
    pub fn new_fragment(
        input: StrTendril,
        context: QualName,
        context_attrs: Vec<Attribute>,
        opts: ParseOpts,
    ) -> Parser {
        let context_elem = dom::create_element(context, context_attrs);
        let tree_builder =
            TreeBuilder::new_for_fragment(opts.tree_builder, context_elem, None);

        let mut tok_opts = opts.tokenizer;
        tok_opts.initial_state = Some(tree_builder.tokenizer_state_for_context_elem());
        let mut tokenizer = Tokenizer::new(input, tok_opts);
        tokenizer
            .set_allow_cdata(tree_builder.adjusted_current_node_present_but_not_in_html_namespace());

        Parser {
            tokenizer,
            tree_builder,
        }
    }

    /// Drive the tokenizer to exhaustion, building the document.
    ///
    /// Tokens are pulled and handed to the tree builder one at a time;
    /// between tokens the tree builder's feedback is applied to the
    /// tokenizer (raw-text modes, PLAINTEXT, and whether the adjusted
    /// current node permits CDATA sections).
    pub fn parse(mut self) -> Document {
        loop {
            let token = self.tokenizer.next_token();
            let at_eof = matches!(token, Token::Error { .. });

            match self.tree_builder.process_token(token) {
                TreeBuilderFeedback::Continue => (),
                TreeBuilderFeedback::ToRawData(kind) => self.tokenizer.set_raw_text_mode(kind),
                TreeBuilderFeedback::ToPlaintext => self.tokenizer.set_plaintext_state(),
            }

            self.tokenizer.set_allow_cdata(
                self.tree_builder
                    .adjusted_current_node_present_but_not_in_html_namespace(),
            );

            if at_eof {
                break;
            }
        }

        let mut tokenizer_errors = self.tokenizer.take_errors();
        let mut document = self.tree_builder.finish();
        document.errors.append(&mut tokenizer_errors);
        // Keep diagnostics in source order regardless of which half of
        // the parser noticed them.
        document.errors.sort_by_key(|e| e.offset);
        document
    }
}

/// Parse an HTML document.
///
/// ```ignore
/// let doc = canopy::parse_document("<p>Hello", Default::default());
/// ```
pub fn parse_document(input: &str, opts: ParseOpts) -> Document {
    Parser::new(StrTendril::from(input), opts).parse()
}

/// Parse an HTML fragment in the context of an element with the given
/// name, per the HTML fragment parsing algorithm.
pub fn parse_fragment(input: &str, context: QualName, opts: ParseOpts) -> Document {
    Parser::new_fragment(StrTendril::from(input), context, vec![], opts).parse()
}
