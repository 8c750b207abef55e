// Copyright 2024-2026 The canopy Project Developers. See the
// COPYRIGHT file at the top-level directory of this distribution.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! A spec-conformant HTML5 parser that builds a reference-counted DOM.
//!
//! The crate is a pipeline of two coupled state machines: the
//! [tokenizer](tokenizer) turns a decoded input string into a stream of
//! tokens, and the [tree builder](tree_builder) consumes those tokens while
//! maintaining the stack of open elements, the list of active formatting
//! elements, and the rest of the WHATWG tree-construction state. The result
//! is a [`Document`](dom::Document) whose node graph can be traversed,
//! mutated, and [serialized](serialize) back to HTML.
//!
//! Most users only need the driver:
//!
//! ```ignore
//! let doc = canopy::parse_document("<p>Hello", Default::default());
//! ```

// The atoms, local-name, and namespace macros are generated by build.rs and
// pulled in via `include!`, which rustc treats as "macro-expanded" for the
// purposes of this lint; referring to them (including via other macros'
// internal `$crate::` expansions) is still fully supported today.
#![allow(macro_expanded_macro_exports_accessed_by_absolute_paths)]

pub use crate::dom::{Document, Handle, Node, NodeData};
pub use crate::driver::{parse_document, parse_fragment, ParseOpts, Parser};
pub use crate::interface::{Attribute, ExpandedName, ParseError, QualName, QuirksMode};
pub use crate::serialize::serialize;

#[macro_use]
mod macros;

mod data;
mod util {
    pub mod smallcharset;
    pub mod str;
}

pub use util::smallcharset::SmallCharSet;

include!(concat!(env!("OUT_DIR"), "/atoms.rs"));

pub mod interface;
pub mod dom;
pub mod driver;
pub mod serialize;
pub mod tokenizer;
pub mod tree_builder;

/// Re-export the tendril crate.
pub use tendril;
