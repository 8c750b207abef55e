// Copyright 2024-2026 The canopy Project Developers. See the
// COPYRIGHT file at the top-level directory of this distribution.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//§ serializing-html-fragments

//! Serialization of a DOM (sub)tree back to HTML text.
//!
//! Reparsing the output reproduces the tree, up to the well-known HTML5
//! round-trip exceptions.

use std::collections::VecDeque;
use std::io::{self, Write};

use crate::dom::{Handle, NodeData};
use crate::interface::QualName;
use crate::LocalName;

#[derive(Copy, Clone, PartialEq, Eq)]
pub enum TraversalScope {
    IncludeNode,
    ChildrenOnly,
}

pub trait Serialize {
    fn serialize<S>(&self, serializer: &mut S, traversal_scope: TraversalScope) -> io::Result<()>
    where
        S: Serializer;
}

pub type AttrRef<'a> = (&'a QualName, &'a str);

pub trait Serializer {
    fn start_elem<'a, AttrIter>(&mut self, name: QualName, attrs: AttrIter) -> io::Result<()>
    where
        AttrIter: Iterator<Item = AttrRef<'a>>;

    fn end_elem(&mut self, name: QualName) -> io::Result<()>;

    fn write_text(&mut self, text: &str) -> io::Result<()>;

    fn write_comment(&mut self, text: &str) -> io::Result<()>;

    fn write_doctype(&mut self, name: &str) -> io::Result<()>;
}

#[derive(Copy, Clone)]
pub struct SerializeOpts {
    /// Is scripting enabled? This decides whether `<noscript>` content
    /// gets escaped.  Default: true
    pub scripting_enabled: bool,

    /// Serialize the root node itself, or only its children?
    /// Default: `ChildrenOnly`, which is what the fragment serialization
    /// algorithm specifies.
    pub traversal_scope: TraversalScope,
}

impl Default for SerializeOpts {
    fn default() -> SerializeOpts {
        SerializeOpts {
            scripting_enabled: true,
            traversal_scope: TraversalScope::ChildrenOnly,
        }
    }
}

/// Serialize a node to HTML text.
pub fn serialize<Wr>(writer: Wr, node: &Handle, opts: SerializeOpts) -> io::Result<()>
where
    Wr: Write,
{
    let mut ser = HtmlSerializer::new(writer, opts);
    node.serialize(&mut ser, opts.traversal_scope)
}

struct ElemInfo {
    html_name: Option<LocalName>,
    ignore_children: bool,
    processed_first_child: bool,
}

pub struct HtmlSerializer<Wr: Write> {
    pub writer: Wr,
    opts: SerializeOpts,
    stack: Vec<ElemInfo>,
}

impl<Wr: Write> HtmlSerializer<Wr> {
    pub fn new(writer: Wr, opts: SerializeOpts) -> Self {
        HtmlSerializer {
            writer,
            opts,
            stack: vec![ElemInfo {
                html_name: None,
                ignore_children: false,
                processed_first_child: false,
            }],
        }
    }

    fn parent(&mut self) -> &mut ElemInfo {
        self.stack.last_mut().expect("no parent ElemInfo")
    }

    fn write_escaped(&mut self, text: &str, attr_mode: bool) -> io::Result<()> {
        for c in text.chars() {
            match c {
                '&' => self.writer.write_all(b"&amp;"),
                '\u{00A0}' => self.writer.write_all(b"&nbsp;"),
                '"' if attr_mode => self.writer.write_all(b"&quot;"),
                '<' if !attr_mode => self.writer.write_all(b"&lt;"),
                '>' if !attr_mode => self.writer.write_all(b"&gt;"),
                c => self.writer.write_all(c.encode_utf8(&mut [0; 4]).as_bytes()),
            }?;
        }
        Ok(())
    }
}

impl<Wr: Write> Serializer for HtmlSerializer<Wr> {
    fn start_elem<'a, AttrIter>(&mut self, name: QualName, attrs: AttrIter) -> io::Result<()>
    where
        AttrIter: Iterator<Item = AttrRef<'a>>,
    {
        let html_name = if name.ns == ns!(html) {
            Some(name.local.clone())
        } else {
            None
        };

        if self.parent().ignore_children {
            self.stack.push(ElemInfo {
                html_name,
                ignore_children: true,
                processed_first_child: false,
            });
            return Ok(());
        }

        self.writer.write_all(b"<")?;
        self.writer.write_all(name.local.as_bytes())?;
        for (name, value) in attrs {
            self.writer.write_all(b" ")?;

            if name.ns == ns!() {
                // Common case: no namespace.
            } else if name.ns == ns!(xml) {
                self.writer.write_all(b"xml:")?;
            } else if name.ns == ns!(xmlns) {
                if name.local != local_name!("xmlns") {
                    self.writer.write_all(b"xmlns:")?;
                }
            } else if name.ns == ns!(xlink) {
                self.writer.write_all(b"xlink:")?;
            } else {
                // FIXME: this is a bit of a hack for arbitrary namespaces
                self.writer.write_all(b"unknown:")?;
            }

            self.writer.write_all(name.local.as_bytes())?;
            self.writer.write_all(b"=\"")?;
            self.write_escaped(value, true)?;
            self.writer.write_all(b"\"")?;
        }
        self.writer.write_all(b">")?;

        let ignore_children = name.ns == ns!(html)
            && matches!(
                &*name.local,
                "area"
                    | "base"
                    | "basefont"
                    | "bgsound"
                    | "br"
                    | "col"
                    | "embed"
                    | "frame"
                    | "hr"
                    | "img"
                    | "input"
                    | "keygen"
                    | "link"
                    | "meta"
                    | "param"
                    | "source"
                    | "track"
                    | "wbr"
            );

        self.parent().processed_first_child = true;

        self.stack.push(ElemInfo {
            html_name,
            ignore_children,
            processed_first_child: false,
        });

        Ok(())
    }

    fn end_elem(&mut self, name: QualName) -> io::Result<()> {
        let info = self.stack.pop().expect("no ElemInfo");
        if info.ignore_children {
            return Ok(());
        }

        self.writer.write_all(b"</")?;
        self.writer.write_all(name.local.as_bytes())?;
        self.writer.write_all(b">")
    }

    fn write_text(&mut self, text: &str) -> io::Result<()> {
        let prepend_lf = text.starts_with('\n') && {
            let parent = self.parent();
            !parent.processed_first_child
                && matches!(
                    parent.html_name.as_deref(),
                    Some("pre") | Some("textarea") | Some("listing")
                )
        };

        if prepend_lf {
            self.writer.write_all(b"\n")?;
        }

        let escape = match self.parent().html_name.as_deref() {
            Some(
                "style" | "script" | "xmp" | "iframe" | "noembed" | "noframes" | "plaintext",
            ) => false,

            Some("noscript") => !self.opts.scripting_enabled,

            _ => true,
        };

        if escape {
            self.write_escaped(text, false)
        } else {
            self.writer.write_all(text.as_bytes())
        }
    }

    fn write_comment(&mut self, text: &str) -> io::Result<()> {
        self.writer.write_all(b"<!--")?;
        self.writer.write_all(text.as_bytes())?;
        self.writer.write_all(b"-->")
    }

    fn write_doctype(&mut self, name: &str) -> io::Result<()> {
        self.writer.write_all(b"<!DOCTYPE ")?;
        self.writer.write_all(name.as_bytes())?;
        self.writer.write_all(b">")
    }
}

enum SerializeOp {
    Open(Handle),
    Close(QualName),
}

impl Serialize for Handle {
    fn serialize<S>(&self, serializer: &mut S, traversal_scope: TraversalScope) -> io::Result<()>
    where
        S: Serializer,
    {
        let mut ops = VecDeque::new();
        match traversal_scope {
            TraversalScope::IncludeNode => ops.push_back(SerializeOp::Open(self.clone())),
            TraversalScope::ChildrenOnly => ops.extend(
                self.children
                    .borrow()
                    .iter()
                    .map(|h| SerializeOp::Open(h.clone())),
            ),
        }

        while let Some(op) = ops.pop_front() {
            match op {
                SerializeOp::Open(handle) => match handle.data {
                    NodeData::Element {
                        ref name,
                        ref attrs,
                        ..
                    } => {
                        serializer.start_elem(
                            name.clone(),
                            attrs.borrow().iter().map(|at| (&at.name, &at.value[..])),
                        )?;

                        ops.reserve(1 + handle.children.borrow().len());
                        ops.push_front(SerializeOp::Close(name.clone()));

                        for child in handle.children.borrow().iter().rev() {
                            ops.push_front(SerializeOp::Open(child.clone()));
                        }
                    },

                    NodeData::Doctype { ref name, .. } => serializer.write_doctype(name)?,

                    NodeData::Text { ref contents } => serializer.write_text(&contents.borrow())?,

                    NodeData::Comment { ref contents } => serializer.write_comment(contents)?,

                    NodeData::Error => (),

                    NodeData::Document => panic!("Can't serialize Document node itself"),
                },

                SerializeOp::Close(name) => {
                    serializer.end_elem(name)?;
                },
            }
        }

        Ok(())
    }
}
