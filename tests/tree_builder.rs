// Copyright 2024-2026 The canopy Project Developers. See the
// COPYRIGHT file at the top-level directory of this distribution.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! End-to-end structural tests: input HTML in, document shape out.

use std::rc::Rc;

use canopy::dom::{Handle, NodeData};
use canopy::serialize::SerializeOpts;
use canopy::{local_name, ns, parse_document, parse_fragment, serialize};
use canopy::{Document, ParseOpts, QualName, QuirksMode};

fn parse(input: &str) -> Document {
    parse_document(input, ParseOpts::default())
}

fn to_html(doc: &Document) -> String {
    let mut out = Vec::new();
    serialize(&mut out, &doc.document, SerializeOpts::default()).unwrap();
    String::from_utf8(out).unwrap()
}

fn body_of(doc: &Document) -> Handle {
    let html = doc.root_element().expect("no html root");
    let children = html.children.borrow();
    children
        .iter()
        .find(|n| {
            matches!(n.data, NodeData::Element { ref name, .. }
                if name.local == local_name!("body"))
        })
        .cloned()
        .expect("no body")
}

fn element_name(node: &Handle) -> Option<(String, String)> {
    match node.data {
        NodeData::Element { ref name, .. } => Some((name.ns.to_string(), name.local.to_string())),
        _ => None,
    }
}

/// Walk the whole tree, asserting that every child points back at its
/// parent and appears exactly once in its parent's child list.
fn check_parent_links(node: &Handle) {
    for child in node.children.borrow().iter() {
        let parent = child.parent().expect("child without parent pointer");
        assert!(
            Rc::ptr_eq(&parent, node),
            "child's parent pointer does not match its position"
        );
        let occurrences = node
            .children
            .borrow()
            .iter()
            .filter(|c| Rc::ptr_eq(c, child))
            .count();
        assert_eq!(occurrences, 1, "child appears more than once");
        check_parent_links(child);
    }
}

fn count_kind(doc: &Document, pred: fn(&NodeData) -> bool) -> usize {
    fn walk(node: &Handle, pred: fn(&NodeData) -> bool, count: &mut usize) {
        if pred(&node.data) {
            *count += 1;
        }
        for child in node.children.borrow().iter() {
            walk(child, pred, count);
        }
    }
    let mut count = 0;
    walk(&doc.document, pred, &mut count);
    count
}

#[test]
fn simple_document_with_doctype() {
    let doc = parse(r#"<!doctype html><input type="button">"#);
    assert_eq!(
        to_html(&doc),
        r#"<!DOCTYPE html><html><head></head><body><input type="button"></body></html>"#
    );
    assert_eq!(doc.quirks_mode, QuirksMode::NoQuirks);
    check_parent_links(&doc.document);
}

#[test]
fn synthesized_wrappers_for_empty_input() {
    let doc = parse("");
    assert_eq!(to_html(&doc), "<html><head></head><body></body></html>");
    // No doctype: the missing-doctype parse error and quirks mode.
    assert!(!doc.errors.is_empty());
    assert_eq!(doc.quirks_mode, QuirksMode::Quirks);
}

#[test]
fn document_shape_invariants() {
    for input in [
        "",
        "x",
        "<!doctype html><p>y",
        "<table><td>z",
        "<p>1<b>2<i>3</b>4</i>5",
        "<html><head></head><body></body></html>extra",
    ] {
        let doc = parse(input);
        let doctypes = count_kind(&doc, |d| matches!(d, NodeData::Doctype { .. }));
        assert!(doctypes <= 1, "more than one doctype for {input:?}");

        let roots = doc
            .document
            .children
            .borrow()
            .iter()
            .filter(|n| matches!(n.data, NodeData::Element { .. }))
            .count();
        assert_eq!(roots, 1, "expected exactly one root element for {input:?}");

        // html has exactly one head and one body
        let html = doc.root_element().unwrap();
        let names: Vec<_> = html
            .children
            .borrow()
            .iter()
            .filter_map(element_name)
            .collect();
        assert_eq!(
            names
                .iter()
                .filter(|(_, local)| local == "head" || local == "body")
                .count(),
            2,
            "head/body not synthesized for {input:?}"
        );

        check_parent_links(&doc.document);
    }
}

#[test]
fn adoption_agency_misnested_formatting() {
    let doc = parse("<p>1<b>2<i>3</b>4</i>5");
    assert_eq!(
        to_html(&doc),
        "<html><head></head><body><p>1<b>2<i>3</i></b><i>4</i>5</p></body></html>"
    );

    // The adoption agency leaves the <p> with the well-known shape:
    // Text("1"), b[Text("2"), i[Text("3")]], i[Text("4")], Text("5").
    let body = body_of(&doc);
    let p = body.first_child().unwrap();
    assert_eq!(element_name(&p).unwrap().1, "p");
    let kinds: Vec<_> = p
        .children
        .borrow()
        .iter()
        .map(|n| match n.data {
            NodeData::Text { ref contents } => format!("#{}", contents.borrow()),
            NodeData::Element { ref name, .. } => name.local.to_string(),
            _ => "?".into(),
        })
        .collect();
    assert_eq!(kinds, ["#1", "b", "i", "#5"]);
    check_parent_links(&doc.document);
}

#[test]
fn adoption_agency_reconstructs_formatting() {
    let doc = parse("<a><b><a>");
    assert_eq!(
        to_html(&doc),
        "<html><head></head><body><a><b></b></a><b><a></a></b></body></html>"
    );
    check_parent_links(&doc.document);
}

#[test]
fn table_synthesizes_tbody() {
    let doc = parse("<table><tr><td>x</td></tr></table>");
    assert_eq!(
        to_html(&doc),
        "<html><head></head><body><table><tbody><tr><td>x</td></tr></tbody></table></body></html>"
    );
}

#[test]
fn table_text_is_foster_parented() {
    let doc = parse("a<table>b<tr><td>c</td></tr>d</table>");
    assert_eq!(
        to_html(&doc),
        "<html><head></head><body>abd<table><tbody><tr><td>c</td></tr></tbody></table></body></html>"
    );

    // The fostered text coalesced into a single node before the table.
    let body = body_of(&doc);
    let first = body.first_child().unwrap();
    match first.data {
        NodeData::Text { ref contents } => assert_eq!(&**contents.borrow(), "abd"),
        _ => panic!("expected text before table"),
    }
}

#[test]
fn svg_subtree_is_in_svg_namespace() {
    let doc = parse(r#"<!doctype html><html><head></head><body><svg><g/></svg></body>"#);
    let body = body_of(&doc);
    let svg = body.first_child().unwrap();
    assert_eq!(
        element_name(&svg).unwrap(),
        ("http://www.w3.org/2000/svg".to_string(), "svg".to_string())
    );
    let g = svg.first_child().unwrap();
    assert_eq!(
        element_name(&g).unwrap(),
        ("http://www.w3.org/2000/svg".to_string(), "g".to_string())
    );
    // The self-closing <g/> has no children.
    assert!(g.children.borrow().is_empty());
}

#[test]
fn svg_tag_names_are_case_adjusted() {
    let doc = parse("<svg><foreignobject><div>x</div></foreignobject></svg>");
    let body = body_of(&doc);
    let svg = body.first_child().unwrap();
    let fo = svg.first_child().unwrap();
    assert_eq!(element_name(&fo).unwrap().1, "foreignObject");
    // The <div> inside the integration point is an HTML element again.
    let div = fo.first_child().unwrap();
    assert_eq!(
        element_name(&div).unwrap().0,
        "http://www.w3.org/1999/xhtml"
    );
}

#[test]
fn svg_attributes_are_case_adjusted() {
    let doc = parse(r##"<svg viewbox="0 0 1 1" xlink:href="#a"></svg>"##);
    let body = body_of(&doc);
    let svg = body.first_child().unwrap();
    assert!(svg.attr("viewBox").is_some());
    let NodeData::Element { ref attrs, .. } = svg.data else {
        unreachable!()
    };
    let attrs = attrs.borrow();
    let xlink = attrs.iter().find(|a| &*a.name.local == "href").unwrap();
    assert_eq!(xlink.name.ns, ns!(xlink));
    assert_eq!(xlink.name.prefix.as_ref().map(|p| &**p), Some("xlink"));
}

#[test]
fn mathml_definitionurl_adjustment() {
    let doc = parse(r#"<math definitionurl="x"></math>"#);
    let body = body_of(&doc);
    let math = body.first_child().unwrap();
    assert_eq!(
        element_name(&math).unwrap().0,
        "http://www.w3.org/1998/Math/MathML"
    );
    assert!(math.attr("definitionURL").is_some());
}

#[test]
fn entities_in_body_text() {
    let doc = parse("&amp;&#65;&unknown;");
    let body = body_of(&doc);
    assert_eq!(&*body.inner_text(), "&A&unknown;");
}

#[test]
fn single_nul_becomes_replacement_text() {
    let doc = parse("\0");
    let body = body_of(&doc);
    assert_eq!(&*body.inner_text(), "\u{fffd}");
}

#[test]
fn duplicate_attributes_keep_first() {
    let doc = parse("<p a=1 a=2>");
    let body = body_of(&doc);
    let p = body.first_child().unwrap();
    assert_eq!(p.attr("a").as_deref(), Some("1"));
    assert!(!doc.errors.is_empty());
}

#[test]
fn missing_doctype_is_quirks() {
    assert_eq!(parse("<p>x").quirks_mode, QuirksMode::Quirks);
    assert_eq!(parse("<!doctype html>").quirks_mode, QuirksMode::NoQuirks);
    assert_eq!(
        parse(r#"<!DOCTYPE HTML PUBLIC "-//W3C//DTD HTML 3.2 Final//EN">"#).quirks_mode,
        QuirksMode::Quirks
    );
}

#[test]
fn raw_text_elements_capture_markup() {
    let doc = parse("<script>if (a < b) { x(); }</script>");
    let html = doc.root_element().unwrap();
    let head = html.first_child().unwrap();
    let script = head.first_child().unwrap();
    assert_eq!(element_name(&script).unwrap().1, "script");
    assert_eq!(&*script.inner_text(), "if (a < b) { x(); }");
}

#[test]
fn rcdata_resolves_entities() {
    let doc = parse("<title>a&amp;b</title>");
    let html = doc.root_element().unwrap();
    let head = html.first_child().unwrap();
    let title = head.first_child().unwrap();
    assert_eq!(&*title.inner_text(), "a&b");
}

#[test]
fn noscript_is_raw_text_when_scripting() {
    // scripting_enabled defaults to true
    let doc = parse("<body><noscript><b>x</b></noscript>");
    let body = body_of(&doc);
    let noscript = body.first_child().unwrap();
    assert_eq!(noscript.children.borrow().len(), 1);
    assert_eq!(&*noscript.inner_text(), "<b>x</b>");

    let mut opts = ParseOpts::default();
    opts.tree_builder.scripting_enabled = false;
    let doc = parse_document("<body><noscript><b>x</b></noscript>", opts);
    let body = body_of(&doc);
    let noscript = body.first_child().unwrap();
    let b = noscript.first_child().unwrap();
    assert_eq!(element_name(&b).unwrap().1, "b");
}

#[test]
fn template_parses_structurally() {
    let doc = parse("<template><td>x</td></template>");
    let html = doc.root_element().unwrap();
    let head = html.first_child().unwrap();
    let template = head.first_child().unwrap();
    assert_eq!(element_name(&template).unwrap().1, "template");
    let td = template.first_child().unwrap();
    assert_eq!(element_name(&td).unwrap().1, "td");
    assert_eq!(&*td.inner_text(), "x");
}

#[test]
fn comments_are_kept_in_place() {
    let doc = parse("<!--pre--><p>x</p><!--post-->");
    assert_eq!(
        to_html(&doc),
        "<!--pre--><html><head></head><body><p>x</p><!--post--></body></html>"
    );
}

#[test]
fn plaintext_swallows_the_rest() {
    let doc = parse("<plaintext></plaintext><p>");
    let body = body_of(&doc);
    let plaintext = body.first_child().unwrap();
    assert_eq!(&*plaintext.inner_text(), "</plaintext><p>");
}

#[test]
fn nesting_depth_is_capped() {
    let input = "<div>".repeat(600);
    let doc = parse(&input);

    fn depth(node: &Handle) -> usize {
        1 + node
            .children
            .borrow()
            .iter()
            .map(depth)
            .max()
            .unwrap_or(0)
    }
    // document + html + body + divs; the cap bounds the stack at 512 open
    // elements, so total tree depth stays comfortably below 600.
    assert!(depth(&doc.document) <= 515);
    assert!(doc.errors.iter().any(|e| e.msg.contains("depth cap")));
}

#[test]
fn deep_nesting_under_cap_is_untouched() {
    let mut opts = ParseOpts::default();
    opts.tree_builder.max_depth = 64;
    let input = format!("<!doctype html>{}x{}", "<span>".repeat(10), "</span>".repeat(10));
    let doc = parse_document(&input, opts);
    assert!(doc.errors.is_empty());
}

#[test]
fn end_of_file_in_tag_is_recovered() {
    let doc = parse("<p><a href=");
    let body = body_of(&doc);
    let p = body.first_child().unwrap();
    assert_eq!(element_name(&p).unwrap().1, "p");
    assert!(p.children.borrow().is_empty());
}

#[test]
fn fragment_parsing_in_body_context() {
    let doc = parse_fragment(
        "<li>a<li>b",
        QualName::new(None, ns!(html), local_name!("body")),
        ParseOpts::default(),
    );
    let root = doc.root_element().unwrap();
    let names: Vec<_> = root
        .children
        .borrow()
        .iter()
        .filter_map(element_name)
        .map(|(_, local)| local)
        .collect();
    assert_eq!(names, ["li", "li"]);
}

#[test]
fn fragment_parsing_in_table_context() {
    let doc = parse_fragment(
        "<tr><td>x",
        QualName::new(None, ns!(html), local_name!("table")),
        ParseOpts::default(),
    );
    let root = doc.root_element().unwrap();
    let tbody = root.first_child().unwrap();
    assert_eq!(element_name(&tbody).unwrap().1, "tbody");
    let tr = tbody.first_child().unwrap();
    assert_eq!(element_name(&tr).unwrap().1, "tr");
}

#[test]
fn fragment_parsing_in_rcdata_context() {
    let doc = parse_fragment(
        "<b>not markup</b>",
        QualName::new(None, ns!(html), local_name!("title")),
        ParseOpts::default(),
    );
    let root = doc.root_element().unwrap();
    assert_eq!(root.children.borrow().len(), 1);
    assert_eq!(&*root.inner_text(), "<b>not markup</b>");
}

#[test]
fn cdata_in_foreign_content_only() {
    let doc = parse("<svg><![CDATA[a < b]]></svg>");
    let body = body_of(&doc);
    let svg = body.first_child().unwrap();
    assert_eq!(&*svg.inner_text(), "a < b");

    // In HTML content the same syntax is a bogus comment.
    let doc = parse("<![CDATA[a < b]]>");
    let comments = count_kind(&doc, |d| matches!(d, NodeData::Comment { .. }));
    assert_eq!(comments, 1);
}

#[test]
fn foreign_breakout_tags_return_to_html() {
    let doc = parse("<svg><circle></circle><p>html again");
    let body = body_of(&doc);
    let children = body.children.borrow();
    assert_eq!(element_name(&children[0]).unwrap().1, "svg");
    let (p_ns, p_local) = element_name(&children[1]).unwrap();
    assert_eq!(p_local, "p");
    assert_eq!(p_ns, "http://www.w3.org/1999/xhtml");
}

#[test]
fn implied_end_tags_for_list_items() {
    let doc = parse("<ul><li>one<li>two</ul>");
    let body = body_of(&doc);
    let ul = body.first_child().unwrap();
    let lis: Vec<_> = ul
        .children
        .borrow()
        .iter()
        .filter_map(element_name)
        .collect();
    assert_eq!(lis.len(), 2);
    assert!(lis.iter().all(|(_, local)| local == "li"));
}

#[test]
fn heading_nesting_is_corrected() {
    let doc = parse("<h1>a<h2>b");
    let body = body_of(&doc);
    let names: Vec<_> = body
        .children
        .borrow()
        .iter()
        .filter_map(element_name)
        .map(|(_, l)| l)
        .collect();
    assert_eq!(names, ["h1", "h2"]);
}

#[test]
fn errors_carry_source_offsets() {
    let input = "<p>ok</p><i>mis</b>nested";
    let doc = parse(input);
    assert!(!doc.errors.is_empty());
    for err in &doc.errors {
        assert!(err.offset <= input.len());
    }
    // Diagnostics come back in source order.
    let offsets: Vec<_> = doc.errors.iter().map(|e| e.offset).collect();
    let mut sorted = offsets.clone();
    sorted.sort();
    assert_eq!(offsets, sorted);
}
