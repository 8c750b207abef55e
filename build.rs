use std::collections::BTreeMap;
use std::env;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

static NAMESPACES: &[(&str, &str)] = &[
    ("", ""),
    ("*", "*"),
    ("html", "http://www.w3.org/1999/xhtml"),
    ("xml", "http://www.w3.org/XML/1998/namespace"),
    ("xmlns", "http://www.w3.org/2000/xmlns/"),
    ("xlink", "http://www.w3.org/1999/xlink"),
    ("svg", "http://www.w3.org/2000/svg"),
    ("mathml", "http://www.w3.org/1998/Math/MathML"),
];

fn main() {
    println!("cargo:rerun-if-changed=local_names.txt");
    println!("cargo:rerun-if-changed=data/entities.json");

    generate_atoms();
    generate_named_entities();
}

fn generate_atoms() {
    let generated = Path::new(&env::var("OUT_DIR").unwrap()).join("atoms.rs");
    let mut generated = BufWriter::new(File::create(generated).unwrap());

    // A string cache for local (element and attribute) names.
    let local_names = Path::new(&env::var("CARGO_MANIFEST_DIR").unwrap()).join("local_names.txt");
    let mut local_names_atom = string_cache_codegen::AtomType::new("LocalName", "local_name!");
    for line in BufReader::new(File::open(local_names).unwrap()).lines() {
        let local_name = line.unwrap();
        local_names_atom.atom(&local_name);
        local_names_atom.atom(&local_name.to_ascii_lowercase());
    }
    local_names_atom
        .with_macro_doc("Takes a local name as a string and returns its key in the string cache.")
        .write_to(&mut generated)
        .unwrap();

    // A string cache for namespace prefixes.
    string_cache_codegen::AtomType::new("Prefix", "namespace_prefix!")
        .with_macro_doc("Takes a namespace prefix string and returns its key in a string cache.")
        .atoms(NAMESPACES.iter().map(|&(prefix, _url)| prefix))
        .write_to(&mut generated)
        .unwrap();

    // A string cache for namespace urls.
    string_cache_codegen::AtomType::new("Namespace", "namespace_url!")
        .with_macro_doc("Takes a namespace url string and returns its key in a string cache.")
        .atoms(NAMESPACES.iter().map(|&(_prefix, url)| url))
        .write_to(&mut generated)
        .unwrap();

    writeln!(
        generated,
        r#"
        /// Maps the input of [`namespace_prefix!`](macro.namespace_prefix.html) to
        /// the output of [`namespace_url!`](macro.namespace_url.html).
        ///
        #[macro_export] macro_rules! ns {{
        "#
    )
    .unwrap();
    for &(prefix, url) in NAMESPACES {
        writeln!(
            generated,
            "({prefix}) => {{ $crate::namespace_url!({url:?}) }};"
        )
        .unwrap();
    }
    writeln!(generated, "}}").unwrap();
}

/// Generates the named character reference table from the WHATWG list
/// (<https://html.spec.whatwg.org/entities.json>, checked in under `data/`).
///
/// The table maps entity names (without the leading `&`, with the trailing
/// `;` where the entity has one) to their one or two replacement code
/// points. Every proper prefix of every name is also inserted, mapped to
/// `(0, 0)`, so that the longest-match walk in the tokenizer can tell a
/// dead end from a partial match with a single lookup per character.
fn generate_named_entities() {
    let input = BufReader::new(File::open("data/entities.json").unwrap());
    let json: serde_json::Value = serde_json::from_reader(input).unwrap();

    let mut entities: BTreeMap<String, (u32, u32)> = BTreeMap::new();
    for (name, value) in json.as_object().unwrap() {
        let name = name.strip_prefix('&').unwrap();
        let codepoints = value["codepoints"].as_array().unwrap();
        assert!(matches!(codepoints.len(), 1 | 2));
        let first = codepoints[0].as_u64().unwrap() as u32;
        let second = codepoints.get(1).map_or(0, |c| c.as_u64().unwrap() as u32);
        assert!(first != 0);
        entities.insert(name.to_owned(), (first, second));
    }

    let names: Vec<String> = entities.keys().cloned().collect();
    for name in names {
        for prefix_len in 1..name.len() {
            entities
                .entry(name[..prefix_len].to_owned())
                .or_insert((0, 0));
        }
    }

    let mut map = phf_codegen::Map::new();
    for (name, (first, second)) in &entities {
        map.entry(name.as_str(), &format!("({first}, {second})"));
    }

    let generated = Path::new(&env::var("OUT_DIR").unwrap()).join("named_entities.rs");
    let mut generated = BufWriter::new(File::create(generated).unwrap());
    writeln!(
        generated,
        "pub static NAMED_ENTITIES: ::phf::Map<&'static str, (u32, u32)> = {};",
        map.build()
    )
    .unwrap();
}
