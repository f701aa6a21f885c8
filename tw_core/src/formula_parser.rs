//! Ruby formula decoder for importing existing taps.
//!
//! Reads the subset of the Homebrew DSL that tapwright itself writes, so a
//! tap created by hand or by an older tool can be brought under management:
//!
//! ```ruby
//! class Mytool < Formula
//!   desc "Description"
//!   homepage "https://..."
//!   version "1.2.3"
//!   license "MIT"
//!
//!   on_arm do
//!     url "https://.../mytool-arm64"
//!     sha256 "..."
//!   end
//!
//!   def install
//!     bin.install "mytool-arm64" => "mytool"
//!   end
//!
//!   test do
//!     system "#{bin}/mytool", "--version"
//!   end
//! end
//! ```
//!
//! Only metadata is extracted. The upload type is inferred from the first
//! `url`, and the test command from the first `system`/`shell_output` call
//! in `test do`.

use tree_sitter::{Node, Parser};

use crate::formula::{Formula, TestCommand, UploadType};

/// Error type for formula decoding failures.
#[derive(Debug, PartialEq, Eq)]
pub enum ParseError {
    /// Failed to initialize tree-sitter parser.
    ParserInit,
    /// Failed to parse Ruby source code.
    ParseFailed,
    /// Formula class not found in source.
    NoFormulaClass,
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseError::ParserInit => write!(f, "failed to initialize Ruby parser"),
            ParseError::ParseFailed => write!(f, "failed to parse Ruby source"),
            ParseError::NoFormulaClass => write!(f, "no Formula class found in source"),
        }
    }
}

impl std::error::Error for ParseError {}

/// A formula read back from a tap's `.rb` file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedFormula {
    pub formula: Formula,
    /// Version declared in the file, if any.
    pub version: Option<String>,
    pub urls: Vec<String>,
}

/// Decodes a Ruby formula file.
///
/// `name` is the formula name, normally the file stem.
pub fn parse_ruby_formula(source: &str, name: &str) -> Result<DecodedFormula, ParseError> {
    let mut parser = Parser::new();
    let language = tree_sitter_ruby::LANGUAGE;
    parser
        .set_language(&language.into())
        .map_err(|_| ParseError::ParserInit)?;

    let tree = parser.parse(source, None).ok_or(ParseError::ParseFailed)?;
    let root = tree.root_node();

    let class_node = find_formula_class(&root, source)?;

    let mut decoded = DecodedFormula {
        formula: Formula::new(name),
        version: None,
        urls: Vec::new(),
    };

    if let Some(body) = class_node.child_by_field_name("body") {
        parse_class_body(&body, source, &mut decoded);
    }

    decoded.formula.upload_type = decoded
        .urls
        .first()
        .map(|url| upload_type_for_url(url))
        .unwrap_or_default();

    Ok(decoded)
}

/// Archive URLs mean the formula extracts a tarball; anything else is a raw binary.
pub fn upload_type_for_url(url: &str) -> UploadType {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    if [".tar.gz", ".tgz", ".tar.xz", ".zip"]
        .iter()
        .any(|ext| path.ends_with(ext))
    {
        UploadType::Tarball
    } else {
        UploadType::Binary
    }
}

/// Finds the Formula class definition in the AST.
fn find_formula_class<'a>(root: &'a Node, source: &str) -> Result<Node<'a>, ParseError> {
    let mut cursor = root.walk();

    for child in root.children(&mut cursor) {
        if child.kind() == "class" {
            if let Some(superclass) = child.child_by_field_name("superclass") {
                let mut sc_cursor = superclass.walk();
                for sc_child in superclass.children(&mut sc_cursor) {
                    if sc_child.kind() == "constant" && get_node_text(&sc_child, source) == "Formula" {
                        return Ok(child);
                    }
                }
            }
        }
    }

    Err(ParseError::NoFormulaClass)
}

fn parse_class_body(body: &Node, source: &str, decoded: &mut DecodedFormula) {
    let mut cursor = body.walk();

    for child in body.children(&mut cursor) {
        if child.kind() != "call" {
            continue;
        }
        let method = method_name(&child, source);
        match method.as_str() {
            "desc" => {
                if let Some(s) = extract_string_arg(&child, source) {
                    decoded.formula.details = s;
                }
            }
            "homepage" => {
                if let Some(s) = extract_string_arg(&child, source) {
                    decoded.formula.homepage = s;
                }
            }
            "license" => {
                if let Some(s) = extract_string_arg(&child, source) {
                    decoded.formula.license = s;
                }
            }
            "version" => {
                decoded.version = extract_string_arg(&child, source);
            }
            "url" => {
                if let Some(s) = extract_string_arg(&child, source) {
                    decoded.urls.push(s);
                }
            }
            "on_arm" | "on_intel" | "on_macos" | "on_linux" => {
                collect_urls(&child, source, &mut decoded.urls);
            }
            "test" => {
                decoded.formula.test_command = parse_test_block(&child, source);
            }
            _ => {}
        }
    }
}

/// Collects `url` calls nested inside hardware/OS blocks.
fn collect_urls(node: &Node, source: &str, urls: &mut Vec<String>) {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.kind() == "call" && method_name(&child, source) == "url" {
            if let Some(s) = extract_string_arg(&child, source) {
                urls.push(s);
            }
        } else {
            collect_urls(&child, source, urls);
        }
    }
}

/// Reads the first command run in a `test do` block.
fn parse_test_block(node: &Node, source: &str) -> Option<TestCommand> {
    let call = find_call(node, source, &["system", "shell_output"])?;
    let args = call.child_by_field_name("arguments")?;

    let mut parts = Vec::new();
    let mut cursor = args.walk();
    for child in args.children(&mut cursor) {
        if matches!(child.kind(), "string" | "bare_string") {
            parts.push(unquote(&get_node_text(&child, source)));
        }
    }
    if parts.is_empty() {
        return None;
    }

    if parts.iter().any(|p| p == "--version" || p.ends_with(" --version")) {
        Some(TestCommand::DefaultCommand)
    } else {
        Some(TestCommand::Custom(parts.join(" ")))
    }
}

fn find_call<'a>(node: &Node<'a>, source: &str, names: &[&str]) -> Option<Node<'a>> {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.kind() == "call" && names.contains(&method_name(&child, source).as_str()) {
            return Some(child);
        }
        if let Some(found) = find_call(&child, source, names) {
            return Some(found);
        }
    }
    None
}

fn method_name(node: &Node, source: &str) -> String {
    if let Some(method_node) = node.child_by_field_name("method") {
        get_node_text(&method_node, source)
    } else if let Some(first_child) = node.child(0) {
        get_node_text(&first_child, source)
    } else {
        String::new()
    }
}

/// Extracts the first string argument from a method call.
fn extract_string_arg(node: &Node, source: &str) -> Option<String> {
    let args = node.child_by_field_name("arguments")?;

    let mut cursor = args.walk();
    for child in args.children(&mut cursor) {
        match child.kind() {
            "string" => {
                let mut inner = child.walk();
                let content = child
                    .children(&mut inner)
                    .find(|c| c.kind() == "string_content")
                    .map(|c| get_node_text(&c, source));
                return Some(content.unwrap_or_else(|| unquote(&get_node_text(&child, source))));
            }
            "bare_string" => return Some(get_node_text(&child, source)),
            _ => {}
        }
    }

    None
}

fn unquote(text: &str) -> String {
    text.trim_matches('"').trim_matches('\'').to_string()
}

fn get_node_text(node: &Node, source: &str) -> String {
    source[node.byte_range()].to_string()
}
