//! Unit tests for command-line parsing helpers.

use clap::ValueEnum as _;
use line_device::config::{unescape_separator, ParserKind};

#[test]
fn parser_kind_default_is_text() {
    assert_eq!(ParserKind::default(), ParserKind::Text);
}

#[test]
fn parser_kind_parsed_from_string() {
    assert_eq!(
        ParserKind::from_str("text", false).expect("text is valid"),
        ParserKind::Text
    );
    assert_eq!(
        ParserKind::from_str("json", false).expect("json is valid"),
        ParserKind::Json
    );
}

#[test]
fn parser_kind_invalid_value_rejected() {
    assert!(ParserKind::from_str("xml", false).is_err());
}

#[test]
fn parser_kind_possible_value_names() {
    let names: Vec<String> = ParserKind::value_variants()
        .iter()
        .filter_map(ParserKind::to_possible_value)
        .map(|value| value.get_name().to_owned())
        .collect();
    assert_eq!(names, vec!["text", "json"]);
}

#[test]
fn unescape_known_escapes() {
    assert_eq!(unescape_separator(r"\n"), "\n");
    assert_eq!(unescape_separator(r"\r\n"), "\r\n");
    assert_eq!(unescape_separator(r"\t"), "\t");
    assert_eq!(unescape_separator(r"\0"), "\0");
    assert_eq!(unescape_separator(r"a\\b"), "a\\b");
}

#[test]
fn unescape_plain_text_unchanged() {
    assert_eq!(unescape_separator("||"), "||");
    assert_eq!(unescape_separator(""), "");
}

#[test]
fn unescape_unknown_escape_kept_verbatim() {
    assert_eq!(unescape_separator(r"\x"), r"\x");
}

#[test]
fn unescape_trailing_backslash_kept() {
    assert_eq!(unescape_separator("end\\"), "end\\");
}
