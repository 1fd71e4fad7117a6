//! Text form of postings lists.
//!
//! ```text
//! list  := "" | entry (";" entry)*
//! entry := docID ":" [pos ("," pos)*]
//! unit  := term " " list "\n"
//! ```
//!
//! Units are what the data file of a segment stores, one per term.
//! Parsing is strict: anything outside the grammar, including doc IDs that
//! are not strictly ascending, is a [`HashdexError::MalformedRecord`].

use std::fmt;
use std::fmt::Write as _;
use std::str::FromStr;

use crate::error::{HashdexError, Result};
use crate::postings::entry::{DocId, PostingsEntry};
use crate::postings::list::PostingsList;

const ENTRY_SEPARATOR: char = ';';
const DOC_SEPARATOR: char = ':';
const POSITION_SEPARATOR: char = ',';
const TERM_SEPARATOR: char = ' ';

impl fmt::Display for PostingsList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, entry) in self.iter().enumerate() {
            if i > 0 {
                f.write_char(ENTRY_SEPARATOR)?;
            }
            write!(f, "{}{DOC_SEPARATOR}", entry.doc_id())?;
            for (j, pos) in entry.positions().iter().enumerate() {
                if j > 0 {
                    f.write_char(POSITION_SEPARATOR)?;
                }
                write!(f, "{pos}")?;
            }
        }
        Ok(())
    }
}

impl FromStr for PostingsList {
    type Err = HashdexError;

    fn from_str(s: &str) -> Result<Self> {
        if s.is_empty() {
            return Ok(PostingsList::new());
        }

        let mut entries = Vec::new();
        let mut prev: Option<DocId> = None;
        for raw in s.split(ENTRY_SEPARATOR) {
            let entry = parse_entry(raw)?;
            if let Some(prev) = prev
                && entry.doc_id() <= prev
            {
                return Err(HashdexError::malformed(format!(
                    "doc ID {} follows {prev}; entries must be strictly ascending",
                    entry.doc_id()
                )));
            }
            prev = Some(entry.doc_id());
            entries.push(entry);
        }

        PostingsList::from_sorted(entries)
            .ok_or_else(|| HashdexError::malformed("entries are not sorted by doc ID"))
    }
}

fn parse_entry(raw: &str) -> Result<PostingsEntry> {
    let (doc, positions) = raw
        .split_once(DOC_SEPARATOR)
        .ok_or_else(|| HashdexError::malformed(format!("entry '{raw}' has no ':'")))?;

    let doc_id = parse_number(doc, "doc ID")?;
    let mut entry = PostingsEntry::new(doc_id);
    if !positions.is_empty() {
        for pos in positions.split(POSITION_SEPARATOR) {
            entry.add_position(parse_number(pos, "position")?);
        }
    }
    Ok(entry)
}

fn parse_number(raw: &str, what: &str) -> Result<u32> {
    // u32::from_str accepts a leading '+', which the grammar does not.
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err(HashdexError::malformed(format!("invalid {what} '{raw}'")));
    }
    raw.parse()
        .map_err(|_| HashdexError::malformed(format!("{what} '{raw}' out of range")))
}

/// Serialize one data-file unit: `"<term> <postings>\n"`.
pub fn encode_unit(term: &str, list: &PostingsList) -> String {
    format!("{term}{TERM_SEPARATOR}{list}\n")
}

/// Split a data-file unit into its term and raw postings text.
///
/// Accepts the unit with or without its trailing newline.
pub fn split_unit(unit: &str) -> Result<(&str, &str)> {
    let line = unit.strip_suffix('\n').unwrap_or(unit);
    match line.split_once(TERM_SEPARATOR) {
        Some((term, postings)) if !term.is_empty() => Ok((term, postings)),
        _ => Err(HashdexError::malformed(format!(
            "unit '{line}' is not '<term> <postings>'"
        ))),
    }
}

/// Parse one data-file unit into its term and postings list.
pub fn decode_unit(unit: &str) -> Result<(String, PostingsList)> {
    let (term, postings) = split_unit(unit)?;
    Ok((term.to_string(), postings.parse()?))
}

/// Check that a term can be stored in a data-file unit.
pub fn validate_term(term: &str) -> Result<()> {
    if term.is_empty() {
        return Err(HashdexError::invalid_argument("term must not be empty"));
    }
    if term.contains([TERM_SEPARATOR, '\n']) {
        return Err(HashdexError::invalid_argument(format!(
            "term '{}' contains a space or newline",
            term.escape_debug()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> PostingsList {
        let mut list = PostingsList::new();
        list.add_occurrence(0, 0);
        list.add_occurrence(0, 17);
        list.add_occurrence(4, 3);
        list.add_occurrence(12, 1);
        list.add_occurrence(12, 2);
        list.add_occurrence(12, 40);
        list
    }

    #[test]
    fn test_serialize_format() {
        assert_eq!(sample().to_string(), "0:0,17;4:3;12:1,2,40");
        assert_eq!(PostingsList::new().to_string(), "");
    }

    #[test]
    fn test_round_trip() {
        let list = sample();
        let parsed: PostingsList = list.to_string().parse().unwrap();
        assert_eq!(parsed, list);

        let mut with_empty = PostingsList::new();
        with_empty.insert(PostingsEntry::new(7));
        let parsed: PostingsList = with_empty.to_string().parse().unwrap();
        assert_eq!(parsed, with_empty);
    }

    #[test]
    fn test_malformed_inputs_fail() {
        for bad in [
            "1",
            "1:2,",
            "1:2;",
            ";1:2",
            "a:1",
            "1:x",
            "1:+2",
            "-1:2",
            "1:2;1:3",
            "3:1;2:1",
            "99999999999:1",
            "1:2 3",
        ] {
            let result = bad.parse::<PostingsList>();
            assert!(
                matches!(result, Err(HashdexError::MalformedRecord(_))),
                "expected failure for {bad:?}"
            );
        }
    }

    #[test]
    fn test_unit_round_trip() {
        let unit = encode_unit("fox", &sample());
        assert_eq!(unit, "fox 0:0,17;4:3;12:1,2,40\n");
        let (term, list) = decode_unit(&unit).unwrap();
        assert_eq!(term, "fox");
        assert_eq!(list, sample());
    }

    #[test]
    fn test_unit_without_separator() {
        assert!(split_unit("lonely\n").is_err());
        assert!(split_unit(" 1:2\n").is_err());
    }

    #[test]
    fn test_validate_term() {
        assert!(validate_term("quick").is_ok());
        assert!(validate_term("").is_err());
        assert!(validate_term("two words").is_err());
        assert!(validate_term("line\nbreak").is_err());
    }
}
