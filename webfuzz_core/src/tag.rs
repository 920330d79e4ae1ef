use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

static WORDLIST_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[(?i:FL) ([^\s\]]+) ([0-9]+)\]").expect("valid FL pattern"));

static GENERATOR_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[(?i:FG) ([^\s\]]+) ([0-9]+)\]").expect("valid FG pattern"));

/// The kind of value source a tag is backed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TagKind {
    /// `FL`: lines of a named word-list file.
    WordList,
    /// `FG`: a registered value generator.
    Generator,
}

/// A mutation point found in a raw test definition, e.g. `[FL users.txt 3]`.
///
/// Two occurrences with the same literal text are the same tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Tag {
    pub literal: String,
    pub kind: TagKind,
    pub source: String,
    pub rounds: usize,
}

/// Returns the distinct tags in `text`, ordered by first occurrence.
///
/// Bracketed tokens that don't fit either pattern exactly are ignored.
pub fn find_tags(text: &str) -> Vec<Tag> {
    let mut found: Vec<(usize, Tag)> = Vec::new();

    for (pattern, kind) in [
        (&*WORDLIST_TAG, TagKind::WordList),
        (&*GENERATOR_TAG, TagKind::Generator),
    ] {
        for caps in pattern.captures_iter(text) {
            let whole = &caps[0];
            // Digit runs too long for usize are treated as malformed.
            let Ok(rounds) = caps[2].parse::<usize>() else {
                continue;
            };
            found.push((
                caps.get(0).map_or(0, |m| m.start()),
                Tag {
                    literal: whole.to_string(),
                    kind,
                    source: caps[1].to_string(),
                    rounds,
                },
            ));
        }
    }

    found.sort_by_key(|(offset, _)| *offset);

    let mut seen = HashSet::new();
    found
        .into_iter()
        .filter(|(_, tag)| seen.insert(tag.literal.clone()))
        .map(|(_, tag)| tag)
        .collect()
}
