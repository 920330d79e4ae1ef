use crate::error::FuzzError;
use crate::generator::{GeneratorRegistry, ValueGenerator};
use crate::tag::{Tag, TagKind};
use std::path::{Path, PathBuf};

/// Where mutators look up their backing sources.
#[derive(Debug, Clone, Copy)]
pub struct MutatorSources<'a> {
    pub wordlist_dir: &'a Path,
    pub generators: &'a GeneratorRegistry,
}

/// An ordered cursor over word-list lines that wraps back to the first line
/// after the last one.
#[derive(Debug, Clone)]
pub struct WordListCursor {
    lines: Vec<String>,
    position: usize,
}

impl WordListCursor {
    /// Fails on an empty list; there would be nothing to cycle over.
    pub fn new(lines: Vec<String>) -> Option<Self> {
        if lines.is_empty() {
            return None;
        }
        Some(Self { lines, position: 0 })
    }

    pub fn load(path: &Path) -> std::io::Result<Option<Self>> {
        let content = std::fs::read_to_string(path)?;
        let lines = content.lines().map(str::to_string).collect();
        Ok(Self::new(lines))
    }

    pub fn next_value(&mut self) -> String {
        let value = self.lines[self.position].clone();
        self.position = (self.position + 1) % self.lines.len();
        value
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

pub enum ValueSource {
    WordList(WordListCursor),
    Generator(Box<dyn ValueGenerator>),
}

impl std::fmt::Debug for ValueSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValueSource::WordList(cursor) => f.debug_tuple("WordList").field(cursor).finish(),
            ValueSource::Generator(_) => f.debug_tuple("Generator").finish(),
        }
    }
}

/// A tag bound to the source that supplies its substitution values.
#[derive(Debug)]
pub struct Mutator {
    tag: Tag,
    source: ValueSource,
}

impl Mutator {
    pub fn new(tag: Tag, source: ValueSource) -> Self {
        Self { tag, source }
    }

    /// Resolves the tag's backing word-list file or generator.
    pub fn from_tag(tag: Tag, sources: MutatorSources<'_>) -> Result<Self, FuzzError> {
        let source = match tag.kind {
            TagKind::WordList => {
                let path = resolve_wordlist(sources.wordlist_dir, &tag.source).ok_or_else(|| {
                    FuzzError::Load {
                        tag: tag.literal.clone(),
                        reason: format!(
                            "word list {:?} not found in {:?}",
                            tag.source, sources.wordlist_dir
                        ),
                    }
                })?;
                let cursor = WordListCursor::load(&path)
                    .map_err(|e| FuzzError::Load {
                        tag: tag.literal.clone(),
                        reason: format!("failed to read {path:?}: {e}"),
                    })?
                    .ok_or_else(|| FuzzError::Load {
                        tag: tag.literal.clone(),
                        reason: format!("word list {path:?} is empty"),
                    })?;
                log::debug!("Loaded {} lines from {:?} for {}", cursor.len(), path, tag.literal);
                ValueSource::WordList(cursor)
            }
            TagKind::Generator => {
                let generator =
                    sources
                        .generators
                        .instantiate(&tag.source, &tag.literal)
                        .ok_or_else(|| FuzzError::Load {
                            tag: tag.literal.clone(),
                            reason: format!("no generator registered as {:?}", tag.source),
                        })?;
                ValueSource::Generator(generator)
            }
        };
        Ok(Self { tag, source })
    }

    pub fn tag(&self) -> &Tag {
        &self.tag
    }

    pub fn rounds(&self) -> usize {
        self.tag.rounds
    }

    pub fn next_value(&mut self) -> String {
        match &mut self.source {
            ValueSource::WordList(cursor) => cursor.next_value(),
            ValueSource::Generator(generator) => generator.generate(),
        }
    }

    /// Draws this tag's `rounds` candidate values.
    pub fn values(&mut self) -> Vec<String> {
        (0..self.tag.rounds).map(|_| self.next_value()).collect()
    }
}

/// Builds one mutator per tag, failing on the first unresolvable source.
pub fn build_mutators(
    tags: Vec<Tag>,
    sources: MutatorSources<'_>,
) -> Result<Vec<Mutator>, FuzzError> {
    tags.into_iter()
        .map(|tag| Mutator::from_tag(tag, sources))
        .collect()
}

fn resolve_wordlist(dir: &Path, name: &str) -> Option<PathBuf> {
    let exact = dir.join(name);
    if exact.is_file() {
        return Some(exact);
    }
    let with_ext = dir.join(format!("{name}.txt"));
    with_ext.is_file().then_some(with_ext)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tag::find_tags;
    use std::fs;
    use tempfile::tempdir;

    fn tag(text: &str) -> Tag {
        find_tags(text).remove(0)
    }

    #[test]
    fn wordlist_cursor_wraps_after_last_line() {
        let mut cursor = WordListCursor::new(vec!["a".into(), "b".into(), "c".into()]).unwrap();
        let k = cursor.len();
        let outputs: Vec<String> = (0..k + 3).map(|_| cursor.next_value()).collect();
        assert_eq!(outputs[0], outputs[k]);
        assert_eq!(outputs, vec!["a", "b", "c", "a", "b", "c"]);
    }

    #[test]
    fn empty_wordlist_has_no_cursor() {
        assert!(WordListCursor::new(Vec::new()).is_none());
    }

    #[test]
    fn wordlist_mutator_reads_file_lines() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("names.txt"), "alice\r\nbob\n").unwrap();
        let registry = GeneratorRegistry::with_builtins(0);
        let sources = MutatorSources {
            wordlist_dir: dir.path(),
            generators: &registry,
        };

        let mut by_exact_name = Mutator::from_tag(tag("[FL names.txt 3]"), sources).unwrap();
        assert_eq!(by_exact_name.values(), vec!["alice", "bob", "alice"]);

        let mut by_stem = Mutator::from_tag(tag("[FL names 1]"), sources).unwrap();
        assert_eq!(by_stem.values(), vec!["alice"]);
    }

    #[test]
    fn missing_wordlist_is_a_load_error() {
        let dir = tempdir().unwrap();
        let registry = GeneratorRegistry::with_builtins(0);
        let sources = MutatorSources {
            wordlist_dir: dir.path(),
            generators: &registry,
        };
        match Mutator::from_tag(tag("[FL nope 2]"), sources) {
            Err(FuzzError::Load { tag, .. }) => assert_eq!(tag, "[FL nope 2]"),
            other => panic!("Expected Load error, got {other:?}"),
        }
    }

    #[test]
    fn empty_wordlist_file_is_a_load_error() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("empty"), "").unwrap();
        let registry = GeneratorRegistry::with_builtins(0);
        let sources = MutatorSources {
            wordlist_dir: dir.path(),
            generators: &registry,
        };
        assert!(matches!(
            Mutator::from_tag(tag("[FL empty 1]"), sources),
            Err(FuzzError::Load { .. })
        ));
    }

    #[test]
    fn unknown_generator_is_a_load_error() {
        let dir = tempdir().unwrap();
        let registry = GeneratorRegistry::with_builtins(0);
        let sources = MutatorSources {
            wordlist_dir: dir.path(),
            generators: &registry,
        };
        assert!(matches!(
            Mutator::from_tag(tag("[FG imaginary 2]"), sources),
            Err(FuzzError::Load { .. })
        ));
    }

    #[test]
    fn generator_mutator_calls_generator_rounds_times() {
        let dir = tempdir().unwrap();
        let registry = GeneratorRegistry::with_builtins(5);
        let sources = MutatorSources {
            wordlist_dir: dir.path(),
            generators: &registry,
        };
        let mut mutator = Mutator::from_tag(tag("[FG numeric 4]"), sources).unwrap();
        let values = mutator.values();
        assert_eq!(values.len(), 4);
        assert!(values.iter().all(|v| v.parse::<i64>().is_ok()));
    }
}
