use crate::mutator::Mutator;

/// One complete assignment: a value for every distinct tag, in tag order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Permutation {
    pub assignments: Vec<(String, String)>,
}

impl Permutation {
    /// Replaces every occurrence of each tag literal in `template`.
    ///
    /// A single left-to-right pass over the template: inserted values are
    /// never rescanned, so a value that itself contains a tag literal is
    /// kept verbatim and the result does not depend on assignment order.
    pub fn apply(&self, template: &str) -> String {
        let mut output = String::with_capacity(template.len());
        let mut rest = template;
        while let Some((at, tag, value)) = self.earliest_tag(rest) {
            output.push_str(&rest[..at]);
            output.push_str(value);
            rest = &rest[at + tag.len()..];
        }
        output.push_str(rest);
        output
    }

    /// First tag occurrence in `text`; the longest literal wins a tie.
    fn earliest_tag<'s>(&'s self, text: &str) -> Option<(usize, &'s str, &'s str)> {
        self.assignments
            .iter()
            .filter(|(tag, _)| !tag.is_empty())
            .filter_map(|(tag, value)| text.find(tag.as_str()).map(|at| (at, tag, value)))
            .min_by(|a, b| a.0.cmp(&b.0).then(b.1.len().cmp(&a.1.len())))
            .map(|(at, tag, value)| (at, tag.as_str(), value.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }
}

/// Cartesian product of every tag's candidate values.
///
/// Values are drawn from the mutators once, at construction. Enumeration is
/// lexicographic over the per-tag lists with the first tag most significant,
/// so word-list-only runs always enumerate in the same order. There is no cap
/// on the product size.
#[derive(Debug, Clone)]
pub struct Permutations {
    tags: Vec<String>,
    values: Vec<Vec<String>>,
    indices: Vec<usize>,
    done: bool,
}

impl Permutations {
    pub fn new(mutators: &mut [Mutator]) -> Self {
        let tags = mutators.iter().map(|m| m.tag().literal.clone()).collect();
        let values = mutators.iter_mut().map(Mutator::values).collect();
        Self::from_values(tags, values)
    }

    pub fn from_values(tags: Vec<String>, values: Vec<Vec<String>>) -> Self {
        let done = values.iter().any(Vec::is_empty);
        Self {
            indices: vec![0; tags.len()],
            tags,
            values,
            done,
        }
    }

    /// Product of the round counts, saturating at `usize::MAX`.
    pub fn total(&self) -> usize {
        self.values
            .iter()
            .fold(1usize, |acc, list| acc.saturating_mul(list.len()))
    }

    fn advance(&mut self) {
        for slot in (0..self.indices.len()).rev() {
            self.indices[slot] += 1;
            if self.indices[slot] < self.values[slot].len() {
                return;
            }
            self.indices[slot] = 0;
        }
        self.done = true;
    }
}

impl Iterator for Permutations {
    type Item = Permutation;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let assignments = self
            .tags
            .iter()
            .zip(&self.values)
            .zip(&self.indices)
            .map(|((tag, list), &i)| (tag.clone(), list[i].clone()))
            .collect();
        self.advance();
        Some(Permutation { assignments })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mutator::{ValueSource, WordListCursor};
    use crate::tag::find_tags;

    fn wordlist_mutator(tag_text: &str, lines: &[&str]) -> Mutator {
        let tag = find_tags(tag_text).remove(0);
        let cursor = WordListCursor::new(lines.iter().map(|s| s.to_string()).collect()).unwrap();
        Mutator::new(tag, ValueSource::WordList(cursor))
    }

    fn values_of(p: &Permutation) -> Vec<&str> {
        p.assignments.iter().map(|(_, v)| v.as_str()).collect()
    }

    #[test]
    fn no_tags_yields_single_empty_permutation() {
        let all: Vec<Permutation> = Permutations::new(&mut []).collect();
        assert_eq!(all.len(), 1);
        assert!(all[0].is_empty());
        assert_eq!(all[0].apply("unchanged"), "unchanged");
    }

    #[test]
    fn count_is_product_of_rounds() {
        let mut mutators = vec![
            wordlist_mutator("[FL a 2]", &["a1", "a2", "a3"]),
            wordlist_mutator("[FL b 3]", &["b1"]),
            wordlist_mutator("[FL c 4]", &["c1", "c2"]),
        ];
        let perms = Permutations::new(&mut mutators);
        assert_eq!(perms.total(), 24);
        assert_eq!(perms.count(), 24);
    }

    #[test]
    fn enumeration_is_lexicographic() {
        let mut mutators = vec![
            wordlist_mutator("[FL a 2]", &["x", "y"]),
            wordlist_mutator("[FL b 3]", &["1", "2", "3"]),
        ];
        let order: Vec<Vec<String>> = Permutations::new(&mut mutators)
            .map(|p| values_of(&p).into_iter().map(String::from).collect())
            .collect();
        assert_eq!(
            order,
            vec![
                vec!["x", "1"],
                vec!["x", "2"],
                vec!["x", "3"],
                vec!["y", "1"],
                vec!["y", "2"],
                vec!["y", "3"],
            ]
        );
    }

    #[test]
    fn wordlist_runs_are_reproducible() {
        let build = || {
            vec![
                wordlist_mutator("[FL a 3]", &["p", "q"]),
                wordlist_mutator("[FL b 2]", &["r", "s", "t"]),
            ]
        };
        let first: Vec<Permutation> = Permutations::new(&mut build()).collect();
        let second: Vec<Permutation> = Permutations::new(&mut build()).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn zero_rounds_empties_the_product() {
        let mut mutators = vec![
            wordlist_mutator("[FL a 2]", &["x"]),
            wordlist_mutator("[FL b 0]", &["y"]),
        ];
        let perms = Permutations::new(&mut mutators);
        assert_eq!(perms.total(), 0);
        assert_eq!(perms.count(), 0);
    }

    #[test]
    fn repeated_tag_gets_same_value_everywhere() {
        let mut mutators = vec![wordlist_mutator("[FL a 2]", &["one", "two"])];
        let template = r#"{"x": "[FL a 2]", "y": "[FL a 2]"}"#;
        for perm in Permutations::new(&mut mutators) {
            let value = &perm.assignments[0].1;
            assert_eq!(perm.apply(template), format!(r#"{{"x": "{value}", "y": "{value}"}}"#));
        }
    }

    #[test]
    fn inserted_values_are_not_rescanned() {
        let perm = Permutation {
            assignments: vec![
                ("[FL a 1]".to_string(), "literal [FL b 1] text".to_string()),
                ("[FL b 1]".to_string(), "B".to_string()),
            ],
        };
        let template = r#"{"x": "[FL a 1]", "y": "[FL b 1]"}"#;
        assert_eq!(perm.apply(template), r#"{"x": "literal [FL b 1] text", "y": "B"}"#);

        let mut reversed = perm.clone();
        reversed.assignments.reverse();
        assert_eq!(reversed.apply(template), perm.apply(template));
    }
}
