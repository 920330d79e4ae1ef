use crate::error::FuzzError;
use crate::tag::find_tags;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// The request part of a test definition, after substitution.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RequestSpec {
    pub url: String,
    pub method: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub body: Option<JsonValue>,
}

impl RequestSpec {
    /// The payload to send, if any. String bodies go out verbatim; any other
    /// JSON value is serialised.
    pub fn body_text(&self) -> Option<String> {
        match &self.body {
            None | Some(JsonValue::Null) => None,
            Some(JsonValue::String(s)) => Some(s.clone()),
            Some(other) => Some(other.to_string()),
        }
    }
}

/// A single status code or an inclusive `[low, high]` range.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(untagged)]
pub enum CodeMatcher {
    Exact(u16),
    Range([u16; 2]),
}

impl CodeMatcher {
    pub fn matches(&self, status: u16) -> bool {
        match *self {
            CodeMatcher::Exact(code) => code == status,
            CodeMatcher::Range([low, high]) => (low..=high).contains(&status),
        }
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(deny_unknown_fields)]
struct RawCatch {
    #[serde(default)]
    codes: Vec<CodeMatcher>,
    #[serde(default)]
    response: Vec<String>,
    #[serde(default)]
    output: Vec<String>,
}

/// What counts as interesting for a test definition.
#[derive(Debug, Clone, Default)]
pub struct CatchPolicy {
    pub codes: Vec<CodeMatcher>,
    pub response: Vec<Regex>,
    pub output: Vec<Regex>,
}

impl CatchPolicy {
    pub fn matches_code(&self, status: u16) -> bool {
        self.codes.iter().any(|m| m.matches(status))
    }

    /// Source text of every response pattern that matches `body`.
    pub fn response_matches(&self, body: &str) -> Vec<String> {
        matching_patterns(&self.response, body)
    }

    pub fn output_matches(&self, output: &str) -> Vec<String> {
        matching_patterns(&self.output, output)
    }

    pub fn watches_output(&self) -> bool {
        !self.output.is_empty()
    }
}

fn matching_patterns(patterns: &[Regex], text: &str) -> Vec<String> {
    patterns
        .iter()
        .filter(|re| re.is_match(text))
        .map(|re| re.as_str().to_string())
        .collect()
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
struct RawDefinition {
    exec_path: PathBuf,
    exec: Vec<String>,
    #[serde(default)]
    health_check: Option<String>,
    request: RequestSpec,
    #[serde(default)]
    catch: Option<RawCatch>,
}

/// Only the request of a substituted document is needed per case.
#[derive(Deserialize)]
struct RequestOnly {
    request: RequestSpec,
}

/// A loaded test-definition file.
///
/// `raw` keeps the unparsed text: tags are substituted into it per case and
/// the result re-parsed.
#[derive(Debug, Clone)]
pub struct TestDefinition {
    pub path: PathBuf,
    pub raw: String,
    pub exec_path: PathBuf,
    pub exec: Vec<String>,
    pub health_check: String,
    pub request: RequestSpec,
    pub catch: CatchPolicy,
}

impl TestDefinition {
    pub fn load_from_file(path: &Path) -> Result<Self, FuzzError> {
        let raw = std::fs::read_to_string(path).map_err(|e| FuzzError::Definition {
            path: path.to_path_buf(),
            reason: format!("failed to read file: {e}"),
        })?;
        Self::parse(path, raw)
    }

    pub fn parse(path: &Path, raw: String) -> Result<Self, FuzzError> {
        let invalid = |reason: String| FuzzError::Definition {
            path: path.to_path_buf(),
            reason,
        };

        let loadable = neutralise_bare_tags(&raw);
        let parsed: RawDefinition = serde_json::from_str(&loadable)
            .map_err(|e| invalid(format!("malformed JSON: {e}")))?;

        if parsed.exec.is_empty() {
            return Err(invalid("`exec` must name at least the executable".into()));
        }

        let health_check = match parsed.health_check {
            Some(url) => url,
            None => url_origin(&parsed.request.url).ok_or_else(|| {
                invalid(format!(
                    "no `health-check` given and no origin in request url {:?}",
                    parsed.request.url
                ))
            })?,
        };

        let raw_catch = parsed.catch.unwrap_or_default();
        let compile = |patterns: Vec<String>| -> Result<Vec<Regex>, FuzzError> {
            patterns
                .iter()
                .map(|p| Regex::new(p).map_err(|e| invalid(format!("bad pattern {p:?}: {e}"))))
                .collect()
        };
        let catch = CatchPolicy {
            codes: raw_catch.codes,
            response: compile(raw_catch.response)?,
            output: compile(raw_catch.output)?,
        };

        Ok(Self {
            path: path.to_path_buf(),
            raw,
            exec_path: parsed.exec_path,
            exec: parsed.exec,
            health_check,
            request: parsed.request,
            catch,
        })
    }

    /// Parses the request out of a substituted copy of the raw document.
    pub fn request_from(text: &str, case: usize) -> Result<RequestSpec, FuzzError> {
        serde_json::from_str::<RequestOnly>(text)
            .map(|doc| doc.request)
            .map_err(|source| FuzzError::Parse { case, source })
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }
}

/// Replaces tags standing outside JSON strings with `null`.
///
/// Bare tags such as `"body": [FG numeric 3]` only become valid JSON once
/// substituted; the stand-in lets the unsubstituted document load. Tags
/// inside string literals are left alone.
fn neutralise_bare_tags(raw: &str) -> String {
    let literals: Vec<String> = find_tags(raw).into_iter().map(|t| t.literal).collect();
    if literals.is_empty() {
        return raw.to_string();
    }

    let mut output = String::with_capacity(raw.len());
    let mut in_string = false;
    let mut escaped = false;
    let mut rest = raw;
    while let Some(c) = rest.chars().next() {
        if !in_string {
            if let Some(tag) = literals.iter().find(|l| rest.starts_with(l.as_str())) {
                output.push_str("null");
                rest = &rest[tag.len()..];
                continue;
            }
        }
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
        } else if c == '"' {
            in_string = true;
        }
        output.push(c);
        rest = &rest[c.len_utf8()..];
    }
    output
}

/// `scheme://authority/` of an absolute URL.
fn url_origin(url: &str) -> Option<String> {
    let (scheme, rest) = url.split_once("://")?;
    let authority = rest.split(['/', '?', '#']).next()?;
    if scheme.is_empty() || authority.is_empty() || authority.contains(char::is_whitespace) {
        return None;
    }
    Some(format!("{scheme}://{authority}/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "exec-path": "/srv/example",
        "exec": ["node", "index.js"],
        "request": {
            "url": "http://localhost:3001/users/[FL ids 2]",
            "method": "POST",
            "headers": {"Content-Type": "application/json"},
            "body": {"name": "[FG alphanumeric 3]"}
        },
        "catch": {
            "codes": [500, [502, 504]],
            "response": ["stack trace"],
            "output": ["(?i)error"]
        }
    }"#;

    fn sample() -> TestDefinition {
        TestDefinition::parse(Path::new("cases/users.json"), SAMPLE.to_string()).unwrap()
    }

    #[test]
    fn parses_full_definition() {
        let def = sample();
        assert_eq!(def.exec, vec!["node", "index.js"]);
        assert_eq!(def.exec_path, PathBuf::from("/srv/example"));
        assert_eq!(def.request.method, "POST");
        assert_eq!(def.request.headers["Content-Type"], "application/json");
        assert_eq!(def.catch.codes.len(), 2);
        assert_eq!(def.file_name(), "users.json");
    }

    #[test]
    fn health_check_defaults_to_request_origin() {
        assert_eq!(sample().health_check, "http://localhost:3001/");
    }

    #[test]
    fn code_list_matches_exact_and_ranges() {
        let def = sample();
        assert!(def.catch.matches_code(500));
        assert!(def.catch.matches_code(503));
        assert!(def.catch.matches_code(504));
        assert!(!def.catch.matches_code(501));
        assert!(!def.catch.matches_code(404));
    }

    #[test]
    fn response_patterns_report_their_source() {
        let def = sample();
        let matches = def
            .catch
            .response_matches("Internal error\nstack trace:\n  at handler.js:10");
        assert_eq!(matches, vec!["stack trace"]);
        assert!(def.catch.response_matches("all good").is_empty());
        assert_eq!(def.catch.output_matches("ERROR: boom"), vec!["(?i)error"]);
    }

    #[test]
    fn body_text_sends_strings_verbatim() {
        let mut request = sample().request;
        assert_eq!(request.body_text().unwrap(), r#"{"name":"[FG alphanumeric 3]"}"#);
        request.body = Some(JsonValue::String("raw=1&b=2".into()));
        assert_eq!(request.body_text().unwrap(), "raw=1&b=2");
        request.body = Some(JsonValue::Null);
        assert!(request.body_text().is_none());
    }

    #[test]
    fn empty_exec_is_rejected() {
        let raw = r#"{"exec-path": ".", "exec": [], "request": {"url": "http://h:1/", "method": "GET"}}"#;
        assert!(matches!(
            TestDefinition::parse(Path::new("t.json"), raw.to_string()),
            Err(FuzzError::Definition { .. })
        ));
    }

    #[test]
    fn invalid_pattern_is_rejected() {
        let raw = r#"{"exec-path": ".", "exec": ["srv"],
            "request": {"url": "http://h:1/", "method": "GET"},
            "catch": {"response": ["(unclosed"]}}"#;
        assert!(matches!(
            TestDefinition::parse(Path::new("t.json"), raw.to_string()),
            Err(FuzzError::Definition { .. })
        ));
    }

    #[test]
    fn broken_substitution_is_a_parse_error() {
        let broken = SAMPLE.replace("[FG alphanumeric 3]", "a\"b");
        match TestDefinition::request_from(&broken, 7) {
            Err(FuzzError::Parse { case, .. }) => assert_eq!(case, 7),
            other => panic!("Expected Parse error, got {other:?}"),
        }
    }

    #[test]
    fn origin_handles_ports_and_paths() {
        assert_eq!(url_origin("https://example.com:8443/a/b?c=1").unwrap(), "https://example.com:8443/");
        assert_eq!(url_origin("http://localhost?x").unwrap(), "http://localhost/");
        assert!(url_origin("not a url").is_none());
    }

    #[test]
    fn bare_tags_outside_strings_are_accepted() {
        let raw = r#"{"exec-path": ".", "exec": ["srv"],
            "request": {"url": "http://h:1/[FL ids 2]", "method": "POST",
                        "body": [FG numeric 3]}}"#;
        let def = TestDefinition::parse(Path::new("t.json"), raw.to_string()).unwrap();
        assert_eq!(def.raw, raw);
        assert!(def.request.body_text().is_none());
        assert_eq!(def.request.url, "http://h:1/[FL ids 2]");

        let substituted = raw.replace("[FG numeric 3]", "42").replace("[FL ids 2]", "7");
        let request = TestDefinition::request_from(&substituted, 0).unwrap();
        assert_eq!(request.body_text().unwrap(), "42");
    }

    #[test]
    fn tags_inside_strings_survive_escaped_quotes() {
        let raw = r#"{"a": "say \"[FL w 1]\"", "b": [FL w 1]}"#;
        assert_eq!(
            neutralise_bare_tags(raw),
            r#"{"a": "say \"[FL w 1]\"", "b": null}"#
        );
    }
}
