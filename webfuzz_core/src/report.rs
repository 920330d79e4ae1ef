//! Per-file fuzzing results and their renderings.
//!
//! A `Report` is filled in by the executor one case at a time. Renderers only
//! read it.

use crate::definition::RequestSpec;
use serde::Serialize;

/// Outcome of one concrete test case.
#[derive(Serialize, Debug, Clone, Default, PartialEq)]
pub struct TestResult {
    /// Position of the case in enumeration order, starting at 0.
    pub case: usize,
    /// The substituted request that was sent.
    pub request: Option<RequestSpec>,
    /// `(tag, value)` pairs used for this case.
    pub assignments: Vec<(String, String)>,
    pub network_errors: Vec<String>,
    /// HTTP error status that matched the code list.
    pub status: Option<u16>,
    pub response_matches: Vec<String>,
    /// Kept only when a response pattern matched.
    pub response_body: Option<String>,
    pub output_matches: Vec<String>,
    pub output: Option<String>,
    /// Non-empty stderr (or an exit notice) that marked the target as crashed.
    pub stderr: Option<String>,
}

impl TestResult {
    pub fn new(case: usize, assignments: Vec<(String, String)>) -> Self {
        Self {
            case,
            assignments,
            ..Default::default()
        }
    }

    pub fn network_error_count(&self) -> usize {
        self.network_errors.len()
    }

    pub fn server_error_count(&self) -> usize {
        usize::from(self.stderr.is_some())
    }

    pub fn code_count(&self) -> usize {
        usize::from(self.status.is_some())
    }

    pub fn catches(&self) -> usize {
        self.network_error_count()
            + self.server_error_count()
            + self.code_count()
            + self.response_matches.len()
            + self.output_matches.len()
    }
}

#[derive(Serialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Totals {
    pub total: usize,
    pub network_errors: usize,
    pub server_errors: usize,
    pub codes: usize,
    pub responses: usize,
    pub outputs: usize,
}

impl Totals {
    fn fold(&mut self, result: &TestResult) {
        self.network_errors += result.network_error_count();
        self.server_errors += result.server_error_count();
        self.codes += result.code_count();
        self.responses += result.response_matches.len();
        self.outputs += result.output_matches.len();
        self.total += result.catches();
    }
}

#[derive(Serialize, Debug, Clone, Default, PartialEq)]
pub struct Report {
    pub filename: String,
    pub cases_run: usize,
    pub totals: Totals,
    pub results: Vec<TestResult>,
}

impl Report {
    pub fn new(filename: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            ..Default::default()
        }
    }

    pub fn note_case(&mut self) {
        self.cases_run += 1;
    }

    /// Keeps `result` if it caught anything. Returns whether it was kept.
    pub fn record(&mut self, result: TestResult) -> bool {
        if result.catches() == 0 {
            return false;
        }
        self.totals.fold(&result);
        self.results.push(result);
        true
    }
}

pub fn render_json(report: &Report) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(report)
}

pub fn render_text(report: &Report) -> String {
    let t = &report.totals;
    let mut out = String::new();
    out.push_str(&format!("Report for {}\n", report.filename));
    out.push_str(&format!("Cases run: {}\n", report.cases_run));
    out.push_str(&format!(
        "Catches: {} (network errors: {}, server errors: {}, codes: {}, response: {}, output: {})\n",
        t.total, t.network_errors, t.server_errors, t.codes, t.responses, t.outputs
    ));

    for result in &report.results {
        out.push_str(&format!("\n--- case #{} ({} catches) ---\n", result.case, result.catches()));
        for (tag, value) in &result.assignments {
            out.push_str(&format!("  {tag} = {value:?}\n"));
        }
        if let Some(request) = &result.request {
            out.push_str(&format!("  request: {} {}\n", request.method, request.url));
            if let Some(body) = request.body_text() {
                out.push_str(&format!("  body: {body}\n"));
            }
        }
        for err in &result.network_errors {
            out.push_str(&format!("  network error: {err}\n"));
        }
        if let Some(status) = result.status {
            out.push_str(&format!("  status: {status}\n"));
        }
        if !result.response_matches.is_empty() {
            out.push_str(&format!("  response matches: {}\n", result.response_matches.join(", ")));
        }
        if let Some(body) = &result.response_body {
            push_block(&mut out, "response", body);
        }
        if !result.output_matches.is_empty() {
            out.push_str(&format!("  output matches: {}\n", result.output_matches.join(", ")));
        }
        if let Some(output) = &result.output {
            push_block(&mut out, "stdout", output);
        }
        if let Some(stderr) = &result.stderr {
            push_block(&mut out, "stderr", stderr);
        }
    }
    out
}

fn push_block(out: &mut String, label: &str, text: &str) {
    out.push_str(&format!("  {label}:\n"));
    for line in text.lines() {
        out.push_str("    | ");
        out.push_str(line);
        out.push('\n');
    }
}

pub fn render_html(report: &Report) -> String {
    let t = &report.totals;
    let mut cases = String::new();
    for result in &report.results {
        cases.push_str(&format!(
            "<section class=\"case\"><h3>case #{} ({} catches)</h3>\n",
            result.case,
            result.catches()
        ));
        if !result.assignments.is_empty() {
            cases.push_str("<table>");
            for (tag, value) in &result.assignments {
                cases.push_str(&format!(
                    "<tr><td>{}</td><td>{}</td></tr>",
                    html_escape(tag),
                    html_escape(value)
                ));
            }
            cases.push_str("</table>\n");
        }
        if let Some(request) = &result.request {
            cases.push_str(&format!(
                "<div class=\"request\">{} {}</div>\n",
                html_escape(&request.method),
                html_escape(&request.url)
            ));
            if let Some(body) = request.body_text() {
                cases.push_str(&format!("<pre>{}</pre>\n", html_escape(&body)));
            }
        }
        for err in &result.network_errors {
            cases.push_str(&format!("<div class=\"network\">network error: {}</div>\n", html_escape(err)));
        }
        if let Some(status) = result.status {
            cases.push_str(&format!("<div class=\"code\">status: {status}</div>\n"));
        }
        push_matches(&mut cases, "response", &result.response_matches, result.response_body.as_deref());
        push_matches(&mut cases, "output", &result.output_matches, result.output.as_deref());
        if let Some(stderr) = &result.stderr {
            cases.push_str(&format!(
                "<div class=\"crash\">server error</div><pre>{}</pre>\n",
                html_escape(stderr)
            ));
        }
        cases.push_str("</section>\n");
    }
    if report.results.is_empty() {
        cases.push_str("<p>no catches</p>\n");
    }

    format!(
        r#"<!doctype html>
<html>
<head>
  <meta charset="utf-8"/>
  <title>webfuzz report: {filename}</title>
  <style>
    body {{ font-family: ui-monospace, Menlo, Consolas, monospace; padding: 24px; }}
    .case {{ border-top: 1px solid #ccc; margin-top: 16px; }}
    .crash, .network {{ color: #b00; font-weight: 700; }}
    pre {{ background: #f4f4f4; padding: 8px; white-space: pre-wrap; }}
  </style>
</head>
<body>
  <h1>{filename}</h1>
  <div>cases run: {cases_run}</div>
  <table>
    <tr><td>total</td><td>{total}</td></tr>
    <tr><td>network errors</td><td>{network}</td></tr>
    <tr><td>server errors</td><td>{server}</td></tr>
    <tr><td>codes</td><td>{codes}</td></tr>
    <tr><td>response</td><td>{responses}</td></tr>
    <tr><td>output</td><td>{outputs}</td></tr>
  </table>
  {cases}
</body>
</html>"#,
        filename = html_escape(&report.filename),
        cases_run = report.cases_run,
        total = t.total,
        network = t.network_errors,
        server = t.server_errors,
        codes = t.codes,
        responses = t.responses,
        outputs = t.outputs,
        cases = cases
    )
}

fn push_matches(out: &mut String, label: &str, matches: &[String], captured: Option<&str>) {
    if matches.is_empty() {
        return;
    }
    let list: Vec<String> = matches.iter().map(|m| html_escape(m)).collect();
    out.push_str(&format!(
        "<div class=\"{label}\">{label} matches: {}</div>\n",
        list.join(", ")
    ));
    if let Some(text) = captured {
        out.push_str(&format!("<pre>{}</pre>\n", html_escape(text)));
    }
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}
