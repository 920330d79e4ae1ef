use crate::config::Settings;
use crate::definition::TestDefinition;
use crate::dispatch::{DispatchOutcome, Dispatcher, HttpDispatcher};
use crate::error::FuzzError;
use crate::generator::GeneratorRegistry;
use crate::mutator::{MutatorSources, build_mutators};
use crate::permutation::{Permutation, Permutations};
use crate::report::{Report, TestResult};
use crate::supervisor::{LaunchSpec, Target, TargetProcess};
use crate::tag::find_tags;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutorState {
    Ready,
    Running,
    Finished,
}

/// Drives one test definition through every permutation, strictly in order.
///
/// The target is exclusively owned by the executor for the duration of the
/// run and is killed when the run ends, successfully or not.
pub struct FuzzExecutor<'a> {
    definition: &'a TestDefinition,
    target: &'a mut dyn Target,
    dispatcher: &'a mut dyn Dispatcher,
    state: ExecutorState,
}

impl<'a> FuzzExecutor<'a> {
    pub fn new(
        definition: &'a TestDefinition,
        target: &'a mut dyn Target,
        dispatcher: &'a mut dyn Dispatcher,
    ) -> Self {
        Self {
            definition,
            target,
            dispatcher,
            state: ExecutorState::Ready,
        }
    }

    pub fn state(&self) -> ExecutorState {
        self.state
    }

    pub fn run(
        &mut self,
        permutations: impl IntoIterator<Item = Permutation>,
    ) -> Result<Report, FuzzError> {
        self.state = ExecutorState::Running;
        let mut report = Report::new(self.definition.file_name());
        let outcome = self.run_all(permutations, &mut report);
        self.target.kill();
        outcome?;
        self.state = ExecutorState::Finished;
        log::info!(
            "{}: {} case(s), {} catch(es)",
            report.filename,
            report.cases_run,
            report.totals.total
        );
        Ok(report)
    }

    fn run_all(
        &mut self,
        permutations: impl IntoIterator<Item = Permutation>,
        report: &mut Report,
    ) -> Result<(), FuzzError> {
        for (case, permutation) in permutations.into_iter().enumerate() {
            let result = self.execute_case(case, &permutation)?;
            report.note_case();
            if report.record(result) {
                log::info!("case #{case} caught something");
            }
        }
        Ok(())
    }

    /// Substitutes, dispatches and classifies a single case. Restarts the
    /// target when it crashed.
    pub fn execute_case(
        &mut self,
        case: usize,
        permutation: &Permutation,
    ) -> Result<TestResult, FuzzError> {
        let definition = self.definition;
        let catch = &definition.catch;
        let mut result = TestResult::new(case, permutation.assignments.clone());

        let text = permutation.apply(&definition.raw);
        let request = TestDefinition::request_from(&text, case)?;
        log::debug!("case #{case}: {} {}", request.method, request.url);

        match self.dispatcher.dispatch(&request) {
            DispatchOutcome::Response { status, body } => {
                log::debug!("case #{case}: status {status}");
                let matches = catch.response_matches(&body);
                if !matches.is_empty() {
                    result.response_matches = matches;
                    result.response_body = Some(body);
                }
            }
            DispatchOutcome::ErrorStatus { status, .. } => {
                log::debug!("case #{case}: error status {status}");
                if catch.matches_code(status) {
                    result.status = Some(status);
                }
            }
            DispatchOutcome::NetworkError(reason) => {
                log::debug!("case #{case}: network error: {reason}");
                result.network_errors.push(reason);
            }
        }

        // Drained every case so the pipe never fills up and stalls the target.
        let stdout = self.target.drain_stdout()?;
        if catch.watches_output() && !stdout.is_empty() {
            let matches = catch.output_matches(&stdout);
            if !matches.is_empty() {
                result.output_matches = matches;
                result.output = Some(stdout);
            }
        }

        let stderr = self.target.drain_stderr()?;
        let crash = if stderr.is_empty() {
            self.target
                .exit_status()?
                .map(|status| format!("target {status}"))
        } else {
            Some(stderr)
        };
        if let Some(detail) = crash {
            log::warn!("case #{case}: target crashed, restarting");
            result.stderr = Some(detail);
            self.target
                .restart()
                .map_err(|source| FuzzError::RestartFailed {
                    case,
                    source: Box::new(source),
                })?;
        }

        result.request = Some(request);
        Ok(result)
    }
}

/// Fuzzes a single test-definition file end to end.
///
/// Every tag is resolved before the target is launched, so a missing word
/// list never costs a process start.
pub fn run_file(
    path: &Path,
    settings: &Settings,
    generators: &GeneratorRegistry,
) -> Result<Report, FuzzError> {
    let definition = TestDefinition::load_from_file(path)?;
    let tags = find_tags(&definition.raw);
    let mut mutators = build_mutators(
        tags,
        MutatorSources {
            wordlist_dir: &settings.wordlist_dir,
            generators,
        },
    )?;
    let permutations = Permutations::new(&mut mutators);
    log::info!(
        "{}: {} tag(s), {} permutation(s)",
        definition.file_name(),
        mutators.len(),
        permutations.total()
    );

    let mut target = TargetProcess::start(LaunchSpec {
        argv: definition.exec.clone(),
        working_dir: definition.exec_path.clone(),
        health_check_url: definition.health_check.clone(),
        timeout_iterations: settings.health_check_attempts,
        poll_interval: settings.health_check_interval(),
    })?;
    let mut dispatcher = HttpDispatcher::new(settings.request_timeout());

    FuzzExecutor::new(&definition, &mut target, &mut dispatcher).run(permutations)
}
