pub mod config;
pub mod definition;
pub mod dispatch;
pub mod error;
pub mod executor;
pub mod generator;
pub mod mutator;
pub mod permutation;
pub mod report;
pub mod supervisor;
pub mod tag;

pub use config::{ReportFormat, Settings};
pub use definition::{CatchPolicy, CodeMatcher, RequestSpec, TestDefinition};
pub use dispatch::{DispatchOutcome, Dispatcher, HttpDispatcher};
pub use error::{FuzzError, LaunchStage};
pub use executor::{ExecutorState, FuzzExecutor, run_file};
pub use generator::{GeneratorRegistry, ValueGenerator};
pub use mutator::{Mutator, MutatorSources, ValueSource, WordListCursor};
pub use permutation::{Permutation, Permutations};
pub use report::{Report, TestResult, Totals, render_html, render_json, render_text};
pub use supervisor::{LaunchSpec, Target, TargetProcess, TargetState};
pub use tag::{Tag, TagKind, find_tags};
