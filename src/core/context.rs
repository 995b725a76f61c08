//! Run context - the immutable facts conditions are evaluated against

use glob_match::glob_match;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use tracing::{debug, info};

/// Parameter disabling test stages
pub const RUN_TESTS: &str = "run_tests";

/// Parameter enabling image build and publish stages
pub const BUILD_IMAGES: &str = "build_images";

/// Long-lived integration branch
pub const MAIN_BRANCH: &str = "develop";

/// Release branches are treated like the main branch
pub const RELEASE_BRANCH_GLOB: &str = "release/*";

/// A build parameter value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    String(String),
}

impl ParamValue {
    /// Parse a raw `key=value` right-hand side
    pub fn parse(raw: &str) -> Self {
        match raw {
            "true" => ParamValue::Bool(true),
            "false" => ParamValue::Bool(false),
            other => ParamValue::String(other.to_string()),
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParamValue::Bool(b) => Some(*b),
            ParamValue::String(s) => match s.as_str() {
                "true" => Some(true),
                "false" => Some(false),
                _ => None,
            },
        }
    }

    /// Equality that treats `true` and `"true"` as the same value
    pub fn matches(&self, expected: &ParamValue) -> bool {
        match (self, expected) {
            (ParamValue::Bool(a), ParamValue::Bool(b)) => a == b,
            (ParamValue::String(a), ParamValue::String(b)) => a == b,
            (ParamValue::Bool(b), ParamValue::String(s))
            | (ParamValue::String(s), ParamValue::Bool(b)) => s == &b.to_string(),
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Bool(b) => write!(f, "{}", b),
            ParamValue::String(s) => f.write_str(s),
        }
    }
}

/// What triggered a build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildCause {
    /// Discovery of a new or changed branch
    BranchIndexing,
    /// A pushed commit
    ScmChange,
    /// The cron trigger
    Timer,
    /// Started by hand
    User,
    /// Started by another job
    Upstream,
}

impl fmt::Display for BuildCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BuildCause::BranchIndexing => "branch_indexing",
            BuildCause::ScmChange => "scm_change",
            BuildCause::Timer => "timer",
            BuildCause::User => "user",
            BuildCause::Upstream => "upstream",
        };
        f.write_str(name)
    }
}

/// A parameter the pipeline declares, with its default
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterDecl {
    pub name: String,
    pub default: ParamValue,
    #[serde(default)]
    pub description: Option<String>,
}

impl ParameterDecl {
    pub fn new(name: impl Into<String>, default: ParamValue) -> Self {
        Self {
            name: name.into(),
            default,
            description: None,
        }
    }

    /// The two flags every pipeline understands: `build_images` off, `run_tests` on
    pub fn standard() -> Vec<ParameterDecl> {
        vec![
            ParameterDecl::new(BUILD_IMAGES, ParamValue::Bool(false)),
            ParameterDecl::new(RUN_TESTS, ParamValue::Bool(true)),
        ]
    }

    /// `declared` plus any standard flag it leaves out
    pub fn with_standard(declared: &[ParameterDecl]) -> Vec<ParameterDecl> {
        let mut merged: Vec<ParameterDecl> = ParameterDecl::standard()
            .into_iter()
            .filter(|std| !declared.iter().any(|d| d.name == std.name))
            .collect();
        merged.extend(declared.iter().cloned());
        merged
    }
}

/// Whether a branch gets the main-branch treatment on indexing runs
pub fn is_main_branch(branch: &str) -> bool {
    branch == MAIN_BRANCH || glob_match(RELEASE_BRANCH_GLOB, branch)
}

/// Immutable facts about one run.
///
/// Built once before planning. Everything a condition can look at is
/// resolved into this struct so evaluation never performs I/O.
#[derive(Debug, Clone)]
pub struct RunContext {
    branch: String,
    job: String,
    parameters: HashMap<String, ParamValue>,
    causes: HashSet<BuildCause>,
    branch_indexing_run: bool,
}

impl RunContext {
    pub fn builder(branch: impl Into<String>, job: impl Into<String>) -> RunContextBuilder {
        RunContextBuilder {
            branch: branch.into(),
            job: job.into(),
            declared: Vec::new(),
            explicit: HashMap::new(),
            causes: HashSet::new(),
        }
    }

    pub fn branch(&self) -> &str {
        &self.branch
    }

    pub fn job(&self) -> &str {
        &self.job
    }

    pub fn param(&self, key: &str) -> Option<&ParamValue> {
        self.parameters.get(key)
    }

    /// Boolean view of a parameter; unset or non-boolean reads as `None`
    pub fn param_bool(&self, key: &str) -> Option<bool> {
        self.param(key).and_then(ParamValue::as_bool)
    }

    pub fn parameters(&self) -> &HashMap<String, ParamValue> {
        &self.parameters
    }

    pub fn has_cause(&self, cause: BuildCause) -> bool {
        self.causes.contains(&cause)
    }

    pub fn causes(&self) -> impl Iterator<Item = &BuildCause> {
        self.causes.iter()
    }

    /// Triggered by branch indexing and nothing else
    pub fn is_branch_indexing_run(&self) -> bool {
        self.branch_indexing_run
    }
}

/// Builder resolving parameters in precedence order: explicit, then the
/// branch-indexing override, then declared defaults
#[derive(Debug, Clone)]
pub struct RunContextBuilder {
    branch: String,
    job: String,
    declared: Vec<ParameterDecl>,
    explicit: HashMap<String, ParamValue>,
    causes: HashSet<BuildCause>,
}

impl RunContextBuilder {
    pub fn declared(mut self, declared: &[ParameterDecl]) -> Self {
        self.declared.extend(declared.iter().cloned());
        self
    }

    pub fn param(mut self, key: impl Into<String>, value: ParamValue) -> Self {
        self.explicit.insert(key.into(), value);
        self
    }

    pub fn params<I>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = (String, ParamValue)>,
    {
        self.explicit.extend(params);
        self
    }

    pub fn cause(mut self, cause: BuildCause) -> Self {
        self.causes.insert(cause);
        self
    }

    pub fn causes<I: IntoIterator<Item = BuildCause>>(mut self, causes: I) -> Self {
        self.causes.extend(causes);
        self
    }

    pub fn build(self) -> RunContext {
        let branch_indexing_run = !self.causes.is_empty()
            && self.causes.iter().all(|c| *c == BuildCause::BranchIndexing);

        // Parameters a virgin run has never seen resolve to their declared
        // default rather than reading as unset.
        let mut parameters: HashMap<String, ParamValue> =
            ParameterDecl::with_standard(&self.declared)
                .into_iter()
                .map(|p| (p.name, p.default))
                .collect();

        if branch_indexing_run && is_main_branch(&self.branch) {
            info!(
                "Branch indexing run on '{}': disabling tests, enabling image build",
                self.branch
            );
            parameters.insert(RUN_TESTS.to_string(), ParamValue::Bool(false));
            parameters.insert(BUILD_IMAGES.to_string(), ParamValue::Bool(true));
        }

        for (key, value) in self.explicit {
            debug!("Explicit parameter {} = {}", key, value);
            parameters.insert(key, value);
        }

        RunContext {
            branch: self.branch,
            job: self.job,
            parameters,
            causes: self.causes,
            branch_indexing_run,
        }
    }
}
