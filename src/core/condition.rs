//! Stage gating predicates

use crate::core::context::{BuildCause, ParamValue, RunContext};
use glob_match::glob_match;
use std::fmt;
use std::sync::Arc;

/// A named predicate over the run context.
///
/// Must be pure: the same context always yields the same answer.
#[derive(Clone)]
pub struct Expression {
    name: String,
    predicate: Arc<dyn Fn(&RunContext) -> bool + Send + Sync>,
}

impl Expression {
    pub fn new<F>(name: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&RunContext) -> bool + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            predicate: Arc::new(predicate),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Expression").field(&self.name).finish()
    }
}

/// Gating predicate for a stage.
///
/// A stage's conditions form an implicit AND list; `AnyOf` and `Not`
/// compose alternatives and negation.
#[derive(Debug, Clone)]
pub enum Condition {
    BranchEquals(String),
    BranchMatchesGlob(String),
    ParamEquals { key: String, expected: ParamValue },
    CauseIs(BuildCause),
    Not(Box<Condition>),
    AnyOf(Vec<Condition>),
    AllOf(Vec<Condition>),
    Expression(Expression),
}

impl Condition {
    pub fn branch(name: impl Into<String>) -> Self {
        Condition::BranchEquals(name.into())
    }

    pub fn branch_glob(pattern: impl Into<String>) -> Self {
        Condition::BranchMatchesGlob(pattern.into())
    }

    pub fn param(key: impl Into<String>, expected: ParamValue) -> Self {
        Condition::ParamEquals {
            key: key.into(),
            expected,
        }
    }

    pub fn negate(condition: Condition) -> Self {
        Condition::Not(Box::new(condition))
    }

    pub fn expression<F>(name: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&RunContext) -> bool + Send + Sync + 'static,
    {
        Condition::Expression(Expression::new(name, predicate))
    }

    /// Evaluate this predicate against the context
    pub fn matches(&self, ctx: &RunContext) -> bool {
        match self {
            Condition::BranchEquals(name) => ctx.branch() == name,
            Condition::BranchMatchesGlob(pattern) => glob_match(pattern, ctx.branch()),
            Condition::ParamEquals { key, expected } => {
                ctx.param(key).is_some_and(|value| value.matches(expected))
            }
            Condition::CauseIs(cause) => ctx.has_cause(*cause),
            Condition::Not(inner) => !inner.matches(ctx),
            Condition::AnyOf(options) => options.iter().any(|c| c.matches(ctx)),
            Condition::AllOf(all) => evaluate(all, ctx),
            Condition::Expression(expr) => (expr.predicate)(ctx),
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::BranchEquals(name) => write!(f, "branch == {}", name),
            Condition::BranchMatchesGlob(pattern) => write!(f, "branch ~ {}", pattern),
            Condition::ParamEquals { key, expected } => write!(f, "params.{} == {}", key, expected),
            Condition::CauseIs(cause) => write!(f, "cause == {}", cause),
            Condition::Not(inner) => write!(f, "not({})", inner),
            Condition::AnyOf(options) => write_list(f, "anyOf", options),
            Condition::AllOf(all) => write_list(f, "allOf", all),
            Condition::Expression(expr) => write!(f, "expression({})", expr.name()),
        }
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, name: &str, items: &[Condition]) -> fmt::Result {
    write!(f, "{}(", name)?;
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", item)?;
    }
    write!(f, ")")
}

/// AND over the list, stopping at the first unmet predicate
pub fn evaluate(conditions: &[Condition], ctx: &RunContext) -> bool {
    first_unmet(conditions, ctx).is_none()
}

/// The first predicate that does not hold, if any
pub fn first_unmet<'a>(conditions: &'a [Condition], ctx: &RunContext) -> Option<&'a Condition> {
    conditions.iter().find(|c| !c.matches(ctx))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::context::{ParameterDecl, BUILD_IMAGES, RUN_TESTS};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn context(branch: &str) -> RunContext {
        RunContext::builder(branch, "proj/main")
            .declared(&ParameterDecl::standard())
            .cause(BuildCause::ScmChange)
            .build()
    }

    #[test]
    fn test_empty_list_holds() {
        assert!(evaluate(&[], &context("develop")));
    }

    #[test]
    fn test_branch_predicates() {
        let ctx = context("release/2.1");
        assert!(Condition::branch_glob("release/*").matches(&ctx));
        assert!(!Condition::branch("develop").matches(&ctx));
        assert!(Condition::negate(Condition::branch("develop")).matches(&ctx));
    }

    #[test]
    fn test_param_equals_uses_resolved_defaults() {
        let ctx = context("feature/x");
        assert!(Condition::param(RUN_TESTS, ParamValue::Bool(true)).matches(&ctx));
        assert!(!Condition::param(BUILD_IMAGES, ParamValue::Bool(true)).matches(&ctx));
        assert!(!Condition::param("missing", ParamValue::Bool(false)).matches(&ctx));
    }

    #[test]
    fn test_any_of() {
        let ctx = context("develop");
        let cond = Condition::AnyOf(vec![
            Condition::branch("master"),
            Condition::branch("develop"),
        ]);
        assert!(cond.matches(&ctx));
        assert!(!Condition::AnyOf(vec![]).matches(&ctx));
    }

    #[test]
    fn test_and_list_short_circuits() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let conditions = vec![
            Condition::branch("master"),
            Condition::expression("counted", move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                true
            }),
        ];

        assert!(!evaluate(&conditions, &context("develop")));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_first_unmet_reports_predicate() {
        let conditions = vec![
            Condition::CauseIs(BuildCause::ScmChange),
            Condition::param(BUILD_IMAGES, ParamValue::Bool(true)),
        ];
        let unmet = first_unmet(&conditions, &context("develop")).unwrap();
        assert_eq!(unmet.to_string(), "params.build_images == true");
    }
}
