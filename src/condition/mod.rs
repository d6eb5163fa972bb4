//! Dynamically-typed condition evaluation against the [`crate::variable`] store.
//!
//! Grounded on `original_source/src/libinputactions/variables/VariableOperations.cpp`
//! (the per-type comparator dispatch table) and the `Condition`/`ConditionGroup`
//! split called for by spec.md §9's "tagged union, not virtual method table"
//! design note.

use std::cell::RefCell;
use std::sync::Arc;

use ahash::AHashMap;

use crate::variable::{TypedValue, VariableStore};

/// Comparison operators available to a `VariableComparison` condition
/// (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum ComparisonOp {
    Equal,
    NotEqual,
    LessThan,
    LessOrEqual,
    GreaterThan,
    GreaterOrEqual,
    Contains,
    Between,
    OneOf,
    RegexMatches,
}

/// How the members of a `Group` condition combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum GroupMode {
    All,
    Any,
    None,
}

/// A single value operand: a literal, a variable reference, or a shell
/// command whose (string) output is used.
#[derive(Debug, Clone)]
pub enum Value {
    /// A literal of any comparable type.
    Literal(TypedValue),
    /// A reference to another variable by name.
    Variable(String),
    /// A shell command; its stdout (trimmed) becomes a `TypedValue::String`.
    /// Evaluating this is the only path inside condition evaluation allowed
    /// to touch the process runner, and its result is cached within one
    /// [`EvalContext`] so repeated references to the same command in one
    /// condition tree run it only once.
    Command(String),
}

/// Discriminates what kind of condition a [`Condition`] node is.
#[derive(Debug, Clone)]
pub enum ConditionKind {
    /// Compares a named variable against one or more values.
    VariableComparison {
        /// Name of the variable to resolve.
        variable: String,
        /// Operator to apply.
        op: ComparisonOp,
        /// Right-hand operands.
        values: Vec<Value>,
    },
    /// Combines sub-conditions with [`GroupMode`].
    Group {
        /// Combination mode.
        mode: GroupMode,
        /// Sub-conditions.
        members: Vec<Condition>,
    },
}

/// A condition node: a tagged union (`kind`) plus the shared `negate` flag,
/// per spec.md §9's anti-inheritance note.
#[derive(Debug, Clone)]
pub struct Condition {
    /// Node payload.
    pub kind: ConditionKind,
    /// Whether the evaluated result should be inverted.
    pub negate: bool,
}

/// Runs external commands referenced by [`Value::Command`]. Implementations
/// must not block the event thread — spec.md §5 requires command values to
/// be scheduled onto the shared action lane before `execute`, so in practice
/// the only safe place to call [`Condition::evaluate`] with a real
/// `CommandRunner` is from inside an already-scheduled action job.
pub trait CommandRunner: Send + Sync {
    /// Runs `command` via a shell and returns its trimmed stdout, if it ran
    /// successfully.
    fn run(&self, command: &str) -> Option<String>;
}

/// A `CommandRunner` that never succeeds; for evaluating conditions that are
/// known not to reference commands (e.g. from the hot event-processing
/// path), without pretending command execution is safe there.
pub struct NoCommands;

impl CommandRunner for NoCommands {
    fn run(&self, _command: &str) -> Option<String> {
        None
    }
}

/// Context for one evaluation of a condition tree: the variable store to
/// resolve variables against, the command runner, and a per-evaluation
/// command-result cache.
///
/// Owns its collaborators through `Arc` rather than borrowing them, so a
/// context can be built fresh inside an [`crate::action::ActionExecutor`] job
/// closure without fighting the borrow checker across a thread boundary.
pub struct EvalContext {
    variables: Arc<VariableStore>,
    commands: Arc<dyn CommandRunner>,
    command_cache: RefCell<AHashMap<String, Option<TypedValue>>>,
}

impl EvalContext {
    /// Builds a fresh evaluation context. Each call to this constructor
    /// starts a new command cache, matching "cached within one evaluation
    /// context" (spec.md §4.7).
    pub fn new(variables: Arc<VariableStore>, commands: Arc<dyn CommandRunner>) -> Self {
        Self {
            variables,
            commands,
            command_cache: RefCell::new(AHashMap::new()),
        }
    }

    /// Builds a context sharing the same variable store and command runner
    /// but starting a fresh command cache — used when a condition must be
    /// re-evaluated from inside an [`crate::action::ActionExecutor`] job,
    /// which owns its own `EvalContext` rather than borrowing the caller's.
    pub fn fork(&self) -> Self {
        Self::new(self.variables.clone(), self.commands.clone())
    }

    fn resolve(&self, value: &Value) -> Option<TypedValue> {
        match value {
            Value::Literal(v) => Some(v.clone()),
            Value::Variable(name) => self.variables.get(name),
            Value::Command(cmd) => {
                if let Some(cached) = self.command_cache.borrow().get(cmd) {
                    return cached.clone();
                }
                let result = self.commands.run(cmd).map(TypedValue::String);
                self.command_cache
                    .borrow_mut()
                    .insert(cmd.clone(), result.clone());
                result
            }
        }
    }
}

impl Condition {
    /// Builds a non-negated `VariableComparison` condition.
    pub fn variable(variable: impl Into<String>, op: ComparisonOp, values: Vec<Value>) -> Self {
        Self {
            kind: ConditionKind::VariableComparison {
                variable: variable.into(),
                op,
                values,
            },
            negate: false,
        }
    }

    /// Builds a non-negated `Group` condition.
    pub fn group(mode: GroupMode, members: Vec<Condition>) -> Self {
        Self {
            kind: ConditionKind::Group { mode, members },
            negate: false,
        }
    }

    /// Returns `self` with `negate` flipped on.
    #[must_use]
    pub fn negated(mut self) -> Self {
        self.negate = !self.negate;
        self
    }

    /// Evaluates this condition tree against `ctx` (spec.md §4.7).
    pub fn evaluate(&self, ctx: &EvalContext) -> bool {
        let result = match &self.kind {
            ConditionKind::VariableComparison { variable, op, values } => {
                Self::evaluate_comparison(ctx, variable, *op, values)
            }
            ConditionKind::Group { mode, members } => {
                let mut results = members.iter().map(|m| m.evaluate(ctx));
                match mode {
                    GroupMode::All => results.all(|r| r),
                    GroupMode::Any => results.any(|r| r),
                    GroupMode::None => results.all(|r| !r),
                }
            }
        };
        result != self.negate
    }

    fn evaluate_comparison(
        ctx: &EvalContext,
        variable: &str,
        op: ComparisonOp,
        values: &[Value],
    ) -> bool {
        let Some(left) = ctx.variables.get(variable) else {
            return false;
        };
        let resolved: Vec<Option<TypedValue>> = values.iter().map(|v| ctx.resolve(v)).collect();

        match op {
            ComparisonOp::NotEqual => {
                !Self::evaluate_comparison(ctx, variable, ComparisonOp::Equal, values)
            }
            ComparisonOp::OneOf => resolved
                .iter()
                .any(|r| r.as_ref().is_some_and(|r| compare(&left, r, ComparisonOp::Equal))),
            ComparisonOp::Between => {
                resolved.len() >= 2
                    && match (&resolved[0], &resolved[1]) {
                        (Some(lo), Some(hi)) => {
                            compare(&left, lo, ComparisonOp::GreaterOrEqual)
                                && compare(&left, hi, ComparisonOp::LessOrEqual)
                        }
                        _ => false,
                    }
            }
            other => resolved
                .first()
                .and_then(|r| r.as_ref())
                .is_some_and(|right| compare(&left, right, other)),
        }
    }
}

/// Per-type comparator dispatch, grounded on `VariableOperations<T>::compare`.
fn compare(left: &TypedValue, right: &TypedValue, op: ComparisonOp) -> bool {
    use ComparisonOp::{Contains, Equal, GreaterOrEqual, GreaterThan, LessOrEqual, LessThan, RegexMatches};
    match (left, right) {
        (TypedValue::Number(l), TypedValue::Number(r)) => match op {
            Equal => l == r,
            GreaterThan => l > r,
            GreaterOrEqual => l >= r,
            LessThan => l < r,
            LessOrEqual => l <= r,
            _ => false,
        },
        (TypedValue::Bool(l), TypedValue::Bool(r)) => matches!(op, Equal) && l == r,
        (TypedValue::String(l), TypedValue::String(r)) => match op {
            Equal => l == r,
            Contains => l.contains(r.as_str()),
            RegexMatches => regex_matches(l, r),
            _ => false,
        },
        (TypedValue::Modifiers(l), TypedValue::Modifiers(r)) => match op {
            Equal => l == r,
            Contains => l.contains_mask(*r),
            _ => false,
        },
        (TypedValue::DeviceTypes(l), TypedValue::DeviceTypes(r)) => match op {
            Equal => l == r,
            Contains => l.contains_mask(*r),
            _ => false,
        },
        (TypedValue::Point(lx, ly), TypedValue::Point(rx, ry)) => {
            compare(&TypedValue::Number(*lx), &TypedValue::Number(*rx), op)
                && compare(&TypedValue::Number(*ly), &TypedValue::Number(*ry), op)
        }
        (TypedValue::CursorShape(l), TypedValue::CursorShape(r)) => matches!(op, Equal) && l == r,
        _ => false,
    }
}

/// Full regex matching (spec.md §4.7's `RegexMatches` op), grounded on the
/// original's `QRegularExpression::match` (`VariableOperations.cpp:178-179`).
/// An invalid pattern never matches rather than propagating a parse error
/// through the comparison path.
fn regex_matches(haystack: &str, pattern: &str) -> bool {
    regex::Regex::new(pattern).is_ok_and(|re| re.is_match(haystack))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variable::VariableStore;

    #[test]
    fn not_equal_is_negation_of_equal() {
        let mut store = VariableStore::new();
        store.register_local("x");
        store.set("x", Some(TypedValue::Number(1.0)));
        let ctx = EvalContext::new(Arc::new(store), Arc::new(NoCommands));

        let eq = Condition::variable("x", ComparisonOp::Equal, vec![Value::Literal(TypedValue::Number(1.0))]);
        let ne = Condition::variable("x", ComparisonOp::NotEqual, vec![Value::Literal(TypedValue::Number(1.0))]);
        assert_eq!(eq.evaluate(&ctx), !ne.evaluate(&ctx));
    }

    #[test]
    fn negated_group_none_matches_scenario_5() {
        let mut store = VariableStore::new();
        store.register_local("window_fullscreen");
        store.register_local("window_class");
        store.set("window_fullscreen", Some(TypedValue::Bool(false)));
        store.set("window_class", Some(TypedValue::String("firefox".into())));
        let ctx = EvalContext::new(Arc::new(store), Arc::new(NoCommands));

        let cond = Condition::group(
            GroupMode::None,
            vec![
                Condition::variable("window_fullscreen", ComparisonOp::Equal, vec![Value::Literal(TypedValue::Bool(true))]),
                Condition::variable(
                    "window_class",
                    ComparisonOp::RegexMatches,
                    vec![Value::Literal(TypedValue::String("^zoom$".into()))],
                ),
            ],
        );
        assert!(cond.evaluate(&ctx));
    }

    #[test]
    fn between_requires_two_values() {
        let mut store = VariableStore::new();
        store.register_local("n");
        store.set("n", Some(TypedValue::Number(5.0)));
        let ctx = EvalContext::new(Arc::new(store), Arc::new(NoCommands));

        let cond = Condition::variable(
            "n",
            ComparisonOp::Between,
            vec![Value::Literal(TypedValue::Number(0.0)), Value::Literal(TypedValue::Number(10.0))],
        );
        assert!(cond.evaluate(&ctx));

        let cond_oor = Condition::variable(
            "n",
            ComparisonOp::Between,
            vec![Value::Literal(TypedValue::Number(6.0)), Value::Literal(TypedValue::Number(10.0))],
        );
        assert!(!cond_oor.evaluate(&ctx));
    }

    #[test]
    fn command_result_is_cached_within_one_context() {
        use std::sync::atomic::{AtomicU32, Ordering};

        struct CountingRunner(AtomicU32);
        impl CommandRunner for CountingRunner {
            fn run(&self, _command: &str) -> Option<String> {
                self.0.fetch_add(1, Ordering::SeqCst);
                Some("ok".to_owned())
            }
        }

        let mut store = VariableStore::new();
        store.register_local("always");
        store.set("always", Some(TypedValue::String("ok".into())));
        let runner = Arc::new(CountingRunner(AtomicU32::new(0)));
        let ctx = EvalContext::new(Arc::new(store), runner.clone());

        let cond = Condition::group(
            GroupMode::All,
            vec![
                Condition::variable("always", ComparisonOp::Equal, vec![Value::Command("echo ok".into())]),
                Condition::variable("always", ComparisonOp::Equal, vec![Value::Command("echo ok".into())]),
            ],
        );
        assert!(cond.evaluate(&ctx));
        assert_eq!(runner.0.load(Ordering::SeqCst), 1);
    }
}
