//! Predicates
//!
//! Filter conditions with precise pushdown rules. A predicate is either a
//! structured comparison tree, which a relational backend can fold into a
//! native query, or an opaque closure, which always executes in-process.
//!
//! # Convertibility rules
//!
//! - `Cmp` with an operator in {Eq, Ne, Gt, Ge, Lt, Le} against a literal
//!   value converts to a native condition.
//! - `All` converts iff every child converts.
//! - `Fn` never converts.
//!
//! Unsupported shapes fall back to in-process execution; they are never
//! silently reinterpreted. Every predicate is also evaluable in-process,
//! so a filter produces the same rows whether or not it was pushed down.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use crate::value::Value;

/// Comparison operator for structured predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    /// Equal
    Eq,
    /// Not equal
    Ne,
    /// Greater than
    Gt,
    /// Greater than or equal
    Ge,
    /// Less than
    Lt,
    /// Less than or equal
    Le,
}

impl CmpOp {
    /// Operator symbol, as rendered in native queries.
    #[must_use]
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "<>",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Lt => "<",
            Self::Le => "<=",
        }
    }

    /// Apply the operator to an ordering between field value and literal.
    ///
    /// Incomparable values (`None` ordering, e.g. a missing field) never
    /// match, mirroring SQL null semantics.
    #[must_use]
    pub fn matches(&self, ordering: Option<Ordering>) -> bool {
        let Some(ordering) = ordering else {
            return false;
        };
        match self {
            Self::Eq => ordering == Ordering::Equal,
            Self::Ne => ordering != Ordering::Equal,
            Self::Gt => ordering == Ordering::Greater,
            Self::Ge => ordering != Ordering::Less,
            Self::Lt => ordering == Ordering::Less,
            Self::Le => ordering != Ordering::Greater,
        }
    }
}

impl fmt::Display for CmpOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

/// One field comparison, the unit a native query is built from.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    /// Field name on the record
    pub field: String,
    /// Comparison operator
    pub op: CmpOp,
    /// Literal to compare against
    pub value: Value,
}

impl Condition {
    /// Create a condition.
    #[must_use]
    pub fn new(field: impl Into<String>, op: CmpOp, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            op,
            value: value.into(),
        }
    }

    /// Evaluate the condition against a record.
    #[must_use]
    pub fn matches(&self, item: &Value) -> bool {
        let field_value = item.get(&self.field).unwrap_or(&Value::Null);
        self.op.matches(field_value.compare(&self.value))
    }
}

/// Opaque in-process predicate function.
pub type PredicateFn = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

/// A filter predicate.
#[derive(Clone)]
pub enum Predicate {
    /// Field comparison against a literal
    Cmp(Condition),
    /// Conjunction; matches when every child matches
    All(Vec<Predicate>),
    /// Opaque closure; never pushed down
    Fn(PredicateFn),
}

impl Predicate {
    /// Field comparison predicate.
    #[must_use]
    pub fn cmp(field: impl Into<String>, op: CmpOp, value: impl Into<Value>) -> Self {
        Self::Cmp(Condition::new(field, op, value))
    }

    /// `field = value`
    #[must_use]
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::cmp(field, CmpOp::Eq, value)
    }

    /// `field <> value`
    #[must_use]
    pub fn ne(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::cmp(field, CmpOp::Ne, value)
    }

    /// `field > value`
    #[must_use]
    pub fn gt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::cmp(field, CmpOp::Gt, value)
    }

    /// `field >= value`
    #[must_use]
    pub fn ge(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::cmp(field, CmpOp::Ge, value)
    }

    /// `field < value`
    #[must_use]
    pub fn lt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::cmp(field, CmpOp::Lt, value)
    }

    /// `field <= value`
    #[must_use]
    pub fn le(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::cmp(field, CmpOp::Le, value)
    }

    /// Conjunction of predicates.
    #[must_use]
    pub fn all(predicates: impl IntoIterator<Item = Predicate>) -> Self {
        Self::All(predicates.into_iter().collect())
    }

    /// Opaque closure predicate.
    #[must_use]
    pub fn func(f: impl Fn(&Value) -> bool + Send + Sync + 'static) -> Self {
        Self::Fn(Arc::new(f))
    }

    /// Whether the predicate can be folded into a native query.
    #[must_use]
    pub fn is_convertible(&self) -> bool {
        match self {
            Self::Cmp(_) => true,
            Self::All(children) => children.iter().all(Predicate::is_convertible),
            Self::Fn(_) => false,
        }
    }

    /// Flatten into native conditions; `None` when not convertible.
    #[must_use]
    pub fn to_conditions(&self) -> Option<Vec<Condition>> {
        match self {
            Self::Cmp(condition) => Some(vec![condition.clone()]),
            Self::All(children) => {
                let mut conditions = Vec::new();
                for child in children {
                    conditions.extend(child.to_conditions()?);
                }
                Some(conditions)
            }
            Self::Fn(_) => None,
        }
    }

    /// Evaluate the predicate against a record.
    #[must_use]
    pub fn matches(&self, item: &Value) -> bool {
        match self {
            Self::Cmp(condition) => condition.matches(item),
            Self::All(children) => children.iter().all(|child| child.matches(item)),
            Self::Fn(f) => f(item),
        }
    }
}

impl fmt::Debug for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cmp(condition) => write!(
                f,
                "Cmp({} {} {:?})",
                condition.field, condition.op, condition.value
            ),
            Self::All(children) => f.debug_tuple("All").field(children).finish(),
            Self::Fn(_) => write!(f, "Fn(<closure>)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(age: i64) -> Value {
        Value::record([("name", Value::from("Alice")), ("age", Value::from(age))])
    }

    #[test]
    fn test_cmp_matches() {
        let pred = Predicate::ge("age", 30);
        assert!(!pred.matches(&user(25)));
        assert!(pred.matches(&user(30)));
        assert!(pred.matches(&user(31)));
    }

    #[test]
    fn test_missing_field_never_matches() {
        let pred = Predicate::eq("email", "a@b.c");
        assert!(!pred.matches(&user(25)));

        // Ne on a missing field is also false, mirroring SQL null semantics.
        let pred = Predicate::ne("email", "a@b.c");
        assert!(!pred.matches(&user(25)));
    }

    #[test]
    fn test_all_conjunction() {
        let pred = Predicate::all([Predicate::ge("age", 18), Predicate::eq("name", "Alice")]);
        assert!(pred.matches(&user(25)));
        assert!(!pred.matches(&user(17)));
    }

    #[test]
    fn test_convertibility_rules() {
        assert!(Predicate::ge("age", 18).is_convertible());
        assert!(Predicate::all([Predicate::ge("age", 18), Predicate::lt("age", 65)])
            .is_convertible());

        let opaque = Predicate::func(|v| v.get("age").is_some());
        assert!(!opaque.is_convertible());
        assert!(!Predicate::all([Predicate::ge("age", 18), opaque]).is_convertible());
    }

    #[test]
    fn test_to_conditions_flattens_conjunctions() {
        let pred = Predicate::all([
            Predicate::ge("age", 18),
            Predicate::all([Predicate::lt("age", 65), Predicate::eq("active", true)]),
        ]);

        let conditions = pred.to_conditions().unwrap();
        assert_eq!(conditions.len(), 3);
        assert_eq!(conditions[0].field, "age");
        assert_eq!(conditions[2].op, CmpOp::Eq);

        assert!(Predicate::func(|_| true).to_conditions().is_none());
    }

    #[test]
    fn test_pushed_and_in_process_agree() {
        let items = [user(17), user(25), user(65)];
        let pred = Predicate::all([Predicate::ge("age", 18), Predicate::le("age", 64)]);
        let conditions = pred.to_conditions().unwrap();

        for item in &items {
            let by_conditions = conditions.iter().all(|c| c.matches(item));
            assert_eq!(by_conditions, pred.matches(item));
        }
    }
}
