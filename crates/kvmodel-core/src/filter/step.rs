use crate::filter::condition::Conditions;
use std::{
    fmt::{self, Display},
    rc::Rc,
};

///
/// SetOp
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SetOp {
    Intersect,
    Union,
    Diff,
}

impl SetOp {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Intersect => "intersect",
            Self::Union => "union",
            Self::Diff => "diff",
        }
    }
}

impl Display for SetOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

///
/// SortDirection
///

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

///
/// SortKey
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SortKey {
    pub attribute: String,
    pub direction: SortDirection,
}

impl SortKey {
    #[must_use]
    pub fn asc(attribute: impl Into<String>) -> Self {
        Self {
            attribute: attribute.into(),
            direction: SortDirection::Asc,
        }
    }

    #[must_use]
    pub fn desc(attribute: impl Into<String>) -> Self {
        Self {
            attribute: attribute.into(),
            direction: SortDirection::Desc,
        }
    }
}

impl From<&str> for SortKey {
    fn from(attribute: &str) -> Self {
        Self::asc(attribute)
    }
}

impl From<String> for SortKey {
    fn from(attribute: String) -> Self {
        Self::asc(attribute)
    }
}

impl From<(&str, SortDirection)> for SortKey {
    fn from((attribute, direction): (&str, SortDirection)) -> Self {
        Self {
            attribute: attribute.to_string(),
            direction,
        }
    }
}

///
/// Step
///
/// Set   → combine the working set with the ids matching `conditions`
/// List  → window the (ordered) working set
/// Sort  → order the working set by attribute values
/// Empty → the working set becomes empty
///

#[derive(Clone, Debug)]
pub enum Step {
    Set { op: SetOp, conditions: Conditions },
    List { offset: usize, limit: Option<usize> },
    Sort { keys: Vec<SortKey> },
    Empty,
}

impl Step {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Set { op, .. } => op.as_str(),
            Self::List { .. } => "list",
            Self::Sort { .. } => "sort",
            Self::Empty => "empty",
        }
    }
}

///
/// StepList
///
/// Persistent, append-only list of steps. Pushing shares the existing
/// prefix, so every derived filter is cheap and leaves its parent untouched.
///

#[derive(Clone, Debug, Default)]
pub(crate) struct StepList {
    head: Option<Rc<StepNode>>,
    len: usize,
}

#[derive(Debug)]
struct StepNode {
    step: Step,
    prev: Option<Rc<StepNode>>,
}

impl StepList {
    #[must_use]
    pub(crate) fn push(&self, step: Step) -> Self {
        Self {
            head: Some(Rc::new(StepNode {
                step,
                prev: self.head.clone(),
            })),
            len: self.len + 1,
        }
    }

    pub(crate) const fn len(&self) -> usize {
        self.len
    }

    pub(crate) const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Steps in the order they were pushed.
    pub(crate) fn to_vec(&self) -> Vec<&Step> {
        let mut steps = Vec::with_capacity(self.len);
        let mut node = self.head.as_deref();
        while let Some(current) = node {
            steps.push(&current.step);
            node = current.prev.as_deref();
        }
        steps.reverse();

        steps
    }
}
