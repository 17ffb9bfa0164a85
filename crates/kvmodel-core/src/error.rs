use crate::{
    config::ConfigError,
    entity::RecordError,
    filter::FilterError,
    key::KeyError,
    lock::LockError,
    model::ModelError,
    store::StoreError,
    value::CoercionError,
};
use std::fmt;
use thiserror::Error as ThisError;

///
/// Error
///
/// Every failure the core can surface. Module errors convert in with `?`;
/// callers that only need to branch coarsely use `class()`.
///

#[remain::sorted]
#[derive(Debug, ThisError)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Filter(#[from] FilterError),

    #[error(transparent)]
    Key(#[from] KeyError),

    #[error(transparent)]
    Lock(#[from] LockError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Record(#[from] RecordError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Value(#[from] CoercionError),
}

impl Error {
    /// Coarse classification of this error.
    #[must_use]
    pub const fn class(&self) -> ErrorClass {
        match self {
            Self::Config(_) | Self::Model(_) | Self::Value(_) => ErrorClass::InvalidInput,
            Self::Filter(err) => match err {
                FilterError::UnknownAttribute { .. } | FilterError::InvalidValue { .. } => {
                    ErrorClass::InvalidInput
                }
                _ => ErrorClass::Unsupported,
            },
            Self::Key(_) => ErrorClass::Unsupported,
            Self::Lock(err) => match err {
                LockError::ClassConflict { .. } | LockError::NotAcquired { .. } => {
                    ErrorClass::Conflict
                }
                LockError::NotHeld => ErrorClass::InvalidInput,
            },
            Self::Record(err) => match err {
                RecordError::NotFound { .. } | RecordError::NotFoundMany { .. } => {
                    ErrorClass::NotFound
                }
                RecordError::UniqueViolation { .. } => ErrorClass::Conflict,
                RecordError::UnknownAssociation { .. } | RecordError::UnknownAttribute { .. } => {
                    ErrorClass::InvalidInput
                }
            },
            Self::Store(err) => match err {
                StoreError::Aborted => ErrorClass::Conflict,
                StoreError::Connectivity { .. } => ErrorClass::Unavailable,
                StoreError::Corrupt { .. } | StoreError::WrongType { .. } => ErrorClass::Corruption,
            },
        }
    }

    /// Module the error originated in.
    #[must_use]
    pub const fn origin(&self) -> ErrorOrigin {
        match self {
            Self::Config(_) => ErrorOrigin::Config,
            Self::Filter(_) => ErrorOrigin::Filter,
            Self::Key(_) => ErrorOrigin::Key,
            Self::Lock(_) => ErrorOrigin::Lock,
            Self::Model(_) => ErrorOrigin::Model,
            Self::Record(_) => ErrorOrigin::Record,
            Self::Store(_) => ErrorOrigin::Store,
            Self::Value(_) => ErrorOrigin::Value,
        }
    }
}

///
/// ErrorClass
/// Coarse runtime classification.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorClass {
    Conflict,
    Corruption,
    InvalidInput,
    NotFound,
    Unavailable,
    Unsupported,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Conflict => "conflict",
            Self::Corruption => "corruption",
            Self::InvalidInput => "invalid_input",
            Self::NotFound => "not_found",
            Self::Unavailable => "unavailable",
            Self::Unsupported => "unsupported",
        };
        write!(f, "{label}")
    }
}

///
/// ErrorOrigin
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorOrigin {
    Config,
    Filter,
    Key,
    Lock,
    Model,
    Record,
    Store,
    Value,
}

impl fmt::Display for ErrorOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Config => "config",
            Self::Filter => "filter",
            Self::Key => "key",
            Self::Lock => "lock",
            Self::Model => "model",
            Self::Record => "record",
            Self::Store => "store",
            Self::Value => "value",
        };
        write!(f, "{label}")
    }
}
