#![forbid(unsafe_code)]

//! Error types for the connection layer.
//!
//! Two layers of failure exist. [`MapError`] is what a user-supplied mapper
//! returns when it cannot derive props from the inputs it was given.
//! [`ConnectError`] is the controller-level error the embedder sees: it names
//! the component and the mapper that failed, and can carry a correlated
//! earlier error when a failure first surfaced during a store notification
//! and is rethrown from the render path.
//!
//! All variants are `Clone` so an error caught during a notification pass
//! can be stored and surfaced again later without loss.

use std::borrow::Cow;
use std::fmt;

use thiserror::Error;

/// Failure returned by a user-supplied mapper.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct MapError {
    message: Cow<'static, str>,
}

impl MapError {
    pub fn new(message: impl Into<Cow<'static, str>>) -> Self {
        Self {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Which of the three mappers produced an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapperKind {
    State,
    Dispatch,
    Merge,
}

impl fmt::Display for MapperKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MapperKind::State => "state",
            MapperKind::Dispatch => "dispatch",
            MapperKind::Merge => "merge",
        })
    }
}

/// Controller-level error surfaced to the embedder.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConnectError {
    /// No store reachable: neither passed directly nor provided by an
    /// ancestor context.
    #[error(
        "could not find a store while connecting `{component}`: \
         pass one directly or mount a provider above it"
    )]
    MissingStore { component: Cow<'static, str> },

    /// A mapper factory resolved to yet another factory.
    #[error("{mapper} mapper factory for `{component}` resolved to another factory")]
    InvalidMapperResult {
        component: Cow<'static, str>,
        mapper: MapperKind,
    },

    /// A user mapper failed while deriving props.
    #[error("{mapper} mapper for `{component}` failed: {source}")]
    MapperFailed {
        component: Cow<'static, str>,
        mapper: MapperKind,
        source: MapError,
    },

    /// A render-path failure annotated with the error first caught during a
    /// store notification, so the embedder sees both.
    #[error("{inner}; probable cause, first seen during a store notification: {earlier}")]
    Correlated {
        inner: Box<ConnectError>,
        earlier: Box<ConnectError>,
    },
}

impl ConnectError {
    /// Attach an earlier subscription-time error, if one exists, to a
    /// render-path error.
    #[must_use]
    pub fn correlated_with(self, earlier: Option<ConnectError>) -> Self {
        match earlier {
            Some(earlier) => ConnectError::Correlated {
                inner: Box::new(self),
                earlier: Box::new(earlier),
            },
            None => self,
        }
    }
}
