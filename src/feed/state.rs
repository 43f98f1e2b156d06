//! Fetch State Module
//!
//! The observable state of a feed, as rendered by a list screen.

use crate::error::FetchError;

// == Fetch State ==
/// What a list-backed screen should currently show.
///
/// `FetchingNextPage` and `Failure` carry the items loaded so far so a
/// screen can keep them visible with a trailing spinner or error row.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchState<T> {
    Empty,
    Loading,
    FetchingNextPage {
        items: Vec<T>,
    },
    Success {
        items: Vec<T>,
    },
    Failure {
        error: FetchError,
        items: Vec<T>,
    },
}

impl<T> Default for FetchState<T> {
    fn default() -> Self {
        FetchState::Empty
    }
}

impl<T> FetchState<T> {
    /// Items currently on screen.
    pub fn items(&self) -> &[T] {
        match self {
            FetchState::Empty | FetchState::Loading => &[],
            FetchState::FetchingNextPage { items }
            | FetchState::Success { items }
            | FetchState::Failure { items, .. } => items,
        }
    }

    pub fn error(&self) -> Option<&FetchError> {
        match self {
            FetchState::Failure { error, .. } => Some(error),
            _ => None,
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, FetchState::Loading)
    }

    pub fn is_fetching_next_page(&self) -> bool {
        matches!(self, FetchState::FetchingNextPage { .. })
    }

    /// True while a load of either kind is running.
    pub fn is_in_progress(&self) -> bool {
        self.is_loading() || self.is_fetching_next_page()
    }

    /// Short lowercase name, used in API responses and logs.
    pub fn label(&self) -> &'static str {
        match self {
            FetchState::Empty => "empty",
            FetchState::Loading => "loading",
            FetchState::FetchingNextPage { .. } => "fetching_next_page",
            FetchState::Success { .. } => "success",
            FetchState::Failure { .. } => "failure",
        }
    }
}
