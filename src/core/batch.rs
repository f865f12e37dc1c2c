/*!
 * Batch Status
 * Per-element results for operations that accept parallel input arrays
 */

use super::errors::BrokerError;
use super::types::StatusCode;
use serde::{Deserialize, Serialize};

/// Parallel result array: entry `i` is the outcome for input element `i`
///
/// The overall call succeeded if a `BatchStatus` was returned at all;
/// individual elements may still have failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchStatus<T = ()> {
    entries: Vec<Result<T, BrokerError>>,
}

impl<T> BatchStatus<T> {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
        }
    }

    pub(crate) fn push(&mut self, entry: Result<T, BrokerError>) {
        self.entries.push(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Result<T, BrokerError>> {
        self.entries.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Result<T, BrokerError>> {
        self.entries.iter()
    }

    /// Status codes in input order
    pub fn statuses(&self) -> Vec<StatusCode> {
        self.entries
            .iter()
            .map(|e| match e {
                Ok(_) => StatusCode::OK,
                Err(err) => err.status(),
            })
            .collect()
    }

    pub fn all_succeeded(&self) -> bool {
        self.entries.iter().all(Result::is_ok)
    }

    pub fn failed_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_err()).count()
    }

    pub fn into_entries(self) -> Vec<Result<T, BrokerError>> {
        self.entries
    }
}

impl<T> FromIterator<Result<T, BrokerError>> for BatchStatus<T> {
    fn from_iter<I: IntoIterator<Item = Result<T, BrokerError>>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}
