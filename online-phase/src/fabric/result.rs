//! Defines the abstractions over the result of an MPC operation, a single
//! write cell that instructions resolve and later steps read

use std::{
    fmt::{Debug, Formatter, Result as FmtResult},
    sync::{Arc, OnceLock},
};

use crate::error::MpcError;

/// An identifier for a result, unique within a session
pub type ResultId = usize;
/// An identifier for a session, unique within a process
pub type SessionId = u64;

// ------------------
// | Deferred Trait |
// ------------------

/// A type erased view of a result, used to express the dependencies of an
/// instruction
pub trait Deferred: Send + Sync {
    /// The id of the result
    fn id(&self) -> ResultId;
    /// The session that allocated the result
    fn session_id(&self) -> SessionId;
    /// Whether the result has been written
    fn is_resolved(&self) -> bool;
}

// ---------------
// | Handle Type |
// ---------------

/// A handle to the result of an MPC operation
///
/// The handle acts as a pointer to a possibly unresolved value. The value is
/// written exactly once, by the instruction or step that produces it, and may
/// be read any number of times after. Clones of a handle share the same cell
pub struct ResultHandle<T> {
    /// The id of the result
    pub(crate) id: ResultId,
    /// The session the result was allocated within
    pub(crate) session: SessionId,
    /// The cell the result is written to when it becomes available
    pub(crate) cell: Arc<OnceLock<T>>,
}

impl<T> Clone for ResultHandle<T> {
    fn clone(&self) -> Self {
        Self { id: self.id, session: self.session, cell: self.cell.clone() }
    }
}

impl<T> Debug for ResultHandle<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("ResultHandle")
            .field("id", &self.id)
            .field("session", &self.session)
            .field("resolved", &self.cell.get().is_some())
            .finish()
    }
}

impl<T> ResultHandle<T> {
    /// Constructor
    pub(crate) fn new(id: ResultId, session: SessionId) -> Self {
        Self { id, session, cell: Arc::new(OnceLock::new()) }
    }

    /// Get the id of the result
    pub fn id(&self) -> ResultId {
        self.id
    }

    /// Borrow the value if it has been resolved
    pub fn get(&self) -> Option<&T> {
        self.cell.get()
    }

    /// Whether the value has been resolved
    pub fn is_resolved(&self) -> bool {
        self.cell.get().is_some()
    }

    /// Write the value of the result
    ///
    /// Errors if the result was already resolved
    pub fn resolve(&self, value: T) -> Result<(), MpcError> {
        self.cell.set(value).map_err(|_| MpcError::DoubleResolution(self.id))
    }
}

impl<T: Clone> ResultHandle<T> {
    /// Get a copy of the value if it has been resolved
    pub fn value(&self) -> Option<T> {
        self.cell.get().cloned()
    }

    /// Get a copy of the value, treating an unresolved result as a dangling
    /// dependency of the caller
    pub fn resolved_value(&self) -> Result<T, MpcError> {
        self.value().ok_or(MpcError::DanglingDependency(self.id))
    }
}

impl<T: Send + Sync> Deferred for ResultHandle<T> {
    fn id(&self) -> ResultId {
        self.id
    }

    fn session_id(&self) -> SessionId {
        self.session
    }

    fn is_resolved(&self) -> bool {
        ResultHandle::is_resolved(self)
    }
}

#[cfg(test)]
mod test {
    use crate::error::MpcError;

    use super::ResultHandle;

    /// Tests that an unresolved handle reads as empty rather than panicking
    #[test]
    fn test_unresolved_read() {
        let handle: ResultHandle<u64> = ResultHandle::new(7, 0);

        assert!(!handle.is_resolved());
        assert_eq!(handle.value(), None);
        assert_eq!(handle.resolved_value(), Err(MpcError::DanglingDependency(7)));
    }

    /// Tests that clones observe the single write and a second write fails
    #[test]
    fn test_single_write() {
        let handle: ResultHandle<u64> = ResultHandle::new(1, 0);
        let clone = handle.clone();

        handle.resolve(5).unwrap();
        assert_eq!(clone.get(), Some(&5));
        assert_eq!(clone.resolve(6), Err(MpcError::DoubleResolution(1)));
        assert_eq!(handle.value(), Some(5));
    }
}
