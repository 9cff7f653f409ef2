//! The host document capability trait.
//!
//! `HostDocument` is the narrow contract between the execution engine and
//! whatever application owns the live design model. Host adapters marshal
//! these calls onto the host's own execution context; callers must treat
//! every method as a potential suspension point.
//!
//! Guarantees required of an implementation:
//! - Mutating calls (`set_parameter`, `create_instance`, `delete_element`)
//!   fail with `HostError::NoActiveTransaction` outside a transaction.
//! - `rollback_transaction` restores the element state exactly as it was at
//!   `begin_transaction`.
//! - A transaction group brackets any number of inner transactions;
//!   `rollback_group` undoes all of them, including committed ones.
//! - `state_digest` is a pure function of element state: equal states yield
//!   equal digests.

use async_trait::async_trait;

use crate::error::HostResult;
use crate::model::{ElementId, ElementRef, InstanceSpec, ParamValue, Parameter, StateDigest};

/// Capability surface of a live host document.
#[async_trait]
pub trait HostDocument: Send + Sync {
    /// Elements currently selected in the host UI.
    async fn selected_elements(&self) -> HostResult<Vec<ElementRef>>;

    /// All elements in the given category (e.g. "Walls").
    async fn elements_by_category(&self, category: &str) -> HostResult<Vec<ElementRef>>;

    /// All elements of the given type (e.g. "Generic - 6\"").
    async fn elements_by_type(&self, type_name: &str) -> HostResult<Vec<ElementRef>>;

    /// All parameters of one element.
    async fn element_parameters(&self, element: ElementId) -> HostResult<Vec<Parameter>>;

    /// Write a parameter value. Fails if the parameter is absent or read-only.
    async fn set_parameter(
        &self,
        element: ElementId,
        name: &str,
        value: ParamValue,
    ) -> HostResult<()>;

    /// Create a new element instance, returning its id.
    async fn create_instance(&self, spec: InstanceSpec) -> HostResult<ElementId>;

    /// Delete an element (undo path).
    async fn delete_element(&self, element: ElementId) -> HostResult<()>;

    /// Show a message to the host user.
    async fn show_message(&self, title: &str, body: &str) -> HostResult<()>;

    /// Type names available in the document's catalog for a category.
    async fn catalog_types(&self, category: &str) -> HostResult<Vec<String>>;

    /// Begin a named transaction. Fails if one is already active.
    async fn begin_transaction(&self, name: &str) -> HostResult<()>;

    /// Commit the active transaction.
    async fn commit_transaction(&self) -> HostResult<()>;

    /// Roll the active transaction back to its start state.
    async fn rollback_transaction(&self) -> HostResult<()>;

    /// Begin a named transaction group bracketing inner transactions.
    async fn begin_group(&self, name: &str) -> HostResult<()>;

    /// Commit the active group, keeping all inner transactions.
    async fn commit_group(&self) -> HostResult<()>;

    /// Roll the active group back, undoing all inner transactions.
    async fn rollback_group(&self) -> HostResult<()>;

    /// Digest of the current element state.
    async fn state_digest(&self) -> HostResult<StateDigest>;
}
