//! In-memory fake host document (testing and local development)
//!
//! `MemoryDocument` satisfies the full `HostDocument` contract without any
//! external application: snapshot-based transactions, transaction groups
//! that undo committed inner transactions, and a deterministic state digest
//! over canonically serialized elements.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::capability::HostDocument;
use crate::error::{HostError, HostResult};
use crate::model::{ElementId, ElementRef, InstanceSpec, ParamValue, Parameter, StateDigest};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ElementRecord {
    category: String,
    type_name: String,
    name: String,
    parameters: BTreeMap<String, ParameterRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ParameterRecord {
    value: ParamValue,
    read_only: bool,
}

/// Copy of the mutable element state, taken at transaction/group start.
#[derive(Debug, Clone)]
struct Snapshot {
    elements: BTreeMap<u64, ElementRecord>,
    next_id: u64,
}

#[derive(Debug, Default)]
struct DocState {
    elements: BTreeMap<u64, ElementRecord>,
    next_id: u64,
    selection: Vec<ElementId>,
    catalog: BTreeMap<String, Vec<String>>,
    messages: Vec<(String, String)>,
    transaction: Option<(String, Snapshot)>,
    group: Option<(String, Snapshot)>,
}

impl DocState {
    fn snapshot(&self) -> Snapshot {
        Snapshot {
            elements: self.elements.clone(),
            next_id: self.next_id,
        }
    }

    fn restore(&mut self, snapshot: Snapshot) {
        self.elements = snapshot.elements;
        self.next_id = snapshot.next_id;
    }

    fn require_transaction(&self) -> HostResult<()> {
        if self.transaction.is_none() {
            return Err(HostError::NoActiveTransaction);
        }
        Ok(())
    }

    fn element_ref(&self, id: u64, record: &ElementRecord) -> ElementRef {
        ElementRef {
            id: ElementId(id),
            category: record.category.clone(),
            type_name: record.type_name.clone(),
            name: record.name.clone(),
        }
    }
}

/// In-memory host document backed by a `Mutex<DocState>`.
#[derive(Debug, Default)]
pub struct MemoryDocument {
    state: Mutex<DocState>,
}

impl MemoryDocument {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register catalog types for a category (builder, test setup).
    pub fn with_catalog(self, category: impl Into<String>, types: &[&str]) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            state
                .catalog
                .insert(category.into(), types.iter().map(|s| s.to_string()).collect());
        }
        self
    }

    /// Insert an element directly, bypassing transactions (test setup only).
    pub fn seed_element(
        &self,
        category: &str,
        type_name: &str,
        name: &str,
        parameters: Vec<Parameter>,
    ) -> ElementId {
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let id = state.next_id;
        let record = ElementRecord {
            category: category.to_string(),
            type_name: type_name.to_string(),
            name: name.to_string(),
            parameters: parameters
                .into_iter()
                .map(|p| {
                    (
                        p.name,
                        ParameterRecord {
                            value: p.value,
                            read_only: p.read_only,
                        },
                    )
                })
                .collect(),
        };
        state.elements.insert(id, record);
        ElementId(id)
    }

    /// Replace the current UI selection (test setup only).
    pub fn set_selection(&self, ids: Vec<ElementId>) {
        let mut state = self.state.lock().unwrap();
        state.selection = ids;
    }

    /// Messages shown so far, in order.
    pub fn messages(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().messages.clone()
    }

    /// Number of elements currently in the document.
    pub fn element_count(&self) -> usize {
        self.state.lock().unwrap().elements.len()
    }
}

#[async_trait]
impl HostDocument for MemoryDocument {
    async fn selected_elements(&self) -> HostResult<Vec<ElementRef>> {
        let state = self.state.lock().unwrap();
        let mut refs = Vec::new();
        for id in &state.selection {
            if let Some(record) = state.elements.get(&id.0) {
                refs.push(state.element_ref(id.0, record));
            }
        }
        Ok(refs)
    }

    async fn elements_by_category(&self, category: &str) -> HostResult<Vec<ElementRef>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .elements
            .iter()
            .filter(|(_, r)| r.category == category)
            .map(|(id, r)| state.element_ref(*id, r))
            .collect())
    }

    async fn elements_by_type(&self, type_name: &str) -> HostResult<Vec<ElementRef>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .elements
            .iter()
            .filter(|(_, r)| r.type_name == type_name)
            .map(|(id, r)| state.element_ref(*id, r))
            .collect())
    }

    async fn element_parameters(&self, element: ElementId) -> HostResult<Vec<Parameter>> {
        let state = self.state.lock().unwrap();
        let record = state
            .elements
            .get(&element.0)
            .ok_or(HostError::ElementNotFound(element))?;
        Ok(record
            .parameters
            .iter()
            .map(|(name, p)| Parameter {
                name: name.clone(),
                value: p.value.clone(),
                read_only: p.read_only,
            })
            .collect())
    }

    async fn set_parameter(
        &self,
        element: ElementId,
        name: &str,
        value: ParamValue,
    ) -> HostResult<()> {
        let mut state = self.state.lock().unwrap();
        state.require_transaction()?;
        let record = state
            .elements
            .get_mut(&element.0)
            .ok_or(HostError::ElementNotFound(element))?;
        let param = record
            .parameters
            .get_mut(name)
            .ok_or_else(|| HostError::ParameterNotFound {
                element,
                name: name.to_string(),
            })?;
        if param.read_only {
            return Err(HostError::ReadOnlyParameter {
                element,
                name: name.to_string(),
            });
        }
        param.value = value;
        Ok(())
    }

    async fn create_instance(&self, spec: InstanceSpec) -> HostResult<ElementId> {
        let mut state = self.state.lock().unwrap();
        state.require_transaction()?;
        let types = state
            .catalog
            .get(&spec.category)
            .ok_or_else(|| HostError::UnknownCategory(spec.category.clone()))?;
        if !types.contains(&spec.type_name) {
            return Err(HostError::UnknownType {
                category: spec.category.clone(),
                type_name: spec.type_name.clone(),
            });
        }
        state.next_id += 1;
        let id = state.next_id;
        state.elements.insert(
            id,
            ElementRecord {
                category: spec.category,
                type_name: spec.type_name,
                name: spec.name,
                parameters: spec
                    .parameters
                    .into_iter()
                    .map(|p| {
                        (
                            p.name,
                            ParameterRecord {
                                value: p.value,
                                read_only: p.read_only,
                            },
                        )
                    })
                    .collect(),
            },
        );
        Ok(ElementId(id))
    }

    async fn delete_element(&self, element: ElementId) -> HostResult<()> {
        let mut state = self.state.lock().unwrap();
        state.require_transaction()?;
        state
            .elements
            .remove(&element.0)
            .ok_or(HostError::ElementNotFound(element))?;
        state.selection.retain(|id| *id != element);
        Ok(())
    }

    async fn show_message(&self, title: &str, body: &str) -> HostResult<()> {
        let mut state = self.state.lock().unwrap();
        state.messages.push((title.to_string(), body.to_string()));
        Ok(())
    }

    async fn catalog_types(&self, category: &str) -> HostResult<Vec<String>> {
        let state = self.state.lock().unwrap();
        state
            .catalog
            .get(category)
            .cloned()
            .ok_or_else(|| HostError::UnknownCategory(category.to_string()))
    }

    async fn begin_transaction(&self, name: &str) -> HostResult<()> {
        let mut state = self.state.lock().unwrap();
        if let Some((active, _)) = &state.transaction {
            return Err(HostError::TransactionInProgress(active.clone()));
        }
        let snapshot = state.snapshot();
        state.transaction = Some((name.to_string(), snapshot));
        Ok(())
    }

    async fn commit_transaction(&self) -> HostResult<()> {
        let mut state = self.state.lock().unwrap();
        state
            .transaction
            .take()
            .ok_or(HostError::NoActiveTransaction)?;
        Ok(())
    }

    async fn rollback_transaction(&self) -> HostResult<()> {
        let mut state = self.state.lock().unwrap();
        let (_, snapshot) = state
            .transaction
            .take()
            .ok_or(HostError::NoActiveTransaction)?;
        state.restore(snapshot);
        Ok(())
    }

    async fn begin_group(&self, name: &str) -> HostResult<()> {
        let mut state = self.state.lock().unwrap();
        if let Some((active, _)) = &state.group {
            return Err(HostError::GroupInProgress(active.clone()));
        }
        let snapshot = state.snapshot();
        state.group = Some((name.to_string(), snapshot));
        Ok(())
    }

    async fn commit_group(&self) -> HostResult<()> {
        let mut state = self.state.lock().unwrap();
        state.group.take().ok_or(HostError::NoActiveGroup)?;
        Ok(())
    }

    async fn rollback_group(&self) -> HostResult<()> {
        let mut state = self.state.lock().unwrap();
        let (_, snapshot) = state.group.take().ok_or(HostError::NoActiveGroup)?;
        // An aborted inner transaction may still be open; discard it.
        state.transaction = None;
        state.restore(snapshot);
        Ok(())
    }

    async fn state_digest(&self) -> HostResult<StateDigest> {
        let state = self.state.lock().unwrap();
        let canonical = serde_json::to_vec(&state.elements)?;
        Ok(StateDigest::from_bytes(&canonical))
    }
}
