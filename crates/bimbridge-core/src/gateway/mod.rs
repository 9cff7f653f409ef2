//! Isolation gateway: the sole privileged endpoint for script code
//!
//! Hot-loaded and registered scripts never hold host handles; every
//! document touch goes through this gateway. Calls are serialized (one at a
//! time) so two scripts can never race on the same document transaction,
//! and every mutating call runs inside its own transaction on the trusted
//! side. Transaction groups — used by the hot-loader to make a whole script
//! atomic — are only reachable from inside this crate.
//!
//! `dispatch` is the wire entry point for out-of-process engines: a tagged
//! `CapabilityRequest` in, a `CapabilityResponse` out. Parameter payloads
//! arrive as raw JSON and are converted with the checked `ParamValue`
//! boundary conversion.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use bimbridge_host::{ElementId, ElementRef, HostDocument, InstanceSpec, ParamValue, Parameter};

use crate::domain::Result;

/// A capability call from the isolated side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum CapabilityRequest {
    GetSelectedElements,
    GetElementsByCategory { category: String },
    GetElementsByType { type_name: String },
    GetElementParameters { element_id: ElementId },
    SetElementParameter {
        element_id: ElementId,
        name: String,
        value: serde_json::Value,
    },
    CreateInstance { spec: InstanceSpec },
    ShowMessage { title: String, body: String },
}

/// Structured reply to a capability call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilityResponse {
    pub success: bool,
    #[serde(default)]
    pub data: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CapabilityResponse {
    fn ok(data: serde_json::Value) -> Self {
        Self {
            success: true,
            data,
            error: None,
        }
    }

    fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: serde_json::Value::Null,
            error: Some(error.into()),
        }
    }
}

/// The trusted gateway object.
pub struct IsolationGateway {
    document: Arc<dyn HostDocument>,
    call_lock: tokio::sync::Mutex<()>,
}

impl IsolationGateway {
    pub fn new(document: Arc<dyn HostDocument>) -> Self {
        Self {
            document,
            call_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub async fn selected_elements(&self) -> Result<Vec<ElementRef>> {
        let _serial = self.call_lock.lock().await;
        Ok(self.document.selected_elements().await?)
    }

    pub async fn elements_by_category(&self, category: &str) -> Result<Vec<ElementRef>> {
        let _serial = self.call_lock.lock().await;
        Ok(self.document.elements_by_category(category).await?)
    }

    pub async fn elements_by_type(&self, type_name: &str) -> Result<Vec<ElementRef>> {
        let _serial = self.call_lock.lock().await;
        Ok(self.document.elements_by_type(type_name).await?)
    }

    pub async fn element_parameters(&self, element: ElementId) -> Result<Vec<Parameter>> {
        let _serial = self.call_lock.lock().await;
        Ok(self.document.element_parameters(element).await?)
    }

    /// Write a parameter inside its own transaction.
    pub async fn set_element_parameter(
        &self,
        element: ElementId,
        name: &str,
        value: ParamValue,
    ) -> Result<()> {
        let _serial = self.call_lock.lock().await;
        self.document
            .begin_transaction("gateway: set_parameter")
            .await?;
        match self.document.set_parameter(element, name, value).await {
            Ok(()) => {
                self.document.commit_transaction().await?;
                Ok(())
            }
            Err(err) => {
                self.document.rollback_transaction().await?;
                Err(err.into())
            }
        }
    }

    /// Create an instance inside its own transaction.
    pub async fn create_instance(&self, spec: InstanceSpec) -> Result<ElementId> {
        let _serial = self.call_lock.lock().await;
        self.document
            .begin_transaction("gateway: create_instance")
            .await?;
        match self.document.create_instance(spec).await {
            Ok(id) => {
                self.document.commit_transaction().await?;
                Ok(id)
            }
            Err(err) => {
                self.document.rollback_transaction().await?;
                Err(err.into())
            }
        }
    }

    pub async fn show_message(&self, title: &str, body: &str) -> Result<()> {
        let _serial = self.call_lock.lock().await;
        Ok(self.document.show_message(title, body).await?)
    }

    /// Begin a transaction group bracketing one script run (hot-loader only).
    pub(crate) async fn begin_group(&self, name: &str) -> Result<()> {
        let _serial = self.call_lock.lock().await;
        Ok(self.document.begin_group(name).await?)
    }

    pub(crate) async fn commit_group(&self) -> Result<()> {
        let _serial = self.call_lock.lock().await;
        Ok(self.document.commit_group().await?)
    }

    pub(crate) async fn rollback_group(&self) -> Result<()> {
        let _serial = self.call_lock.lock().await;
        Ok(self.document.rollback_group().await?)
    }

    /// Serve one capability call from the isolated side.
    pub async fn dispatch(&self, request: CapabilityRequest) -> CapabilityResponse {
        tracing::debug!(request = ?request_op(&request), "capability call");
        match request {
            CapabilityRequest::GetSelectedElements => {
                to_response(self.selected_elements().await)
            }
            CapabilityRequest::GetElementsByCategory { category } => {
                to_response(self.elements_by_category(&category).await)
            }
            CapabilityRequest::GetElementsByType { type_name } => {
                to_response(self.elements_by_type(&type_name).await)
            }
            CapabilityRequest::GetElementParameters { element_id } => {
                to_response(self.element_parameters(element_id).await)
            }
            CapabilityRequest::SetElementParameter {
                element_id,
                name,
                value,
            } => match ParamValue::from_json(&value) {
                Ok(value) => to_response(
                    self.set_element_parameter(element_id, &name, value)
                        .await
                        .map(|()| serde_json::Value::Null),
                ),
                Err(err) => CapabilityResponse::failure(err.to_string()),
            },
            CapabilityRequest::CreateInstance { spec } => {
                to_response(self.create_instance(spec).await)
            }
            CapabilityRequest::ShowMessage { title, body } => to_response(
                self.show_message(&title, &body)
                    .await
                    .map(|()| serde_json::Value::Null),
            ),
        }
    }
}

fn request_op(request: &CapabilityRequest) -> &'static str {
    match request {
        CapabilityRequest::GetSelectedElements => "get_selected_elements",
        CapabilityRequest::GetElementsByCategory { .. } => "get_elements_by_category",
        CapabilityRequest::GetElementsByType { .. } => "get_elements_by_type",
        CapabilityRequest::GetElementParameters { .. } => "get_element_parameters",
        CapabilityRequest::SetElementParameter { .. } => "set_element_parameter",
        CapabilityRequest::CreateInstance { .. } => "create_instance",
        CapabilityRequest::ShowMessage { .. } => "show_message",
    }
}

fn to_response<T: Serialize>(result: Result<T>) -> CapabilityResponse {
    match result {
        Ok(value) => match serde_json::to_value(value) {
            Ok(data) => CapabilityResponse::ok(data),
            Err(err) => CapabilityResponse::failure(err.to_string()),
        },
        Err(err) => CapabilityResponse::failure(err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bimbridge_host::MemoryDocument;

    fn gateway() -> (Arc<MemoryDocument>, IsolationGateway) {
        let doc = Arc::new(
            MemoryDocument::new().with_catalog("Walls", &["FLC_Interior"]),
        );
        let gw = IsolationGateway::new(Arc::clone(&doc) as Arc<dyn HostDocument>);
        (doc, gw)
    }

    #[tokio::test]
    async fn test_mutating_calls_run_in_their_own_transaction() {
        let (doc, gw) = gateway();
        let spec = InstanceSpec {
            category: "Walls".into(),
            type_name: "FLC_Interior".into(),
            name: "W1".into(),
            parameters: vec![],
        };
        // No transaction is open around this call; the gateway opens one.
        let id = gw.create_instance(spec).await.unwrap();
        assert_eq!(doc.element_count(), 1);

        let params = gw.element_parameters(id).await.unwrap();
        assert!(params.is_empty());
    }

    #[tokio::test]
    async fn test_failed_mutation_rolls_back_its_transaction() {
        let (doc, gw) = gateway();
        let before = doc.state_digest().await.unwrap();

        let spec = InstanceSpec {
            category: "Roofs".into(), // not in catalog
            type_name: "Any".into(),
            name: "R1".into(),
            parameters: vec![],
        };
        assert!(gw.create_instance(spec).await.is_err());
        assert_eq!(doc.state_digest().await.unwrap(), before);

        // The next call still works: no dangling transaction.
        assert!(gw.selected_elements().await.is_ok());
    }

    #[tokio::test]
    async fn test_dispatch_checked_value_conversion() {
        let (doc, gw) = gateway();
        let id = doc.seed_element(
            "Walls",
            "FLC_Interior",
            "W1",
            vec![Parameter::new("Comments", ParamValue::Text("".into()))],
        );

        let response = gw
            .dispatch(CapabilityRequest::SetElementParameter {
                element_id: id,
                name: "Comments".into(),
                value: serde_json::json!({"nested": true}),
            })
            .await;
        assert!(!response.success);
        assert!(response.error.unwrap().contains("unsupported"));

        let response = gw
            .dispatch(CapabilityRequest::SetElementParameter {
                element_id: id,
                name: "Comments".into(),
                value: serde_json::json!("reviewed"),
            })
            .await;
        assert!(response.success);
    }

    #[test]
    fn test_capability_request_wire_shape() {
        let json = r#"{"op":"get_elements_by_category","category":"Walls"}"#;
        let request: CapabilityRequest = serde_json::from_str(json).unwrap();
        assert_eq!(
            request,
            CapabilityRequest::GetElementsByCategory {
                category: "Walls".into()
            }
        );
    }
}
