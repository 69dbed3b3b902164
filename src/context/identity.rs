//! Correlation identifiers for a pipeline run.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// The set of opaque identifiers correlating a run with its surroundings.
///
/// All fields are optional; a freshly created identity carries only a
/// generated `pipeline_run_id`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunIdentity {
    /// Unique id of this pipeline run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pipeline_run_id: Option<Uuid>,

    /// Id of the request that triggered the run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<Uuid>,

    /// Session the run belongs to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<Uuid>,

    /// End user on whose behalf the run executes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<Uuid>,

    /// Organization owning the run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub org_id: Option<Uuid>,

    /// Multi-turn interaction the run is part of.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interaction_id: Option<Uuid>,
}

impl RunIdentity {
    /// An identity with a freshly generated `pipeline_run_id`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            pipeline_run_id: Some(Uuid::new_v4()),
            ..Self::default()
        }
    }

    /// An identity pinned to a specific run id.
    #[must_use]
    pub fn for_run(pipeline_run_id: Uuid) -> Self {
        Self {
            pipeline_run_id: Some(pipeline_run_id),
            ..Self::default()
        }
    }

    /// Sets the request id.
    #[must_use]
    pub fn with_request_id(mut self, id: Uuid) -> Self {
        self.request_id = Some(id);
        self
    }

    /// Sets the session id.
    #[must_use]
    pub fn with_session_id(mut self, id: Uuid) -> Self {
        self.session_id = Some(id);
        self
    }

    /// Sets the user id.
    #[must_use]
    pub fn with_user_id(mut self, id: Uuid) -> Self {
        self.user_id = Some(id);
        self
    }

    /// Sets the organization id.
    #[must_use]
    pub fn with_org_id(mut self, id: Uuid) -> Self {
        self.org_id = Some(id);
        self
    }

    /// Sets the interaction id.
    #[must_use]
    pub fn with_interaction_id(mut self, id: Uuid) -> Self {
        self.interaction_id = Some(id);
        self
    }

    /// A mapping with every field present, UUIDs as strings, absent ids as
    /// null.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        fn entry(id: Option<Uuid>) -> serde_json::Value {
            id.map_or(serde_json::Value::Null, |v| {
                serde_json::Value::String(v.to_string())
            })
        }

        HashMap::from([
            ("pipeline_run_id".to_string(), entry(self.pipeline_run_id)),
            ("request_id".to_string(), entry(self.request_id)),
            ("session_id".to_string(), entry(self.session_id)),
            ("user_id".to_string(), entry(self.user_id)),
            ("org_id".to_string(), entry(self.org_id)),
            ("interaction_id".to_string(), entry(self.interaction_id)),
        ])
    }
}
