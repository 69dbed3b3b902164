//! Typed stage payloads with version stamping.

use crate::core::StageOutput;
use crate::errors::StageflowError;
use serde::{de::DeserializeOwned, Serialize};
use std::marker::PhantomData;

/// Encodes a typed payload into `StageOutput.data` and decodes it back,
/// stamping and checking a contract version string.
///
/// Version registration is deliberately not required; the version is a
/// plain label checked at decode time.
///
/// The payload type must serialize to a JSON object; its fields become
/// the output's data keys.
#[derive(Debug, Clone)]
pub struct TypedOutput<T> {
    version: String,
    _payload: PhantomData<T>,
}

impl<T> TypedOutput<T>
where
    T: Serialize + DeserializeOwned,
{
    /// A wrapper stamping `version` on encoded outputs.
    #[must_use]
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            _payload: PhantomData,
        }
    }

    /// The version this wrapper stamps and expects.
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Encodes a payload into a successful, version-stamped output.
    ///
    /// # Errors
    ///
    /// Returns a serialization error when the payload is not a JSON
    /// object.
    pub fn encode(&self, payload: &T) -> Result<StageOutput, StageflowError> {
        let value = serde_json::to_value(payload)?;
        let serde_json::Value::Object(map) = value else {
            return Err(StageflowError::Serialization(
                "typed payloads must serialize to an object".to_string(),
            ));
        };
        Ok(StageOutput::ok(map.into_iter().collect()).with_version(self.version.clone()))
    }

    /// Decodes a typed payload back out of an output, checking the
    /// version stamp.
    ///
    /// # Errors
    ///
    /// Returns a serialization error when the version does not match or
    /// the data does not deserialize into `T`.
    pub fn decode(&self, output: &StageOutput) -> Result<T, StageflowError> {
        match output.version.as_deref() {
            Some(version) if version == self.version => {}
            Some(other) => {
                return Err(StageflowError::Serialization(format!(
                    "version mismatch: expected '{}', output carries '{other}'",
                    self.version
                )));
            }
            None => {
                return Err(StageflowError::Serialization(format!(
                    "output carries no version; expected '{}'",
                    self.version
                )));
            }
        }

        let map: serde_json::Map<String, serde_json::Value> =
            output.data.clone().into_iter().collect();
        Ok(serde_json::from_value(serde_json::Value::Object(map))?)
    }
}
