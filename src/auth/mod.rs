//! Bundled authentication and tenancy-enforcement interceptors.
//!
//! The engine itself never authenticates; these interceptors let a host
//! gate stage execution on a validated bearer token and on organization
//! ownership. Token material travels in the snapshot metadata under
//! [`AUTH_TOKEN_KEY`]; a resource's owning org, when one applies, under
//! [`RESOURCE_ORG_KEY`].

use crate::errors::AuthError;
use crate::interceptors::{BeforeAction, Interceptor, InterceptorContext};
use crate::utils::{now, Timestamp};
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// Snapshot metadata key carrying the caller's bearer token.
pub const AUTH_TOKEN_KEY: &str = "auth_token";

/// Snapshot metadata key naming the org that owns the touched resource.
pub const RESOURCE_ORG_KEY: &str = "resource_org_id";

/// Claims extracted from a validated token.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthClaims {
    /// Subject (user) identifier.
    pub subject: String,
    /// Organization the subject belongs to.
    pub org_id: Option<Uuid>,
    /// Expiry instant, when the token has one.
    pub expires_at: Option<Timestamp>,
    /// Remaining raw claims.
    pub extra: HashMap<String, serde_json::Value>,
}

impl AuthClaims {
    /// Claims for a subject with no org or expiry.
    #[must_use]
    pub fn for_subject(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            org_id: None,
            expires_at: None,
            extra: HashMap::new(),
        }
    }

    /// Sets the subject's organization.
    #[must_use]
    pub fn with_org(mut self, org_id: Uuid) -> Self {
        self.org_id = Some(org_id);
        self
    }

    /// Sets the expiry instant.
    #[must_use]
    pub fn expiring_at(mut self, expires_at: Timestamp) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// True when the token is past its expiry.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| at <= now())
    }
}

/// Validates opaque bearer tokens into claims.
pub trait TokenValidator: Send + Sync {
    /// Validates a token.
    ///
    /// # Errors
    ///
    /// Returns an [`AuthError`] describing why the token is unusable.
    fn validate(&self, token: &str) -> Result<AuthClaims, AuthError>;
}

/// Validator backed by a fixed token → claims table. For tests and
/// development setups.
#[derive(Debug, Clone, Default)]
pub struct StaticTokenValidator {
    tokens: HashMap<String, AuthClaims>,
}

impl StaticTokenValidator {
    /// An empty validator that rejects everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Accepts `token` with the given claims.
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>, claims: AuthClaims) -> Self {
        self.tokens.insert(token.into(), claims);
        self
    }
}

impl TokenValidator for StaticTokenValidator {
    fn validate(&self, token: &str) -> Result<AuthClaims, AuthError> {
        let claims = self.tokens.get(token).ok_or_else(|| AuthError::InvalidToken {
            reason: "unknown token".to_string(),
        })?;
        if claims.is_expired() {
            return Err(AuthError::TokenExpired {
                expired_at: claims
                    .expires_at
                    .map(|at| at.to_rfc3339())
                    .unwrap_or_default(),
            });
        }
        Ok(claims.clone())
    }
}

/// Fails stages until the run presents a valid bearer token.
///
/// Emits `auth.login` once per run on the first successful validation and
/// `auth.failure` on every rejection.
pub struct AuthInterceptor {
    validator: Arc<dyn TokenValidator>,
    login_emitted: AtomicBool,
}

impl AuthInterceptor {
    /// An interceptor delegating to `validator`.
    #[must_use]
    pub fn new(validator: Arc<dyn TokenValidator>) -> Self {
        Self {
            validator,
            login_emitted: AtomicBool::new(false),
        }
    }

    fn reject(&self, ictx: &InterceptorContext<'_>, error: &AuthError) -> BeforeAction {
        ictx.try_emit(
            "auth.failure",
            json!({
                "code": error.code(),
                "error": error.to_string(),
            }),
        );
        BeforeAction::Fail(format!("{}: {error}", error.code()))
    }
}

#[async_trait::async_trait]
impl Interceptor for AuthInterceptor {
    fn name(&self) -> &str {
        "auth"
    }

    fn priority(&self) -> i32 {
        -500
    }

    async fn before(&self, ictx: &InterceptorContext<'_>) -> BeforeAction {
        let token = ictx
            .snapshot()
            .metadata_value(AUTH_TOKEN_KEY)
            .and_then(|v| v.as_str());

        let Some(token) = token else {
            return self.reject(
                ictx,
                &AuthError::MissingClaims {
                    claim: AUTH_TOKEN_KEY.to_string(),
                },
            );
        };

        match self.validator.validate(token) {
            Ok(claims) => {
                if !self.login_emitted.swap(true, Ordering::SeqCst) {
                    ictx.try_emit("auth.login", json!({"subject": claims.subject}));
                }
                BeforeAction::Continue
            }
            Err(error) => self.reject(ictx, &error),
        }
    }
}

/// Rejects stages whose run touches a resource owned by another org.
///
/// The resource org comes from snapshot metadata; the caller's org from
/// the run identity. Absent either, the check passes.
#[derive(Debug, Clone, Copy, Default)]
pub struct OrgEnforcementInterceptor;

#[async_trait::async_trait]
impl Interceptor for OrgEnforcementInterceptor {
    fn name(&self) -> &str {
        "org_enforcement"
    }

    fn priority(&self) -> i32 {
        -400
    }

    async fn before(&self, ictx: &InterceptorContext<'_>) -> BeforeAction {
        let resource_org = ictx
            .snapshot()
            .metadata_value(RESOURCE_ORG_KEY)
            .and_then(|v| v.as_str())
            .and_then(crate::utils::parse_uuid);
        let caller_org = ictx.identity().org_id;

        match (resource_org, caller_org) {
            (Some(resource), Some(caller)) if resource != caller => {
                let error = AuthError::CrossTenantAccess {
                    caller_org: caller.to_string(),
                    resource_org: resource.to_string(),
                };
                ictx.try_emit(
                    "tenant.access_denied",
                    json!({
                        "caller_org": caller.to_string(),
                        "resource_org": resource.to_string(),
                    }),
                );
                BeforeAction::Fail(format!("{}: {error}", error.code()))
            }
            _ => BeforeAction::Continue,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{
        ContextSnapshot, PipelineContext, RunIdentity, StageContext, StageInputs,
    };
    use crate::core::StageKind;
    use crate::events::CollectingEventSink;
    use chrono::Duration;

    fn stage_ctx_with(
        snapshot: ContextSnapshot,
    ) -> (StageContext, Arc<CollectingEventSink>) {
        let sink = Arc::new(CollectingEventSink::new());
        let pipeline =
            Arc::new(PipelineContext::from_snapshot(snapshot).with_event_sink(sink.clone()));
        (
            StageContext::new(pipeline, "guarded", StageKind::Work, StageInputs::default()),
            sink,
        )
    }

    fn validator() -> Arc<dyn TokenValidator> {
        Arc::new(
            StaticTokenValidator::new()
                .with_token("good-token", AuthClaims::for_subject("alice"))
                .with_token(
                    "stale-token",
                    AuthClaims::for_subject("bob").expiring_at(now() - Duration::hours(1)),
                ),
        )
    }

    #[tokio::test]
    async fn valid_token_passes_and_logs_in_once() {
        let interceptor = AuthInterceptor::new(validator());
        let (ctx, sink) = stage_ctx_with(
            ContextSnapshot::new().with_metadata(AUTH_TOKEN_KEY, serde_json::json!("good-token")),
        );
        let ictx = InterceptorContext::new(&ctx);

        assert!(matches!(interceptor.before(&ictx).await, BeforeAction::Continue));
        assert!(matches!(interceptor.before(&ictx).await, BeforeAction::Continue));
        assert_eq!(sink.events_with_prefix("auth.login").len(), 1);
    }

    #[tokio::test]
    async fn missing_token_fails_with_missing_claims() {
        let interceptor = AuthInterceptor::new(validator());
        let (ctx, sink) = stage_ctx_with(ContextSnapshot::new());
        let ictx = InterceptorContext::new(&ctx);

        let action = interceptor.before(&ictx).await;
        assert!(matches!(action, BeforeAction::Fail(e) if e.starts_with("MISSING_CLAIMS")));
        assert!(sink.position_of("auth.failure").is_some());
    }

    #[tokio::test]
    async fn unknown_token_fails_with_invalid_token() {
        let interceptor = AuthInterceptor::new(validator());
        let (ctx, _sink) = stage_ctx_with(
            ContextSnapshot::new().with_metadata(AUTH_TOKEN_KEY, serde_json::json!("wrong")),
        );
        let action = interceptor.before(&InterceptorContext::new(&ctx)).await;
        assert!(matches!(action, BeforeAction::Fail(e) if e.starts_with("INVALID_TOKEN")));
    }

    #[tokio::test]
    async fn expired_token_fails_with_token_expired() {
        let interceptor = AuthInterceptor::new(validator());
        let (ctx, _sink) = stage_ctx_with(
            ContextSnapshot::new().with_metadata(AUTH_TOKEN_KEY, serde_json::json!("stale-token")),
        );
        let action = interceptor.before(&InterceptorContext::new(&ctx)).await;
        assert!(matches!(action, BeforeAction::Fail(e) if e.starts_with("TOKEN_EXPIRED")));
    }

    #[tokio::test]
    async fn cross_tenant_access_is_denied() {
        let caller_org = Uuid::new_v4();
        let other_org = Uuid::new_v4();
        let (ctx, sink) = stage_ctx_with(
            ContextSnapshot::new()
                .with_identity(RunIdentity::new().with_org_id(caller_org))
                .with_metadata(RESOURCE_ORG_KEY, serde_json::json!(other_org.to_string())),
        );

        let action = OrgEnforcementInterceptor
            .before(&InterceptorContext::new(&ctx))
            .await;
        assert!(matches!(action, BeforeAction::Fail(e) if e.starts_with("CROSS_TENANT_ACCESS")));
        assert!(sink.position_of("tenant.access_denied").is_some());
    }

    #[tokio::test]
    async fn same_org_access_passes() {
        let org = Uuid::new_v4();
        let (ctx, _sink) = stage_ctx_with(
            ContextSnapshot::new()
                .with_identity(RunIdentity::new().with_org_id(org))
                .with_metadata(RESOURCE_ORG_KEY, serde_json::json!(org.to_string())),
        );
        assert!(matches!(
            OrgEnforcementInterceptor
                .before(&InterceptorContext::new(&ctx))
                .await,
            BeforeAction::Continue
        ));
    }

    #[tokio::test]
    async fn missing_resource_org_passes() {
        let (ctx, _sink) = stage_ctx_with(ContextSnapshot::new());
        assert!(matches!(
            OrgEnforcementInterceptor
                .before(&InterceptorContext::new(&ctx))
                .await,
            BeforeAction::Continue
        ));
    }
}
