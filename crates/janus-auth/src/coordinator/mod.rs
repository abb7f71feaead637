//! Authentication coordination.
//!
//! The coordinator is the top-level state machine for one authorization
//! attempt: it decides whether an existing session can be reused, resolves
//! how the login UI is delivered and which journey policy runs, parks the
//! protocol request under a correlation ID, resumes it on callback, and
//! drives consent. Token issuance happens afterwards, from the
//! [`GrantResult`](crate::oauth::token::GrantResult) the resumed
//! authorization produces.
//!
//! Store lookups that come back empty degrade to OAuth error codes
//! (`invalid_request`, `access_denied`, `login_required`,
//! `consent_required`); only an unresolvable policy is fatal.

pub mod requirement;

pub use requirement::{AuthenticationRequirement, Prompt, UiMode};

use std::sync::Arc;

use serde::Serialize;
use time::OffsetDateTime;
use tracing::{debug, warn};
use url::Url;
use uuid::Uuid;

use crate::AuthResult;
use crate::bag::{DataBag, KEY_AUTH_METHOD, KEY_AUTHENTICATED_AT};
use crate::config::AuthConfig;
use crate::error::AuthError;
use crate::journey::state::{JourneyState, JourneyStatus};
use crate::oauth::protocol_state::{CORRELATION_PARAM, ProtocolState};
use crate::storage::directory::{ClientStore, PolicyStore, TenantStore};
use crate::storage::journey::JourneyStore;
use crate::storage::protocol_state::ProtocolStateStore;
use crate::storage::user::{SessionStore, UserSession, UserStore};
use crate::types::client::Client;
use crate::types::policy::{JourneyPolicy, PolicyKind};
use crate::types::tenant::Tenant;

/// Protocol state property linking a parked request to its journey.
const PROP_JOURNEY_ID: &str = "journey_id";

/// Protocol state property set once consent parameters are recorded.
const PROP_CONSENT_REQUESTED: &str = "consent_requested";

/// Protocol state property holding the consented scopes.
const PROP_CONSENT_SCOPES: &str = "consent_scopes";

/// Journey bag key holding the protocol callback URL.
const KEY_CALLBACK_URL: &str = "callback_url";

// =============================================================================
// Outcomes
// =============================================================================

/// Structured body of a headless 401 response.
#[derive(Debug, Clone, Serialize)]
pub struct AuthRequirements {
    /// Always "login_required".
    pub error: String,

    /// Policy the client must drive to authenticate.
    pub policy_id: String,

    /// Kind of the policy.
    pub policy_kind: PolicyKind,

    /// Scopes the attempt requested.
    pub required_scopes: Vec<String>,

    /// Requested authentication context class references.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub acr_values: Vec<String>,
}

/// Structured body of a headless 403 response.
#[derive(Debug, Clone, Serialize)]
pub struct ConsentRequirements {
    /// Always "consent_required".
    pub error: String,

    /// Client asking for consent.
    pub client_id: String,

    /// Display name shown to the user, when registered.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_name: Option<String>,

    /// Scopes awaiting consent.
    pub scopes: Vec<String>,
}

/// What the caller (transport layer) must do next.
#[derive(Debug, Clone)]
pub enum AuthorizationOutcome {
    /// Redirect the browser.
    Redirect {
        /// Absolute redirect target.
        url: String,
    },

    /// Return a structured 401 with the authentication requirements.
    AuthenticationRequired(AuthRequirements),

    /// Return a structured 403 with the consent requirements.
    ConsentRequired(ConsentRequirements),
}

impl AuthorizationOutcome {
    /// Returns the redirect URL, if this outcome is a redirect.
    #[must_use]
    pub fn redirect_url(&self) -> Option<&str> {
        match self {
            Self::Redirect { url } => Some(url),
            _ => None,
        }
    }
}

/// An authorization resumed through its correlation ID.
///
/// Carries everything token issuance needs about who authenticated and how.
#[derive(Debug, Clone)]
pub struct ResumedAuthorization {
    /// The parked protocol request, now consumed.
    pub state: ProtocolState,

    /// The authenticated subject.
    pub subject_id: String,

    /// Session established for this authentication. `None` when the
    /// journey only collected claims (no `authenticated_at` convention
    /// keys were set).
    pub session_id: Option<String>,

    /// When the user authenticated (unix timestamp), if known.
    pub auth_time: Option<i64>,

    /// Authentication method references.
    pub auth_methods: Vec<String>,

    /// Claims collected during the journey, if one ran.
    pub claims: DataBag,
}

// =============================================================================
// Coordinator
// =============================================================================

/// Top-level orchestrator for authorization attempts.
pub struct AuthenticationCoordinator {
    protocol_state: Arc<dyn ProtocolStateStore>,
    policies: Arc<dyn PolicyStore>,
    clients: Arc<dyn ClientStore>,
    tenants: Arc<dyn TenantStore>,
    users: Arc<dyn UserStore>,
    sessions: Arc<dyn SessionStore>,
    journeys: Arc<dyn JourneyStore>,
    config: AuthConfig,
}

impl AuthenticationCoordinator {
    /// Creates a coordinator over its collaborating stores.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        protocol_state: Arc<dyn ProtocolStateStore>,
        policies: Arc<dyn PolicyStore>,
        clients: Arc<dyn ClientStore>,
        tenants: Arc<dyn TenantStore>,
        users: Arc<dyn UserStore>,
        sessions: Arc<dyn SessionStore>,
        journeys: Arc<dyn JourneyStore>,
        config: AuthConfig,
    ) -> Self {
        Self {
            protocol_state,
            policies,
            clients,
            tenants,
            users,
            sessions,
            journeys,
            config,
        }
    }

    /// Handles an inbound authorization request.
    ///
    /// Parks the protocol request, decides whether the session can be
    /// reused (skip login), and otherwise dispatches to the journey,
    /// standalone, or headless experience.
    ///
    /// # Errors
    ///
    /// Degrades empty lookups to OAuth error codes; an unresolvable policy
    /// is a fatal configuration error.
    pub async fn begin_authorization(
        &self,
        requirement: &AuthenticationRequirement,
        state: ProtocolState,
        session: Option<&UserSession>,
    ) -> AuthResult<AuthorizationOutcome> {
        let client = self
            .clients
            .find_by_id(&state.client_id)
            .await?
            .ok_or_else(|| AuthError::invalid_client("unknown client"))?;

        let tenant = match &client.tenant_id {
            Some(tenant_id) => self.tenants.find_by_id(tenant_id).await?,
            None => None,
        };

        // 1. Skip-login decision.
        if let Some(session) = session {
            if let Some(session) = self.validate_session(requirement, session).await? {
                let correlation_id = self
                    .protocol_state
                    .store(state.clone(), self.config.protocol_state.lifetime)
                    .await?;
                let url = self.callback_url(&state.protocol, &correlation_id)?;
                debug!(session_id = %session.id, "login skipped, resuming request");
                return Ok(AuthorizationOutcome::Redirect { url });
            }
        }

        // 2. UI mode and policy resolution.
        let ui_mode =
            self.resolve_ui_mode(tenant.as_ref(), &client, requirement.requested_ui_mode);
        let policy = self
            .resolve_policy(requirement, client.tenant_id.as_deref(), None)
            .await?;

        // 3. Dispatch.
        match ui_mode {
            UiMode::Journey => self.start_journey(&policy, state, None).await,
            UiMode::Standalone => {
                let correlation_id = self
                    .protocol_state
                    .store(state.clone(), self.config.protocol_state.lifetime)
                    .await?;
                let callback = self.callback_url(&state.protocol, &correlation_id)?;
                let url = self.standalone_page_url(requirement.suggested_policy_kind, &callback)?;
                Ok(AuthorizationOutcome::Redirect { url })
            }
            UiMode::Headless => Ok(AuthorizationOutcome::AuthenticationRequired(
                AuthRequirements {
                    error: "login_required".to_string(),
                    policy_id: policy.id,
                    policy_kind: policy.kind,
                    required_scopes: requirement.requested_scopes.clone(),
                    acr_values: requirement.acr_values.clone(),
                },
            )),
        }
    }

    /// Resolves how the login experience is delivered.
    ///
    /// Three-tier override chain: the tenant is authoritative (journeys
    /// disabled forces standalone, full stop); an explicit client `false`
    /// is final and `true` forces journeys (headless stays available to
    /// API clients); a null client setting inherits, letting the request's
    /// `ui_mode` choose. The default is Journey.
    #[must_use]
    pub fn resolve_ui_mode(
        &self,
        tenant: Option<&Tenant>,
        client: &Client,
        requested: Option<UiMode>,
    ) -> UiMode {
        if let Some(tenant) = tenant {
            if !tenant.journeys_enabled {
                return UiMode::Standalone;
            }
        }
        match client.journeys_enabled {
            Some(false) => UiMode::Standalone,
            Some(true) => match requested {
                Some(UiMode::Headless) => UiMode::Headless,
                _ => UiMode::Journey,
            },
            None => requested.unwrap_or(UiMode::Journey),
        }
    }

    /// Resolves the journey policy for an attempt.
    ///
    /// Order: request-level explicit policy ID, context policy ID, lookup
    /// by the suggested kind, tenant sign-in fallback. First match wins.
    ///
    /// # Errors
    ///
    /// No resolvable policy at all is a fatal configuration error.
    pub async fn resolve_policy(
        &self,
        requirement: &AuthenticationRequirement,
        tenant_id: Option<&str>,
        context_policy_id: Option<&str>,
    ) -> AuthResult<JourneyPolicy> {
        if let Some(policy_id) = &requirement.explicit_policy_id {
            if let Some(policy) = self.policies.find_by_id(policy_id).await? {
                if policy.enabled {
                    return Ok(policy);
                }
            }
            warn!(policy_id = %policy_id, "explicit policy not found or disabled");
        }

        if let Some(policy_id) = context_policy_id {
            if let Some(policy) = self.policies.find_by_id(policy_id).await? {
                if policy.enabled {
                    return Ok(policy);
                }
            }
        }

        if let Some(policy) = self
            .policies
            .find_by_kind(tenant_id, requirement.suggested_policy_kind)
            .await?
        {
            return Ok(policy);
        }

        if let Some(policy) = self
            .policies
            .find_by_kind(tenant_id, PolicyKind::SignIn)
            .await?
        {
            return Ok(policy);
        }

        Err(AuthError::configuration(format!(
            "no journey policy resolvable for kind '{}'",
            requirement.suggested_policy_kind.as_str()
        )))
    }

    /// Resumes a parked request from a protocol callback.
    ///
    /// The correlation ID is consumed here; a second resume with the same
    /// ID fails `invalid_request`. With a journey ID the journey must have
    /// completed with an authenticated user; without one the session token
    /// is re-validated directly (the transport's notion of "current user"
    /// is not trusted).
    ///
    /// # Errors
    ///
    /// `invalid_request` for unknown/consumed correlation IDs,
    /// `access_denied` for incomplete journeys or missing sessions.
    pub async fn handle_callback(
        &self,
        correlation_id: &str,
        journey_id: Option<Uuid>,
        session_token: Option<&str>,
    ) -> AuthResult<ResumedAuthorization> {
        let state = self
            .protocol_state
            .take(correlation_id)
            .await?
            .ok_or_else(|| {
                AuthError::invalid_request("unknown, expired, or consumed correlation id")
            })?;

        match journey_id {
            Some(journey_id) => self.resume_from_journey(state, journey_id).await,
            None => self.resume_from_session(state, session_token).await,
        }
    }

    /// Records consent requirements and routes the user to the consent
    /// experience.
    ///
    /// The consent parameters are stored into the protocol state's
    /// properties and the state is parked again under a fresh correlation
    /// ID. In journey mode with a configured consent policy a dedicated
    /// consent journey starts, targeting the original authorize endpoint
    /// so re-entry sees consent satisfied; otherwise the standalone
    /// consent page is used. Headless clients get a structured 403.
    ///
    /// # Errors
    ///
    /// Returns storage errors from the protocol state and journey stores.
    pub async fn require_consent(
        &self,
        mut state: ProtocolState,
        client: &Client,
        ui_mode: UiMode,
        scopes: &[String],
    ) -> AuthResult<AuthorizationOutcome> {
        state
            .properties
            .insert(PROP_CONSENT_REQUESTED.to_string(), "true".to_string());
        state
            .properties
            .insert(PROP_CONSENT_SCOPES.to_string(), scopes.join(" "));

        if ui_mode == UiMode::Headless {
            return Ok(AuthorizationOutcome::ConsentRequired(ConsentRequirements {
                error: "consent_required".to_string(),
                client_id: client.client_id.clone(),
                client_name: client.client_name.clone(),
                scopes: scopes.to_vec(),
            }));
        }

        let consent_policy = if ui_mode == UiMode::Journey {
            self.policies
                .find_by_kind(client.tenant_id.as_deref(), PolicyKind::Consent)
                .await?
        } else {
            None
        };

        match consent_policy {
            Some(policy) => {
                // The consent journey re-enters the authorize endpoint, not
                // the callback path, so consent is re-evaluated there.
                let authorize = self.authorize_url(&state.protocol)?;
                self.start_journey(&policy, state, Some(authorize)).await
            }
            None => {
                let correlation_id = self
                    .protocol_state
                    .store(state.clone(), self.config.protocol_state.lifetime)
                    .await?;
                let callback = self.callback_url(&state.protocol, &correlation_id)?;
                let url = self.standalone_page_url(PolicyKind::Consent, &callback)?;
                Ok(AuthorizationOutcome::Redirect { url })
            }
        }
    }

    // -------------------------------------------------------------------------
    // Session validation
    // -------------------------------------------------------------------------

    /// Applies the skip-login rules to an existing session.
    ///
    /// Returns the session if it survives, `None` after invalidating it.
    /// A session whose user no longer exists (or is deactivated) is signed
    /// out rather than surfaced as an error.
    async fn validate_session<'s>(
        &self,
        requirement: &AuthenticationRequirement,
        session: &'s UserSession,
    ) -> AuthResult<Option<&'s UserSession>> {
        if requirement.forces_fresh_login() {
            debug!(session_id = %session.id, "fresh login forced, invalidating session");
            self.sessions.remove(&session.id).await?;
            return Ok(None);
        }

        if let Some(max_age) = requirement.max_age_seconds {
            if session.age_seconds() > max_age {
                debug!(session_id = %session.id, "session exceeds max_age, invalidating");
                self.sessions.remove(&session.id).await?;
                return Ok(None);
            }
        }

        // The user behind the session must still exist and be active.
        let user = self.users.find_by_id(&session.user_id).await?;
        match user {
            Some(user) if user.active => Ok(Some(session)),
            _ => {
                warn!(session_id = %session.id, "session user gone or inactive, signing out");
                self.sessions.remove(&session.id).await?;
                Ok(None)
            }
        }
    }

    // -------------------------------------------------------------------------
    // Journey dispatch and resumption
    // -------------------------------------------------------------------------

    /// Starts a journey for a parked request and redirects to its UI.
    ///
    /// `callback_override` replaces the protocol callback URL (used by
    /// consent journeys, which target the authorize endpoint instead).
    async fn start_journey(
        &self,
        policy: &JourneyPolicy,
        mut state: ProtocolState,
        callback_override: Option<Url>,
    ) -> AuthResult<AuthorizationOutcome> {
        let expiry_secs =
            i64::try_from(self.config.journeys.lifetime.as_secs()).unwrap_or(1800);
        let mut journey = JourneyState::with_expiry(&policy.id, expiry_secs);

        state
            .properties
            .insert(PROP_JOURNEY_ID.to_string(), journey.id.to_string());
        let correlation_id = self
            .protocol_state
            .store(state.clone(), self.config.protocol_state.lifetime)
            .await?;

        let callback = match callback_override {
            Some(mut url) => {
                url.query_pairs_mut()
                    .append_pair(CORRELATION_PARAM, &correlation_id);
                url
            }
            None => Url::parse(&self.callback_url(&state.protocol, &correlation_id)?)
                .map_err(|e| AuthError::internal(format!("invalid callback url: {e}")))?,
        };
        journey.bag.set(KEY_CALLBACK_URL, callback.as_str());
        self.journeys.save(&journey).await?;

        let mut entry = self.absolute_url(&policy.ui_entry_url)?;
        entry
            .query_pairs_mut()
            .append_pair("journey_id", &journey.id.to_string());

        debug!(journey_id = %journey.id, policy_id = %policy.id, "journey started");
        Ok(AuthorizationOutcome::Redirect {
            url: entry.to_string(),
        })
    }

    /// Resumes a callback carrying a journey ID.
    async fn resume_from_journey(
        &self,
        state: ProtocolState,
        journey_id: Uuid,
    ) -> AuthResult<ResumedAuthorization> {
        // The parked request remembers which journey it started; a callback
        // naming a different one is not honored.
        if let Some(linked) = state.properties.get(PROP_JOURNEY_ID) {
            if linked != &journey_id.to_string() {
                return Err(AuthError::access_denied(
                    "journey does not belong to this request",
                ));
            }
        }

        let journey = self
            .journeys
            .find_by_id(journey_id)
            .await?
            .ok_or_else(|| AuthError::access_denied("unknown journey"))?;

        if journey.status != JourneyStatus::Completed {
            return Err(AuthError::access_denied("journey did not complete"));
        }
        let subject_id = journey
            .authenticated_user_id
            .clone()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| AuthError::access_denied("journey completed without a user"))?;

        // Session issuance follows the authentication convention: a user ID
        // without `authenticated_at` means claims were collected for a known
        // user, not that anyone logged in.
        let (session_id, auth_time, auth_methods) = if journey.did_authenticate() {
            let auth_time = journey.bag.get_i64(KEY_AUTHENTICATED_AT);
            let auth_methods: Vec<String> = journey
                .bag
                .get_str(KEY_AUTH_METHOD)
                .map(|m| vec![m.to_string()])
                .unwrap_or_default();

            let session = UserSession {
                id: Uuid::new_v4().to_string(),
                user_id: subject_id.clone(),
                auth_time: auth_time
                    .and_then(|ts| OffsetDateTime::from_unix_timestamp(ts).ok())
                    .unwrap_or_else(OffsetDateTime::now_utc),
                auth_methods: auth_methods.clone(),
                tenant_id: state.tenant_id.clone(),
            };
            self.sessions.store(&session).await?;
            (Some(session.id), auth_time, auth_methods)
        } else {
            debug!(journey_id = %journey.id, "journey did not authenticate, no session issued");
            (None, None, Vec::new())
        };

        self.journeys.remove(journey_id).await?;

        Ok(ResumedAuthorization {
            claims: journey.bag.clone(),
            state,
            subject_id,
            session_id,
            auth_time,
            auth_methods,
        })
    }

    /// Resumes a standalone callback from the session token.
    ///
    /// The transport's current-user notion may be stale; the session is
    /// re-read from the store and its user re-validated.
    async fn resume_from_session(
        &self,
        state: ProtocolState,
        session_token: Option<&str>,
    ) -> AuthResult<ResumedAuthorization> {
        let token =
            session_token.ok_or_else(|| AuthError::access_denied("not authenticated"))?;
        let session = self
            .sessions
            .find_by_token(token)
            .await?
            .ok_or_else(|| AuthError::access_denied("not authenticated"))?;

        let user = self.users.find_by_id(&session.user_id).await?;
        if !user.map(|u| u.active).unwrap_or(false) {
            self.sessions.remove(&session.id).await?;
            return Err(AuthError::access_denied("not authenticated"));
        }

        Ok(ResumedAuthorization {
            state,
            subject_id: session.user_id.clone(),
            session_id: Some(session.id.clone()),
            auth_time: Some(session.auth_time.unix_timestamp()),
            auth_methods: session.auth_methods.clone(),
            claims: DataBag::new(),
        })
    }

    // -------------------------------------------------------------------------
    // URL construction
    // -------------------------------------------------------------------------

    /// Builds the protocol-specific callback URL for a correlation ID.
    fn callback_url(&self, protocol: &str, correlation_id: &str) -> AuthResult<String> {
        let path = match protocol {
            "oidc" => "/connect/authorize/callback".to_string(),
            "saml" => "/saml/callback".to_string(),
            other => format!("/{other}/callback"),
        };
        let mut url = self.absolute_url(&path)?;
        url.query_pairs_mut()
            .append_pair(CORRELATION_PARAM, correlation_id);
        Ok(url.to_string())
    }

    /// Builds the protocol-specific authorize endpoint URL.
    fn authorize_url(&self, protocol: &str) -> AuthResult<Url> {
        let path = match protocol {
            "oidc" => "/connect/authorize".to_string(),
            "saml" => "/saml/authorize".to_string(),
            other => format!("/{other}/authorize"),
        };
        self.absolute_url(&path)
    }

    /// Builds the standalone page URL for a requirement kind, embedding the
    /// callback as the return URL.
    fn standalone_page_url(&self, kind: PolicyKind, return_url: &str) -> AuthResult<String> {
        let path = match kind {
            PolicyKind::SignIn => "/account/login",
            PolicyKind::SignUp => "/account/register",
            PolicyKind::ForgotPassword => "/account/forgot-password",
            PolicyKind::Profile => "/account/profile",
            PolicyKind::Consent => "/account/consent",
        };
        let mut url = self.absolute_url(path)?;
        url.query_pairs_mut().append_pair("returnUrl", return_url);
        Ok(url.to_string())
    }

    /// Resolves a path (or absolute URL) against the server base URL.
    fn absolute_url(&self, path_or_url: &str) -> AuthResult<Url> {
        if let Ok(url) = Url::parse(path_or_url) {
            return Ok(url);
        }
        let base = Url::parse(self.config.issuer.trim_end_matches('/'))
            .map_err(|e| AuthError::configuration(format!("invalid issuer url: {e}")))?;
        base.join(path_or_url)
            .map_err(|e| AuthError::internal(format!("invalid path '{path_or_url}': {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::journey::step::StepConfig;
    use crate::storage::memory::{
        InMemoryClientStore, InMemoryJourneyStore, InMemoryPolicyStore,
        InMemoryProtocolStateStore, InMemorySessionStore, InMemoryTenantStore, InMemoryUserStore,
    };
    use crate::storage::user::User;

    struct Fixture {
        coordinator: AuthenticationCoordinator,
        protocol_state: Arc<InMemoryProtocolStateStore>,
        policies: Arc<InMemoryPolicyStore>,
        clients: Arc<InMemoryClientStore>,
        tenants: Arc<InMemoryTenantStore>,
        users: Arc<InMemoryUserStore>,
        sessions: Arc<InMemorySessionStore>,
        journeys: Arc<InMemoryJourneyStore>,
    }

    fn fixture() -> Fixture {
        let protocol_state = Arc::new(InMemoryProtocolStateStore::new());
        let policies = Arc::new(InMemoryPolicyStore::new());
        let clients = Arc::new(InMemoryClientStore::new());
        let tenants = Arc::new(InMemoryTenantStore::new());
        let users = Arc::new(InMemoryUserStore::new());
        let sessions = Arc::new(InMemorySessionStore::new());
        let journeys = Arc::new(InMemoryJourneyStore::new());

        let config = AuthConfig {
            issuer: "https://id.example.com".to_string(),
            ..AuthConfig::default()
        };

        let coordinator = AuthenticationCoordinator::new(
            protocol_state.clone(),
            policies.clone(),
            clients.clone(),
            tenants.clone(),
            users.clone(),
            sessions.clone(),
            journeys.clone(),
            config,
        );

        Fixture {
            coordinator,
            protocol_state,
            policies,
            clients,
            tenants,
            users,
            sessions,
            journeys,
        }
    }

    fn signin_policy(id: &str, tenant_id: Option<&str>) -> JourneyPolicy {
        JourneyPolicy {
            id: id.to_string(),
            tenant_id: tenant_id.map(String::from),
            kind: PolicyKind::SignIn,
            name: id.to_string(),
            enabled: true,
            steps: vec![StepConfig::new("login", "password")],
            ui_entry_url: "/journey".to_string(),
        }
    }

    fn seed_basics(fx: &Fixture) {
        fx.clients.insert(Client::new("app"));
        fx.policies.insert(signin_policy("signin-default", None));
        fx.users.insert(User {
            id: "user-1".to_string(),
            username: "alice".to_string(),
            tenant_id: None,
            active: true,
        });
    }

    fn session() -> UserSession {
        UserSession {
            id: "sess-1".to_string(),
            user_id: "user-1".to_string(),
            auth_time: OffsetDateTime::now_utc() - time::Duration::seconds(60),
            auth_methods: vec!["pwd".to_string()],
            tenant_id: None,
        }
    }

    fn requirement() -> AuthenticationRequirement {
        AuthenticationRequirement::sign_in(vec!["openid".to_string()])
    }

    fn protocol_state() -> ProtocolState {
        ProtocolState::new("oidc", "response_type=code&client_id=app", "app")
    }

    // -------------------------------------------------------------------------
    // Skip-login
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_live_session_skips_login() {
        let fx = fixture();
        seed_basics(&fx);
        let session = session();
        fx.sessions.insert("token-1", session.clone());

        let outcome = fx
            .coordinator
            .begin_authorization(&requirement(), protocol_state(), Some(&session))
            .await
            .unwrap();

        let url = outcome.redirect_url().expect("skip-login redirects");
        assert!(url.starts_with("https://id.example.com/connect/authorize/callback?"));
        assert!(url.contains("correlation_id="));

        // The parked request is resumable under the issued correlation ID.
        let parsed = Url::parse(url).unwrap();
        let correlation_id = parsed
            .query_pairs()
            .find(|(k, _)| k == CORRELATION_PARAM)
            .map(|(_, v)| v.to_string())
            .unwrap();
        assert!(
            fx.protocol_state
                .get(&correlation_id)
                .await
                .unwrap()
                .is_some()
        );
    }

    #[tokio::test]
    async fn test_prompt_login_invalidates_session() {
        let fx = fixture();
        seed_basics(&fx);
        let session = session();
        fx.sessions.insert("token-1", session.clone());

        let mut req = requirement();
        req.prompt = Some(Prompt::Login);

        let outcome = fx
            .coordinator
            .begin_authorization(&req, protocol_state(), Some(&session))
            .await
            .unwrap();

        // Fresh login: journey redirect, and the session is gone.
        let url = outcome.redirect_url().unwrap();
        assert!(url.starts_with("https://id.example.com/journey?journey_id="));
        assert!(!fx.sessions.contains_session("sess-1"));
    }

    #[tokio::test]
    async fn test_max_age_exceeded_forces_fresh_login() {
        let fx = fixture();
        seed_basics(&fx);
        let session = session(); // authenticated 60s ago
        fx.sessions.insert("token-1", session.clone());

        let mut req = requirement();
        req.max_age_seconds = Some(30);

        let outcome = fx
            .coordinator
            .begin_authorization(&req, protocol_state(), Some(&session))
            .await
            .unwrap();

        assert!(outcome.redirect_url().unwrap().contains("/journey"));
        assert!(!fx.sessions.contains_session("sess-1"));
    }

    #[tokio::test]
    async fn test_stale_user_is_signed_out() {
        let fx = fixture();
        seed_basics(&fx);
        let session = session();
        fx.sessions.insert("token-1", session.clone());

        // The user behind the session disappeared from the store.
        fx.users.delete("user-1");

        let outcome = fx
            .coordinator
            .begin_authorization(&requirement(), protocol_state(), Some(&session))
            .await
            .unwrap();

        assert!(outcome.redirect_url().unwrap().contains("/journey"));
        assert!(!fx.sessions.contains_session("sess-1"));
    }

    // -------------------------------------------------------------------------
    // UI mode resolution
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_ui_mode_tenant_is_authoritative() {
        let fx = fixture();
        let mut tenant = Tenant::new("acme", "Acme");
        tenant.journeys_enabled = false;

        let mut client = Client::new("app");
        client.journeys_enabled = Some(true);

        // Tenant disables journeys: standalone, no matter what.
        assert_eq!(
            fx.coordinator
                .resolve_ui_mode(Some(&tenant), &client, Some(UiMode::Journey)),
            UiMode::Standalone
        );
    }

    #[tokio::test]
    async fn test_ui_mode_client_tier() {
        let fx = fixture();
        let tenant = Tenant::new("acme", "Acme");

        let mut client = Client::new("app");
        client.journeys_enabled = Some(false);
        assert_eq!(
            fx.coordinator
                .resolve_ui_mode(Some(&tenant), &client, Some(UiMode::Journey)),
            UiMode::Standalone
        );

        client.journeys_enabled = Some(true);
        assert_eq!(
            fx.coordinator
                .resolve_ui_mode(Some(&tenant), &client, Some(UiMode::Standalone)),
            UiMode::Journey
        );
        // Headless stays reachable for API clients.
        assert_eq!(
            fx.coordinator
                .resolve_ui_mode(Some(&tenant), &client, Some(UiMode::Headless)),
            UiMode::Headless
        );
    }

    #[tokio::test]
    async fn test_ui_mode_request_tier_and_default() {
        let fx = fixture();
        let client = Client::new("app"); // journeys_enabled: None (inherit)

        assert_eq!(
            fx.coordinator
                .resolve_ui_mode(None, &client, Some(UiMode::Standalone)),
            UiMode::Standalone
        );
        assert_eq!(
            fx.coordinator.resolve_ui_mode(None, &client, None),
            UiMode::Journey
        );
    }

    // -------------------------------------------------------------------------
    // Policy resolution
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_policy_resolution_chain() {
        let fx = fixture();
        fx.policies.insert(signin_policy("signin-default", None));
        fx.policies.insert(JourneyPolicy {
            kind: PolicyKind::SignUp,
            ..signin_policy("signup-default", None)
        });
        fx.policies.insert(signin_policy("special", None));

        // Explicit ID wins.
        let mut req = requirement();
        req.explicit_policy_id = Some("special".to_string());
        let policy = fx.coordinator.resolve_policy(&req, None, None).await.unwrap();
        assert_eq!(policy.id, "special");

        // Context policy ID is next.
        let req = requirement();
        let policy = fx
            .coordinator
            .resolve_policy(&req, None, Some("signup-default"))
            .await
            .unwrap();
        assert_eq!(policy.id, "signup-default");

        // Kind lookup follows.
        let mut req = requirement();
        req.suggested_policy_kind = PolicyKind::SignUp;
        let policy = fx.coordinator.resolve_policy(&req, None, None).await.unwrap();
        assert_eq!(policy.id, "signup-default");

        // Unknown kind falls back to sign-in.
        let mut req = requirement();
        req.suggested_policy_kind = PolicyKind::ForgotPassword;
        let policy = fx.coordinator.resolve_policy(&req, None, None).await.unwrap();
        assert_eq!(policy.id, "signin-default");
    }

    #[tokio::test]
    async fn test_no_policy_is_fatal() {
        let fx = fixture();
        let err = fx
            .coordinator
            .resolve_policy(&requirement(), None, None)
            .await
            .unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(err.oauth_error_code(), "server_error");
    }

    // -------------------------------------------------------------------------
    // Dispatch
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_journey_dispatch_links_state_and_journey() {
        let fx = fixture();
        seed_basics(&fx);

        let outcome = fx
            .coordinator
            .begin_authorization(&requirement(), protocol_state(), None)
            .await
            .unwrap();

        let url = Url::parse(outcome.redirect_url().unwrap()).unwrap();
        assert_eq!(url.path(), "/journey");
        let journey_id: Uuid = url
            .query_pairs()
            .find(|(k, _)| k == "journey_id")
            .map(|(_, v)| v.parse().unwrap())
            .unwrap();

        let journey = fx.journeys.find_by_id(journey_id).await.unwrap().unwrap();
        assert_eq!(journey.status, JourneyStatus::Running);
        // The journey knows where to send the user afterwards.
        let callback = journey.bag.get_str("callback_url").unwrap();
        assert!(callback.contains("/connect/authorize/callback"));
        assert!(callback.contains("correlation_id="));
    }

    #[tokio::test]
    async fn test_standalone_dispatch_embeds_return_url() {
        let fx = fixture();
        seed_basics(&fx);
        let mut client = Client::new("app");
        client.journeys_enabled = Some(false);
        fx.clients.insert(client);

        let mut req = requirement();
        req.suggested_policy_kind = PolicyKind::SignUp;
        // Register a sign-up policy so resolution succeeds.
        fx.policies.insert(JourneyPolicy {
            kind: PolicyKind::SignUp,
            ..signin_policy("signup-default", None)
        });

        let outcome = fx
            .coordinator
            .begin_authorization(&req, protocol_state(), None)
            .await
            .unwrap();

        let url = Url::parse(outcome.redirect_url().unwrap()).unwrap();
        assert_eq!(url.path(), "/account/register");
        let return_url = url
            .query_pairs()
            .find(|(k, _)| k == "returnUrl")
            .map(|(_, v)| v.to_string())
            .unwrap();
        assert!(return_url.contains("/connect/authorize/callback"));
    }

    #[tokio::test]
    async fn test_headless_dispatch_returns_structured_challenge() {
        let fx = fixture();
        seed_basics(&fx);

        let mut req = requirement();
        req.requested_ui_mode = Some(UiMode::Headless);
        req.acr_values = vec!["mfa".to_string()];

        let outcome = fx
            .coordinator
            .begin_authorization(&req, protocol_state(), None)
            .await
            .unwrap();

        match outcome {
            AuthorizationOutcome::AuthenticationRequired(reqs) => {
                assert_eq!(reqs.error, "login_required");
                assert_eq!(reqs.policy_id, "signin-default");
                assert_eq!(reqs.required_scopes, vec!["openid"]);
                assert_eq!(reqs.acr_values, vec!["mfa"]);
            }
            other => panic!("expected AuthenticationRequired, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unknown_client_is_rejected() {
        let fx = fixture();
        // No client registered.
        let err = fx
            .coordinator
            .begin_authorization(&requirement(), protocol_state(), None)
            .await
            .unwrap_err();
        assert_eq!(err.oauth_error_code(), "invalid_client");
    }

    // -------------------------------------------------------------------------
    // Callback handling
    // -------------------------------------------------------------------------

    async fn park_with_journey(fx: &Fixture, journey: &JourneyState) -> String {
        let mut state = protocol_state();
        state
            .properties
            .insert(PROP_JOURNEY_ID.to_string(), journey.id.to_string());
        fx.journeys.save(journey).await.unwrap();
        fx.protocol_state
            .store(state, std::time::Duration::from_secs(600))
            .await
            .unwrap()
    }

    fn completed_journey(authenticated: bool) -> JourneyState {
        let mut journey = JourneyState::new("signin-default");
        journey.status = JourneyStatus::Completed;
        journey.authenticated_user_id = Some("user-1".to_string());
        journey.bag.set("email", "alice@example.com");
        if authenticated {
            journey.bag.set(
                KEY_AUTHENTICATED_AT,
                OffsetDateTime::now_utc().unix_timestamp(),
            );
            journey.bag.set(KEY_AUTH_METHOD, "pwd");
        }
        journey
    }

    #[tokio::test]
    async fn test_callback_resumes_completed_journey() {
        let fx = fixture();
        seed_basics(&fx);
        let journey = completed_journey(true);
        let correlation_id = park_with_journey(&fx, &journey).await;

        let resumed = fx
            .coordinator
            .handle_callback(&correlation_id, Some(journey.id), None)
            .await
            .unwrap();

        assert_eq!(resumed.subject_id, "user-1");
        assert!(resumed.session_id.is_some());
        assert_eq!(resumed.auth_methods, vec!["pwd"]);
        assert_eq!(resumed.claims.get_str("email"), Some("alice@example.com"));

        // The journey record is consumed along with the correlation ID.
        assert!(fx.journeys.find_by_id(journey.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_correlation_id_is_single_use() {
        let fx = fixture();
        seed_basics(&fx);
        let journey = completed_journey(true);
        let correlation_id = park_with_journey(&fx, &journey).await;

        fx.coordinator
            .handle_callback(&correlation_id, Some(journey.id), None)
            .await
            .unwrap();

        // Second use of the same correlation ID must fail.
        let err = fx
            .coordinator
            .handle_callback(&correlation_id, Some(journey.id), None)
            .await
            .unwrap_err();
        assert_eq!(err.oauth_error_code(), "invalid_request");
    }

    #[tokio::test]
    async fn test_incomplete_journey_is_denied() {
        let fx = fixture();
        seed_basics(&fx);
        let mut journey = completed_journey(true);
        journey.status = JourneyStatus::Running;
        let correlation_id = park_with_journey(&fx, &journey).await;

        let err = fx
            .coordinator
            .handle_callback(&correlation_id, Some(journey.id), None)
            .await
            .unwrap_err();
        assert_eq!(err.oauth_error_code(), "access_denied");
    }

    #[tokio::test]
    async fn test_claims_only_journey_issues_no_session() {
        let fx = fixture();
        seed_basics(&fx);
        // User ID present, but no authenticated_at convention keys.
        let journey = completed_journey(false);
        let correlation_id = park_with_journey(&fx, &journey).await;

        let resumed = fx
            .coordinator
            .handle_callback(&correlation_id, Some(journey.id), None)
            .await
            .unwrap();

        assert_eq!(resumed.subject_id, "user-1");
        assert!(resumed.session_id.is_none());
        assert!(resumed.auth_time.is_none());
    }

    #[tokio::test]
    async fn test_mismatched_journey_is_denied() {
        let fx = fixture();
        seed_basics(&fx);
        let journey = completed_journey(true);
        let correlation_id = park_with_journey(&fx, &journey).await;

        let other = completed_journey(true);
        fx.journeys.save(&other).await.unwrap();

        let err = fx
            .coordinator
            .handle_callback(&correlation_id, Some(other.id), None)
            .await
            .unwrap_err();
        assert_eq!(err.oauth_error_code(), "access_denied");
    }

    #[tokio::test]
    async fn test_standalone_callback_requires_live_session() {
        let fx = fixture();
        seed_basics(&fx);

        let correlation_id = fx
            .protocol_state
            .store(protocol_state(), std::time::Duration::from_secs(600))
            .await
            .unwrap();

        // No session token at all.
        let err = fx
            .coordinator
            .handle_callback(&correlation_id, None, None)
            .await
            .unwrap_err();
        assert_eq!(err.oauth_error_code(), "access_denied");

        // With a live session the resume succeeds.
        let correlation_id = fx
            .protocol_state
            .store(protocol_state(), std::time::Duration::from_secs(600))
            .await
            .unwrap();
        fx.sessions.insert("token-1", session());

        let resumed = fx
            .coordinator
            .handle_callback(&correlation_id, None, Some("token-1"))
            .await
            .unwrap();
        assert_eq!(resumed.subject_id, "user-1");
        assert_eq!(resumed.session_id.as_deref(), Some("sess-1"));
    }

    // -------------------------------------------------------------------------
    // Consent
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_consent_journey_targets_authorize_endpoint() {
        let fx = fixture();
        seed_basics(&fx);
        fx.policies.insert(JourneyPolicy {
            kind: PolicyKind::Consent,
            ui_entry_url: "/consent-journey".to_string(),
            ..signin_policy("consent-default", None)
        });

        let outcome = fx
            .coordinator
            .require_consent(
                protocol_state(),
                &Client::new("app"),
                UiMode::Journey,
                &["openid".to_string(), "api:read".to_string()],
            )
            .await
            .unwrap();

        let url = Url::parse(outcome.redirect_url().unwrap()).unwrap();
        assert_eq!(url.path(), "/consent-journey");

        let journey_id: Uuid = url
            .query_pairs()
            .find(|(k, _)| k == "journey_id")
            .map(|(_, v)| v.parse().unwrap())
            .unwrap();
        let journey = fx.journeys.find_by_id(journey_id).await.unwrap().unwrap();

        // The consent journey re-enters authorize, not the callback path.
        let callback = journey.bag.get_str("callback_url").unwrap();
        assert!(callback.contains("/connect/authorize?"));
        assert!(callback.contains("correlation_id="));
    }

    #[tokio::test]
    async fn test_consent_falls_back_to_standalone_page() {
        let fx = fixture();
        seed_basics(&fx);
        // No consent policy registered.

        let outcome = fx
            .coordinator
            .require_consent(
                protocol_state(),
                &Client::new("app"),
                UiMode::Journey,
                &["openid".to_string()],
            )
            .await
            .unwrap();

        let url = Url::parse(outcome.redirect_url().unwrap()).unwrap();
        assert_eq!(url.path(), "/account/consent");
    }

    #[tokio::test]
    async fn test_headless_consent_returns_structured_403() {
        let fx = fixture();
        seed_basics(&fx);
        let mut client = Client::new("app");
        client.client_name = Some("Example App".to_string());

        let outcome = fx
            .coordinator
            .require_consent(
                protocol_state(),
                &client,
                UiMode::Headless,
                &["openid".to_string(), "api:read".to_string()],
            )
            .await
            .unwrap();

        match outcome {
            AuthorizationOutcome::ConsentRequired(reqs) => {
                assert_eq!(reqs.error, "consent_required");
                assert_eq!(reqs.client_id, "app");
                assert_eq!(reqs.client_name.as_deref(), Some("Example App"));
                assert_eq!(reqs.scopes, vec!["openid", "api:read"]);
            }
            other => panic!("expected ConsentRequired, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_consent_parameters_are_stored_on_state() {
        let fx = fixture();
        seed_basics(&fx);

        let outcome = fx
            .coordinator
            .require_consent(
                protocol_state(),
                &Client::new("app"),
                UiMode::Standalone,
                &["openid".to_string()],
            )
            .await
            .unwrap();

        // Pull the fresh correlation ID out of the returnUrl and inspect
        // the re-parked state.
        let url = Url::parse(outcome.redirect_url().unwrap()).unwrap();
        let return_url = url
            .query_pairs()
            .find(|(k, _)| k == "returnUrl")
            .map(|(_, v)| v.to_string())
            .unwrap();
        let return_url = Url::parse(&return_url).unwrap();
        let correlation_id = return_url
            .query_pairs()
            .find(|(k, _)| k == CORRELATION_PARAM)
            .map(|(_, v)| v.to_string())
            .unwrap();

        let state = fx
            .protocol_state
            .get(&correlation_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(state.properties.get("consent_requested").unwrap(), "true");
        assert_eq!(state.properties.get("consent_scopes").unwrap(), "openid");
    }
}
