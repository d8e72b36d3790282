//! The admission pipeline: an ordered list of named stages run before every
//! handler.
//!
//! The order is configuration, not an accident of layer nesting. The
//! production order is `rate_limit` → `authorization` so that unauthenticated
//! traffic is throttled before any token or store work happens.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    body::Body,
    extract::{ConnectInfo, FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use uuid::Uuid;

use crate::{
    error::{AppError, Result},
    state::AppState,
};

/// The verified identity of a call.
///
/// Produced only by the authorization stage; handlers read it through the
/// extractor and never look at tokens themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Principal {
    session_id: Uuid,
    user_id: Uuid,
}

impl Principal {
    pub(crate) fn new(session_id: Uuid, user_id: Uuid) -> Self {
        Self { session_id, user_id }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn user_id(&self) -> Uuid {
        self.user_id
    }
}

impl<S: Send + Sync> FromRequestParts<S> for Principal {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self> {
        parts
            .extensions
            .get::<Principal>()
            .copied()
            .ok_or(AppError::Unauthenticated)
    }
}

/// The client address as seen by the admission pipeline.
#[derive(Debug, Clone, Copy)]
pub struct ClientAddr(pub Option<SocketAddr>);

/// Resolves the transport peer of a request.
pub trait PeerResolver: Send + Sync {
    fn peer_addr(&self, request: &Request<Body>) -> Option<SocketAddr>;
}

/// Reads the peer from axum's `ConnectInfo`, which requires serving with
/// `into_make_service_with_connect_info::<SocketAddr>()`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConnectInfoPeer;

impl PeerResolver for ConnectInfoPeer {
    fn peer_addr(&self, request: &Request<Body>) -> Option<SocketAddr> {
        request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ci| ci.0)
    }
}

/// What the stages see of an inbound call.
#[derive(Debug, Clone)]
pub struct Call {
    method: String,
    peer: Option<SocketAddr>,
    authorization: Option<HeaderValue>,
    principal: Option<Principal>,
}

impl Call {
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            peer: None,
            authorization: None,
            principal: None,
        }
    }

    pub fn with_peer(mut self, peer: SocketAddr) -> Self {
        self.peer = Some(peer);
        self
    }

    pub fn with_authorization(mut self, value: HeaderValue) -> Self {
        self.authorization = Some(value);
        self
    }

    pub fn from_request(request: &Request<Body>, peers: &dyn PeerResolver) -> Self {
        Self {
            method: request.uri().path().to_string(),
            peer: peers.peer_addr(request),
            authorization: request.headers().get(header::AUTHORIZATION).cloned(),
            principal: None,
        }
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    pub fn authorization(&self) -> Option<&HeaderValue> {
        self.authorization.as_ref()
    }

    pub fn principal(&self) -> Option<Principal> {
        self.principal
    }

    pub(crate) fn set_principal(&mut self, principal: Principal) {
        self.principal = Some(principal);
    }
}

/// One admission step. Returning an error rejects the call and no later
/// stage or handler runs.
#[async_trait]
pub trait Stage: Send + Sync {
    fn name(&self) -> &'static str;

    async fn admit(&self, call: &mut Call) -> Result<()>;
}

/// Stages in the order they run.
#[derive(Clone, Default)]
pub struct Pipeline {
    stages: Vec<Arc<dyn Stage>>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `stage` after every stage already present.
    pub fn then(mut self, stage: Arc<dyn Stage>) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Runs every stage in order, stopping at the first rejection.
    pub async fn admit(&self, call: &mut Call) -> Result<()> {
        for stage in &self.stages {
            if let Err(e) = stage.admit(call).await {
                tracing::debug!(stage = stage.name(), method = %call.method(), code = e.code(), "call rejected");
                return Err(e);
            }
        }
        Ok(())
    }

    /// Admits `call`, then hands its principal to `handler`.
    pub async fn run<F, Fut, T>(&self, mut call: Call, handler: F) -> Result<T>
    where
        F: FnOnce(Option<Principal>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.admit(&mut call).await?;
        handler(call.principal()).await
    }
}

/// Axum middleware running the application's pipeline in front of every route.
///
/// Dropping the request future (client gone) drops any store call in flight.
pub async fn admit(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let call = Call::from_request(&request, state.peers.as_ref());
    let peer = call.peer();

    state
        .pipeline
        .run(call, |principal| async move {
            request.extensions_mut().insert(ClientAddr(peer));
            if let Some(principal) = principal {
                request.extensions_mut().insert(principal);
            }
            Ok(next.run(request).await)
        })
        .await
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Recorder {
        name: &'static str,
        seen: Arc<Mutex<Vec<&'static str>>>,
        reject: bool,
    }

    #[async_trait]
    impl Stage for Recorder {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn admit(&self, _call: &mut Call) -> Result<()> {
            self.seen.lock().unwrap().push(self.name);
            if self.reject {
                Err(AppError::ResourceExhausted)
            } else {
                Ok(())
            }
        }
    }

    fn recorder(name: &'static str, seen: &Arc<Mutex<Vec<&'static str>>>, reject: bool) -> Arc<dyn Stage> {
        Arc::new(Recorder { name, seen: seen.clone(), reject })
    }

    #[tokio::test]
    async fn stages_run_in_declared_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let pipeline = Pipeline::new()
            .then(recorder("first", &seen, false))
            .then(recorder("second", &seen, false));

        assert_eq!(pipeline.stage_names(), vec!["first", "second"]);
        let out = pipeline
            .run(Call::new("/x.Y/Z"), |principal| async move {
                assert!(principal.is_none());
                Ok(7)
            })
            .await
            .unwrap();
        assert_eq!(out, 7);
        assert_eq!(*seen.lock().unwrap(), vec!["first", "second"]);
    }

    #[tokio::test]
    async fn rejection_short_circuits() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let pipeline = Pipeline::new()
            .then(recorder("gate", &seen, true))
            .then(recorder("after", &seen, false));

        let mut handled = false;
        let result = pipeline
            .run(Call::new("/x.Y/Z"), |_| {
                handled = true;
                async { Ok(()) }
            })
            .await;

        assert!(matches!(result, Err(AppError::ResourceExhausted)));
        assert!(!handled);
        assert_eq!(*seen.lock().unwrap(), vec!["gate"]);
    }
}
