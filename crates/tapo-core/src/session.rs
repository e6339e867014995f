//! Session manager: owns the device session and runs commands through it.
//!
//! The manager decides when to (re)run the handshake: when there is no
//! session, when the cookie lifetime has passed, and after any failed
//! command. Every state change goes through `&mut self`, so one manager
//! never sees two requests in flight and the KLAP sequence stays gapless.

use std::time::Instant;

use serde_json::Value;
use tracing::{debug, warn};

use crate::{
    Credentials,
    commands::Request,
    config::{EncryptionType, PlugConfig},
    envelope::CipherEnvelope,
    error::{Error, ErrorCode},
    handshake::{HandshakeStrategy, require_ok, strategy_for},
    response::DeviceReply,
    transport::HttpClient,
};

/// Authentication state of a device session.
#[derive(Debug)]
pub enum SessionState {
    /// No session; the next command handshakes.
    Unauthenticated,
    /// A handshake is running (or was abandoned mid-way).
    Handshaking,
    /// Keys and cookie are live.
    Authenticated(ActiveSession),
    /// The cookie lifetime passed; the next command handshakes.
    Expired,
}

impl SessionState {
    /// The live session, if any.
    pub fn active(&self) -> Option<&ActiveSession> {
        match self {
            Self::Authenticated(active) => Some(active),
            _ => None,
        }
    }
}

/// Key material and lifetime of an authenticated session.
#[derive(Debug)]
pub struct ActiveSession {
    envelope: CipherEnvelope,
    established_at: Instant,
    expires_at: Option<Instant>,
}

impl ActiveSession {
    /// When the handshake completed.
    pub fn established_at(&self) -> Instant {
        self.established_at
    }

    /// When the device forgets the session, if it said.
    pub fn expires_at(&self) -> Option<Instant> {
        self.expires_at
    }

    /// Returns `true` strictly before the expiry instant.
    pub fn is_valid_at(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|expires_at| now < expires_at)
    }

    /// Current KLAP sequence number.
    pub fn seq(&self) -> Option<i32> {
        self.envelope.seq()
    }
}

/// Counts consecutive failures carrying the same device error code.
#[derive(Debug, Clone)]
pub(crate) struct FaultTracker {
    threshold: u32,
    code: Option<ErrorCode>,
    count: u32,
}

impl FaultTracker {
    pub(crate) fn new(threshold: u32) -> Self {
        Self {
            threshold: threshold.max(1),
            code: None,
            count: 0,
        }
    }

    pub(crate) fn count(&self) -> u32 {
        self.count
    }

    /// Passes `result` through, upgrading a repeated device error to
    /// [`Error::PersistentFault`] once the streak reaches the threshold.
    /// Other errors leave the streak untouched.
    pub(crate) fn observe<T>(&mut self, result: Result<T, Error>) -> Result<T, Error> {
        match result {
            Ok(value) => {
                self.code = None;
                self.count = 0;
                Ok(value)
            }
            Err(Error::Device(code)) => {
                if self.code == Some(code) {
                    self.count += 1;
                } else {
                    self.code = Some(code);
                    self.count = 1;
                }
                if self.count >= self.threshold {
                    Err(Error::PersistentFault {
                        code,
                        attempts: self.count,
                    })
                } else {
                    Err(Error::Device(code))
                }
            }
            Err(other) => Err(other),
        }
    }
}

/// Owns one device's session and executes authenticated commands.
pub struct SessionManager {
    client: HttpClient,
    credentials: Credentials,
    strategy: Box<dyn HandshakeStrategy>,
    state: SessionState,
    faults: FaultTracker,
}

impl SessionManager {
    /// Creates a manager using the handshake for `config.encryption`.
    pub fn new(config: &PlugConfig) -> Self {
        Self::with_strategy(config, strategy_for(config.encryption))
    }

    /// Creates a manager with an explicit handshake strategy.
    pub fn with_strategy(config: &PlugConfig, strategy: Box<dyn HandshakeStrategy>) -> Self {
        Self {
            client: HttpClient::new(config.host.clone(), config.port, config.timeout),
            credentials: config.credentials.clone(),
            strategy,
            state: SessionState::Unauthenticated,
            faults: FaultTracker::new(config.fault_threshold),
        }
    }

    /// Device host.
    pub fn host(&self) -> &str {
        self.client.host()
    }

    /// Protocol generation in use.
    pub fn encryption_type(&self) -> EncryptionType {
        self.strategy.encryption_type()
    }

    /// Current session state. A lapsed session reads as `Authenticated`
    /// until [`expire_lapsed`](Self::expire_lapsed) or the next command
    /// notices.
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Returns `true` if a live, unexpired session exists.
    pub fn is_authenticated(&self) -> bool {
        self.is_authenticated_at(Instant::now())
    }

    /// Returns `true` if the session is authenticated and unexpired at `now`.
    pub fn is_authenticated_at(&self, now: Instant) -> bool {
        matches!(&self.state, SessionState::Authenticated(active) if active.is_valid_at(now))
    }

    /// Identical device errors in a row.
    pub fn consecutive_failures(&self) -> u32 {
        self.faults.count()
    }

    /// Drops the session; the next command handshakes again.
    pub fn invalidate(&mut self) {
        if matches!(self.state, SessionState::Authenticated(_)) {
            warn!(host = self.client.host(), "Invalidating session");
        }
        self.state = SessionState::Unauthenticated;
        self.client.clear_cookie();
    }

    /// Moves a session whose lifetime has passed at `now` to
    /// [`SessionState::Expired`], dropping its keys and cookie. Returns
    /// `true` if it did.
    pub fn expire_lapsed(&mut self, now: Instant) -> bool {
        let lapsed = matches!(
            &self.state,
            SessionState::Authenticated(active) if !active.is_valid_at(now)
        );
        if lapsed {
            debug!(host = self.client.host(), "Session expired");
            self.state = SessionState::Expired;
            self.client.clear_cookie();
        }
        lapsed
    }

    /// Handshakes unless a live, unexpired session exists.
    pub async fn ensure_authenticated(&mut self) -> Result<(), Error> {
        self.expire_lapsed(Instant::now());
        if matches!(self.state, SessionState::Authenticated(_)) {
            return Ok(());
        }

        self.client.clear_cookie();
        self.state = SessionState::Handshaking;

        match self
            .strategy
            .establish(&mut self.client, &self.credentials)
            .await
        {
            Ok(established) => {
                self.state = SessionState::Authenticated(ActiveSession {
                    envelope: established.envelope,
                    established_at: Instant::now(),
                    expires_at: established.expires_at,
                });
                Ok(())
            }
            Err(e) => {
                debug!(host = self.client.host(), error = %e, "Handshake failed");
                self.client.clear_cookie();
                self.state = SessionState::Unauthenticated;
                Err(e)
            }
        }
    }

    /// Runs `method` with optional `params` and returns the reply `result`.
    ///
    /// Any failure drops the session. A device error repeated across
    /// [`PlugConfig::fault_threshold`] consecutive attempts is reported as
    /// [`Error::PersistentFault`].
    pub async fn execute(&mut self, method: &str, params: Option<Value>) -> Result<Value, Error> {
        let request = match params {
            Some(params) => Request::with_params(method, params),
            None => Request::new(method),
        };
        let result = self.execute_request(&request).await;
        if let Err(e) = &result
            && e.invalidates_session()
        {
            self.invalidate();
        }
        self.faults.observe(result)
    }

    async fn execute_request(&mut self, request: &Request) -> Result<Value, Error> {
        self.ensure_authenticated().await?;
        let payload = request.to_json()?;

        let SessionState::Authenticated(active) = &mut self.state else {
            return Err(Error::Protocol("session not established".into()));
        };
        let sealed = active.envelope.seal(payload.as_bytes())?;

        debug!(
            host = self.client.host(),
            method = %request.method,
            seq = ?sealed.seq,
            "Sending request"
        );

        let response = self
            .client
            .post(&sealed.path, &sealed.body, sealed.content_type)
            .await?;
        require_ok(&response, &sealed.path)?;

        let SessionState::Authenticated(active) = &self.state else {
            return Err(Error::Protocol("session not established".into()));
        };
        let plaintext = active.envelope.open(&sealed, &response.body)?;
        let reply: DeviceReply = serde_json::from_slice(&plaintext)?;

        if !reply.is_success() {
            warn!(
                host = self.client.host(),
                method = %request.method,
                code = reply.error_code,
                "Device returned error"
            );
        }
        reply.into_result()
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("client", &self.client)
            .field("encryption", &self.strategy.encryption_type())
            .field("state", &self.state)
            .finish()
    }
}
