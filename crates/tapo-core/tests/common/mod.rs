//! In-process fake Tapo plugs for integration tests.
//!
//! Each fake is a wiremock server whose responders share one state object,
//! so the device side of the handshake and the encrypted request endpoint
//! see the same session.

#![allow(dead_code)]

use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

use base64::{Engine, engine::general_purpose::STANDARD};
use rsa::{Pkcs1v15Encrypt, RsaPublicKey, pkcs8::DecodePublicKey, rand_core::OsRng};
use serde_json::{Value, json};
use tapo_core::{
    Credentials, EncryptionType, LegacyRsaHandshake, Plug, PlugConfig, SessionManager,
    credentials::PassthroughLogin,
    crypto::{
        KlapEncryptionSession, PassthroughCipher, RsaKeyPair,
        hash::random_seed,
        klap::{handshake1_server_hash, handshake2_payload},
        passthrough::RSA_KEY_BITS,
    },
};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

/// Credentials the fakes are provisioned with.
pub fn device_credentials() -> Credentials {
    Credentials::new("john@doe.com", "Secret")
}

/// One RSA key pair per test binary; generation is slow in debug builds.
pub fn shared_key_pair() -> RsaKeyPair {
    static KEY_PAIR: OnceLock<RsaKeyPair> = OnceLock::new();
    KEY_PAIR
        .get_or_init(|| RsaKeyPair::generate(RSA_KEY_BITS).unwrap())
        .clone()
}

fn cookie_header(request: &Request) -> Option<String> {
    request
        .headers
        .get("cookie")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

fn query_value(request: &Request, name: &str) -> Option<String> {
    request
        .url
        .query_pairs()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
}

/// Device behaviour shared by both protocol generations.
#[derive(Debug)]
pub struct DeviceModel {
    pub model: &'static str,
    pub device_on: bool,
    /// Codes returned, in order, by the next commands.
    pub fail_next: Vec<i32>,
    /// Code returned by every command.
    pub always_fail: Option<i32>,
    /// Methods received, in order.
    pub methods: Vec<String>,
}

impl Default for DeviceModel {
    fn default() -> Self {
        Self {
            model: "P110",
            device_on: true,
            fail_next: Vec::new(),
            always_fail: None,
            methods: Vec::new(),
        }
    }
}

impl DeviceModel {
    pub fn handle(&mut self, request: &Value) -> Value {
        let method = request["method"].as_str().unwrap_or_default().to_string();
        self.methods.push(method.clone());

        if let Some(code) = self.always_fail {
            return json!({ "error_code": code });
        }
        if !self.fail_next.is_empty() {
            let code = self.fail_next.remove(0);
            return json!({ "error_code": code });
        }

        match method.as_str() {
            "get_device_info" => json!({
                "error_code": 0,
                "result": {
                    "device_id": "80223A1B",
                    "model": self.model,
                    "type": "SMART.TAPOPLUG",
                    "fw_ver": "1.1.3 Build 220603 Rel.170853",
                    "hw_ver": "1.0",
                    "mac": "AC-84-C6-00-11-22",
                    "device_on": self.device_on,
                    "on_time": if self.device_on { 3600 } else { 0 },
                    "rssi": -52,
                    "signal_level": 2,
                    "ssid": STANDARD.encode("MyWifi"),
                    "nickname": STANDARD.encode("Desk Lamp"),
                    "overheated": false
                }
            }),
            "get_energy_usage" => json!({
                "error_code": 0,
                "result": {
                    "today_runtime": 120,
                    "month_runtime": 4300,
                    "today_energy": 85,
                    "month_energy": 2710,
                    "local_time": "2024-03-01 12:00:00",
                    "current_power": if self.device_on { 12345 } else { 0 }
                }
            }),
            "set_device_info" => {
                if let Some(on) = request["params"]["device_on"].as_bool() {
                    self.device_on = on;
                }
                json!({ "error_code": 0 })
            }
            _ => json!({ "error_code": -1 }),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// KLAP
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct KlapState {
    auth_hash: [u8; 32],
    local_seed: Vec<u8>,
    remote_seed: [u8; 16],
    cookie: Option<String>,
    session: Option<KlapEncryptionSession>,
    /// `TIMEOUT` attribute of the session cookie; `None` omits it.
    pub cookie_timeout: Option<u64>,
    /// Whether handshake1 sets a cookie at all.
    pub send_cookie: bool,
    pub handshakes: usize,
    /// Sequence numbers of the requests received.
    pub seqs: Vec<i32>,
    pub device: DeviceModel,
}

pub struct KlapDevice {
    server: MockServer,
    state: Arc<Mutex<KlapState>>,
}

impl KlapDevice {
    pub async fn start() -> Self {
        let state = Arc::new(Mutex::new(KlapState {
            auth_hash: device_credentials().klap_auth_hash(),
            local_seed: Vec::new(),
            remote_seed: [0; 16],
            cookie: None,
            session: None,
            cookie_timeout: Some(86400),
            send_cookie: true,
            handshakes: 0,
            seqs: Vec::new(),
            device: DeviceModel::default(),
        }));

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/app/handshake1"))
            .respond_with(KlapHandshake1(Arc::clone(&state)))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/app/handshake2"))
            .respond_with(KlapHandshake2(Arc::clone(&state)))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/app/request"))
            .respond_with(KlapRequest(Arc::clone(&state)))
            .mount(&server)
            .await;

        Self { server, state }
    }

    pub fn config(&self, credentials: Credentials) -> PlugConfig {
        PlugConfig::new("127.0.0.1", credentials)
            .with_port(self.server.address().port())
            .with_encryption(EncryptionType::Klap)
    }

    pub fn state(&self) -> MutexGuard<'_, KlapState> {
        self.state.lock().unwrap()
    }
}

struct KlapHandshake1(Arc<Mutex<KlapState>>);

impl Respond for KlapHandshake1 {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let mut state = self.0.lock().unwrap();
        state.handshakes += 1;
        state.session = None;
        state.local_seed = request.body.clone();
        state.remote_seed = random_seed();

        let server_hash =
            handshake1_server_hash(&state.local_seed, &state.remote_seed, &state.auth_hash);
        let mut body = state.remote_seed.to_vec();
        body.extend_from_slice(&server_hash);

        let cookie = format!("TP_SESSIONID=KLAP{}", state.handshakes);
        state.cookie = Some(cookie.clone());

        let mut response = ResponseTemplate::new(200).set_body_bytes(body);
        if state.send_cookie {
            let value = match state.cookie_timeout {
                Some(timeout) => format!("{};TIMEOUT={}", cookie, timeout),
                None => cookie,
            };
            response = response.insert_header("Set-Cookie", value.as_str());
        }
        response
    }
}

struct KlapHandshake2(Arc<Mutex<KlapState>>);

impl Respond for KlapHandshake2 {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let mut state = self.0.lock().unwrap();
        let expected = handshake2_payload(&state.local_seed, &state.remote_seed, &state.auth_hash);
        if cookie_header(request) != state.cookie || request.body != expected {
            return ResponseTemplate::new(403);
        }
        state.session = Some(KlapEncryptionSession::new(
            &state.local_seed,
            &state.remote_seed,
            &state.auth_hash,
        ));
        ResponseTemplate::new(200)
    }
}

struct KlapRequest(Arc<Mutex<KlapState>>);

impl Respond for KlapRequest {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let mut state = self.0.lock().unwrap();
        if cookie_header(request) != state.cookie {
            return ResponseTemplate::new(403);
        }
        let Some(seq) = query_value(request, "seq").and_then(|s| s.parse::<i32>().ok()) else {
            return ResponseTemplate::new(400);
        };
        let Some(session) = state.session.clone() else {
            return ResponseTemplate::new(403);
        };
        if !session.verify(&request.body, seq) {
            return ResponseTemplate::new(400);
        }
        let Ok(plaintext) = session.decrypt(&request.body, seq) else {
            return ResponseTemplate::new(400);
        };
        let Ok(command) = serde_json::from_slice::<Value>(&plaintext) else {
            return ResponseTemplate::new(400);
        };

        state.seqs.push(seq);
        let reply = state.device.handle(&command);
        ResponseTemplate::new(200)
            .set_body_bytes(session.encrypt_with_seq(reply.to_string().as_bytes(), seq))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// securePassthrough
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct PassthroughState {
    expected_login: PassthroughLogin,
    cipher: Option<PassthroughCipher>,
    token: Option<String>,
    pub handshakes: usize,
    /// Path and query of every securePassthrough request.
    pub request_paths: Vec<String>,
    /// Cookie header of every securePassthrough request.
    pub cookies: Vec<Option<String>>,
    pub device: DeviceModel,
}

pub struct PassthroughDevice {
    server: MockServer,
    state: Arc<Mutex<PassthroughState>>,
}

impl PassthroughDevice {
    pub async fn start() -> Self {
        let state = Arc::new(Mutex::new(PassthroughState {
            expected_login: device_credentials().passthrough_login(),
            cipher: None,
            token: None,
            handshakes: 0,
            request_paths: Vec::new(),
            cookies: Vec::new(),
            device: DeviceModel::default(),
        }));

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/app"))
            .respond_with(PassthroughApp(Arc::clone(&state)))
            .mount(&server)
            .await;

        Self { server, state }
    }

    pub fn config(&self, credentials: Credentials) -> PlugConfig {
        PlugConfig::new("127.0.0.1", credentials)
            .with_port(self.server.address().port())
            .with_encryption(EncryptionType::Aes)
    }

    /// A plug wired to this device, reusing the shared RSA key pair.
    pub fn plug(&self, credentials: Credentials) -> Plug {
        let config = self.config(credentials);
        let strategy = LegacyRsaHandshake::with_key_pair(shared_key_pair());
        let session = SessionManager::with_strategy(&config, Box::new(strategy));
        Plug::with_session(config, session).unwrap()
    }

    pub fn state(&self) -> MutexGuard<'_, PassthroughState> {
        self.state.lock().unwrap()
    }
}

struct PassthroughApp(Arc<Mutex<PassthroughState>>);

impl PassthroughApp {
    fn handshake(state: &mut PassthroughState, request: &Value) -> ResponseTemplate {
        let Some(public) = request["params"]["key"]
            .as_str()
            .and_then(|pem| RsaPublicKey::from_public_key_pem(pem).ok())
        else {
            return ResponseTemplate::new(200).set_body_json(json!({ "error_code": 1010 }));
        };

        let material: [u8; 32] = std::array::from_fn(|i| (i as u8).wrapping_mul(7).wrapping_add(3));
        let blob = public
            .encrypt(&mut OsRng, Pkcs1v15Encrypt, &material)
            .unwrap();
        state.cipher = Some(PassthroughCipher::from_key_material(&material).unwrap());
        state.token = None;
        state.handshakes += 1;

        ResponseTemplate::new(200)
            .set_body_json(json!({
                "error_code": 0,
                "result": { "key": STANDARD.encode(blob) }
            }))
            .insert_header(
                "Set-Cookie",
                format!("TP_SESSIONID=LEGACY{};TIMEOUT=1440", state.handshakes).as_str(),
            )
    }

    fn passthrough(state: &mut PassthroughState, http: &Request, request: &Value) -> ResponseTemplate {
        state.request_paths.push(match http.url.query() {
            Some(query) => format!("{}?{}", http.url.path(), query),
            None => http.url.path().to_string(),
        });
        state.cookies.push(cookie_header(http));

        let Some(cipher) = state.cipher.clone() else {
            return ResponseTemplate::new(200).set_body_json(json!({ "error_code": 9999 }));
        };
        let Some(inner) = request["params"]["request"]
            .as_str()
            .and_then(|encoded| cipher.decrypt(encoded).ok())
            .and_then(|plaintext| serde_json::from_slice::<Value>(&plaintext).ok())
        else {
            return ResponseTemplate::new(200).set_body_json(json!({ "error_code": 1003 }));
        };

        let reply = if inner["method"] == "login_device" {
            let params = &inner["params"];
            if params["username"] == state.expected_login.username.as_str()
                && params["password"] == state.expected_login.password.as_str()
            {
                let token = format!("TOKEN{}", state.handshakes);
                state.token = Some(token.clone());
                json!({ "error_code": 0, "result": { "token": token } })
            } else {
                json!({ "error_code": -1501 })
            }
        } else {
            if state.token.is_none() || query_value(http, "token") != state.token {
                return ResponseTemplate::new(200).set_body_json(json!({ "error_code": 9999 }));
            }
            state.device.handle(&inner)
        };

        ResponseTemplate::new(200).set_body_json(json!({
            "error_code": 0,
            "result": { "response": cipher.encrypt(reply.to_string().as_bytes()) }
        }))
    }
}

impl Respond for PassthroughApp {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let mut state = self.0.lock().unwrap();
        let Ok(body) = serde_json::from_slice::<Value>(&request.body) else {
            return ResponseTemplate::new(400);
        };
        match body["method"].as_str() {
            Some("handshake") => Self::handshake(&mut state, &body),
            Some("securePassthrough") => Self::passthrough(&mut state, request, &body),
            _ => ResponseTemplate::new(200).set_body_json(json!({ "error_code": 1002 })),
        }
    }
}
