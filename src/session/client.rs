//! HTTP client with transparent session renewal.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{
    Response, StatusCode,
    multipart::{Form, Part},
};
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::json;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use url::Url;

use super::error::SessionError;
use super::request::{ApiRequest, FormField, RequestBody};
use super::store::SessionManager;
use crate::api::{RefreshResponse, SessionResponse};
use crate::db::UserProfile;
use crate::jwt::TokenPair;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

const REGISTER_PATH: &str = "/api/auth/register";
const LOGIN_PATH: &str = "/api/auth/login";
const REFRESH_PATH: &str = "/api/auth/refresh";
const LOGOUT_PATH: &str = "/api/auth/logout";
const ME_PATH: &str = "/api/users/me";

/// Called whenever the session is discarded because it could not be renewed.
pub trait ReauthHandler: Send + Sync {
    /// Send the user back to the login entry point.
    fn redirect_to_login(&self);
}

/// Does nothing. Callers inspect [`SessionError::requires_login`] instead.
pub struct NoopReauth;

impl ReauthHandler for NoopReauth {
    fn redirect_to_login(&self) {}
}

/// Which identifier a login uses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginHandle {
    Email(String),
    Phone(String),
}

impl LoginHandle {
    /// Anything containing `@` is treated as an email address.
    pub fn parse(input: &str) -> Self {
        let input = input.trim();
        if input.contains('@') {
            LoginHandle::Email(input.to_string())
        } else {
            LoginHandle::Phone(input.to_string())
        }
    }
}

/// Profile image attached to a registration.
#[derive(Debug, Clone)]
pub struct ProfileImage {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct RegisterForm {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub password: String,
    pub image: Option<ProfileImage>,
}

impl RegisterForm {
    /// JSON without an image, multipart with one.
    pub fn into_request(self) -> Result<ApiRequest, SessionError> {
        let Some(image) = self.image else {
            let body = json!({
                "name": self.name,
                "email": self.email,
                "phone": self.phone,
                "password": self.password,
            });
            return ApiRequest::post(REGISTER_PATH).json(&body);
        };

        let mut fields = vec![
            FormField::text("name", self.name),
            FormField::text("email", self.email),
            FormField::text("password", self.password),
        ];
        if let Some(phone) = self.phone {
            fields.push(FormField::text("phone", phone));
        }
        fields.push(FormField::file(
            "image",
            image.file_name,
            image.content_type,
            image.bytes,
        ));
        Ok(ApiRequest::post(REGISTER_PATH).multipart(fields))
    }
}

/// API client bound to one [`SessionManager`].
pub struct SessionClient {
    http: reqwest::Client,
    base_url: Url,
    session: Arc<SessionManager>,
    refresh_gate: Mutex<()>,
    reauth: Arc<dyn ReauthHandler>,
}

impl SessionClient {
    pub fn new(base_url: &str, session: Arc<SessionManager>) -> Result<Self, SessionError> {
        Self::with_timeout(base_url, session, DEFAULT_TIMEOUT)
    }

    /// `timeout` applies to every request, refresh exchanges included.
    pub fn with_timeout(
        base_url: &str,
        session: Arc<SessionManager>,
        timeout: Duration,
    ) -> Result<Self, SessionError> {
        let mut base_url = Url::parse(base_url)?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let http = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            http,
            base_url,
            session,
            refresh_gate: Mutex::new(()),
            reauth: Arc::new(NoopReauth),
        })
    }

    pub fn with_reauth_handler(mut self, handler: Arc<dyn ReauthHandler>) -> Self {
        self.reauth = handler;
        self
    }

    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn url(&self, path: &str) -> Result<Url, SessionError> {
        Ok(self.base_url.join(path.trim_start_matches('/'))?)
    }

    /// Build the wire request for `request`, optionally with a bearer token.
    pub fn build_request(
        &self,
        request: &ApiRequest,
        access_token: Option<&str>,
    ) -> Result<reqwest::Request, SessionError> {
        let mut builder = self
            .http
            .request(request.method.clone(), self.url(&request.path)?);

        if let Some(token) = access_token {
            builder = builder.bearer_auth(token);
        }

        builder = match &request.body {
            RequestBody::None => builder,
            RequestBody::Json(value) => builder.json(value),
            RequestBody::Multipart(fields) => builder.multipart(multipart_form(fields)?),
        };

        Ok(builder.build()?)
    }

    async fn dispatch(
        &self,
        request: &ApiRequest,
        access_token: Option<&str>,
    ) -> Result<Response, SessionError> {
        let wire = self.build_request(request, access_token)?;
        Ok(self.http.execute(wire).await?)
    }

    /// Send an authenticated request, renewing the session once on a 401.
    ///
    /// Non-success statuses other than 401 come back as [`SessionError::Api`].
    pub async fn send(&self, mut request: ApiRequest) -> Result<Response, SessionError> {
        let sent_with = self.session.access_token();
        let response = self.dispatch(&request, sent_with.as_deref()).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return error_for_status(response).await;
        }

        let rejection = read_error(response).await;
        if request.is_retried() {
            return Err(self.session_lost(SessionError::Unauthorized(rejection.message)));
        }
        request.mark_retried();

        debug!(path = %request.path, reason = %rejection.message, "Request unauthorized, renewing session");
        let fresh = self
            .renew_session(sent_with.as_deref(), rejection.message)
            .await?;

        let response = self.dispatch(&request, Some(&fresh)).await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            let rejection = read_error(response).await;
            warn!(path = %request.path, reason = %rejection.message, "Rejected again after renewal");
            return Err(self.session_lost(SessionError::Unauthorized(rejection.message)));
        }
        error_for_status(response).await
    }

    /// [`send`](Self::send) and decode the JSON body.
    pub async fn send_json<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T, SessionError> {
        decode(self.send(request).await?).await
    }

    /// Send without credentials and without renewal. Used for login and registration,
    /// where a 401 means bad credentials rather than a stale token.
    async fn send_public(&self, request: ApiRequest) -> Result<Response, SessionError> {
        let response = self.dispatch(&request, None).await?;
        error_for_status(response).await
    }

    /// Get a usable access token after `stale` was rejected.
    ///
    /// Serialized through the refresh gate. If another request already replaced
    /// the stale token, its result is reused and no exchange happens.
    async fn renew_session(
        &self,
        stale: Option<&str>,
        original_reason: String,
    ) -> Result<String, SessionError> {
        let _gate = self.refresh_gate.lock().await;

        let current = self.session.current();
        if let Some(access) = current.access_token {
            if stale != Some(access.as_str()) {
                debug!("Session already renewed by a concurrent request");
                return Ok(access);
            }
        }

        let Some(refresh_token) = current.refresh_token else {
            info!("No refresh token stored, session ended");
            return Err(self.session_lost(SessionError::Unauthorized(original_reason)));
        };

        match self.exchange(&refresh_token).await {
            Ok(pair) => {
                self.session.rotate(&pair)?;
                info!("Session renewed");
                Ok(pair.access_token)
            }
            Err(e) => {
                warn!(error = %e, "Refresh exchange failed");
                Err(self.session_lost(SessionError::RefreshExchangeFailed(e.to_string())))
            }
        }
    }

    async fn exchange(&self, refresh_token: &str) -> Result<TokenPair, SessionError> {
        let response = self
            .http
            .post(self.url(REFRESH_PATH)?)
            .json(&json!({ "refreshToken": refresh_token }))
            .send()
            .await?;
        let body: RefreshResponse = decode(error_for_status(response).await?).await?;
        Ok(body.tokens)
    }

    /// Drop all local state and hand control to the reauth handler.
    fn session_lost(&self, error: SessionError) -> SessionError {
        if let Err(e) = self.session.clear() {
            warn!(error = %e, "Failed to clear session storage");
        }
        self.reauth.redirect_to_login();
        error
    }

    /// Log in and store the returned pair.
    pub async fn login(&self, handle: LoginHandle, password: &str) -> Result<UserProfile, SessionError> {
        let body = match handle {
            LoginHandle::Email(email) => json!({ "email": email, "password": password }),
            LoginHandle::Phone(phone) => json!({ "phone": phone, "password": password }),
        };
        let request = ApiRequest::post(LOGIN_PATH).json(&body)?;
        let response: SessionResponse = decode(self.send_public(request).await?).await?;
        self.session.replace(&response.tokens, &response.user.id)?;
        info!(user_id = %response.user.id, "Logged in");
        Ok(response.user)
    }

    /// Register and store the returned pair.
    pub async fn register(&self, form: RegisterForm) -> Result<UserProfile, SessionError> {
        let request = form.into_request()?;
        let response: SessionResponse = decode(self.send_public(request).await?).await?;
        self.session.replace(&response.tokens, &response.user.id)?;
        info!(user_id = %response.user.id, "Registered");
        Ok(response.user)
    }

    /// Forget the local session, then tell the server. The server call is best effort.
    pub async fn logout(&self) -> Result<(), SessionError> {
        let cleared = self.session.clear();
        if let Err(e) = self.send_public(ApiRequest::post(LOGOUT_PATH)).await {
            warn!(error = %e, "Server logout failed");
        }
        cleared?;
        Ok(())
    }

    /// The logged-in user's profile.
    pub async fn me(&self) -> Result<UserProfile, SessionError> {
        self.send_json(ApiRequest::get(ME_PATH)).await
    }

    /// Exchange the refresh token now, without waiting for a 401.
    pub async fn refresh_now(&self) -> Result<(), SessionError> {
        let stale = self.session.access_token();
        self.renew_session(stale.as_deref(), "no refresh token stored".to_string())
            .await
            .map(|_| ())
    }
}

fn multipart_form(fields: &[FormField]) -> Result<Form, SessionError> {
    let mut form = Form::new();
    for field in fields {
        form = match field {
            FormField::Text { name, value } => form.text(name.clone(), value.clone()),
            FormField::File {
                name,
                file_name,
                content_type,
                bytes,
            } => {
                let part = Part::bytes(bytes.clone())
                    .file_name(file_name.clone())
                    .mime_str(content_type)?;
                form.part(name.clone(), part)
            }
        };
    }
    Ok(form)
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
    #[serde(default)]
    code: Option<String>,
}

struct Rejection {
    status: StatusCode,
    message: String,
    code: Option<String>,
}

async fn read_error(response: Response) -> Rejection {
    let status = response.status();
    match response.json::<ErrorBody>().await {
        Ok(body) => Rejection {
            status,
            message: body.error,
            code: body.code,
        },
        Err(_) => Rejection {
            status,
            message: status.canonical_reason().unwrap_or("error").to_string(),
            code: None,
        },
    }
}

async fn error_for_status(response: Response) -> Result<Response, SessionError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let rejection = read_error(response).await;
    Err(SessionError::Api {
        status: rejection.status,
        message: rejection.message,
        code: rejection.code,
    })
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, SessionError> {
    let bytes = response.bytes().await?;
    serde_json::from_slice(&bytes).map_err(|e| SessionError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};

    fn client(base: &str) -> SessionClient {
        SessionClient::new(base, Arc::new(SessionManager::in_memory())).unwrap()
    }

    #[test]
    fn test_url_join_keeps_base_path() {
        let client = client("http://localhost:7291/prefix");
        let request = client
            .build_request(&ApiRequest::get("/api/users/me"), None)
            .unwrap();
        assert_eq!(
            request.url().as_str(),
            "http://localhost:7291/prefix/api/users/me"
        );
    }

    #[test]
    fn test_invalid_base_url() {
        let result = SessionClient::new("not a url", Arc::new(SessionManager::in_memory()));
        assert!(matches!(result, Err(SessionError::InvalidUrl(_))));
    }

    #[test]
    fn test_bearer_attached_only_with_token() {
        let client = client("http://localhost:7291");
        let request = ApiRequest::get("/api/users/me");

        let with = client.build_request(&request, Some("abc")).unwrap();
        assert_eq!(with.headers().get(AUTHORIZATION).unwrap(), "Bearer abc");

        let without = client.build_request(&request, None).unwrap();
        assert!(without.headers().get(AUTHORIZATION).is_none());
    }

    #[test]
    fn test_body_variant_drives_content_type() {
        let client = client("http://localhost:7291");

        let none = client.build_request(&ApiRequest::post("/x"), None).unwrap();
        assert!(none.headers().get(CONTENT_TYPE).is_none());

        let json = ApiRequest::post("/x").json(&json!({ "a": 1 })).unwrap();
        let json = client.build_request(&json, None).unwrap();
        assert_eq!(json.headers().get(CONTENT_TYPE).unwrap(), "application/json");

        let multipart = ApiRequest::post("/x").multipart(vec![
            FormField::text("name", "Alice"),
            FormField::file("image", "a.png", "image/png", vec![1, 2, 3]),
        ]);
        let multipart = client.build_request(&multipart, None).unwrap();
        let content_type = multipart
            .headers()
            .get(CONTENT_TYPE)
            .unwrap()
            .to_str()
            .unwrap();
        assert!(content_type.starts_with("multipart/form-data; boundary="));
    }

    #[test]
    fn test_register_form_encoding() {
        let form = RegisterForm {
            name: "Alice".into(),
            email: "alice@example.com".into(),
            phone: None,
            password: "password123".into(),
            image: None,
        };
        assert!(matches!(
            form.clone().into_request().unwrap().body,
            RequestBody::Json(_)
        ));

        let with_image = RegisterForm {
            image: Some(ProfileImage {
                file_name: "a.png".into(),
                content_type: "image/png".into(),
                bytes: vec![1],
            }),
            ..form
        };
        assert!(matches!(
            with_image.into_request().unwrap().body,
            RequestBody::Multipart(_)
        ));
    }

    #[test]
    fn test_login_handle_parse() {
        assert_eq!(
            LoginHandle::parse(" a@example.com "),
            LoginHandle::Email("a@example.com".into())
        );
        assert_eq!(
            LoginHandle::parse("+15550001"),
            LoginHandle::Phone("+15550001".into())
        );
    }

    #[test]
    fn test_new_request_is_not_retried() {
        let mut request = ApiRequest::get("/api/users/me");
        assert!(!request.is_retried());
        request.mark_retried();
        assert!(request.is_retried());
    }
}
