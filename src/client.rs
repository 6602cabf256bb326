//! reqwest implementation of the API traits
//!
//! Every response is wrapped in the backend's envelope
//! `{ success, message, data, total }`. Reads are retried on transient
//! failures with linear back-off; mutations are sent exactly once.
use async_trait::async_trait;
use reqwest::header::IF_UNMODIFIED_SINCE;
use reqwest::{Client, Method, RequestBuilder};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::{debug, warn};

use crate::api::{
    ActorSource, BookingApi, BookingQuery, KycApi, Page, Pagination, Precondition, RemoteAck,
    SubAdminApi,
};
use crate::booking::{Booking, BookingStatus};
use crate::config::ClientConfig;
use crate::error::ApiError;
use crate::kyc::{KycDecision, KycFilter, KycPatch, KycRecord};
use crate::permission::{Actor, NewSubAdmin, Permission, PermissionSet, Role, SubAdmin};

#[derive(Debug, Deserialize)]
pub(crate) struct Envelope<T> {
    #[serde(default)]
    success: Option<bool>,
    #[serde(default)]
    message: Option<String>,
    data: Option<T>,
    #[serde(default)]
    total: Option<u64>,
}

impl<T> Envelope<T> {
    fn required(self) -> Result<T, ApiError> {
        self.data
            .ok_or_else(|| ApiError::InvalidResponse("response carried no data".into()))
    }

    fn into_page(self) -> Result<Page<T::Item>, ApiError>
    where
        T: IntoIterator,
    {
        let total = self.total;
        let data: Vec<_> = self.required()?.into_iter().collect();
        Ok(Page {
            total: total.unwrap_or(data.len() as u64),
            data,
        })
    }

    fn ack(&self) -> RemoteAck {
        RemoteAck {
            message: self.message.clone().filter(|m| !m.trim().is_empty()),
        }
    }
}

/// Decodes a response body. Non-2xx statuses and `success: false` both become
/// [`ApiError::Status`] carrying the server's message when there is one.
pub(crate) fn parse_envelope<T: DeserializeOwned>(status: u16, body: &str) -> Result<Envelope<T>, ApiError> {
    if !(200..300).contains(&status) {
        let message = serde_json::from_str::<Envelope<Value>>(body)
            .ok()
            .and_then(|e| e.message)
            .or_else(|| (!body.trim().is_empty()).then(|| body.trim().to_string()));
        return Err(ApiError::Status { status, message });
    }

    let envelope: Envelope<T> =
        serde_json::from_str(body).map_err(|e| ApiError::InvalidResponse(e.to_string()))?;
    if envelope.success == Some(false) {
        return Err(ApiError::Status {
            status,
            message: envelope.message,
        });
    }
    Ok(envelope)
}

/// `/auth/me` payload.
#[derive(Debug, Deserialize)]
struct Profile {
    id: String,
    role: Role,
    #[serde(default)]
    is_sub_admin: bool,
    #[serde(default)]
    permissions: Vec<Permission>,
}

impl From<Profile> for Actor {
    fn from(value: Profile) -> Self {
        Actor {
            id: value.id,
            role: value.role,
            sub_admin: value.is_sub_admin,
            permissions: PermissionSet::from_permissions(&value.permissions),
        }
    }
}

#[derive(Clone)]
pub struct HttpApi {
    client: Client,
    base_url: String,
    token: Option<String>,
    timeout: Duration,
    read_retries: u32,
    retry_backoff: Duration,
}

impl HttpApi {
    pub fn new(config: &ClientConfig) -> anyhow::Result<Self> {
        let client = Client::builder().connect_timeout(config.timeout).build()?;
        Ok(Self {
            client,
            base_url: config.api_url.trim_end_matches('/').to_string(),
            token: None,
            timeout: config.timeout,
            read_retries: config.read_retries,
            retry_backoff: config.retry_backoff,
        })
    }

    /// Bearer token of the signed-in user.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self.client.request(method, self.url(path));
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<Envelope<T>, ApiError> {
        tokio::time::timeout(self.timeout, exchange(request))
            .await
            .map_err(|_| ApiError::Timeout(self.timeout))?
    }

    // linear, saturating rather than overflowing
    fn backoff(&self, attempt: u32) -> Duration {
        self.retry_backoff.checked_mul(attempt).unwrap_or(Duration::MAX)
    }

    #[tracing::instrument(skip(self, query))]
    async fn read<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Envelope<T>, ApiError> {
        let mut attempt = 0;
        loop {
            let request = self.request(Method::GET, path).query(query);
            match self.send(request).await {
                Err(e) if e.is_retryable() && attempt < self.read_retries => {
                    attempt += 1;
                    warn!(error = %e, attempt, "read failed, retrying");
                    tokio::time::sleep(self.backoff(attempt)).await;
                }
                result => return result,
            }
        }
    }

    #[tracing::instrument(skip(self, body, precondition))]
    async fn mutate<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        precondition: Option<&Precondition>,
    ) -> Result<Envelope<T>, ApiError> {
        let mut request = self.request(method, path);
        if let Some(body) = body {
            request = request.json(&body);
        }
        if let Some(precondition) = precondition {
            request = request.header(IF_UNMODIFIED_SINCE, precondition.updated_at.to_http_date());
        }
        let envelope = self.send(request).await?;
        debug!("mutation accepted");
        Ok(envelope)
    }
}

async fn exchange<T: DeserializeOwned>(request: RequestBuilder) -> Result<Envelope<T>, ApiError> {
    let response = request.send().await?;
    let status = response.status().as_u16();
    let body = response.text().await?;
    parse_envelope(status, &body)
}

fn page_query(pagination: Pagination) -> Vec<(&'static str, String)> {
    vec![
        ("page", pagination.page.to_string()),
        ("limit", pagination.limit.to_string()),
    ]
}

pub(crate) fn bookings_query(query: &BookingQuery) -> Vec<(&'static str, String)> {
    let mut params = page_query(query.pagination);
    if let Some(status) = query.status {
        params.push(("status", status.as_str().to_string()));
    }
    params
}

#[async_trait]
impl BookingApi for HttpApi {
    async fn list_bookings(&self, query: &BookingQuery) -> Result<Page<Booking>, ApiError> {
        let path = format!("/{}/bookings", query.scope.as_str());
        self.read::<Vec<Booking>>(&path, &bookings_query(query))
            .await?
            .into_page()
    }

    async fn accept_booking(&self, id: &str, precondition: Option<&Precondition>) -> Result<RemoteAck, ApiError> {
        let path = format!("/bookings/{id}/accept");
        let envelope = self.mutate::<Value>(Method::PUT, &path, None, precondition).await?;
        Ok(envelope.ack())
    }

    async fn reject_booking(&self, id: &str, precondition: Option<&Precondition>) -> Result<RemoteAck, ApiError> {
        let path = format!("/bookings/{id}/reject");
        let envelope = self.mutate::<Value>(Method::PUT, &path, None, precondition).await?;
        Ok(envelope.ack())
    }

    async fn mark_booking_completed(
        &self,
        id: &str,
        precondition: Option<&Precondition>,
    ) -> Result<RemoteAck, ApiError> {
        let path = format!("/bookings/{id}/complete");
        let envelope = self.mutate::<Value>(Method::PUT, &path, None, precondition).await?;
        Ok(envelope.ack())
    }

    async fn admin_set_booking_status(
        &self,
        id: &str,
        status: BookingStatus,
        precondition: Option<&Precondition>,
    ) -> Result<RemoteAck, ApiError> {
        let path = format!("/admin/bookings/{id}/status");
        let body = json!({ "status": status });
        let envelope = self
            .mutate::<Value>(Method::PUT, &path, Some(body), precondition)
            .await?;
        Ok(envelope.ack())
    }

    async fn admin_delete_booking(&self, id: &str) -> Result<RemoteAck, ApiError> {
        let path = format!("/admin/bookings/{id}");
        let envelope = self.mutate::<Value>(Method::DELETE, &path, None, None).await?;
        Ok(envelope.ack())
    }
}

#[async_trait]
impl KycApi for HttpApi {
    async fn list_kyc(&self, filter: KycFilter, pagination: Pagination) -> Result<Page<KycRecord>, ApiError> {
        let mut query = page_query(pagination);
        if filter == KycFilter::Pending {
            query.push(("status", "pending".to_string()));
        }
        self.read::<Vec<KycRecord>>("/admin/kyc", &query)
            .await?
            .into_page()
    }

    async fn verify_kyc(
        &self,
        id: &str,
        decision: KycDecision,
        reason: Option<&str>,
    ) -> Result<RemoteAck, ApiError> {
        let path = format!("/admin/kyc/{id}/verify");
        let body = json!({ "status": decision, "rejected_reason": reason });
        let envelope = self.mutate::<Value>(Method::PUT, &path, Some(body), None).await?;
        Ok(envelope.ack())
    }

    async fn get_my_kyc(&self) -> Result<Option<KycRecord>, ApiError> {
        match self.read::<KycRecord>("/owner/kyc", &[]).await {
            Ok(envelope) => Ok(envelope.data),
            // no record yet
            Err(ApiError::Status { status: 404, .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn update_kyc(&self, patch: &KycPatch) -> Result<KycRecord, ApiError> {
        let body = serde_json::to_value(patch).map_err(|e| ApiError::InvalidResponse(e.to_string()))?;
        self.mutate::<KycRecord>(Method::PUT, "/owner/kyc", Some(body), None)
            .await?
            .required()
    }
}

#[async_trait]
impl SubAdminApi for HttpApi {
    async fn list_permissions(&self) -> Result<Vec<Permission>, ApiError> {
        self.read::<Vec<Permission>>("/admin/permissions", &[])
            .await?
            .required()
    }

    async fn list_sub_admins(&self, pagination: Pagination) -> Result<Page<SubAdmin>, ApiError> {
        self.read::<Vec<SubAdmin>>("/admin/sub-admins", &page_query(pagination))
            .await?
            .into_page()
    }

    async fn create_sub_admin(&self, sub_admin: &NewSubAdmin) -> Result<SubAdmin, ApiError> {
        let body = json!({
            "name": sub_admin.name,
            "email": sub_admin.email,
            "password": sub_admin.password,
            "permissions": sub_admin.permission_ids,
        });
        self.mutate::<SubAdmin>(Method::POST, "/admin/sub-admins", Some(body), None)
            .await?
            .required()
    }

    async fn update_sub_admin_permissions(
        &self,
        id: &str,
        permission_ids: &[String],
    ) -> Result<SubAdmin, ApiError> {
        let path = format!("/admin/sub-admins/{id}/permissions");
        let body = json!({ "permissions": permission_ids });
        self.mutate::<SubAdmin>(Method::PUT, &path, Some(body), None)
            .await?
            .required()
    }

    async fn delete_sub_admin(&self, id: &str) -> Result<RemoteAck, ApiError> {
        let path = format!("/admin/sub-admins/{id}");
        let envelope = self.mutate::<Value>(Method::DELETE, &path, None, None).await?;
        Ok(envelope.ack())
    }
}

#[async_trait]
impl ActorSource for HttpApi {
    async fn current_actor(&self) -> Result<Actor, ApiError> {
        let profile = self.read::<Profile>("/auth/me", &[]).await?.required()?;
        Ok(profile.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::BookingScope;
    use crate::error::LifecycleError;
    use crate::types::TimeStamp;
    use std::sync::{Arc, Mutex};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    // status 0 holds the connection open without answering
    const STALL: u16 = 0;
    const UNAVAILABLE: (u16, &str) = (503, r#"{"success":false,"message":"Service unavailable"}"#);
    const EMPTY_PAGE: (u16, &str) = (200, r#"{"success":true,"data":[],"total":0}"#);

    async fn read_head(socket: &mut TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
            match socket.read(&mut chunk).await {
                Ok(0) | Err(_) => break,
                Ok(n) => buf.extend_from_slice(&chunk[..n]),
            }
        }
        String::from_utf8_lossy(&buf).to_lowercase()
    }

    /// Local backend answering each connection with the next scripted
    /// response, repeating the last one. Request heads are recorded lowercased.
    async fn scripted_backend(script: Vec<(u16, &'static str)>) -> (String, Arc<Mutex<Vec<String>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let seen = requests.clone();

        tokio::spawn(async move {
            let mut served = 0;
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                let head = read_head(&mut socket).await;
                seen.lock().unwrap().push(head);

                let (status, body) = script[served.min(script.len() - 1)];
                served += 1;
                if status == STALL {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    continue;
                }
                let response = format!(
                    "HTTP/1.1 {status} Scripted\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });

        (format!("http://{addr}/api"), requests)
    }

    fn api_for(api_url: String, read_retries: u32, timeout: Duration) -> HttpApi {
        HttpApi::new(&ClientConfig {
            api_url,
            timeout,
            read_retries,
            retry_backoff: Duration::from_millis(1),
            ..ClientConfig::default()
        })
        .unwrap()
    }

    fn owner_bookings() -> BookingQuery {
        BookingQuery::new(BookingScope::Owner)
    }

    #[tokio::test]
    async fn reads_retry_until_the_budget_is_spent() {
        let (url, requests) = scripted_backend(vec![UNAVAILABLE]).await;
        let api = api_for(url, 2, Duration::from_secs(5));

        let err = api.list_bookings(&owner_bookings()).await.unwrap_err();

        assert_eq!(err.status(), Some(503));
        assert_eq!(requests.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn reads_recover_after_a_transient_failure() {
        let (url, requests) = scripted_backend(vec![UNAVAILABLE, EMPTY_PAGE]).await;
        let api = api_for(url, 2, Duration::from_secs(5));

        let page = api.list_bookings(&owner_bookings()).await.unwrap();

        assert!(page.data.is_empty());
        let requests = requests.lock().unwrap();
        assert_eq!(requests.len(), 2);
        assert!(requests[1].starts_with("get /api/owner/bookings?page=1"));
    }

    #[tokio::test]
    async fn mutations_are_sent_once_with_their_precondition() {
        let (url, requests) = scripted_backend(vec![UNAVAILABLE]).await;
        let api = api_for(url, 5, Duration::from_secs(5)).with_token("t0k3n");
        let precondition = Precondition {
            updated_at: TimeStamp::new_with(2025, 2, 20, 9, 0, 0),
        };

        let err = api.accept_booking("B1", Some(&precondition)).await.unwrap_err();

        assert_eq!(err.status(), Some(503));
        let requests = requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].starts_with("put /api/bookings/b1/accept"));
        assert!(requests[0].contains("if-unmodified-since: thu, 20 feb 2025 09:00:00 gmt"));
        assert!(requests[0].contains("authorization: bearer t0k3n"));
    }

    #[tokio::test]
    async fn stalled_server_times_out() {
        let (url, requests) = scripted_backend(vec![(STALL, "")]).await;
        let timeout = Duration::from_millis(200);
        let api = api_for(url, 0, timeout);

        let err = api.get_my_kyc().await.unwrap_err();

        assert!(matches!(err, ApiError::Timeout(d) if d == timeout));
        assert_eq!(requests.lock().unwrap().len(), 1);
        assert!(matches!(
            LifecycleError::from(err),
            LifecycleError::RemoteRejected { status: None, .. }
        ));
    }

    #[test]
    fn backoff_saturates_instead_of_overflowing() {
        let mut api = api_for("http://localhost/api".into(), 3, Duration::from_secs(1));
        assert_eq!(api.backoff(2), Duration::from_millis(2));

        api.retry_backoff = Duration::MAX;
        assert_eq!(api.backoff(1), Duration::MAX);
        assert_eq!(api.backoff(2), Duration::MAX);
    }

    #[test]
    fn envelope_with_page() {
        let body = r#"{"success":true,"data":[{"id":"p1","name":"bookings read","resource":"bookings","action":"read"}],"total":7}"#;
        let page = parse_envelope::<Vec<Permission>>(200, body)
            .unwrap()
            .into_page()
            .unwrap();
        assert_eq!(page.total, 7);
        assert_eq!(page.data[0].key(), "bookings:read");
    }

    #[test]
    fn failures_keep_the_server_message() {
        let err = parse_envelope::<Value>(409, r#"{"success":false,"message":"Booking was modified"}"#)
            .unwrap_err();
        assert_eq!(err.status(), Some(409));
        assert_eq!(err.server_message(), Some("Booking was modified"));

        let err = parse_envelope::<Value>(200, r#"{"success":false,"message":"Vehicle busy"}"#)
            .unwrap_err();
        assert_eq!(err.server_message(), Some("Vehicle busy"));

        let err = parse_envelope::<Value>(502, "Bad Gateway").unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(err.server_message(), Some("Bad Gateway"));
    }

    #[test]
    fn garbage_is_an_invalid_response() {
        assert!(matches!(
            parse_envelope::<Vec<Booking>>(200, "<html>"),
            Err(ApiError::InvalidResponse(_))
        ));
        assert!(matches!(
            parse_envelope::<Vec<Booking>>(200, r#"{"success":true}"#).and_then(Envelope::required),
            Err(ApiError::InvalidResponse(_))
        ));
    }

    #[test]
    fn profile_becomes_actor() {
        let profile: Profile = serde_json::from_str(
            r#"{"id":"a2","role":"admin","is_sub_admin":true,"permissions":[{"id":"p2","name":"x","resource":"bookings","action":"delete"}]}"#,
        )
        .unwrap();
        let actor = Actor::from(profile);
        assert!(!actor.is_full_admin());
        assert!(actor.permissions.allows("bookings", "delete"));
    }

    #[test]
    fn urls_and_query() {
        let config = ClientConfig {
            api_url: "http://localhost:4000/api/".into(),
            ..ClientConfig::default()
        };
        let api = HttpApi::new(&config).unwrap();
        assert_eq!(api.url("/owner/bookings"), "http://localhost:4000/api/owner/bookings");

        let query = BookingQuery::new(BookingScope::Driver)
            .with_status(BookingStatus::Confirmed)
            .with_page(2, 20);
        assert_eq!(
            bookings_query(&query),
            vec![
                ("page", "2".to_string()),
                ("limit", "20".to_string()),
                ("status", "confirmed".to_string()),
            ]
        );
    }
}
