//! Requests authorized by a live session
//!
//! Every request carries the session's bearer token. A 401 on the first
//! transmission renews the token (joining any renewal already in flight) and
//! replays the request once; a 401 on the replay is final.

use super::{AuthClient, ClientError, error_for_status};
use reqwest::{Client, Method, Request, RequestBuilder, Response};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tessera_core::coordinator::{Attempt, ResponseVerdict, inspect_response};
use tessera_core::Session;

/// HTTP client that decorates and retries requests on behalf of a [`Session`]
#[derive(Debug, Clone)]
pub struct SessionClient {
    client: Client,
    base_url: String,
    session: Session,
}

impl SessionClient {
    /// Share `auth`'s connection pool and cookie jar
    pub fn new(auth: &AuthClient, session: Session) -> Self {
        Self {
            client: auth.http().clone(),
            base_url: auth.base_url().to_string(),
            session,
        }
    }

    /// The session whose token is attached
    pub const fn session(&self) -> &Session {
        &self.session
    }

    /// Create a request builder for `path`; the token is attached at send time
    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let request = self.client.request(method, url);

        #[cfg(target_arch = "wasm32")]
        let request = request.fetch_credentials_include();

        request
    }

    /// Send `request`, renewing and replaying once on an authorization failure
    ///
    /// Returns the final response whatever its status. When renewal fails, or
    /// the body cannot be replayed, the original 401 response is returned.
    pub async fn send(&self, request: RequestBuilder) -> Result<Response, ClientError> {
        let mut request = request.build()?;
        let replay = request.try_clone();

        self.authorize(&mut request);
        let response = self.client.execute(request).await?;

        match inspect_response(response.status(), Attempt::Initial) {
            ResponseVerdict::Accept | ResponseVerdict::Reject => Ok(response),
            ResponseVerdict::RenewAndRetry => {
                let Some(mut replay) = replay else {
                    tracing::debug!("Request body cannot be replayed, not renewing");
                    return Ok(response);
                };

                if let Err(err) = self.session.renew().await {
                    tracing::debug!(error = %err, "Renewal failed, surfacing authorization failure");
                    return Ok(response);
                }

                tracing::debug!(url = %replay.url(), "Replaying request with renewed token");
                self.authorize(&mut replay);
                let response = self.client.execute(replay).await?;
                if inspect_response(response.status(), Attempt::Retried) == ResponseVerdict::Reject {
                    tracing::warn!(url = %response.url(), "Request still unauthorized after renewal");
                }
                Ok(response)
            }
        }
    }

    /// Send `request` and decode a JSON body
    pub async fn execute<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<T, ClientError> {
        let response = error_for_status(self.send(request).await?).await?;
        Ok(response.json().await?)
    }

    /// GET `path` and decode a JSON body
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        self.execute(self.request(Method::GET, path)).await
    }

    /// POST `body` as JSON to `path` and decode a JSON body
    pub async fn post<B, T>(&self, path: &str, body: &B) -> Result<T, ClientError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.execute(self.request(Method::POST, path).json(body)).await
    }

    fn authorize(&self, request: &mut Request) {
        self.session.decorate(request.headers_mut());
    }
}
