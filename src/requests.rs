//! One browser-like HTTP session against the portal.

use std::{
    sync::atomic::{AtomicBool, Ordering},
    time::Duration,
};

use anyhow::Context;
use cookie_store::CookieStore;
use log::debug;
use reqwest::{
    Client, ClientBuilder, Method, StatusCode,
    header::{CONTENT_LENGTH, CONTENT_TYPE, COOKIE, HeaderMap, HeaderValue, LOCATION, SET_COOKIE},
    redirect::Policy,
};
use tokio::sync::Mutex;
use url::Url;

use crate::{config::PortalConfig, ratelimit::RateLimiter};

const MAX_REDIRECTS: usize = 10;

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
                          AppleWebKit/537.36 (KHTML, like Gecko) \
                          Chrome/131.0.0.0 Safari/537.36";

#[derive(Debug, Clone)]
pub struct PortalResponse {
    pub status: StatusCode,
    /// URL of the last hop, after redirects.
    pub url: Url,
    pub body: String,
}

/// An HTTP client owning the cookie store of exactly one portal session.
///
/// Exchanges through one client are serialised on the cookie store. Each
/// exchange works on a copy of the store that is committed only once the
/// response body has fully arrived, so a timed-out or failed exchange leaves
/// the session as it was.
pub struct SessionClient {
    client: Client,
    base_url: Url,
    timeout: Duration,
    rate_limiter: RateLimiter,
    cookies: Mutex<CookieStore>,
    authenticated: AtomicBool,
}

impl SessionClient {
    pub fn new(config: &PortalConfig) -> anyhow::Result<Self> {
        // Redirects are followed by hand so Set-Cookie on a 302 is not lost.
        let client = ClientBuilder::new()
            .redirect(Policy::none())
            .timeout(config.timeout)
            .user_agent(USER_AGENT)
            .build()?;
        let rate_limiter = RateLimiter::new(config.min_request_gap);
        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            timeout: config.timeout,
            rate_limiter,
            cookies: Mutex::new(CookieStore::default()),
            authenticated: AtomicBool::new(false),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated.load(Ordering::SeqCst)
    }

    pub fn set_authenticated(&self, authenticated: bool) {
        self.authenticated.store(authenticated, Ordering::SeqCst);
    }

    /// The `Cookie` header the session would send to `path` right now.
    pub async fn cookie_header(&self, path: &str) -> anyhow::Result<Option<String>> {
        let url = self.url_for(path)?;
        let cookies = self.cookies.lock().await;
        Ok(cookie_header(&cookies, &url))
    }

    /// Drops every cookie and the authenticated flag.
    pub async fn reset(&self) {
        let mut cookies = self.cookies.lock().await;
        *cookies = CookieStore::default();
        self.set_authenticated(false);
    }

    fn url_for(&self, path: &str) -> anyhow::Result<Url> {
        self.base_url
            .join(path)
            .with_context(|| format!("cannot resolve {} against {}", path, self.base_url))
    }

    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<String>,
        headers: Option<HeaderMap>,
    ) -> anyhow::Result<PortalResponse> {
        let url = self.url_for(path)?;
        let mut cookies = self.cookies.lock().await;

        self.rate_limiter.wait_until_ready().await;

        let mut pending = cookies.clone();
        let exchange = self.exchange(
            &mut pending,
            method.clone(),
            url.clone(),
            body,
            headers.unwrap_or_default(),
        );
        let response = tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| anyhow::anyhow!("{} {} timed out after {:?}", method, url, self.timeout))??;

        *cookies = pending;
        Ok(response)
    }

    pub async fn get(&self, path: &str) -> anyhow::Result<PortalResponse> {
        self.request(Method::GET, path, None, None).await
    }

    /// POSTs an `application/x-www-form-urlencoded` body built from `fields`.
    pub async fn post_form(
        &self,
        path: &str,
        fields: &[(String, String)],
    ) -> anyhow::Result<PortalResponse> {
        let body = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(fields)
            .finish();
        let mut headers = HeaderMap::new();
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/x-www-form-urlencoded"),
        );
        self.request(Method::POST, path, Some(body), Some(headers))
            .await
    }

    async fn exchange(
        &self,
        cookies: &mut CookieStore,
        mut method: Method,
        mut url: Url,
        mut body: Option<String>,
        mut headers: HeaderMap,
    ) -> anyhow::Result<PortalResponse> {
        for _ in 0..=MAX_REDIRECTS {
            let mut builder = self
                .client
                .request(method.clone(), url.clone())
                .headers(headers.clone());
            if let Some(cookie) = cookie_header(cookies, &url) {
                builder = builder.header(COOKIE, cookie);
            }
            if let Some(body) = &body {
                builder = builder.body(body.clone());
            }

            debug!("{} {}", method, url);
            let response = builder
                .send()
                .await
                .with_context(|| format!("{} {} failed", method, url))?;

            for set_cookie in response.headers().get_all(SET_COOKIE) {
                store_set_cookie(cookies, set_cookie.to_str().unwrap_or_default(), &url);
            }

            let status = response.status();
            let location = response
                .headers()
                .get(LOCATION)
                .and_then(|value| value.to_str().ok());
            if let (true, Some(location)) = (status.is_redirection(), location) {
                let next = url
                    .join(location)
                    .with_context(|| format!("bad redirect location {:?} from {}", location, url))?;
                if matches!(
                    status,
                    StatusCode::MOVED_PERMANENTLY | StatusCode::FOUND | StatusCode::SEE_OTHER
                ) {
                    method = Method::GET;
                    body = None;
                    headers.remove(CONTENT_TYPE);
                    headers.remove(CONTENT_LENGTH);
                }
                debug!("{} redirected to {}", url, next);
                url = next;
                continue;
            }

            let text = response
                .text()
                .await
                .with_context(|| format!("reading body of {} {} failed", method, url))?;
            return Ok(PortalResponse {
                status,
                url,
                body: text,
            });
        }

        Err(anyhow::anyhow!(
            "more than {} redirects, last one to {}",
            MAX_REDIRECTS,
            url
        ))
    }
}

fn cookie_header(cookies: &CookieStore, url: &Url) -> Option<String> {
    let pairs: Vec<String> = cookies
        .get_request_values(url)
        .map(|(name, value)| format!("{}={}", name, value))
        .collect();
    if pairs.is_empty() {
        None
    } else {
        Some(pairs.join("; "))
    }
}

fn store_set_cookie(cookies: &mut CookieStore, set_cookie: &str, url: &Url) {
    if let Err(e) = cookies.parse(set_cookie, url) {
        debug!("ignoring cookie from {}: {}", url, e);
    }
}
