//! Rendering sessions backed by a blocking HTTP client
//!
//! Each worker gets its own client (and cookie jar), so a login performed by
//! one worker never leaks into another worker's session.

use reqwest::blocking::Client;
use reqwest::StatusCode;
use scraper::{Html, Selector};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use workpool::{RenderedPage, RenderingSession, Result, SessionFactory, WorkPoolError};

/// Settings shared by every HTTP session
#[derive(Debug, Clone)]
pub struct HttpSessionConfig {
    pub base_url: String,
    pub timeout: Duration,
    pub connect_timeout: Duration,
    pub user_agent: String,
    /// Path of the login form, relative to `base_url`
    pub login_path: String,
    /// Element present only on logged-out pages
    pub login_marker: String,
    pub username_field: String,
    pub password_field: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Default for HttpSessionConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.oddsportal.com".to_string(),
            timeout: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(10),
            user_agent: "Mozilla/5.0 (X11; Linux x86_64) odds-harvester/0.1".to_string(),
            login_path: "/login/".to_string(),
            login_marker: "button[name=login-submit]".to_string(),
            username_field: "login-username".to_string(),
            password_field: "login-password".to_string(),
            username: None,
            password: None,
        }
    }
}

impl HttpSessionConfig {
    /// Resolve `url` against the base URL when it is relative
    pub fn absolute(&self, url: &str) -> String {
        if url.starts_with("http://") || url.starts_with("https://") {
            url.to_string()
        } else {
            format!(
                "{}/{}",
                self.base_url.trim_end_matches('/'),
                url.trim_start_matches('/')
            )
        }
    }

    /// Host part of the base URL, used to decide which pages need a login
    pub fn domain(&self) -> &str {
        let without_scheme = self
            .base_url
            .split_once("://")
            .map_or(self.base_url.as_str(), |(_, rest)| rest);
        let host = without_scheme.split('/').next().unwrap_or(without_scheme);
        host.strip_prefix("www.").unwrap_or(host)
    }
}

/// Creates one [`HttpSession`] per worker
#[derive(Clone)]
pub struct HttpSessionFactory {
    config: Arc<HttpSessionConfig>,
    login_marker: Selector,
}

impl HttpSessionFactory {
    pub fn new(config: HttpSessionConfig) -> Result<Self> {
        let login_marker = Selector::parse(&config.login_marker).map_err(|e| {
            WorkPoolError::Configuration(format!(
                "invalid login marker '{}': {:?}",
                config.login_marker, e
            ))
        })?;
        Ok(Self {
            config: Arc::new(config),
            login_marker,
        })
    }

    pub fn config(&self) -> &HttpSessionConfig {
        &self.config
    }
}

impl SessionFactory for HttpSessionFactory {
    type Session = HttpSession;

    fn create(&self, worker_id: usize) -> Result<HttpSession> {
        let client = Client::builder()
            .cookie_store(true)
            .timeout(self.config.timeout)
            .connect_timeout(self.config.connect_timeout)
            .user_agent(self.config.user_agent.clone())
            .build()
            .map_err(|e| WorkPoolError::SessionUnavailable(e.to_string()))?;

        debug!(worker = worker_id, "HTTP session created");
        Ok(HttpSession {
            worker_id,
            client: Some(client),
            config: Arc::clone(&self.config),
            login_marker: self.login_marker.clone(),
            last_url: None,
        })
    }
}

/// One worker's HTTP session
pub struct HttpSession {
    worker_id: usize,
    client: Option<Client>,
    config: Arc<HttpSessionConfig>,
    login_marker: Selector,
    last_url: Option<String>,
}

impl HttpSession {
    fn client(&self) -> Result<&Client> {
        self.client
            .as_ref()
            .ok_or_else(|| WorkPoolError::SessionUnavailable("session closed".to_string()))
    }
}

impl RenderingSession for HttpSession {
    fn fetch(&mut self, url: Option<&str>) -> Result<RenderedPage> {
        let target = match url {
            Some(url) => self.config.absolute(url),
            None => self
                .last_url
                .clone()
                .ok_or_else(|| WorkPoolError::Other("no page loaded yet".to_string()))?,
        };

        let response = self.client()?.get(&target).send().map_err(map_reqwest_error)?;
        let status = response.status();
        let final_url = response.url().to_string();
        check_status(status, &final_url)?;

        let html = response.text().map_err(map_reqwest_error)?;
        debug!(worker = self.worker_id, "Fetched {} ({} bytes)", final_url, html.len());
        self.last_url = Some(final_url.clone());
        Ok(RenderedPage::new(final_url, html))
    }

    fn is_authenticated(&self, page: &RenderedPage) -> bool {
        // Pages outside the source site never ask for a login
        if !page.url.contains(self.config.domain()) {
            return true;
        }
        let document = Html::parse_document(&page.html);
        let logged_out = document.select(&self.login_marker).next().is_some();
        !logged_out
    }

    fn login(&mut self) -> Result<()> {
        let (Some(username), Some(password)) = (&self.config.username, &self.config.password)
        else {
            return Err(WorkPoolError::Authentication(
                "login required but no credentials configured".to_string(),
            ));
        };

        info!(worker = self.worker_id, "Not logged in, logging in...");
        let url = self.config.absolute(&self.config.login_path);
        let form = [
            (self.config.username_field.as_str(), username.as_str()),
            (self.config.password_field.as_str(), password.as_str()),
            ("login-submit", ""),
        ];
        let response = self
            .client()?
            .post(&url)
            .form(&form)
            .send()
            .map_err(map_reqwest_error)?;

        let status = response.status();
        if !status.is_success() && !status.is_redirection() {
            return Err(WorkPoolError::Authentication(format!(
                "login answered {}",
                status
            )));
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if self.client.take().is_none() {
            warn!(worker = self.worker_id, "HTTP session closed twice");
        }
        Ok(())
    }
}

fn check_status(status: StatusCode, url: &str) -> Result<()> {
    if status.is_server_error() {
        return Err(WorkPoolError::Transport(format!("{} answered {}", url, status)));
    }
    if status == StatusCode::REQUEST_TIMEOUT {
        return Err(WorkPoolError::Timeout(format!("{} answered {}", url, status)));
    }
    if !status.is_success() {
        return Err(WorkPoolError::Other(format!("{} answered {}", url, status)));
    }
    Ok(())
}

fn map_reqwest_error(err: reqwest::Error) -> WorkPoolError {
    if err.is_timeout() {
        WorkPoolError::Timeout(err.to_string())
    } else if err.is_connect() || err.is_request() || err.is_body() {
        WorkPoolError::Transport(err.to_string())
    } else {
        WorkPoolError::Other(err.to_string())
    }
}
