use std::{
    path::{Path, PathBuf},
    sync::atomic::{AtomicBool, Ordering},
};

use anyhow::Result;
use log::{debug, trace};
use reqwest::{
    blocking::{multipart, Client, RequestBuilder, Response},
    StatusCode,
};
use serde::Deserialize;
use thiserror::Error;

use crate::{config::WebUiConfig, model::SyncDelta};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("authentication failed")]
    Authentication,
    #[error("unexpected http status {0}")]
    HttpStatus(StatusCode),
    #[error("api error: {0}")]
    Api(String),
    #[error("response parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

pub type ClientResult<T> = std::result::Result<T, ClientError>;

/// Remote operations the dashboard needs. The worker thread is the only caller.
pub trait TorrentService: Send {
    fn sync(&self, rid: i64) -> ClientResult<SyncDelta>;
    fn pause(&self, hashes: &[String]) -> ClientResult<()>;
    fn resume(&self, hashes: &[String]) -> ClientResult<()>;
    fn delete(&self, hashes: &[String], delete_files: bool) -> ClientResult<()>;
    fn add_file(&self, path: &Path) -> ClientResult<()>;
    fn add_url(&self, url: &str) -> ClientResult<()>;
    fn set_location(&self, hashes: &[String], location: &str) -> ClientResult<()>;
    fn list_directories(&self, path: &str) -> ClientResult<Vec<String>>;
}

/// qBittorrent WebUI API v2 client.
pub struct WebUiClient {
    http: Client,
    base_url: String,
    credentials: Option<(String, String)>,
    logged_in: AtomicBool,
}

impl WebUiClient {
    pub fn new(config: WebUiConfig) -> Result<Self> {
        let base_url = config.base_url();
        let WebUiConfig {
            username,
            password,
            timeout,
            verify_ssl,
            user_agent,
            ..
        } = config;
        let mut builder = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .cookie_store(true);
        if !verify_ssl {
            builder = builder.danger_accept_invalid_certs(true);
        }
        let http = builder.build()?;
        let credentials = username.map(|user| (user, password.unwrap_or_default()));
        Ok(Self {
            http,
            base_url,
            credentials,
            logged_in: AtomicBool::new(false),
        })
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/api/v2/{}", self.base_url, endpoint)
    }

    fn login(&self) -> ClientResult<()> {
        let Some((user, pass)) = &self.credentials else {
            return Ok(());
        };
        debug!("logging in to {}", self.base_url);
        let response = self
            .http
            .post(self.url("auth/login"))
            .header("Referer", &self.base_url)
            .form(&[("username", user.as_str()), ("password", pass.as_str())])
            .send()?;
        if !response.status().is_success() {
            return Err(ClientError::Authentication);
        }
        let body = response.text()?;
        if body.trim() != "Ok." {
            return Err(ClientError::Authentication);
        }
        self.logged_in.store(true, Ordering::Relaxed);
        Ok(())
    }

    /// Sends a request, logging in first and once more if the session expired.
    fn send<F>(&self, build: F) -> ClientResult<Response>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        if self.credentials.is_some() && !self.logged_in.load(Ordering::Relaxed) {
            self.login()?;
        }
        let mut retried = false;
        loop {
            let response = build(&self.http).header("Referer", &self.base_url).send()?;
            match response.status() {
                StatusCode::FORBIDDEN | StatusCode::UNAUTHORIZED
                    if self.credentials.is_some() && !retried =>
                {
                    self.logged_in.store(false, Ordering::Relaxed);
                    self.login()?;
                    retried = true;
                }
                StatusCode::FORBIDDEN | StatusCode::UNAUTHORIZED => {
                    return Err(ClientError::Authentication)
                }
                status if !status.is_success() => return Err(ClientError::HttpStatus(status)),
                _ => return Ok(response),
            }
        }
    }

    fn post_form(&self, endpoint: &str, form: &[(&str, &str)]) -> ClientResult<Response> {
        trace!("POST {endpoint}");
        let url = self.url(endpoint);
        self.send(|http| http.post(&url).form(form))
    }

    /// Posts to `endpoint`, falling back to `fallback` on services that renamed it.
    fn post_with_fallback(
        &self,
        endpoint: &str,
        fallback: &str,
        form: &[(&str, &str)],
    ) -> ClientResult<()> {
        match self.post_form(endpoint, form) {
            Err(ClientError::HttpStatus(StatusCode::NOT_FOUND)) => {
                debug!("{endpoint} not found, retrying as {fallback}");
                self.post_form(fallback, form).map(|_| ())
            }
            other => other.map(|_| ()),
        }
    }
}

fn join_hashes(hashes: &[String]) -> String {
    hashes.join("|")
}

impl TorrentService for WebUiClient {
    fn sync(&self, rid: i64) -> ClientResult<SyncDelta> {
        trace!("GET sync/maindata rid={rid}");
        let url = self.url("sync/maindata");
        let rid = rid.to_string();
        let response = self.send(|http| http.get(&url).query(&[("rid", rid.as_str())]))?;
        let body = response.text()?;
        Ok(serde_json::from_str(&body)?)
    }

    fn pause(&self, hashes: &[String]) -> ClientResult<()> {
        if hashes.is_empty() {
            return Ok(());
        }
        let joined = join_hashes(hashes);
        self.post_with_fallback("torrents/pause", "torrents/stop", &[("hashes", joined.as_str())])
    }

    fn resume(&self, hashes: &[String]) -> ClientResult<()> {
        if hashes.is_empty() {
            return Ok(());
        }
        let joined = join_hashes(hashes);
        self.post_with_fallback("torrents/resume", "torrents/start", &[("hashes", joined.as_str())])
    }

    fn delete(&self, hashes: &[String], delete_files: bool) -> ClientResult<()> {
        if hashes.is_empty() {
            return Ok(());
        }
        let joined = join_hashes(hashes);
        let delete_files = if delete_files { "true" } else { "false" };
        self.post_form(
            "torrents/delete",
            &[("hashes", joined.as_str()), ("deleteFiles", delete_files)],
        )?;
        Ok(())
    }

    fn add_file(&self, path: &Path) -> ClientResult<()> {
        let bytes = std::fs::read(path).map_err(|source| ClientError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload.torrent".to_string());
        let url = self.url("torrents/add");
        let response = self.send(|http| {
            let part = multipart::Part::bytes(bytes.clone())
                .file_name(file_name.clone())
                .mime_str("application/x-bittorrent")
                .unwrap_or_else(|_| multipart::Part::bytes(bytes.clone()));
            http.post(&url)
                .multipart(multipart::Form::new().part("torrents", part))
        })?;
        check_add_response(response)
    }

    fn add_url(&self, url: &str) -> ClientResult<()> {
        let response = self.post_form("torrents/add", &[("urls", url)])?;
        check_add_response(response)
    }

    fn set_location(&self, hashes: &[String], location: &str) -> ClientResult<()> {
        if hashes.is_empty() {
            return Ok(());
        }
        let joined = join_hashes(hashes);
        self.post_form(
            "torrents/setLocation",
            &[("hashes", joined.as_str()), ("location", location)],
        )?;
        Ok(())
    }

    fn list_directories(&self, path: &str) -> ClientResult<Vec<String>> {
        let url = self.url("app/getDirectoryContent");
        let response =
            self.send(|http| http.post(&url).form(&[("dirPath", path), ("mode", "dirs")]))?;
        let body = response.text()?;
        let listing: DirectoryListing = serde_json::from_str(&body)?;
        let mut entries = listing.0;
        entries.sort_by_key(|entry| entry.to_lowercase());
        Ok(entries)
    }
}

#[derive(Debug, Deserialize)]
struct DirectoryListing(Vec<String>);

fn check_add_response(response: Response) -> ClientResult<()> {
    let body = response.text()?;
    match body.trim() {
        "Fails." => Err(ClientError::Api("torrent was rejected".to_string())),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashes_join_with_pipes() {
        assert_eq!(join_hashes(&["a".into(), "b".into()]), "a|b");
        assert_eq!(join_hashes(&[]), "");
    }

    #[test]
    fn directory_listing_decodes_plain_array() {
        let listing: DirectoryListing =
            serde_json::from_str(r#"["/data/b", "/data/a"]"#).unwrap();
        assert_eq!(listing.0, vec!["/data/b", "/data/a"]);
    }

    #[test]
    fn client_builds_api_urls_from_config() {
        let config = WebUiConfig {
            url: Some("http://nas.local:8080/".to_string()),
            ..WebUiConfig::default()
        };
        let client = WebUiClient::new(config).unwrap();
        assert_eq!(client.url("sync/maindata"), "http://nas.local:8080/api/v2/sync/maindata");
    }
}
