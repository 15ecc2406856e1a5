use anyhow::Result;
use log::debug;
use reqwest::{
    Client,
    header::{AUTHORIZATION, HeaderMap, HeaderValue},
};

use std::path::PathBuf;

use crate::{
    archive::{ArchiveExtractor, ArchiveExtractorImpl},
    http::HttpClient,
    install::{InstallOptions, Installer},
    runtime::Runtime,
};

use super::paths::{default_bin_dir, default_root};

pub struct Config<R: Runtime, E: ArchiveExtractor> {
    pub runtime: R,
    pub http_client: HttpClient,
    pub extractor: E,
    /// State directory holding receipts
    pub root: PathBuf,
    pub bin_dir: PathBuf,
}

impl<R: Runtime> Config<R, ArchiveExtractorImpl> {
    pub fn new(runtime: R, root: Option<PathBuf>, bin_dir: Option<PathBuf>) -> Result<Self> {
        let mut headers = HeaderMap::new();
        if let Ok(token) = runtime.env_var("GITHUB_TOKEN")
            && !token.is_empty()
        {
            let mut auth_value = HeaderValue::from_str(&format!("Bearer {}", token))?;
            auth_value.set_sensitive(true);
            headers.insert(AUTHORIZATION, auth_value);
            debug!("Using GITHUB_TOKEN for authentication: {}", mask(&token));
        }

        let client = Client::builder()
            .user_agent("dify-installer")
            .default_headers(headers)
            .build()?;

        let root = match root {
            Some(path) => path,
            None => default_root(&runtime)?,
        };
        let bin_dir = match bin_dir {
            Some(path) => path,
            None => default_bin_dir(&runtime)?,
        };
        debug!("Using root {:?} and bin dir {:?}", root, bin_dir);

        Ok(Self {
            runtime,
            http_client: HttpClient::new(client),
            extractor: ArchiveExtractorImpl::new(),
            root,
            bin_dir,
        })
    }
}

impl<R: Runtime + 'static, E: ArchiveExtractor> Config<R, E> {
    pub fn options(&self, force: bool, skip_test: bool) -> InstallOptions {
        InstallOptions {
            bin_dir: self.bin_dir.clone(),
            root: self.root.clone(),
            force,
            skip_test,
        }
    }

    pub fn into_installer(self) -> Installer<R, E> {
        Installer::new(self.runtime, self.http_client, self.extractor)
    }
}

fn mask(token: &str) -> String {
    let chars: Vec<char> = token.chars().collect();
    if chars.len() <= 12 {
        return "*********".to_string();
    }
    let head: String = chars[..8].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}*********{}", head, tail)
}
