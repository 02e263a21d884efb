use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use regex::Regex;
use reqwest::Url;
use reqwest::blocking::Client;
use reqwest::cookie::{CookieStore, Jar};
use reqwest::header::{ACCEPT_ENCODING, CONNECTION, HeaderMap, HeaderValue, REFERER, USER_AGENT};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::base_system::context::Config;
use crate::download::downloader::{BookService, PageSource};
use crate::download::loan::LoanService;
use crate::download::models::BookMetadata;

const BASE_URL: &str = "https://archive.org";
const LOGIN_URL: &str = "https://archive.org/account/login";
const LOAN_URL: &str = "https://archive.org/services/loans/loan/";
const SEARCH_INSIDE_URL: &str = "https://archive.org/services/loans/loan/searchInside.php";

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("登录失败: {0}")]
    AuthenticationFailed(String),
    #[error("《{id}》当前无法借阅: {reason}")]
    LoanUnavailable { id: String, reason: String },
    #[error("借阅请求失败 ({id}): {reason}")]
    Loan { id: String, reason: String },
    #[error("获取 {id} 的元数据失败: {reason}")]
    Metadata { id: String, reason: String },
    #[error("下载 {url} 失败: {reason}")]
    RemoteFetch { url: String, reason: String },
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

#[derive(Debug, Clone)]
pub struct ArchiveConfig {
    pub request_timeout: Duration,
    pub user_agent: String,
    pub token_refresh: Duration,
}

impl ArchiveConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            request_timeout: config.request_timeout(),
            user_agent: config.user_agent.clone(),
            token_refresh: config.loan_token_refresh(),
        }
    }
}

struct ActiveLoan {
    book_id: String,
    token_at: Instant,
}

/// archive.org 借阅图书客户端：登录、借还、读取页面列表与下载页面图片。
pub struct ArchiveClient {
    client: Client,
    jar: Arc<Jar>,
    config: ArchiveConfig,
    loan: Option<ActiveLoan>,
    pages: Vec<String>,
}

impl ArchiveClient {
    pub fn new(config: ArchiveConfig) -> Result<Self, ArchiveError> {
        // reqwest is built without default features (no gzip decoder).
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("identity"));
        headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
        headers.insert(REFERER, HeaderValue::from_static("https://archive.org/"));
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&config.user_agent)
                .unwrap_or(HeaderValue::from_static("Mozilla/5.0")),
        );

        let jar = Arc::new(Jar::default());
        let client = Client::builder()
            .default_headers(headers)
            .cookie_provider(Arc::clone(&jar))
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            client,
            jar,
            config,
            loan: None,
            pages: Vec::new(),
        })
    }

    pub fn login(&mut self, username: &str, password: &str) -> Result<(), ArchiveError> {
        debug!(target: "network", "attempting login as {username}");
        // 登录页会先种下 test-cookie，没有它 POST 会被拒绝
        self.client.get(LOGIN_URL).send()?;

        let resp = self
            .client
            .post(LOGIN_URL)
            .form(&[
                ("username", username),
                ("password", password),
                ("remember", "true"),
                ("referer", BASE_URL),
                ("login", "true"),
                ("submit_by_js", "true"),
            ])
            .send()?;
        let status = resp.status();
        let body = resp.text()?;

        if body.contains("bad_login") {
            return Err(ArchiveError::AuthenticationFailed(
                "用户名或密码错误".to_string(),
            ));
        }
        if !status.is_success() {
            return Err(ArchiveError::AuthenticationFailed(format!("HTTP {status}")));
        }
        if !self.has_login_cookie() {
            warn!(target: "network", "登录响应中没有 logged-in-sig cookie，后续借阅可能失败");
        }
        info!(target: "network", "登录成功: {username}");
        Ok(())
    }

    fn has_login_cookie(&self) -> bool {
        let Ok(url) = Url::parse(BASE_URL) else {
            return false;
        };
        self.jar
            .cookies(&url)
            .and_then(|v| v.to_str().map(|s| s.contains("logged-in-sig")).ok())
            .unwrap_or(false)
    }

    fn loan_action(&self, url: &str, action: &str, book_id: &str) -> Result<LoanReply, ArchiveError> {
        debug!(target: "network", "loan action {action} for {book_id}");
        let resp = self
            .client
            .post(url)
            .form(&[("action", action), ("identifier", book_id)])
            .send()?;
        let status = resp.status();
        let body = resp.text()?;
        Ok(LoanReply::parse(status.is_success(), &body))
    }

    fn create_token(&mut self, book_id: &str) -> Result<(), ArchiveError> {
        let reply = self.loan_action(LOAN_URL, "create_token", book_id)?;
        if !reply.token {
            return Err(ArchiveError::Loan {
                id: book_id.to_string(),
                reason: reply
                    .error
                    .unwrap_or_else(|| "服务器未返回借阅令牌".to_string()),
            });
        }
        self.loan = Some(ActiveLoan {
            book_id: book_id.to_string(),
            token_at: Instant::now(),
        });
        Ok(())
    }

    /// 借阅令牌有时效，顺序下载时在请求页面前按需续期。
    fn refresh_token_if_due(&mut self) -> Result<(), ArchiveError> {
        let due = match self.loan.as_ref() {
            Some(loan) if loan.token_at.elapsed() >= self.config.token_refresh => {
                Some(loan.book_id.clone())
            }
            _ => None,
        };
        if let Some(book_id) = due {
            debug!(target: "network", "refreshing loan token for {book_id}");
            self.create_token(&book_id)?;
        }
        Ok(())
    }
}

impl LoanService for ArchiveClient {
    fn acquire_loan(&mut self, book_id: &str) -> Result<(), ArchiveError> {
        if let Err(err) = self.loan_action(SEARCH_INSIDE_URL, "grant_access", book_id) {
            debug!(target: "network", "grant_access failed (ignored): {err}");
        }

        let reply = self.loan_action(LOAN_URL, "browse_book", book_id)?;
        if !reply.success {
            return Err(ArchiveError::LoanUnavailable {
                id: book_id.to_string(),
                reason: reply
                    .error
                    .unwrap_or_else(|| "服务器拒绝了借阅请求".to_string()),
            });
        }

        if let Err(err) = self.create_token(book_id) {
            // 服务端已经借出，令牌失败时先还掉，避免占用借阅名额
            if let Err(release_err) = self.release_loan(book_id) {
                warn!(target: "network", "回滚借阅 {book_id} 失败: {release_err}");
            }
            return Err(err);
        }
        Ok(())
    }

    fn release_loan(&mut self, book_id: &str) -> Result<(), ArchiveError> {
        self.loan = None;
        let reply = self.loan_action(LOAN_URL, "return_loan", book_id)?;
        if reply.success {
            Ok(())
        } else {
            Err(ArchiveError::Loan {
                id: book_id.to_string(),
                reason: reply.error.unwrap_or_else(|| "归还未被确认".to_string()),
            })
        }
    }
}

impl PageSource for ArchiveClient {
    fn fetch_page(&mut self, index: usize, scale: u32) -> Result<Vec<u8>, ArchiveError> {
        self.refresh_token_if_due()?;
        let Some(uri) = self.pages.get(index) else {
            return Err(ArchiveError::RemoteFetch {
                url: format!("page #{}", index + 1),
                reason: format!("页面列表只有 {} 页", self.pages.len()),
            });
        };
        let url = page_url(uri, scale);
        let remote = |e: reqwest::Error| ArchiveError::RemoteFetch {
            url: url.clone(),
            reason: e.to_string(),
        };

        let resp = self
            .client
            .get(&url)
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(remote)?;
        let bytes = resp.bytes().map_err(remote)?;
        Ok(bytes.to_vec())
    }
}

impl BookService for ArchiveClient {
    fn fetch_metadata(&mut self, book_id: &str) -> Result<BookMetadata, ArchiveError> {
        let meta_err = |reason: String| ArchiveError::Metadata {
            id: book_id.to_string(),
            reason,
        };

        let html = self
            .client
            .get(format!("{BASE_URL}/details/{book_id}"))
            .send()
            .and_then(|r| r.error_for_status())
            .and_then(|r| r.text())
            .map_err(|e| meta_err(e.to_string()))?;
        let reader_url = extract_reader_url(&html)
            .ok_or_else(|| meta_err("页面中找不到 BookReaderJSIA 地址".to_string()))?;
        debug!(target: "network", "reader manifest: {reader_url}");

        let manifest: ReaderManifest = self
            .client
            .get(&reader_url)
            .send()
            .and_then(|r| r.error_for_status())
            .and_then(|r| r.json())
            .map_err(|e| meta_err(e.to_string()))?;

        let options = manifest.data.br_options;
        self.pages = options
            .data
            .into_iter()
            .flatten()
            .map(|page| page.uri)
            .collect();
        info!(target: "network", "{book_id}: {} 页", self.pages.len());

        Ok(BookMetadata {
            page_count: self.pages.len(),
            title: options.book_title,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct LoanReply {
    success: bool,
    token: bool,
    error: Option<String>,
}

#[derive(Deserialize)]
struct RawLoanReply {
    success: Option<bool>,
    error: Option<String>,
    token: Option<String>,
}

impl LoanReply {
    fn parse(http_ok: bool, body: &str) -> Self {
        match serde_json::from_str::<RawLoanReply>(body) {
            Ok(raw) => Self {
                success: http_ok && raw.success.unwrap_or(raw.error.is_none()),
                token: raw.token.is_some_and(|t| !t.is_empty()),
                error: raw.error,
            },
            Err(_) => Self {
                success: http_ok && !body.contains("not available to borrow"),
                // 令牌只认 JSON 里的非空 token 字段
                token: false,
                error: None,
            },
        }
    }
}

#[derive(Deserialize)]
struct ReaderManifest {
    data: ReaderData,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReaderData {
    br_options: ReaderOptions,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReaderOptions {
    #[serde(default)]
    book_title: Option<String>,
    #[serde(default)]
    data: Vec<Vec<ReaderPage>>,
}

#[derive(Deserialize)]
struct ReaderPage {
    uri: String,
}

static RE_READER: OnceLock<Regex> = OnceLock::new();

fn re_reader() -> &'static Regex {
    RE_READER.get_or_init(|| {
        Regex::new(r#""url"\s*:\s*"([^"]*BookReaderJSIA\.php[^"]*)""#).expect("compile RE_READER")
    })
}

fn extract_reader_url(html: &str) -> Option<String> {
    let raw = re_reader().captures(html)?.get(1)?.as_str();
    let url = raw.replace("\\u0026", "&").replace("\\/", "/");
    Some(if url.starts_with("//") {
        format!("https:{url}")
    } else {
        url
    })
}

fn page_url(uri: &str, scale: u32) -> String {
    let sep = if uri.contains('?') { '&' } else { '?' };
    format!("{uri}{sep}rotate=0&scale={scale}")
}
