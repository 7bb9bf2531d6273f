//! Fetching listing documents over HTTP(S) and anonymous FTP.

use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use percent_encoding::percent_decode_str;
use regex::Regex;
use reqwest::header::CONTENT_TYPE;
use reqwest::Url;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::debug;

use crate::errors::{IngestError, IngestResult};
use crate::redif::RawDocument;

static PASV_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+),(\d+),(\d+),(\d+),(\d+),(\d+)").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Ftp,
    Http,
}

pub fn scheme(url: &str) -> IngestResult<Scheme> {
    let parsed = parse_url(url)?;
    match parsed.scheme() {
        "ftp" => Ok(Scheme::Ftp),
        "http" | "https" => Ok(Scheme::Http),
        other => Err(IngestError::Transport(format!("unsupported scheme: {}", other))),
    }
}

fn parse_url(url: &str) -> IngestResult<Url> {
    Url::parse(url).map_err(|e| IngestError::Transport(format!("invalid url {}: {}", url, e)))
}

/// Source of raw document bytes.
#[async_trait]
pub trait Transport: Send + Sync {
    /// HTTP(S) body plus the charset the server declared, if any.
    async fn fetch(&self, url: &str) -> IngestResult<(Vec<u8>, Option<String>)>;

    /// FTP file contents.
    async fn fetch_raw(&self, url: &str) -> IngestResult<Vec<u8>>;
}

/// Fetch `url` with whichever transport its scheme calls for.
pub async fn load<T: Transport + ?Sized>(transport: &T, url: &str) -> IngestResult<RawDocument> {
    let (bytes, encoding) = match scheme(url)? {
        Scheme::Ftp => (transport.fetch_raw(url).await?, None),
        Scheme::Http => transport.fetch(url).await?,
    };
    Ok(RawDocument {
        url: url.to_string(),
        bytes,
        encoding,
    })
}

pub struct NetTransport {
    client: reqwest::Client,
}

impl NetTransport {
    pub fn new(timeout: Duration) -> IngestResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("redif_ingest/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(NetTransport { client })
    }
}

#[async_trait]
impl Transport for NetTransport {
    async fn fetch(&self, url: &str) -> IngestResult<(Vec<u8>, Option<String>)> {
        let resp = self.client.get(url).send().await?.error_for_status()?;
        let encoding = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(charset);
        let bytes = resp.bytes().await?.to_vec();
        Ok((bytes, encoding))
    }

    async fn fetch_raw(&self, url: &str) -> IngestResult<Vec<u8>> {
        ftp_retrieve(url).await
    }
}

/// `charset` parameter of a Content-Type value.
fn charset(content_type: &str) -> Option<String> {
    content_type.split(';').skip(1).find_map(|param| {
        let (key, value) = param.split_once('=')?;
        key.trim()
            .eq_ignore_ascii_case("charset")
            .then(|| value.trim().trim_matches('"').to_string())
            .filter(|v| !v.is_empty())
    })
}

// ── FTP ──

struct FtpControl {
    stream: BufReader<TcpStream>,
}

impl FtpControl {
    async fn read_line(&mut self) -> IngestResult<String> {
        let mut line = String::new();
        if self.stream.read_line(&mut line).await.map_err(socket_error)? == 0 {
            return Err(IngestError::Transport("ftp connection closed".into()));
        }
        Ok(line)
    }

    /// One reply, folding multi-line (`123-...` through `123 ...`) replies.
    async fn reply(&mut self) -> IngestResult<(u16, String)> {
        let mut line = self.read_line().await?;
        let code: u16 = line
            .get(..3)
            .and_then(|c| c.parse().ok())
            .ok_or_else(|| IngestError::Transport(format!("bad ftp reply: {}", line.trim_end())))?;
        if line.as_bytes().get(3) == Some(&b'-') {
            let last = format!("{} ", code);
            loop {
                line = self.read_line().await?;
                if line.starts_with(&last) {
                    break;
                }
            }
        }
        Ok((code, line.trim_end().to_string()))
    }

    async fn expect(&mut self, codes: &[u16]) -> IngestResult<(u16, String)> {
        let (code, text) = self.reply().await?;
        if !codes.contains(&code) {
            return Err(IngestError::Transport(format!("ftp: {}", text)));
        }
        Ok((code, text))
    }

    async fn command(&mut self, cmd: &str, codes: &[u16]) -> IngestResult<(u16, String)> {
        self.stream
            .get_mut()
            .write_all(format!("{}\r\n", cmd).as_bytes())
            .await
            .map_err(socket_error)?;
        self.expect(codes).await
    }
}

/// Data port from a 227 reply. The address part is ignored; servers behind
/// NAT routinely advertise private addresses.
fn pasv_port(reply: &str) -> IngestResult<u16> {
    let caps = PASV_RE
        .captures(reply)
        .ok_or_else(|| IngestError::Transport(format!("bad PASV reply: {}", reply)))?;
    let hi: u16 = caps[5].parse().unwrap_or(0);
    let lo: u16 = caps[6].parse().unwrap_or(0);
    match (hi, lo) {
        (hi, lo) if hi <= 255 && lo <= 255 && (hi, lo) != (0, 0) => Ok(hi * 256 + lo),
        _ => Err(IngestError::Transport(format!("bad PASV reply: {}", reply))),
    }
}

fn socket_error(e: std::io::Error) -> IngestError {
    IngestError::Transport(format!("ftp: {}", e))
}

/// URL path as the server names it, with `%20` and friends decoded.
fn retr_path(url: &Url) -> String {
    percent_decode_str(url.path()).decode_utf8_lossy().into_owned()
}

/// Anonymous passive-mode binary RETR of a single file.
async fn ftp_retrieve(url: &str) -> IngestResult<Vec<u8>> {
    let parsed = parse_url(url)?;
    let host = parsed
        .host_str()
        .ok_or_else(|| IngestError::Transport(format!("no host in {}", url)))?
        .to_string();
    let port = parsed.port().unwrap_or(21);
    let user = match parsed.username() {
        "" => "anonymous",
        name => name,
    };
    let password = parsed.password().unwrap_or("anonymous@");

    let stream = TcpStream::connect((host.as_str(), port))
        .await
        .map_err(socket_error)?;
    let mut control = FtpControl {
        stream: BufReader::new(stream),
    };
    control.expect(&[220]).await?;
    let (code, _) = control
        .command(&format!("USER {}", user), &[230, 331])
        .await?;
    if code == 331 {
        control
            .command(&format!("PASS {}", password), &[230, 202])
            .await?;
    }
    control.command("TYPE I", &[200]).await?;
    let (_, pasv) = control.command("PASV", &[227]).await?;
    let data_port = pasv_port(&pasv)?;
    debug!(url, data_port, "ftp passive data connection");

    let mut data = TcpStream::connect((host.as_str(), data_port))
        .await
        .map_err(socket_error)?;
    control
        .command(&format!("RETR {}", retr_path(&parsed)), &[125, 150])
        .await?;
    let mut bytes = Vec::new();
    data.read_to_end(&mut bytes).await.map_err(socket_error)?;
    drop(data);
    control.expect(&[226, 250]).await?;
    let _ = control.command("QUIT", &[221]).await;
    Ok(bytes)
}
