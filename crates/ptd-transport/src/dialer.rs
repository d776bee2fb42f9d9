//! Outbound dialers: direct TCP, SOCKS5 and HTTP CONNECT proxies.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;
use url::Url;

use crate::error::{ProxyError, TransportError};
use crate::{BoxFuture, BoxedConnection, Dialer};

const SOCKS_VERSION: u8 = 0x05;
const SOCKS_AUTH_VERSION: u8 = 0x01;
const SOCKS_METHOD_NONE: u8 = 0x00;
const SOCKS_METHOD_USER_PASS: u8 = 0x02;
const SOCKS_CMD_CONNECT: u8 = 0x01;
const ATYP_IPV4: u8 = 0x01;
const ATYP_DOMAIN: u8 = 0x03;
const ATYP_IPV6: u8 = 0x04;

const DEFAULT_SOCKS_PORT: u16 = 1080;
const MAX_HTTP_RESPONSE_HEADER: usize = 8192;

/// Username/password for an upstream proxy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyAuth {
    pub username: String,
    pub password: String,
}

impl ProxyAuth {
    fn from_url(url: &Url) -> Option<Self> {
        if url.username().is_empty() {
            return None;
        }
        Some(Self {
            username: url.username().to_string(),
            password: url.password().unwrap_or_default().to_string(),
        })
    }
}

/// Build the dialer for an optional upstream proxy URL.
///
/// No URL means direct connections. Supported schemes are `socks5`
/// (target resolved locally), `socks5h` (target resolved by the proxy) and
/// `http` (CONNECT).
pub fn dialer_from_url(proxy: Option<&Url>) -> Result<Arc<dyn Dialer>, TransportError> {
    let Some(url) = proxy else {
        return Ok(Arc::new(DirectDialer::new()));
    };

    let host = url.host_str().ok_or(ProxyError::MissingHost)?;
    let auth = ProxyAuth::from_url(url);
    match url.scheme() {
        "socks5" | "socks5h" => {
            let port = url.port().unwrap_or(DEFAULT_SOCKS_PORT);
            Ok(Arc::new(Socks5Dialer {
                proxy: format!("{host}:{port}"),
                auth,
                remote_dns: url.scheme() == "socks5h",
            }))
        }
        "http" => {
            let port = url.port_or_known_default().unwrap_or(80);
            Ok(Arc::new(HttpConnectDialer {
                proxy: format!("{host}:{port}"),
                auth,
            }))
        }
        other => Err(ProxyError::UnsupportedScheme(other.to_string()).into()),
    }
}

/// Connects straight to the target.
#[derive(Debug, Clone)]
pub struct DirectDialer {
    no_delay: bool,
}

impl DirectDialer {
    pub fn new() -> Self {
        Self {
            no_delay: ptd_core::DEFAULT_TCP_NO_DELAY,
        }
    }
}

impl Default for DirectDialer {
    fn default() -> Self {
        Self::new()
    }
}

impl Dialer for DirectDialer {
    fn dial<'a>(&'a self, target: &'a str) -> BoxFuture<'a, Result<BoxedConnection, TransportError>> {
        Box::pin(async move {
            let tcp = connect_tcp(target, self.no_delay).await?;
            Ok(Box::new(tcp) as BoxedConnection)
        })
    }
}

/// Dials through a SOCKS5 proxy.
#[derive(Debug, Clone)]
pub struct Socks5Dialer {
    proxy: String,
    auth: Option<ProxyAuth>,
    remote_dns: bool,
}

impl Socks5Dialer {
    pub fn new(proxy: impl Into<String>, auth: Option<ProxyAuth>, remote_dns: bool) -> Self {
        Self {
            proxy: proxy.into(),
            auth,
            remote_dns,
        }
    }
}

impl Dialer for Socks5Dialer {
    fn dial<'a>(&'a self, target: &'a str) -> BoxFuture<'a, Result<BoxedConnection, TransportError>> {
        Box::pin(async move {
            let (host, port) = split_host_port(target)?;
            let dest = if self.remote_dns {
                SocksAddr::from_host(host, port)
            } else {
                let addr = resolve(target).await?;
                SocksAddr::Ip(addr)
            };

            let mut stream = connect_tcp(&self.proxy, true).await?;
            socks5_handshake(&mut stream, self.auth.as_ref(), &dest).await?;
            debug!(proxy = %self.proxy, target, "SOCKS5 tunnel established");
            Ok(Box::new(stream) as BoxedConnection)
        })
    }
}

/// Dials through an HTTP proxy using CONNECT.
#[derive(Debug, Clone)]
pub struct HttpConnectDialer {
    proxy: String,
    auth: Option<ProxyAuth>,
}

impl HttpConnectDialer {
    pub fn new(proxy: impl Into<String>, auth: Option<ProxyAuth>) -> Self {
        Self {
            proxy: proxy.into(),
            auth,
        }
    }
}

impl Dialer for HttpConnectDialer {
    fn dial<'a>(&'a self, target: &'a str) -> BoxFuture<'a, Result<BoxedConnection, TransportError>> {
        Box::pin(async move {
            split_host_port(target)?;
            let mut stream = connect_tcp(&self.proxy, true).await?;
            http_connect(&mut stream, target, self.auth.as_ref()).await?;
            debug!(proxy = %self.proxy, target, "HTTP CONNECT tunnel established");
            Ok(Box::new(stream) as BoxedConnection)
        })
    }
}

async fn connect_tcp(addr: &str, no_delay: bool) -> Result<TcpStream, TransportError> {
    let tcp = TcpStream::connect(addr).await?;
    if no_delay {
        tcp.set_nodelay(true)?;
    }
    Ok(tcp)
}

async fn resolve(target: &str) -> Result<SocketAddr, TransportError> {
    tokio::net::lookup_host(target)
        .await?
        .next()
        .ok_or_else(|| ProxyError::InvalidTarget(target.to_string()).into())
}

/// Split `host:port` or `[v6]:port`.
fn split_host_port(target: &str) -> Result<(&str, u16), ProxyError> {
    let invalid = || ProxyError::InvalidTarget(target.to_string());
    let (host, port) = target.rsplit_once(':').ok_or_else(invalid)?;
    let host = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);
    if host.is_empty() {
        return Err(invalid());
    }
    let port = port.parse().map_err(|_| invalid())?;
    Ok((host, port))
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum SocksAddr {
    Ip(SocketAddr),
    Domain(String, u16),
}

impl SocksAddr {
    fn from_host(host: &str, port: u16) -> Self {
        match host.parse::<IpAddr>() {
            Ok(ip) => SocksAddr::Ip(SocketAddr::new(ip, port)),
            Err(_) => SocksAddr::Domain(host.to_string(), port),
        }
    }

    fn encode(&self, buf: &mut Vec<u8>) -> Result<(), ProxyError> {
        let port = match self {
            SocksAddr::Ip(SocketAddr::V4(addr)) => {
                buf.push(ATYP_IPV4);
                buf.extend_from_slice(&addr.ip().octets());
                addr.port()
            }
            SocksAddr::Ip(SocketAddr::V6(addr)) => {
                buf.push(ATYP_IPV6);
                buf.extend_from_slice(&addr.ip().octets());
                addr.port()
            }
            SocksAddr::Domain(host, port) => {
                let len = u8::try_from(host.len()).map_err(|_| ProxyError::HostTooLong(host.len()))?;
                buf.push(ATYP_DOMAIN);
                buf.push(len);
                buf.extend_from_slice(host.as_bytes());
                *port
            }
        };
        buf.extend_from_slice(&port.to_be_bytes());
        Ok(())
    }
}

async fn socks5_handshake<S>(
    stream: &mut S,
    auth: Option<&ProxyAuth>,
    dest: &SocksAddr,
) -> Result<(), TransportError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let greeting: &[u8] = if auth.is_some() {
        &[SOCKS_VERSION, 2, SOCKS_METHOD_NONE, SOCKS_METHOD_USER_PASS]
    } else {
        &[SOCKS_VERSION, 1, SOCKS_METHOD_NONE]
    };
    stream.write_all(greeting).await?;

    let mut choice = [0u8; 2];
    stream.read_exact(&mut choice).await?;
    if choice[0] != SOCKS_VERSION {
        return Err(ProxyError::InvalidVersion(choice[0]).into());
    }
    match choice[1] {
        SOCKS_METHOD_NONE => {}
        SOCKS_METHOD_USER_PASS => {
            let auth = auth.ok_or(ProxyError::AuthRequired)?;
            socks5_auth(stream, auth).await?;
        }
        _ => return Err(ProxyError::NoAcceptableMethods.into()),
    }

    let mut request = vec![SOCKS_VERSION, SOCKS_CMD_CONNECT, 0x00];
    dest.encode(&mut request)?;
    stream.write_all(&request).await?;

    let mut reply = [0u8; 4];
    stream.read_exact(&mut reply).await?;
    if reply[0] != SOCKS_VERSION {
        return Err(ProxyError::InvalidVersion(reply[0]).into());
    }
    if reply[1] != 0x00 {
        return Err(ProxyError::Reply(reply[1]).into());
    }

    // Bound address is not used; drain it so the tunnel starts clean.
    let skip = match reply[3] {
        ATYP_IPV4 => 4 + 2,
        ATYP_IPV6 => 16 + 2,
        ATYP_DOMAIN => {
            let mut len = [0u8; 1];
            stream.read_exact(&mut len).await?;
            len[0] as usize + 2
        }
        other => return Err(ProxyError::UnsupportedAddressType(other).into()),
    };
    let mut bound = vec![0u8; skip];
    stream.read_exact(&mut bound).await?;
    Ok(())
}

async fn socks5_auth<S>(stream: &mut S, auth: &ProxyAuth) -> Result<(), TransportError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let username = auth.username.as_bytes();
    let password = auth.password.as_bytes();
    let user_len = u8::try_from(username.len()).map_err(|_| ProxyError::AuthRejected)?;
    let pass_len = u8::try_from(password.len()).map_err(|_| ProxyError::AuthRejected)?;

    let mut request = Vec::with_capacity(3 + username.len() + password.len());
    request.push(SOCKS_AUTH_VERSION);
    request.push(user_len);
    request.extend_from_slice(username);
    request.push(pass_len);
    request.extend_from_slice(password);
    stream.write_all(&request).await?;

    let mut response = [0u8; 2];
    stream.read_exact(&mut response).await?;
    if response[0] != SOCKS_AUTH_VERSION {
        return Err(ProxyError::InvalidVersion(response[0]).into());
    }
    if response[1] != 0x00 {
        return Err(ProxyError::AuthRejected.into());
    }
    Ok(())
}

async fn http_connect<S>(
    stream: &mut S,
    target: &str,
    auth: Option<&ProxyAuth>,
) -> Result<(), TransportError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut request = format!("CONNECT {target} HTTP/1.1\r\nHost: {target}\r\n");
    if let Some(auth) = auth {
        let credentials = BASE64.encode(format!("{}:{}", auth.username, auth.password));
        request.push_str(&format!("Proxy-Authorization: Basic {credentials}\r\n"));
    }
    request.push_str("\r\n");
    stream.write_all(request.as_bytes()).await?;

    // Read byte-wise so nothing past the header is consumed.
    let mut response = Vec::with_capacity(256);
    let mut byte = [0u8; 1];
    while !response.ends_with(b"\r\n\r\n") {
        if response.len() >= MAX_HTTP_RESPONSE_HEADER {
            return Err(ProxyError::HttpResponseTooLarge.into());
        }
        stream.read_exact(&mut byte).await?;
        response.push(byte[0]);
    }

    let text = String::from_utf8_lossy(&response);
    let status_line = text.lines().next().unwrap_or_default();
    let status = status_line.split_whitespace().nth(1).unwrap_or_default();
    if status.len() == 3 && status.starts_with('2') {
        Ok(())
    } else {
        Err(ProxyError::HttpStatus(status_line.to_string()).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[test]
    fn test_split_host_port() {
        assert_eq!(split_host_port("example.com:443").unwrap(), ("example.com", 443));
        assert_eq!(split_host_port("[::1]:80").unwrap(), ("::1", 80));
        assert!(split_host_port("example.com").is_err());
        assert!(split_host_port(":80").is_err());
        assert!(split_host_port("host:http").is_err());
    }

    #[test]
    fn test_socks_addr_encoding() {
        let mut buf = Vec::new();
        SocksAddr::from_host("10.0.0.1", 443).encode(&mut buf).unwrap();
        assert_eq!(buf, [ATYP_IPV4, 10, 0, 0, 1, 0x01, 0xBB]);

        let mut buf = Vec::new();
        SocksAddr::from_host("a.io", 80).encode(&mut buf).unwrap();
        assert_eq!(buf, [ATYP_DOMAIN, 4, b'a', b'.', b'i', b'o', 0, 80]);

        let long = "x".repeat(300);
        assert!(matches!(
            SocksAddr::from_host(&long, 1).encode(&mut Vec::new()),
            Err(ProxyError::HostTooLong(300))
        ));
    }

    #[test]
    fn test_dialer_from_url_schemes() {
        assert!(dialer_from_url(None).is_ok());
        for ok in ["socks5://127.0.0.1:9050", "socks5h://u:p@localhost", "http://proxy:3128"] {
            let url = Url::parse(ok).unwrap();
            assert!(dialer_from_url(Some(&url)).is_ok(), "{ok}");
        }
        let url = Url::parse("ftp://proxy:21").unwrap();
        assert!(matches!(
            dialer_from_url(Some(&url)),
            Err(TransportError::Proxy(ProxyError::UnsupportedScheme(_)))
        ));
    }

    #[tokio::test]
    async fn test_socks5_handshake_with_auth() {
        let (mut client, mut proxy) = duplex(1024);
        let auth = ProxyAuth {
            username: "user".into(),
            password: "pw".into(),
        };

        let server = tokio::spawn(async move {
            let mut greeting = [0u8; 4];
            proxy.read_exact(&mut greeting).await.unwrap();
            assert_eq!(greeting, [5, 2, 0, 2]);
            proxy.write_all(&[5, 2]).await.unwrap();

            let mut auth = [0u8; 1 + 1 + 4 + 1 + 2];
            proxy.read_exact(&mut auth).await.unwrap();
            assert_eq!(&auth[2..6], b"user");
            assert_eq!(&auth[7..9], b"pw");
            proxy.write_all(&[1, 0]).await.unwrap();

            let mut request = [0u8; 3 + 1 + 1 + 11 + 2];
            proxy.read_exact(&mut request).await.unwrap();
            assert_eq!(&request[..4], &[5, 1, 0, ATYP_DOMAIN]);
            assert_eq!(&request[5..16], b"example.com");
            assert_eq!(&request[16..], &443u16.to_be_bytes());
            proxy
                .write_all(&[5, 0, 0, ATYP_IPV4, 127, 0, 0, 1, 0x1F, 0x90])
                .await
                .unwrap();
            proxy.write_all(b"payload").await.unwrap();
        });

        let dest = SocksAddr::from_host("example.com", 443);
        socks5_handshake(&mut client, Some(&auth), &dest).await.unwrap();
        let mut payload = [0u8; 7];
        client.read_exact(&mut payload).await.unwrap();
        assert_eq!(&payload, b"payload");
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_socks5_reply_failure() {
        let (mut client, mut proxy) = duplex(1024);
        tokio::spawn(async move {
            let mut greeting = [0u8; 3];
            proxy.read_exact(&mut greeting).await.unwrap();
            proxy.write_all(&[5, 0]).await.unwrap();
            let mut request = [0u8; 10];
            proxy.read_exact(&mut request).await.unwrap();
            proxy.write_all(&[5, 5, 0, ATYP_IPV4]).await.unwrap();
        });

        let dest = SocksAddr::from_host("127.0.0.1", 9);
        let err = socks5_handshake(&mut client, None, &dest).await.unwrap_err();
        assert!(matches!(err, TransportError::Proxy(ProxyError::Reply(5))));
    }

    #[tokio::test]
    async fn test_socks5_auth_required_without_credentials() {
        let (mut client, mut proxy) = duplex(1024);
        tokio::spawn(async move {
            let mut greeting = [0u8; 3];
            proxy.read_exact(&mut greeting).await.unwrap();
            proxy.write_all(&[5, SOCKS_METHOD_USER_PASS]).await.unwrap();
        });

        let dest = SocksAddr::from_host("127.0.0.1", 9);
        let err = socks5_handshake(&mut client, None, &dest).await.unwrap_err();
        assert!(matches!(err, TransportError::Proxy(ProxyError::AuthRequired)));
    }

    #[tokio::test]
    async fn test_http_connect_success_keeps_trailing_bytes() {
        let (mut client, mut proxy) = duplex(1024);
        let auth = ProxyAuth {
            username: "a".into(),
            password: "b".into(),
        };

        let server = tokio::spawn(async move {
            let mut request = Vec::new();
            let mut byte = [0u8; 1];
            while !request.ends_with(b"\r\n\r\n") {
                proxy.read_exact(&mut byte).await.unwrap();
                request.push(byte[0]);
            }
            proxy
                .write_all(b"HTTP/1.1 200 Connection established\r\n\r\nhello")
                .await
                .unwrap();
            String::from_utf8(request).unwrap()
        });

        http_connect(&mut client, "example.com:443", Some(&auth))
            .await
            .unwrap();
        let mut rest = [0u8; 5];
        client.read_exact(&mut rest).await.unwrap();
        assert_eq!(&rest, b"hello");

        let request = server.await.unwrap();
        assert!(request.starts_with("CONNECT example.com:443 HTTP/1.1\r\n"));
        assert!(request.contains("Proxy-Authorization: Basic YTpi\r\n"));
    }

    #[tokio::test]
    async fn test_http_connect_rejected() {
        let (mut client, mut proxy) = duplex(1024);
        tokio::spawn(async move {
            let mut buf = [0u8; 512];
            let _ = proxy.read(&mut buf).await;
            proxy
                .write_all(b"HTTP/1.1 407 Proxy Authentication Required\r\n\r\n")
                .await
                .unwrap();
        });

        let err = http_connect(&mut client, "example.com:443", None)
            .await
            .unwrap_err();
        match err {
            TransportError::Proxy(ProxyError::HttpStatus(line)) => assert!(line.contains("407")),
            other => panic!("unexpected: {other:?}"),
        }
    }
}
