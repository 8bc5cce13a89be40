use std::net::{IpAddr, Ipv4Addr};
use std::path::Path;
use std::time::Duration;

use reqwest::Client;
use tubedrop_core::error::AppError;
use tubedrop_core::traits::{FetchError, FetchErrorKind};
use url::{Host, Url};

const THUMBNAIL_TIMEOUT: Duration = Duration::from_secs(10);

/// Downloads thumbnail images over HTTP.
///
/// The image URL comes from collaborator metadata, so hosts on loopback,
/// private or link-local networks are refused.
#[derive(Clone)]
pub struct ThumbnailDownloader {
    client: Client,
}

impl ThumbnailDownloader {
    pub fn new(user_agent: &str) -> Result<Self, AppError> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(THUMBNAIL_TIMEOUT)
            .build()
            .map_err(|e| AppError::HttpError(e.to_string()))?;

        Ok(Self { client })
    }

    /// Fetch the image at `url` and write it to `dest`.
    pub async fn fetch(&self, url: &str, dest: &Path) -> Result<(), FetchError> {
        validate_url(url).await.map_err(transport)?;

        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                transport(format!("Thumbnail request timed out after {}s", THUMBNAIL_TIMEOUT.as_secs()))
            } else {
                transport(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(transport(format!("HTTP {} for {}", status.as_u16(), url)));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| transport(format!("Failed to read thumbnail body: {e}")))?;

        tokio::fs::write(dest, &bytes)
            .await
            .map_err(|e| transport(format!("Failed to write thumbnail: {e}")))?;

        tracing::debug!(%url, bytes = bytes.len(), dest = %dest.display(), "Thumbnail saved");
        Ok(())
    }
}

fn transport(reason: impl Into<String>) -> FetchError {
    FetchError::new(FetchErrorKind::Unknown, reason)
}

// ---------------------------------------------------------------------------
// Address guard
// ---------------------------------------------------------------------------

/// Only http(s) URLs whose host is, or resolves to, a public address pass.
async fn validate_url(url: &str) -> Result<(), String> {
    let parsed = Url::parse(url).map_err(|e| format!("Invalid URL: {e}"))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(format!(
            "URL scheme '{}' is not allowed for thumbnails",
            parsed.scheme()
        ));
    }

    let domain = match parsed.host() {
        Some(Host::Ipv4(ip)) => return check_addr(IpAddr::V4(ip)),
        Some(Host::Ipv6(ip)) => return check_addr(IpAddr::V6(ip)),
        Some(Host::Domain(domain)) => domain,
        None => return Err("Thumbnail URL has no host".to_string()),
    };

    let port = parsed.port_or_known_default().unwrap_or(443);
    let mut resolved = tokio::net::lookup_host((domain, port))
        .await
        .map_err(|e| format!("Could not resolve {domain}: {e}"))?
        .peekable();
    if resolved.peek().is_none() {
        return Err(format!("Could not resolve {domain}: no addresses"));
    }
    resolved.try_for_each(|addr| check_addr(addr.ip()))
}

fn check_addr(ip: IpAddr) -> Result<(), String> {
    if is_internal(ip) {
        Err(format!("Refusing thumbnail fetch from internal address {ip}"))
    } else {
        Ok(())
    }
}

fn is_internal(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_internal_v4(v4),
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => is_internal_v4(v4),
            None => {
                let head = v6.segments()[0];
                v6.is_loopback()
                    || v6.is_unspecified()
                    || head & 0xffc0 == 0xfe80
                    || head & 0xfe00 == 0xfc00
            }
        },
    }
}

fn is_internal_v4(ip: Ipv4Addr) -> bool {
    let [a, b, ..] = ip.octets();
    ip.is_loopback()
        || ip.is_private()
        || ip.is_link_local()
        || ip.is_unspecified()
        || ip.is_broadcast()
        || ip.is_documentation()
        // carrier-grade NAT, 100.64.0.0/10
        || (a == 100 && b & 0xc0 == 64)
}
