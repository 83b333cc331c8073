//! Header policy for both directions of the proxy hop

use std::net::IpAddr;

use axum::http::header::{self, HeaderMap, HeaderName, HeaderValue};
use url::Url;

use super::target::TargetDescriptor;

/// Headers that would reveal the client address or the proxy hop
const FORWARDING_HEADERS: &[&str] = &[
    "x-forwarded-for",
    "x-forwarded-proto",
    "x-forwarded-host",
    "x-real-ip",
    "via",
    "forwarded",
    "from",
];

/// Check if a header is a hop-by-hop header that should not be forwarded
pub fn is_hop_by_hop_header(name: &str) -> bool {
    matches!(
        name.to_lowercase().as_str(),
        "connection"
            | "keep-alive"
            | "proxy-authenticate"
            | "proxy-authorization"
            | "proxy-connection"
            | "te"
            | "trailer"
            | "trailers"
            | "transfer-encoding"
            | "upgrade"
    )
}

pub fn is_forwarding_header(name: &str) -> bool {
    FORWARDING_HEADERS.contains(&name.to_lowercase().as_str())
}

/// Build the headers sent upstream from the client's headers
///
/// `Origin` and `Referer` are restated in terms of the target so the
/// proxy's own address never reaches it.
pub fn outbound_headers(
    inbound: &HeaderMap,
    target: &TargetDescriptor,
    user_agent: &str,
    synthetic_client: Option<IpAddr>,
) -> HeaderMap {
    let mut headers = HeaderMap::with_capacity(inbound.len() + 2);

    for (name, value) in inbound {
        let key = name.as_str();
        if is_hop_by_hop_header(key)
            || is_forwarding_header(key)
            || name == header::HOST
            || name == header::CONTENT_LENGTH
            || name == header::USER_AGENT
            || name == header::ACCEPT_ENCODING
            || name == header::ORIGIN
            || name == header::REFERER
        {
            continue;
        }
        headers.append(name.clone(), value.clone());
    }

    if let Ok(ua) = HeaderValue::from_str(user_agent) {
        headers.insert(header::USER_AGENT, ua);
    }

    if inbound.contains_key(header::ORIGIN) {
        if let Ok(origin) = HeaderValue::from_str(&target.origin) {
            headers.insert(header::ORIGIN, origin);
        }
    }

    if let Some(referer) = inbound
        .get(header::REFERER)
        .and_then(|v| v.to_str().ok())
        .and_then(proxied_referer)
        .and_then(|r| HeaderValue::from_str(r.as_str()).ok())
    {
        headers.insert(header::REFERER, referer);
    }

    let accept = negotiate_accept_encoding(inbound.get(header::ACCEPT_ENCODING));
    headers.insert(header::ACCEPT_ENCODING, HeaderValue::from_static(accept));

    if let Some(addr) = synthetic_client {
        if let Ok(value) = HeaderValue::from_str(&addr.to_string()) {
            headers.insert(HeaderName::from_static("x-forwarded-for"), value);
        }
    }

    headers
}

/// Recover the target page from a referer pointing at a proxy link
fn proxied_referer(referer: &str) -> Option<Url> {
    let referer = Url::parse(referer).ok()?;
    if referer.path() != "/proxy" {
        return None;
    }
    let (_, target) = referer.query_pairs().find(|(k, _)| k == "url")?;
    Url::parse(&target)
        .ok()
        .filter(|u| matches!(u.scheme(), "http" | "https"))
}

/// Narrow the client's accepted codings to the ones the rewriter can undo
pub fn negotiate_accept_encoding(client: Option<&HeaderValue>) -> &'static str {
    let Some(raw) = client.and_then(|v| v.to_str().ok()) else {
        return "identity";
    };

    let accepted = |coding: &str| {
        raw.split(',').any(|part| {
            let mut pieces = part.trim().split(';');
            let name = pieces.next().unwrap_or_default().trim();
            let refused = pieces.any(|p| {
                let p = p.trim().replace(' ', "");
                p == "q=0" || p == "q=0.0" || p == "q=0.00" || p == "q=0.000"
            });
            name.eq_ignore_ascii_case(coding) && !refused
        })
    };

    match (accepted("gzip"), accepted("deflate")) {
        (true, true) => "gzip, deflate",
        (true, false) => "gzip",
        (false, true) => "deflate",
        (false, false) => "identity",
    }
}
