//! Response header rewriting: redirect locations and cookie scope

use axum::http::header::{self, HeaderMap, HeaderValue};
use cookie::Cookie;
use tracing::debug;

use super::RewriteContext;
use crate::proxy::headers::is_hop_by_hop_header;

/// Point a redirect location back through the proxy.
///
/// Returns `None` if the location cannot be resolved; callers keep the
/// original value.
pub fn rewrite_location(location: &str, ctx: &RewriteContext) -> Option<String> {
    match ctx.resolve(location) {
        Some(absolute) => Some(ctx.proxy_url(absolute.as_str())),
        None => {
            debug!(location, "Leaving unresolvable redirect location untouched");
            None
        }
    }
}

/// Re-scope a `Set-Cookie` value to the proxy.
///
/// `Secure` and `Domain` are dropped and an explicit `Path` becomes `/`,
/// since every proxied page lives under the proxy's own host and path.
/// Values that do not parse as a cookie are passed through.
pub fn rewrite_set_cookie(value: &str) -> String {
    let mut cookie = match Cookie::parse(value) {
        Ok(cookie) => cookie,
        Err(e) => {
            debug!(error = %e, "Leaving unparsable Set-Cookie untouched");
            return value.to_string();
        }
    };

    // An explicit `false` keeps SameSite=None from re-adding `Secure`
    cookie.set_secure(false);
    cookie.unset_domain();
    if cookie.path().is_some() {
        cookie.set_path("/");
    }

    cookie.to_string()
}

/// Copy upstream response headers, dropping hop-by-hop headers and
/// re-scoping cookies
pub fn response_headers(upstream: &HeaderMap) -> HeaderMap {
    let mut headers = HeaderMap::with_capacity(upstream.len());

    for (name, value) in upstream {
        if is_hop_by_hop_header(name.as_str()) {
            continue;
        }

        if name == header::SET_COOKIE {
            let rewritten = value
                .to_str()
                .ok()
                .map(rewrite_set_cookie)
                .and_then(|v| HeaderValue::from_str(&v).ok())
                .unwrap_or_else(|| value.clone());
            headers.append(header::SET_COOKIE, rewritten);
            continue;
        }

        headers.append(name.clone(), value.clone());
    }

    headers
}
