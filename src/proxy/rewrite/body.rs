//! Reference rewriting for text bodies
//!
//! Works on raw bytes so that bodies in any ASCII-compatible charset survive
//! untouched outside the rewritten references.

use std::borrow::Cow;

use once_cell::sync::Lazy;
use regex::bytes::{Captures, Regex};
use tracing::warn;

use super::RewriteContext;

/// Root-relative attribute values: `href="/a"`, `src='/b'`
static ROOT_RELATIVE_ATTR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?i-u)(\b(?:href|src|action|poster|data-src)\s*=\s*)(?:"(/(?:[^/"][^"]*)?)"|'(/(?:[^/'][^']*)?)')"#,
    )
    .expect("valid attribute pattern")
});

/// Protocol-relative attribute values: `src="//cdn.example/x.js"`
static PROTOCOL_RELATIVE_ATTR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i-u)(\b(?:href|src|action)\s*=\s*)(?:"//([^"]*)"|'//([^']*)')"#)
        .expect("valid attribute pattern")
});

/// Root-relative CSS references in any quote style
static CSS_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?i-u)url\(\s*(?:"(/(?:[^/"][^"]*)?)"|'(/(?:[^/'][^']*)?)'|(/(?:[^/"'\)\s][^"'\)\s]*)?))\s*\)"#,
    )
    .expect("valid css pattern")
});

/// Characters that may continue a host name after a literal origin match
fn continues_host(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || matches!(byte, b'.' | b'-' | b':' | b'_')
}

/// Rewrite every reference in `body` that would escape the proxy
pub fn rewrite_body(body: &[u8], ctx: &RewriteContext) -> Vec<u8> {
    let out = ROOT_RELATIVE_ATTR.replace_all(body, |caps: &Captures| {
        let (quote, value) = quoted(caps, 2, 3);
        let value = decode_html_amp(value);
        match ctx.resolve(&value).map(|abs| ctx.proxy_url(abs.as_str())) {
            Some(proxied) => attribute(&caps[1], quote, proxied.as_bytes()),
            None => caps[0].to_vec(),
        }
    });

    let out = PROTOCOL_RELATIVE_ATTR.replace_all(&out, |caps: &Captures| {
        let (quote, rest) = quoted(caps, 2, 3);
        let absolute = format!("https://{}", decode_html_amp(rest));
        match url::Url::parse(&absolute) {
            Ok(abs) => attribute(&caps[1], quote, ctx.proxy_url(abs.as_str()).as_bytes()),
            Err(_) => caps[0].to_vec(),
        }
    });

    let out = CSS_URL.replace_all(&out, |caps: &Captures| {
        let (quote, value) = match (caps.get(1), caps.get(2), caps.get(3)) {
            (Some(m), _, _) => (Some(b'"'), m.as_bytes()),
            (_, Some(m), _) => (Some(b'\''), m.as_bytes()),
            (_, _, Some(m)) => (None, m.as_bytes()),
            _ => return caps[0].to_vec(),
        };
        let resolved = std::str::from_utf8(value)
            .ok()
            .and_then(|v| ctx.resolve(v))
            .map(|abs| ctx.proxy_url(abs.as_str()));

        match resolved {
            Some(proxied) => {
                let mut css = b"url(".to_vec();
                css.extend(quote);
                css.extend_from_slice(proxied.as_bytes());
                css.extend(quote);
                css.push(b')');
                css
            }
            None => caps[0].to_vec(),
        }
    });

    rewrite_origin_literals(&out, ctx)
}

/// Replace absolute URLs on the target origin that survived the other rules
fn rewrite_origin_literals(body: &[u8], ctx: &RewriteContext) -> Vec<u8> {
    let pattern = format!(
        r#"(?i-u){}(?:[/?#][^\s"'<>()\\`]*)?"#,
        regex::escape(&ctx.origin)
    );
    let literal = match Regex::new(&pattern) {
        Ok(re) => re,
        Err(e) => {
            warn!(origin = %ctx.origin, error = %e, "Origin pattern rejected; skipping literal rewrite");
            return body.to_vec();
        }
    };

    let mut out = Vec::with_capacity(body.len());
    let mut last = 0;

    for m in literal.find_iter(body) {
        if body.get(m.end()).copied().map(continues_host).unwrap_or(false) {
            continue;
        }
        let Some(proxied) = std::str::from_utf8(m.as_bytes())
            .ok()
            .and_then(|v| url::Url::parse(&v.replace("&amp;", "&")).ok())
            .map(|abs| ctx.proxy_url(abs.as_str()))
        else {
            continue;
        };

        out.extend_from_slice(&body[last..m.start()]);
        out.extend_from_slice(proxied.as_bytes());
        last = m.end();
    }

    out.extend_from_slice(&body[last..]);
    out
}

/// Pick whichever quote-style alternative matched
fn quoted<'h>(caps: &Captures<'h>, double: usize, single: usize) -> (u8, &'h [u8]) {
    match caps.get(double) {
        Some(m) => (b'"', m.as_bytes()),
        None => (b'\'', caps.get(single).map(|m| m.as_bytes()).unwrap_or_default()),
    }
}

fn attribute(prefix: &[u8], quote: u8, value: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(prefix.len() + value.len() + 2);
    out.extend_from_slice(prefix);
    out.push(quote);
    out.extend_from_slice(value);
    out.push(quote);
    out
}

fn decode_html_amp(value: &[u8]) -> Cow<'_, str> {
    let text = String::from_utf8_lossy(value);
    if text.contains("&amp;") {
        Cow::Owned(text.replace("&amp;", "&"))
    } else {
        text
    }
}
