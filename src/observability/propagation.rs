//! W3C Trace Context and Baggage header propagation.
//!
//! # Headers
//! ```text
//! traceparent: 00-<32 hex trace id>-<16 hex parent id>-<2 hex flags>
//! baggage:     key1=value1,key2=value%20two;property
//! ```
//!
//! `extract` never fails: an absent or malformed `traceparent` yields a fresh
//! root context and a malformed `baggage` header yields empty baggage. The
//! strict parsers are public for callers that want the error.

use axum::http::{HeaderMap, HeaderValue};
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};
use thiserror::Error;

use crate::observability::context::{
    Baggage, RequestContext, SpanId, TraceContext, TraceFlags, TraceId,
};

pub const TRACEPARENT: &str = "traceparent";
pub const BAGGAGE: &str = "baggage";

const INVALID_VERSION: u8 = 0xff;
const MAX_BAGGAGE_MEMBERS: usize = 180;
const MAX_BAGGAGE_BYTES: usize = 8192;

/// Octets outside the W3C baggage-octet range, plus `%` so decoding is lossless.
const BAGGAGE_VALUE: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b',')
    .add(b';')
    .add(b'\\')
    .add(b'%');

/// Why an incoming trace header could not be used.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PropagationError {
    #[error("{0} header is not visible ASCII")]
    NotAscii(&'static str),

    #[error("malformed traceparent: {0}")]
    MalformedTraceparent(&'static str),

    #[error("malformed baggage: {0}")]
    MalformedBaggage(String),
}

/// Parse a `traceparent` value into the remote parent's context.
pub fn parse_traceparent(value: &str) -> Result<TraceContext, PropagationError> {
    let mut fields = value.trim().split('-');

    let version = fields
        .next()
        .filter(|v| v.len() == 2 && is_lower_hex(v))
        .and_then(|v| u8::from_str_radix(v, 16).ok())
        .ok_or(PropagationError::MalformedTraceparent("version"))?;
    if version == INVALID_VERSION {
        return Err(PropagationError::MalformedTraceparent("version ff is forbidden"));
    }

    let trace_id = fields
        .next()
        .filter(|v| v.len() == 32 && is_lower_hex(v))
        .and_then(|v| u128::from_str_radix(v, 16).ok())
        .map(TraceId::from_u128)
        .ok_or(PropagationError::MalformedTraceparent("trace id"))?;
    if !trace_id.is_valid() {
        return Err(PropagationError::MalformedTraceparent("all-zero trace id"));
    }

    let span_id = fields
        .next()
        .filter(|v| v.len() == 16 && is_lower_hex(v))
        .and_then(|v| u64::from_str_radix(v, 16).ok())
        .map(SpanId::from_u64)
        .ok_or(PropagationError::MalformedTraceparent("parent id"))?;
    if !span_id.is_valid() {
        return Err(PropagationError::MalformedTraceparent("all-zero parent id"));
    }

    let flags = fields
        .next()
        .filter(|v| v.len() == 2 && is_lower_hex(v))
        .and_then(|v| u8::from_str_radix(v, 16).ok())
        .map(TraceFlags::new)
        .ok_or(PropagationError::MalformedTraceparent("trace flags"))?;

    // Later versions may append fields; version 00 may not.
    if version == 0 && fields.next().is_some() {
        return Err(PropagationError::MalformedTraceparent("trailing fields"));
    }

    Ok(TraceContext::new(trace_id, span_id, flags))
}

/// Parse a `baggage` value. Member properties are accepted and dropped.
pub fn parse_baggage(value: &str) -> Result<Baggage, PropagationError> {
    if value.len() > MAX_BAGGAGE_BYTES {
        return Err(PropagationError::MalformedBaggage(format!(
            "header exceeds {MAX_BAGGAGE_BYTES} bytes"
        )));
    }

    let mut entries = Vec::new();
    for member in value.split(',') {
        let member = member.trim();
        if member.is_empty() {
            continue;
        }

        let pair = member.split(';').next().unwrap_or_default();
        let (key, raw_value) = pair.split_once('=').ok_or_else(|| {
            PropagationError::MalformedBaggage(format!("member `{member}` has no `=`"))
        })?;

        let key = key.trim();
        if !is_token(key) {
            return Err(PropagationError::MalformedBaggage(format!(
                "invalid key `{key}`"
            )));
        }

        let decoded = percent_decode_str(raw_value.trim())
            .decode_utf8()
            .map_err(|_| {
                PropagationError::MalformedBaggage(format!("value for `{key}` is not UTF-8"))
            })?;

        entries.push((key.to_string(), decoded.into_owned()));
        if entries.len() > MAX_BAGGAGE_MEMBERS {
            return Err(PropagationError::MalformedBaggage(format!(
                "more than {MAX_BAGGAGE_MEMBERS} members"
            )));
        }
    }

    Ok(entries.into_iter().collect())
}

pub fn format_traceparent(trace: &TraceContext) -> String {
    format!("00-{}-{}-{}", trace.trace_id, trace.span_id, trace.flags)
}

/// Serialise baggage, skipping entries whose key is not a valid token.
pub fn format_baggage(baggage: &Baggage) -> String {
    baggage
        .iter()
        .filter(|(key, _)| is_token(key))
        .map(|(key, value)| format!("{key}={}", utf8_percent_encode(value, BAGGAGE_VALUE)))
        .collect::<Vec<_>>()
        .join(",")
}

/// Read the incoming trace context and baggage. Never fails.
pub fn extract(headers: &HeaderMap) -> RequestContext {
    let trace = match header_str(headers, TRACEPARENT) {
        Some(value) => value
            .and_then(|v| parse_traceparent(&v))
            .unwrap_or_else(|error| {
                tracing::debug!(%error, "Ignoring upstream trace context");
                TraceContext::root()
            }),
        None => TraceContext::root(),
    };

    let baggage = match header_str(headers, BAGGAGE) {
        Some(value) => value.and_then(|v| parse_baggage(&v)).unwrap_or_else(|error| {
            tracing::debug!(%error, "Ignoring upstream baggage");
            Baggage::new()
        }),
        None => Baggage::new(),
    };

    RequestContext::new(trace, baggage)
}

/// Header fragment carrying `trace` and `baggage` to a downstream service.
///
/// A root context (no span) produces no `traceparent`; empty baggage produces
/// no `baggage` header.
pub fn inject(trace: &TraceContext, baggage: &Baggage) -> HeaderMap {
    let mut headers = HeaderMap::new();

    if trace.is_valid() {
        if let Ok(value) = HeaderValue::from_str(&format_traceparent(trace)) {
            headers.insert(TRACEPARENT, value);
        }
    }

    let encoded = format_baggage(baggage);
    if !encoded.is_empty() {
        match HeaderValue::from_str(&encoded) {
            Ok(value) => {
                headers.insert(BAGGAGE, value);
            }
            Err(error) => tracing::debug!(%error, "Dropping unencodable baggage"),
        }
    }

    headers
}

/// Join every value of `name` with `,`; `None` when the header is absent.
fn header_str(
    headers: &HeaderMap,
    name: &'static str,
) -> Option<Result<String, PropagationError>> {
    let mut values = headers.get_all(name).iter().peekable();
    values.peek()?;

    let joined = values
        .map(|v| v.to_str().map_err(|_| PropagationError::NotAscii(name)))
        .collect::<Result<Vec<_>, _>>()
        .map(|parts| parts.join(","));
    Some(joined)
}

fn is_lower_hex(s: &str) -> bool {
    s.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

/// RFC 7230 token.
fn is_token(s: &str) -> bool {
    !s.is_empty()
        && s.bytes().all(|b| {
            b.is_ascii_alphanumeric()
                || matches!(
                    b,
                    b'!' | b'#' | b'$' | b'%' | b'&' | b'\'' | b'*' | b'+' | b'-' | b'.' | b'^'
                        | b'_' | b'`' | b'|' | b'~'
                )
        })
}
