//! JSON and URL-encoded body parsing
//!
//! Bodies with one of the two content types are buffered (up to the
//! configured cap), decoded into a [`ParsedBody`] extension, and handed on
//! with the raw bytes restored, so collaborators can use either the extension
//! or `axum::Json<T>`. Anything else streams through untouched.
//!
//! Oversized bodies fail with 413, never truncation.

use axum::body::{Body, Bytes};
use axum::extract::{FromRequestParts, Request, State};
use axum::http::request::Parts;
use axum::http::{header, HeaderMap};
use axum::middleware::Next;
use axum::response::Response;
use http_body_util::{BodyExt, LengthLimitError, Limited};
use serde_json::{Map, Value};

use crate::error::ApiError;
use crate::state::AppContext;

/// Decoded request body, attached by the body parsing stage
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedBody(pub Value);

impl<S: Send + Sync> FromRequestParts<S> for ParsedBody {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<ParsedBody>()
            .cloned()
            .ok_or_else(|| {
                ApiError::UnsupportedMediaType(
                    "Expected an application/json or application/x-www-form-urlencoded body"
                        .to_string(),
                )
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BodyKind {
    Json,
    UrlEncoded,
}

impl BodyKind {
    fn of(headers: &HeaderMap) -> Option<Self> {
        let content_type = headers.get(header::CONTENT_TYPE)?.to_str().ok()?;
        let essence = content_type.split(';').next()?.trim();

        if essence.eq_ignore_ascii_case("application/json") {
            Some(Self::Json)
        } else if essence.eq_ignore_ascii_case("application/x-www-form-urlencoded") {
            Some(Self::UrlEncoded)
        } else {
            None
        }
    }
}

/// Body parsing stage
pub async fn parse_body(
    State(ctx): State<AppContext>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(kind) = BodyKind::of(request.headers()) else {
        return Ok(next.run(request).await);
    };

    let limit = ctx.config().body_limit;
    if declared_length(request.headers()).is_some_and(|len| len > limit) {
        return Err(too_large(limit));
    }

    let (mut parts, body) = request.into_parts();
    let bytes = read_limited(body, limit).await?;

    let value = match kind {
        BodyKind::Json => parse_json(&bytes)?,
        BodyKind::UrlEncoded => parse_form(&bytes),
    };
    parts.extensions.insert(ParsedBody(value));

    Ok(next.run(Request::from_parts(parts, Body::from(bytes))).await)
}

async fn read_limited(body: Body, limit: usize) -> Result<Bytes, ApiError> {
    match Limited::new(body, limit).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(err) if err.downcast_ref::<LengthLimitError>().is_some() => Err(too_large(limit)),
        Err(err) => Err(ApiError::BadRequest(format!(
            "Failed to read request body: {err}"
        ))),
    }
}

fn declared_length(headers: &HeaderMap) -> Option<usize> {
    headers
        .get(header::CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .parse()
        .ok()
}

fn too_large(limit: usize) -> ApiError {
    ApiError::PayloadTooLarge(format!(
        "Request body exceeds the {} MB limit",
        limit / (1024 * 1024)
    ))
}

/// Strict JSON: only objects and arrays are accepted at the top level.
/// An empty body decodes to `{}`.
fn parse_json(bytes: &[u8]) -> Result<Value, ApiError> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Object(Map::new()));
    }

    let value: Value = serde_json::from_slice(bytes)
        .map_err(|e| ApiError::BadRequest(format!("Malformed JSON body: {e}")))?;

    if value.is_object() || value.is_array() {
        Ok(value)
    } else {
        Err(ApiError::BadRequest(
            "JSON body must be an object or an array".to_string(),
        ))
    }
}

/// Deepest bracket nesting honoured in a form key; the rest stays literal
const FORM_DEPTH: usize = 5;
/// Highest bracket index that still builds an array
const FORM_ARRAY_LIMIT: usize = 20;

/// Form fields become string values, nested by bracket keys:
/// `address[city]=Pune` builds an object, `items[0][name]=a` an array of
/// objects. Repeated keys and `name[]` collect into arrays.
fn parse_form(bytes: &[u8]) -> Value {
    let mut fields = Map::new();

    for (key, value) in url::form_urlencoded::parse(bytes) {
        let (base, path) = split_key(&key);
        let slot = fields.remove(base).unwrap_or(Value::Null);
        let placed = place(slot, &path, value.into_owned());
        fields.insert(base.to_string(), placed);
    }

    Value::Object(
        fields
            .into_iter()
            .map(|(key, value)| (key, compact_arrays(value)))
            .collect(),
    )
}

#[derive(Debug, PartialEq)]
enum Segment<'a> {
    Key(&'a str),
    Push,
}

/// `a[b][]` -> (`a`, [Key(b), Push])
fn split_key(key: &str) -> (&str, Vec<Segment<'_>>) {
    let Some(open) = key.find('[').filter(|&at| at > 0) else {
        return (key, Vec::new());
    };
    let (base, mut rest) = key.split_at(open);

    let mut path = Vec::new();
    while path.len() < FORM_DEPTH {
        let Some(inner) = rest.strip_prefix('[') else {
            break;
        };
        let Some(close) = inner.find(']') else {
            break;
        };
        let name = &inner[..close];
        path.push(if name.is_empty() {
            Segment::Push
        } else {
            Segment::Key(name)
        });
        rest = &inner[close + 1..];
    }

    if path.is_empty() {
        return (key, path);
    }
    if !rest.is_empty() {
        path.push(Segment::Key(rest));
    }
    (base, path)
}

fn place(slot: Value, path: &[Segment<'_>], value: String) -> Value {
    match path.split_first() {
        None => match slot {
            Value::Null => Value::String(value),
            Value::Array(mut items) => {
                items.push(Value::String(value));
                Value::Array(items)
            }
            existing => Value::Array(vec![existing, Value::String(value)]),
        },
        Some((Segment::Push, rest)) => {
            let mut items = into_items(slot);
            items.push(place(Value::Null, rest, value));
            Value::Array(items)
        }
        Some((Segment::Key(name), rest)) => {
            let mut map = into_map(slot);
            let child = map.remove(*name).unwrap_or(Value::Null);
            map.insert(name.to_string(), place(child, rest, value));
            Value::Object(map)
        }
    }
}

fn into_items(slot: Value) -> Vec<Value> {
    match slot {
        Value::Null => Vec::new(),
        Value::Array(items) => items,
        Value::Object(map) => map.into_iter().map(|(_, value)| value).collect(),
        other => vec![other],
    }
}

fn into_map(slot: Value) -> Map<String, Value> {
    match slot {
        Value::Null => Map::new(),
        Value::Object(map) => map,
        Value::Array(items) => items
            .into_iter()
            .enumerate()
            .map(|(index, value)| (index.to_string(), value))
            .collect(),
        other => Map::from_iter([("0".to_string(), other)]),
    }
}

/// Objects keyed only by small indices become arrays, in index order
fn compact_arrays(value: Value) -> Value {
    match value {
        Value::Object(map) if !map.is_empty() && map.keys().all(|key| array_index(key).is_some()) => {
            let mut items: Vec<(usize, Value)> = map
                .into_iter()
                .filter_map(|(key, value)| Some((array_index(&key)?, compact_arrays(value))))
                .collect();
            items.sort_by_key(|(index, _)| *index);
            Value::Array(items.into_iter().map(|(_, value)| value).collect())
        }
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, value)| (key, compact_arrays(value)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(compact_arrays).collect()),
        other => other,
    }
}

fn array_index(key: &str) -> Option<usize> {
    key.parse::<usize>()
        .ok()
        .filter(|index| *index <= FORM_ARRAY_LIMIT && index.to_string() == key)
}
