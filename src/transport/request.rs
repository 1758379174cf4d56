// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Request description and URL building.

use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::multipart::{Form, Part};
use reqwest::Method;
use serde_json::Value;
use url::Url;

use crate::error::ApiError;

/// Placeholder bound to the configured API version unless the caller binds it.
pub const VERSION_PLACEHOLDER: &str = "version";

/// Name of the JSON metadata part of a multipart upload.
pub const MULTIPART_DATA_PART: &str = "data";

/// Body of an outgoing request.
#[derive(Debug, Clone)]
pub enum RequestBody {
    /// A JSON record; protected when payload encryption is configured.
    Json(Value),
    /// A document upload; never protected.
    Multipart(MultipartBody),
}

/// One opaque binary part of a multipart upload.
#[derive(Debug, Clone)]
pub struct FilePart {
    pub name: String,
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl FilePart {
    pub fn new(name: impl Into<String>, file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            file_name: file_name.into(),
            content_type: None,
            bytes,
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

/// Binary parts plus an optional JSON metadata part named `data`.
#[derive(Debug, Clone, Default)]
pub struct MultipartBody {
    pub metadata: Option<Value>,
    pub files: Vec<FilePart>,
}

impl MultipartBody {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn file(mut self, file: FilePart) -> Self {
        self.files.push(file);
        self
    }

    pub(crate) fn into_form(self) -> Result<Form, ApiError> {
        let mut form = Form::new();
        if let Some(metadata) = self.metadata {
            let part = Part::text(metadata.to_string())
                .mime_str("application/json")
                .map_err(|e| ApiError::InvalidRequest(format!("metadata part: {e}")))?;
            form = form.part(MULTIPART_DATA_PART, part);
        }
        for file in self.files {
            let mut part = Part::bytes(file.bytes).file_name(file.file_name);
            if let Some(content_type) = file.content_type {
                part = part.mime_str(&content_type).map_err(|e| {
                    ApiError::InvalidRequest(format!("part {}: {e}", file.name))
                })?;
            }
            form = form.part(file.name, part);
        }
        Ok(form)
    }
}

/// One API call: method, URI template with `{name}` placeholders, bindings
/// and body.
///
/// ```
/// use payouts_client::transport::RequestSpec;
///
/// let spec = RequestSpec::get("/rest/{version}/users/{user-token}")
///     .path_param("user-token", "usr-1")
///     .query("limit", "10");
/// assert_eq!(spec.template(), "/rest/{version}/users/{user-token}");
/// ```
#[derive(Debug, Clone)]
pub struct RequestSpec {
    method: Method,
    template: String,
    path_params: BTreeMap<String, String>,
    query: Vec<(String, String)>,
    body: Option<RequestBody>,
    headers: Vec<(String, String)>,
    timeout: Option<Duration>,
}

impl RequestSpec {
    pub fn new(method: Method, template: impl Into<String>) -> Self {
        Self {
            method,
            template: template.into(),
            path_params: BTreeMap::new(),
            query: Vec::new(),
            body: None,
            headers: Vec::new(),
            timeout: None,
        }
    }

    pub fn get(template: impl Into<String>) -> Self {
        Self::new(Method::GET, template)
    }

    pub fn post(template: impl Into<String>) -> Self {
        Self::new(Method::POST, template)
    }

    pub fn put(template: impl Into<String>) -> Self {
        Self::new(Method::PUT, template)
    }

    pub fn delete(template: impl Into<String>) -> Self {
        Self::new(Method::DELETE, template)
    }

    pub fn path_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.path_params.insert(name.into(), value.into());
        self
    }

    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(RequestBody::Json(body));
        self
    }

    pub fn multipart(mut self, body: MultipartBody) -> Self {
        self.body = Some(RequestBody::Multipart(body));
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Override the client timeout for this call.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    pub fn body(&self) -> Option<&RequestBody> {
        self.body.as_ref()
    }

    pub(crate) fn timeout_override(&self) -> Option<Duration> {
        self.timeout
    }

    pub(crate) fn take_body(&mut self) -> Option<RequestBody> {
        self.body.take()
    }

    /// Resolve the full URL against `base`. Fails before any I/O when a
    /// placeholder is unbound or the template is malformed.
    pub fn build_url(&self, base: &Url, api_version: &str) -> Result<Url, ApiError> {
        let segments = self
            .template
            .split('/')
            .filter(|segment| !segment.is_empty())
            .map(|segment| expand_segment(segment, &self.path_params, api_version))
            .collect::<Result<Vec<_>, _>>()?;

        let mut url = base.clone();
        url.path_segments_mut()
            .map_err(|_| ApiError::InvalidRequest(format!("{base} cannot be a base URL")))?
            .pop_if_empty()
            .extend(segments.iter());

        if !self.query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (name, value) in &self.query {
                pairs.append_pair(name, value);
            }
        }
        Ok(url)
    }

    /// Caller headers, validated.
    pub(crate) fn header_map(&self) -> Result<HeaderMap, ApiError> {
        let mut map = HeaderMap::with_capacity(self.headers.len());
        for (name, value) in &self.headers {
            let header_name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| ApiError::InvalidRequest(format!("invalid header name `{name}`")))?;
            let header_value = HeaderValue::from_str(value)
                .map_err(|_| ApiError::InvalidRequest(format!("invalid value for header `{name}`")))?;
            map.append(header_name, header_value);
        }
        Ok(map)
    }
}

/// Substitute every `{name}` in one path segment. The result is raw text;
/// percent-encoding happens when the segment is pushed onto the URL.
fn expand_segment(
    segment: &str,
    params: &BTreeMap<String, String>,
    api_version: &str,
) -> Result<String, ApiError> {
    let mut out = String::with_capacity(segment.len());
    let mut rest = segment;

    while let Some(open) = rest.find(['{', '}']) {
        if rest[open..].starts_with('}') {
            return Err(ApiError::InvalidRequest(format!(
                "unbalanced `}}` in path segment `{segment}`"
            )));
        }
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let close = after.find('}').ok_or_else(|| {
            ApiError::InvalidRequest(format!("unterminated placeholder in `{segment}`"))
        })?;
        let name = &after[..close];
        if name.is_empty() || name.contains('{') {
            return Err(ApiError::InvalidRequest(format!(
                "invalid placeholder in `{segment}`"
            )));
        }

        let value = match params.get(name) {
            Some(value) => value.as_str(),
            None if name == VERSION_PLACEHOLDER => api_version,
            None => {
                return Err(ApiError::InvalidRequest(format!(
                    "no value bound for placeholder `{{{name}}}`"
                )))
            }
        };
        if value.is_empty() {
            return Err(ApiError::InvalidRequest(format!(
                "placeholder `{{{name}}}` is bound to an empty value"
            )));
        }
        out.push_str(value);
        rest = &after[close + 1..];
    }
    out.push_str(rest);
    Ok(out)
}
