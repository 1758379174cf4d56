// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! `payouts-probe`: issue one API call using environment configuration.
//!
//! ```text
//! payouts-probe <METHOD> <TEMPLATE> [name=value]... [?name=value]... [--body JSON]
//! ```
//!
//! `name=value` binds a path placeholder, `?name=value` adds a query pair.
//! The response body and the rate-limit snapshot are printed as JSON.

use std::process::ExitCode;

use payouts_client::logging::{self, LogFormat};
use payouts_client::{RequestSpec, TransportClient};
use reqwest::Method;
use serde_json::{json, Value};
use tracing::error;

const USAGE: &str =
    "usage: payouts-probe <METHOD> <TEMPLATE> [name=value]... [?name=value]... [--body JSON]";

fn parse_args(args: &[String]) -> Result<RequestSpec, String> {
    let [method, template, rest @ ..] = args else {
        return Err(USAGE.to_string());
    };
    let method = Method::from_bytes(method.to_ascii_uppercase().as_bytes())
        .map_err(|_| format!("invalid method `{method}`"))?;
    let mut spec = RequestSpec::new(method, template.as_str());

    let mut rest = rest.iter();
    while let Some(arg) = rest.next() {
        if arg == "--body" {
            let raw = rest.next().ok_or("--body needs a JSON argument")?;
            let body: Value =
                serde_json::from_str(raw).map_err(|e| format!("--body is not JSON: {e}"))?;
            spec = spec.json(body);
        } else if let Some(pair) = arg.strip_prefix('?') {
            let (name, value) = pair
                .split_once('=')
                .ok_or_else(|| format!("expected ?name=value, got `{arg}`"))?;
            spec = spec.query(name, value);
        } else {
            let (name, value) = arg
                .split_once('=')
                .ok_or_else(|| format!("expected name=value, got `{arg}`"))?;
            spec = spec.path_param(name, value);
        }
    }
    Ok(spec)
}

#[tokio::main]
async fn main() -> ExitCode {
    // A second init only happens when embedded; nothing to report then.
    let _ = logging::init(LogFormat::from_env());

    let args: Vec<String> = std::env::args().skip(1).collect();
    let spec = match parse_args(&args) {
        Ok(spec) => spec,
        Err(message) => {
            eprintln!("{message}");
            return ExitCode::from(2);
        }
    };

    let client = match TransportClient::from_env() {
        Ok(client) => client,
        Err(e) => {
            error!(error = %e, "Failed to configure client");
            return ExitCode::FAILURE;
        }
    };

    match client.send(spec).await {
        Ok(response) => {
            println!(
                "{}",
                json!({
                    "status": response.status.as_u16(),
                    "body": response.body,
                    "rateLimit": response.rate_limit,
                })
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(
                error = %e,
                error_code = e.error_code(),
                phase = %e.phase(),
                retryable = e.is_retryable(),
                "Call failed"
            );
            if let Some(response) = e.response() {
                eprintln!("{}", response.body);
            }
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn parses_bindings_query_and_body() {
        let spec = parse_args(&args(&[
            "post",
            "/rest/{version}/users/{user-token}/bank-accounts",
            "user-token=usr-1",
            "?limit=5",
            "--body",
            r#"{"type":"CHECKING"}"#,
        ]))
        .unwrap();
        assert_eq!(spec.method(), &Method::POST);

        let url = spec
            .build_url(&url::Url::parse("https://api.example.com").unwrap(), "v4")
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.example.com/rest/v4/users/usr-1/bank-accounts?limit=5"
        );
    }

    #[test]
    fn rejects_incomplete_arguments() {
        assert!(parse_args(&args(&["GET"])).is_err());
        assert!(parse_args(&args(&["GET", "/x", "--body"])).is_err());
        assert!(parse_args(&args(&["GET", "/x", "novalue"])).is_err());
    }
}
