//! Fuzz target for the request gate's input parsing.
//!
//! Every function here consumes attacker-controlled bytes and must never
//! panic:
//!
//! - `TokenService::authenticate`: bearer token parsing and verification
//! - `AdminKeyGuard::check`: admin key comparison, including oversized input
//! - `CidrRange::parse` and `client_key`: proxy configuration and forwarded headers
//! - `validate_*`: sign-up and catalog input validation
//!
//! # Running
//!
//! ```bash
//! cargo +nightly install cargo-fuzz
//! cargo +nightly fuzz run fuzz_gate -- -max_total_time=60
//! ```

#![no_main]

use std::net::SocketAddr;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use arbitrary::Arbitrary;
use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::Request;
use libfuzzer_sys::fuzz_target;
use progress_gate::SystemClock;
use progress_gate::config::{Secret, TokenConfig};
use progress_gate::middleware::{CidrRange, TrustedProxyConfig, client_key};
use progress_gate::security::{AdminKeyGuard, TokenService};
use progress_gate::validation::{
    validate_email, validate_password, validate_title, validate_username,
};

static TOKENS: LazyLock<TokenService> = LazyLock::new(|| {
    TokenService::new(
        &TokenConfig {
            secret: Secret::new("fuzz-signing-key-0123456789abcdef0123"),
            access_ttl: Duration::from_secs(900),
            refresh_ttl: Duration::from_secs(3600),
        },
        Arc::new(SystemClock),
    )
    .expect("valid token config")
});

static ADMIN: LazyLock<AdminKeyGuard> = LazyLock::new(|| {
    AdminKeyGuard::new(&Secret::new("fuzz-admin-key")).expect("valid admin key")
});

#[derive(Debug, Arbitrary)]
struct GateInput<'a> {
    token: &'a str,
    admin_key: &'a str,
    cidr: &'a str,
    forwarded_for: &'a str,
    peer: ([u8; 4], u16),
    text: &'a str,
}

fuzz_target!(|input: GateInput<'_>| {
    let _ = TOKENS.authenticate(input.token);
    let _ = TOKENS.verify(input.token);
    let _ = ADMIN.check(input.admin_key);

    let _ = CidrRange::parse(input.cidr);
    let trusted = TrustedProxyConfig::new(&[input.cidr.to_string()]);

    if let Ok(mut req) = Request::builder()
        .header("x-forwarded-for", input.forwarded_for)
        .body(Body::empty())
    {
        let (ip, port) = input.peer;
        req.extensions_mut()
            .insert(ConnectInfo(SocketAddr::from((ip, port))));
        let _ = client_key(&req, &trusted);
    }

    let _ = validate_email(input.text);
    let _ = validate_username(input.text);
    let _ = validate_password(input.text);
    let _ = validate_title(input.text);
});
