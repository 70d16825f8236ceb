//! Coursemology Login Demo
//!
//! Demonstrates the authentication lifecycle:
//! 1. Log in with username and password (OAuth2 + PKCE)
//! 2. Inspect the token set and CSRF token
//! 3. Make an authenticated request
//! 4. Force a refresh by dropping the access token's lifetime
//!
//! Run with:
//! COURSEMOLOGY_USERNAME=... COURSEMOLOGY_PASSWORD=... cargo run --example login_demo
//!
//! COURSEMOLOGY_HOST, COURSEMOLOGY_ISSUER and COURSEMOLOGY_CLIENT_ID override
//! the production defaults.

use coursemology_sdk::auth::{TokenSet, TokenStore};
use coursemology_sdk::{ClientConfig, CoursemologyClient};
use std::time::{Duration, SystemTime};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing for debug output
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "coursemology_sdk=debug".parse().unwrap()),
        )
        .init();

    let (Ok(username), Ok(password)) = (
        std::env::var("COURSEMOLOGY_USERNAME"),
        std::env::var("COURSEMOLOGY_PASSWORD"),
    ) else {
        eprintln!("Set COURSEMOLOGY_USERNAME and COURSEMOLOGY_PASSWORD first.");
        std::process::exit(2);
    };

    let config = ClientConfig::from_env();
    println!("Host:   {}", config.host);
    println!("Issuer: {}", config.issuer);
    println!();

    let client = CoursemologyClient::new(config)?;

    println!("Logging in as {username}...");
    let tokens = client.login(&username, &password).await?;
    println!("✓ Logged in");
    println!();
    print_token_info(&tokens);
    println!(
        "CSRF token:     {}",
        if client.csrf_token().is_some() { "present" } else { "missing" }
    );
    println!();

    let courses: Option<serde_json::Value> = client.get("/courses").await?;
    match courses {
        Some(body) => println!("GET /courses → {}", truncate(&body.to_string(), 120)),
        None => println!("GET /courses → empty body"),
    }
    println!();

    // Pretend the access token is about to expire; the next call refreshes it
    let mut stale = tokens.clone();
    stale.expires_at = SystemTime::now();
    client.store().set(stale);

    let _: Option<serde_json::Value> = client.get("/courses").await?;
    if let Some(current) = client.current_token() {
        let refreshed = current.access_token != tokens.access_token;
        println!("Access token refreshed: {refreshed}");
        print_token_info(&current);
    }

    client.logout();
    println!();
    println!("Logged out.");
    Ok(())
}

fn print_token_info(tokens: &TokenSet) {
    let now = SystemTime::now();
    let remaining = tokens.remaining_validity(now).unwrap_or(Duration::ZERO);
    println!("Token type:     {}", tokens.token_type);
    println!("Scope:          {}", tokens.scope.as_deref().unwrap_or("-"));
    println!("Expires in:     {}s", remaining.as_secs());
    if let Some(refresh_expires_at) = tokens.refresh_expires_at {
        let remaining = refresh_expires_at
            .duration_since(now)
            .unwrap_or(Duration::ZERO);
        println!("Refresh valid:  {}s", remaining.as_secs());
    }
}

fn truncate(s: &str, max: usize) -> &str {
    coursemology_sdk::utils::safe_truncate(s, max)
}
