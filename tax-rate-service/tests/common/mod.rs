//! Common test utilities for tax-rate-service integration tests.

#![allow(dead_code)]

use chrono::{Duration, NaiveDate, Utc};
use jsonwebtoken::{encode, EncodingKey, Header};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use secrecy::Secret;
use serde_json::{json, Value};
use service_core::config::{Config as CommonConfig, Environment};
use std::sync::{Arc, Once};
use tax_rate_service::config::{AuthConfig, DatabaseConfig, TaxRateConfig};
use tax_rate_service::services::{
    Clock, FixedClock, InMemoryTaxRateRepository, TaxRateRepository,
};
use tax_rate_service::startup::Application;
use uuid::Uuid;

pub const JWT_SECRET: &str = "tax-rate-test-secret";

static INIT: Once = Once::new();

/// Initialize tracing for tests (only once).
pub fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter("info,tax_rate_service=debug,sqlx=warn")
            .with_test_writer()
            .try_init()
            .ok();
    });
}

pub fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").expect("valid date")
}

pub fn test_config(database_url: &str) -> TaxRateConfig {
    TaxRateConfig {
        common: CommonConfig {
            port: 0, // Random port for testing
            environment: Environment::Test,
        },
        service_name: "tax-rate-service".to_string(),
        service_version: "test".to_string(),
        log_level: "debug".to_string(),
        otlp_endpoint: None,
        database: DatabaseConfig {
            url: Secret::new(database_url.to_string()),
            max_connections: 2,
            min_connections: 1,
        },
        auth: AuthConfig {
            jwt_secret: Secret::new(JWT_SECRET.to_string()),
        },
    }
}

pub struct TestApp {
    pub address: String,
    pub port: u16,
    pub client: Client,
    pub admin_id: Uuid,
}

impl TestApp {
    /// Spawn the service over an empty in-memory ledger with `today` fixed.
    pub async fn spawn(today: &str) -> Self {
        Self::spawn_with(
            Arc::new(InMemoryTaxRateRepository::new()),
            Arc::new(FixedClock(date(today))),
            "memory://",
        )
        .await
    }

    /// Spawn the service over PostgreSQL at `TEST_DATABASE_URL`, truncating the ledger first.
    pub async fn spawn_postgres(today: &str) -> Self {
        let database_url = std::env::var("TEST_DATABASE_URL")
            .expect("TEST_DATABASE_URL must be set to run PostgreSQL tests");

        let db = tax_rate_service::services::Database::new(&database_url, 2, 1)
            .await
            .expect("Failed to connect to test database");
        db.run_migrations().await.expect("Failed to run migrations");
        sqlx::query("TRUNCATE tax_rates")
            .execute(db.pool())
            .await
            .expect("Failed to truncate tax_rates");

        Self::spawn_with(
            Arc::new(db),
            Arc::new(FixedClock(date(today))),
            &database_url,
        )
        .await
    }

    async fn spawn_with(
        repository: Arc<dyn TaxRateRepository>,
        clock: Arc<dyn Clock>,
        database_url: &str,
    ) -> Self {
        init_tracing();

        let app = Application::build_with_repository(test_config(database_url), repository, clock)
            .await
            .expect("Failed to build test application");

        let port = app.port();
        let address = format!("http://127.0.0.1:{}", port);

        tokio::spawn(async move {
            app.run_until_stopped().await.ok();
        });

        // Wait for HTTP server to be ready by polling health endpoint
        let client = Client::new();
        let health_url = format!("{}/health", address);
        for _ in 0..50 {
            if client.get(&health_url).send().await.is_ok() {
                break;
            }
            tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
        }

        TestApp {
            address,
            port,
            client,
            admin_id: Uuid::new_v4(),
        }
    }

    /// Mint an access token for a fresh user holding `role`.
    pub fn token(&self, role: &str) -> String {
        mint_token(Uuid::new_v4(), role, JWT_SECRET)
    }

    pub fn admin_token(&self) -> String {
        mint_token(self.admin_id, "admin", JWT_SECRET)
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.address, path)
    }

    pub fn get_as(&self, path: &str, role: &str) -> RequestBuilder {
        self.client.get(self.url(path)).bearer_auth(self.token(role))
    }

    pub async fn list(&self) -> Response {
        self.get_as("/api/v1/tax-rates", "readonly")
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn create(&self, rate: f64, multiplier: f64, effective_from: &str) -> Response {
        self.client
            .post(self.url("/api/v1/tax-rates"))
            .bearer_auth(self.admin_token())
            .json(&json!({
                "rate": rate,
                "multiplier": multiplier,
                "effective_from": effective_from,
            }))
            .send()
            .await
            .expect("Failed to execute request")
    }

    /// Create a rate and return its JSON body, failing the test on a non-201.
    pub async fn create_ok(&self, rate: f64, multiplier: f64, effective_from: &str) -> Value {
        let response = self.create(rate, multiplier, effective_from).await;
        assert_eq!(response.status(), StatusCode::CREATED, "create {} failed", effective_from);
        response.json().await.expect("Failed to parse JSON")
    }

    pub async fn effective_on(&self, date: &str) -> Response {
        self.get_as(&format!("/api/v1/tax-rates/effective-on/{}", date), "vendor")
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn patch(&self, id: &str, body: Value) -> Response {
        self.client
            .patch(self.url(&format!("/api/v1/tax-rates/{}", id)))
            .bearer_auth(self.admin_token())
            .json(&body)
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn delete(&self, id: &str) -> Response {
        self.client
            .delete(self.url(&format!("/api/v1/tax-rates/{}", id)))
            .bearer_auth(self.admin_token())
            .send()
            .await
            .expect("Failed to execute request")
    }
}

pub fn mint_token(user_id: Uuid, role: &str, secret: &str) -> String {
    let claims = json!({
        "sub": user_id,
        "role": role,
        "exp": (Utc::now() + Duration::hours(1)).timestamp(),
        "email": format!("{}@example.com", role),
    });

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .expect("Failed to sign token")
}

/// Decimal fields are serialized as JSON numbers.
pub fn approx(value: &Value, expected: f64) -> bool {
    value
        .as_f64()
        .map_or(false, |actual| (actual - expected).abs() < 1e-9)
}
