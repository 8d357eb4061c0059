//! HTTP API wiring (axum router, handlers and DTOs).

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, rejection::QueryRejection, Query, State},
    http::{header, StatusCode},
    middleware::from_fn_with_state,
    response::IntoResponse,
    routing::{get, post},
    Extension, Json, Router,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;

use wallet_common::{Balances, Currency, UserKey};
use wallet_fx::RateCache;

use crate::accounts::AccountService;
use crate::auth::{auth_middleware, AuthState};
use crate::errors::ApiError;
use crate::metrics::SharedMetrics;
use crate::middleware::{cors_middleware, request_logging, CorsState};
use crate::service::WalletService;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<WalletService>,
    pub accounts: Arc<AccountService>,
    pub metrics: SharedMetrics,
    pub rate_cache: Arc<RateCache>,
}

/// Body of registration requests.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    pub email: String,
}

/// Body of login requests.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
}

/// Body of deposit and withdraw requests.
#[derive(Debug, Deserialize)]
pub struct AmountRequest {
    pub amount: Decimal,
    pub currency: String,
}

/// Body of exchange requests.
#[derive(Debug, Deserialize)]
pub struct ExchangeRequest {
    pub from_currency: String,
    pub to_currency: String,
    pub amount: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct RatesQuery {
    pub base: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    pub balance: Balances,
}

/// `new_balance` is omitted when the read after commit failed.
#[derive(Debug, Serialize)]
pub struct MutationResponse {
    pub message: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_balance: Option<Balances>,
}

#[derive(Debug, Serialize)]
pub struct ExchangeResponse {
    pub message: &'static str,
    pub exchanged_amount: Decimal,
    pub rate: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_balance: Option<Balances>,
}

#[derive(Debug, Serialize)]
pub struct RatesResponse {
    pub base: Currency,
    pub rates: BTreeMap<Currency, Decimal>,
}

/// Build the full HTTP router.
pub fn build_app(state: AppState, auth: AuthState, cors: CorsState) -> Router {
    let protected = Router::new()
        .route("/balance", get(get_balance))
        .route("/wallet/deposit", post(deposit))
        .route("/wallet/withdraw", post(withdraw))
        .route("/exchange/rates", get(get_rates))
        .route("/exchange", post(exchange))
        .route_layer(from_fn_with_state(auth, auth_middleware));

    let api = Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .merge(protected);

    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .nest("/api/v1", api)
        .layer(from_fn_with_state(state.metrics.clone(), request_logging))
        .layer(from_fn_with_state(cors, cors_middleware))
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "metrics": state.metrics.snapshot(),
        "rate_cache": state.rate_cache.stats(),
    }))
}

async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.to_prometheus(&state.rate_cache.stats()),
    )
}

async fn register(
    State(state): State<AppState>,
    body: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = body?;
    state
        .accounts
        .register(&req.username, &req.password, &req.email)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "User registered successfully" })),
    ))
}

async fn login(
    State(state): State<AppState>,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<LoginResponse>, ApiError> {
    let Json(req) = body?;
    let token = state.accounts.login(&req.username, &req.password).await?;
    Ok(Json(LoginResponse { token }))
}

async fn get_balance(
    State(state): State<AppState>,
    Extension(user): Extension<UserKey>,
) -> Result<Json<BalanceResponse>, ApiError> {
    let balance = state.service.balance(&user).await?;
    Ok(Json(BalanceResponse { balance }))
}

async fn deposit(
    State(state): State<AppState>,
    Extension(user): Extension<UserKey>,
    body: Result<Json<AmountRequest>, JsonRejection>,
) -> Result<Json<MutationResponse>, ApiError> {
    let Json(req) = body?;
    let currency: Currency = req.currency.parse()?;
    let new_balance = state.service.deposit(&user, currency, req.amount).await?;
    Ok(Json(MutationResponse {
        message: "Account topped up successfully",
        new_balance,
    }))
}

async fn withdraw(
    State(state): State<AppState>,
    Extension(user): Extension<UserKey>,
    body: Result<Json<AmountRequest>, JsonRejection>,
) -> Result<Json<MutationResponse>, ApiError> {
    let Json(req) = body?;
    let currency: Currency = req.currency.parse()?;
    let new_balance = state.service.withdraw(&user, currency, req.amount).await?;
    Ok(Json(MutationResponse {
        message: "Withdrawal successful",
        new_balance,
    }))
}

async fn get_rates(
    State(state): State<AppState>,
    query: Result<Query<RatesQuery>, QueryRejection>,
) -> Result<Json<RatesResponse>, ApiError> {
    let Query(query) = query?;
    let base = match query.base {
        Some(code) => code.parse()?,
        None => Currency::Usd,
    };
    let rates = state.service.rates(base).await?;
    Ok(Json(RatesResponse { base, rates }))
}

async fn exchange(
    State(state): State<AppState>,
    Extension(user): Extension<UserKey>,
    body: Result<Json<ExchangeRequest>, JsonRejection>,
) -> Result<Json<ExchangeResponse>, ApiError> {
    let Json(req) = body?;
    let from: Currency = req.from_currency.parse()?;
    let to: Currency = req.to_currency.parse()?;
    let outcome = state.service.exchange(&user, from, to, req.amount).await?;
    Ok(Json(ExchangeResponse {
        message: "Exchange successful",
        exchanged_amount: outcome.exchanged_amount,
        rate: outcome.rate,
        new_balance: outcome.balances,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts::MemoryUserStore;
    use crate::auth::tests::mint;
    use crate::auth::{TokenIssuer, TokenValidator};
    use crate::metrics::Metrics;
    use axum::body::Body;
    use axum::http::{Method, Request};
    use std::time::Duration;
    use rust_decimal_macros::dec;
    use serde_json::Value;
    use tower::ServiceExt;
    use wallet_fx::{CachingRateSource, StaticRateSource};
    use wallet_ledger::{LedgerEngine, MemoryBalanceStore};

    const SECRET: &str = "test-secret";

    fn app() -> Router {
        let metrics = Arc::new(Metrics::new());
        let rate_cache = Arc::new(RateCache::new());
        let source = Arc::new(StaticRateSource::from_rates([
            (Currency::Usd, Currency::Rub, dec!(90)),
            (Currency::Usd, Currency::Eur, dec!(0.92)),
        ]));
        let rates = Arc::new(CachingRateSource::new(source, rate_cache.clone()));
        let ledger = Arc::new(LedgerEngine::new(MemoryBalanceStore::new()));
        let service = Arc::new(WalletService::new(ledger, rates, metrics.clone()));
        let accounts = Arc::new(
            AccountService::new(
                Arc::new(MemoryUserStore::new()),
                TokenIssuer::new(SECRET.as_bytes(), Duration::from_secs(3600)),
            )
            .with_hash_cost(4),
        );

        build_app(
            AppState {
                service,
                accounts,
                metrics,
                rate_cache,
            },
            AuthState {
                validator: Arc::new(TokenValidator::new(SECRET.as_bytes())),
            },
            CorsState::new(Some("https://wallet.example")),
        )
    }

    fn token(user: &str) -> String {
        mint(SECRET, json!({ "user_id": user }))
    }

    async fn call(app: &Router, method: Method, uri: &str, user: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(user) = user {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token(user)));
        }
        let body = match body {
            Some(json) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };

        let response = app.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }

    fn amount(value: &Value) -> Decimal {
        value.as_str().unwrap().parse().unwrap()
    }

    #[tokio::test]
    async fn test_requires_token() {
        let app = app();
        let (status, body) = call(&app, Method::GET, "/api/v1/balance", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "UNAUTHORIZED");
    }

    #[tokio::test]
    async fn test_balance_is_zero_filled() {
        let app = app();
        let (status, body) = call(&app, Method::GET, "/api/v1/balance", Some("new-user"), None).await;
        assert_eq!(status, StatusCode::OK);
        for code in ["USD", "EUR", "RUB"] {
            assert!(amount(&body["balance"][code]).is_zero());
        }
    }

    #[tokio::test]
    async fn test_deposit_withdraw_flow() {
        let app = app();
        let (status, body) = call(
            &app,
            Method::POST,
            "/api/v1/wallet/deposit",
            Some("alice"),
            Some(json!({"amount": 100, "currency": "USD"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Account topped up successfully");
        assert_eq!(amount(&body["new_balance"]["USD"]), dec!(100));

        let (status, body) = call(
            &app,
            Method::POST,
            "/api/v1/wallet/withdraw",
            Some("alice"),
            Some(json!({"amount": "100.0000001", "currency": "USD"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "INSUFFICIENT_FUNDS");

        let (status, body) = call(
            &app,
            Method::POST,
            "/api/v1/wallet/withdraw",
            Some("alice"),
            Some(json!({"amount": "40.5", "currency": "USD"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Withdrawal successful");
        assert_eq!(amount(&body["new_balance"]["USD"]), dec!(59.5));
    }

    #[tokio::test]
    async fn test_validation_errors() {
        let app = app();
        let cases = [
            json!({"amount": 10, "currency": "GBP"}),
            json!({"amount": 0, "currency": "USD"}),
            json!({"amount": -3, "currency": "EUR"}),
            json!({"currency": "EUR"}),
        ];
        for body in cases {
            let (status, response) =
                call(&app, Method::POST, "/api/v1/wallet/deposit", Some("bob"), Some(body)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(response["error"], "VALIDATION_ERROR");
        }
    }

    #[tokio::test]
    async fn test_exchange_flow() {
        let app = app();
        call(
            &app,
            Method::POST,
            "/api/v1/wallet/deposit",
            Some("carol"),
            Some(json!({"amount": 50, "currency": "USD"})),
        )
        .await;

        let (status, body) = call(
            &app,
            Method::POST,
            "/api/v1/exchange",
            Some("carol"),
            Some(json!({"from_currency": "USD", "to_currency": "RUB", "amount": "12.5"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Exchange successful");
        assert_eq!(amount(&body["exchanged_amount"]), dec!(1125));
        assert_eq!(amount(&body["new_balance"]["USD"]), dec!(37.5));
        assert_eq!(amount(&body["new_balance"]["RUB"]), dec!(1125));

        let (status, body) = call(
            &app,
            Method::POST,
            "/api/v1/exchange",
            Some("carol"),
            Some(json!({"from_currency": "EUR", "to_currency": "RUB", "amount": 1})),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"], "RATE_UNAVAILABLE");
    }

    #[tokio::test]
    async fn test_register_login_and_use_token() {
        let app = app();
        let registration = json!({"username": "erin", "password": "hunter2hunter2", "email": "erin@example.com"});

        let (status, body) =
            call(&app, Method::POST, "/api/v1/register", None, Some(registration.clone())).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["message"], "User registered successfully");

        let (status, body) =
            call(&app, Method::POST, "/api/v1/register", None, Some(registration)).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "CONFLICT");

        let (status, body) = call(
            &app,
            Method::POST,
            "/api/v1/login",
            None,
            Some(json!({"username": "erin", "password": "wrong-password"})),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "UNAUTHORIZED");

        let (status, body) = call(
            &app,
            Method::POST,
            "/api/v1/login",
            None,
            Some(json!({"username": "erin", "password": "hunter2hunter2"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let token = body["token"].as_str().unwrap().to_string();

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/api/v1/balance")
                    .header(header::AUTHORIZATION, format!("Bearer {token}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_rates_listing() {
        let app = app();
        let (status, body) =
            call(&app, Method::GET, "/api/v1/exchange/rates?base=USD", Some("dave"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["base"], "USD");
        assert_eq!(amount(&body["rates"]["USD"]), Decimal::ONE);
        assert_eq!(amount(&body["rates"]["RUB"]), dec!(90));

        let (status, _) =
            call(&app, Method::GET, "/api/v1/exchange/rates?base=JPY", Some("dave"), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_cors_preflight_and_health() {
        let app = app();
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method(Method::OPTIONS)
                    .uri("/api/v1/exchange")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "https://wallet.example"
        );

        let (status, body) = call(&app, Method::GET, "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert!(body["metrics"]["requests_total"].as_u64().unwrap() >= 1);
    }
}
