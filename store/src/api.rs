use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, patch, post},
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use crate::billing::Pricing;
use crate::cart::{CartService, CartView};
use crate::catalog::{Catalog, DEFAULT_CATEGORY, ProductFilter};
use crate::dashboard::{Dashboard, DashboardStats, SalesInsight};
use crate::engine::OrderEngine;
use crate::error::StoreError;
use crate::insights::InsightProvider;
use crate::model::{Notification, Order, OrderLine, Payment, PaymentMethod, Product, ProductDraft, User, UserRole};
use crate::notifier::{Notifier, PushProvider};
use crate::rate_limit::{RateLimiter, limit_requests};
use crate::storage::Storage;

impl IntoResponse for StoreError {
    fn into_response(self) -> Response {
        let status = match &self {
            StoreError::NotFound { .. } => StatusCode::NOT_FOUND,
            StoreError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            StoreError::InsufficientStock(_) => StatusCode::CONFLICT,
            StoreError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!(error = %self, "Request failed");
        }

        let body = match &self {
            StoreError::InsufficientStock(shortages) => json!({ "error": self.to_string(), "shortages": shortages }),
            _ => json!({ "error": self.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, StoreError>;

/// Timeouts and money settings the services are built with.
#[derive(Debug, Clone, Copy)]
pub struct ServiceSettings {
    pub pricing: Pricing,
    pub push_timeout: Duration,
    pub insight_timeout: Duration,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            pricing: Pricing::default(),
            push_timeout: Duration::from_secs(5),
            insight_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    storage: Arc<dyn Storage>,
    catalog: Catalog,
    carts: CartService,
    orders: OrderEngine,
    notifier: Notifier,
    dashboard: Dashboard,
    metrics: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(
        storage: Arc<dyn Storage>,
        push: Arc<dyn PushProvider>,
        insights: Arc<dyn InsightProvider>,
        settings: ServiceSettings,
    ) -> Self {
        let notifier = Notifier::new(storage.clone(), push, settings.push_timeout);
        Self {
            catalog: Catalog::new(storage.clone(), notifier.clone()),
            carts: CartService::new(storage.clone()),
            orders: OrderEngine::new(storage.clone(), notifier.clone(), settings.pricing),
            dashboard: Dashboard::new(storage.clone(), insights, settings.insight_timeout),
            notifier,
            storage,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }
}

pub fn router(state: AppState, limiter: RateLimiter) -> Router {
    let api = Router::new()
        .nest("/auth", auth_routes())
        .nest("/products", product_routes())
        .nest("/cart/{customer_id}", cart_routes())
        .nest("/orders", order_routes())
        .route("/transactions", get(list_transactions))
        .nest("/notifications", notification_routes())
        .nest("/dashboard", dashboard_routes())
        .layer(middleware::from_fn_with_state(limiter, limit_requests));

    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(render_metrics))
        .nest("/api", api)
        .with_state(state)
}

fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/login", post(login))
        .route("/users", get(list_users))
        .route("/users/{id}", get(get_user))
}

fn product_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_products).post(add_product))
        .route("/categories", get(list_categories))
        .route("/describe", post(describe_product))
        .route("/{id}", get(get_product).put(update_product))
        .route("/{id}/discount", post(apply_discount))
}

fn cart_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(get_cart))
        .route("/items", post(add_cart_item))
        .route("/items/{product_id}", patch(update_cart_item).delete(remove_cart_item))
        .route("/checkout", post(checkout))
}

fn order_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_orders).post(place_order))
        .route("/{id}", get(get_order))
        .route("/{id}/payments", post(record_payment))
}

fn notification_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_notifications))
        .route("/reminders", post(send_reminders))
        .route("/{id}/read", post(mark_notification_read))
}

fn dashboard_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(dashboard_stats))
        .route("/insight", get(sales_insight))
        .route("/advertisement", get(get_advertisement).put(set_advertisement))
}

pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK").into_response()
}

async fn render_metrics(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => (StatusCode::OK, handle.render()).into_response(),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed").into_response(),
    }
}

// Auth

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
}

async fn login(State(state): State<AppState>, Json(request): Json<LoginRequest>) -> ApiResult<User> {
    let user = state.storage.find_user_by_email(&request.email).await?;
    info!(user_id = %user.id, role = %user.role, "User logged in");
    Ok(Json(user))
}

#[derive(Debug, Deserialize)]
pub struct UserQuery {
    pub role: Option<UserRole>,
}

async fn list_users(State(state): State<AppState>, Query(query): Query<UserQuery>) -> Json<Vec<User>> {
    let users = state
        .storage
        .list_users()
        .await
        .into_iter()
        .filter(|user| query.role.is_none_or(|role| user.role == role))
        .collect();
    Json(users)
}

async fn get_user(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<User> {
    Ok(Json(state.storage.get_user(&id).await?))
}

// Products

async fn list_products(State(state): State<AppState>, Query(filter): Query<ProductFilter>) -> Json<Vec<Product>> {
    Json(state.catalog.list_products(&filter).await)
}

async fn list_categories(State(state): State<AppState>) -> Json<Vec<String>> {
    Json(state.catalog.categories().await)
}

async fn add_product(
    State(state): State<AppState>,
    Json(draft): Json<ProductDraft>,
) -> Result<(StatusCode, Json<Product>), StoreError> {
    let product = state.catalog.add_product(draft).await?;
    Ok((StatusCode::CREATED, Json(product)))
}

async fn get_product(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Product> {
    Ok(Json(state.catalog.get_product(&id).await?))
}

async fn update_product(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(draft): Json<ProductDraft>,
) -> ApiResult<Product> {
    Ok(Json(state.catalog.update_product(&id, draft).await?))
}

#[derive(Debug, Deserialize)]
pub struct DiscountRequest {
    pub new_price: f64,
}

async fn apply_discount(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<DiscountRequest>,
) -> ApiResult<Product> {
    Ok(Json(state.catalog.apply_discount(&id, request.new_price).await?))
}

#[derive(Debug, Deserialize)]
pub struct DescribeRequest {
    pub name: String,
    #[serde(default)]
    pub category: Option<String>,
}

async fn describe_product(
    State(state): State<AppState>,
    Json(request): Json<DescribeRequest>,
) -> Json<serde_json::Value> {
    let category = request.category.as_deref().unwrap_or(DEFAULT_CATEGORY);
    let description = state.dashboard.product_description(&request.name, category).await;
    Json(json!({ "description": description }))
}

// Cart

#[derive(Debug, Deserialize)]
pub struct AddCartItemRequest {
    pub product_id: String,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
}

fn default_quantity() -> u32 {
    1
}

#[derive(Debug, Deserialize)]
pub struct UpdateCartItemRequest {
    pub delta: i64,
}

#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    #[serde(default)]
    pub amount_paid: f64,
    #[serde(default)]
    pub payment_method: Option<PaymentMethod>,
}

async fn get_cart(State(state): State<AppState>, Path(customer_id): Path<String>) -> ApiResult<CartView> {
    Ok(Json(state.carts.cart(&customer_id).await?.into()))
}

async fn add_cart_item(
    State(state): State<AppState>,
    Path(customer_id): Path<String>,
    Json(request): Json<AddCartItemRequest>,
) -> ApiResult<CartView> {
    let cart = state
        .carts
        .add(&customer_id, &request.product_id, request.quantity)
        .await?;
    Ok(Json(cart.into()))
}

async fn update_cart_item(
    State(state): State<AppState>,
    Path((customer_id, product_id)): Path<(String, String)>,
    Json(request): Json<UpdateCartItemRequest>,
) -> ApiResult<CartView> {
    let cart = state
        .carts
        .update_quantity(&customer_id, &product_id, request.delta)
        .await?;
    Ok(Json(cart.into()))
}

async fn remove_cart_item(
    State(state): State<AppState>,
    Path((customer_id, product_id)): Path<(String, String)>,
) -> ApiResult<CartView> {
    Ok(Json(state.carts.remove(&customer_id, &product_id).await?.into()))
}

async fn checkout(
    State(state): State<AppState>,
    Path(customer_id): Path<String>,
    Json(request): Json<CheckoutRequest>,
) -> Result<(StatusCode, Json<Order>), StoreError> {
    let order = state
        .orders
        .checkout(&customer_id, request.amount_paid, request.payment_method)
        .await?;
    Ok((StatusCode::CREATED, Json(order)))
}

// Orders

#[derive(Debug, Deserialize)]
pub struct OrderQuery {
    pub customer_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PlaceOrderRequest {
    pub customer_id: String,
    pub items: Vec<OrderLine>,
    #[serde(default)]
    pub amount_paid: f64,
    #[serde(default)]
    pub payment_method: Option<PaymentMethod>,
}

#[derive(Debug, Deserialize)]
pub struct PaymentRequest {
    pub amount: f64,
    pub method: PaymentMethod,
}

async fn list_orders(State(state): State<AppState>, Query(query): Query<OrderQuery>) -> ApiResult<Vec<Order>> {
    let orders = match query.customer_id {
        Some(customer_id) => state.orders.order_history(&customer_id).await?,
        None => state.orders.list_orders().await,
    };
    Ok(Json(orders))
}

async fn place_order(
    State(state): State<AppState>,
    Json(request): Json<PlaceOrderRequest>,
) -> Result<(StatusCode, Json<Order>), StoreError> {
    let order = state
        .orders
        .place_order(
            &request.items,
            &request.customer_id,
            request.amount_paid,
            request.payment_method,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(order)))
}

async fn get_order(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Order> {
    Ok(Json(state.orders.get_order(&id).await?))
}

async fn record_payment(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<PaymentRequest>,
) -> ApiResult<Order> {
    Ok(Json(state.orders.record_payment(&id, request.amount, request.method).await?))
}

async fn list_transactions(State(state): State<AppState>) -> Json<Vec<Payment>> {
    Json(state.orders.list_payments().await)
}

// Notifications

#[derive(Debug, Deserialize)]
pub struct NotificationQuery {
    pub user_id: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ReminderRequest {
    #[serde(default)]
    pub message: Option<String>,
}

async fn list_notifications(
    State(state): State<AppState>,
    Query(query): Query<NotificationQuery>,
) -> ApiResult<Vec<Notification>> {
    Ok(Json(state.notifier.notifications_for(&query.user_id).await?))
}

async fn send_reminders(
    State(state): State<AppState>,
    Json(request): Json<ReminderRequest>,
) -> Json<serde_json::Value> {
    let sent = state.notifier.send_reminders(request.message).await;
    Json(json!({ "sent": sent }))
}

async fn mark_notification_read(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Notification> {
    Ok(Json(state.notifier.mark_read(&id).await?))
}

// Dashboard

#[derive(Debug, Deserialize)]
pub struct DashboardQuery {
    pub manager_id: String,
}

#[derive(Debug, Deserialize)]
pub struct AdvertisementRequest {
    pub message: String,
}

async fn dashboard_stats(
    State(state): State<AppState>,
    Query(query): Query<DashboardQuery>,
) -> ApiResult<DashboardStats> {
    Ok(Json(state.dashboard.stats(&query.manager_id).await?))
}

async fn sales_insight(State(state): State<AppState>) -> Json<SalesInsight> {
    Json(state.dashboard.insight().await)
}

async fn get_advertisement(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({ "message": state.dashboard.advertisement().await }))
}

async fn set_advertisement(
    State(state): State<AppState>,
    Json(request): Json<AdvertisementRequest>,
) -> Json<serde_json::Value> {
    let message = state.dashboard.set_advertisement(request.message).await;
    Json(json!({ "message": message }))
}
