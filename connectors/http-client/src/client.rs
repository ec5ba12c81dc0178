use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use storefront_core::{
    proto::{AddToCart, CartContents, CartItem, CreatedOrder, ItemId, OrderRecord, PaymentDetails, UpdateQuantity},
    CartService, OrderService, PaymentService, ServiceError,
};
use tracing::{debug, warn};

use crate::config::HttpConfig;

/// HTTP client for the cart, order and payment services
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    base_url: String,
}

impl HttpClient {
    pub fn new(config: &HttpConfig) -> Result<Self, ServiceError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ServiceError::Unavailable(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, base_url: config.base_url.trim_end_matches('/').to_string() })
    }

    pub fn base_url(&self) -> &str { &self.base_url }

    fn url(&self, path: &str) -> String { format!("{}/{}", self.base_url, path.trim_start_matches('/')) }

    async fn send(&self, request: RequestBuilder) -> Result<Response, ServiceError> {
        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();
        debug!("{} {}", status.as_u16(), response.url());

        if !status.is_success() {
            let reason = response.text().await.unwrap_or_default();
            warn!("request rejected with {}: {}", status, reason);
            return Err(ServiceError::Rejected { status: status.as_u16(), reason });
        }
        Ok(response)
    }

    async fn json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ServiceError> {
        self.send(request).await?.json().await.map_err(|e| ServiceError::InvalidResponse(e.to_string()))
    }
}

fn transport_error(e: reqwest::Error) -> ServiceError {
    if e.is_decode() {
        ServiceError::InvalidResponse(e.to_string())
    } else {
        ServiceError::Unavailable(e.to_string())
    }
}

#[async_trait]
impl CartService for HttpClient {
    async fn add_item(&self, request: &AddToCart) -> Result<(), ServiceError> {
        self.send(self.client.post(self.url("cart/add")).json(request)).await.map(drop)
    }

    async fn update_quantity(&self, id: &ItemId, quantity: u32) -> Result<(), ServiceError> {
        let url = self.url(&format!("cart/items/{id}"));
        self.send(self.client.put(url).json(&UpdateQuantity { quantity })).await.map(drop)
    }

    async fn remove_item(&self, id: &ItemId) -> Result<(), ServiceError> {
        self.send(self.client.delete(self.url(&format!("cart/items/{id}")))).await.map(drop)
    }

    async fn fetch_cart(&self) -> Result<Vec<CartItem>, ServiceError> {
        let contents: CartContents = self.json(self.client.get(self.url("cart"))).await?;
        Ok(contents.items)
    }
}

#[async_trait]
impl OrderService for HttpClient {
    async fn fetch_orders(&self) -> Result<Vec<OrderRecord>, ServiceError> { self.json(self.client.get(self.url("orders"))).await }

    async fn create_order(&self) -> Result<CreatedOrder, ServiceError> { self.json(self.client.post(self.url("orders"))).await }
}

#[async_trait]
impl PaymentService for HttpClient {
    async fn charge(&self, details: &PaymentDetails) -> Result<(), ServiceError> {
        self.send(self.client.post(self.url("payment/charge")).json(details)).await.map(drop)
    }
}
