use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Service, ServiceType};

// -- JWT Claims --

/// JWT claims shared across helpmate-api (REST middleware) and the gateway
/// upgrade in helpmate-server. Tokens are issued by the external auth service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub username: String,
    pub exp: usize,
}

// -- Users --

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpsertProfileRequest {
    pub username: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub profile_picture: Option<String>,
}

// -- Services --

/// Body of `POST /services`. Every field is optional on the wire so that
/// missing ones can be reported together instead of as a decode failure.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateServiceRequest {
    pub title: Option<String>,
    pub body: Option<String>,
    pub category: Option<String>,
    pub image: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub zip: Option<String>,
    pub phone: Option<String>,
    pub status: Option<bool>,
    pub service_type: Option<ServiceType>,
    pub username: Option<String>,
}

/// Body of `PUT /services/{id}`. Omitted fields keep their stored value.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateServiceRequest {
    pub title: Option<String>,
    pub body: Option<String>,
    pub category: Option<String>,
    pub image: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub zip: Option<String>,
    pub phone: Option<String>,
    pub status: Option<bool>,
}

/// Query string of `GET /services`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceQuery {
    pub query: Option<String>,
    pub status: Option<bool>,
    pub service_type: Option<ServiceType>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateServiceResponse {
    pub message: String,
    pub service: Service,
    pub service_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct UpdateServiceResponse {
    pub message: String,
    pub service: Service,
}

#[derive(Debug, Serialize)]
pub struct StatusMessage {
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct OwnerServicesResponse {
    pub services: Vec<Service>,
}

// -- Messages --

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub message: String,
}
