use axum::{
    Extension, Json,
    extract::State,
    http::StatusCode,
};
use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use helpmate_db::models::{NewService, ServiceChanges, format_timestamp};
use helpmate_db::{Database, ServiceFilter};
use helpmate_types::api::{
    Claims, CreateServiceRequest, CreateServiceResponse, OwnerServicesResponse, ServiceQuery,
    StatusMessage, UpdateServiceRequest, UpdateServiceResponse,
};
use helpmate_types::models::{DEFAULT_SERVICE_IMAGE, Service, ServiceWithOwner};

use crate::error::{ApiError, ApiResult};
use crate::extract::{AppJson, AppPath, AppQuery};
use crate::{AppState, convert, with_db};

/// `POST /services`: create a listing owned by the requester.
pub async fn create_service(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    AppJson(req): AppJson<CreateServiceRequest>,
) -> ApiResult<(StatusCode, Json<CreateServiceResponse>)> {
    let new_service = validate_new_service(req, &claims, Uuid::new_v4())?;
    let id = new_service.id.clone();

    let row = with_db(&state, move |db| {
        db.insert_service(&new_service)?;
        db.get_service(&new_service.id)?
            .ok_or_else(|| ApiError::Internal(anyhow::anyhow!("service vanished after insert")))
    })
    .await?;

    info!("{} ({}) created service {}", claims.username, claims.sub, id);

    let service = convert::service(row);
    Ok((
        StatusCode::CREATED,
        Json(CreateServiceResponse {
            message: "Service created successfully".into(),
            service_id: service.id,
            service,
        }),
    ))
}

/// `GET /services`: every listing matching the optional filters, owners joined.
pub async fn list_services(
    State(state): State<AppState>,
    AppQuery(query): AppQuery<ServiceQuery>,
) -> ApiResult<Json<Vec<ServiceWithOwner>>> {
    let filter = ServiceFilter {
        query: query.query,
        status: query.status,
        service_type: query.service_type,
    };

    let rows = with_db(&state, move |db| Ok(db.search_services(&filter)?)).await?;

    let services = rows
        .into_iter()
        .map(|row| ServiceWithOwner {
            service: convert::service(row.service),
            owner: row.owner.map(convert::profile),
        })
        .collect();

    Ok(Json(services))
}

/// `PUT /services/{id}`: owner-only partial update.
pub async fn update_service(
    State(state): State<AppState>,
    AppPath(service_id): AppPath<Uuid>,
    Extension(claims): Extension<Claims>,
    AppJson(req): AppJson<UpdateServiceRequest>,
) -> ApiResult<Json<UpdateServiceResponse>> {
    let changes = validate_changes(req)?;
    let requester = claims.sub;

    let row = with_db(&state, move |db| {
        let id = service_id.to_string();
        ensure_owner(db, &id, requester)?;
        db.update_service(&id, &changes, &format_timestamp(Utc::now()))?
            .ok_or(ApiError::NotFound("Service"))
    })
    .await?;

    info!("{} ({}) updated service {}", claims.username, claims.sub, service_id);

    Ok(Json(UpdateServiceResponse {
        message: "Service updated successfully".into(),
        service: convert::service(row),
    }))
}

/// `DELETE /services/{id}`: owner-only removal.
pub async fn delete_service(
    State(state): State<AppState>,
    AppPath(service_id): AppPath<Uuid>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<StatusMessage>> {
    let requester = claims.sub;

    with_db(&state, move |db| {
        let id = service_id.to_string();
        ensure_owner(db, &id, requester)?;
        if db.delete_service(&id)? {
            Ok(())
        } else {
            Err(ApiError::NotFound("Service"))
        }
    })
    .await?;

    info!("{} ({}) deleted service {}", claims.username, claims.sub, service_id);

    Ok(Json(StatusMessage {
        message: "Service deleted successfully".into(),
    }))
}

/// `GET /users/{id}/services`: all listings of one owner, unfiltered.
pub async fn list_user_services(
    State(state): State<AppState>,
    AppPath(user_id): AppPath<Uuid>,
) -> ApiResult<Json<OwnerServicesResponse>> {
    let rows = with_db(&state, move |db| {
        Ok(db.get_services_by_user(&user_id.to_string())?)
    })
    .await?;

    let services: Vec<Service> = rows.into_iter().map(convert::service).collect();
    Ok(Json(OwnerServicesResponse { services }))
}

/// NotFound if the service is absent, PermissionDenied if `requester` does
/// not own it.
fn ensure_owner(db: &Database, service_id: &str, requester: Uuid) -> ApiResult<()> {
    let service = db.get_service(service_id)?.ok_or(ApiError::NotFound("Service"))?;

    if service.user_id != requester.to_string() {
        warn!(
            "User {} tried to modify service {} owned by {}",
            requester, service_id, service.user_id
        );
        return Err(ApiError::PermissionDenied);
    }
    Ok(())
}

/// `Some` only when the value has visible content.
fn present(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn validate_new_service(
    req: CreateServiceRequest,
    claims: &Claims,
    id: Uuid,
) -> ApiResult<NewService> {
    let title = present(req.title);
    let body = present(req.body);
    let category = present(req.category);
    let address = present(req.address);
    let city = present(req.city);
    let country = present(req.country);
    let zip = present(req.zip);
    let phone = present(req.phone);

    let missing: Vec<&str> = [
        ("title", title.is_none()),
        ("body", body.is_none()),
        ("category", category.is_none()),
        ("address", address.is_none()),
        ("city", city.is_none()),
        ("country", country.is_none()),
        ("zip", zip.is_none()),
        ("phone", phone.is_none()),
        ("serviceType", req.service_type.is_none()),
    ]
    .into_iter()
    .filter_map(|(name, is_missing)| is_missing.then_some(name))
    .collect();

    let (Some(title), Some(body), Some(category), Some(service_type)) =
        (title, body, category, req.service_type)
    else {
        return Err(missing_fields(&missing));
    };
    if !missing.is_empty() {
        return Err(missing_fields(&missing));
    }

    Ok(NewService {
        id: id.to_string(),
        user_id: claims.sub.to_string(),
        username: present(req.username).unwrap_or_else(|| claims.username.clone()),
        title,
        body,
        category,
        image: present(req.image).unwrap_or_else(|| DEFAULT_SERVICE_IMAGE.to_string()),
        address,
        city,
        country,
        zip,
        phone,
        status: req.status.unwrap_or(true),
        service_type: service_type.as_str().to_string(),
        created_at: format_timestamp(Utc::now()),
    })
}

fn missing_fields(missing: &[&str]) -> ApiError {
    ApiError::Validation(format!("All fields are required (missing: {})", missing.join(", ")))
}

/// Title, body and category may be replaced but not blanked.
fn validate_changes(req: UpdateServiceRequest) -> ApiResult<ServiceChanges> {
    let blanked: Vec<&str> = [
        ("title", &req.title),
        ("body", &req.body),
        ("category", &req.category),
    ]
    .into_iter()
    .filter(|(_, value)| value.as_deref().is_some_and(|v| v.trim().is_empty()))
    .map(|(name, _)| name)
    .collect();

    if !blanked.is_empty() {
        return Err(ApiError::Validation(format!(
            "Fields cannot be empty: {}",
            blanked.join(", ")
        )));
    }

    Ok(ServiceChanges {
        title: req.title,
        body: req.body,
        category: req.category,
        image: req.image,
        address: req.address,
        city: req.city,
        country: req.country,
        zip: req.zip,
        phone: req.phone,
        status: req.status,
    })
}
