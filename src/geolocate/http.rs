use actix_web::{error::ErrorInternalServerError, http::StatusCode, post, web, HttpResponse};
use serde_json::json;
use tracing::error;

use super::{LocateError, LocationRequest, Locator};

#[post("/v1/geolocate")]
pub async fn service(
    data: web::Json<LocationRequest>,
    locator: web::Data<Locator>,
) -> actix_web::Result<HttpResponse> {
    match locator.locate(&data.into_inner()).await {
        Ok(resp) => Ok(HttpResponse::Ok().json(resp)),
        Err(LocateError::EmptyRequest) => Ok(geolocation_error(
            StatusCode::BAD_REQUEST,
            "parseError",
            "Parse Error",
            "The request does not name any cell towers",
        )),
        Err(LocateError::NotFound) => Ok(geolocation_error(
            StatusCode::NOT_FOUND,
            "notFound",
            "Not found",
            "No location could be estimated based on the data provided",
        )),
        Err(LocateError::Store(e)) => {
            error!("geolocate lookup failed: {e}");
            Err(ErrorInternalServerError(e))
        }
    }
}

fn geolocation_error(
    status: StatusCode,
    reason: &str,
    message: &str,
    detail: &str,
) -> HttpResponse {
    HttpResponse::build(status).json(json!(
        {
            "error": {
                "errors": [{
                    "domain": "geolocation",
                    "reason": reason,
                    "message": detail,
                }],
                "code": status.as_u16(),
                "message": message,
            }
        }
    ))
}
