use actix_web::{error::JsonPayloadError, HttpRequest, HttpResponse, ResponseError};
use serde::Serialize;

use crate::error::AppError;

#[derive(Serialize)]
pub struct ResponseDto<T: Serialize> {
    pub data: Option<T>,
    pub code: i32,
    pub msg: String,
}

impl<T: Serialize> ResponseDto<T> {
    pub fn success(data: Option<T>) -> Self {
        Self {
            data,
            code: 0,
            msg: "".to_string(),
        }
    }
}

pub fn json_error_handler(err: JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    let app_err = match err {
        JsonPayloadError::ContentType => AppError::validation("unsupported content type"),
        JsonPayloadError::Deserialize(_) => AppError::validation("malformed request payload"),
        _ => AppError::validation("malformed request payload"),
    };
    app_err.into()
}

pub fn response_from_error(err: &AppError) -> HttpResponse {
    HttpResponse::build(err.status_code()).json(ResponseDto::<()> {
        data: None,
        code: err.code(),
        msg: err.msg(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_envelope_serializes_with_zero_code() {
        let dto = ResponseDto::success(Some(vec![1, 2, 3]));
        let json = serde_json::to_value(&dto).unwrap();
        assert_eq!(json["code"], 0);
        assert_eq!(json["msg"], "");
        assert_eq!(json["data"], serde_json::json!([1, 2, 3]));
    }

    #[test]
    fn empty_success_has_null_data() {
        let dto = ResponseDto::<()>::success(None);
        let json = serde_json::to_value(&dto).unwrap();
        assert!(json["data"].is_null());
    }
}
