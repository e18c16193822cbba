// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Validation
//!
//! Turns raw request payloads into workflow commands. Requests are taken as
//! untyped JSON so that every malformed field is reported as `INVALID_DATA`
//! with a field-specific description instead of a generic extractor error.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime};
use serde_json::Value;

use crate::application::{ConfirmMeasureCommand, CreateMeasureCommand, ErrorBody};
use crate::domain::measure::{MeasureId, MeasureType};
use crate::infrastructure::image::decode_image;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{0}")]
    InvalidData(String),

    #[error("{0}")]
    InvalidType(String),
}

impl ValidationError {
    fn data(description: &str) -> Self {
        ValidationError::InvalidData(description.to_string())
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            ValidationError::InvalidData(_) => "INVALID_DATA",
            ValidationError::InvalidType(_) => "INVALID_TYPE",
        }
    }

    pub fn body(&self) -> ErrorBody {
        ErrorBody {
            error_code: self.error_code().to_string(),
            error_description: self.to_string(),
        }
    }
}

/// Fetch a non-empty string field. `None` when the field is absent or null.
fn string_field<'a>(body: &'a Value, field: &str) -> Result<Option<&'a str>, ValidationError> {
    match body.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.as_str())),
        Some(_) => Err(ValidationError::InvalidData(format!("{} must be a string.", field))),
    }
}

fn required<'a>(body: &'a Value, field: &str) -> Result<&'a str, ValidationError> {
    string_field(body, field)?
        .ok_or_else(|| ValidationError::InvalidData(format!("{} must not be null.", field)))
}

/// Accepts RFC 3339, a naive `YYYY-MM-DDTHH:MM:SS[.fff]` or a bare
/// `YYYY-MM-DD`. An explicit offset is kept; naive values are read as UTC.
pub fn parse_measure_datetime(raw: &str) -> Option<DateTime<FixedOffset>> {
    let raw = raw.trim();

    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed);
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(naive.and_utc().fixed_offset());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc().fixed_offset())
}

pub fn create_command(body: &Value) -> Result<CreateMeasureCommand, ValidationError> {
    let image = required(body, "image")?;
    if decode_image(image).is_err() {
        return Err(ValidationError::data("image must be a valid base64 string."));
    }

    let customer_code = required(body, "customer_code")?;

    let measure_datetime = parse_measure_datetime(required(body, "measure_datetime")?)
        .ok_or_else(|| ValidationError::data("measure_datetime must be a valid ISO 8601 date."))?;

    let measure_type: MeasureType = required(body, "measure_type")?
        .parse()
        .map_err(|_| ValidationError::data("measure_type must be one of: WATER or GAS."))?;

    Ok(CreateMeasureCommand {
        image_base64: image.trim().to_string(),
        customer_code: customer_code.to_string(),
        measure_datetime,
        measure_type,
    })
}

pub fn confirm_command(body: &Value) -> Result<ConfirmMeasureCommand, ValidationError> {
    let measure_id = MeasureId::parse(required(body, "measure_uuid")?)
        .map_err(|_| ValidationError::data("measure_uuid must be a valid UUID."))?;

    let confirmed_value = match body.get("confirmed_value") {
        None | Some(Value::Null) => {
            return Err(ValidationError::data("confirmed_value must not be null."))
        }
        Some(value) => value
            .as_i64()
            .and_then(|v| i32::try_from(v).ok())
            .ok_or_else(|| ValidationError::data("confirmed_value must be an integer."))?,
    };

    Ok(ConfirmMeasureCommand {
        measure_id,
        confirmed_value,
    })
}

/// Optional `measure_type` query filter; an empty value means no filter.
pub fn list_filter(raw: Option<&str>) -> Result<Option<MeasureType>, ValidationError> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(value) => value
            .parse()
            .map(Some)
            .map_err(|_| ValidationError::InvalidType("Measure type not allowed".to_string())),
    }
}

/// Split `<uuid>.<ext>` into the measure id and the extension.
pub fn image_file(file: &str) -> Result<(MeasureId, String), ValidationError> {
    let mut pieces = file.split('.');
    let id = pieces.next().unwrap_or_default();
    let extension = pieces.next().unwrap_or_default();

    let id = MeasureId::parse(id)
        .map_err(|_| ValidationError::data("measure_uuid must be a valid UUID."))?;
    Ok((id, extension.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn upload() -> Value {
        json!({
            "image": "aGVsbG8=",
            "customer_code": "C1",
            "measure_datetime": "2024-03-15T10:00:00Z",
            "measure_type": "WATER"
        })
    }

    fn description(err: ValidationError) -> String {
        err.body().error_description
    }

    #[test]
    fn test_create_command_accepts_valid_payload() {
        let command = create_command(&upload()).unwrap();
        assert_eq!(command.customer_code, "C1");
        assert_eq!(command.measure_type, MeasureType::Water);
        assert_eq!(command.measure_datetime.to_rfc3339(), "2024-03-15T10:00:00+00:00");
    }

    #[test]
    fn test_create_command_field_errors() {
        let mut body = upload();
        body["image"] = json!("###");
        assert_eq!(description(create_command(&body).unwrap_err()), "image must be a valid base64 string.");

        let mut body = upload();
        body.as_object_mut().unwrap().remove("customer_code");
        assert_eq!(description(create_command(&body).unwrap_err()), "customer_code must not be null.");

        let mut body = upload();
        body["measure_datetime"] = json!("yesterday");
        let err = create_command(&body).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_DATA");

        let mut body = upload();
        body["measure_type"] = json!("ELECTRICITY");
        assert_eq!(
            description(create_command(&body).unwrap_err()),
            "measure_type must be one of: WATER or GAS."
        );

        let mut body = upload();
        body["customer_code"] = json!(42);
        assert_eq!(description(create_command(&body).unwrap_err()), "customer_code must be a string.");
    }

    #[test]
    fn test_datetime_formats() {
        let expected = "2024-03-15T00:00:00+00:00";
        assert_eq!(parse_measure_datetime("2024-03-15").unwrap().to_rfc3339(), expected);
        assert_eq!(parse_measure_datetime("2024-03-15T00:00:00").unwrap().to_rfc3339(), expected);
        assert_eq!(parse_measure_datetime("2024-03-15T00:00:00.000Z").unwrap().to_rfc3339(), expected);
        assert!(parse_measure_datetime("15/03/2024").is_none());
    }

    #[test]
    fn test_datetime_keeps_reported_offset() {
        let parsed = parse_measure_datetime("2024-03-31T22:00:00-03:00").unwrap();
        assert_eq!(parsed.to_rfc3339(), "2024-03-31T22:00:00-03:00");
        assert_eq!(parsed.offset().local_minus_utc(), -3 * 3600);
        assert_eq!(parsed, parse_measure_datetime("2024-04-01T01:00:00Z").unwrap());
    }

    #[test]
    fn test_confirm_command() {
        let id = MeasureId::new();
        let command = confirm_command(&json!({"measure_uuid": id.to_string(), "confirmed_value": 130})).unwrap();
        assert_eq!(command.measure_id, id);
        assert_eq!(command.confirmed_value, 130);

        let err = confirm_command(&json!({"measure_uuid": "nope", "confirmed_value": 1})).unwrap_err();
        assert_eq!(description(err), "measure_uuid must be a valid UUID.");

        for bad in [json!("130"), json!(1.5), json!(5_000_000_000i64)] {
            let err = confirm_command(&json!({"measure_uuid": id.to_string(), "confirmed_value": bad}))
                .unwrap_err();
            assert_eq!(description(err), "confirmed_value must be an integer.");
        }

        let err = confirm_command(&json!({"measure_uuid": id.to_string()})).unwrap_err();
        assert_eq!(description(err), "confirmed_value must not be null.");
    }

    #[test]
    fn test_list_filter() {
        assert_eq!(list_filter(None).unwrap(), None);
        assert_eq!(list_filter(Some("")).unwrap(), None);
        assert_eq!(list_filter(Some("gas")).unwrap(), Some(MeasureType::Gas));
        assert_eq!(list_filter(Some("WATER")).unwrap(), Some(MeasureType::Water));

        let err = list_filter(Some("STEAM")).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_TYPE");
        assert_eq!(description(err), "Measure type not allowed");
    }

    #[test]
    fn test_image_file() {
        let id = MeasureId::new();
        let (parsed, ext) = image_file(&format!("{}.png", id)).unwrap();
        assert_eq!(parsed, id);
        assert_eq!(ext, "png");

        let (_, ext) = image_file(&id.to_string()).unwrap();
        assert_eq!(ext, "");

        assert!(image_file("logo.png").is_err());
    }
}
