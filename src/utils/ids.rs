use serde_json::Value;

use crate::utils::errors::AppError;

/// Parses a path segment into a positive integer identifier.
pub fn parse_id(raw: &str, field: &str) -> Result<i32, AppError> {
    match raw.trim().parse::<i32>() {
        Ok(id) if id > 0 => Ok(id),
        _ => Err(AppError::BadRequest(format!(
            "Parameter '{field}' must be a positive integer"
        ))),
    }
}

/// Accepts a JSON number or a numeric string, as clients send either.
pub fn id_from_json(value: Option<&Value>, field: &str) -> Result<i32, AppError> {
    let value = value
        .filter(|v| !v.is_null())
        .ok_or_else(|| AppError::BadRequest(format!("Parameter '{field}' is required")))?;

    match value {
        Value::Number(n) => n
            .as_i64()
            .and_then(|id| i32::try_from(id).ok())
            .filter(|id| *id > 0)
            .ok_or_else(|| {
                AppError::BadRequest(format!("Parameter '{field}' must be a positive integer"))
            }),
        Value::String(s) => parse_id(s, field),
        _ => Err(AppError::BadRequest(format!(
            "Parameter '{field}' must be a positive integer"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn path_ids_must_be_positive_integers() {
        assert_eq!(parse_id("42", "id").unwrap(), 42);
        assert!(parse_id("abc", "id").is_err());
        assert!(parse_id("0", "id").is_err());
        assert!(parse_id("-3", "id").is_err());
    }

    #[test]
    fn json_ids_accept_numbers_and_numeric_strings() {
        assert_eq!(id_from_json(Some(&json!(7)), "candidateId").unwrap(), 7);
        assert_eq!(id_from_json(Some(&json!("8")), "candidateId").unwrap(), 8);
        assert!(id_from_json(Some(&json!("x")), "candidateId").is_err());
        assert!(id_from_json(Some(&json!(1.5)), "candidateId").is_err());
        assert!(id_from_json(Some(&Value::Null), "candidateId").is_err());
        assert!(id_from_json(None, "candidateId").is_err());
    }
}
