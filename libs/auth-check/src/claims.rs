use base64::Engine;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use serde_json::{Map, Value};

use audit::UserContext;

/// User id used when the identity token names nobody.
pub const UNKNOWN_USER: &str = "unknown";

#[derive(Debug, thiserror::Error)]
pub enum TokenDecodeError {
    #[error("identity token has no payload segment")]
    MissingPayload,
    #[error("identity token payload is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("identity token payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("identity token payload is not a JSON object")]
    NotAnObject,
}

/// Reads the claims of an identity token WITHOUT checking its signature or expiry.
///
/// Tokens reaching this function come from the identity platform's session
/// lookup, which has already verified them. Verification stays the identity
/// platform's job; never feed this tokens taken directly from a client.
pub fn decode_id_token_claims(token: &str) -> Result<Map<String, Value>, TokenDecodeError> {
    let payload = token
        .split('.')
        .nth(1)
        .filter(|segment| !segment.is_empty())
        .ok_or(TokenDecodeError::MissingPayload)?;

    let decoded = decode_segment(payload)?;

    match serde_json::from_slice::<Value>(&decoded)? {
        Value::Object(claims) => Ok(claims),
        _ => Err(TokenDecodeError::NotAnObject),
    }
}

// JWTs use the url-safe alphabet without padding, but accept the standard one too
fn decode_segment(segment: &str) -> Result<Vec<u8>, base64::DecodeError> {
    let config = GeneralPurposeConfig::new()
        .with_decode_padding_mode(DecodePaddingMode::Indifferent);

    let url_safe = GeneralPurpose::new(&alphabet::URL_SAFE, config);
    match url_safe.decode(segment.as_bytes()) {
        Ok(decoded) => Ok(decoded),
        Err(_) => GeneralPurpose::new(&alphabet::STANDARD, config).decode(segment.as_bytes()),
    }
}

/// Maps identity token claims onto a user context.
///
/// The user id comes from `sub`, then `cognito:username`. Groups come from
/// `cognito:groups`; federated SAML users carry them in `family_name` instead.
pub fn user_context_from_claims(claims: &Map<String, Value>) -> UserContext {
    let non_empty_str = |claim: &str| {
        claims
            .get(claim)
            .and_then(Value::as_str)
            .filter(|value| !value.is_empty())
    };

    let user_id = non_empty_str("sub")
        .or_else(|| non_empty_str("cognito:username"))
        .unwrap_or(UNKNOWN_USER)
        .to_string();

    let email = non_empty_str("email").map(str::to_string);

    let groups = match claims.get("cognito:groups") {
        Some(value) if !value.is_null() => parse_groups(Some(value)),
        _ => parse_groups(claims.get("family_name")),
    };

    UserContext {
        user_id,
        email,
        groups,
    }
}

/// Normalizes a groups claim into a list of group identifiers.
///
/// Accepts a JSON array, a bracketed comma separated string such as
/// `"[g1, g2]"`, or a single plain string. Entries are trimmed and empty ones
/// dropped.
///
/// Group names that themselves contain a comma are split apart. SAML group
/// claims arrive in that joined form and there is no way to tell the two
/// cases apart.
pub fn parse_groups(value: Option<&Value>) -> Vec<String> {
    match value {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => groups_from_array(items),
        Some(Value::String(raw)) => groups_from_string(raw),
        Some(other) => vec![other.to_string()],
    }
}

fn groups_from_array(items: &[Value]) -> Vec<String> {
    // nested arrays, objects and nulls name no group
    items
        .iter()
        .filter_map(|item| match item {
            Value::String(group) => Some(group.trim().to_string()),
            Value::Number(group) => Some(group.to_string()),
            Value::Bool(group) => Some(group.to_string()),
            Value::Null | Value::Array(_) | Value::Object(_) => None,
        })
        .filter(|group| !group.is_empty())
        .collect()
}

fn groups_from_string(raw: &str) -> Vec<String> {
    let trimmed = raw.trim();

    if let Ok(Value::Array(items)) = serde_json::from_str::<Value>(trimmed) {
        return groups_from_array(&items);
    }

    let inner = trimmed.strip_prefix('[').unwrap_or(trimmed);
    let inner = inner.strip_suffix(']').unwrap_or(inner);

    inner
        .split(',')
        .map(str::trim)
        .filter(|group| !group.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
    use serde_json::json;

    use super::*;

    fn token_with_payload(payload: &Value) -> String {
        let encoded = URL_SAFE_NO_PAD.encode(payload.to_string());
        format!("eyJhbGciOiJSUzI1NiJ9.{}.c2lnbmF0dXJl", encoded)
    }

    #[test]
    fn extracts_user_from_cognito_claims() {
        let token = token_with_payload(&json!({
            "sub": "u1",
            "email": "a@b.com",
            "cognito:groups": ["g1", "g2"]
        }));

        let claims = decode_id_token_claims(&token).unwrap();
        let user = user_context_from_claims(&claims);

        assert_eq!(
            user,
            UserContext {
                user_id: "u1".to_string(),
                email: Some("a@b.com".to_string()),
                groups: vec!["g1".to_string(), "g2".to_string()],
            }
        );
    }

    #[test]
    fn accepts_standard_alphabet_with_padding() {
        let payload = json!({ "sub": "u2" }).to_string();
        let token = format!("header.{}.sig", STANDARD.encode(payload));

        let claims = decode_id_token_claims(&token).unwrap();
        assert_eq!(claims["sub"], "u2");
    }

    #[test]
    fn user_id_falls_back_to_username_then_unknown() {
        let claims = json!({ "cognito:username": "alice" });
        let user = user_context_from_claims(claims.as_object().unwrap());
        assert_eq!(user.user_id, "alice");

        let claims = json!({ "email": "x@y.z" });
        let user = user_context_from_claims(claims.as_object().unwrap());
        assert_eq!(user.user_id, UNKNOWN_USER);
        assert!(user.groups.is_empty());
    }

    #[test]
    fn groups_fall_back_to_family_name() {
        let claims = json!({ "sub": "u3", "family_name": "[admins, editors]" });
        let user = user_context_from_claims(claims.as_object().unwrap());
        assert_eq!(user.groups, vec!["admins".to_string(), "editors".to_string()]);
    }

    #[test]
    fn malformed_tokens_are_rejected() {
        assert!(matches!(
            decode_id_token_claims("no-dots-here"),
            Err(TokenDecodeError::MissingPayload)
        ));
        assert!(matches!(
            decode_id_token_claims("header..sig"),
            Err(TokenDecodeError::MissingPayload)
        ));
        assert!(matches!(
            decode_id_token_claims("header.%%%not-base64%%%.sig"),
            Err(TokenDecodeError::Base64(_))
        ));

        let not_json = URL_SAFE_NO_PAD.encode("definitely not json");
        assert!(matches!(
            decode_id_token_claims(&format!("h.{}.s", not_json)),
            Err(TokenDecodeError::Json(_))
        ));

        let not_object = URL_SAFE_NO_PAD.encode("[1,2]");
        assert!(matches!(
            decode_id_token_claims(&format!("h.{}.s", not_object)),
            Err(TokenDecodeError::NotAnObject)
        ));
    }

    #[test]
    fn parses_bracketed_group_string() {
        let value = json!("[ g1 ,g2, g3 ]");
        assert_eq!(parse_groups(Some(&value)), vec!["g1", "g2", "g3"]);
    }

    #[test]
    fn parses_json_array_groups() {
        let value = json!([" g1", "g2 "]);
        assert_eq!(parse_groups(Some(&value)), vec!["g1", "g2"]);

        let quoted = json!(r#"["g1","g2"]"#);
        assert_eq!(parse_groups(Some(&quoted)), vec!["g1", "g2"]);
    }

    #[test]
    fn non_scalar_array_entries_are_skipped() {
        let value = json!(["g1", ["x"], { "name": "g2" }, null, 7]);
        assert_eq!(parse_groups(Some(&value)), vec!["g1", "7"]);
    }

    #[test]
    fn parses_single_plain_group() {
        let value = json!(" f9cf5862-b96d-4e4b-a4c8-dbfabe70cd30 ");
        assert_eq!(
            parse_groups(Some(&value)),
            vec!["f9cf5862-b96d-4e4b-a4c8-dbfabe70cd30"]
        );
    }

    #[test]
    fn absent_or_empty_groups_yield_nothing() {
        assert!(parse_groups(None).is_empty());
        assert!(parse_groups(Some(&Value::Null)).is_empty());
        assert!(parse_groups(Some(&json!(""))).is_empty());
        assert!(parse_groups(Some(&json!("[]"))).is_empty());
    }

    #[test]
    fn group_names_with_commas_are_split() {
        let value = json!("[Sales, EMEA, Admins]");
        assert_eq!(parse_groups(Some(&value)).len(), 3);
    }
}
