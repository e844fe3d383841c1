use serde_json::Value;
use sluice_error::{ErrorCode, ErrorContext, SluiceError};

#[test]
fn test_json_serialization() {
    let error = SluiceError::plan_shape(
        "take parameter 'p3' is not in the finalized parameter list",
        ErrorContext::PlanShape {
            sub_queries: 1,
            parameter: Some("p3".to_string()),
        },
    )
    .with_hint("Re-finalize the plan after editing its parameters");

    let json = error.to_json();
    println!("JSON: {}", json);

    let v: Value = serde_json::from_str(&json).expect("valid json");

    assert_eq!(v["code"], "SLUICE-2009");
    assert_eq!(v["hint"], "Re-finalize the plan after editing its parameters");
    assert_eq!(v["context"]["type"], "plan_shape");
    assert_eq!(v["context"]["parameter"], "p3");
}

#[test]
fn test_error_code_parsing() {
    let code: ErrorCode = "SLUICE-2008".to_string().try_into().unwrap();
    assert_eq!(code, ErrorCode::QueryCancelled);
}

#[test]
fn test_roundtrip_keeps_code() {
    let error = SluiceError::new(ErrorCode::CoercionFailed, "text is not an int");
    let back: SluiceError = serde_json::from_str(&error.to_json()).expect("valid json");
    assert_eq!(back.code, ErrorCode::CoercionFailed);
    assert!(back.context.is_none());
}
