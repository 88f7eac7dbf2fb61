use vgc_lib::{ErrorCategory, VgcError};

#[test]
fn config_error_display_includes_message() {
    let err = VgcError::Config("missing app_name".to_string());

    assert_eq!(format!("{}", err), "Configuration error: missing app_name");
}

#[test]
fn io_error_display_wraps_source() {
    let io_err = std::io::Error::other("disk full");
    let err: VgcError = io_err.into();
    let rendered = format!("{}", err);

    assert!(rendered.starts_with("IO error: "));
    assert!(rendered.contains("disk full"));
}

#[test]
fn http_statuses_map_to_error_kinds() {
    use reqwest::StatusCode;

    assert_eq!(VgcError::from_status(StatusCode::UNAUTHORIZED, "x"), VgcError::Auth);
    assert_eq!(
        VgcError::from_status(StatusCode::FORBIDDEN, "x"),
        VgcError::QuotaOrAccess
    );
    assert_eq!(
        VgcError::from_status(StatusCode::BAD_REQUEST, "x"),
        VgcError::BadRequest
    );
    assert_eq!(
        format!("{}", VgcError::from_status(StatusCode::BAD_GATEWAY, "upstream down")),
        "Rendering service error (status: 502): upstream down"
    );
}

#[test]
fn render_failure_keeps_the_fixed_message() {
    let err = VgcError::RenderFailed {
        render_id: "r-7".into(),
        message: Some("bad css".into()),
    };

    assert_eq!(format!("{}", err), "failed to render screenshot");
    let payload = err.to_payload();
    assert_eq!(payload.category, ErrorCategory::Render);
    assert_eq!(payload.message, "failed to render screenshot: bad css");
}

#[test]
fn timeout_lists_pending_render_ids() {
    let err = VgcError::RenderTimeout {
        render_ids: vec!["r-1".into(), "r-3".into()],
    };

    assert_eq!(
        format!("{}", err),
        "Timed out waiting for render status of [r-1, r-3]"
    );
}

#[test]
fn fetch_error_names_url_and_retries() {
    let err = VgcError::Fetch {
        url: "https://cdn.test/a.css".into(),
        retries: 5,
        message: "connection reset".into(),
    };

    assert_eq!(
        format!("{}", err),
        "Failed to fetch https://cdn.test/a.css after 5 retries: connection reset"
    );
    assert_eq!(err.to_payload().category, ErrorCategory::Network);
}
