use axum::{extract::Request, http::header, middleware::Next, response::IntoResponse};

/// Rendered document previews are full HTML pages with inline styles and a
/// remote logo; everything else is JSON or binary.
fn is_document_preview(path: &str) -> bool {
    path.ends_with("/preview")
}

pub async fn security_headers_middleware(req: Request, next: Next) -> impl IntoResponse {
    let is_preview = is_document_preview(req.uri().path());

    let mut response = next.run(req).await;
    let headers = response.headers_mut();

    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        header::HeaderValue::from_static("nosniff"),
    );
    headers.insert(
        header::STRICT_TRANSPORT_SECURITY,
        header::HeaderValue::from_static("max-age=31536000; includeSubDomains"),
    );

    if is_preview {
        // Inline styles and remote images only, never scripts
        headers.insert(
            header::CONTENT_SECURITY_POLICY,
            header::HeaderValue::from_static(
                "default-src 'none'; \
                 style-src 'unsafe-inline'; \
                 img-src https: http: data:; \
                 frame-ancestors 'self'",
            ),
        );
        headers.insert(
            header::X_FRAME_OPTIONS,
            header::HeaderValue::from_static("SAMEORIGIN"),
        );
    } else {
        headers.insert(
            header::CONTENT_SECURITY_POLICY,
            header::HeaderValue::from_static("default-src 'none'; frame-ancestors 'none'"),
        );
        headers.insert(
            header::X_FRAME_OPTIONS,
            header::HeaderValue::from_static("DENY"),
        );
    }

    response
}
