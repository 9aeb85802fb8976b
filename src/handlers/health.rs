//! Health endpoints.

/// GET /livez - liveness probe, no auth.
pub async fn livez() -> &'static str {
    "ok"
}
