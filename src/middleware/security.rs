use axum::{extract::Request, middleware::Next, response::Response};

/// Adds security headers to every response (similar to helmet.js).
pub async fn security_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert("X-Frame-Options", "DENY".parse().unwrap());
    headers.insert("X-Content-Type-Options", "nosniff".parse().unwrap());
    headers.insert("X-XSS-Protection", "1; mode=block".parse().unwrap());
    headers.insert(
        "Referrer-Policy",
        "strict-origin-when-cross-origin".parse().unwrap(),
    );
    headers.insert(
        "Permissions-Policy",
        "camera=(), microphone=(), geolocation=()".parse().unwrap(),
    );
    // HSTS — always set since the backend runs behind HTTPS in production.
    // Proxies / load balancers will strip it for plain HTTP clients anyway.
    headers.insert(
        "Strict-Transport-Security",
        "max-age=31536000; includeSubDomains".parse().unwrap(),
    );
    // Content-Security-Policy — this service has no browser-rendered UI of its own.
    headers.insert(
        "Content-Security-Policy",
        "default-src 'self'; frame-ancestors 'none'".parse().unwrap(),
    );
    response
}
