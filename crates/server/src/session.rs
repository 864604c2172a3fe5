use axum::{
    http::{header, HeaderMap, HeaderValue},
    response::Response,
};
use shared::domain::SessionId;
use uuid::Uuid;

pub(crate) const SESSION_COOKIE: &str = "qc_session";

/// Session of the browser issuing the request.
pub(crate) struct BrowserSession {
    pub(crate) id: SessionId,
    fresh: bool,
}

impl BrowserSession {
    pub(crate) fn from_headers(headers: &HeaderMap) -> Self {
        match cookie_value(headers, SESSION_COOKIE) {
            Some(id) => Self {
                id: SessionId::new(id),
                fresh: false,
            },
            None => Self {
                id: SessionId::new(Uuid::new_v4().to_string()),
                fresh: true,
            },
        }
    }

    /// Sets the session cookie on `response` when the session was minted by this request.
    pub(crate) fn attach(&self, mut response: Response) -> Response {
        if !self.fresh {
            return response;
        }
        let cookie = format!("{SESSION_COOKIE}={}; Path=/; HttpOnly; SameSite=Lax", self.id);
        if let Ok(value) = HeaderValue::from_str(&cookie) {
            response.headers_mut().append(header::SET_COOKIE, value);
        }
        response
    }
}

fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|raw| raw.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, value)| *key == name && !value.is_empty())
        .map(|(_, value)| value.to_string())
}
