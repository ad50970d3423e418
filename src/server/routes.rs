use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::header::{CONTENT_TYPE, HeaderValue};
use hyper::{Method, Request, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, info};

use super::page;
use crate::handler::{GetUserQuery, Outcome, RequestHandler, SaveFailure, SaveUserForm};

/// Route incoming HTTP requests
pub async fn handle_request(
  handler: Arc<RequestHandler>,
  peer_addr: SocketAddr,
  req: Request<Incoming>,
) -> Result<Response<Full<Bytes>>, hyper::Error> {
  let method = req.method().clone();
  let path = req.uri().path().to_string();
  let query = req.uri().query().map(str::to_string);
  info!("[{}] {} {}", peer_addr, method, path);

  let body = if method == Method::POST {
    req.into_body().collect().await?.to_bytes()
  } else {
    Bytes::new()
  };

  Ok(dispatch(&handler, &method, &path, query.as_deref(), &body).await)
}

/// Map a parsed request onto the handler and render the result
async fn dispatch(
  handler: &RequestHandler,
  method: &Method,
  path: &str,
  query: Option<&str>,
  body: &[u8],
) -> Response<Full<Bytes>> {
  match (method, path) {
    (&Method::GET, "/") => html_response(StatusCode::OK, page::render(None)),

    (&Method::POST, "/save_user") => {
      let form: SaveUserForm = parse_params(body);
      let outcome = handler.save_user(form).await;
      outcome_response(&outcome)
    }

    (&Method::GET, "/get_user") => {
      let query: GetUserQuery = parse_params(query.unwrap_or("").as_bytes());
      let outcome = handler.get_user(query).await;
      outcome_response(&outcome)
    }

    (_, "/" | "/save_user" | "/get_user") => {
      text_response(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed")
    }

    _ => text_response(StatusCode::NOT_FOUND, "Not Found"),
  }
}

/// Decode url-encoded parameters. Malformed input counts as no parameters,
/// which the handler reports as missing fields.
fn parse_params<T: DeserializeOwned + Default>(raw: &[u8]) -> T {
  serde_urlencoded::from_bytes(raw).unwrap_or_else(|e| {
    debug!("Ignoring malformed parameters: {}", e);
    T::default()
  })
}

fn status_for(outcome: &Outcome) -> StatusCode {
  match outcome {
    Outcome::Saved { .. } | Outcome::Found(_) => StatusCode::OK,
    Outcome::ValidationError(_) => StatusCode::BAD_REQUEST,
    Outcome::NotFound { .. } => StatusCode::NOT_FOUND,
    Outcome::SaveFailed {
      reason: SaveFailure::Duplicate,
      ..
    } => StatusCode::CONFLICT,
    Outcome::SaveFailed {
      reason: SaveFailure::Unconfirmed(_),
      ..
    } => StatusCode::GATEWAY_TIMEOUT,
    Outcome::SaveFailed { .. } | Outcome::LookupFailed { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    Outcome::StoreUnavailable => StatusCode::SERVICE_UNAVAILABLE,
  }
}

fn outcome_response(outcome: &Outcome) -> Response<Full<Bytes>> {
  let status = status_for(outcome);
  if outcome.is_success() {
    debug!("Request succeeded: {:?}", outcome);
  } else if let Some(e) = outcome.store_error() {
    info!("Request ended with {}: {}", status, e);
  } else {
    info!("Request ended with {}: {:?}", status, outcome.message());
  }
  html_response(status, page::render(Some(outcome)))
}

fn html_response(status: StatusCode, body: String) -> Response<Full<Bytes>> {
  response(status, "text/html; charset=utf-8", body)
}

fn text_response(status: StatusCode, body: &'static str) -> Response<Full<Bytes>> {
  response(status, "text/plain; charset=utf-8", body.to_string())
}

fn response(
  status: StatusCode,
  content_type: &'static str,
  body: String,
) -> Response<Full<Bytes>> {
  let mut resp = Response::new(Full::new(Bytes::from(body)));
  *resp.status_mut() = status;
  resp
    .headers_mut()
    .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
  resp
}
