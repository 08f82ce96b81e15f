use crate::http::{make_boxed_error_response, make_json_response};
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::service::Service;
use hyper::{Request, Response, StatusCode};
use serde::Serialize;
use std::convert::Infallible;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;

/// Snapshot reported by the admin listener.
#[derive(Clone, Debug, Default, Serialize, PartialEq)]
pub struct AdminStatus {
    pub ready: bool,
    /// Background jobs accepted but not yet finished.
    pub jobs_in_flight: usize,
}

/// Serves `/health`, `/ready` and `/status` on the admin port.
pub struct AdminService<F, E> {
    status: F,
    _error: PhantomData<E>,
}

impl<F, E> AdminService<F, E>
where
    F: Fn() -> AdminStatus,
{
    pub fn new(status: F) -> Self {
        Self {
            status,
            _error: PhantomData,
        }
    }
}

impl<F, E> Service<Request<Incoming>> for AdminService<F, E>
where
    F: Fn() -> AdminStatus + Send + 'static,
    E: Send + 'static,
{
    type Response = Response<BoxBody<Bytes, Infallible>>;
    type Error = E;
    type Future =
        Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send + 'static>>;

    fn call(&self, req: Request<Incoming>) -> Self::Future {
        let status = (self.status)();
        let path = req.uri().path().to_owned();

        Box::pin(async move { Ok(route(&path, status)) })
    }
}

fn route(path: &str, status: AdminStatus) -> Response<BoxBody<Bytes, Infallible>> {
    let ok_body = || Full::new(Bytes::from("ok\n")).boxed();

    match path {
        "/health" => Response::new(ok_body()),
        "/ready" => match status.ready {
            true => Response::new(ok_body()),
            false => make_boxed_error_response(StatusCode::SERVICE_UNAVAILABLE),
        },
        "/status" => make_json_response(StatusCode::OK, &status),
        _ => make_boxed_error_response(StatusCode::NOT_FOUND),
    }
}
