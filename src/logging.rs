use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use log::{error, info, warn};
use rocket::{
    fairing::{Fairing, Info, Kind},
    http::{Header, StatusClass},
    Data, Orbit, Request, Response, Rocket,
};

/// Response header echoing the request's ID, so a voter's report of a failed
/// ballot can be matched against the server log.
pub const REQUEST_ID_HEADER: &str = "X-Request-Id";

/// Per-request bookkeeping kept in Rocket's request-local cache.
#[derive(Debug, Copy, Clone)]
struct RequestTrace {
    id: usize,
    started: Instant,
}

impl RequestTrace {
    /// Start tracing a new request. IDs wrap around to zero on overflow.
    fn start() -> Self {
        static NEXT_ID: AtomicUsize = AtomicUsize::new(0);
        Self {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            started: Instant::now(),
        }
    }

    fn of(req: &Request<'_>) -> Self {
        *req.local_cache(Self::start)
    }
}

impl Display for RequestTrace {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.id)
    }
}

/// Logs every request and response, tagged with a request ID, and reports
/// how long each response took.
#[derive(Debug, Copy, Clone)]
pub struct LoggerFairing;

#[rocket::async_trait]
impl Fairing for LoggerFairing {
    fn info(&self) -> Info {
        Info {
            name: "Logger",
            kind: Kind::Liftoff | Kind::Request | Kind::Response | Kind::Shutdown,
        }
    }

    async fn on_liftoff(&self, rocket: &Rocket<Orbit>) {
        let scheme = if rocket.config().tls_enabled() {
            "https"
        } else {
            "http"
        };
        info!(
            "Accepting requests on {scheme}://{}:{}",
            rocket.config().address,
            rocket.config().port
        );
    }

    async fn on_request(&self, req: &mut Request<'_>, _data: &mut Data<'_>) {
        let trace = RequestTrace::of(req);
        match req.client_ip() {
            Some(ip) => info!("->req{trace} {} {} from {ip}", req.method(), req.uri()),
            None => info!("->req{trace} {} {}", req.method(), req.uri()),
        }
    }

    async fn on_response<'r>(&self, req: &'r Request<'_>, res: &mut Response<'r>) {
        let trace = RequestTrace::of(req);
        res.set_header(Header::new(REQUEST_ID_HEADER, trace.to_string()));

        let route = req
            .route()
            .map(|r| match &r.name {
                Some(name) => format!("{name} ({})", r.uri),
                None => r.uri.to_string(),
            })
            .unwrap_or_else(|| "no route".to_string());
        let elapsed = trace.started.elapsed().as_millis();
        let line = format!("<-rsp{trace} {} {route} in {elapsed}ms", res.status());
        match res.status().class() {
            StatusClass::ServerError => error!("{line}"),
            StatusClass::ClientError => warn!("{line}"),
            _ => info!("{line}"),
        }
    }

    async fn on_shutdown(&self, _rocket: &Rocket<Orbit>) {
        warn!("Shutting down; schedule watchers stop with the runtime");
    }
}

#[cfg(test)]
mod tests {
    use rocket::{http::Status, local::asynchronous::Client};

    use super::*;

    #[test]
    fn ids_increase() {
        let first = RequestTrace::start();
        let second = RequestTrace::start();
        assert!(second.id > first.id);
    }

    #[backend_test]
    async fn responses_carry_request_id(client: Client) {
        let first = client.get("/results/not-an-id/schedule-status").dispatch().await;
        assert_eq!(Status::BadRequest, first.status());
        let first: usize = first.headers().get_one(REQUEST_ID_HEADER).unwrap().parse().unwrap();

        let second = client.get("/results/not-an-id").dispatch().await;
        let second: usize = second.headers().get_one(REQUEST_ID_HEADER).unwrap().parse().unwrap();
        assert!(second > first);
    }
}
