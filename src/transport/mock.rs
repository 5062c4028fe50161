//! # Scripted Transport
//!
//! [`ScriptedTransport`] serves replies from a queue of expectations, in order, and
//! records every request it receives. Each expectation names the method and path it
//! must match; a mismatch or an unexpected request panics with a description.
//!
//! ```rust
//! use stack_bootstrap::transport::mock::ScriptedTransport;
//! use stack_bootstrap::transport::{Method, Request, Transport, TransportError};
//!
//! #[tokio::main]
//! async fn main() {
//!     let mut transport = ScriptedTransport::new();
//!     transport
//!         .expect(Method::Get, "/")
//!         .return_err(TransportError::Connect("refused".into()));
//!     transport.expect(Method::Get, "/").return_reply(200, "{}");
//!
//!     assert!(transport.send(Request::get("/")).await.is_err());
//!     assert_eq!(transport.send(Request::get("/")).await.unwrap().status, 200);
//!     transport.verify();
//! }
//! ```

use super::{Method, Reply, Request, Transport, TransportError};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

struct Expectation {
    method: Method,
    path: String,
    outcome: Result<Reply, TransportError>,
}

type Script = Arc<Mutex<VecDeque<Expectation>>>;

#[derive(Default)]
pub struct ScriptedTransport {
    expectations: Script,
    requests: Mutex<Vec<Request>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn expect(&mut self, method: Method, path: impl Into<String>) -> ReplyBuilder {
        self.expect_times(method, path, 1)
    }

    pub fn expect_times(
        &mut self,
        method: Method,
        path: impl Into<String>,
        times: usize,
    ) -> ReplyBuilder {
        ReplyBuilder {
            method,
            path: path.into(),
            times,
            expectations: self.expectations.clone(),
        }
    }

    /// Requests received so far, in order.
    pub fn requests(&self) -> Vec<Request> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn remaining(&self) -> usize {
        lock(&self.expectations).len()
    }

    pub fn verify(&self) {
        let remaining = self.remaining();
        if remaining != 0 {
            panic!("Not all expectations were met. {} remaining", remaining);
        }
    }
}

fn lock(script: &Script) -> MutexGuard<'_, VecDeque<Expectation>> {
    script.lock().unwrap_or_else(PoisonError::into_inner)
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: Request) -> Result<Reply, TransportError> {
        let next = lock(&self.expectations).pop_front();
        let expectation = match next {
            Some(e) => e,
            None => panic!("Unexpected request {:?} {}", request.method, request.path),
        };
        if expectation.method != request.method || expectation.path != request.path {
            panic!(
                "Expected {:?} {}, got {:?} {}",
                expectation.method, expectation.path, request.method, request.path
            );
        }
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request);
        expectation.outcome
    }
}

pub struct ReplyBuilder {
    method: Method,
    path: String,
    times: usize,
    expectations: Script,
}

impl ReplyBuilder {
    pub fn return_reply(self, status: u16, body: impl Into<String>) {
        self.push(Ok(Reply::new(status, body)));
    }

    pub fn return_err(self, error: TransportError) {
        self.push(Err(error));
    }

    fn push(self, outcome: Result<Reply, TransportError>) {
        let mut exps = lock(&self.expectations);
        for _ in 0..self.times {
            exps.push_back(Expectation {
                method: self.method,
                path: self.path.clone(),
                outcome: outcome.clone(),
            });
        }
    }
}
