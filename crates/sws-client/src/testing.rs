//! In-memory transport for pipeline tests

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;

use crate::error::ServiceError;
use crate::request::RequestDescriptor;
use crate::transport::{Transport, TransportFuture};

type Responder = Box<dyn Fn(&RequestDescriptor) -> Result<Value, ServiceError> + Send + Sync>;
type Delay = Box<dyn Fn(&RequestDescriptor) -> Duration + Send + Sync>;

/// Answers each request from a closure and logs every request it sees.
pub struct ScriptedTransport {
    responder: Responder,
    delay: Delay,
    calls: Mutex<Vec<RequestDescriptor>>,
}

impl ScriptedTransport {
    pub fn new<F>(responder: F) -> Arc<Self>
    where
        F: Fn(&RequestDescriptor) -> Result<Value, ServiceError> + Send + Sync + 'static,
    {
        Self::with_delay(responder, |_| Duration::ZERO)
    }

    /// Like `new`, but each response is held back by `delay(request)`.
    pub fn with_delay<F, D>(responder: F, delay: D) -> Arc<Self>
    where
        F: Fn(&RequestDescriptor) -> Result<Value, ServiceError> + Send + Sync + 'static,
        D: Fn(&RequestDescriptor) -> Duration + Send + Sync + 'static,
    {
        Arc::new(Self {
            responder: Box::new(responder),
            delay: Box::new(delay),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn ok(value: Value) -> Arc<Self> {
        Self::new(move |_| Ok(value.clone()))
    }

    pub fn calls(&self) -> Vec<RequestDescriptor> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, predicate: impl Fn(&RequestDescriptor) -> bool) -> usize {
        self.calls.lock().unwrap().iter().filter(|r| predicate(r)).count()
    }
}

impl Transport for ScriptedTransport {
    fn send<'a>(&'a self, request: &'a RequestDescriptor) -> TransportFuture<'a> {
        Box::pin(async move {
            self.calls.lock().unwrap().push(request.clone());
            let delay = (self.delay)(request);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            (self.responder)(request)
        })
    }
}
