use crate::definition::RequestSpec;
use std::time::Duration;

/// What happened when a request was sent to the target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The target answered with a non-error status.
    Response { status: u16, body: String },
    /// The target answered with a 4xx/5xx status.
    ErrorStatus { status: u16, body: String },
    /// No HTTP exchange completed: bad URL, refused connection, dropped
    /// connection, unreadable body.
    NetworkError(String),
}

/// Sends a structured request to the target.
pub trait Dispatcher {
    fn dispatch(&mut self, request: &RequestSpec) -> DispatchOutcome;
}

pub struct HttpDispatcher {
    agent: ureq::Agent,
}

impl HttpDispatcher {
    /// `timeout` bounds the whole exchange; `None` leaves it to the transport.
    pub fn new(timeout: Option<Duration>) -> Self {
        let mut builder = ureq::AgentBuilder::new();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Self {
            agent: builder.build(),
        }
    }
}

impl Dispatcher for HttpDispatcher {
    fn dispatch(&mut self, request: &RequestSpec) -> DispatchOutcome {
        let mut call = self.agent.request(&request.method, &request.url);
        for (name, value) in &request.headers {
            call = call.set(name, value);
        }

        let result = match request.body_text() {
            Some(body) => call.send_string(&body),
            None => call.call(),
        };

        match result {
            Ok(response) => {
                let status = response.status();
                match response.into_string() {
                    Ok(body) => DispatchOutcome::Response { status, body },
                    Err(e) => DispatchOutcome::NetworkError(format!(
                        "failed to read response body (status {status}): {e}"
                    )),
                }
            }
            Err(ureq::Error::Status(status, response)) => DispatchOutcome::ErrorStatus {
                status,
                body: response.into_string().unwrap_or_default(),
            },
            Err(ureq::Error::Transport(transport)) => {
                DispatchOutcome::NetworkError(transport.to_string())
            }
        }
    }
}
