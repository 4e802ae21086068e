//! Execution session: one namespace shared by every request.

use crate::config::ProtocolVariant;
use crate::lang::{self, Exception, Namespace, Value};
use crate::protocol::Response;

/// What running one statement produced.
#[derive(Debug, Clone)]
pub enum Outcome {
    /// An expression was evaluated to a value.
    Evaluated(Value),
    /// A statement sequence ran to completion.
    Executed,
    /// Submitted code raised.
    Raised(Exception),
}

impl Outcome {
    /// Shape the outcome as a response for `variant`.
    pub fn into_response(self, variant: ProtocolVariant) -> Response {
        let (response, etype) = match self {
            Outcome::Evaluated(value) => (Response::success(Some(value)), None),
            Outcome::Executed => (Response::success(None), None),
            Outcome::Raised(exception) => (
                Response::failure(exception.message),
                Some(exception.kind.name().to_string()),
            ),
        };

        if variant.reports_error_type() {
            response.with_error_type(etype)
        } else {
            response
        }
    }
}

/// Persistent execution context.
///
/// Bindings made by one statement stay visible to every later statement run
/// through the same session.
#[derive(Debug, Default)]
pub struct Session {
    namespace: Namespace,
    variant: ProtocolVariant,
}

impl Session {
    pub fn new(variant: ProtocolVariant) -> Self {
        Self {
            namespace: Namespace::new(),
            variant,
        }
    }

    pub fn variant(&self) -> ProtocolVariant {
        self.variant
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    /// Evaluate or execute `statement`, capturing any exception.
    pub fn run(&mut self, statement: &str) -> Outcome {
        let evaluate = !self.variant.uses_classifier() || lang::is_expression(statement);

        let result = if evaluate {
            lang::evaluate(statement, &mut self.namespace).map(Outcome::Evaluated)
        } else {
            lang::execute(statement, &mut self.namespace).map(|()| Outcome::Executed)
        };

        result.unwrap_or_else(|exception| {
            tracing::debug!(%exception, "statement raised");
            Outcome::Raised(exception)
        })
    }

    /// Run `statement` and shape the response for this session's variant.
    pub fn respond(&mut self, statement: &str) -> Response {
        self.run(statement).into_response(self.variant)
    }
}
