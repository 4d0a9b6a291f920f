use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use tower::{Layer, Service};

use crate::{Envelope, transport::TransportError};

/// Encodes the payload of each envelope as a JSON string body.
///
/// Sits on top of a stack that takes `Envelope<String>` and accepts any
/// `Envelope<M>` with `M: Serialize`. Attributes are forwarded as they are.
/// An encoding failure never reaches the inner service and surfaces as a
/// [`TransportErrorKind::Serde`](crate::transport::TransportErrorKind::Serde).
#[derive(Clone)]
pub struct JsonService<S> {
    next: S,
}

impl<S, M> Service<Envelope<M>> for JsonService<S>
where
    M: serde::Serialize + Send + 'static,
    S: Service<Envelope<String>> + Clone + Send + 'static,
    S::Error: Into<tower::BoxError>,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = tower::BoxError;
    type Future = Pin<Box<dyn Future<Output = Result<S::Response, tower::BoxError>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.next.poll_ready(cx).map_err(Into::into)
    }

    fn call(&mut self, envelope: Envelope<M>) -> Self::Future {
        // The ready instance handles this call; a fresh clone waits for the next.
        let fresh = self.next.clone();
        let mut ready = std::mem::replace(&mut self.next, fresh);

        Box::pin(async move {
            let body = serde_json::to_string(&envelope.message)
                .map_err(|err| TransportError::serde(err.into()))?;
            ready
                .call(Envelope::from((envelope.attributes, body)))
                .await
                .map_err(Into::<tower::BoxError>::into)
        })
    }
}

/// [`Layer`] producing [`JsonService`].
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonLayer;

impl<S> Layer<S> for JsonLayer {
    type Service = JsonService<S>;

    fn layer(&self, next: S) -> JsonService<S> {
        JsonService { next }
    }
}
