//! Body types shared by the pipeline.
//!
//! Upstream bodies are streamed through untouched; `DeadlineBody` bounds how
//! long that stream may run so a request deadline also covers body transfer.

use std::{
    pin::Pin,
    task::{Context, Poll},
    time::Duration,
};

use http_body_util::{BodyExt as _, Empty, Full, combinators::UnsyncBoxBody};
use hyper::body::{Body, Bytes, Frame, SizeHint};
use tokio::time::{Instant, Sleep};

use crate::error::{BoxError, ProxyError};

/// Body type returned to callers and sent upstream.
pub type ProxyBody = UnsyncBoxBody<Bytes, BoxError>;

pub fn empty() -> ProxyBody {
    Empty::<Bytes>::new()
        .map_err(|never| match never {})
        .boxed_unsync()
}

pub fn full(bytes: impl Into<Bytes>) -> ProxyBody {
    Full::new(bytes.into())
        .map_err(|never| match never {})
        .boxed_unsync()
}

/// Boxes any body whose error converts into `BoxError`.
pub fn boxed<B>(body: B) -> ProxyBody
where
    B: Body<Data = Bytes> + Send + 'static,
    B::Error: Into<BoxError>,
{
    body.map_err(Into::into).boxed_unsync()
}

/// Fails the wrapped stream once the deadline passes.
///
/// Dropping the body (caller went away, or the error above was returned)
/// drops the upstream connection with it.
pub struct DeadlineBody {
    inner: ProxyBody,
    sleep: Pin<Box<Sleep>>,
    upstream: String,
    timeout: Duration,
    expired: bool,
}

impl DeadlineBody {
    pub fn new(inner: ProxyBody, deadline: Instant, timeout: Duration, upstream: String) -> Self {
        Self {
            inner,
            sleep: Box::pin(tokio::time::sleep_until(deadline)),
            upstream,
            timeout,
            expired: false,
        }
    }
}

impl Body for DeadlineBody {
    type Data = Bytes;
    type Error = BoxError;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();
        if this.expired {
            return Poll::Ready(None);
        }
        if this.sleep.as_mut().poll(cx).is_ready() {
            this.expired = true;
            let err = ProxyError::Timeout {
                upstream: this.upstream.clone(),
                timeout: this.timeout,
            };
            return Poll::Ready(Some(Err(err.into())));
        }
        Pin::new(&mut this.inner).poll_frame(cx)
    }

    fn is_end_stream(&self) -> bool {
        !self.expired && self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}
