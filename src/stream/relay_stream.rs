use std::collections::VecDeque;
use std::convert::Infallible;
use std::fmt;
use std::pin::Pin;
use std::task::{ready, Context, Poll};
use std::time::Instant;

use bytes::Bytes;
use futures_util::Stream;
use pin_project_lite::pin_project;

use super::pipeline::RelayPipeline;
use crate::observability::{duration_millis, log_request_usage};
use crate::protocol::outbound::OutboundEvent;

/// Identity of one relayed request, used for completion and abandonment logs.
pub struct RelayContext {
    pub request_id: uuid::Uuid,
    pub model: String,
    pub started: Instant,
}

/// Logs when a relay is dropped before it finished, i.e. the client went away.
struct AbandonGuard {
    context: RelayContext,
    completed: bool,
}

impl Drop for AbandonGuard {
    fn drop(&mut self) {
        if !self.completed {
            tracing::debug!(
                request_id = %self.context.request_id,
                model = %self.context.model,
                elapsed_ms = duration_millis(self.context.started.elapsed()),
                "client disconnected before relay completed; releasing upstream stream"
            );
        }
    }
}

pin_project! {
    /// Outbound body stream for one relayed request.
    ///
    /// Pulls upstream chunks one at a time and yields encoded outbound frames.
    /// The stream ends right after the sentinel. Dropping it drops the
    /// upstream body, which releases the upstream connection.
    pub struct RelayStream<S> {
        #[pin]
        upstream: S,
        pipeline: RelayPipeline,
        events: Vec<OutboundEvent>,
        pending: VecDeque<Bytes>,
        finished: bool,
        guard: AbandonGuard,
    }
}

impl<S> RelayStream<S> {
    #[must_use]
    pub fn new(upstream: S, context: RelayContext) -> Self {
        Self {
            upstream,
            pipeline: RelayPipeline::new(),
            events: Vec::with_capacity(8),
            pending: VecDeque::with_capacity(8),
            finished: false,
            guard: AbandonGuard {
                context,
                completed: false,
            },
        }
    }
}

fn queue_encoded(events: &mut Vec<OutboundEvent>, pending: &mut VecDeque<Bytes>) {
    pending.extend(events.drain(..).map(|event| event.encode()));
}

impl<S, E> Stream for RelayStream<S>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: fmt::Display,
{
    type Item = Result<Bytes, Infallible>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();
        loop {
            if let Some(frame) = this.pending.pop_front() {
                return Poll::Ready(Some(Ok(frame)));
            }
            if *this.finished {
                return Poll::Ready(None);
            }
            if this.pipeline.is_terminated() {
                *this.finished = true;
                this.guard.completed = true;
                let context = &this.guard.context;
                log_request_usage(
                    &context.request_id,
                    &context.model,
                    &this.pipeline.usage(),
                    this.pipeline.content_events(),
                    context.started.elapsed(),
                );
                return Poll::Ready(None);
            }

            match ready!(this.upstream.as_mut().poll_next(cx)) {
                Some(Ok(chunk)) => {
                    this.pipeline.push_chunk(&chunk, this.events);
                }
                Some(Err(err)) => {
                    tracing::warn!(
                        request_id = %this.guard.context.request_id,
                        error = %err,
                        "upstream stream failed mid-relay; terminating"
                    );
                    this.pipeline.finish(this.events);
                }
                None => {
                    this.pipeline.finish(this.events);
                }
            }
            queue_encoded(this.events, this.pending);
        }
    }
}
