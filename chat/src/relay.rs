use anyhow::anyhow;
use futures::stream::{BoxStream, Stream, StreamExt};
use response::{ChatCompletionsChunk, RelayEvent};
use std::fmt::Display;
use std::pin::Pin;
use std::task::{Context, Poll, ready};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, info, trace, warn};

use crate::sse::{LineBuffer, UpstreamFrame, parse_line};

const EVENT_TX_SEND_TIMEOUT: Duration = Duration::from_secs(30);

/// Turns upstream SSE bytes into caller events for a single session.
///
/// Every content event carries one delta; [`Relay::finish`] ends the session
/// with a terminal event whose `fullResponse` is the concatenation of those
/// deltas in order.
#[derive(Debug, Default)]
pub struct Relay {
    lines: LineBuffer,
    full_response: String,
    content_events: usize,
    skipped_frames: usize,
}

impl Relay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one upstream read and returns the content events it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<RelayEvent> {
        self.lines.extend(chunk);

        let mut events = Vec::new();
        while let Some(line) = self.lines.next_line() {
            if let Some(event) = self.process_line(&line) {
                events.push(event);
            }
        }
        events
    }

    /// Flushes an unterminated last line and appends the terminal event.
    pub fn finish(mut self) -> Vec<RelayEvent> {
        let mut events = Vec::new();
        if let Some(line) = self.lines.finish() {
            if let Some(event) = self.process_line(&line) {
                events.push(event);
            }
        }

        debug!(
            "Relay finished with {} content events, {} skipped frames",
            self.content_events, self.skipped_frames
        );
        events.push(RelayEvent::done(self.full_response));
        events
    }

    fn process_line(&mut self, line: &[u8]) -> Option<RelayEvent> {
        let payload = match parse_line(line) {
            UpstreamFrame::Data(payload) => payload,
            UpstreamFrame::Done => {
                trace!("Received upstream [DONE] sentinel");
                return None;
            }
            UpstreamFrame::Ignored => return None,
        };

        let chunk = match serde_json::from_str::<ChatCompletionsChunk>(payload) {
            Ok(chunk) => chunk,
            Err(e) => {
                warn!("Skipping malformed upstream frame: {}", e);
                self.skipped_frames += 1;
                return None;
            }
        };

        let content = chunk.content()?;
        self.full_response.push_str(content);
        self.content_events += 1;
        Some(RelayEvent::content(content))
    }
}

async fn forward(
    event_tx: &mpsc::Sender<anyhow::Result<RelayEvent>>,
    event: anyhow::Result<RelayEvent>,
) -> bool {
    match timeout(EVENT_TX_SEND_TIMEOUT, event_tx.send(event)).await {
        Ok(Ok(())) => true,
        Ok(Err(_)) => {
            info!("SSE client disconnected, stopping upstream stream");
            false
        }
        Err(_) => {
            error!("Channel send timed out, consumer likely stuck");
            false
        }
    }
}

/// Caller side of the relay channel.
///
/// If the relay task stops before sending a terminal event or an error, the
/// closed channel is reported as an error so the session never ends silently.
struct RelayEvents {
    events: ReceiverStream<anyhow::Result<RelayEvent>>,
    finished: bool,
}

impl Stream for RelayEvents {
    type Item = anyhow::Result<RelayEvent>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.finished {
            return Poll::Ready(None);
        }

        match ready!(Pin::new(&mut self.events).poll_next(cx)) {
            Some(item) => {
                if !matches!(item, Ok(RelayEvent::Content { .. })) {
                    self.finished = true;
                }
                Poll::Ready(Some(item))
            }
            None => {
                self.finished = true;
                error!("Relay stopped before the response completed");
                Poll::Ready(Some(Err(anyhow!(
                    "Relay stopped before the response completed"
                ))))
            }
        }
    }
}

/// Relays an upstream byte stream on a spawned task.
///
/// The channel holds a single event, so the next upstream read only happens
/// once the caller has taken the previous event. Dropping the returned stream
/// stops the task and with it the upstream connection. An upstream error, or
/// the task giving up on a stuck consumer, is yielded as the final item in
/// place of the terminal event.
pub fn relay_stream<S, B, E>(upstream: S) -> BoxStream<'static, anyhow::Result<RelayEvent>>
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Display + Send + 'static,
{
    let (event_tx, event_rx) = mpsc::channel::<anyhow::Result<RelayEvent>>(1);

    tokio::spawn(async move {
        let mut upstream = Box::pin(upstream);
        let mut relay = Relay::new();

        loop {
            match upstream.next().await {
                Some(Ok(chunk)) => {
                    trace!("Received {} bytes from upstream", chunk.as_ref().len());
                    for event in relay.push(chunk.as_ref()) {
                        if !forward(&event_tx, Ok(event)).await {
                            return;
                        }
                    }
                }
                Some(Err(e)) => {
                    error!("Error receiving from upstream stream: {}", e);
                    let _ = forward(&event_tx, Err(anyhow!("Upstream stream error: {}", e))).await;
                    return;
                }
                None => break,
            }
        }

        info!("Upstream stream finished, sending final response");
        for event in relay.finish() {
            if !forward(&event_tx, Ok(event)).await {
                return;
            }
        }
    });

    RelayEvents {
        events: ReceiverStream::new(event_rx),
        finished: false,
    }
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use std::convert::Infallible;

    fn frame(content: &str) -> String {
        format!(
            "data: {}\n\n",
            serde_json::json!({"choices": [{"delta": {"content": content}}]})
        )
    }

    fn relay_all(reads: &[&[u8]]) -> Vec<RelayEvent> {
        let mut relay = Relay::new();
        let mut events = Vec::new();
        for read in reads {
            events.extend(relay.push(read));
        }
        events.extend(relay.finish());
        events
    }

    #[test]
    fn relays_deltas_then_full_response() {
        let body = format!("{}{}data: [DONE]\n\n", frame("Hi"), frame(" there"));
        let events = relay_all(&[body.as_bytes()]);

        assert_eq!(
            events,
            vec![
                RelayEvent::content("Hi"),
                RelayEvent::content(" there"),
                RelayEvent::done("Hi there"),
            ]
        );
    }

    #[test]
    fn split_reads_match_single_read_at_every_offset() {
        let body = format!(
            "{}: keep-alive\n\n{}{}data: [DONE]\n\n",
            frame("héllo"),
            frame(" wörld"),
            frame(" 🚀")
        );
        let bytes = body.as_bytes();
        let expected = relay_all(&[bytes]);

        for split in 0..=bytes.len() {
            let (head, tail) = bytes.split_at(split);
            assert_eq!(relay_all(&[head, tail]), expected, "split at byte {split}");
        }
    }

    #[test]
    fn byte_at_a_time_reads_are_reassembled() {
        let body = format!("{}{}", frame("a"), frame("b"));
        let reads: Vec<&[u8]> = body.as_bytes().chunks(1).collect();
        assert_eq!(
            relay_all(&reads),
            vec![
                RelayEvent::content("a"),
                RelayEvent::content("b"),
                RelayEvent::done("ab"),
            ]
        );
    }

    #[test]
    fn sentinel_does_not_end_the_session() {
        let body = format!("{}data: [DONE]\n\n{}", frame("one"), frame("two"));
        assert_eq!(
            relay_all(&[body.as_bytes()]),
            vec![
                RelayEvent::content("one"),
                RelayEvent::content("two"),
                RelayEvent::done("onetwo"),
            ]
        );
    }

    #[test]
    fn malformed_frames_are_skipped() {
        let body = format!(
            "data: {{not json\n\ndata: {{\"id\":\"x\"}}\n\n{}",
            frame("ok")
        );
        assert_eq!(
            relay_all(&[body.as_bytes()]),
            vec![RelayEvent::content("ok"), RelayEvent::done("ok")]
        );
    }

    #[test]
    fn role_only_and_empty_deltas_emit_nothing() {
        let body = concat!(
            "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"\"},\"finish_reason\":\"stop\"}]}\n\n",
        );
        assert_eq!(relay_all(&[body.as_bytes()]), vec![RelayEvent::done("")]);
    }

    #[test]
    fn empty_upstream_still_terminates() {
        assert_eq!(relay_all(&[]), vec![RelayEvent::done("")]);
    }

    #[test]
    fn unterminated_last_line_is_flushed() {
        let body = r#"data: {"choices":[{"delta":{"content":"tail"}}]}"#;
        assert_eq!(
            relay_all(&[body.as_bytes()]),
            vec![RelayEvent::content("tail"), RelayEvent::done("tail")]
        );
    }

    #[tokio::test]
    async fn relay_stream_forwards_events_in_order() {
        let body = format!("{}{}data: [DONE]\n\n", frame("Hi"), frame(" there"));
        let (head, tail) = body.as_bytes().split_at(17);
        let reads: Vec<Result<Vec<u8>, Infallible>> = vec![Ok(head.to_vec()), Ok(tail.to_vec())];

        let events: Vec<RelayEvent> = relay_stream(stream::iter(reads))
            .map(|item| item.unwrap())
            .collect()
            .await;

        assert_eq!(
            events,
            vec![
                RelayEvent::content("Hi"),
                RelayEvent::content(" there"),
                RelayEvent::done("Hi there"),
            ]
        );
    }

    #[tokio::test]
    async fn relay_stream_ends_with_error_instead_of_terminal_event() {
        let reads: Vec<Result<String, String>> = vec![
            Ok(frame("partial")),
            Err("connection reset".to_string()),
            Ok(frame("never")),
        ];

        let items: Vec<anyhow::Result<RelayEvent>> =
            relay_stream(stream::iter(reads)).collect().await;

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().unwrap(), &RelayEvent::content("partial"));
        let err = items[1].as_ref().unwrap_err();
        assert!(err.to_string().contains("connection reset"));
        assert!(!items.iter().any(|i| matches!(i, Ok(e) if e.is_terminal())));
    }

    #[tokio::test]
    async fn dropping_the_outbound_stream_stops_reading_upstream() {
        use std::sync::Arc;
        use std::sync::atomic::{AtomicUsize, Ordering};

        let reads = Arc::new(AtomicUsize::new(0));
        let counter = reads.clone();
        let upstream = stream::iter(0..1000).map(move |i| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok::<_, Infallible>(frame(&i.to_string()))
        });

        let mut events = relay_stream(upstream);
        let first = events.next().await.unwrap().unwrap();
        assert_eq!(first, RelayEvent::content("0"));
        drop(events);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(reads.load(Ordering::SeqCst) < 1000);
    }

    #[tokio::test(start_paused = true)]
    async fn stuck_consumer_gets_an_error_instead_of_a_clean_end() {
        let reads: Vec<Result<String, Infallible>> =
            vec![Ok(frame("0")), Ok(frame("1")), Ok(frame("2"))];

        let events = relay_stream(stream::iter(reads));
        tokio::time::sleep(EVENT_TX_SEND_TIMEOUT + Duration::from_secs(1)).await;

        let items: Vec<anyhow::Result<RelayEvent>> = events.collect().await;
        let last = items.last().unwrap();
        assert!(last.is_err(), "expected trailing error, got {items:?}");
        assert!(!items.iter().any(|i| matches!(i, Ok(e) if e.is_terminal())));
        assert_eq!(items[0].as_ref().unwrap(), &RelayEvent::content("0"));
    }
}
