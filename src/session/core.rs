use super::state::{
    ProvisionalOverlay, RunOutcome, RunPhase, SessionUpdate, StreamSession, TaggedFrame,
};
use super::submission::{has_submittable_content, missing_tool_results};
use crate::api::client::ByteStream;
use crate::api::stream::StreamParser;
use crate::types::{ContentBlock, Message, RunRequest, StreamEvent};
use anyhow::Result;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

// Upper bound for the parked quiet-window timer while it is unarmed.
const IDLE_TIMER_PARK: Duration = Duration::from_secs(86_400);

#[derive(Default)]
struct RunProgress {
    first_token_seen: bool,
    last_ai_content: String,
    content_changed: bool,
    saw_error: bool,
}

enum FrameOutcome {
    Continue,
    Finish(RunOutcome),
}

impl StreamSession {
    /// One-shot liveness probe at session start. A failure is a warning the
    /// UI may keep showing until dismissed; it never blocks submission, since
    /// the stream call itself will fail visibly if the server is truly down.
    pub async fn check_connection(&mut self) {
        match self.client.probe_health().await {
            Ok(()) => self.health_warning = None,
            Err(error) => {
                self.health_warning = Some(format!("agent server health check failed: {error}"));
            }
        }
    }

    /// Send a human turn. No-op while a run is in flight or when there is
    /// nothing to send. Dangling tool calls in history are backfilled first,
    /// and the backfill plus the new turn are applied locally before the
    /// server confirms, so the transcript reflects the user immediately.
    pub async fn submit(
        &mut self,
        text: &str,
        attachments: Vec<ContentBlock>,
        context: Option<serde_json::Map<String, serde_json::Value>>,
    ) -> Result<()> {
        if self.phase != RunPhase::Idle {
            return Ok(());
        }
        if !has_submittable_content(text, &attachments) {
            return Ok(());
        }

        let mut turns = missing_tool_results(&self.state.messages);
        turns.push(Message::human(text, attachments));
        let request = RunRequest::new(turns.clone(), context);

        for turn in &turns {
            self.state.upsert_message(turn.clone());
        }
        self.provisional = Some(ProvisionalOverlay {
            request_id: request.request_id.clone(),
            turns,
        });
        self.emit(SessionUpdate::MessagesChanged);
        self.pending_turns += 1;

        self.run(request).await
    }

    /// Recompute from a checkpoint: local history is truncated to the
    /// checkpoint and the transport re-runs from there with no new input.
    /// Unknown checkpoints are a no-op. The pending-turn count is left
    /// untouched; a regenerate replaces a reply rather than adding one.
    pub async fn regenerate(&mut self, checkpoint_id: &str) -> Result<()> {
        if self.phase != RunPhase::Idle {
            return Ok(());
        }
        if !self.state.truncate_from_checkpoint(checkpoint_id) {
            return Ok(());
        }
        self.emit(SessionUpdate::MessagesChanged);

        self.run(RunRequest::regenerate(checkpoint_id)).await
    }

    async fn run(&mut self, request: RunRequest) -> Result<()> {
        self.phase = RunPhase::Submitting;
        self.state.is_loading = true;
        self.state.error = None;
        self.epoch += 1;
        let epoch = self.epoch;

        let token = CancellationToken::new();
        *self.cancel.lock().unwrap() = token.clone();

        self.emit(SessionUpdate::RunStarted {
            request_id: request.request_id.clone(),
        });

        let stream = match self
            .client
            .create_run_stream(self.thread_id.as_deref(), &request)
            .await
        {
            Ok(stream) => stream,
            Err(error) => {
                let message = error.to_string();
                self.state.error = Some(message.clone());
                self.announce_error(message);
                self.finish_run(RunOutcome::Failed);
                return Ok(());
            }
        };

        let (frame_tx, frame_rx) = mpsc::unbounded_channel();
        tokio::spawn(read_frames(stream, epoch, frame_tx));
        self.consume_frames(frame_rx, token).await;
        Ok(())
    }

    /// Single consumer of the run's frame channel. Frames are folded in
    /// arrival order; completion comes from an explicit end/error frame, the
    /// transport closing, cancellation, or the quiet-window heuristic once
    /// at least one token has been seen.
    async fn consume_frames(
        &mut self,
        mut frame_rx: mpsc::UnboundedReceiver<TaggedFrame>,
        token: CancellationToken,
    ) {
        let mut progress = RunProgress::default();
        let quiet_window = self.quiet_window;
        let quiet_timer = tokio::time::sleep(IDLE_TIMER_PARK);
        tokio::pin!(quiet_timer);
        let mut quiet_armed = false;

        let outcome = loop {
            tokio::select! {
                _ = token.cancelled() => break RunOutcome::Cancelled,
                _ = quiet_timer.as_mut(), if quiet_armed => break RunOutcome::Completed,
                frame = frame_rx.recv() => {
                    let Some(frame) = frame else {
                        // Transport closed without an explicit end frame.
                        break if progress.saw_error {
                            RunOutcome::Failed
                        } else {
                            RunOutcome::Completed
                        };
                    };
                    if !self.frame_is_current(&frame) {
                        continue;
                    }
                    match self.ingest_frame(frame.event, &mut progress) {
                        FrameOutcome::Finish(outcome) => break outcome,
                        FrameOutcome::Continue => {}
                    }
                    if progress.content_changed {
                        progress.content_changed = false;
                        if let Some(window) = quiet_window {
                            if progress.first_token_seen {
                                quiet_timer.as_mut().reset(Instant::now() + window);
                                quiet_armed = true;
                            }
                        }
                    }
                }
            }
        };

        if outcome == RunOutcome::Cancelled {
            self.spawn_transport_cancel();
        }
        self.finish_run(outcome);
    }

    pub(super) fn frame_is_current(&self, frame: &TaggedFrame) -> bool {
        frame.epoch == self.epoch
    }

    fn ingest_frame(&mut self, event: StreamEvent, progress: &mut RunProgress) -> FrameOutcome {
        match event {
            StreamEvent::Metadata(metadata) => {
                if let Some(run_id) = metadata.run_id {
                    self.run_id = Some(run_id);
                }
                if let Some(minted) = metadata.thread_id {
                    if self.thread_id.as_deref() != Some(minted.as_str()) {
                        self.thread_id = Some(minted.clone());
                        self.emit(SessionUpdate::ThreadHandoff {
                            thread_id: minted.clone(),
                        });
                        self.spawn_thread_refresh(minted);
                    }
                }
                FrameOutcome::Continue
            }
            StreamEvent::Values(snapshot) => {
                self.state.replace_from_snapshot(snapshot);
                self.reconcile_provisional_turns();
                self.note_assistant_progress(progress);
                self.emit(SessionUpdate::MessagesChanged);
                self.emit(SessionUpdate::UiEventsChanged);
                FrameOutcome::Continue
            }
            StreamEvent::MessagesPartial(messages) | StreamEvent::MessagesComplete(messages) => {
                let mut changed = false;
                for message in messages {
                    changed |= self.state.upsert_message(message);
                }
                if changed {
                    self.note_assistant_progress(progress);
                    self.emit(SessionUpdate::MessagesChanged);
                }
                FrameOutcome::Continue
            }
            StreamEvent::Custom(event) => {
                self.state.apply_custom_event(&event);
                self.emit(SessionUpdate::UiEventsChanged);
                FrameOutcome::Continue
            }
            StreamEvent::Error { message } => {
                progress.saw_error = true;
                self.state.error = Some(message.clone());
                self.announce_error(message);
                FrameOutcome::Finish(RunOutcome::Failed)
            }
            StreamEvent::End => FrameOutcome::Finish(RunOutcome::Completed),
        }
    }

    /// Square the optimistic overlay against the authoritative snapshot that
    /// just replaced local state. Confirmed turns are merged (the overlay is
    /// dropped); a snapshot that predates the submission gets the provisional
    /// turns re-applied so they are not erased, and the overlay stays until a
    /// later snapshot confirms them.
    fn reconcile_provisional_turns(&mut self) {
        let Some(overlay) = self.provisional.take() else {
            return;
        };

        let all_confirmed = overlay
            .turns
            .iter()
            .all(|turn| snapshot_confirms_turn(&self.state.messages, turn));
        if all_confirmed {
            return;
        }

        for turn in &overlay.turns {
            if !snapshot_confirms_turn(&self.state.messages, turn) {
                self.state.upsert_message(turn.clone());
            }
        }
        self.provisional = Some(overlay);
    }

    /// Track the latest assistant message; its content changes drive both
    /// the Submitting→Streaming transition and the quiet-window rearm.
    fn note_assistant_progress(&mut self, progress: &mut RunProgress) {
        let Some((message_id, text)) = self
            .state
            .latest_ai_message()
            .map(|message| (message.id.clone(), message.text()))
        else {
            return;
        };

        if !progress.first_token_seen && !text.is_empty() {
            progress.first_token_seen = true;
            self.phase = RunPhase::Streaming;
        }
        if text != progress.last_ai_content {
            progress.last_ai_content = text.clone();
            progress.content_changed = true;
            self.emit(SessionUpdate::AssistantMessage { message_id, text });
        }
    }

    /// Consecutive identical failures are announced once; the next
    /// successfully completed run resets the gate.
    fn announce_error(&mut self, message: String) {
        if self.last_error_notice.as_deref() == Some(message.as_str()) {
            return;
        }
        self.last_error_notice = Some(message.clone());
        self.emit(SessionUpdate::Error(message));
    }

    fn finish_run(&mut self, outcome: RunOutcome) {
        self.phase = RunPhase::Idle;
        self.state.is_loading = false;
        self.provisional = None;
        self.pending_turns = self.pending_turns.saturating_sub(1);
        self.run_id = None;
        if outcome == RunOutcome::Completed {
            self.last_error_notice = None;
        }
        self.emit(SessionUpdate::RunFinished { outcome });
    }

    /// Best-effort server-side cancel; local state is already Idle and does
    /// not wait on the acknowledgment.
    fn spawn_transport_cancel(&self) {
        let (Some(thread_id), Some(run_id)) = (self.thread_id.clone(), self.run_id.clone()) else {
            return;
        };
        let client = Arc::clone(&self.client);
        tokio::spawn(async move {
            if let Err(error) = client.cancel_run(&thread_id, &run_id).await {
                eprintln!("warning: run cancel request failed: {error}");
            }
        });
    }

    /// Refresh the shared thread directory after the server mints a thread.
    /// The listing is eventually consistent; when the minted id is not yet
    /// visible, retry once after a short delay.
    fn spawn_thread_refresh(&self, minted: String) {
        let client = Arc::clone(&self.client);
        let directory = Arc::clone(&self.thread_directory);
        let retry_delay = self.thread_refresh_delay;
        tokio::spawn(async move {
            let minted_visible = match client.search_threads().await {
                Ok(threads) => {
                    let visible = threads.iter().any(|thread| thread.thread_id == minted);
                    *directory.lock().unwrap() = threads;
                    visible
                }
                Err(error) => {
                    eprintln!("warning: thread listing refresh failed: {error}");
                    return;
                }
            };

            if !minted_visible {
                tokio::time::sleep(retry_delay).await;
                match client.search_threads().await {
                    Ok(threads) => *directory.lock().unwrap() = threads,
                    Err(error) => {
                        eprintln!("warning: thread listing refresh retry failed: {error}")
                    }
                }
            }
        });
    }

    fn emit(&self, update: SessionUpdate) {
        if let Some(tx) = &self.update_tx {
            let _ = tx.send(update);
        }
    }
}

/// A snapshot confirms a provisional turn when it carries the same message
/// id, or a message with the same role and text for servers that reassign
/// ids on ingest.
fn snapshot_confirms_turn(snapshot: &[Message], turn: &Message) -> bool {
    snapshot.iter().any(|message| {
        message.id == turn.id || (message.role == turn.role && message.text() == turn.text())
    })
}

/// Transport reader: decodes SSE chunks into typed frames and pushes them,
/// stamped with the run epoch, onto the session's channel. A chunk-level
/// transport error becomes an error frame; the session never sees a panic.
async fn read_frames(
    mut stream: ByteStream,
    epoch: u64,
    frame_tx: mpsc::UnboundedSender<TaggedFrame>,
) {
    let mut parser = StreamParser::new();
    while let Some(chunk) = stream.next().await {
        match chunk {
            Ok(bytes) => {
                let Ok(events) = parser.process(&bytes) else {
                    continue;
                };
                for event in events {
                    if frame_tx.send(TaggedFrame { epoch, event }).is_err() {
                        return;
                    }
                }
            }
            Err(error) => {
                let _ = frame_tx.send(TaggedFrame {
                    epoch,
                    event: StreamEvent::Error {
                        message: error.to_string(),
                    },
                });
                return;
            }
        }
    }
}
