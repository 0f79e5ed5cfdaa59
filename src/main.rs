use anyhow::Result;
use std::io::Write;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use floatchat::api::ApiClient;
use floatchat::config::Config;
use floatchat::display::viz::{is_visualization_language, scan_fenced_blocks};
use floatchat::display::{StreamingTextBuffer, WidgetPool, WidgetSlot};
use floatchat::session::{RunOutcome, SessionUpdate, StreamSession};

const FRAME_INTERVAL: Duration = Duration::from_millis(16);

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load()?;
    config.validate()?;

    let client = ApiClient::new(&config)?;
    let (update_tx, update_rx) = mpsc::unbounded_channel();
    let mut session = StreamSession::new(client, &config).with_updates(update_tx);

    session.check_connection().await;
    if let Some(warning) = session.health_warning() {
        eprintln!("warning: {warning}");
    }

    // Ctrl-C cancels the in-flight run instead of killing the client; exit
    // with /quit.
    let stop = session.stop_handle();
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            stop.stop();
        }
    });

    let (idle_tx, mut idle_rx) = mpsc::unbounded_channel();
    let pool = WidgetPool::new(config.max_active_widgets, config.max_widget_waiters);
    tokio::spawn(print_replies(
        update_rx,
        idle_tx,
        pool,
        config.typing_speed,
        config.typing_enabled,
    ));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let input = line.trim().to_string();
        if input.is_empty() {
            continue;
        }
        if input == "/quit" {
            break;
        }

        session.submit(&input, Vec::new(), None).await?;
        // Wait for the printer to finish typing out the reply.
        let _ = idle_rx.recv().await;

        if let Some(error) = session.error() {
            eprintln!("error: {error}");
        }
    }

    Ok(())
}

/// Renders assistant replies to stdout with the typing effect, holding back
/// structured visualization blocks until their fences close. Signals on
/// `idle_tx` once each run's reply is fully printed.
async fn print_replies(
    mut update_rx: mpsc::UnboundedReceiver<SessionUpdate>,
    idle_tx: mpsc::UnboundedSender<()>,
    pool: WidgetPool,
    typing_speed: Duration,
    typing_enabled: bool,
) {
    let mut buffer = StreamingTextBuffer::new(typing_speed, typing_enabled);
    let mut printed_len = 0usize;
    let mut announced_pending: Option<String> = None;
    let mut mounted: Vec<WidgetSlot> = Vec::new();
    let mut run_open = false;
    let mut ticker = tokio::time::interval(FRAME_INTERVAL);

    loop {
        tokio::select! {
            update = update_rx.recv() => {
                let Some(update) = update else { break };
                match update {
                    SessionUpdate::RunStarted { .. } => {
                        buffer = StreamingTextBuffer::new(typing_speed, typing_enabled);
                        printed_len = 0;
                        announced_pending = None;
                        run_open = true;
                    }
                    SessionUpdate::AssistantMessage { text, .. } => {
                        buffer.update(&text);
                    }
                    SessionUpdate::RunFinished { outcome } => {
                        // Let the animation catch up before yielding the prompt.
                        while run_open && !buffer.is_complete() {
                            buffer.advance(typing_speed);
                            printed_len =
                                flush_progress(&buffer, printed_len, &mut announced_pending);
                        }
                        if run_open {
                            mount_completed_widgets(buffer.full_text(), &pool, &mut mounted);
                            if outcome == RunOutcome::Cancelled {
                                println!("\n[cancelled]");
                            } else {
                                println!();
                            }
                        }
                        run_open = false;
                        let _ = idle_tx.send(());
                    }
                    SessionUpdate::ThreadHandoff { thread_id } => {
                        eprintln!("[thread {thread_id}]");
                    }
                    SessionUpdate::Error(message) => {
                        eprintln!("\n[run error] {message}");
                    }
                    SessionUpdate::MessagesChanged | SessionUpdate::UiEventsChanged => {}
                }
            }
            _ = ticker.tick(), if run_open => {
                buffer.advance(FRAME_INTERVAL);
                printed_len = flush_progress(&buffer, printed_len, &mut announced_pending);
            }
        }
    }
}

/// Take a pool slot for each closed visualization block in the finished
/// reply, keeping the slot for as long as the widget stays on screen. When
/// the cap is hit, the oldest widget is unmounted to make room.
fn mount_completed_widgets(text: &str, pool: &WidgetPool, mounted: &mut Vec<WidgetSlot>) {
    for block in scan_fenced_blocks(text) {
        let Some(language) = block.language.as_deref() else {
            continue;
        };
        if !block.complete || !is_visualization_language(language) {
            continue;
        }
        loop {
            if let Some(slot) = pool.try_acquire() {
                mounted.push(slot);
                eprintln!("[{language} widget mounted]");
                break;
            }
            if mounted.is_empty() {
                eprintln!("[{language} widget not mounted: render pool exhausted]");
                break;
            }
            mounted.remove(0);
        }
    }
}

/// Print whatever new suffix of the displayed text has appeared since the
/// last frame. The displayed prefix only grows for appended text; a reset
/// (new message) starts from a fresh line.
fn flush_progress(
    buffer: &StreamingTextBuffer,
    printed_len: usize,
    announced_pending: &mut Option<String>,
) -> usize {
    let view = buffer.view();
    let shown = view.displayed_text;

    if let Some(language) = &view.pending_language {
        if announced_pending.as_deref() != Some(language.as_str()) {
            eprintln!("[building {language} view...]");
            *announced_pending = Some(language.clone());
        }
    }

    if shown.len() > printed_len && shown.is_char_boundary(printed_len) {
        print!("{}", &shown[printed_len..]);
        let _ = std::io::stdout().flush();
        return shown.len();
    }
    if shown.len() < printed_len || !shown.is_char_boundary(printed_len) {
        // Display reset (filter trim or message switch); reprint cleanly.
        println!();
        print!("{shown}");
        let _ = std::io::stdout().flush();
        return shown.len();
    }
    printed_len
}
