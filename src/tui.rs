use std::{
    io::{self, Stdout},
    thread,
    time::{Duration, Instant},
};

use anyhow::{Context, Result};
use crossbeam_channel::{
    bounded, unbounded, Receiver, RecvTimeoutError, Sender, TryRecvError,
};
use crossterm::{
    event::{self, DisableBracketedPaste, EnableBracketedPaste, Event},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use log::{debug, warn};
use ratatui::{widgets::TableState, Terminal};

use crate::{
    app::{App, AppEvent, Command},
    client::{TorrentService, WebUiClient},
    config::AppConfig,
    render,
};

type Backend = ratatui::backend::CrosstermBackend<Stdout>;

const INPUT_POLL: Duration = Duration::from_millis(250);

pub fn run(config: AppConfig) -> Result<()> {
    let client = WebUiClient::new(config.webui.clone())
        .context("failed to construct qBittorrent WebUI client")?;
    let mut terminal = setup_terminal()?;
    let (event_tx, event_rx) = unbounded();
    let (command_tx, command_rx) = unbounded();
    // Dropping the sender tells every background thread to stop.
    let (shutdown_tx, shutdown_rx) = bounded::<()>(0);

    let handles = vec![
        spawn_input_thread(event_tx.clone(), shutdown_rx.clone()),
        spawn_ticker(
            event_tx.clone(),
            shutdown_rx.clone(),
            config.ui.poll_interval,
            || AppEvent::PollTick,
        ),
        spawn_ticker(
            event_tx.clone(),
            shutdown_rx,
            config.ui.ui_refresh_interval,
            || AppEvent::UiTick(Instant::now()),
        ),
        spawn_worker(client, command_rx, event_tx.clone()),
    ];

    let mut app = App::new(&config.ui);
    let size = terminal.size()?;
    app.update(AppEvent::Resize {
        width: size.width,
        height: size.height,
    });
    let initial = app.start();

    let loop_result = run_loop(
        &mut terminal,
        &mut app,
        &event_rx,
        &command_tx,
        &event_tx,
        initial,
    );

    drop(shutdown_tx);
    drop(command_tx);
    drop(event_tx);

    restore_terminal(&mut terminal)?;
    for handle in handles {
        handle.join().ok();
    }

    loop_result
}

fn run_loop(
    terminal: &mut Terminal<Backend>,
    app: &mut App,
    events: &Receiver<AppEvent>,
    commands: &Sender<Command>,
    event_tx: &Sender<AppEvent>,
    initial: Vec<Command>,
) -> Result<()> {
    let mut table_state = TableState::default();
    dispatch(initial, commands, event_tx);
    terminal.draw(|frame| render::draw(frame, app, &mut table_state))?;
    while let Ok(event) = events.recv() {
        let issued = app.update(event);
        dispatch(issued, commands, event_tx);
        if app.should_quit() {
            break;
        }
        terminal.draw(|frame| render::draw(frame, app, &mut table_state))?;
    }
    Ok(())
}

/// Hands remote work to the worker; timers are started here.
fn dispatch(issued: Vec<Command>, commands: &Sender<Command>, event_tx: &Sender<AppEvent>) {
    for command in issued {
        match command {
            Command::Quit => {}
            Command::ScheduleRefresh(delay) => {
                let tx = event_tx.clone();
                thread::spawn(move || {
                    thread::sleep(delay);
                    let _ = tx.send(AppEvent::RefreshDue);
                });
            }
            other => {
                if commands.send(other).is_err() {
                    warn!("worker thread is gone; dropping command");
                }
            }
        }
    }
}

fn setup_terminal() -> Result<Terminal<Backend>> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableBracketedPaste)?;
    let backend = ratatui::backend::CrosstermBackend::new(stdout);
    Ok(Terminal::new(backend)?)
}

fn restore_terminal(terminal: &mut Terminal<Backend>) -> Result<()> {
    disable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, DisableBracketedPaste, LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}

fn spawn_input_thread(tx: Sender<AppEvent>, shutdown: Receiver<()>) -> thread::JoinHandle<()> {
    thread::spawn(move || loop {
        if matches!(shutdown.try_recv(), Err(TryRecvError::Disconnected)) {
            break;
        }
        match event::poll(INPUT_POLL) {
            Ok(true) => {}
            Ok(false) => continue,
            Err(err) => {
                warn!("terminal poll failed: {err}");
                continue;
            }
        }
        let event = match event::read() {
            Ok(Event::Key(key)) => AppEvent::Key(key),
            Ok(Event::Paste(text)) => AppEvent::Paste(text),
            Ok(Event::Resize(width, height)) => AppEvent::Resize { width, height },
            Ok(_) => continue,
            Err(err) => {
                warn!("terminal read failed: {err}");
                continue;
            }
        };
        if tx.send(event).is_err() {
            break;
        }
    })
}

fn spawn_ticker(
    tx: Sender<AppEvent>,
    shutdown: Receiver<()>,
    interval: Duration,
    make: fn() -> AppEvent,
) -> thread::JoinHandle<()> {
    thread::spawn(move || loop {
        match shutdown.recv_timeout(interval) {
            Err(RecvTimeoutError::Timeout) => {
                if tx.send(make()).is_err() {
                    break;
                }
            }
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }
    })
}

fn spawn_worker<S>(service: S, rx: Receiver<Command>, tx: Sender<AppEvent>) -> thread::JoinHandle<()>
where
    S: TorrentService + 'static,
{
    thread::spawn(move || {
        while let Ok(command) = rx.recv() {
            let Some(event) = execute(&service, command) else {
                continue;
            };
            if tx.send(event).is_err() {
                break;
            }
        }
    })
}

/// Runs one command against the service and wraps the result as an event.
fn execute(service: &dyn TorrentService, command: Command) -> Option<AppEvent> {
    debug!("executing {command}");
    let result = match &command {
        Command::Sync { rid } => return Some(AppEvent::Synced(service.sync(*rid))),
        Command::ListDirectories { generation, path } => {
            return Some(AppEvent::DirectoryListing {
                generation: *generation,
                path: path.clone(),
                result: service.list_directories(path),
            })
        }
        Command::Pause(hashes) => service.pause(hashes),
        Command::Resume(hashes) => service.resume(hashes),
        Command::Delete {
            hashes,
            delete_files,
        } => service.delete(hashes, *delete_files),
        Command::AddFile(path) => service.add_file(path),
        Command::AddUrl(url) => service.add_url(url),
        Command::SetLocation { hashes, path } => service.set_location(hashes, path),
        Command::ScheduleRefresh(_) | Command::Quit => return None,
    };
    Some(AppEvent::Mutated { command, result })
}
