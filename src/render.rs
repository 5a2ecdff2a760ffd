use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{
        Block, Borders, Cell, Clear, HighlightSpacing, List, ListItem, ListState, Paragraph, Row,
        Table, TableState, Wrap,
    },
    Frame,
};

use crate::{
    app::{
        mode::{AddSource, FilterMenu, Mode, RelocateDialog},
        App, Banner, BannerLevel,
    },
    browser::LocalBrowser,
    columns::ColumnKey,
    filter,
    model::{
        format_bytes, format_eta, format_progress, format_ratio, format_speed, format_timestamp,
        Torrent,
    },
    sort::SortKey,
};

const HIGHLIGHT_SYMBOL: &str = "> ";

pub fn draw(frame: &mut Frame, app: &App, table_state: &mut TableState) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(5),
            Constraint::Min(0),
            Constraint::Length(1),
        ])
        .split(frame.size());
    render_header(frame, app, chunks[0]);
    match app.details() {
        Some(torrent) => render_details(frame, torrent, chunks[1]),
        None => render_table(frame, app, table_state, chunks[1]),
    }
    render_footer(frame, app, chunks[2]);

    for mode in app.modes().iter() {
        match mode {
            Mode::FilterSelect(menu) => render_filter_menu(frame, menu),
            Mode::ColumnConfig { cursor } => render_column_config(frame, app, *cursor),
            Mode::ConfirmDelete(dialog) => {
                let lines = vec![
                    Line::from(format!("Delete '{}'?", dialog.label)),
                    Line::from(format!(
                        "Also delete files: {} (f to toggle)",
                        if dialog.delete_files { "yes" } else { "no" }
                    )),
                    Line::from(Span::styled(
                        "Press y to confirm, n or Esc to cancel",
                        Style::default().fg(Color::Yellow),
                    )),
                ];
                render_popup(frame, " Delete torrent ", lines, 50, 30);
            }
            Mode::Relocate(dialog) => render_relocate(frame, dialog),
            Mode::AddTorrent(dialog) => match &dialog.source {
                AddSource::Browse(browser) => render_local_browser(frame, browser),
                AddSource::Url(input) => {
                    let lines = vec![
                        Line::from("Magnet link or URL, Enter to add (Tab: browse files)"),
                        Line::from(format!("> {}", input.value())),
                    ];
                    render_popup(frame, " Add torrent ", lines, 60, 30);
                }
            },
            _ => {}
        }
    }

    if app.show_help() {
        render_popup(frame, " Key Bindings ", help_lines(), 70, 80);
    }
    if let Some(banner) = app.banner() {
        render_toast(frame, banner, app.modes().active().is_dialog());
    }
}

fn render_header(frame: &mut Frame, app: &App, area: Rect) {
    let server = app.mirror().server();
    let connection = if app.has_synced() {
        server.connection_status.as_str()
    } else {
        "connecting"
    };
    let mut lines = vec![
        Line::from(vec![
            Span::styled("qBittorrent", Style::default().add_modifier(Modifier::BOLD)),
            Span::raw("  |  "),
            Span::raw(connection.to_string()),
            Span::raw(format!("  |  DHT {}", server.dht_nodes)),
        ]),
        Line::from(format!(
            "DL {} ({})  UL {} ({})  | Free {}  | Showing {} of {}  Marked {}",
            format_speed(server.dl_speed),
            format_bytes(server.dl_total),
            format_speed(server.up_speed),
            format_bytes(server.up_total),
            format_bytes(server.free_disk),
            app.visible_len(),
            app.mirror().len(),
            app.marked_count(),
        )),
    ];
    if let Some(banner) = app.banner() {
        lines.push(Line::from(Span::styled(
            banner.text.clone(),
            banner_style(banner.level),
        )));
    }
    let paragraph = Paragraph::new(lines).block(
        Block::default()
            .borders(Borders::ALL)
            .title(Span::raw(" Session ")),
    );
    frame.render_widget(paragraph, area);
}

fn render_table(frame: &mut Frame, app: &App, table_state: &mut TableState, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .title(Span::raw(" Torrents "));
    let available = area
        .width
        .saturating_sub(2)
        .saturating_sub(HIGHLIGHT_SYMBOL.len() as u16);
    let layout = app.columns().layout(available);
    if layout.is_empty() {
        let hint = Paragraph::new("No columns visible; press C to choose columns")
            .block(block)
            .wrap(Wrap { trim: true });
        frame.render_widget(hint, area);
        return;
    }
    if app.visible_len() == 0 {
        let text = if !app.has_synced() {
            "Waiting for the first sync…"
        } else if app.mirror().is_empty() {
            "No torrents on the server"
        } else {
            "No torrents match the current filter"
        };
        frame.render_widget(Paragraph::new(text).block(block), area);
        return;
    }

    let sort = app.sort();
    let header = Row::new(layout.iter().map(|column| {
        let title = title_of(app, column.key);
        let text = if column.key == sort.key {
            format!("{title} {}", sort.direction.arrow())
        } else {
            title.to_string()
        };
        Cell::from(fit(&text, column.width))
    }))
    .style(Style::default().add_modifier(Modifier::BOLD));

    let rows = app.visible().map(|torrent| {
        let cells = layout.iter().map(|column| {
            let text = fit(&cell_text(torrent, column.key), column.width);
            match column.key {
                SortKey::State => Cell::from(text).style(state_style(&torrent.state)),
                _ => Cell::from(text),
            }
        });
        let row = Row::new(cells);
        if app.is_marked(&torrent.hash) {
            row.style(Style::default().fg(Color::Magenta))
        } else {
            row
        }
    });

    let widths: Vec<Constraint> = layout
        .iter()
        .map(|column| Constraint::Length(column.width))
        .collect();
    let table = Table::new(rows, widths)
        .header(header)
        .block(block)
        .column_spacing(0)
        .highlight_style(Style::default().fg(Color::Yellow))
        .highlight_symbol(HIGHLIGHT_SYMBOL)
        .highlight_spacing(HighlightSpacing::Always);
    table_state.select(app.cursor());
    frame.render_stateful_widget(table, area, table_state);
}

fn render_details(frame: &mut Frame, torrent: &Torrent, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .title(Span::raw(" Details "));
    let field = |label: &str, value: String| {
        Line::from(vec![
            Span::styled(format!("{label:<12}"), Style::default().fg(Color::DarkGray)),
            Span::raw(value),
        ])
    };
    let lines = vec![
        Line::from(Span::styled(
            torrent.name.clone(),
            Style::default().add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
        field("Hash", torrent.hash.clone()),
        Line::from(vec![
            Span::styled(format!("{:<12}", "State"), Style::default().fg(Color::DarkGray)),
            Span::styled(torrent.state.clone(), state_style(&torrent.state)),
        ]),
        field(
            "Progress",
            format!(
                "{} of {}  ETA {}",
                format_progress(torrent.progress),
                format_bytes(torrent.size),
                format_eta(torrent.eta())
            ),
        ),
        field(
            "Rates",
            format!(
                "DL {}  UL {}",
                format_speed(torrent.dl_speed),
                format_speed(torrent.up_speed)
            ),
        ),
        field(
            "Swarm",
            format!("{} seeds, {} peers", torrent.seeds, torrent.peers),
        ),
        field("Ratio", format_ratio(torrent.ratio)),
        field("Category", torrent.category.clone()),
        field("Tags", torrent.tags.clone()),
        field("Tracker", torrent.tracker.clone()),
        field("Save path", torrent.save_path.clone()),
        field("Added", format_timestamp(torrent.added_on)),
        field("Completed", format_timestamp(torrent.completion_on)),
        Line::from(""),
        Line::from(Span::styled(
            "p pause  u resume  d delete  m move  Esc back",
            Style::default().fg(Color::DarkGray),
        )),
    ];
    let paragraph = Paragraph::new(lines)
        .block(block)
        .wrap(Wrap { trim: false });
    frame.render_widget(paragraph, area);
}

fn render_footer(frame: &mut Frame, app: &App, area: Rect) {
    let active = app.modes().active();
    let filter_display = match active {
        Mode::FilterInput(state) => format!("/{}", state.input.value()),
        _ => app.filter().describe(),
    };
    let sort = app.sort();
    let mut summary = format!(
        "Mode {} | Filter {} | Sort {} {}",
        active.label(),
        filter_display,
        sort.key,
        sort.direction.arrow()
    );
    if let Some(secondary) = sort.secondary {
        summary.push_str(&format!(", {secondary}"));
    }
    let sections = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Min(0), Constraint::Length(14)])
        .split(area);
    let left = Paragraph::new(Line::from(summary)).wrap(Wrap { trim: true });
    frame.render_widget(left, sections[0]);
    let help_label =
        Paragraph::new(Line::from(Span::raw("Help [?]"))).alignment(Alignment::Right);
    frame.render_widget(help_label, sections[1]);
}

fn render_filter_menu(frame: &mut Frame, menu: &FilterMenu) {
    let items: Vec<ListItem> = if menu.options.is_empty() {
        vec![ListItem::new("(nothing to filter by)")]
    } else {
        menu.options
            .iter()
            .map(|option| {
                let mark = if menu.chosen.contains(option) { "[x]" } else { "[ ]" };
                ListItem::new(format!("{mark} {option}"))
            })
            .collect()
    };
    let title = format!(" {} (Space select, Enter apply, Del clear) ", menu.kind.title());
    render_list_popup(frame, &title, items, menu.cursor, 50, 60);
}

fn render_column_config(frame: &mut Frame, app: &App, cursor: usize) {
    let sort = app.sort();
    let items = app
        .columns()
        .specs()
        .iter()
        .map(|column| {
            let mark = if column.visible { "[x]" } else { "[ ]" };
            let arrow = if column.key == sort.key {
                sort.direction.arrow()
            } else {
                ""
            };
            ListItem::new(format!("{mark} {} {arrow}", column.title))
        })
        .collect();
    render_list_popup(
        frame,
        " Columns (Space toggle, Enter sort, Esc close) ",
        items,
        cursor,
        40,
        70,
    );
}

fn render_relocate(frame: &mut Frame, dialog: &RelocateDialog) {
    let Some(browser) = &dialog.browser else {
        let lines = vec![
            Line::from(format!("Move '{}' to:", dialog.label)),
            Line::from(format!("> {}", dialog.path.value())),
            Line::from(Span::styled(
                "Enter to move, Tab to browse, Esc to cancel",
                Style::default().fg(Color::Yellow),
            )),
        ];
        render_popup(frame, " Move torrent ", lines, 60, 30);
        return;
    };
    let title = format!(" {} ", browser.path);
    let items: Vec<ListItem> = if browser.loading {
        vec![ListItem::new("Loading…")]
    } else if let Some(error) = &browser.error {
        vec![ListItem::new(Span::styled(
            error.clone(),
            Style::default().fg(Color::Red),
        ))]
    } else if browser.entries.is_empty() {
        vec![ListItem::new("(no subdirectories)")]
    } else {
        browser
            .entries
            .iter()
            .map(|entry| ListItem::new(format!("{}/", last_component(entry))))
            .collect()
    };
    render_list_popup(frame, &title, items, browser.cursor, 60, 60);
}

fn render_local_browser(frame: &mut Frame, browser: &LocalBrowser) {
    let title = format!(" Add: {} ", browser.dir.display());
    let items: Vec<ListItem> = if let Some(error) = &browser.error {
        vec![ListItem::new(Span::styled(
            error.clone(),
            Style::default().fg(Color::Red),
        ))]
    } else if browser.entries.is_empty() {
        vec![ListItem::new("(no .torrent files here; Tab for URL)")]
    } else {
        browser
            .entries
            .iter()
            .map(|entry| {
                if entry.is_dir {
                    ListItem::new(format!("{}/", entry.name))
                        .style(Style::default().fg(Color::Blue))
                } else {
                    ListItem::new(entry.name.clone())
                }
            })
            .collect()
    };
    render_list_popup(frame, &title, items, browser.cursor, 60, 60);
}

fn render_popup(frame: &mut Frame, title: &str, lines: Vec<Line>, percent_x: u16, percent_y: u16) {
    let area = centered_rect(percent_x, percent_y, frame.size());
    let block = Block::default()
        .title(Span::raw(title.to_string()))
        .borders(Borders::ALL);
    let paragraph = Paragraph::new(lines).block(block).wrap(Wrap { trim: false });
    frame.render_widget(Clear, area);
    frame.render_widget(paragraph, area);
}

fn render_list_popup(
    frame: &mut Frame,
    title: &str,
    items: Vec<ListItem>,
    cursor: usize,
    percent_x: u16,
    percent_y: u16,
) {
    let area = centered_rect(percent_x, percent_y, frame.size());
    let list = List::new(items)
        .block(
            Block::default()
                .title(Span::raw(title.to_string()))
                .borders(Borders::ALL),
        )
        .highlight_style(Style::default().fg(Color::Yellow))
        .highlight_symbol(HIGHLIGHT_SYMBOL);
    let mut state = ListState::default();
    state.select(Some(cursor));
    frame.render_widget(Clear, area);
    frame.render_stateful_widget(list, area, &mut state);
}

fn render_toast(frame: &mut Frame, banner: &Banner, active_is_dialog: bool) {
    if banner.level != BannerLevel::Error || active_is_dialog {
        return;
    }
    let frame_area = frame.size();
    if frame_area.width < 20 || frame_area.height < 5 {
        return;
    }
    let padding = 2;
    let max_width = frame_area.width.saturating_sub(padding * 2);
    let width = max_width.clamp(20, 60);
    let height = 3;
    let x = frame_area
        .x
        .saturating_add(frame_area.width.saturating_sub(width + padding));
    let y = frame_area
        .y
        .saturating_add(frame_area.height.saturating_sub(height + padding));
    let area = Rect::new(x, y, width, height);
    let text = Line::from(Span::styled(banner.text.clone(), banner_style(banner.level)));
    let paragraph = Paragraph::new(text).alignment(Alignment::Center).block(
        Block::default()
            .borders(Borders::ALL)
            .title(Span::raw(" Error ")),
    );
    frame.render_widget(Clear, area);
    frame.render_widget(paragraph, area);
}

fn title_of(app: &App, key: ColumnKey) -> &'static str {
    app.columns()
        .specs()
        .iter()
        .find(|column| column.key == key)
        .map_or("", |column| column.title)
}

pub fn cell_text(torrent: &Torrent, key: ColumnKey) -> String {
    match key {
        SortKey::Name => torrent.name.clone(),
        SortKey::Size => format_bytes(torrent.size),
        SortKey::Progress => format_progress(torrent.progress),
        SortKey::State => torrent.state.clone(),
        SortKey::DlSpeed => format_speed(torrent.dl_speed),
        SortKey::UpSpeed => format_speed(torrent.up_speed),
        SortKey::Seeds => torrent.seeds.to_string(),
        SortKey::Peers => torrent.peers.to_string(),
        SortKey::Ratio => format_ratio(torrent.ratio),
        SortKey::Eta => format_eta(torrent.eta()),
        SortKey::Category => torrent.category.clone(),
        SortKey::Tags => torrent.tags.clone(),
        SortKey::Tracker => filter::tracker_domain(&torrent.tracker),
        SortKey::AddedOn => format_timestamp(torrent.added_on),
        SortKey::CompletedOn => format_timestamp(torrent.completion_on),
        SortKey::SavePath => torrent.save_path.clone(),
    }
}

/// Clips `text` to one cell short of `width`, leaving a gap before the next column.
fn fit(text: &str, width: u16) -> String {
    let room = usize::from(width.saturating_sub(1));
    if text.chars().count() <= room {
        return text.to_string();
    }
    if room == 0 {
        return String::new();
    }
    let mut clipped: String = text.chars().take(room - 1).collect();
    clipped.push('…');
    clipped
}

fn last_component(path: &str) -> &str {
    path.trim_end_matches(['/', '\\'])
        .rsplit(['/', '\\'])
        .next()
        .filter(|name| !name.is_empty())
        .unwrap_or(path)
}

fn state_style(state: &str) -> Style {
    match state {
        "error" | "missingFiles" => Style::default().fg(Color::Red),
        "downloading" | "forcedDL" | "metaDL" => Style::default().fg(Color::Green),
        "uploading" | "forcedUP" => Style::default().fg(Color::Cyan),
        "stalledDL" | "stalledUP" => Style::default().fg(Color::Yellow),
        s if s.starts_with("paused") || s.starts_with("stopped") => {
            Style::default().fg(Color::DarkGray)
        }
        _ => Style::default(),
    }
}

fn banner_style(level: BannerLevel) -> Style {
    match level {
        BannerLevel::Info => Style::default().fg(Color::Blue),
        BannerLevel::Success => Style::default().fg(Color::Green),
        BannerLevel::Error => Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
    }
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);
    let vertical = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1]);
    vertical[1]
}

fn help_lines() -> Vec<Line<'static>> {
    let heading = |text: &'static str| {
        Line::from(Span::styled(
            text,
            Style::default().add_modifier(Modifier::BOLD | Modifier::UNDERLINED),
        ))
    };
    vec![
        heading("Navigation"),
        Line::from("  ↑/↓ or j/k: move selection"),
        Line::from("  PgUp/PgDn, Home/End: page, jump to first / last"),
        Line::from("  Enter: details   Space: mark / unmark"),
        Line::from(""),
        heading("Actions (marked torrents, else the highlighted one)"),
        Line::from("  p: pause   u: resume   d: delete   m: move"),
        Line::from("  a: add torrent file or URL   r: refresh now"),
        Line::from(""),
        heading("View"),
        Line::from("  /: search by name   Esc: clear search"),
        Line::from("  s: state   c: category   t: tracker   T: tag   x: clear filters"),
        Line::from("  < / >: sort by previous / next column   i: invert order"),
        Line::from("  C: choose columns"),
        Line::from("  ?: toggle this help   q or Ctrl+c: quit"),
        Line::from(""),
        heading("Dialogs"),
        Line::from("  Tab: switch between typing and browsing"),
        Line::from("  Delete: f toggles file removal, y/Enter confirm, n/Esc cancel"),
    ]
}
